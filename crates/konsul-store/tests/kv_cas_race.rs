//! CAS create-only races: exactly one of two concurrent create-only
//! writers wins, the other observes a conflict, and a subsequent read
//! sees one consistent value.

use std::sync::Arc;

use konsul_core::error::Error;
use konsul_core::index::IndexCounter;
use konsul_core::sink::NullSink;
use konsul_store::{KVStore, CAS_CREATE_ONLY};

fn store() -> Arc<KVStore> {
    Arc::new(KVStore::new(Arc::new(IndexCounter::new()), Arc::new(NullSink), 64))
}

#[test]
fn create_only_cas_has_exactly_one_winner_under_concurrency() {
    let store = store();
    let a = store.clone();
    let b = store.clone();

    let t1 = std::thread::spawn(move || a.set_cas("cfg/app", b"v1".to_vec(), 0, CAS_CREATE_ONLY));
    let t2 = std::thread::spawn(move || b.set_cas("cfg/app", b"v2".to_vec(), 0, CAS_CREATE_ONLY));

    let r1 = t1.join().unwrap();
    let r2 = t2.join().unwrap();

    let winners = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
    let conflicts = [&r1, &r2].iter().filter(|r| matches!(r, Err(Error::CasConflict { .. }))).count();
    assert_eq!(winners, 1, "exactly one create-only racer must win");
    assert_eq!(conflicts, 1, "the loser must see a CAS conflict, not silent overwrite");

    let value = store.get("cfg/app").expect("a value must be present after the race");
    assert!(value == b"v1" || value == b"v2");
}
