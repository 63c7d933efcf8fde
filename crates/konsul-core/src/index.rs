//! Process-wide monotonic `ModifyIndex` sequence (C1).
//!
//! Every mutating operation on the KV store or the service store stamps its
//! result with `IndexCounter::next()`. The counter is never persisted; a
//! restarted process starts back at 1, and consistency across restarts is
//! the authority's replication concern, not this counter's.

use std::sync::atomic::{AtomicU64, Ordering};

/// A strictly-increasing `u64` sequence shared by every store in a process.
#[derive(Debug, Default)]
pub struct IndexCounter {
    value: AtomicU64,
}

impl IndexCounter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Returns the next index. Safe under unbounded contention.
    pub fn next(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current value without advancing it. Exposed for diagnostics only.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn strictly_increasing() {
        let c = IndexCounter::new();
        let a = c.next();
        let b = c.next();
        assert!(b > a);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn unique_under_contention() {
        let c = Arc::new(IndexCounter::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = c.clone();
            handles.push(thread::spawn(move || {
                (0..1000).map(|_| c.next()).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        let before = all.len();
        all.dedup();
        assert_eq!(all.len(), before, "every index must be unique");
        assert_eq!(all.len(), 8000);
    }
}
