//! A small bounded ring buffer of recent mutations, keyed by the
//! `ModifyIndex` that produced them.
//!
//! This is the mechanism behind SPEC_FULL.md Open Question 1: a delta sync
//! whose `last_sync_index` still falls within the buffer's horizon gets a
//! true delta; an older (or `0`, or explicit full-sync) request falls back
//! to a full snapshot. Either way spec invariant I5 holds — the response
//! shape never promises "no change" by omission.

use std::collections::VecDeque;

pub struct ChangeLog<T> {
    capacity: usize,
    entries: VecDeque<(u64, T)>,
}

impl<T: Clone> ChangeLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn record(&mut self, index: u64, item: T) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((index, item));
    }

    /// Returns the changes strictly after `since_index`, or `None` if
    /// `since_index` predates the oldest entry still retained (the caller
    /// must fall back to a full snapshot).
    pub fn since(&self, since_index: u64) -> Option<Vec<T>> {
        if since_index == 0 {
            return None;
        }
        match self.entries.front() {
            None => Some(Vec::new()),
            Some((oldest, _)) if since_index < oldest.saturating_sub(1) => None,
            _ => Some(
                self.entries
                    .iter()
                    .filter(|(idx, _)| *idx > since_index)
                    .map(|(_, item)| item.clone())
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_tail_when_within_horizon() {
        let mut log = ChangeLog::new(10);
        for i in 1..=5u64 {
            log.record(i, i);
        }
        assert_eq!(log.since(2), Some(vec![3, 4, 5]));
    }

    #[test]
    fn returns_none_when_before_horizon() {
        let mut log = ChangeLog::new(3);
        for i in 1..=10u64 {
            log.record(i, i);
        }
        // Capacity 3 means only indices 8,9,10 are retained.
        assert_eq!(log.since(1), None);
    }

    #[test]
    fn zero_index_always_falls_back_to_full_sync() {
        let mut log: ChangeLog<u64> = ChangeLog::new(10);
        log.record(1, 1);
        assert_eq!(log.since(0), None);
    }
}
