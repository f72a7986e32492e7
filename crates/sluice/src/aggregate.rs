// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Keyed buffering of raw items under count, size and age limits.
//!
//! The aggregator never flushes on its own. `add` refuses an item that would
//! break a limit and the caller is expected to drain the key (`get` then
//! `reset`) and add again. The age limit is only checked inside `add`, so a
//! key that stops receiving items keeps its buffer until the next control
//! message or overflow drains it.

use hashbrown::HashMap;
use std::time::{Duration, Instant};

use crate::config::Batch;

#[derive(Debug, Default)]
struct Buffer {
    items: Vec<Vec<u8>>,
    size: usize,
    first_add: Option<Instant>,
}

/// Keyed item buffers owned by a single transform.
///
/// Not synchronised; owners wrap it in their own lock so that an
/// add-or-flush-and-retry sequence runs as one critical section.
#[derive(Debug)]
pub struct Aggregator {
    max_count: usize,
    max_size: usize,
    max_duration: Option<Duration>,
    buffers: HashMap<String, Buffer>,
}

impl Aggregator {
    pub fn new(limits: &Batch) -> Self {
        Aggregator {
            max_count: limits.count,
            max_size: limits.size,
            max_duration: limits.duration,
            buffers: HashMap::new(),
        }
    }

    /// Appends `item` to `key`'s buffer unless doing so breaks a limit.
    ///
    /// Returns `false`, leaving the buffer untouched, when the buffer would
    /// exceed the count or size limit or when its oldest item is older than
    /// the duration limit.
    pub fn add(&mut self, key: &str, item: &[u8]) -> bool {
        if let Some(buffer) = self.buffers.get(key) {
            if !self.fits(buffer, item.len()) {
                return false;
            }
        } else if !self.fits(&Buffer::default(), item.len()) {
            return false;
        }

        let buffer = self.buffers.entry_ref(key).or_default();
        if buffer.items.is_empty() {
            buffer.first_add = Some(Instant::now());
        }
        buffer.size += item.len();
        buffer.items.push(item.to_vec());
        true
    }

    fn fits(&self, buffer: &Buffer, len: usize) -> bool {
        if self.max_count > 0 && buffer.items.len() + 1 > self.max_count {
            return false;
        }

        if self.max_size > 0 && buffer.size + len > self.max_size {
            return false;
        }

        if let (Some(max), Some(first)) = (self.max_duration, buffer.first_add) {
            if !buffer.items.is_empty() && first.elapsed() > max {
                return false;
            }
        }

        true
    }

    pub fn get(&self, key: &str) -> &[Vec<u8>] {
        self.buffers
            .get(key)
            .map(|b| b.items.as_slice())
            .unwrap_or_default()
    }

    pub fn count(&self, key: &str) -> usize {
        self.buffers.get(key).map_or(0, |b| b.items.len())
    }

    pub fn size(&self, key: &str) -> usize {
        self.buffers.get(key).map_or(0, |b| b.size)
    }

    pub fn reset(&mut self, key: &str) {
        self.buffers.remove(key);
    }

    /// Non-empty buffers in no particular order.
    pub fn get_all(&self) -> impl Iterator<Item = (&str, &[Vec<u8>])> {
        self.buffers
            .iter()
            .filter(|(_, b)| !b.items.is_empty())
            .map(|(k, b)| (k.as_str(), b.items.as_slice()))
    }

    /// Snapshot of keys with buffered items, for draining while mutating.
    pub fn keys(&self) -> Vec<String> {
        self.get_all().map(|(k, _)| k.to_string()).collect()
    }

    pub fn reset_all(&mut self) {
        self.buffers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.values().all(|b| b.items.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(count: usize, size: usize, duration: Option<Duration>) -> Batch {
        Batch {
            count,
            size,
            duration,
        }
    }

    #[test]
    fn test_add_respects_count() {
        let mut agg = Aggregator::new(&limits(2, 0, None));
        assert!(agg.add("", b"a"));
        assert!(agg.add("", b"b"));
        assert!(!agg.add("", b"c"));
        assert_eq!(agg.get(""), &[b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_add_respects_size() {
        let mut agg = Aggregator::new(&limits(0, 5, None));
        assert!(agg.add("k", b"abc"));
        assert!(!agg.add("k", b"abc"));
        assert!(agg.add("k", b"ab"));
        assert_eq!(agg.size("k"), 5);
        assert_eq!(agg.count("k"), 2);
    }

    #[test]
    fn test_oversized_item_never_creates_entry() {
        let mut agg = Aggregator::new(&limits(0, 2, None));
        assert!(!agg.add("k", b"abc"));
        assert_eq!(agg.count("k"), 0);
        assert!(agg.keys().is_empty());
        assert!(agg.is_empty());
    }

    #[test]
    fn test_add_respects_duration() {
        let mut agg = Aggregator::new(&limits(0, 0, Some(Duration::from_millis(10))));
        assert!(agg.add("k", b"a"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!agg.add("k", b"b"));

        agg.reset("k");
        assert!(agg.add("k", b"b"));
        assert_eq!(agg.get("k"), &[b"b".to_vec()]);
    }

    #[test]
    fn test_unbounded_limits() {
        let mut agg = Aggregator::new(&Batch::default());
        for i in 0..10_000 {
            assert!(agg.add("", &vec![0; i % 64]));
        }
        assert_eq!(agg.count(""), 10_000);
    }

    #[test]
    fn test_get_does_not_mutate() {
        let mut agg = Aggregator::new(&limits(10, 0, None));
        agg.add("k", b"a");
        assert_eq!(agg.get("k").len(), 1);
        assert_eq!(agg.get("k").len(), 1);
        assert!(agg.get("missing").is_empty());
    }

    #[test]
    fn test_reset_isolation() {
        let mut agg = Aggregator::new(&limits(10, 0, None));
        agg.add("a", b"1");
        agg.add("b", b"2");
        agg.add("b", b"3");

        agg.reset("a");

        assert_eq!(agg.count("a"), 0);
        assert_eq!(agg.count("b"), 2);
        assert_eq!(agg.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn test_get_all_and_reset_all() {
        let mut agg = Aggregator::new(&limits(10, 0, None));
        agg.add("a", b"1");
        agg.add("b", b"2");

        let mut seen: Vec<(String, usize)> = agg
            .get_all()
            .map(|(k, items)| (k.to_string(), items.len()))
            .collect();
        seen.sort();
        assert_eq!(seen, vec![("a".to_string(), 1), ("b".to_string(), 1)]);

        agg.reset_all();
        assert!(agg.is_empty());
        assert_eq!(agg.get_all().count(), 0);
    }

    #[test]
    fn test_items_keep_arrival_order() {
        let mut agg = Aggregator::new(&limits(0, 0, None));
        for item in ["first", "second", "third"] {
            agg.add("k", item.as_bytes());
        }
        assert_eq!(
            agg.get("k"),
            &[
                b"first".to_vec(),
                b"second".to_vec(),
                b"third".to_vec()
            ]
        );
    }
}
