//! Stable min-priority queue.
//!
//! Entries are ordered by `(priority, insertion sequence)`, so equal
//! priorities pop in FIFO order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

#[derive(Debug)]
struct Entry<K, T> {
    priority: K,
    seq: u64,
    item: T,
}

impl<K: Ord, T> PartialEq for Entry<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord, T> Eq for Entry<K, T> {}

impl<K: Ord, T> PartialOrd for Entry<K, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, T> Ord for Entry<K, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Min-heap keyed by `K` with insertion-order tie-breaking.
///
/// # Examples
///
/// ```
/// use deferrable_sim::scheduling::queue::StableQueue;
///
/// let mut q = StableQueue::new();
/// q.push(2, "late");
/// q.push(1, "first");
/// q.push(1, "second");
/// assert_eq!(q.pop(), Some((1, "first")));
/// assert_eq!(q.pop(), Some((1, "second")));
/// assert_eq!(q.pop(), Some((2, "late")));
/// ```
#[derive(Debug)]
pub struct StableQueue<K, T> {
    heap: BinaryHeap<Reverse<Entry<K, T>>>,
    next_seq: u64,
}

impl<K: Ord, T> StableQueue<K, T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, priority: K, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry {
            priority,
            seq,
            item,
        }));
    }

    /// Re-inserts an item while keeping its place among equal priorities.
    ///
    /// Used when an item is popped and then found not ready; a fresh
    /// sequence number would push it behind later arrivals.
    fn push_with_seq(&mut self, priority: K, seq: u64, item: T) {
        self.heap.push(Reverse(Entry {
            priority,
            seq,
            item,
        }));
    }

    pub fn pop(&mut self) -> Option<(K, T)> {
        self.heap.pop().map(|Reverse(e)| (e.priority, e.item))
    }

    pub fn peek(&self) -> Option<(&K, &T)> {
        self.heap.peek().map(|Reverse(e)| (&e.priority, &e.item))
    }

    /// Removes every item for which `ready` holds, in priority order.
    /// Items that are not ready stay queued with their original order.
    pub fn drain_where(&mut self, mut ready: impl FnMut(&K, &T) -> bool) -> Vec<T> {
        let mut taken = Vec::new();
        let mut kept = Vec::new();
        while let Some(Reverse(e)) = self.heap.pop() {
            if ready(&e.priority, &e.item) {
                taken.push(e.item);
            } else {
                kept.push(e);
            }
        }
        for e in kept {
            self.push_with_seq(e.priority, e.seq, e.item);
        }
        taken
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<K: Ord, T> Default for StableQueue<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
