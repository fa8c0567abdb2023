//! In-memory priority queue with a pluggable comparator.

use std::cmp::Ordering;
use std::fmt;

/// Items that carry their own scheduling priority.
pub trait Prioritized {
    /// Priority used for ordering; larger runs first.
    fn priority(&self) -> i32;
}

/// Ordering strategy for a [`PriorityQueue`].
///
/// `Ordering::Greater` means the first item should leave the queue before the second.
pub trait Comparator<T> {
    /// Compare two queued items.
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

impl<T, F> Comparator<T> for F
where
    F: Fn(&T, &T) -> Ordering,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

/// Default comparator: higher [`Prioritized::priority`] first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByPriority;

impl<T: Prioritized> Comparator<T> for ByPriority {
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.priority().cmp(&b.priority())
    }
}

/// Heap slot; `seq` breaks ties so equal items leave in insertion order.
struct Entry<T> {
    seq: u64,
    item: T,
}

/// Binary max-heap ordered by a comparator, FIFO among equal items.
///
/// This provides O(log n) insert and O(log n) extraction. Extraction on an
/// empty queue yields `None`.
pub struct PriorityQueue<T, C = ByPriority> {
    entries: Vec<Entry<T>>,
    comparator: C,
    next_seq: u64,
}

impl<T: Prioritized> PriorityQueue<T> {
    /// Create an empty queue ordered by item priority.
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(ByPriority)
    }
}

impl<T: Prioritized> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C: Comparator<T>> PriorityQueue<T, C> {
    /// Create an empty queue using a custom comparator.
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            entries: Vec::new(),
            comparator,
            next_seq: 0,
        }
    }

    /// Insert an item and return the new queue length.
    pub fn insert(&mut self, item: T) -> usize {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.entries.push(Entry { seq, item });
        self.sift_up(self.entries.len() - 1);
        self.entries.len()
    }

    /// Borrow the item that would be extracted next.
    pub fn peek_highest(&self) -> Option<&T> {
        self.entries.first().map(|e| &e.item)
    }

    /// Remove and return the highest-ranked item.
    pub fn extract_highest(&mut self) -> Option<T> {
        if self.entries.is_empty() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.entries.swap(0, last);
        let top = self.entries.pop()?;
        if !self.entries.is_empty() {
            self.sift_down(0);
        }
        Some(top.item)
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every queued item.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove every item, highest-ranked first.
    pub fn drain_ordered(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.entries.len());
        while let Some(item) = self.extract_highest() {
            out.push(item);
        }
        out
    }

    fn outranks(&self, i: usize, j: usize) -> bool {
        let (a, b) = (&self.entries[i], &self.entries[j]);
        match self.comparator.compare(&a.item, &b.item) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => a.seq < b.seq,
        }
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.outranks(idx, parent) {
                break;
            }
            self.entries.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * idx + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let best = if right < len && self.outranks(right, left) {
                right
            } else {
                left
            };
            if !self.outranks(best, idx) {
                break;
            }
            self.entries.swap(idx, best);
            idx = best;
        }
    }
}

impl<T, C> fmt::Debug for PriorityQueue<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}
