use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub type TimerId = u64;

struct Scheduled<T> {
    due: f64,
    id: TimerId,
    payload: T,
}

impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Scheduled<T> {}

impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Scheduled<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Deferred actions keyed on the session clock. Nothing fires by itself;
/// the owner polls [`TimerQueue::pop_due`] from its tick.
pub struct TimerQueue<T> {
    heap: BinaryHeap<Scheduled<T>>,
    next_id: TimerId,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_id: 0,
        }
    }

    pub fn schedule(&mut self, due: f64, payload: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Scheduled { due, id, payload });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.heap.len();
        self.heap.retain(|s| s.id != id);
        self.heap.len() != before
    }

    /// Cancels every timer whose payload matches.
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&T) -> bool) {
        self.heap.retain(|s| !predicate(&s.payload));
    }

    /// Removes and returns everything due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: f64) -> Vec<T> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|s| s.due <= now) {
            if let Some(entry) = self.heap.pop() {
                due.push(entry.payload);
            }
        }
        due
    }

    pub fn next_due(&self) -> Option<f64> {
        self.heap.peek().map(|s| s.due)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
