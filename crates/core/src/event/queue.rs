use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct PendingEvent<T> {
    pub sequence: u32,
    pub event: T,
}

/// Bounded FIFO of events waiting for the embedding layer to drain them.
/// When full, the oldest event is discarded.
#[derive(Debug)]
pub struct EventQueue<T> {
    pending: VecDeque<PendingEvent<T>>,
    next_sequence: u32,
    max_pending: usize,
    dropped: u64,
}

impl<T> EventQueue<T> {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_pending.min(256)),
            next_sequence: 0,
            max_pending: max_pending.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: T) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        if self.pending.len() >= self.max_pending {
            self.pending.pop_front();
            self.dropped += 1;
            log::debug!("event queue full, dropped oldest event");
        }

        self.pending.push_back(PendingEvent { sequence, event });
        sequence
    }

    pub fn drain(&mut self) -> Vec<T> {
        self.pending.drain(..).map(|p| p.event).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.pending.iter().map(|p| &p.event)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_order() {
        let mut queue = EventQueue::new(8);
        queue.push("a");
        queue.push("b");
        queue.push("c");

        assert_eq!(queue.drain(), vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_drops_oldest() {
        let mut queue = EventQueue::new(2);
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.drain(), vec![2, 3]);
    }

    #[test]
    fn sequences_keep_counting_after_drain() {
        let mut queue = EventQueue::new(4);
        assert_eq!(queue.push(()), 0);
        queue.drain();
        assert_eq!(queue.push(()), 1);
    }
}
