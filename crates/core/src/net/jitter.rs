use std::cmp::Ordering;
use std::collections::VecDeque;

use super::protocol::{sequence_greater_than, WireStatePacket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queued after evicting the oldest buffered packet.
    Evicted { sequence: u32 },
    /// Sequence at or below the last applied one; dropped.
    Stale,
}

#[derive(Debug, Default)]
pub struct Drained {
    pub packets: Vec<WireStatePacket>,
    pub aged_out: usize,
    pub stale: usize,
}

/// Per-object reorder buffer.
///
/// Packets are accepted in any order and released sorted by sequence. Nothing
/// at or below the last released sequence ever leaves the buffer.
#[derive(Debug)]
pub struct JitterBuffer {
    entries: VecDeque<WireStatePacket>,
    max_size: usize,
    max_age: f64,
    last_applied: Option<u32>,
}

impl JitterBuffer {
    pub fn new(max_size: usize, max_age: f64) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size),
            max_size: max_size.max(1),
            max_age,
            last_applied: None,
        }
    }

    pub fn enqueue(&mut self, packet: WireStatePacket) -> EnqueueOutcome {
        if self.is_stale(packet.sequence) {
            return EnqueueOutcome::Stale;
        }

        let mut outcome = EnqueueOutcome::Queued;
        while self.entries.len() >= self.max_size {
            if let Some(evicted) = self.entries.pop_front() {
                outcome = EnqueueOutcome::Evicted {
                    sequence: evicted.sequence,
                };
            }
        }

        self.entries.push_back(packet);
        outcome
    }

    /// Removes everything buffered and returns the applicable packets in
    /// ascending sequence order. `now` is on the same clock as packet
    /// timestamps.
    pub fn drain_in_order(&mut self, now: f64) -> Drained {
        let mut drained = Drained::default();
        if self.entries.is_empty() {
            return drained;
        }

        let mut candidates: Vec<WireStatePacket> = Vec::with_capacity(self.entries.len());
        for packet in self.entries.drain(..) {
            if now - packet.timestamp > self.max_age {
                drained.aged_out += 1;
            } else {
                candidates.push(packet);
            }
        }

        candidates.sort_by(|a, b| compare_sequence(a.sequence, b.sequence));

        for packet in candidates {
            if self.is_stale(packet.sequence) {
                drained.stale += 1;
                continue;
            }
            self.last_applied = Some(packet.sequence);
            drained.packets.push(packet);
        }

        drained
    }

    pub fn last_applied(&self) -> Option<u32> {
        self.last_applied
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops buffered packets but keeps the applied watermark, so packets
    /// from before the clear stay rejected.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.last_applied = None;
    }

    fn is_stale(&self, sequence: u32) -> bool {
        self.last_applied
            .is_some_and(|last| !sequence_greater_than(sequence, last))
    }
}

fn compare_sequence(a: u32, b: u32) -> Ordering {
    if a == b {
        Ordering::Equal
    } else if sequence_greater_than(a, b) {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(sequence: u32, timestamp: f64) -> WireStatePacket {
        WireStatePacket::new(0, sequence, timestamp)
    }

    fn sequences(drained: &Drained) -> Vec<u32> {
        drained.packets.iter().map(|p| p.sequence).collect()
    }

    #[test]
    fn releases_in_sequence_order() {
        let mut buffer = JitterBuffer::new(32, 1.0);
        for seq in [5, 2, 9, 3, 7] {
            buffer.enqueue(packet(seq, 10.0));
        }

        let drained = buffer.drain_in_order(10.1);
        assert_eq!(sequences(&drained), vec![2, 3, 5, 7, 9]);
        assert_eq!(buffer.last_applied(), Some(9));
        assert!(buffer.is_empty());
    }

    #[test]
    fn rejects_stale_and_duplicates() {
        let mut buffer = JitterBuffer::new(32, 1.0);
        buffer.enqueue(packet(4, 0.0));
        buffer.drain_in_order(0.0);

        assert_eq!(buffer.enqueue(packet(4, 0.0)), EnqueueOutcome::Stale);
        assert_eq!(buffer.enqueue(packet(1, 0.0)), EnqueueOutcome::Stale);
        assert_eq!(buffer.enqueue(packet(6, 0.0)), EnqueueOutcome::Queued);
        buffer.enqueue(packet(6, 0.0));

        let drained = buffer.drain_in_order(0.0);
        assert_eq!(sequences(&drained), vec![6]);
        assert_eq!(drained.stale, 1);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = JitterBuffer::new(3, 1.0);
        buffer.enqueue(packet(10, 0.0));
        buffer.enqueue(packet(11, 0.0));
        buffer.enqueue(packet(12, 0.0));

        assert_eq!(
            buffer.enqueue(packet(13, 0.0)),
            EnqueueOutcome::Evicted { sequence: 10 }
        );
        assert_eq!(buffer.len(), 3);
        assert_eq!(sequences(&buffer.drain_in_order(0.0)), vec![11, 12, 13]);
    }

    #[test]
    fn ages_out_old_packets() {
        let mut buffer = JitterBuffer::new(32, 1.0);
        buffer.enqueue(packet(1, 0.0));
        buffer.enqueue(packet(2, 1.8));

        let drained = buffer.drain_in_order(2.0);
        assert_eq!(sequences(&drained), vec![2]);
        assert_eq!(drained.aged_out, 1);
    }

    #[test]
    fn orders_across_wraparound() {
        let mut buffer = JitterBuffer::new(32, 1.0);
        buffer.enqueue(packet(1, 0.0));
        buffer.enqueue(packet(u32::MAX, 0.0));
        buffer.enqueue(packet(0, 0.0));

        let drained = buffer.drain_in_order(0.0);
        assert_eq!(sequences(&drained), vec![u32::MAX, 0, 1]);
    }

    #[test]
    fn any_arrival_order_yields_increasing_application() {
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut rng = StdRng::seed_from_u64(7);
        let mut buffer = JitterBuffer::new(64, 10.0);
        let mut applied = Vec::new();
        let mut expected = Vec::new();

        let mut all: Vec<u32> = (1..=40).collect();
        all.extend([3, 17, 17, 25]);
        all.shuffle(&mut rng);

        for chunk in all.chunks(6) {
            for &seq in chunk {
                let watermark = buffer.last_applied();
                let fresh = watermark.is_none_or(|last| sequence_greater_than(seq, last));
                if buffer.enqueue(packet(seq, 0.0)) != EnqueueOutcome::Stale && fresh {
                    expected.push(seq);
                }
            }
            applied.extend(sequences(&buffer.drain_in_order(0.0)));
        }

        assert!(applied.windows(2).all(|w| w[0] < w[1]));
        expected.sort_unstable();
        expected.dedup();
        assert_eq!(applied, expected);
    }
}
