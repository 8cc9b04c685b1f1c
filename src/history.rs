//! Bounded frame history.

use std::collections::VecDeque;

use crate::pose::TrackingFrame;

/// Fixed-capacity, insertion-ordered buffer of the most recent frames.
///
/// Overflow evicts the oldest frame, never the newest. Capacity is fixed at
/// construction; a requested capacity of zero is raised to one so the newest
/// frame is always retained.
#[derive(Debug)]
pub struct HistoryRing {
    frames: VecDeque<TrackingFrame>,
    capacity: usize,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest if the ring is full. O(1).
    pub fn push_back(&mut self, frame: TrackingFrame) {
        while self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Oldest-to-newest traversal.
    pub fn iter(&self) -> impl Iterator<Item = &TrackingFrame> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: i32) -> TrackingFrame {
        TrackingFrame {
            sequence_number: seq,
            timestamp: seq as f64 * 0.1,
            target_poses: Vec::new(),
        }
    }

    #[test]
    fn keeps_newest_frames_on_overflow() {
        let mut ring = HistoryRing::new(3);
        for seq in 0..5 {
            ring.push_back(frame(seq));
        }

        assert_eq!(ring.len(), 3);
        let sequences: Vec<i32> = ring.iter().map(|f| f.sequence_number).collect();
        assert_eq!(sequences, vec![2, 3, 4]);
    }

    #[test]
    fn insertion_order_is_preserved_below_capacity() {
        let mut ring = HistoryRing::new(10);
        ring.push_back(frame(1));
        ring.push_back(frame(2));

        assert_eq!(ring.len(), 2);
        let sequences: Vec<i32> = ring.iter().map(|f| f.sequence_number).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut ring = HistoryRing::new(0);
        ring.push_back(frame(1));
        ring.push_back(frame(2));

        assert_eq!(ring.len(), 1);
        assert_eq!(ring.iter().next().map(|f| f.sequence_number), Some(2));
    }
}
