//! Combined tracking state: history ring plus latest-pose index.
//!
//! `TrackingCache` itself is single-threaded; the stream pump shares it
//! behind one mutex so every frame of a chunk applies in order and readers
//! never observe a half-applied frame.

use crate::history::HistoryRing;
use crate::index::LatestPoseIndex;
use crate::pose::{TargetPose, TrackingFrame};

#[derive(Debug)]
pub struct TrackingCache {
    history: HistoryRing,
    index: LatestPoseIndex,
}

impl TrackingCache {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            history: HistoryRing::new(history_capacity),
            index: LatestPoseIndex::new(),
        }
    }

    /// Apply one decoded frame: refresh the index, then retire the frame
    /// into the history ring.
    pub fn apply(&mut self, frame: TrackingFrame) {
        self.index.update(&frame);
        self.history.push_back(frame);
    }

    pub fn pose_by_name(&self, name: &str) -> TargetPose {
        self.index.pose_by_name(name)
    }

    pub fn pose_by_id(&self, id: i32) -> TargetPose {
        self.index.pose_by_id(id)
    }

    pub fn tracked_targets(&self) -> Vec<String> {
        self.index.tracked_targets()
    }

    pub fn history(&self) -> &HistoryRing {
        &self.history
    }
}
