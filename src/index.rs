//! Latest pose per target.
//!
//! Two maps: target id to its most recently observed pose, and target name
//! to id for name lookups. The name map is insert-if-absent only: the name
//! recorded for an id is the one seen on its first observation, and a name
//! reused by a later id keeps pointing at the first id. Name lookups are
//! first-observation-wins by contract; only the id map tracks renames.

use std::collections::HashMap;

use crate::pose::{TargetPose, TrackingFrame};

/// Initial capacity hint; typical setups track well under ten targets.
const TARGET_CAPACITY_HINT: usize = 10;

#[derive(Debug, Default)]
pub struct LatestPoseIndex {
    latest_poses: HashMap<i32, TargetPose>,
    name_to_id: HashMap<String, i32>,
}

impl LatestPoseIndex {
    pub fn new() -> Self {
        Self {
            latest_poses: HashMap::with_capacity(TARGET_CAPACITY_HINT),
            name_to_id: HashMap::with_capacity(TARGET_CAPACITY_HINT),
        }
    }

    /// Fold one frame into the index, in the frame's own target order.
    ///
    /// A first-seen id inserts both mappings; a known id refreshes only its
    /// pose. When one frame carries several poses for the same id the last
    /// one wins.
    pub fn update(&mut self, frame: &TrackingFrame) {
        for pose in &frame.target_poses {
            if !self.latest_poses.contains_key(&pose.id) {
                self.name_to_id.entry(pose.name.clone()).or_insert(pose.id);
            }
            self.latest_poses.insert(pose.id, pose.clone());
        }
    }

    /// Latest pose for an exact target name.
    ///
    /// Unknown names return the default sentinel pose, not an error.
    pub fn pose_by_name(&self, name: &str) -> TargetPose {
        match self.name_to_id.get(name) {
            Some(id) => self.pose_by_id(*id),
            None => TargetPose::default(),
        }
    }

    /// Latest pose for a target id.
    ///
    /// Unknown ids return the default sentinel pose, not an error.
    pub fn pose_by_id(&self, id: i32) -> TargetPose {
        self.latest_poses.get(&id).cloned().unwrap_or_default()
    }

    /// `"name (id)"` per known target, for diagnostics. Order unspecified.
    pub fn tracked_targets(&self) -> Vec<String> {
        self.name_to_id
            .iter()
            .map(|(name, id)| format!("{} ({})", name, id))
            .collect()
    }
}
