//! Serde model of the telemetry record wire schema.
//!
//! One record is a JSON object keyed `"TrackerData"` whose payload carries a
//! sequence number, a device timestamp, wrapped target poses and wrapped raw
//! data points. Field names mirror the device schema exactly; the structs
//! exist so records round-trip even for fields the pose model ignores (uuid,
//! point cloud).

use serde::{Deserialize, Serialize};

use crate::pose::{position_from_row_major, rotation_from_row_major, TargetPose, TrackingFrame};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct TrackerDataEnvelope {
    #[serde(rename = "TrackerData")]
    pub tracker_data: TrackerData,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct TrackerData {
    pub seqnumber: i32,
    pub timestamp: f64,
    #[serde(rename = "targetPoses", default)]
    pub target_poses: Vec<TargetPoseEntry>,
    #[serde(default)]
    pub points: Vec<PointEntry>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct TargetPoseEntry {
    #[serde(rename = "targetPose")]
    pub target_pose: WireTargetPose,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct WireTargetPose {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uuid: String,
    /// Row-major 4x4 transform; a record with the wrong element count fails
    /// deserialization and is skipped as malformed.
    #[serde(rename = "transformationMatrix")]
    pub transformation_matrix: [f32; 16],
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct PointEntry {
    #[serde(rename = "dataPoint")]
    pub data_point: WirePoint,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct WirePoint {
    pub id: i32,
    pub position: WirePosition,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct WirePosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl TrackerDataEnvelope {
    /// Collapse the wire nesting into the public frame model, extracting
    /// position and rotation from each pose's packed matrix.
    pub fn into_frame(self) -> TrackingFrame {
        let data = self.tracker_data;
        let target_poses = data
            .target_poses
            .into_iter()
            .map(|entry| {
                let pose = entry.target_pose;
                TargetPose {
                    id: pose.id,
                    name: pose.name,
                    position: position_from_row_major(&pose.transformation_matrix),
                    rotation: rotation_from_row_major(&pose.transformation_matrix),
                }
            })
            .collect();
        TrackingFrame {
            sequence_number: data.seqnumber,
            timestamp: data.timestamp,
            target_poses,
        }
    }
}
