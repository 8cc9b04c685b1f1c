//! Pose model and transform math.
//!
//! Tracker transforms arrive as 16-float row-major matrices in the device's
//! left-handed coordinate frame. This module extracts position and rotation
//! from that packing, converts between handedness conventions, and validates
//! reference transforms before they are sent back to the device.
//!
//! The cache stores poses in the raw device frame; handedness conversion is
//! applied once at the query boundary, never inside the ingestion path.

use glam::{Mat3, Mat4, Quat, Vec3, Vec4};

/// Tolerance for TRS structure checks on reference transforms.
const TRS_EPSILON: f32 = 1e-5;

// ----------------------------------------------------------------------------
// Public pose types
// ----------------------------------------------------------------------------

/// One tracked object's spatial state at a point in time.
///
/// `position` and `rotation` are in the device's left-handed frame; convert
/// with [`TargetPose::to_right_handed`] when handing poses to a right-handed
/// consumer. The two fields describe one transform and must always be
/// converted together.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetPose {
    /// Stable device-assigned identifier for the physical target.
    pub id: i32,
    /// Human-readable label reported with the target.
    pub name: String,
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for TargetPose {
    /// The lookup-miss sentinel: id 0, empty name, origin, identity rotation.
    ///
    /// A target legitimately reported at the origin with identity rotation is
    /// indistinguishable from this sentinel; callers that need the
    /// distinction should consult `tracked_targets` first.
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl TargetPose {
    /// Convert from the device's left-handed frame to a right-handed frame.
    ///
    /// Negates the Z position component together with the X and Y quaternion
    /// components; the pair must flip together or the pose mirrors
    /// incorrectly. Applying the conversion twice restores the original.
    pub fn to_right_handed(&self) -> TargetPose {
        TargetPose {
            id: self.id,
            name: self.name.clone(),
            position: flip_handedness_position(self.position),
            rotation: flip_handedness_rotation(self.rotation),
        }
    }
}

/// One timestamped device sample containing every visible target's pose.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackingFrame {
    /// Device-assigned sequence number; monotonic within a session but may
    /// wrap or reset on reconnect.
    pub sequence_number: i32,
    /// Device clock in seconds, not synchronized with the local wall clock.
    pub timestamp: f64,
    pub target_poses: Vec<TargetPose>,
}

// ----------------------------------------------------------------------------
// Handedness conversion
// ----------------------------------------------------------------------------

/// Negate the Z axis of a position. Involution.
pub fn flip_handedness_position(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.y, -v.z)
}

/// Negate the X and Y imaginary components of a rotation. Involution, and
/// only valid when paired with [`flip_handedness_position`].
pub fn flip_handedness_rotation(q: Quat) -> Quat {
    Quat::from_xyzw(-q.x, -q.y, q.z, q.w)
}

// ----------------------------------------------------------------------------
// Row-major matrix packing
// ----------------------------------------------------------------------------

/// Interpret 16 floats as a row-major 4x4 matrix.
///
/// `Mat4::from_cols_array` reads column-major, so the transpose recovers the
/// row-major layout the device serializes.
pub fn mat4_from_row_major(values: &[f32; 16]) -> Mat4 {
    Mat4::from_cols_array(values).transpose()
}

/// Serialize a matrix in the device's row-major order.
pub fn mat4_to_row_major(matrix: &Mat4) -> [f32; 16] {
    matrix.transpose().to_cols_array()
}

/// Translation column of a row-major packed transform: elements 3, 7, 11.
pub fn position_from_row_major(values: &[f32; 16]) -> Vec3 {
    Vec3::new(values[3], values[7], values[11])
}

/// Orientation of a row-major packed transform.
///
/// The third column of the rotation submatrix is the target's forward axis,
/// the second its up axis; the quaternion is rebuilt from that basis.
pub fn rotation_from_row_major(values: &[f32; 16]) -> Quat {
    let forward = Vec3::new(values[2], values[6], values[10]);
    let up = Vec3::new(values[1], values[5], values[9]);
    look_rotation(forward, up)
}

/// Quaternion whose Z axis aligns with `forward` and whose Y axis stays as
/// close to `up` as orthogonality allows.
///
/// Degenerate input (zero-length forward, or up parallel to forward) yields
/// the identity rotation rather than a NaN quaternion.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    if forward.length_squared() <= f32::EPSILON {
        return Quat::IDENTITY;
    }
    let z = forward.normalize();
    let x = up.cross(z);
    if x.length_squared() <= f32::EPSILON {
        return Quat::IDENTITY;
    }
    let x = x.normalize();
    let y = z.cross(x);
    Quat::from_mat3(&Mat3::from_cols(x, y, z))
}

/// Translation column of a transform.
pub fn mat4_position(matrix: &Mat4) -> Vec3 {
    matrix.w_axis.truncate()
}

/// Orientation of a transform, rebuilt from its forward (Z) and up (Y) basis
/// columns the same way [`rotation_from_row_major`] does for packed arrays.
pub fn mat4_rotation(matrix: &Mat4) -> Quat {
    look_rotation(matrix.z_axis.truncate(), matrix.y_axis.truncate())
}

/// Check that a matrix is a well-formed translation/rotation/scale transform:
/// finite, affine bottom row, invertible upper 3x3.
pub fn is_valid_trs(matrix: &Mat4) -> bool {
    if !matrix.is_finite() {
        return false;
    }
    if !matrix.row(3).abs_diff_eq(Vec4::W, TRS_EPSILON) {
        return false;
    }
    Mat3::from_mat4(*matrix).determinant().abs() > TRS_EPSILON
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
