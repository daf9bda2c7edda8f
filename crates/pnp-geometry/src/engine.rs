//! Pose Transform Engine.
//!
//! Derives approach, retreat and placement poses from an object pose with a
//! single signed vertical offset and an optional half-turn about the local X
//! axis.  The composition order is fixed:
//!
//! ```text
//! target = object ∘ translate(0, 0, offset_z) ∘ (flip ? rotate(π about X) : identity)
//! ```
//!
//! so the flip happens in the frame that has already been lifted, not at the
//! object's own origin.

use std::f64::consts::PI;

use nalgebra::UnitQuaternion;

use crate::pose::{Pose, rotation_rpy, translation};

/// Lift above a graspable part before descending onto it (gripper flipped to
/// face the part).
pub const GRASP_APPROACH_OFFSET: f64 = 0.06;

/// Offset to a placement plate; negative because the plate's Z axis points
/// down into the fixture.
pub const PLACE_APPROACH_OFFSET: f64 = -0.2;

/// Pose `offset_z` along the object's own Z axis, optionally flipped about
/// the lifted frame's X axis so the tool faces back towards the object.
pub fn compute_above_pose(object_pose: &Pose, offset_z: f64, flip: bool) -> Pose {
    let mut target = object_pose.to_isometry() * translation(0.0, 0.0, offset_z);
    if flip {
        target *= rotation_rpy(PI, 0.0, 0.0);
    }
    Pose::from_isometry(object_pose.frame_id.clone(), &target)
}

/// Placement pose: the above-pose composition without the flip, typically
/// with a negative offset.
pub fn compute_place_pose(object_pose: &Pose, offset_z: f64) -> Pose {
    compute_above_pose(object_pose, offset_z, false)
}

/// Move `pose` vertically in its reference frame so that its height becomes
/// `target_z`.  Orientation and x/y are untouched.
pub fn with_height(pose: &Pose, target_z: f64) -> Pose {
    let lifted = translation(0.0, 0.0, target_z - pose.position.z) * pose.to_isometry();
    Pose::from_isometry(pose.frame_id.clone(), &lifted)
}

/// Keep only the yaw of `pose`, zeroing roll and pitch so the result rests
/// flat in its reference frame.
pub fn level(pose: &Pose) -> Pose {
    let (_, _, yaw) = pose.rpy();
    Pose::new(
        pose.frame_id.clone(),
        pose.position,
        UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
    )
}
