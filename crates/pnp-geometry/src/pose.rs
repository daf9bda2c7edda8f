//! Stamped rigid-body poses.
//!
//! A [`Pose`] is a position plus a unit-quaternion orientation expressed in a
//! named reference frame.  Composition happens on [`Transform`]
//! (`nalgebra::Isometry3<f64>`), which is non-commutative: `a * b` applies `b`
//! in the frame already moved by `a`.
//!
//! # Example
//!
//! ```rust
//! use pnp_geometry::pose::{Pose, translation};
//!
//! let cup = Pose::from_xyz_rpy("base_link", 0.4, 0.1, 0.0, 0.0, 0.0, 0.0);
//! let above = Pose::from_isometry("base_link", &(cup.to_isometry() * translation(0.0, 0.0, 0.2)));
//! assert!((above.position.z - 0.2).abs() < 1e-12);
//! ```

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid rotation + translation.  Composable with `*`, order-dependent.
pub type Transform = Isometry3<f64>;

/// A pure translation.
pub fn translation(x: f64, y: f64, z: f64) -> Transform {
    Isometry3::translation(x, y, z)
}

/// A pure rotation from fixed-axis roll, pitch, yaw (radians).
pub fn rotation_rpy(roll: f64, pitch: f64, yaw: f64) -> Transform {
    Isometry3::from_parts(
        Translation3::identity(),
        UnitQuaternion::from_euler_angles(roll, pitch, yaw),
    )
}

/// Position + orientation in a named reference frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub frame_id: String,
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(
        frame_id: impl Into<String>,
        position: Vector3<f64>,
        orientation: UnitQuaternion<f64>,
    ) -> Self {
        Self {
            frame_id: frame_id.into(),
            position,
            orientation,
        }
    }

    /// The frame origin itself.
    pub fn identity(frame_id: impl Into<String>) -> Self {
        Self::new(frame_id, Vector3::zeros(), UnitQuaternion::identity())
    }

    /// Build a pose from a position and fixed-axis roll/pitch/yaw angles.
    pub fn from_xyz_rpy(
        frame_id: impl Into<String>,
        x: f64,
        y: f64,
        z: f64,
        roll: f64,
        pitch: f64,
        yaw: f64,
    ) -> Self {
        Self::new(
            frame_id,
            Vector3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        )
    }

    /// Wrap a composed transform back into a pose in `frame_id`.
    pub fn from_isometry(frame_id: impl Into<String>, iso: &Transform) -> Self {
        Self::new(frame_id, iso.translation.vector, iso.rotation)
    }

    pub fn to_isometry(&self) -> Transform {
        Isometry3::from_parts(Translation3::from(self.position), self.orientation)
    }

    /// Roll, pitch and yaw of the orientation (radians).
    pub fn rpy(&self) -> (f64, f64, f64) {
        self.orientation.euler_angles()
    }

    /// Same frame, positions within `tolerance` metres and orientations
    /// within `tolerance` radians of each other.
    ///
    /// `q` and `-q` describe the same rotation and compare equal here, unlike
    /// the derived `PartialEq` which compares raw components.
    pub fn approx_eq(&self, other: &Pose, tolerance: f64) -> bool {
        self.frame_id == other.frame_id
            && (self.position - other.position).norm() <= tolerance
            && self.orientation.angle_to(&other.orientation) <= tolerance
    }
}

impl std::fmt::Display for Pose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (roll, pitch, yaw) = self.rpy();
        write!(
            f,
            "[{}] pos=({:.3}, {:.3}, {:.3}) rpy=({:.3}, {:.3}, {:.3})",
            self.frame_id,
            self.position.x,
            self.position.y,
            self.position.z,
            roll,
            pitch,
            yaw
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn isometry_roundtrip_preserves_pose() {
        let pose = Pose::from_xyz_rpy("base_link", 0.3, -0.2, 0.5, 0.1, 0.2, 0.3);
        let back = Pose::from_isometry("base_link", &pose.to_isometry());
        assert!(pose.approx_eq(&back, 1e-12));
    }

    #[test]
    fn rpy_recovers_construction_angles() {
        let pose = Pose::from_xyz_rpy("base_link", 0.0, 0.0, 0.0, 0.1, -0.2, 1.2);
        let (roll, pitch, yaw) = pose.rpy();
        assert!((roll - 0.1).abs() < 1e-9);
        assert!((pitch + 0.2).abs() < 1e-9);
        assert!((yaw - 1.2).abs() < 1e-9);
    }

    #[test]
    fn composition_is_order_dependent() {
        let t = translation(0.0, 0.0, 1.0);
        let r = rotation_rpy(FRAC_PI_2, 0.0, 0.0);
        let translate_then_rotate = t * r;
        let rotate_then_translate = r * t;
        // Rotating about X after the lift keeps the origin at z = 1; lifting
        // in the rotated frame moves it along the old -Y axis.
        assert!((translate_then_rotate.translation.vector.z - 1.0).abs() < 1e-12);
        assert!((rotate_then_translate.translation.vector.y + 1.0).abs() < 1e-12);
    }

    #[test]
    fn approx_eq_treats_negated_quaternion_as_same_rotation() {
        let a = Pose::from_xyz_rpy("base_link", 0.0, 0.0, 0.0, PI, 0.0, 0.0);
        let negated = UnitQuaternion::new_unchecked(-a.orientation.into_inner());
        let b = Pose::new("base_link", a.position, negated);
        assert_ne!(a, b);
        assert!(a.approx_eq(&b, 1e-12));
    }

    #[test]
    fn approx_eq_rejects_frame_mismatch() {
        let a = Pose::identity("base_link");
        let b = Pose::identity("world");
        assert!(!a.approx_eq(&b, 1.0));
    }

    #[test]
    fn pose_serialization_roundtrip() {
        let pose = Pose::from_xyz_rpy("base_link", 1.0, 2.0, 3.0, 0.0, 0.5, 0.0);
        let json = serde_json::to_string(&pose).unwrap();
        let back: Pose = serde_json::from_str(&json).unwrap();
        assert!(pose.approx_eq(&back, 1e-12));
    }
}
