//! `pnp-geometry` – rigid-body geometry for the pick-and-place stack.
//!
//! # Modules
//!
//! - [`pose`] – [`Pose`][pose::Pose]: a position + unit quaternion in a named
//!   reference frame, backed by `nalgebra::Isometry3` for composition.
//! - [`engine`] – the Pose Transform Engine: approach, retreat and placement
//!   poses derived from an object pose by order-sensitive composition.

pub mod engine;
pub mod pose;

pub use engine::{compute_above_pose, compute_place_pose, level, with_height};
pub use pose::{Pose, Transform};
