//! # pnp-types
//!
//! Shared data model for the pick-and-place stack.
//!
//! # Modules
//!
//! - [`error`] – failure taxonomy and MoveIt-style [`ErrorCode`]s.
//! - [`scene`] – collision objects, attachments and [`SceneSnapshot`]s.
//!
//! Joint configurations, trajectories and move goals live at the crate root.

pub mod error;
pub mod scene;

pub use error::*;
pub use scene::*;

use std::collections::BTreeMap;
use std::time::Duration;

use pnp_geometry::Pose;
use serde::{Deserialize, Serialize};

/// Ordered mapping from joint name to position (radians or metres).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointConfiguration(BTreeMap<String, f64>);

impl JointConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, joint: &str) -> Option<f64> {
        self.0.get(joint).copied()
    }

    pub fn set(&mut self, joint: impl Into<String>, position: f64) {
        self.0.insert(joint.into(), position);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `self` with every joint present in `overrides` replaced.  Joints only
    /// in `overrides` are added.
    pub fn overridden_by(&self, overrides: &JointConfiguration) -> JointConfiguration {
        let mut merged = self.clone();
        for (name, position) in overrides.iter() {
            merged.set(name, position);
        }
        merged
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for JointConfiguration {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// One waypoint of a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub positions: JointConfiguration,
    pub time_from_start: Duration,
}

/// Ordered sequence of timestamped joint configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionPlan {
    pub group_name: String,
    pub points: Vec<TrajectoryPoint>,
}

impl MotionPlan {
    pub fn new(group_name: impl Into<String>, points: Vec<TrajectoryPoint>) -> Self {
        Self {
            group_name: group_name.into(),
            points,
        }
    }

    /// Where the arm ends up once the plan has run.
    pub fn final_configuration(&self) -> Option<&JointConfiguration> {
        self.points.last().map(|p| &p.positions)
    }

    pub fn duration(&self) -> Duration {
        self.points
            .last()
            .map(|p| p.time_from_start)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// What the orchestrator is asked to reach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum MoveGoal {
    Joint(JointConfiguration),
    Cartesian(Pose),
    /// A pose stored under a name by the planning service ("home", "start").
    Named(String),
}

impl std::fmt::Display for MoveGoal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoveGoal::Joint(joints) => write!(f, "joint goal ({} joints)", joints.len()),
            MoveGoal::Cartesian(pose) => write!(f, "cartesian goal {pose}"),
            MoveGoal::Named(name) => write!(f, "named goal '{name}'"),
        }
    }
}
