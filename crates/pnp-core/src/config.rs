//! Startup constants of the arm.
//!
//! Read once when the orchestrator is built and immutable afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Frames, planner parameters and pick-and-place offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmConfig {
    /// Reference frame for every pose the core produces.
    #[serde(default = "default_base_frame")]
    pub base_frame: String,

    /// End-effector link; attached objects are bound to it.
    #[serde(default = "default_ee_frame")]
    pub ee_frame: String,

    #[serde(default = "default_group_name")]
    pub group_name: String,

    #[serde(default = "default_max_planning_time")]
    pub max_planning_time_s: f64,

    #[serde(default = "default_planner_id")]
    pub planner_id: String,

    #[serde(default = "default_tolerance")]
    pub goal_position_tolerance: f64,

    #[serde(default = "default_tolerance")]
    pub goal_orientation_tolerance: f64,

    /// Distance between the flange and the grasp point (m).
    #[serde(default = "default_gripping_offset")]
    pub gripping_offset: f64,

    /// Extra clearance added when lifting a grasped object (m).
    #[serde(default = "default_dz_offset")]
    pub dz_offset: f64,

    /// Smallest acceptable completion fraction of a linear path.
    #[serde(default)]
    pub min_path_fraction: f64,

    /// Height of the surface detached primitives are set down on (m).
    #[serde(default)]
    pub table_height: f64,

    /// How long a scene publication may take to show up.
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,

    /// Named target used by `move_home`.
    #[serde(default = "default_home_target")]
    pub home_target: String,
}

fn default_base_frame() -> String {
    "base_link".to_string()
}
fn default_ee_frame() -> String {
    "link_7".to_string()
}
fn default_group_name() -> String {
    "arm".to_string()
}
fn default_max_planning_time() -> f64 {
    8.0
}
fn default_planner_id() -> String {
    "RRTConnectkConfigDefault".to_string()
}
fn default_tolerance() -> f64 {
    0.001
}
fn default_gripping_offset() -> f64 {
    0.1
}
fn default_dz_offset() -> f64 {
    0.3
}
fn default_confirm_timeout_ms() -> u64 {
    2000
}
fn default_home_target() -> String {
    "start".to_string()
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            base_frame: default_base_frame(),
            ee_frame: default_ee_frame(),
            group_name: default_group_name(),
            max_planning_time_s: default_max_planning_time(),
            planner_id: default_planner_id(),
            goal_position_tolerance: default_tolerance(),
            goal_orientation_tolerance: default_tolerance(),
            gripping_offset: default_gripping_offset(),
            dz_offset: default_dz_offset(),
            min_path_fraction: 0.0,
            table_height: 0.0,
            confirm_timeout_ms: default_confirm_timeout_ms(),
            home_target: default_home_target(),
        }
    }
}

impl ArmConfig {
    /// Planning budget; non-finite or negative values collapse to zero.
    pub fn planning_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_planning_time_s).unwrap_or(Duration::ZERO)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }
}
