//! The external collaborator pattern.
//!
//! Each remote subsystem the motion core depends on is an async trait.  A
//! call returns `Err(ServiceError)` only when it could not be completed at
//! all; a completed call carries its own [`ErrorCode`] which the caller
//! classifies.
//!
//! # Overview
//!
//! - [`KinematicsService`] – forward and inverse kinematics.
//! - [`CartesianPathService`] – straight-line interpolated paths.
//! - [`MotionService`] – joint-space planning, blocking execution, halt.
//! - [`SceneService`] – pull scene state, push diffs and attachments.
//!
//! Every service is also a [`Probe`] so startup can wait for it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pnp_geometry::Pose;
use pnp_types::{
    AttachedObject, ErrorCode, JointConfiguration, MotionPlan, SceneSnapshot, ServiceError,
};

/// Readiness check used by the startup handshake.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn is_ready(&self) -> bool;
}

// ────────────────────────────────────────────────────────────────────────────
// Kinematics
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FkRequest {
    pub base_frame: String,
    pub links: Vec<String>,
    /// Full robot state; solvers reject partial joint sets.
    pub robot_state: JointConfiguration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FkResponse {
    /// One pose per requested link, in request order.
    pub poses: Vec<Pose>,
    pub link_names: Vec<String>,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IkRequest {
    pub group_name: String,
    pub ee_link: String,
    pub target: Pose,
    /// Starting point for the solver.
    pub seed: JointConfiguration,
    pub attempts: u32,
    pub timeout: Duration,
    pub avoid_collisions: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IkResponse {
    pub solution: JointConfiguration,
    pub error_code: ErrorCode,
}

#[async_trait]
pub trait KinematicsService: Probe {
    async fn compute_fk(&self, request: FkRequest) -> Result<FkResponse, ServiceError>;

    async fn compute_ik(&self, request: IkRequest) -> Result<IkResponse, ServiceError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Cartesian paths
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CartesianPathRequest {
    pub group_name: String,
    pub base_frame: String,
    pub ee_link: String,
    pub waypoints: Vec<Pose>,
    /// Maximum end-effector travel between consecutive points (metres).
    pub max_step: f64,
    /// Maximum tolerated joint-space jump; `0.0` disables the check.
    pub jump_threshold: f64,
    pub avoid_collisions: bool,
    pub start_state: JointConfiguration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CartesianPathResponse {
    pub solution: MotionPlan,
    /// Share of the requested path that could be followed, in `[0, 1]`, or
    /// `-1.0` when the request itself was invalid.
    pub fraction: f64,
    pub error_code: ErrorCode,
}

#[async_trait]
pub trait CartesianPathService: Probe {
    async fn compute_cartesian_path(
        &self,
        request: CartesianPathRequest,
    ) -> Result<CartesianPathResponse, ServiceError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Planning and execution
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum PlanTarget {
    Joints(JointConfiguration),
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub group_name: String,
    pub target: PlanTarget,
    /// `None` plans from the controller's current state.
    pub start_state: Option<JointConfiguration>,
    pub planning_time: Duration,
    pub planner_id: String,
    pub goal_position_tolerance: f64,
    pub goal_orientation_tolerance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanResponse {
    pub plan: Option<MotionPlan>,
    pub error_code: ErrorCode,
}

#[async_trait]
pub trait MotionService: Probe {
    async fn plan(&self, request: PlanRequest) -> Result<PlanResponse, ServiceError>;

    /// Run `plan` on the controller.  Resolves once the trajectory finished,
    /// failed, or was preempted by [`stop`](Self::stop).
    async fn execute(&self, plan: &MotionPlan) -> Result<ErrorCode, ServiceError>;

    /// Request an immediate halt.  Must not block.
    fn stop(&self);
}

// ────────────────────────────────────────────────────────────────────────────
// Scene synchronisation
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait SceneService: Probe {
    /// Pull the authoritative scene.
    async fn request_state(&self) -> Result<SceneSnapshot, ServiceError>;

    /// Hand a diff to the scene server.  Delivery is not acknowledged.
    async fn publish_diff(&self, diff: SceneSnapshot) -> Result<(), ServiceError>;

    /// Hand a single attachment change to the scene server.
    async fn publish_attached(&self, attached: AttachedObject) -> Result<(), ServiceError>;
}

/// Handles to the four collaborators.  Clone it cheaply.
#[derive(Clone)]
pub struct ArmServices {
    pub kinematics: Arc<dyn KinematicsService>,
    pub cartesian: Arc<dyn CartesianPathService>,
    pub motion: Arc<dyn MotionService>,
    pub scene: Arc<dyn SceneService>,
}
