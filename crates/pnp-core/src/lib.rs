//! `pnp-core` – pick-and-place motion orchestration.
//!
//! Turns high-level requests ("move above that part", "attach it", "lift by
//! 30 cm") into kinematics, planning, execution and scene-update calls on the
//! services defined in `pnp-middleware`.
//!
//! # Modules
//!
//! - [`config`] – [`ArmConfig`][config::ArmConfig]: frames, planning group,
//!   planner settings and the grasp offsets.
//! - [`handshake`] – [`wait_until_ready`][handshake::wait_until_ready]:
//!   bounded readiness probing with exponential backoff.
//! - [`kinematics`] – [`KinematicsClient`][kinematics::KinematicsClient]:
//!   forward/inverse solves with outcome classification.
//! - [`cartesian`] – [`CartesianPathClient`][cartesian::CartesianPathClient]:
//!   straight-line paths and the completion-fraction policy.
//! - [`scene`] – [`SceneModel`][scene::SceneModel]: fresh snapshots on
//!   demand, publication and confirmation polling.
//! - [`lifecycle`] – [`ObjectLifecycle`][lifecycle::ObjectLifecycle]: add,
//!   attach, detach and clean collision objects.
//! - [`orchestrator`] – [`MotionOrchestrator`][orchestrator::MotionOrchestrator]:
//!   the `IDLE → PLANNING → EXECUTING → SUCCEEDED | FAILED` state machine.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: subscriber
//!   setup with optional OTLP span export.

pub mod cartesian;
pub mod config;
pub mod handshake;
pub mod kinematics;
pub mod lifecycle;
pub mod orchestrator;
pub mod scene;
pub mod telemetry;

pub use cartesian::{CartesianPathClient, LinearPath};
pub use config::ArmConfig;
pub use handshake::{RetryPolicy, probe_until_ready, wait_until_ready};
pub use kinematics::KinematicsClient;
pub use lifecycle::{ObjectLifecycle, ShapeKind};
pub use orchestrator::{MotionOrchestrator, MotionState};
pub use scene::SceneModel;
pub use telemetry::{TracerProviderGuard, init_tracing};
