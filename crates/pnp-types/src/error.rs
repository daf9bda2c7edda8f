//! Failure taxonomy shared by every layer of the stack.
//!
//! Each remote subsystem gets its own error kind so callers can pick a
//! recovery strategy per failure (re-sense before retrying IK, replan after a
//! controller fault, …).  [`MotionError`] is the umbrella returned by the
//! orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result code returned by the kinematics, path and execution services.
///
/// Numbering follows MoveIt's `MoveItErrorCodes`; only [`ErrorCode::SUCCESS`]
/// means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const SUCCESS: Self = Self(1);
    pub const FAILURE: Self = Self(99999);
    pub const PLANNING_FAILED: Self = Self(-1);
    pub const INVALID_MOTION_PLAN: Self = Self(-2);
    pub const CONTROL_FAILED: Self = Self(-4);
    pub const TIMED_OUT: Self = Self(-6);
    pub const PREEMPTED: Self = Self(-7);
    pub const GOAL_IN_COLLISION: Self = Self(-12);
    pub const INVALID_GROUP_NAME: Self = Self(-15);
    pub const INVALID_GOAL_CONSTRAINTS: Self = Self(-16);
    pub const INVALID_ROBOT_STATE: Self = Self(-17);
    pub const INVALID_LINK_NAME: Self = Self(-18);
    pub const INVALID_OBJECT_NAME: Self = Self(-19);
    pub const NO_IK_SOLUTION: Self = Self(-31);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Symbolic name of a known code.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::SUCCESS => "SUCCESS",
            Self::FAILURE => "FAILURE",
            Self::PLANNING_FAILED => "PLANNING_FAILED",
            Self::INVALID_MOTION_PLAN => "INVALID_MOTION_PLAN",
            Self::CONTROL_FAILED => "CONTROL_FAILED",
            Self::TIMED_OUT => "TIMED_OUT",
            Self::PREEMPTED => "PREEMPTED",
            Self::GOAL_IN_COLLISION => "GOAL_IN_COLLISION",
            Self::INVALID_GROUP_NAME => "INVALID_GROUP_NAME",
            Self::INVALID_GOAL_CONSTRAINTS => "INVALID_GOAL_CONSTRAINTS",
            Self::INVALID_ROBOT_STATE => "INVALID_ROBOT_STATE",
            Self::INVALID_LINK_NAME => "INVALID_LINK_NAME",
            Self::INVALID_OBJECT_NAME => "INVALID_OBJECT_NAME",
            Self::NO_IK_SOLUTION => "NO_IK_SOLUTION",
            _ => return None,
        };
        Some(name)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "UNKNOWN ({})", self.0),
        }
    }
}

/// A remote call that could not be completed at all (service gone, channel
/// closed, no subscriber).  Distinct from a call that completed with a
/// non-success [`ErrorCode`].
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{service} service error: {details}")]
pub struct ServiceError {
    pub service: String,
    pub details: String,
}

impl ServiceError {
    pub fn new(service: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            details: details.into(),
        }
    }
}

/// Which kinematics direction a [`SolverError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverOp {
    Forward,
    Inverse,
}

impl std::fmt::Display for SolverOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverOp::Forward => write!(f, "forward kinematics"),
            SolverOp::Inverse => write!(f, "inverse kinematics"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("{op} failed with {code}")]
    Rejected { op: SolverOp, code: ErrorCode },

    #[error("forward kinematics returned no pose for link '{link}'")]
    MissingPose { link: String },

    #[error(transparent)]
    Transport(#[from] ServiceError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("no feasible trajectory to {target} ({code})")]
    NoTrajectory { target: String, code: ErrorCode },

    #[error(transparent)]
    Transport(#[from] ServiceError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    #[error("trajectory execution failed with {code}")]
    Failed { code: ErrorCode },

    #[error("refusing to execute an empty trajectory")]
    EmptyPlan,

    #[error(transparent)]
    Transport(#[from] ServiceError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("cartesian path requested without waypoints")]
    NoWaypoints,

    #[error("waypoint {index} has a non-finite position")]
    NonFiniteWaypoint { index: usize },

    #[error("cartesian path service returned {code}")]
    Rejected { code: ErrorCode },

    #[error("cartesian path could not be computed (fraction {fraction})")]
    Infeasible { fraction: f64 },

    #[error("cartesian path only {fraction:.3} complete, {required:.3} required")]
    Incomplete { fraction: f64, required: f64 },

    #[error("cartesian path ends at z={reached:.3}, target was z={target:.3}")]
    MissesTarget { reached: f64, target: f64 },

    #[error(transparent)]
    Transport(#[from] ServiceError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("object '{0}' is not in the planning scene")]
    NotFound(String),

    #[error("there is no object attached to the robot")]
    NothingAttached,

    #[error("object '{0}' is already attached; detach it first")]
    AlreadyAttached(String),

    #[error("{operation} not reflected in the scene after {timeout:?}")]
    Unconfirmed { operation: String, timeout: Duration },

    #[error(transparent)]
    Transport(#[from] ServiceError),
}

/// Terminal failure of an orchestrated motion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MotionError {
    #[error("solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("linear path error: {0}")]
    Path(#[from] PathError),

    #[error("scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("motion cancelled by stop request")]
    Cancelled,

    #[error("another motion is already in flight")]
    Busy,
}

/// Startup failure: a collaborator never became available.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitError {
    #[error("{service} service not available after {attempts} attempts")]
    ServiceUnavailable { service: String, attempts: u32 },

    #[error("initial scene fetch failed: {0}")]
    Scene(#[from] SceneError),
}
