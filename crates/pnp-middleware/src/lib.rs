//! `pnp-middleware` – the boundary to the outside world.
//!
//! The motion core never talks to a kinematics solver, planner, controller
//! or scene server directly.  It goes through the service traits defined
//! here, so a real robot stack and the in-process simulator are
//! interchangeable.
//!
//! # Modules
//!
//! - [`services`] – async traits for the four external collaborators plus
//!   their request/response types.
//! - [`bus`] – topic channel carrying scene diffs to the scene server, built
//!   on Tokio broadcast channels.
//! - [`sim`] – simulated cylindrical arm implementing every service, for
//!   headless tests and the CLI demo.

pub mod bus;
pub mod services;
pub mod sim;

pub use bus::{SceneBus, SceneMessage, SceneReceiver};
pub use services::{
    ArmServices, CartesianPathRequest, CartesianPathResponse, CartesianPathService, FkRequest,
    FkResponse, IkRequest, IkResponse, KinematicsService, MotionService, PlanRequest,
    PlanResponse, PlanTarget, Probe, SceneService,
};
pub use sim::{SimBackend, SimSettings};
