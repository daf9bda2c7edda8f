//! In-process simulated arm for CI testing without a robot stack.
//!
//! [`SimBackend`] implements every service trait against a cylindrical arm:
//!
//! | Joint | Meaning | Limits |
//! |---|---|---|
//! | `base_yaw` | rotation of the column about base Z | ±2π |
//! | `lift` | carriage height (m) | 0.0 – 1.2 |
//! | `reach` | radial extension (m) | 0.05 – 0.85 |
//! | `wrist_roll` / `wrist_pitch` / `wrist_yaw` | tool orientation relative to the column | ±2π |
//!
//! Forward and inverse kinematics are closed-form, the planner interpolates
//! straight in joint space, and the executor steps through trajectory points
//! with a configurable delay so halts can land mid-motion.  A background
//! task consumes the [`SceneBus`] and applies diffs to the authoritative
//! world, so published changes become visible asynchronously the way they
//! do with a real scene server.
//!
//! # Example
//!
//! ```rust,no_run
//! use pnp_middleware::sim::{SimBackend, SimSettings};
//!
//! # async fn demo() {
//! let backend = SimBackend::start(SimSettings::default());
//! let services = backend.services();
//! backend.fail_next_plan();
//! # let _ = services;
//! # }
//! ```

use std::collections::BTreeMap;
use std::f64::consts::{PI, TAU};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use nalgebra::{UnitQuaternion, Vector3};
use pnp_geometry::Pose;
use pnp_types::{
    AttachedObject, CollisionObject, ErrorCode, JointConfiguration, MotionPlan, RobotState,
    SceneSnapshot, ServiceError, TrajectoryPoint,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::bus::{SceneBus, SceneMessage, SceneReceiver};
use crate::services::{
    ArmServices, CartesianPathRequest, CartesianPathResponse, CartesianPathService, FkRequest,
    FkResponse, IkRequest, IkResponse, KinematicsService, MotionService, PlanRequest,
    PlanResponse, PlanTarget, Probe, SceneService,
};

pub const BASE_YAW: &str = "base_yaw";
pub const LIFT: &str = "lift";
pub const REACH: &str = "reach";
pub const WRIST_ROLL: &str = "wrist_roll";
pub const WRIST_PITCH: &str = "wrist_pitch";
pub const WRIST_YAW: &str = "wrist_yaw";

pub const JOINT_NAMES: [&str; 6] = [BASE_YAW, LIFT, REACH, WRIST_ROLL, WRIST_PITCH, WRIST_YAW];

const LIFT_LIMITS: (f64, f64) = (0.0, 1.2);
const REACH_LIMITS: (f64, f64) = (0.05, 0.85);
const ANGLE_LIMITS: (f64, f64) = (-TAU, TAU);

/// Largest joint change between consecutive planned points.
const PLAN_STEP: f64 = 0.05;
/// Nominal spacing of trajectory timestamps.
const POINT_INTERVAL: Duration = Duration::from_millis(50);

fn limits(joint: &str) -> Option<(f64, f64)> {
    match joint {
        LIFT => Some(LIFT_LIMITS),
        REACH => Some(REACH_LIMITS),
        BASE_YAW | WRIST_ROLL | WRIST_PITCH | WRIST_YAW => Some(ANGLE_LIMITS),
        _ => None,
    }
}

fn within_limits(joints: &JointConfiguration) -> bool {
    JOINT_NAMES.iter().all(|name| {
        matches!(
            (joints.get(name), limits(name)),
            (Some(v), Some((lo, hi))) if (lo..=hi).contains(&v)
        )
    }) && joints.iter().all(|(name, _)| limits(name).is_some())
}

// ────────────────────────────────────────────────────────────────────────────
// Kinematics
// ────────────────────────────────────────────────────────────────────────────

/// Tool pose of `joints` in `frame`.
pub fn forward_kinematics(frame: &str, joints: &JointConfiguration) -> Result<Pose, ErrorCode> {
    let get = |name: &str| joints.get(name).ok_or(ErrorCode::INVALID_ROBOT_STATE);
    let yaw = get(BASE_YAW)?;
    let lift = get(LIFT)?;
    let reach = get(REACH)?;
    let wrist = UnitQuaternion::from_euler_angles(get(WRIST_ROLL)?, get(WRIST_PITCH)?, get(WRIST_YAW)?);

    let column = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw);
    Ok(Pose::new(
        frame,
        Vector3::new(reach * yaw.cos(), reach * yaw.sin(), lift),
        column * wrist,
    ))
}

/// Closed-form inverse.  The base yaw is unwrapped towards the seed so
/// consecutive solutions along a path stay continuous.
pub fn inverse_kinematics(
    target: &Pose,
    seed: &JointConfiguration,
) -> Result<JointConfiguration, ErrorCode> {
    let p = target.position;
    let reach = p.x.hypot(p.y);
    let (reach_lo, reach_hi) = REACH_LIMITS;
    let (lift_lo, lift_hi) = LIFT_LIMITS;
    if !(reach_lo..=reach_hi).contains(&reach) || !(lift_lo..=lift_hi).contains(&p.z) {
        return Err(ErrorCode::NO_IK_SOLUTION);
    }

    let mut yaw = p.y.atan2(p.x);
    if let Some(previous) = seed.get(BASE_YAW) {
        yaw += TAU * ((previous - yaw) / TAU).round();
    }
    let column = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw);
    let (roll, pitch, wrist_yaw) = (column.inverse() * target.orientation).euler_angles();

    Ok([
        (BASE_YAW, yaw),
        (LIFT, p.z),
        (REACH, reach),
        (WRIST_ROLL, roll),
        (WRIST_PITCH, pitch),
        (WRIST_YAW, wrist_yaw),
    ]
    .into_iter()
    .collect())
}

/// Straight joint-space interpolation from `start` to `goal`.
fn interpolate(group: &str, start: &JointConfiguration, goal: &JointConfiguration) -> MotionPlan {
    let max_delta = goal
        .iter()
        .map(|(name, to)| (to - start.get(name).unwrap_or(to)).abs())
        .fold(0.0, f64::max);
    let steps = ((max_delta / PLAN_STEP).ceil() as usize).max(1);

    let points = (0..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            let positions = if i == steps {
                goal.clone()
            } else {
                goal.iter()
                    .map(|(name, to)| {
                        let from = start.get(name).unwrap_or(to);
                        (name, from + (to - from) * t)
                    })
                    .collect()
            };
            TrajectoryPoint {
                positions,
                time_from_start: POINT_INTERVAL * i as u32,
            }
        })
        .collect();
    MotionPlan::new(group, points)
}

// ────────────────────────────────────────────────────────────────────────────
// Settings
// ────────────────────────────────────────────────────────────────────────────

/// Tunables of the simulated arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSettings {
    #[serde(default = "default_group_name")]
    pub group_name: String,
    #[serde(default = "default_base_frame")]
    pub base_frame: String,
    #[serde(default = "default_ee_link")]
    pub ee_link: String,
    /// Wall-clock time spent on each trajectory point during execution.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
}

fn default_group_name() -> String {
    "arm".to_string()
}

fn default_base_frame() -> String {
    "base_link".to_string()
}

fn default_ee_link() -> String {
    "link_7".to_string()
}

fn default_step_delay_ms() -> u64 {
    5
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            group_name: default_group_name(),
            base_frame: default_base_frame(),
            ee_link: default_ee_link(),
            step_delay_ms: default_step_delay_ms(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Backend
// ────────────────────────────────────────────────────────────────────────────

struct SimWorld {
    joints: JointConfiguration,
    scene: SceneSnapshot,
}

fn lock(world: &Mutex<SimWorld>) -> MutexGuard<'_, SimWorld> {
    world.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Faults {
    fail_next_plan: AtomicBool,
    fail_next_execution: AtomicBool,
    not_ready_probes: AtomicU32,
    offline: AtomicBool,
}

#[derive(Default)]
struct Counters {
    fk: AtomicUsize,
    ik: AtomicUsize,
    cartesian: AtomicUsize,
    plan: AtomicUsize,
    execute: AtomicUsize,
    published: AtomicUsize,
}

/// How often each service was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub fk: usize,
    pub ik: usize,
    pub cartesian: usize,
    pub plan: usize,
    pub execute: usize,
    pub published: usize,
}

/// Simulated kinematics solver, planner, controller and scene server.
pub struct SimBackend {
    settings: SimSettings,
    world: Arc<Mutex<SimWorld>>,
    bus: SceneBus,
    named: BTreeMap<String, JointConfiguration>,
    stop_generation: AtomicU64,
    faults: Faults,
    counters: Counters,
}

impl SimBackend {
    /// Build the backend and spawn its scene server task.  Must be called
    /// inside a Tokio runtime.
    pub fn start(settings: SimSettings) -> Arc<Self> {
        let tool_down = |lift: f64, reach: f64| -> JointConfiguration {
            [
                (BASE_YAW, 0.0),
                (LIFT, lift),
                (REACH, reach),
                (WRIST_ROLL, PI),
                (WRIST_PITCH, 0.0),
                (WRIST_YAW, 0.0),
            ]
            .into_iter()
            .collect()
        };
        let named: BTreeMap<String, JointConfiguration> = [
            ("start".to_string(), tool_down(0.4, 0.45)),
            ("home".to_string(), tool_down(0.6, 0.3)),
        ]
        .into_iter()
        .collect();
        let joints = named.get("start").cloned().unwrap_or_default();

        let world = Arc::new(Mutex::new(SimWorld {
            joints,
            scene: SceneSnapshot::full(RobotState::default(), BTreeMap::new()),
        }));
        let bus = SceneBus::default();
        spawn_scene_server(Arc::clone(&world), bus.subscribe());
        info!(group = %settings.group_name, ee = %settings.ee_link, "simulated arm started");

        Arc::new(Self {
            settings,
            world,
            bus,
            named,
            stop_generation: AtomicU64::new(0),
            faults: Faults::default(),
            counters: Counters::default(),
        })
    }

    /// Service handles all backed by this simulator.
    pub fn services(self: &Arc<Self>) -> ArmServices {
        ArmServices {
            kinematics: self.clone(),
            cartesian: self.clone(),
            motion: self.clone(),
            scene: self.clone(),
        }
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    /// The channel the scene server listens on.
    pub fn bus(&self) -> &SceneBus {
        &self.bus
    }

    pub fn joints(&self) -> JointConfiguration {
        lock(&self.world).joints.clone()
    }

    /// Teleport the arm (test setup).
    pub fn set_joints(&self, joints: JointConfiguration) {
        let mut world = lock(&self.world);
        world.joints = world.joints.overridden_by(&joints);
    }

    /// Put an object straight into the authoritative world (test setup).
    pub fn insert_object(&self, object: CollisionObject) {
        lock(&self.world).scene.insert_object(object);
    }

    pub fn named_target(&self, name: &str) -> Option<&JointConfiguration> {
        self.named.get(name)
    }

    /// The next planning request fails with `PLANNING_FAILED`.
    pub fn fail_next_plan(&self) {
        self.faults.fail_next_plan.store(true, Ordering::SeqCst);
    }

    /// The next execution aborts halfway with `CONTROL_FAILED`.
    pub fn fail_next_execution(&self) {
        self.faults.fail_next_execution.store(true, Ordering::SeqCst);
    }

    /// Answer "not ready" to the next `probes` readiness checks.
    pub fn delay_readiness(&self, probes: u32) {
        self.faults.not_ready_probes.store(probes, Ordering::SeqCst);
    }

    /// An offline backend fails every call at the transport level.
    pub fn set_offline(&self, offline: bool) {
        self.faults.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            fk: c.fk.load(Ordering::SeqCst),
            ik: c.ik.load(Ordering::SeqCst),
            cartesian: c.cartesian.load(Ordering::SeqCst),
            plan: c.plan.load(Ordering::SeqCst),
            execute: c.execute.load(Ordering::SeqCst),
            published: c.published.load(Ordering::SeqCst),
        }
    }

    fn online(&self, service: &str) -> Result<(), ServiceError> {
        if self.faults.offline.load(Ordering::SeqCst) {
            Err(ServiceError::new(service, "simulated backend offline"))
        } else {
            Ok(())
        }
    }
}

fn spawn_scene_server(world: Arc<Mutex<SimWorld>>, mut rx: SceneReceiver) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SceneMessage::Diff(diff)) => {
                    let mut world = lock(&world);
                    if diff.is_diff {
                        world.scene.apply_diff(&diff);
                    } else {
                        world.scene.world = diff.world;
                        world.scene.robot_state.attached_objects =
                            diff.robot_state.attached_objects;
                    }
                    debug!(objects = world.scene.world.len(), "scene diff applied");
                }
                Ok(SceneMessage::Attached(attached)) => {
                    lock(&world).scene.apply_attached(&attached);
                    debug!(object_id = %attached.object.id, link = %attached.link_name, "attachment applied");
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "scene server lagged; messages dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("scene server stopped");
    });
}

#[async_trait]
impl Probe for SimBackend {
    async fn is_ready(&self) -> bool {
        if self.faults.offline.load(Ordering::SeqCst) {
            return false;
        }
        let still_warming = self
            .faults
            .not_ready_probes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        !still_warming
    }
}

#[async_trait]
impl KinematicsService for SimBackend {
    async fn compute_fk(&self, request: FkRequest) -> Result<FkResponse, ServiceError> {
        self.counters.fk.fetch_add(1, Ordering::SeqCst);
        self.online("compute_fk")?;

        let mut response = FkResponse {
            poses: Vec::new(),
            link_names: Vec::new(),
            error_code: ErrorCode::SUCCESS,
        };
        if request.base_frame != self.settings.base_frame {
            response.error_code = ErrorCode::FAILURE;
            return Ok(response);
        }
        for link in &request.links {
            let pose = if *link == self.settings.ee_link {
                forward_kinematics(&request.base_frame, &request.robot_state)
            } else if *link == self.settings.base_frame {
                Ok(Pose::identity(&request.base_frame))
            } else {
                Err(ErrorCode::INVALID_LINK_NAME)
            };
            match pose {
                Ok(pose) => {
                    response.poses.push(pose);
                    response.link_names.push(link.clone());
                }
                Err(code) => {
                    return Ok(FkResponse {
                        poses: Vec::new(),
                        link_names: Vec::new(),
                        error_code: code,
                    });
                }
            }
        }
        Ok(response)
    }

    async fn compute_ik(&self, request: IkRequest) -> Result<IkResponse, ServiceError> {
        self.counters.ik.fetch_add(1, Ordering::SeqCst);
        self.online("compute_ik")?;

        let rejected = |code| IkResponse {
            solution: JointConfiguration::new(),
            error_code: code,
        };
        if request.group_name != self.settings.group_name {
            return Ok(rejected(ErrorCode::INVALID_GROUP_NAME));
        }
        if request.ee_link != self.settings.ee_link {
            return Ok(rejected(ErrorCode::INVALID_LINK_NAME));
        }
        if request.target.frame_id != self.settings.base_frame {
            return Ok(rejected(ErrorCode::FAILURE));
        }
        let seed = if request.seed.is_empty() {
            self.joints()
        } else {
            request.seed
        };
        Ok(match inverse_kinematics(&request.target, &seed) {
            Ok(solution) => IkResponse {
                solution,
                error_code: ErrorCode::SUCCESS,
            },
            Err(code) => rejected(code),
        })
    }
}

#[async_trait]
impl CartesianPathService for SimBackend {
    async fn compute_cartesian_path(
        &self,
        request: CartesianPathRequest,
    ) -> Result<CartesianPathResponse, ServiceError> {
        self.counters.cartesian.fetch_add(1, Ordering::SeqCst);
        self.online("compute_cartesian_path")?;

        let invalid = |code| CartesianPathResponse {
            solution: MotionPlan::new(&request.group_name, Vec::new()),
            fraction: -1.0,
            error_code: code,
        };
        if request.group_name != self.settings.group_name {
            return Ok(invalid(ErrorCode::INVALID_GROUP_NAME));
        }
        if request.ee_link != self.settings.ee_link {
            return Ok(invalid(ErrorCode::INVALID_LINK_NAME));
        }
        if request.waypoints.is_empty()
            || request.max_step <= 0.0
            || request
                .waypoints
                .iter()
                .any(|w| w.frame_id != self.settings.base_frame)
        {
            return Ok(invalid(ErrorCode::FAILURE));
        }
        let start_pose = match forward_kinematics(&self.settings.base_frame, &request.start_state) {
            Ok(pose) => pose,
            Err(code) => return Ok(invalid(code)),
        };

        // Split each segment so no step exceeds `max_step`.
        let mut segments = Vec::with_capacity(request.waypoints.len());
        let mut from = &start_pose;
        for waypoint in &request.waypoints {
            let length = (waypoint.position - from.position).norm();
            let steps = ((length / request.max_step).ceil() as usize).max(1);
            segments.push((from, waypoint, steps));
            from = waypoint;
        }
        let total_steps: usize = segments.iter().map(|(_, _, steps)| steps).sum();

        let mut seed = request.start_state.clone();
        let mut points = vec![TrajectoryPoint {
            positions: seed.clone(),
            time_from_start: Duration::ZERO,
        }];
        let mut done = 0usize;
        'path: for (from, to, steps) in segments {
            for i in 1..=steps {
                let t = i as f64 / steps as f64;
                let position = from.position.lerp(&to.position, t);
                let orientation = from
                    .orientation
                    .try_slerp(&to.orientation, t, 1e-9)
                    .unwrap_or(to.orientation);
                let pose = Pose::new(&self.settings.base_frame, position, orientation);
                let Ok(solution) = inverse_kinematics(&pose, &seed) else {
                    debug!(step = done, "cartesian path left the workspace");
                    break 'path;
                };
                let next = seed.overridden_by(&solution);
                if request.jump_threshold > 0.0 {
                    let jump = next
                        .iter()
                        .map(|(name, v)| (v - seed.get(name).unwrap_or(v)).abs())
                        .fold(0.0, f64::max);
                    if jump > request.jump_threshold {
                        debug!(step = done, jump, "joint-space jump in cartesian path");
                        break 'path;
                    }
                }
                done += 1;
                points.push(TrajectoryPoint {
                    positions: next.clone(),
                    time_from_start: POINT_INTERVAL * done as u32,
                });
                seed = next;
            }
        }

        Ok(CartesianPathResponse {
            solution: MotionPlan::new(&request.group_name, points),
            fraction: done as f64 / total_steps as f64,
            error_code: ErrorCode::SUCCESS,
        })
    }
}

#[async_trait]
impl MotionService for SimBackend {
    async fn plan(&self, request: PlanRequest) -> Result<PlanResponse, ServiceError> {
        self.counters.plan.fetch_add(1, Ordering::SeqCst);
        self.online("plan")?;

        let failed = |code| PlanResponse {
            plan: None,
            error_code: code,
        };
        if request.group_name != self.settings.group_name {
            return Ok(failed(ErrorCode::INVALID_GROUP_NAME));
        }
        if self.faults.fail_next_plan.swap(false, Ordering::SeqCst) {
            return Ok(failed(ErrorCode::PLANNING_FAILED));
        }

        let start = request.start_state.unwrap_or_else(|| self.joints());
        let goal = match &request.target {
            PlanTarget::Joints(joints) => start.overridden_by(joints),
            PlanTarget::Named(name) => match self.named.get(name) {
                Some(joints) => start.overridden_by(joints),
                None => return Ok(failed(ErrorCode::INVALID_GOAL_CONSTRAINTS)),
            },
        };
        if !within_limits(&goal) {
            return Ok(failed(ErrorCode::INVALID_GOAL_CONSTRAINTS));
        }

        let plan = interpolate(&self.settings.group_name, &start, &goal);
        debug!(points = plan.len(), planner = %request.planner_id, "simulated plan ready");
        Ok(PlanResponse {
            plan: Some(plan),
            error_code: ErrorCode::SUCCESS,
        })
    }

    async fn execute(&self, plan: &MotionPlan) -> Result<ErrorCode, ServiceError> {
        self.counters.execute.fetch_add(1, Ordering::SeqCst);
        self.online("execute")?;

        if plan.is_empty() {
            return Ok(ErrorCode::INVALID_MOTION_PLAN);
        }
        let generation = self.stop_generation.load(Ordering::SeqCst);
        let fail_at = self
            .faults
            .fail_next_execution
            .swap(false, Ordering::SeqCst)
            .then(|| plan.len() / 2);
        let step_delay = Duration::from_millis(self.settings.step_delay_ms);

        for (i, point) in plan.points.iter().enumerate() {
            if self.stop_generation.load(Ordering::SeqCst) != generation {
                warn!(point = i, "execution preempted");
                return Ok(ErrorCode::PREEMPTED);
            }
            if fail_at == Some(i) {
                warn!(point = i, "simulated controller fault");
                return Ok(ErrorCode::CONTROL_FAILED);
            }
            {
                let mut world = lock(&self.world);
                world.joints = world.joints.overridden_by(&point.positions);
            }
            tokio::time::sleep(step_delay).await;
        }
        Ok(ErrorCode::SUCCESS)
    }

    fn stop(&self) {
        self.stop_generation.fetch_add(1, Ordering::SeqCst);
        info!("halt requested");
    }
}

#[async_trait]
impl SceneService for SimBackend {
    async fn request_state(&self) -> Result<SceneSnapshot, ServiceError> {
        self.online("get_planning_scene")?;
        let world = lock(&self.world);
        Ok(SceneSnapshot::full(
            RobotState {
                joint_state: world.joints.clone(),
                attached_objects: world.scene.robot_state.attached_objects.clone(),
            },
            world.scene.world.clone(),
        ))
    }

    async fn publish_diff(&self, diff: SceneSnapshot) -> Result<(), ServiceError> {
        self.online("planning_scene")?;
        self.counters.published.fetch_add(1, Ordering::SeqCst);
        self.bus.publish(SceneMessage::Diff(diff)).map(|_| ())
    }

    async fn publish_attached(&self, attached: AttachedObject) -> Result<(), ServiceError> {
        self.online("attached_collision_object")?;
        self.counters.published.fetch_add(1, Ordering::SeqCst);
        self.bus.publish(SceneMessage::Attached(attached)).map(|_| ())
    }
}
