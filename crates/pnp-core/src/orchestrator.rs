//! [`MotionOrchestrator`] – the top-level motion state machine.
//!
//! ```text
//! IDLE → PLANNING → EXECUTING → { SUCCEEDED, FAILED }
//! ```
//!
//! Cartesian goals are solved to a joint target first; a solver failure goes
//! straight to `FAILED` without retrying.  Vertical moves skip joint-space
//! planning and use a single linear path instead.
//!
//! # Concurrency
//!
//! At most one motion is in flight: a second `submit`/`vertical_move` while
//! one runs fails with [`MotionError::Busy`].  [`MotionOrchestrator::stop`]
//! is synchronous and may be called from any thread (a signal handler, the
//! CLI) while an execution blocks.
//!
//! The orchestrator keeps no scene or plan between calls.  Every
//! scene-dependent step fetches its own snapshot and every motion returns
//! the plan it ran; only the observable [`MotionState`] is retained.

use std::sync::Arc;

use pnp_geometry::{Pose, compute_above_pose, compute_place_pose, with_height};
use pnp_middleware::{ArmServices, PlanRequest, PlanTarget};
use pnp_types::{
    ErrorCode, ExecError, InitError, JointConfiguration, MotionError, MotionPlan, MoveGoal,
    PathError, PlanError, SceneError,
};
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::cartesian::CartesianPathClient;
use crate::config::ArmConfig;
use crate::handshake::{RetryPolicy, wait_until_ready};
use crate::kinematics::KinematicsClient;
use crate::lifecycle::ObjectLifecycle;
use crate::scene::SceneModel;

/// How far the end of a vertical path may sit from the requested height (m).
const VERTICAL_TOLERANCE: f64 = 1e-3;

/// Observable state of the orchestrator.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MotionState {
    #[default]
    Idle,
    Planning,
    Executing,
    Succeeded,
    Failed(MotionError),
}

impl std::fmt::Display for MotionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MotionState::Idle => write!(f, "IDLE"),
            MotionState::Planning => write!(f, "PLANNING"),
            MotionState::Executing => write!(f, "EXECUTING"),
            MotionState::Succeeded => write!(f, "SUCCEEDED"),
            MotionState::Failed(e) => write!(f, "FAILED ({e})"),
        }
    }
}

pub struct MotionOrchestrator {
    config: ArmConfig,
    services: ArmServices,
    kinematics: KinematicsClient,
    cartesian: CartesianPathClient,
    scene: SceneModel,
    state: watch::Sender<MotionState>,
    run_lock: Mutex<()>,
}

impl MotionOrchestrator {
    /// Wait for every service, then seed the kinematics skeleton from a
    /// first scene snapshot.
    pub async fn connect(
        services: ArmServices,
        config: ArmConfig,
        policy: RetryPolicy,
    ) -> Result<Self, InitError> {
        wait_until_ready(&services, &policy).await?;
        let scene = SceneModel::new(Arc::clone(&services.scene), config.confirm_timeout());
        let snapshot = scene.refresh().await?;
        info!(
            joints = snapshot.robot_state.joint_state.len(),
            objects = snapshot.world.len(),
            "orchestrator connected"
        );
        Ok(Self::new(services, config, snapshot.robot_state.joint_state))
    }

    /// Build without a handshake.  `skeleton` is the full joint state used to
    /// complete partial kinematics requests.
    pub fn new(services: ArmServices, config: ArmConfig, skeleton: JointConfiguration) -> Self {
        Self {
            kinematics: KinematicsClient::new(Arc::clone(&services.kinematics), &config, skeleton),
            cartesian: CartesianPathClient::new(Arc::clone(&services.cartesian), &config),
            scene: SceneModel::new(Arc::clone(&services.scene), config.confirm_timeout()),
            state: watch::Sender::new(MotionState::Idle),
            run_lock: Mutex::new(()),
            config,
            services,
        }
    }

    pub fn config(&self) -> &ArmConfig {
        &self.config
    }

    pub fn scene(&self) -> &SceneModel {
        &self.scene
    }

    pub fn kinematics(&self) -> &KinematicsClient {
        &self.kinematics
    }

    pub fn state(&self) -> MotionState {
        self.state.borrow().clone()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<MotionState> {
        self.state.subscribe()
    }

    /// Object lifecycle operations against this orchestrator's scene.
    pub fn objects(&self) -> ObjectLifecycle<'_> {
        ObjectLifecycle::new(
            &self.scene,
            &self.kinematics,
            &self.config.ee_frame,
            self.config.table_height,
        )
    }

    // ── Motions ─────────────────────────────────────────────────────────────

    /// Reach `goal` end-to-end and return the executed plan.
    #[instrument(skip_all, fields(goal = %goal))]
    pub async fn submit(&self, goal: MoveGoal) -> Result<MotionPlan, MotionError> {
        let _running = self.begin()?;
        let result = self.run_goal(goal).await;
        self.finish(result)
    }

    /// Move the end-effector straight up or down to `target_z` in the base
    /// frame.
    #[instrument(skip(self))]
    pub async fn vertical_move(&self, target_z: f64) -> Result<MotionPlan, MotionError> {
        let _running = self.begin()?;
        let result = self.run_vertical(target_z).await;
        self.finish(result)
    }

    /// Halt an in-flight execution.  Returns `true` when one was cancelled;
    /// otherwise nothing happens.
    pub fn stop(&self) -> bool {
        let cancelled = self.state.send_if_modified(|state| {
            if *state == MotionState::Executing {
                *state = MotionState::Failed(MotionError::Cancelled);
                true
            } else {
                false
            }
        });
        if cancelled {
            self.services.motion.stop();
            warn!("execution cancelled");
        } else {
            debug!("stop requested with nothing executing");
        }
        cancelled
    }

    pub async fn move_home(&self) -> Result<MotionPlan, MotionError> {
        self.submit(MoveGoal::Named(self.config.home_target.clone()))
            .await
    }

    /// Move to `offset_z` along the object's Z axis, optionally flipped to
    /// face it.
    pub async fn move_above(
        &self,
        object_id: &str,
        offset_z: f64,
        flip: bool,
    ) -> Result<MotionPlan, MotionError> {
        let object = self.locate(object_id).await?;
        let target = compute_above_pose(&object, offset_z, flip);
        self.submit(MoveGoal::Cartesian(target)).await
    }

    /// Move to the placement pose of `object_id` (no flip).
    pub async fn move_to_place(
        &self,
        object_id: &str,
        offset_z: f64,
    ) -> Result<MotionPlan, MotionError> {
        let object = self.locate(object_id).await?;
        let target = compute_place_pose(&object, offset_z);
        self.submit(MoveGoal::Cartesian(target)).await
    }

    /// Lift clear of the table while carrying an object of `object_height`.
    pub async fn ascend(&self, object_height: f64) -> Result<MotionPlan, MotionError> {
        let target = self.config.gripping_offset + object_height + self.config.dz_offset;
        self.vertical_move(target).await
    }

    /// Lower to grasp or set down an object of `object_height`.
    pub async fn descend(&self, object_height: f64) -> Result<MotionPlan, MotionError> {
        let target = self.config.gripping_offset + object_height;
        self.vertical_move(target).await
    }

    /// End-effector pose from a fresh snapshot.
    pub async fn current_pose(&self) -> Result<Pose, MotionError> {
        let snapshot = self.scene.refresh().await?;
        Ok(self
            .kinematics
            .compute_forward(&snapshot.robot_state.joint_state)
            .await?)
    }

    pub async fn current_joints(&self) -> Result<JointConfiguration, MotionError> {
        Ok(self.scene.refresh().await?.robot_state.joint_state)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    /// Claim the run lock and start over from `IDLE`.
    fn begin(&self) -> Result<MutexGuard<'_, ()>, MotionError> {
        let running = self.run_lock.try_lock().map_err(|_| MotionError::Busy)?;
        self.state.send_replace(MotionState::Idle);
        Ok(running)
    }

    async fn locate(&self, object_id: &str) -> Result<Pose, MotionError> {
        let snapshot = self.scene.refresh().await?;
        let object = snapshot
            .find_object(object_id)
            .ok_or_else(|| SceneError::NotFound(object_id.to_string()))?;
        Ok(object.pose.clone())
    }

    async fn run_goal(&self, goal: MoveGoal) -> Result<MotionPlan, MotionError> {
        let target = match goal {
            MoveGoal::Joint(joints) => PlanTarget::Joints(joints),
            MoveGoal::Named(name) => PlanTarget::Named(name),
            MoveGoal::Cartesian(pose) => PlanTarget::Joints(self.kinematics.compute_inverse(&pose).await?),
        };
        self.state.send_replace(MotionState::Planning);
        let plan = self.plan(target).await?;
        self.execute(plan).await
    }

    async fn run_vertical(&self, target_z: f64) -> Result<MotionPlan, MotionError> {
        if !target_z.is_finite() {
            return Err(PathError::NonFiniteWaypoint { index: 0 }.into());
        }
        let snapshot = self.scene.refresh().await?;
        let joints = &snapshot.robot_state.joint_state;
        let current = self.kinematics.compute_forward(joints).await?;
        let waypoint = with_height(&current, target_z);
        debug!(from = current.position.z, to = target_z, "vertical move");

        self.state.send_replace(MotionState::Planning);
        let path = self.cartesian.plan_linear(&[waypoint], joints).await?;

        // A partial path is only worth running if it still ends at the target.
        let end = path
            .plan
            .final_configuration()
            .ok_or(PathError::Infeasible { fraction: path.fraction })?;
        let reached = self.kinematics.compute_forward(end).await?.position.z;
        if (reached - target_z).abs() > VERTICAL_TOLERANCE {
            warn!(reached, target = target_z, fraction = path.fraction, "vertical path stops short");
            return Err(PathError::MissesTarget {
                reached,
                target: target_z,
            }
            .into());
        }
        self.execute(path.plan).await
    }

    async fn plan(&self, target: PlanTarget) -> Result<MotionPlan, PlanError> {
        let label = match &target {
            PlanTarget::Joints(joints) => format!("joint target ({} joints)", joints.len()),
            PlanTarget::Named(name) => format!("named target '{name}'"),
        };
        let request = PlanRequest {
            group_name: self.config.group_name.clone(),
            target,
            start_state: None,
            planning_time: self.config.planning_time(),
            planner_id: self.config.planner_id.clone(),
            goal_position_tolerance: self.config.goal_position_tolerance,
            goal_orientation_tolerance: self.config.goal_orientation_tolerance,
        };
        let response = self.services.motion.plan(request).await.map_err(|e| {
            error!(error = %e, "planning call failed");
            PlanError::from(e)
        })?;
        match response.plan {
            Some(plan) if response.error_code.is_success() && !plan.is_empty() => {
                info!(target = %label, points = plan.len(), "plan found");
                Ok(plan)
            }
            _ => {
                let code = if response.error_code.is_success() {
                    ErrorCode::INVALID_MOTION_PLAN
                } else {
                    response.error_code
                };
                error!(target = %label, %code, "planning failed");
                Err(PlanError::NoTrajectory {
                    target: label,
                    code,
                })
            }
        }
    }

    async fn execute(&self, plan: MotionPlan) -> Result<MotionPlan, MotionError> {
        if plan.is_empty() {
            return Err(ExecError::EmptyPlan.into());
        }
        let mut state_rx = self.state.subscribe();
        self.state.send_replace(MotionState::Executing);
        info!(points = plan.len(), duration = ?plan.duration(), "executing");

        let motion = Arc::clone(&self.services.motion);
        let outcome = tokio::select! {
            result = motion.execute(&plan) => Some(result),
            _ = cancelled(&mut state_rx) => None,
        };
        if self.is_cancelled() {
            return Err(MotionError::Cancelled);
        }
        match outcome {
            Some(Ok(code)) if code.is_success() => {
                info!("execution succeeded");
                Ok(plan)
            }
            Some(Ok(code)) => {
                error!(%code, "execution failed");
                Err(ExecError::Failed { code }.into())
            }
            Some(Err(e)) => {
                error!(error = %e, "execution call failed");
                Err(ExecError::from(e).into())
            }
            None => Err(MotionError::Cancelled),
        }
    }

    fn is_cancelled(&self) -> bool {
        matches!(
            *self.state.borrow(),
            MotionState::Failed(MotionError::Cancelled)
        )
    }

    /// Record the outcome.  A stop that landed after the execution returned
    /// wins over its result.
    fn finish(&self, mut result: Result<MotionPlan, MotionError>) -> Result<MotionPlan, MotionError> {
        self.state.send_modify(|state| {
            if *state == MotionState::Failed(MotionError::Cancelled) {
                result = Err(MotionError::Cancelled);
                return;
            }
            *state = match &result {
                Ok(_) => MotionState::Succeeded,
                Err(e) => MotionState::Failed(e.clone()),
            };
        });
        if let Err(e) = &result
            && !matches!(e, MotionError::Cancelled)
        {
            error!(error = %e, "motion failed");
        }
        result
    }
}

/// Resolves once the state becomes `Failed(Cancelled)`.
async fn cancelled(rx: &mut watch::Receiver<MotionState>) {
    loop {
        let done = matches!(
            *rx.borrow_and_update(),
            MotionState::Failed(MotionError::Cancelled)
        );
        if done {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnp_middleware::sim::{BASE_YAW, LIFT};
    use pnp_middleware::{SimBackend, SimSettings};
    use pnp_types::{SolverError, SolverOp};
    use std::time::Duration;

    use crate::lifecycle::ShapeKind;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    async fn connected(settings: SimSettings) -> (Arc<SimBackend>, MotionOrchestrator) {
        let sim = SimBackend::start(settings);
        let orchestrator = MotionOrchestrator::connect(sim.services(), ArmConfig::default(), fast())
            .await
            .unwrap();
        (sim, orchestrator)
    }

    async fn wait_for_state(orchestrator: &MotionOrchestrator, wanted: MotionState) {
        let mut rx = orchestrator.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == wanted))
            .await
            .expect("state not reached")
            .unwrap();
    }

    #[tokio::test]
    async fn connect_fails_fast_when_backend_absent() {
        let sim = SimBackend::start(SimSettings::default());
        sim.set_offline(true);
        let err = MotionOrchestrator::connect(sim.services(), ArmConfig::default(), fast())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, InitError::ServiceUnavailable { attempts: 5, .. }));
    }

    #[tokio::test]
    async fn named_goal_runs_to_success() {
        let (sim, orchestrator) = connected(SimSettings::default()).await;
        assert_eq!(orchestrator.state(), MotionState::Idle);

        let plan = orchestrator.submit(MoveGoal::Named("home".into())).await.unwrap();
        assert_eq!(orchestrator.state(), MotionState::Succeeded);
        assert_eq!(plan.final_configuration(), sim.named_target("home"));
        assert_eq!(Some(&sim.joints()), sim.named_target("home"));
    }

    #[tokio::test]
    async fn cartesian_goal_reaches_pose() {
        let (_sim, orchestrator) = connected(SimSettings::default()).await;
        let here = orchestrator.current_pose().await.unwrap();
        let mut target = here.clone();
        target.position.y += 0.1;

        orchestrator.submit(MoveGoal::Cartesian(target.clone())).await.unwrap();
        let reached = orchestrator.current_pose().await.unwrap();
        assert!(reached.approx_eq(&target, 1e-6));
    }

    #[tokio::test]
    async fn unreachable_cartesian_goal_fails_without_planning() {
        let (sim, orchestrator) = connected(SimSettings::default()).await;
        let far = Pose::from_xyz_rpy("base_link", 4.0, 0.0, 0.5, 0.0, 0.0, 0.0);
        let err = orchestrator.submit(MoveGoal::Cartesian(far)).await.unwrap_err();
        let expected = MotionError::Solver(SolverError::Rejected {
            op: SolverOp::Inverse,
            code: ErrorCode::NO_IK_SOLUTION,
        });
        assert_eq!(err, expected);
        assert_eq!(orchestrator.state(), MotionState::Failed(expected));
        assert_eq!(sim.calls().ik, 1);
        assert_eq!(sim.calls().plan, 0);
    }

    #[tokio::test]
    async fn planning_failure_is_a_plan_error() {
        let (sim, orchestrator) = connected(SimSettings::default()).await;
        sim.fail_next_plan();
        let err = orchestrator.move_home().await.unwrap_err();
        assert!(matches!(
            err,
            MotionError::Plan(PlanError::NoTrajectory { code: ErrorCode::PLANNING_FAILED, .. })
        ));
        assert_eq!(sim.calls().execute, 0);
    }

    #[tokio::test]
    async fn controller_fault_is_an_exec_error() {
        let (sim, orchestrator) = connected(SimSettings::default()).await;
        sim.fail_next_execution();
        let goal: JointConfiguration = [(BASE_YAW, 1.0)].into_iter().collect();
        let err = orchestrator.submit(MoveGoal::Joint(goal)).await.unwrap_err();
        assert_eq!(
            err,
            MotionError::Exec(ExecError::Failed {
                code: ErrorCode::CONTROL_FAILED
            })
        );
    }

    #[tokio::test]
    async fn add_attach_then_vertical_move_lands_at_height() {
        let (sim, orchestrator) = connected(SimSettings::default()).await;
        let objects = orchestrator.objects();
        let pose_a = Pose::from_xyz_rpy("base_link", 0.45, 0.0, 0.25, 0.0, 0.0, 0.0);
        objects.add(ShapeKind::Box, pose_a).await.unwrap();
        objects.attach("box").await.unwrap();

        let plan = orchestrator.vertical_move(0.5).await.unwrap();
        let last = plan.final_configuration().unwrap();
        let pose = orchestrator.kinematics().compute_forward(last).await.unwrap();
        assert!((pose.position.z - 0.5).abs() < 0.001);
        assert_eq!(orchestrator.state(), MotionState::Succeeded);
        // Linear path, no joint-space planning.
        assert_eq!(sim.calls().plan, 0);
        assert_eq!(sim.calls().cartesian, 1);
        assert!(orchestrator.scene().refresh().await.unwrap().is_attached("box"));
    }

    #[tokio::test]
    async fn vertical_move_out_of_reach_fails_with_path_error() {
        let config = ArmConfig {
            min_path_fraction: 1.0,
            ..ArmConfig::default()
        };
        let sim = SimBackend::start(SimSettings::default());
        let orchestrator = MotionOrchestrator::connect(sim.services(), config, fast()).await.unwrap();
        let err = orchestrator.vertical_move(5.0).await.unwrap_err();
        assert!(matches!(err, MotionError::Path(_)), "{err:?}");
        assert_eq!(sim.calls().execute, 0);
    }

    #[tokio::test]
    async fn vertical_move_to_nan_fails_before_any_call() {
        let (sim, orchestrator) = connected(SimSettings::default()).await;
        let before = sim.calls();
        let err = orchestrator.vertical_move(f64::NAN).await.unwrap_err();
        assert_eq!(err, MotionError::Path(PathError::NonFiniteWaypoint { index: 0 }));
        assert_eq!(orchestrator.state(), MotionState::Failed(err));
        assert_eq!(sim.calls().cartesian, before.cartesian);
        assert_eq!(sim.calls().execute, 0);
    }

    #[tokio::test]
    async fn partial_vertical_path_is_not_executed_under_default_policy() {
        let (sim, orchestrator) = connected(SimSettings::default()).await;
        let z_before = orchestrator.current_pose().await.unwrap().position.z;

        let err = orchestrator.vertical_move(5.0).await.unwrap_err();
        match err {
            MotionError::Path(PathError::MissesTarget { reached, target }) => {
                assert_eq!(target, 5.0);
                assert!(reached <= 1.2 + 1e-9, "{reached}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(orchestrator.state(), MotionState::Failed(_)));
        assert_eq!(sim.calls().execute, 0);
        let z_after = orchestrator.current_pose().await.unwrap().position.z;
        assert!((z_after - z_before).abs() < 1e-12);
    }

    #[tokio::test]
    async fn ascend_and_descend_use_configured_offsets() {
        let (_sim, orchestrator) = connected(SimSettings::default()).await;
        orchestrator.ascend(0.13).await.unwrap();
        let z = orchestrator.current_pose().await.unwrap().position.z;
        assert!((z - (0.1 + 0.13 + 0.3)).abs() < 1e-6);

        orchestrator.descend(0.13).await.unwrap();
        let z = orchestrator.current_pose().await.unwrap().position.z;
        assert!((z - (0.1 + 0.13)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn move_above_flips_towards_object() {
        let (_sim, orchestrator) = connected(SimSettings::default()).await;
        let part = Pose::from_xyz_rpy("base_link", 0.5, 0.1, 0.05, 0.0, 0.0, 0.3);
        orchestrator
            .objects()
            .add(ShapeKind::Epingle, part.clone())
            .await
            .unwrap();

        orchestrator.move_above("epingle", 0.06, true).await.unwrap();
        let reached = orchestrator.current_pose().await.unwrap();
        assert!(reached.approx_eq(&compute_above_pose(&part, 0.06, true), 1e-6));
    }

    #[tokio::test]
    async fn move_above_unknown_object_is_not_found() {
        let (sim, orchestrator) = connected(SimSettings::default()).await;
        let err = orchestrator.move_above("ghost", 0.06, true).await.unwrap_err();
        assert_eq!(err, MotionError::Scene(SceneError::NotFound("ghost".into())));
        assert_eq!(sim.calls().ik, 0);
    }

    #[tokio::test]
    async fn move_to_place_keeps_object_orientation() {
        let (_sim, orchestrator) = connected(SimSettings::default()).await;
        // Plate whose Z axis points down into the fixture.
        let plate = Pose::from_xyz_rpy("base_link", 0.4, -0.2, 0.5, std::f64::consts::PI, 0.0, 0.0);
        orchestrator
            .objects()
            .add(ShapeKind::Plaque, plate.clone())
            .await
            .unwrap();

        orchestrator.move_to_place("plaque", -0.2).await.unwrap();
        let reached = orchestrator.current_pose().await.unwrap();
        assert!((reached.position.z - 0.7).abs() < 1e-6);
        assert!(reached.orientation.angle_to(&plate.orientation) < 1e-6);
    }

    #[tokio::test]
    async fn stop_cancels_execution_and_nothing_resumes() {
        let (sim, orchestrator) = connected(SimSettings {
            step_delay_ms: 20,
            ..SimSettings::default()
        })
        .await;
        let orchestrator = Arc::new(orchestrator);

        let runner = Arc::clone(&orchestrator);
        let goal: JointConfiguration = [(BASE_YAW, 3.0)].into_iter().collect();
        let handle = tokio::spawn(async move { runner.submit(MoveGoal::Joint(goal)).await });
        wait_for_state(&orchestrator, MotionState::Executing).await;

        assert!(orchestrator.stop());
        assert_eq!(handle.await.unwrap(), Err(MotionError::Cancelled));
        assert_eq!(orchestrator.state(), MotionState::Failed(MotionError::Cancelled));
        assert!(sim.joints().get(BASE_YAW).unwrap() < 3.0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sim.calls().plan, 1);
        assert_eq!(orchestrator.state(), MotionState::Failed(MotionError::Cancelled));

        orchestrator.move_home().await.unwrap();
        assert_eq!(orchestrator.state(), MotionState::Succeeded);
    }

    #[tokio::test]
    async fn stop_after_controller_returns_still_cancels() {
        let (_sim, orchestrator) = connected(SimSettings::default()).await;
        // The controller has reported success but the outcome is not recorded yet.
        orchestrator.state.send_replace(MotionState::Executing);
        assert!(orchestrator.stop());

        let result = orchestrator.finish(Ok(MotionPlan::new("arm", vec![])));
        assert_eq!(result, Err(MotionError::Cancelled));
        assert_eq!(orchestrator.state(), MotionState::Failed(MotionError::Cancelled));
    }

    #[tokio::test]
    async fn failure_after_cancel_reports_its_own_error() {
        let (_sim, orchestrator) = connected(SimSettings::default()).await;
        orchestrator.state.send_replace(MotionState::Executing);
        assert!(orchestrator.stop());

        let far = Pose::from_xyz_rpy("base_link", 4.0, 0.0, 0.5, 0.0, 0.0, 0.0);
        let err = orchestrator.submit(MoveGoal::Cartesian(far)).await.unwrap_err();
        assert!(matches!(err, MotionError::Solver(_)), "{err:?}");
        assert_eq!(orchestrator.state(), MotionState::Failed(err));
    }

    #[tokio::test]
    async fn stop_while_idle_is_a_no_op() {
        let (_sim, orchestrator) = connected(SimSettings::default()).await;
        assert!(!orchestrator.stop());
        assert_eq!(orchestrator.state(), MotionState::Idle);
        orchestrator.move_home().await.unwrap();
        assert!(!orchestrator.stop());
        assert_eq!(orchestrator.state(), MotionState::Succeeded);
    }

    #[tokio::test]
    async fn concurrent_motion_is_busy() {
        let (_sim, orchestrator) = connected(SimSettings {
            step_delay_ms: 20,
            ..SimSettings::default()
        })
        .await;
        let orchestrator = Arc::new(orchestrator);

        let runner = Arc::clone(&orchestrator);
        let goal: JointConfiguration = [(LIFT, 1.0)].into_iter().collect();
        let handle = tokio::spawn(async move { runner.submit(MoveGoal::Joint(goal)).await });
        wait_for_state(&orchestrator, MotionState::Executing).await;

        assert_eq!(orchestrator.vertical_move(0.2).await, Err(MotionError::Busy));
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn attach_detach_round_trip_through_orchestrator() {
        let (_sim, orchestrator) = connected(SimSettings::default()).await;
        let objects = orchestrator.objects();
        let tilted = Pose::from_xyz_rpy("base_link", 0.45, 0.0, 0.3, 0.5, 0.4, 0.2);
        objects.add(ShapeKind::Cylinder, tilted).await.unwrap();
        objects.attach("cylinder").await.unwrap();
        orchestrator.ascend(0.13).await.unwrap();

        let freed = objects.detach().await.unwrap();
        let ee = orchestrator.current_pose().await.unwrap();
        assert!((freed.pose.position.x - ee.position.x).abs() < 1e-9);
        assert!((freed.pose.position.y - ee.position.y).abs() < 1e-9);
        let (roll, pitch, _) = freed.pose.rpy();
        assert!(roll.abs() < 1e-9 && pitch.abs() < 1e-9);
    }
}
