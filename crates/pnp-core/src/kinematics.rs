//! Kinematics Client.
//!
//! Wraps forward/inverse kinematics calls and classifies the solver outcome.
//! Only [`ErrorCode::SUCCESS`] is accepted; there is no internal retry.

use std::sync::Arc;
use std::time::Duration;

use pnp_geometry::Pose;
use pnp_middleware::{FkRequest, IkRequest, KinematicsService};
use pnp_types::{ErrorCode, JointConfiguration, SolverError, SolverOp};
use tracing::{debug, error};

use crate::config::ArmConfig;

/// Solver attempts per inverse request.
pub const IK_ATTEMPTS: u32 = 100;
/// Solver time budget per inverse request.
pub const IK_TIMEOUT: Duration = Duration::from_millis(100);

pub struct KinematicsClient {
    service: Arc<dyn KinematicsService>,
    base_frame: String,
    ee_link: String,
    group_name: String,
    /// Full joint state; requests override it with the caller's joints.
    skeleton: JointConfiguration,
}

impl KinematicsClient {
    pub fn new(
        service: Arc<dyn KinematicsService>,
        config: &ArmConfig,
        skeleton: JointConfiguration,
    ) -> Self {
        Self {
            service,
            base_frame: config.base_frame.clone(),
            ee_link: config.ee_frame.clone(),
            group_name: config.group_name.clone(),
            skeleton,
        }
    }

    /// End-effector pose for `joints`, which may be partial.
    pub async fn compute_forward(&self, joints: &JointConfiguration) -> Result<Pose, SolverError> {
        let request = FkRequest {
            base_frame: self.base_frame.clone(),
            links: vec![self.ee_link.clone()],
            robot_state: self.skeleton.overridden_by(joints),
        };
        let response = self.service.compute_fk(request).await.map_err(|e| {
            error!(error = %e, "forward kinematics call failed");
            SolverError::from(e)
        })?;
        if !response.error_code.is_success() {
            error!(code = %response.error_code, "forward kinematics rejected");
            return Err(SolverError::Rejected {
                op: SolverOp::Forward,
                code: response.error_code,
            });
        }
        let pose = response
            .link_names
            .iter()
            .position(|link| *link == self.ee_link)
            .and_then(|i| response.poses.get(i))
            .cloned()
            .ok_or_else(|| SolverError::MissingPose {
                link: self.ee_link.clone(),
            })?;
        debug!(%pose, "forward kinematics");
        Ok(pose)
    }

    /// Joint solution reaching `pose`, seeded from the skeleton.
    pub async fn compute_inverse(&self, pose: &Pose) -> Result<JointConfiguration, SolverError> {
        self.compute_inverse_seeded(pose, &self.skeleton).await
    }

    pub async fn compute_inverse_seeded(
        &self,
        pose: &Pose,
        seed: &JointConfiguration,
    ) -> Result<JointConfiguration, SolverError> {
        let request = IkRequest {
            group_name: self.group_name.clone(),
            ee_link: self.ee_link.clone(),
            target: pose.clone(),
            seed: self.skeleton.overridden_by(seed),
            attempts: IK_ATTEMPTS,
            timeout: IK_TIMEOUT,
            avoid_collisions: true,
        };
        let response = self.service.compute_ik(request).await.map_err(|e| {
            error!(error = %e, "inverse kinematics call failed");
            SolverError::from(e)
        })?;
        match response.error_code {
            ErrorCode::SUCCESS => {
                debug!(%pose, joints = response.solution.len(), "inverse kinematics");
                Ok(response.solution)
            }
            code => {
                error!(%pose, %code, "inverse kinematics rejected");
                Err(SolverError::Rejected {
                    op: SolverOp::Inverse,
                    code,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pnp_middleware::sim::{BASE_YAW, LIFT, REACH};
    use pnp_middleware::{FkResponse, IkResponse, Probe, SimBackend, SimSettings};
    use pnp_types::ServiceError;
    use std::sync::Mutex;

    fn sim_client() -> (Arc<SimBackend>, KinematicsClient) {
        let sim = SimBackend::start(SimSettings::default());
        let client = KinematicsClient::new(sim.clone(), &ArmConfig::default(), sim.joints());
        (sim, client)
    }

    /// Records the last request and answers with a fixed code.
    struct Recorder {
        code: ErrorCode,
        last_ik: Mutex<Option<IkRequest>>,
        last_fk: Mutex<Option<FkRequest>>,
    }

    impl Recorder {
        fn new(code: ErrorCode) -> Arc<Self> {
            Arc::new(Self {
                code,
                last_ik: Mutex::new(None),
                last_fk: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Probe for Recorder {
        async fn is_ready(&self) -> bool {
            true
        }
    }

    #[async_trait]
    impl KinematicsService for Recorder {
        async fn compute_fk(&self, request: FkRequest) -> Result<FkResponse, ServiceError> {
            *self.last_fk.lock().unwrap() = Some(request);
            Ok(FkResponse {
                poses: vec![],
                link_names: vec![],
                error_code: self.code,
            })
        }

        async fn compute_ik(&self, request: IkRequest) -> Result<IkResponse, ServiceError> {
            *self.last_ik.lock().unwrap() = Some(request);
            Ok(IkResponse {
                solution: JointConfiguration::new(),
                error_code: self.code,
            })
        }
    }

    #[tokio::test]
    async fn forward_then_inverse_round_trips() {
        let (sim, client) = sim_client();
        let pose = client.compute_forward(&sim.joints()).await.unwrap();
        let joints = client.compute_inverse(&pose).await.unwrap();
        let again = client.compute_forward(&joints).await.unwrap();
        assert!(pose.approx_eq(&again, 1e-9));
    }

    #[tokio::test]
    async fn partial_joints_are_completed_from_skeleton() {
        let (_sim, client) = sim_client();
        let lifted: JointConfiguration = [(LIFT, 0.7)].into_iter().collect();
        let pose = client.compute_forward(&lifted).await.unwrap();
        assert!((pose.position.z - 0.7).abs() < 1e-12);
    }

    #[tokio::test]
    async fn unreachable_pose_is_always_a_solver_error() {
        let (sim, client) = sim_client();
        for (x, y, z) in [(3.0, 0.0, 0.5), (0.0, 0.0, 0.5), (0.4, 0.4, -1.0), (0.1, 2.0, 2.0)] {
            let target = Pose::from_xyz_rpy("base_link", x, y, z, 0.0, 0.0, 0.0);
            let err = client.compute_inverse(&target).await.unwrap_err();
            assert_eq!(
                err,
                SolverError::Rejected {
                    op: SolverOp::Inverse,
                    code: ErrorCode::NO_IK_SOLUTION,
                }
            );
        }
        // One call per request, no hidden retries.
        assert_eq!(sim.calls().ik, 4);
    }

    #[tokio::test]
    async fn inverse_request_uses_fixed_parameters() {
        let recorder = Recorder::new(ErrorCode::SUCCESS);
        let skeleton: JointConfiguration = [(BASE_YAW, 0.0), (REACH, 0.4)].into_iter().collect();
        let client = KinematicsClient::new(recorder.clone(), &ArmConfig::default(), skeleton);
        client
            .compute_inverse(&Pose::identity("base_link"))
            .await
            .unwrap();

        let request = recorder.last_ik.lock().unwrap().clone().unwrap();
        assert_eq!(request.attempts, 100);
        assert_eq!(request.timeout, Duration::from_millis(100));
        assert!(request.avoid_collisions);
        assert_eq!(request.ee_link, "link_7");
        assert_eq!(request.seed.get(REACH), Some(0.4));
    }

    #[tokio::test]
    async fn non_success_forward_code_is_rejected() {
        let recorder = Recorder::new(ErrorCode::INVALID_LINK_NAME);
        let client = KinematicsClient::new(recorder.clone(), &ArmConfig::default(), JointConfiguration::new());
        let joints: JointConfiguration = [(LIFT, 0.2)].into_iter().collect();
        let err = client.compute_forward(&joints).await.unwrap_err();
        assert_eq!(
            err,
            SolverError::Rejected {
                op: SolverOp::Forward,
                code: ErrorCode::INVALID_LINK_NAME,
            }
        );
        let request = recorder.last_fk.lock().unwrap().clone().unwrap();
        assert_eq!(request.links, vec!["link_7".to_string()]);
        assert_eq!(request.robot_state.get(LIFT), Some(0.2));
    }

    #[tokio::test]
    async fn success_without_pose_is_missing_pose() {
        let recorder = Recorder::new(ErrorCode::SUCCESS);
        let client = KinematicsClient::new(recorder, &ArmConfig::default(), JointConfiguration::new());
        let err = client.compute_forward(&JointConfiguration::new()).await.unwrap_err();
        assert!(matches!(err, SolverError::MissingPose { .. }));
    }

    #[tokio::test]
    async fn transport_failure_is_classified() {
        let (sim, client) = sim_client();
        sim.set_offline(true);
        let err = client.compute_forward(&JointConfiguration::new()).await.unwrap_err();
        assert!(matches!(err, SolverError::Transport(_)));
    }
}
