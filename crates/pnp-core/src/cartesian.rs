//! Cartesian Path Client.
//!
//! Requests straight-line interpolated paths for short linear moves and
//! applies the completion-fraction acceptance policy.

use std::sync::Arc;

use pnp_geometry::Pose;
use pnp_middleware::{CartesianPathRequest, CartesianPathService};
use pnp_types::{JointConfiguration, MotionPlan, PathError};
use tracing::{error, info, warn};

use crate::config::ArmConfig;

/// Maximum end-effector travel between interpolated points (m).
pub const MAX_STEP: f64 = 0.05;
/// Joint-space discontinuity check disabled.
pub const JUMP_THRESHOLD: f64 = 0.0;

/// An accepted linear path.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearPath {
    pub plan: MotionPlan,
    /// Share of the requested path the plan covers.
    pub fraction: f64,
}

pub struct CartesianPathClient {
    service: Arc<dyn CartesianPathService>,
    group_name: String,
    base_frame: String,
    ee_link: String,
    min_fraction: f64,
}

impl CartesianPathClient {
    pub fn new(service: Arc<dyn CartesianPathService>, config: &ArmConfig) -> Self {
        Self {
            service,
            group_name: config.group_name.clone(),
            base_frame: config.base_frame.clone(),
            ee_link: config.ee_frame.clone(),
            min_fraction: config.min_path_fraction,
        }
    }

    /// Plan through `waypoints` starting at `start_state`.
    ///
    /// Negative fractions mean the service could not compute a path at all
    /// and always fail, as does a plan that never leaves the start state.
    /// Otherwise the fraction must reach the configured minimum.
    pub async fn plan_linear(
        &self,
        waypoints: &[Pose],
        start_state: &JointConfiguration,
    ) -> Result<LinearPath, PathError> {
        if waypoints.is_empty() {
            return Err(PathError::NoWaypoints);
        }
        if let Some(index) = waypoints
            .iter()
            .position(|w| w.position.iter().any(|c| !c.is_finite()))
        {
            error!(index, "cartesian waypoint is not finite");
            return Err(PathError::NonFiniteWaypoint { index });
        }
        let request = CartesianPathRequest {
            group_name: self.group_name.clone(),
            base_frame: self.base_frame.clone(),
            ee_link: self.ee_link.clone(),
            waypoints: waypoints.to_vec(),
            max_step: MAX_STEP,
            jump_threshold: JUMP_THRESHOLD,
            avoid_collisions: true,
            start_state: start_state.clone(),
        };
        let response = self
            .service
            .compute_cartesian_path(request)
            .await
            .map_err(|e| {
                error!(error = %e, "cartesian path call failed");
                PathError::from(e)
            })?;

        let fraction = response.fraction;
        if !response.error_code.is_success() {
            error!(code = %response.error_code, "cartesian path rejected");
            return Err(PathError::Rejected {
                code: response.error_code,
            });
        }
        if fraction.is_nan() || fraction <= 0.0 || response.solution.len() < 2 {
            error!(fraction, "cartesian path could not be computed");
            return Err(PathError::Infeasible { fraction });
        }
        if fraction < self.min_fraction {
            warn!(fraction, required = self.min_fraction, "cartesian path incomplete");
            return Err(PathError::Incomplete {
                fraction,
                required: self.min_fraction,
            });
        }
        info!(fraction = fraction * 100.0, points = response.solution.len(), "cartesian path computed");
        Ok(LinearPath {
            plan: response.solution,
            fraction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pnp_middleware::{CartesianPathResponse, Probe, SimBackend, SimSettings};
    use pnp_types::{ErrorCode, ServiceError};
    use pnp_types::TrajectoryPoint;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers every request with the same fraction and code.
    struct FixedPath {
        fraction: f64,
        code: ErrorCode,
        points: usize,
        calls: AtomicUsize,
    }

    impl FixedPath {
        fn new(fraction: f64, code: ErrorCode) -> Arc<Self> {
            Self::with_points(fraction, code, 2)
        }

        fn with_points(fraction: f64, code: ErrorCode, points: usize) -> Arc<Self> {
            Arc::new(Self {
                fraction,
                code,
                points,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Probe for FixedPath {
        async fn is_ready(&self) -> bool {
            true
        }
    }

    #[async_trait]
    impl CartesianPathService for FixedPath {
        async fn compute_cartesian_path(
            &self,
            request: CartesianPathRequest,
        ) -> Result<CartesianPathResponse, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.max_step, 0.05);
            assert_eq!(request.jump_threshold, 0.0);
            assert!(request.avoid_collisions);
            let points = (0..self.points)
                .map(|i| TrajectoryPoint {
                    positions: request.start_state.clone(),
                    time_from_start: Duration::from_millis(100 * i as u64),
                })
                .collect();
            Ok(CartesianPathResponse {
                solution: MotionPlan::new(request.group_name, points),
                fraction: self.fraction,
                error_code: self.code,
            })
        }
    }

    fn waypoint() -> Vec<Pose> {
        vec![Pose::from_xyz_rpy("base_link", 0.45, 0.0, 0.5, 0.0, 0.0, 0.0)]
    }

    fn client_with(service: Arc<FixedPath>, min: f64) -> CartesianPathClient {
        let config = ArmConfig {
            min_path_fraction: min,
            ..ArmConfig::default()
        };
        CartesianPathClient::new(service, &config)
    }

    #[tokio::test]
    async fn default_policy_accepts_any_non_negative_fraction() {
        let client = client_with(FixedPath::new(0.1, ErrorCode::SUCCESS), 0.0);
        let path = client.plan_linear(&waypoint(), &JointConfiguration::new()).await.unwrap();
        assert_eq!(path.fraction, 0.1);
    }

    #[tokio::test]
    async fn configured_minimum_rejects_short_paths() {
        let client = client_with(FixedPath::new(0.6, ErrorCode::SUCCESS), 0.95);
        let err = client.plan_linear(&waypoint(), &JointConfiguration::new()).await.unwrap_err();
        assert_eq!(
            err,
            PathError::Incomplete {
                fraction: 0.6,
                required: 0.95,
            }
        );
    }

    #[tokio::test]
    async fn negative_fraction_always_fails() {
        let client = client_with(FixedPath::new(-1.0, ErrorCode::SUCCESS), -5.0);
        let err = client.plan_linear(&waypoint(), &JointConfiguration::new()).await.unwrap_err();
        assert_eq!(err, PathError::Infeasible { fraction: -1.0 });
    }

    #[tokio::test]
    async fn non_success_code_is_rejected() {
        let client = client_with(FixedPath::new(1.0, ErrorCode::INVALID_GROUP_NAME), 0.0);
        let err = client.plan_linear(&waypoint(), &JointConfiguration::new()).await.unwrap_err();
        assert_eq!(
            err,
            PathError::Rejected {
                code: ErrorCode::INVALID_GROUP_NAME,
            }
        );
    }

    #[tokio::test]
    async fn empty_waypoints_never_reach_the_service() {
        let service = FixedPath::new(1.0, ErrorCode::SUCCESS);
        let client = client_with(service.clone(), 0.0);
        let err = client.plan_linear(&[], &JointConfiguration::new()).await.unwrap_err();
        assert_eq!(err, PathError::NoWaypoints);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn path_that_never_leaves_the_start_is_infeasible() {
        let client = client_with(FixedPath::new(0.0, ErrorCode::SUCCESS), 0.0);
        let err = client.plan_linear(&waypoint(), &JointConfiguration::new()).await.unwrap_err();
        assert_eq!(err, PathError::Infeasible { fraction: 0.0 });

        let client = client_with(FixedPath::with_points(0.5, ErrorCode::SUCCESS, 1), 0.0);
        let err = client.plan_linear(&waypoint(), &JointConfiguration::new()).await.unwrap_err();
        assert_eq!(err, PathError::Infeasible { fraction: 0.5 });
    }

    #[tokio::test]
    async fn non_finite_waypoints_never_reach_the_service() {
        let service = FixedPath::new(1.0, ErrorCode::SUCCESS);
        let client = client_with(service.clone(), 0.0);
        let mut waypoints = waypoint();
        waypoints.push(Pose::from_xyz_rpy("base_link", 0.45, 0.0, f64::NAN, 0.0, 0.0, 0.0));
        let err = client.plan_linear(&waypoints, &JointConfiguration::new()).await.unwrap_err();
        assert_eq!(err, PathError::NonFiniteWaypoint { index: 1 });
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn simulated_vertical_path_is_complete() {
        let sim = SimBackend::start(SimSettings::default());
        let client = CartesianPathClient::new(sim.clone(), &ArmConfig::default());
        let start = sim.joints();
        let here = pnp_middleware::sim::forward_kinematics("base_link", &start).unwrap();
        let path = client
            .plan_linear(&[pnp_geometry::with_height(&here, 0.25)], &start)
            .await
            .unwrap();
        assert!((path.fraction - 1.0).abs() < 1e-12);
        assert!(path.plan.len() > 1);
    }
}
