//! Startup handshake.
//!
//! Probes every collaborator with exponential backoff until it answers or
//! the attempt budget runs out, then reports which one never came up.

use std::time::Duration;

use pnp_middleware::{ArmServices, Probe};
use pnp_types::InitError;
use tracing::{debug, error, info};

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the zero-based `attempt`: doubled each time, capped at
    /// `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Probe `service` until it reports ready.  Returns the number of attempts
/// used.
pub async fn probe_until_ready<P: Probe + ?Sized>(
    name: &str,
    service: &P,
    policy: &RetryPolicy,
) -> Result<u32, InitError> {
    for attempt in 0..policy.max_attempts {
        if service.is_ready().await {
            debug!(service = name, attempts = attempt + 1, "service ready");
            return Ok(attempt + 1);
        }
        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }
    error!(service = name, attempts = policy.max_attempts, "service not available");
    Err(InitError::ServiceUnavailable {
        service: name.to_string(),
        attempts: policy.max_attempts,
    })
}

/// Wait for kinematics, cartesian path, motion and scene services in turn.
pub async fn wait_until_ready(services: &ArmServices, policy: &RetryPolicy) -> Result<(), InitError> {
    probe_until_ready("kinematics", &*services.kinematics, policy).await?;
    probe_until_ready("cartesian_path", &*services.cartesian, policy).await?;
    probe_until_ready("motion", &*services.motion, policy).await?;
    probe_until_ready("scene", &*services.scene, policy).await?;
    info!("all arm services ready");
    Ok(())
}
