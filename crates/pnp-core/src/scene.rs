//! Scene Model.
//!
//! Pull-based access to the world model.  Nothing is cached: every call to
//! [`SceneModel::refresh`] returns a fresh, owned [`SceneSnapshot`] and the
//! caller decides against that one value.
//!
//! Publications are followed by [`SceneModel::await_confirmation`], which
//! polls fresh snapshots with backoff until the expected effect shows up or
//! the confirmation timeout elapses.

use std::sync::Arc;
use std::time::Duration;

use pnp_middleware::SceneService;
use pnp_types::{AttachedObject, CollisionObject, SceneError, SceneSnapshot};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::handshake::RetryPolicy;

pub struct SceneModel {
    service: Arc<dyn SceneService>,
    poll: RetryPolicy,
    confirm_timeout: Duration,
}

impl SceneModel {
    pub fn new(service: Arc<dyn SceneService>, confirm_timeout: Duration) -> Self {
        Self {
            service,
            poll: RetryPolicy {
                max_attempts: u32::MAX,
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(200),
            },
            confirm_timeout,
        }
    }

    /// Blocking pull of the authoritative scene.
    pub async fn refresh(&self) -> Result<SceneSnapshot, SceneError> {
        let snapshot = self.service.request_state().await.map_err(|e| {
            error!(error = %e, "scene request failed");
            SceneError::from(e)
        })?;
        debug!(
            id = %snapshot.id,
            objects = snapshot.world.len(),
            attached = snapshot.robot_state.attached_objects.len(),
            "scene refreshed"
        );
        Ok(snapshot)
    }

    /// Look `id` up in a freshly fetched snapshot.
    pub async fn find_object(&self, id: &str) -> Result<Option<CollisionObject>, SceneError> {
        Ok(self.refresh().await?.find_object(id).cloned())
    }

    pub async fn publish_diff(&self, diff: SceneSnapshot) -> Result<(), SceneError> {
        self.service.publish_diff(diff).await.map_err(|e| {
            error!(error = %e, "scene diff not published");
            SceneError::from(e)
        })
    }

    pub async fn publish_attached(&self, attached: AttachedObject) -> Result<(), SceneError> {
        self.service.publish_attached(attached).await.map_err(|e| {
            error!(error = %e, "attachment not published");
            SceneError::from(e)
        })
    }

    /// Poll until `confirmed` holds for a fresh snapshot, returning that
    /// snapshot.
    pub async fn await_confirmation<F>(
        &self,
        operation: &str,
        confirmed: F,
    ) -> Result<SceneSnapshot, SceneError>
    where
        F: Fn(&SceneSnapshot) -> bool,
    {
        let deadline = Instant::now() + self.confirm_timeout;
        let mut attempt = 0;
        loop {
            let snapshot = self.refresh().await?;
            if confirmed(&snapshot) {
                debug!(operation, polls = attempt + 1, "scene change confirmed");
                return Ok(snapshot);
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(operation, timeout = ?self.confirm_timeout, "scene change not confirmed");
                return Err(SceneError::Unconfirmed {
                    operation: operation.to_string(),
                    timeout: self.confirm_timeout,
                });
            }
            let delay = self.poll.delay_for(attempt).min(deadline - now);
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }
}
