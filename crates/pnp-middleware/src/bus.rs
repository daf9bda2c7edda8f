//! Scene topic channel.
//!
//! Uses [`tokio::sync::broadcast`] under the hood so the scene server and any
//! number of observers (loggers, the CLI) each receive every change.
//!
//! | Message | Typical traffic |
//! |---|---|
//! | [`SceneMessage::Diff`] | object adds, removes, detaches, clean-ups |
//! | [`SceneMessage::Attached`] | a single attach request |

use pnp_types::{AttachedObject, SceneSnapshot, ServiceError};
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered messages before slow subscribers start lagging.
const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum SceneMessage {
    Diff(SceneSnapshot),
    Attached(AttachedObject),
}

impl SceneMessage {
    fn kind(&self) -> &'static str {
        match self {
            SceneMessage::Diff(_) => "diff",
            SceneMessage::Attached(_) => "attached",
        }
    }
}

/// Shared scene channel.  All clones share the same underlying sender.
#[derive(Clone, Debug)]
pub struct SceneBus {
    sender: broadcast::Sender<SceneMessage>,
}

impl SceneBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish `message` to every subscriber.
    ///
    /// Returns the number of receivers handed the message.  Publishing with
    /// nobody listening is an error: no scene server would apply it.
    pub fn publish(&self, message: SceneMessage) -> Result<usize, ServiceError> {
        let kind = message.kind();
        match self.sender.send(message) {
            Ok(n) => {
                debug!(kind, receivers = n, "scene message published");
                Ok(n)
            }
            Err(broadcast::error::SendError(_)) => Err(ServiceError::new(
                "scene",
                format!("no subscribers for scene {kind}"),
            )),
        }
    }

    pub fn subscribe(&self) -> SceneReceiver {
        SceneReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for SceneBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver on the scene channel.
pub struct SceneReceiver {
    receiver: broadcast::Receiver<SceneMessage>,
}

impl SceneReceiver {
    /// Wait for the next message.
    ///
    /// * `Err(RecvError::Lagged(n))` – `n` messages were dropped; the caller
    ///   decides whether to resynchronise.
    /// * `Err(RecvError::Closed)` – every sender is gone.
    pub async fn recv(&mut self) -> Result<SceneMessage, broadcast::error::RecvError> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnp_geometry::Pose;
    use pnp_types::{CollisionObject, Shape};

    fn attached() -> AttachedObject {
        AttachedObject {
            link_name: "link_7".into(),
            object: CollisionObject::new(
                "box",
                Shape::Box { x: 0.5, y: 0.5, z: 0.5 },
                Pose::identity("base_link"),
            ),
        }
    }

    #[test]
    fn publish_without_subscribers_is_an_error() {
        let bus = SceneBus::default();
        let err = bus.publish(SceneMessage::Diff(SceneSnapshot::diff())).unwrap_err();
        assert_eq!(err.service, "scene");
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_message() {
        let bus = SceneBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let n = bus.publish(SceneMessage::Attached(attached())).unwrap();
        assert_eq!(n, 2);
        assert_eq!(a.recv().await.unwrap(), SceneMessage::Attached(attached()));
        assert_eq!(b.recv().await.unwrap(), SceneMessage::Attached(attached()));
    }

    #[tokio::test]
    async fn receiver_sees_closed_when_bus_dropped() {
        let bus = SceneBus::new(4);
        let mut rx = bus.subscribe();
        drop(bus);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
