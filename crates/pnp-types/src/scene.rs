//! World model: collision objects, attachments and scene snapshots.
//!
//! A [`SceneSnapshot`] is either a full point-in-time view (`is_diff ==
//! false`) or an incremental change to publish (`is_diff == true`).  World
//! objects are keyed by id so ids are unique within any snapshot.
//!
//! # Diff semantics
//!
//! [`SceneSnapshot::apply_diff`] merges a diff into a full snapshot:
//!
//! | Entry | Operation | Effect |
//! |---|---|---|
//! | world | `Add` | insert or replace; releases an attachment with the same id |
//! | world | `Remove` | delete the world object |
//! | attached | `Add` | attach to the link, removing the id from the world |
//! | attached | `Remove` | drop the attachment |

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pnp_geometry::Pose;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::JointConfiguration;

/// Geometry of a collision object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Box { x: f64, y: f64, z: f64 },
    Cylinder { height: f64, radius: f64 },
    /// Mesh loaded by the scene server from a resource URI.
    Mesh { resource: String },
}

impl Shape {
    /// Height of the centre above the supporting surface when the shape
    /// stands upright.  Meshes carry their own origin and have none.
    pub fn resting_height(&self) -> Option<f64> {
        match self {
            Shape::Box { z, .. } => Some(z / 2.0),
            Shape::Cylinder { height, .. } => Some(height / 2.0),
            Shape::Mesh { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectOperation {
    Add,
    Remove,
}

/// A named geometric entity tracked in the world model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionObject {
    pub id: String,
    pub shape: Shape,
    pub pose: Pose,
    pub operation: ObjectOperation,
}

impl CollisionObject {
    /// A new object tagged [`ObjectOperation::Add`].
    pub fn new(id: impl Into<String>, shape: Shape, pose: Pose) -> Self {
        Self {
            id: id.into(),
            shape,
            pose,
            operation: ObjectOperation::Add,
        }
    }

    pub fn with_operation(mut self, operation: ObjectOperation) -> Self {
        self.operation = operation;
        self
    }
}

/// A collision object rigidly bound to a robot link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedObject {
    pub link_name: String,
    pub object: CollisionObject,
}

/// Joint state plus whatever the robot is carrying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    pub joint_state: JointConfiguration,
    pub attached_objects: Vec<AttachedObject>,
}

/// Point-in-time view of robot state and world objects.
///
/// Authoritative only at `stamp`; fetch a fresh one for every decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub id: Uuid,
    pub stamp: DateTime<Utc>,
    pub is_diff: bool,
    pub robot_state: RobotState,
    pub world: BTreeMap<String, CollisionObject>,
}

impl SceneSnapshot {
    /// A full (non-diff) snapshot stamped now.
    pub fn full(robot_state: RobotState, world: BTreeMap<String, CollisionObject>) -> Self {
        Self {
            id: Uuid::new_v4(),
            stamp: Utc::now(),
            is_diff: false,
            robot_state,
            world,
        }
    }

    /// An empty diff stamped now.
    pub fn diff() -> Self {
        Self {
            is_diff: true,
            ..Self::full(RobotState::default(), BTreeMap::new())
        }
    }

    /// Insert (or replace) a world entry keyed by its id.
    pub fn insert_object(&mut self, object: CollisionObject) {
        self.world.insert(object.id.clone(), object);
    }

    pub fn find_object(&self, id: &str) -> Option<&CollisionObject> {
        self.world.get(id)
    }

    /// The first attached object, if any.
    pub fn attached(&self) -> Option<&AttachedObject> {
        self.robot_state.attached_objects.first()
    }

    pub fn is_attached(&self, id: &str) -> bool {
        self.robot_state
            .attached_objects
            .iter()
            .any(|a| a.object.id == id)
    }

    /// Number of world and attached objects not tagged for removal.
    pub fn live_object_count(&self) -> usize {
        let world = self
            .world
            .values()
            .filter(|o| o.operation == ObjectOperation::Add)
            .count();
        let attached = self
            .robot_state
            .attached_objects
            .iter()
            .filter(|a| a.object.operation == ObjectOperation::Add)
            .count();
        world + attached
    }

    /// Merge `diff` into this full snapshot.  Joint state in the diff is
    /// ignored; it belongs to the controller.
    pub fn apply_diff(&mut self, diff: &SceneSnapshot) {
        for attached in &diff.robot_state.attached_objects {
            self.apply_attached(attached);
        }
        for object in diff.world.values() {
            match object.operation {
                ObjectOperation::Add => {
                    self.robot_state
                        .attached_objects
                        .retain(|a| a.object.id != object.id);
                    self.world.insert(object.id.clone(), object.clone());
                }
                ObjectOperation::Remove => {
                    self.world.remove(&object.id);
                }
            }
        }
    }

    /// Apply a single attachment change.
    pub fn apply_attached(&mut self, attached: &AttachedObject) {
        let id = &attached.object.id;
        self.robot_state
            .attached_objects
            .retain(|a| &a.object.id != id);
        if attached.object.operation == ObjectOperation::Add {
            self.world.remove(id);
            self.robot_state.attached_objects.push(attached.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cylinder(id: &str, x: f64) -> CollisionObject {
        CollisionObject::new(
            id,
            Shape::Cylinder {
                height: 0.13,
                radius: 0.015,
            },
            Pose::from_xyz_rpy("base_link", x, 0.0, 0.065, 0.0, 0.0, 0.0),
        )
    }

    fn scene_with(objects: &[CollisionObject]) -> SceneSnapshot {
        let mut scene = SceneSnapshot::full(RobotState::default(), BTreeMap::new());
        for o in objects {
            scene.insert_object(o.clone());
        }
        scene
    }

    #[test]
    fn add_diff_keeps_unrelated_objects() {
        let mut scene = scene_with(&[cylinder("a", 0.1)]);
        let mut diff = SceneSnapshot::diff();
        diff.insert_object(cylinder("b", 0.2));
        scene.apply_diff(&diff);
        assert!(scene.find_object("a").is_some());
        assert!(scene.find_object("b").is_some());
    }

    #[test]
    fn add_diff_replaces_same_id() {
        let mut scene = scene_with(&[cylinder("a", 0.1)]);
        let mut diff = SceneSnapshot::diff();
        diff.insert_object(cylinder("a", 0.4));
        scene.apply_diff(&diff);
        assert_eq!(scene.world.len(), 1);
        assert!((scene.find_object("a").unwrap().pose.position.x - 0.4).abs() < 1e-12);
    }

    #[test]
    fn remove_diff_deletes_object() {
        let mut scene = scene_with(&[cylinder("a", 0.1), cylinder("b", 0.2)]);
        let mut diff = SceneSnapshot::diff();
        diff.insert_object(cylinder("a", 0.1).with_operation(ObjectOperation::Remove));
        scene.apply_diff(&diff);
        assert!(scene.find_object("a").is_none());
        assert_eq!(scene.live_object_count(), 1);
    }

    #[test]
    fn attaching_moves_object_out_of_world() {
        let mut scene = scene_with(&[cylinder("a", 0.1)]);
        scene.apply_attached(&AttachedObject {
            link_name: "link_7".into(),
            object: cylinder("a", 0.1),
        });
        assert!(scene.find_object("a").is_none());
        assert!(scene.is_attached("a"));
        assert_eq!(scene.attached().unwrap().link_name, "link_7");
    }

    #[test]
    fn world_add_releases_attachment() {
        let mut scene = scene_with(&[]);
        scene.apply_attached(&AttachedObject {
            link_name: "link_7".into(),
            object: cylinder("a", 0.1),
        });
        let mut diff = SceneSnapshot::diff();
        diff.insert_object(cylinder("a", 0.3));
        scene.apply_diff(&diff);
        assert!(!scene.is_attached("a"));
        assert!(scene.find_object("a").is_some());
    }

    #[test]
    fn attached_remove_drops_attachment() {
        let mut scene = scene_with(&[]);
        let attached = AttachedObject {
            link_name: "link_7".into(),
            object: cylinder("a", 0.1),
        };
        scene.apply_attached(&attached);
        let mut diff = SceneSnapshot::diff();
        diff.robot_state.attached_objects.push(AttachedObject {
            object: attached.object.clone().with_operation(ObjectOperation::Remove),
            ..attached
        });
        scene.apply_diff(&diff);
        assert!(scene.attached().is_none());
        assert_eq!(scene.live_object_count(), 0);
    }

    #[test]
    fn primitives_rest_on_half_their_height() {
        let box_shape = Shape::Box { x: 0.5, y: 0.5, z: 0.5 };
        let cylinder = Shape::Cylinder { height: 0.13, radius: 0.015 };
        let mesh = Shape::Mesh { resource: "package://cell/meshes/part.stl".into() };
        assert_eq!(box_shape.resting_height(), Some(0.25));
        assert_eq!(cylinder.resting_height(), Some(0.065));
        assert_eq!(mesh.resting_height(), None);
    }

    #[test]
    fn shape_serializes_with_type_tag() {
        let json = serde_json::to_string(&Shape::Box { x: 0.5, y: 0.5, z: 0.5 }).unwrap();
        assert!(json.contains("\"type\":\"box\""));
        let op = serde_json::to_string(&ObjectOperation::Remove).unwrap();
        assert_eq!(op, "\"REMOVE\"");
    }
}
