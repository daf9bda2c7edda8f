//! Object Lifecycle Manager.
//!
//! Adds, attaches, detaches and clears collision objects.  Each operation
//! works from a fresh snapshot, publishes exactly one change, and then waits
//! until the scene reflects it.

use std::fmt;
use std::str::FromStr;

use pnp_geometry::{Pose, level, with_height};
use pnp_types::{
    AttachedObject, CollisionObject, MotionError, ObjectOperation, SceneError, SceneSnapshot,
    Shape,
};
use tracing::{info, instrument};

use crate::kinematics::KinematicsClient;
use crate::scene::SceneModel;

pub const CYLINDER_HEIGHT: f64 = 0.13;
pub const CYLINDER_RADIUS: f64 = 0.015;
pub const BOX_SIDE: f64 = 0.5;
pub const MESH_PACKAGE: &str = "package://lwr_pick_n_place/meshes";

/// Pose tolerance when checking that a published pose landed.
const POSE_TOLERANCE: f64 = 1e-6;

/// Catalogue of objects the cell knows how to model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Cylinder,
    Box,
    /// Pin part, modelled from a mesh.
    Epingle,
    /// Placement plate, modelled from a mesh.
    Plaque,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 4] = [
        ShapeKind::Cylinder,
        ShapeKind::Box,
        ShapeKind::Epingle,
        ShapeKind::Plaque,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Cylinder => "cylinder",
            ShapeKind::Box => "box",
            ShapeKind::Epingle => "epingle",
            ShapeKind::Plaque => "plaque",
        }
    }

    pub fn shape(self) -> Shape {
        match self {
            ShapeKind::Cylinder => Shape::Cylinder {
                height: CYLINDER_HEIGHT,
                radius: CYLINDER_RADIUS,
            },
            ShapeKind::Box => Shape::Box {
                x: BOX_SIDE,
                y: BOX_SIDE,
                z: BOX_SIDE,
            },
            ShapeKind::Epingle | ShapeKind::Plaque => Shape::Mesh {
                resource: format!("{MESH_PACKAGE}/{}.stl", self.name()),
            },
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShapeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShapeKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown shape '{s}' (expected cylinder, box, epingle or plaque)"))
    }
}

/// Lifecycle operations bound to one orchestrator's scene and kinematics.
pub struct ObjectLifecycle<'a> {
    scene: &'a SceneModel,
    kinematics: &'a KinematicsClient,
    ee_link: &'a str,
    table_height: f64,
}

impl<'a> ObjectLifecycle<'a> {
    pub fn new(
        scene: &'a SceneModel,
        kinematics: &'a KinematicsClient,
        ee_link: &'a str,
        table_height: f64,
    ) -> Self {
        Self {
            scene,
            kinematics,
            ee_link,
            table_height,
        }
    }

    /// Add a catalogue object under its catalogue name.
    pub async fn add(&self, kind: ShapeKind, pose: Pose) -> Result<CollisionObject, SceneError> {
        self.add_with_id(kind.name(), kind, pose).await
    }

    /// Add (or replace) a single object.  Other objects are left alone.
    #[instrument(skip_all, fields(object_id = %id, shape = %kind))]
    pub async fn add_with_id(
        &self,
        id: &str,
        kind: ShapeKind,
        pose: Pose,
    ) -> Result<CollisionObject, SceneError> {
        let object = CollisionObject::new(id, kind.shape(), pose);
        let mut diff = SceneSnapshot::diff();
        diff.insert_object(object.clone());
        self.scene.publish_diff(diff).await?;

        self.scene
            .await_confirmation("add", |s| {
                s.find_object(id)
                    .is_some_and(|o| o.shape == object.shape && o.pose.approx_eq(&object.pose, POSE_TOLERANCE))
            })
            .await?;
        info!(pose = %object.pose, "object added");
        Ok(object)
    }

    /// Bind the object `id` to the end-effector.
    #[instrument(skip_all, fields(object_id = %id))]
    pub async fn attach(&self, id: &str) -> Result<AttachedObject, SceneError> {
        let snapshot = self.scene.refresh().await?;
        if let Some(current) = snapshot.attached() {
            return Err(SceneError::AlreadyAttached(current.object.id.clone()));
        }
        let object = snapshot
            .find_object(id)
            .cloned()
            .ok_or_else(|| SceneError::NotFound(id.to_string()))?;

        let attached = AttachedObject {
            link_name: self.ee_link.to_string(),
            object,
        };
        self.scene.publish_attached(attached.clone()).await?;
        self.scene
            .await_confirmation("attach", |s| s.is_attached(id))
            .await?;
        info!(link = %self.ee_link, "object attached");
        Ok(attached)
    }

    /// Release the attached object where the end-effector is, levelled.
    /// Primitives are set down on the table; meshes keep the end-effector
    /// height since their origin is arbitrary.
    #[instrument(skip_all)]
    pub async fn detach(&self) -> Result<CollisionObject, MotionError> {
        let snapshot = self.scene.refresh().await?;
        let attached = snapshot.attached().cloned().ok_or(SceneError::NothingAttached)?;
        let ee_pose = self
            .kinematics
            .compute_forward(&snapshot.robot_state.joint_state)
            .await?;

        let pose = match attached.object.shape.resting_height() {
            Some(half) => with_height(&level(&ee_pose), self.table_height + half),
            None => level(&ee_pose),
        };
        let freed = CollisionObject::new(attached.object.id.clone(), attached.object.shape.clone(), pose);
        let mut diff = SceneSnapshot::diff();
        diff.robot_state.attached_objects.push(AttachedObject {
            object: attached.object.with_operation(ObjectOperation::Remove),
            ..attached
        });
        diff.insert_object(freed.clone());
        self.scene.publish_diff(diff).await?;

        let id = freed.id.as_str();
        self.scene
            .await_confirmation("detach", |s| {
                !s.is_attached(id)
                    && s.find_object(id)
                        .is_some_and(|o| o.pose.approx_eq(&freed.pose, POSE_TOLERANCE))
            })
            .await?;
        info!(object_id = %freed.id, pose = %freed.pose, "object detached");
        Ok(freed)
    }

    /// Remove every world and attached object in one diff.  Returns how
    /// many objects were removed.
    #[instrument(skip_all)]
    pub async fn clean(&self) -> Result<usize, SceneError> {
        let snapshot = self.scene.refresh().await?;
        let mut diff = SceneSnapshot::diff();
        for attached in &snapshot.robot_state.attached_objects {
            diff.robot_state.attached_objects.push(AttachedObject {
                link_name: attached.link_name.clone(),
                object: attached.object.clone().with_operation(ObjectOperation::Remove),
            });
        }
        for object in snapshot.world.values() {
            diff.insert_object(object.clone().with_operation(ObjectOperation::Remove));
        }
        let removed = diff.world.len() + diff.robot_state.attached_objects.len();
        self.scene.publish_diff(diff).await?;

        self.scene
            .await_confirmation("clean", |s| s.live_object_count() == 0)
            .await?;
        info!(removed, "scene cleaned");
        Ok(removed)
    }
}
