//! Scene components shared by the engine systems.
//!
//! - [`Transform`]: local position/rotation/scale, an optional parent and a
//!   cached world matrix.
//! - [`RigidBodyComponent`]: links an entity to a body in the
//!   [`PhysicsWorld`](crate::physics::PhysicsWorld).
//! - [`ScriptComponent`]: factory name plus the lazily constructed
//!   [`Behavior`] instance.
//!
//! The hierarchy helpers ([`world_matrix`], [`world_pose`],
//! [`set_world_pose`], [`update_world_matrices`]) resolve parents through the
//! [`Scene`]. A parent handle that is stale or has no `Transform` makes the
//! child a root.

use std::fmt;

use cairn_ecs::entity::EntityId;
use cairn_ecs::scene::Scene;
use rapier3d::na::{Isometry3, Matrix4, Point3, Translation3, UnitQuaternion, Vector3};
use tracing::warn;

use crate::animation::Animator;
use crate::physics::BodyHandle;
use crate::script::Behavior;

/// Parent chains longer than this are treated as cycles and cut.
pub const MAX_HIERARCHY_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Spatial state of an entity, relative to its parent (or the world when it
/// has none).
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
    pub parent: Option<EntityId>,
    world: Matrix4<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::repeat(1.0),
            parent: None,
            world: Matrix4::identity(),
        }
    }
}

impl Transform {
    /// Root transform at `position`.
    pub fn from_position(position: Vector3<f32>) -> Self {
        let mut t = Self {
            position,
            ..Self::default()
        };
        t.world = t.local_matrix();
        t
    }

    pub fn from_xyz(x: f32, y: f32, z: f32) -> Self {
        Self::from_position(Vector3::new(x, y, z))
    }

    pub fn with_rotation(mut self, rotation: UnitQuaternion<f32>) -> Self {
        self.rotation = rotation;
        self.world = self.local_matrix();
        self
    }

    pub fn with_scale(mut self, scale: Vector3<f32>) -> Self {
        self.scale = scale;
        self.world = self.local_matrix();
        self
    }

    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// `translation * rotation * scale`.
    pub fn local_matrix(&self) -> Matrix4<f32> {
        Translation3::from(self.position).to_homogeneous()
            * self.rotation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&self.scale)
    }

    /// Local position and rotation as a rigid pose. Scale is not part of a
    /// pose.
    pub fn local_pose(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position), self.rotation)
    }

    /// World matrix as of the last [`update_world_matrices`] pass.
    pub fn cached_world_matrix(&self) -> &Matrix4<f32> {
        &self.world
    }
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

/// World matrix and accumulated world rotation of `entity`.
fn resolve_chain(scene: &Scene, entity: EntityId) -> Option<(Matrix4<f32>, UnitQuaternion<f32>)> {
    let mut current = scene.get_component::<Transform>(entity)?;
    let mut matrix = current.local_matrix();
    let mut rotation = current.rotation;
    let mut depth = 0;
    while let Some(parent) = current.parent {
        let Some(parent_t) = scene.get_component::<Transform>(parent) else {
            break;
        };
        depth += 1;
        if depth > MAX_HIERARCHY_DEPTH {
            warn!(entity = %entity, "transform parent chain too deep, treating as root");
            break;
        }
        matrix = parent_t.local_matrix() * matrix;
        rotation = parent_t.rotation * rotation;
        current = parent_t;
    }
    Some((matrix, rotation))
}

/// Current world matrix of `entity`, computed through its parent chain.
pub fn world_matrix(scene: &Scene, entity: EntityId) -> Option<Matrix4<f32>> {
    resolve_chain(scene, entity).map(|(m, _)| m)
}

/// World position and rotation of `entity`.
pub fn world_pose(scene: &Scene, entity: EntityId) -> Option<Isometry3<f32>> {
    let (matrix, rotation) = resolve_chain(scene, entity)?;
    let origin = matrix.transform_point(&Point3::origin());
    Some(Isometry3::from_parts(Translation3::from(origin.coords), rotation))
}

/// Valid parent of `entity`, if it has one.
pub fn valid_parent(scene: &Scene, entity: EntityId) -> Option<EntityId> {
    let parent = scene.get_component::<Transform>(entity)?.parent?;
    scene.has_component::<Transform>(parent).then_some(parent)
}

/// Write a world pose into `entity`'s Transform. With a valid parent the
/// pose is converted to parent-local values; otherwise it is written as is.
/// Returns `false` for a stale handle or a missing Transform.
pub fn set_world_pose(scene: &mut Scene, entity: EntityId, pose: &Isometry3<f32>) -> bool {
    let local = match valid_parent(scene, entity).and_then(|p| resolve_chain(scene, p)) {
        Some((parent_matrix, parent_rotation)) => match parent_matrix.try_inverse() {
            Some(inverse) => {
                let p = inverse.transform_point(&Point3::from(pose.translation.vector));
                (p.coords, parent_rotation.inverse() * pose.rotation)
            }
            None => (pose.translation.vector, pose.rotation),
        },
        None => (pose.translation.vector, pose.rotation),
    };
    match scene.get_component_mut::<Transform>(entity) {
        Some(t) => {
            t.position = local.0;
            t.rotation = local.1;
            true
        }
        None => false,
    }
}

/// Recompute the cached world matrix of every Transform.
pub fn update_world_matrices(scene: &mut Scene) {
    let updates: Vec<(EntityId, Matrix4<f32>)> = scene
        .entities_with::<Transform>()
        .into_iter()
        .filter_map(|e| world_matrix(scene, e).map(|m| (e, m)))
        .collect();
    for (entity, matrix) in updates {
        if let Some(t) = scene.get_component_mut::<Transform>(entity) {
            t.world = matrix;
        }
    }
}

// ---------------------------------------------------------------------------
// RigidBodyComponent
// ---------------------------------------------------------------------------

/// Links an entity to its simulation body.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBodyComponent {
    pub handle: BodyHandle,
    /// Driven by the scene.
    pub kinematic: bool,
    pub trigger: bool,
    /// Whether the Transform had a valid parent at the last sync, so
    /// physics results were written as parent-local values. Refreshed by
    /// every sync; reparenting shows up as a scene write.
    pub parent_relative: bool,
    pub(crate) synced_pose: Option<Isometry3<f32>>,
}

impl RigidBodyComponent {
    pub fn new(handle: BodyHandle) -> Self {
        Self {
            handle,
            kinematic: false,
            trigger: false,
            parent_relative: false,
            synced_pose: None,
        }
    }

    /// World pose recorded at the last sync in either direction.
    pub fn synced_pose(&self) -> Option<&Isometry3<f32>> {
        self.synced_pose.as_ref()
    }
}

// ---------------------------------------------------------------------------
// ScriptComponent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScriptPhase {
    /// Waiting for the first update to construct the instance.
    Pending,
    Created,
    /// Factory name not registered; never retried.
    Unresolved,
}

/// Per-entity behavior slot.
pub struct ScriptComponent {
    name: String,
    pub(crate) instance: Option<Box<dyn Behavior>>,
    pub(crate) phase: ScriptPhase,
    pub(crate) enabled: bool,
    /// Enabled state last reported through `on_enable`/`on_disable`.
    pub(crate) notified_enabled: bool,
    pub run_while_paused: bool,
}

impl ScriptComponent {
    /// Slot for the behavior registered as `name`. The instance is built on
    /// the first update.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: None,
            phase: ScriptPhase::Pending,
            enabled: true,
            notified_enabled: true,
            run_while_paused: false,
        }
    }

    pub fn run_while_paused(mut self, run: bool) -> Self {
        self.run_while_paused = run;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Takes effect at the next behavior update, which fires `on_enable` or
    /// `on_disable` if the state changed.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the behavior instance has been constructed.
    pub fn is_created(&self) -> bool {
        self.phase == ScriptPhase::Created
    }

    /// The behavior instance, if constructed and not currently dispatching.
    pub fn instance(&self) -> Option<&dyn Behavior> {
        self.instance.as_deref()
    }

    pub fn instance_mut(&mut self) -> Option<&mut (dyn Behavior + 'static)> {
        self.instance.as_deref_mut()
    }
}

impl fmt::Debug for ScriptComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptComponent")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("enabled", &self.enabled)
            .field("run_while_paused", &self.run_while_paused)
            .finish()
    }
}

/// Register the engine's component types with `scene`. Safe to call more
/// than once.
pub fn register_components(scene: &mut Scene) {
    scene.register_component::<Transform>("transform");
    scene.register_component::<RigidBodyComponent>("rigid_body");
    scene.register_component::<ScriptComponent>("script");
    scene.register_component::<Animator>("animator");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    fn scene() -> Scene {
        let mut scene = Scene::new();
        register_components(&mut scene);
        scene
    }

    #[test]
    fn root_world_pose_is_local_pose() {
        let mut scene = scene();
        let e = scene.spawn_with(Transform::from_xyz(1.0, 2.0, 3.0));
        let pose = world_pose(&scene, e).unwrap();
        assert_relative_eq!(pose.translation.vector, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn child_inherits_parent_rotation_and_offset() {
        let mut scene = scene();
        let rot = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2);
        let parent = scene.spawn_with(Transform::from_xyz(10.0, 0.0, 0.0).with_rotation(rot));
        let child = scene.spawn_with(Transform::from_xyz(1.0, 0.0, 0.0).with_parent(parent));

        let pose = world_pose(&scene, child).unwrap();
        // +x rotated a quarter turn about y lands on -z.
        assert_relative_eq!(pose.translation.vector, Vector3::new(10.0, 0.0, -1.0), epsilon = 1e-5);
        assert_relative_eq!(pose.rotation.angle(), FRAC_PI_2, epsilon = 1e-5);
    }

    #[test]
    fn stale_parent_is_treated_as_root() {
        let mut scene = scene();
        let parent = scene.spawn_with(Transform::from_xyz(5.0, 0.0, 0.0));
        let child = scene.spawn_with(Transform::from_xyz(1.0, 0.0, 0.0).with_parent(parent));
        scene.despawn(parent).unwrap();

        assert_eq!(valid_parent(&scene, child), None);
        let pose = world_pose(&scene, child).unwrap();
        assert_relative_eq!(pose.translation.vector, Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn parent_cycle_terminates() {
        let mut scene = scene();
        let a = scene.spawn_with(Transform::from_xyz(1.0, 0.0, 0.0));
        let b = scene.spawn_with(Transform::from_xyz(1.0, 0.0, 0.0).with_parent(a));
        scene.get_component_mut::<Transform>(a).unwrap().parent = Some(b);
        assert!(world_pose(&scene, a).is_some());
    }

    #[test]
    fn set_world_pose_converts_to_parent_local() {
        let mut scene = scene();
        let parent = scene.spawn_with(Transform::from_xyz(0.0, 5.0, 0.0).with_scale(Vector3::repeat(2.0)));
        let child = scene.spawn_with(Transform::default().with_parent(parent));

        let target = Isometry3::translation(4.0, 5.0, 0.0);
        assert!(set_world_pose(&mut scene, child, &target));

        let local = scene.get_component::<Transform>(child).unwrap().position;
        assert_relative_eq!(local, Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-5);
        let world = world_pose(&scene, child).unwrap();
        assert_relative_eq!(world.translation.vector, target.translation.vector, epsilon = 1e-5);
    }

    #[test]
    fn update_world_matrices_refreshes_cache() {
        let mut scene = scene();
        let parent = scene.spawn_with(Transform::from_xyz(3.0, 0.0, 0.0));
        let child = scene.spawn_with(Transform::from_xyz(0.0, 1.0, 0.0).with_parent(parent));
        update_world_matrices(&mut scene);

        let m = *scene.get_component::<Transform>(child).unwrap().cached_world_matrix();
        let origin = m.transform_point(&Point3::origin());
        assert_relative_eq!(origin.coords, Vector3::new(3.0, 1.0, 0.0));
    }

    #[test]
    fn set_world_pose_on_stale_handle_is_false() {
        let mut scene = scene();
        let e = scene.spawn_with(Transform::default());
        scene.despawn(e).unwrap();
        assert!(!set_world_pose(&mut scene, e, &Isometry3::identity()));
    }

    #[test]
    fn script_component_defaults() {
        let sc = ScriptComponent::new("player");
        assert_eq!(sc.name(), "player");
        assert!(sc.is_enabled());
        assert!(!sc.is_created());
        assert!(!sc.run_while_paused);
        assert!(sc.instance().is_none());
    }
}
