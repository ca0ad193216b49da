//! Transform <-> body synchronisation with a per-pass authority guard.
//!
//! A pass opens with physics->scene, right after a step is joined, and ends
//! with the scene->physics push ahead of the next step. Behaviors run in
//! between. Within a pass an entity moves in one direction at a time:
//!
//! - the pull skips an entity whose Transform holds a scene write that has
//!   not reached its body yet, and claims it `SceneToPhysics`;
//! - the push skips an entity claimed `PhysicsToScene` unless its Transform
//!   was written after the pull.
//!
//! Poses are exchanged in "body space", which is the entity's world pose.
//! For a root this is the Transform's own values; for a child the pull
//! converts back to parent-local values. The pose recorded at the last sync
//! is kept on the component so a scene write can be told apart from a value
//! the sync itself produced.

use std::collections::HashMap;

use cairn_ecs::entity::EntityId;
use cairn_ecs::scene::Scene;
use rapier3d::na::Isometry3;
use tracing::debug;

use crate::components::{self, RigidBodyComponent};
use crate::physics::world::PhysicsWorld;

/// Poses closer than this in translation and angle count as equal.
const POSE_EPSILON: f32 = 1e-6;

/// Direction an entity was synced in during the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    PhysicsToScene,
    SceneToPhysics,
}

fn same_pose(a: &Isometry3<f32>, b: &Isometry3<f32>) -> bool {
    (a.translation.vector - b.translation.vector).norm() <= POSE_EPSILON
        && a.rotation.angle_to(&b.rotation) <= POSE_EPSILON
}

/// Copies spatial state between Transforms and simulation bodies.
#[derive(Debug, Default)]
pub struct PhysicsTransformSync {
    claims: HashMap<EntityId, SyncDirection>,
}

impl PhysicsTransformSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all claims. Called by the orchestrator before the physics->scene
    /// that follows a completed step.
    pub fn begin_pass(&mut self) {
        self.claims.clear();
    }

    /// Direction `entity` was claimed for in the current pass.
    pub fn claim(&self, entity: EntityId) -> Option<SyncDirection> {
        self.claims.get(&entity).copied()
    }

    /// Claim `entity` for `direction`. A `PhysicsToScene` claim gives way to
    /// the scene once the Transform has been written after the pull; a
    /// `SceneToPhysics` claim is never given up within the pass.
    fn try_claim(&mut self, scene: &Scene, entity: EntityId, direction: SyncDirection) -> bool {
        let Some(claimed) = self.claims.get(&entity).copied() else {
            self.claims.insert(entity, direction);
            return true;
        };
        if claimed == direction {
            return true;
        }
        let scene_wins = direction == SyncDirection::SceneToPhysics
            && scene
                .get_component::<RigidBodyComponent>(entity)
                .is_some_and(|body| Self::transform_written(scene, entity, body));
        if scene_wins {
            self.claims.insert(entity, direction);
            return true;
        }
        debug!(entity = %entity, ?claimed, ?direction, "sync skipped, entity already claimed");
        false
    }

    /// Whether the Transform moved since the last sync of `entity`.
    pub fn transform_written(scene: &Scene, entity: EntityId, body: &RigidBodyComponent) -> bool {
        match (components::world_pose(scene, entity), body.synced_pose.as_ref()) {
            (Some(now), Some(synced)) => !same_pose(&now, synced),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    // -- bulk passes ----------------------------------------------------------

    /// Copy simulation poses into Transforms for dynamic, non-kinematic,
    /// awake bodies. Entities with an unpushed scene write keep their
    /// Transform. Returns the number of entities written.
    pub fn sync_physics_to_scene(&mut self, scene: &mut Scene, world: &PhysicsWorld) -> usize {
        let mut written = 0;
        for entity in scene.entities_with::<RigidBodyComponent>() {
            let Some(body) = scene.get_component::<RigidBodyComponent>(entity) else {
                continue;
            };
            if body.kinematic || !world.is_dynamic(body.handle) || !world.is_active(body.handle) {
                continue;
            }
            if self.write_body_to_transform(scene, world, entity) {
                written += 1;
            }
        }
        written
    }

    /// Push Transforms of kinematic bodies and of bodies whose Transform was
    /// written since the last sync. Returns the number of bodies moved.
    pub fn sync_scene_to_physics(&mut self, scene: &mut Scene, world: &mut PhysicsWorld) -> usize {
        let mut written = 0;
        for entity in scene.entities_with::<RigidBodyComponent>() {
            let Some(body) = scene.get_component::<RigidBodyComponent>(entity) else {
                continue;
            };
            let kinematic = body.kinematic || world.is_kinematic(body.handle);
            if !kinematic && !Self::transform_written(scene, entity, body) {
                continue;
            }
            if self.write_transform_to_body(scene, world, entity, false) {
                written += 1;
            }
        }
        written
    }

    /// Push every Transform into its body, e.g. after loading a scene.
    pub fn sync_all_transforms_to_physics(&mut self, scene: &mut Scene, world: &mut PhysicsWorld) -> usize {
        scene
            .entities_with::<RigidBodyComponent>()
            .into_iter()
            .filter(|&e| self.sync_transform_to_physics(scene, world, e))
            .count()
    }

    /// Pull every non-static body pose into its Transform.
    pub fn sync_all_physics_to_transforms(&mut self, scene: &mut Scene, world: &PhysicsWorld) -> usize {
        scene
            .entities_with::<RigidBodyComponent>()
            .into_iter()
            .filter(|&e| self.sync_physics_to_transform(scene, world, e))
            .count()
    }

    // -- single entity --------------------------------------------------------

    /// Teleport the body of `entity` to its Transform: velocities are zeroed
    /// and the body is woken. `false` for stale handles, entities without a
    /// body, or entities pulled this pass whose Transform was not written
    /// since.
    pub fn sync_transform_to_physics(
        &mut self,
        scene: &mut Scene,
        world: &mut PhysicsWorld,
        entity: EntityId,
    ) -> bool {
        self.write_transform_to_body(scene, world, entity, true)
    }

    /// Copy the body pose of `entity` into its Transform. Static bodies and
    /// entities with an unpushed scene write are skipped.
    pub fn sync_physics_to_transform(&mut self, scene: &mut Scene, world: &PhysicsWorld, entity: EntityId) -> bool {
        let Some(body) = scene.get_component::<RigidBodyComponent>(entity) else {
            return false;
        };
        if world.is_static(body.handle) {
            return false;
        }
        self.write_body_to_transform(scene, world, entity)
    }

    // -- internals ------------------------------------------------------------

    fn write_body_to_transform(&mut self, scene: &mut Scene, world: &PhysicsWorld, entity: EntityId) -> bool {
        let Some(body) = scene.get_component::<RigidBodyComponent>(entity) else {
            return false;
        };
        if Self::transform_written(scene, entity, body) {
            // The scene owns this entity until its write is pushed.
            self.claims.insert(entity, SyncDirection::SceneToPhysics);
            debug!(entity = %entity, "physics -> scene skipped, transform write pending");
            return false;
        }
        let Some(pose) = world.body_pose(body.handle) else {
            return false;
        };
        if !self.try_claim(scene, entity, SyncDirection::PhysicsToScene) {
            return false;
        }
        if !components::set_world_pose(scene, entity, &pose) {
            return false;
        }
        self.record(scene, entity);
        true
    }

    fn write_transform_to_body(
        &mut self,
        scene: &mut Scene,
        world: &mut PhysicsWorld,
        entity: EntityId,
        teleport: bool,
    ) -> bool {
        let Some(handle) = scene.get_component::<RigidBodyComponent>(entity).map(|b| b.handle) else {
            return false;
        };
        let Some(pose) = components::world_pose(scene, entity) else {
            return false;
        };
        if !self.try_claim(scene, entity, SyncDirection::SceneToPhysics) {
            return false;
        }
        if !world.set_body_pose(handle, &pose, teleport) {
            return false;
        }
        self.record(scene, entity);
        true
    }

    /// Remember the body-space pose the Transform holds right now, and
    /// whether it was taken relative to a parent.
    fn record(&self, scene: &mut Scene, entity: EntityId) {
        let pose = components::world_pose(scene, entity);
        let parent_relative = components::valid_parent(scene, entity).is_some();
        if let Some(body) = scene.get_component_mut::<RigidBodyComponent>(entity) {
            if body.parent_relative != parent_relative {
                debug!(entity = %entity, parent_relative, "body space follows new parent");
            }
            body.parent_relative = parent_relative;
            body.synced_pose = pose;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
