//! rapier3d simulation wrapper.
//!
//! The [`PhysicsWorld`] owns every rapier structure needed to step a
//! simulation and maps rapier handles back to scene entities. It never
//! touches the [`Scene`](cairn_ecs::scene::Scene): the orchestrator moves it
//! onto a background task for the duration of a step, and nothing else can
//! reach it until the step has been joined.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use cairn_ecs::entity::EntityId;
use rapier3d::na::{Isometry3, Unit, UnitQuaternion, Vector3};
use rapier3d::prelude::*;
use tracing::warn;

use crate::config::PhysicsConfig;

// ---------------------------------------------------------------------------
// Body description
// ---------------------------------------------------------------------------

/// Handle to a body owned by a [`PhysicsWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(RigidBodyHandle);

/// Collision shape of a body. Shapes are values, so a body can never be
/// created without one.
#[derive(Debug, Clone, PartialEq)]
pub enum CollisionShape {
    Sphere { radius: f32 },
    Box { half_extents: [f32; 3] },
    Capsule { half_height: f32, radius: f32 },
    /// Infinite plane through the body origin. Only valid on static bodies.
    Plane { normal: [f32; 3] },
}

impl CollisionShape {
    fn to_shared(&self) -> SharedShape {
        match *self {
            Self::Sphere { radius } => SharedShape::ball(radius),
            Self::Box { half_extents: [x, y, z] } => SharedShape::cuboid(x, y, z),
            Self::Capsule { half_height, radius } => SharedShape::capsule_y(half_height, radius),
            Self::Plane { normal: [x, y, z] } => {
                SharedShape::halfspace(Unit::new_normalize(Vector3::new(x, y, z)))
            }
        }
    }
}

/// Parameters for [`PhysicsWorld::create_rigid_body`].
///
/// A `mass` of zero makes the body static (or kinematic when `kinematic` is
/// set): no inertia is computed and the solver never moves it.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    pub mass: f32,
    pub shape: CollisionShape,
    /// Driven by the scene instead of the solver.
    pub kinematic: bool,
    /// Reports overlaps but produces no contact response.
    pub trigger: bool,
    pub restitution: f32,
    pub friction: f32,
    pub can_sleep: bool,
}

impl BodyDesc {
    /// A body with the given mass and shape and default material.
    pub fn new(mass: f32, shape: CollisionShape) -> Self {
        Self {
            mass,
            shape,
            kinematic: false,
            trigger: false,
            restitution: 0.0,
            friction: 0.5,
            can_sleep: true,
        }
    }

    pub fn kinematic(mut self) -> Self {
        self.kinematic = true;
        self
    }

    pub fn trigger(mut self) -> Self {
        self.trigger = true;
        self
    }

    pub fn restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn can_sleep(mut self, can_sleep: bool) -> Self {
        self.can_sleep = can_sleep;
        self
    }
}

/// Whether an overlap is a solid contact or a trigger intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactKind {
    Collision,
    Trigger,
}

// ---------------------------------------------------------------------------
// PhysicsWorld
// ---------------------------------------------------------------------------

/// Owns the rapier simulation state and the entity mapping.
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    body_to_entity: HashMap<RigidBodyHandle, EntityId>,
    collider_to_entity: HashMap<ColliderHandle, EntityId>,
    /// Number of completed steps.
    steps: u64,
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("gravity", &self.gravity)
            .field("bodies", &self.rigid_body_set.len())
            .field("steps", &self.steps)
            .finish()
    }
}

impl PhysicsWorld {
    /// Create a world from the physics configuration.
    pub fn new(config: &PhysicsConfig) -> Self {
        let mut integration_params = IntegrationParameters::default();
        if let Some(iterations) = NonZeroUsize::new(config.solver_iterations as usize) {
            integration_params.num_solver_iterations = iterations;
        }
        let [gx, gy, gz] = config.gravity;
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![gx, gy, gz],
            integration_params,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            body_to_entity: HashMap::new(),
            collider_to_entity: HashMap::new(),
            steps: 0,
        }
    }

    /// World gravity.
    pub fn gravity(&self) -> Vector3<f32> {
        self.gravity
    }

    /// Change gravity. Takes `&mut self`, so it cannot race a step.
    pub fn set_gravity(&mut self, gravity: Vector3<f32>) {
        self.gravity = gravity;
    }

    /// Create a body owned by `owner` at `pose`.
    pub fn create_rigid_body(
        &mut self,
        owner: EntityId,
        desc: &BodyDesc,
        pose: &Isometry3<f32>,
    ) -> BodyHandle {
        let mut dynamic = desc.mass > 0.0 && !desc.kinematic;
        if dynamic && matches!(desc.shape, CollisionShape::Plane { .. }) {
            warn!(entity = %owner, "plane shapes cannot be dynamic; creating a static body");
            dynamic = false;
        }

        let builder = if desc.kinematic {
            RigidBodyBuilder::kinematic_position_based()
        } else if dynamic {
            RigidBodyBuilder::dynamic()
        } else {
            RigidBodyBuilder::fixed()
        };
        let rb = builder
            .position(*pose)
            .can_sleep(desc.can_sleep)
            .user_data(owner.to_raw() as u128)
            .build();
        let body_handle = self.rigid_body_set.insert(rb);

        let mut collider = ColliderBuilder::new(desc.shape.to_shared())
            .restitution(desc.restitution)
            .friction(desc.friction)
            .sensor(desc.trigger)
            .user_data(owner.to_raw() as u128);
        if dynamic {
            collider = collider.mass(desc.mass);
        }
        if desc.trigger {
            // Triggers report overlaps with static and kinematic bodies too.
            collider = collider.active_collision_types(ActiveCollisionTypes::all());
        }
        let collider_handle = self.collider_set.insert_with_parent(
            collider.build(),
            body_handle,
            &mut self.rigid_body_set,
        );

        self.body_to_entity.insert(body_handle, owner);
        self.collider_to_entity.insert(collider_handle, owner);
        BodyHandle(body_handle)
    }

    /// Detach and free a body and its colliders. Returns `false` if the
    /// handle is unknown.
    pub fn remove_rigid_body(&mut self, handle: BodyHandle) -> bool {
        let Some(rb) = self.rigid_body_set.get(handle.0) else {
            return false;
        };
        for collider in rb.colliders() {
            self.collider_to_entity.remove(collider);
        }
        self.body_to_entity.remove(&handle.0);
        self.rigid_body_set
            .remove(
                handle.0,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            )
            .is_some()
    }

    /// Remove every body and collider.
    pub fn clear(&mut self) {
        let handles: Vec<RigidBodyHandle> = self.rigid_body_set.iter().map(|(h, _)| h).collect();
        for handle in handles {
            self.remove_rigid_body(BodyHandle(handle));
        }
    }

    /// Advance the simulation by exactly `dt` seconds. Non-positive `dt` is a
    /// no-op.
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        self.integration_params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
        self.steps += 1;
    }

    /// Entity pairs whose shapes currently overlap, with their kind.
    ///
    /// A solid pair counts when the solver reports an active contact or a
    /// manifold point lies within `contact_distance`. Each unordered pair is
    /// reported once; cost follows the number of tracked pairs, not the
    /// number of bodies.
    pub fn overlapping_pairs(&self, contact_distance: f32) -> Vec<(EntityId, EntityId, ContactKind)> {
        let mut pairs = Vec::new();
        for pair in self.narrow_phase.contact_pairs() {
            let touching = pair.has_any_active_contact
                || pair
                    .manifolds
                    .iter()
                    .any(|m| m.points.iter().any(|p| p.dist < contact_distance));
            if !touching {
                continue;
            }
            if let Some((a, b)) = self.entities_of(pair.collider1, pair.collider2) {
                pairs.push((a, b, ContactKind::Collision));
            }
        }
        for (c1, c2, intersecting) in self.narrow_phase.intersection_pairs() {
            if !intersecting {
                continue;
            }
            if let Some((a, b)) = self.entities_of(c1, c2) {
                pairs.push((a, b, ContactKind::Trigger));
            }
        }
        pairs
    }

    fn entities_of(&self, c1: ColliderHandle, c2: ColliderHandle) -> Option<(EntityId, EntityId)> {
        let a = *self.collider_to_entity.get(&c1)?;
        let b = *self.collider_to_entity.get(&c2)?;
        (a != b).then_some((a, b))
    }

    // -- body access --------------------------------------------------------

    /// World pose of a body.
    pub fn body_pose(&self, handle: BodyHandle) -> Option<Isometry3<f32>> {
        self.rigid_body_set.get(handle.0).map(|rb| *rb.position())
    }

    /// Move a body to `pose`. Kinematic bodies are moved through their next
    /// kinematic position so contacts see the motion. With `teleport`, linear
    /// and angular velocity are zeroed and the body is woken.
    pub fn set_body_pose(&mut self, handle: BodyHandle, pose: &Isometry3<f32>, teleport: bool) -> bool {
        let Some(rb) = self.rigid_body_set.get_mut(handle.0) else {
            return false;
        };
        if rb.is_kinematic() {
            rb.set_next_kinematic_position(*pose);
        } else {
            rb.set_position(*pose, true);
        }
        if teleport {
            rb.set_linvel(Vector3::zeros(), true);
            rb.set_angvel(Vector3::zeros(), true);
            rb.wake_up(true);
        }
        true
    }

    /// Linear velocity of a body.
    pub fn linear_velocity(&self, handle: BodyHandle) -> Option<Vector3<f32>> {
        self.rigid_body_set.get(handle.0).map(|rb| *rb.linvel())
    }

    pub fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vector3<f32>) -> bool {
        match self.rigid_body_set.get_mut(handle.0) {
            Some(rb) => {
                rb.set_linvel(velocity, true);
                true
            }
            None => false,
        }
    }

    /// Dynamic (solver-driven) body.
    pub fn is_dynamic(&self, handle: BodyHandle) -> bool {
        self.rigid_body_set.get(handle.0).is_some_and(|rb| rb.is_dynamic())
    }

    pub fn is_kinematic(&self, handle: BodyHandle) -> bool {
        self.rigid_body_set.get(handle.0).is_some_and(|rb| rb.is_kinematic())
    }

    pub fn is_static(&self, handle: BodyHandle) -> bool {
        self.rigid_body_set.get(handle.0).is_some_and(|rb| rb.is_fixed())
    }

    /// Awake and simulated this step.
    pub fn is_active(&self, handle: BodyHandle) -> bool {
        self.rigid_body_set.get(handle.0).is_some_and(|rb| !rb.is_sleeping())
    }

    /// Whether any collider of the body is a trigger.
    pub fn is_trigger(&self, handle: BodyHandle) -> bool {
        self.rigid_body_set.get(handle.0).is_some_and(|rb| {
            rb.colliders()
                .iter()
                .any(|c| self.collider_set.get(*c).is_some_and(|co| co.is_sensor()))
        })
    }

    /// Owning entity of a body.
    pub fn entity_of(&self, handle: BodyHandle) -> Option<EntityId> {
        self.body_to_entity.get(&handle.0).copied()
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.rigid_body_set.contains(handle.0)
    }

    /// Every body with its owning entity.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, EntityId)> + '_ {
        self.body_to_entity.iter().map(|(&h, &e)| (BodyHandle(h), e))
    }

    /// Number of bodies in the simulation.
    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }

    /// Number of completed steps.
    pub fn step_count(&self) -> u64 {
        self.steps
    }
}

/// Build a pose from a position and a rotation.
pub fn pose(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Isometry3<f32> {
    Isometry3::from_parts(position.into(), rotation)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(&PhysicsConfig::default())
    }

    fn at(x: f32, y: f32, z: f32) -> Isometry3<f32> {
        Isometry3::translation(x, y, z)
    }

    #[test]
    fn create_and_remove_body() {
        let mut pw = world();
        let e = EntityId::new(0, 0);
        let h = pw.create_rigid_body(e, &BodyDesc::new(1.0, CollisionShape::Sphere { radius: 0.5 }), &at(0.0, 0.0, 0.0));
        assert_eq!(pw.body_count(), 1);
        assert_eq!(pw.entity_of(h), Some(e));
        assert!(pw.is_dynamic(h));

        assert!(pw.remove_rigid_body(h));
        assert!(!pw.remove_rigid_body(h), "second removal is a no-op");
        assert_eq!(pw.body_count(), 0);
        assert_eq!(pw.entity_of(h), None);
    }

    #[test]
    fn zero_mass_is_static() {
        let mut pw = world();
        let h = pw.create_rigid_body(
            EntityId::new(0, 0),
            &BodyDesc::new(0.0, CollisionShape::Box { half_extents: [1.0, 1.0, 1.0] }),
            &at(0.0, 0.0, 0.0),
        );
        assert!(pw.is_static(h));
        assert!(!pw.is_dynamic(h));
    }

    #[test]
    fn dynamic_plane_is_demoted_to_static() {
        let mut pw = world();
        let h = pw.create_rigid_body(
            EntityId::new(0, 0),
            &BodyDesc::new(3.0, CollisionShape::Plane { normal: [0.0, 1.0, 0.0] }),
            &at(0.0, 0.0, 0.0),
        );
        assert!(pw.is_static(h));
    }

    #[test]
    fn gravity_pulls_dynamic_body_down() {
        let mut pw = world();
        let h = pw.create_rigid_body(
            EntityId::new(0, 0),
            &BodyDesc::new(1.0, CollisionShape::Sphere { radius: 0.5 }),
            &at(0.0, 10.0, 0.0),
        );
        for _ in 0..10 {
            pw.step(1.0 / 60.0);
        }
        let y = pw.body_pose(h).unwrap().translation.vector.y;
        assert!(y < 10.0, "body should fall, got y={y}");
        assert_eq!(pw.step_count(), 10);
    }

    #[test]
    fn zero_dt_does_not_step() {
        let mut pw = world();
        pw.step(0.0);
        assert_eq!(pw.step_count(), 0);
    }

    #[test]
    fn set_gravity_outside_step() {
        let mut pw = world();
        pw.set_gravity(Vector3::zeros());
        let h = pw.create_rigid_body(
            EntityId::new(0, 0),
            &BodyDesc::new(1.0, CollisionShape::Sphere { radius: 0.5 }),
            &at(0.0, 10.0, 0.0),
        );
        pw.step(1.0 / 60.0);
        let y = pw.body_pose(h).unwrap().translation.vector.y;
        assert!((y - 10.0).abs() < 1e-5);
    }

    #[test]
    fn teleport_zeroes_velocity() {
        let mut pw = world();
        let h = pw.create_rigid_body(
            EntityId::new(0, 0),
            &BodyDesc::new(1.0, CollisionShape::Sphere { radius: 0.5 }),
            &at(0.0, 0.0, 0.0),
        );
        pw.set_linear_velocity(h, Vector3::new(5.0, 0.0, 0.0));
        assert!(pw.set_body_pose(h, &at(3.0, 4.0, 5.0), true));
        assert_eq!(pw.linear_velocity(h), Some(Vector3::zeros()));
        assert_eq!(pw.body_pose(h).unwrap().translation.vector, Vector3::new(3.0, 4.0, 5.0));
    }

    #[test]
    fn overlapping_triggers_report_trigger_pair() {
        let mut pw = world();
        let a = EntityId::new(0, 0);
        let b = EntityId::new(1, 0);
        let desc = BodyDesc::new(0.0, CollisionShape::Sphere { radius: 1.0 }).kinematic().trigger();
        let ha = pw.create_rigid_body(a, &desc, &at(0.0, 0.0, 0.0));
        pw.create_rigid_body(b, &desc, &at(0.5, 0.0, 0.0));
        pw.step(1.0 / 60.0);

        assert!(pw.is_trigger(ha));
        let pairs = pw.overlapping_pairs(0.1);
        assert_eq!(pairs.len(), 1);
        let (x, y, kind) = pairs[0];
        assert_eq!(kind, ContactKind::Trigger);
        assert!((x == a && y == b) || (x == b && y == a));
    }

    #[test]
    fn clear_removes_everything() {
        let mut pw = world();
        for i in 0..4 {
            pw.create_rigid_body(
                EntityId::new(i, 0),
                &BodyDesc::new(1.0, CollisionShape::Sphere { radius: 0.5 }),
                &at(i as f32 * 3.0, 0.0, 0.0),
            );
        }
        pw.clear();
        assert_eq!(pw.body_count(), 0);
        assert!(pw.overlapping_pairs(0.1).is_empty());
    }
}
