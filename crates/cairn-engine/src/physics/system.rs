//! Physics orchestrator.
//!
//! [`PhysicsSystem`] owns the [`PhysicsWorld`], the [`PhysicsTransformSync`]
//! and the [`CollisionDispatcher`] and sequences them around each step:
//!
//! ```text
//! update(scene, dt):
//!     sync_point           join outstanding step, begin pass,
//!                          physics->scene, dispatch
//!     reap orphan bodies
//!     scene->physics       pushes writes made since the pull
//!     schedule step        background worker, or inline when async is off
//!                          (an inline step is finished immediately)
//! sync_point(scene):       (called again before behaviors run)
//! ```
//!
//! With asynchronous stepping the world is moved to a dedicated worker
//! thread for the duration of the step and moved back when joined. While it
//! is away nothing can reach it, so there is never more than one step in
//! flight and never a sync racing a step.

use std::panic;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, SendError, Sender};

use cairn_ecs::entity::EntityId;
use cairn_ecs::scene::Scene;
use rapier3d::na::Vector3;
use tracing::{debug, trace, warn};

use crate::components::{self, RigidBodyComponent};
use crate::config::PhysicsConfig;
use crate::physics::dispatch::{CollisionDispatcher, CollisionReport};
use crate::physics::sync::PhysicsTransformSync;
use crate::physics::world::{BodyDesc, BodyHandle, PhysicsWorld};

// ---------------------------------------------------------------------------
// StepWorker
// ---------------------------------------------------------------------------

/// Dedicated thread that steps a world it is handed and hands it back.
struct StepWorker {
    jobs: Option<Sender<(Box<PhysicsWorld>, f32)>>,
    results: Receiver<Box<PhysicsWorld>>,
    thread: Option<JoinHandle<()>>,
}

impl StepWorker {
    fn spawn() -> std::io::Result<Self> {
        // One slot each way: at most one step is ever in flight.
        let (job_tx, job_rx) = bounded::<(Box<PhysicsWorld>, f32)>(1);
        let (result_tx, result_rx) = bounded(1);
        let thread = thread::Builder::new()
            .name("physics-step".to_owned())
            .spawn(move || {
                while let Ok((mut world, dt)) = job_rx.recv() {
                    world.step(dt);
                    if result_tx.send(world).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            thread: Some(thread),
        })
    }

    /// Hand `world` to the worker. Gives it back if the worker is gone.
    fn submit(&self, world: Box<PhysicsWorld>, dt: f32) -> Result<(), Box<PhysicsWorld>> {
        match &self.jobs {
            Some(jobs) => jobs.send((world, dt)).map_err(|SendError((w, _))| w),
            None => Err(world),
        }
    }

    /// Block until the submitted step finishes. A panic inside the step is
    /// resumed on the calling thread.
    fn wait(&mut self) -> Box<PhysicsWorld> {
        match self.results.recv() {
            Ok(world) => world,
            Err(_) => match self.thread.take().map(JoinHandle::join) {
                Some(Err(payload)) => panic::resume_unwind(payload),
                _ => panic!("physics step worker exited while a step was in flight"),
            },
        }
    }
}

impl Drop for StepWorker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

// ---------------------------------------------------------------------------
// PhysicsSystem
// ---------------------------------------------------------------------------

/// Schedules steps, joins them, and drives sync and dispatch in order.
pub struct PhysicsSystem {
    /// `None` exactly while a step is in flight.
    world: Option<Box<PhysicsWorld>>,
    worker: Option<StepWorker>,
    in_flight: bool,
    /// A step completed but its results have not been synced yet.
    unsynced: bool,
    sync: PhysicsTransformSync,
    dispatcher: CollisionDispatcher,
    reports: Vec<CollisionReport>,
    config: PhysicsConfig,
    enabled: bool,
}

impl std::fmt::Debug for PhysicsSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsSystem")
            .field("in_flight", &self.in_flight)
            .field("enabled", &self.enabled)
            .field("active_pairs", &self.dispatcher.active_count())
            .finish()
    }
}

impl PhysicsSystem {
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            world: Some(Box::new(PhysicsWorld::new(config))),
            worker: None,
            in_flight: false,
            unsynced: false,
            sync: PhysicsTransformSync::new(),
            dispatcher: CollisionDispatcher::new(config.destroyed_exit),
            reports: Vec::new(),
            config: config.clone(),
            enabled: true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A disabled system schedules no steps. A step already in flight still
    /// completes and is synced at the next barrier.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_step_in_flight(&self) -> bool {
        self.in_flight
    }

    /// The world, if no step is in flight.
    pub fn try_world(&self) -> Option<&PhysicsWorld> {
        self.world.as_deref()
    }

    /// The world, joining an outstanding step first. Results of a joined
    /// step are synced at the next [`sync_point`](Self::sync_point).
    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        self.join();
        match self.world.as_deref_mut() {
            Some(world) => world,
            None => unreachable!("physics world missing after join"),
        }
    }

    pub fn dispatcher(&self) -> &CollisionDispatcher {
        &self.dispatcher
    }

    pub fn transform_sync(&self) -> &PhysicsTransformSync {
        &self.sync
    }

    pub fn set_gravity(&mut self, gravity: Vector3<f32>) {
        self.world_mut().set_gravity(gravity);
    }

    // -- frame hooks --------------------------------------------------------

    /// One fixed-tick physics pass.
    pub fn update(&mut self, scene: &mut Scene, dt: f32) {
        self.sync_point(scene);
        if !self.enabled {
            return;
        }
        self.reap_orphans(scene);

        let Some(world) = self.world.as_deref_mut() else {
            return;
        };
        let pushed = self.sync.sync_scene_to_physics(scene, world);
        trace!(pushed, "scene -> physics");

        if dt > 0.0 {
            self.schedule(dt);
        }
        if !self.in_flight {
            // Inline steps are finished right away.
            self.sync_point(scene);
        }
    }

    /// Barrier: block until any outstanding step completes, then copy its
    /// results into the scene and dispatch collisions. Cheap when nothing is
    /// pending.
    pub fn sync_point(&mut self, scene: &mut Scene) {
        self.join();
        if !self.unsynced {
            return;
        }
        self.unsynced = false;
        let Some(world) = self.world.as_deref() else {
            return;
        };

        self.sync.begin_pass();
        let pulled = self.sync.sync_physics_to_scene(scene, world);
        let overlaps = world.overlapping_pairs(self.config.contact_distance);
        let report = self
            .dispatcher
            .dispatch(world.step_count(), overlaps, |e| scene.is_alive(e));
        trace!(pulled, step = report.step, "physics -> scene");
        if !report.is_empty() {
            self.reports.push(report);
        }
    }

    /// Collision reports produced since the last drain, oldest first.
    pub fn drain_reports(&mut self) -> Vec<CollisionReport> {
        std::mem::take(&mut self.reports)
    }

    fn schedule(&mut self, dt: f32) {
        let Some(mut world) = self.world.take() else {
            return;
        };
        if self.config.async_step {
            if self.worker.is_none() {
                match StepWorker::spawn() {
                    Ok(worker) => self.worker = Some(worker),
                    Err(err) => {
                        warn!(%err, "failed to start physics worker, stepping inline");
                        self.config.async_step = false;
                    }
                }
            }
            if let Some(worker) = &self.worker {
                match worker.submit(world, dt) {
                    Ok(()) => {
                        self.in_flight = true;
                        return;
                    }
                    Err(returned) => {
                        warn!("physics worker is gone, stepping inline");
                        self.worker = None;
                        self.config.async_step = false;
                        world = returned;
                    }
                }
            }
        }
        world.step(dt);
        self.world = Some(world);
        self.unsynced = true;
    }

    fn join(&mut self) {
        if !self.in_flight {
            return;
        }
        if let Some(worker) = self.worker.as_mut() {
            self.world = Some(worker.wait());
        }
        self.in_flight = false;
        self.unsynced = true;
    }

    /// Remove bodies whose owner is dead or no longer references them.
    fn reap_orphans(&mut self, scene: &Scene) {
        let Some(world) = self.world.as_deref_mut() else {
            return;
        };
        let orphans: Vec<BodyHandle> = world
            .bodies()
            .filter(|&(handle, owner)| {
                scene
                    .get_component::<RigidBodyComponent>(owner)
                    .map_or(true, |body| body.handle != handle)
            })
            .map(|(handle, _)| handle)
            .collect();
        for handle in orphans {
            world.remove_rigid_body(handle);
        }
    }

    // -- bodies -------------------------------------------------------------

    /// Create a body for `entity` at its Transform and attach a
    /// [`RigidBodyComponent`]. Replaces an existing body. `None` if the
    /// entity is stale or has no Transform.
    pub fn attach_body(&mut self, scene: &mut Scene, entity: EntityId, desc: &BodyDesc) -> Option<BodyHandle> {
        let pose = components::world_pose(scene, entity)?;
        let world = self.world_mut();
        if let Some(old) = scene.get_component::<RigidBodyComponent>(entity) {
            world.remove_rigid_body(old.handle);
        }
        let handle = world.create_rigid_body(entity, desc, &pose);
        let mut body = RigidBodyComponent::new(handle);
        body.kinematic = desc.kinematic;
        body.trigger = desc.trigger;
        body.parent_relative = components::valid_parent(scene, entity).is_some();
        body.synced_pose = Some(pose);
        scene.insert_component(entity, body).ok()?;
        debug!(entity = %entity, "rigid body attached");
        Some(handle)
    }

    /// Remove the body of `entity` and its component. `false` if there was
    /// none.
    pub fn detach_body(&mut self, scene: &mut Scene, entity: EntityId) -> bool {
        let Ok(Some(body)) = scene.remove_component::<RigidBodyComponent>(entity) else {
            return false;
        };
        self.world_mut().remove_rigid_body(body.handle)
    }

    /// Teleport one entity's body to its Transform.
    pub fn sync_transform_to_physics(&mut self, scene: &mut Scene, entity: EntityId) -> bool {
        self.join();
        match self.world.as_deref_mut() {
            Some(world) => self.sync.sync_transform_to_physics(scene, world, entity),
            None => false,
        }
    }

    /// Copy one entity's body pose into its Transform.
    pub fn sync_physics_to_transform(&mut self, scene: &mut Scene, entity: EntityId) -> bool {
        self.join();
        match self.world.as_deref() {
            Some(world) => self.sync.sync_physics_to_transform(scene, world, entity),
            None => false,
        }
    }

    /// Push every Transform into its body, e.g. after loading a scene.
    pub fn sync_all_transforms_to_physics(&mut self, scene: &mut Scene) -> usize {
        self.join();
        match self.world.as_deref_mut() {
            Some(world) => self.sync.sync_all_transforms_to_physics(scene, world),
            None => 0,
        }
    }

    /// Pull every non-static body pose into its Transform.
    pub fn sync_all_physics_to_transforms(&mut self, scene: &mut Scene) -> usize {
        self.join();
        match self.world.as_deref() {
            Some(world) => self.sync.sync_all_physics_to_transforms(scene, world),
            None => 0,
        }
    }

    /// Remove every body, forget active pairs and pending reports.
    pub fn clear(&mut self) {
        self.world_mut().clear();
        self.dispatcher.clear();
        self.reports.clear();
        self.unsynced = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
