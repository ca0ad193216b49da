//! Application context and the frame driver.
//!
//! [`Engine::frame`] runs one frame in this order:
//!
//! 1. Fixed ticks from the [`TickLoop`]: for each, a physics pass (which may
//!    leave a step running on the worker) then the current state's
//!    `fixed_update`.
//! 2. Animation, overlapping any step still in flight.
//! 3. Physics sync point: join, physics -> scene, collision dispatch.
//! 4. Behaviors: creation, collision hooks, `on_update`, deferred destroys.
//! 5. The current state's `update`, then time requests are applied.
//! 6. World matrices are refreshed and the state renders.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cairn_ecs::entity::EntityId;
use cairn_ecs::scene::Scene;
use tracing::{trace, warn};

use crate::animation::AnimationSystem;
use crate::components::{self, register_components, ScriptComponent};
use crate::config::EngineConfig;
use crate::events::EventBus;
use crate::input::InputState;
use crate::physics::{BodyDesc, BodyHandle, PhysicsSystem};
use crate::script::{BehaviorEnv, BehaviorRegistry, FrameTime, ScriptableSystem, TimeRequests};
use crate::state::{GameState, StateMachine};
use crate::tick::{FrameTiming, TickLoop};
use crate::EngineError;

// ---------------------------------------------------------------------------
// FrameDiagnostics
// ---------------------------------------------------------------------------

/// Wall-clock cost of the last frame's phases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDiagnostics {
    /// All fixed ticks, physics passes included.
    pub fixed_time: Duration,
    /// Animation, sync point, behaviors and state update.
    pub update_time: Duration,
    pub render_time: Duration,
    pub ticks: u32,
}

// ---------------------------------------------------------------------------
// AppContext
// ---------------------------------------------------------------------------

/// Shared application services handed to every game state.
///
/// Fields are public so a state can borrow the scene and a system at the
/// same time, e.g. `ctx.physics.attach_body(&mut ctx.scene, ..)`.
#[derive(Debug)]
pub struct AppContext {
    pub scene: Scene,
    pub physics: PhysicsSystem,
    pub scripts: ScriptableSystem,
    pub animation: AnimationSystem,
    pub input: InputState,
    pub events: EventBus,
    pub time: TickLoop,
    /// Time changes requested by behaviors, applied after the update phase.
    pub requests: TimeRequests,
    diagnostics: FrameDiagnostics,
    config: EngineConfig,
}

impl AppContext {
    /// Validate `config` and build every system with the engine components
    /// registered on a fresh scene.
    pub fn new(config: EngineConfig, registry: BehaviorRegistry) -> Result<Self, EngineError> {
        config.validate()?;
        let mut scene = Scene::new();
        register_components(&mut scene);
        Ok(Self {
            scene,
            physics: PhysicsSystem::new(&config.physics),
            scripts: ScriptableSystem::new(Arc::new(registry)),
            animation: AnimationSystem::default(),
            input: InputState::new(),
            events: EventBus::new(),
            time: TickLoop::new(config.tick.clone()),
            requests: TimeRequests::default(),
            diagnostics: FrameDiagnostics::default(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Phase timings of the last completed frame.
    pub fn diagnostics(&self) -> &FrameDiagnostics {
        &self.diagnostics
    }

    /// Create a body for `entity` from its current Transform.
    pub fn attach_body(&mut self, entity: EntityId, desc: &BodyDesc) -> Option<BodyHandle> {
        self.physics.attach_body(&mut self.scene, entity, desc)
    }

    /// Spawn an entity with a Transform and a script slot for `behavior`.
    /// The behavior itself is constructed on the next behavior pass.
    pub fn spawn_scripted(&mut self, transform: components::Transform, behavior: &str) -> EntityId {
        let entity = self.scene.spawn_with(transform);
        if let Err(err) = self.scene.insert_component(entity, ScriptComponent::new(behavior)) {
            warn!(entity = %entity, behavior, %err, "script slot not attached");
        }
        entity
    }

    /// Queue `entity` for destruction at the end of the next behavior pass.
    /// `false` for stale handles.
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        self.scripts.queue_destroy(&self.scene, entity)
    }

    /// Apply pending destroys now, running `on_destroy` hooks. Use between
    /// frames; inside a frame the behavior pass flushes on its own.
    pub fn flush_destroyed(&mut self) {
        let time = FrameTime::default();
        let mut env = BehaviorEnv {
            input: &self.input,
            events: &mut self.events,
            requests: &mut self.requests,
            time,
        };
        self.scripts.flush_destroyed(&mut self.scene, &mut env);
    }

    fn run_behaviors(&mut self, timing: &FrameTiming) {
        let reports = self.physics.drain_reports();
        let mut env = BehaviorEnv {
            input: &self.input,
            events: &mut self.events,
            requests: &mut self.requests,
            time: FrameTime {
                dt: timing.dt,
                unscaled_dt: timing.unscaled_dt,
                real_dt: timing.real_dt,
            },
        };
        self.scripts.update(&mut self.scene, &mut env, &reports);
    }

    fn apply_time_requests(&mut self) {
        let requests = self.requests.take();
        if let Some(scale) = requests.time_scale {
            self.time.set_time_scale(scale);
        }
        if let Some(paused) = requests.paused {
            self.time.set_paused(paused);
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the application context and the state stack and drives frames.
#[derive(Debug)]
pub struct Engine {
    ctx: AppContext,
    states: StateMachine,
}

impl Engine {
    pub fn new(config: EngineConfig, registry: BehaviorRegistry) -> Result<Self, EngineError> {
        Ok(Self {
            ctx: AppContext::new(config, registry)?,
            states: StateMachine::new(),
        })
    }

    pub fn ctx(&self) -> &AppContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut AppContext {
        &mut self.ctx
    }

    pub fn scene(&self) -> &Scene {
        &self.ctx.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.ctx.scene
    }

    pub fn states(&self) -> &StateMachine {
        &self.states
    }

    pub fn attach_body(&mut self, entity: EntityId, desc: &BodyDesc) -> Option<BodyHandle> {
        self.ctx.attach_body(entity, desc)
    }

    /// Destroy `entity` now (between frames), running its `on_destroy`.
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        let queued = self.ctx.destroy_entity(entity);
        self.ctx.flush_destroyed();
        queued
    }

    pub fn push_state(&mut self, state: Box<dyn GameState>) {
        self.states.push(&mut self.ctx, state);
    }

    pub fn pop_state(&mut self) -> bool {
        self.states.pop(&mut self.ctx)
    }

    pub fn change_state(&mut self, state: Box<dyn GameState>) {
        self.states.change(&mut self.ctx, state);
    }

    /// Pop every state.
    pub fn clear_states(&mut self) {
        self.states.clear(&mut self.ctx);
    }

    /// Total fixed ticks run.
    pub fn tick_count(&self) -> u64 {
        self.ctx.time.tick_count()
    }

    /// Run one frame that took `real_dt` seconds of wall-clock time.
    pub fn frame(&mut self, real_dt: f32) -> FrameTiming {
        let ctx = &mut self.ctx;
        let timing = ctx.time.begin_frame(real_dt);

        let fixed_start = Instant::now();
        for _ in 0..timing.ticks {
            ctx.physics.update(&mut ctx.scene, timing.fixed.dt);
            self.states.fixed_update(ctx, timing.fixed);
        }
        let fixed_time = fixed_start.elapsed();

        let update_start = Instant::now();
        ctx.animation.update(&mut ctx.scene, timing.dt);
        ctx.physics.sync_point(&mut ctx.scene);
        ctx.run_behaviors(&timing);
        self.states.update(ctx, timing.dt);
        ctx.apply_time_requests();
        components::update_world_matrices(&mut ctx.scene);
        ctx.input.end_frame();
        let update_time = update_start.elapsed();

        let render_start = Instant::now();
        self.states.render(ctx);
        let render_time = render_start.elapsed();

        ctx.diagnostics = FrameDiagnostics {
            fixed_time,
            update_time,
            render_time,
            ticks: timing.ticks,
        };
        trace!(ticks = timing.ticks, dt = timing.dt, "frame");
        timing
    }

    /// Run `count` frames of `real_dt` each.
    pub fn run_frames(&mut self, count: u32, real_dt: f32) {
        for _ in 0..count {
            self.frame(real_dt);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
