//! Behavior runtime.
//!
//! One [`ScriptableSystem::update`] pass:
//!
//! 1. Construct instances for scripts that have none yet and call
//!    `on_create` once. Unknown factory names are logged and never retried.
//! 2. Fire `on_enable`/`on_disable` for scripts whose enabled flag changed.
//! 3. Deliver collision reports, Enter before Stay before Exit, each side of
//!    a pair independently.
//! 4. Call `on_update` with the effective delta.
//! 5. Flush deferred destruction: `on_destroy`, then despawn. Destroys
//!    requested from `on_destroy` are flushed in the same pass.
//!
//! A hook runs with its instance moved out of the entity's
//! [`ScriptComponent`] and the instance is put back afterwards, so a hook
//! may freely touch the scene, including other scripts.

use std::sync::Arc;

use cairn_ecs::entity::EntityId;
use cairn_ecs::scene::Scene;
use tracing::debug;

use crate::components::{ScriptComponent, ScriptPhase};
use crate::physics::dispatch::{CollisionEvent, CollisionReport};
use crate::physics::world::ContactKind;
use crate::script::behavior::{Behavior, BehaviorContext, BehaviorEnv};
use crate::script::registry::BehaviorRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Enter,
    Stay,
    Exit,
}

/// Owns behavior lifecycle and hook dispatch.
#[derive(Debug)]
pub struct ScriptableSystem {
    registry: Arc<BehaviorRegistry>,
    destroy_queue: Vec<EntityId>,
    enabled: bool,
}

impl ScriptableSystem {
    pub fn new(registry: Arc<BehaviorRegistry>) -> Self {
        Self {
            registry,
            destroy_queue: Vec::new(),
            enabled: true,
        }
    }

    pub fn registry(&self) -> &BehaviorRegistry {
        &self.registry
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Queue `entity` for destruction at the end of the next pass (or the
    /// next [`flush_destroyed`](Self::flush_destroyed)).
    pub fn queue_destroy(&mut self, scene: &Scene, entity: EntityId) -> bool {
        if !scene.is_alive(entity) {
            return false;
        }
        if !self.destroy_queue.contains(&entity) {
            self.destroy_queue.push(entity);
        }
        true
    }

    /// Entities waiting to be destroyed.
    pub fn pending_destroy(&self) -> &[EntityId] {
        &self.destroy_queue
    }

    /// Run one behavior pass.
    pub fn update(&mut self, scene: &mut Scene, env: &mut BehaviorEnv<'_>, reports: &[CollisionReport]) {
        if self.enabled {
            self.construct_pending(scene, env);
            self.notify_enabled_changes(scene, env);
            for report in reports {
                self.deliver(scene, env, report);
            }
            self.run_updates(scene, env);
        }
        self.flush_destroyed(scene, env);
    }

    fn construct_pending(&mut self, scene: &mut Scene, env: &mut BehaviorEnv<'_>) {
        for entity in scene.entities_with::<ScriptComponent>() {
            let Some(script) = scene.get_component_mut::<ScriptComponent>(entity) else {
                continue;
            };
            if script.phase != ScriptPhase::Pending {
                continue;
            }
            match self.registry.create(script.name()) {
                Some(instance) => {
                    script.instance = Some(instance);
                    script.phase = ScriptPhase::Created;
                    script.notified_enabled = script.enabled;
                    debug!(entity = %entity, name = script.name(), "behavior created");
                    self.invoke(scene, env, entity, |b, ctx| b.on_create(ctx));
                }
                None => {
                    debug!(entity = %entity, name = script.name(), "behavior skipped, factory missing");
                    script.phase = ScriptPhase::Unresolved;
                }
            }
        }
    }

    fn notify_enabled_changes(&mut self, scene: &mut Scene, env: &mut BehaviorEnv<'_>) {
        for entity in scene.entities_with::<ScriptComponent>() {
            let Some(script) = scene.get_component_mut::<ScriptComponent>(entity) else {
                continue;
            };
            if script.phase != ScriptPhase::Created || script.enabled == script.notified_enabled {
                continue;
            }
            let enabled = script.enabled;
            script.notified_enabled = enabled;
            if enabled {
                self.invoke(scene, env, entity, |b, ctx| b.on_enable(ctx));
            } else {
                self.invoke(scene, env, entity, |b, ctx| b.on_disable(ctx));
            }
        }
    }

    fn deliver(&mut self, scene: &mut Scene, env: &mut BehaviorEnv<'_>, report: &CollisionReport) {
        let sets = [
            (Lifecycle::Enter, &report.enter),
            (Lifecycle::Stay, &report.stay),
            (Lifecycle::Exit, &report.exit),
        ];
        for (stage, events) in sets {
            for event in events {
                self.deliver_pair(scene, env, stage, event);
            }
        }
    }

    fn deliver_pair(&mut self, scene: &mut Scene, env: &mut BehaviorEnv<'_>, stage: Lifecycle, event: &CollisionEvent) {
        let (a, b) = event.pair.entities();
        for (me, other) in [(a, b), (b, a)] {
            if !Self::is_runnable(scene, me) {
                continue;
            }
            let kind = event.kind;
            self.invoke(scene, env, me, |behavior, ctx| match (kind, stage) {
                (ContactKind::Collision, Lifecycle::Enter) => behavior.on_collision_enter(ctx, other),
                (ContactKind::Collision, Lifecycle::Stay) => behavior.on_collision_stay(ctx, other),
                (ContactKind::Collision, Lifecycle::Exit) => behavior.on_collision_exit(ctx, other),
                (ContactKind::Trigger, Lifecycle::Enter) => behavior.on_trigger_enter(ctx, other),
                (ContactKind::Trigger, Lifecycle::Stay) => behavior.on_trigger_stay(ctx, other),
                (ContactKind::Trigger, Lifecycle::Exit) => behavior.on_trigger_exit(ctx, other),
            });
        }
    }

    fn run_updates(&mut self, scene: &mut Scene, env: &mut BehaviorEnv<'_>) {
        let time = env.time;
        for entity in scene.entities_with::<ScriptComponent>() {
            let Some(script) = scene.get_component::<ScriptComponent>(entity) else {
                continue;
            };
            if script.phase != ScriptPhase::Created || !script.enabled {
                continue;
            }
            let dt = if time.dt == 0.0 && script.run_while_paused {
                time.unscaled_dt
            } else {
                time.dt
            };
            if dt > 0.0 || script.run_while_paused {
                self.invoke(scene, env, entity, |b, ctx| b.on_update(ctx, dt));
            }
        }
    }

    /// Call `on_destroy` and despawn every queued entity, including those
    /// queued by `on_destroy` itself.
    pub fn flush_destroyed(&mut self, scene: &mut Scene, env: &mut BehaviorEnv<'_>) {
        while !self.destroy_queue.is_empty() {
            let batch = std::mem::take(&mut self.destroy_queue);
            for entity in batch {
                if !scene.is_alive(entity) {
                    continue;
                }
                let created = scene
                    .get_component::<ScriptComponent>(entity)
                    .is_some_and(ScriptComponent::is_created);
                if created {
                    self.invoke(scene, env, entity, |b, ctx| b.on_destroy(ctx));
                }
                if scene.despawn(entity).is_ok() {
                    debug!(entity = %entity, "entity destroyed");
                }
            }
        }
    }

    fn is_runnable(scene: &Scene, entity: EntityId) -> bool {
        scene
            .get_component::<ScriptComponent>(entity)
            .is_some_and(|s| s.phase == ScriptPhase::Created && s.enabled)
    }

    /// Run `hook` on the behavior of `entity` with a fresh context. `false`
    /// if the entity is stale or has no instance in its slot.
    fn invoke(
        &mut self,
        scene: &mut Scene,
        env: &mut BehaviorEnv<'_>,
        entity: EntityId,
        hook: impl FnOnce(&mut dyn Behavior, &mut BehaviorContext<'_>),
    ) -> bool {
        let Some(mut instance) = scene
            .get_component_mut::<ScriptComponent>(entity)
            .and_then(|s| s.instance.take())
        else {
            return false;
        };

        {
            let mut ctx = BehaviorContext::new(entity, scene, env, &mut self.destroy_queue);
            hook(&mut *instance, &mut ctx);
        }

        // The slot may have been replaced or removed by the hook; the
        // instance only goes back into the slot it came from.
        if let Some(script) = scene.get_component_mut::<ScriptComponent>(entity) {
            if script.instance.is_none() && script.phase == ScriptPhase::Created {
                script.instance = Some(instance);
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::register_components;
    use crate::events::EventBus;
    use crate::input::InputState;
    use crate::physics::dispatch::CollisionPair;
    use crate::script::behavior::{FrameTime, TimeRequests};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Probe {
        log: Vec<String>,
    }

    impl Behavior for Probe {
        fn on_create(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.log.push("create".into());
        }
        fn on_update(&mut self, _ctx: &mut BehaviorContext<'_>, dt: f32) {
            self.log.push(format!("update {dt}"));
        }
        fn on_enable(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.log.push("enable".into());
        }
        fn on_disable(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.log.push("disable".into());
        }
        fn on_collision_enter(&mut self, _ctx: &mut BehaviorContext<'_>, other: EntityId) {
            self.log.push(format!("enter {other}"));
        }
    }

    fn setup() -> (Scene, ScriptableSystem) {
        let mut scene = Scene::new();
        register_components(&mut scene);
        let mut registry = BehaviorRegistry::new();
        registry.register::<Probe>("probe");
        (scene, ScriptableSystem::new(Arc::new(registry)))
    }

    fn run(scripts: &mut ScriptableSystem, scene: &mut Scene, dt: f32, reports: &[CollisionReport]) {
        let input = InputState::new();
        let mut events = EventBus::new();
        let mut requests = TimeRequests::default();
        let mut env = BehaviorEnv {
            input: &input,
            events: &mut events,
            requests: &mut requests,
            time: FrameTime {
                dt,
                unscaled_dt: 0.5,
                real_dt: 0.5,
            },
        };
        scripts.update(scene, &mut env, reports);
    }

    fn log(scene: &Scene, entity: EntityId) -> Vec<String> {
        let instance: &dyn Behavior = scene
            .get_component::<ScriptComponent>(entity)
            .and_then(ScriptComponent::instance)
            .unwrap();
        instance.as_any().downcast_ref::<Probe>().unwrap().log.clone()
    }

    #[test]
    fn create_fires_once_before_first_update() {
        let (mut scene, mut scripts) = setup();
        let e = scene.spawn_with(ScriptComponent::new("probe"));
        assert!(!scene.get_component::<ScriptComponent>(e).unwrap().is_created());

        run(&mut scripts, &mut scene, 0.25, &[]);
        run(&mut scripts, &mut scene, 0.25, &[]);
        assert_eq!(log(&scene, e), vec!["create", "update 0.25", "update 0.25"]);
    }

    #[test]
    fn unknown_factory_is_skipped() {
        let (mut scene, mut scripts) = setup();
        let e = scene.spawn_with(ScriptComponent::new("nope"));
        run(&mut scripts, &mut scene, 0.25, &[]);
        run(&mut scripts, &mut scene, 0.25, &[]);
        let script = scene.get_component::<ScriptComponent>(e).unwrap();
        assert!(!script.is_created());
        assert!(script.instance().is_none());
    }

    #[test]
    fn enable_toggle_fires_hooks_and_gates_update() {
        let (mut scene, mut scripts) = setup();
        let e = scene.spawn_with(ScriptComponent::new("probe"));
        run(&mut scripts, &mut scene, 0.25, &[]);

        scene.get_component_mut::<ScriptComponent>(e).unwrap().set_enabled(false);
        run(&mut scripts, &mut scene, 0.25, &[]);
        scene.get_component_mut::<ScriptComponent>(e).unwrap().set_enabled(true);
        run(&mut scripts, &mut scene, 0.25, &[]);

        assert_eq!(
            log(&scene, e),
            vec!["create", "update 0.25", "disable", "enable", "update 0.25"]
        );
    }

    #[test]
    fn collisions_reach_both_sides() {
        let (mut scene, mut scripts) = setup();
        let a = scene.spawn_with(ScriptComponent::new("probe"));
        let b = scene.spawn_with(ScriptComponent::new("probe"));
        run(&mut scripts, &mut scene, 0.0, &[]);

        let report = CollisionReport {
            step: 1,
            enter: vec![CollisionEvent {
                pair: CollisionPair::new(a, b),
                kind: ContactKind::Collision,
            }],
            ..Default::default()
        };
        run(&mut scripts, &mut scene, 0.0, &[report]);
        assert_eq!(log(&scene, a), vec!["create".to_owned(), format!("enter {b}")]);
        assert_eq!(log(&scene, b), vec!["create".to_owned(), format!("enter {a}")]);
    }

    #[test]
    fn destroy_is_deferred_and_calls_on_destroy() {
        static DESTROYED: AtomicUsize = AtomicUsize::new(0);

        #[derive(Default)]
        struct Bomb;
        impl Behavior for Bomb {
            fn on_update(&mut self, ctx: &mut BehaviorContext<'_>, _dt: f32) {
                let me = ctx.entity();
                assert!(ctx.destroy_self());
                // Still alive until the pass ends.
                assert!(ctx.scene().is_alive(me));
            }
            fn on_destroy(&mut self, _ctx: &mut BehaviorContext<'_>) {
                DESTROYED.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut scene = Scene::new();
        register_components(&mut scene);
        let mut registry = BehaviorRegistry::new();
        registry.register::<Bomb>("bomb");
        let mut scripts = ScriptableSystem::new(Arc::new(registry));

        let e = scene.spawn_with(ScriptComponent::new("bomb"));
        run(&mut scripts, &mut scene, 0.25, &[]);
        assert!(!scene.is_alive(e));
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
        assert!(scripts.pending_destroy().is_empty());
    }

    #[test]
    fn destroy_of_stale_handle_is_false() {
        let (mut scene, mut scripts) = setup();
        let e = scene.spawn();
        scene.despawn(e).unwrap();
        assert!(!scripts.queue_destroy(&scene, e));
    }
}
