//! The [`Behavior`] trait and the context its hooks receive.

use std::any::Any;

use cairn_ecs::component::Component;
use cairn_ecs::entity::EntityId;
use cairn_ecs::scene::Scene;
use tracing::debug;

use crate::components::{ScriptComponent, Transform};
use crate::events::EventBus;
use crate::input::InputQuery;

// ---------------------------------------------------------------------------
// Behavior
// ---------------------------------------------------------------------------

/// Downcast support for trait objects. Blanket-implemented for every
/// `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Per-entity logic. Every hook defaults to a no-op.
///
/// Hooks run on the logic thread with exclusive access to the scene through
/// the [`BehaviorContext`]. Destroying an entity from a hook is deferred
/// until the current behavior pass has finished.
pub trait Behavior: AsAny {
    /// Called once, on the first update after the entity got its script.
    fn on_create(&mut self, _ctx: &mut BehaviorContext<'_>) {}

    /// Called every frame while enabled, with the effective delta.
    fn on_update(&mut self, _ctx: &mut BehaviorContext<'_>, _dt: f32) {}

    /// Called before the entity is despawned.
    fn on_destroy(&mut self, _ctx: &mut BehaviorContext<'_>) {}

    fn on_enable(&mut self, _ctx: &mut BehaviorContext<'_>) {}

    fn on_disable(&mut self, _ctx: &mut BehaviorContext<'_>) {}

    fn on_collision_enter(&mut self, _ctx: &mut BehaviorContext<'_>, _other: EntityId) {}

    fn on_collision_stay(&mut self, _ctx: &mut BehaviorContext<'_>, _other: EntityId) {}

    fn on_collision_exit(&mut self, _ctx: &mut BehaviorContext<'_>, _other: EntityId) {}

    fn on_trigger_enter(&mut self, _ctx: &mut BehaviorContext<'_>, _other: EntityId) {}

    fn on_trigger_stay(&mut self, _ctx: &mut BehaviorContext<'_>, _other: EntityId) {}

    fn on_trigger_exit(&mut self, _ctx: &mut BehaviorContext<'_>, _other: EntityId) {}
}

// ---------------------------------------------------------------------------
// Frame data passed to behaviors
// ---------------------------------------------------------------------------

/// Deltas of the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTime {
    /// Scaled delta; zero while paused.
    pub dt: f32,
    /// Clamped delta before scaling.
    pub unscaled_dt: f32,
    /// Wall-clock delta.
    pub real_dt: f32,
}

impl FrameTime {
    pub fn is_paused(&self) -> bool {
        self.dt == 0.0
    }
}

/// Time changes requested by behaviors or states, applied by the frame
/// driver after the update phase.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRequests {
    pub time_scale: Option<f32>,
    pub paused: Option<bool>,
}

impl TimeRequests {
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// Application services a behavior pass runs against.
pub struct BehaviorEnv<'a> {
    pub input: &'a dyn InputQuery,
    pub events: &'a mut EventBus,
    pub requests: &'a mut TimeRequests,
    pub time: FrameTime,
}

// ---------------------------------------------------------------------------
// BehaviorContext
// ---------------------------------------------------------------------------

/// Everything a hook can reach: its entity, the scene, input, events and
/// time control.
///
/// The context deliberately has no direct despawn: [`destroy`](Self::destroy)
/// queues the entity and the runtime removes it once the pass is over.
pub struct BehaviorContext<'a> {
    entity: EntityId,
    scene: &'a mut Scene,
    input: &'a dyn InputQuery,
    events: &'a mut EventBus,
    requests: &'a mut TimeRequests,
    destroy_queue: &'a mut Vec<EntityId>,
    time: FrameTime,
}

impl<'a> BehaviorContext<'a> {
    pub(crate) fn new(
        entity: EntityId,
        scene: &'a mut Scene,
        env: &'a mut BehaviorEnv<'_>,
        destroy_queue: &'a mut Vec<EntityId>,
    ) -> Self {
        Self {
            entity,
            scene,
            input: env.input,
            events: &mut *env.events,
            requests: &mut *env.requests,
            destroy_queue,
            time: env.time,
        }
    }

    /// The entity this behavior is attached to.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn time(&self) -> FrameTime {
        self.time
    }

    pub fn input(&self) -> &dyn InputQuery {
        self.input
    }

    pub fn events(&mut self) -> &mut EventBus {
        self.events
    }

    /// Read-only view of the whole scene.
    pub fn scene(&self) -> &Scene {
        self.scene
    }

    // -- components -----------------------------------------------------------

    /// Component of this behavior's entity.
    pub fn get<T: Component>(&self) -> Option<&T> {
        self.scene.get_component::<T>(self.entity)
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.scene.get_component_mut::<T>(self.entity)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.scene.has_component::<T>(self.entity)
    }

    /// Component of any entity. `None` for stale handles.
    pub fn component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.scene.get_component::<T>(entity)
    }

    pub fn component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.scene.get_component_mut::<T>(entity)
    }

    /// Attach a component to any live entity. `false` for stale handles or
    /// unregistered types.
    pub fn insert<T: Component>(&mut self, entity: EntityId, value: T) -> bool {
        self.scene.insert_component(entity, value).is_ok()
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.get::<Transform>()
    }

    pub fn transform_mut(&mut self) -> Option<&mut Transform> {
        self.get_mut::<Transform>()
    }

    // -- other behaviors ------------------------------------------------------

    /// Behavior of another entity, if it is a `B`. `None` on a stale handle,
    /// a type mismatch, an instance not constructed yet, or the calling
    /// entity itself (its instance is out of its slot while it runs).
    pub fn behavior<B: Behavior>(&self, entity: EntityId) -> Option<&B> {
        let instance: &dyn Behavior = self.scene.get_component::<ScriptComponent>(entity)?.instance()?;
        instance.as_any().downcast_ref::<B>()
    }

    pub fn behavior_mut<B: Behavior>(&mut self, entity: EntityId) -> Option<&mut B> {
        let instance: &mut dyn Behavior = self
            .scene
            .get_component_mut::<ScriptComponent>(entity)?
            .instance_mut()?;
        instance.as_any_mut().downcast_mut::<B>()
    }

    // -- lifecycle ------------------------------------------------------------

    /// Allocate a new entity. Scripts attached to it start on the next pass.
    pub fn spawn(&mut self) -> EntityId {
        self.scene.spawn()
    }

    /// Queue `entity` for destruction after the current pass. `false` for a
    /// stale handle.
    pub fn destroy(&mut self, entity: EntityId) -> bool {
        if !self.scene.is_alive(entity) {
            debug!(entity = %entity, "destroy requested for stale entity");
            return false;
        }
        if !self.destroy_queue.contains(&entity) {
            self.destroy_queue.push(entity);
        }
        true
    }

    pub fn destroy_self(&mut self) -> bool {
        self.destroy(self.entity)
    }

    // -- time control ---------------------------------------------------------

    /// Request a new global time scale, applied after the update phase.
    pub fn set_time_scale(&mut self, scale: f32) {
        self.requests.time_scale = Some(scale);
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.requests.paused = Some(paused);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter(u32);

    impl Behavior for Counter {}

    #[test]
    fn downcast_through_trait_object() {
        let boxed: Box<dyn Behavior> = Box::new(Counter(7));
        let as_dyn: &dyn Behavior = boxed.as_ref();
        assert_eq!(as_dyn.as_any().downcast_ref::<Counter>().map(|c| c.0), Some(7));

        #[derive(Default)]
        struct Other;
        impl Behavior for Other {}
        assert!(as_dyn.as_any().downcast_ref::<Other>().is_none());
    }

    #[test]
    fn frame_time_paused_when_dt_zero() {
        let t = FrameTime {
            dt: 0.0,
            unscaled_dt: 0.016,
            real_dt: 0.016,
        };
        assert!(t.is_paused());
    }

    #[test]
    fn time_requests_take_resets() {
        let mut r = TimeRequests {
            time_scale: Some(0.5),
            paused: None,
        };
        let taken = r.take();
        assert_eq!(taken.time_scale, Some(0.5));
        assert_eq!(r, TimeRequests::default());
    }
}
