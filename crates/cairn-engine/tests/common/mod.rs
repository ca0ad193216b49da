//! Shared helpers for the engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cairn_engine::prelude::*;

/// One recorded hook call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub entity: EntityId,
    pub hook: &'static str,
    pub other: Option<EntityId>,
    pub dt: Option<f32>,
}

pub type Journal = Arc<Mutex<Vec<Call>>>;

/// Behavior that records every hook into a shared journal.
pub struct Probe {
    journal: Journal,
}

impl Probe {
    fn note(&self, ctx: &BehaviorContext<'_>, hook: &'static str, other: Option<EntityId>, dt: Option<f32>) {
        self.journal.lock().unwrap().push(Call {
            entity: ctx.entity(),
            hook,
            other,
            dt,
        });
    }
}

impl Behavior for Probe {
    fn on_create(&mut self, ctx: &mut BehaviorContext<'_>) {
        self.note(ctx, "create", None, None);
    }

    fn on_update(&mut self, ctx: &mut BehaviorContext<'_>, dt: f32) {
        self.note(ctx, "update", None, Some(dt));
    }

    fn on_destroy(&mut self, ctx: &mut BehaviorContext<'_>) {
        self.note(ctx, "destroy", None, None);
    }

    fn on_collision_enter(&mut self, ctx: &mut BehaviorContext<'_>, other: EntityId) {
        self.note(ctx, "collision_enter", Some(other), None);
    }

    fn on_collision_stay(&mut self, ctx: &mut BehaviorContext<'_>, other: EntityId) {
        self.note(ctx, "collision_stay", Some(other), None);
    }

    fn on_collision_exit(&mut self, ctx: &mut BehaviorContext<'_>, other: EntityId) {
        self.note(ctx, "collision_exit", Some(other), None);
    }

    fn on_trigger_enter(&mut self, ctx: &mut BehaviorContext<'_>, other: EntityId) {
        self.note(ctx, "trigger_enter", Some(other), None);
    }

    fn on_trigger_stay(&mut self, ctx: &mut BehaviorContext<'_>, other: EntityId) {
        self.note(ctx, "trigger_stay", Some(other), None);
    }

    fn on_trigger_exit(&mut self, ctx: &mut BehaviorContext<'_>, other: EntityId) {
        self.note(ctx, "trigger_exit", Some(other), None);
    }
}

/// A registry with [`Probe`] under `"probe"` writing to the returned journal.
pub fn probe_registry() -> (BehaviorRegistry, Journal) {
    let journal = Journal::default();
    let mut registry = BehaviorRegistry::new();
    let sink = Arc::clone(&journal);
    registry.register_with("probe", move || {
        Box::new(Probe {
            journal: Arc::clone(&sink),
        })
    });
    (registry, journal)
}

/// Calls of `hook` made by `entity`.
pub fn calls(journal: &Journal, entity: EntityId, hook: &str) -> Vec<Call> {
    journal
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.entity == entity && c.hook == hook)
        .cloned()
        .collect()
}

/// Hook names recorded for `entity`, in order, restricted to `prefix`.
pub fn hooks(journal: &Journal, entity: EntityId, prefix: &str) -> Vec<&'static str> {
    journal
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.entity == entity && c.hook.starts_with(prefix))
        .map(|c| c.hook)
        .collect()
}

pub fn config(async_step: bool, destroyed_exit: DestroyedExitPolicy) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.physics.async_step = async_step;
    config.physics.destroyed_exit = destroyed_exit;
    config
}

pub const FRAME: f32 = 1.0 / 60.0;
