//! Drops a sphere onto a plane and logs the contact lifecycle.
//!
//! Run with: `cargo run -p cairn-engine --example falling_sphere [config.json]`

use anyhow::Context;
use cairn_engine::logging::init_tracing;
use cairn_engine::prelude::*;
use tracing::info;

#[derive(Default)]
struct Announcer;

impl Behavior for Announcer {
    fn on_collision_enter(&mut self, ctx: &mut BehaviorContext<'_>, other: EntityId) {
        let y = ctx.transform().map_or(f32::NAN, |t| t.position.y);
        info!(me = %ctx.entity(), %other, y, "landed");
    }

    fn on_collision_exit(&mut self, ctx: &mut BehaviorContext<'_>, other: EntityId) {
        info!(me = %ctx.entity(), %other, "left the ground");
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing("info,cairn_engine=debug");

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_path(&path).with_context(|| format!("loading {path}"))?,
        None => EngineConfig::default(),
    };

    let mut registry = BehaviorRegistry::new();
    registry.register::<Announcer>("announcer");
    let mut engine = Engine::new(config, registry)?;

    let ground = engine.scene_mut().spawn_with(Transform::default());
    engine
        .attach_body(ground, &BodyDesc::new(0.0, CollisionShape::Plane { normal: [0.0, 1.0, 0.0] }))
        .context("ground body")?;

    let ball = engine
        .ctx_mut()
        .spawn_scripted(Transform::from_xyz(0.0, 10.0, 0.0), "announcer");
    engine
        .attach_body(ball, &BodyDesc::new(1.0, CollisionShape::Sphere { radius: 0.5 }))
        .context("sphere body")?;

    for second in 1..=3 {
        engine.run_frames(60, 1.0 / 60.0);
        let y = engine
            .scene()
            .get_component::<Transform>(ball)
            .map(|t| t.position.y)
            .context("sphere transform")?;
        let diag = engine.ctx().diagnostics();
        info!(second, y, fixed = ?diag.fixed_time, update = ?diag.update_time, "status");
    }
    Ok(())
}
