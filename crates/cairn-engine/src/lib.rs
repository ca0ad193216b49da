//! Cairn Engine -- frame driver, physics integration and behavior runtime.
//!
//! This crate builds on [`cairn_ecs`] to run a game frame: a fixed-step
//! accumulator loop drives a rapier3d physics world (optionally stepped on a
//! background thread), keeps scene transforms and simulation bodies in sync,
//! turns overlaps into Enter/Stay/Exit events and delivers them to per-entity
//! [`Behavior`](script::Behavior) objects.
//!
//! # Quick Start
//!
//! ```
//! use cairn_engine::prelude::*;
//!
//! # fn main() -> Result<(), EngineError> {
//! let config = EngineConfig::default();
//! let mut engine = Engine::new(config, BehaviorRegistry::new())?;
//!
//! let ground = engine.scene_mut().spawn_with(Transform::default());
//! engine.attach_body(ground, &BodyDesc::new(0.0, CollisionShape::Plane { normal: [0.0, 1.0, 0.0] }));
//!
//! engine.frame(1.0 / 60.0);
//! assert_eq!(engine.tick_count(), 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod animation;
pub mod app;
pub mod components;
pub mod config;
pub mod events;
pub mod input;
pub mod logging;
pub mod physics;
pub mod script;
pub mod state;
pub mod tick;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the ECS crate for convenience.
pub use cairn_ecs;

/// Re-export of the math types used in public signatures.
pub use rapier3d::na;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by engine setup and configuration.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A configuration file could not be read.
    #[error("failed to read config '{path}'")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A configuration document is not valid JSON for [`config::EngineConfig`].
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A configuration value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// An entity-store operation failed.
    #[error(transparent)]
    Ecs(#[from] cairn_ecs::EcsError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use cairn_ecs::prelude::*;

    pub use crate::animation::{AnimationSystem, Animator, Keyframe};
    pub use crate::app::{AppContext, Engine, FrameDiagnostics};
    pub use crate::components::{register_components, RigidBodyComponent, ScriptComponent, Transform};
    pub use crate::config::{DestroyedExitPolicy, EngineConfig, PhysicsConfig, TickConfig};
    pub use crate::events::{EventBus, ListenerId};
    pub use crate::input::{InputQuery, InputState};
    pub use crate::physics::{
        BodyDesc, BodyHandle, CollisionDispatcher, CollisionPair, CollisionReport, CollisionShape,
        ContactKind, PhysicsSystem, PhysicsTransformSync, PhysicsWorld, SyncDirection,
    };
    pub use crate::script::{Behavior, BehaviorContext, BehaviorRegistry, ScriptableSystem};
    pub use crate::state::{GameState, StateMachine, Transition};
    pub use crate::tick::{FrameTiming, TickLoop};
    pub use crate::EngineError;
}
