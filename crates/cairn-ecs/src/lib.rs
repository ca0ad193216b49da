//! Cairn ECS -- the entity store behind a Cairn scene.
//!
//! Entities are generational handles ([`EntityId`](entity::EntityId)); each
//! registered component type lives in its own sparse-set table. A handle is
//! validated against its slot generation on every access, so a destroyed
//! entity can never be confused with a later occupant of the same slot.
//!
//! # Quick Start
//!
//! ```
//! use cairn_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! let mut scene = Scene::new();
//! scene.register_component::<Position>("position");
//!
//! let entity = scene.spawn_with(Position { x: 0.0, y: 0.0 });
//! assert_eq!(scene.get_component::<Position>(entity), Some(&Position { x: 0.0, y: 0.0 }));
//!
//! scene.despawn(entity).unwrap();
//! assert!(scene.get_component::<Position>(entity).is_none());
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod scene;
pub mod storage;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by entity-store operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {0:?} does not exist (stale or never allocated)")]
    StaleEntity(entity::EntityId),

    /// A component type was used before being registered.
    #[error("component type '{0}' not registered")]
    UnknownComponent(String),

    /// The entity is alive but does not carry the requested component.
    #[error("entity {entity:?} has no '{component}' component")]
    MissingComponent {
        entity: entity::EntityId,
        component: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ComponentInfo, ComponentRegistry, ComponentTypeId};
    pub use crate::entity::EntityId;
    pub use crate::scene::Scene;
    pub use crate::storage::SparseSet;
    pub use crate::EcsError;
}
