//! Physics integration: the rapier3d world wrapper, transform sync, the
//! collision dispatcher and the orchestrator that sequences them.

pub mod dispatch;
pub mod sync;
pub mod system;
pub mod world;

pub use dispatch::{CollisionDispatcher, CollisionEvent, CollisionPair, CollisionReport};
pub use sync::{PhysicsTransformSync, SyncDirection};
pub use system::PhysicsSystem;
pub use world::{BodyDesc, BodyHandle, CollisionShape, ContactKind, PhysicsWorld};
