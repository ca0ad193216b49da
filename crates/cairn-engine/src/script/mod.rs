//! Behavior runtime: the [`Behavior`] trait, the factory registry and the
//! system that drives behavior lifecycles.

pub mod behavior;
pub mod registry;
pub mod system;

pub use behavior::{AsAny, Behavior, BehaviorContext, BehaviorEnv, FrameTime, TimeRequests};
pub use registry::{BehaviorFactory, BehaviorRegistry};
pub use system::ScriptableSystem;
