//! Name -> constructor table for behaviors.
//!
//! Built once at startup and shared with the runtime through an `Arc`;
//! there is no global instance.

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::script::behavior::Behavior;

/// Constructor for one behavior type.
pub type BehaviorFactory = Box<dyn Fn() -> Box<dyn Behavior> + Send + Sync>;

/// Maps stable string keys to behavior constructors.
#[derive(Default)]
pub struct BehaviorRegistry {
    factories: HashMap<String, BehaviorFactory>,
}

impl fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `name`, constructed with `T::default()`. Returns
    /// `true` if an earlier registration was replaced.
    pub fn register<T: Behavior + Default>(&mut self, name: &str) -> bool {
        self.register_with(name, || Box::new(T::default()))
    }

    /// Register a custom constructor under `name`.
    pub fn register_with<F>(&mut self, name: &str, factory: F) -> bool
    where
        F: Fn() -> Box<dyn Behavior> + Send + Sync + 'static,
    {
        let replaced = self.factories.insert(name.to_owned(), Box::new(factory)).is_some();
        if replaced {
            warn!(name, "behavior factory replaced");
        }
        replaced
    }

    /// Construct the behavior registered as `name`. Logs and returns `None`
    /// for unknown names.
    pub fn create(&self, name: &str) -> Option<Box<dyn Behavior>> {
        match self.factories.get(name) {
            Some(factory) => Some(factory()),
            None => {
                warn!(name, "no behavior registered under this name");
                None
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
