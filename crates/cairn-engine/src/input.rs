//! Action-based input queries.
//!
//! Device polling is outside the engine: the host feeds action state into an
//! [`InputState`] with [`InputState::set_action`] and behaviors read it
//! through the [`InputQuery`] trait.

use std::collections::HashSet;

/// Read-only view of named actions.
pub trait InputQuery {
    /// Held this frame.
    fn action(&self, name: &str) -> bool;
    /// Went down this frame.
    fn action_down(&self, name: &str) -> bool;
    /// Went up this frame.
    fn action_up(&self, name: &str) -> bool;
}

/// Action state fed by the host.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    held: HashSet<String>,
    down: HashSet<String>,
    up: HashSet<String>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current state of `name`. Edges are derived from the
    /// previous state.
    pub fn set_action(&mut self, name: &str, pressed: bool) {
        if pressed {
            if self.held.insert(name.to_owned()) {
                self.down.insert(name.to_owned());
            }
        } else if self.held.remove(name) {
            self.up.insert(name.to_owned());
        }
    }

    /// Forget this frame's edges. Held actions stay held.
    pub fn end_frame(&mut self) {
        self.down.clear();
        self.up.clear();
    }

    /// Release everything without producing edges.
    pub fn clear(&mut self) {
        self.held.clear();
        self.down.clear();
        self.up.clear();
    }
}

impl InputQuery for InputState {
    fn action(&self, name: &str) -> bool {
        self.held.contains(name)
    }

    fn action_down(&self, name: &str) -> bool {
        self.down.contains(name)
    }

    fn action_up(&self, name: &str) -> bool {
        self.up.contains(name)
    }
}
