//! Stack of game states.
//!
//! Only the top state is ticked and rendered; states beneath it are
//! suspended. States request stack changes by returning a [`Transition`]
//! from their update hooks, which the machine applies after the hook
//! returns.

use std::fmt;

use tracing::debug;

use crate::app::AppContext;
use crate::tick::FixedTick;

/// Stack change requested by a state.
#[derive(Default)]
pub enum Transition {
    #[default]
    None,
    Push(Box<dyn GameState>),
    Pop,
    /// Pop the current state, then push the new one.
    Change(Box<dyn GameState>),
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::None => f.write_str("None"),
            Transition::Push(s) => f.debug_tuple("Push").field(&s.name()).finish(),
            Transition::Pop => f.write_str("Pop"),
            Transition::Change(s) => f.debug_tuple("Change").field(&s.name()).finish(),
        }
    }
}

/// A screen or mode of the application.
///
/// Every hook has a default so states override only what they need.
/// `render` takes `&self` and a shared context: it may read the scene but
/// cannot change it.
pub trait GameState {
    fn name(&self) -> &str {
        "state"
    }

    fn on_enter(&mut self, _ctx: &mut AppContext) {}

    fn on_exit(&mut self, _ctx: &mut AppContext) {}

    fn update(&mut self, _ctx: &mut AppContext, _dt: f32) -> Transition {
        Transition::None
    }

    fn fixed_update(&mut self, _ctx: &mut AppContext, _tick: FixedTick) -> Transition {
        Transition::None
    }

    fn render(&self, _ctx: &AppContext) {}
}

/// Owns the state stack.
#[derive(Default)]
pub struct StateMachine {
    stack: Vec<Box<dyn GameState>>,
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stack.iter().map(|s| s.name())).finish()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `state`, make it current and call `on_enter`.
    pub fn push(&mut self, ctx: &mut AppContext, mut state: Box<dyn GameState>) {
        debug!(state = state.name(), depth = self.stack.len() + 1, "push state");
        state.on_enter(ctx);
        self.stack.push(state);
    }

    /// Call `on_exit` on the current state and drop it. Returns `false` on
    /// an empty stack.
    pub fn pop(&mut self, ctx: &mut AppContext) -> bool {
        let Some(mut state) = self.stack.pop() else {
            return false;
        };
        debug!(state = state.name(), depth = self.stack.len(), "pop state");
        state.on_exit(ctx);
        true
    }

    pub fn change(&mut self, ctx: &mut AppContext, state: Box<dyn GameState>) {
        self.pop(ctx);
        self.push(ctx, state);
    }

    /// Pop every state, top first.
    pub fn clear(&mut self, ctx: &mut AppContext) {
        while self.pop(ctx) {}
    }

    pub fn current(&self) -> Option<&dyn GameState> {
        self.stack.last().map(|s| s.as_ref())
    }

    pub fn current_mut(&mut self) -> Option<&mut (dyn GameState + 'static)> {
        self.stack.last_mut().map(|s| s.as_mut())
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn update(&mut self, ctx: &mut AppContext, dt: f32) {
        let transition = match self.stack.last_mut() {
            Some(state) => state.update(ctx, dt),
            None => return,
        };
        self.apply(ctx, transition);
    }

    pub fn fixed_update(&mut self, ctx: &mut AppContext, tick: FixedTick) {
        let transition = match self.stack.last_mut() {
            Some(state) => state.fixed_update(ctx, tick),
            None => return,
        };
        self.apply(ctx, transition);
    }

    pub fn render(&self, ctx: &AppContext) {
        if let Some(state) = self.stack.last() {
            state.render(ctx);
        }
    }

    fn apply(&mut self, ctx: &mut AppContext, transition: Transition) {
        match transition {
            Transition::None => {}
            Transition::Push(state) => self.push(ctx, state),
            Transition::Pop => {
                self.pop(ctx);
            }
            Transition::Change(state) => self.change(ctx, state),
        }
    }
}
