//! Engine configuration.
//!
//! [`EngineConfig`] groups the fixed-step loop settings ([`TickConfig`]) and
//! the physics settings ([`PhysicsConfig`]). Both have sensible defaults and
//! can be loaded from JSON; missing fields fall back to their defaults.
//!
//! ```
//! use cairn_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "physics": { "async_step": false } }"#).unwrap();
//! assert!(!config.physics.async_step);
//! assert_eq!(config.tick.max_ticks_per_frame, 5);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::EngineError;

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Settings for the fixed-step accumulator loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Fixed time step in seconds per tick. Must be positive and finite.
    pub fixed_dt: f32,
    /// Frame deltas longer than this are clamped before accumulation.
    pub max_frame_dt: f32,
    /// Upper bound on fixed ticks run in a single frame.
    pub max_ticks_per_frame: u32,
    /// Global multiplier applied to the clamped frame delta.
    pub time_scale: f32,
}

impl Default for TickConfig {
    /// 60 Hz, a quarter-second frame clamp, at most 5 catch-up ticks.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            max_frame_dt: 0.25,
            max_ticks_per_frame: 5,
            time_scale: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PhysicsConfig
// ---------------------------------------------------------------------------

/// What the collision dispatcher does with an Exit whose pair lost an
/// endpoint to destruction since the previous step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyedExitPolicy {
    /// Drop the Exit for both sides of the pair.
    #[default]
    DropPair,
    /// Deliver the Exit to the endpoint that is still valid only.
    NotifySurvivor,
}

/// Settings for the physics world and orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// World gravity.
    pub gravity: [f32; 3],
    /// Constraint-solver iterations per step.
    pub solver_iterations: u32,
    /// Run each step on a background task and join it at the next barrier.
    pub async_step: bool,
    /// A contact point closer than this counts as touching.
    pub contact_distance: f32,
    /// Exit handling for pairs whose endpoint was destroyed.
    pub destroyed_exit: DestroyedExitPolicy,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.81, 0.0],
            solver_iterations: 10,
            async_step: true,
            contact_distance: 0.1,
            destroyed_exit: DestroyedExitPolicy::DropPair,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick: TickConfig,
    pub physics: PhysicsConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Reject values the loop or the solver cannot work with.
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |field: &'static str, reason: String| -> Result<(), EngineError> {
            Err(EngineError::InvalidConfig { field, reason })
        };
        if !(self.tick.fixed_dt > 0.0 && self.tick.fixed_dt.is_finite()) {
            return invalid("tick.fixed_dt", format!("must be positive, got {}", self.tick.fixed_dt));
        }
        if !(self.tick.max_frame_dt >= self.tick.fixed_dt) {
            return invalid(
                "tick.max_frame_dt",
                format!("must be at least fixed_dt, got {}", self.tick.max_frame_dt),
            );
        }
        if self.tick.max_ticks_per_frame == 0 {
            return invalid("tick.max_ticks_per_frame", "must be at least 1".to_owned());
        }
        if !(self.tick.time_scale >= 0.0 && self.tick.time_scale.is_finite()) {
            return invalid(
                "tick.time_scale",
                format!("must be non-negative, got {}", self.tick.time_scale),
            );
        }
        if self.physics.solver_iterations == 0 {
            return invalid("physics.solver_iterations", "must be at least 1".to_owned());
        }
        if self.physics.gravity.iter().any(|g| !g.is_finite()) {
            return invalid("physics.gravity", "components must be finite".to_owned());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert!((config.tick.fixed_dt - 1.0 / 60.0).abs() < f32::EPSILON);
        assert_eq!(config.physics.gravity, [0.0, -9.81, 0.0]);
        assert!(config.physics.async_step);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "tick": { "time_scale": 0.5 }, "physics": { "destroyed_exit": "notify_survivor" } }"#,
        )
        .unwrap();
        assert_eq!(config.tick.time_scale, 0.5);
        assert_eq!(config.tick.max_ticks_per_frame, 5);
        assert_eq!(
            config.physics.destroyed_exit,
            DestroyedExitPolicy::NotifySurvivor
        );
    }

    #[test]
    fn zero_fixed_dt_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "tick": { "fixed_dt": 0.0 } }"#).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidConfig { field: "tick.fixed_dt", .. }
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = EngineConfig::from_json_str("{ tick: ").unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, EngineError::ConfigIo { .. }));
    }
}
