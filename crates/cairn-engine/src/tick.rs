//! Fixed-step accumulator loop.
//!
//! The [`TickLoop`] turns variable wall-clock frame deltas into a whole
//! number of fixed ticks. Each frame:
//!
//! 1. The real delta is clamped to `max_frame_dt`, so a long stall cannot
//!    demand an unbounded number of catch-up ticks.
//! 2. The clamped delta is scaled by `time_scale`, or zeroed while paused.
//! 3. The accumulator grows and one tick is emitted per `fixed_dt` it holds,
//!    up to `max_ticks_per_frame`. Whatever is left beyond the cap is
//!    dropped.
//!
//! While paused the accumulator still advances by unscaled time, so fixed
//! ticks keep their cadence with `dt = 0` and `unscaled_dt = fixed_dt`.
//!
//! # Example
//!
//! ```
//! use cairn_engine::config::TickConfig;
//! use cairn_engine::tick::TickLoop;
//!
//! let mut tick_loop = TickLoop::new(TickConfig { fixed_dt: 0.125, ..Default::default() });
//! let timing = tick_loop.begin_frame(0.25);
//! assert_eq!(timing.ticks, 2);
//! assert_eq!(tick_loop.tick_count(), 2);
//! ```

use tracing::debug;

use crate::config::TickConfig;

// ---------------------------------------------------------------------------
// FixedTick / FrameTiming
// ---------------------------------------------------------------------------

/// Deltas handed to each fixed tick of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedTick {
    /// Simulation delta: `fixed_dt`, or zero while paused.
    pub dt: f32,
    /// Always `fixed_dt`.
    pub unscaled_dt: f32,
}

/// Timing of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Scaled, clamped frame delta; zero while paused.
    pub dt: f32,
    /// Clamped frame delta before scaling.
    pub unscaled_dt: f32,
    /// Wall-clock delta as measured. Used for rendering.
    pub real_dt: f32,
    /// Fixed ticks to run this frame.
    pub ticks: u32,
    /// Per-tick deltas.
    pub fixed: FixedTick,
    /// Fraction of a tick left in the accumulator, in `[0, 1)`.
    pub alpha: f32,
    pub paused: bool,
}

// ---------------------------------------------------------------------------
// TickLoop
// ---------------------------------------------------------------------------

/// Accumulator that decouples frame time from the fixed tick.
#[derive(Debug, Clone)]
pub struct TickLoop {
    config: TickConfig,
    accumulator: f32,
    paused: bool,
    tick_count: u64,
    frame_count: u64,
    /// Simulated seconds (sum of scaled tick deltas).
    sim_time: f64,
}

impl TickLoop {
    /// # Panics
    ///
    /// Panics if `config.fixed_dt` is not positive and finite.
    pub fn new(config: TickConfig) -> Self {
        assert!(
            config.fixed_dt > 0.0 && config.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        Self {
            config,
            accumulator: 0.0,
            paused: false,
            tick_count: 0,
            frame_count: 0,
            sim_time: 0.0,
        }
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    pub fn fixed_dt(&self) -> f32 {
        self.config.fixed_dt
    }

    pub fn time_scale(&self) -> f32 {
        self.config.time_scale
    }

    /// Negative or non-finite scales are clamped to zero.
    pub fn set_time_scale(&mut self, scale: f32) {
        self.config.time_scale = if scale.is_finite() { scale.max(0.0) } else { 0.0 };
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            debug!(paused, "time paused state changed");
        }
        self.paused = paused;
    }

    /// Total fixed ticks emitted.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Simulated seconds.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Account for a frame that took `real_dt` seconds of wall-clock time.
    pub fn begin_frame(&mut self, real_dt: f32) -> FrameTiming {
        let real_dt = if real_dt.is_finite() { real_dt.max(0.0) } else { 0.0 };
        let unscaled_dt = real_dt.min(self.config.max_frame_dt);
        let dt = if self.paused {
            0.0
        } else {
            unscaled_dt * self.config.time_scale
        };

        let fixed_dt = self.config.fixed_dt;
        self.accumulator += if self.paused { unscaled_dt } else { dt };

        let mut ticks = 0;
        while self.accumulator >= fixed_dt && ticks < self.config.max_ticks_per_frame {
            self.accumulator -= fixed_dt;
            ticks += 1;
        }
        if self.accumulator >= fixed_dt {
            debug!(
                dropped = self.accumulator - self.accumulator % fixed_dt,
                "tick cap reached, dropping accumulated time"
            );
            self.accumulator %= fixed_dt;
        }

        let fixed = FixedTick {
            dt: if self.paused { 0.0 } else { fixed_dt },
            unscaled_dt: fixed_dt,
        };
        self.tick_count += u64::from(ticks);
        self.frame_count += 1;
        self.sim_time += f64::from(fixed.dt) * f64::from(ticks);

        FrameTiming {
            dt,
            unscaled_dt,
            real_dt,
            ticks,
            fixed,
            alpha: self.accumulator / fixed_dt,
            paused: self.paused,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
