//! Keyframe animation, advanced in parallel.
//!
//! Each [`Animator`] only reads and writes its own state, so the
//! [`AnimationSystem`] splits the animator table into disjoint chunks and
//! advances them on scoped threads. Sampled poses are then written into the
//! entities' Transforms on the calling thread.

use std::num::NonZeroUsize;
use std::thread;

use cairn_ecs::entity::EntityId;
use cairn_ecs::scene::Scene;
use rapier3d::na::{UnitQuaternion, Vector3};

use crate::components::Transform;

// ---------------------------------------------------------------------------
// Animator
// ---------------------------------------------------------------------------

/// One pose on an animation timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Keyframe {
    pub fn at(time: f32, position: Vector3<f32>) -> Self {
        Self {
            time,
            position,
            rotation: UnitQuaternion::identity(),
            scale: Vector3::repeat(1.0),
        }
    }
}

/// Sampled local pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationSample {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

/// Plays a keyframe track on its entity's Transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Animator {
    keyframes: Vec<Keyframe>,
    time: f32,
    pub speed: f32,
    pub looping: bool,
    playing: bool,
    sample: Option<AnimationSample>,
    advanced: bool,
}

impl Animator {
    /// Keyframes are sorted by time.
    pub fn new(mut keyframes: Vec<Keyframe>) -> Self {
        keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            keyframes,
            time: 0.0,
            speed: 1.0,
            looping: false,
            playing: true,
            sample: None,
            advanced: false,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Playback position in seconds.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn duration(&self) -> f32 {
        self.keyframes.last().map_or(0.0, |k| k.time)
    }

    /// Pose computed by the last [`advance`](Self::advance).
    pub fn sample(&self) -> Option<&AnimationSample> {
        self.sample.as_ref()
    }

    /// Move the playhead by `dt * speed` and resample.
    pub fn advance(&mut self, dt: f32) {
        self.advanced = false;
        if !self.playing || self.keyframes.is_empty() {
            return;
        }
        let duration = self.duration();
        self.time += dt * self.speed;
        if self.time >= duration {
            if self.looping && duration > 0.0 {
                self.time %= duration;
            } else {
                self.time = duration;
                self.playing = false;
            }
        }
        self.sample = Some(self.evaluate(self.time));
        self.advanced = true;
    }

    fn evaluate(&self, t: f32) -> AnimationSample {
        let next = self.keyframes.partition_point(|k| k.time <= t);
        let pose = |k: &Keyframe| AnimationSample {
            position: k.position,
            rotation: k.rotation,
            scale: k.scale,
        };
        match (next.checked_sub(1).map(|i| &self.keyframes[i]), self.keyframes.get(next)) {
            (Some(a), Some(b)) => {
                let span = b.time - a.time;
                let f = if span > 0.0 { (t - a.time) / span } else { 1.0 };
                AnimationSample {
                    position: a.position.lerp(&b.position, f),
                    rotation: a.rotation.slerp(&b.rotation, f),
                    scale: a.scale.lerp(&b.scale, f),
                }
            }
            (Some(a), None) => pose(a),
            (None, Some(b)) => pose(b),
            (None, None) => AnimationSample {
                position: Vector3::zeros(),
                rotation: UnitQuaternion::identity(),
                scale: Vector3::repeat(1.0),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// AnimationSystem
// ---------------------------------------------------------------------------

/// Advances every [`Animator`] and applies its sample to the Transform.
#[derive(Debug, Clone)]
pub struct AnimationSystem {
    workers: usize,
    /// Tables smaller than this run on the calling thread.
    min_chunk: usize,
}

impl Default for AnimationSystem {
    fn default() -> Self {
        Self::new(thread::available_parallelism().map_or(1, NonZeroUsize::get))
    }
}

impl AnimationSystem {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            min_chunk: 64,
        }
    }

    pub fn with_min_chunk(mut self, min_chunk: usize) -> Self {
        self.min_chunk = min_chunk.max(1);
        self
    }

    /// Advance all animators by `dt` and write their samples.
    pub fn update(&self, scene: &mut Scene, dt: f32) {
        let Some(table) = scene.table_mut::<Animator>() else {
            return;
        };
        let (_, animators) = table.split_mut();
        if animators.is_empty() {
            return;
        }

        let chunk = animators.len().div_ceil(self.workers).max(self.min_chunk);
        if chunk >= animators.len() {
            animators.iter_mut().for_each(|a| a.advance(dt));
        } else {
            thread::scope(|s| {
                for part in animators.chunks_mut(chunk) {
                    s.spawn(move || part.iter_mut().for_each(|a| a.advance(dt)));
                }
            });
        }

        // Stopped animators leave the Transform to other writers.
        let samples: Vec<(EntityId, AnimationSample)> = scene
            .iter::<Animator>()
            .filter(|(_, a)| a.advanced)
            .filter_map(|(e, a)| a.sample.map(|s| (e, s)))
            .collect();
        for (entity, sample) in samples {
            if let Some(t) = scene.get_component_mut::<Transform>(entity) {
                t.position = sample.position;
                t.rotation = sample.rotation;
                t.scale = sample.scale;
            }
        }
    }
}
