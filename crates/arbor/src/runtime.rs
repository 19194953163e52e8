//! # Runtime
//!
//! ```text
//! Frame N:
//! ┌────────────────────────────────────────────────────────────────┐
//! │ 1. MEASURE DT       wall clock since frame N-1, clamped        │
//! │ 2. TICK             LifecycleDriver::tick(world, dt)           │
//! │ 3. RECORD           FrameStats (timing, budget, failures)      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The runtime owns the world; hosts that drive their own loop can call
//! [`Runtime::frame_with_dt`] with a fixed step instead.

use std::path::Path;
use std::time::{Duration, Instant};

use arbor_core::{
    EntityError, InstanceId, LifecycleDriver, SceneType, TickReport, World,
};
use thiserror::Error;

use crate::config::{ConfigError, RuntimeConfig};

/// Largest dt handed to hooks, so a stall does not turn into one huge step.
pub const MAX_DT: f32 = 0.1;

/// Errors raised while building a runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A startup scene could not be created.
    #[error(transparent)]
    Entity(#[from] EntityError),
}

/// Accumulated frame statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameStats {
    /// Frames recorded.
    pub frames_recorded: u64,
    /// Sum of tick times.
    pub total_us_sum: u64,
    /// Fastest tick.
    pub min_frame_us: u64,
    /// Slowest tick.
    pub max_frame_us: u64,
    /// Ticks slower than the frame budget.
    pub frames_over_budget: u64,
    /// `update` plus `late_update` hooks run.
    pub hooks_run: u64,
    /// Hook failures observed.
    pub hook_failures: u64,
}

impl FrameStats {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames_recorded: 0,
            total_us_sum: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            frames_over_budget: 0,
            hooks_run: 0,
            hook_failures: 0,
        }
    }

    /// Records one tick.
    pub fn record(&mut self, report: &TickReport, budget: Option<Duration>) {
        let elapsed_us = u64::try_from(report.elapsed.as_micros()).unwrap_or(u64::MAX);
        self.frames_recorded += 1;
        self.total_us_sum = self.total_us_sum.saturating_add(elapsed_us);
        self.min_frame_us = self.min_frame_us.min(elapsed_us);
        self.max_frame_us = self.max_frame_us.max(elapsed_us);
        self.hooks_run += (report.updated + report.late_updated) as u64;
        self.hook_failures += report.failures.len() as u64;

        if budget.is_some_and(|budget| report.elapsed > budget) {
            self.frames_over_budget += 1;
        }
    }

    /// Average tick time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.total_us_sum as f64 / self.frames_recorded as f64) / 1000.0
    }

    /// Fraction of ticks over budget.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        self.frames_over_budget as f64 / self.frames_recorded as f64
    }

    /// Logs a one-line summary at info level.
    pub fn log_summary(&self) {
        tracing::info!(
            frames = self.frames_recorded,
            avg_ms = self.avg_frame_ms(),
            min_us = if self.frames_recorded == 0 { 0 } else { self.min_frame_us },
            max_us = self.max_frame_us,
            over_budget = self.frames_over_budget,
            hook_failures = self.hook_failures,
            "frame statistics"
        );
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns a world and ticks it.
///
/// # Example
///
/// ```rust,ignore
/// let mut runtime = Runtime::from_file("config/arbor.toml")?;
/// let game = runtime.scene("Game").expect("configured scene");
/// runtime.world_mut().spawn_with(game, Player::default())?;
///
/// loop {
///     let report = runtime.frame();
///     if quit_requested() {
///         break;
///     }
/// }
/// runtime.shutdown();
/// ```
pub struct Runtime {
    config: RuntimeConfig,
    world: World,
    driver: LifecycleDriver,
    scenes: Vec<(SceneType, InstanceId)>,
    last_frame: Instant,
    stats: FrameStats,
}

impl Runtime {
    /// Builds the world and creates the configured scenes.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Entity`] if a scene cannot be created.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let mut world = World::new(config.world.clone());
        let mut scenes = Vec::with_capacity(config.scenes.len());
        for scene_type in &config.scenes {
            let id = world.create_scene(scene_type.clone())?;
            scenes.push((scene_type.clone(), id));
        }
        tracing::info!(scenes = scenes.len(), "runtime started");

        Ok(Self {
            driver: LifecycleDriver::new(config.driver.clone()),
            config,
            world,
            scenes,
            last_frame: Instant::now(),
            stats: FrameStats::new(),
        })
    }

    /// Loads `path` and builds a runtime from it.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Config`] if the file cannot be loaded, plus the
    /// errors of [`new`](Self::new).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        Self::new(RuntimeConfig::from_file(path)?)
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the world.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The startup scene with this tag, if one was configured.
    #[must_use]
    pub fn scene(&self, tag: &str) -> Option<InstanceId> {
        self.scenes
            .iter()
            .find(|(scene_type, _)| scene_type.as_str() == tag)
            .map(|&(_, id)| id)
    }

    /// Runs one frame with dt measured from the wall clock.
    pub fn frame(&mut self) -> TickReport {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32().min(MAX_DT);
        self.last_frame = now;
        self.tick(dt)
    }

    /// Runs one frame with a caller-provided dt.
    pub fn frame_with_dt(&mut self, dt: f32) -> TickReport {
        self.last_frame = Instant::now();
        self.tick(dt)
    }

    /// Runs `frames` frames back to back with wall-clock dt. Returns the
    /// number of hook failures seen.
    pub fn run_frames(&mut self, frames: u64) -> usize {
        (0..frames).map(|_| self.frame().failures.len()).sum()
    }

    fn tick(&mut self, dt: f32) -> TickReport {
        let report = self.driver.tick(&mut self.world, dt);
        let budget = (self.config.driver.frame_budget_ms > 0)
            .then(|| Duration::from_millis(self.config.driver.frame_budget_ms));
        self.stats.record(&report, budget);
        report
    }

    /// Statistics accumulated since start.
    #[must_use]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Tears the world down and logs the frame statistics.
    pub fn shutdown(&mut self) {
        self.world.shutdown();
        self.scenes.clear();
        self.stats.log_summary();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("world", &self.world)
            .field("scenes", &self.scenes)
            .field("frames", &self.stats.frames_recorded)
            .finish_non_exhaustive()
    }
}
