//! # Lifecycle Driver
//!
//! ```text
//! tick(dt):
//! ┌───────────────────────────────────────────────────────────────┐
//! │ 1. APPLY COMMANDS      queued off-thread / async mutations    │
//! │ 2. BEGIN FRAME         frame += 1                             │
//! │ 3. UPDATE PASS         update(dt), creation order             │
//! │ 4. APPLY COMMANDS      fixed point between passes             │
//! │ 5. LATE UPDATE PASS    late_update(dt), creation order        │
//! │ 6. END FRAME           prune disposed nodes, collect failures │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use super::HookFailure;
use crate::config::DriverConfig;
use crate::ecs::{Hook, TickOutcome, World};

/// Outcome of one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Frame number of this tick.
    pub frame: u64,
    /// `update` hooks that ran.
    pub updated: usize,
    /// `late_update` hooks that ran.
    pub late_updated: usize,
    /// Members of a pass that were not ticked (created this frame, or being
    /// disposed).
    pub skipped: usize,
    /// Deferred commands applied during the tick.
    pub commands_applied: usize,
    /// Hook failures since the previous tick.
    pub failures: Vec<HookFailure>,
    /// Wall time spent in the tick.
    pub elapsed: Duration,
}

/// Ticks a [`World`] once per frame.
#[derive(Clone, Debug)]
pub struct LifecycleDriver {
    config: DriverConfig,
    budget: Option<Duration>,
}

impl LifecycleDriver {
    /// Creates a driver.
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        let budget = (config.frame_budget_ms > 0)
            .then(|| Duration::from_millis(config.frame_budget_ms));
        Self { config, budget }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Runs one frame: every `update`, then every `late_update`.
    ///
    /// Hook failures are isolated per node. They are logged when they happen
    /// and returned in the report; the tick always runs to completion.
    pub fn tick(&self, world: &mut World, dt: f32) -> TickReport {
        let started = Instant::now();
        let mut report = TickReport {
            commands_applied: world.apply_commands(),
            ..TickReport::default()
        };
        report.frame = world.begin_frame();

        let (updated, skipped) = Self::pass(world, Hook::Update, dt);
        report.updated = updated;
        report.skipped += skipped;

        report.commands_applied += world.apply_commands();

        let (late_updated, skipped) = Self::pass(world, Hook::LateUpdate, dt);
        report.late_updated = late_updated;
        report.skipped += skipped;

        world.end_frame();
        report.failures = world.take_hook_failures();
        report.elapsed = started.elapsed();

        if self.budget.is_some_and(|budget| report.elapsed > budget) {
            tracing::warn!(
                frame = report.frame,
                elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
                budget_ms = self.config.frame_budget_ms,
                "tick exceeded frame budget"
            );
        }
        tracing::trace!(
            frame = report.frame,
            updated = report.updated,
            late_updated = report.late_updated,
            failures = report.failures.len(),
            "tick"
        );
        report
    }

    fn pass(world: &mut World, hook: Hook, dt: f32) -> (usize, usize) {
        let members = world.take_pass(hook);
        let mut ran = 0;
        let mut skipped = 0;
        for &id in &members {
            match world.tick_node(id, hook, dt) {
                TickOutcome::Ran => ran += 1,
                TickOutcome::Skipped => skipped += 1,
                TickOutcome::Gone => {}
            }
        }
        world.restore_pass(hook, members);
        (ran, skipped)
    }
}

impl Default for LifecycleDriver {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::config::WorldConfig;
    use crate::ecs::{Behaviour, Capabilities, HookContext, InstanceId, NodeState};
    use crate::error::{HookError, HookResult};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Ticker {
        name: String,
        log: Log,
    }

    impl Behaviour for Ticker {
        fn capabilities(&self) -> Capabilities {
            Capabilities::UPDATE | Capabilities::LATE_UPDATE
        }

        fn update(&mut self, _ctx: &mut HookContext<'_>, _dt: f32) -> HookResult {
            self.log.lock().push(format!("{}:update", self.name));
            Ok(())
        }

        fn late_update(&mut self, _ctx: &mut HookContext<'_>, _dt: f32) -> HookResult {
            self.log.lock().push(format!("{}:late", self.name));
            Ok(())
        }
    }

    fn ticker(name: &str, log: &Log) -> Ticker {
        Ticker {
            name: name.to_owned(),
            log: Arc::clone(log),
        }
    }

    #[test]
    fn test_update_pass_completes_before_late_update() {
        let mut world = World::new(WorldConfig::default());
        let log = Log::default();
        let game = world.create_scene("Game").unwrap();
        world.spawn_with(game, ticker("a", &log)).unwrap();
        world.spawn_with(game, ticker("b", &log)).unwrap();

        let driver = LifecycleDriver::default();
        let report = driver.tick(&mut world, 0.016);

        assert_eq!(report.frame, 1);
        assert_eq!(report.updated, 2);
        assert_eq!(report.late_updated, 2);
        assert_eq!(
            *log.lock(),
            vec!["a:update", "b:update", "a:late", "b:late"]
        );
    }

    #[test]
    fn test_failure_isolated_to_one_node() {
        struct Broken;
        impl Behaviour for Broken {
            fn capabilities(&self) -> Capabilities {
                Capabilities::UPDATE
            }

            fn update(&mut self, _ctx: &mut HookContext<'_>, _dt: f32) -> HookResult {
                Err(HookError::failed("nan position"))
            }
        }

        let mut world = World::new(WorldConfig::default());
        let log = Log::default();
        let game = world.create_scene("Game").unwrap();
        let broken = world.spawn_with(game, Broken).unwrap();
        world.spawn_with(game, ticker("ok", &log)).unwrap();

        let report = LifecycleDriver::default().tick(&mut world, 0.016);

        assert_eq!(report.updated, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].node, broken);
        assert_eq!(report.failures[0].hook, Hook::Update);
        assert!(log.lock().contains(&"ok:update".to_owned()));
    }

    #[test]
    fn test_nodes_spawned_mid_tick_join_next_frame() {
        struct Spawner {
            log: Log,
            spawned: Option<InstanceId>,
        }

        impl Behaviour for Spawner {
            fn capabilities(&self) -> Capabilities {
                Capabilities::UPDATE
            }

            fn update(&mut self, ctx: &mut HookContext<'_>, _dt: f32) -> HookResult {
                if self.spawned.is_none() {
                    let parent = ctx.parent().ok_or_else(|| HookError::failed("orphan"))?;
                    let child = ctx
                        .spawn_with(parent, ticker("late-comer", &self.log))
                        .map_err(|e| HookError::failed(e.to_string()))?;
                    self.spawned = Some(child);
                }
                Ok(())
            }
        }

        let mut world = World::new(WorldConfig::default());
        let log = Log::default();
        let game = world.create_scene("Game").unwrap();
        world
            .spawn_with(
                game,
                Spawner {
                    log: Arc::clone(&log),
                    spawned: None,
                },
            )
            .unwrap();
        let driver = LifecycleDriver::default();

        let first = driver.tick(&mut world, 0.016);
        assert!(log.lock().is_empty());
        assert_eq!(first.skipped, 1);

        driver.tick(&mut world, 0.016);
        assert_eq!(*log.lock(), vec!["late-comer:update", "late-comer:late"]);
    }

    #[test]
    fn test_node_disposed_mid_pass_is_skipped() {
        struct Reaper {
            victim: Option<InstanceId>,
        }

        impl Behaviour for Reaper {
            fn capabilities(&self) -> Capabilities {
                Capabilities::UPDATE
            }

            fn update(&mut self, ctx: &mut HookContext<'_>, _dt: f32) -> HookResult {
                if let Some(victim) = self.victim {
                    ctx.dispose(victim);
                }
                Ok(())
            }
        }

        let mut world = World::new(WorldConfig::default());
        let log = Log::default();
        let game = world.create_scene("Game").unwrap();
        let reaper = world.spawn_with(game, Reaper { victim: None }).unwrap();
        let victim = world.spawn_with(game, ticker("victim", &log)).unwrap();
        world.behaviour_mut::<Reaper>(reaper).unwrap().victim = Some(victim);

        let report = LifecycleDriver::default().tick(&mut world, 0.016);

        assert!(log.lock().is_empty());
        assert_eq!(report.updated, 1);
        assert_eq!(world.state(victim), NodeState::Disposed);
    }

    #[test]
    fn test_ticked_nodes_become_active_and_commands_apply() {
        let mut world = World::new(WorldConfig::default());
        let log = Log::default();
        let game = world.create_scene("Game").unwrap();
        let node = world.spawn_with(game, ticker("n", &log)).unwrap();
        let sender = world.command_sender();
        sender.push(move |world| world.spawn(game).map(|_| ()));

        let report = LifecycleDriver::default().tick(&mut world, 0.016);

        assert_eq!(report.commands_applied, 1);
        assert_eq!(world.state(node), NodeState::Active);
        assert_eq!(world.children(game).len(), 2);
    }
}
