//! # World Configuration
//!
//! Loaded once at startup, usually as the `[world]` and `[driver]` tables of
//! the runtime's TOML file. Every field has a default so partial files work.

use serde::{Deserialize, Serialize};

/// Settings for a [`World`](crate::World).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Expected number of live nodes; used to pre-size the arena and
    /// registry.
    pub capacity_hint: usize,
    /// Publish a [`HookFailure`](crate::HookFailure) event in the failing
    /// node's domain whenever a lifecycle hook returns an error.
    pub publish_hook_failures: bool,
    /// Publish each [`HandlerFailure`](crate::HandlerFailure) recorded by a
    /// synchronous dispatch in the scene it was published in.
    pub publish_handler_failures: bool,
    /// Bound for the deferred command queue. `None` means unbounded.
    pub command_queue_capacity: Option<usize>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            capacity_hint: 1024,
            publish_hook_failures: false,
            publish_handler_failures: false,
            command_queue_capacity: None,
        }
    }
}

/// Settings for the [`LifecycleDriver`](crate::LifecycleDriver).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// A tick taking longer than this is logged as a warning. `0` disables
    /// the check.
    pub frame_budget_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: 16,
        }
    }
}
