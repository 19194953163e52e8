//! # Lifecycle
//!
//! The [`LifecycleDriver`] ticks a world once per frame:
//!
//! ```text
//! apply commands ─> update pass ─> apply commands ─> late update pass
//! ```
//!
//! Only nodes declaring [`Capabilities::UPDATE`](crate::Capabilities::UPDATE)
//! or [`Capabilities::LATE_UPDATE`](crate::Capabilities::LATE_UPDATE) are
//! visited, in creation order. Nodes created during a tick join the next one.

mod driver;

pub use driver::{LifecycleDriver, TickReport};

use crate::ecs::{Hook, InstanceId};
use crate::error::HookError;

/// A lifecycle hook that returned an error.
///
/// Collected by the world and, when enabled in
/// [`WorldConfig`](crate::WorldConfig), also published as an event in the
/// failing node's domain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookFailure {
    /// The node whose hook failed.
    pub node: InstanceId,
    /// Which hook.
    pub hook: Hook,
    /// What it returned.
    pub error: HookError,
}
