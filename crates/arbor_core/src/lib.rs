//! # ARBOR Core
//!
//! Object-model runtime for an entity-component game framework:
//! - Entity identity that is never reused within a run
//! - Parent/child ownership and one-component-per-type attachment
//! - Scenes as domain roots, with scene-scoped event dispatch
//! - Deterministic lifecycle: create, load, update, late update, teardown
//!
//! ## Architecture Rules
//!
//! 1. **Arena, not pointers** - graph links are instance ids into one table
//! 2. **One writer** - the graph is mutated on the driving thread; others queue commands
//! 3. **No lock across user code** - the bus copies handlers out before running them
//!
//! ## Example
//!
//! ```rust,ignore
//! use arbor_core::{LifecycleDriver, World, WorldConfig};
//!
//! let mut world = World::new(WorldConfig::default());
//! let game = world.create_scene("Game")?;
//! let player = world.spawn_with(game, Player::default())?;
//!
//! let driver = LifecycleDriver::default();
//! let report = driver.tick(&mut world, 1.0 / 60.0);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod sync;

pub use config::{DriverConfig, WorldConfig};
pub use ecs::{
    AsAny, Behaviour, Capabilities, ComponentKey, EntityId, Hook, HookContext, IdAllocator,
    InstanceId, NodeHandle, NodeKind, NodeState, Registry, SceneFilter, SceneRef, SceneType, World,
};
pub use error::{
    EntityError, EntityResult, EventError, HandlerError, HandlerResult, HookError, HookResult,
};
pub use events::{
    AsyncContext, AsyncEventHandler, Completion, EventBus, EventHandler, HandlerDescriptor,
    HandlerFailure, HandlerId, HandlerTable, PublishReport,
};
pub use lifecycle::{HookFailure, LifecycleDriver, TickReport};
pub use sync::{Command, CommandSender};
