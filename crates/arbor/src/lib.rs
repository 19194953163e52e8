//! # ARBOR
//!
//! Runtime facade over [`arbor_core`]:
//! - [`RuntimeConfig`] - one TOML file for world, driver, logging and startup scenes
//! - [`init_tracing`] - `tracing` subscriber with `RUST_LOG` support
//! - [`Runtime`] - owns a world, ticks it, keeps frame statistics
//!
//! ## Example
//!
//! ```rust,ignore
//! use arbor::prelude::*;
//!
//! let config = RuntimeConfig::from_file("config/arbor.toml")?;
//! arbor::init_tracing(&config.logging);
//!
//! let mut runtime = Runtime::new(config)?;
//! let game = runtime.scene("Game").expect("configured scene");
//! runtime.world_mut().spawn_with(game, Player::default())?;
//! runtime.run_frames(600);
//! runtime.shutdown();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod logging;
pub mod runtime;

pub use arbor_core;

pub use config::{ConfigError, LoggingConfig, RuntimeConfig};
pub use logging::init_tracing;
pub use runtime::{FrameStats, Runtime, RuntimeError, MAX_DT};

/// Everything a game crate usually needs.
pub mod prelude {
    pub use crate::{FrameStats, Runtime, RuntimeConfig, RuntimeError};
    pub use arbor_core::{
        AsyncContext, Behaviour, Capabilities, CommandSender, Completion, EntityError, EntityId,
        EntityResult, HandlerDescriptor, HandlerError, HandlerResult, HandlerTable, HookContext,
        HookError, HookFailure, HookResult, InstanceId, LifecycleDriver, NodeState,
        PublishReport, SceneFilter, SceneRef, SceneType, TickReport, World, WorldConfig,
    };
}
