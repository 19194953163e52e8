//! # Cross-thread Mutation
//!
//! The entity graph is mutated on one driving thread only. Other threads
//! (and async handlers, which never hold the world) queue mutations through
//! a [`CommandSender`]; the world applies them at fixed points between
//! passes.
//!
//! ```text
//!  worker / async task ──push──> [ CommandQueue ] ──drain──> World (driving thread)
//!                                                   │
//!                                   start of tick ──┤
//!                        between update/late update ┘
//! ```

mod command_queue;

pub use command_queue::{Command, CommandSender};
pub(crate) use command_queue::CommandQueue;
