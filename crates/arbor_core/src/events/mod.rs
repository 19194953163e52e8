//! # Scene-scoped Events
//!
//! ```text
//!  publish(scene, E) ──> resolve handlers for E ──> filter by scene tag ──> run
//!                         (bus lock held here only)   Only(tag) | Any
//! ```
//!
//! - [`EventBus::publish`] runs synchronous handlers in order and returns a
//!   [`PublishReport`].
//! - [`EventBus::publish_async`] also starts asynchronous handlers and
//!   returns a [`Completion`] that resolves once all of them, and any nested
//!   async publish they made, have settled.

mod bus;
mod completion;
mod handler;
mod report;

pub use bus::EventBus;
pub use completion::{AsyncContext, Completion};
pub use handler::{AsyncEventHandler, EventHandler, HandlerDescriptor, HandlerId, HandlerTable};
pub use report::{HandlerFailure, PublishReport};
