//! # Object Model
//!
//! Entities, components and scenes are all nodes in one arena owned by the
//! [`World`]:
//!
//! - an **entity** owns child entities and at most one component per type
//! - a **component** is a node attached under an entity, keyed by its type
//! - a **scene** is a parentless node tagged with a [`SceneType`]; every
//!   node below it has the scene as its domain
//!
//! Behaviour is supplied by [`Behaviour`] objects whose [`Capabilities`]
//! decide which lifecycle hooks are ever called.

mod component;
mod context;
mod entity;
mod node;
mod registry;
mod scene;
mod world;

pub use component::{AsAny, Behaviour, Capabilities, ComponentKey, Hook};
pub use context::HookContext;
pub use entity::{EntityId, IdAllocator, InstanceId};
pub use node::{NodeKind, NodeState};
pub use registry::{NodeHandle, Registry};
pub use scene::{SceneFilter, SceneRef, SceneType};
pub use world::World;

pub(crate) use world::TickOutcome;
