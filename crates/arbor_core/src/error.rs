//! # Error Types
//!
//! Structural violations ([`EntityError`]) are returned to the caller of the
//! mutating operation. Hook and handler failures ([`HookError`],
//! [`HandlerError`]) are isolated per node / per handler, logged, and handed
//! back as data in reports; they never abort a tick or a publish fan-out.

use thiserror::Error;

use crate::ecs::{EntityId, InstanceId};

/// Errors raised by graph mutations and identity allocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// A component of this type is already attached to the entity.
    #[error("entity {entity} already has a `{component}` component")]
    DuplicateComponent {
        /// The entity the component was attached to.
        entity: InstanceId,
        /// Type name of the component.
        component: &'static str,
    },

    /// The child is owned by another parent and must be removed first.
    #[error("node {child} is already parented to {parent}")]
    AlreadyParented {
        /// The node that was being added.
        child: InstanceId,
        /// Its current parent.
        parent: InstanceId,
    },

    /// No live node with this instance id.
    #[error("node {0} not found")]
    NotFound(InstanceId),

    /// The identifier space is used up. The process cannot safely continue
    /// issuing identities.
    #[error("instance id allocator exhausted")]
    AllocatorExhausted,

    /// Another live node already uses this external id.
    #[error("external id {0} is already registered")]
    DuplicateId(EntityId),

    /// Adding the child would make a node its own ancestor.
    #[error("adding {child} under {parent} would create a cycle")]
    WouldCycle {
        /// The node that was being added.
        child: InstanceId,
        /// The requested parent.
        parent: InstanceId,
    },

    /// Components live in their owner's component map and cannot be moved
    /// with `add_child` / `remove_child`.
    #[error("component node {0} cannot be reparented")]
    ComponentNotReparentable(InstanceId),
}

/// Result type for graph operations.
pub type EntityResult<T> = Result<T, EntityError>;

/// Failure returned by a lifecycle hook.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// The hook could not complete.
    #[error("{0}")]
    Failed(String),

    /// The hook observed a cancellation signal.
    #[error("cancelled")]
    Cancelled,
}

impl HookError {
    /// Convenience constructor for [`HookError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result type returned by lifecycle hooks.
pub type HookResult = Result<(), HookError>;

/// Failure returned by, or recorded for, an event handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler could not complete.
    #[error("{0}")]
    Failed(String),

    /// The handler was cancelled at a suspension point.
    #[error("cancelled")]
    Cancelled,

    /// An asynchronous handler matched a synchronous publish and was skipped.
    #[error("asynchronous handler skipped by synchronous publish")]
    AsyncInSyncPublish,

    /// `publish_async` was called outside a Tokio runtime.
    #[error("no async runtime available to start handler")]
    NoRuntime,
}

impl HandlerError {
    /// Convenience constructor for [`HandlerError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result type returned by event handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Errors raised while registering event handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The descriptor was built without a scene filter. Use
    /// `SceneFilter::Any` to opt into every domain.
    #[error("handler `{0}` has no scene filter")]
    MissingSceneFilter(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EntityError::DuplicateComponent {
            entity: InstanceId::from_raw(3),
            component: "Health",
        };
        assert_eq!(err.to_string(), "entity #3 already has a `Health` component");

        let err = EntityError::AlreadyParented {
            child: InstanceId::from_raw(5),
            parent: InstanceId::from_raw(1),
        };
        assert_eq!(err.to_string(), "node #5 is already parented to #1");
    }
}
