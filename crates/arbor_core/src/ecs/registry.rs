//! # Entity Registry
//!
//! Thread-safe index from identifiers to live nodes. The world is the only
//! writer; collaborators (network, UI) hold cheap clones and query from any
//! thread.
//!
//! Both indices are updated inside one write-lock critical section, so a
//! concurrent reader observes a node either fully registered or fully gone.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::entity::{EntityId, InstanceId};
use super::node::NodeKind;
use crate::error::{EntityError, EntityResult};

/// Snapshot of a registered node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeHandle {
    /// Locally unique id.
    pub instance_id: InstanceId,
    /// External id.
    pub id: EntityId,
    /// What the node is.
    pub kind: NodeKind,
}

#[derive(Default)]
struct RegistryInner {
    by_instance: HashMap<InstanceId, NodeHandle>,
    by_id: HashMap<EntityId, InstanceId>,
}

/// Shared handle to the registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry sized for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                by_instance: HashMap::with_capacity(capacity),
                by_id: HashMap::with_capacity(capacity),
            })),
        }
    }

    /// Registers a node under both of its identifiers.
    ///
    /// # Errors
    ///
    /// [`EntityError::DuplicateId`] if another live node already uses the
    /// external id. Nothing is inserted in that case.
    pub(crate) fn register(&self, handle: NodeHandle) -> EntityResult<()> {
        let mut inner = self.inner.write();
        if inner.by_id.contains_key(&handle.id) {
            return Err(EntityError::DuplicateId(handle.id));
        }
        inner.by_id.insert(handle.id, handle.instance_id);
        inner.by_instance.insert(handle.instance_id, handle);
        Ok(())
    }

    /// Registers a node whose external id was derived from its instance id.
    ///
    /// Never fails: if a node registered earlier with an explicit id already
    /// holds the same value, that node keeps the external-id slot and the new
    /// node is reachable by instance id only.
    pub(crate) fn register_derived(&self, handle: NodeHandle) {
        let mut inner = self.inner.write();
        inner.by_id.entry(handle.id).or_insert(handle.instance_id);
        inner.by_instance.insert(handle.instance_id, handle);
    }

    /// Removes a node from both indices. Returns the removed record.
    pub(crate) fn unregister(&self, instance_id: InstanceId) -> Option<NodeHandle> {
        let mut inner = self.inner.write();
        let handle = inner.by_instance.remove(&instance_id)?;
        if inner.by_id.get(&handle.id) == Some(&instance_id) {
            inner.by_id.remove(&handle.id);
        }
        Some(handle)
    }

    /// Returns true if `id` is not yet taken by a live node.
    pub(crate) fn is_id_free(&self, id: EntityId) -> bool {
        !self.inner.read().by_id.contains_key(&id)
    }

    /// Looks a node up by external id.
    #[must_use]
    pub fn lookup(&self, id: EntityId) -> Option<NodeHandle> {
        let inner = self.inner.read();
        inner
            .by_id
            .get(&id)
            .and_then(|instance| inner.by_instance.get(instance))
            .cloned()
    }

    /// Looks a node up by instance id.
    #[must_use]
    pub fn lookup_by_instance(&self, instance_id: InstanceId) -> Option<NodeHandle> {
        self.inner.read().by_instance.get(&instance_id).cloned()
    }

    /// Returns true if the instance id belongs to a live node.
    #[must_use]
    pub fn contains(&self, instance_id: InstanceId) -> bool {
        self.inner.read().by_instance.contains_key(&instance_id)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_instance.len()
    }

    /// Returns true if no node is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(instance: u64, id: u64) -> NodeHandle {
        NodeHandle {
            instance_id: InstanceId::from_raw(instance),
            id: EntityId(id),
            kind: NodeKind::Entity,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = Registry::new();
        registry.register(handle(1, 100)).unwrap();

        assert_eq!(registry.lookup(EntityId(100)), Some(handle(1, 100)));
        assert_eq!(
            registry.lookup_by_instance(InstanceId::from_raw(1)),
            Some(handle(1, 100))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_clears_both_indices() {
        let registry = Registry::new();
        registry.register(handle(1, 100)).unwrap();
        assert!(registry.unregister(InstanceId::from_raw(1)).is_some());

        assert_eq!(registry.lookup(EntityId(100)), None);
        assert_eq!(registry.lookup_by_instance(InstanceId::from_raw(1)), None);
        assert!(registry.is_empty());
        assert!(registry.unregister(InstanceId::from_raw(1)).is_none());
    }

    #[test]
    fn test_duplicate_external_id_rejected() {
        let registry = Registry::new();
        registry.register(handle(1, 7)).unwrap();
        assert_eq!(
            registry.register(handle(2, 7)),
            Err(EntityError::DuplicateId(EntityId(7)))
        );
        assert!(!registry.contains(InstanceId::from_raw(2)));
        assert!(!registry.is_id_free(EntityId(7)));
    }

    #[test]
    fn test_derived_id_yields_to_explicit_holder() {
        let registry = Registry::new();
        registry.register(handle(1, 9)).unwrap();
        registry.register_derived(handle(9, 9));

        assert_eq!(registry.lookup(EntityId(9)), Some(handle(1, 9)));
        assert!(registry.contains(InstanceId::from_raw(9)));

        registry.unregister(InstanceId::from_raw(9));
        assert_eq!(registry.lookup(EntityId(9)), Some(handle(1, 9)));
    }

    #[test]
    fn test_clones_share_state() {
        let registry = Registry::new();
        let reader = registry.clone();
        registry.register(handle(3, 3)).unwrap();
        assert!(reader.contains(InstanceId::from_raw(3)));
    }
}
