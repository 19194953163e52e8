//! # Nodes
//!
//! Arena slot for one entity, component or scene. Graph links (`parent`,
//! `domain`, children, components) are instance ids into the arena, never
//! pointers: a disposed node leaves behind at most a stale id, which resolves
//! to "not found".

use std::collections::{BTreeSet, HashMap};

use super::component::{Behaviour, Capabilities, ComponentKey, Hook};
use super::entity::{EntityId, InstanceId};
use super::scene::SceneType;

/// What a node is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// A plain entity, owned through its parent's children.
    Entity,
    /// A component, owned through its entity's component map.
    Component(ComponentKey),
    /// A scene: the root of a domain.
    Scene(SceneType),
}

impl NodeKind {
    /// Returns true for scenes.
    #[inline]
    #[must_use]
    pub const fn is_scene(&self) -> bool {
        matches!(self, Self::Scene(_))
    }

    /// Returns true for components.
    #[inline]
    #[must_use]
    pub const fn is_component(&self) -> bool {
        matches!(self, Self::Component(_))
    }
}

/// Lifecycle state of a node.
///
/// `Constructed -> Awake -> (Loaded) -> Active -> Disposing -> Disposed`.
/// `Disposed` is terminal: the node is gone from the arena and the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeState {
    /// Allocated and registered, `on_create` not yet finished.
    Constructed,
    /// `on_create` has run.
    Awake,
    /// `on_load` has run.
    Loaded,
    /// Ticked at least once.
    Active,
    /// Teardown in progress.
    Disposing,
    /// Removed. No hook fires again.
    Disposed,
}

impl NodeState {
    /// Returns true while the node may still receive per-frame hooks.
    #[inline]
    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Disposing | Self::Disposed)
    }
}

/// One arena slot.
pub(crate) struct Node {
    pub(crate) id: EntityId,
    pub(crate) instance_id: InstanceId,
    pub(crate) kind: NodeKind,
    pub(crate) state: NodeState,
    pub(crate) parent: Option<InstanceId>,
    pub(crate) domain: Option<InstanceId>,
    /// Ordered by instance id, i.e. creation order.
    pub(crate) children: BTreeSet<InstanceId>,
    pub(crate) components: HashMap<ComponentKey, InstanceId>,
    /// Attachment order of `components`.
    pub(crate) component_order: Vec<ComponentKey>,
    pub(crate) behaviour: Option<Box<dyn Behaviour>>,
    pub(crate) capabilities: Capabilities,
    /// Frame counter value when the node was created.
    pub(crate) created_frame: u64,
    /// Set while one of the node's own hooks runs.
    pub(crate) in_hook: bool,
    /// Dispose was requested while `in_hook` was set.
    pub(crate) dispose_requested: bool,
    /// `on_load` / `on_show` / `on_hide` requested while `in_hook` was set,
    /// fired in request order once the hook returns.
    pub(crate) deferred_hooks: Vec<Hook>,
    pub(crate) loaded: bool,
    pub(crate) visible: bool,
}

impl Node {
    pub(crate) fn new(
        instance_id: InstanceId,
        id: EntityId,
        kind: NodeKind,
        behaviour: Option<Box<dyn Behaviour>>,
        created_frame: u64,
    ) -> Self {
        let capabilities = behaviour
            .as_deref()
            .map_or(Capabilities::NONE, |behaviour| behaviour.capabilities());
        Self {
            id,
            instance_id,
            kind,
            state: NodeState::Constructed,
            parent: None,
            domain: None,
            children: BTreeSet::new(),
            components: HashMap::new(),
            component_order: Vec::new(),
            behaviour,
            capabilities,
            created_frame,
            in_hook: false,
            dispose_requested: false,
            deferred_hooks: Vec::new(),
            loaded: false,
            visible: false,
        }
    }

    /// Detaches a component slot, keeping attachment order intact.
    pub(crate) fn detach_component(&mut self, key: ComponentKey) -> Option<InstanceId> {
        let removed = self.components.remove(&key)?;
        self.component_order.retain(|k| *k != key);
        Some(removed)
    }
}
