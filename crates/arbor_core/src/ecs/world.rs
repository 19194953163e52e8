//! # World
//!
//! The arena that owns every node, plus the registry, the event bus and the
//! deferred command queue that go with it.
//!
//! Nodes live in a flat table keyed by [`InstanceId`]. Parent, domain and
//! component links are ids into that table, so disposing a node can only
//! ever leave a stale id behind, which resolves to "not found".
//!
//! ## Disposal order
//!
//! ```text
//! dispose(n)
//!   ├─ n.on_teardown            (children and components still attached)
//!   ├─ dispose(component)...    (attachment order)
//!   ├─ dispose(child)...        (creation order, depth-first)
//!   └─ detach from parent, unregister, drop
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::component::{Behaviour, Capabilities, ComponentKey, Hook};
use super::context::HookContext;
use super::entity::{EntityId, IdAllocator, InstanceId};
use super::node::{Node, NodeKind, NodeState};
use super::registry::{NodeHandle, Registry};
use super::scene::{SceneRef, SceneType};
use crate::config::WorldConfig;
use crate::error::{EntityError, EntityResult, HookError};
use crate::events::{Completion, EventBus, HandlerFailure, PublishReport};
use crate::lifecycle::HookFailure;
use crate::sync::{CommandQueue, CommandSender};

/// Stale ids tolerated in a pass set before `dispose` compacts it.
const PASS_SET_SLACK: usize = 64;

/// Result of offering one node to a per-frame pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// The hook ran (successfully or not).
    Ran,
    /// The node is live but was not ticked this pass.
    Skipped,
    /// The node no longer exists.
    Gone,
}

/// Container for every node of one simulation.
///
/// Tests and tools can build as many isolated worlds as they like; nothing
/// here is global.
///
/// # Example
///
/// ```rust,ignore
/// let mut world = World::new(WorldConfig::default());
/// let game = world.create_scene("Game")?;
/// let player = world.spawn(game)?;
/// world.add_component(player, Health(100))?;
///
/// assert_eq!(world.domain(player), Some(game));
/// world.dispose(game); // tears down player and its components too
/// ```
pub struct World {
    config: WorldConfig,
    allocator: Arc<IdAllocator>,
    nodes: HashMap<InstanceId, Node>,
    /// Parentless nodes (scenes and detached subtrees), creation order.
    roots: BTreeSet<InstanceId>,
    registry: Registry,
    bus: EventBus,
    commands: CommandQueue,
    update_set: Vec<InstanceId>,
    late_update_set: Vec<InstanceId>,
    frame: u64,
    hook_failures: Vec<HookFailure>,
    reporting_failure: bool,
}

impl World {
    /// Creates an empty world with its own identity allocator.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        Self::with_allocator(config, Arc::new(IdAllocator::new()))
    }

    /// Creates an empty world drawing ids from a shared allocator, so
    /// instance ids stay unique across several worlds.
    #[must_use]
    pub fn with_allocator(config: WorldConfig, allocator: Arc<IdAllocator>) -> Self {
        let capacity = config.capacity_hint;
        Self {
            allocator,
            nodes: HashMap::with_capacity(capacity),
            roots: BTreeSet::new(),
            registry: Registry::with_capacity(capacity),
            bus: EventBus::new(),
            commands: CommandQueue::new(config.command_queue_capacity),
            update_set: Vec::new(),
            late_update_set: Vec::new(),
            frame: 0,
            hook_failures: Vec::new(),
            reporting_failure: false,
            config,
        }
    }

    /// The configuration this world was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Query handle for collaborators. Clone it to share across threads.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The event bus this world publishes through.
    #[inline]
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// A sender for queueing mutations from other threads or async tasks.
    #[must_use]
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    /// Number of commands waiting for the next fixed point.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.commands.pending()
    }

    /// Frames started so far.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Number of nodes in the arena.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Creates a scene: a parentless node that is its own domain.
    ///
    /// # Errors
    ///
    /// [`EntityError::AllocatorExhausted`] when no id can be issued.
    pub fn create_scene(&mut self, scene_type: impl Into<SceneType>) -> EntityResult<InstanceId> {
        self.insert_node(NodeKind::Scene(scene_type.into()), None, None, None)
    }

    /// Creates a scene driven by `behaviour`.
    ///
    /// # Errors
    ///
    /// [`EntityError::AllocatorExhausted`] when no id can be issued.
    pub fn create_scene_with<B: Behaviour>(
        &mut self,
        scene_type: impl Into<SceneType>,
        behaviour: B,
    ) -> EntityResult<InstanceId> {
        self.insert_node(
            NodeKind::Scene(scene_type.into()),
            None,
            None,
            Some(Box::new(behaviour)),
        )
    }

    /// Creates a bare entity under `parent`, in the parent's domain.
    ///
    /// # Errors
    ///
    /// [`EntityError::NotFound`] if the parent is gone or being disposed,
    /// [`EntityError::AllocatorExhausted`] when no id can be issued.
    pub fn spawn(&mut self, parent: InstanceId) -> EntityResult<InstanceId> {
        self.insert_node(NodeKind::Entity, Some(parent), None, None)
    }

    /// Creates an entity under `parent` driven by `behaviour`.
    ///
    /// # Errors
    ///
    /// Same as [`spawn`](Self::spawn).
    pub fn spawn_with<B: Behaviour>(
        &mut self,
        parent: InstanceId,
        behaviour: B,
    ) -> EntityResult<InstanceId> {
        self.insert_node(NodeKind::Entity, Some(parent), None, Some(Box::new(behaviour)))
    }

    /// Creates an entity with an externally assigned id.
    ///
    /// # Errors
    ///
    /// [`EntityError::DuplicateId`] if a live node already uses `id`, plus
    /// the errors of [`spawn`](Self::spawn).
    pub fn spawn_with_id(
        &mut self,
        parent: InstanceId,
        id: EntityId,
        behaviour: Option<Box<dyn Behaviour>>,
    ) -> EntityResult<InstanceId> {
        self.insert_node(NodeKind::Entity, Some(parent), Some(id), behaviour)
    }

    fn insert_node(
        &mut self,
        kind: NodeKind,
        parent: Option<InstanceId>,
        external: Option<EntityId>,
        behaviour: Option<Box<dyn Behaviour>>,
    ) -> EntityResult<InstanceId> {
        let parent_domain = match parent {
            Some(parent_id) => self.live(parent_id)?.domain,
            None => None,
        };
        if let Some(id) = external {
            if !self.registry.is_id_free(id) {
                return Err(EntityError::DuplicateId(id));
            }
        }

        let instance_id = self.allocator.allocate()?;
        let id = external.unwrap_or(EntityId::from_instance(instance_id));
        let handle = NodeHandle {
            instance_id,
            id,
            kind: kind.clone(),
        };
        if external.is_some() {
            self.registry.register(handle)?;
        } else {
            self.registry.register_derived(handle);
        }

        let mut node = Node::new(instance_id, id, kind, behaviour, self.frame);
        node.parent = parent;
        node.domain = if node.kind.is_scene() {
            Some(instance_id)
        } else {
            parent_domain
        };
        if node.capabilities.contains(Capabilities::UPDATE) {
            self.update_set.push(instance_id);
        }
        if node.capabilities.contains(Capabilities::LATE_UPDATE) {
            self.late_update_set.push(instance_id);
        }
        let component_key = match &node.kind {
            NodeKind::Component(key) => Some(*key),
            _ => None,
        };
        tracing::trace!(node = %instance_id, id = %id, kind = ?node.kind, "node created");
        self.nodes.insert(instance_id, node);

        match parent {
            Some(parent_id) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent_id) {
                    match component_key {
                        Some(key) => {
                            parent_node.components.insert(key, instance_id);
                            parent_node.component_order.push(key);
                        }
                        None => {
                            parent_node.children.insert(instance_id);
                        }
                    }
                }
            }
            None => {
                self.roots.insert(instance_id);
            }
        }

        self.invoke(instance_id, Hook::Create, 0.0);
        if let Some(node) = self.nodes.get_mut(&instance_id) {
            if node.state == NodeState::Constructed {
                node.state = NodeState::Awake;
            }
        }
        Ok(instance_id)
    }

    fn live(&self, id: InstanceId) -> EntityResult<&Node> {
        self.nodes
            .get(&id)
            .filter(|node| node.state.is_live())
            .ok_or(EntityError::NotFound(id))
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Attaches `component` to `entity`.
    ///
    /// The component is registered in the entity's map before its
    /// `on_create` runs, so it is visible to lookups made from that hook.
    ///
    /// # Errors
    ///
    /// [`EntityError::DuplicateComponent`] if a `T` is already attached,
    /// [`EntityError::NotFound`] if the entity is gone or being disposed.
    pub fn add_component<T: Behaviour>(
        &mut self,
        entity: InstanceId,
        component: T,
    ) -> EntityResult<InstanceId> {
        let key = ComponentKey::of::<T>();
        if self.live(entity)?.components.contains_key(&key) {
            return Err(EntityError::DuplicateComponent {
                entity,
                component: key.name(),
            });
        }
        self.insert_node(
            NodeKind::Component(key),
            Some(entity),
            None,
            Some(Box::new(component)),
        )
    }

    /// Attaches a default-constructed `T` to `entity`.
    ///
    /// # Errors
    ///
    /// Same as [`add_component`](Self::add_component).
    pub fn add_component_default<T: Behaviour + Default>(
        &mut self,
        entity: InstanceId,
    ) -> EntityResult<InstanceId> {
        self.add_component(entity, T::default())
    }

    /// Instance id of the `T` component on `entity`. Never constructs.
    #[must_use]
    pub fn get_component<T: Behaviour>(&self, entity: InstanceId) -> Option<InstanceId> {
        self.nodes
            .get(&entity)?
            .components
            .get(&ComponentKey::of::<T>())
            .copied()
    }

    /// The `T` component on `entity`.
    ///
    /// Yields `None` while the component's own hook is running.
    #[must_use]
    pub fn component<T: Behaviour>(&self, entity: InstanceId) -> Option<&T> {
        self.behaviour::<T>(self.get_component::<T>(entity)?)
    }

    /// Mutable access to the `T` component on `entity`.
    pub fn component_mut<T: Behaviour>(&mut self, entity: InstanceId) -> Option<&mut T> {
        let component = self.get_component::<T>(entity)?;
        self.behaviour_mut::<T>(component)
    }

    /// Detaches and disposes the `T` component. Returns false if `entity`
    /// has none.
    ///
    /// The component's teardown hook still sees it attached; the slot frees
    /// up once disposal finishes.
    pub fn remove_component<T: Behaviour>(&mut self, entity: InstanceId) -> bool {
        match self.get_component::<T>(entity) {
            Some(component) => {
                self.dispose(component);
                true
            }
            None => false,
        }
    }

    /// The behaviour of any node, downcast to `T`.
    #[must_use]
    pub fn behaviour<T: Behaviour>(&self, node: InstanceId) -> Option<&T> {
        self.nodes
            .get(&node)?
            .behaviour
            .as_deref()?
            .as_any()
            .downcast_ref::<T>()
    }

    /// Mutable access to the behaviour of any node.
    pub fn behaviour_mut<T: Behaviour>(&mut self, node: InstanceId) -> Option<&mut T> {
        self.nodes
            .get_mut(&node)?
            .behaviour
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    // =========================================================================
    // Graph
    // =========================================================================

    /// Moves a parentless `child` under `parent`, re-stamping the domain of
    /// its whole subtree. Adding a node to its current parent is a no-op.
    ///
    /// # Errors
    ///
    /// - [`EntityError::AlreadyParented`]: the child has another parent
    /// - [`EntityError::WouldCycle`]: `child` is `parent` or one of its ancestors
    /// - [`EntityError::ComponentNotReparentable`]: `child` is a component
    /// - [`EntityError::NotFound`]: either node is gone
    pub fn add_child(&mut self, parent: InstanceId, child: InstanceId) -> EntityResult<()> {
        if parent == child {
            return Err(EntityError::WouldCycle { child, parent });
        }
        let child_node = self.live(child)?;
        if child_node.kind.is_component() {
            return Err(EntityError::ComponentNotReparentable(child));
        }
        let current = child_node.parent;
        let domain = self.live(parent)?.domain;
        match current {
            Some(current) if current == parent => return Ok(()),
            Some(current) => {
                return Err(EntityError::AlreadyParented {
                    child,
                    parent: current,
                })
            }
            None => {}
        }

        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                return Err(EntityError::WouldCycle { child, parent });
            }
            cursor = self.nodes.get(&ancestor).and_then(|node| node.parent);
        }

        self.roots.remove(&child);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.insert(child);
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parent = Some(parent);
        }
        self.restamp(child, domain);
        tracing::trace!(child = %child, parent = %parent, "node reparented");
        Ok(())
    }

    /// Detaches `child` from `parent`. The child becomes a root with no
    /// domain until it is added somewhere else.
    ///
    /// Returns `Ok(None)` if `child` is not a child of `parent`.
    ///
    /// # Errors
    ///
    /// [`EntityError::NotFound`] if `parent` is gone.
    pub fn remove_child(
        &mut self,
        parent: InstanceId,
        child: InstanceId,
    ) -> EntityResult<Option<InstanceId>> {
        let parent_node = self
            .nodes
            .get_mut(&parent)
            .ok_or(EntityError::NotFound(parent))?;
        if !parent_node.children.remove(&child) {
            return Ok(None);
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parent = None;
        }
        self.roots.insert(child);
        self.restamp(child, None);
        Ok(Some(child))
    }

    /// Sets `domain` on a subtree. Nested scenes keep their own.
    fn restamp(&mut self, root: InstanceId, domain: Option<InstanceId>) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if node.kind.is_scene() {
                continue;
            }
            node.domain = domain;
            stack.extend(node.components.values().copied());
            stack.extend(node.children.iter().copied());
        }
    }

    /// Disposes a node and everything it owns. Idempotent.
    ///
    /// Called from inside one of the node's own hooks, disposal starts as
    /// soon as that hook returns.
    pub fn dispose(&mut self, id: InstanceId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if !node.state.is_live() {
            return;
        }
        if node.in_hook {
            node.dispose_requested = true;
            return;
        }
        node.state = NodeState::Disposing;
        tracing::trace!(node = %id, "disposing");

        self.invoke(id, Hook::Teardown, 0.0);

        let mut visited = HashSet::new();
        while let Some(component) = self.nodes.get(&id).and_then(|node| {
            node.component_order
                .iter()
                .filter_map(|key| node.components.get(key).copied())
                .find(|component| !visited.contains(component))
        }) {
            visited.insert(component);
            self.dispose(component);
        }
        while let Some(child) = self.nodes.get(&id).and_then(|node| {
            node.children
                .iter()
                .copied()
                .find(|child| !visited.contains(child))
        }) {
            visited.insert(child);
            self.dispose(child);
        }

        let Some(mut node) = self.nodes.remove(&id) else {
            return;
        };
        node.state = NodeState::Disposed;

        // Nodes whose disposal was deferred to the end of their own hook.
        let stragglers: Vec<InstanceId> = node
            .components
            .values()
            .chain(node.children.iter())
            .copied()
            .collect();
        for straggler in stragglers {
            if let Some(orphan) = self.nodes.get_mut(&straggler) {
                orphan.parent = None;
                self.roots.insert(straggler);
                self.restamp(straggler, None);
            }
        }

        match node.parent {
            Some(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    match &node.kind {
                        NodeKind::Component(key) => {
                            if parent_node.components.get(key) == Some(&id) {
                                parent_node.detach_component(*key);
                            }
                        }
                        _ => {
                            parent_node.children.remove(&id);
                        }
                    }
                }
            }
            None => {
                self.roots.remove(&id);
            }
        }

        self.registry.unregister(id);
        tracing::debug!(node = %id, id = %node.id, "node disposed");

        // Worlds that are not ticked (load phases) never reach `end_frame`.
        let bound = 2 * self.nodes.len() + PASS_SET_SLACK;
        if self.update_set.len() > bound || self.late_update_set.len() > bound {
            self.compact_pass_sets();
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns true while `id` is in the arena (including mid-teardown).
    #[inline]
    #[must_use]
    pub fn contains(&self, id: InstanceId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Returns true if `id` is in the arena and not being disposed.
    #[must_use]
    pub fn is_alive(&self, id: InstanceId) -> bool {
        self.live(id).is_ok()
    }

    /// Lifecycle state. Ids not in the arena report [`NodeState::Disposed`].
    #[must_use]
    pub fn state(&self, id: InstanceId) -> NodeState {
        self.nodes
            .get(&id)
            .map_or(NodeState::Disposed, |node| node.state)
    }

    /// What the node is.
    #[must_use]
    pub fn kind(&self, id: InstanceId) -> Option<&NodeKind> {
        self.nodes.get(&id).map(|node| &node.kind)
    }

    /// External id of the node.
    #[must_use]
    pub fn entity_id(&self, id: InstanceId) -> Option<EntityId> {
        self.nodes.get(&id).map(|node| node.id)
    }

    /// Parent of the node; for a component, the entity it is attached to.
    #[must_use]
    pub fn parent(&self, id: InstanceId) -> Option<InstanceId> {
        self.nodes.get(&id)?.parent
    }

    /// The scene that owns the node. A scene is its own domain.
    #[must_use]
    pub fn domain(&self, id: InstanceId) -> Option<InstanceId> {
        self.nodes.get(&id)?.domain
    }

    /// The node's domain with its tag, as handlers see it.
    #[must_use]
    pub fn scene_ref(&self, id: InstanceId) -> Option<SceneRef> {
        let domain = self.domain(id)?;
        match &self.nodes.get(&domain)?.kind {
            NodeKind::Scene(scene_type) => Some(SceneRef {
                id: domain,
                scene_type: scene_type.clone(),
            }),
            _ => None,
        }
    }

    /// Children in creation order.
    #[must_use]
    pub fn children(&self, id: InstanceId) -> Vec<InstanceId> {
        self.nodes
            .get(&id)
            .map(|node| node.children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Components in attachment order.
    #[must_use]
    pub fn components(&self, id: InstanceId) -> Vec<InstanceId> {
        self.nodes
            .get(&id)
            .map(|node| {
                node.component_order
                    .iter()
                    .filter_map(|key| node.components.get(key).copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parentless nodes in creation order.
    #[must_use]
    pub fn roots(&self) -> Vec<InstanceId> {
        self.roots.iter().copied().collect()
    }

    /// Returns true if the node was last shown.
    #[must_use]
    pub fn is_visible(&self, id: InstanceId) -> bool {
        self.nodes.get(&id).is_some_and(|node| node.visible)
    }

    // =========================================================================
    // Collaborator notifications
    // =========================================================================

    /// Reports the node's resources ready: fires `on_load` once.
    ///
    /// Called while one of the node's own hooks runs, `on_load` fires as
    /// soon as that hook returns.
    ///
    /// # Errors
    ///
    /// [`EntityError::NotFound`] if the node is gone or being disposed.
    pub fn notify_loaded(&mut self, id: InstanceId) -> EntityResult<()> {
        self.live(id)?;
        let Some(node) = self.nodes.get_mut(&id) else {
            return Err(EntityError::NotFound(id));
        };
        if node.loaded {
            return Ok(());
        }
        node.loaded = true;
        if node.in_hook {
            node.deferred_hooks.push(Hook::Load);
            return Ok(());
        }
        self.fire_load(id);
        Ok(())
    }

    fn fire_load(&mut self, id: InstanceId) {
        self.invoke(id, Hook::Load, 0.0);
        if let Some(node) = self.nodes.get_mut(&id) {
            if node.state == NodeState::Awake {
                node.state = NodeState::Loaded;
            }
        }
    }

    /// Marks the node visible, firing `on_show` if it was hidden.
    /// Returns whether visibility changed.
    ///
    /// # Errors
    ///
    /// [`EntityError::NotFound`] if the node is gone or being disposed.
    pub fn show(&mut self, id: InstanceId) -> EntityResult<bool> {
        self.set_visible(id, true)
    }

    /// Marks the node hidden, firing `on_hide` if it was visible.
    /// Returns whether visibility changed.
    ///
    /// # Errors
    ///
    /// [`EntityError::NotFound`] if the node is gone or being disposed.
    pub fn hide(&mut self, id: InstanceId) -> EntityResult<bool> {
        self.set_visible(id, false)
    }

    fn set_visible(&mut self, id: InstanceId, visible: bool) -> EntityResult<bool> {
        self.live(id)?;
        let Some(node) = self.nodes.get_mut(&id) else {
            return Err(EntityError::NotFound(id));
        };
        if node.visible == visible {
            return Ok(false);
        }
        node.visible = visible;
        let hook = if visible { Hook::Show } else { Hook::Hide };
        if node.in_hook {
            node.deferred_hooks.push(hook);
        } else {
            self.invoke(id, hook, 0.0);
        }
        Ok(true)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Publishes synchronously in the domain of `target` (a scene, or any
    /// node under one).
    ///
    /// # Errors
    ///
    /// [`EntityError::NotFound`] if `target` is gone or not under a scene.
    pub fn publish<E>(&mut self, target: InstanceId, event: E) -> EntityResult<PublishReport>
    where
        E: Send + Sync + 'static,
    {
        let scene = self.scene_ref(target).ok_or(EntityError::NotFound(target))?;
        let bus = self.bus.clone();
        let report = bus.publish(self, &scene, event);
        self.report_handler_failures(&scene, &report.failures);
        Ok(report)
    }

    /// Publishes asynchronously in the domain of `target`.
    ///
    /// Must be called from within a Tokio runtime for async handlers to
    /// start.
    ///
    /// # Errors
    ///
    /// [`EntityError::NotFound`] if `target` is gone or not under a scene.
    pub fn publish_async<E>(&mut self, target: InstanceId, event: E) -> EntityResult<Completion>
    where
        E: Send + Sync + 'static,
    {
        self.publish_async_with_cancel(target, event, CancellationToken::new())
    }

    /// Like [`publish_async`](Self::publish_async), with a cancellation
    /// token shared by the whole handler chain.
    ///
    /// # Errors
    ///
    /// [`EntityError::NotFound`] if `target` is gone or not under a scene.
    pub fn publish_async_with_cancel<E>(
        &mut self,
        target: InstanceId,
        event: E,
        cancel: CancellationToken,
    ) -> EntityResult<Completion>
    where
        E: Send + Sync + 'static,
    {
        let scene = self.scene_ref(target).ok_or(EntityError::NotFound(target))?;
        let bus = self.bus.clone();
        let completion = bus.publish_async_with_cancel(self, &scene, event, cancel);
        self.report_handler_failures(&scene, completion.inline_failures());
        Ok(completion)
    }

    // =========================================================================
    // Fixed points
    // =========================================================================

    /// Runs every queued command. Returns how many ran.
    pub fn apply_commands(&mut self) -> usize {
        let commands = self.commands.drain();
        let applied = commands.len();
        for command in commands {
            if let Err(error) = command(self) {
                tracing::warn!(%error, "deferred command failed");
            }
        }
        applied
    }

    /// Hook failures collected since the last call.
    pub fn take_hook_failures(&mut self) -> Vec<HookFailure> {
        std::mem::take(&mut self.hook_failures)
    }

    /// Disposes every root in creation order, clears the bus and drops any
    /// queued commands.
    pub fn shutdown(&mut self) {
        let roots = self.roots();
        for root in roots {
            self.dispose(root);
        }
        self.bus.clear();
        let dropped = self.commands.drain().len();
        tracing::debug!(dropped, remaining = self.nodes.len(), "world shut down");
    }

    // =========================================================================
    // Hook dispatch
    // =========================================================================

    /// Runs one hook on one node. Returns false if the node is gone, does
    /// not declare the hook, or is already inside a hook.
    pub(crate) fn invoke(&mut self, id: InstanceId, hook: Hook, dt: f32) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if node.in_hook || !node.capabilities.contains(hook.capability()) {
            return false;
        }
        let Some(mut behaviour) = node.behaviour.take() else {
            return false;
        };
        node.in_hook = true;

        let result = {
            let mut ctx = HookContext::new(self, id);
            match hook {
                Hook::Create => behaviour.on_create(&mut ctx),
                Hook::Load => behaviour.on_load(&mut ctx),
                Hook::Show => behaviour.on_show(&mut ctx),
                Hook::Hide => behaviour.on_hide(&mut ctx),
                Hook::Update => behaviour.update(&mut ctx, dt),
                Hook::LateUpdate => behaviour.late_update(&mut ctx, dt),
                Hook::Teardown => behaviour.on_teardown(&mut ctx),
            }
        };

        let (deferred, dispose_requested) = match self.nodes.get_mut(&id) {
            Some(node) => {
                node.behaviour = Some(behaviour);
                node.in_hook = false;
                (
                    std::mem::take(&mut node.deferred_hooks),
                    std::mem::take(&mut node.dispose_requested),
                )
            }
            None => (Vec::new(), false),
        };
        if let Err(error) = result {
            self.report_hook_failure(id, hook, error);
        }
        for deferred_hook in deferred {
            if !self.is_alive(id) {
                break;
            }
            if deferred_hook == Hook::Load {
                self.fire_load(id);
            } else {
                self.invoke(id, deferred_hook, 0.0);
            }
        }
        if dispose_requested {
            self.dispose(id);
        }
        true
    }

    fn report_hook_failure(&mut self, node: InstanceId, hook: Hook, error: HookError) {
        tracing::error!(node = %node, hook = ?hook, error = %error, "lifecycle hook failed");
        let failure = HookFailure { node, hook, error };
        self.hook_failures.push(failure.clone());

        if !self.config.publish_hook_failures || self.reporting_failure {
            return;
        }
        let Some(domain) = self.domain(node) else {
            return;
        };
        self.reporting_failure = true;
        if let Err(error) = self.publish(domain, failure) {
            tracing::debug!(%error, "hook failure not published");
        }
        self.reporting_failure = false;
    }

    /// Publishes handler failures of a synchronous dispatch as events in
    /// `scene`. Failures of failure handlers are not re-published.
    fn report_handler_failures(&mut self, scene: &SceneRef, failures: &[HandlerFailure]) {
        if !self.config.publish_handler_failures || self.reporting_failure || failures.is_empty() {
            return;
        }
        self.reporting_failure = true;
        let bus = self.bus.clone();
        for failure in failures {
            let _ = bus.publish(self, scene, failure.clone());
        }
        self.reporting_failure = false;
    }

    // =========================================================================
    // Driver support
    // =========================================================================

    pub(crate) fn begin_frame(&mut self) -> u64 {
        self.frame += 1;
        self.frame
    }

    pub(crate) fn end_frame(&mut self) {
        self.compact_pass_sets();
    }

    /// Removes disposed nodes from the per-capability sets.
    fn compact_pass_sets(&mut self) {
        let nodes = &self.nodes;
        self.update_set.retain(|id| nodes.contains_key(id));
        self.late_update_set.retain(|id| nodes.contains_key(id));
    }

    fn pass_set(&mut self, hook: Hook) -> &mut Vec<InstanceId> {
        if hook == Hook::LateUpdate {
            &mut self.late_update_set
        } else {
            &mut self.update_set
        }
    }

    /// Takes the members of a pass. Nodes created while the pass runs are
    /// collected in the emptied set.
    pub(crate) fn take_pass(&mut self, hook: Hook) -> Vec<InstanceId> {
        std::mem::take(self.pass_set(hook))
    }

    /// Puts the members of a pass back, followed by any node created
    /// meanwhile.
    pub(crate) fn restore_pass(&mut self, hook: Hook, mut members: Vec<InstanceId>) {
        let set = self.pass_set(hook);
        members.append(set);
        *set = members;
    }

    /// Offers one node to a per-frame pass.
    pub(crate) fn tick_node(&mut self, id: InstanceId, hook: Hook, dt: f32) -> TickOutcome {
        let Some(node) = self.nodes.get(&id) else {
            return TickOutcome::Gone;
        };
        if !node.state.is_live() || node.created_frame >= self.frame {
            return TickOutcome::Skipped;
        }
        if !self.invoke(id, hook, dt) {
            return TickOutcome::Skipped;
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            if matches!(node.state, NodeState::Awake | NodeState::Loaded) {
                node.state = NodeState::Active;
            }
        }
        TickOutcome::Ran
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots.len())
            .field("frame", &self.frame)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}
