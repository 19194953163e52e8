//! Hook context: the world, seen from the node whose hook is running.

use std::ops::{Deref, DerefMut};

use super::component::Behaviour;
use super::entity::InstanceId;
use super::scene::SceneRef;
use super::world::World;
use crate::error::EntityResult;
use crate::events::PublishReport;

/// Passed to every lifecycle hook.
///
/// Dereferences to [`World`], so a hook can create, attach, reparent and
/// dispose nodes directly. Disposing the running node itself is deferred
/// until the hook returns.
pub struct HookContext<'w> {
    world: &'w mut World,
    node: InstanceId,
}

impl<'w> HookContext<'w> {
    pub(crate) fn new(world: &'w mut World, node: InstanceId) -> Self {
        Self { world, node }
    }

    /// The node whose hook is running.
    #[inline]
    #[must_use]
    pub fn node(&self) -> InstanceId {
        self.node
    }

    /// The entity a component is attached to; the node itself otherwise.
    #[must_use]
    pub fn owner(&self) -> InstanceId {
        let is_component = self
            .world
            .kind(self.node)
            .is_some_and(|kind| kind.is_component());
        if is_component {
            self.world.parent(self.node).unwrap_or(self.node)
        } else {
            self.node
        }
    }

    /// Parent of the running node.
    #[must_use]
    pub fn parent(&self) -> Option<InstanceId> {
        self.world.parent(self.node)
    }

    /// Scene that owns the running node.
    #[must_use]
    pub fn domain(&self) -> Option<InstanceId> {
        self.world.domain(self.node)
    }

    /// Domain of the running node, with its tag.
    #[must_use]
    pub fn scene(&self) -> Option<SceneRef> {
        self.world.scene_ref(self.node)
    }

    /// Component `T` on the owning entity.
    #[must_use]
    pub fn sibling<T: Behaviour>(&self) -> Option<&T> {
        self.world.component::<T>(self.owner())
    }

    /// Mutable access to component `T` on the owning entity.
    pub fn sibling_mut<T: Behaviour>(&mut self) -> Option<&mut T> {
        let owner = self.owner();
        self.world.component_mut::<T>(owner)
    }

    /// Publishes synchronously in the running node's domain.
    ///
    /// # Errors
    ///
    /// [`EntityError::NotFound`](crate::EntityError::NotFound) if the node
    /// is not under any scene.
    pub fn publish<E>(&mut self, event: E) -> EntityResult<PublishReport>
    where
        E: Send + Sync + 'static,
    {
        self.world.publish(self.node, event)
    }

    /// Disposes the running node once the current hook returns.
    pub fn dispose_self(&mut self) {
        self.world.dispose(self.node);
    }
}

impl Deref for HookContext<'_> {
    type Target = World;

    fn deref(&self) -> &World {
        &*self.world
    }
}

impl DerefMut for HookContext<'_> {
    fn deref_mut(&mut self) -> &mut World {
        &mut *self.world
    }
}
