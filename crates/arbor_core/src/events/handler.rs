//! # Handler Registration
//!
//! Handlers are described by a [`HandlerDescriptor`] (event type, scene
//! filter, order hint, optional owner) and usually collected into a
//! [`HandlerTable`] at startup, then installed on the bus in one pass.

use std::any::{type_name, Any, TypeId};
use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::bus::EventBus;
use super::completion::AsyncContext;
use crate::ecs::{InstanceId, SceneFilter, SceneRef, World};
use crate::error::{EventError, HandlerResult};

/// Identifies a registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(pub(crate) u64);

/// Synchronous handler for events of type `E`.
///
/// Runs on the driving thread with mutable access to the world. May publish
/// further events (nested dispatch) and mutate the graph.
pub trait EventHandler<E>: Send + Sync + 'static {
    /// Handles one event published in `scene`.
    ///
    /// # Errors
    ///
    /// A returned error is logged and recorded in the publish report; sibling
    /// handlers still run.
    fn handle(&self, world: &mut World, scene: &SceneRef, event: &E) -> HandlerResult;
}

impl<E, F> EventHandler<E> for F
where
    F: Fn(&mut World, &SceneRef, &E) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, world: &mut World, scene: &SceneRef, event: &E) -> HandlerResult {
        self(world, scene, event)
    }
}

/// Asynchronous handler for events of type `E`.
///
/// Started on the driving thread in registration order, then driven by the
/// async runtime. It never holds the world; graph mutations go through
/// [`AsyncContext::commands`].
pub trait AsyncEventHandler<E>: Send + Sync + 'static {
    /// Starts handling one event.
    fn handle(&self, ctx: AsyncContext, event: Arc<E>) -> BoxFuture<'static, HandlerResult>;
}

impl<E, F, Fut> AsyncEventHandler<E> for F
where
    F: Fn(AsyncContext, Arc<E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, ctx: AsyncContext, event: Arc<E>) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(ctx, event))
    }
}

/// Event value as stored by the bus.
pub(crate) type AnyEvent = Arc<dyn Any + Send + Sync>;

pub(crate) trait ErasedSync: Send + Sync {
    fn call(
        &self,
        world: &mut World,
        scene: &SceneRef,
        event: &(dyn Any + Send + Sync),
    ) -> HandlerResult;
}

pub(crate) trait ErasedAsync: Send + Sync {
    fn call(&self, ctx: AsyncContext, event: AnyEvent) -> BoxFuture<'static, HandlerResult>;
}

struct SyncAdapter<E, H> {
    handler: H,
    _event: PhantomData<fn(&E)>,
}

impl<E, H> ErasedSync for SyncAdapter<E, H>
where
    E: Send + Sync + 'static,
    H: EventHandler<E>,
{
    fn call(
        &self,
        world: &mut World,
        scene: &SceneRef,
        event: &(dyn Any + Send + Sync),
    ) -> HandlerResult {
        match event.downcast_ref::<E>() {
            Some(event) => self.handler.handle(world, scene, event),
            None => Ok(()),
        }
    }
}

struct AsyncAdapter<E, H> {
    handler: H,
    _event: PhantomData<fn(&E)>,
}

impl<E, H> ErasedAsync for AsyncAdapter<E, H>
where
    E: Send + Sync + 'static,
    H: AsyncEventHandler<E>,
{
    fn call(&self, ctx: AsyncContext, event: AnyEvent) -> BoxFuture<'static, HandlerResult> {
        match event.downcast::<E>() {
            Ok(event) => self.handler.handle(ctx, event),
            Err(_) => Box::pin(async { Ok(()) }),
        }
    }
}

pub(crate) enum HandlerKind {
    Sync(Box<dyn ErasedSync>),
    Async(Box<dyn ErasedAsync>),
}

/// A registered handler, shared with in-flight dispatches.
pub(crate) struct HandlerEntry {
    pub(crate) id: HandlerId,
    pub(crate) name: Cow<'static, str>,
    pub(crate) event_type: TypeId,
    pub(crate) event_name: &'static str,
    pub(crate) filter: SceneFilter,
    pub(crate) order: i32,
    pub(crate) seq: u64,
    pub(crate) owner: Option<InstanceId>,
    pub(crate) kind: HandlerKind,
}

/// Describes a handler before registration.
///
/// # Example
///
/// ```rust,ignore
/// let descriptor = HandlerDescriptor::sync("spawn-fx", |world: &mut World, scene: &SceneRef, e: &Spawned| {
///     // ...
///     Ok(())
/// })
/// .scene(SceneFilter::only("Game"))
/// .order(10);
/// ```
pub struct HandlerDescriptor {
    name: Cow<'static, str>,
    event_type: TypeId,
    event_name: &'static str,
    filter: Option<SceneFilter>,
    order: i32,
    owner: Option<InstanceId>,
    kind: HandlerKind,
}

impl HandlerDescriptor {
    /// Describes a synchronous handler for events of type `E`.
    pub fn sync<E, H>(name: impl Into<Cow<'static, str>>, handler: H) -> Self
    where
        E: Send + Sync + 'static,
        H: EventHandler<E>,
    {
        Self::with_kind::<E>(
            name.into(),
            HandlerKind::Sync(Box::new(SyncAdapter {
                handler,
                _event: PhantomData,
            })),
        )
    }

    /// Describes an asynchronous handler for events of type `E`.
    pub fn new_async<E, H>(name: impl Into<Cow<'static, str>>, handler: H) -> Self
    where
        E: Send + Sync + 'static,
        H: AsyncEventHandler<E>,
    {
        Self::with_kind::<E>(
            name.into(),
            HandlerKind::Async(Box::new(AsyncAdapter {
                handler,
                _event: PhantomData,
            })),
        )
    }

    fn with_kind<E: 'static>(name: Cow<'static, str>, kind: HandlerKind) -> Self {
        Self {
            name,
            event_type: TypeId::of::<E>(),
            event_name: type_name::<E>(),
            filter: None,
            order: 0,
            owner: None,
            kind,
        }
    }

    /// Sets the scene filter. Required.
    #[must_use]
    pub fn scene(mut self, filter: SceneFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Shorthand for `scene(SceneFilter::Any)`.
    #[must_use]
    pub fn any_scene(self) -> Self {
        self.scene(SceneFilter::Any)
    }

    /// Order hint: lower runs first; ties keep registration order.
    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Binds the handler's lifetime to a node: once the owner is disposed
    /// the handler is skipped and dropped from the bus.
    #[must_use]
    pub fn owned_by(mut self, owner: InstanceId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Handler name used in logs and failure records.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn validate(&self) -> Result<(), EventError> {
        if self.filter.is_none() {
            return Err(EventError::MissingSceneFilter(self.name.to_string()));
        }
        Ok(())
    }

    pub(crate) fn into_entry(self, id: HandlerId, seq: u64) -> Result<HandlerEntry, EventError> {
        match self.filter.clone() {
            Some(filter) => Ok(self.into_entry_with(id, seq, filter)),
            None => Err(EventError::MissingSceneFilter(self.name.into_owned())),
        }
    }

    pub(crate) fn into_entry_with(self, id: HandlerId, seq: u64, filter: SceneFilter) -> HandlerEntry {
        HandlerEntry {
            id,
            name: self.name,
            event_type: self.event_type,
            event_name: self.event_name,
            filter,
            order: self.order,
            seq,
            owner: self.owner,
            kind: self.kind,
        }
    }
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("event", &self.event_name)
            .field("filter", &self.filter)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// Static registration table, built at startup and installed in one pass.
#[derive(Debug, Default)]
pub struct HandlerTable {
    descriptors: Vec<HandlerDescriptor>,
}

impl HandlerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor (builder style).
    #[must_use]
    pub fn with(mut self, descriptor: HandlerDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Adds a descriptor.
    pub fn push(&mut self, descriptor: HandlerDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Number of descriptors in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Installs every descriptor, in table order.
    ///
    /// # Errors
    ///
    /// Fails without installing anything if any descriptor is invalid.
    pub fn install(self, bus: &EventBus) -> Result<Vec<HandlerId>, EventError> {
        for descriptor in &self.descriptors {
            descriptor.validate()?;
        }
        self.descriptors
            .into_iter()
            .map(|descriptor| bus.register(descriptor))
            .collect()
    }
}
