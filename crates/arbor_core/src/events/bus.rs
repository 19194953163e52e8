//! # Event Bus
//!
//! Typed, scene-scoped dispatch. Handlers are resolved per event type and
//! filtered by the publishing scene's domain tag; [`SceneFilter::Any`]
//! handlers see every publish.
//!
//! The handler table sits behind a `RwLock`, but a publish only holds it
//! while copying out the matching entries. Handler code always runs with no
//! bus lock held, so handlers may register, unregister and publish freely.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::completion::{AsyncContext, Completion, FanIn};
use super::handler::{AnyEvent, HandlerDescriptor, HandlerEntry, HandlerId, HandlerKind};
use super::report::{HandlerFailure, PublishReport};
use crate::ecs::{InstanceId, SceneFilter, SceneRef, SceneType, World};
use crate::error::{EventError, HandlerError};

#[derive(Default)]
struct BusInner {
    /// Per event type, sorted by `(order, seq)`.
    handlers: RwLock<HashMap<TypeId, Vec<Arc<HandlerEntry>>>>,
    next_id: AtomicU64,
}

/// Shared handle to a handler table.
///
/// Cheap to clone; clones see the same handlers. A [`World`] owns one and
/// routes its `publish` calls through it.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> HandlerId {
        HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn insert(&self, entry: HandlerEntry) -> HandlerId {
        let id = entry.id;
        tracing::debug!(
            handler = %entry.name,
            event = entry.event_name,
            filter = ?entry.filter,
            order = entry.order,
            "event handler registered"
        );
        let mut handlers = self.inner.handlers.write();
        let list = handlers.entry(entry.event_type).or_default();
        let key = (entry.order, entry.seq);
        let position = list.partition_point(|existing| (existing.order, existing.seq) <= key);
        list.insert(position, Arc::new(entry));
        id
    }

    /// Registers a handler.
    ///
    /// # Errors
    ///
    /// [`EventError::MissingSceneFilter`] if the descriptor has no filter.
    pub fn register(&self, descriptor: HandlerDescriptor) -> Result<HandlerId, EventError> {
        descriptor.validate()?;
        let id = self.next_id();
        let entry = descriptor.into_entry(id, id.0)?;
        Ok(self.insert(entry))
    }

    /// Registers a synchronous closure for events of type `E`.
    pub fn subscribe<E, F>(&self, filter: SceneFilter, handler: F) -> HandlerId
    where
        E: Send + Sync + 'static,
        F: Fn(&mut World, &SceneRef, &E) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = self.next_id();
        let descriptor = HandlerDescriptor::sync::<E, F>(type_name::<F>(), handler);
        self.insert(descriptor.into_entry_with(id, id.0, filter))
    }

    /// Registers an asynchronous closure for events of type `E`.
    pub fn subscribe_async<E, F, Fut>(&self, filter: SceneFilter, handler: F) -> HandlerId
    where
        E: Send + Sync + 'static,
        F: Fn(AsyncContext, Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let id = self.next_id();
        let descriptor = HandlerDescriptor::new_async::<E, F>(type_name::<F>(), handler);
        self.insert(descriptor.into_entry_with(id, id.0, filter))
    }

    /// Removes a handler. Returns false if it was not registered.
    ///
    /// A dispatch already in progress keeps its copy of the entry.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.write();
        for list in handlers.values_mut() {
            if let Some(position) = list.iter().position(|entry| entry.id == id) {
                list.remove(position);
                return true;
            }
        }
        false
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.inner.handlers.write().clear();
    }

    /// Number of registered handlers, over all event types.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.read().values().map(Vec::len).sum()
    }

    /// Copies out the handlers for `E` that match `scene_type`, in dispatch
    /// order. Handlers whose owner is gone are skipped and pruned.
    pub(crate) fn resolve<E: 'static>(
        &self,
        scene_type: &SceneType,
        is_alive: impl Fn(InstanceId) -> bool,
    ) -> Vec<Arc<HandlerEntry>> {
        let type_id = TypeId::of::<E>();
        let mut matched = Vec::new();
        let mut stale = false;
        {
            let handlers = self.inner.handlers.read();
            let Some(list) = handlers.get(&type_id) else {
                return matched;
            };
            for entry in list {
                if entry.owner.is_some_and(|owner| !is_alive(owner)) {
                    stale = true;
                    continue;
                }
                if entry.filter.matches(scene_type) {
                    matched.push(Arc::clone(entry));
                }
            }
        }
        if stale {
            self.prune(type_id, &is_alive);
        }
        matched
    }

    fn prune(&self, type_id: TypeId, is_alive: &impl Fn(InstanceId) -> bool) {
        let mut handlers = self.inner.handlers.write();
        if let Some(list) = handlers.get_mut(&type_id) {
            let before = list.len();
            list.retain(|entry| entry.owner.map_or(true, is_alive));
            tracing::trace!(pruned = before - list.len(), "dropped handlers of disposed owners");
        }
    }

    /// Publishes `event` in `scene`, running every matching synchronous
    /// handler in order on the calling thread.
    ///
    /// A failing handler is logged and recorded; the rest still run.
    /// Asynchronous handlers are never run by a synchronous publish: each one
    /// is skipped and recorded as [`HandlerError::AsyncInSyncPublish`].
    pub fn publish<E>(&self, world: &mut World, scene: &SceneRef, event: E) -> PublishReport
    where
        E: Send + Sync + 'static,
    {
        let entries = self.resolve::<E>(&scene.scene_type, |owner| world.contains(owner));
        tracing::trace!(
            event = type_name::<E>(),
            scene = %scene.scene_type,
            handlers = entries.len(),
            "publish"
        );

        let mut report = PublishReport::default();
        for entry in &entries {
            if entry.owner.is_some_and(|owner| !world.contains(owner)) {
                continue;
            }
            match &entry.kind {
                HandlerKind::Sync(handler) => {
                    report.invoked += 1;
                    if let Err(error) = handler.call(world, scene, &event) {
                        report.record(HandlerFailure::new(entry, error));
                    }
                }
                HandlerKind::Async(_) => {
                    report.record(HandlerFailure::new(entry, HandlerError::AsyncInSyncPublish));
                }
            }
        }
        report
    }

    /// Publishes `event` in `scene` and starts every matching handler.
    ///
    /// Synchronous handlers run inline. Asynchronous handlers are started in
    /// registration order and driven by the current Tokio runtime. The
    /// returned [`Completion`] resolves once all of them have settled.
    pub fn publish_async<E>(&self, world: &mut World, scene: &SceneRef, event: E) -> Completion
    where
        E: Send + Sync + 'static,
    {
        self.publish_async_with_cancel(world, scene, event, CancellationToken::new())
    }

    /// Like [`publish_async`](Self::publish_async), with a caller-provided
    /// cancellation token shared by the whole handler chain.
    pub fn publish_async_with_cancel<E>(
        &self,
        world: &mut World,
        scene: &SceneRef,
        event: E,
        cancel: CancellationToken,
    ) -> Completion
    where
        E: Send + Sync + 'static,
    {
        let entries = self.resolve::<E>(&scene.scene_type, |owner| world.contains(owner));
        tracing::trace!(
            event = type_name::<E>(),
            scene = %scene.scene_type,
            handlers = entries.len(),
            "publish async"
        );

        let event: AnyEvent = Arc::new(event);
        let fan_in = FanIn::new();
        let ctx = AsyncContext {
            bus: self.clone(),
            registry: world.registry().clone(),
            commands: world.command_sender(),
            scene: scene.clone(),
            cancel,
            fan_in: Arc::clone(&fan_in),
        };

        let mut report = PublishReport::default();
        for entry in entries {
            if entry.owner.is_some_and(|owner| !world.contains(owner)) {
                continue;
            }
            if let HandlerKind::Sync(handler) = &entry.kind {
                report.invoked += 1;
                if let Err(error) = handler.call(world, scene, &*event) {
                    report.record(HandlerFailure::new(&entry, error));
                }
                continue;
            }
            fan_in.start(entry, ctx.clone(), Arc::clone(&event));
        }
        fan_in.close();
        Completion::new(fan_in, report)
    }

    /// Runs a synchronous handler that an async context deferred to a fixed
    /// point.
    pub(crate) fn run_deferred(
        world: &mut World,
        entry: &HandlerEntry,
        scene: &SceneRef,
        event: &AnyEvent,
    ) {
        if entry.owner.is_some_and(|owner| !world.contains(owner)) {
            return;
        }
        let HandlerKind::Sync(handler) = &entry.kind else {
            return;
        };
        let event: &(dyn Any + Send + Sync) = &**event;
        if let Err(error) = handler.call(world, scene, event) {
            HandlerFailure::new(entry, error).log();
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}
