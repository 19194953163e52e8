//! # Asynchronous Fan-out / Fan-in
//!
//! `publish_async` starts every matching async handler in registration order
//! and returns a [`Completion`]. All handlers of one publish, plus any nested
//! `publish_async` they start through their [`AsyncContext`], are spawned on
//! one shared task tracker; the completion resolves once that tracker drains.

use std::any::Any;
use std::future::IntoFuture;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::bus::EventBus;
use super::handler::{AnyEvent, HandlerEntry, HandlerKind};
use super::report::{HandlerFailure, PublishReport};
use crate::ecs::{Registry, SceneRef};
use crate::error::HandlerError;
use crate::sync::CommandSender;

/// Shared state of one asynchronous publish.
pub(crate) struct FanIn {
    tracker: TaskTracker,
    invoked: AtomicUsize,
    failures: Mutex<Vec<HandlerFailure>>,
}

impl FanIn {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            tracker: TaskTracker::new(),
            invoked: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn record(&self, failure: HandlerFailure) {
        failure.log();
        self.failures.lock().push(failure);
    }

    /// Invokes an async handler and spawns its future on the tracker.
    ///
    /// The handler function itself runs here, on the caller's thread, so
    /// handlers of one publish are started in the order this is called.
    pub(crate) fn start(self: &Arc<Self>, entry: Arc<HandlerEntry>, ctx: AsyncContext, event: AnyEvent) {
        let HandlerKind::Async(handler) = &entry.kind else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_err() {
            self.record(HandlerFailure::new(&entry, HandlerError::NoRuntime));
            return;
        }

        self.invoked.fetch_add(1, Ordering::Relaxed);
        let cancel = ctx.cancel.clone();
        if cancel.is_cancelled() {
            self.record(HandlerFailure::new(&entry, HandlerError::Cancelled));
            return;
        }

        // Panics after the first suspension point are recorded like errors.
        let future = AssertUnwindSafe(handler.call(ctx, event)).catch_unwind();
        let fan_in = Arc::clone(self);
        self.tracker.spawn(async move {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(HandlerError::Cancelled),
                outcome = future => outcome.unwrap_or_else(|payload| {
                    Err(HandlerError::Failed(format!("panicked: {}", panic_message(&*payload))))
                }),
            };
            if let Err(error) = result {
                fan_in.record(HandlerFailure::new(&entry, error));
            }
        });
    }

    pub(crate) fn close(&self) {
        self.tracker.close();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Awaitable result of `publish_async`.
///
/// Resolves once every async handler started by the publish, including
/// nested publishes made through [`AsyncContext::publish_async`], has
/// settled. Dropping it does not cancel the handlers.
#[must_use = "await the completion to observe handler failures"]
pub struct Completion {
    fan_in: Arc<FanIn>,
    report: PublishReport,
}

impl Completion {
    pub(crate) fn new(fan_in: Arc<FanIn>, report: PublishReport) -> Self {
        Self { fan_in, report }
    }

    /// Waits for every handler and returns the full report.
    pub async fn wait(self) -> PublishReport {
        self.fan_in.tracker.wait().await;
        let mut report = self.report;
        report.invoked += self.fan_in.invoked.load(Ordering::Relaxed);
        report
            .failures
            .extend(std::mem::take(&mut *self.fan_in.failures.lock()));
        report
    }

    /// Failures of the handlers that ran inline, before any async handler
    /// settled.
    pub(crate) fn inline_failures(&self) -> &[HandlerFailure] {
        &self.report.failures
    }

    /// Returns true once every handler has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.fan_in.tracker.is_closed() && self.fan_in.tracker.is_empty()
    }
}

impl IntoFuture for Completion {
    type Output = PublishReport;
    type IntoFuture = BoxFuture<'static, PublishReport>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

/// What an async handler gets instead of the world.
#[derive(Clone)]
pub struct AsyncContext {
    pub(crate) bus: EventBus,
    pub(crate) registry: Registry,
    pub(crate) commands: CommandSender,
    pub(crate) scene: SceneRef,
    pub(crate) cancel: CancellationToken,
    pub(crate) fan_in: Arc<FanIn>,
}

impl AsyncContext {
    /// The scene the event was published in.
    #[must_use]
    pub fn scene(&self) -> &SceneRef {
        &self.scene
    }

    /// Cancellation signal of this publish chain.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns true once the chain was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Queue for graph mutations, applied at the next fixed point.
    #[must_use]
    pub fn commands(&self) -> &CommandSender {
        &self.commands
    }

    /// Read access to the registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The bus the event came from.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Nested asynchronous publish in this context's scene.
    ///
    /// Async handlers join the current fan-in, so the outer completion
    /// waits for them too. Sync handlers cannot run without the world and
    /// are queued for the next fixed point.
    pub fn publish_async<E>(&self, event: E)
    where
        E: Send + Sync + 'static,
    {
        let scene = self.scene.clone();
        self.publish_async_in(&scene, event);
    }

    /// Nested asynchronous publish in another scene.
    pub fn publish_async_in<E>(&self, scene: &SceneRef, event: E)
    where
        E: Send + Sync + 'static,
    {
        let event: AnyEvent = Arc::new(event);
        let entries = self
            .bus
            .resolve::<E>(&scene.scene_type, |owner| self.registry.contains(owner));
        let nested = Self {
            scene: scene.clone(),
            ..self.clone()
        };

        for entry in entries {
            if matches!(entry.kind, HandlerKind::Async(_)) {
                self.fan_in.start(entry, nested.clone(), Arc::clone(&event));
                continue;
            }
            let scene = scene.clone();
            let event = Arc::clone(&event);
            self.commands.push(move |world| {
                EventBus::run_deferred(world, &entry, &scene, &event);
                Ok(())
            });
        }
    }

    /// Nested synchronous publish in this context's scene, deferred to the
    /// next fixed point. Never blocks.
    pub fn publish<E>(&self, event: E) -> bool
    where
        E: Send + Sync + 'static,
    {
        self.commands.publish(self.scene.id, event)
    }
}

impl std::fmt::Debug for AsyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncContext")
            .field("scene", &self.scene)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
