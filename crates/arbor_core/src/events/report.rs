//! Publish outcome records.

use std::borrow::Cow;

use super::handler::{HandlerEntry, HandlerId};
use crate::error::HandlerError;

/// A handler that failed during a publish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerFailure {
    /// The failing handler.
    pub handler: HandlerId,
    /// Its registered name.
    pub name: Cow<'static, str>,
    /// Type name of the event.
    pub event: &'static str,
    /// What went wrong.
    pub error: HandlerError,
}

impl HandlerFailure {
    pub(crate) fn new(entry: &HandlerEntry, error: HandlerError) -> Self {
        Self {
            handler: entry.id,
            name: entry.name.clone(),
            event: entry.event_name,
            error,
        }
    }

    /// Logs the failure. Policy rejections are warnings, the rest errors.
    pub(crate) fn log(&self) {
        match self.error {
            HandlerError::AsyncInSyncPublish | HandlerError::NoRuntime => tracing::warn!(
                handler = %self.name,
                event = self.event,
                error = %self.error,
                "event handler not started"
            ),
            _ => tracing::error!(
                handler = %self.name,
                event = self.event,
                error = %self.error,
                "event handler failed"
            ),
        }
    }
}

/// Outcome of a publish.
///
/// For `publish_async`, the report is complete only once the completion
/// has resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Handlers invoked (including ones that failed).
    pub invoked: usize,
    /// Failures, in the order they were recorded.
    pub failures: Vec<HandlerFailure>,
}

impl PublishReport {
    /// Returns true if no handler failed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, failure: HandlerFailure) {
        failure.log();
        self.failures.push(failure);
    }
}
