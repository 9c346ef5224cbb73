//! Per-repository update dispatch.
//!
//! A dispatch waits for the repository's lock, drops itself if a run that
//! finished after the notification arrived already covered it, and otherwise
//! runs the action once. The last-update timestamp advances after every run,
//! failed or not, so a broken action cannot turn each later push into a
//! retry. Different repositories never wait on each other.
//!
//! Arrival and completion times are compared on the monotonic clock, so a
//! wall-clock step cannot make a fresh notification look stale.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

use crate::error::HookError;
use crate::registry::Registry;
use crate::runner::ActionRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The action ran and exited successfully.
    Completed,
    /// No action is configured for the repository.
    NoAction,
    /// The action could not be started, exited non-zero or timed out.
    Failed,
    /// A newer update finished while this notification waited.
    Stale,
}

pub struct Dispatcher {
    registry: Registry,
    runner: Arc<dyn ActionRunner>,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn ActionRunner>) -> Self {
        Self {
            registry: Registry::new(),
            runner,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Dispatch a notification received now.
    pub async fn dispatch_now(&self, repository_id: &str) -> DispatchOutcome {
        let received_at = Instant::now();
        self.dispatch(repository_id, received_at).await
    }

    /// Dispatch a notification for `repository_id` that arrived at
    /// `received_at`. The timestamp must be taken when the request came in,
    /// not when this call starts, or staleness cannot be judged.
    pub async fn dispatch(
        &self,
        repository_id: &str,
        received_at: Instant,
    ) -> DispatchOutcome {
        let span = tracing::info_span!("dispatch", repository = %repository_id);
        self.dispatch_inner(repository_id, received_at)
            .instrument(span)
            .await
    }

    async fn dispatch_inner(
        &self,
        repository_id: &str,
        received_at: Instant,
    ) -> DispatchOutcome {
        info!("update requested");

        let state = self.registry.get_or_create(repository_id);
        let mut slot = state.lock().await;

        if slot.is_stale(received_at) {
            debug!(
                last_update = ?slot.last_update_at,
                waited_ms = received_at.elapsed().as_millis() as u64,
                "notification superseded by a newer update"
            );
            return DispatchOutcome::Stale;
        }

        let outcome = match self.runner.run(repository_id).await {
            Ok(report) => {
                info!(
                    path = %report.path.display(),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "update action completed"
                );
                DispatchOutcome::Completed
            }
            Err(HookError::ActionNotFound(path)) => {
                warn!(path = %path.display(), "no action configured");
                DispatchOutcome::NoAction
            }
            Err(e) => {
                error!(error = %e, "update action failed");
                DispatchOutcome::Failed
            }
        };

        slot.mark_updated();
        outcome
    }
}
