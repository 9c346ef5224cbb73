use std::sync::Arc;

use hookrun_core::config::Config;
use hookrun_core::{ActionRunner, Dispatcher, ScriptRunner};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;

/// Shared application state passed to the hook handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Detached dispatch tasks, drained on shutdown.
    pub tasks: TaskTracker,
}

impl AppState {
    pub fn new(runner: Arc<dyn ActionRunner>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(runner)),
            tasks: TaskTracker::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(ScriptRunner::from_config(config)))
    }

    /// Run a dispatch for `repository_id` on its own task. The caller does
    /// not wait for it.
    pub fn spawn_dispatch(&self, repository_id: String, received_at: Instant) {
        let dispatcher = Arc::clone(&self.dispatcher);
        self.tasks.spawn(async move {
            dispatcher.dispatch(&repository_id, received_at).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn spawned_dispatch_is_tracked() {
        let config = Config {
            actions_dir: PathBuf::from("/definitely/not/here"),
            ..Config::default()
        };
        let state = AppState::from_config(&config);

        state.spawn_dispatch("org/repo".into(), Instant::now());
        state.tasks.close();
        state.tasks.wait().await;

        let slot = state
            .dispatcher
            .registry()
            .get("org/repo")
            .expect("state created by dispatch")
            .snapshot()
            .await;
        assert_eq!(slot.attempts, 1);
    }
}
