//! Process-wide map from repository id to its dispatch state.
//!
//! The map itself sits behind a short-lived `std::sync::Mutex` that is only
//! held for the lookup-or-insert; each [`RepositoryState`] carries its own
//! async lock, which is what dispatches contend on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio::time::Instant;

/// Mutable bookkeeping guarded by [`RepositoryState::lock`].
#[derive(Debug, Clone, Default)]
pub struct DispatchSlot {
    /// When the last action run (successful or not) finished, on the
    /// monotonic clock. `None` until the first run.
    pub last_update: Option<Instant>,
    /// Wall-clock time of the same event, for logs only.
    pub last_update_at: Option<DateTime<Utc>>,
    pub attempts: u64,
}

impl DispatchSlot {
    /// Whether a notification received at `received_at` was already covered
    /// by a run that finished after it arrived.
    pub fn is_stale(&self, received_at: Instant) -> bool {
        self.last_update.is_some_and(|last| last > received_at)
    }

    /// Record that a run finished just now.
    pub fn mark_updated(&mut self) {
        self.last_update = Some(Instant::now());
        self.last_update_at = Some(Utc::now());
        self.attempts += 1;
    }
}

#[derive(Debug)]
pub struct RepositoryState {
    id: String,
    slot: AsyncMutex<DispatchSlot>,
}

impl RepositoryState {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            slot: AsyncMutex::new(DispatchSlot::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for exclusive access to this repository's slot.
    pub async fn lock(&self) -> MutexGuard<'_, DispatchSlot> {
        self.slot.lock().await
    }

    /// Snapshot of the slot, taken under the lock.
    pub async fn snapshot(&self) -> DispatchSlot {
        self.slot.lock().await.clone()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<HashMap<String, Arc<RepositoryState>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the state for `id`, creating it on first sight. Concurrent
    /// callers with the same id always receive the same instance.
    pub fn get_or_create(&self, id: &str) -> Arc<RepositoryState> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = entries.get(id) {
            return Arc::clone(state);
        }
        tracing::debug!(repository = %id, "registering repository");
        let state = Arc::new(RepositoryState::new(id));
        entries.insert(id.to_string(), Arc::clone(&state));
        state
    }

    pub fn get(&self, id: &str) -> Option<Arc<RepositoryState>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
