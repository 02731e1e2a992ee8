use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub trips_started: u64,
    pub trips_completed: u64,
    pub start_conflicts: u64,
    pub location_updates: u64,
    pub errors: u64,
}

/// Process-wide rider bookkeeping shared by every user task.
#[derive(Debug, Default)]
pub struct SimulatorState {
    riding: RwLock<HashSet<Uuid>>,
    stats: RwLock<Stats>,
}

impl SimulatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the user was already riding.
    pub async fn begin_ride(&self, user: Uuid) -> bool {
        self.riding.write().await.insert(user)
    }

    pub async fn end_ride(&self, user: Uuid) {
        self.riding.write().await.remove(&user);
    }

    pub async fn active_riders(&self) -> usize {
        self.riding.read().await.len()
    }

    pub async fn record(&self, update: impl FnOnce(&mut Stats)) {
        update(&mut *self.stats.write().await);
    }

    pub async fn stats(&self) -> Stats {
        *self.stats.read().await
    }
}
