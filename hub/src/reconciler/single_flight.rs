use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per plugin name
///
/// Names are compared case-insensitively since they map onto filesystem
/// leaves. A second caller for the same name waits for the first.
#[derive(Default)]
pub struct SingleFlight {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(name.to_lowercase())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }
}
