use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::app::monitor::MonitorEvent;

pub struct MonitorHandle {
    pub stop_flag: Arc<AtomicBool>,
    pub join: JoinHandle<()>,
}

#[derive(Default)]
struct StoreInner {
    version: u64,
    latest: HashMap<String, (u64, MonitorEvent)>,
}

/// Latest monitor event per key. Every publish bumps one global version so observers can
/// block until something newer than what they already rendered arrives.
#[derive(Default)]
pub struct SnapshotStore {
    inner: Mutex<StoreInner>,
    cv: Condvar,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // Every update is a single insert, so a poisoned map is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, key: &str, event: MonitorEvent) -> u64 {
        let mut inner = self.lock();
        inner.version = inner.version.saturating_add(1);
        let version = inner.version;
        inner.latest.insert(key.to_string(), (version, event));
        self.cv.notify_all();
        version
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    pub fn latest(&self, key: &str) -> Option<(u64, MonitorEvent)> {
        self.lock().latest.get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<MonitorEvent> {
        self.lock().latest.remove(key).map(|(_, event)| event)
    }

    /// Blocks until `key` holds an event newer than `after`, or `timeout` passes.
    pub fn wait_newer(&self, key: &str, after: u64, timeout: Duration) -> Option<(u64, MonitorEvent)> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if let Some((version, event)) = inner.latest.get(key) {
                if *version > after {
                    return Some((*version, event.clone()));
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(inner, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
    }
}

pub struct AppState {
    pub monitors: Mutex<HashMap<String, MonitorHandle>>,
    pub snapshots: Arc<SnapshotStore>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            monitors: Mutex::new(HashMap::new()),
            snapshots: Arc::new(SnapshotStore::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
