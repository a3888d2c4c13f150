//! Registry of per-index trackers
//!
//! The registry owns one [`Tracker`] per index. Trackers are created lazily
//! through a factory on first use, or registered up front. Everything that
//! needs the set of live indices (the flush task, the CLI) goes through an
//! `Arc<Registry>` handed to it explicitly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::tracker::Tracker;

type TrackerFactory = Box<dyn Fn(&str) -> Result<Tracker> + Send + Sync>;

/// Index name to tracker map
pub struct Registry {
    factory: TrackerFactory,
    trackers: Mutex<HashMap<String, Arc<Tracker>>>,
}

impl Registry {
    /// Create an empty registry using `factory` to build missing trackers
    pub fn new(factory: impl Fn(&str) -> Result<Tracker> + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            trackers: Mutex::new(HashMap::new()),
        }
    }

    fn trackers(&self) -> MutexGuard<'_, HashMap<String, Arc<Tracker>>> {
        self.trackers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tracker for `index`, created on first use
    pub fn tracker(&self, index: &str) -> Result<Arc<Tracker>> {
        if index.is_empty() {
            return Err(Error::Validation("index name must not be empty".to_string()));
        }

        let mut trackers = self.trackers();
        if let Some(tracker) = trackers.get(index) {
            return Ok(tracker.clone());
        }

        let tracker = Arc::new((self.factory)(index)?);
        trackers.insert(index.to_string(), tracker.clone());
        tracing::debug!(index = %index, "Registered tracker");
        Ok(tracker)
    }

    /// Insert a prebuilt tracker, replacing any existing one for its index
    pub fn register(&self, tracker: Tracker) -> Arc<Tracker> {
        let tracker = Arc::new(tracker);
        self.trackers()
            .insert(tracker.index().to_string(), tracker.clone());
        tracker
    }

    /// Tracker for an index that must already be registered
    pub fn shared(&self, index: &str) -> Result<Arc<Tracker>> {
        self.trackers()
            .get(index)
            .cloned()
            .ok_or_else(|| Error::IndexNotRegistered(index.to_string()))
    }

    /// Registered index names, sorted
    pub fn indices(&self) -> Vec<String> {
        let mut indices: Vec<String> = self.trackers().keys().cloned().collect();
        indices.sort();
        indices
    }

    /// Snapshot of all registered trackers, sorted by index
    pub fn all(&self) -> Vec<Arc<Tracker>> {
        let mut trackers: Vec<Arc<Tracker>> = self.trackers().values().cloned().collect();
        trackers.sort_by(|a, b| a.index().cmp(b.index()));
        trackers
    }

    pub fn len(&self) -> usize {
        self.trackers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers().is_empty()
    }
}
