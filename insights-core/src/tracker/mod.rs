//! Per-index event tracker
//!
//! A [`Tracker`] queues events for one index and kicks off an upload as soon
//! as the queue reaches `min_batch_size`. The switches it exposes
//! (`enabled`, `min_batch_size`, `user_token`) can be flipped from any thread
//! at any time and apply from the next [`Tracker::track`] call.
//!
//! `track` never fails from the caller's point of view: invalid events,
//! disabled tracking and storage errors are all logged and swallowed.

mod convenience;

pub use convenience::EventContext;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{Configuration, TrackerConfig};
use crate::event::{Event, EventInternal};
use crate::store::EventStore;
use crate::uploader::Uploader;

/// Event tracker for one index
pub struct Tracker {
    index: String,
    store: Arc<dyn EventStore>,
    uploader: Arc<dyn Uploader>,
    min_batch_size: AtomicUsize,
    enabled: AtomicBool,
    user_token: RwLock<String>,
    configuration: Configuration,
}

impl Tracker {
    /// Create a tracker with default settings and a random user token
    pub fn new(
        index: impl Into<String>,
        store: Arc<dyn EventStore>,
        uploader: Arc<dyn Uploader>,
        configuration: Configuration,
    ) -> Self {
        let defaults = TrackerConfig::default();
        Self {
            index: index.into(),
            store,
            uploader,
            min_batch_size: AtomicUsize::new(defaults.min_batch_size),
            enabled: AtomicBool::new(defaults.enabled),
            user_token: RwLock::new(uuid::Uuid::new_v4().to_string()),
            configuration,
        }
    }

    /// Apply configured defaults
    pub fn with_settings(self, settings: &TrackerConfig) -> Self {
        self.set_min_batch_size(settings.min_batch_size);
        self.set_enabled(settings.enabled);
        self
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn uploader(&self) -> &Arc<dyn Uploader> {
        &self.uploader
    }

    /// Network timeouts this tracker was created with
    pub fn configuration(&self) -> Configuration {
        self.configuration
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn min_batch_size(&self) -> usize {
        self.min_batch_size.load(Ordering::SeqCst)
    }

    /// Set the upload threshold. Zero is treated as one.
    pub fn set_min_batch_size(&self, size: usize) {
        self.min_batch_size.store(size.max(1), Ordering::SeqCst);
    }

    /// User token substituted by the convenience methods
    pub fn user_token(&self) -> String {
        self.user_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_user_token(&self, token: impl Into<String>) {
        *self
            .user_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token.into();
    }

    /// Queue an event and upload once the threshold is reached
    pub fn track(&self, event: Event) {
        if !self.enabled() {
            tracing::debug!(index = %self.index, name = event.name(), "Tracking disabled, event dropped");
            return;
        }

        if let Err(e) = event.validate() {
            tracing::warn!(index = %self.index, error = %e, "Invalid event dropped");
            return;
        }

        let internal = EventInternal::new(self.index.clone(), event);
        if let Err(e) = self.store.append(&internal) {
            tracing::warn!(index = %self.index, error = %e, "Failed to queue event");
            return;
        }

        let count = match self.store.count() {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(index = %self.index, error = %e, "Failed to count queued events");
                return;
            }
        };

        tracing::trace!(
            index = %self.index,
            kind = internal.event().kind().as_str(),
            count,
            "Event tracked"
        );

        if count >= self.min_batch_size() {
            self.uploader.start_one_time_upload();
        }
    }
}
