//! Upload protocol: snapshot, send, conditional clear
//!
//! One attempt reads a snapshot of the index queue, sends it as a single
//! batch and clears exactly that snapshot when the endpoint answers 200. On
//! any other answer the queue is left untouched and the next trigger tries
//! again. There is no retry state in here: retry timing belongs to whoever
//! calls [`Uploader::periodic_upload`].
//!
//! Attempts for one index are serialized by an async lock so two triggers
//! can never send or clear the same snapshot twice. Threshold triggers are
//! coalesced on top of that: at most one one-time attempt is waiting to take
//! its snapshot at any moment, and further triggers fold into it. Different
//! indices have different uploaders and run independently.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::client::IngestionClient;
use crate::event::EventInternal;
use crate::store::EventStore;

/// Result of one upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Queue was empty, nothing sent
    Idle,
    /// Batch accepted and cleared from the queue
    Delivered { count: usize },
    /// Batch refused or never reached the endpoint; queue unchanged
    Rejected {
        status: i32,
        message: Option<String>,
        unacknowledged: Vec<EventInternal>,
    },
    /// Queue could not be read
    StoreUnavailable(String),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Idle | UploadOutcome::Delivered { .. })
    }

    /// Events that were sent but not acknowledged
    pub fn unacknowledged(&self) -> &[EventInternal] {
        match self {
            UploadOutcome::Rejected { unacknowledged, .. } => unacknowledged,
            _ => &[],
        }
    }
}

/// Upload capability of one index
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Threshold trigger. Must return without waiting for the network.
    fn start_one_time_upload(&self);

    /// Scheduler trigger. Runs one attempt to completion.
    async fn periodic_upload(&self) -> UploadOutcome;

    /// Wait for background uploads dispatched so far
    async fn wait_idle(&self) {}
}

/// Upload statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadStats {
    /// Batches sent to the endpoint
    pub attempts: usize,
    /// Events acknowledged and cleared
    pub events_delivered: usize,
    /// Attempts that ended in a rejection or a store failure
    pub failures: usize,
    /// Undecodable records purged from the queue
    pub poisoned_purged: usize,
    /// Threshold triggers folded into an attempt that was already pending
    pub coalesced: usize,
}

struct UploadState {
    store: Arc<dyn EventStore>,
    client: Arc<dyn IngestionClient>,
    in_flight: tokio::sync::Mutex<()>,
    /// A one-time attempt is dispatched and has not read its snapshot yet
    pending: AtomicBool,
    stats: Mutex<UploadStats>,
    dispatched: AtomicUsize,
    idle: Notify,
}

impl UploadState {
    fn record(&self, update: impl FnOnce(&mut UploadStats)) {
        update(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }

    async fn upload(&self, one_time: bool) -> UploadOutcome {
        let _guard = self.in_flight.lock().await;
        let index = self.store.index();

        // Cleared before the read: anything appended after this point either
        // lands in this snapshot or dispatches a follow-up attempt.
        if one_time {
            self.pending.store(false, Ordering::SeqCst);
        }

        let snapshot = match self.store.read() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(index = %index, error = %e, "Failed to read event queue");
                self.record(|s| s.failures += 1);
                return UploadOutcome::StoreUnavailable(e.to_string());
            }
        };

        if snapshot.is_empty() {
            if snapshot.poisoned_count() > 0 {
                self.purge_poisoned(&snapshot);
            }
            return UploadOutcome::Idle;
        }

        let events = snapshot.to_vec();
        self.record(|s| s.attempts += 1);
        tracing::debug!(index = %index, count = events.len(), "Uploading batch");

        let response = self.client.send_batch(index, &events).await;

        if !response.is_success() {
            tracing::warn!(
                index = %index,
                count = events.len(),
                status = response.status_code,
                message = response.message.as_deref().unwrap_or(""),
                "Batch not accepted, keeping events queued"
            );
            self.record(|s| s.failures += 1);
            return UploadOutcome::Rejected {
                status: response.status_code,
                message: response.message,
                unacknowledged: events,
            };
        }

        let count = events.len();
        match self.store.clear(&snapshot) {
            Ok(_) => {
                tracing::info!(index = %index, count, "Batch delivered");
            }
            Err(e) => {
                // The endpoint has the batch; leaving it queued means it is
                // sent again later, which at-least-once delivery allows.
                tracing::warn!(
                    index = %index,
                    count,
                    error = %e,
                    "Batch delivered but queue could not be cleared"
                );
            }
        }

        let poisoned = snapshot.poisoned_count();
        self.record(|s| {
            s.events_delivered += count;
            s.poisoned_purged += poisoned;
        });

        UploadOutcome::Delivered { count }
    }

    fn purge_poisoned(&self, snapshot: &crate::store::Snapshot) {
        let index = self.store.index();
        match self.store.clear(snapshot) {
            Ok(removed) => {
                tracing::warn!(index = %index, removed, "Purged undecodable queued events");
                self.record(|s| s.poisoned_purged += removed);
            }
            Err(e) => {
                tracing::warn!(index = %index, error = %e, "Failed to purge undecodable events");
            }
        }
    }
}

/// [`Uploader`] backed by an [`EventStore`] and an [`IngestionClient`]
///
/// One-time uploads are spawned on the runtime handle given at construction,
/// so `track()` callers never wait on the network.
pub struct EventUploader {
    state: Arc<UploadState>,
    runtime: Handle,
}

impl EventUploader {
    pub fn new(
        store: Arc<dyn EventStore>,
        client: Arc<dyn IngestionClient>,
        runtime: Handle,
    ) -> Self {
        Self {
            state: Arc::new(UploadState {
                store,
                client,
                in_flight: tokio::sync::Mutex::new(()),
                pending: AtomicBool::new(false),
                stats: Mutex::new(UploadStats::default()),
                dispatched: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
            runtime,
        }
    }

    /// Index this uploader serves
    pub fn index(&self) -> &str {
        self.state.store.index()
    }

    /// Run one upload attempt, waiting for any attempt already in flight
    pub async fn upload(&self) -> UploadOutcome {
        self.state.upload(false).await
    }

    /// Run one upload attempt in the background
    pub fn spawn_upload(&self) -> JoinHandle<UploadOutcome> {
        self.dispatch(false)
    }

    fn dispatch(&self, one_time: bool) -> JoinHandle<UploadOutcome> {
        let state = self.state.clone();
        state.dispatched.fetch_add(1, Ordering::SeqCst);

        self.runtime.spawn(async move {
            let outcome = state.upload(one_time).await;
            if state.dispatched.fetch_sub(1, Ordering::SeqCst) == 1 {
                state.idle.notify_waiters();
            }
            outcome
        })
    }

    /// Wait until every background upload dispatched so far has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            if self.state.dispatched.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Current statistics
    pub fn stats(&self) -> UploadStats {
        self.state
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Uploader for EventUploader {
    fn start_one_time_upload(&self) {
        if self
            .state
            .pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::trace!(index = %self.index(), "One-time upload already pending");
            self.state.record(|s| s.coalesced += 1);
            return;
        }

        tracing::debug!(index = %self.index(), "Dispatching one-time upload");
        // Detached: wait_idle() is the way to observe completion.
        let _ = self.dispatch(true);
    }

    async fn periodic_upload(&self) -> UploadOutcome {
        self.upload().await
    }

    async fn wait_idle(&self) {
        EventUploader::wait_idle(self).await
    }
}
