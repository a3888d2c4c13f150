//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{IngestionClient, Response};
use crate::event::{Event, EventInternal, EventObjects};
use crate::uploader::{UploadOutcome, Uploader};

pub const TIMESTAMP: i64 = 1_700_000_000_000;

pub fn click(index: &str, name: &str) -> EventInternal {
    EventInternal::new(
        index,
        Event::click(name, "foobarbaz", TIMESTAMP, EventObjects::ids(["54675051"])).unwrap(),
    )
}

type SendHook = Box<dyn Fn() + Send + Sync>;

/// Ingestion client answering with scripted status codes
pub struct ScriptedClient {
    statuses: Mutex<VecDeque<i32>>,
    fallback: AtomicI32,
    delay: Option<Duration>,
    on_send: Option<SendHook>,
    batches: Mutex<Vec<(String, Vec<EventInternal>)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub fn always(status: i32) -> Self {
        Self::sequence_then([], status)
    }

    /// Answer with `statuses` in order, then 200 forever
    pub fn sequence(statuses: impl IntoIterator<Item = i32>) -> Self {
        Self::sequence_then(statuses, 200)
    }

    fn sequence_then(statuses: impl IntoIterator<Item = i32>, fallback: i32) -> Self {
        Self {
            statuses: Mutex::new(statuses.into_iter().collect()),
            fallback: AtomicI32::new(fallback),
            delay: None,
            on_send: None,
            batches: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Run `hook` while the request is "on the wire"
    pub fn on_send(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_send = Some(Box::new(hook));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Drop any remaining script and answer `status` from now on
    pub fn set_status(&self, status: i32) {
        self.statuses.lock().unwrap().clear();
        self.fallback.store(status, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<(String, Vec<EventInternal>)> {
        self.batches.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IngestionClient for ScriptedClient {
    async fn send_batch(&self, index: &str, events: &[EventInternal]) -> Response {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.batches
            .lock()
            .unwrap()
            .push((index.to_string(), events.to_vec()));

        if let Some(hook) = &self.on_send {
            hook();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.statuses.lock().unwrap().pop_front();
        let status = scripted.unwrap_or_else(|| self.fallback.load(Ordering::SeqCst));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if status == crate::client::TRANSPORT_FAILURE {
            Response::transport_failure("connection refused")
        } else {
            Response::new(status, None)
        }
    }
}

type UploadHook = Box<dyn Fn() + Send + Sync>;

/// Uploader that records threshold triggers instead of uploading
pub struct RecordingUploader {
    one_time_calls: AtomicUsize,
    periodic_calls: AtomicUsize,
    periodic_outcome: Mutex<UploadOutcome>,
    on_one_time: Option<UploadHook>,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self {
            one_time_calls: AtomicUsize::new(0),
            periodic_calls: AtomicUsize::new(0),
            periodic_outcome: Mutex::new(UploadOutcome::Idle),
            on_one_time: None,
        }
    }

    pub fn on_one_time(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_one_time = Some(Box::new(hook));
        self
    }

    pub fn with_periodic_outcome(self, outcome: UploadOutcome) -> Self {
        *self.periodic_outcome.lock().unwrap() = outcome;
        self
    }

    pub fn one_time_calls(&self) -> usize {
        self.one_time_calls.load(Ordering::SeqCst)
    }

    pub fn periodic_calls(&self) -> usize {
        self.periodic_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    fn start_one_time_upload(&self) {
        self.one_time_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.on_one_time {
            hook();
        }
    }

    async fn periodic_upload(&self) -> UploadOutcome {
        self.periodic_calls.fetch_add(1, Ordering::SeqCst);
        self.periodic_outcome.lock().unwrap().clone()
    }
}

/// Shared handle to a value a hook writes into
pub fn shared<T: Default>() -> Arc<Mutex<T>> {
    Arc::new(Mutex::new(T::default()))
}
