//! # insights-core
//!
//! Client-side event telemetry pipeline.
//!
//! Applications record user interactions (clicks, conversions, views)
//! against a named index. Events are queued durably in SQLite and delivered
//! in batches to an HTTP ingestion endpoint:
//! - when an index queue reaches its `min_batch_size` (threshold upload), and
//! - on a recurring flush across every index (periodic upload).
//!
//! A batch is removed from the queue only after the endpoint answers 200, so
//! delivery is at-least-once.
//!
//! ## Example
//!
//! ```rust,no_run
//! use insights_core::{Config, EventContext, EventObjects, Insights};
//!
//! # async fn demo() -> insights_core::Result<()> {
//! let config = Config::load()?;
//! let insights = Insights::open(config)?;
//!
//! let tracker = insights.tracker("products")?;
//! tracker.clicked("Product Clicked", EventObjects::ids(["42"]), EventContext::default())?;
//!
//! insights.flush_task().run().await;
//! # Ok(())
//! # }
//! ```

pub use client::{HttpIngestionClient, IngestionClient, Response};
pub use config::{Config, Configuration};
pub use error::{Error, Result};
pub use event::{Event, EventInternal, EventKind, EventObjects};
pub use pipeline::Insights;
pub use registry::Registry;
pub use store::{Database, EventStore, MemoryEventStore, SqliteEventStore};
pub use tracker::{EventContext, Tracker};
pub use uploader::{EventUploader, UploadOutcome, Uploader};
pub use worker::{FlushScheduler, FlushTask, WorkResult};

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod store;
pub mod tracker;
pub mod uploader;
pub mod worker;

#[cfg(test)]
mod testing;
