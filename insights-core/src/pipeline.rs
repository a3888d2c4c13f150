//! Pipeline wiring
//!
//! [`Insights`] opens the queue database, builds the HTTP client and hands
//! the registry a factory that gives every index its own SQLite-backed store,
//! uploader and tracker. Indices that still have events queued from an
//! earlier process are registered on open, so the first flush picks them up.

use std::sync::Arc;

use futures::future::join_all;
use tokio::runtime::Handle;

use crate::client::{HttpIngestionClient, IngestionClient};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::store::{Database, SqliteEventStore};
use crate::tracker::Tracker;
use crate::uploader::EventUploader;
use crate::worker::{FlushScheduler, FlushTask};

/// Fully wired event pipeline
pub struct Insights {
    config: Config,
    database: Arc<Database>,
    registry: Arc<Registry>,
}

impl Insights {
    /// Open the pipeline described by `config`
    ///
    /// Must be called from inside a tokio runtime: threshold uploads are
    /// spawned on the current runtime handle.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(HttpIngestionClient::new(&config.ingestion)?);
        Self::open_with_client(config, client)
    }

    /// Open the pipeline with a custom ingestion client
    pub fn open_with_client(config: Config, client: Arc<dyn IngestionClient>) -> Result<Self> {
        config.tracker.validate()?;
        config.scheduler.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("no tokio runtime available: {}", e)))?;

        let db_path = config.database_path();
        tracing::info!(path = %db_path.display(), "Opening event queue");
        let database = Arc::new(Database::open(&db_path)?);
        database.migrate()?;

        let registry = Arc::new(Registry::new({
            let database = database.clone();
            let settings = config.tracker.clone();
            let timeouts = config.ingestion.timeouts();
            move |index| {
                let store = Arc::new(SqliteEventStore::new(database.clone(), index));
                let uploader = Arc::new(EventUploader::new(
                    store.clone(),
                    client.clone(),
                    runtime.clone(),
                ));
                Ok(Tracker::new(index, store, uploader, timeouts).with_settings(&settings))
            }
        }));

        let persisted = database.indices()?;
        for index in &persisted {
            registry.tracker(index)?;
        }
        if !persisted.is_empty() {
            tracing::info!(indices = ?persisted, "Restored indices with queued events");
        }

        Ok(Self {
            config,
            database,
            registry,
        })
    }

    /// Tracker for `index`, created on first use
    pub fn tracker(&self, index: &str) -> Result<Arc<Tracker>> {
        self.registry.tracker(index)
    }

    /// Wait for the threshold uploads already dispatched on every index
    ///
    /// Short-lived hosts call this before exiting so a background upload is
    /// not dropped together with the runtime.
    pub async fn drain(&self) {
        let trackers = self.registry.all();
        join_all(trackers.iter().map(|tracker| tracker.uploader().wait_idle())).await;
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn flush_task(&self) -> FlushTask {
        FlushTask::new(self.registry.clone())
    }

    /// Scheduler configured from `[scheduler]`
    pub fn scheduler(&self) -> FlushScheduler {
        FlushScheduler::from_config(self.flush_task(), &self.config.scheduler)
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
