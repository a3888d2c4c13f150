//! HTTP client for the event ingestion endpoint
//!
//! One batch is one `POST {endpoint}/1/indexes/{index}/events` with body
//! `{"events": [record, ...]}`. The endpoint accepts or rejects the batch as a
//! whole. Transport faults never surface as errors here: they are folded into
//! a [`Response`] carrying [`TRANSPORT_FAILURE`] so the uploader has a single
//! success test.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::config::IngestionConfig;
use crate::error::{Error, Result};
use crate::event::{codec, EventInternal};

/// Status reported when the request never produced an HTTP response
pub const TRANSPORT_FAILURE: i32 = -1;

/// Outcome of one request to the ingestion endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status_code: i32,
    pub message: Option<String>,
}

impl Response {
    pub fn new(status_code: i32, message: Option<String>) -> Self {
        Self {
            status_code,
            message,
        }
    }

    /// Synthetic response for a network fault or timeout
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self::new(TRANSPORT_FAILURE, Some(message.into()))
    }

    /// Only 200 counts as accepted
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    /// Convert a failed response into the matching error
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else if self.status_code == TRANSPORT_FAILURE {
            Err(Error::Transport(
                self.message.unwrap_or_else(|| "unknown".to_string()),
            ))
        } else {
            Err(Error::Server {
                status: self.status_code,
                message: self.message,
            })
        }
    }
}

/// Sends events to the ingestion endpoint
#[async_trait]
pub trait IngestionClient: Send + Sync {
    /// Send a whole batch for one index
    async fn send_batch(&self, index: &str, events: &[EventInternal]) -> Response;

    /// Send a single event outside the batch path
    async fn send(&self, event: &EventInternal) -> Response {
        self.send_batch(event.index(), std::slice::from_ref(event))
            .await
    }
}

/// [`IngestionClient`] over HTTP
pub struct HttpIngestionClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpIngestionClient {
    /// Create a new client from configuration
    ///
    /// Returns an error if the configuration is invalid or missing credentials.
    pub fn new(config: &IngestionConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config.endpoint.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(app_id) = &config.app_id {
            headers.insert(
                "x-algolia-application-id",
                HeaderValue::from_str(app_id)
                    .map_err(|e| Error::Config(format!("invalid app_id: {}", e)))?,
            );
        }

        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(api_key)
                .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?;
            value.set_sensitive(true);
            headers.insert("x-algolia-api-key", value);
        }

        let timeouts = config.timeouts();
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect_timeout())
            .read_timeout(timeouts.read_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Ingestion URL for an index
    pub fn events_url(&self, index: &str) -> String {
        format!(
            "{}/1/indexes/{}/events",
            self.base_url,
            urlencoding::encode(index)
        )
    }
}

#[async_trait]
impl IngestionClient for HttpIngestionClient {
    async fn send_batch(&self, index: &str, events: &[EventInternal]) -> Response {
        let url = self.events_url(index);
        let body = codec::encode_batch(events);

        let response = match self.http_client.post(&url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(index = %index, error = %e, "Ingestion request failed");
                return Response::transport_failure(format!("HTTP request failed: {}", e));
            }
        };

        let status_code = i32::from(response.status().as_u16());
        let message = response.text().await.ok().filter(|text| !text.is_empty());

        tracing::debug!(
            index = %index,
            count = events.len(),
            status = status_code,
            "Ingestion request completed"
        );

        Response::new(status_code, message)
    }
}
