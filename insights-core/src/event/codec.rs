//! Record codec for queued and transmitted events
//!
//! A record is a flat JSON object carrying an explicit `eventType` tag, the
//! shared fields and the variant-specific ones:
//!
//! ```json
//! {
//!   "eventType": "click",
//!   "eventName": "Product Clicked",
//!   "index": "products",
//!   "userToken": "user-1",
//!   "timestamp": 1700000000000,
//!   "queryID": "6de2f7eaa537fa93d8f8f05b927953b1",
//!   "objectIDs": ["54675051"],
//!   "positions": [1]
//! }
//! ```
//!
//! The same record shape is used for the on-disk queue and for the request
//! body, so a queued row can be sent without re-encoding anything but the
//! envelope. Unknown fields are ignored when decoding.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{Click, Conversion, Event, EventInternal, EventKind, EventObjects, View};
use crate::error::{Error, Result};

/// Encode an event into its record form. Never fails for a valid event.
pub fn encode(internal: &EventInternal) -> Value {
    let event = internal.event();
    let mut record = json!({
        "eventType": event.kind().as_str(),
        "eventName": event.name(),
        "index": internal.index(),
        "userToken": event.user_token(),
        "timestamp": event.timestamp(),
    });

    match event.objects() {
        EventObjects::ObjectIds(ids) => record["objectIDs"] = json!(ids),
        EventObjects::Filters(filters) => record["filters"] = json!(filters),
    }

    if let Some(query_id) = event.query_id() {
        record["queryID"] = Value::String(query_id.to_string());
    }

    if let Some(positions) = event.positions() {
        record["positions"] = json!(positions);
    }

    record
}

/// Decode a record back into an event.
///
/// Fails with [`Error::Decode`] on an unknown `eventType`, a missing required
/// field, an ambiguous subject (both or neither of `objectIDs` and `filters`)
/// or a record that breaks an event invariant.
pub fn decode(record: &Value) -> Result<EventInternal> {
    let raw = RawRecord::deserialize(record).map_err(|e| Error::Decode(e.to_string()))?;

    let objects = match (raw.object_ids, raw.filters) {
        (Some(ids), None) => EventObjects::ObjectIds(ids),
        (None, Some(filters)) => EventObjects::Filters(filters),
        (Some(_), Some(_)) => {
            return Err(Error::Decode(
                "record carries both objectIDs and filters".to_string(),
            ))
        }
        (None, None) => {
            return Err(Error::Decode(
                "missing field `objectIDs` or `filters`".to_string(),
            ))
        }
    };

    let event = match raw.event_type {
        EventKind::Click => Event::Click(Click {
            name: raw.event_name,
            user_token: raw.user_token,
            timestamp: raw.timestamp,
            objects,
            query_id: raw.query_id,
            positions: raw.positions,
        }),
        EventKind::Conversion => Event::Conversion(Conversion {
            name: raw.event_name,
            user_token: raw.user_token,
            timestamp: raw.timestamp,
            objects,
            query_id: raw.query_id,
        }),
        EventKind::View => Event::View(View {
            name: raw.event_name,
            user_token: raw.user_token,
            timestamp: raw.timestamp,
            objects,
            query_id: raw.query_id,
        }),
    };

    event.validate().map_err(|e| match e {
        Error::Validation(msg) => Error::Decode(msg),
        other => other,
    })?;

    Ok(EventInternal::new(raw.index, event))
}

/// Wrap a batch of events into the request envelope `{"events": [...]}`
pub fn encode_batch(events: &[EventInternal]) -> Value {
    json!({ "events": events.iter().map(encode).collect::<Vec<_>>() })
}

/// Serialize one event for storage
pub fn to_json_string(internal: &EventInternal) -> String {
    encode(internal).to_string()
}

/// Parse one stored event
pub fn from_json_str(payload: &str) -> Result<EventInternal> {
    let record: Value =
        serde_json::from_str(payload).map_err(|e| Error::Decode(e.to_string()))?;
    decode(&record)
}

/// Record shape accepted by [`decode`]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    event_type: EventKind,
    event_name: String,
    index: String,
    user_token: String,
    timestamp: i64,
    #[serde(rename = "queryID", default)]
    query_id: Option<String>,
    #[serde(rename = "objectIDs", default)]
    object_ids: Option<Vec<String>>,
    #[serde(default)]
    filters: Option<Vec<String>>,
    #[serde(default)]
    positions: Option<Vec<u32>>,
}
