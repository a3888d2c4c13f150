//! Event model
//!
//! An [`Event`] is one user interaction (click, conversion or view) on a set of
//! objects. Binding it to a target index yields an [`EventInternal`], which is
//! the unit that gets queued on disk and sent over the wire.
//!
//! Events are validated when they are built: a malformed event never reaches
//! the queue.

pub mod codec;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The subject of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventObjects {
    /// Ordered list of object identifiers
    ObjectIds(Vec<String>),
    /// Filter expressions, e.g. `"brand:apple"`
    Filters(Vec<String>),
}

impl EventObjects {
    /// Convenience constructor for object IDs
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EventObjects::ObjectIds(ids.into_iter().map(Into::into).collect())
    }

    /// Convenience constructor for filters
    pub fn filters<I, S>(filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EventObjects::Filters(filters.into_iter().map(Into::into).collect())
    }

    fn validate(&self) -> Result<()> {
        let (field, values) = match self {
            EventObjects::ObjectIds(ids) => ("objectIDs", ids),
            EventObjects::Filters(filters) => ("filters", filters),
        };
        if values.is_empty() {
            return Err(Error::Validation(format!("{} must not be empty", field)));
        }
        if values.iter().any(|v| v.is_empty()) {
            return Err(Error::Validation(format!(
                "{} must not contain empty entries",
                field
            )));
        }
        Ok(())
    }
}

/// Wire tag of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Click,
    Conversion,
    View,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::Conversion => "conversion",
            EventKind::View => "view",
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "click" => Ok(EventKind::Click),
            "conversion" => Ok(EventKind::Conversion),
            "view" => Ok(EventKind::View),
            other => Err(Error::Validation(format!("unknown event kind: {}", other))),
        }
    }
}

/// A click on one or more objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Click {
    pub name: String,
    pub user_token: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub objects: EventObjects,
    pub query_id: Option<String>,
    /// Positions of the clicked objects in the search results.
    /// Only meaningful together with `query_id`.
    pub positions: Option<Vec<u32>>,
}

/// A conversion (purchase, add-to-cart, ...) on one or more objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub name: String,
    pub user_token: String,
    pub timestamp: i64,
    pub objects: EventObjects,
    pub query_id: Option<String>,
}

/// A view of one or more objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub name: String,
    pub user_token: String,
    pub timestamp: i64,
    pub objects: EventObjects,
    pub query_id: Option<String>,
}

/// A user interaction event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Click(Click),
    Conversion(Conversion),
    View(View),
}

impl Event {
    /// Build a click that is not tied to a search
    pub fn click(
        name: impl Into<String>,
        user_token: impl Into<String>,
        timestamp: i64,
        objects: EventObjects,
    ) -> Result<Self> {
        Self::checked(Event::Click(Click {
            name: name.into(),
            user_token: user_token.into(),
            timestamp,
            objects,
            query_id: None,
            positions: None,
        }))
    }

    /// Build a click on search results
    pub fn click_after_search(
        name: impl Into<String>,
        user_token: impl Into<String>,
        timestamp: i64,
        objects: EventObjects,
        query_id: impl Into<String>,
        positions: Vec<u32>,
    ) -> Result<Self> {
        Self::checked(Event::Click(Click {
            name: name.into(),
            user_token: user_token.into(),
            timestamp,
            objects,
            query_id: Some(query_id.into()),
            positions: Some(positions),
        }))
    }

    /// Build a conversion, optionally attributed to a search
    pub fn conversion(
        name: impl Into<String>,
        user_token: impl Into<String>,
        timestamp: i64,
        objects: EventObjects,
        query_id: Option<String>,
    ) -> Result<Self> {
        Self::checked(Event::Conversion(Conversion {
            name: name.into(),
            user_token: user_token.into(),
            timestamp,
            objects,
            query_id,
        }))
    }

    /// Build a view, optionally attributed to a search
    pub fn view(
        name: impl Into<String>,
        user_token: impl Into<String>,
        timestamp: i64,
        objects: EventObjects,
        query_id: Option<String>,
    ) -> Result<Self> {
        Self::checked(Event::View(View {
            name: name.into(),
            user_token: user_token.into(),
            timestamp,
            objects,
            query_id,
        }))
    }

    fn checked(event: Event) -> Result<Self> {
        event.validate()?;
        Ok(event)
    }

    /// Check the event invariants.
    ///
    /// Fields are public, so anything that accepts an `Event` from outside
    /// (the tracker, the codec) re-runs this before trusting it.
    pub fn validate(&self) -> Result<()> {
        if self.name().is_empty() {
            return Err(Error::Validation("event name must not be empty".to_string()));
        }
        if self.user_token().is_empty() {
            return Err(Error::Validation("user token must not be empty".to_string()));
        }
        self.objects().validate()?;
        if let Some(query_id) = self.query_id() {
            if query_id.is_empty() {
                return Err(Error::Validation("query ID must not be empty".to_string()));
            }
        }
        if let Event::Click(click) = self {
            if click.positions.is_some() && click.query_id.is_none() {
                return Err(Error::Validation(
                    "positions require a query ID".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Click(_) => EventKind::Click,
            Event::Conversion(_) => EventKind::Conversion,
            Event::View(_) => EventKind::View,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Event::Click(e) => &e.name,
            Event::Conversion(e) => &e.name,
            Event::View(e) => &e.name,
        }
    }

    pub fn user_token(&self) -> &str {
        match self {
            Event::Click(e) => &e.user_token,
            Event::Conversion(e) => &e.user_token,
            Event::View(e) => &e.user_token,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Event::Click(e) => e.timestamp,
            Event::Conversion(e) => e.timestamp,
            Event::View(e) => e.timestamp,
        }
    }

    pub fn objects(&self) -> &EventObjects {
        match self {
            Event::Click(e) => &e.objects,
            Event::Conversion(e) => &e.objects,
            Event::View(e) => &e.objects,
        }
    }

    pub fn query_id(&self) -> Option<&str> {
        match self {
            Event::Click(e) => e.query_id.as_deref(),
            Event::Conversion(e) => e.query_id.as_deref(),
            Event::View(e) => e.query_id.as_deref(),
        }
    }

    /// Click positions; always `None` for conversions and views
    pub fn positions(&self) -> Option<&[u32]> {
        match self {
            Event::Click(e) => e.positions.as_deref(),
            Event::Conversion(_) | Event::View(_) => None,
        }
    }
}

/// An event bound to the index it will be sent to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInternal {
    index: String,
    event: Event,
}

impl EventInternal {
    pub fn new(index: impl Into<String>, event: Event) -> Self {
        Self {
            index: index.into(),
            event,
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn event(&self) -> &Event {
        &self.event
    }
}

/// Current time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_after_search_is_valid() {
        let event = Event::click_after_search(
            "Product Clicked",
            "user-1",
            1_700_000_000_000,
            EventObjects::ids(["54675051"]),
            "6de2f7eaa537fa93d8f8f05b927953b1",
            vec![1],
        )
        .unwrap();

        assert_eq!(event.kind(), EventKind::Click);
        assert_eq!(event.positions(), Some(&[1u32][..]));
        assert_eq!(event.query_id(), Some("6de2f7eaa537fa93d8f8f05b927953b1"));
    }

    #[test]
    fn test_positions_without_query_id_rejected() {
        let event = Event::Click(Click {
            name: "Product Clicked".to_string(),
            user_token: "user-1".to_string(),
            timestamp: 0,
            objects: EventObjects::ids(["1"]),
            query_id: None,
            positions: Some(vec![1]),
        });

        assert!(matches!(event.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_fields_rejected() {
        assert!(Event::click("", "user", 0, EventObjects::ids(["1"])).is_err());
        assert!(Event::click("name", "", 0, EventObjects::ids(["1"])).is_err());
        assert!(Event::view("name", "user", 0, EventObjects::Filters(vec![]), None).is_err());
        assert!(Event::conversion(
            "name",
            "user",
            0,
            EventObjects::ids(["1"]),
            Some(String::new())
        )
        .is_err());
    }

    #[test]
    fn test_conversion_and_view_have_no_positions() {
        let conversion =
            Event::conversion("Bought", "user", 0, EventObjects::ids(["1"]), Some("q".into()))
                .unwrap();
        let view = Event::view("Seen", "user", 0, EventObjects::filters(["foo:bar"]), None).unwrap();

        assert_eq!(conversion.positions(), None);
        assert_eq!(view.positions(), None);
        assert_eq!(view.kind(), EventKind::View);
    }

    #[test]
    fn test_event_kind_from_str() {
        assert_eq!("click".parse::<EventKind>().unwrap(), EventKind::Click);
        assert_eq!(
            "conversion".parse::<EventKind>().unwrap(),
            EventKind::Conversion
        );
        assert!("purchase".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_event_internal_structural_equality() {
        let event = Event::click("Clicked", "user", 42, EventObjects::ids(["a", "b"])).unwrap();
        let a = EventInternal::new("products", event.clone());
        let b = EventInternal::new("products", event.clone());
        let c = EventInternal::new("articles", event);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
