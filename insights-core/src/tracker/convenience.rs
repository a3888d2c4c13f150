//! Shorthand constructors on [`Tracker`]
//!
//! Each method builds the event, fills in the tracker's user token and the
//! current time unless [`EventContext`] overrides them, then calls
//! [`Tracker::track`]. Unlike `track`, construction errors are returned.

use super::Tracker;
use crate::error::Result;
use crate::event::{now_millis, Event, EventObjects};

/// Per-call overrides for the convenience methods
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContext {
    pub user_token: Option<String>,
    pub timestamp: Option<i64>,
}

impl EventContext {
    pub fn at(timestamp: i64) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..Default::default()
        }
    }

    pub fn user(token: impl Into<String>) -> Self {
        Self {
            user_token: Some(token.into()),
            ..Default::default()
        }
    }
}

impl Tracker {
    fn resolve(&self, context: EventContext) -> (String, i64) {
        (
            context.user_token.unwrap_or_else(|| self.user_token()),
            context.timestamp.unwrap_or_else(now_millis),
        )
    }

    pub fn clicked(
        &self,
        name: impl Into<String>,
        objects: EventObjects,
        context: EventContext,
    ) -> Result<()> {
        let (user_token, timestamp) = self.resolve(context);
        self.track(Event::click(name, user_token, timestamp, objects)?);
        Ok(())
    }

    /// Click on search results; `positions` are 1-based ranks
    pub fn clicked_after_search(
        &self,
        name: impl Into<String>,
        query_id: impl Into<String>,
        objects: EventObjects,
        positions: Vec<u32>,
        context: EventContext,
    ) -> Result<()> {
        let (user_token, timestamp) = self.resolve(context);
        self.track(Event::click_after_search(
            name, user_token, timestamp, objects, query_id, positions,
        )?);
        Ok(())
    }

    pub fn converted(
        &self,
        name: impl Into<String>,
        objects: EventObjects,
        context: EventContext,
    ) -> Result<()> {
        let (user_token, timestamp) = self.resolve(context);
        self.track(Event::conversion(name, user_token, timestamp, objects, None)?);
        Ok(())
    }

    pub fn converted_after_search(
        &self,
        name: impl Into<String>,
        query_id: impl Into<String>,
        objects: EventObjects,
        context: EventContext,
    ) -> Result<()> {
        let (user_token, timestamp) = self.resolve(context);
        self.track(Event::conversion(
            name,
            user_token,
            timestamp,
            objects,
            Some(query_id.into()),
        )?);
        Ok(())
    }

    pub fn viewed(
        &self,
        name: impl Into<String>,
        objects: EventObjects,
        context: EventContext,
    ) -> Result<()> {
        let (user_token, timestamp) = self.resolve(context);
        self.track(Event::view(name, user_token, timestamp, objects, None)?);
        Ok(())
    }
}
