//! Core data models for the forecast client
//!
//! This module contains the record handed back to callers after every fetch,
//! together with the small value types used to describe a request: the unit
//! system and the date-range expression.

pub mod weather;

pub use weather::{build_request_url, RequestParams, WeatherClient, WeatherError};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Untyped JSON object: the raw forecast payload as received from the service
pub type Document = serde_json::Map<String, Value>;

/// Field stamped into every live response with a human-readable receipt time
pub const LAST_UPDATE_KEY: &str = "last_update";

/// Format of the `last_update` stamp, e.g. "01 January 2024 09:15:00 AM"
const LAST_UPDATE_FORMAT: &str = "%d %B %Y %I:%M:%S %p";

/// Outcome of the most recent operation on a [`ResponseRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResponseStatus {
    /// Body not received yet, or holds a valid forecast
    #[default]
    Ok,
    /// The last fetch failed; the body still holds the previous forecast
    Failure,
}

/// A forecast document plus its receipt time and status
///
/// A record starts empty and is updated in place by the gateway on every
/// fetch. A failed fetch flips the status without touching the body, so the
/// caller keeps seeing the last good forecast.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseRecord {
    /// The forecast payload
    body: Document,
    /// When `body` was last replaced by a live network response
    received_at: Option<DateTime<Utc>>,
    /// Status of the last operation
    status: ResponseStatus,
}

impl ResponseRecord {
    /// Creates an empty record with `Ok` status
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &Document {
        &self.body
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Looks up a top-level field of the forecast
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Looks up a top-level string field of the forecast
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    /// The resolved address reported by the service
    pub fn address(&self) -> Option<&str> {
        self.get_str("address")
    }

    /// The human-readable time of the last live update
    pub fn last_update(&self) -> Option<&str> {
        self.get_str(LAST_UPDATE_KEY)
    }

    /// Number of forecast days in the body
    pub fn day_count(&self) -> usize {
        self.body
            .get("days")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// Returns the forecast for one day (starting from 0)
    pub fn day(&self, index: usize) -> Option<&Document> {
        self.body
            .get("days")?
            .as_array()?
            .get(index)?
            .as_object()
    }

    /// Returns a single field of one day's forecast, formatted for display
    ///
    /// Strings are returned without quotes; numbers and booleans use their
    /// JSON rendering. `None` if the day or field is missing or null.
    pub fn day_value(&self, index: usize, key: &str) -> Option<String> {
        match self.day(index)?.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Serializes the body back to a JSON string
    pub fn stringify(&self) -> String {
        Value::Object(self.body.clone()).to_string()
    }

    /// Replaces the body with a live response and stamps it with `now`
    pub(crate) fn update_live(&mut self, mut body: Document, now: DateTime<Utc>) {
        let stamp = now.with_timezone(&Local).format(LAST_UPDATE_FORMAT);
        body.insert(LAST_UPDATE_KEY.to_string(), Value::String(stamp.to_string()));
        self.body = body;
        self.received_at = Some(now);
        self.status = ResponseStatus::Ok;
    }

    /// Replaces the body with a previously cached response
    ///
    /// `received_at` is left as it was: cached documents carry their own
    /// `last_update` stamp.
    pub(crate) fn update_cached(&mut self, body: Document) {
        self.body = body;
        self.status = ResponseStatus::Ok;
    }

    /// Marks the last operation as failed, keeping the previous body
    pub(crate) fn mark_failure(&mut self) {
        self.status = ResponseStatus::Failure;
    }
}

/// Error returned when parsing an unknown unit system name
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown unit group: '{0}'. Valid unit groups: us, uk, metric, base")]
pub struct UnknownUnitGroup(pub String);

/// Unit system requested from the forecast service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitGroup {
    /// Fahrenheit, miles, inches
    #[default]
    Us,
    /// Celsius with miles for distance
    Uk,
    /// Celsius, kilometres, millimetres
    Metric,
    /// Scientific base units (Kelvin)
    Base,
}

impl UnitGroup {
    /// Wire name used in the `unitGroup` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Us => "us",
            Self::Uk => "uk",
            Self::Metric => "metric",
            Self::Base => "base",
        }
    }

    /// Degree label shown next to temperatures: "C", "F" or "K"
    pub fn degree_unit(&self) -> &'static str {
        match self {
            Self::Metric | Self::Uk => "C",
            Self::Us => "F",
            Self::Base => "K",
        }
    }
}

impl fmt::Display for UnitGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitGroup {
    type Err = UnknownUnitGroup;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "us" => Ok(Self::Us),
            "uk" => Ok(Self::Uk),
            "metric" => Ok(Self::Metric),
            "base" => Ok(Self::Base),
            _ => Err(UnknownUnitGroup(s.to_string())),
        }
    }
}

/// Which forecast days to retrieve, e.g. `next1days` or `2024-01-01/2024-01-07`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange(String);

impl DateRange {
    /// The next `days` days starting today
    pub fn next_days(days: u32) -> Self {
        Self(format!("next{}days", days))
    }

    /// An explicit inclusive date span
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self(format!(
            "{}/{}",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URL path segments of the expression (a span contributes two)
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').map(str::trim).filter(|s| !s.is_empty())
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::next_days(1)
    }
}

impl From<&str> for DateRange {
    fn from(expr: &str) -> Self {
        Self(expr.trim().to_string())
    }
}

impl From<String> for DateRange {
    fn from(expr: String) -> Self {
        Self::from(expr.as_str())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
