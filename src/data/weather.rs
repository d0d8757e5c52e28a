//! Forecast service HTTP client
//!
//! This module builds timeline request URLs and performs the single GET the
//! gateway needs: fetch one JSON document with a hard timeout.

use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use super::{DateRange, Document, UnitGroup};

/// Base URL of the Visual Crossing timeline API
pub const DEFAULT_BASE_URI: &str =
    "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline";

/// Hard timeout applied to connecting and to the whole request
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur when fetching forecast data
#[derive(Debug, Error)]
pub enum WeatherError {
    /// HTTP request failed (connection, timeout, body read)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Server answered with a non-2xx status
    #[error("Server responded with status {0}")]
    HttpStatus(u16),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Missing expected field in response
    #[error("Missing expected field in response: {0}")]
    MissingField(String),

    /// Base URI could not be turned into a request URL
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    /// Request parameters are unusable (no API key, blank location, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Everything that goes into one timeline request URL
#[derive(Debug, Clone, Copy)]
pub struct RequestParams<'a> {
    pub base_uri: &'a str,
    /// Normalized location, used verbatim as a path segment
    pub location: &'a str,
    pub range: &'a DateRange,
    pub api_key: &'a str,
    pub units: UnitGroup,
    pub lang: &'a str,
    pub include: &'a [String],
    pub elements: &'a [String],
}

/// Builds `<base>/<location>/<range>?key&unitGroup&lang&include&elements&contentType=json`
///
/// Path segments and query values are percent-encoded.
pub fn build_request_url(params: &RequestParams<'_>) -> Result<Url, WeatherError> {
    let mut url = Url::parse(params.base_uri)
        .map_err(|e| WeatherError::InvalidUrl(format!("{}: {}", params.base_uri, e)))?;

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| WeatherError::InvalidUrl(format!("{} cannot be a base", params.base_uri)))?;
        segments.pop_if_empty().push(params.location);
        for segment in params.range.segments() {
            segments.push(segment);
        }
    }

    url.query_pairs_mut()
        .append_pair("key", params.api_key)
        .append_pair("unitGroup", params.units.as_str())
        .append_pair("lang", params.lang)
        .append_pair("include", &params.include.join(","))
        .append_pair("elements", &params.elements.join(","))
        .append_pair("contentType", "json");

    Ok(url)
}

/// Checks that a live response carries the fields every forecast must have
pub fn validate_forecast(document: &Document) -> Result<(), WeatherError> {
    if !document.get("address").is_some_and(Value::is_string) {
        return Err(WeatherError::MissingField("address".to_string()));
    }
    if !document.get("days").is_some_and(Value::is_array) {
        return Err(WeatherError::MissingField("days".to_string()));
    }
    Ok(())
}

/// A successful (2xx) response
#[derive(Debug, Clone)]
pub struct ForecastResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body
    pub body: Document,
}

/// Client for fetching forecast documents
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: Client,
}

impl WeatherClient {
    /// Creates a client with the default 10 second timeout
    pub fn new() -> Result<Self, WeatherError> {
        Self::with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Creates a client with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Creates a WeatherClient with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Performs the GET and parses the body as a JSON object
    ///
    /// # Returns
    /// * `Ok(ForecastResponse)` - 2xx status and a JSON object body
    /// * `Err(WeatherError::HttpStatus)` - non-2xx status
    /// * `Err(WeatherError)` - transport failure, timeout or malformed body
    pub async fn fetch_document(&self, url: Url) -> Result<ForecastResponse, WeatherError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::HttpStatus(status.as_u16()));
        }

        let text = response.text().await?;
        let body: Document = serde_json::from_str(&text)?;

        Ok(ForecastResponse {
            status: status.as_u16(),
            body,
        })
    }
}
