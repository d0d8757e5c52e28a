//! Forecast request orchestration
//!
//! [`WeatherGateway`] decides for every request whether to answer from the
//! cache, hold back because of the throttle, or call the forecast service,
//! and folds live responses back into the cache.

use chrono::Utc;
use std::time::Instant;

use crate::cache::{is_reserved_key, CacheStore, LAST_LOCATION_KEY};
use crate::config::RequestConfig;
use crate::data::weather::{validate_forecast, ForecastResponse};
use crate::data::{
    build_request_url, DateRange, Document, RequestParams, ResponseRecord, UnitGroup,
    WeatherClient, WeatherError,
};
use crate::settings::Settings;
use crate::throttle::RequestThrottle;

/// Replaces whitespace in locations; the service rejects raw spaces
pub const LOCATION_SEPARATOR: &str = "_";

/// Collapses runs of whitespace into [`LOCATION_SEPARATOR`] and trims the ends
pub fn normalize_location(location: &str) -> String {
    location
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(LOCATION_SEPARATOR)
}

/// Fetches forecasts through the cache and the request throttle
///
/// One gateway serves one caller at a time: [`WeatherGateway::fetch`] takes
/// `&mut self`. Share it between tasks through [`crate::worker::FetchHandle`].
pub struct WeatherGateway {
    client: WeatherClient,
    request: RequestConfig,
    settings: Settings,
    cache: Option<Box<dyn CacheStore>>,
    throttle: RequestThrottle,
    /// Updated in place by every fetch
    record: ResponseRecord,
    /// HTTP status of the last request that reached the server
    last_status_code: Option<u16>,
}

impl std::fmt::Debug for WeatherGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherGateway")
            .field("base_uri", &self.request.base_uri)
            .field("settings", &self.settings)
            .field("cache", &self.cache.as_ref().map(|c| c.status()))
            .field("throttle", &self.throttle)
            .field("status", &self.record.status())
            .finish()
    }
}

impl WeatherGateway {
    /// Creates a gateway without a cache and with the default 10s throttle
    pub fn new(client: WeatherClient, request: RequestConfig, settings: Settings) -> Self {
        Self {
            client,
            request,
            settings,
            cache: None,
            throttle: RequestThrottle::default(),
            record: ResponseRecord::new(),
            last_status_code: None,
        }
    }

    /// Attaches a cache backend
    ///
    /// Settings persisted by an earlier run replace the current ones, and the
    /// forecast stored for the last served location becomes the current record.
    pub fn with_cache(mut self, cache: Box<dyn CacheStore>) -> Self {
        self.settings.restore(cache.as_ref());
        if let Some(location) = cache.get_string(LAST_LOCATION_KEY) {
            if let Some(document) = cache.get_document(&location) {
                tracing::debug!("Restored cached forecast for {}", location);
                self.record.update_cached(document);
            }
        }
        self.cache = Some(cache);
        self
    }

    pub fn with_throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Degree label ("C", "F" or "K") for the configured unit system
    pub fn degree_unit(&self) -> &'static str {
        self.settings.degree_unit()
    }

    /// Changes the unit system of the next request
    pub fn set_units(&mut self, units: UnitGroup) {
        self.settings.set_units(units, self.cache.as_deref());
    }

    /// Changes the language of the next request
    pub fn set_lang(&mut self, lang: &str) {
        self.settings.set_lang(lang, self.cache.as_deref());
    }

    pub fn cache(&self) -> Option<&dyn CacheStore> {
        self.cache.as_deref()
    }

    /// The record as left by the last fetch
    pub fn record(&self) -> &ResponseRecord {
        &self.record
    }

    /// HTTP status of the last request that got an answer, if any
    pub fn last_status_code(&self) -> Option<u16> {
        self.last_status_code
    }

    /// Returns the forecast for `location`
    ///
    /// In order:
    /// 1. A location other than the last served one is answered from the
    ///    cache if it has an entry (no network call, no throttle).
    /// 2. Within the throttle window the cached entry for `location` is
    ///    returned, or the record unchanged if there is none.
    /// 3. Otherwise the service is called. Success replaces the record and
    ///    the cache entry; any failure only sets the status to `Failure`.
    ///
    /// Never fails: inspect [`ResponseRecord::status`] on the result.
    pub async fn fetch(&mut self, location: &str, range: &DateRange) -> ResponseRecord {
        let location = normalize_location(location);

        if let Err(e) = check_location(&location) {
            tracing::warn!("Not requesting forecast: {}", e);
            self.last_status_code = None;
            self.record.mark_failure();
            return self.record.clone();
        }

        if let Some(document) = self.cached_other_location(&location) {
            tracing::debug!("Serving forecast for {} from cache", location);
            self.record.update_cached(document);
            self.remember_location(&location);
            return self.record.clone();
        }

        let now = Instant::now();
        if !self.throttle.try_acquire(now) {
            tracing::info!(
                "Forecasts can be requested once every {}s (retry in {}s); serving cached forecast for {}",
                self.throttle.cooldown().as_secs(),
                self.throttle.remaining(now).as_secs().max(1),
                location
            );
            self.last_status_code = None;
            if let Some(document) = self.cache.as_deref().and_then(|c| c.get_document(&location)) {
                self.record.update_cached(document);
            }
            return self.record.clone();
        }

        match self.request_forecast(&location, range).await {
            Ok(response) => {
                tracing::info!("Received forecast for {} (status {})", location, response.status);
                self.last_status_code = Some(response.status);
                self.record.update_live(response.body, Utc::now());
                self.store(&location);
            }
            Err(e) => {
                self.last_status_code = match e {
                    WeatherError::HttpStatus(code) => Some(code),
                    _ => None,
                };
                tracing::warn!("Forecast request for {} failed: {}", location, e);
                self.record.mark_failure();
            }
        }

        self.record.clone()
    }

    /// Disposes the cache backend
    ///
    /// Consumes the gateway, so it runs once and after every fetch finished.
    pub fn dispose(self) {
        if let Some(cache) = &self.cache {
            cache.dispose();
            tracing::debug!("Cache disposed");
        }
    }

    /// Cached forecast for `location` if it is not the last served location
    fn cached_other_location(&self, location: &str) -> Option<Document> {
        let cache = self.cache.as_deref()?;
        if cache.get_string(LAST_LOCATION_KEY).as_deref() == Some(location) {
            return None;
        }
        cache.get_document(location)
    }

    fn remember_location(&self, location: &str) {
        if let Some(cache) = self.cache.as_deref() {
            if !cache.put_string(LAST_LOCATION_KEY, location) {
                tracing::warn!("Could not record last location {}", location);
            }
        }
    }

    /// Caches the current record under `location`
    fn store(&self, location: &str) {
        if let Some(cache) = self.cache.as_deref() {
            if !cache.put_document(location, self.record.body()) {
                tracing::warn!("Could not cache forecast for {}", location);
            }
        }
        self.remember_location(location);
    }

    async fn request_forecast(
        &self,
        location: &str,
        range: &DateRange,
    ) -> Result<ForecastResponse, WeatherError> {
        let api_key = self
            .request
            .api_key()
            .ok_or_else(|| WeatherError::InvalidRequest("no API key configured".to_string()))?;

        let url = build_request_url(&RequestParams {
            base_uri: &self.request.base_uri,
            location,
            range,
            api_key,
            units: self.settings.units(),
            lang: self.settings.lang(),
            include: &self.request.include,
            elements: &self.request.elements,
        })?;

        tracing::debug!(
            "Requesting forecast for {} ({}, units={}, lang={})",
            location,
            range,
            self.settings.units(),
            self.settings.lang()
        );
        let response = self.client.fetch_document(url).await?;
        validate_forecast(&response.body)?;
        Ok(response)
    }
}

/// Rejects locations that cannot be requested or cached
fn check_location(location: &str) -> Result<(), WeatherError> {
    if location.is_empty() {
        return Err(WeatherError::InvalidRequest("no location given".to_string()));
    }
    if is_reserved_key(location) {
        return Err(WeatherError::InvalidRequest(format!(
            "'{}' is a reserved cache key",
            location
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DocumentStore, LANG_KEY, UNITS_KEY};
    use crate::data::ResponseStatus;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request_config(base_uri: &str) -> RequestConfig {
        RequestConfig {
            api_key: Some("test-key".to_string()),
            base_uri: base_uri.to_string(),
            ..RequestConfig::default()
        }
    }

    fn gateway(base_uri: &str) -> WeatherGateway {
        WeatherGateway::new(
            WeatherClient::new().unwrap(),
            request_config(base_uri),
            Settings::default(),
        )
    }

    fn forecast(address: &str) -> Document {
        json!({"address": address, "days": [{"datetime": "2024-01-01", "temp": "10"}]})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_normalize_location() {
        assert_eq!(normalize_location("Paris"), "Paris");
        assert_eq!(normalize_location("  New   York "), "New_York");
        assert_eq!(normalize_location("Rio de\tJaneiro"), "Rio_de_Janeiro");
        assert_eq!(normalize_location("   "), "");
    }

    #[tokio::test]
    async fn test_blank_location_fails_without_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast("Paris")))
            .expect(0)
            .mount(&mock_server)
            .await;

        let mut gateway = gateway(&mock_server.uri());
        let record = gateway.fetch("   ", &DateRange::default()).await;

        assert_eq!(record.status(), ResponseStatus::Failure);
        // The throttle window was not consumed
        assert!(gateway.throttle.last_request_at().is_none());
    }

    #[tokio::test]
    async fn test_reserved_location_is_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast("units")))
            .expect(0)
            .mount(&mock_server)
            .await;

        let mut gateway = gateway(&mock_server.uri());
        let record = gateway.fetch("units", &DateRange::default()).await;

        assert_eq!(record.status(), ResponseStatus::Failure);
    }

    #[tokio::test]
    async fn test_missing_api_key_short_circuits() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast("Paris")))
            .expect(0)
            .mount(&mock_server)
            .await;

        let mut gateway = WeatherGateway::new(
            WeatherClient::new().unwrap(),
            RequestConfig {
                api_key: None,
                base_uri: mock_server.uri(),
                ..RequestConfig::default()
            },
            Settings::default(),
        );
        let record = gateway.fetch("Paris", &DateRange::default()).await;

        assert_eq!(record.status(), ResponseStatus::Failure);
        assert!(record.is_empty());
        assert!(gateway.last_status_code().is_none());
        // The attempt still counts against the throttle
        assert!(gateway.throttle.last_request_at().is_some());
    }

    #[tokio::test]
    async fn test_request_carries_settings_and_config() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/New_York/next3days"))
            .and(query_param("key", "test-key"))
            .and(query_param("unitGroup", "metric"))
            .and(query_param("lang", "de"))
            .and(query_param("include", "days"))
            .and(query_param(
                "elements",
                "tempmax,temp,tempmin,description,conditions,datetime",
            ))
            .and(query_param("contentType", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast("New York")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut gateway = gateway(&mock_server.uri());
        gateway.set_units(UnitGroup::Metric);
        gateway.set_lang("de");
        let record = gateway.fetch("New York", &DateRange::next_days(3)).await;

        assert_eq!(record.status(), ResponseStatus::Ok);
        assert_eq!(record.address(), Some("New York"));
        assert!(record.last_update().is_some());
        assert!(record.received_at().is_some());
        assert_eq!(gateway.last_status_code(), Some(200));
        assert_eq!(gateway.degree_unit(), "C");
    }

    #[tokio::test]
    async fn test_response_without_days_is_a_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"address": "Paris"})))
            .mount(&mock_server)
            .await;

        let mut gateway = gateway(&mock_server.uri());
        let record = gateway.fetch("Paris", &DateRange::default()).await;

        assert_eq!(record.status(), ResponseStatus::Failure);
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_works_without_cache() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast("Paris")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut gateway = gateway(&mock_server.uri());
        let first = gateway.fetch("Paris", &DateRange::default()).await;
        // Throttled and nothing cached: the record comes back unchanged
        let second = gateway.fetch("Paris", &DateRange::default()).await;

        assert!(gateway.cache().is_none());
        assert_eq!(first, second);
        assert!(gateway.last_status_code().is_none());
        assert!(gateway.throttle.remaining(Instant::now()) > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_failure_after_cooldown_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&mock_server)
            .await;

        let mut gateway =
            gateway(&mock_server.uri()).with_throttle(RequestThrottle::new(Duration::ZERO));

        let first = gateway.fetch("Paris", &DateRange::default()).await;
        let second = gateway.fetch("Paris", &DateRange::default()).await;

        assert_eq!(first.status(), ResponseStatus::Failure);
        assert_eq!(second.status(), ResponseStatus::Failure);
        assert_eq!(gateway.last_status_code(), Some(503));
    }

    #[tokio::test]
    async fn test_with_cache_restores_settings_and_last_forecast() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = DocumentStore::open(temp_dir.path().join("cache.json"));
        cache.put_string(UNITS_KEY, "base");
        cache.put_string(LANG_KEY, "ru");
        cache.put_document("Oslo", &forecast("Oslo"));
        cache.put_string(LAST_LOCATION_KEY, "Oslo");

        let gateway = gateway("http://127.0.0.1:1").with_cache(Box::new(cache));

        assert_eq!(gateway.settings().units(), UnitGroup::Base);
        assert_eq!(gateway.settings().lang(), "ru");
        assert_eq!(gateway.degree_unit(), "K");
        assert_eq!(gateway.record().address(), Some("Oslo"));
        assert!(gateway.record().received_at().is_none());
    }

    #[tokio::test]
    async fn test_set_units_persists_to_cache() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = DocumentStore::open(temp_dir.path().join("cache.json"));

        let mut gateway = gateway("http://127.0.0.1:1").with_cache(Box::new(cache));
        gateway.set_units(UnitGroup::Uk);

        let cache = gateway.cache().unwrap();
        assert_eq!(cache.get_string(UNITS_KEY).as_deref(), Some("uk"));
    }

    #[tokio::test]
    async fn test_dispose_flushes_cache_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("cache.json");

        let mut gateway =
            gateway("http://127.0.0.1:1").with_cache(Box::new(DocumentStore::open(&path)));
        gateway.set_lang("es");
        gateway.dispose();

        let reopened = DocumentStore::open(&path);
        assert_eq!(reopened.get_string(LANG_KEY).as_deref(), Some("es"));
    }
}
