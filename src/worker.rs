//! Background fetch worker
//!
//! Owns the [`WeatherGateway`] on a tokio task and serves requests from a
//! channel one at a time, so any number of callers can share one gateway,
//! one throttle and one cache without locking around network calls.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::data::{DateRange, ResponseRecord, UnitGroup};
use crate::gateway::WeatherGateway;
use crate::settings::Settings;

/// Number of requests that may wait in the queue
const QUEUE_CAPACITY: usize = 32;

/// A finished fetch together with the settings it was made with
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub record: ResponseRecord,
    pub settings: Settings,
    pub status_code: Option<u16>,
}

/// Messages sent from callers to the worker
#[derive(Debug)]
pub enum WorkerRequest {
    /// Fetch a forecast and reply with the result
    Fetch {
        location: String,
        range: DateRange,
        reply: oneshot::Sender<FetchResult>,
    },
    /// Change the unit system for the following fetches
    SetUnits(UnitGroup),
    /// Change the response language for the following fetches
    SetLang(String),
}

/// Handle for talking to the background worker
pub struct FetchHandle {
    sender: mpsc::Sender<WorkerRequest>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl FetchHandle {
    /// Moves `gateway` onto a new task and returns a handle to it
    ///
    /// The cache is disposed when the worker stops. Cache backends do
    /// blocking I/O (file writes, Redis commands) on the worker task, so run
    /// it on the multi-thread runtime, where that stalls one worker thread
    /// instead of every task.
    pub fn spawn(gateway: WeatherGateway) -> Self {
        let (sender, mut receiver) = mpsc::channel::<WorkerRequest>(QUEUE_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut gateway = gateway;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        // Serve whatever was queued before the signal
                        receiver.close();
                        while let Some(request) = receiver.recv().await {
                            handle_request(&mut gateway, request).await;
                        }
                        break;
                    }
                    request = receiver.recv() => {
                        match request {
                            Some(request) => handle_request(&mut gateway, request).await,
                            None => break,
                        }
                    }
                }
            }

            gateway.dispose();
        });

        Self {
            sender,
            shutdown_tx,
            task,
        }
    }

    /// Queues a fetch and waits for its result
    ///
    /// Returns `None` if the worker has stopped.
    pub async fn fetch(&self, location: impl Into<String>, range: DateRange) -> Option<FetchResult> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(WorkerRequest::Fetch {
                location: location.into(),
                range,
                reply,
            })
            .await
            .ok()?;
        response.await.ok()
    }

    /// Returns false if the worker has stopped
    pub async fn set_units(&self, units: UnitGroup) -> bool {
        self.sender.send(WorkerRequest::SetUnits(units)).await.is_ok()
    }

    /// Returns false if the worker has stopped
    pub async fn set_lang(&self, lang: impl Into<String>) -> bool {
        self.sender
            .send(WorkerRequest::SetLang(lang.into()))
            .await
            .is_ok()
    }

    /// Stops the worker once the queued requests are served and waits for it
    /// to dispose the cache
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!("Fetch worker ended abnormally: {}", e);
        }
    }
}

async fn handle_request(gateway: &mut WeatherGateway, request: WorkerRequest) {
    match request {
        WorkerRequest::Fetch {
            location,
            range,
            reply,
        } => {
            let record = gateway.fetch(&location, &range).await;
            let result = FetchResult {
                record,
                settings: gateway.settings().clone(),
                status_code: gateway.last_status_code(),
            };
            // The caller may have given up waiting
            let _ = reply.send(result);
        }
        WorkerRequest::SetUnits(units) => gateway.set_units(units),
        WorkerRequest::SetLang(lang) => gateway.set_lang(&lang),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, DocumentStore, LANG_KEY};
    use crate::config::RequestConfig;
    use crate::data::{ResponseStatus, WeatherClient};
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_uri: &str) -> WeatherGateway {
        WeatherGateway::new(
            WeatherClient::new().unwrap(),
            RequestConfig {
                api_key: Some("test-key".to_string()),
                base_uri: base_uri.to_string(),
                ..RequestConfig::default()
            },
            Settings::default(),
        )
    }

    #[tokio::test]
    async fn test_fetch_through_worker() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("unitGroup", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "address": "Paris",
                "days": [{"datetime": "2024-01-01", "temp": "10"}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let handle = FetchHandle::spawn(gateway(&mock_server.uri()));
        assert!(handle.set_units(UnitGroup::Metric).await);

        let result = handle
            .fetch("Paris", DateRange::default())
            .await
            .expect("worker should reply");

        assert_eq!(result.record.status(), ResponseStatus::Ok);
        assert_eq!(result.record.address(), Some("Paris"));
        assert_eq!(result.settings.degree_unit(), "C");
        assert_eq!(result.status_code, Some(200));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_throttle() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "address": "Paris",
                "days": []
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let handle = FetchHandle::spawn(gateway(&mock_server.uri()));
        let (first, second, third) = tokio::join!(
            handle.fetch("Paris", DateRange::default()),
            handle.fetch("Paris", DateRange::default()),
            handle.fetch("Paris", DateRange::default()),
        );

        assert!(first.is_some() && second.is_some() && third.is_some());
        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_disposes_cache() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("cache.json");
        let gateway =
            gateway("http://127.0.0.1:1").with_cache(Box::new(DocumentStore::open(&path)));

        let handle = FetchHandle::spawn(gateway);
        assert!(handle.set_lang("it").await);
        handle.shutdown().await;

        let reopened = DocumentStore::open(&path);
        assert_eq!(reopened.get_string(LANG_KEY).as_deref(), Some("it"));
    }
}
