//! Item fetcher
//!
//! One logical "get product by ID" call. Every path through [`ItemFetcher::fetch`]
//! ends in a [`FetchOutcome`]; nothing is returned as an error.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::retry::{Pacer, PauseKind, RetryDecision, RetryPolicy, RetryState};
use crate::domain::{ErrorKind, FetchFailure, FetchOutcome, ItemId, ProductRecord};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::description::normalize_description;
use crate::infrastructure::http_client::{
    CatalogRequest, CatalogResponse, CatalogTransport, HeaderProfile, TransportError,
};

/// Everything a fetch needs besides the transport and the clock
#[derive(Debug, Clone)]
pub struct FetcherSettings {
    /// Base URL, the item id is appended as the last path segment
    pub endpoint: String,
    pub headers: HeaderProfile,
    pub retry: RetryPolicy,
    /// Only used to render the timeout message
    pub timeout: Duration,
    pub max_description_length: usize,
    pub raw_snippet_length: usize,
}

impl FetcherSettings {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.api.endpoint.clone(),
            headers: HeaderProfile::from_api_config(&config.api),
            retry: RetryPolicy::from_config(&config.fetch),
            timeout: config.fetch.timeout(),
            max_description_length: config.fetch.max_description_length,
            raw_snippet_length: config.fetch.raw_snippet_length,
        }
    }

    pub fn item_url(&self, id: ItemId) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), id)
    }
}

/// What one HTTP attempt turned into
enum Step {
    Done(FetchOutcome),
    Retry(PauseKind, Duration),
}

/// Retrying fetcher for single catalog items
#[derive(Clone)]
pub struct ItemFetcher {
    transport: Arc<dyn CatalogTransport>,
    pacer: Arc<dyn Pacer>,
    settings: Arc<FetcherSettings>,
}

impl ItemFetcher {
    pub fn new(
        transport: Arc<dyn CatalogTransport>,
        pacer: Arc<dyn Pacer>,
        settings: Arc<FetcherSettings>,
    ) -> Self {
        Self {
            transport,
            pacer,
            settings,
        }
    }

    /// Fetch one item, retrying per the policy
    pub async fn fetch(&self, id: ItemId) -> FetchOutcome {
        let policy = &self.settings.retry;
        let url = self.settings.item_url(id);
        let mut state = RetryState::new();

        while state.has_attempts_left(policy) {
            self.pacer
                .pause(PauseKind::Pacing, policy.pacing_delay())
                .await;

            let request = CatalogRequest {
                url: url.clone(),
                headers: self.settings.headers.pick(),
            };
            debug!("🌐 GET {} (attempt {}/{})", url, state.attempt, policy.max_attempts);

            let step = match self.transport.get(&request).await {
                Ok(response) => self.handle_response(id, &response, &mut state),
                Err(error) => Step::Done(self.transport_failure(id, error).into()),
            };

            match step {
                Step::Done(outcome) => return outcome,
                Step::Retry(kind, delay) => self.pacer.pause(kind, delay).await,
            }
        }

        warn!("❌ Item {} gave up after {} attempts", id, policy.max_attempts);
        FetchFailure::new(id, ErrorKind::MaxAttemptsExceeded)
            .with_message(format!("Exceeded {} attempts", policy.max_attempts))
            .into()
    }

    fn handle_response(&self, id: ItemId, response: &CatalogResponse, state: &mut RetryState) -> Step {
        let policy = &self.settings.retry;
        let status = response.status;

        if response.is_redirect() && policy.is_block_redirect(response.location.as_deref()) {
            let location = response.location.as_deref().unwrap_or_default();
            return match state.on_block_redirect(policy) {
                RetryDecision::RetryAfter { kind, delay } => {
                    warn!(
                        "🚧 Item {} redirected to {} ({}), cooling down {:?} ({}/{})",
                        id, location, status, delay, state.cooldowns, policy.max_rate_limit_cooldowns
                    );
                    Step::Retry(kind, delay)
                }
                RetryDecision::GiveUp => Step::Done(
                    FetchFailure::new(id, ErrorKind::RateLimited)
                        .with_status(status)
                        .with_message(format!("Blocked by redirect to {location}"))
                        .into(),
                ),
            };
        }

        if !response.is_success() {
            if policy.is_retryable_status(status) {
                if let RetryDecision::RetryAfter { kind, delay } = state.on_retryable_status(policy) {
                    debug!("🔄 Item {} got {}, retrying in {:?}", id, status, delay);
                    return Step::Retry(kind, delay);
                }
            }
            let location = response.location.as_deref().unwrap_or_default();
            return Step::Done(
                FetchFailure::new(id, ErrorKind::HttpError)
                    .with_status(status)
                    .with_message(format!("{} (Location: {})", response.reason(), location))
                    .into(),
            );
        }

        if !response.is_json() {
            return match state.on_non_json(policy) {
                RetryDecision::RetryAfter { kind, delay } => {
                    debug!(
                        "🔄 Item {} returned {} instead of JSON, retrying in {:?}",
                        id, response.content_type, delay
                    );
                    Step::Retry(kind, delay)
                }
                RetryDecision::GiveUp => Step::Done(
                    FetchFailure::new(id, ErrorKind::InvalidContentType)
                        .with_status(status)
                        .with_message(format!("Expected JSON, got {}", response.content_type))
                        .with_raw_snippet(snippet(&response.body, self.settings.raw_snippet_length))
                        .into(),
                ),
            };
        }

        Step::Done(self.parse_product(id, &response.body))
    }

    fn parse_product(&self, id: ItemId, body: &str) -> FetchOutcome {
        let max_chars = self.settings.max_description_length;
        let parsed = serde_json::from_str::<serde_json::Value>(body)
            .map_err(|e| format!("Invalid JSON body: {e}"))
            .and_then(|value| {
                ProductRecord::from_api_value(&value, |raw| normalize_description(raw, max_chars))
                    .ok_or_else(|| "JSON body is not an object".to_string())
            });

        match parsed {
            Ok(product) => FetchOutcome::Success { id, product },
            Err(message) => {
                warn!("❓ Item {}: {}", id, message);
                FetchFailure::new(id, ErrorKind::UnknownError)
                    .with_message(message)
                    .into()
            }
        }
    }

    fn transport_failure(&self, id: ItemId, error: TransportError) -> FetchFailure {
        let (kind, message) = match error {
            TransportError::Timeout => (
                ErrorKind::Timeout,
                format!("Timeout > {}s", self.settings.timeout.as_secs()),
            ),
            TransportError::ServerDisconnected(msg) => (ErrorKind::ServerDisconnected, msg),
            TransportError::Connection(msg) => (ErrorKind::ConnectionError, msg),
            TransportError::Client(msg) => (ErrorKind::ClientError, msg),
        };
        warn!("⚠️ Item {} failed with {}: {}", id, kind, message);
        FetchFailure::new(id, kind).with_message(message)
    }
}

/// First `max_chars` characters of a body
fn snippet(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infrastructure::config::FetchConfig;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport replaying a fixed script, repeating the last entry forever
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<Result<CatalogResponse, TransportError>>>,
        pub(crate) requests: Mutex<Vec<CatalogRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(script: Vec<Result<CatalogResponse, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CatalogTransport for ScriptedTransport {
        async fn get(&self, request: &CatalogRequest) -> Result<CatalogResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    /// Pacer that records every wait instead of sleeping
    #[derive(Default)]
    pub(crate) struct RecordingPacer {
        pub(crate) pauses: Mutex<Vec<(PauseKind, Duration)>>,
    }

    impl RecordingPacer {
        pub(crate) fn of_kind(&self, kind: PauseKind) -> Vec<Duration> {
            self.pauses
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, d)| *d)
                .collect()
        }
    }

    #[async_trait]
    impl Pacer for RecordingPacer {
        async fn pause(&self, kind: PauseKind, duration: Duration) {
            self.pauses.lock().unwrap().push((kind, duration));
        }
    }

    pub(crate) fn json(body: &str) -> Result<CatalogResponse, TransportError> {
        Ok(CatalogResponse {
            status: 200,
            content_type: "application/json; charset=utf-8".into(),
            location: None,
            body: body.into(),
        })
    }

    pub(crate) fn status(code: u16) -> Result<CatalogResponse, TransportError> {
        Ok(CatalogResponse {
            status: code,
            content_type: "text/html".into(),
            location: None,
            body: String::new(),
        })
    }

    fn redirect(location: &str) -> Result<CatalogResponse, TransportError> {
        Ok(CatalogResponse {
            status: 302,
            content_type: "text/html".into(),
            location: Some(location.into()),
            body: String::new(),
        })
    }

    fn html(body: &str) -> Result<CatalogResponse, TransportError> {
        Ok(CatalogResponse {
            status: 200,
            content_type: "text/html; charset=utf-8".into(),
            location: None,
            body: body.into(),
        })
    }

    pub(crate) fn test_settings() -> FetcherSettings {
        let fetch = FetchConfig {
            max_attempts: 5,
            max_non_json_attempts: 2,
            base_delay_ms: 1000,
            rate_limit_cooldown_seconds: 30,
            max_rate_limit_cooldowns: 3,
            raw_snippet_length: 300,
            ..FetchConfig::default()
        };
        let mut config = AppConfig::default();
        config.fetch = fetch;
        config.api.endpoint = "https://catalog.test/api/v2/products/".into();
        FetcherSettings::from_app_config(&config)
    }

    fn fetcher(
        script: Vec<Result<CatalogResponse, TransportError>>,
        settings: FetcherSettings,
    ) -> (ItemFetcher, Arc<ScriptedTransport>, Arc<RecordingPacer>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let pacer = Arc::new(RecordingPacer::default());
        let fetcher = ItemFetcher::new(transport.clone(), pacer.clone(), Arc::new(settings));
        (fetcher, transport, pacer)
    }

    const PRODUCT: &str = r#"{
        "id": 42,
        "name": "Bình giữ nhiệt",
        "url_key": "binh-giu-nhiet",
        "price": 159000,
        "description": "<p>Giữ   nóng</p><p>24h</p>",
        "images": [{"base_url": "https://img/1.jpg"}, {"thumbnail": "x"}, {"base_url": "https://img/2.jpg"}]
    }"#;

    #[tokio::test]
    async fn success_after_two_service_unavailable() {
        let (fetcher, transport, pacer) = fetcher(vec![status(503), status(503), json(PRODUCT)], test_settings());

        let outcome = fetcher.fetch(ItemId(42)).await;

        let FetchOutcome::Success { id, product } = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(id, ItemId(42));
        assert_eq!(product.name.as_deref(), Some("Bình giữ nhiệt"));
        assert_eq!(product.description, "Giữ nóng 24h");
        assert_eq!(product.images, vec!["https://img/1.jpg", "https://img/2.jpg"]);
        assert_eq!(transport.request_count(), 3);
        assert_eq!(
            pacer.of_kind(PauseKind::Backoff),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(pacer.of_kind(PauseKind::Pacing).len(), 3);
    }

    #[tokio::test]
    async fn requests_item_url_with_rotating_headers() {
        let (fetcher, transport, _) = fetcher(vec![json(PRODUCT)], test_settings());

        fetcher.fetch(ItemId(7)).await;

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].url, "https://catalog.test/api/v2/products/7");
        assert!(requests[0].headers.iter().any(|(name, _)| name == "User-Agent"));
        assert!(requests[0].headers.iter().any(|(name, _)| name == "Referer"));
    }

    #[tokio::test]
    async fn not_found_fails_on_first_attempt() {
        let (fetcher, transport, pacer) = fetcher(vec![status(404)], test_settings());

        let outcome = fetcher.fetch(ItemId(1)).await;

        let FetchOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.error_kind, ErrorKind::HttpError);
        assert_eq!(failure.http_status, Some(404));
        assert_eq!(failure.message.as_deref(), Some("Not Found (Location: )"));
        assert_eq!(transport.request_count(), 1);
        assert!(pacer.of_kind(PauseKind::Backoff).is_empty());
    }

    #[tokio::test]
    async fn retryable_status_on_last_attempt_is_http_error() {
        let (fetcher, transport, pacer) = fetcher(vec![status(500)], test_settings());

        let outcome = fetcher.fetch(ItemId(1)).await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::HttpError));
        assert_eq!(transport.request_count(), 5);
        assert_eq!(
            pacer.of_kind(PauseKind::Backoff),
            (1..=4).map(Duration::from_secs).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn timeout_is_not_retried() {
        let (fetcher, transport, _) = fetcher(vec![Err(TransportError::Timeout)], test_settings());

        let outcome = fetcher.fetch(ItemId(1)).await;

        let FetchOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.error_kind, ErrorKind::Timeout);
        assert_eq!(failure.http_status, None);
        assert_eq!(failure.message.as_deref(), Some("Timeout > 60s"));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn transport_errors_map_to_their_kinds() {
        let cases = [
            (TransportError::ServerDisconnected("closed".into()), ErrorKind::ServerDisconnected),
            (TransportError::Connection("refused".into()), ErrorKind::ConnectionError),
            (TransportError::Client("builder".into()), ErrorKind::ClientError),
        ];
        for (error, kind) in cases {
            let (fetcher, transport, _) = fetcher(vec![Err(error)], test_settings());
            assert_eq!(fetcher.fetch(ItemId(1)).await.error_kind(), Some(kind));
            assert_eq!(transport.request_count(), 1);
        }
    }

    #[tokio::test]
    async fn html_body_ends_as_invalid_content_type() {
        let body = "<html>".to_string() + &"x".repeat(1000);
        let (fetcher, transport, pacer) = fetcher(vec![html(&body)], test_settings());

        let outcome = fetcher.fetch(ItemId(1)).await;

        let FetchOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.error_kind, ErrorKind::InvalidContentType);
        assert_eq!(failure.http_status, Some(200));
        assert_eq!(failure.message.as_deref(), Some("Expected JSON, got text/html; charset=utf-8"));
        assert_eq!(failure.raw_snippet.as_deref().map(|s| s.chars().count()), Some(300));
        assert_eq!(transport.request_count(), 3);
        assert_eq!(
            pacer.of_kind(PauseKind::NonJsonBackoff),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn html_then_json_succeeds() {
        let (fetcher, _, _) = fetcher(vec![html("<html/>"), json(PRODUCT)], test_settings());
        assert!(fetcher.fetch(ItemId(42)).await.is_success());
    }

    #[tokio::test]
    async fn block_redirect_loop_ends_rate_limited() {
        let (fetcher, transport, pacer) =
            fetcher(vec![redirect("https://tiki.vn/maintenance")], test_settings());

        let outcome = fetcher.fetch(ItemId(1)).await;

        let FetchOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.error_kind, ErrorKind::RateLimited);
        assert_eq!(failure.http_status, Some(302));
        assert_eq!(transport.request_count(), 4);
        assert_eq!(
            pacer.of_kind(PauseKind::RateLimitCooldown),
            vec![Duration::from_secs(30); 3]
        );
    }

    #[tokio::test]
    async fn cooldown_then_success_keeps_attempt_budget() {
        let mut script = vec![redirect("/login"); 3];
        script.extend([status(503), status(503), status(503), status(503), json(PRODUCT)]);
        let (fetcher, _, _) = fetcher(script, test_settings());

        assert!(fetcher.fetch(ItemId(42)).await.is_success());
    }

    #[tokio::test]
    async fn plain_redirect_is_retried_as_status() {
        let (fetcher, _, pacer) = fetcher(vec![redirect("https://tiki.vn/p/1"), json(PRODUCT)], test_settings());

        assert!(fetcher.fetch(ItemId(42)).await.is_success());
        assert_eq!(pacer.of_kind(PauseKind::Backoff), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn malformed_json_is_unknown_error() {
        let (fetcher, _, _) = fetcher(vec![json("{not json")], test_settings());

        let FetchOutcome::Failure(failure) = fetcher.fetch(ItemId(1)).await else {
            panic!("expected failure");
        };
        assert_eq!(failure.error_kind, ErrorKind::UnknownError);
        assert!(failure.message.unwrap().starts_with("Invalid JSON body"));
    }

    #[tokio::test]
    async fn non_json_counts_against_attempts() {
        let settings = FetcherSettings {
            retry: RetryPolicy {
                max_attempts: 2,
                max_non_json_attempts: 5,
                ..test_settings().retry
            },
            ..test_settings()
        };
        let (fetcher, transport, _) = fetcher(vec![html("<html/>")], settings);

        assert_eq!(
            fetcher.fetch(ItemId(1)).await.error_kind(),
            Some(ErrorKind::MaxAttemptsExceeded)
        );
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn snippet_counts_characters() {
        assert_eq!(snippet("ờờờờ", 2), "ờờ");
        assert_eq!(snippet("ab", 10), "ab");
    }
}
