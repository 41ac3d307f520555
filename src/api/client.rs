use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use reqwest::StatusCode;
use snafu::prelude::*;
use tokio::time::Instant;

use super::error::variant::*;
use super::ratelimit::{BucketRegistry, GlobalLimit, RateLimitHeaders};
use super::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use super::types::ErrorBody;
use super::{Error, Result, Route};
use crate::config::Config;

/// Delay before retrying a 429 without retry_after information
const DEFAULT_RETRY_AFTER: f64 = 1.0;

/// Longest server requested delay honored before a retry
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Chat platform HTTP API Client
///
/// Every call goes through the rate-limit bucket of its route and the global
/// limit, 429 and 5xx answers are retried up to the configured budget.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    transport: Arc<dyn Transport>,
    base_url: String,
    max_retries: u32,
    timeout: Duration,
    buckets: BucketRegistry,
    global: GlobalLimit,
}

enum Outcome {
    Done(Option<Bytes>),
    Retry { after: Duration, error: Error },
}

impl Client {
    /// create a new api client using bot token in `config`
    pub fn new(config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.token, &config.user_agent)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// create a new api client on top of a custom transport
    pub fn with_transport(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                base_url: config.api_base_url.clone(),
                max_retries: config.max_retries,
                timeout: config.request_timeout,
                buckets: BucketRegistry::default(),
                global: GlobalLimit::default(),
            }),
        }
    }

    /// per route buckets
    pub fn buckets(&self) -> &BucketRegistry {
        &self.inner.buckets
    }

    /// process wide limit
    pub fn global_limit(&self) -> &GlobalLimit {
        &self.inner.global
    }

    /// Reject every call still waiting for a rate-limit slot
    pub fn shutdown(&self, reason: &str) {
        log::info!("Api client shutdown: {}", reason);
        self.inner.buckets.clear_all(reason);
    }

    /// Execute one logical call, parse the response body as json `R`.
    ///
    /// Returns `None` when the server answered without body.
    pub async fn request<R>(&self, route: Route, body: Option<serde_json::Value>) -> Result<Option<R>>
    where
        R: serde::de::DeserializeOwned,
    {
        let body = body
            .map(|b| serde_json::to_vec(&b))
            .transpose()
            .context(SerializeBodyFailed)?
            .map(Bytes::from);

        match self.execute(&route, body).await? {
            Some(body) => {
                let value =
                    serde_json::from_slice(&body).with_context(|_| ParseBodyFailed { body })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn execute(&self, route: &Route, body: Option<Bytes>) -> Result<Option<Bytes>> {
        let inner = &self.inner;
        let bucket = inner.buckets.get(route.bucket_key());
        let url = format!("{}{}", inner.base_url, route.path());

        let mut attempt = 0;

        loop {
            inner.global.wait().await;

            // the slot taken by the first attempt covers every retry
            if attempt == 0 {
                bucket
                    .acquire()
                    .await
                    .map_err(|e| Shutdown { reason: e.reason }.build())?;
            }

            log::debug!("Request {} (attempt {})", route, attempt + 1);

            let request = HttpRequest {
                method: route.method().clone(),
                url: url.clone(),
                body: body.clone(),
            };

            let response = tokio::time::timeout(inner.timeout, inner.transport.send(request))
                .await
                .map_err(|_| {
                    Timeout {
                        method: route.method().clone(),
                        url: &url,
                        timeout: inner.timeout,
                    }
                    .build()
                })?
                .with_context(|_| RequestFailed {
                    method: route.method().clone(),
                    url: &url,
                })?;

            let headers = RateLimitHeaders::parse(&response.headers);
            bucket.update(
                headers.limit,
                headers.remaining,
                headers.reset,
                headers.bucket.clone(),
            );
            if headers.global {
                if let Some(reset) = headers.reset {
                    inner.global.limit_until(reset);
                }
            }

            match self.classify(response, attempt)? {
                Outcome::Done(body) => return Ok(body),
                Outcome::Retry { after, error } => {
                    if attempt >= inner.max_retries {
                        log::warn!("Request {} failed after {} retries: {}", route, attempt, error);
                        return Err(error);
                    }

                    log::warn!("Request {} failed: {}, retry in {:?}", route, error, after);

                    tokio::time::sleep(after).await;
                    attempt += 1;
                }
            }
        }
    }

    fn classify(&self, response: HttpResponse, attempt: u32) -> Result<Outcome> {
        let status = response.status;

        if status.is_success() {
            if status == StatusCode::NO_CONTENT || response.body.is_empty() {
                return Ok(Outcome::Done(None));
            }
            return Ok(Outcome::Done(Some(response.body)));
        }

        let error_body: ErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let headers = RateLimitHeaders::parse(&response.headers);
                let global = error_body.global.unwrap_or(headers.global);
                let retry_after = error_body
                    .retry_after
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .or_else(|| {
                        headers
                            .reset
                            .map(|r| r.saturating_duration_since(Instant::now()).as_secs_f64())
                    })
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                let after = Duration::try_from_secs_f64(retry_after)
                    .unwrap_or(MAX_RETRY_AFTER)
                    .min(MAX_RETRY_AFTER);

                if global {
                    match Instant::now().checked_add(after) {
                        Some(until) => self.inner.global.limit_until(until),
                        None => log::warn!("Ignore global rate limit of {:?}", after),
                    }
                }

                Ok(Outcome::Retry {
                    after,
                    error: RateLimitExceeded {
                        retry_after,
                        global,
                    }
                    .build(),
                })
            }
            StatusCode::UNAUTHORIZED => Unauthorized {
                message: error_body.error,
            }
            .fail(),
            StatusCode::FORBIDDEN => Forbidden {
                message: error_body.error,
            }
            .fail(),
            StatusCode::NOT_FOUND => NotFound {
                message: error_body.error,
            }
            .fail(),
            s if s.is_server_error() => Ok(Outcome::Retry {
                after: Duration::from_secs(1 << attempt.min(16)),
                error: Server { status_code: s }.build(),
            }),
            s => UnknownHTTP {
                status_code: s,
                message: error_body.error,
                code: error_body.code,
            }
            .fail(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::{SystemTime, UNIX_EPOCH};

    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::api::transport::mock::{response, Scripted, ScriptedTransport};

    fn client(max_retries: u32, transport: &Arc<ScriptedTransport>) -> Client {
        let config = Config::new("token", "http://api.test", "ws://gateway.test")
            .with_max_retries(max_retries)
            .with_request_timeout(Duration::from_secs(5));
        Client::with_transport(&config, transport.clone())
    }

    fn epoch_after(secs: u64) -> String {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        format!("{:.3}", now.as_secs_f64() + secs as f64)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_with_body() {
        let transport = Arc::new(ScriptedTransport::new([response(
            200,
            &[],
            r#"{"id": "1", "username": "bot", "bot": true}"#,
        )]));
        let client = client(3, &transport);

        let user: Option<crate::api::types::User> = client
            .request(Route::new(Method::GET, "/users/@me"), None)
            .await
            .unwrap();

        assert_eq!(user.unwrap().username, "bot");
        assert_eq!(transport.calls()[0].1, "http://api.test/users/@me");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_content() {
        let transport = Arc::new(ScriptedTransport::new([response(204, &[], "")]));
        let client = client(3, &transport);

        let result: Option<serde_json::Value> = client
            .request(Route::new(Method::DELETE, "/channels/1"), None)
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_retried_with_exponential_backoff() {
        let transport = Arc::new(ScriptedTransport::new(
            (0..4).map(|_| response(503, &[], "")),
        ));
        let client = client(3, &transport);
        let start = Instant::now();

        let err = client
            .request::<serde_json::Value>(Route::new(Method::GET, "/servers/1"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ServerError { .. }));

        let offsets = transport
            .calls()
            .iter()
            .map(|(_, _, at)| (*at - start).as_secs())
            .collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 1, 3, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_then_success() {
        let transport = Arc::new(ScriptedTransport::new([
            response(500, &[], ""),
            response(200, &[], r#"{"ok": true}"#),
        ]));
        let client = client(3, &transport);

        let value: Option<serde_json::Value> = client
            .request(Route::new(Method::GET, "/servers/1"), None)
            .await
            .unwrap();

        assert_eq!(value, Some(json!({"ok": true})));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_not_retried() {
        for (status, check) in [
            (401, (|e: &Error| matches!(e, Error::Unauthorized { .. })) as fn(&Error) -> bool),
            (403, |e| matches!(e, Error::Forbidden { .. })),
            (404, |e| matches!(e, Error::NotFound { message } if message == "gone")),
            (400, |e| matches!(e, Error::UnknownHTTPError { code: Some(7), .. })),
        ] {
            let transport = Arc::new(ScriptedTransport::new([response(
                status,
                &[],
                r#"{"error": "gone", "code": 7}"#,
            )]));
            let client = client(3, &transport);

            let err = client
                .request::<serde_json::Value>(Route::new(Method::GET, "/channels/9"), None)
                .await
                .unwrap_err();

            assert!(check(&err), "status {status} got {err:?}");
            assert_eq!(transport.call_count(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_then_success() {
        let transport = Arc::new(ScriptedTransport::new([
            response(429, &[], r#"{"error": "slow down", "retry_after": 2.5}"#),
            response(200, &[], r#"{}"#),
        ]));
        let client = client(3, &transport);
        let start = Instant::now();

        client
            .request::<serde_json::Value>(Route::new(Method::POST, "/channels/1/messages"), None)
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls[1].2 - start, Duration::from_millis(2500));
        assert!(!client.global_limit().is_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausts_budget() {
        let transport = Arc::new(ScriptedTransport::new([
            response(429, &[], r#"{"error": "slow", "retry_after": 1}"#),
            response(429, &[], r#"{"error": "slow", "retry_after": 1}"#),
        ]));
        let client = client(1, &transport);

        let err = client
            .request::<serde_json::Value>(Route::new(Method::POST, "/channels/1/messages"), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::RateLimitExceeded {
                global: false,
                ..
            }
        ));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_retry_after_is_clamped() {
        let transport = Arc::new(ScriptedTransport::new([
            response(
                429,
                &[],
                r#"{"error": "global", "retry_after": 1e20, "global": true}"#,
            ),
            response(200, &[], r#"{}"#),
        ]));
        let client = client(1, &transport);
        let start = Instant::now();

        client
            .request::<serde_json::Value>(Route::new(Method::GET, "/servers/1"), None)
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].2 - start, MAX_RETRY_AFTER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_rate_limit_pauses_every_route() {
        let transport = Arc::new(ScriptedTransport::new([
            response(
                429,
                &[],
                r#"{"error": "global", "retry_after": 3, "global": true}"#,
            ),
            response(200, &[], r#"{}"#),
        ]));
        let client = client(0, &transport);
        let start = Instant::now();

        let err = client
            .request::<serde_json::Value>(Route::new(Method::GET, "/servers/1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimitExceeded { global: true, .. }));
        assert!(client.global_limit().is_limited());

        client
            .request::<serde_json::Value>(Route::new(Method::GET, "/channels/2"), None)
            .await
            .unwrap();

        let calls = transport.calls();
        assert!(calls[1].2 - start >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_does_not_reacquire_bucket() {
        let exhausted = [
            ("x-ratelimit-limit", "1".to_string()),
            ("x-ratelimit-remaining", "0".to_string()),
            ("x-ratelimit-reset", epoch_after(60)),
        ];
        let transport = Arc::new(ScriptedTransport::new([
            response(502, &exhausted, ""),
            response(200, &exhausted, "{}"),
        ]));
        let client = client(3, &transport);
        let start = Instant::now();

        client
            .request::<serde_json::Value>(Route::new(Method::GET, "/servers/1"), None)
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_bucket_delays_next_call() {
        let transport = Arc::new(ScriptedTransport::new([
            response(
                200,
                &[
                    ("x-ratelimit-limit", "1".to_string()),
                    ("x-ratelimit-remaining", "0".to_string()),
                    ("x-ratelimit-reset", epoch_after(2)),
                ],
                "{}",
            ),
            response(200, &[], "{}"),
        ]));
        let client = client(3, &transport);
        let route = Route::new(Method::GET, "/servers/1");
        let start = Instant::now();

        client
            .request::<serde_json::Value>(route.clone(), None)
            .await
            .unwrap();
        client
            .request::<serde_json::Value>(route, None)
            .await
            .unwrap();

        let calls = transport.calls();
        assert!(calls[1].2 - start >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_without_rate_limit_headers_is_not_throttled() {
        let transport = Arc::new(ScriptedTransport::new(
            (0..3).map(|_| response(200, &[], "{}")),
        ));
        let client = client(3, &transport);
        let start = Instant::now();

        for _ in 0..3 {
            client
                .request::<serde_json::Value>(Route::new(Method::GET, "/servers/1"), None)
                .await
                .unwrap();
        }

        let offsets = transport
            .calls()
            .iter()
            .map(|(_, _, at)| *at - start)
            .collect::<Vec<_>>();
        assert_eq!(offsets, vec![Duration::ZERO; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let transport = Arc::new(ScriptedTransport::new([Scripted::Hang]));
        let client = client(3, &transport);
        let start = Instant::now();

        let err = client
            .request::<serde_json::Value>(Route::new(Method::GET, "/servers/1"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure() {
        let transport = Arc::new(ScriptedTransport::new([Scripted::Fail("connection reset")]));
        let client = client(3, &transport);

        let err = client
            .request::<serde_json::Value>(Route::new(Method::GET, "/servers/1"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RequestFailed { .. }));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_queued_calls() {
        let transport = Arc::new(ScriptedTransport::new([response(
            200,
            &[
                ("x-ratelimit-limit", "1".to_string()),
                ("x-ratelimit-remaining", "0".to_string()),
                ("x-ratelimit-reset", epoch_after(600)),
            ],
            "{}",
        )]));
        let client = client(3, &transport);
        let route = Route::new(Method::GET, "/servers/1");

        client
            .request::<serde_json::Value>(route.clone(), None)
            .await
            .unwrap();

        let queued = tokio::spawn({
            let client = client.clone();
            async move { client.request::<serde_json::Value>(route, None).await }
        });

        while client.buckets().get("GET /servers/1").queued() == 0 {
            tokio::task::yield_now().await;
        }
        client.shutdown("bot stopped");

        let err = queued.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Shutdown { reason } if reason == "bot stopped"));
        assert_eq!(transport.call_count(), 1);
    }
}
