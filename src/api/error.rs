use std::time::Duration;

use snafu::prelude::*;

/// API Error
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(variant), context(suffix(false)))]
pub enum Error {
    /// bot token is invalid(contains invalid character that cant be send in HTTP header)
    #[snafu(display("bot token {token} is invalid"))]
    TokenInvalid {
        /// input token
        token: String,
    },

    /// create HTTP client failed
    #[snafu(display("create api client failed: {source}"))]
    ClientCreateFailed {
        /// source error
        source: reqwest::Error,
    },

    /// resource identifier is not a numeric handle, no request was sent
    #[snafu(display("invalid {kind} id {value:?}"))]
    Validation {
        /// resource kind
        kind: &'static str,
        /// received identifier
        value: String,
    },

    /// serialize request body failed
    #[snafu(display("serialize request body failed: {source}"))]
    SerializeBodyFailed {
        /// source error
        source: serde_json::Error,
    },

    /// send api request failed
    #[snafu(display("{} url {url} failed: {source}", method.as_str()))]
    RequestFailed {
        /// http method
        method: reqwest::Method,
        /// target url
        url: String,
        /// source transport error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// no response within client side deadline
    #[snafu(display("{} url {url} timed out after {timeout:?}", method.as_str()))]
    Timeout {
        /// http method
        method: reqwest::Method,
        /// target url
        url: String,
        /// configured deadline
        timeout: Duration,
    },

    /// server answered 429
    #[snafu(display("rate limited, retry after {retry_after}s (global: {global})"))]
    RateLimitExceeded {
        /// seconds to wait
        retry_after: f64,
        /// the limit applies to every route
        global: bool,
    },

    /// server answered 401
    #[snafu(display("unauthorized: {message}"))]
    Unauthorized {
        /// error message in body
        message: String,
    },

    /// server answered 403
    #[snafu(display("forbidden: {message}"))]
    Forbidden {
        /// error message in body
        message: String,
    },

    /// server answered 404
    #[snafu(display("not found: {message}"))]
    NotFound {
        /// error message in body
        message: String,
    },

    /// server answered 5xx
    #[snafu(display("server error {status_code}"))]
    ServerError {
        /// received http status code
        status_code: reqwest::StatusCode,
    },

    /// any other non-2xx status
    #[snafu(display("unexpected http status {status_code}: {message}"))]
    UnknownHTTPError {
        /// received http status code
        status_code: reqwest::StatusCode,
        /// error message in body, if any
        message: String,
        /// api error code in body, if any
        code: Option<i64>,
    },

    /// parse response body of api request as target json type failed
    #[snafu(display("parse response body {body:?} failed: {source}"))]
    ParseBodyFailed {
        /// http response body
        body: bytes::Bytes,
        /// source parse error
        source: serde_json::Error,
    },

    /// client was shut down while the call waited for a rate-limit slot
    #[snafu(display("request aborted: {reason}"))]
    Shutdown {
        /// shutdown reason
        reason: String,
    },
}

impl Error {
    /// Check if this error came from a local check and never reached the network
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::TokenInvalid { .. } | Self::Validation { .. } | Self::SerializeBodyFailed { .. }
        )
    }
}
