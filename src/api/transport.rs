//! HTTP transport used by the api client.

use bytes::Bytes;
use reqwest::{header::HeaderMap, Method, StatusCode};
use snafu::prelude::*;

use super::error::variant::*;
use super::Result;

/// Boxed transport level error
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// One HTTP request, body is json encoded already
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// http method
    pub method: Method,
    /// full url
    pub url: String,
    /// json body
    pub body: Option<Bytes>,
}

/// One HTTP response with fully read body
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// status code
    pub status: StatusCode,
    /// response headers
    pub headers: HeaderMap,
    /// response body
    pub body: Bytes,
}

/// Performs a single HTTP round trip, without retry or rate-limit handling.
#[async_trait::async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    /// send request and read the whole response
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Default transport backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport authorized by bot `token`
    pub fn new(token: &str, user_agent: &str) -> Result<Self> {
        let auth_header_value = format!("Bot {}", token).parse().map_err(|_| {
            TokenInvalid {
                token: token.to_string(),
            }
            .build()
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, auth_header_value);

        let client = reqwest::Client::builder()
            .gzip(true)
            .deflate(true)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .context(ClientCreateFailed)?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method, &request.url);

        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let resp = self.client.execute(builder.build()?).await?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
