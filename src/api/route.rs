//! Route descriptor and rate-limit bucket key derivation.

use std::fmt::Display;

use reqwest::Method;
use snafu::prelude::*;

use super::error::variant::*;
use super::Result;

/// Resources whose identifier defines its own rate-limit partition.
static MAJOR_RESOURCES: &[&str] = &["servers", "channels", "webhooks"];

static MINOR_PLACEHOLDER: &str = ":id";

/// An immutable (method, path) pair with its rate-limit bucket key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Method,
    path: String,
    bucket_key: String,
}

impl Route {
    /// Build a route for `path`, which must start with `/`.
    ///
    /// Numeric segments right after a major resource (`servers`, `channels`,
    /// `webhooks`) stay in the bucket key, any other numeric segment is
    /// replaced by a placeholder so e.g. every message id in one channel
    /// shares a bucket.
    pub fn new<P: Into<String>>(method: Method, path: P) -> Self {
        let path = path.into();
        let bucket_key = format!("{} {}", method.as_str(), bucket_path(&path));

        Self {
            method,
            path,
            bucket_key,
        }
    }

    /// http method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// request path, relative to api base url
    pub fn path(&self) -> &str {
        &self.path
    }

    /// key of the bucket this route belongs to
    pub fn bucket_key(&self) -> &str {
        &self.bucket_key
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method.as_str(), self.path)
    }
}

fn bucket_path(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let mut previous = "";

    path.split('/')
        .map(|segment| {
            let normalized = if is_numeric(segment) && !MAJOR_RESOURCES.contains(&previous) {
                MINOR_PLACEHOLDER
            } else {
                segment
            };
            previous = segment;
            normalized
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Check `id` is a well-formed numeric handle, `kind` is used in error message.
pub fn validate_id(kind: &'static str, id: &str) -> Result<u64> {
    ensure!(
        is_numeric(id),
        Validation {
            kind,
            value: id.to_string()
        }
    );

    id.parse().map_err(|_| {
        Validation {
            kind,
            value: id.to_string(),
        }
        .build()
    })
}
