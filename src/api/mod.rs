//! Chat platform REST api

mod client;
mod endpoints;
mod error;
pub mod ratelimit;
mod route;
pub mod transport;
pub mod types;

pub use client::Client;
pub use error::Error;
pub use route::{validate_id, Route};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

/// Result type for api module
pub type Result<T, E = Error> = std::result::Result<T, E>;
