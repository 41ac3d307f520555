//! framework error types

use snafu::prelude::*;

use super::api::Error as APIError;
use super::config::ConfigError;
use super::ws::ParseGatewayURLError;

/// framework result type
pub type Result<T> = std::result::Result<T, Error>;

/// framework error type
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    /// Load config failed
    #[snafu(display("load config failed: {source}"))]
    Config {
        /// source error
        source: ConfigError,
    },

    /// Call api failed
    #[snafu(display("call api failed: {source}"))]
    CallAPIFailed {
        /// source error
        source: APIError,
    },

    /// Received invalid websocket gateway url address
    #[snafu(display("invalid gateway url {url}"))]
    InvalidGatewayURL {
        /// received url
        url: String,
        /// source error
        source: ParseGatewayURLError,
    },
}
