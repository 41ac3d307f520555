//! Client configuration.

use std::time::Duration;

use snafu::prelude::*;

/// Crate version, sent as part of the user agent and the identify metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Error when build config from environment
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ConfigError {
    /// required environment variable is missing or not unicode
    #[snafu(display("environment variable {name} is missing or invalid"))]
    MissingEnv {
        /// variable name
        name: &'static str,
        /// source error
        source: std::env::VarError,
    },

    /// environment variable can't be parsed
    #[snafu(display("environment variable {name} has invalid value {value:?}"))]
    InvalidEnv {
        /// variable name
        name: &'static str,
        /// received value
        value: String,
    },
}

/// Client metadata sent in the identify frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProperties {
    /// operating system name
    pub os: String,
    /// client library name
    pub client_name: String,
    /// device name
    pub device: String,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            device: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

/// Immutable configuration, built once at startup and shared by the REST client
/// and the gateway connection.
#[derive(Debug, Clone)]
pub struct Config {
    /// bot token
    pub token: String,
    /// REST api base url, without trailing slash
    pub api_base_url: String,
    /// gateway websocket url
    pub gateway_url: String,
    /// max retry count of one logical REST call
    pub max_retries: u32,
    /// deadline of one HTTP round trip
    pub request_timeout: Duration,
    /// deadline for the Ready frame after Identify is sent
    pub handshake_timeout: Duration,
    /// identify metadata
    pub properties: ClientProperties,
    /// HTTP user agent
    pub user_agent: String,
}

impl Config {
    /// Create config with default tunables.
    pub fn new<T, A, G>(token: T, api_base_url: A, gateway_url: G) -> Self
    where
        T: Into<String>,
        A: Into<String>,
        G: Into<String>,
    {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();

        Self {
            token: token.into(),
            api_base_url,
            gateway_url: gateway_url.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            properties: ClientProperties::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Build config from `BOT_TOKEN`, `API_BASE_URL` and `GATEWAY_URL`,
    /// `MAX_RETRIES` is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("BOT_TOKEN").context(error::MissingEnv { name: "BOT_TOKEN" })?;
        let api = std::env::var("API_BASE_URL").context(error::MissingEnv {
            name: "API_BASE_URL",
        })?;
        let gateway = std::env::var("GATEWAY_URL").context(error::MissingEnv {
            name: "GATEWAY_URL",
        })?;

        let mut config = Self::new(token, api, gateway);

        if let Ok(value) = std::env::var("MAX_RETRIES") {
            config.max_retries = value.parse().map_err(|_| {
                error::InvalidEnv {
                    name: "MAX_RETRIES",
                    value: value.clone(),
                }
                .build()
            })?;
        }

        Ok(config)
    }

    /// Set max retry count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set HTTP request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set gateway handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set identify metadata
    pub fn with_properties(mut self, properties: ClientProperties) -> Self {
        self.properties = properties;
        self
    }
}
