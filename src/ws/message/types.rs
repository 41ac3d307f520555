use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Identify frame data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identify {
    /// bot token
    pub token: String,
    /// client metadata
    pub properties: IdentifyProperties,
}

impl Identify {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            token: config.token.clone(),
            properties: IdentifyProperties {
                os: config.properties.os.clone(),
                client_name: config.properties.client_name.clone(),
                device: config.properties.device.clone(),
            },
        }
    }
}

/// Client metadata in identify frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyProperties {
    /// operating system
    pub os: String,
    /// client library name
    pub client_name: String,
    /// device name
    pub device: String,
}

/// Ready frame data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ready {
    /// the bot user
    pub user: serde_json::Value,
    /// servers the bot belongs to
    #[serde(default)]
    pub servers: Vec<serde_json::Value>,
    /// heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u64,
}

/// One dispatched application event
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// event name, verbatim from server
    pub name: String,
    /// sequence number
    pub sequence: Option<u64>,
    /// event data
    pub data: serde_json::Value,
}
