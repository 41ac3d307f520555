//! REST api payload types

use serde::{Deserialize, Serialize};

/// Error response body
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorBody {
    /// human readable error message
    #[serde(default)]
    pub error: String,
    /// api error code
    pub code: Option<i64>,
    /// seconds to wait before retry, only on 429
    pub retry_after: Option<f64>,
    /// the limit applies to every route, only on 429
    pub global: Option<bool>,
}

/// User object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// user id
    pub id: String,
    /// user name
    pub username: String,
    /// is a bot account
    #[serde(default)]
    pub bot: bool,
}

/// Server object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// server id
    pub id: String,
    /// server name
    pub name: String,
    /// owner user id
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// Channel object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// channel id
    pub id: String,
    /// channel name
    pub name: String,
    /// owning server, absent for direct channels
    #[serde(default)]
    pub server_id: Option<String>,
    /// channel type
    #[serde(rename = "type", default)]
    pub kind: i64,
    /// channel topic
    #[serde(default)]
    pub topic: Option<String>,
}

/// Body for create/edit channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelParams {
    /// channel name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// channel type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<i64>,
    /// channel topic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Message object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// message id
    pub id: String,
    /// channel id
    pub channel_id: String,
    /// author
    pub author: User,
    /// text content
    #[serde(default)]
    pub content: String,
    /// creation time, milliseconds since epoch
    #[serde(default)]
    pub timestamp: i64,
}

/// Body for send/edit message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageParams {
    /// text content
    pub content: String,
    /// random string echoed back in the created message event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl MessageParams {
    /// message with text content only
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            nonce: None,
        }
    }
}
