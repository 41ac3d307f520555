use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use snafu::prelude::*;

use super::error::variant::{SerializeBodyFailed, UnknownHTTP};
use super::types::*;
use super::{validate_id, Client, Result, Route};

/// Upper bound of `limit` in message listing
const MAX_MESSAGE_PAGE: u32 = 100;

fn empty_body(path: String) -> super::Error {
    UnknownHTTP {
        status_code: reqwest::StatusCode::NO_CONTENT,
        message: format!("empty body for {path}"),
        code: None,
    }
    .build()
}

impl Client {
    async fn fetch<R: DeserializeOwned>(&self, route: Route) -> Result<R> {
        let path = route.path().to_string();
        self.request(route, None)
            .await?
            .ok_or_else(|| empty_body(path))
    }

    async fn submit<R, B>(&self, route: Route, body: &B) -> Result<R>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let path = route.path().to_string();
        let body = serde_json::to_value(body).context(SerializeBodyFailed)?;
        self.request(route, Some(body))
            .await?
            .ok_or_else(|| empty_body(path))
    }

    async fn delete(&self, route: Route) -> Result<()> {
        self.request::<serde_json::Value>(route, None).await?;
        Ok(())
    }

    /// Get the bot user
    pub async fn current_user(&self) -> Result<User> {
        self.fetch(Route::new(Method::GET, "/users/@me")).await
    }

    /// Get a server the bot is in
    pub async fn server(&self, server_id: &str) -> Result<Server> {
        let server_id = validate_id("server", server_id)?;
        self.fetch(Route::new(Method::GET, format!("/servers/{server_id}")))
            .await
    }

    /// List channels of a server
    pub async fn server_channels(&self, server_id: &str) -> Result<Vec<Channel>> {
        let server_id = validate_id("server", server_id)?;
        self.fetch(Route::new(
            Method::GET,
            format!("/servers/{server_id}/channels"),
        ))
        .await
    }

    /// Leave a server
    pub async fn leave_server(&self, server_id: &str) -> Result<()> {
        let server_id = validate_id("server", server_id)?;
        self.delete(Route::new(
            Method::DELETE,
            format!("/users/@me/servers/{server_id}"),
        ))
        .await
    }

    /// Get a channel
    pub async fn channel(&self, channel_id: &str) -> Result<Channel> {
        let channel_id = validate_id("channel", channel_id)?;
        self.fetch(Route::new(Method::GET, format!("/channels/{channel_id}")))
            .await
    }

    /// Create a channel in a server
    pub async fn create_channel(&self, server_id: &str, params: &ChannelParams) -> Result<Channel> {
        let server_id = validate_id("server", server_id)?;
        self.submit(
            Route::new(Method::POST, format!("/servers/{server_id}/channels")),
            params,
        )
        .await
    }

    /// Edit a channel
    pub async fn edit_channel(&self, channel_id: &str, params: &ChannelParams) -> Result<Channel> {
        let channel_id = validate_id("channel", channel_id)?;
        self.submit(
            Route::new(Method::PATCH, format!("/channels/{channel_id}")),
            params,
        )
        .await
    }

    /// Delete a channel
    pub async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        let channel_id = validate_id("channel", channel_id)?;
        self.delete(Route::new(Method::DELETE, format!("/channels/{channel_id}")))
            .await
    }

    /// List latest messages of a channel, `limit` is capped to 100
    pub async fn messages(&self, channel_id: &str, limit: u32) -> Result<Vec<Message>> {
        let channel_id = validate_id("channel", channel_id)?;
        let limit = limit.clamp(1, MAX_MESSAGE_PAGE);
        self.fetch(Route::new(
            Method::GET,
            format!("/channels/{channel_id}/messages?limit={limit}"),
        ))
        .await
    }

    /// Get a message
    pub async fn message(&self, channel_id: &str, message_id: &str) -> Result<Message> {
        let channel_id = validate_id("channel", channel_id)?;
        let message_id = validate_id("message", message_id)?;
        self.fetch(Route::new(
            Method::GET,
            format!("/channels/{channel_id}/messages/{message_id}"),
        ))
        .await
    }

    /// Send a message to a channel
    pub async fn send_message(&self, channel_id: &str, params: &MessageParams) -> Result<Message> {
        let channel_id = validate_id("channel", channel_id)?;
        self.submit(
            Route::new(Method::POST, format!("/channels/{channel_id}/messages")),
            params,
        )
        .await
    }

    /// Edit a message
    pub async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        params: &MessageParams,
    ) -> Result<Message> {
        let channel_id = validate_id("channel", channel_id)?;
        let message_id = validate_id("message", message_id)?;
        self.submit(
            Route::new(
                Method::PATCH,
                format!("/channels/{channel_id}/messages/{message_id}"),
            ),
            params,
        )
        .await
    }

    /// Delete a message
    pub async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
        let channel_id = validate_id("channel", channel_id)?;
        let message_id = validate_id("message", message_id)?;
        self.delete(Route::new(
            Method::DELETE,
            format!("/channels/{channel_id}/messages/{message_id}"),
        ))
        .await
    }
}
