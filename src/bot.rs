use std::{borrow::Cow, future::Future};

use serde_json::{json, Value};
use snafu::prelude::*;

use crate::{
    api,
    config::Config,
    error,
    listener::Listeners,
    ws::{self, Connector, GatewayEvent, WebsocketConnector},
    Result,
};

/// Listener name of the handshake completed event
pub const EVENT_READY: &str = "ready";
/// Listener name of the connection lost event
pub const EVENT_DISCONNECT: &str = "disconnect";
/// Listener name of gateway errors
pub const EVENT_ERROR: &str = "error";

/// Bot instance, owns the api client, the gateway connection and the listeners
#[derive(Debug)]
pub struct Bot<C: Connector = WebsocketConnector> {
    api: api::Client,
    connection: ws::Connection<C>,
    events: ws::EventStream,
    listeners: Listeners,
}

impl Bot {
    /// Create bot from config
    pub fn new(config: Config) -> Result<Self> {
        let api = api::Client::new(&config).context(error::CallAPIFailed)?;

        let (connection, events) = ws::Connection::new(&config).with_context(|_| {
            error::InvalidGatewayURL {
                url: &config.gateway_url,
            }
        })?;

        log::info!("Create api and gateway client success");

        Ok(Self::from_parts(api, connection, events))
    }

    /// Create bot from `BOT_TOKEN`, `API_BASE_URL` and `GATEWAY_URL` env vars
    pub fn from_env() -> Result<Self> {
        let config = Config::from_env().context(error::Config)?;
        Self::new(config)
    }
}

impl<C: Connector> Bot<C> {
    /// Assemble bot from an existing api client and gateway connection
    pub fn from_parts(
        api: api::Client,
        connection: ws::Connection<C>,
        events: ws::EventStream,
    ) -> Self {
        Self {
            api,
            connection,
            events,
            listeners: Listeners::new(),
        }
    }

    /// Register a listener.
    ///
    /// `name` is [`EVENT_READY`], [`EVENT_DISCONNECT`], [`EVENT_ERROR`] or a dispatch
    /// event name as the gateway sends it.
    pub fn on<S, F>(&mut self, name: S, listener: F) -> &mut Self
    where
        S: Into<String>,
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.listeners.on(name, listener);
        self
    }

    /// Api client
    pub fn api(&self) -> &api::Client {
        &self.api
    }

    /// Gateway connection
    pub fn connection(&self) -> &ws::Connection<C> {
        &self.connection
    }

    fn deliver(&self, event: GatewayEvent) {
        let (name, payload): (Cow<'static, str>, Value) = match event {
            GatewayEvent::Ready(ready) => (
                EVENT_READY.into(),
                serde_json::to_value(&*ready).unwrap_or_default(),
            ),
            GatewayEvent::Dispatch(dispatch) => (dispatch.name.into(), dispatch.data),
            GatewayEvent::Disconnected(disconnect) => {
                (EVENT_DISCONNECT.into(), json!({ "code": disconnect.code }))
            }
            GatewayEvent::Error(err) => (EVENT_ERROR.into(), json!({ "message": err.to_string() })),
        };

        let ran = self.listeners.emit(&name, &payload);
        log::trace!("Event {} delivered to {} listeners", name, ran);
    }

    /// Connect and deliver events to listeners until `shutdown` resolves,
    /// then disconnect and reject pending api calls.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        self.connection.connect();

        loop {
            let event = tokio::select! {
                biased;

                _ = &mut shutdown => {
                    log::info!("Shutdown requested");
                    None
                }

                event = self.events.recv() => event,
            };

            match event {
                Some(event) => self.deliver(event),
                None => break,
            }
        }

        self.connection.disconnect().await;
        self.api.shutdown("bot stopped");

        log::info!("Bot stopped");
    }

    /// Run until ctrl-c
    pub async fn run(self) {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::warn!("Listen ctrl-c failed: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}
