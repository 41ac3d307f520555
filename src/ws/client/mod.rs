//! Gateway connection: handshake, heartbeat and reconnect with backoff.

mod backoff;
#[cfg(test)]
pub(crate) mod fake;
mod heartbeat;
mod session;
mod state;

pub use state::ConnectionState;

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures_util::{Sink, Stream};
use snafu::prelude::*;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite as websocket;

use super::event::{EventStream, GatewayError, GatewayEvent};
use super::gateway::{GatewayUrl, ParseGatewayURLError};
use super::message::{
    Dispatch, Frame, FrameStreamError, FrameStreamSink, Identify, Outbound, Ready,
};
use crate::config::Config;
use session::Session;

pub(crate) type WebsocketClient =
    websocket::WebSocketStream<websocket::MaybeTlsStream<tokio::net::TcpStream>>;

/// Close code sent on an intentional disconnect
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code sent when heartbeats stop being acknowledged
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4000;
/// Close code sent when no ready frame arrives in time
pub const CLOSE_HANDSHAKE_TIMEOUT: u16 = 4001;

/// How long [`Connection::disconnect`] waits for the session to close the socket
const CLOSE_WAIT: Duration = Duration::from_secs(5);

/// Error when connect to websocket gateway
#[derive(Debug, Snafu)]
#[snafu(
    display("connect ws gateway {url} failed: {source}"),
    visibility(pub(crate)),
    module(error),
    context(suffix(false))
)]
pub struct ConnectGatewayError {
    /// connected url
    pub url: String,
    /// source error
    #[snafu(source(from(websocket::tungstenite::Error, Box::new)))]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Opens a socket speaking gateway frames
#[async_trait::async_trait]
pub trait Connector: std::fmt::Debug + Send + Sync + 'static {
    /// the frame stream/sink
    type Socket: Stream<Item = Result<Frame, FrameStreamError>>
        + Sink<Outbound, Error = FrameStreamError>
        + Send
        + Unpin
        + 'static;

    /// open a socket to `gateway`
    async fn connect(&self, gateway: &GatewayUrl) -> Result<Self::Socket, ConnectGatewayError>;
}

/// Connector over a real websocket
#[derive(Debug, Clone, Copy, Default)]
pub struct WebsocketConnector;

#[async_trait::async_trait]
impl Connector for WebsocketConnector {
    type Socket = FrameStreamSink;

    async fn connect(&self, gateway: &GatewayUrl) -> Result<Self::Socket, ConnectGatewayError> {
        let u = gateway.url();

        log::debug!("Connecting gateway: {}", u);

        let ws = websocket::connect_async(u.as_str())
            .await
            .map(|(client, _)| client)
            .with_context(|_| error::ConnectGateway { url: u.as_str() })?;

        Ok(FrameStreamSink::new(ws, gateway.compress))
    }
}

#[derive(Debug)]
struct SessionHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Inner {
    state: ConnectionState,
    intentional_close: bool,
    attempts: u32,
    sequence: Option<u64>,
    // bumped on every disconnect, sessions and timers of older generations are stale
    generation: u64,
    session: Option<SessionHandle>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl Inner {
    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }

        if !self.state.can_transition_to(next) {
            log::warn!("Unexpected gateway state change {:?} -> {:?}", self.state, next);
        }

        log::debug!("Gateway state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

#[derive(Debug)]
struct Shared<C> {
    connector: C,
    gateway: GatewayUrl,
    identify: Identify,
    handshake_timeout: Duration,
    events: mpsc::UnboundedSender<GatewayEvent>,
    inner: Mutex<Inner>,
}

impl<C: Connector> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: GatewayEvent) -> bool {
        self.events.send(event).is_ok()
    }

    fn report(&self, err: GatewayError) {
        log::warn!("Gateway error: {}", err);
        self.emit(GatewayEvent::Error(err));
    }

    fn sequence(&self) -> Option<u64> {
        self.lock().sequence
    }

    fn start_session(self: &Arc<Self>, inner: &mut Inner) {
        inner.set_state(ConnectionState::Connecting);

        let (shutdown, rx) = oneshot::channel();
        let session = Session::new(Arc::clone(self), inner.generation);
        let task = tokio::spawn(session.run(rx));

        inner.session = Some(SessionHandle { shutdown, task });
    }

    /// Returns false if the session is stale and should stop
    fn on_ready(&self, generation: u64, ready: Ready) -> bool {
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return false;
            }
            inner.set_state(ConnectionState::Connected);
            inner.attempts = 0;
        }

        log::info!("Gateway ready");

        self.emit(GatewayEvent::Ready(Box::new(ready))) || self.abandon(generation)
    }

    /// Returns false if the session is stale and should stop
    fn on_dispatch(&self, generation: u64, dispatch: Dispatch) -> bool {
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return false;
            }
            if let Some(s) = dispatch.sequence {
                if inner.sequence < Some(s) {
                    inner.sequence = Some(s);
                }
            }
        }

        log::trace!("Dispatch event {}", dispatch.name);

        self.emit(GatewayEvent::Dispatch(dispatch)) || self.abandon(generation)
    }

    // nobody listens anymore, stop without reconnect
    fn abandon(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation == generation {
            log::debug!("Event receiver dropped, stop gateway connection");
            inner.intentional_close = true;
            inner.sequence = None;
            inner.set_state(ConnectionState::Disconnected);
        }
        false
    }

    fn on_closed(self: &Arc<Self>, generation: u64, code: Option<u16>) {
        let mut inner = self.lock();

        if inner.generation != generation || inner.intentional_close {
            log::debug!("Gateway closed intentionally, no reconnect");
            return;
        }

        inner.set_state(ConnectionState::Reconnecting);
        inner.sequence = None;

        let delay = backoff::reconnect_delay(inner.attempts);
        inner.attempts += 1;

        log::warn!(
            "Gateway closed unexpectedly with code {:?}, reconnect attempt {} in {:?}",
            code,
            inner.attempts,
            delay
        );

        if !self.emit(GatewayEvent::Disconnected(super::event::Disconnect { code })) {
            drop(inner);
            self.abandon(generation);
            return;
        }

        let shared = Arc::clone(self);
        inner.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.reconnect(generation);
        }));
    }

    fn reconnect(self: &Arc<Self>, generation: u64) {
        let mut inner = self.lock();

        if inner.intentional_close
            || inner.generation != generation
            || inner.state != ConnectionState::Reconnecting
        {
            log::debug!("Skip stale reconnect");
            return;
        }

        log::info!("Reconnecting gateway, attempt {}", inner.attempts);

        inner.reconnect_timer = None;
        self.start_session(&mut inner);
    }
}

/// A self-healing gateway connection.
///
/// After [`connect`](Connection::connect) the connection identifies, keeps the heartbeat
/// going and reconnects with exponential backoff whenever the socket is lost, until
/// [`disconnect`](Connection::disconnect) is called. Notifications arrive on the
/// [`EventStream`] returned on construction.
#[derive(Debug)]
pub struct Connection<C: Connector = WebsocketConnector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for Connection<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Connection {
    /// Create a websocket connection to the gateway in `config`
    pub fn new(config: &Config) -> Result<(Self, EventStream), ParseGatewayURLError> {
        let gateway = config.gateway_url.parse()?;
        Ok(Self::with_connector(WebsocketConnector, gateway, config))
    }
}

impl<C: Connector> Connection<C> {
    /// Create a connection using a custom connector
    pub fn with_connector(connector: C, gateway: GatewayUrl, config: &Config) -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            connector,
            gateway,
            identify: Identify::from_config(config),
            handshake_timeout: config.handshake_timeout,
            events: tx,
            inner: Mutex::default(),
        });

        (Self { shared }, EventStream { rx })
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Last seen dispatch sequence number of the current session
    pub fn sequence(&self) -> Option<u64> {
        self.shared.sequence()
    }

    /// Reconnect attempts since the last successful handshake
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().attempts
    }

    /// Start connecting.
    ///
    /// Does nothing when already connecting or connected. When a reconnect is pending,
    /// it happens now instead of after the backoff delay.
    pub fn connect(&self) {
        let mut inner = self.shared.lock();

        match inner.state {
            ConnectionState::Disconnected => {
                inner.intentional_close = false;
                inner.attempts = 0;
            }
            ConnectionState::Reconnecting => {
                if let Some(timer) = inner.reconnect_timer.take() {
                    timer.abort();
                }
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                log::debug!("Gateway already {:?}, connect ignored", inner.state);
                return;
            }
        }

        log::info!("Connecting gateway {}", self.shared.gateway.host());

        self.shared.start_session(&mut inner);
    }

    /// Close the connection with a normal close code and cancel any pending reconnect.
    ///
    /// No reconnect happens afterwards until [`connect`](Connection::connect) is called again.
    pub async fn disconnect(&self) {
        let (session, timer) = {
            let mut inner = self.shared.lock();
            inner.intentional_close = true;
            inner.generation += 1;
            inner.sequence = None;
            inner.set_state(ConnectionState::Disconnected);
            (inner.session.take(), inner.reconnect_timer.take())
        };

        if let Some(timer) = timer {
            log::debug!("Cancel pending reconnect");
            timer.abort();
        }

        if let Some(SessionHandle { shutdown, mut task }) = session {
            // session already gone if the receiver is dropped
            let _ = shutdown.send(());

            if tokio::time::timeout(CLOSE_WAIT, &mut task).await.is_err() {
                log::warn!("Gateway session did not close in {:?}, abort it", CLOSE_WAIT);
                task.abort();
            }
        }

        log::info!("Gateway disconnected");
    }
}
