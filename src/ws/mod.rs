//! Gateway (websocket) protocol client

mod client;
mod event;
mod gateway;
pub mod message;

pub use client::{
    ConnectGatewayError, Connection, ConnectionState, Connector, WebsocketConnector,
    CLOSE_HANDSHAKE_TIMEOUT, CLOSE_HEARTBEAT_TIMEOUT, CLOSE_NORMAL,
};
pub use event::{Disconnect, EventStream, GatewayError, GatewayEvent};
pub use gateway::{GatewayUrl, ParseGatewayURLError};
pub use message::Dispatch;

#[cfg(test)]
pub(crate) use client::fake;
