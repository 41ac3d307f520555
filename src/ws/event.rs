//! Notifications surfaced by a gateway connection.

use std::task::Poll;

use enum_as_inner::EnumAsInner;
use futures_util::Stream;
use snafu::prelude::*;
use tokio::sync::mpsc;

use super::client::ConnectGatewayError;
use super::message::{Dispatch, FrameStreamError, ParseFrameError, Ready};

/// Error reported by a gateway connection, none of them stops the connection by itself
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum GatewayError {
    /// open websocket connection failed
    #[snafu(display("connect gateway failed: {source}"))]
    Connect {
        /// source error
        source: ConnectGatewayError,
    },

    /// underlying websocket broken
    #[snafu(display("gateway transport broken: {source}"))]
    Transport {
        /// source error
        source: FrameStreamError,
    },

    /// received frame can't be understood
    #[snafu(display("gateway protocol error: {source}"))]
    Protocol {
        /// source error
        source: ParseFrameError,
    },

    /// write frame to gateway failed
    #[snafu(display("send frame to gateway failed: {source}"))]
    SendFrame {
        /// source error
        source: FrameStreamError,
    },
}

/// Connection lost notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect {
    /// close code, `None` when the socket dropped without one
    pub code: Option<u16>,
}

/// Gateway connection notification
#[derive(Debug, EnumAsInner)]
pub enum GatewayEvent {
    /// handshake completed
    Ready(Box<Ready>),
    /// application event
    Dispatch(Dispatch),
    /// connection lost unexpectedly, a reconnect is scheduled
    Disconnected(Disconnect),
    /// something went wrong, connection keeps going
    Error(GatewayError),
}

/// Gateway notification stream
#[derive(Debug)]
pub struct EventStream {
    pub(crate) rx: mpsc::UnboundedReceiver<GatewayEvent>,
}

impl EventStream {
    /// Receive next notification, `None` when the connection is gone
    pub async fn recv(&mut self) -> Option<GatewayEvent> {
        self.rx.recv().await
    }

    /// Receive a notification if one is ready
    pub fn try_recv(&mut self) -> Option<GatewayEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = GatewayEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
