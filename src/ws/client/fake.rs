//! In-memory gateway for connection tests.

use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use futures_util::{Sink, Stream};
use serde_json::json;
use tokio::sync::mpsc;

use super::{ConnectGatewayError, Connector};
use crate::ws::gateway::GatewayUrl;
use crate::ws::message::{Frame, FrameStreamError, OpCode, Outbound};

pub(crate) fn ready_frame(interval_ms: u64) -> Frame {
    Frame::new(
        OpCode::Ready,
        json!({
            "user": {"id": "1", "username": "bot", "bot": true},
            "servers": [],
            "heartbeat_interval_ms": interval_ms,
        }),
    )
}

#[derive(Debug)]
pub(crate) struct FakeSocket {
    incoming: mpsc::UnboundedReceiver<Result<Frame, FrameStreamError>>,
    outgoing: mpsc::UnboundedSender<Outbound>,
}

impl Stream for FakeSocket {
    type Item = Result<Frame, FrameStreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.incoming.poll_recv(cx)
    }
}

impl Sink<Outbound> for FakeSocket {
    type Error = FrameStreamError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Outbound) -> Result<(), Self::Error> {
        self.outgoing
            .send(item)
            .map_err(|_| FrameStreamError::Closed { code: None })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Server side of one accepted socket
#[derive(Debug)]
pub(crate) struct FakeServer {
    to_client: mpsc::UnboundedSender<Result<Frame, FrameStreamError>>,
    from_client: mpsc::UnboundedReceiver<Outbound>,
}

impl FakeServer {
    /// next item written by the client, `None` once the client dropped the socket
    pub async fn next(&mut self) -> Option<Outbound> {
        self.from_client.recv().await
    }

    pub async fn next_frame(&mut self) -> Frame {
        match self.next().await {
            Some(Outbound::Frame(frame)) => frame,
            other => panic!("expect a frame, got {other:?}"),
        }
    }

    pub fn send(&self, frame: Frame) {
        let _ = self.to_client.send(Ok(frame));
    }

    pub fn send_err(&self, err: FrameStreamError) {
        let _ = self.to_client.send(Err(err));
    }

    pub fn close(&self, code: Option<u16>) {
        self.send_err(FrameStreamError::Closed { code });
    }

    /// stop reading, later client writes fail while the read half stays open
    pub fn stop_reading(&mut self) {
        self.from_client.close();
    }

    /// wait identify, answer ready
    pub async fn handshake(&mut self, interval_ms: u64) -> Frame {
        let identify = self.next_frame().await;
        assert_eq!(identify.op, OpCode::Identify);
        self.send(ready_frame(interval_ms));
        identify
    }
}

/// Test side of a [`FakeConnector`]
#[derive(Debug)]
pub(crate) struct FakeGateway {
    servers: mpsc::UnboundedReceiver<FakeServer>,
    attempts: Arc<AtomicUsize>,
}

impl FakeGateway {
    pub async fn accept(&mut self) -> FakeServer {
        self.servers.recv().await.expect("connector dropped")
    }

    /// connect calls so far, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub(crate) struct FakeConnector {
    servers: mpsc::UnboundedSender<FakeServer>,
    attempts: Arc<AtomicUsize>,
    failures: AtomicUsize,
    hang: bool,
}

impl FakeConnector {
    pub fn new() -> (Self, FakeGateway) {
        Self::failing(0)
    }

    /// first `failures` connect calls fail
    pub fn failing(failures: usize) -> (Self, FakeGateway) {
        Self::build(failures, false)
    }

    /// connect calls never complete
    pub fn hanging() -> (Self, FakeGateway) {
        Self::build(0, true)
    }

    fn build(failures: usize, hang: bool) -> (Self, FakeGateway) {
        let (tx, rx) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicUsize::new(0));

        (
            Self {
                servers: tx,
                attempts: Arc::clone(&attempts),
                failures: AtomicUsize::new(failures),
                hang,
            },
            FakeGateway {
                servers: rx,
                attempts,
            },
        )
    }
}

#[async_trait::async_trait]
impl Connector for FakeConnector {
    type Socket = FakeSocket;

    async fn connect(&self, gateway: &GatewayUrl) -> Result<FakeSocket, ConnectGatewayError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.hang {
            std::future::pending::<()>().await;
        }

        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ConnectGatewayError {
                url: gateway.url().to_string(),
                source: "connection refused".into(),
            });
        }

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();

        let _ = self.servers.send(FakeServer {
            to_client,
            from_client,
        });

        Ok(FakeSocket { incoming, outgoing })
    }
}
