use std::task::Poll;

use bytes::Bytes;
use futures_util::{ready, Sink, SinkExt, Stream, StreamExt};
use snafu::prelude::*;
use tokio_tungstenite::tungstenite as websocket;

use super::{Frame, ParseFrameError};
use crate::ws::client::WebsocketClient;

/// Error when read/write frame stream/sink
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum FrameStreamError {
    /// underlying websocket stream broken
    #[snafu(display("underlying websocket stream broken: {source}"))]
    Websocket {
        /// source error
        source: websocket::Error,
    },

    /// received an non-binary frame
    #[snafu(display("received a non-binary type frame"))]
    NotBinaryFrame,

    /// parse binary data failed
    #[snafu(display("parse binary data to frame failed: {source}"))]
    ParseFrameFailed {
        /// source error
        source: ParseFrameError,
    },

    /// peer closed the connection
    #[snafu(display("connection closed with code {code:?}"))]
    Closed {
        /// close code, if peer sent one
        code: Option<u16>,
    },
}

impl FrameStreamError {
    /// Check if this error will make the stream/sink stop
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Websocket { .. } | Self::Closed { .. } => true,
            Self::NotBinaryFrame | Self::ParseFrameFailed { .. } => false,
        }
    }
}

/// Item written to a frame sink
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// a gateway frame
    Frame(Frame),
    /// a close frame with code
    Close {
        /// close code
        code: u16,
        /// close reason
        reason: String,
    },
}

impl Outbound {
    /// close with code and empty reason
    pub fn close(code: u16) -> Self {
        Self::Close {
            code,
            reason: String::new(),
        }
    }
}

/// Gateway frame stream/sink over a websocket connection
#[derive(Debug)]
pub struct FrameStreamSink {
    ws: WebsocketClient,
    compress: bool,
    finished: bool,
}

impl FrameStreamSink {
    /// Construct a new stream with underlying websocket connection.
    ///
    /// the `compress` argument controls if the stream will decompress binary data
    /// before parse it to frame.
    pub fn new(ws: WebsocketClient, compress: bool) -> Self {
        Self {
            ws,
            compress,
            finished: false,
        }
    }

    fn decode(&self, buffer: Bytes) -> Result<Frame, FrameStreamError> {
        Frame::decode(buffer.clone(), self.compress).map_err(|e| {
            log::trace!(
                "Parse failed frame data: {}",
                std::str::from_utf8(&buffer).unwrap_or("<not-utf8-binary>")
            );
            FrameStreamError::ParseFrameFailed { source: e }
        })
    }
}

impl Stream for FrameStreamSink {
    type Item = Result<Frame, FrameStreamError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        loop {
            let result = match ready!(self.ws.poll_next_unpin(cx)) {
                None => {
                    self.finished = true;
                    return Poll::Ready(None);
                }
                Some(Err(
                    websocket::Error::ConnectionClosed | websocket::Error::AlreadyClosed,
                )) => Err(FrameStreamError::Closed { code: None }),
                Some(Err(e)) => Err(FrameStreamError::Websocket { source: e }),
                Some(Ok(websocket::Message::Binary(data))) => self.decode(data.into()),
                Some(Ok(websocket::Message::Close(frame))) => Err(FrameStreamError::Closed {
                    code: frame.map(|f| f.code.into()),
                }),
                Some(Ok(websocket::Message::Ping(_) | websocket::Message::Pong(_))) => {
                    log::trace!("Skip websocket control frame");
                    continue;
                }
                Some(Ok(_)) => Err(FrameStreamError::NotBinaryFrame),
            };

            if matches!(&result, Err(e) if e.is_fatal()) {
                self.finished = true;
            }

            return Poll::Ready(Some(result));
        }
    }
}

impl Sink<Outbound> for FrameStreamSink {
    type Error = FrameStreamError;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_ready_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn start_send(mut self: std::pin::Pin<&mut Self>, item: Outbound) -> Result<(), Self::Error> {
        let message = match item {
            Outbound::Frame(frame) => websocket::Message::Binary(frame.encode()),
            Outbound::Close { code, reason } => {
                websocket::Message::Close(Some(websocket::protocol::CloseFrame {
                    code: code.into(),
                    reason: reason.into(),
                }))
            }
        };

        self.ws
            .start_send_unpin(message)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_flush_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_close_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }
}
