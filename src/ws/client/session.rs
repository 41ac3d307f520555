use std::{sync::Arc, time::Duration};

use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use snafu::{IntoError, ResultExt};
use tokio::{sync::oneshot, time::Instant};

use super::heartbeat::{Beat, Heartbeat};
use super::{Connector, Shared, CLOSE_HANDSHAKE_TIMEOUT, CLOSE_HEARTBEAT_TIMEOUT, CLOSE_NORMAL};
use crate::ws::event::error;
use crate::ws::message::{Frame, FrameStreamError, OpCode, Outbound};

type FrameSink<C> = SplitSink<<C as Connector>::Socket, Outbound>;

/// One socket lifetime: connect, identify, then heartbeat and read frames until closed
pub(super) struct Session<C: Connector> {
    shared: Arc<Shared<C>>,
    generation: u64,
}

impl<C: Connector> Session<C> {
    pub fn new(shared: Arc<Shared<C>>, generation: u64) -> Self {
        Self { shared, generation }
    }

    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let shared = Arc::clone(&self.shared);

        let socket = tokio::select! {
            biased;

            _ = &mut shutdown => {
                log::debug!("Shutdown before gateway connected");
                return;
            }

            result = shared.connector.connect(&shared.gateway) => result,
        };

        let socket = match socket {
            Ok(socket) => socket,
            Err(err) => {
                shared.report(error::Connect.into_error(err));
                shared.on_closed(self.generation, None);
                return;
            }
        };

        let (mut sink, mut stream) = socket.split();

        log::debug!("Gateway socket opened, send identify");

        let identify = Outbound::Frame(Frame::identify(&shared.identify));
        if !self.send(&mut sink, identify).await {
            shared.on_closed(self.generation, None);
            return;
        }

        let handshake_deadline = Instant::now() + shared.handshake_timeout;
        let mut heartbeat: Option<Heartbeat> = None;

        loop {
            let tick = heartbeat
                .as_ref()
                .map_or(handshake_deadline, Heartbeat::next_beat);

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    log::debug!("Shutdown requested, close gateway socket");
                    if let Err(err) = sink.send(Outbound::close(CLOSE_NORMAL)).await {
                        log::debug!("Send close frame failed: {}", err);
                    }
                    return;
                }

                _ = tokio::time::sleep_until(tick) => {
                    let hb = match heartbeat.as_mut() {
                        Some(hb) => hb,
                        None => {
                            log::warn!("No ready frame in {:?}", shared.handshake_timeout);
                            self.close(&mut sink, CLOSE_HANDSHAKE_TIMEOUT).await;
                            return;
                        }
                    };

                    match hb.tick() {
                        Beat::Send => {
                            log::trace!("Send heartbeat");
                            let beat = Outbound::Frame(Frame::heartbeat(shared.sequence()));
                            if !self.send(&mut sink, beat).await {
                                shared.on_closed(self.generation, None);
                                return;
                            }
                        }
                        Beat::Dead => {
                            log::warn!("{} heartbeats not acknowledged, connection is dead", hb.missed());
                            self.close(&mut sink, CLOSE_HEARTBEAT_TIMEOUT).await;
                            return;
                        }
                    }
                }

                item = stream.next() => match item {
                    None => {
                        log::debug!("Gateway frame stream ended");
                        shared.on_closed(self.generation, None);
                        return;
                    }
                    Some(Err(FrameStreamError::Closed { code })) => {
                        log::debug!("Gateway socket closed by peer, code {:?}", code);
                        shared.on_closed(self.generation, code);
                        return;
                    }
                    Some(Err(FrameStreamError::NotBinaryFrame)) => {
                        log::warn!("Non-binary frame dropped");
                    }
                    Some(Err(FrameStreamError::ParseFrameFailed { source })) => {
                        shared.report(error::Protocol.into_error(source));
                    }
                    Some(Err(err)) => {
                        shared.report(error::Transport.into_error(err));
                    }
                    Some(Ok(frame)) => {
                        if !self.handle(frame, &mut heartbeat, &mut sink).await {
                            if let Err(err) = sink.send(Outbound::close(CLOSE_NORMAL)).await {
                                log::debug!("Send close frame failed: {}", err);
                            }
                            return;
                        }
                    }
                },
            }
        }
    }

    /// Returns false when the session should stop
    async fn handle(
        &self,
        frame: Frame,
        heartbeat: &mut Option<Heartbeat>,
        sink: &mut FrameSink<C>,
    ) -> bool {
        let shared = &self.shared;

        match frame.op {
            OpCode::Ready => {
                if heartbeat.is_some() {
                    log::warn!("Duplicate ready frame ignored");
                    return true;
                }

                match frame.ready() {
                    Ok(ready) => {
                        let interval = ready.heartbeat_interval_ms;
                        log::debug!("Heartbeat interval {}ms", interval);
                        *heartbeat = Some(Heartbeat::new(Duration::from_millis(interval)));
                        return shared.on_ready(self.generation, ready);
                    }
                    Err(err) => shared.report(error::Protocol.into_error(err)),
                }
            }
            OpCode::HeartbeatAck => match heartbeat {
                Some(hb) => hb.ack(),
                None => log::debug!("Heartbeat ack before ready ignored"),
            },
            OpCode::Heartbeat => {
                log::debug!("Gateway requested a heartbeat");
                let beat = Outbound::Frame(Frame::heartbeat(shared.sequence()));
                if !self.send(sink, beat).await {
                    shared.on_closed(self.generation, None);
                    return false;
                }
            }
            OpCode::Dispatch => match frame.into_dispatch() {
                Ok(dispatch) => return shared.on_dispatch(self.generation, dispatch),
                Err(err) => shared.report(error::Protocol.into_error(err)),
            },
            OpCode::Identify => log::warn!("Unexpected identify frame from gateway"),
        }

        true
    }

    async fn send(&self, sink: &mut FrameSink<C>, item: Outbound) -> bool {
        match sink.send(item).await.context(error::SendFrame) {
            Ok(()) => true,
            Err(err) => {
                self.shared.report(err);
                false
            }
        }
    }

    async fn close(&self, sink: &mut FrameSink<C>, code: u16) {
        if let Err(err) = sink.send(Outbound::close(code)).await {
            log::debug!("Send close frame failed: {}", err);
        }
        self.shared.on_closed(self.generation, Some(code));
    }
}
