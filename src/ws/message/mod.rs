//! Gateway frame types.

mod stream;
mod types;

pub use stream::{FrameStreamError, FrameStreamSink, Outbound};
pub use types::{Dispatch, Identify, IdentifyProperties, Ready};

use bytes::Bytes;
use miniz_oxide::inflate::{self, TINFLStatus};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Error when parse binary data as frame
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ParseFrameError {
    /// Decompress data failed
    #[snafu(display("decompress frame failed: {status:?}"))]
    DecompressFailed {
        /// data for decode
        data: Bytes,
        /// decompress error status code
        status: TINFLStatus,
    },

    /// data is invalid json or has no op field
    #[snafu(display("parse json failed: {source}"))]
    ParseJSONFailed {
        /// data for decode
        data: Bytes,
        /// source error
        source: serde_json::Error,
    },

    /// data has an unknown op code
    #[snafu(display("frame has unknown op code {op}"))]
    UnknownOpCode {
        /// op code
        op: i64,
    },

    /// dispatch frame without event name
    #[snafu(display("dispatch frame has no event name"))]
    NoEventName,

    /// frame data does not fit its op code
    #[snafu(display("parse {op:?} frame data failed: {source}"))]
    InvalidPayload {
        /// op code
        op: OpCode,
        /// source error
        source: serde_json::Error,
    },

    /// ready frame carries a zero heartbeat interval
    #[snafu(display("ready frame has zero heartbeat interval"))]
    ZeroHeartbeatInterval,
}

/// Gateway op code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// application event, server -> client
    Dispatch,
    /// heartbeat, client -> server, server may request one
    Heartbeat,
    /// identify, client -> server
    Identify,
    /// handshake complete, server -> client
    Ready,
    /// heartbeat acknowledge, server -> client
    HeartbeatAck,
}

impl OpCode {
    /// wire number
    pub fn number(self) -> i64 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::Ready => 3,
            Self::HeartbeatAck => 11,
        }
    }

    /// parse wire number
    pub fn from_number(op: i64) -> Option<Self> {
        match op {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            3 => Some(Self::Ready),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawFrame {
    op: i64,
    #[serde(default)]
    d: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    s: Option<u64>,
}

/// One gateway frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// op code
    pub op: OpCode,
    /// op specific data
    pub d: serde_json::Value,
    /// event name, dispatch only
    pub t: Option<String>,
    /// sequence number, dispatch only
    pub s: Option<u64>,
}

impl Frame {
    /// frame with only op and data
    pub fn new(op: OpCode, d: serde_json::Value) -> Self {
        Self {
            op,
            d,
            t: None,
            s: None,
        }
    }

    /// dispatch frame
    pub fn dispatch<S: Into<String>>(name: S, sequence: u64, d: serde_json::Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            d,
            t: Some(name.into()),
            s: Some(sequence),
        }
    }

    /// identify frame
    pub fn identify(identify: &Identify) -> Self {
        Self::new(
            OpCode::Identify,
            serde_json::to_value(identify).unwrap_or_default(),
        )
    }

    /// heartbeat frame carrying last seen sequence number
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, sequence.into())
    }

    /// Parse data of a ready frame
    pub fn ready(&self) -> Result<Ready, ParseFrameError> {
        let ready: Ready = serde_json::from_value(self.d.clone())
            .context(error::InvalidPayload { op: self.op })?;

        ensure!(ready.heartbeat_interval_ms > 0, error::ZeroHeartbeatInterval);

        Ok(ready)
    }

    /// Take the application event out of a dispatch frame
    pub fn into_dispatch(self) -> Result<Dispatch, ParseFrameError> {
        let name = self.t.context(error::NoEventName)?;

        Ok(Dispatch {
            name,
            sequence: self.s,
            data: self.d,
        })
    }

    /// Decode data to a frame
    pub fn decode(mut buff: Bytes, compressed: bool) -> Result<Self, ParseFrameError> {
        if compressed {
            buff = inflate::decompress_to_vec_zlib(&buff)
                .map_err(|status| {
                    error::DecompressFailed {
                        data: buff.clone(),
                        status,
                    }
                    .build()
                })?
                .into();
        }

        let raw: RawFrame =
            serde_json::from_slice(&buff).context(error::ParseJSONFailed { data: buff.clone() })?;

        let op = OpCode::from_number(raw.op).context(error::UnknownOpCode { op: raw.op })?;

        Ok(Self {
            op,
            d: raw.d,
            t: raw.t,
            s: raw.s,
        })
    }

    /// encode frame to binary data(without compress)
    pub fn encode(&self) -> Vec<u8> {
        let raw = RawFrame {
            op: self.op.number(),
            d: self.d.clone(),
            t: self.t.clone(),
            s: self.s,
        };
        // json values with string keys always serialize
        serde_json::to_vec(&raw).unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    mod decode {
        use super::super::*;
        use serde_json::json;

        fn bytes(value: serde_json::Value) -> Bytes {
            serde_json::to_vec(&value).unwrap().into()
        }

        #[test]
        fn test_frame_decode_ready() {
            let frame = Frame::decode(
                bytes(json!({
                    "op": 3,
                    "d": {
                        "user": {"id": "1", "username": "bot"},
                        "servers": [{"id": "10"}],
                        "heartbeat_interval_ms": 41250,
                    },
                })),
                false,
            )
            .unwrap();

            assert_eq!(frame.op, OpCode::Ready);

            let ready = frame.ready().unwrap();
            assert_eq!(ready.heartbeat_interval_ms, 41250);
            assert_eq!(ready.servers.len(), 1);
            assert_eq!(ready.user["username"], "bot");
        }

        #[test]
        fn test_frame_decode_dispatch() {
            let frame = Frame::decode(
                bytes(json!({
                    "op": 0,
                    "t": "MESSAGE_CREATE",
                    "s": 42,
                    "d": {"content": "hi"},
                })),
                false,
            )
            .unwrap();

            assert_eq!(frame.op, OpCode::Dispatch);

            let dispatch = frame.into_dispatch().unwrap();
            assert_eq!(dispatch.name, "MESSAGE_CREATE");
            assert_eq!(dispatch.sequence, Some(42));
            assert_eq!(dispatch.data["content"], "hi");
        }

        #[test]
        fn test_frame_decode_heartbeat_ack() {
            let frame = Frame::decode(bytes(json!({"op": 11})), false).unwrap();

            assert_eq!(frame.op, OpCode::HeartbeatAck);
            assert!(frame.d.is_null());
        }

        #[test]
        fn test_frame_decode_compressed() {
            let data = serde_json::to_vec(&json!({"op": 11})).unwrap();
            let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&data, 6);

            let frame = Frame::decode(compressed.into(), true).unwrap();

            assert_eq!(frame.op, OpCode::HeartbeatAck);
        }

        #[test]
        fn test_frame_decode_unknown_op() {
            let err = Frame::decode(bytes(json!({"op": 7})), false).unwrap_err();
            assert!(matches!(err, ParseFrameError::UnknownOpCode { op: 7 }));
        }

        #[test]
        fn test_frame_decode_garbage() {
            let err = Frame::decode(Bytes::from_static(b"\x00\x01"), false).unwrap_err();
            assert!(matches!(err, ParseFrameError::ParseJSONFailed { .. }));
        }

        #[test]
        fn test_dispatch_without_name() {
            let frame = Frame::decode(bytes(json!({"op": 0, "s": 1, "d": {}})), false).unwrap();
            assert!(matches!(
                frame.into_dispatch().unwrap_err(),
                ParseFrameError::NoEventName
            ));
        }

        #[test]
        fn test_ready_zero_interval_rejected() {
            let frame = Frame::new(
                OpCode::Ready,
                json!({"user": {}, "servers": [], "heartbeat_interval_ms": 0}),
            );
            assert!(matches!(
                frame.ready().unwrap_err(),
                ParseFrameError::ZeroHeartbeatInterval
            ));
        }
    }

    mod encode {
        use super::super::*;
        use serde_json::json;

        #[test]
        fn test_frame_encode_heartbeat() {
            let data = Frame::heartbeat(Some(9)).encode();
            let value: serde_json::Value = serde_json::from_slice(&data).unwrap();

            assert_eq!(value, json!({"op": 1, "d": 9}));
        }

        #[test]
        fn test_frame_encode_identify() {
            let identify = Identify {
                token: "secret".to_string(),
                properties: IdentifyProperties {
                    os: "linux".to_string(),
                    client_name: "parley".to_string(),
                    device: "parley".to_string(),
                },
            };

            let data = Frame::identify(&identify).encode();
            let value: serde_json::Value = serde_json::from_slice(&data).unwrap();

            assert_eq!(
                value,
                json!({
                    "op": 2,
                    "d": {
                        "token": "secret",
                        "properties": {"os": "linux", "clientName": "parley", "device": "parley"},
                    },
                })
            );
        }
    }
}
