//! Wire types.
//!
//! Application messages are JSON [`Envelope`]s, `{"type": ..., "data": ...}`,
//! carried in text frames. The frame helpers here are what the pump uses to
//! move payloads in and out of `tungstenite` frames.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::Utf8Bytes;

use crate::error::{WsError, WsResult};

/// Reserved message type telling the browser runtime to persist its
/// identity cookie.
pub const SET_COOKIE_TYPE: &str = "__ax_set_cookie";

/// Close code sent when the server ends a session.
pub const CLOSE_NORMAL: u16 = 1000;

/// Outbound frame for a queued payload: valid UTF-8 goes out as text,
/// anything else as binary.
pub(crate) fn data_frame(payload: Bytes) -> tungstenite::Message {
    match Utf8Bytes::try_from(payload.clone()) {
        Ok(text) => tungstenite::Message::Text(text),
        Err(_) => tungstenite::Message::Binary(payload),
    }
}

/// Close frame with [`CLOSE_NORMAL`] and no reason.
pub(crate) fn normal_close() -> tungstenite::Message {
    tungstenite::Message::Close(Some(CloseFrame {
        code: CloseCode::from(CLOSE_NORMAL),
        reason: Utf8Bytes::from_static(""),
    }))
}

/// Payload of a data frame, `None` for control frames.
pub(crate) fn frame_payload(frame: tungstenite::Message) -> Option<Bytes> {
    match frame {
        tungstenite::Message::Text(text) => Some(Bytes::from(text)),
        tungstenite::Message::Binary(bytes) => Some(bytes),
        _ => None,
    }
}

/// The JSON wire envelope: `{"type": <string>, "data": <any>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    /// Message type used for routing.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Message payload.
    #[serde(default)]
    pub data: T,
}

impl<T> Envelope<T> {
    /// Create a new envelope.
    pub fn new(msg_type: impl Into<String>, data: T) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serialize the envelope to bytes ready for the outbound queue.
    pub fn to_bytes(&self) -> WsResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| WsError::EncodeFailed(e.to_string()))
    }
}

impl<T: DeserializeOwned + Default> Envelope<T> {
    /// Parse an inbound payload.
    pub fn from_slice(payload: &[u8]) -> WsResult<Self> {
        serde_json::from_slice(payload).map_err(|e| WsError::DecodeFailed(e.to_string()))
    }
}
