//! Frame and RPC payload definitions.

use crate::{CallId, Version, WireError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Magic bytes prefixing every frame.
pub const MAGIC: [u8; 4] = *b"HKB1";

/// Maximum accepted frame body size.
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Descriptor a client sends to the broker immediately after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Requested peer name; the broker may rewrite it.
    pub name: String,
    /// Opaque peer type.
    pub kind: String,
    /// The peer's protocol version.
    pub version: Version,
    /// Topics the peer already has listeners for.
    #[serde(default)]
    pub subscriptions: Vec<String>,
}

/// An outgoing RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Call {
    /// Client -> broker, once, immediately after connect.
    Report(PeerDescriptor),
    /// Either direction: deliver an already-qualified topic plus payload.
    Message {
        topic: String,
        #[serde(default)]
        data: Option<Value>,
        #[serde(default)]
        expects_reply: bool,
    },
    /// Broker -> client: does this peer match these topic segments?
    HasEvent { parts: Vec<String> },
}

/// A reply referencing an earlier call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    /// Answers `Call::Report` with the assigned identity.
    ReportAck {
        name: String,
        session: String,
        server_version: Version,
    },
    /// A message handler completed successfully.
    Delivered {
        #[serde(default)]
        result: Option<Value>,
    },
    /// A message handler reported an error; `ctx` carries the original data.
    DeliverFailed {
        message: String,
        #[serde(default)]
        ctx: Option<Value>,
    },
    /// Answers `Call::HasEvent`.
    HasEvent { matched: bool },
    /// The call could not be dispatched at all.
    Failed { message: String },
}

/// The body of one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Call(Call),
    Reply { re: CallId, reply: Reply },
}

/// One message-framed unit on the wire.
///
/// Format:
/// - 4 bytes: magic
/// - 4 bytes: body length (big-endian)
/// - N bytes: JSON body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Connection-local id; replies reference it through `Payload::Reply::re`.
    pub id: CallId,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Frame {
    /// Creates a call frame.
    #[must_use]
    pub fn call(id: CallId, call: Call) -> Self {
        Self {
            id,
            payload: Payload::Call(call),
        }
    }

    /// Creates a reply frame answering `re`.
    #[must_use]
    pub fn reply(id: CallId, re: CallId, reply: Reply) -> Self {
        Self {
            id,
            payload: Payload::Reply { re, reply },
        }
    }

    /// Encodes the frame to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not serialize or exceeds
    /// [`MAX_FRAME_SIZE`].
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let body = serde_json::to_vec(self)?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(WireError::TooLarge {
                size: body.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(8 + body.len());
        buf.put_slice(&MAGIC);
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Decodes a frame from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is malformed.
    pub fn decode(mut data: Bytes) -> Result<Self, WireError> {
        if data.len() < 8 {
            return Err(WireError::Malformed("frame too short".into()));
        }

        let magic: [u8; 4] = data[..4]
            .try_into()
            .map_err(|_| WireError::Malformed("unreadable magic".into()))?;
        if magic != MAGIC {
            return Err(WireError::InvalidMagic);
        }
        data.advance(4);

        let len = data.get_u32() as usize;
        if len > MAX_FRAME_SIZE {
            return Err(WireError::TooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        if data.len() < len {
            return Err(WireError::Malformed("incomplete body".into()));
        }

        Ok(serde_json::from_slice(&data.slice(..len))?)
    }
}
