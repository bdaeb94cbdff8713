//! # hook-wire
//!
//! `hook-wire` defines the wire protocol spoken between hook peers: the framed
//! codec, the RPC call/reply payloads, the peer descriptor exchanged at
//! registration time, the protocol version type, and the topic-string helpers
//! shared by both sides of a connection.
//!
//! A connection carries [`Frame`]s. Each frame is either a [`Call`] — `report`,
//! `message` or `has_event` — or a [`Reply`] referencing an earlier call id.
//! Frames are length-delimited with a fixed magic prefix and JSON bodies.

mod codec;
mod error;
mod frame;
pub mod topic;
mod version;

pub use codec::{read_frame, write_frame};
pub use error::WireError;
pub use frame::{Call, Frame, Payload, PeerDescriptor, Reply, MAGIC, MAX_FRAME_SIZE};
pub use version::Version;

/// Identifier correlating a reply with its originating call on one connection.
pub type CallId = u64;
