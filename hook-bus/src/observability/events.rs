//! Canonical structured event names used across `hook-bus`.

// Emit pipeline events.
pub const EMIT: &str = "emit";
pub const EMIT_META: &str = "emit_meta";
pub const EMIT_SILENCED: &str = "emit_silenced";

// Registry events.
pub const REGISTRY_PEER_ADDED: &str = "registry_peer_added";
pub const REGISTRY_PEER_REMOVED: &str = "registry_peer_removed";
pub const SUBSCRIPTION_ADJUST: &str = "subscription_adjust";

// RPC connection events.
pub const RPC_ACCEPTED: &str = "rpc_accepted";
pub const RPC_CONNECTED: &str = "rpc_connected";
pub const RPC_READ_FAILED: &str = "rpc_read_failed";
pub const RPC_WRITE_FAILED: &str = "rpc_write_failed";
pub const RPC_REPLY_DROPPED: &str = "rpc_reply_dropped";
pub const RPC_CALL_UNSUPPORTED: &str = "rpc_call_unsupported";
pub const RPC_CLOSED: &str = "rpc_closed";

// Broadcast fan-out events.
pub const BROADCAST_SKIP_ORIGIN: &str = "broadcast_skip_origin";
pub const BROADCAST_QUERY_FAILED: &str = "broadcast_query_failed";
pub const BROADCAST_FORWARD: &str = "broadcast_forward";

// Lifecycle events.
pub const START_FALLBACK_TO_CLIENT: &str = "start_fallback_to_client";
pub const LISTEN_READY: &str = "listen_ready";
pub const CONNECT_READY: &str = "connect_ready";
pub const NAME_REASSIGNED: &str = "name_reassigned";
pub const STOPPED: &str = "stopped";
pub const KILLED_SELF: &str = "killed_self";

// Auxiliary transport events.
pub const AUX_SEND_OK: &str = "aux_send_ok";
pub const AUX_SEND_FAILED: &str = "aux_send_failed";

// Host resolution events.
pub const RESOLVE_FAILED: &str = "resolve_failed";
