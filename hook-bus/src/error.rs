//! Hook runtime error types.

use hook_wire::{Version, WireError};
use thiserror::Error;

/// Errors surfaced by the hook runtime.
///
/// Start-time errors flow to the caller of `start`; they are additionally
/// emitted as `error::bind`, `error::resolve` or `error::unknown` events.
/// A bind failure is recoverable: `start` falls back to the client role.
#[derive(Debug, Error)]
pub enum HookError {
    /// The configured port is already in use.
    #[error("address already in use: {0}")]
    Bind(String),

    /// Host resolution failed or returned no addresses.
    #[error("could not resolve host {host:?}: {reason}")]
    Resolve {
        /// The host that failed to resolve.
        host: String,
        /// Why resolution failed.
        reason: String,
    },

    /// Broker and client versions differ; fatal on connect.
    #[error("version mismatch: ours is {ours}, broker reported {theirs}")]
    VersionMismatch {
        /// This hook's version.
        ours: Version,
        /// The broker's version.
        theirs: Version,
    },

    /// `stop` was called with neither role active.
    #[error("nothing to stop: hook is neither listening nor connected")]
    NothingToStop,

    /// `kill` had no child or connection to act on.
    #[error("nothing to kill: {0}")]
    NothingToKill(String),

    /// Self-kill attempted on the broker.
    #[error("refusing to kill the broker from itself")]
    CannotKillServer,

    /// No factory is registered for a configured transport type.
    #[error("unknown transport type {0:?}")]
    UnknownTransport(String),

    /// The RPC peer rejected or failed a call.
    #[error("transport error: {0}")]
    Transport(String),

    /// A wire-protocol failure.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Any other socket failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HookError {
    /// Maps an io error from `bind` onto the taxonomy: `AddrInUse` becomes the
    /// recoverable [`HookError::Bind`].
    pub(crate) fn from_bind(err: std::io::Error, addr: impl std::fmt::Display) -> Self {
        if err.kind() == std::io::ErrorKind::AddrInUse {
            Self::Bind(addr.to_string())
        } else {
            Self::Io(err)
        }
    }
}
