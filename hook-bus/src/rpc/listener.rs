//! Listening socket and accept loop for the broker role.

use crate::observability::events;
use crate::HookError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

const COMPONENT: &str = "rpc_listener";

/// Receives each accepted inbound stream.
#[async_trait]
pub(crate) trait InboundConnections: Send + Sync {
    async fn on_connection(&self, stream: TcpStream, peer_addr: SocketAddr);
}

/// The broker's listening socket plus its accept task.
pub(crate) struct RpcListener {
    local_addr: SocketAddr,
    accept_abort: tokio::task::AbortHandle,
}

impl RpcListener {
    /// Binds `addr` and spawns the accept loop.
    ///
    /// # Errors
    ///
    /// An `AddrInUse` bind failure maps to the recoverable
    /// [`HookError::Bind`]; any other failure maps to [`HookError::Io`].
    pub(crate) async fn bind(
        addr: SocketAddr,
        acceptor: Arc<dyn InboundConnections>,
    ) -> Result<Self, HookError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| HookError::from_bind(err, addr))?;
        let local_addr = listener.local_addr()?;

        let accept = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        debug!(
                            event = events::RPC_ACCEPTED,
                            component = COMPONENT,
                            peer = %peer_addr,
                            "accepted connection"
                        );
                        acceptor.on_connection(stream, peer_addr).await;
                    }
                    Err(err) => {
                        warn!(
                            event = events::RPC_READ_FAILED,
                            component = COMPONENT,
                            err = %err,
                            "accept failed"
                        );
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            accept_abort: accept.abort_handle(),
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Closes the listening socket by stopping the accept loop.
    pub(crate) fn close(&self) {
        self.accept_abort.abort();
    }
}

impl Drop for RpcListener {
    fn drop(&mut self) {
        self.accept_abort.abort();
    }
}
