//! Per-connection handlers for both roles.
//!
//! Each inbound broker connection gets a [`ServerSession`] keyed by a fresh
//! session id; the registry record it creates on `report` is dropped again on
//! connection end, so no back-pointers tie connections to peers. A client's
//! single upstream connection is handled by [`ClientSession`], which delegates
//! `message` to the local emitter and `has_event` to the local topic tree.

use crate::control_plane::{PeerLink, SubscriptionChange};
use crate::emitter::Responder;
use crate::runtime::hook::{HookShared, RoleState};
use crate::rpc::{ConnectionEvents, InboundConnections, ReportGrant, RpcConnection};
use crate::{topics, HookError};
use async_trait::async_trait;
use hook_wire::{Call, PeerDescriptor, Reply};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::net::TcpStream;
use uuid::Uuid;

/// A connected peer's exported RPC methods.
pub(crate) struct ConnectionLink(pub(crate) Arc<RpcConnection>);

#[async_trait]
impl PeerLink for ConnectionLink {
    async fn has_event(&self, parts: Vec<String>) -> Result<bool, HookError> {
        match self.0.call(Call::HasEvent { parts }).await? {
            Reply::HasEvent { matched } => Ok(matched),
            Reply::Failed { message } => Err(HookError::Transport(message)),
            _ => Err(HookError::Transport("unexpected has_event reply".into())),
        }
    }

    fn message(&self, topic: String, data: Option<Value>, responder: Responder) {
        if responder.is_armed() {
            self.0.call_with_responder(
                Call::Message {
                    topic,
                    data,
                    expects_reply: true,
                },
                responder,
            );
        } else {
            self.0.notify(Call::Message {
                topic,
                data,
                expects_reply: false,
            });
        }
    }

    fn close(&self) {
        self.0.close();
    }
}

/// Accepts inbound broker connections and wires a session handler to each.
pub(crate) struct ServerAcceptor {
    shared: Weak<HookShared>,
}

impl ServerAcceptor {
    pub(crate) fn new(shared: Weak<HookShared>) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl InboundConnections for ServerAcceptor {
    async fn on_connection(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let session = Uuid::new_v4();
        let handler = Arc::new(ServerSession {
            shared: self.shared.clone(),
            session,
            peer_addr,
        });
        let _conn = RpcConnection::spawn(stream, handler);
        shared
            .emit(
                topics::CONNECTION_OPEN,
                Some(json!(peer_addr.to_string())),
                None,
            )
            .await;
    }
}

/// Broker-side handler for one client connection.
pub(crate) struct ServerSession {
    shared: Weak<HookShared>,
    session: Uuid,
    peer_addr: SocketAddr,
}

#[async_trait]
impl ConnectionEvents for ServerSession {
    async fn on_report(
        &self,
        descriptor: PeerDescriptor,
        conn: &Arc<RpcConnection>,
    ) -> Result<ReportGrant, String> {
        let Some(shared) = self.shared.upgrade() else {
            return Err("hook is shutting down".into());
        };

        let assigned = shared
            .registry
            .upsert(
                self.session,
                &descriptor.name,
                &descriptor.kind,
                Some(self.peer_addr),
                &descriptor.subscriptions,
                Arc::new(ConnectionLink(conn.clone())),
            )
            .await;

        Ok(ReportGrant {
            name: assigned,
            session: self.session.to_string(),
            server_version: shared.version,
        })
    }

    async fn on_message(&self, topic: String, data: Option<Value>, responder: Responder) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };

        // A client's listener-change notification updates the mirror and is
        // suppressed from any further propagation.
        if let Some(change) = SubscriptionChange::from_meta_topic(&topic) {
            let pattern = data.as_ref().and_then(Value::as_str).map(str::to_string);
            if let Some(peer_name) = shared.registry.name_of(self.session).await {
                shared
                    .registry
                    .adjust(&peer_name, change, pattern.as_deref())
                    .await;
            }
            return;
        }

        shared.deliver_local(&topic, &data, &responder).await;
    }

    async fn on_has_event(&self, parts: Vec<String>) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let emitter = shared.emitter.lock().await;
        let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        emitter.matches_any(&refs)
    }

    async fn on_end(&self, conn: &Arc<RpcConnection>) {
        conn.close();
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if let Some(peer_name) = shared.registry.remove(self.session).await {
            shared
                .emit(topics::HOOK_DISCONNECTED, Some(json!(peer_name)), None)
                .await;
        }
        shared
            .emit(
                topics::CONNECTION_END,
                Some(json!(self.peer_addr.to_string())),
                None,
            )
            .await;
    }
}

/// Client-side handler for the upstream connection.
pub(crate) struct ClientSession {
    shared: Weak<HookShared>,
}

impl ClientSession {
    pub(crate) fn new(shared: Weak<HookShared>) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl ConnectionEvents for ClientSession {
    async fn on_report(
        &self,
        _descriptor: PeerDescriptor,
        _conn: &Arc<RpcConnection>,
    ) -> Result<ReportGrant, String> {
        Err("clients do not accept reports".into())
    }

    async fn on_message(&self, topic: String, data: Option<Value>, responder: Responder) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.deliver_local(&topic, &data, &responder).await;
    }

    async fn on_has_event(&self, parts: Vec<String>) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let emitter = shared.emitter.lock().await;
        let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        emitter.matches_any(&refs)
    }

    async fn on_end(&self, conn: &Arc<RpcConnection>) {
        conn.close();
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        {
            let mut state = shared.state.lock().await;
            if matches!(*state, RoleState::Client { .. }) {
                *state = RoleState::Stopped;
            }
        }
        shared.emit(topics::CONNECTION_END, None, None).await;
    }
}
