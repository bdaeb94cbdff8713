//! One RPC connection: framed duplex stream, pending-reply table, end events.
//!
//! Frames are written through a single queue so send order is preserved; the
//! subscription meta-messages a client sends therefore reach the broker before
//! any later user message on the same connection. Inbound calls are dispatched
//! sequentially from the read loop for the same reason. A reply whose call is
//! no longer pending is dropped, never an error.

use crate::emitter::{EmitOutcome, Responder};
use crate::observability::events;
use crate::HookError;
use async_trait::async_trait;
use hook_wire::{read_frame, write_frame, Call, CallId, Frame, Payload, PeerDescriptor, Reply};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const COMPONENT: &str = "rpc_connection";

/// Identity granted by the broker in answer to a `report`.
pub(crate) struct ReportGrant {
    pub(crate) name: String,
    pub(crate) session: String,
    pub(crate) server_version: hook_wire::Version,
}

/// Inbound half of a connection, implemented by the hook runtime for each
/// role.
#[async_trait]
pub(crate) trait ConnectionEvents: Send + Sync {
    /// A peer registered itself. Returns the granted identity or a refusal.
    async fn on_report(
        &self,
        descriptor: PeerDescriptor,
        conn: &Arc<RpcConnection>,
    ) -> Result<ReportGrant, String>;

    /// A qualified topic arrived; the responder routes the reply back over
    /// the wire when the caller asked for one.
    async fn on_message(&self, topic: String, data: Option<Value>, responder: Responder);

    /// The peer asks whether any local listener matches these segments.
    async fn on_has_event(&self, parts: Vec<String>) -> bool;

    /// The connection ended; in-flight replies were dropped.
    async fn on_end(&self, conn: &Arc<RpcConnection>);
}

type PendingReplies = Mutex<HashMap<CallId, oneshot::Sender<Reply>>>;

/// A live connection to exactly one peer.
pub(crate) struct RpcConnection {
    peer_addr: Option<SocketAddr>,
    next_id: AtomicU64,
    writer: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    pending: PendingReplies,
    reader_abort: Mutex<Option<tokio::task::AbortHandle>>,
}

impl RpcConnection {
    /// Takes ownership of a connected stream and spawns its read/write loops.
    pub(crate) fn spawn(stream: TcpStream, handler: Arc<dyn ConnectionEvents>) -> Arc<Self> {
        let peer_addr = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();

        let conn = Arc::new(Self {
            peer_addr,
            next_id: AtomicU64::new(1),
            writer: Mutex::new(Some(writer_tx)),
            pending: Mutex::new(HashMap::new()),
            reader_abort: Mutex::new(None),
        });

        tokio::spawn(Self::write_loop(write_half, writer_rx));

        let reader_conn = conn.clone();
        let reader = tokio::spawn(async move {
            Self::read_loop(reader_conn, read_half, handler).await;
        });
        if let Ok(mut slot) = conn.reader_abort.lock() {
            *slot = Some(reader.abort_handle());
        }

        conn
    }

    /// Opens a connection to `addr`.
    pub(crate) async fn connect(
        addr: SocketAddr,
        handler: Arc<dyn ConnectionEvents>,
    ) -> Result<Arc<Self>, HookError> {
        let stream = TcpStream::connect(addr).await?;
        debug!(
            event = events::RPC_CONNECTED,
            component = COMPONENT,
            peer = %addr,
            "connected to broker"
        );
        Ok(Self::spawn(stream, handler))
    }

    pub(crate) fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Sends a call and awaits its reply.
    pub(crate) async fn call(self: &Arc<Self>, call: Call) -> Result<Reply, HookError> {
        let (responder_tx, responder_rx) = oneshot::channel();
        self.start_call(call, responder_tx)?;
        responder_rx
            .await
            .map_err(|_| HookError::Transport("connection ended before reply".into()))
    }

    /// Sends a call whose eventual reply fires `responder`. The frame is
    /// queued synchronously so send order follows call order; only the wait
    /// is deferred.
    pub(crate) fn call_with_responder(self: &Arc<Self>, call: Call, responder: Responder) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.start_call(call, reply_tx).is_err() {
            return;
        }
        tokio::spawn(async move {
            match reply_rx.await {
                Ok(Reply::Delivered { result }) => responder.resolve(result),
                Ok(Reply::DeliverFailed { message, .. }) | Ok(Reply::Failed { message }) => {
                    responder.reject(message);
                }
                // Connection ended, or a reply kind this call cannot receive.
                Ok(_) | Err(_) => {}
            }
        });
    }

    /// Sends a call without registering for a reply.
    pub(crate) fn notify(&self, call: Call) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.send(Frame::call(id, call));
    }

    /// Closes the connection: the writer queue is dropped and every pending
    /// reply is abandoned.
    pub(crate) fn close(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            writer.take();
        }
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
        if let Ok(mut reader) = self.reader_abort.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
        debug!(event = events::RPC_CLOSED, component = COMPONENT, "closed");
    }

    fn start_call(&self, call: Call, reply_tx: oneshot::Sender<Reply>) -> Result<(), HookError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, reply_tx);
        }
        if self.send(Frame::call(id, call)) {
            Ok(())
        } else {
            if let Ok(mut pending) = self.pending.lock() {
                pending.remove(&id);
            }
            Err(HookError::Transport("connection closed".into()))
        }
    }

    fn send(&self, frame: Frame) -> bool {
        let Ok(writer) = self.writer.lock() else {
            return false;
        };
        writer
            .as_ref()
            .map(|tx| tx.send(frame).is_ok())
            .unwrap_or(false)
    }

    fn send_reply(&self, re: CallId, reply: Reply) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.send(Frame::reply(id, re, reply));
    }

    /// A responder that routes an emission outcome back as the reply to `re`.
    fn reply_responder(self: &Arc<Self>, re: CallId) -> Responder {
        let conn = self.clone();
        Responder::from_fn(move |outcome| {
            let reply = match outcome {
                EmitOutcome::Success(result) => Reply::Delivered { result },
                EmitOutcome::Error(message) => Reply::DeliverFailed { message, ctx: None },
            };
            conn.send_reply(re, reply);
        })
    }

    async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Frame>) {
        while let Some(frame) = rx.recv().await {
            if let Err(err) = write_frame(&mut write_half, &frame).await {
                warn!(
                    event = events::RPC_WRITE_FAILED,
                    component = COMPONENT,
                    err = %err,
                    "write failed; stopping writer"
                );
                break;
            }
        }
    }

    async fn read_loop(
        conn: Arc<Self>,
        mut read_half: OwnedReadHalf,
        handler: Arc<dyn ConnectionEvents>,
    ) {
        loop {
            match read_frame(&mut read_half).await {
                Ok(Some(frame)) => conn.dispatch(frame, &handler).await,
                Ok(None) => break,
                Err(err) => {
                    warn!(
                        event = events::RPC_READ_FAILED,
                        component = COMPONENT,
                        err = %err,
                        "read failed; dropping connection"
                    );
                    break;
                }
            }
        }

        if let Ok(mut writer) = conn.writer.lock() {
            writer.take();
        }
        if let Ok(mut pending) = conn.pending.lock() {
            pending.clear();
        }
        handler.on_end(&conn).await;
    }

    async fn dispatch(self: &Arc<Self>, frame: Frame, handler: &Arc<dyn ConnectionEvents>) {
        match frame.payload {
            Payload::Reply { re, reply } => {
                let waiting = self
                    .pending
                    .lock()
                    .ok()
                    .and_then(|mut pending| pending.remove(&re));
                match waiting {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => {
                        debug!(
                            event = events::RPC_REPLY_DROPPED,
                            component = COMPONENT,
                            re,
                            "late reply dropped"
                        );
                    }
                }
            }
            Payload::Call(Call::Report(descriptor)) => {
                let reply = match handler.on_report(descriptor, self).await {
                    Ok(grant) => Reply::ReportAck {
                        name: grant.name,
                        session: grant.session,
                        server_version: grant.server_version,
                    },
                    Err(message) => {
                        warn!(
                            event = events::RPC_CALL_UNSUPPORTED,
                            component = COMPONENT,
                            call = "report",
                            reason = message.as_str(),
                            "refusing call this endpoint cannot serve"
                        );
                        Reply::Failed { message }
                    }
                };
                self.send_reply(frame.id, reply);
            }
            Payload::Call(Call::Message {
                topic,
                data,
                expects_reply,
            }) => {
                let responder = if expects_reply {
                    self.reply_responder(frame.id)
                } else {
                    Responder::noop()
                };
                handler.on_message(topic, data, responder).await;
            }
            Payload::Call(Call::HasEvent { parts }) => {
                let matched = handler.on_has_event(parts).await;
                self.send_reply(frame.id, Reply::HasEvent { matched });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hook_wire::Version;
    use std::sync::atomic::AtomicBool;
    use tokio::net::TcpListener;

    struct EchoEvents {
        saw_end: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ConnectionEvents for EchoEvents {
        async fn on_report(
            &self,
            descriptor: PeerDescriptor,
            _conn: &Arc<RpcConnection>,
        ) -> Result<ReportGrant, String> {
            Ok(ReportGrant {
                name: format!("{}-0", descriptor.name),
                session: "session".into(),
                server_version: descriptor.version,
            })
        }

        async fn on_message(&self, _topic: String, data: Option<Value>, responder: Responder) {
            responder.resolve(data);
        }

        async fn on_has_event(&self, parts: Vec<String>) -> bool {
            parts.first().map(String::as_str) == Some("known")
        }

        async fn on_end(&self, _conn: &Arc<RpcConnection>) {
            self.saw_end.store(true, Ordering::SeqCst);
        }
    }

    struct SilentEvents;

    #[async_trait]
    impl ConnectionEvents for SilentEvents {
        async fn on_report(
            &self,
            _descriptor: PeerDescriptor,
            _conn: &Arc<RpcConnection>,
        ) -> Result<ReportGrant, String> {
            Err("unsupported".into())
        }

        async fn on_message(&self, _topic: String, _data: Option<Value>, _responder: Responder) {}

        async fn on_has_event(&self, _parts: Vec<String>) -> bool {
            false
        }

        async fn on_end(&self, _conn: &Arc<RpcConnection>) {}
    }

    async fn loopback(
        server_events: Arc<dyn ConnectionEvents>,
    ) -> (Arc<RpcConnection>, Arc<RpcConnection>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            RpcConnection::spawn(stream, server_events)
        });

        let client = RpcConnection::connect(addr, Arc::new(SilentEvents))
            .await
            .unwrap();
        let server = accept.await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn report_round_trip_returns_the_grant() {
        let saw_end = Arc::new(AtomicBool::new(false));
        let (client, _server) = loopback(Arc::new(EchoEvents {
            saw_end: saw_end.clone(),
        }))
        .await;

        let reply = client
            .call(Call::Report(PeerDescriptor {
                name: "worker".into(),
                kind: "hook".into(),
                version: Version::new(0, 2, 0),
                subscriptions: vec![],
            }))
            .await
            .unwrap();

        match reply {
            Reply::ReportAck { name, .. } => assert_eq!(name, "worker-0"),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn message_reply_fires_the_responder() {
        let (client, _server) = loopback(Arc::new(EchoEvents {
            saw_end: Arc::new(AtomicBool::new(false)),
        }))
        .await;

        let (responder, outcome) = Responder::channel();
        client.call_with_responder(
            Call::Message {
                topic: "worker::ping".into(),
                data: Some(serde_json::json!(7)),
                expects_reply: true,
            },
            responder,
        );

        assert_eq!(
            outcome.await.unwrap(),
            EmitOutcome::Success(Some(serde_json::json!(7)))
        );
    }

    #[tokio::test]
    async fn has_event_answers_from_the_handler() {
        let (client, _server) = loopback(Arc::new(EchoEvents {
            saw_end: Arc::new(AtomicBool::new(false)),
        }))
        .await;

        let known = client
            .call(Call::HasEvent {
                parts: vec!["known".into(), "topic".into()],
            })
            .await
            .unwrap();
        let unknown = client
            .call(Call::HasEvent {
                parts: vec!["other".into()],
            })
            .await
            .unwrap();

        assert_eq!(known, Reply::HasEvent { matched: true });
        assert_eq!(unknown, Reply::HasEvent { matched: false });
    }

    #[tokio::test]
    async fn close_surfaces_as_end_and_drops_in_flight_calls() {
        let saw_end = Arc::new(AtomicBool::new(false));
        let (client, server) = loopback(Arc::new(EchoEvents {
            saw_end: saw_end.clone(),
        }))
        .await;

        client.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while !saw_end.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("server should observe connection end");

        assert!(server
            .call(Call::HasEvent { parts: vec![] })
            .await
            .is_err());
    }
}
