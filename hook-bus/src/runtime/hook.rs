//! The hook facade: lifecycle, role resolution and the shared emit pipeline.

use crate::config::HookConfig;
use crate::control_plane::{Registry, SubscriptionChange};
use crate::emitter::{
    listener_fn, run_delivery, EmitIntercept, EmitOutcome, EmitterCore, HookListener, Responder,
    ALL_LISTENERS_REMOVED, LISTENER_ADDED, LISTENER_REMOVED,
};
use crate::observability::events;
use crate::resolve::resolve_host;
use crate::rpc::{RpcConnection, RpcListener};
use crate::runtime::broadcast::BroadcastIntercept;
use crate::runtime::sessions::{ClientSession, ServerAcceptor};
use crate::runtime::spawner::ChildSupervisor;
use crate::transport::{BoundTransport, TransportRegistry};
use crate::{topics, HookError};
use futures::future::BoxFuture;
use hook_wire::{topic, Call, PeerDescriptor, Reply, Version};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

const COMPONENT: &str = "hook";

/// The established role of a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// No start attempt yet.
    Unstarted,
    /// Owns the listening socket and the registry.
    Server,
    /// Connected to a broker.
    Client,
    /// Stopped or killed.
    Stopped,
}

pub(crate) enum RoleState {
    Unstarted,
    Server {
        listener: RpcListener,
        port: u16,
    },
    Client {
        conn: Arc<RpcConnection>,
        port: u16,
    },
    Stopped,
}

/// Builds a [`Hook`] from a materialized configuration.
pub struct HookBuilder {
    config: HookConfig,
    transport_registry: TransportRegistry,
    supervisor: Option<Arc<dyn ChildSupervisor>>,
    event_map: Vec<(String, Arc<dyn HookListener>)>,
}

impl HookBuilder {
    #[must_use]
    pub fn new(config: HookConfig) -> Self {
        Self {
            config,
            transport_registry: TransportRegistry::new(),
            supervisor: None,
            event_map: Vec::new(),
        }
    }

    /// Supplies the factory registry used to resolve configured transports.
    #[must_use]
    pub fn transport_registry(mut self, registry: TransportRegistry) -> Self {
        self.transport_registry = registry;
        self
    }

    /// Supplies the external child-process supervisor.
    #[must_use]
    pub fn supervisor(mut self, supervisor: Arc<dyn ChildSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Installs a listener at construction time, before any role exists.
    #[must_use]
    pub fn listen_to(mut self, pattern: impl Into<String>, listener: Arc<dyn HookListener>) -> Self {
        self.event_map.push((pattern.into(), listener));
        self
    }

    /// Resolves transports and produces the hook.
    ///
    /// # Errors
    ///
    /// Fails when a configured transport type has no registered factory.
    pub fn build(self) -> Result<Hook, HookError> {
        let version = Version::from_str(env!("CARGO_PKG_VERSION"))?;

        let mut emitter = EmitterCore::new();
        for (pattern, listener) in self.event_map {
            emitter.on(&pattern, listener);
        }

        let mut aux = Vec::new();
        for spec in &self.config.transports {
            aux.push(self.transport_registry.resolve(spec)?);
        }

        let name = self.config.name.clone();
        Ok(Hook {
            shared: Arc::new(HookShared {
                config: self.config,
                version,
                name: RwLock::new(name),
                state: Mutex::new(RoleState::Unstarted),
                emitter: Mutex::new(emitter),
                registry: Registry::new(),
                aux,
                supervisor: self.supervisor,
                children: Mutex::new(HashMap::new()),
                silenced: AtomicBool::new(false),
            }),
        })
    }
}

/// A process-local participant in the bus.
///
/// `start` attempts to bind the configured port; on contention it falls back
/// to connecting as a client of whichever hook won the bind. Exactly one role
/// holds after a successful start.
#[derive(Clone)]
pub struct Hook {
    pub(crate) shared: Arc<HookShared>,
}

pub(crate) struct HookShared {
    pub(crate) config: HookConfig,
    pub(crate) version: Version,
    pub(crate) name: RwLock<String>,
    pub(crate) state: Mutex<RoleState>,
    pub(crate) emitter: Mutex<EmitterCore>,
    pub(crate) registry: Registry,
    pub(crate) aux: Vec<BoundTransport>,
    pub(crate) supervisor: Option<Arc<dyn ChildSupervisor>>,
    pub(crate) children: Mutex<HashMap<String, Value>>,
    pub(crate) silenced: AtomicBool,
}

impl Hook {
    /// Builds a hook with a plain configuration and no external seams.
    ///
    /// # Errors
    ///
    /// Fails when a configured transport type has no registered factory.
    pub fn new(config: HookConfig) -> Result<Self, HookError> {
        HookBuilder::new(config).build()
    }

    // ---- introspection ----------------------------------------------------

    /// Current name; rewritten by the broker at connect time.
    pub async fn name(&self) -> String {
        self.shared.name.read().await.clone()
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.shared.config.kind
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.shared.version
    }

    pub async fn role(&self) -> Role {
        match &*self.shared.state.lock().await {
            RoleState::Unstarted => Role::Unstarted,
            RoleState::Server { .. } => Role::Server,
            RoleState::Client { .. } => Role::Client,
            RoleState::Stopped => Role::Stopped,
        }
    }

    /// The bound or connected port once a role is established.
    pub async fn local_port(&self) -> Option<u16> {
        match &*self.shared.state.lock().await {
            RoleState::Server { port, .. } | RoleState::Client { port, .. } => Some(*port),
            _ => None,
        }
    }

    /// Every registry record on this broker, its own self-entry included.
    pub async fn peers(&self) -> Vec<crate::control_plane::PeerInfo> {
        self.shared.registry.overview().await
    }

    /// Names of the peers currently connected to this broker.
    pub async fn peer_names(&self) -> Vec<String> {
        self.shared
            .registry
            .connected_peers()
            .await
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// The broker's mirrored subscription patterns for one peer.
    pub async fn mirrored_subscriptions(&self, peer_name: &str) -> Vec<String> {
        self.shared.registry.subscriptions_of(peer_name).await
    }

    /// The broker's mirrored listener count for one peer and pattern.
    pub async fn mirrored_subscription_count(&self, peer_name: &str, pattern: &str) -> usize {
        self.shared
            .registry
            .subscription_count(peer_name, pattern)
            .await
    }

    // ---- listener management ---------------------------------------------

    /// Binds a listener at `pattern` and notifies the subscription sync.
    pub async fn on(&self, pattern: &str, listener: Arc<dyn HookListener>) {
        {
            self.shared.emitter.lock().await.on(pattern, listener);
        }
        self.shared
            .emit(LISTENER_ADDED, Some(Value::String(pattern.into())), None)
            .await;
    }

    /// Binds a listener removed after its first delivery.
    pub async fn once(&self, pattern: &str, listener: Arc<dyn HookListener>) {
        {
            self.shared.emitter.lock().await.once(pattern, listener);
        }
        self.shared
            .emit(LISTENER_ADDED, Some(Value::String(pattern.into())), None)
            .await;
    }

    /// Removes one listener by identity. Returns `true` when removed.
    pub async fn off(&self, pattern: &str, listener: &Arc<dyn HookListener>) -> bool {
        let removed = { self.shared.emitter.lock().await.off(pattern, listener) };
        if removed {
            self.shared
                .emit(LISTENER_REMOVED, Some(Value::String(pattern.into())), None)
                .await;
        }
        removed
    }

    /// Removes every listener at `pattern`, or every listener when `None`.
    pub async fn remove_all(&self, pattern: Option<&str>) {
        match pattern {
            Some(pattern) => {
                let removed = { self.shared.emitter.lock().await.remove_all(pattern) };
                if removed > 0 {
                    self.shared
                        .emit(
                            ALL_LISTENERS_REMOVED,
                            Some(Value::String(pattern.into())),
                            None,
                        )
                        .await;
                }
            }
            None => {
                {
                    self.shared.emitter.lock().await.clear_listeners();
                }
                self.shared.emit(ALL_LISTENERS_REMOVED, None, None).await;
            }
        }
    }

    /// The listeners registered at exactly `pattern`.
    pub async fn listeners(&self, pattern: &str) -> Vec<Arc<dyn HookListener>> {
        self.shared.emitter.lock().await.listeners_at(pattern)
    }

    /// Installs a global intercept invoked for every local emission.
    pub async fn on_any(&self, intercept: Arc<dyn EmitIntercept>) {
        self.shared.emitter.lock().await.add_intercept(intercept);
    }

    /// Every pattern with at least one registered listener.
    pub async fn subscriptions(&self) -> Vec<String> {
        self.shared.emitter.lock().await.enumerate()
    }

    // ---- emission ---------------------------------------------------------

    /// Emits an event through the shared pipeline with a synthesized
    /// callback: the first completion produces `topic::result` or
    /// `topic::error`.
    pub async fn emit(&self, topic: &str, data: Option<Value>) {
        self.shared.emit(topic, data, None).await;
    }

    /// Emits an event whose first completion fires `responder` instead of the
    /// synthesized callback.
    pub async fn emit_with_responder(
        &self,
        topic: &str,
        data: Option<Value>,
        responder: Responder,
    ) {
        self.shared.emit(topic, data, Some(responder)).await;
    }

    // ---- lifecycle --------------------------------------------------------

    /// Starts the hook: listen, falling back to connect on port contention.
    ///
    /// # Errors
    ///
    /// Unrecoverable start failures are returned and additionally emitted as
    /// `error::*` events.
    pub async fn start(&self) -> Result<(), HookError> {
        match self.listen().await {
            Ok(()) => Ok(()),
            Err(HookError::Bind(addr)) => {
                debug!(
                    event = events::START_FALLBACK_TO_CLIENT,
                    component = COMPONENT,
                    addr = addr.as_str(),
                    "port contended; assuming client role"
                );
                match self.connect().await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        self.shared.report_start_error(&err).await;
                        Err(err)
                    }
                }
            }
            Err(err) => {
                self.shared.report_start_error(&err).await;
                Err(err)
            }
        }
    }

    /// Assumes the server role on the configured endpoint.
    ///
    /// # Errors
    ///
    /// [`HookError::Bind`] on port contention (recoverable through
    /// [`Hook::connect`]), [`HookError::Resolve`] when the host does not
    /// resolve.
    pub async fn listen(&self) -> Result<(), HookError> {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        if !matches!(*state, RoleState::Unstarted) {
            return Err(HookError::Transport("hook already started".into()));
        }

        let addrs = resolve_host(&shared.config.host, shared.config.port).await?;
        let acceptor = Arc::new(ServerAcceptor::new(Arc::downgrade(shared)));
        let listener = RpcListener::bind(addrs[0], acceptor).await?;
        let local_addr = listener.local_addr();
        let port = local_addr.port();

        let self_session = Uuid::new_v4();
        let own_name = shared.name.read().await.clone();
        shared
            .registry
            .seed_self(self_session, &own_name, &shared.config.kind, local_addr)
            .await;

        {
            let mut emitter = shared.emitter.lock().await;
            emitter.add_intercept(Arc::new(BroadcastIntercept::new(Arc::downgrade(shared))));
            let patterns = emitter.enumerate();
            drop(emitter);
            shared.registry.set_subscriptions(self_session, patterns).await;
        }

        *state = RoleState::Server { listener, port };
        drop(state);

        info!(
            event = events::LISTEN_READY,
            component = COMPONENT,
            name = own_name.as_str(),
            port,
            "listening"
        );
        shared
            .emit(topics::HOOK_LISTENING, Some(json!(port)), None)
            .await;
        shared
            .emit(topics::HOOK_STARTED, Some(json!(port)), None)
            .await;
        self.ready_gate().await;
        Ok(())
    }

    /// Assumes the client role against the configured endpoint.
    ///
    /// # Errors
    ///
    /// [`HookError::VersionMismatch`] when the broker's version differs,
    /// [`HookError::Resolve`] or connection failures otherwise. No
    /// `hook::connected` is emitted on failure.
    pub async fn connect(&self) -> Result<(), HookError> {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        if !matches!(*state, RoleState::Unstarted) {
            return Err(HookError::Transport("hook already started".into()));
        }

        let addrs = resolve_host(&shared.config.host, shared.config.port).await?;
        let handler = Arc::new(ClientSession::new(Arc::downgrade(shared)));
        let conn = RpcConnection::connect(addrs[0], handler).await?;

        let descriptor = PeerDescriptor {
            name: shared.name.read().await.clone(),
            kind: shared.config.kind.clone(),
            version: shared.version,
            subscriptions: shared.emitter.lock().await.enumerate(),
        };

        let reply = conn.call(Call::Report(descriptor)).await?;
        let (assigned_name, server_version) = match reply {
            Reply::ReportAck {
                name,
                server_version,
                ..
            } => (name, server_version),
            Reply::Failed { message } => {
                conn.close();
                return Err(HookError::Transport(message));
            }
            _ => {
                conn.close();
                return Err(HookError::Transport("unexpected report reply".into()));
            }
        };

        if server_version != shared.version {
            conn.close();
            return Err(HookError::VersionMismatch {
                ours: shared.version,
                theirs: server_version,
            });
        }

        {
            let mut name = shared.name.write().await;
            if *name != assigned_name {
                info!(
                    event = events::NAME_REASSIGNED,
                    component = COMPONENT,
                    requested = name.as_str(),
                    assigned = assigned_name.as_str(),
                    "broker rewrote our name"
                );
                *name = assigned_name;
            }
        }

        let port = shared.config.port;
        *state = RoleState::Client { conn, port };
        drop(state);

        info!(
            event = events::CONNECT_READY,
            component = COMPONENT,
            port,
            "connected"
        );
        shared
            .emit(topics::HOOK_CONNECTED, Some(json!(port)), None)
            .await;
        shared
            .emit(topics::HOOK_STARTED, Some(json!(port)), None)
            .await;
        self.ready_gate().await;
        Ok(())
    }

    /// Closes whichever side is active.
    ///
    /// # Errors
    ///
    /// [`HookError::NothingToStop`] when neither role is active.
    pub async fn stop(&self) -> Result<(), HookError> {
        let shared = &self.shared;
        let previous = {
            let mut state = shared.state.lock().await;
            if matches!(*state, RoleState::Unstarted | RoleState::Stopped) {
                return Err(HookError::NothingToStop);
            }
            std::mem::replace(&mut *state, RoleState::Stopped)
        };

        match previous {
            RoleState::Server { listener, .. } => {
                listener.close();
                for (_, link) in shared.registry.connected_peers().await {
                    link.close();
                }
                shared.registry.clear().await;
            }
            RoleState::Client { conn, .. } => {
                conn.close();
            }
            _ => {}
        }

        debug!(event = events::STOPPED, component = COMPONENT, "stopped");
        Ok(())
    }

    /// Kills a named child through the external supervisor, or — with no
    /// target — terminates this hook's client side: the connection is closed,
    /// every local listener is removed and further emissions are silenced.
    ///
    /// # Errors
    ///
    /// [`HookError::CannotKillServer`] for self-kill on the broker,
    /// [`HookError::NothingToKill`] when there is nothing to act on.
    pub async fn kill(&self, target: Option<&str>) -> Result<(), HookError> {
        match target {
            Some(child) if !child.is_empty() => {
                let Some(supervisor) = &self.shared.supervisor else {
                    return Err(HookError::NothingToKill(format!(
                        "no supervisor to stop child {child:?}"
                    )));
                };
                supervisor.stop_child(child).await?;
                self.shared.children.lock().await.remove(child);
                Ok(())
            }
            _ => match self.role().await {
                Role::Server => Err(HookError::CannotKillServer),
                Role::Client => {
                    self.stop().await?;
                    {
                        self.shared.emitter.lock().await.clear();
                    }
                    self.shared.silenced.store(true, Ordering::SeqCst);
                    debug!(
                        event = events::KILLED_SELF,
                        component = COMPONENT,
                        "hook silenced"
                    );
                    Ok(())
                }
                _ => Err(HookError::NothingToKill(
                    "hook is neither a client nor supervising children".into(),
                )),
            },
        }
    }

    // ---- children ---------------------------------------------------------

    /// Records a spawned child for the external supervisor.
    pub async fn register_child(&self, name: &str, info: Value) {
        self.shared
            .children
            .lock()
            .await
            .insert(name.to_string(), info);
    }

    /// The spawned children by name.
    pub async fn children(&self) -> HashMap<String, Value> {
        self.shared.children.lock().await.clone()
    }

    /// Emits `hook::ready` now, or after `children::ready` when child hooks
    /// are configured.
    async fn ready_gate(&self) {
        let shared = &self.shared;
        let supervisor = match (&shared.supervisor, shared.config.hooks.is_empty()) {
            (Some(supervisor), false) => supervisor.clone(),
            _ => {
                shared.emit(topics::HOOK_READY, None, None).await;
                return;
            }
        };

        let weak = Arc::downgrade(shared);
        self.once(
            topics::CHILDREN_READY,
            listener_fn(move |_event| {
                if let Some(shared) = weak.upgrade() {
                    tokio::spawn((&shared).emit(topics::HOOK_READY, None, None));
                }
            }),
        )
        .await;

        if let Err(err) = supervisor.spawn_children(self, &shared.config.hooks).await {
            warn!(
                event = events::STOPPED,
                component = COMPONENT,
                err = %err,
                "child spawn failed"
            );
            shared
                .emit(
                    topics::ERROR_UNKNOWN,
                    Some(json!({ "message": err.to_string() })),
                    None,
                )
                .await;
        }
    }
}

impl HookShared {
    /// The shared emit pipeline, boxed so synthesized callbacks, meta-events
    /// and derived topics may re-enter it.
    pub(crate) fn emit(
        self: &Arc<Self>,
        topic: &str,
        data: Option<Value>,
        responder: Option<Responder>,
    ) -> BoxFuture<'static, ()> {
        let this = self.clone();
        let topic = topic.to_string();
        Box::pin(async move {
            this.emit_pipeline(topic, data, responder).await;
        })
    }

    async fn emit_pipeline(
        self: Arc<Self>,
        topic_str: String,
        data: Option<Value>,
        responder: Option<Responder>,
    ) {
        if self.silenced.load(Ordering::SeqCst) {
            debug!(
                event = events::EMIT_SILENCED,
                component = COMPONENT,
                topic = topic_str.as_str(),
                "dropping emission on killed hook"
            );
            return;
        }

        // Reserved meta topics feed the subscription sync and fall through to
        // local delivery only.
        if let Some(change) = SubscriptionChange::from_meta_topic(&topic_str) {
            self.route_meta(&topic_str, change, &data).await;
            let responder = responder.unwrap_or_else(Responder::noop);
            self.deliver_local(&topic_str, &data, &responder).await;
            return;
        }

        debug!(
            event = events::EMIT,
            component = COMPONENT,
            topic = topic_str.as_str(),
            "emitting"
        );

        let responder =
            responder.unwrap_or_else(|| self.synthesized_responder(&topic_str, &data));

        let own_name = self.name.read().await.clone();
        let qualified = topic::qualify(&own_name, &topic_str);

        for bound in &self.aux {
            match bound
                .transport
                .message(&bound.options, &qualified, data.as_ref())
                .await
            {
                Ok(Some(result)) => {
                    debug!(
                        event = events::AUX_SEND_OK,
                        component = COMPONENT,
                        transport = bound.kind.as_str(),
                        topic = qualified.as_str(),
                        "aux transport replied"
                    );
                    responder.resolve(Some(result));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        event = events::AUX_SEND_FAILED,
                        component = COMPONENT,
                        transport = bound.kind.as_str(),
                        topic = qualified.as_str(),
                        err = %err,
                        "aux transport failed"
                    );
                    responder.reject(err.to_string());
                }
            }
        }

        {
            let state = self.state.lock().await;
            if let RoleState::Client { conn, .. } = &*state {
                if responder.is_armed() {
                    conn.call_with_responder(
                        Call::Message {
                            topic: qualified.clone(),
                            data: data.clone(),
                            expects_reply: true,
                        },
                        responder.clone(),
                    );
                } else {
                    conn.notify(Call::Message {
                        topic: qualified.clone(),
                        data: data.clone(),
                        expects_reply: false,
                    });
                }
            }
        }

        self.deliver_local(&topic_str, &data, &responder).await;
    }

    /// Step one of the pipeline: forward a listener-change notification to
    /// whoever owns the registry view of this hook.
    async fn route_meta(
        self: &Arc<Self>,
        topic_str: &str,
        change: SubscriptionChange,
        data: &Option<Value>,
    ) {
        let pattern = data.as_ref().and_then(Value::as_str).map(str::to_string);
        debug!(
            event = events::EMIT_META,
            component = COMPONENT,
            topic = topic_str,
            pattern = pattern.as_deref().unwrap_or("*all*"),
            "routing subscription meta"
        );

        let (is_server, upstream) = {
            let state = self.state.lock().await;
            match &*state {
                RoleState::Client { conn, .. } => (false, Some(conn.clone())),
                RoleState::Server { .. } => (true, None),
                _ => (false, None),
            }
        };

        if let Some(conn) = upstream {
            conn.notify(Call::Message {
                topic: topic_str.to_string(),
                data: data.clone(),
                expects_reply: false,
            });
        } else if is_server {
            let own_name = self.name.read().await.clone();
            self.registry
                .adjust(&own_name, change, pattern.as_deref())
                .await;
        }
    }

    /// Local delivery: matching listeners, installed intercepts, and the
    /// listener-removed notifications of expired once-listeners.
    pub(crate) async fn deliver_local(
        self: &Arc<Self>,
        topic_str: &str,
        data: &Option<Value>,
        responder: &Responder,
    ) {
        let delivery = { self.emitter.lock().await.prepare_delivery(topic_str) };
        run_delivery(&delivery, topic_str, data, responder).await;
        for pattern in delivery.expired {
            self.emit(LISTENER_REMOVED, Some(Value::String(pattern)), None)
                .await;
        }
    }

    /// The synthesized per-emit callback: its first completion emits the
    /// derived result or error topic, annotated with the original data as
    /// `ctx`.
    fn synthesized_responder(self: &Arc<Self>, topic_str: &str, data: &Option<Value>) -> Responder {
        let weak = Arc::downgrade(self);
        let topic_str = topic_str.to_string();
        let ctx = data.clone();
        Responder::from_fn(move |outcome| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let (derived, payload) = match outcome {
                EmitOutcome::Success(result) => (
                    topics::result_topic(&topic_str),
                    json!({ "result": result, "ctx": ctx }),
                ),
                EmitOutcome::Error(message) => (
                    topics::error_topic(&topic_str),
                    json!({ "message": message, "ctx": ctx }),
                ),
            };
            tokio::spawn((&shared).emit(&derived, Some(payload), None));
        })
    }

    /// Start-time error reporting: the error flows to the caller and is
    /// mirrored as an `error::*` event.
    pub(crate) async fn report_start_error(self: &Arc<Self>, err: &HookError) {
        let topic_name = match err {
            HookError::Resolve { .. } => topics::ERROR_RESOLVE,
            HookError::Bind(_) => topics::ERROR_BIND,
            _ => topics::ERROR_UNKNOWN,
        };
        self.emit(
            topic_name,
            Some(json!({ "message": err.to_string() })),
            None,
        )
        .await;
    }
}
