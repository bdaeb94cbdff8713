//! Peer registry storage owner.
//!
//! The broker keeps one record per known peer, keyed by RPC session id so the
//! connection's end event can drop the record without back-pointers. Each
//! record mirrors the peer's subscriptions as a multiset of topic patterns:
//! adds increment, removes decrement and delete at zero, so paired listener
//! changes on the peer leave the mirror at its prior count.

use crate::emitter::{
    Responder, ALL_LISTENERS_REMOVED, LISTENER_ADDED, LISTENER_REMOVED,
};
use crate::observability::events;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

const COMPONENT: &str = "registry";

/// A peer's exported RPC methods, as seen from the broker.
#[async_trait]
pub(crate) trait PeerLink: Send + Sync {
    /// Asks the peer whether any of its listeners match the topic segments.
    async fn has_event(&self, parts: Vec<String>) -> Result<bool, crate::HookError>;

    /// Delivers a qualified topic plus payload; the responder receives the
    /// peer's reply.
    fn message(&self, topic: String, data: Option<Value>, responder: Responder);

    /// Tears the underlying connection down.
    fn close(&self);
}

/// One listener-change notification mirrored into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    /// First listener added at a pattern.
    Added,
    /// One listener removed from a pattern.
    Removed,
    /// Every listener at a pattern removed at once.
    RemovedAll,
}

impl SubscriptionChange {
    /// Maps a reserved meta-topic onto the change it describes.
    #[must_use]
    pub fn from_meta_topic(topic: &str) -> Option<Self> {
        match topic {
            LISTENER_ADDED => Some(Self::Added),
            LISTENER_REMOVED => Some(Self::Removed),
            ALL_LISTENERS_REMOVED => Some(Self::RemovedAll),
            _ => None,
        }
    }
}

/// Introspection summary of one registered peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Assigned name, unique within the broker.
    pub name: String,
    /// Opaque peer type.
    pub kind: String,
    /// The peer's RPC session id.
    pub session: String,
    /// Resolved remote endpoint, when known.
    pub endpoint: Option<SocketAddr>,
}

/// One known peer.
pub(crate) struct PeerRecord {
    pub(crate) name: String,
    pub(crate) kind: String,
    pub(crate) session: Uuid,
    pub(crate) remote_addr: Option<SocketAddr>,
    /// Multiset of topic patterns: pattern -> listener count.
    pub(crate) subscriptions: HashMap<String, usize>,
    /// Outbound RPC handle; the broker's self-record has none.
    pub(crate) link: Option<Arc<dyn PeerLink>>,
}

#[derive(Default)]
struct RegistryInner {
    peers: HashMap<Uuid, PeerRecord>,
}

impl RegistryInner {
    fn name_taken(&self, name: &str) -> bool {
        self.peers.values().any(|peer| peer.name == name)
    }

    /// Uniquifies a requested name: `name`, `name-0`, `name-1`, … skipping the
    /// broker's own name and every present entry.
    fn assign_name(&self, requested: &str) -> String {
        if !self.name_taken(requested) {
            return requested.to_string();
        }
        let mut suffix = 0usize;
        loop {
            let candidate = format!("{requested}-{suffix}");
            if !self.name_taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

/// Registry storage owner; mutated only through its async API.
pub(crate) struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Seeds the broker's own record. Its name is thereby reserved against
    /// client assignment.
    pub(crate) async fn seed_self(
        &self,
        session: Uuid,
        name: &str,
        kind: &str,
        addr: SocketAddr,
    ) {
        let mut inner = self.inner.lock().await;
        inner.peers.insert(
            session,
            PeerRecord {
                name: name.to_string(),
                kind: kind.to_string(),
                session,
                remote_addr: Some(addr),
                subscriptions: HashMap::new(),
                link: None,
            },
        );
    }

    /// Replaces the subscription mirror of one peer wholesale.
    pub(crate) async fn set_subscriptions(&self, session: Uuid, patterns: Vec<String>) {
        let mut inner = self.inner.lock().await;
        if let Some(peer) = inner.peers.get_mut(&session) {
            peer.subscriptions.clear();
            for pattern in patterns {
                *peer.subscriptions.entry(pattern).or_insert(0) += 1;
            }
        }
    }

    /// Creates a record from a client's report. Returns the assigned name.
    pub(crate) async fn upsert(
        &self,
        session: Uuid,
        requested_name: &str,
        kind: &str,
        remote_addr: Option<SocketAddr>,
        initial_subscriptions: &[String],
        link: Arc<dyn PeerLink>,
    ) -> String {
        let mut inner = self.inner.lock().await;
        let assigned = inner.assign_name(requested_name);

        let mut subscriptions: HashMap<String, usize> = HashMap::new();
        for pattern in initial_subscriptions {
            *subscriptions.entry(pattern.clone()).or_insert(0) += 1;
        }

        debug!(
            event = events::REGISTRY_PEER_ADDED,
            component = COMPONENT,
            peer = assigned.as_str(),
            requested = requested_name,
            session = %session,
            "registered peer"
        );

        inner.peers.insert(
            session,
            PeerRecord {
                name: assigned.clone(),
                kind: kind.to_string(),
                session,
                remote_addr,
                subscriptions,
                link: Some(link),
            },
        );
        assigned
    }

    /// Drops the record for a closed session. Returns the peer's name.
    pub(crate) async fn remove(&self, session: Uuid) -> Option<String> {
        let mut inner = self.inner.lock().await;
        let removed = inner.peers.remove(&session);
        if let Some(peer) = &removed {
            debug!(
                event = events::REGISTRY_PEER_REMOVED,
                component = COMPONENT,
                peer = peer.name.as_str(),
                session = %session,
                "removed peer"
            );
        }
        removed.map(|peer| peer.name)
    }

    pub(crate) async fn name_of(&self, session: Uuid) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.peers.get(&session).map(|peer| peer.name.clone())
    }

    /// Applies one listener-change notification to a peer's mirror.
    pub(crate) async fn adjust(
        &self,
        peer_name: &str,
        change: SubscriptionChange,
        pattern: Option<&str>,
    ) {
        let mut inner = self.inner.lock().await;
        let Some(peer) = inner
            .peers
            .values_mut()
            .find(|peer| peer.name == peer_name)
        else {
            warn!(
                event = events::SUBSCRIPTION_ADJUST,
                component = COMPONENT,
                peer = peer_name,
                change = ?change,
                reason = "unknown_peer",
                "dropping subscription adjustment for unknown peer"
            );
            return;
        };

        match (change, pattern) {
            (SubscriptionChange::Added, Some(pattern)) => {
                *peer.subscriptions.entry(pattern.to_string()).or_insert(0) += 1;
            }
            (SubscriptionChange::Removed, Some(pattern)) => {
                if let Some(count) = peer.subscriptions.get_mut(pattern) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        peer.subscriptions.remove(pattern);
                    }
                }
            }
            (SubscriptionChange::RemovedAll, Some(pattern)) => {
                peer.subscriptions.remove(pattern);
            }
            (SubscriptionChange::RemovedAll, None) => {
                peer.subscriptions.clear();
            }
            _ => {}
        }

        debug!(
            event = events::SUBSCRIPTION_ADJUST,
            component = COMPONENT,
            peer = peer_name,
            change = ?change,
            pattern = pattern.unwrap_or("*all*"),
            "adjusted subscription mirror"
        );
    }

    /// Introspection snapshot of every record, the broker's own included.
    pub(crate) async fn overview(&self) -> Vec<PeerInfo> {
        let inner = self.inner.lock().await;
        inner
            .peers
            .values()
            .map(|peer| PeerInfo {
                name: peer.name.clone(),
                kind: peer.kind.clone(),
                session: peer.session.to_string(),
                endpoint: peer.remote_addr,
            })
            .collect()
    }

    /// Snapshot of every peer holding an RPC link, for the broadcast fan-out.
    pub(crate) async fn connected_peers(&self) -> Vec<(String, Arc<dyn PeerLink>)> {
        let inner = self.inner.lock().await;
        inner
            .peers
            .values()
            .filter_map(|peer| {
                peer.link
                    .as_ref()
                    .map(|link| (peer.name.clone(), link.clone()))
            })
            .collect()
    }

    /// The mirrored subscription count for one peer and pattern.
    pub(crate) async fn subscription_count(&self, peer_name: &str, pattern: &str) -> usize {
        let inner = self.inner.lock().await;
        inner
            .peers
            .values()
            .find(|peer| peer.name == peer_name)
            .and_then(|peer| peer.subscriptions.get(pattern).copied())
            .unwrap_or(0)
    }

    /// Every mirrored pattern for one peer.
    pub(crate) async fn subscriptions_of(&self, peer_name: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .peers
            .values()
            .find(|peer| peer.name == peer_name)
            .map(|peer| peer.subscriptions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops every record.
    pub(crate) async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopLink;

    #[async_trait]
    impl PeerLink for NoopLink {
        async fn has_event(&self, _parts: Vec<String>) -> Result<bool, crate::HookError> {
            Ok(false)
        }

        fn message(&self, _topic: String, _data: Option<Value>, _responder: Responder) {}

        fn close(&self) {}
    }

    fn local_addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    async fn upsert_named(registry: &Registry, requested: &str) -> String {
        registry
            .upsert(
                Uuid::new_v4(),
                requested,
                "hook",
                None,
                &[],
                Arc::new(NoopLink),
            )
            .await
    }

    #[tokio::test]
    async fn assign_name_suffixes_on_conflict_and_skips_server_name() {
        let registry = Registry::new();
        registry
            .seed_self(Uuid::new_v4(), "worker", "hook", local_addr())
            .await;

        assert_eq!(upsert_named(&registry, "worker").await, "worker-0");
        assert_eq!(upsert_named(&registry, "worker").await, "worker-1");
        assert_eq!(upsert_named(&registry, "other").await, "other");
    }

    #[tokio::test]
    async fn add_then_remove_restores_prior_subscription_count() {
        let registry = Registry::new();
        let session = Uuid::new_v4();
        registry
            .upsert(
                session,
                "peer",
                "hook",
                None,
                &["alpha::*".into()],
                Arc::new(NoopLink),
            )
            .await;
        assert_eq!(registry.subscription_count("peer", "alpha::*").await, 1);

        registry
            .adjust("peer", SubscriptionChange::Added, Some("alpha::*"))
            .await;
        registry
            .adjust("peer", SubscriptionChange::Removed, Some("alpha::*"))
            .await;

        assert_eq!(registry.subscription_count("peer", "alpha::*").await, 1);
    }

    #[tokio::test]
    async fn remove_deletes_pattern_at_zero() {
        let registry = Registry::new();
        registry
            .upsert(
                Uuid::new_v4(),
                "peer",
                "hook",
                None,
                &["jobs".into()],
                Arc::new(NoopLink),
            )
            .await;

        registry
            .adjust("peer", SubscriptionChange::Removed, Some("jobs"))
            .await;

        assert!(registry.subscriptions_of("peer").await.is_empty());
    }

    #[tokio::test]
    async fn removed_all_without_pattern_clears_the_mirror() {
        let registry = Registry::new();
        registry
            .upsert(
                Uuid::new_v4(),
                "peer",
                "hook",
                None,
                &["a".into(), "b::c".into()],
                Arc::new(NoopLink),
            )
            .await;

        registry
            .adjust("peer", SubscriptionChange::RemovedAll, None)
            .await;

        assert!(registry.subscriptions_of("peer").await.is_empty());
    }

    #[tokio::test]
    async fn overview_includes_the_self_record() {
        let registry = Registry::new();
        let session = Uuid::new_v4();
        registry
            .seed_self(session, "hub", "hook", local_addr())
            .await;
        registry
            .upsert(
                Uuid::new_v4(),
                "worker",
                "crawler",
                None,
                &[],
                Arc::new(NoopLink),
            )
            .await;

        let mut names: Vec<String> = registry
            .overview()
            .await
            .into_iter()
            .map(|peer| peer.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["hub".to_string(), "worker".to_string()]);

        let hub = registry
            .overview()
            .await
            .into_iter()
            .find(|peer| peer.name == "hub")
            .unwrap();
        assert_eq!(hub.session, session.to_string());
        assert_eq!(hub.endpoint, Some(local_addr()));
    }

    #[tokio::test]
    async fn session_end_drops_the_record() {
        let registry = Registry::new();
        let session = Uuid::new_v4();
        registry
            .upsert(session, "peer", "hook", None, &[], Arc::new(NoopLink))
            .await;

        assert_eq!(registry.remove(session).await.as_deref(), Some("peer"));
        assert!(registry.name_of(session).await.is_none());
        assert!(registry.connected_peers().await.is_empty());
    }
}
