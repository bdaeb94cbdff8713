//! The broker's broadcast intercept.
//!
//! Installed as a global intercept on the broker's emitter, it runs for every
//! local emission and fans out to connected clients. The first topic segment
//! names the origin peer; the origin never receives its own event back. Each
//! remaining peer is asked over the wire whether it holds a matching listener
//! before any payload is sent, so no undeliverable traffic crosses the wire.

use crate::emitter::{is_meta_topic, EmitIntercept, Responder};
use crate::observability::events;
use crate::runtime::hook::HookShared;
use hook_wire::topic;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Weak;
use tracing::{debug, warn};

const COMPONENT: &str = "broadcast";

pub(crate) struct BroadcastIntercept {
    shared: Weak<HookShared>,
}

impl BroadcastIntercept {
    pub(crate) fn new(shared: Weak<HookShared>) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl EmitIntercept for BroadcastIntercept {
    async fn on_emit(&self, emitted: &str, data: Option<&Value>, responder: &Responder) {
        // Reserved meta topics never cross the wire through the broadcast.
        if is_meta_topic(emitted) {
            return;
        }
        let Some(shared) = self.shared.upgrade() else {
            return;
        };

        let parts = topic::split(emitted);
        let origin = parts.first().copied().unwrap_or_default().to_string();

        // A single-segment topic has no origin prefix yet; it goes on the
        // wire qualified with the broker's own name.
        let wire_topic = if parts.len() == 1 {
            let own_name = shared.name.read().await.clone();
            topic::qualify(&own_name, emitted)
        } else {
            emitted.to_string()
        };
        let wire_parts: Vec<String> = topic::split(&wire_topic)
            .into_iter()
            .map(str::to_string)
            .collect();

        for (peer_name, link) in shared.registry.connected_peers().await {
            if peer_name == origin {
                debug!(
                    event = events::BROADCAST_SKIP_ORIGIN,
                    component = COMPONENT,
                    peer = peer_name.as_str(),
                    topic = emitted,
                    "suppressing echo to origin"
                );
                continue;
            }

            match link.has_event(wire_parts.clone()).await {
                Ok(true) => {
                    for bound in &shared.aux {
                        if let Err(err) = bound
                            .transport
                            .message(&bound.options, &wire_topic, data)
                            .await
                        {
                            warn!(
                                event = events::AUX_SEND_FAILED,
                                component = COMPONENT,
                                transport = bound.kind.as_str(),
                                topic = wire_topic.as_str(),
                                err = %err,
                                "aux transport failed during broadcast"
                            );
                        }
                    }
                    debug!(
                        event = events::BROADCAST_FORWARD,
                        component = COMPONENT,
                        peer = peer_name.as_str(),
                        topic = wire_topic.as_str(),
                        "forwarding to subscribed peer"
                    );
                    link.message(wire_topic.clone(), data.cloned(), responder.clone());
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        event = events::BROADCAST_QUERY_FAILED,
                        component = COMPONENT,
                        peer = peer_name.as_str(),
                        topic = wire_topic.as_str(),
                        err = %err,
                        "has_event query failed; skipping peer"
                    );
                }
            }
        }
    }
}
