//! The embedded event emitter: listener storage, wildcard matching, reply
//! handles and the reserved subscription meta-events.

mod core;
mod responder;
mod topic_tree;

pub(crate) use self::core::{run_delivery, EmitterCore};
pub use responder::{EmitOutcome, Responder};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Emitted for each listener added at a pattern.
pub const LISTENER_ADDED: &str = "listener-added";
/// Emitted for each listener removed from a pattern.
pub const LISTENER_REMOVED: &str = "listener-removed";
/// Emitted when every listener at a pattern is removed at once.
pub const ALL_LISTENERS_REMOVED: &str = "all-listeners-removed";

/// Returns `true` for the reserved subscription meta-topics.
///
/// Meta-events feed the subscription-sync machinery only; they never reach
/// auxiliary transports or the cross-peer broadcast.
#[must_use]
pub fn is_meta_topic(topic: &str) -> bool {
    matches!(
        topic,
        LISTENER_ADDED | LISTENER_REMOVED | ALL_LISTENERS_REMOVED
    )
}

/// One delivered event.
#[derive(Clone, Debug)]
pub struct Event {
    /// The concrete topic the event was emitted under.
    pub topic: String,
    /// Opaque payload.
    pub data: Option<Value>,
    /// Single-fire reply handle shared by every recipient of this emission.
    pub responder: Responder,
}

/// A listener bound at a topic pattern.
#[async_trait]
pub trait HookListener: Send + Sync {
    async fn on_event(&self, event: Event);
}

/// Global intercept invoked for every local emission.
#[async_trait]
pub trait EmitIntercept: Send + Sync {
    async fn on_emit(&self, topic: &str, data: Option<&Value>, responder: &Responder);
}

struct FnListener<F>(F);

#[async_trait]
impl<F> HookListener for FnListener<F>
where
    F: Fn(Event) + Send + Sync,
{
    async fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

/// Wraps a plain closure as a [`HookListener`].
pub fn listener_fn<F>(f: F) -> Arc<dyn HookListener>
where
    F: Fn(Event) + Send + Sync + 'static,
{
    Arc::new(FnListener(f))
}
