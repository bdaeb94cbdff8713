//! Listener bookkeeping and local delivery.

use crate::emitter::topic_tree::{MatchedListener, TopicTree};
use crate::emitter::{EmitIntercept, Event, HookListener, Responder};
use hook_wire::topic;
use serde_json::Value;
use std::sync::Arc;

/// Snapshot of one local delivery, taken under the emitter lock and executed
/// after it is released so listeners may re-enter the emitter.
pub(crate) struct LocalDelivery {
    pub(crate) listeners: Vec<MatchedListener>,
    pub(crate) intercepts: Vec<Arc<dyn EmitIntercept>>,
    /// One entry per expired once-listener, carrying its pattern.
    pub(crate) expired: Vec<String>,
}

/// Owns the topic tree and the global intercept list.
pub(crate) struct EmitterCore {
    tree: TopicTree,
    intercepts: Vec<Arc<dyn EmitIntercept>>,
}

impl EmitterCore {
    pub(crate) fn new() -> Self {
        Self {
            tree: TopicTree::new(),
            intercepts: Vec::new(),
        }
    }

    /// Registers a listener. Returns `true` when it is the first at `pattern`.
    pub(crate) fn on(&mut self, pattern: &str, listener: Arc<dyn HookListener>) -> bool {
        self.tree.add(pattern, listener, false)
    }

    /// Registers a listener removed after its first delivery. Returns `true`
    /// when it is the first at `pattern`.
    pub(crate) fn once(&mut self, pattern: &str, listener: Arc<dyn HookListener>) -> bool {
        self.tree.add(pattern, listener, true)
    }

    /// Removes one listener by identity. Returns `true` when removed.
    pub(crate) fn off(&mut self, pattern: &str, listener: &Arc<dyn HookListener>) -> bool {
        self.tree.remove(pattern, listener)
    }

    /// Removes every listener at `pattern`. Returns how many were removed.
    pub(crate) fn remove_all(&mut self, pattern: &str) -> usize {
        self.tree.remove_all(pattern)
    }

    /// Drops every listener, keeping installed intercepts.
    pub(crate) fn clear_listeners(&mut self) {
        self.tree.clear();
    }

    /// Drops every listener and intercept.
    pub(crate) fn clear(&mut self) {
        self.tree.clear();
        self.intercepts.clear();
    }

    pub(crate) fn listeners_at(&self, pattern: &str) -> Vec<Arc<dyn HookListener>> {
        self.tree.listeners_at(pattern)
    }

    pub(crate) fn enumerate(&self) -> Vec<String> {
        self.tree.enumerate()
    }

    pub(crate) fn matches_any(&self, parts: &[&str]) -> bool {
        self.tree.matches_any(parts)
    }

    /// Installs a global intercept called for every local delivery.
    pub(crate) fn add_intercept(&mut self, intercept: Arc<dyn EmitIntercept>) {
        self.intercepts.push(intercept);
    }

    /// Collects the matching listeners for `topic` and consumes expired
    /// once-entries from the tree.
    pub(crate) fn prepare_delivery(&mut self, topic_str: &str) -> LocalDelivery {
        let parts = topic::split(topic_str);
        let listeners = self.tree.matches(&parts);

        let mut expired = Vec::new();
        for matched in &listeners {
            if matched.entry.once {
                self.tree.remove(&matched.pattern, &matched.entry.listener);
                expired.push(matched.pattern.clone());
            }
        }

        LocalDelivery {
            listeners,
            intercepts: self.intercepts.clone(),
            expired,
        }
    }
}

/// Invokes a prepared delivery: listeners first, then the intercepts.
pub(crate) async fn run_delivery(
    delivery: &LocalDelivery,
    topic_str: &str,
    data: &Option<Value>,
    responder: &Responder,
) {
    for matched in &delivery.listeners {
        matched
            .entry
            .listener
            .on_event(Event {
                topic: topic_str.to_string(),
                data: data.clone(),
                responder: responder.clone(),
            })
            .await;
    }
    for intercept in &delivery.intercepts {
        intercept.on_emit(topic_str, data.as_ref(), responder).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::listener_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Arc<dyn HookListener>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let listener = listener_fn(move |_event| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (listener, count)
    }

    #[tokio::test]
    async fn once_listener_fires_a_single_time_and_expires() {
        let mut core = EmitterCore::new();
        let (listener, count) = counting();
        core.once("job::done", listener);

        let first = core.prepare_delivery("job::done");
        run_delivery(&first, "job::done", &None, &Responder::noop()).await;
        assert_eq!(first.expired, vec!["job::done".to_string()]);

        let second = core.prepare_delivery("job::done");
        run_delivery(&second, "job::done", &None, &Responder::noop()).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(second.listeners.is_empty());
    }

    #[tokio::test]
    async fn intercept_sees_every_delivery() {
        struct Spy(Arc<AtomicUsize>);

        #[async_trait::async_trait]
        impl EmitIntercept for Spy {
            async fn on_emit(&self, _topic: &str, _data: Option<&Value>, _responder: &Responder) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut core = EmitterCore::new();
        let count = Arc::new(AtomicUsize::new(0));
        core.add_intercept(Arc::new(Spy(count.clone())));

        let delivery = core.prepare_delivery("anything::at::all");
        run_delivery(&delivery, "anything::at::all", &None, &Responder::noop()).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn on_reports_first_listener_for_subscription_sync() {
        let mut core = EmitterCore::new();
        let (first, _) = counting();
        let (second, _) = counting();

        assert!(core.on("alpha::*", first));
        assert!(!core.on("alpha::*", second));
        assert_eq!(core.enumerate(), vec!["alpha::*".to_string()]);
    }
}
