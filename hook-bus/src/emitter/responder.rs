//! Single-fire reply handles threaded through every emission.
//!
//! One emission fans out through several asynchronous channels — local
//! listeners, the upstream connection, auxiliary transports, the broker's
//! broadcast — under a single callback contract. Every recipient holds a clone
//! of the same [`Responder`]; the first completion wins and later calls are
//! dropped silently.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// How one emission completed.
#[derive(Debug, Clone, PartialEq)]
pub enum EmitOutcome {
    /// A handler completed and optionally produced a result value.
    Success(Option<Value>),
    /// A handler reported an error.
    Error(String),
}

type ReplySink = Box<dyn FnOnce(EmitOutcome) + Send>;

/// Cloneable handle that delivers at most one [`EmitOutcome`].
#[derive(Clone)]
pub struct Responder {
    slot: Arc<Mutex<Option<ReplySink>>>,
}

impl Responder {
    /// A responder that discards its outcome.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Wraps a closure invoked with the first outcome.
    pub fn from_fn<F>(sink: F) -> Self
    where
        F: FnOnce(EmitOutcome) + Send + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(sink)))),
        }
    }

    /// A responder paired with a receiver for the first outcome.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<EmitOutcome>) {
        let (tx, rx) = oneshot::channel();
        let responder = Self::from_fn(move |outcome| {
            let _ = tx.send(outcome);
        });
        (responder, rx)
    }

    /// Reports success with an optional result value.
    pub fn resolve(&self, result: Option<Value>) {
        self.fire(EmitOutcome::Success(result));
    }

    /// Reports an error.
    pub fn reject(&self, message: impl Into<String>) {
        self.fire(EmitOutcome::Error(message.into()));
    }

    /// `true` while no outcome has fired and a sink is still waiting.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Delivers `outcome` to the sink if nothing fired before.
    pub fn fire(&self, outcome: EmitOutcome) {
        let Ok(mut slot) = self.slot.lock() else {
            return;
        };
        if let Some(sink) = slot.take() {
            sink(outcome);
        }
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let armed = self
            .slot
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        f.debug_struct("Responder").field("armed", &armed).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn first_outcome_wins_and_later_calls_are_dropped() {
        let (responder, rx) = Responder::channel();
        let twin = responder.clone();

        responder.resolve(Some(json!(1)));
        twin.reject("too late");

        assert_eq!(rx.await.unwrap(), EmitOutcome::Success(Some(json!(1))));
    }

    #[tokio::test]
    async fn noop_responder_tolerates_any_number_of_calls() {
        let responder = Responder::noop();
        responder.resolve(None);
        responder.reject("ignored");
    }
}
