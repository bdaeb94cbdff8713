// Each integration test crate compiles this module separately and uses a
// different subset of helpers.
#![allow(dead_code)]

use hook_bus::{listener_fn, Event, Hook, HookConfig, HookListener};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Optional logging for local debugging; quiet unless RUST_LOG is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Starts a broker on an ephemeral port and returns it plus the bound port.
pub async fn start_broker(name: &str) -> (Hook, u16) {
    let broker = Hook::new(HookConfig::named(name, 0)).expect("broker should build");
    broker.start().await.expect("broker should start");
    let port = broker.local_port().await.expect("broker should have a port");
    (broker, port)
}

/// Starts a client of the broker on `port`.
pub async fn start_client(name: &str, port: u16) -> Hook {
    let client = Hook::new(HookConfig::named(name, port)).expect("client should build");
    client.start().await.expect("client should start");
    client
}

/// A listener that forwards every delivery into a channel.
pub fn recording_listener() -> (Arc<dyn HookListener>, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = listener_fn(move |event| {
        let _ = tx.send(event);
    });
    (listener, rx)
}

/// Polls `condition` until it holds or the deadline passes.
pub async fn wait_until<C, F>(what: &str, condition: C)
where
    C: Fn() -> F,
    F: Future<Output = bool>,
{
    let deadline = Duration::from_secs(3);
    let result = tokio::time::timeout(deadline, async {
        loop {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}

/// Gives in-flight wire traffic a moment to land.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}
