//! The subscription mirror: name assignment, propagation of listener changes
//! to the broker, delivery gating and echo suppression.

mod support;

use serde_json::json;
use support::{recording_listener, settle, start_broker, start_client, wait_until};

#[tokio::test(flavor = "multi_thread")]
async fn requested_names_are_uniquified_and_adopted_by_clients() {
    let (broker, port) = start_broker("hub").await;

    let first = start_client("worker", port).await;
    let second = start_client("worker", port).await;

    assert_eq!(first.name().await, "worker");
    assert_eq!(second.name().await, "worker-0");

    let mut peers = broker.peer_names().await;
    peers.sort();
    assert_eq!(peers, vec!["worker".to_string(), "worker-0".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn the_brokers_own_name_is_reserved() {
    let (_broker, port) = start_broker("worker").await;
    let client = start_client("worker", port).await;
    assert_eq!(client.name().await, "worker-0");
}

#[tokio::test(flavor = "multi_thread")]
async fn listener_changes_propagate_into_the_brokers_mirror() {
    let (broker, port) = start_broker("hub").await;
    let client = start_client("worker", port).await;

    let (listener, mut received) = recording_listener();
    client.on("alpha::*", listener.clone()).await;

    wait_until("mirror contains alpha::*", || async {
        broker
            .mirrored_subscriptions("worker")
            .await
            .contains(&"alpha::*".to_string())
    })
    .await;

    broker.emit("alpha::one", Some(json!({"v": 1}))).await;

    let event = tokio::time::timeout(std::time::Duration::from_secs(3), received.recv())
        .await
        .expect("subscribed client should receive the event")
        .expect("listener channel should stay open");
    assert_eq!(event.topic, "alpha::one");
    assert_eq!(event.data, Some(json!({"v": 1})));
}

#[tokio::test(flavor = "multi_thread")]
async fn unsubscribing_gates_further_deliveries() {
    let (broker, port) = start_broker("hub").await;
    let client = start_client("worker", port).await;

    let (listener, mut received) = recording_listener();
    client.on("alpha::*", listener.clone()).await;
    wait_until("mirror contains alpha::*", || async {
        broker.mirrored_subscription_count("worker", "alpha::*").await == 1
    })
    .await;

    broker.emit("alpha::one", Some(json!({"v": 1}))).await;
    assert!(received.recv().await.is_some());

    assert!(client.off("alpha::*", &listener).await);
    wait_until("mirror drops alpha::*", || async {
        broker.mirrored_subscription_count("worker", "alpha::*").await == 0
    })
    .await;

    broker.emit("alpha::one", Some(json!({"v": 2}))).await;
    settle().await;
    assert!(
        received.try_recv().is_err(),
        "no message may reach an unsubscribed peer"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn paired_add_and_remove_leave_the_mirror_count_unchanged() {
    let (broker, port) = start_broker("hub").await;
    let client = start_client("worker", port).await;

    let (first, _rx_one) = recording_listener();
    let (second, _rx_two) = recording_listener();

    client.on("jobs::*", first.clone()).await;
    wait_until("count reaches one", || async {
        broker.mirrored_subscription_count("worker", "jobs::*").await == 1
    })
    .await;

    client.on("jobs::*", second.clone()).await;
    wait_until("count reaches two", || async {
        broker.mirrored_subscription_count("worker", "jobs::*").await == 2
    })
    .await;

    client.off("jobs::*", &second).await;
    wait_until("count returns to one", || async {
        broker.mirrored_subscription_count("worker", "jobs::*").await == 1
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_all_clears_one_pattern_from_the_mirror() {
    let (broker, port) = start_broker("hub").await;
    let client = start_client("worker", port).await;

    let (first, _rx_one) = recording_listener();
    let (second, _rx_two) = recording_listener();
    client.on("jobs::*", first).await;
    client.on("jobs::*", second).await;
    wait_until("mirror holds both listeners", || async {
        broker.mirrored_subscription_count("worker", "jobs::*").await == 2
    })
    .await;

    client.remove_all(Some("jobs::*")).await;
    wait_until("mirror drops the pattern", || async {
        broker.mirrored_subscription_count("worker", "jobs::*").await == 0
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn the_origin_never_receives_its_own_event_back() {
    let (_broker, port) = start_broker("hub").await;
    let sender = start_client("sender", port).await;
    let observer = start_client("observer", port).await;

    let (sender_listener, mut sender_rx) = recording_listener();
    let (observer_listener, mut observer_rx) = recording_listener();
    sender.on("**", sender_listener).await;
    observer.on("**", observer_listener).await;
    settle().await;

    sender.emit("solo", Some(json!(1))).await;

    // The observer sees the qualified event; a `**` listener also catches
    // local meta deliveries, so scan for the forwarded topic.
    let event = tokio::time::timeout(std::time::Duration::from_secs(3), async {
        loop {
            let event = observer_rx.recv().await.expect("listener channel open");
            if event.topic == "sender::solo" {
                return event;
            }
        }
    })
    .await
    .expect("observer should receive the forwarded event");
    assert_eq!(event.data, Some(json!(1)));

    // The sender saw its own local delivery, but never the broker's echo.
    settle().await;
    let mut sender_topics = Vec::new();
    while let Ok(event) = sender_rx.try_recv() {
        sender_topics.push(event.topic);
    }
    assert!(sender_topics.contains(&"solo".to_string()));
    assert!(
        !sender_topics.contains(&"sender::solo".to_string()),
        "echo to origin must be suppressed"
    );
}
