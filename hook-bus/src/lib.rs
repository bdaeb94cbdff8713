//! # hook-bus
//!
//! `hook-bus` implements a distributed event bus for cooperating processes
//! ("hooks"). Every hook embeds an event emitter with hierarchical,
//! wildcard-capable topic routing; one hook in a group binds the configured
//! port and becomes the broker, the others connect as clients, and together
//! they observe and react to each other's events as if all listeners lived in
//! one address space.
//!
//! Typical usage is API-first and remains centered on [`Hook`] and
//! [`HookConfig`]. Internal modules are organized by domain layer to keep
//! behavior ownership explicit.
//!
//! ## Quick start
//!
//! ```
//! use hook_bus::{listener_fn, Hook, HookConfig};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let hook = Hook::new(HookConfig::named("local", 0)).unwrap();
//!
//! let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
//! hook.on(
//!     "greeting::*",
//!     listener_fn(move |event| {
//!         let _ = seen_tx.send(event.topic);
//!     }),
//! )
//! .await;
//!
//! hook.emit("greeting::hello", None).await;
//! assert_eq!(seen_rx.recv().await.as_deref(), Some("greeting::hello"));
//! # });
//! ```
//!
//! Starting the same configuration twice demonstrates role resolution: the
//! first `start` binds and becomes the broker, the second hits port
//! contention and connects as a client. From then on the broker mirrors each
//! client's listener changes and forwards an event across the wire only to
//! peers whose topic tree matches it.
//!
//! ## Internal architecture map
//!
//! - API facade: outward [`Hook`] / [`HookBuilder`] surface
//! - Emitter: topic tree, wildcard matching, reply handles, meta-events
//! - Control plane: the broker's peer registry and subscription mirror
//! - RPC: framed duplex connections, the accept loop, pending-reply tables
//! - Runtime: role lifecycle, the shared emit pipeline, the broadcast
//!   intercept, the external spawner seam
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events. Library code emits
//! events/spans and does not unconditionally initialize a global subscriber.
//! Binaries and tests are responsible for one-time `tracing_subscriber`
//! initialization at process boundaries.

mod config;
mod control_plane;
mod emitter;
mod error;
mod observability;
mod resolve;
mod rpc;
mod runtime;
pub mod topics;
mod transport;

pub use config::{ChildSpec, HookConfig, TransportSpec};
pub use control_plane::{PeerInfo, SubscriptionChange};
pub use emitter::{
    is_meta_topic, listener_fn, EmitIntercept, EmitOutcome, Event, HookListener, Responder,
    ALL_LISTENERS_REMOVED, LISTENER_ADDED, LISTENER_REMOVED,
};
pub use error::HookError;
pub use runtime::{ChildSupervisor, Hook, HookBuilder, Role};
pub use transport::{factory_fn, AuxTransport, TransportFactory, TransportRegistry};

pub use hook_wire::{topic, Version};
