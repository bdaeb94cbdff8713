//! Broker-side control plane: the peer registry and subscription mirror.

mod registry;

pub use registry::{PeerInfo, SubscriptionChange};
pub(crate) use registry::{PeerLink, Registry};
