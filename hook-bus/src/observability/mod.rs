//! Structured-logging conventions shared across the crate.
//!
//! The library emits `tracing` events and never installs a global subscriber;
//! binaries and tests own one-time `tracing_subscriber` initialization.

pub mod events;
