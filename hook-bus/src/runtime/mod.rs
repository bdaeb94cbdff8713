//! The hook runtime: lifecycle, role resolution and the shared emit pipeline.

mod broadcast;
mod hook;
mod sessions;
mod spawner;

pub use hook::{Hook, HookBuilder, Role};
pub use spawner::ChildSupervisor;
