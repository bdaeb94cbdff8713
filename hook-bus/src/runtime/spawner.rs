//! Seam for the external child-process supervisor.
//!
//! Spawning and supervising child hooks is outside this crate. The runtime
//! calls `spawn_children` once its own role is established and defers
//! `hook::ready` until the supervisor emits `children::ready` on the hook.
//! `HookConfig::to_cli_args` produces the option serialization a supervisor
//! passes to each child process.

use crate::config::ChildSpec;
use crate::runtime::Hook;
use crate::HookError;
use async_trait::async_trait;

/// External supervisor for the child hooks named in the configuration.
#[async_trait]
pub trait ChildSupervisor: Send + Sync {
    /// Spawns every configured child. The supervisor emits `children::ready`
    /// on `hook` once all of them reported in, and may record each child via
    /// [`Hook::register_child`].
    async fn spawn_children(&self, hook: &Hook, children: &[ChildSpec]) -> Result<(), HookError>;

    /// Stops one named child.
    async fn stop_child(&self, name: &str) -> Result<(), HookError>;
}
