//! Lifecycle topic names emitted by the hook runtime.

/// The broker bound its listening socket; payload is the port.
pub const HOOK_LISTENING: &str = "hook::listening";
/// Either role finished starting; payload is the port.
pub const HOOK_STARTED: &str = "hook::started";
/// The hook (and any configured children) is ready for traffic.
pub const HOOK_READY: &str = "hook::ready";
/// A client established its upstream connection; payload is the port.
pub const HOOK_CONNECTED: &str = "hook::connected";
/// A peer's connection ended; payload is the peer name.
pub const HOOK_DISCONNECTED: &str = "hook::disconnected";

/// An inbound connection was accepted.
pub const CONNECTION_OPEN: &str = "connection::open";
/// A connection ended.
pub const CONNECTION_END: &str = "connection::end";

/// Every configured child hook reported in; gates `hook::ready`.
pub const CHILDREN_READY: &str = "children::ready";

/// A bind failure that could not be recovered.
pub const ERROR_BIND: &str = "error::bind";
/// Host resolution failed.
pub const ERROR_RESOLVE: &str = "error::resolve";
/// Any other runtime failure.
pub const ERROR_UNKNOWN: &str = "error::unknown";

/// The external installer started fetching a hook package.
pub const NPM_INSTALLING: &str = "npm::installing";
/// The external installer finished.
pub const NPM_INSTALLED: &str = "npm::installed";
/// The external installer failed.
pub const NPM_INSTALL_ERROR: &str = "npm::install::error";

/// The derived success topic for a synthesized per-emit callback.
#[must_use]
pub fn result_topic(topic: &str) -> String {
    format!("{topic}{}result", hook_wire::topic::DELIMITER)
}

/// The derived failure topic for a synthesized per-emit callback.
#[must_use]
pub fn error_topic(topic: &str) -> String {
    format!("{topic}{}error", hook_wire::topic::DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_topics_append_one_segment() {
        assert_eq!(result_topic("job"), "job::result");
        assert_eq!(error_topic("job::run"), "job::run::error");
    }
}
