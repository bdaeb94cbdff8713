//! Hook configuration.
//!
//! The runtime accepts an already-materialized configuration object; loading
//! from files or key/value stores is an external concern. Recognized keys keep
//! their wire spellings (`hook-port`, `hook-host`, …) through serde renames so
//! a JSON object produced by any loader deserializes directly.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// One configured auxiliary transport.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportSpec {
    /// The factory key this transport is resolved by.
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque options handed to every `message` call.
    #[serde(default)]
    pub options: Value,
}

/// One child hook the external spawner should run.
#[derive(Debug, Clone, Deserialize)]
pub struct ChildSpec {
    /// Child name, unique within this hook.
    pub name: String,
    /// Remaining options, serialized onto the child's command line.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// Materialized hook configuration.
///
/// Alternate key spellings (`hook-name`, `hook-type`, `no-config`) are folded
/// onto their canonical names by [`HookConfig::from_value`]; with a flattened
/// catch-all field, serde's own alias matching cannot be relied on.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Requested hook name; the broker may rewrite it at connect time.
    pub name: String,
    /// Opaque hook type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Port to listen on, or to connect to when falling back to client role.
    #[serde(rename = "hook-port")]
    pub port: u16,
    /// Host to bind or connect to.
    #[serde(rename = "hook-host")]
    pub host: String,
    /// Optional local-socket path, for transports that support it.
    #[serde(rename = "hook-socket")]
    pub socket: Option<PathBuf>,
    /// Verbose runtime logging.
    pub debug: bool,
    /// Suppress child output.
    pub quiet: bool,
    /// Skip external configuration loading entirely.
    #[serde(rename = "noConfig")]
    pub no_config: bool,
    /// Auxiliary transports to resolve at start.
    pub transports: Vec<TransportSpec>,
    /// Child hooks for the external spawner.
    pub hooks: Vec<ChildSpec>,
    /// Unrecognized keys, carried through to CLI serialization.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            name: "no-name".into(),
            kind: "hook".into(),
            port: 5000,
            host: "127.0.0.1".into(),
            socket: None,
            debug: false,
            quiet: false,
            no_config: false,
            transports: Vec::new(),
            hooks: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl HookConfig {
    /// Builds a configuration from a materialized JSON object, accepting both
    /// canonical and alternate key spellings.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error for malformed values.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(normalize_aliases(value))
    }

    /// Convenience constructor for the common name/port pair.
    #[must_use]
    pub fn named(name: &str, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            ..Self::default()
        }
    }

    /// Serializes this configuration the way the external spawner passes it
    /// to a child process: `--hook-port N --hook-host H --hook-name N
    /// --hook-type T` for the reserved keys and `--<key> <value>` otherwise.
    /// Object values are rendered as compact JSON.
    #[must_use]
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![
            "--hook-port".into(),
            self.port.to_string(),
            "--hook-host".into(),
            self.host.clone(),
            "--hook-name".into(),
            self.name.clone(),
            "--hook-type".into(),
            self.kind.clone(),
        ];

        if let Some(socket) = &self.socket {
            args.push("--hook-socket".into());
            args.push(socket.display().to_string());
        }
        if self.debug {
            args.push("--debug".into());
            args.push("true".into());
        }
        if self.quiet {
            args.push("--quiet".into());
            args.push("true".into());
        }
        if self.no_config {
            args.push("--noConfig".into());
            args.push("true".into());
        }

        for (key, value) in &self.extra {
            args.push(format!("--{key}"));
            args.push(cli_value(value));
        }

        args
    }
}

/// Folds alternate key spellings onto their canonical names; an explicit
/// canonical key wins over its alias.
fn normalize_aliases(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        for (alias, canonical) in [
            ("hook-name", "name"),
            ("hook-type", "type"),
            ("no-config", "noConfig"),
        ] {
            if let Some(aliased) = map.remove(alias) {
                map.entry(canonical.to_string()).or_insert(aliased);
            }
        }
    }
    value
}

/// Renders one option value for the command line; scalars stay bare, compound
/// values become compact JSON.
fn cli_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
