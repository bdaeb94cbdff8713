//! Auxiliary transport adapters.
//!
//! Implementations live outside this crate; the emit pipeline only consumes
//! the fixed `message` contract. Configured `{type, options}` pairs resolve
//! through a factory registry keyed by transport type.

use crate::config::TransportSpec;
use crate::HookError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A pluggable message sink invoked in addition to the primary RPC path.
#[async_trait]
pub trait AuxTransport: Send + Sync {
    /// Delivers one qualified topic plus payload.
    ///
    /// The returned value participates in the emission's single callback
    /// contract: `Ok(Some(value))` resolves it, `Err` rejects it, and
    /// `Ok(None)` leaves the callback to other recipients.
    async fn message(
        &self,
        options: &Value,
        topic: &str,
        data: Option<&Value>,
    ) -> Result<Option<Value>, HookError>;
}

/// Creates transports from their configured options.
pub trait TransportFactory: Send + Sync {
    /// Builds one transport instance.
    ///
    /// # Errors
    ///
    /// Returns an error for unusable options.
    fn create(&self, options: &Value) -> Result<Arc<dyn AuxTransport>, HookError>;
}

impl<F> TransportFactory for F
where
    F: Fn(&Value) -> Result<Arc<dyn AuxTransport>, HookError> + Send + Sync,
{
    fn create(&self, options: &Value) -> Result<Arc<dyn AuxTransport>, HookError> {
        self(options)
    }
}

/// Wraps a plain closure as a [`TransportFactory`].
pub fn factory_fn<F>(f: F) -> Arc<dyn TransportFactory>
where
    F: Fn(&Value) -> Result<Arc<dyn AuxTransport>, HookError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One resolved transport with the options threaded into each call.
pub(crate) struct BoundTransport {
    pub(crate) kind: String,
    pub(crate) options: Value,
    pub(crate) transport: Arc<dyn AuxTransport>,
}

/// Factory registry keyed by transport type.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: HashMap<String, Arc<dyn TransportFactory>>,
}

impl TransportRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a type key, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, factory: Arc<dyn TransportFactory>) {
        self.factories.insert(kind.into(), factory);
    }

    /// Resolves one configured transport.
    pub(crate) fn resolve(&self, spec: &TransportSpec) -> Result<BoundTransport, HookError> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| HookError::UnknownTransport(spec.kind.clone()))?;
        Ok(BoundTransport {
            kind: spec.kind.clone(),
            options: spec.options.clone(),
            transport: factory.create(&spec.options)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NullTransport;

    #[async_trait]
    impl AuxTransport for NullTransport {
        async fn message(
            &self,
            _options: &Value,
            _topic: &str,
            _data: Option<&Value>,
        ) -> Result<Option<Value>, HookError> {
            Ok(None)
        }
    }

    #[test]
    fn resolve_uses_the_registered_factory() {
        let mut registry = TransportRegistry::new();
        registry.register(
            "null",
            factory_fn(|_options| Ok(Arc::new(NullTransport) as Arc<dyn AuxTransport>)),
        );

        let bound = registry
            .resolve(&TransportSpec {
                kind: "null".into(),
                options: json!({"retain": false}),
            })
            .unwrap();
        assert_eq!(bound.kind, "null");
        assert_eq!(bound.options, json!({"retain": false}));
    }

    #[test]
    fn unknown_type_key_is_an_error() {
        let registry = TransportRegistry::new();
        let err = registry
            .resolve(&TransportSpec {
                kind: "store".into(),
                options: Value::Null,
            })
            .err();
        assert!(matches!(err, Some(HookError::UnknownTransport(kind)) if kind == "store"));
    }
}
