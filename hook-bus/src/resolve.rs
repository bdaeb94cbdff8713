//! Host resolution used during bind and connect.

use crate::observability::events;
use crate::HookError;
use std::net::{IpAddr, SocketAddr};
use tracing::warn;

const COMPONENT: &str = "resolve";

/// Resolves `host` to socket addresses on `port`.
///
/// An IPv4/IPv6 literal short-circuits resolution; anything else goes through
/// DNS. An empty result set is an error.
pub(crate) async fn resolve_host(host: &str, port: u16) -> Result<Vec<SocketAddr>, HookError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let resolved = tokio::net::lookup_host((host, port)).await;
    match resolved {
        Ok(addrs) => {
            let addrs: Vec<SocketAddr> = addrs.collect();
            if addrs.is_empty() {
                warn!(
                    event = events::RESOLVE_FAILED,
                    component = COMPONENT,
                    host,
                    reason = "empty_result",
                    "resolution returned no addresses"
                );
                Err(HookError::Resolve {
                    host: host.to_string(),
                    reason: "resolution returned no addresses".into(),
                })
            } else {
                Ok(addrs)
            }
        }
        Err(err) => {
            warn!(
                event = events::RESOLVE_FAILED,
                component = COMPONENT,
                host,
                err = %err,
                "resolution failed"
            );
            Err(HookError::Resolve {
                host: host.to_string(),
                reason: err.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ipv4_literal_short_circuits() {
        let addrs = resolve_host("127.0.0.1", 5000).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:5000".parse().unwrap()]);
    }

    #[tokio::test]
    async fn ipv6_literal_short_circuits() {
        let addrs = resolve_host("::1", 5000).await.unwrap();
        assert_eq!(addrs[0].port(), 5000);
        assert!(addrs[0].is_ipv6());
    }

    #[tokio::test]
    async fn unresolvable_host_is_a_resolve_error() {
        let err = resolve_host("no-such-host.invalid", 5000).await.err();
        assert!(matches!(err, Some(HookError::Resolve { .. })));
    }
}
