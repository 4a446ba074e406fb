use http::HeaderName;
use ipnet::IpNet;
use std::net::IpAddr;
use tracing::debug;

use super::headers::names;
use super::request::RequestInfo;
use crate::admission::{Identity, RoleTag};
use crate::config::IdentityConfig;
use crate::error::{GateError, Result};

/// Derives the caller identity from a request.
///
/// An `Err` means the request carried an identity the gate cannot make sense
/// of. The gate treats that as an internal fault and admits the request.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, request: &RequestInfo<'_>) -> Result<Identity>;
}

/// Reads the authenticated user from headers set by the upstream auth layer.
///
/// The network address is the TCP peer, or the rightmost untrusted
/// `X-Forwarded-For` hop when the peer is a trusted proxy.
#[derive(Debug, Clone)]
pub struct HeaderIdentityResolver {
    user_header: HeaderName,
    role_header: HeaderName,
    trusted_proxies: Vec<IpNet>,
}

impl HeaderIdentityResolver {
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        let parse = |name: &str| {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| GateError::Config(format!("Invalid identity header '{name}': {e}")))
        };
        Ok(Self {
            user_header: parse(&config.user_header)?,
            role_header: parse(&config.role_header)?,
            trusted_proxies: config.trusted_proxies.clone(),
        })
    }

    fn is_trusted(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(&ip))
    }

    /// Walks `X-Forwarded-For` from the right, skipping hops inside a trusted
    /// network. The first untrusted hop is the client. An unparseable hop ends
    /// the walk at the nearest address already vouched for by a trusted proxy.
    fn client_address(&self, request: &RequestInfo<'_>) -> IpAddr {
        let mut client = request.peer.ip();
        if !self.is_trusted(client) {
            return client;
        }
        let hops: Vec<&str> = request
            .headers
            .get_all(names::FORWARDED_FOR)
            .iter()
            .flat_map(|value| value.to_str().unwrap_or_default().split(','))
            .collect();

        for hop in hops.into_iter().rev() {
            let hop = hop.trim();
            let Ok(ip) = hop.parse::<IpAddr>() else {
                debug!(hop, client = %client, "Unparseable X-Forwarded-For hop");
                break;
            };
            client = ip;
            if !self.is_trusted(ip) {
                break;
            }
        }
        client
    }

    fn header_value<'r>(request: &RequestInfo<'r>, name: &HeaderName) -> Result<Option<&'r str>> {
        match request.headers.get(name) {
            None => Ok(None),
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| GateError::Identity(format!("{name} is not valid UTF-8")))?
                    .trim();
                Ok((!value.is_empty()).then_some(value))
            }
        }
    }
}

impl Default for HeaderIdentityResolver {
    fn default() -> Self {
        Self {
            user_header: HeaderName::from_static("x-user-id"),
            role_header: HeaderName::from_static("x-user-role"),
            trusted_proxies: Vec::new(),
        }
    }
}

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, request: &RequestInfo<'_>) -> Result<Identity> {
        let address = self.client_address(request).to_string();

        let Some(user_id) = Self::header_value(request, &self.user_header)? else {
            return Ok(Identity::anonymous(address));
        };

        let role = match Self::header_value(request, &self.role_header)? {
            Some(raw) => raw
                .parse::<RoleTag>()
                .map_err(|_| GateError::Identity(format!("Unknown role: {raw:?}")))?,
            None => RoleTag::Guest,
        };

        Ok(Identity::user(user_id, role, address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue, Method};
    use std::net::SocketAddr;

    fn resolver(trusted: &[&str]) -> HeaderIdentityResolver {
        let config = IdentityConfig {
            trusted_proxies: trusted.iter().filter_map(|n| n.parse().ok()).collect(),
            ..IdentityConfig::default()
        };
        match HeaderIdentityResolver::new(&config) {
            Ok(r) => r,
            Err(e) => panic!("resolver: {e}"),
        }
    }

    fn resolve(
        resolver: &HeaderIdentityResolver,
        pairs: &[(&'static str, &'static str)],
        peer: &str,
    ) -> Result<Identity> {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        let peer: SocketAddr = peer.parse().map_err(|_| GateError::Identity("peer".into()))?;
        resolver.resolve(&RequestInfo::new(&Method::GET, "/", &headers, peer))
    }

    #[test]
    fn test_authenticated_user_with_role() -> Result<()> {
        let identity = resolve(
            &resolver(&[]),
            &[("x-user-id", "42"), ("x-user-role", "veterinarian")],
            "10.1.2.3:5000",
        )?;
        assert_eq!(identity, Identity::user("42", RoleTag::Veterinarian, "10.1.2.3"));
        Ok(())
    }

    #[test]
    fn test_user_without_role_is_guest() -> Result<()> {
        let identity = resolve(&resolver(&[]), &[("x-user-id", "42")], "10.1.2.3:5000")?;
        assert_eq!(identity.role, Some(RoleTag::Guest));
        Ok(())
    }

    #[test]
    fn test_missing_user_is_anonymous() -> Result<()> {
        let identity = resolve(&resolver(&[]), &[("x-user-role", "admin")], "10.1.2.3:5000")?;
        assert!(!identity.is_authenticated());
        assert_eq!(identity.network_address, "10.1.2.3");
        Ok(())
    }

    #[test]
    fn test_unknown_role_is_an_error() {
        let result = resolve(
            &resolver(&[]),
            &[("x-user-id", "42"), ("x-user-role", "overlord")],
            "10.1.2.3:5000",
        );
        assert!(matches!(result, Err(GateError::Identity(_))));
    }

    #[test]
    fn test_forwarded_for_only_from_trusted_proxy() -> Result<()> {
        let pairs = [("x-forwarded-for", "203.0.113.7, 10.0.0.2")];

        let untrusted = resolve(&resolver(&[]), &pairs, "10.0.0.2:443")?;
        assert_eq!(untrusted.network_address, "10.0.0.2");

        let trusted = resolve(&resolver(&["10.0.0.0/8"]), &pairs, "10.0.0.2:443")?;
        assert_eq!(trusted.network_address, "203.0.113.7");
        Ok(())
    }

    #[test]
    fn test_forged_leftmost_hop_is_ignored() -> Result<()> {
        let trusted = resolver(&["10.0.0.0/8"]);
        for forged in ["1.1.1.1, 198.51.100.7", "2.2.2.2, 198.51.100.7"] {
            let mut headers = HeaderMap::new();
            headers.insert("x-forwarded-for", HeaderValue::from_static(forged));
            let peer: SocketAddr = "10.0.0.2:443".parse().map_err(|_| GateError::Identity("peer".into()))?;
            let identity = trusted.resolve(&RequestInfo::new(&Method::GET, "/", &headers, peer))?;
            assert_eq!(identity.network_address, "198.51.100.7");
        }
        Ok(())
    }

    #[test]
    fn test_trusted_hops_are_skipped_from_the_right() -> Result<()> {
        let identity = resolve(
            &resolver(&["10.0.0.0/8"]),
            &[("x-forwarded-for", "203.0.113.9, 198.51.100.7, 10.4.0.1, 10.0.0.5")],
            "10.0.0.2:443",
        )?;
        assert_eq!(identity.network_address, "198.51.100.7");
        Ok(())
    }

    #[test]
    fn test_garbage_leftmost_hop_does_not_fail() -> Result<()> {
        let identity = resolve(
            &resolver(&["10.0.0.0/8"]),
            &[("x-forwarded-for", "nope, 198.51.100.7")],
            "10.0.0.2:443",
        )?;
        assert_eq!(identity.network_address, "198.51.100.7");
        Ok(())
    }

    #[test]
    fn test_garbage_hop_falls_back_to_nearest_trusted_address() -> Result<()> {
        let behind_peer = resolve(
            &resolver(&["10.0.0.0/8"]),
            &[("x-forwarded-for", "198.51.100.7, not-an-ip")],
            "10.0.0.2:443",
        )?;
        assert_eq!(behind_peer.network_address, "10.0.0.2");

        let behind_hop = resolve(
            &resolver(&["10.0.0.0/8"]),
            &[("x-forwarded-for", "not-an-ip, 10.9.9.9")],
            "10.0.0.2:443",
        )?;
        assert_eq!(behind_hop.network_address, "10.9.9.9");
        Ok(())
    }
}
