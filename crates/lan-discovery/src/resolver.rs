//! Endpoint resolution.
//!
//! Turns the configured port and group address into the two endpoints a
//! session works with. Pure and synchronous: no sockets, no lookups.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::config::DEFAULT_GROUP_ADDR;
use crate::error::{DiscoveryError, Result};

/// The local and remote endpoints of a discovery session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Endpoints {
    /// This host's external address and the configured port. Source of
    /// outbound announcements.
    pub local: SocketAddrV4,
    /// The multicast group address and port. Joined by the listener and
    /// used as the destination of announcements.
    pub remote: SocketAddrV4,
}

/// Parse an IPv4 `host:port` string.
pub fn parse_endpoint(addr: &str) -> Result<SocketAddrV4> {
    addr.trim()
        .parse::<SocketAddrV4>()
        .map_err(|e| DiscoveryError::InvalidAddress(format!("{addr:?}: {e}")))
}

/// Resolve the session endpoints.
///
/// An empty `group_addr` selects [`DEFAULT_GROUP_ADDR`]. The group host must
/// be an IPv4 multicast address.
pub fn resolve_endpoints(local_ip: Ipv4Addr, port: u16, group_addr: &str) -> Result<Endpoints> {
    let group_addr = if group_addr.trim().is_empty() {
        DEFAULT_GROUP_ADDR
    } else {
        group_addr
    };

    let local = parse_endpoint(&format!("{local_ip}:{port}"))?;
    let remote = parse_endpoint(group_addr)?;
    if !remote.ip().is_multicast() {
        return Err(DiscoveryError::InvalidAddress(format!(
            "{} is not an IPv4 multicast group",
            remote.ip()
        )));
    }

    Ok(Endpoints { local, remote })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 5);

    #[test]
    fn test_default_group() {
        let endpoints = resolve_endpoints(LOCAL, 24040, "").unwrap();
        assert_eq!(endpoints.local, SocketAddrV4::new(LOCAL, 24040));
        assert_eq!(
            endpoints.remote,
            SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1900)
        );

        let endpoints = resolve_endpoints(LOCAL, 24040, "   ").unwrap();
        assert_eq!(endpoints.remote.port(), 1900);
    }

    #[test]
    fn test_custom_group() {
        let endpoints = resolve_endpoints(LOCAL, 0, "224.0.0.251:5353").unwrap();
        assert_eq!(
            endpoints.remote,
            SocketAddrV4::new(Ipv4Addr::new(224, 0, 0, 251), 5353)
        );
        assert_eq!(endpoints.local.port(), 0);
    }

    #[test]
    fn test_invalid_group_strings() {
        for bad in ["239.255.255.250", "not-an-address:1900", "239.255.255.250:99999", "[ff02::1]:9001"] {
            let err = resolve_endpoints(LOCAL, 1, bad).unwrap_err();
            assert!(matches!(err, DiscoveryError::InvalidAddress(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn test_unicast_group_rejected() {
        let err = resolve_endpoints(LOCAL, 1, "192.168.1.1:1900").unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidAddress(_)));
    }
}
