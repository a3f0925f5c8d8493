//! Network interface information and selection.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use lan_discovery_core::logging::targets;
use tracing::{debug, trace};

use crate::error::{DiscoveryError, Result};

/// A network interface on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Interface name (e.g., "eth0", "en0", "Wi-Fi").
    pub name: String,
    /// Interface index.
    pub index: u32,
    /// IPv4 addresses assigned to this interface, in enumeration order.
    pub ipv4_addresses: Vec<Ipv4Info>,
    /// IPv6 addresses assigned to this interface, in enumeration order.
    pub ipv6_addresses: Vec<Ipv6Info>,
    /// Whether the interface is administratively up.
    pub is_up: bool,
    /// Whether this is a loopback interface.
    pub is_loopback: bool,
    /// Whether the interface supports broadcast.
    pub is_broadcast: bool,
    /// Whether the interface supports multicast.
    pub is_multicast: bool,
}

/// IPv4 address information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Info {
    /// The IPv4 address.
    pub address: Ipv4Addr,
    /// Network prefix length (CIDR notation).
    pub prefix_len: u8,
    /// Netmask derived from prefix length.
    pub netmask: Ipv4Addr,
}

impl Ipv4Info {
    /// Create address information from an address and prefix length.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            address,
            prefix_len,
            netmask: Self::prefix_to_netmask(prefix_len),
        }
    }

    fn prefix_to_netmask(prefix_len: u8) -> Ipv4Addr {
        if prefix_len >= 32 {
            Ipv4Addr::new(255, 255, 255, 255)
        } else if prefix_len == 0 {
            Ipv4Addr::new(0, 0, 0, 0)
        } else {
            let mask = !((1u32 << (32 - prefix_len)) - 1);
            Ipv4Addr::from(mask.to_be_bytes())
        }
    }
}

/// IPv6 address information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Info {
    /// The IPv6 address.
    pub address: Ipv6Addr,
    /// Network prefix length.
    pub prefix_len: u8,
}

impl NetworkInterface {
    /// Get all network interfaces on the system, in enumeration order.
    pub fn list() -> Vec<NetworkInterface> {
        let interfaces: Vec<NetworkInterface> = netdev::get_interfaces()
            .into_iter()
            .map(|iface| NetworkInterface {
                ipv4_addresses: iface
                    .ipv4
                    .iter()
                    .map(|net| Ipv4Info::new(net.addr(), net.prefix_len()))
                    .collect(),
                ipv6_addresses: iface
                    .ipv6
                    .iter()
                    .map(|net| Ipv6Info {
                        address: net.addr(),
                        prefix_len: net.prefix_len(),
                    })
                    .collect(),
                is_up: iface.is_up(),
                is_loopback: iface.is_loopback(),
                is_broadcast: iface.is_broadcast(),
                is_multicast: iface.is_multicast(),
                index: iface.index,
                name: iface.name,
            })
            .collect();

        trace!(target: targets::NETWORK_INFO, count = interfaces.len(), "enumerated interfaces");
        interfaces
    }

    /// Get all IP addresses (both v4 and v6) for this interface.
    pub fn all_addresses(&self) -> Vec<IpAddr> {
        let mut addrs: Vec<IpAddr> = self
            .ipv4_addresses
            .iter()
            .map(|info| IpAddr::V4(info.address))
            .collect();
        addrs.extend(
            self.ipv6_addresses
                .iter()
                .map(|info| IpAddr::V6(info.address)),
        );
        addrs
    }

    /// The first IPv4 address of this interface, if any.
    pub fn first_ipv4(&self) -> Option<Ipv4Addr> {
        self.ipv4_addresses.first().map(|info| info.address)
    }
}

/// Pick the interface used to join the multicast group.
///
/// The first interface with the broadcast flag wins. There is no preference
/// for interfaces that are up, so on multi-homed hosts the choice follows
/// enumeration order.
pub fn pick_multicast_interface(interfaces: &[NetworkInterface]) -> Option<&NetworkInterface> {
    interfaces.iter().find(|iface| iface.is_broadcast)
}

/// Pick the IPv4 address used as the local identity of announcements.
///
/// Interfaces that are down or loopback are skipped; within an interface,
/// loopback and non-IPv4 addresses are skipped. The first remaining address
/// wins.
pub fn pick_external_address(interfaces: &[NetworkInterface]) -> Option<Ipv4Addr> {
    interfaces
        .iter()
        .filter(|iface| iface.is_up && !iface.is_loopback)
        .flat_map(|iface| iface.all_addresses())
        .find_map(|addr| match addr {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
            _ => None,
        })
}

/// Select the multicast interface from the live interface list.
pub fn select_multicast_interface() -> Result<NetworkInterface> {
    let interfaces = NetworkInterface::list();
    let selected = pick_multicast_interface(&interfaces)
        .cloned()
        .ok_or(DiscoveryError::NoMulticastInterface)?;
    debug!(
        target: targets::NETWORK_INFO,
        "selected multicast interface {} (index {})", selected.name, selected.index
    );
    Ok(selected)
}

/// Select the external IPv4 address from the live interface list.
pub fn select_external_address() -> Result<Ipv4Addr> {
    let interfaces = NetworkInterface::list();
    let addr = pick_external_address(&interfaces).ok_or(DiscoveryError::NotConnected)?;
    debug!(target: targets::NETWORK_INFO, "selected external address {}", addr);
    Ok(addr)
}
