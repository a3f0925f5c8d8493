//! Network interface enumeration and selection.
//!
//! Discovery needs two things from the host's interfaces:
//!
//! - **A multicast interface**: the first interface with the broadcast flag,
//!   used to join the multicast group
//! - **An external address**: the first IPv4 address of an up, non-loopback
//!   interface, used as the source of announcements
//!
//! The `pick_*` functions are pure and work on any interface list; the
//! `select_*` functions apply them to the live list from the OS.
//!
//! # Example
//!
//! ```ignore
//! use lan_discovery::network_info::{NetworkInterface, pick_external_address};
//!
//! let interfaces = NetworkInterface::list();
//! for iface in &interfaces {
//!     println!("Interface: {} (up: {})", iface.name, iface.is_up);
//!     for addr in &iface.ipv4_addresses {
//!         println!("  IPv4: {}/{}", addr.address, addr.prefix_len);
//!     }
//! }
//!
//! println!("announcing from {:?}", pick_external_address(&interfaces));
//! ```

mod interface;

pub use interface::{
    Ipv4Info, Ipv6Info, NetworkInterface, pick_external_address, pick_multicast_interface,
    select_external_address, select_multicast_interface,
};
