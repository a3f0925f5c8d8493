//! Local-network peer discovery over IPv4 multicast UDP.
//!
//! A process announces itself under a named group and learns about peers
//! announcing the same group, without any central coordinator:
//!
//! - **Interface Selection**: Picks a multicast interface and an external
//!   IPv4 address from the host's interfaces
//! - **Address Resolution**: Turns a port and a group address into endpoints
//! - **Discovery Session**: Listens on the group, filters announcements and
//!   notifies listeners; sends announcements once or periodically
//!
//! Discovery reports sightings only. Tracking which peers are still alive,
//! deduplicating sightings or remembering peers is left to the consumer.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lan_discovery::{DiscoveryConfig, DiscoverySession, PeerSighting};
//!
//! let session = DiscoverySession::new(DiscoveryConfig::new("test-server", 24040))?;
//!
//! session.register(Arc::new(|peer: PeerSighting| {
//!     println!("New peer joined {}", peer);
//! }));
//!
//! session.start().await?;
//! session.notify_all().await?;
//! ```
//!
//! # Errors
//!
//! Construction fails closed on configuration errors, and
//! [`DiscoverySession::start`] returns socket setup errors. Errors in the
//! background receive loop or in periodic announcements never abort the
//! process; they are emitted on the session's `error` signal:
//!
//! ```ignore
//! session.error.connect(|err| eprintln!("discovery error: {}", err));
//! ```

pub mod config;
mod error;
pub mod network_info;
pub mod resolver;
pub mod session;

pub use config::{DEFAULT_GROUP_ADDR, DiscoveryConfig};
pub use error::{DiscoveryError, Result};
pub use network_info::NetworkInterface;
pub use resolver::{Endpoints, resolve_endpoints};
pub use session::{Announcer, DiscoverySession, PeerListener, PeerSighting, SessionState};

pub use lan_discovery_core::{ConnectionType, Signal};
