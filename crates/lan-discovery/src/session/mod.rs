//! Discovery sessions.
//!
//! This module provides the announce/listen side of discovery:
//! - **DiscoverySession**: Joins the multicast group, filters inbound
//!   announcements and fans sightings out to registered listeners
//! - **Announcer**: Sends single announcements from the local endpoint
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lan_discovery::{DiscoveryConfig, DiscoverySession, PeerSighting};
//!
//! let session = DiscoverySession::new(DiscoveryConfig::new("demo", 24041))?;
//! session.register(Arc::new(|peer: PeerSighting| {
//!     println!("New peer joined {}", peer);
//! }));
//!
//! session.start().await?;
//!
//! // Announce once a second until Ctrl-C.
//! session
//!     .periodic_notify(Duration::from_secs(1), tokio::signal::ctrl_c())
//!     .await;
//! ```
//!
//! # Wire Format
//!
//! An announcement is one UDP datagram whose payload is exactly the bytes of
//! the group name: no framing, no length prefix, no version field.

mod announce;
mod discovery;
mod listener;
mod state;

pub use announce::Announcer;
pub use discovery::DiscoverySession;
pub use listener::{PeerListener, PeerSighting};
pub use state::SessionState;
