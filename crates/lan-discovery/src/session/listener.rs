//! Peer sightings and the listener contract.

use std::fmt;
use std::net::SocketAddr;

/// One accepted announcement, identified by the sender's endpoint.
///
/// A sighting is a momentary observation. The session keeps no history, so
/// the same peer produces a new sighting for every announcement it sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerSighting {
    /// Source address and port of the announcement.
    pub endpoint: SocketAddr,
}

impl PeerSighting {
    /// Create a sighting for the given sender endpoint.
    pub fn new(endpoint: SocketAddr) -> Self {
        Self { endpoint }
    }
}

impl fmt::Display for PeerSighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.endpoint)
    }
}

/// Receives a notification for each peer sighting.
///
/// Every registration gets its own worker thread. Calls to one registration
/// run one at a time in sighting order, so an implementation may block: it
/// only delays its own later sightings, never the receive loop or other
/// listeners.
///
/// Closures implement this trait:
///
/// ```
/// use std::sync::Arc;
/// use lan_discovery::{PeerListener, PeerSighting};
///
/// let listener: Arc<dyn PeerListener> = Arc::new(|peer: PeerSighting| {
///     println!("new peer joined {}", peer);
/// });
/// # let _ = listener;
/// ```
pub trait PeerListener: Send + Sync {
    /// Called once per accepted announcement.
    fn on_new_peer(&self, peer: PeerSighting);
}

impl<F> PeerListener for F
where
    F: Fn(PeerSighting) + Send + Sync,
{
    fn on_new_peer(&self, peer: PeerSighting) {
        self(peer)
    }
}
