//! Signal/slot system for lan-discovery.
//!
//! A [`Signal`] is an ordered, append-only list of slots (callbacks). Emitting
//! the signal invokes every connected slot with a clone of the arguments.
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - The signal type for emitting notifications
//! - [`ConnectionType`] - How a slot should be invoked (Direct or Queued)
//!
//! # Connection Types
//!
//! - **Direct**: Slot is called immediately in the emitting task
//! - **Queued**: Slot runs on a worker thread owned by the connection (default)
//!
//! # Thread Safety
//!
//! Connections live in a copy-on-write snapshot. [`Signal::emit`] clones the
//! current snapshot and releases the lock before any slot runs, so slots may
//! be connected from any thread while another thread is emitting, and a slot
//! may connect further slots without deadlocking. A slot connected during an
//! emission is first invoked by the next emission.
//!
//! # Example
//!
//! ```
//! use lan_discovery_core::{ConnectionType, Signal};
//!
//! let peer_seen = Signal::<String>::new();
//!
//! peer_seen.connect_with_type(
//!     |addr| println!("peer at {}", addr),
//!     ConnectionType::Direct,
//! );
//!
//! assert_eq!(peer_seen.emit("192.168.1.20:24040".to_string()), 1);
//! ```

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::RwLock;

use crate::logging::targets;

/// Specifies how a connected slot should be invoked when the signal is emitted.
///
/// Use with [`Signal::connect_with_type`] to control invocation behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionType {
    /// Invoke the slot immediately in the emitting task.
    ///
    /// The emitter waits for the slot to return, so a slow slot delays every
    /// slot connected after it. Use this only for cheap, non-blocking slots.
    Direct,

    /// Run the slot on a dedicated worker thread owned by the connection.
    ///
    /// Emissions are queued to the worker and run one at a time, in emission
    /// order. A slot that blocks only delays its own later invocations; the
    /// emitter and every other connection keep going. The worker exits once
    /// the signal is dropped and its queue has drained.
    #[default]
    Queued,
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// Internal storage for a single connection.
enum Connection<Args> {
    /// Called inline by `emit`.
    Direct(Slot<Args>),
    /// Feeds the connection's worker thread.
    Queued(Sender<Args>),
}

impl<Args> Clone for Connection<Args> {
    fn clone(&self) -> Self {
        match self {
            Self::Direct(slot) => Self::Direct(slot.clone()),
            Self::Queued(sender) => Self::Queued(sender.clone()),
        }
    }
}

/// A type-safe signal that can have multiple connected slots.
///
/// # Type Parameter
///
/// - `Args`: The argument type passed to connected slots. Use `()` for signals
///   with no arguments.
///
/// `Signal<Args>` is `Send + Sync` and is usually shared behind an `Arc`
/// between the owner that emits and the consumers that connect.
pub struct Signal<Args> {
    /// Connections in registration order. Replaced wholesale on connect.
    connections: RwLock<Arc<Vec<Connection<Args>>>>,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Connect a slot (closure) to this signal.
    ///
    /// The slot is invoked with [`ConnectionType::Queued`].
    pub fn connect<F>(&self, slot: F)
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connect_with_type(slot, ConnectionType::Queued);
    }

    /// Connect a slot with a specific connection type.
    ///
    /// Slots are appended; connecting the same closure twice yields two
    /// invocations per emission. A Queued connection starts its worker
    /// thread here.
    pub fn connect_with_type<F>(&self, slot: F, connection_type: ConnectionType)
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let slot: Slot<Args> = Arc::new(slot);
        let connection = match connection_type {
            ConnectionType::Direct => Connection::Direct(slot),
            ConnectionType::Queued => Self::spawn_worker(slot),
        };

        let mut guard = self.connections.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(connection);
        *guard = Arc::new(next);
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Emit the signal, invoking all connected slots.
    ///
    /// Slots are visited in registration order. Direct slots run before this
    /// call returns; Queued slots are handed to their workers and may still be
    /// running (or not yet started) when it returns.
    ///
    /// Returns the number of slots that were invoked or queued.
    #[tracing::instrument(skip_all, target = "lan_discovery_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) -> usize {
        let snapshot = self.connections.read().clone();
        tracing::trace!(
            target: targets::SIGNAL,
            connection_count = snapshot.len(),
            "emitting signal"
        );

        for conn in snapshot.iter() {
            match conn {
                Connection::Direct(slot) => slot(&args),
                Connection::Queued(sender) => {
                    if sender.send(args.clone()).is_err() {
                        // The worker only exits early if its slot panicked.
                        tracing::warn!(
                            target: targets::SIGNAL,
                            "queued slot worker has exited, dropping invocation"
                        );
                    }
                }
            }
        }

        snapshot.len()
    }

    /// Start the worker thread for a Queued connection.
    ///
    /// Falls back to a Direct connection if the thread cannot be spawned.
    fn spawn_worker(slot: Slot<Args>) -> Connection<Args> {
        let (sender, receiver) = unbounded::<Args>();
        let worker_slot = slot.clone();
        let spawned = thread::Builder::new()
            .name("lan-discovery-slot".into())
            .spawn(move || worker_loop(worker_slot, receiver));

        match spawned {
            Ok(_) => Connection::Queued(sender),
            Err(e) => {
                tracing::warn!(
                    target: targets::SIGNAL,
                    "failed to spawn worker for queued slot, invoking directly: {}",
                    e
                );
                Connection::Direct(slot)
            }
        }
    }
}

/// Run queued invocations until every sender is gone.
fn worker_loop<Args>(slot: Slot<Args>, receiver: Receiver<Args>) {
    while let Ok(args) = receiver.recv() {
        slot(&args);
    }
    tracing::trace!(target: targets::SIGNAL, "queued slot worker finished");
}

impl<Args> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.connections.read().len())
            .finish()
    }
}
