//! Core primitives for lan-discovery.
//!
//! This crate provides the pieces of lan-discovery that have nothing to do
//! with sockets:
//!
//! - **Signal/Slot System**: Ordered, append-only observer lists with
//!   snapshot-on-emit dispatch
//! - **Logging Targets**: `tracing` target names for each subsystem
//!
//! # Signal Example
//!
//! ```
//! use lan_discovery_core::{ConnectionType, Signal};
//!
//! let stopped = Signal::<()>::new();
//! stopped.connect_with_type(|_| println!("session stopped"), ConnectionType::Direct);
//! stopped.emit(());
//! ```

pub mod logging;
pub mod signal;

pub use signal::{ConnectionType, Signal};
