//! Error types for lan-discovery.

use std::fmt;

/// Discovery-specific errors.
///
/// Configuration errors (`InvalidAddress`, `InvalidConfig`,
/// `NoMulticastInterface`, `NotConnected`) come out of session construction.
/// Setup errors come out of [`start`](crate::DiscoverySession::start).
/// Errors inside background tasks are emitted on the session's `error` signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// An address string is not a valid IPv4 `host:port`, or the group
    /// address is not multicast.
    InvalidAddress(String),
    /// A configuration value is out of range.
    InvalidConfig(String),
    /// No interface with the broadcast flag was found.
    NoMulticastInterface,
    /// No up, non-loopback interface carries an IPv4 address.
    NotConnected,
    /// The session is already listening.
    AlreadyStarted,
    /// The session has stopped and cannot listen again.
    SessionStopped,
    /// Socket setup (create, bind, join, options) failed.
    Socket(String),
    /// I/O error on an open socket.
    Io(String),
    /// A socket operation did not finish before its deadline.
    Timeout,
    /// The receive loop gave up after repeated errors.
    ReceiveLoopAborted(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress(msg) => write!(f, "Invalid address: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "Invalid configuration: {msg}"),
            Self::NoMulticastInterface => write!(f, "No multicast-capable interface detected"),
            Self::NotConnected => write!(f, "No external IPv4 address, are you connected to the network?"),
            Self::AlreadyStarted => write!(f, "Discovery session already started"),
            Self::SessionStopped => write!(f, "Discovery session has stopped"),
            Self::Socket(msg) => write!(f, "Socket error: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Timeout => write!(f, "Socket operation timed out"),
            Self::ReceiveLoopAborted(msg) => write!(f, "Receive loop aborted: {msg}"),
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            Self::Timeout
        } else {
            Self::Io(err.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for DiscoveryError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

impl DiscoveryError {
    /// Whether this error is raised while building a session from its
    /// configuration and the host's interfaces.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress(_)
                | Self::InvalidConfig(_)
                | Self::NoMulticastInterface
                | Self::NotConnected
        )
    }
}

/// A specialized Result type for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let err: DiscoveryError = std::io::Error::from(std::io::ErrorKind::TimedOut).into();
        assert_eq!(err, DiscoveryError::Timeout);

        let err: DiscoveryError = std::io::Error::from(std::io::ErrorKind::AddrNotAvailable).into();
        assert!(matches!(err, DiscoveryError::Io(_)));
    }

    #[test]
    fn test_config_error_classification() {
        assert!(DiscoveryError::NotConnected.is_config_error());
        assert!(DiscoveryError::InvalidAddress("x".into()).is_config_error());
        assert!(!DiscoveryError::AlreadyStarted.is_config_error());
        assert!(!DiscoveryError::Timeout.is_config_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DiscoveryError::InvalidAddress("nope".into()).to_string(),
            "Invalid address: nope"
        );
        assert_eq!(
            DiscoveryError::NotConnected.to_string(),
            "No external IPv4 address, are you connected to the network?"
        );
    }
}
