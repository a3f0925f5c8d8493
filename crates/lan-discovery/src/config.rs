//! Configuration types for discovery sessions.

use std::time::Duration;

use crate::error::{DiscoveryError, Result};

/// Default multicast group endpoint (the SSDP group).
pub const DEFAULT_GROUP_ADDR: &str = "239.255.255.250:1900";

/// Largest payload a single UDP datagram over IPv4 can carry.
pub const MAX_GROUP_NAME_LEN: usize = 65_507;

/// Configuration for a discovery session.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use lan_discovery::DiscoveryConfig;
///
/// let config = DiscoveryConfig::new("render-farm", 24040)
///     .group_addr("239.255.0.7:7400")
///     .announce_interval(Duration::from_secs(5))
///     .multicast_ttl(2);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    /// The group name. Sent verbatim as the announcement payload and matched
    /// byte-for-byte against inbound payloads.
    pub group_name: String,
    /// Local port announcements are sent from.
    pub port: u16,
    /// Multicast group as `host:port`. Empty means [`DEFAULT_GROUP_ADDR`].
    pub group_addr: String,
    /// Interval used by `announce_periodically`.
    pub announce_interval: Duration,
    /// Receive buffer size in bytes. Never smaller than the group name plus one.
    pub recv_buffer_size: usize,
    /// Deadline for each announcement write. `None` means no deadline.
    pub write_timeout: Option<Duration>,
    /// Extra write attempts after a failed announcement write.
    pub announce_retries: u32,
    /// TTL for outbound multicast packets.
    pub multicast_ttl: u32,
    /// Whether announcements are looped back to sockets on this host.
    pub multicast_loopback: bool,
    /// Consecutive receive errors tolerated before the receive loop ends.
    pub max_read_errors: u32,
}

impl DiscoveryConfig {
    /// Create a configuration for the given group name and local port.
    pub fn new(group_name: impl Into<String>, port: u16) -> Self {
        Self {
            group_name: group_name.into(),
            port,
            group_addr: DEFAULT_GROUP_ADDR.into(),
            announce_interval: Duration::from_secs(1),
            recv_buffer_size: 65535,
            write_timeout: Some(Duration::from_secs(5)),
            announce_retries: 1,
            multicast_ttl: 1,
            multicast_loopback: true,
            max_read_errors: 8,
        }
    }

    /// Set the multicast group endpoint (`host:port`).
    pub fn group_addr(mut self, addr: impl Into<String>) -> Self {
        self.group_addr = addr.into();
        self
    }

    /// Set the periodic announcement interval.
    pub fn announce_interval(mut self, interval: Duration) -> Self {
        self.announce_interval = interval;
        self
    }

    /// Set the receive buffer size.
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Set the write deadline for announcements.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Disable the write deadline.
    pub fn no_write_timeout(mut self) -> Self {
        self.write_timeout = None;
        self
    }

    /// Set the number of write retries per announcement.
    pub fn announce_retries(mut self, retries: u32) -> Self {
        self.announce_retries = retries;
        self
    }

    /// Set the multicast TTL.
    pub fn multicast_ttl(mut self, ttl: u32) -> Self {
        self.multicast_ttl = ttl;
        self
    }

    /// Enable or disable multicast loopback.
    pub fn multicast_loopback(mut self, enabled: bool) -> Self {
        self.multicast_loopback = enabled;
        self
    }

    /// Set how many consecutive receive errors end the receive loop.
    pub fn max_read_errors(mut self, count: u32) -> Self {
        self.max_read_errors = count;
        self
    }

    /// The receive buffer size actually used.
    ///
    /// One byte larger than the group name at minimum, so a longer payload
    /// sharing the group name as a prefix is never truncated into a match.
    pub fn effective_recv_buffer_size(&self) -> usize {
        self.recv_buffer_size.max(self.group_name.len() + 1)
    }

    /// Check the configuration for values no session can work with.
    pub fn validate(&self) -> Result<()> {
        if self.group_name.is_empty() {
            return Err(DiscoveryError::InvalidConfig("group name is empty".into()));
        }
        if self.group_name.len() > MAX_GROUP_NAME_LEN {
            return Err(DiscoveryError::InvalidConfig(format!(
                "group name is {} bytes, at most {} fit in a datagram",
                self.group_name.len(),
                MAX_GROUP_NAME_LEN
            )));
        }
        if self.announce_interval.is_zero() {
            return Err(DiscoveryError::InvalidConfig(
                "announce interval must be non-zero".into(),
            ));
        }
        if self.recv_buffer_size == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "receive buffer size must be non-zero".into(),
            ));
        }
        if self.max_read_errors == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "max read errors must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
