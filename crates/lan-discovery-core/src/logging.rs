//! Logging facilities for lan-discovery.
//!
//! lan-discovery uses the `tracing` crate for instrumentation and never
//! installs a subscriber itself. To see logs, install one in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("lan_discovery=debug")
//!     .init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core primitives target.
    pub const CORE: &str = "lan_discovery_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "lan_discovery_core::signal";
    /// Interface enumeration and selection target.
    pub const NETWORK_INFO: &str = "lan_discovery::network_info";
    /// Multicast listening session target.
    pub const SESSION: &str = "lan_discovery::session";
    /// Outbound announcement target.
    pub const ANNOUNCE: &str = "lan_discovery::announce";
}

#[cfg(test)]
mod tests {
    use super::targets;

    #[test]
    fn test_targets_are_nested_under_crate_names() {
        assert!(targets::SIGNAL.starts_with(targets::CORE));
        for target in [targets::NETWORK_INFO, targets::SESSION, targets::ANNOUNCE] {
            assert!(target.starts_with("lan_discovery::"), "{target}");
        }
    }
}
