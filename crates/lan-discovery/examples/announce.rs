//! Join a discovery group, announce once, then keep announcing until Ctrl-C.
//!
//! Run two copies on different hosts of the same LAN:
//!
//! cargo run -p lan-discovery --example announce -- test-server 24040
//!
//! Log verbosity follows `RUST_LOG`, e.g. `RUST_LOG=lan_discovery=debug`.

use std::sync::Arc;

use lan_discovery::{DiscoveryConfig, DiscoverySession, PeerSighting};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let group_name = args.next().unwrap_or_else(|| "test-server".to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => 24040,
    };

    let session = DiscoverySession::new(DiscoveryConfig::new(group_name, port))?;
    session.register(Arc::new(|peer: PeerSighting| {
        println!("New peer joined {}", peer);
    }));
    session
        .error
        .connect(|err| tracing::warn!("discovery error: {}", err));

    session.start().await?;
    session.notify_all().await?;

    let attempts = session
        .announce_periodically(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    tracing::info!("sent {} periodic announcements", attempts);

    session.stop();
    Ok(())
}
