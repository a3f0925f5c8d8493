//! Announcements must release their socket on every exit path.
//!
//! Kept in its own test binary so no other test opens descriptors while the
//! count is taken.

#![cfg(target_os = "linux")]

use std::net::{Ipv4Addr, SocketAddrV4};

use lan_discovery::{Announcer, DiscoveryConfig, Endpoints};
use tokio::net::UdpSocket;

fn open_fds() -> usize {
    std::fs::read_dir("/proc/self/fd")
        .expect("procfs available")
        .count()
}

#[tokio::test(flavor = "current_thread")]
async fn test_repeated_announcements_do_not_leak_sockets() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let receiver_port = receiver.local_addr().unwrap().port();
    let config = DiscoveryConfig::new("demo", 0);

    let reachable = Announcer::new(
        Endpoints {
            local: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            remote: SocketAddrV4::new(Ipv4Addr::LOCALHOST, receiver_port),
        },
        &config,
    );
    // 192.0.2.0/24 is never assigned, so binding the local endpoint fails.
    let unbindable = Announcer::new(
        Endpoints {
            local: SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 0),
            remote: SocketAddrV4::new(Ipv4Addr::LOCALHOST, receiver_port),
        },
        &config,
    );

    // Warm up so lazily created runtime resources are not counted.
    reachable.announce().await.unwrap();
    assert!(unbindable.announce().await.is_err());

    let baseline = open_fds();
    for _ in 0..50 {
        assert_eq!(reachable.announce().await.unwrap(), 4);
        assert!(unbindable.announce().await.is_err());
    }
    assert_eq!(open_fds(), baseline);
}
