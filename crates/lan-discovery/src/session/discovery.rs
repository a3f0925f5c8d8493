//! Discovery session: multicast listener, announcer hookup and listener registry.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use lan_discovery_core::Signal;
use lan_discovery_core::logging::targets;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::announce::{Announcer, socket_error};
use super::listener::{PeerListener, PeerSighting};
use super::state::SessionState;
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::network_info::{NetworkInterface, pick_external_address, pick_multicast_interface};
use crate::resolver::{Endpoints, resolve_endpoints};

/// Command sent to the receive task.
enum Command {
    Stop,
}

/// A peer discovery session for one group.
///
/// The session joins the multicast group, reports every peer that announces
/// the same group name, and announces itself on request.
///
/// # Signals
///
/// - [`peer_discovered`](Self::peer_discovered): Emitted for each accepted announcement
/// - [`error`](Self::error): Emitted for errors inside background tasks
/// - [`stopped`](Self::stopped): Emitted once the session reaches `Stopped`
///
/// # Example
///
/// ```ignore
/// let session = DiscoverySession::new(DiscoveryConfig::new("demo", 24040))?;
///
/// session.register(Arc::new(|peer: PeerSighting| {
///     println!("New peer joined {}", peer);
/// }));
/// session.error.connect(|err| eprintln!("discovery: {}", err));
///
/// session.start().await?;
/// session.notify_all().await?;
/// ```
pub struct DiscoverySession {
    config: DiscoveryConfig,
    interface: NetworkInterface,
    announcer: Arc<Announcer>,
    group_name: Arc<[u8]>,
    state: Arc<Mutex<SessionState>>,
    command_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,

    /// Signal emitted for each accepted peer announcement.
    pub peer_discovered: Arc<Signal<PeerSighting>>,
    /// Signal emitted when a background receive or announce fails.
    pub error: Arc<Signal<DiscoveryError>>,
    /// Signal emitted when the session stops.
    pub stopped: Arc<Signal<()>>,
}

impl DiscoverySession {
    /// Create a session using the host's network interfaces.
    ///
    /// Fails with a configuration error when no broadcast-capable interface
    /// or no external IPv4 address exists, or when an address does not parse.
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        Self::from_interfaces(config, &NetworkInterface::list())
    }

    /// Create a session selecting from the given interfaces.
    pub fn from_interfaces(config: DiscoveryConfig, interfaces: &[NetworkInterface]) -> Result<Self> {
        config.validate()?;

        let interface = pick_multicast_interface(interfaces)
            .cloned()
            .ok_or(DiscoveryError::NoMulticastInterface)?;
        let local_ip = pick_external_address(interfaces).ok_or(DiscoveryError::NotConnected)?;
        let endpoints = resolve_endpoints(local_ip, config.port, &config.group_addr)?;

        debug!(
            target: targets::SESSION,
            "session {:?}: interface {}, local {}, group {}",
            config.group_name,
            interface.name,
            endpoints.local,
            endpoints.remote
        );

        Ok(Self {
            announcer: Arc::new(Announcer::new(endpoints, &config)),
            group_name: Arc::from(config.group_name.as_bytes()),
            config,
            interface,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            command_tx: Mutex::new(None),
            peer_discovered: Arc::new(Signal::new()),
            error: Arc::new(Signal::new()),
            stopped: Arc::new(Signal::new()),
        })
    }

    /// The group name this session announces and filters on.
    pub fn group_name(&self) -> &str {
        &self.config.group_name
    }

    /// The session configuration.
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// The interface used to join the multicast group.
    pub fn interface(&self) -> &NetworkInterface {
        &self.interface
    }

    /// Source endpoint of announcements.
    pub fn local_endpoint(&self) -> SocketAddrV4 {
        self.announcer.endpoints().local
    }

    /// The multicast group endpoint.
    pub fn remote_endpoint(&self) -> SocketAddrV4 {
        self.announcer.endpoints().remote
    }

    /// Both endpoints.
    pub fn endpoints(&self) -> Endpoints {
        self.announcer.endpoints()
    }

    /// Get the current session state.
    ///
    /// `Stopped` is only reported once the listening socket has been
    /// released; until then a stopping session reports `Stopping`.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Check if the receive loop is running.
    pub fn is_listening(&self) -> bool {
        self.state() == SessionState::Listening
    }

    /// Register a listener for peer sightings.
    ///
    /// Listeners are appended in order and never removed. Registering the same
    /// listener twice delivers every sighting to it twice. Registration is
    /// safe while the session is listening and applies from the next sighting.
    ///
    /// Each registration starts a worker thread that calls the listener, so
    /// thread count grows with registrations, not with sightings.
    pub fn register<L>(&self, listener: Arc<L>)
    where
        L: PeerListener + ?Sized + 'static,
    {
        self.peer_discovered
            .connect(move |peer| listener.on_new_peer(*peer));
    }

    /// Register several listeners, in iteration order.
    pub fn register_all<I>(&self, listeners: I)
    where
        I: IntoIterator<Item = Arc<dyn PeerListener>>,
    {
        for listener in listeners {
            self.register(listener);
        }
    }

    /// Number of registered listeners (including raw signal connections).
    pub fn listener_count(&self) -> usize {
        self.peer_discovered.connection_count()
    }

    /// Open the multicast socket and start the receive loop.
    ///
    /// Setup failures are returned here and leave the session `Idle`, so the
    /// caller may retry. Must be called from within a tokio runtime.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            SessionState::Listening => return Err(DiscoveryError::AlreadyStarted),
            SessionState::Stopping | SessionState::Stopped => {
                return Err(DiscoveryError::SessionStopped);
            }
            SessionState::Idle => {}
        }

        let socket = self.open_multicast_socket()?;
        self.spawn_receive_loop(&mut state, socket);
        drop(state);

        info!(
            target: targets::SESSION,
            "listening for group {:?} on {}", self.config.group_name, self.remote_endpoint()
        );
        Ok(())
    }

    /// Move to `Listening` and spawn the receive loop over `source`.
    fn spawn_receive_loop<S: DatagramSource>(&self, state: &mut SessionState, source: S) {
        let (tx, rx) = mpsc::unbounded_channel::<Command>();
        *self.command_tx.lock() = Some(tx);
        *state = SessionState::Listening;

        let receive_loop = ReceiveLoop {
            source,
            group_name: self.group_name.clone(),
            buffer_size: self.config.effective_recv_buffer_size(),
            max_read_errors: self.config.max_read_errors,
            state: self.state.clone(),
            peer_discovered: self.peer_discovered.clone(),
            error: self.error.clone(),
            stopped: self.stopped.clone(),
        };
        tokio::spawn(receive_loop.run(rx));
    }

    /// Stop the session.
    ///
    /// A listening session moves to `Stopping` and stops its receive loop,
    /// which releases the socket, moves to `Stopped` and then emits
    /// [`stopped`](Self::stopped). An idle session stops at once. Stopping
    /// twice is a no-op.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        match *state {
            SessionState::Idle => {
                *state = SessionState::Stopped;
                drop(state);
                self.stopped.emit(());
            }
            SessionState::Listening => {
                *state = SessionState::Stopping;
                if let Some(tx) = self.command_tx.lock().take() {
                    let _ = tx.send(Command::Stop);
                }
            }
            SessionState::Stopping | SessionState::Stopped => {}
        }
    }

    /// Send one announcement to the group.
    ///
    /// Independent of the listening state; may be called at any time and
    /// concurrently with itself. Returns the number of bytes written.
    pub async fn notify_all(&self) -> Result<usize> {
        self.announcer.announce().await
    }

    /// Announce every `interval` until `cancel` completes.
    ///
    /// The first announcement goes out one interval after the call. Each one
    /// runs as its own task; failures are emitted on [`error`](Self::error).
    /// Returns the number of announcements attempted.
    pub async fn periodic_notify<F>(&self, interval: Duration, cancel: F) -> usize
    where
        F: Future,
    {
        tokio::pin!(cancel);
        let mut attempts = 0;

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => break,
                _ = tokio::time::sleep(interval) => {
                    attempts += 1;
                    let announcer = self.announcer.clone();
                    let error = self.error.clone();
                    tokio::spawn(async move {
                        if let Err(e) = announcer.announce().await {
                            warn!(target: targets::ANNOUNCE, "announcement failed: {}", e);
                            error.emit(e);
                        }
                    });
                }
            }
        }

        debug!(
            target: targets::ANNOUNCE,
            "periodic announcements cancelled after {} attempts", attempts
        );
        attempts
    }

    /// [`periodic_notify`](Self::periodic_notify) at the configured interval.
    pub async fn announce_periodically<F>(&self, cancel: F) -> usize
    where
        F: Future,
    {
        self.periodic_notify(self.config.announce_interval, cancel)
            .await
    }

    /// Create, bind and join the multicast listening socket.
    fn open_multicast_socket(&self) -> Result<UdpSocket> {
        let group = self.remote_endpoint();

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(socket_error("create"))?;
        // Several sessions on one host share the group port.
        socket
            .set_reuse_address(true)
            .map_err(socket_error("SO_REUSEADDR"))?;
        socket
            .bind(&SockAddr::from(SocketAddrV4::new(
                Ipv4Addr::UNSPECIFIED,
                group.port(),
            )))
            .map_err(socket_error("bind"))?;

        let iface_addr = self.interface.first_ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED);
        if let Err(e) = socket.join_multicast_v4(group.ip(), &iface_addr) {
            if iface_addr.is_unspecified() {
                return Err(socket_error("join multicast group")(e));
            }
            warn!(
                target: targets::SESSION,
                "failed to join {} on {} ({}), joining on the default interface",
                group.ip(),
                self.interface.name,
                e
            );
            socket
                .join_multicast_v4(group.ip(), &Ipv4Addr::UNSPECIFIED)
                .map_err(socket_error("join multicast group"))?;
        }

        socket
            .set_multicast_loop_v4(self.config.multicast_loopback)
            .map_err(socket_error("IP_MULTICAST_LOOP"))?;
        socket
            .set_nonblocking(true)
            .map_err(socket_error("set nonblocking"))?;

        UdpSocket::from_std(socket.into()).map_err(socket_error("register"))
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DiscoverySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoverySession")
            .field("group_name", &self.config.group_name)
            .field("interface", &self.interface.name)
            .field("local", &self.local_endpoint())
            .field("remote", &self.remote_endpoint())
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Decide whether an inbound datagram is a sighting for this group.
///
/// Loopback senders are dropped first, then anything whose payload is not
/// exactly the group name.
pub(crate) fn accept_announcement(
    group_name: &[u8],
    payload: &[u8],
    source: SocketAddr,
) -> Option<PeerSighting> {
    if source.ip().is_loopback() {
        trace!(target: targets::SESSION, "dropping datagram from loopback {}", source);
        return None;
    }
    if payload != group_name {
        trace!(
            target: targets::SESSION,
            "dropping {} byte datagram from {}: foreign group",
            payload.len(),
            source
        );
        return None;
    }
    Some(PeerSighting::new(source))
}

/// The read step of the receive loop.
pub(crate) trait DatagramSource: Send + Sync + 'static {
    /// Receive one datagram into `buf`, returning its length and sender.
    fn recv_datagram<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a;
}

impl DatagramSource for UdpSocket {
    fn recv_datagram<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a {
        self.recv_from(buf)
    }
}

/// State moved into the receive task.
struct ReceiveLoop<S> {
    source: S,
    group_name: Arc<[u8]>,
    buffer_size: usize,
    max_read_errors: u32,
    state: Arc<Mutex<SessionState>>,
    peer_discovered: Arc<Signal<PeerSighting>>,
    error: Arc<Signal<DiscoveryError>>,
    stopped: Arc<Signal<()>>,
}

impl<S: DatagramSource> ReceiveLoop<S> {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let ReceiveLoop {
            source,
            group_name,
            buffer_size,
            max_read_errors,
            state,
            peer_discovered,
            error,
            stopped,
        } = self;

        let mut buffer = vec![0u8; buffer_size];
        let mut consecutive_errors = 0u32;

        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(Command::Stop) | None => break,
                    }
                }

                result = source.recv_datagram(&mut buffer) => {
                    match result {
                        Ok((n, source)) => {
                            consecutive_errors = 0;
                            if let Some(sighting) = accept_announcement(&group_name, &buffer[..n], source) {
                                debug!(target: targets::SESSION, "peer sighted at {}", sighting);
                                peer_discovered.emit(sighting);
                            }
                        }
                        Err(e) => {
                            consecutive_errors += 1;
                            warn!(
                                target: targets::SESSION,
                                "receive error ({}/{}): {}", consecutive_errors, max_read_errors, e
                            );
                            error.emit(DiscoveryError::from(e));
                            if consecutive_errors >= max_read_errors {
                                error.emit(DiscoveryError::ReceiveLoopAborted(format!(
                                    "{} consecutive receive errors",
                                    consecutive_errors
                                )));
                                break;
                            }
                        }
                    }
                }
            }
        }

        drop(source);
        *state.lock() = SessionState::Stopped;
        info!(target: targets::SESSION, "discovery session stopped");
        stopped.emit(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_info::Ipv4Info;
    use lan_discovery_core::ConnectionType;
    use std::collections::VecDeque;

    type Read = io::Result<(Vec<u8>, SocketAddr)>;

    /// Replays a fixed sequence of reads, then waits forever.
    struct ScriptedSource {
        reads: Mutex<VecDeque<Read>>,
    }

    impl ScriptedSource {
        fn new(reads: Vec<Read>) -> Self {
            Self {
                reads: Mutex::new(reads.into()),
            }
        }
    }

    impl DatagramSource for ScriptedSource {
        fn recv_datagram<'a>(
            &'a self,
            buf: &'a mut [u8],
        ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a {
            async move {
                let next = self.reads.lock().pop_front();
                match next {
                    Some(Ok((payload, source))) => {
                        buf[..payload.len()].copy_from_slice(&payload);
                        Ok((payload.len(), source))
                    }
                    Some(Err(e)) => Err(e),
                    None => std::future::pending().await,
                }
            }
        }
    }

    #[derive(Debug)]
    enum Event {
        Sighting(PeerSighting),
        Error(DiscoveryError),
        Stopped,
    }

    fn peer() -> SocketAddr {
        "192.168.1.20:24040".parse().unwrap()
    }

    fn read_error() -> Read {
        Err(io::Error::from(io::ErrorKind::ConnectionRefused))
    }

    fn announcement(payload: &[u8]) -> Read {
        Ok((payload.to_vec(), peer()))
    }

    /// Session over a scripted source, recording every signal in order.
    fn scripted_session(
        reads: Vec<Read>,
        max_read_errors: u32,
    ) -> (DiscoverySession, Arc<Mutex<Vec<Event>>>) {
        let session = DiscoverySession::from_interfaces(
            DiscoveryConfig::new("demo", 24040).max_read_errors(max_read_errors),
            &[lan_interface(Ipv4Addr::new(192, 168, 1, 5))],
        )
        .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        session.peer_discovered.connect_with_type(
            move |peer| sink.lock().push(Event::Sighting(*peer)),
            ConnectionType::Direct,
        );
        let sink = events.clone();
        session.error.connect_with_type(
            move |err| sink.lock().push(Event::Error(err.clone())),
            ConnectionType::Direct,
        );
        let sink = events.clone();
        session
            .stopped
            .connect_with_type(move |_| sink.lock().push(Event::Stopped), ConnectionType::Direct);

        {
            let mut state = session.state.lock();
            session.spawn_receive_loop(&mut state, ScriptedSource::new(reads));
        }
        (session, events)
    }

    async fn wait_for_events(events: &Mutex<Vec<Event>>, count: usize) -> bool {
        for _ in 0..200 {
            if events.lock().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        events.lock().len() >= count
    }

    fn lan_interface(addr: Ipv4Addr) -> NetworkInterface {
        NetworkInterface {
            name: "eth0".into(),
            index: 2,
            ipv4_addresses: vec![Ipv4Info::new(addr, 24)],
            ipv6_addresses: Vec::new(),
            is_up: true,
            is_loopback: false,
            is_broadcast: true,
            is_multicast: true,
        }
    }

    #[test]
    fn test_accepts_matching_group() {
        let source: SocketAddr = "192.168.1.20:24040".parse().unwrap();
        let sighting = accept_announcement(b"demo", b"demo", source).unwrap();
        assert_eq!(sighting.endpoint, source);
    }

    #[test]
    fn test_rejects_other_group() {
        let source: SocketAddr = "192.168.1.20:24040".parse().unwrap();
        assert!(accept_announcement(b"demo", b"other", source).is_none());
        assert!(accept_announcement(b"demo", b"demo-x", source).is_none());
        assert!(accept_announcement(b"demo", b"dem", source).is_none());
        assert!(accept_announcement(b"demo", b"", source).is_none());
    }

    #[test]
    fn test_rejects_loopback_even_when_group_matches() {
        let source: SocketAddr = "127.0.0.1:24040".parse().unwrap();
        assert!(accept_announcement(b"demo", b"demo", source).is_none());
    }

    #[test]
    fn test_construction_from_interfaces() {
        let interfaces = vec![lan_interface(Ipv4Addr::new(192, 168, 1, 5))];
        let session =
            DiscoverySession::from_interfaces(DiscoveryConfig::new("demo", 24040), &interfaces)
                .unwrap();

        assert_eq!(session.group_name(), "demo");
        assert_eq!(session.interface().name, "eth0");
        assert_eq!(
            session.local_endpoint(),
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 5), 24040)
        );
        assert_eq!(
            session.remote_endpoint(),
            SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1900)
        );
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.listener_count(), 0);
    }

    #[test]
    fn test_register_appends() {
        let interfaces = vec![lan_interface(Ipv4Addr::new(10, 0, 0, 2))];
        let session =
            DiscoverySession::from_interfaces(DiscoveryConfig::new("demo", 1), &interfaces).unwrap();

        let listener: Arc<dyn PeerListener> = Arc::new(|_peer: PeerSighting| {});
        session.register(listener.clone());
        session.register_all(vec![listener.clone(), listener]);
        assert_eq!(session.listener_count(), 3);
    }

    #[test]
    fn test_stop_idle_session() {
        let interfaces = vec![lan_interface(Ipv4Addr::new(10, 0, 0, 2))];
        let session =
            DiscoverySession::from_interfaces(DiscoveryConfig::new("demo", 1), &interfaces).unwrap();

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_single_read_error_keeps_listening() {
        let (session, events) = scripted_session(vec![read_error(), announcement(b"demo")], 3);

        assert!(wait_for_events(&events, 2).await);
        {
            let events = events.lock();
            assert!(matches!(events[0], Event::Error(DiscoveryError::Io(_))), "{events:?}");
            assert!(matches!(events[1], Event::Sighting(s) if s.endpoint == peer()), "{events:?}");
        }
        assert_eq!(session.state(), SessionState::Listening);

        // The receive task has not run since, so the source is still held.
        session.stop();
        assert_eq!(session.state(), SessionState::Stopping);
        assert_eq!(session.start().await, Err(DiscoveryError::SessionStopped));

        assert!(wait_for_events(&events, 3).await);
        assert!(matches!(events.lock()[2], Event::Stopped));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_consecutive_read_errors_abort_loop() {
        let (session, events) =
            scripted_session(vec![read_error(), read_error(), read_error()], 3);

        assert!(wait_for_events(&events, 5).await);
        let events = events.lock();
        assert_eq!(events.len(), 5, "{events:?}");
        for event in &events[..3] {
            assert!(matches!(event, Event::Error(DiscoveryError::Io(_))), "{events:?}");
        }
        assert!(matches!(events[3], Event::Error(DiscoveryError::ReceiveLoopAborted(_))));
        assert!(matches!(events[4], Event::Stopped));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_successful_read_resets_error_count() {
        let reads = vec![
            read_error(),
            read_error(),
            announcement(b"demo"),
            read_error(),
            read_error(),
        ];
        let (session, events) = scripted_session(reads, 3);

        assert!(wait_for_events(&events, 5).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        {
            let events = events.lock();
            assert_eq!(events.len(), 5, "{events:?}");
            let ended = events.iter().any(|e| {
                matches!(
                    e,
                    Event::Stopped | Event::Error(DiscoveryError::ReceiveLoopAborted(_))
                )
            });
            assert!(!ended, "{events:?}");
        }
        assert_eq!(session.state(), SessionState::Listening);

        session.stop();
        assert!(wait_for_events(&events, 6).await);
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_foreign_and_loopback_reads_are_not_sightings() {
        let loopback: SocketAddr = "127.0.0.1:24040".parse().unwrap();
        let reads = vec![
            Ok((b"demo".to_vec(), loopback)),
            announcement(b"other"),
            announcement(b"demo"),
        ];
        let (session, events) = scripted_session(reads, 3);

        assert!(wait_for_events(&events, 1).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        {
            let events = events.lock();
            assert_eq!(events.len(), 1, "{events:?}");
            assert!(matches!(events[0], Event::Sighting(s) if s.endpoint == peer()));
        }
        session.stop();
    }
}
