use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use shared::message::Message;
use shared::protocol::{MAX_DATAGRAM_SIZE, MULTICAST_TTL};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};
use crate::net::interfaces::LocalInterface;
use crate::scope::Scope;

/// Inbound acceptance predicate, applied to every decoded message
pub type InboundFilter = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

type SharedFilter = Arc<RwLock<Option<InboundFilter>>>;

struct Running {
    socket: Arc<UdpSocket>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the multicast socket bound to one interface.
///
/// Decoded datagrams accepted by the filter are forwarded to the inbound
/// queue shared with the other transports of the pool.
pub struct Transport {
    interface: LocalInterface,
    group: SocketAddr,
    bind_port: u16,
    inbound: mpsc::Sender<Message>,
    scope: Scope,
    filter: SharedFilter,
    running: Mutex<Option<Running>>,
}

impl Transport {
    /// `bind_port` 0 makes a search-only transport on an ephemeral port that
    /// does not join the multicast group.
    pub fn new(
        interface: LocalInterface,
        bind_port: u16,
        inbound: mpsc::Sender<Message>,
        scope: Scope,
    ) -> Self {
        Self {
            group: interface.multicast_group(),
            interface,
            bind_port,
            inbound,
            scope,
            filter: Arc::new(RwLock::new(None)),
            running: Mutex::new(None),
        }
    }

    pub fn interface(&self) -> &LocalInterface {
        &self.interface
    }

    pub fn multicast_group(&self) -> SocketAddr {
        self.group
    }

    /// Address the socket is bound to while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.running)
            .as_ref()
            .and_then(|running| running.socket.local_addr().ok())
    }

    /// Open the socket and launch the receive loop. A no-op if already
    /// running. On failure nothing stays open and `start` may be retried.
    pub fn start(&self) -> Result<()> {
        if self.scope.is_closed() {
            return Err(TransportError::ScopeClosed);
        }

        let mut running = lock(&self.running);
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return Ok(());
        }

        let socket = self
            .open_socket()
            .and_then(UdpSocket::from_std)
            .map_err(|source| {
                tracing::error!("Cannot start SSDP transport on {}: {}", self.interface.name, source);
                TransportError::SocketSetup {
                    interface: self.interface.name.clone(),
                    source,
                }
            })?;
        let socket = Arc::new(socket);

        let cancel = self.scope.child_token();
        let task = self.scope.spawn(receive_loop(
            self.interface.name.clone(),
            Arc::clone(&socket),
            self.inbound.clone(),
            Arc::clone(&self.filter),
            cancel.clone(),
        ));

        tracing::info!(
            interface = %self.interface.name,
            group = %self.group,
            port = self.bind_port,
            "SSDP transport started"
        );
        *running = Some(Running { socket, cancel, task });
        Ok(())
    }

    fn open_socket(&self) -> io::Result<std::net::UdpSocket> {
        let socket = match self.group {
            SocketAddr::V4(group) => {
                let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
                set_reuse(&socket)?;
                let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.bind_port));
                socket.bind(&bind.into())?;

                let local = self.interface.ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED);
                if self.bind_port != 0 {
                    socket.join_multicast_v4(group.ip(), &local)?;
                }
                if let Err(e) = socket.set_multicast_if_v4(&local) {
                    tracing::debug!("IP_MULTICAST_IF {} on {}: {}", local, self.interface.name, e);
                }
                if let Err(e) = socket.set_multicast_ttl_v4(MULTICAST_TTL) {
                    tracing::debug!("IP_MULTICAST_TTL on {}: {}", self.interface.name, e);
                }
                socket
            }
            SocketAddr::V6(group) => {
                let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
                socket.set_only_v6(true)?;
                set_reuse(&socket)?;
                let bind = SocketAddr::from((Ipv6Addr::UNSPECIFIED, self.bind_port));
                socket.bind(&bind.into())?;

                if self.bind_port != 0 {
                    socket.join_multicast_v6(group.ip(), self.interface.index)?;
                }
                if let Err(e) = socket.set_multicast_if_v6(self.interface.index) {
                    tracing::debug!("IPV6_MULTICAST_IF on {}: {}", self.interface.name, e);
                }
                if let Err(e) = socket.set_multicast_hops_v6(MULTICAST_TTL) {
                    tracing::debug!("IPV6_MULTICAST_HOPS on {}: {}", self.interface.name, e);
                }
                socket
            }
        };

        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }

    /// Cancel the receive loop and release our socket handle; the loop
    /// drops the socket as it exits. Idempotent.
    pub fn stop(&self) {
        if let Some(running) = lock(&self.running).take() {
            drop(running.socket);
            running.cancel.cancel();
            tracing::info!("SSDP transport on {} stopped", self.interface.name);
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.running)
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Send to `address:port`, defaulting to the multicast group and port.
    /// Fire and forget: success only means the datagram left the socket.
    pub async fn send(
        &self,
        message: &Message,
        address: Option<IpAddr>,
        port: Option<u16>,
    ) -> Result<usize> {
        let socket = lock(&self.running)
            .as_ref()
            .map(|running| Arc::clone(&running.socket))
            .ok_or_else(|| TransportError::NotRunning(self.interface.name.clone()))?;

        let target = match address {
            Some(ip) => SocketAddr::new(ip, port.unwrap_or(self.group.port())),
            None => {
                let mut group = self.group;
                if let Some(port) = port {
                    group.set_port(port);
                }
                group
            }
        };

        socket
            .send_to(&message.encode(), target)
            .await
            .map_err(|source| TransportError::Send {
                interface: self.interface.name.clone(),
                source,
            })
    }

    /// Install an inbound filter; `None` accepts everything again
    pub fn set_filter(&self, filter: Option<InboundFilter>) {
        *self.filter.write().unwrap_or_else(PoisonError::into_inner) = filter;
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_reuse(socket: &Socket) -> io::Result<()> {
    socket.set_reuse_address(true)?;

    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    Ok(())
}

fn accepts(filter: &SharedFilter, message: &Message) -> bool {
    let filter = filter.read().unwrap_or_else(PoisonError::into_inner).clone();
    filter.map_or(true, |accept| accept(message))
}

/// Receive, decode, filter, forward. A bad datagram or a failed forward is
/// logged and skipped; only cancellation ends the loop.
async fn receive_loop(
    interface: String,
    socket: Arc<UdpSocket>,
    inbound: mpsc::Sender<Message>,
    filter: SharedFilter,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, from) = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!("Failed to receive UDP packet on {}: {}", interface, e);
                    continue;
                }
            },
        };

        let message = match Message::decode(&buf[..len], Some(from)) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("Dropping datagram from {} on {}: {}", from, interface, e);
                continue;
            }
        };

        if !accepts(&filter, &message) {
            tracing::trace!("Filtered {} from {} on {}", message.kind(), from, interface);
            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = inbound.send(message) => {
                if sent.is_err() {
                    tracing::warn!("Inbound queue closed, dropping datagram from {}", from);
                }
            }
        }
    }

    tracing::debug!("Receive loop on {} exited", interface);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::interfaces::InterfaceAddr;
    use shared::headers::Header;
    use shared::message::MessageType;
    use std::time::Duration;

    fn loopback() -> LocalInterface {
        LocalInterface::new(
            "lo",
            1,
            vec![InterfaceAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                Some(IpAddr::V4(Ipv4Addr::new(255, 0, 0, 0))),
            )],
        )
    }

    fn byebye(usn: &str) -> Message {
        Message::new(MessageType::NotifyByeBye)
            .with_header(Header::UniqueServiceName, usn)
            .with_header(Header::BootId, "1")
    }

    fn alive(usn: &str) -> Message {
        Message::new(MessageType::NotifyAlive)
            .with_header(Header::UniqueServiceName, usn)
            .with_header(Header::BootId, "1")
    }

    async fn inject(transport: &Transport, payload: &[u8]) {
        let port = transport.local_addr().expect("transport running").port();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(payload, ("127.0.0.1", port)).await.unwrap();
    }

    async fn next(rx: &mut mpsc::Receiver<Message>) -> Message {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("message should arrive")
            .expect("queue open")
    }

    #[tokio::test]
    async fn test_receive_forwards_decoded_messages() {
        let (tx, mut rx) = mpsc::channel(16);
        let transport = Transport::new(loopback(), 0, tx, Scope::new());
        transport.start().unwrap();
        assert!(transport.is_active());

        inject(&transport, &alive("uuid:a::upnp:rootdevice").encode()).await;

        let msg = next(&mut rx).await;
        assert_eq!(msg.kind(), MessageType::NotifyAlive);
        assert_eq!(msg.header(Header::UniqueServiceName), Some("uuid:a::upnp:rootdevice"));
        assert_eq!(msg.sender().map(|s| s.ip()), Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[tokio::test]
    async fn test_malformed_datagram_does_not_stop_loop() {
        let (tx, mut rx) = mpsc::channel(16);
        let transport = Transport::new(loopback(), 0, tx, Scope::new());
        transport.start().unwrap();

        inject(&transport, b"garbage").await;
        inject(&transport, b"NOTIFY * HTTP/1.1\r\nNTS:ssdp:alive\r\n\r\n").await;
        inject(&transport, &byebye("uuid:b").encode()).await;

        let msg = next(&mut rx).await;
        assert_eq!(msg.kind(), MessageType::NotifyByeBye);
        assert!(transport.is_active());
    }

    #[tokio::test]
    async fn test_filter_and_reset() {
        let (tx, mut rx) = mpsc::channel(16);
        let transport = Transport::new(loopback(), 0, tx, Scope::new());
        transport.start().unwrap();

        transport.set_filter(Some(Arc::new(|m: &Message| m.kind() != MessageType::NotifyByeBye)));
        inject(&transport, &byebye("uuid:c").encode()).await;
        inject(&transport, &alive("uuid:c").encode()).await;
        assert_eq!(next(&mut rx).await.kind(), MessageType::NotifyAlive);

        transport.set_filter(None);
        inject(&transport, &byebye("uuid:c").encode()).await;
        assert_eq!(next(&mut rx).await.kind(), MessageType::NotifyByeBye);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_restartable() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = Transport::new(loopback(), 0, tx, Scope::new());

        transport.stop();
        transport.start().unwrap();
        transport.start().unwrap();
        assert!(transport.is_active());

        transport.stop();
        transport.stop();
        assert!(!transport.is_active());
        assert!(transport.local_addr().is_none());

        transport.start().unwrap();
        assert!(transport.is_active());
    }

    #[tokio::test]
    async fn test_start_after_scope_closed() {
        let (tx, _rx) = mpsc::channel(16);
        let scope = Scope::new();
        let transport = Transport::new(loopback(), 0, tx, scope.clone());

        scope.cancel();
        assert!(matches!(transport.start(), Err(TransportError::ScopeClosed)));
        assert!(!transport.is_active());
    }

    #[tokio::test]
    async fn test_send_when_stopped() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = Transport::new(loopback(), 0, tx, Scope::new());

        let result = transport.send(&alive("uuid:d"), None, None).await;
        assert!(matches!(result, Err(TransportError::NotRunning(name)) if name == "lo"));
    }

    #[tokio::test]
    async fn test_unicast_send_between_transports() {
        let scope = Scope::new();
        let (tx_a, _rx_a) = mpsc::channel(16);
        let (tx_b, mut rx_b) = mpsc::channel(16);
        let a = Transport::new(loopback(), 0, tx_a, scope.clone());
        let b = Transport::new(loopback(), 0, tx_b, scope.clone());
        a.start().unwrap();
        b.start().unwrap();

        let port_b = b.local_addr().unwrap().port();
        a.send(&alive("uuid:e"), Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), Some(port_b))
            .await
            .unwrap();

        let msg = next(&mut rx_b).await;
        assert_eq!(msg.sender().map(|s| s.port()), a.local_addr().map(|s| s.port()));

        scope.cancel();
        tokio::time::timeout(Duration::from_secs(2), scope.wait()).await.unwrap();
        assert!(!a.is_active() && !b.is_active());
    }
}
