//! TCP listener and connection pairing.
//!
//! This module accepts inbound connections, dials the fixed upstream for
//! each one, and starts the two forwarding directions of the pair.
//!
//! - One task per accepted connection performs the upstream dial
//! - Two further tasks per pair forward records, one per direction
//! - A failed dial closes the inbound connection; there is no retry
//! - An accept failure is fatal to the listener

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn, Instrument};

use super::relay::{Direction, DirectionReport};
use crate::error::RelayError;

/// Default idle timeout (none, a silent peer is waited on forever).
pub const DEFAULT_IDLE_TIMEOUT: Option<Duration> = None;

/// Default upstream connect timeout (none, the OS decides).
pub const DEFAULT_CONNECT_TIMEOUT: Option<Duration> = None;

/// Configuration for a listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Upstream every inbound connection is relayed to.
    pub upstream_addr: SocketAddr,
    /// Idle timeout for each forwarding direction.
    pub idle_timeout: Option<Duration>,
    /// Connect timeout for the upstream dial.
    pub connect_timeout: Option<Duration>,
}

impl ListenerConfig {
    /// Create a new listener configuration.
    pub fn new(bind_addr: SocketAddr, upstream_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            upstream_addr,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Relay statistics, shared by the listener and every direction.
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Upstream dials that succeeded.
    pub upstream_connected: AtomicU64,
    /// Upstream dials that failed or timed out.
    pub upstream_failed: AtomicU64,
    /// Connection pairs with at least one direction still running.
    pub pairs_active: AtomicU64,
    /// Forwarding directions currently running.
    pub directions_active: AtomicU64,
    /// Records forwarded across all directions.
    pub records_forwarded: AtomicU64,
    /// Bytes forwarded across all directions, headers included.
    pub bytes_forwarded: AtomicU64,
    /// Records rejected for exceeding the size ceiling.
    pub oversized_records: AtomicU64,
}

/// A TCP listener relaying every connection to one upstream.
pub struct Listener {
    /// Listener configuration.
    config: ListenerConfig,
    /// The TCP listener.
    listener: TcpListener,
    /// Statistics.
    stats: Arc<RelayStats>,
}

impl Listener {
    /// Bind the listen socket.
    pub async fn bind(config: ListenerConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| RelayError::Bind {
            addr: config.bind_addr,
            source,
        })?;

        info!(
            bind_addr = %local_addr,
            upstream_addr = %config.upstream_addr,
            "Listener bound"
        );

        Ok(Self {
            listener,
            config,
            stats: Arc::new(RelayStats::default()),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get relay statistics.
    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Run the listener, accepting and relaying connections.
    ///
    /// Only returns on an accept failure.
    pub async fn run(self: Arc<Self>) -> Result<(), RelayError> {
        loop {
            let (stream, peer_addr) = self.listener.accept().await.map_err(RelayError::Accept)?;

            self.stats
                .connections_accepted
                .fetch_add(1, Ordering::Relaxed);

            let listener = Arc::clone(&self);
            tokio::spawn(
                async move {
                    listener.handle_connection(stream, peer_addr).await;
                }
                .instrument(tracing::info_span!("connection", peer = %peer_addr)),
            );
        }
    }

    /// Dial the upstream and relay both directions of the pair.
    async fn handle_connection(&self, inbound: TcpStream, peer_addr: SocketAddr) {
        let upstream_addr = self.config.upstream_addr;
        debug!(peer_addr = %peer_addr, upstream_addr = %upstream_addr, "Handling connection");

        let outbound = match self.dial_upstream().await {
            Ok(stream) => {
                self.stats.upstream_connected.fetch_add(1, Ordering::Relaxed);
                stream
            }
            Err(e) => {
                self.stats.upstream_failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    peer_addr = %peer_addr,
                    upstream_addr = %upstream_addr,
                    error = %e,
                    "Upstream dial failed, closing inbound connection"
                );
                drop(inbound);
                return;
            }
        };

        let upstream_peer = outbound.peer_addr().unwrap_or(upstream_addr);
        debug!(upstream_addr = %upstream_peer, "Connected to upstream");

        let (inbound_read, inbound_write) = inbound.into_split();
        let (outbound_read, outbound_write) = outbound.into_split();

        let to_upstream = Direction::new(peer_addr, upstream_peer, Arc::clone(&self.stats))
            .with_idle_timeout(self.config.idle_timeout);
        let to_client = Direction::new(upstream_peer, peer_addr, Arc::clone(&self.stats))
            .with_idle_timeout(self.config.idle_timeout);

        self.stats.pairs_active.fetch_add(1, Ordering::Relaxed);

        let upstream_task = tokio::spawn(
            to_upstream
                .run(inbound_read, outbound_write)
                .instrument(tracing::info_span!("direction", flow = "client_to_upstream")),
        );
        let client_task = tokio::spawn(
            to_client
                .run(outbound_read, inbound_write)
                .instrument(tracing::info_span!("direction", flow = "upstream_to_client")),
        );

        // Awaiting the handles only observes completion; neither task can
        // cancel the other.
        let (sent, received) = tokio::join!(upstream_task, client_task);
        self.stats.pairs_active.fetch_sub(1, Ordering::Relaxed);

        debug!(
            records_to_upstream = records_of(&sent),
            records_to_client = records_of(&received),
            records_forwarded_total = self.stats.records_forwarded.load(Ordering::Relaxed),
            pairs_active = self.stats.pairs_active.load(Ordering::Relaxed),
            "Connection closed"
        );
    }

    async fn dial_upstream(&self) -> io::Result<TcpStream> {
        let connect = TcpStream::connect(self.config.upstream_addr);
        match self.config.connect_timeout {
            Some(connect_timeout) => match tokio::time::timeout(connect_timeout, connect).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "upstream connect timeout",
                )),
            },
            None => connect.await,
        }
    }
}

fn records_of(report: &Result<DirectionReport, tokio::task::JoinError>) -> u64 {
    report.as_ref().map(|r| r.records).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_listener_config_default() {
        let config = ListenerConfig::new(
            "127.0.0.1:8443".parse().unwrap(),
            "127.0.0.1:443".parse().unwrap(),
        );
        assert!(config.idle_timeout.is_none());
        assert!(config.connect_timeout.is_none());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_an_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let result = Listener::bind(ListenerConfig::new(addr, addr)).await;
        assert!(matches!(result, Err(RelayError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_dial_failure_closes_inbound() {
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);

        let config = ListenerConfig::new("127.0.0.1:0".parse().unwrap(), dead_addr);
        let listener = Arc::new(Listener::bind(config).await.unwrap());
        let listen_addr = listener.local_addr().unwrap();
        tokio::spawn(Arc::clone(&listener).run());

        let mut client = TcpStream::connect(listen_addr).await.unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);

        assert_eq!(listener.stats().connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(listener.stats().upstream_failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_pair_counters() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream.local_addr().unwrap();

        let config = ListenerConfig::new("127.0.0.1:0".parse().unwrap(), upstream_addr);
        let listener = Arc::new(Listener::bind(config).await.unwrap());
        let listen_addr = listener.local_addr().unwrap();
        tokio::spawn(Arc::clone(&listener).run());

        let mut client = TcpStream::connect(listen_addr).await.unwrap();
        let (mut server, _) = upstream.accept().await.unwrap();

        let record = [0x17, 0x03, 0x03, 0x00, 0x02, 0xbe, 0xef];
        client.write_all(&record).await.unwrap();
        let mut received = [0u8; 7];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, record);

        drop(client);
        drop(server);

        for _ in 0..50 {
            if listener.stats().pairs_active.load(Ordering::Relaxed) == 0
                && listener.stats().upstream_connected.load(Ordering::Relaxed) == 1
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let stats = listener.stats();
        assert_eq!(stats.upstream_connected.load(Ordering::Relaxed), 1);
        assert_eq!(stats.records_forwarded.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bytes_forwarded.load(Ordering::Relaxed), 7);
        assert_eq!(stats.pairs_active.load(Ordering::Relaxed), 0);
        assert_eq!(stats.directions_active.load(Ordering::Relaxed), 0);
    }
}
