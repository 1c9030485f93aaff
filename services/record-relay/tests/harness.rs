//! Test harness for record relay integration tests.
//!
//! Provides helpers to spawn a relay listener in front of a loopback upstream
//! and to build TLS records.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use record_relay::{Listener, ListenerConfig, RelayStats};

/// Upper bound for any single step in a test.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// A loopback server standing in for the relay's remote target.
pub struct Upstream {
    pub addr: SocketAddr,
    listener: TcpListener,
}

impl Upstream {
    pub async fn spawn() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        Ok(Self { addr, listener })
    }

    /// Accept the next relayed connection.
    pub async fn accept(&self) -> io::Result<TcpStream> {
        let (stream, _) = timeout(STEP_TIMEOUT, self.listener.accept())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "upstream accept timeout"))??;
        Ok(stream)
    }
}

/// A running relay listener.
pub struct RelayHandle {
    pub listen_addr: SocketAddr,
    listener: Arc<Listener>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    pub async fn spawn(upstream_addr: SocketAddr) -> io::Result<Self> {
        let config = ListenerConfig::new("127.0.0.1:0".parse().unwrap(), upstream_addr);
        let listener = Arc::new(Listener::bind(config).await.map_err(io::Error::other)?);
        let listen_addr = listener.local_addr()?;

        let run = Arc::clone(&listener);
        let task = tokio::spawn(async move {
            let _ = run.run().await;
        });

        Ok(Self {
            listen_addr,
            listener,
            task,
        })
    }

    pub async fn connect(&self) -> io::Result<TcpStream> {
        TcpStream::connect(self.listen_addr).await
    }

    pub fn stats(&self) -> &RelayStats {
        self.listener.stats()
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Build a TLS 1.2 framed record.
pub fn record(content_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![content_type, 0x03, 0x03];
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}
