//! One-directional record relay.
//!
//! A [`Direction`] reads TLS records from a source stream and writes them
//! byte-for-byte to a destination stream, logging each record's clear-text
//! framing on the way through. Two directions make up a relayed connection;
//! they share nothing but the sockets and run until each independently
//! observes an end of stream or an I/O failure.

use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use socket2::SockRef;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::listener::RelayStats;
use super::record::{
    alert_description_name, alert_level_name, handshake_type_name, ProtocolVersion,
    RecordDetail, RecordHeader, HEADER_LEN, MAX_RECORD_LEN,
};

/// Read side of a stream that can be shut down on its own.
pub trait CloseRead {
    /// Stop receiving on this side, leaving any write side open.
    fn close_read(&self) -> io::Result<()>;
}

impl CloseRead for OwnedReadHalf {
    fn close_read(&self) -> io::Result<()> {
        let stream: &TcpStream = self.as_ref();
        SockRef::from(stream).shutdown(Shutdown::Read)
    }
}

/// Why a direction stopped forwarding.
#[derive(Debug)]
pub enum Termination {
    /// Source reached end of stream on a record boundary.
    Closed,
    /// Source reached end of stream inside a header or payload.
    Truncated,
    /// A header declared a payload above [`MAX_RECORD_LEN`].
    Oversized { length: usize },
    /// Reading from the source failed.
    ReadFailed(io::Error),
    /// Writing to the destination failed.
    WriteFailed(io::Error),
    /// A single read saw no data within the configured idle timeout.
    IdleTimeout,
}

impl Termination {
    /// Short reason code for structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Termination::Closed => "closed",
            Termination::Truncated => "truncated",
            Termination::Oversized { .. } => "oversized_record",
            Termination::ReadFailed(_) => "read_failed",
            Termination::WriteFailed(_) => "write_failed",
            Termination::IdleTimeout => "idle_timeout",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Closed => write!(f, "source closed"),
            Termination::Truncated => write!(f, "source closed mid-record"),
            Termination::Oversized { length } => write!(
                f,
                "record length {} exceeds maximum {}",
                length, MAX_RECORD_LEN
            ),
            Termination::ReadFailed(e) => write!(f, "read failed: {}", e),
            Termination::WriteFailed(e) => write!(f, "write failed: {}", e),
            Termination::IdleTimeout => write!(f, "idle timeout"),
        }
    }
}

/// Outcome of a finished direction.
#[derive(Debug)]
pub struct DirectionReport {
    /// Why forwarding stopped.
    pub termination: Termination,
    /// Records forwarded.
    pub records: u64,
    /// Bytes forwarded, headers included.
    pub bytes: u64,
}

/// One forwarding direction of a relayed connection.
#[derive(Debug, Clone)]
pub struct Direction {
    /// Peer address of the source socket (logging only).
    pub src: SocketAddr,
    /// Peer address of the destination socket (logging only).
    pub dst: SocketAddr,
    /// Bound on each individual read, if any.
    pub idle_timeout: Option<Duration>,
    /// Shared counters.
    pub stats: Arc<RelayStats>,
}

impl Direction {
    /// Create a direction with no idle timeout.
    pub fn new(src: SocketAddr, dst: SocketAddr, stats: Arc<RelayStats>) -> Self {
        Self {
            src,
            dst,
            idle_timeout: None,
            stats,
        }
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Forward records from `src` to `dst` until either side fails.
    ///
    /// On the way out the source is shut down for reading and the
    /// destination for writing, leaving the opposite direction untouched.
    pub async fn run<R, W>(self, mut src: R, mut dst: W) -> DirectionReport
    where
        R: AsyncRead + CloseRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.stats.directions_active.fetch_add(1, Ordering::Relaxed);

        let mut header = [0u8; HEADER_LEN];
        let mut buf = vec![0u8; MAX_RECORD_LEN];
        let mut records = 0u64;
        let mut bytes = 0u64;

        let termination = loop {
            match self.read_full(&mut src, &mut header).await {
                Ok(HEADER_LEN) => {}
                Ok(0) => break Termination::Closed,
                Ok(_) => break Termination::Truncated,
                Err(termination) => break termination,
            }

            let record = RecordHeader::parse(&header);
            if record.is_oversized() {
                self.stats.oversized_records.fetch_add(1, Ordering::Relaxed);
                break Termination::Oversized {
                    length: record.payload_len(),
                };
            }

            let payload = &mut buf[..record.payload_len()];
            match self.read_full(&mut src, payload).await {
                Ok(n) if n == payload.len() => {}
                Ok(_) => break Termination::Truncated,
                Err(termination) => break termination,
            }

            // Both writes are attempted even if the first one fails.
            let header_written = dst.write_all(&header).await;
            let payload_written = dst.write_all(payload).await;
            let written = match header_written.and(payload_written) {
                Ok(()) => dst.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                break Termination::WriteFailed(e);
            }

            let forwarded = (HEADER_LEN + payload.len()) as u64;
            records += 1;
            bytes += forwarded;
            self.stats.records_forwarded.fetch_add(1, Ordering::Relaxed);
            self.stats
                .bytes_forwarded
                .fetch_add(forwarded, Ordering::Relaxed);

            self.log_record(&record, payload);
        };

        if let Err(e) = src.close_read() {
            debug!(src = %self.src, error = %e, "Source read shutdown failed");
        }
        drop(src);
        if let Err(e) = dst.shutdown().await {
            debug!(dst = %self.dst, error = %e, "Destination shutdown failed");
        }
        self.stats.directions_active.fetch_sub(1, Ordering::Relaxed);

        match &termination {
            Termination::Oversized { .. } => warn!(
                src = %self.src,
                dst = %self.dst,
                reason = termination.reason(),
                detail = %termination,
                records,
                bytes,
                "Direction closed"
            ),
            _ => info!(
                src = %self.src,
                dst = %self.dst,
                reason = termination.reason(),
                detail = %termination,
                records,
                bytes,
                "Direction closed"
            ),
        }

        DirectionReport {
            termination,
            records,
            bytes,
        }
    }

    /// Read until `buf` is full or the source ends.
    ///
    /// Returns the number of bytes read; fewer than `buf.len()` means the
    /// source reached end of stream. The idle timeout bounds each read, so a
    /// slow but steady sender is never cut off.
    async fn read_full<R: AsyncRead + Unpin>(
        &self,
        src: &mut R,
        buf: &mut [u8],
    ) -> Result<usize, Termination> {
        let mut total_read = 0;
        while total_read < buf.len() {
            let read = src.read(&mut buf[total_read..]);
            let read_result = match self.idle_timeout {
                Some(idle_timeout) => match tokio::time::timeout(idle_timeout, read).await {
                    Ok(result) => result,
                    Err(_) => return Err(Termination::IdleTimeout),
                },
                None => read.await,
            };

            match read_result {
                Ok(0) => break,
                Ok(n) => total_read += n,
                Err(e) => return Err(Termination::ReadFailed(e)),
            }
        }
        Ok(total_read)
    }

    fn log_record(&self, record: &RecordHeader, payload: &[u8]) {
        let version = ProtocolVersion(record.version);
        match RecordDetail::classify(record.content_type, payload) {
            RecordDetail::Handshake { kind, length } => info!(
                src = %self.src,
                dst = %self.dst,
                content_type = record.content_type_name(),
                content_type_code = record.content_type,
                version = %version,
                length = record.length,
                handshake_type = handshake_type_name(kind),
                handshake_type_code = kind,
                handshake_length = length,
                "Forwarded record"
            ),
            RecordDetail::Alert { level, description } => info!(
                src = %self.src,
                dst = %self.dst,
                content_type = record.content_type_name(),
                content_type_code = record.content_type,
                version = %version,
                length = record.length,
                alert_level = alert_level_name(level),
                alert_level_code = level,
                alert_description = alert_description_name(description),
                alert_description_code = description,
                "Forwarded record"
            ),
            RecordDetail::None => info!(
                src = %self.src,
                dst = %self.dst,
                content_type = record.content_type_name(),
                content_type_code = record.content_type,
                version = %version,
                length = record.length,
                "Forwarded record"
            ),
        }
    }
}
