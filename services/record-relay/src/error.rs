//! Error types for relay startup.
//!
//! Only startup failures are errors. Anything that goes wrong on an
//! established connection ends that direction and is reported as a
//! [`Termination`](crate::proxy::Termination) instead.

use std::io;

use thiserror::Error;

/// Fatal relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A required address parameter was not given.
    #[error("missing required address: {0}")]
    MissingAddress(&'static str),

    /// Address lookup failed.
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Address lookup succeeded but returned nothing usable.
    #[error("no usable address for {0}")]
    NoAddress(String),

    /// Could not bind the listen socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Accepting an inbound connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

impl RelayError {
    /// Short reason code for structured logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            RelayError::MissingAddress(_) => "missing_address",
            RelayError::Resolve { .. } => "resolve_failed",
            RelayError::NoAddress(_) => "no_address",
            RelayError::Bind { .. } => "bind_failed",
            RelayError::Accept(_) => "accept_failed",
        }
    }
}
