//! Record-layer observing TCP relay.
//!
//! This module provides:
//! - TCP listener management and upstream dialing
//! - Per-direction record forwarding with a 16 KiB size ceiling
//! - Clear-text classification of record, handshake and alert types
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> Direction (client -> upstream) -> Upstream
//!        <-          <- Direction (upstream -> client) <-
//!                              |
//!                        Record Classifier
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use proxy::{Listener, ListenerConfig};
//!
//! let config = ListenerConfig::new("127.0.0.1:8443".parse()?, "127.0.0.1:443".parse()?);
//! let listener = Arc::new(Listener::bind(config).await?);
//! listener.run().await?;
//! ```

mod listener;
mod record;
mod relay;

pub use listener::{Listener, ListenerConfig, RelayStats};
pub use record::{
    alert_description_name, alert_level_name, content_type_name, handshake_type_name,
    ProtocolVersion, RecordDetail, RecordHeader, HEADER_LEN, MAX_RECORD_LEN, UNKNOWN,
};
pub use relay::{Direction, DirectionReport, Termination};
