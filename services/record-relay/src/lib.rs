pub mod config;
pub mod error;
pub mod proxy;

pub use error::RelayError;
pub use proxy::{
    Direction, DirectionReport, Listener, ListenerConfig, RecordDetail, RecordHeader, RelayStats,
    Termination,
};
