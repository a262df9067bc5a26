use crate::types::NodeId;
use thiserror::Error;

pub type MonitorResult<T> = Result<T, MonitorError>;

/// Configuration-time monitoring errors.
///
/// Steady-state conditions (attribute read failures, queue overflow) are
/// never surfaced here: they travel in-band as bad status codes or the
/// overflow info bit on the affected notification. This enum only covers
/// operations that are expected to fail fast at subscribe/modify time.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Unknown monitored item: {0}")]
    UnknownMonitoredItem(u32),
    #[error("Too many monitored items on node {node}: limit is {limit}")]
    TooManyMonitoredItems { node: NodeId, limit: usize },
    #[error("Invalid state error: {0}")]
    InvalidStateError(String),
}
