//! Error types for the log shipper.

use std::time::Duration;
use thiserror::Error;

/// Log shipper error type.
#[derive(Error, Debug)]
pub enum ShipperError {
    /// Ingest buffer is closed (pipeline stopped)
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Pipeline was already started
    #[error("Pipeline already started: {0}")]
    AlreadyStarted(String),

    /// Pipeline was stopped and cannot be restarted
    #[error("Pipeline stopped: {0}")]
    Stopped(String),

    /// Client pool could not hand out a client
    #[error("Acquire failed: {0}")]
    Acquire(String),

    /// Client pool did not hand out a client in time
    #[error("Acquire timed out after {0:?}")]
    AcquireTimeout(Duration),

    /// Link registry has nothing to rotate through
    #[error("No remote links registered")]
    NoLinks,

    /// Delivery failure reported by the transport
    #[error("Send failed: {0}")]
    Send(String),

    /// Transport request timed out
    #[error("Timeout waiting for collector response after {0} seconds")]
    Timeout(u64),

    /// Malformed inbound command
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (socket, file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using ShipperError.
pub type ShipperResult<T> = Result<T, ShipperError>;
