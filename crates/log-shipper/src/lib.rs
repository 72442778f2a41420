//! Log shipper: batches log events and forwards them to remote collectors.
//!
//! Producers hand events to a per-business [`Pipeline`] and never wait on
//! the network. Events are grouped into batches by size or elapsed time,
//! drained by a fixed pool of workers, and delivered through a shared,
//! round-robin [`LinkRegistry`] of collector client pools with bounded
//! retry and eviction of broken clients.
//!
//! # Architecture
//!
//! ```text
//! producer -> ingest buffer -> assembler -> batch queue -> workers
//!                                                            |
//!                         collector <- client pool <- link registry
//! ```
//!
//! # Delivery contract
//!
//! Best effort, at most once. A batch is tried a fixed number of times and
//! then dropped; buffered events are not persisted across restarts and may be
//! lost on shutdown. Failures surface only in [`MonitorSnapshot`] counters
//! and logs.

mod assembler;
pub mod command;
pub mod config;
pub mod counters;
pub mod error;
pub mod event;
pub mod logging;
pub mod manager;
pub mod pipeline;
pub mod pool;
pub mod registry;
pub mod sender;
pub mod tcp;

#[cfg(test)]
mod tests;

pub use command::decode_command;
pub use config::{LogFormat, PipelineConfig, ShipperConfig};
pub use counters::ThroughputCounters;
pub use error::{ShipperError, ShipperResult};
pub use event::{EventBatch, LogEvent};
pub use manager::ShipperManager;
pub use pipeline::{MonitorSnapshot, Pipeline, PipelineState};
pub use pool::{ClientPool, PooledClient, RemoteClient};
pub use registry::{LinkRegistry, PoolLink};
pub use sender::{BatchSender, SendOutcome};
pub use tcp::{TcpClient, TcpClientPool};
