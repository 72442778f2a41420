//! Pipeline behavior tests.
//!
//! - `harness.rs`   - MockPool / MockClient and helpers
//! - `retry.rs`     - send-with-retry, eviction and counter accounting
//! - `batching.rs`  - size and time triggers through a running pipeline
//! - `lifecycle.rs` - start/stop, backpressure, detach, monitor
//! - `manager.rs`   - multi-business routing and shutdown

mod batching;
mod retry;
