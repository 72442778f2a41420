//! Batch sender: delivery with retry over the rotating link registry.

use crate::config::PipelineConfig;
use crate::counters::ThroughputCounters;
use crate::error::ShipperError;
use crate::event::EventBatch;
use crate::registry::LinkRegistry;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Result of sending one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A collector accepted the batch on the given attempt.
    Delivered { attempts: u32 },
    /// Every attempt failed; the batch was dropped.
    Dropped { attempts: u32 },
    /// Nothing to send.
    Empty,
}

/// Sends batches for one business.
///
/// Each attempt takes the next link from the registry, acquires a client
/// from its pool, sends the whole batch once and returns the client: healthy
/// on success, broken on an error or a panic inside the transport.
/// Acquisition failures use up an attempt but are not counted as failures.
pub struct BatchSender {
    business: String,
    registry: Arc<LinkRegistry>,
    counters: Arc<ThroughputCounters>,
    max_attempts: u32,
    acquire_timeout: Duration,
}

impl BatchSender {
    /// Create a sender for a business.
    pub fn new(
        business: impl Into<String>,
        registry: Arc<LinkRegistry>,
        counters: Arc<ThroughputCounters>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            business: business.into(),
            registry,
            counters,
            max_attempts: config.max_attempts,
            acquire_timeout: config.acquire_timeout(),
        }
    }

    /// Send a batch, retrying up to the attempt bound.
    pub async fn send(&self, batch: EventBatch) -> SendOutcome {
        if batch.is_empty() {
            debug!(business = %self.business, batch_id = %batch.batch_id, "Skipping empty batch");
            return SendOutcome::Empty;
        }
        let count = batch.len();

        for attempt in 1..=self.max_attempts {
            let Some(link) = self.registry.next_link() else {
                warn!(
                    business = %self.business,
                    batch_id = %batch.batch_id,
                    attempt,
                    error = %ShipperError::NoLinks,
                    "No collector link available"
                );
                continue;
            };
            let pool = link.pool();

            // The wait stays bounded even if the pool ignores `timeout`
            let acquired =
                tokio::time::timeout(self.acquire_timeout, pool.acquire(self.acquire_timeout))
                    .await
                    .unwrap_or(Err(ShipperError::AcquireTimeout(self.acquire_timeout)));
            let client = match acquired {
                Ok(client) => client,
                Err(e) => {
                    warn!(
                        business = %self.business,
                        endpoint = %pool.endpoint(),
                        attempt,
                        error = %e,
                        "Failed to acquire collector client"
                    );
                    continue;
                }
            };
            let endpoint = client.client().endpoint().to_string();

            let result = AssertUnwindSafe(client.client().append_batch(&batch.events))
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(())) => {
                    self.counters.record_success(count);
                    pool.release(client);
                    debug!(
                        business = %self.business,
                        batch_id = %batch.batch_id,
                        endpoint = %endpoint,
                        events = count,
                        attempt,
                        "Batch delivered"
                    );
                    return SendOutcome::Delivered { attempts: attempt };
                }
                Ok(Err(e)) => {
                    self.counters.record_failure(count);
                    pool.release_broken(client);
                    warn!(
                        business = %self.business,
                        batch_id = %batch.batch_id,
                        endpoint = %endpoint,
                        attempt,
                        error = %e,
                        "Batch delivery failed"
                    );
                }
                Err(panic) => {
                    self.counters.record_failure(count);
                    pool.release_broken(client);
                    error!(
                        business = %self.business,
                        batch_id = %batch.batch_id,
                        endpoint = %endpoint,
                        attempt,
                        panic = %panic_message(panic.as_ref()),
                        "Transport panicked during batch delivery"
                    );
                }
            }
        }

        error!(
            business = %self.business,
            batch_id = %batch.batch_id,
            events = count,
            attempts = self.max_attempts,
            "Dropping batch after exhausting delivery attempts"
        );
        SendOutcome::Dropped {
            attempts: self.max_attempts,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
