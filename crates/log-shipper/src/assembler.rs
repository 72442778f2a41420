//! Batch assembler: drains the ingest buffer into bounded batches.
//!
//! A batch is flushed when an event arrives and either the batch is already
//! full or the flush interval has passed since the last flush. The check runs
//! before the arriving event is appended, so the arriving event always opens
//! the next batch. With no arrivals nothing is flushed, unless an idle flush
//! interval is configured.

use crate::config::PipelineConfig;
use crate::event::{EventBatch, LogEvent};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Run the assembler until stop is signalled or the ingest buffer closes.
///
/// Dropping `batches` on return closes the batch queue. A partial batch that
/// was never flushed is discarded.
pub(crate) async fn run_assembler(
    business: String,
    config: PipelineConfig,
    mut events: mpsc::Receiver<LogEvent>,
    batches: mpsc::Sender<EventBatch>,
    mut stop: watch::Receiver<bool>,
) {
    let batch_size = config.batch_size;
    let flush_interval = config.flush_interval();
    let idle_flush = config.idle_flush_interval();

    let mut pack: Vec<LogEvent> = Vec::with_capacity(batch_size);
    let mut last_flush = Instant::now();

    debug!(business = %business, batch_size, "Batch assembler started");

    loop {
        if *stop.borrow() {
            break;
        }

        let idle_deadline = idle_flush.map(|interval| last_flush + interval);

        tokio::select! {
            biased;

            _ = stop.changed() => break,

            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    debug!(business = %business, "Ingest buffer closed");
                    break;
                };

                if pack.len() >= batch_size || last_flush.elapsed() >= flush_interval {
                    let full = std::mem::replace(&mut pack, Vec::with_capacity(batch_size));
                    last_flush = Instant::now();
                    if !flush(&business, full, &batches, &mut stop).await {
                        break;
                    }
                }
                pack.push(event);
            }

            _ = sleep_until(idle_deadline), if idle_deadline.is_some() && !pack.is_empty() => {
                let partial = std::mem::replace(&mut pack, Vec::with_capacity(batch_size));
                last_flush = Instant::now();
                trace!(business = %business, events = partial.len(), "Idle flush");
                if !flush(&business, partial, &batches, &mut stop).await {
                    break;
                }
            }
        }
    }

    if !pack.is_empty() {
        warn!(
            business = %business,
            events = pack.len(),
            "Discarding unflushed partial batch at shutdown"
        );
    }
    debug!(business = %business, "Batch assembler stopped");
}

/// Hand a batch to the dispatch workers. Returns false if the pipeline is
/// shutting down and the batch could not be queued.
async fn flush(
    business: &str,
    events: Vec<LogEvent>,
    batches: &mpsc::Sender<EventBatch>,
    stop: &mut watch::Receiver<bool>,
) -> bool {
    let batch = EventBatch::new(events);
    trace!(business = %business, batch_id = %batch.batch_id, events = batch.len(), "Flushing batch");

    tokio::select! {
        biased;
        _ = stop.changed() => false,
        result = batches.send(batch) => match result {
            Ok(()) => true,
            Err(_) => {
                debug!(business = %business, "Batch queue closed");
                false
            }
        },
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
