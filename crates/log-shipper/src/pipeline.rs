//! Per-business shipping pipeline.
//!
//! ```text
//! producers -> ingest buffer -> assembler -> batch queue -> workers -> BatchSender -> link registry
//! ```
//!
//! Producers only ever touch the ingest buffer; when it is full they wait.
//! Delivery failures never reach producers, they show up in the counters
//! returned by [`Pipeline::monitor`].

use crate::assembler::run_assembler;
use crate::config::PipelineConfig;
use crate::counters::ThroughputCounters;
use crate::error::{ShipperError, ShipperResult};
use crate::event::{EventBatch, LogEvent};
use crate::registry::LinkRegistry;
use crate::sender::BatchSender;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Lifecycle of a pipeline. Moves forward only; a stopped pipeline is never
/// restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Built, accepting events into the buffer, nothing draining it yet.
    Created,
    /// Assembler and workers running.
    Running,
    /// Stop requested; enqueue fails from here on.
    Stopped,
}

/// Point-in-time throughput reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorSnapshot {
    /// Events delivered since the previous reading.
    pub success: i64,
    /// Events in failed delivery attempts since the previous reading.
    pub failure: i64,
    /// Events waiting in the ingest buffer right now.
    pub backlog: usize,
}

/// Batching pipeline for one business.
pub struct Pipeline {
    business: String,
    config: PipelineConfig,
    registry: Arc<LinkRegistry>,
    counters: Arc<ThroughputCounters>,
    state: Mutex<PipelineState>,
    ingest_tx: Mutex<Option<mpsc::Sender<LogEvent>>>,
    /// Taken by the assembler on start.
    ingest_rx: Mutex<Option<mpsc::Receiver<LogEvent>>>,
    stop_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Create a pipeline for `business`. Nothing runs until [`start`](Self::start).
    pub fn new(
        business: impl Into<String>,
        config: PipelineConfig,
        registry: Arc<LinkRegistry>,
    ) -> ShipperResult<Self> {
        config.validate()?;
        let (ingest_tx, ingest_rx) = mpsc::channel(config.ingest_capacity);
        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            business: business.into(),
            config,
            registry,
            counters: Arc::new(ThroughputCounters::new()),
            state: Mutex::new(PipelineState::Created),
            ingest_tx: Mutex::new(Some(ingest_tx)),
            ingest_rx: Mutex::new(Some(ingest_rx)),
            stop_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// The business this pipeline ships for.
    pub fn business(&self) -> &str {
        &self.business
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    /// Shared counters, for callers that want totals rather than deltas.
    pub fn counters(&self) -> &Arc<ThroughputCounters> {
        &self.counters
    }

    /// Queue an event for shipping.
    ///
    /// Waits while the ingest buffer is full. Fails with
    /// [`ShipperError::ChannelClosed`] once the pipeline is stopped, including
    /// for callers that were waiting on a full buffer when it stopped.
    pub async fn enqueue(&self, event: LogEvent) -> ShipperResult<()> {
        if self.state() == PipelineState::Stopped {
            return Err(self.closed());
        }
        let sender = self.ingest_tx.lock().clone().ok_or_else(|| self.closed())?;
        sender.send(event).await.map_err(|_| self.closed())
    }

    /// Attach the business to every registry link and launch the dispatch
    /// workers and the batch assembler.
    ///
    /// Returns immediately. Must be called from within a tokio runtime.
    pub fn start(&self) -> ShipperResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                PipelineState::Created => *state = PipelineState::Running,
                PipelineState::Running => {
                    return Err(ShipperError::AlreadyStarted(self.business.clone()))
                }
                PipelineState::Stopped => return Err(ShipperError::Stopped(self.business.clone())),
            }
        }

        self.registry.attach_business(&self.business);

        let events = self
            .ingest_rx
            .lock()
            .take()
            .ok_or_else(|| ShipperError::AlreadyStarted(self.business.clone()))?;

        let (batch_tx, batch_rx) = mpsc::channel(self.config.batch_queue_capacity);
        let batch_rx = Arc::new(tokio::sync::Mutex::new(batch_rx));
        let sender = Arc::new(BatchSender::new(
            self.business.clone(),
            self.registry.clone(),
            self.counters.clone(),
            &self.config,
        ));

        let mut tasks = self.tasks.lock();
        for worker_id in 0..self.config.workers {
            tasks.push(tokio::spawn(run_worker(
                worker_id,
                self.business.clone(),
                batch_rx.clone(),
                sender.clone(),
                self.stop_tx.subscribe(),
            )));
        }
        tasks.push(tokio::spawn(run_assembler(
            self.business.clone(),
            self.config.clone(),
            events,
            batch_tx,
            self.stop_tx.subscribe(),
        )));

        info!(
            business = %self.business,
            workers = self.config.workers,
            batch_size = self.config.batch_size,
            "Pipeline started"
        );
        Ok(())
    }

    /// Stop the pipeline.
    ///
    /// Signals stop, waits the grace period so in-flight sends can finish,
    /// releases the registry attachment taken by [`start`](Self::start), then
    /// closes the ingest buffer. Another pipeline for the same business keeps
    /// its own attachment. Buffered and queued events are not guaranteed to
    /// be delivered. Calling it again is a no-op.
    pub async fn stop(&self) {
        let was_running = {
            let mut state = self.state.lock();
            if *state == PipelineState::Stopped {
                debug!(business = %self.business, "Pipeline already stopped");
                return;
            }
            std::mem::replace(&mut *state, PipelineState::Stopped) == PipelineState::Running
        };
        self.stop_tx.send_replace(true);

        tokio::time::sleep(self.config.shutdown_grace()).await;

        let detached = if was_running {
            self.registry.detach_business(&self.business)
        } else {
            0
        };
        self.ingest_tx.lock().take();
        self.ingest_rx.lock().take();

        let still_running = {
            let mut tasks = self.tasks.lock();
            tasks.retain(|task| !task.is_finished());
            tasks.len()
        };

        info!(
            business = %self.business,
            detached_links = detached,
            still_running,
            "Pipeline stopped"
        );
    }

    /// Throughput since the previous call, plus the current ingest backlog.
    pub fn monitor(&self) -> MonitorSnapshot {
        let (success, failure) = self.counters.snapshot_delta();
        MonitorSnapshot {
            success,
            failure,
            backlog: self.backlog(),
        }
    }

    /// Events currently waiting in the ingest buffer.
    pub fn backlog(&self) -> usize {
        self.ingest_tx
            .lock()
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    fn closed(&self) -> ShipperError {
        ShipperError::ChannelClosed(self.business.clone())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

/// Dispatch worker: take one batch at a time and send it.
///
/// Checks the stop flag between batches; a send in progress is never
/// interrupted.
async fn run_worker(
    id: usize,
    business: String,
    batches: Arc<tokio::sync::Mutex<mpsc::Receiver<EventBatch>>>,
    sender: Arc<BatchSender>,
    stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }

        let batch = {
            let mut rx = batches.lock().await;
            rx.recv().await
        };
        let Some(batch) = batch else {
            break;
        };

        sender.send(batch).await;
    }
    debug!(business = %business, worker = id, "Dispatch worker stopped");
}
