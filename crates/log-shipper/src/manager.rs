//! Manager for per-business pipelines sharing one link registry.

use crate::command::decode_command;
use crate::config::PipelineConfig;
use crate::error::{ShipperError, ShipperResult};
use crate::event::LogEvent;
use crate::pipeline::{MonitorSnapshot, Pipeline};
use crate::registry::LinkRegistry;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Routes events to one pipeline per business, creating pipelines on demand.
pub struct ShipperManager {
    registry: Arc<LinkRegistry>,
    config: PipelineConfig,
    pipelines: RwLock<HashMap<String, Arc<Pipeline>>>,
    /// Set under the pipelines write lock when shutdown begins.
    closed: AtomicBool,
}

impl ShipperManager {
    /// Create a manager. Every pipeline it starts uses `config`.
    pub fn new(registry: Arc<LinkRegistry>, config: PipelineConfig) -> Self {
        Self {
            registry,
            config,
            pipelines: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<LinkRegistry> {
        &self.registry
    }

    /// Get the running pipeline for a business, starting one if needed.
    ///
    /// Fails with [`ShipperError::Stopped`] once [`shutdown`](Self::shutdown)
    /// has begun.
    pub async fn pipeline(&self, business: &str) -> ShipperResult<Arc<Pipeline>> {
        {
            let pipelines = self.pipelines.read().await;
            if let Some(pipeline) = pipelines.get(business) {
                return Ok(pipeline.clone());
            }
        }

        let mut pipelines = self.pipelines.write().await;
        // Another caller may have created it while we waited for the lock
        if let Some(pipeline) = pipelines.get(business) {
            return Ok(pipeline.clone());
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(ShipperError::Stopped(business.to_string()));
        }

        let pipeline = Arc::new(Pipeline::new(
            business,
            self.config.clone(),
            self.registry.clone(),
        )?);
        pipeline.start()?;
        pipelines.insert(business.to_string(), pipeline.clone());

        info!(business = %business, "Created business pipeline");
        Ok(pipeline)
    }

    /// Enqueue an event for a business.
    pub async fn submit(&self, business: &str, event: LogEvent) -> ShipperResult<()> {
        let pipeline = self.pipeline(business).await?;
        pipeline.enqueue(event).await
    }

    /// Decode a raw command and enqueue the resulting event.
    ///
    /// Malformed commands are logged and discarded before reaching any pipeline.
    pub async fn submit_command(&self, raw: &[u8]) -> ShipperResult<()> {
        let (business, event) = match decode_command(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, bytes = raw.len(), "Discarding undecodable command");
                return Err(e);
            }
        };
        self.submit(&business, event).await
    }

    /// Throughput readings for every pipeline.
    pub async fn monitor_all(&self) -> HashMap<String, MonitorSnapshot> {
        let pipelines = self.pipelines.read().await;
        pipelines
            .iter()
            .map(|(business, pipeline)| (business.clone(), pipeline.monitor()))
            .collect()
    }

    /// Stop and forget one business's pipeline.
    pub async fn remove(&self, business: &str) -> bool {
        let removed = self.pipelines.write().await.remove(business);
        match removed {
            Some(pipeline) => {
                pipeline.stop().await;
                info!(business = %business, "Removed business pipeline");
                true
            }
            None => false,
        }
    }

    /// Stop every pipeline concurrently. No new pipelines are created after
    /// this is called.
    pub async fn shutdown(&self) {
        let pipelines: Vec<Arc<Pipeline>> = {
            let mut pipelines = self.pipelines.write().await;
            self.closed.store(true, Ordering::Release);
            pipelines.drain().map(|(_, pipeline)| pipeline).collect()
        };
        let count = pipelines.len();

        join_all(pipelines.iter().map(|pipeline| pipeline.stop())).await;
        info!(pipelines = count, "All pipelines stopped");
    }

    /// Number of live pipelines.
    pub async fn pipeline_count(&self) -> usize {
        self.pipelines.read().await.len()
    }
}
