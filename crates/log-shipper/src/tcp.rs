//! Newline-delimited JSON transport over TCP.
//!
//! Each batch is one request line and one reply line:
//!
//! ```text
//! -> {"batch":[{"headers":{"destination":"orders","action":"click"},"body":"<base64>"}]}
//! <- {"ok":true}
//! <- {"ok":false,"error":"disk full"}
//! ```

use crate::error::{ShipperError, ShipperResult};
use crate::event::LogEvent;
use crate::pool::{ClientPool, PooledClient, RemoteClient};
use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireHeaders {
    pub destination: String,
    pub action: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireEvent {
    pub headers: WireHeaders,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireBatch {
    pub batch: Vec<WireEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Encode a batch as one request line, newline included.
pub(crate) fn encode_batch(events: &[LogEvent]) -> ShipperResult<Vec<u8>> {
    let request = WireBatch {
        batch: events
            .iter()
            .map(|e| WireEvent {
                headers: WireHeaders {
                    destination: e.destination().to_string(),
                    action: e.action().to_string(),
                },
                body: BASE64.encode(e.body()),
            })
            .collect(),
    };
    let mut line = serde_json::to_vec(&request)?;
    line.push(b'\n');
    Ok(line)
}

/// A single connection to a collector.
pub struct TcpClient {
    endpoint: String,
    stream: tokio::sync::Mutex<BufReader<TcpStream>>,
    request_timeout: Duration,
}

impl TcpClient {
    /// Connect to `endpoint`, giving up after `connect_timeout`.
    pub async fn connect(
        endpoint: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> ShipperResult<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| ShipperError::Timeout(connect_timeout.as_secs()))??;
        stream.set_nodelay(true)?;

        debug!(endpoint = %endpoint, "Connected to collector");
        Ok(Self {
            endpoint: endpoint.to_string(),
            stream: tokio::sync::Mutex::new(BufReader::new(stream)),
            request_timeout,
        })
    }

    async fn round_trip(&self, request: &[u8]) -> ShipperResult<WireReply> {
        let mut stream = self.stream.lock().await;
        stream.get_mut().write_all(request).await?;
        stream.get_mut().flush().await?;

        let mut line = String::new();
        let read = stream.read_line(&mut line).await?;
        if read == 0 {
            return Err(ShipperError::Send(format!(
                "collector {} closed the connection",
                self.endpoint
            )));
        }
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

#[async_trait]
impl RemoteClient for TcpClient {
    async fn append_batch(&self, events: &[LogEvent]) -> ShipperResult<()> {
        let request = encode_batch(events)?;
        let reply = tokio::time::timeout(self.request_timeout, self.round_trip(&request))
            .await
            .map_err(|_| ShipperError::Timeout(self.request_timeout.as_secs()))??;

        if reply.ok {
            Ok(())
        } else {
            Err(ShipperError::Send(
                reply.error.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Bounded pool of [`TcpClient`]s for one collector.
///
/// At most `max_clients` clients are checked out or idle at once. Healthy
/// clients are reused most-recently-released first; broken ones are dropped,
/// which closes their socket.
pub struct TcpClientPool {
    endpoint: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn RemoteClient>>>,
}

impl TcpClientPool {
    pub fn new(
        endpoint: impl Into<String>,
        max_clients: usize,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout,
            request_timeout,
            permits: Arc::new(Semaphore::new(max_clients)),
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Healthy clients waiting to be reused.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Clients that could still be checked out without waiting.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn checkout(&self) -> ShipperResult<PooledClient> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ShipperError::Acquire(e.to_string()))?;

        let reused = self.idle.lock().pop();
        let client: Box<dyn RemoteClient> = match reused {
            Some(client) => client,
            None => Box::new(
                TcpClient::connect(&self.endpoint, self.connect_timeout, self.request_timeout)
                    .await?,
            ),
        };
        Ok(PooledClient::with_permit(client, permit))
    }
}

#[async_trait]
impl ClientPool for TcpClientPool {
    async fn acquire(&self, timeout: Duration) -> ShipperResult<PooledClient> {
        tokio::time::timeout(timeout, self.checkout())
            .await
            .map_err(|_| ShipperError::AcquireTimeout(timeout))?
    }

    fn release(&self, client: PooledClient) {
        self.idle.lock().push(client.into_inner());
    }

    fn release_broken(&self, client: PooledClient) {
        warn!(endpoint = %self.endpoint, "Evicting broken collector client");
        drop(client);
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
