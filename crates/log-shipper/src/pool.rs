//! Contracts between the pipeline and the remote client pool.
//!
//! The pipeline never builds or tears down connections itself. It borrows a
//! [`PooledClient`] from a [`ClientPool`], makes exactly one delivery attempt
//! with it and hands it back, healthy or broken. Both release paths take the
//! client by value, so a client cannot outlive its attempt.

use crate::error::ShipperResult;
use crate::event::LogEvent;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;

/// A connection to one remote collector.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Deliver a batch of events as a single call.
    async fn append_batch(&self, events: &[LogEvent]) -> ShipperResult<()>;

    /// `host:port` of the collector this client talks to.
    fn endpoint(&self) -> &str;
}

/// A client checked out of a pool.
///
/// Dropping it without a release is equivalent to a broken release: the
/// permit (if any) goes back and the connection is closed.
pub struct PooledClient {
    client: Box<dyn RemoteClient>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl PooledClient {
    /// Wrap a client that is not tied to a capacity permit.
    pub fn new(client: Box<dyn RemoteClient>) -> Self {
        Self {
            client,
            _permit: None,
        }
    }

    /// Wrap a client that holds one unit of pool capacity.
    pub fn with_permit(client: Box<dyn RemoteClient>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            client,
            _permit: Some(permit),
        }
    }

    /// Borrow the underlying client.
    pub fn client(&self) -> &dyn RemoteClient {
        self.client.as_ref()
    }

    /// Give up the pool permit and return the bare client.
    pub fn into_inner(self) -> Box<dyn RemoteClient> {
        self.client
    }
}

impl std::fmt::Debug for PooledClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledClient")
            .field("endpoint", &self.client.endpoint())
            .field("permit", &self._permit.is_some())
            .finish()
    }
}

/// A pool of clients for one collector endpoint.
#[async_trait]
pub trait ClientPool: Send + Sync {
    /// Check out a client, waiting at most `timeout`.
    async fn acquire(&self, timeout: Duration) -> ShipperResult<PooledClient>;

    /// Return a client that completed its attempt successfully.
    fn release(&self, client: PooledClient);

    /// Evict a client whose attempt failed; it is never handed out again.
    fn release_broken(&self, client: PooledClient);

    /// `host:port` this pool connects to.
    fn endpoint(&self) -> &str;
}
