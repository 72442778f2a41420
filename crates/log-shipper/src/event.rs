//! Log events and the batches they travel in.

/// A single log event.
///
/// Immutable once built; owned by whichever queue currently holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    destination: String,
    action: String,
    body: Vec<u8>,
}

impl LogEvent {
    /// Create a new event.
    pub fn new(
        destination: impl Into<String>,
        action: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            destination: destination.into(),
            action: action.into(),
            body: body.into(),
        }
    }

    /// Destination tag (the producing business).
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Action tag.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Opaque body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// A batch of events sent to a collector as one unit.
///
/// Never split or merged after the assembler emits it.
#[derive(Debug, Clone)]
pub struct EventBatch {
    /// Unique batch ID, used for log correlation.
    pub batch_id: String,
    /// Events in arrival order.
    pub events: Vec<LogEvent>,
}

impl EventBatch {
    /// Wrap assembled events in a batch with a fresh ID.
    pub fn new(events: Vec<LogEvent>) -> Self {
        Self {
            batch_id: uuid::Uuid::new_v4().to_string(),
            events,
        }
    }

    /// Number of events in the batch.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if the batch holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
