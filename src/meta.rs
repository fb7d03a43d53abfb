use std::{sync::Arc, time::SystemTime};

use uuid::Uuid;

use crate::MessageId;

/// Metadata attached to every envelope.
///
/// - `id`: unique identifier for the message.
/// - `timestamp`: creation time in nanoseconds since Unix epoch (truncated to `u64`).
/// - `origin`: name of the job or component that emitted the message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Meta {
    id: MessageId,
    timestamp: u64,
    origin: Arc<str>,
}

impl Meta {
    pub fn new(origin: Arc<str>) -> Self {
        Self {
            id: Uuid::new_v4().as_u128(),
            timestamp: now_nanos(),
            origin,
        }
    }

    /// Rebuild metadata received over the wire.
    pub fn from_parts(id: MessageId, timestamp: u64, origin: Arc<str>) -> Self {
        Self {
            id,
            timestamp,
            origin,
        }
    }

    /// Unique identifier for this message.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Timestamp in nanoseconds since Unix epoch (u64 truncation).
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
