//! Wire layer below the broker client.
//!
//! A [`Transport`] opens [`Session`]s to a broker; a session publishes
//! envelopes to a topic and subscribes to a topic as a stream. A stream
//! that ends means the connection was lost, and the broker client takes
//! care of reconnecting.

mod memory;
#[cfg(feature = "nats")]
mod nats;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::{Envelope, ProviderConfig, Result};

pub use memory::InMemoryBroker;
#[cfg(feature = "nats")]
pub use nats::NatsTransport;

/// Inbound messages of one subscription, in broker delivery order.
pub type MessageStream = BoxStream<'static, Envelope>;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a session. Network and authentication failures are
    /// [`Error::Connection`](crate::Error::Connection).
    async fn connect(&self, provider: &ProviderConfig) -> Result<Arc<dyn Session>>;
}

#[async_trait]
pub trait Session: Send + Sync {
    /// Publish to a topic. A broker rejection is an error, never a silent drop.
    async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<()>;

    async fn subscribe(&self, topic: &str) -> Result<MessageStream>;

    async fn close(&self);
}
