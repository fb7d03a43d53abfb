use std::{collections::HashMap, sync::Arc};

use crate::{
    BrokerClient, Envelope, Error, MessageType, Properties, Result, properties::parse_properties,
};

const DEFAULT_ORIGIN: &str = "cibus";

/// Sends CI messages through the configured providers.
#[derive(Clone)]
pub struct Publisher {
    clients: Arc<HashMap<Arc<str>, Arc<BrokerClient>>>,
    origin: Arc<str>,
}

impl Publisher {
    pub fn new<I>(clients: I) -> Self
    where
        I: IntoIterator<Item = Arc<BrokerClient>>,
    {
        let clients = clients
            .into_iter()
            .map(|client| (Arc::from(client.name()), client))
            .collect();
        Self {
            clients: Arc::new(clients),
            origin: Arc::from(DEFAULT_ORIGIN),
        }
    }

    /// Name stamped into the metadata of every sent envelope, usually the job.
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = Arc::from(origin);
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Build an envelope and publish it via `provider`.
    ///
    /// `CI_TYPE` is always set from `message_type`. Fails with
    /// [`Error::Publish`] when the provider is unknown or the broker rejects
    /// the message.
    pub async fn send(
        &self,
        provider: &str,
        message_type: MessageType,
        content: &str,
        properties: Properties,
    ) -> Result<Arc<Envelope>> {
        let client = self
            .clients
            .get(provider)
            .ok_or_else(|| Error::publish(provider, "no messaging provider with that name"))?;

        let envelope = Envelope::new(message_type, content, properties, self.origin.clone());
        client.publish(&envelope).await?;
        tracing::info!(
            provider,
            message_type = %message_type,
            id = envelope.meta().id(),
            origin = %self.origin,
            "Sent message"
        );
        Ok(Arc::new(envelope))
    }
}

/// A send step as a job stores it: the properties are kept as text and
/// parsed when the step runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishStep {
    pub provider: String,
    pub message_type: MessageType,
    pub content: String,
    pub properties: String,
}

impl PublishStep {
    pub fn new(provider: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            provider: provider.into(),
            message_type,
            content: String::new(),
            properties: String::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_properties(mut self, properties: impl Into<String>) -> Self {
        self.properties = properties.into();
        self
    }

    pub async fn send(&self, publisher: &Publisher) -> Result<Arc<Envelope>> {
        let properties = parse_properties(&self.properties)?;
        publisher
            .send(&self.provider, self.message_type, &self.content, properties)
            .await
    }
}
