use std::sync::Arc;

use async_nats::{ConnectOptions, HeaderMap};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;

use super::{MessageStream, Session, Transport};
use crate::{Envelope, Error, MessageType, Meta, Properties, ProviderConfig, Result};

const TYPE_HEADER: &str = "CI-Message-Type";
const ID_HEADER: &str = "CI-Message-Id";
const TIMESTAMP_HEADER: &str = "CI-Message-Timestamp";
const ORIGIN_HEADER: &str = "CI-Message-Origin";

/// NATS transport.
///
/// Properties travel as message headers, the content as the payload, and
/// the message type, id, timestamp and origin as dedicated `CI-Message-*`
/// headers. The provider topic is the NATS subject.
#[derive(Debug, Clone, Copy, Default)]
pub struct NatsTransport;

#[async_trait]
impl Transport for NatsTransport {
    async fn connect(&self, provider: &ProviderConfig) -> Result<Arc<dyn Session>> {
        let options = match (&provider.user, &provider.password) {
            (Some(user), Some(password)) => {
                ConnectOptions::with_user_and_password(user.clone(), password.expose().to_string())
            }
            _ => ConnectOptions::new(),
        };
        let client = options
            .connect(provider.broker.as_str())
            .await
            .map_err(Error::connection)?;
        Ok(Arc::new(NatsSession { client }))
    }
}

struct NatsSession {
    client: async_nats::Client,
}

#[async_trait]
impl Session for NatsSession {
    async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<()> {
        let payload = Bytes::from(envelope.content().to_string());
        self.client
            .publish_with_headers(topic.to_string(), encode_headers(envelope), payload)
            .await
            .map_err(|e| Error::publish("nats", e))?;
        self.client
            .flush()
            .await
            .map_err(|e| Error::publish("nats", e))
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        let subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(Error::connection)?;
        let stream = subscriber.filter_map(|message| async move {
            let decoded = decode(message.headers.as_ref(), &message.payload);
            if decoded.is_none() {
                tracing::warn!(subject = %message.subject, "Skipping message without CI headers");
            }
            decoded
        });
        Ok(stream.boxed())
    }

    async fn close(&self) {
        if let Err(e) = self.client.drain().await {
            tracing::warn!(error = %e, "Failed to drain NATS connection");
        }
    }
}

fn encode_headers(envelope: &Envelope) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in envelope.properties() {
        headers.insert(key.as_str(), value.as_str());
    }
    let meta = envelope.meta();
    headers.insert(TYPE_HEADER, envelope.message_type().to_string().as_str());
    headers.insert(ID_HEADER, meta.id().to_string().as_str());
    headers.insert(TIMESTAMP_HEADER, meta.timestamp().to_string().as_str());
    headers.insert(ORIGIN_HEADER, meta.origin());
    headers
}

fn decode(headers: Option<&HeaderMap>, payload: &Bytes) -> Option<Envelope> {
    let headers = headers?;
    let header = |name: &str| headers.get(name).map(|v| v.as_str().to_string());

    let message_type: MessageType = header(TYPE_HEADER)?.parse().ok()?;
    let id = header(ID_HEADER).and_then(|v| v.parse().ok()).unwrap_or_default();
    let timestamp = header(TIMESTAMP_HEADER)
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();
    let origin = header(ORIGIN_HEADER).unwrap_or_default();

    let properties: Properties = headers
        .iter()
        .map(|(name, values)| (name.to_string(), values))
        .filter(|(name, _)| !name.starts_with("CI-Message-"))
        .filter_map(|(name, values)| values.first().map(|v| (name, v.as_str().to_string())))
        .collect();

    let content = String::from_utf8_lossy(payload).into_owned();
    Some(Envelope::from_parts(
        Meta::from_parts(id, timestamp, origin.into()),
        message_type,
        content,
        properties,
    ))
}
