use std::sync::Arc;

use crate::{MessageType, Meta, Properties};

/// Property every envelope carries with the wire value of its message type.
pub const CI_TYPE: &str = "CI_TYPE";

/// A CI event message: type, free-text content and a property bag.
///
/// The `CI_TYPE` property always equals `message_type.ci_type()`; a
/// caller-supplied `CI_TYPE` is replaced. Envelopes are immutable once
/// built and are shared as `Arc<Envelope>` after publishing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    meta: Meta,
    message_type: MessageType,
    content: Arc<str>,
    properties: Properties,
}

impl Envelope {
    /// Create a new envelope tagging it with the given origin name.
    pub fn new<N, C>(message_type: MessageType, content: C, properties: Properties, origin: N) -> Self
    where
        N: Into<Arc<str>>,
        C: Into<Arc<str>>,
    {
        Self::from_parts(Meta::new(origin.into()), message_type, content, properties)
    }

    /// Assemble an envelope from metadata received over the wire.
    pub fn from_parts<C>(
        meta: Meta,
        message_type: MessageType,
        content: C,
        mut properties: Properties,
    ) -> Self
    where
        C: Into<Arc<str>>,
    {
        properties.insert(CI_TYPE.to_string(), message_type.ci_type().to_string());
        Self {
            meta,
            message_type,
            content: content.into(),
            properties,
        }
    }

    pub fn builder(message_type: MessageType) -> EnvelopeBuilder {
        EnvelopeBuilder {
            message_type,
            content: Arc::from(""),
            properties: Properties::new(),
            origin: Arc::from("cibus"),
        }
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

pub struct EnvelopeBuilder {
    message_type: MessageType,
    content: Arc<str>,
    properties: Properties,
    origin: Arc<str>,
}

impl EnvelopeBuilder {
    pub fn content(mut self, content: impl Into<Arc<str>>) -> Self {
        self.content = content.into();
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn origin(mut self, origin: impl Into<Arc<str>>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn build(self) -> Envelope {
        Envelope::new(
            self.message_type,
            self.content,
            self.properties,
            self.origin,
        )
    }
}
