//! Cibus: CI event messaging for job hosts
//!
//! Jobs publish typed CI messages to a broker; other jobs are triggered by,
//! subscribe to, or wait for messages matching a selector expression such
//! as `CI_TYPE = 'code-quality-checks-done' and CI_STATUS = 'failed'`.
//!
//! A [`Hub`] owns the broker clients and the [`EventRouter`]; jobs get a
//! [`Publisher`], a [`WaitCoordinator`] or an armed [`TriggerCoordinator`]
//! from it. The host starts runs through its [`JobLauncher`].

extern crate self as cibus;

mod client;
mod config;
mod connection_state;
mod credentials;
mod envelope;
mod error;
mod hub;
mod internal;
mod job;
mod label;
mod message_type;
mod meta;
mod overflow_policy;
mod properties;
mod publish;
mod registration;
mod router;
mod subscribe;
mod trigger;
mod wait;

pub mod selector;
pub mod transport;

pub use client::BrokerClient;
pub use config::{Config, ProviderConfig, RuntimeSettings, Settings};
pub use connection_state::ConnectionState;
pub use credentials::Secret;
pub use envelope::{CI_TYPE, Envelope, EnvelopeBuilder};
pub use error::Error;
pub use hub::Hub;
pub use job::{BuildEnvironment, CI_MESSAGE, JobLauncher, RunRequest};
pub use label::Label;
pub use message_type::MessageType;
pub use meta::Meta;
pub use overflow_policy::OverflowPolicy;
pub use properties::{Properties, parse_properties};
pub use publish::{PublishStep, Publisher};
pub use registration::{RegistrationHandle, RegistrationId, RegistrationKind};
pub use router::{EventRouter, RouterSender};
pub use selector::{Selector, SelectorError};
pub use subscribe::SubscribeStep;
pub use transport::InMemoryBroker;
pub use trigger::{TriggerCoordinator, TriggerState};
pub use wait::{WaitCoordinator, WaitRequest};

pub use cibus_macros::Label;

pub type Result<T = ()> = std::result::Result<T, Error>;

/// Unique message id (UUID v4 as an integer).
pub type MessageId = u128;

pub mod prelude {
    pub use crate::error::Error as CibusError;
    pub use crate::{
        Envelope, Hub, JobLauncher, MessageType, Publisher, RunRequest, Selector, SubscribeStep,
        TriggerCoordinator, WaitCoordinator, WaitRequest,
    };
}
