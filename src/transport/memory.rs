use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tokio::{select, sync::broadcast};
use tokio_util::sync::CancellationToken;

use super::{MessageStream, Session, Transport};
use crate::{Envelope, Error, ProviderConfig, Result};

const TOPIC_CAPACITY: usize = 256;

/// An in-process topic broker.
///
/// Every session subscribed to a topic receives every message published to
/// it afterwards, including the publisher's own. Messages published to a
/// topic nobody listens to are recorded but not delivered, like a
/// non-durable topic.
///
/// Outages can be simulated: refuse a number of connects, go unavailable,
/// reject publishes, or drop every open connection.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, broadcast::Sender<Envelope>>,
    sessions: Vec<CancellationToken>,
    published: Vec<(String, Envelope)>,
    credentials: Option<(String, String)>,
    refuse_connects: u32,
    unavailable: bool,
    reject_publishes: bool,
    connect_attempts: u32,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require these credentials on connect.
    pub fn with_credentials(self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.state().credentials = Some((user.into(), password.into()));
        self
    }

    /// Fail the next `count` connection attempts.
    pub fn refuse_connections(&self, count: u32) {
        self.state().refuse_connects = count;
    }

    pub fn set_available(&self, available: bool) {
        self.state().unavailable = !available;
    }

    pub fn reject_publishes(&self, reject: bool) {
        self.state().reject_publishes = reject;
    }

    /// Close every open session, ending their subscription streams.
    pub fn drop_connections(&self) {
        let sessions = std::mem::take(&mut self.state().sessions);
        for token in sessions {
            token.cancel();
        }
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state().connect_attempts
    }

    pub fn open_sessions(&self) -> usize {
        self.state()
            .sessions
            .iter()
            .filter(|t| !t.is_cancelled())
            .count()
    }

    /// Every envelope published to `topic`, in publish order.
    pub fn published(&self, topic: &str) -> Vec<Envelope> {
        self.state()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state()
            .topics
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Transport for InMemoryBroker {
    async fn connect(&self, provider: &ProviderConfig) -> Result<Arc<dyn Session>> {
        let mut state = self.state();
        state.connect_attempts += 1;
        if state.unavailable {
            return Err(Error::connection(format!(
                "broker {} is unavailable",
                provider.broker
            )));
        }
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(Error::connection(format!(
                "connection to {} refused",
                provider.broker
            )));
        }
        if let Some((user, password)) = &state.credentials {
            let user_ok = provider.user.as_deref() == Some(user.as_str());
            let password_ok = provider
                .password
                .as_ref()
                .is_some_and(|p| p.expose() == password);
            if !(user_ok && password_ok) {
                return Err(Error::connection(format!(
                    "authentication to {} failed",
                    provider.broker
                )));
            }
        }

        let token = CancellationToken::new();
        state.sessions.retain(|t| !t.is_cancelled());
        state.sessions.push(token.clone());
        Ok(Arc::new(MemorySession {
            broker: self.clone(),
            token,
        }))
    }
}

struct MemorySession {
    broker: InMemoryBroker,
    token: CancellationToken,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(Error::connection("session is closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.broker.state();
        if state.reject_publishes {
            return Err(Error::publish("memory", "message rejected by broker"));
        }
        state.published.push((topic.to_string(), envelope.clone()));
        if let Some(sender) = state.topics.get(topic) {
            // no receivers is fine: nobody is listening right now
            let _ = sender.send(envelope.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        self.ensure_open()?;
        let receiver = self
            .broker
            .state()
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe();

        let stream = stream::unfold(
            (receiver, self.token.clone()),
            |(mut receiver, token)| async move {
                loop {
                    select! {
                        _ = token.cancelled() => return None,
                        msg = receiver.recv() => match msg {
                            Ok(envelope) => return Some((envelope, (receiver, token))),
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "In-memory subscriber lagged, messages lost");
                            }
                            Err(broadcast::error::RecvError::Closed) => return None,
                        }
                    }
                }
            },
        );
        Ok(stream.boxed())
    }

    async fn close(&self) {
        self.token.cancel();
    }
}
