use std::sync::{Arc, RwLock};

use futures_util::StreamExt;
use tokio::{select, sync::watch, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    Config, ConnectionState, Envelope, Error, ProviderConfig, Result,
    transport::{MessageStream, Session, Transport},
};

/// Connection to one provider's broker.
///
/// - `connect()` makes a single attempt; `connect_with_retry()` polls up to
///   [`Config::connect_attempts`] times, [`Config::retry_interval`] apart.
/// - `publish(envelope)` sends to the provider topic and propagates rejections.
/// - `subscribe(callback)` invokes the callback once per inbound message, in
///   broker order, and transparently reconnects when the connection drops.
///   Messages sent while disconnected are lost.
/// - `disconnect()` is final: it stops reconnect loops and closes the session.
pub struct BrokerClient {
    name: Arc<str>,
    provider: ProviderConfig,
    transport: Arc<dyn Transport>,
    config: Arc<Config>,
    state: watch::Sender<ConnectionState>,
    session: RwLock<Option<Arc<dyn Session>>>,
    cancel_token: CancellationToken,
}

impl BrokerClient {
    pub fn new(provider: ProviderConfig, transport: Arc<dyn Transport>, config: Arc<Config>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            name: Arc::from(provider.name.as_str()),
            provider,
            transport,
            config,
            state,
            session: RwLock::new(None),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Single connection attempt.
    pub async fn connect(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        match self.transport.connect(&self.provider).await {
            Ok(session) if self.cancel_token.is_cancelled() => {
                // disconnected while the attempt was in flight
                session.close().await;
                self.set_state(ConnectionState::Disconnected);
                Err(Error::Cancelled)
            }
            Ok(session) => {
                self.replace_session(Some(session));
                self.set_state(ConnectionState::Connected);
                tracing::info!(provider = %self.name, broker = %self.provider.broker, "Connected");
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Connect, retrying retryable failures up to the configured ceiling.
    pub async fn connect_with_retry(&self) -> Result<()> {
        let attempts = self.config.connect_attempts.max(1);
        for attempt in 1..=attempts {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    tracing::debug!(provider = %self.name, attempt, error = %e, "Connection attempt failed");
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    self.set_state(ConnectionState::Failed);
                    return Err(e);
                }
            }
            if attempt < attempts {
                select! {
                    _ = self.cancel_token.cancelled() => return Err(Error::Cancelled),
                    _ = sleep(self.config.retry_interval) => {}
                }
            }
        }
        self.set_state(ConnectionState::Failed);
        tracing::error!(provider = %self.name, attempts, "Could not connect");
        Err(Error::ConnectRetriesExhausted {
            provider: self.name.clone(),
            attempts,
        })
    }

    /// Open and close a fresh session, leaving the client's own session alone.
    pub async fn test_connection(&self) -> Result<String> {
        let session = self.transport.connect(&self.provider).await?;
        session.close().await;
        Ok(format!("Successfully connected to {}", self.provider.broker))
    }

    pub async fn publish(&self, envelope: &Envelope) -> Result<()> {
        let session = self
            .session()
            .ok_or_else(|| Error::publish(&self.name, "not connected"))?;
        session
            .publish(&self.provider.topic, envelope)
            .await
            .map_err(|e| self.publish_error(e))?;
        tracing::debug!(
            provider = %self.name,
            topic = %self.provider.topic,
            message_type = %envelope.message_type(),
            id = envelope.meta().id(),
            "Published"
        );
        Ok(())
    }

    /// Subscribe to the provider topic.
    ///
    /// Connects first if needed. Returns once the subscription is live; the
    /// returned task delivers messages until [`disconnect`](Self::disconnect).
    pub async fn subscribe<F, Fut>(self: &Arc<Self>, on_message: F) -> Result<JoinHandle<()>>
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        if self.session().is_none() {
            self.connect_with_retry().await?;
        }
        let stream = self.open_stream().await?;
        let client = self.clone();
        Ok(tokio::spawn(async move {
            client.pump(stream, on_message).await;
        }))
    }

    pub async fn disconnect(&self) {
        self.cancel_token.cancel();
        if let Some(session) = self.replace_session(None) {
            session.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn pump<F, Fut>(&self, first: MessageStream, on_message: F)
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut next_stream = Some(first);
        while let Some(mut stream) = next_stream.take() {
            loop {
                select! {
                    _ = self.cancel_token.cancelled() => return,
                    next = stream.next() => match next {
                        // the next message is not read until this one is handed over
                        Some(envelope) => select! {
                            _ = self.cancel_token.cancelled() => return,
                            _ = on_message(envelope) => {}
                        },
                        None => break,
                    }
                }
            }
            drop(stream);

            tracing::warn!(provider = %self.name, "Connection lost, reconnecting");
            self.replace_session(None);
            self.set_state(ConnectionState::Disconnected);
            next_stream = self.resubscribe().await;
        }
    }

    /// Reconnect until it works or the client is disconnected. Registrations
    /// fed by this subscription stay armed meanwhile.
    async fn resubscribe(&self) -> Option<MessageStream> {
        loop {
            match self.connect_with_retry().await {
                Ok(()) => match self.open_stream().await {
                    Ok(stream) => {
                        tracing::info!(provider = %self.name, topic = %self.provider.topic, "Resubscribed");
                        return Some(stream);
                    }
                    Err(e) => {
                        tracing::warn!(provider = %self.name, error = %e, "Resubscribe failed");
                    }
                },
                Err(Error::Cancelled) => return None,
                Err(e) => {
                    tracing::error!(provider = %self.name, error = %e, "Reconnect failed, still retrying");
                }
            }
            select! {
                _ = self.cancel_token.cancelled() => return None,
                _ = sleep(self.config.retry_interval) => {}
            }
        }
    }

    async fn open_stream(&self) -> Result<MessageStream> {
        let session = self
            .session()
            .ok_or_else(|| Error::connection("not connected"))?;
        session.subscribe(&self.provider.topic).await
    }

    fn publish_error(&self, error: Error) -> Error {
        match error {
            Error::Publish { reason, .. } => Error::Publish {
                provider: self.name.clone(),
                reason,
            },
            other => Error::publish(&self.name, other),
        }
    }

    fn session(&self) -> Option<Arc<dyn Session>> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn replace_session(&self, session: Option<Arc<dyn Session>>) -> Option<Arc<dyn Session>> {
        let mut guard = self.session.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, session)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}
