use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::{select, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{Envelope, Error, EventRouter, RegistrationKind, Result, Selector};

/// What to wait for: a provider, an optional selector and an optional timeout.
///
/// No selector matches every message; no timeout waits until cancelled.
#[derive(Debug, Clone)]
pub struct WaitRequest {
    provider: Arc<str>,
    selector: Selector,
    timeout: Option<Duration>,
}

impl WaitRequest {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: Arc::from(provider),
            selector: Selector::all(),
            timeout: None,
        }
    }

    /// Compile and set the selector. Blank text matches everything.
    pub fn with_selector(mut self, selector: &str) -> Result<Self> {
        self.selector = Selector::compile(selector)?;
        Ok(self)
    }

    pub fn with_compiled_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Blocks a build until a matching message arrives.
///
/// Every wait owns a one-shot registration for its whole lifetime; it is
/// released on every exit path, whether the wait resolved, timed out, was
/// cancelled or its future was dropped.
#[derive(Clone)]
pub struct WaitCoordinator {
    router: Arc<EventRouter>,
    providers: Arc<HashSet<Arc<str>>>,
}

impl WaitCoordinator {
    pub fn new<I, S>(router: Arc<EventRouter>, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            router,
            providers: Arc::new(providers.into_iter().map(|p| Arc::from(p.as_ref())).collect()),
        }
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn knows(&self, provider: &str) -> bool {
        self.providers.contains(provider)
    }

    /// Wait for the first matching message and return its content.
    pub async fn wait_for_message(
        &self,
        request: &WaitRequest,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let envelope = self.wait_for_envelope(request, cancel).await?;
        Ok(envelope.content().to_string())
    }

    /// Wait for the first matching message.
    pub async fn wait_for_envelope(
        &self,
        request: &WaitRequest,
        cancel: &CancellationToken,
    ) -> Result<Arc<Envelope>> {
        self.await_match(request, RegistrationKind::Wait, cancel).await
    }

    pub(crate) async fn await_match(
        &self,
        request: &WaitRequest,
        kind: RegistrationKind,
        cancel: &CancellationToken,
    ) -> Result<Arc<Envelope>> {
        if !self.knows(&request.provider) {
            return Err(Error::UnknownProvider(request.provider.clone()));
        }

        // registered before returning control, so nothing published after
        // this point can be missed
        let (_handle, receiver) =
            self.router
                .register_once(&request.provider, request.selector.clone(), kind);
        tracing::info!(
            provider = %request.provider,
            selector = %request.selector,
            timeout = ?request.timeout,
            "Waiting for message"
        );

        let deadline = async {
            match request.timeout {
                Some(timeout) => sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        select! {
            received = receiver => match received {
                Ok(envelope) => {
                    tracing::info!(
                        provider = %request.provider,
                        id = envelope.meta().id(),
                        "Received matching message"
                    );
                    Ok(envelope)
                }
                Err(_) => Err(Error::RouterClosed),
            },
            _ = deadline => {
                let timeout = request.timeout.unwrap_or_default();
                tracing::warn!(provider = %request.provider, ?timeout, "Timed out waiting for message");
                Err(Error::WaitTimeout(timeout))
            }
            _ = cancel.cancelled() => {
                tracing::info!(provider = %request.provider, "Wait cancelled");
                Err(Error::Cancelled)
            }
        }
    }
}
