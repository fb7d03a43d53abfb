use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    BrokerClient, Config, Error, EventRouter, JobLauncher, ProviderConfig, Publisher, Result,
    Settings, TriggerCoordinator, WaitCoordinator, transport::Transport,
};

/// Owns the messaging runtime: broker clients, the event router and the
/// tasks that connect them.
///
/// - Register providers with `add_provider(..)` (or build from [`Settings`]).
/// - `start()` spawns the router, connects every provider with bounded
///   retry and feeds each provider's topic into the router.
/// - Hand out [`Publisher`]s, [`WaitCoordinator`]s and armed
///   [`TriggerCoordinator`]s to jobs.
/// - `stop()` disconnects every client, stops the router and awaits its tasks.
pub struct Hub {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    router: Arc<EventRouter>,
    clients: Vec<Arc<BrokerClient>>,
    router_task: Option<JoinHandle<Result<()>>>,
    subscriptions: Vec<JoinHandle<()>>,
}

impl Hub {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        let config = Arc::new(config);
        Self {
            router: Arc::new(EventRouter::new(config.clone())),
            config,
            transport,
            clients: Vec::new(),
            router_task: None,
            subscriptions: Vec::new(),
        }
    }

    /// Build a hub with the runtime knobs and providers of `settings`.
    pub fn from_settings(settings: &Settings, transport: Arc<dyn Transport>) -> Result<Self> {
        let mut hub = Self::new(settings.config(), transport);
        for provider in &settings.providers {
            hub.add_provider(provider.clone())?;
        }
        Ok(hub)
    }

    pub fn add_provider(&mut self, provider: ProviderConfig) -> Result<()> {
        if self.is_started() {
            return Err(Error::AlreadyStarted);
        }
        provider.validate()?;
        if self.client(&provider.name).is_some() {
            return Err(Error::config(format!(
                "duplicate provider name '{}'",
                provider.name
            )));
        }
        tracing::debug!(
            provider = %provider.name,
            broker = %provider.broker,
            topic = %provider.topic,
            "Provider added"
        );
        self.clients.push(Arc::new(BrokerClient::new(
            provider,
            self.transport.clone(),
            self.config.clone(),
        )));
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.router_task.is_some()
    }

    /// Start routing and connect every provider.
    ///
    /// Returns once every subscription is live. A provider that cannot be
    /// reached within the retry ceiling fails the start; call
    /// [`stop`](Self::stop) to release what was already started.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_started() {
            return Err(Error::AlreadyStarted);
        }
        let router = self.router.clone();
        self.router_task = Some(tokio::spawn(async move { router.run().await }));

        for client in &self.clients {
            let sender = self.router.sender();
            let provider: Arc<str> = Arc::from(client.name());
            let subscription = client
                .subscribe(move |envelope| {
                    let sender = sender.clone();
                    let provider = provider.clone();
                    async move {
                        if !sender.deliver(&provider, envelope).await {
                            tracing::warn!(
                                provider = %provider,
                                "Router is gone, dropping inbound message"
                            );
                        }
                    }
                })
                .await?;
            self.subscriptions.push(subscription);
        }
        tracing::info!(providers = self.clients.len(), "Hub started");
        Ok(())
    }

    /// Disconnect every provider, stop the router and await all tasks.
    pub async fn stop(&mut self) -> Result<()> {
        for client in &self.clients {
            client.disconnect().await;
        }
        while let Some(subscription) = self.subscriptions.pop() {
            subscription.await?;
        }
        self.router.stop();
        if let Some(task) = self.router_task.take() {
            task.await??;
        }
        tracing::info!("Hub stopped");
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn client(&self, name: &str) -> Option<&Arc<BrokerClient>> {
        self.clients.iter().find(|client| client.name() == name)
    }

    pub fn clients(&self) -> &[Arc<BrokerClient>] {
        &self.clients
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.clients.iter().cloned())
    }

    pub fn waiter(&self) -> WaitCoordinator {
        WaitCoordinator::new(
            self.router.clone(),
            self.clients.iter().map(|client| client.name()),
        )
    }

    /// Create a trigger for `job` and arm it.
    pub fn trigger(
        &self,
        job: &str,
        provider: &str,
        selector: &str,
        launcher: Arc<dyn JobLauncher>,
    ) -> Result<TriggerCoordinator> {
        if self.client(provider).is_none() {
            return Err(Error::UnknownProvider(Arc::from(provider)));
        }
        let mut trigger = TriggerCoordinator::new(job, provider, selector, launcher)?;
        trigger.arm(&self.router);
        Ok(trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBroker;

    fn hub() -> Hub {
        Hub::new(Config::default(), Arc::new(InMemoryBroker::new()))
    }

    #[test]
    fn test_duplicate_provider_is_rejected() {
        let mut hub = hub();
        hub.add_provider(ProviderConfig::new("test", "memory://a", "CI")).unwrap();
        let err = hub
            .add_provider(ProviderConfig::new("test", "memory://b", "CI"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(hub.clients().len(), 1);
    }

    #[test]
    fn test_from_settings_registers_providers() {
        let settings = Settings::from_toml_str(
            r#"
            [runtime]
            connect_attempts = 3

            [[providers]]
            name = "a"
            broker = "memory://a"
            topic = "CI"

            [[providers]]
            name = "b"
            broker = "memory://b"
            topic = "CI"
            "#,
        )
        .unwrap();
        let hub = Hub::from_settings(&settings, Arc::new(InMemoryBroker::new())).unwrap();
        assert!(hub.client("a").is_some());
        assert!(hub.client("b").is_some());
        assert_eq!(hub.config().connect_attempts, 3);
        assert!(hub.waiter().knows("b"));
    }

    #[tokio::test]
    async fn test_start_twice_and_late_provider_fail() {
        let mut hub = hub();
        hub.add_provider(ProviderConfig::new("test", "memory://a", "CI")).unwrap();
        hub.start().await.unwrap();

        assert!(matches!(hub.start().await, Err(Error::AlreadyStarted)));
        assert!(matches!(
            hub.add_provider(ProviderConfig::new("late", "memory://b", "CI")),
            Err(Error::AlreadyStarted)
        ));
        hub.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_for_unknown_provider_is_rejected() {
        struct Noop;

        #[async_trait::async_trait]
        impl JobLauncher for Noop {
            async fn launch(&self, _request: crate::RunRequest) -> Result<()> {
                Ok(())
            }
        }

        let hub = hub();
        let result = hub.trigger("job", "missing", "", Arc::new(Noop));
        assert!(matches!(result, Err(Error::UnknownProvider(_))));
        assert!(hub.router().is_empty());
    }
}
