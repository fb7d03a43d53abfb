use std::sync::{Arc, Mutex};

use tokio::{
    select,
    sync::{
        Mutex as AsyncMutex,
        mpsc::{self, Receiver, Sender, error::TrySendError},
        oneshot,
    },
};
use tokio_util::sync::CancellationToken;

use crate::{
    Config, Envelope, OverflowPolicy, RegistrationHandle, RegistrationId, RegistrationKind,
    Result, Selector,
    internal::{Registration, Registry, Target},
};

#[derive(Debug)]
struct Inbound {
    provider: Arc<str>,
    envelope: Arc<Envelope>,
}

/// Process-wide dispatcher between broker clients and registrations.
///
/// - Broker clients push inbound envelopes through a [`RouterSender`],
///   waiting for capacity when the router falls behind.
/// - `run()` processes them one by one in arrival order: it snapshots the
///   registry, evaluates every selector outside the lock, and delivers to
///   each match.
/// - One-shot registrations (wait, subscribe) are removed by the dispatch
///   that satisfies them, so the first matching envelope wins.
/// - Trigger registrations get every match through a bounded queue; a full
///   queue is handled according to the configured [`OverflowPolicy`].
///
/// The router is an owned component: create it with the hub, share it as
/// `Arc<EventRouter>`, and stop it with the hub.
pub struct EventRouter {
    registry: Arc<Registry>,
    sender: Sender<Inbound>,
    receiver: AsyncMutex<Receiver<Inbound>>,
    config: Arc<Config>,
    cancel_token: CancellationToken,
}

impl EventRouter {
    pub fn new(config: Arc<Config>) -> Self {
        let (sender, receiver) = mpsc::channel(config.channel_size.max(1));
        Self {
            registry: Arc::new(Registry::default()),
            sender,
            receiver: AsyncMutex::new(receiver),
            config,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Register a trigger: every matching envelope from `provider` is queued
    /// on the returned receiver.
    pub fn register_trigger(
        &self,
        provider: &str,
        selector: Selector,
    ) -> (RegistrationHandle, Receiver<Arc<Envelope>>) {
        let (tx, rx) = mpsc::channel(self.config.trigger_queue_size.max(1));
        let handle = self.insert(provider, selector, RegistrationKind::Trigger, Target::Stream(tx));
        (handle, rx)
    }

    /// Register a one-shot consumer (wait or subscribe): the first matching
    /// envelope from `provider` resolves the returned receiver.
    pub fn register_once(
        &self,
        provider: &str,
        selector: Selector,
        kind: RegistrationKind,
    ) -> (RegistrationHandle, oneshot::Receiver<Arc<Envelope>>) {
        debug_assert!(kind.is_one_shot(), "{kind} registrations are not one-shot");
        let (tx, rx) = oneshot::channel();
        let handle = self.insert(provider, selector, kind, Target::Once(Mutex::new(Some(tx))));
        (handle, rx)
    }

    fn insert(
        &self,
        provider: &str,
        selector: Selector,
        kind: RegistrationKind,
        target: Target,
    ) -> RegistrationHandle {
        let id = self.registry.next_id();
        tracing::debug!(id, %kind, provider, %selector, "Registered");
        self.registry.insert(Registration {
            id,
            provider: Arc::from(provider),
            selector,
            kind,
            target,
        });
        RegistrationHandle::new(id, kind, &self.registry)
    }

    /// Remove a registration by id. Returns false if it was already gone.
    pub fn unregister(&self, id: RegistrationId) -> bool {
        self.registry.remove(id).is_some()
    }

    pub fn contains(&self, id: RegistrationId) -> bool {
        self.registry.contains(id)
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle for broker callbacks to feed inbound envelopes.
    pub fn sender(&self) -> RouterSender {
        RouterSender {
            sender: self.sender.clone(),
        }
    }

    /// Deliver one envelope to every matching registration.
    /// Returns the number of registrations it was delivered to.
    pub async fn dispatch(&self, provider: &str, envelope: &Arc<Envelope>) -> usize {
        let mut delivered = 0;
        for registration in self.registry.snapshot() {
            if !registration.accepts(provider, envelope) {
                continue;
            }
            if self.deliver_to(&registration, envelope).await {
                delivered += 1;
            }
        }
        tracing::debug!(
            provider,
            id = envelope.meta().id(),
            message_type = %envelope.message_type(),
            delivered,
            "Dispatched"
        );
        delivered
    }

    async fn deliver_to(&self, registration: &Registration, envelope: &Arc<Envelope>) -> bool {
        match &registration.target {
            Target::Once(_) => {
                // a concurrent dispatch may have claimed it after our snapshot
                let Some(tx) = registration.take_once() else {
                    return false;
                };
                self.registry.remove(registration.id);
                tx.send(envelope.clone()).is_ok()
            }
            Target::Stream(tx) => match tx.try_send(envelope.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(envelope)) => match self.config.overflow_policy {
                    OverflowPolicy::Drop => {
                        tracing::warn!(
                            id = registration.id,
                            kind = %registration.kind,
                            "Queue is full, dropping matched message"
                        );
                        false
                    }
                    OverflowPolicy::Block => tx.send(envelope).await.is_ok(),
                },
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(id = registration.id, "Consumer is gone, unregistering");
                    self.registry.remove(registration.id);
                    false
                }
            },
        }
    }

    /// Process inbound envelopes until [`stop`](Self::stop) is called.
    pub async fn run(&self) -> Result<()> {
        let mut receiver = self.receiver.lock().await;
        loop {
            select! {
                _ = self.cancel_token.cancelled() => break,
                Some(inbound) = receiver.recv() => {
                    self.dispatch(&inbound.provider, &inbound.envelope).await;
                },
                else => break
            }
        }

        // best effort for what was already queued
        while let Ok(inbound) = receiver.try_recv() {
            self.dispatch(&inbound.provider, &inbound.envelope).await;
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.cancel_token.cancel();
    }
}

/// Entry point into the router, used from broker subscription tasks.
#[derive(Clone)]
pub struct RouterSender {
    sender: Sender<Inbound>,
}

impl RouterSender {
    /// Queue an envelope for dispatch, waiting while the router is saturated.
    /// Returns `false` only when the router is gone.
    pub async fn deliver(&self, provider: &Arc<str>, envelope: Envelope) -> bool {
        let inbound = Inbound {
            provider: provider.clone(),
            envelope: Arc::new(envelope),
        };
        self.sender.send(inbound).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageType;

    fn router() -> EventRouter {
        EventRouter::new(Arc::new(Config::default()))
    }

    fn envelope(status: &str, content: &str) -> Arc<Envelope> {
        Arc::new(
            Envelope::builder(MessageType::CodeQualityChecksDone)
                .property("CI_STATUS", status)
                .content(content)
                .build(),
        )
    }

    fn failed_selector() -> Selector {
        Selector::compile("CI_TYPE = 'code-quality-checks-done' and CI_STATUS = 'failed'").unwrap()
    }

    #[tokio::test]
    async fn test_first_match_wins_for_one_shot() {
        let router = router();
        let (handle, rx) = router.register_once("test", failed_selector(), RegistrationKind::Wait);

        assert_eq!(router.dispatch("test", &envelope("passed", "a")).await, 0);
        assert_eq!(router.dispatch("test", &envelope("failed", "b")).await, 1);
        assert_eq!(router.dispatch("test", &envelope("failed", "c")).await, 0);

        assert_eq!(rx.await.unwrap().content(), "b");
        assert!(!handle.is_registered());
        assert!(router.is_empty());
    }

    #[tokio::test]
    async fn test_trigger_receives_every_match_in_order() {
        let router = router();
        let (_handle, mut rx) = router.register_trigger("test", failed_selector());

        for content in ["1", "2", "3"] {
            router.dispatch("test", &envelope("failed", content)).await;
        }
        router.dispatch("test", &envelope("passed", "skip")).await;

        for expected in ["1", "2", "3"] {
            assert_eq!(rx.recv().await.unwrap().content(), expected);
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(router.len(), 1);
    }

    #[tokio::test]
    async fn test_registrations_are_scoped_to_provider() {
        let router = router();
        let (_handle, rx) = router.register_once("a", Selector::all(), RegistrationKind::Wait);

        assert_eq!(router.dispatch("b", &envelope("failed", "x")).await, 0);
        assert_eq!(router.len(), 1);
        assert_eq!(router.dispatch("a", &envelope("failed", "y")).await, 1);
        assert_eq!(rx.await.unwrap().content(), "y");
    }

    #[tokio::test]
    async fn test_dropping_handle_unregisters() {
        let router = router();
        let (handle, _rx) = router.register_trigger("test", Selector::all());
        let id = handle.id();
        assert!(router.contains(id));
        drop(handle);
        assert!(!router.contains(id));
        assert!(router.is_empty());
    }

    #[tokio::test]
    async fn test_overflow_drop_policy_skips_when_full() {
        let config = Config::default()
            .with_trigger_queue_size(1)
            .with_overflow_policy(OverflowPolicy::Drop);
        let router = EventRouter::new(Arc::new(config));
        let (_handle, mut rx) = router.register_trigger("test", Selector::all());

        assert_eq!(router.dispatch("test", &envelope("failed", "1")).await, 1);
        assert_eq!(router.dispatch("test", &envelope("failed", "2")).await, 0);
        assert_eq!(rx.recv().await.unwrap().content(), "1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_trigger_consumer_is_removed() {
        let router = router();
        let (handle, rx) = router.register_trigger("test", Selector::all());
        drop(rx);
        assert_eq!(router.dispatch("test", &envelope("failed", "x")).await, 0);
        assert!(!handle.is_registered());
    }

    #[tokio::test]
    async fn test_run_loop_dispatches_from_sender() {
        let router = Arc::new(router());
        let (_handle, rx) = router.register_once("test", Selector::all(), RegistrationKind::Wait);
        let task = tokio::spawn({
            let router = router.clone();
            async move { router.run().await }
        });

        let provider: Arc<str> = Arc::from("test");
        let sent = Envelope::builder(MessageType::Custom).content("abcdefg").build();
        assert!(router.sender().deliver(&provider, sent).await);
        assert_eq!(rx.await.unwrap().content(), "abcdefg");

        router.stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_burst_beyond_channel_size_is_fully_routed() {
        let config = Config::default()
            .with_channel_size(4)
            .with_trigger_queue_size(2);
        let router = Arc::new(EventRouter::new(Arc::new(config)));
        let (_handle, mut rx) = router.register_trigger("test", Selector::all());
        let task = tokio::spawn({
            let router = router.clone();
            async move { router.run().await }
        });

        let sender = router.sender();
        let feeder = tokio::spawn(async move {
            let provider: Arc<str> = Arc::from("test");
            for i in 0..50 {
                let sent = Envelope::builder(MessageType::Custom)
                    .content(i.to_string())
                    .build();
                assert!(sender.deliver(&provider, sent).await);
            }
        });

        for i in 0..50 {
            assert_eq!(rx.recv().await.unwrap().content(), i.to_string());
        }
        feeder.await.unwrap();
        router.stop();
        task.await.unwrap().unwrap();
    }
}
