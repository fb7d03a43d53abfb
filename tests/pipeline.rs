//! End-to-end flows through a hub backed by the in-memory broker.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use cibus::{
    BuildEnvironment, CI_MESSAGE, Config, Error, Hub, InMemoryBroker, JobLauncher, MessageType,
    ProviderConfig, PublishStep, Result, RunRequest, SubscribeStep, TriggerState, WaitRequest,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct ChannelLauncher(mpsc::UnboundedSender<RunRequest>);

#[async_trait]
impl JobLauncher for ChannelLauncher {
    async fn launch(&self, request: RunRequest) -> Result<()> {
        let _ = self.0.send(request);
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn started_hub(broker: &InMemoryBroker) -> Hub {
    init_tracing();
    let mut hub = Hub::new(Config::default(), Arc::new(broker.clone()));
    hub.add_provider(ProviderConfig::new("test", "memory://amq", "CI")).unwrap();
    hub.start().await.unwrap();
    hub
}

async fn until_registered(hub: &Hub, count: usize) {
    while hub.router().len() < count {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_send_triggers_job_with_message_environment() {
    let broker = InMemoryBroker::new();
    let mut hub = started_hub(&broker).await;

    let (tx, mut runs) = mpsc::unbounded_channel();
    let trigger = hub
        .trigger(
            "downstream",
            "test",
            "CI_TYPE = 'code-quality-checks-done' and CI_STATUS = 'failed'",
            Arc::new(ChannelLauncher(tx)),
        )
        .unwrap();
    assert_eq!(trigger.state(), TriggerState::Armed);

    let publisher = hub.publisher().with_origin("upstream");
    PublishStep::new("test", MessageType::CodeQualityChecksDone)
        .with_content("This is my content")
        .with_properties("CI_STATUS = failed\nPARAMETER = my parameter")
        .send(&publisher)
        .await
        .unwrap();

    let request = runs.recv().await.unwrap();
    assert_eq!(&*request.job, "downstream");
    assert_eq!(request.environment["CI_TYPE"], "code-quality-checks-done");
    assert_eq!(request.environment[CI_MESSAGE], "This is my content");

    let mut env = BuildEnvironment::new().with_parameter("PARAMETER", "bad parameter value");
    env.apply_trigger(&request);
    assert_eq!(env.parameter("PARAMETER"), Some("my parameter"));
    assert_eq!(env.get("CI_STATUS"), Some("failed"));

    drop(trigger);
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn test_non_matching_message_does_not_trigger() {
    let broker = InMemoryBroker::new();
    let mut hub = started_hub(&broker).await;

    let (tx, mut runs) = mpsc::unbounded_channel();
    let trigger = hub
        .trigger(
            "downstream",
            "test",
            "CI_STATUS = 'failed'",
            Arc::new(ChannelLauncher(tx)),
        )
        .unwrap();

    let publisher = hub.publisher();
    PublishStep::new("test", MessageType::CodeQualityChecksDone)
        .with_properties("CI_STATUS = passed")
        .send(&publisher)
        .await
        .unwrap();
    PublishStep::new("test", MessageType::CodeQualityChecksDone)
        .with_content("second")
        .with_properties("CI_STATUS = failed")
        .send(&publisher)
        .await
        .unwrap();

    // messages are routed in order, so the first run seen is the second message
    let request = runs.recv().await.unwrap();
    assert_eq!(request.environment[CI_MESSAGE], "second");
    assert_eq!(trigger.fired_count(), 1);

    drop(trigger);
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn test_wait_returns_content_of_matching_message() {
    let broker = InMemoryBroker::new();
    let mut hub = started_hub(&broker).await;

    let waiter = hub.waiter();
    let request = WaitRequest::new("test")
        .with_selector("CI_TYPE = 'code-quality-checks-done' and CI_STATUS = 'failed'")
        .unwrap()
        .with_timeout(Duration::from_secs(60));
    let wait = tokio::spawn(async move {
        waiter
            .wait_for_message(&request, &CancellationToken::new())
            .await
    });
    until_registered(&hub, 1).await;

    PublishStep::new("test", MessageType::CodeQualityChecksDone)
        .with_content("abcdefg")
        .with_properties("CI_STATUS = failed")
        .send(&hub.publisher())
        .await
        .unwrap();

    assert_eq!(wait.await.unwrap().unwrap(), "abcdefg");
    assert!(hub.router().is_empty());
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_waits_each_get_their_match() {
    let broker = InMemoryBroker::new();
    let mut hub = started_hub(&broker).await;

    let mut waits = Vec::new();
    for status in ["failed", "passed"] {
        let waiter = hub.waiter();
        let request = WaitRequest::new("test")
            .with_selector(&format!("CI_STATUS = '{status}'"))
            .unwrap();
        waits.push(tokio::spawn(async move {
            waiter
                .wait_for_message(&request, &CancellationToken::new())
                .await
        }));
    }
    until_registered(&hub, 2).await;

    let publisher = hub.publisher();
    for status in ["passed", "failed"] {
        PublishStep::new("test", MessageType::TestingCompleted)
            .with_content(format!("Hello World {status}"))
            .with_properties(format!("CI_STATUS = {status}"))
            .send(&publisher)
            .await
            .unwrap();
    }

    let failed = waits.remove(0).await.unwrap().unwrap();
    let passed = waits.remove(0).await.unwrap().unwrap();
    assert_eq!(failed, "Hello World failed");
    assert_eq!(passed, "Hello World passed");
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn test_subscribe_step_keeps_parameter() {
    let broker = InMemoryBroker::new();
    let mut hub = started_hub(&broker).await;

    let waiter = hub.waiter();
    let step = SubscribeStep::new("test", "PARAMETER")
        .with_selector("CI_TYPE = 'code-quality-checks-done'")
        .unwrap()
        .with_timeout(Duration::from_secs(60));
    let run = tokio::spawn(async move {
        let mut env =
            BuildEnvironment::new().with_parameter("PARAMETER", "original parameter value");
        step.run(&waiter, &mut env, &CancellationToken::new())
            .await
            .map(|_| env)
    });
    until_registered(&hub, 1).await;

    PublishStep::new("test", MessageType::CodeQualityChecksDone)
        .with_content("This is my content")
        .with_properties("PARAMETER = my parameter")
        .send(&hub.publisher())
        .await
        .unwrap();

    let env = run.await.unwrap().unwrap();
    assert_eq!(env.parameter("PARAMETER"), Some("original parameter value"));
    assert_eq!(env.variables()["PARAMETER"], "This is my content");
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn test_registrations_are_scoped_to_their_provider() {
    init_tracing();
    let broker = InMemoryBroker::new();
    let mut hub = Hub::new(Config::default(), Arc::new(broker.clone()));
    hub.add_provider(ProviderConfig::new("a", "memory://amq", "A")).unwrap();
    hub.add_provider(ProviderConfig::new("b", "memory://amq", "B")).unwrap();
    hub.start().await.unwrap();

    let waiter = hub.waiter();
    let wait = tokio::spawn(async move {
        waiter
            .wait_for_message(&WaitRequest::new("a"), &CancellationToken::new())
            .await
    });
    until_registered(&hub, 1).await;

    let publisher = hub.publisher();
    publisher
        .send("b", MessageType::Custom, "from b", Default::default())
        .await
        .unwrap();
    publisher
        .send("a", MessageType::Custom, "from a", Default::default())
        .await
        .unwrap();

    assert_eq!(wait.await.unwrap().unwrap(), "from a");
    hub.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_waits_do_not_leak_registrations() {
    let broker = InMemoryBroker::new();
    let mut hub = started_hub(&broker).await;
    let waiter = hub.waiter();
    let request = WaitRequest::new("test")
        .with_selector("CI_STATUS = 'never'")
        .unwrap()
        .with_timeout(Duration::from_millis(10));

    for _ in 0..100 {
        let result = waiter
            .wait_for_message(&request, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::WaitTimeout(_))));
    }

    let mut waits = tokio::task::JoinSet::new();
    for _ in 0..20 {
        let waiter = waiter.clone();
        let request = request.clone();
        waits.spawn(async move {
            waiter
                .wait_for_message(&request, &CancellationToken::new())
                .await
        });
    }
    while let Some(result) = waits.join_next().await {
        assert!(matches!(result.unwrap(), Err(Error::WaitTimeout(_))));
    }

    assert!(hub.router().is_empty());
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_wait_unregisters() {
    let broker = InMemoryBroker::new();
    let mut hub = started_hub(&broker).await;

    let cancel = CancellationToken::new();
    let waiter = hub.waiter();
    let wait = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            waiter
                .wait_for_message(&WaitRequest::new("test"), &cancel)
                .await
        }
    });
    until_registered(&hub, 1).await;
    cancel.cancel();

    assert!(matches!(wait.await.unwrap(), Err(Error::Cancelled)));
    assert!(hub.router().is_empty());
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn test_wait_on_unknown_provider_fails() {
    let broker = InMemoryBroker::new();
    let mut hub = started_hub(&broker).await;
    let result = hub
        .waiter()
        .wait_for_message(&WaitRequest::new("missing"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(Error::UnknownProvider(_))));
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn test_burst_of_sends_starts_one_run_per_message() {
    let broker = InMemoryBroker::new();
    let mut hub = started_hub(&broker).await;

    let (tx, mut runs) = mpsc::unbounded_channel();
    let trigger = hub
        .trigger("downstream", "test", "", Arc::new(ChannelLauncher(tx)))
        .unwrap();

    let publisher = hub.publisher();
    for i in 0..200 {
        publisher
            .send("test", MessageType::Custom, &i.to_string(), Default::default())
            .await
            .unwrap();
    }
    assert_eq!(broker.published("CI").len(), 200);

    let mut contents = std::collections::BTreeSet::new();
    for _ in 0..200 {
        let request = runs.recv().await.unwrap();
        contents.insert(request.environment[CI_MESSAGE].parse::<u32>().unwrap());
    }
    assert_eq!(contents, (0..200).collect());
    assert_eq!(trigger.fired_count(), 200);

    drop(trigger);
    hub.stop().await.unwrap();
}
