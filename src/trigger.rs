use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
};

use tokio::{sync::mpsc::Receiver, task::JoinHandle};

use crate::{
    Envelope, EventRouter, JobLauncher, RegistrationHandle, RegistrationId, Result, RunRequest,
    Selector,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TriggerState {
    Idle = 0,
    Armed = 1,
    Firing = 2,
}

impl TriggerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TriggerState::Armed,
            2 => TriggerState::Firing,
            _ => TriggerState::Idle,
        }
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerState::Idle => write!(f, "Idle"),
            TriggerState::Armed => write!(f, "Armed"),
            TriggerState::Firing => write!(f, "Firing"),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: AtomicU8,
    fired: AtomicU64,
}

impl Shared {
    fn state(&self) -> TriggerState {
        TriggerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set(&self, state: TriggerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: TriggerState, to: TriggerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct Armed {
    handle: RegistrationHandle,
    task: JoinHandle<()>,
}

/// Starts a job run for every message matching the job's selector.
///
/// `Idle` until armed against a router; `Armed` while its registration is
/// live; briefly `Firing` while handing a [`RunRequest`] to the host's
/// [`JobLauncher`], then back to `Armed`. Runs are launched on their own
/// tasks and never de-duplicated: N matching messages request N runs.
///
/// Dropping the coordinator disarms it.
pub struct TriggerCoordinator {
    job: Arc<str>,
    provider: Arc<str>,
    selector: Selector,
    launcher: Arc<dyn JobLauncher>,
    shared: Arc<Shared>,
    armed: Option<Armed>,
}

impl TriggerCoordinator {
    /// Compiles the selector; a malformed one is rejected here, at
    /// configuration time.
    pub fn new(
        job: &str,
        provider: &str,
        selector: &str,
        launcher: Arc<dyn JobLauncher>,
    ) -> Result<Self> {
        Ok(Self {
            job: Arc::from(job),
            provider: Arc::from(provider),
            selector: Selector::compile(selector)?,
            launcher,
            shared: Arc::new(Shared::default()),
            armed: None,
        })
    }

    /// Register with the router and start listening. Arming twice is a no-op.
    pub fn arm(&mut self, router: &EventRouter) {
        if self.armed.is_some() {
            return;
        }
        let (handle, receiver) = router.register_trigger(&self.provider, self.selector.clone());
        self.shared.set(TriggerState::Armed);
        let task = tokio::spawn(listen(
            self.job.clone(),
            self.launcher.clone(),
            self.shared.clone(),
            receiver,
        ));
        tracing::info!(job = %self.job, provider = %self.provider, selector = %self.selector, "Trigger armed");
        self.armed = Some(Armed { handle, task });
    }

    /// Stop listening and release the registration.
    pub fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            self.shared.set(TriggerState::Idle);
            armed.task.abort();
            drop(armed.handle);
            tracing::info!(job = %self.job, "Trigger disarmed");
        }
    }

    pub fn state(&self) -> TriggerState {
        self.shared.state()
    }

    /// Number of runs requested so far.
    pub fn fired_count(&self) -> u64 {
        self.shared.fired.load(Ordering::Acquire)
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn registration_id(&self) -> Option<RegistrationId> {
        self.armed.as_ref().map(|armed| armed.handle.id())
    }
}

impl Drop for TriggerCoordinator {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn listen(
    job: Arc<str>,
    launcher: Arc<dyn JobLauncher>,
    shared: Arc<Shared>,
    mut receiver: Receiver<Arc<Envelope>>,
) {
    while let Some(envelope) = receiver.recv().await {
        if !shared.transition(TriggerState::Armed, TriggerState::Firing) {
            break;
        }
        let request = RunRequest::from_envelope(job.clone(), &envelope);
        tracing::info!(job = %job, cause = request.cause, "Triggering run");

        let launcher = launcher.clone();
        let job_name = job.clone();
        tokio::spawn(async move {
            if let Err(e) = launcher.launch(request).await {
                tracing::error!(job = %job_name, error = %e, "Triggered run failed to start");
            }
        });

        shared.fired.fetch_add(1, Ordering::AcqRel);
        shared.transition(TriggerState::Firing, TriggerState::Armed);
    }
}
