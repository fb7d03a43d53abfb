use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;

use crate::{Envelope, MessageId, Properties, Result};

/// Environment variable carrying the triggering message's content.
pub const CI_MESSAGE: &str = "CI_MESSAGE";

/// A job run requested by a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub job: Arc<str>,
    /// Id of the message that caused the run.
    pub cause: MessageId,
    /// Every message property verbatim, plus [`CI_MESSAGE`].
    pub environment: Properties,
}

impl RunRequest {
    pub fn from_envelope(job: Arc<str>, envelope: &Envelope) -> Self {
        let mut environment = envelope.properties().clone();
        environment.insert(CI_MESSAGE.to_string(), envelope.content().to_string());
        Self {
            job,
            cause: envelope.meta().id(),
            environment,
        }
    }
}

/// Implemented by the job-execution host to start runs.
///
/// Called from a spawned task, never from the router's dispatch loop, so
/// slow launches do not hold up message delivery.
#[async_trait]
pub trait JobLauncher: Send + Sync + 'static {
    async fn launch(&self, request: RunRequest) -> Result<()>;
}

/// Parameters and step-produced variables of one build.
///
/// Parameters are declared by the job (with defaults). Triggered runs
/// override same-named parameters with message properties; subscribe steps
/// only ever write their own variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnvironment {
    parameters: BTreeMap<String, String>,
    variables: BTreeMap<String, String>,
}

impl BuildEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, name: impl Into<String>, default: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), default.into());
        self
    }

    /// Expose a trigger's environment: properties matching a parameter
    /// override it, the rest become variables.
    pub fn apply_trigger(&mut self, request: &RunRequest) {
        for (key, value) in &request.environment {
            match self.parameters.get_mut(key) {
                Some(parameter) => *parameter = value.clone(),
                None => {
                    self.variables.insert(key.clone(), value.clone());
                }
            }
        }
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Resolve a name the way a build step sees it: variables shadow parameters.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables
            .get(name)
            .or_else(|| self.parameters.get(name))
            .map(String::as_str)
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }
}
