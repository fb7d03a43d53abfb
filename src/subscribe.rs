use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{BuildEnvironment, RegistrationKind, Result, WaitCoordinator, WaitRequest};

/// Build step that waits for a message and stores its content in a variable.
///
/// The step writes only its own variable. A job parameter with the same
/// name keeps its value; the variable shadows it for later steps.
#[derive(Debug, Clone)]
pub struct SubscribeStep {
    request: WaitRequest,
    variable: String,
}

impl SubscribeStep {
    pub fn new(provider: &str, variable: impl Into<String>) -> Self {
        Self {
            request: WaitRequest::new(provider),
            variable: variable.into(),
        }
    }

    pub fn with_selector(mut self, selector: &str) -> Result<Self> {
        self.request = self.request.with_selector(selector)?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request = self.request.with_timeout(timeout);
        self
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn request(&self) -> &WaitRequest {
        &self.request
    }

    /// Wait for the first matching message and expose its content. Returns
    /// the stored content.
    pub async fn run(
        &self,
        waiter: &WaitCoordinator,
        environment: &mut BuildEnvironment,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let envelope = waiter
            .await_match(&self.request, RegistrationKind::Subscribe, cancel)
            .await?;
        let content = envelope.content().to_string();
        environment.set_variable(self.variable.clone(), content.clone());
        tracing::info!(variable = %self.variable, "Stored message content");
        Ok(content)
    }
}
