use std::{collections::HashSet, path::Path, time::Duration};

use crate::{Error, OverflowPolicy, Result, Secret};

/// Runtime configuration for the hub, router and broker clients.
///
/// Use the builder methods to customize, or [`Default`] for the values the
/// CI host expects.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use cibus::Config;
///
/// let config = Config::default()
///     .with_connect_attempts(30)
///     .with_retry_interval(Duration::from_millis(250));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Size of the router's inbound channel.
    /// While it is full, subscription tasks wait before reading the next message.
    /// Default: 128
    pub channel_size: usize,

    /// Number of matched envelopes a trigger can have queued before the
    /// overflow policy applies.
    /// Default: 64
    pub trigger_queue_size: usize,

    /// How many times a broker connection is attempted before giving up.
    /// Default: 360
    pub connect_attempts: u32,

    /// Pause between two connection attempts.
    /// Default: 1 s
    pub retry_interval: Duration,

    /// Behavior of the router when a trigger queue is full.
    /// Default: [`OverflowPolicy::Block`]
    pub overflow_policy: OverflowPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            channel_size: 128,
            trigger_queue_size: 64,
            connect_attempts: 360,
            retry_interval: Duration::from_secs(1),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl Config {
    pub fn with_channel_size(mut self, size: usize) -> Self {
        self.channel_size = size;
        self
    }

    pub fn with_trigger_queue_size(mut self, size: usize) -> Self {
        self.trigger_queue_size = size;
        self
    }

    /// Set the retry ceiling for connecting a provider.
    ///
    /// With the default interval of one second this is also the number of
    /// seconds a provider may stay unreachable during startup.
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }
}

/// A named broker connection: where to connect, which topic, which credentials.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub broker: String,
    pub topic: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<Secret>,
}

impl ProviderConfig {
    pub fn new(
        name: impl Into<String>,
        broker: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            broker: broker.into(),
            topic: topic.into(),
            user: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<Secret>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("provider name must not be empty"));
        }
        if self.broker.trim().is_empty() {
            return Err(Error::config(format!(
                "provider '{}' has no broker address",
                self.name
            )));
        }
        if self.topic.trim().is_empty() {
            return Err(Error::config(format!("provider '{}' has no topic", self.name)));
        }
        Ok(())
    }
}

/// File-based configuration: runtime overrides plus the provider list.
///
/// ```toml
/// [runtime]
/// connect_attempts = 60
/// retry_interval_ms = 500
/// overflow_policy = "block"
///
/// [[providers]]
/// name = "test"
/// broker = "nats://localhost:4222"
/// topic = "CI"
/// user = "admin"
/// password = "redhat"
/// ```
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeSettings {
    pub channel_size: Option<usize>,
    pub trigger_queue_size: Option<usize>,
    pub connect_attempts: Option<u32>,
    pub retry_interval_ms: Option<u64>,
    pub overflow_policy: Option<OverflowPolicy>,
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(text).map_err(|e| Error::config(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| Error::config(format!("failed to load {}: {e}", path.display())))
    }

    /// Runtime configuration: defaults overridden by whatever `[runtime]` sets.
    pub fn config(&self) -> Config {
        let runtime = &self.runtime;
        let mut config = Config::default();
        if let Some(size) = runtime.channel_size {
            config = config.with_channel_size(size);
        }
        if let Some(size) = runtime.trigger_queue_size {
            config = config.with_trigger_queue_size(size);
        }
        if let Some(attempts) = runtime.connect_attempts {
            config = config.with_connect_attempts(attempts);
        }
        if let Some(ms) = runtime.retry_interval_ms {
            config = config.with_retry_interval(Duration::from_millis(ms));
        }
        if let Some(policy) = runtime.overflow_policy {
            config = config.with_overflow_policy(policy);
        }
        config
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for provider in &self.providers {
            provider.validate()?;
            if !names.insert(provider.name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate provider name '{}'",
                    provider.name
                )));
            }
        }
        Ok(())
    }
}
