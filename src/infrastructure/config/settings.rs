use std::collections::HashMap;
use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::channel::{ChannelType, ProvidersConfig, RecipientRules};
use crate::notification::EventType;
use crate::ratelimit::RateLimitConfig;
use crate::retry::RetryPolicy;
use crate::template::NotificationTemplate;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub otel: OtelConfig,
    #[serde(default)]
    pub ratelimit: RateLimitConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub webhook: WebhookSettings,
    /// Templates registered in addition to the built-in set
    #[serde(default)]
    pub templates: Vec<NotificationTemplate>,
}

/// Operational HTTP server (health, stats, metrics)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Backend type: "memory" or "redis"
    #[serde(default = "default_queue_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_queue_prefix")]
    pub redis_prefix: String,
    /// How long a dequeued job may run before it is considered crashed
    /// and handed out again
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent worker tasks
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Poll interval when the queue has no due jobs
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Jobs claimed per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Interval of the maintenance task (rate limiter sweep, lease recovery)
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Ordered channels to try per event type
    #[serde(default = "default_fallback_chains")]
    pub fallback_chains: HashMap<EventType, Vec<ChannelType>>,
    /// Whole-chain retry policy applied by the worker
    #[serde(default = "default_job_retry")]
    pub retry: RetryPolicy,
    /// Upper bound for a single provider send
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    /// Chat destination used when the context carries no personal handle
    #[serde(default)]
    pub chat_default_destination: Option<String>,
    #[serde(default)]
    pub recipients: RecipientRules,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    #[serde(default = "default_webhook_retry")]
    pub retry: RetryPolicy,
    #[serde(default = "default_webhook_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Seen-nonce count that triggers a wholesale clear of the replay store
    #[serde(default = "default_max_nonces")]
    pub max_nonces: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "visitor-dispatch".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_queue_backend() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_queue_prefix() -> String {
    "vd:jobs".to_string()
}

fn default_visibility_timeout() -> u64 {
    120 // 2 minutes
}

fn default_concurrency() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_batch_size() -> usize {
    10
}

fn default_maintenance_interval() -> u64 {
    60 // 1 minute
}

fn default_fallback_chains() -> HashMap<EventType, Vec<ChannelType>> {
    HashMap::from([
        (
            EventType::HostAlert,
            vec![ChannelType::Sms, ChannelType::Email, ChannelType::Chat],
        ),
        (
            EventType::VisitorConfirmation,
            vec![ChannelType::Email, ChannelType::Sms],
        ),
        (
            EventType::CheckoutAlert,
            vec![ChannelType::Chat, ChannelType::Email],
        ),
        (
            EventType::VisitReminder,
            vec![ChannelType::Email, ChannelType::Sms],
        ),
    ])
}

fn default_job_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_delay_ms: 5_000,
        multiplier: 2.0,
        max_delay_ms: 300_000,
        jitter_factor: 0.1,
    }
}

fn default_provider_timeout_ms() -> u64 {
    10_000
}

fn default_webhook_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_delay_ms: 1_000,
        multiplier: 2.0,
        max_delay_ms: 60_000,
        jitter_factor: 0.0,
    }
}

fn default_webhook_timeout_ms() -> u64 {
    10_000
}

fn default_max_nonces() -> usize {
    10_000
}

fn default_user_agent() -> String {
    "VisitorDispatch-Webhooks/1.0".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("queue.backend", default_queue_backend())?
            .set_default("worker.concurrency", default_concurrency() as u64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER_PORT, QUEUE_BACKEND, QUEUE_REDIS_URL, RATELIMIT_ENABLED, ...
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject combinations that break delivery guarantees.
    ///
    /// A queue lease must outlast the slowest possible chain walk (every
    /// step hitting the provider timeout), otherwise lease recovery hands a
    /// running job to a second worker.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let longest_chain = self
            .notification
            .fallback_chains
            .values()
            .map(Vec::len)
            .max()
            .unwrap_or(0) as u64;
        let slowest_walk_ms = longest_chain * self.notification.provider_timeout_ms;
        let lease_ms = self.queue.visibility_timeout_seconds * 1000;

        if lease_ms <= slowest_walk_ms {
            return Err(ConfigError::Message(format!(
                "queue.visibility_timeout_seconds ({}s) must exceed the longest fallback chain ({} steps) \
                 times notification.provider_timeout_ms ({}ms)",
                self.queue.visibility_timeout_seconds,
                longest_chain,
                self.notification.provider_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log: LogConfig::default(),
            otel: OtelConfig::default(),
            ratelimit: RateLimitConfig::default(),
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
            notification: NotificationConfig::default(),
            providers: ProvidersConfig::default(),
            webhook: WebhookSettings::default(),
            templates: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: default_queue_backend(),
            redis_url: default_redis_url(),
            redis_prefix: default_queue_prefix(),
            visibility_timeout_seconds: default_visibility_timeout(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            maintenance_interval_seconds: default_maintenance_interval(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            fallback_chains: default_fallback_chains(),
            retry: default_job_retry(),
            provider_timeout_ms: default_provider_timeout_ms(),
            chat_default_destination: None,
            recipients: RecipientRules::default(),
        }
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            retry: default_webhook_retry(),
            request_timeout_ms: default_webhook_timeout_ms(),
            max_nonces: default_max_nonces(),
            user_agent: default_user_agent(),
        }
    }
}
