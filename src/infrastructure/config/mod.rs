mod settings;

pub use settings::{
    LogConfig, NotificationConfig, OtelConfig, QueueConfig, ServerConfig, Settings,
    WebhookSettings, WorkerConfig,
};
