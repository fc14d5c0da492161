//! Provider configuration

use serde::Deserialize;

/// Configured providers. Absent sections register nothing for that channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub sms: Option<HttpSmsConfig>,
    #[serde(default)]
    pub email: Option<HttpEmailConfig>,
    #[serde(default)]
    pub chat: Option<ChatWebhookConfig>,
}

/// Form-encoded SMS gateway with basic auth
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSmsConfig {
    #[serde(default = "default_sms_name")]
    pub name: String,
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Sender number or alphanumeric sender id
    pub from: String,
}

/// JSON mail API with bearer token auth
#[derive(Debug, Clone, Deserialize)]
pub struct HttpEmailConfig {
    #[serde(default = "default_email_name")]
    pub name: String,
    pub endpoint: String,
    pub api_key: String,
    pub from_address: String,
    #[serde(default)]
    pub from_name: Option<String>,
}

/// Incoming chat webhook
#[derive(Debug, Clone, Deserialize)]
pub struct ChatWebhookConfig {
    #[serde(default = "default_chat_name")]
    pub name: String,
    pub webhook_url: String,
}

fn default_sms_name() -> String {
    "http-sms".to_string()
}

fn default_email_name() -> String {
    "http-email".to_string()
}

fn default_chat_name() -> String {
    "chat-webhook".to_string()
}
