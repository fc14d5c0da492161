//! HTTP-backed channel providers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::config::{ChatWebhookConfig, HttpEmailConfig, HttpSmsConfig, ProvidersConfig};
use super::provider::ChannelProvider;
use super::types::{ChannelMessage, ChannelType, ProviderError, SendOutcome};

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Read an error body without failing the outer call
async fn rejected(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ProviderError::Rejected { status, body }
}

/// Pick a message id out of a JSON response body
fn message_id_from(body: &Value) -> Option<String> {
    ["sid", "id", "message_id", "messageId"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn outcome(provider: &str, channel: ChannelType, result: Result<Option<String>, ProviderError>) -> SendOutcome {
    match result {
        Ok(message_id) => SendOutcome::delivered(message_id),
        Err(e) => {
            tracing::warn!(provider = %provider, channel = %channel, error = %e, "Provider send failed");
            SendOutcome::failed(e.to_string())
        }
    }
}

/// SMS gateway taking form-encoded `From`/`To`/`Body` with basic auth
pub struct HttpSmsProvider {
    config: HttpSmsConfig,
    client: Client,
}

impl HttpSmsProvider {
    pub fn new(config: HttpSmsConfig, client: Client) -> Self {
        Self { config, client }
    }

    async fn deliver(&self, message: &ChannelMessage) -> Result<Option<String>, ProviderError> {
        let form = [
            ("From", self.config.from.as_str()),
            ("To", message.recipient.as_str()),
            ("Body", message.text.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.endpoint)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(message_id_from(&body))
    }
}

#[async_trait]
impl ChannelProvider for HttpSmsProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Sms
    }

    fn validate_config(&self) -> bool {
        is_http_url(&self.config.endpoint)
            && !self.config.username.is_empty()
            && !self.config.password.is_empty()
            && !self.config.from.is_empty()
    }

    async fn send(&self, message: &ChannelMessage) -> SendOutcome {
        outcome(self.name(), ChannelType::Sms, self.deliver(message).await)
    }
}

/// Mail API taking a JSON message with bearer token auth
pub struct HttpEmailProvider {
    config: HttpEmailConfig,
    client: Client,
}

impl HttpEmailProvider {
    pub fn new(config: HttpEmailConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn payload(&self, message: &ChannelMessage) -> Value {
        let mut from = json!({ "email": self.config.from_address });
        if let Some(name) = &self.config.from_name {
            from["name"] = json!(name);
        }

        let mut payload = json!({
            "from": from,
            "to": [{ "email": message.recipient }],
            "subject": message.subject.as_deref().unwrap_or("Notification"),
            "text": message.text,
        });
        if let Some(html) = &message.html {
            payload["html"] = json!(html);
        }
        if !message.metadata.is_empty() {
            payload["metadata"] = json!(message.metadata);
        }
        payload
    }

    async fn deliver(&self, message: &ChannelMessage) -> Result<Option<String>, ProviderError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&self.payload(message))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let header_id = response
            .headers()
            .get("X-Message-Id")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        if header_id.is_some() {
            return Ok(header_id);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(message_id_from(&body))
    }
}

#[async_trait]
impl ChannelProvider for HttpEmailProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    fn validate_config(&self) -> bool {
        is_http_url(&self.config.endpoint)
            && !self.config.api_key.is_empty()
            && self.config.from_address.contains('@')
    }

    async fn send(&self, message: &ChannelMessage) -> SendOutcome {
        outcome(self.name(), ChannelType::Email, self.deliver(message).await)
    }
}

/// Incoming-webhook chat integration posting `{channel, text}`
pub struct ChatWebhookProvider {
    config: ChatWebhookConfig,
    client: Client,
}

impl ChatWebhookProvider {
    pub fn new(config: ChatWebhookConfig, client: Client) -> Self {
        Self { config, client }
    }

    async fn deliver(&self, message: &ChannelMessage) -> Result<Option<String>, ProviderError> {
        let payload = json!({
            "channel": message.recipient,
            "text": message.text,
        });

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(message_id_from(&body))
    }
}

#[async_trait]
impl ChannelProvider for ChatWebhookProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Chat
    }

    fn validate_config(&self) -> bool {
        is_http_url(&self.config.webhook_url)
    }

    async fn send(&self, message: &ChannelMessage) -> SendOutcome {
        outcome(self.name(), ChannelType::Chat, self.deliver(message).await)
    }
}

/// Build the configured providers sharing one HTTP client
pub fn build_providers(
    config: &ProvidersConfig,
    timeout: Duration,
) -> Result<Vec<Arc<dyn ChannelProvider>>, ProviderError> {
    let client = Client::builder().timeout(timeout).build()?;
    let mut providers: Vec<Arc<dyn ChannelProvider>> = Vec::new();

    if let Some(sms) = &config.sms {
        providers.push(Arc::new(HttpSmsProvider::new(sms.clone(), client.clone())));
    }
    if let Some(email) = &config.email {
        providers.push(Arc::new(HttpEmailProvider::new(email.clone(), client.clone())));
    }
    if let Some(chat) = &config.chat {
        providers.push(Arc::new(ChatWebhookProvider::new(chat.clone(), client.clone())));
    }

    Ok(providers)
}

/// Metadata attached to every message
pub(crate) fn message_metadata(
    event_type: &str,
    job_id: &str,
    channel: ChannelType,
) -> HashMap<String, String> {
    HashMap::from([
        ("event_type".to_string(), event_type.to_string()),
        ("job_id".to_string(), job_id.to_string()),
        ("channel".to_string(), channel.as_str().to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Form;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn message(recipient: &str) -> ChannelMessage {
        ChannelMessage {
            recipient: recipient.to_string(),
            subject: Some("Visitor arrived".to_string()),
            text: "Ada is waiting".to_string(),
            html: Some("<p>Ada is waiting</p>".to_string()),
            metadata: message_metadata("HOST_ALERT", "job-1", ChannelType::Email),
        }
    }

    fn sms_config(endpoint: &str) -> HttpSmsConfig {
        HttpSmsConfig {
            name: "http-sms".to_string(),
            endpoint: endpoint.to_string(),
            username: "acct".to_string(),
            password: "secret".to_string(),
            from: "+15550001111".to_string(),
        }
    }

    #[test]
    fn test_validate_config() {
        let client = Client::new();
        assert!(HttpSmsProvider::new(sms_config("https://sms.test/send"), client.clone()).validate_config());
        assert!(!HttpSmsProvider::new(sms_config("sms.test/send"), client.clone()).validate_config());

        let email = HttpEmailProvider::new(
            HttpEmailConfig {
                name: "mail".to_string(),
                endpoint: "https://mail.test/v1/send".to_string(),
                api_key: String::new(),
                from_address: "front@desk.test".to_string(),
                from_name: None,
            },
            client.clone(),
        );
        assert!(!email.validate_config());

        let chat = ChatWebhookProvider::new(
            ChatWebhookConfig {
                name: "chat".to_string(),
                webhook_url: "https://hooks.chat.test/T000".to_string(),
            },
            client,
        );
        assert!(chat.validate_config());
    }

    #[tokio::test]
    async fn test_sms_posts_form_with_basic_auth() {
        let app = Router::new().route(
            "/send",
            post(|headers: HeaderMap, Form(form): Form<HashMap<String, String>>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|h| h.to_str().ok())
                    .is_some_and(|h| h.starts_with("Basic "));
                if !authorized || form.get("To").map(String::as_str) != Some("+15551234567") {
                    return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request"})));
                }
                (StatusCode::CREATED, Json(json!({"sid": "SM123"})))
            }),
        );
        let base = serve(app).await;

        let provider = HttpSmsProvider::new(sms_config(&format!("{}/send", base)), Client::new());
        let result = provider.send(&message("+15551234567")).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.message_id.as_deref(), Some("SM123"));
    }

    #[tokio::test]
    async fn test_email_rejection_is_a_failure_value() {
        let app = Router::new().route(
            "/send",
            post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "invalid recipient") }),
        );
        let base = serve(app).await;

        let provider = HttpEmailProvider::new(
            HttpEmailConfig {
                name: "mail".to_string(),
                endpoint: format!("{}/send", base),
                api_key: "key".to_string(),
                from_address: "front@desk.test".to_string(),
                from_name: Some("Front Desk".to_string()),
            },
            Client::new(),
        );
        let result = provider.send(&message("a@b.com")).await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("422"), "{}", error);
        assert!(error.contains("invalid recipient"), "{}", error);
    }

    #[tokio::test]
    async fn test_email_payload_shape() {
        let provider = HttpEmailProvider::new(
            HttpEmailConfig {
                name: "mail".to_string(),
                endpoint: "https://mail.test/send".to_string(),
                api_key: "key".to_string(),
                from_address: "front@desk.test".to_string(),
                from_name: Some("Front Desk".to_string()),
            },
            Client::new(),
        );
        let payload = provider.payload(&message("a@b.com"));
        assert_eq!(payload["to"][0]["email"], "a@b.com");
        assert_eq!(payload["from"]["name"], "Front Desk");
        assert_eq!(payload["subject"], "Visitor arrived");
        assert_eq!(payload["html"], "<p>Ada is waiting</p>");
        assert_eq!(payload["metadata"]["job_id"], "job-1");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails() {
        // Bind then drop to get a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = ChatWebhookProvider::new(
            ChatWebhookConfig {
                name: "chat".to_string(),
                webhook_url: format!("http://{}/hook", addr),
            },
            Client::new(),
        );
        let result = provider.send(&message("#front-desk")).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_build_providers_from_config() {
        let config = ProvidersConfig {
            sms: Some(sms_config("https://sms.test/send")),
            email: None,
            chat: Some(ChatWebhookConfig {
                name: "chat".to_string(),
                webhook_url: "https://hooks.chat.test/T000".to_string(),
            }),
        };
        let providers = build_providers(&config, Duration::from_secs(5)).unwrap();
        let channels: Vec<ChannelType> = providers.iter().map(|p| p.channel_type()).collect();
        assert_eq!(channels, vec![ChannelType::Sms, ChannelType::Chat]);
    }
}
