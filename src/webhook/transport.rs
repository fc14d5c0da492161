use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// A signed POST ready to send
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl WebhookRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Outbound HTTP used by the webhook dispatcher.
///
/// Returns the response status; the dispatcher decides what counts as
/// success.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, request: &WebhookRequest) -> Result<u16, TransportError>;
}

/// `reqwest` transport with a per-request timeout
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post(&self, request: &WebhookRequest) -> Result<u16, TransportError> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.body(request.body.clone()).send().await?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_reqwest_transport_sends_headers_and_body() {
        let captured: Arc<Mutex<Option<(HeaderMap, Bytes)>>> = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        let app = Router::new().route(
            "/hook",
            post(move |headers: HeaderMap, body: Bytes| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some((headers, body));
                    StatusCode::ACCEPTED
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let transport = ReqwestTransport::new(Duration::from_secs(5), "Test-Agent/1.0").unwrap();
        let request = WebhookRequest {
            url: format!("http://{}/hook", addr),
            headers: vec![("X-Webhook-Event", "visit.checked_in".to_string())],
            body: br#"{"a":1}"#.to_vec(),
        };
        assert_eq!(request.header("x-webhook-event"), Some("visit.checked_in"));

        let status = transport.post(&request).await.unwrap();
        assert_eq!(status, 202);

        let (headers, body) = captured.lock().unwrap().take().unwrap();
        assert_eq!(headers["x-webhook-event"], "visit.checked_in");
        assert_eq!(headers["user-agent"], "Test-Agent/1.0");
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(&body[..], br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_reqwest_transport_connection_refused() {
        let transport = ReqwestTransport::new(Duration::from_secs(1), "Test-Agent/1.0").unwrap();
        let request = WebhookRequest {
            url: "http://127.0.0.1:1/hook".to_string(),
            headers: vec![],
            body: vec![],
        };
        assert!(matches!(
            transport.post(&request).await,
            Err(TransportError::Http(_))
        ));
    }
}
