//! Channel message and result types

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delivery channel category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelType {
    #[serde(alias = "sms")]
    Sms,
    #[serde(alias = "email")]
    Email,
    #[serde(alias = "chat")]
    Chat,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Sms => "SMS",
            ChannelType::Email => "EMAIL",
            ChannelType::Chat => "CHAT",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered, channel-ready message. Built fresh for every attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelMessage {
    pub recipient: String,
    pub subject: Option<String>,
    pub text: String,
    pub html: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Result of one provider send
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl SendOutcome {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
            attempted_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
            attempted_at: Utc::now(),
        }
    }
}

/// Provider-specific error type
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider {0} has an invalid configuration")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_type_serde() {
        assert_eq!(serde_json::to_string(&ChannelType::Sms).unwrap(), "\"SMS\"");
        let parsed: ChannelType = serde_json::from_str("\"email\"").unwrap();
        assert_eq!(parsed, ChannelType::Email);
        let parsed: ChannelType = serde_json::from_str("\"CHAT\"").unwrap();
        assert_eq!(parsed, ChannelType::Chat);
    }

    #[test]
    fn test_send_outcome_constructors() {
        let ok = SendOutcome::delivered(Some("m-1".to_string()));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = SendOutcome::failed("gateway down");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("gateway down"));
    }
}
