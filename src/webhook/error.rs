use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Webhook subscription not found: {0}")]
    NotFound(String),

    #[error("Invalid webhook subscription {id}: {reason}")]
    InvalidSubscription { id: String, reason: String },

    #[error("Failed to serialize webhook envelope: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why an inbound delivery was rejected. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Signature header is malformed")]
    Malformed,

    #[error("Signature does not match payload")]
    Mismatch,

    #[error("Nonce has already been used")]
    Replayed,
}

impl SignatureError {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureError::Malformed => "malformed",
            SignatureError::Mismatch => "mismatch",
            SignatureError::Replayed => "replayed",
        }
    }
}
