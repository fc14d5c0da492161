//! Signed webhook fan-out.
//!
//! [`WebhookDispatcher::broadcast`] builds one envelope per event, signs it
//! per subscription with HMAC-SHA256 and delivers to every matching
//! subscription on its own task, retrying failures with exponential backoff.
//! Receivers verify deliveries with [`WebhookDispatcher::validate_signature`],
//! which also rejects replayed nonces.
//!
//! The nonce store is bounded by clearing it wholesale once it reaches its
//! size limit; a nonce seen just before a clear can be replayed once after it.

mod dispatcher;
mod error;
mod nonce;
mod registry;
pub mod signing;
mod transport;
mod types;

pub use dispatcher::{BroadcastHandle, WebhookDispatcher, WebhookStats, WebhookStatsSnapshot};
pub use error::{SignatureError, WebhookError};
pub use nonce::NonceStore;
pub use registry::WebhookRegistry;
pub use transport::{ReqwestTransport, TransportError, WebhookRequest, WebhookTransport};
pub use types::{
    AttemptOutcome, DeliveryAttempt, DeliveryReport, SubscriptionConfig, WebhookEnvelope,
    WebhookSubscription, HEADER_EVENT, HEADER_NONCE, HEADER_SIGNATURE, HEADER_TIMESTAMP,
};
