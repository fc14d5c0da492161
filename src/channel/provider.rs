//! Channel provider trait

use async_trait::async_trait;

use super::types::{ChannelMessage, ChannelType, SendOutcome};

/// One concrete integration able to deliver messages over a channel.
///
/// `send` reports expected failures (bad recipient, gateway outage) through
/// [`SendOutcome::failed`]; it does not panic for them.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Name used in logs and metrics
    fn name(&self) -> &str;

    fn channel_type(&self) -> ChannelType;

    /// Whether the provider is configured well enough to be used
    fn validate_config(&self) -> bool;

    async fn send(&self, message: &ChannelMessage) -> SendOutcome;
}
