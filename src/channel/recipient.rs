//! Recipient extraction from notification context

use serde::Deserialize;
use serde_json::Value;

use super::types::ChannelType;
use crate::template::substitution::lookup;

/// Ordered context paths searched for a recipient address, per channel.
///
/// The first path holding a plausible address wins. Chat falls back to the
/// configured default destination when no personal handle is present.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipientRules {
    #[serde(default = "default_sms_paths")]
    pub sms: Vec<String>,
    #[serde(default = "default_email_paths")]
    pub email: Vec<String>,
    #[serde(default = "default_chat_paths")]
    pub chat: Vec<String>,
}

fn paths(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_sms_paths() -> Vec<String> {
    paths(&["recipient.phone", "phone", "host.phone", "visitor.phone"])
}

fn default_email_paths() -> Vec<String> {
    paths(&["recipient.email", "email", "host.email", "visitor.email"])
}

fn default_chat_paths() -> Vec<String> {
    paths(&[
        "recipient.chat_handle",
        "chat_handle",
        "host.chat_handle",
        "host.slack_id",
    ])
}

impl Default for RecipientRules {
    fn default() -> Self {
        Self {
            sms: default_sms_paths(),
            email: default_email_paths(),
            chat: default_chat_paths(),
        }
    }
}

impl RecipientRules {
    fn paths_for(&self, channel: ChannelType) -> &[String] {
        match channel {
            ChannelType::Sms => &self.sms,
            ChannelType::Email => &self.email,
            ChannelType::Chat => &self.chat,
        }
    }

    /// Extract the recipient address for a channel
    pub fn extract(
        &self,
        channel: ChannelType,
        context: &Value,
        chat_default: Option<&str>,
    ) -> Option<String> {
        let found = self
            .paths_for(channel)
            .iter()
            .filter_map(|path| lookup(context, path))
            .filter_map(as_address)
            .find(|address| is_plausible(channel, address));

        match (found, channel) {
            (Some(address), _) => Some(address),
            (None, ChannelType::Chat) => chat_default
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            (None, _) => None,
        }
    }
}

fn as_address(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_plausible(channel: ChannelType, address: &str) -> bool {
    match channel {
        ChannelType::Sms => address.chars().filter(char::is_ascii_digit).count() >= 5,
        ChannelType::Email => address
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.')),
        ChannelType::Chat => true,
    }
}
