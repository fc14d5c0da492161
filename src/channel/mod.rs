//! Delivery channels and their providers.
//!
//! A provider delivers one rendered [`ChannelMessage`] over a single channel
//! and reports the result as a [`SendOutcome`]. Providers are registered once
//! at startup in a [`ProviderRegistry`]; providers whose configuration does
//! not validate are rejected there and never selected.
//!
//! When several providers share a channel type the first one registered is
//! used for dispatch.

mod config;
mod http;
mod provider;
mod recipient;
mod registry;
mod types;

pub use config::{ChatWebhookConfig, HttpEmailConfig, HttpSmsConfig, ProvidersConfig};
pub use http::{build_providers, ChatWebhookProvider, HttpEmailProvider, HttpSmsProvider};
pub(crate) use http::message_metadata;
pub use provider::ChannelProvider;
pub use recipient::RecipientRules;
pub use registry::ProviderRegistry;
pub use types::{ChannelMessage, ChannelType, ProviderError, SendOutcome};

#[cfg(test)]
pub(crate) use provider::testing;
