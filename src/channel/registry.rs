//! Registry of active channel providers

use std::sync::Arc;

use dashmap::DashMap;

use super::provider::ChannelProvider;
use super::types::{ChannelType, ProviderError};

/// Active providers grouped by channel type, in registration order
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<ChannelType, Vec<Arc<dyn ChannelProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to the active set.
    ///
    /// Providers that fail `validate_config` are rejected and never selected.
    pub fn register(&self, provider: Arc<dyn ChannelProvider>) -> Result<(), ProviderError> {
        let name = provider.name().to_string();
        let channel = provider.channel_type();

        if !provider.validate_config() {
            tracing::error!(
                provider = %name,
                channel = %channel,
                "Provider configuration invalid, not registering"
            );
            return Err(ProviderError::InvalidConfig(name));
        }

        let mut entry = self.providers.entry(channel).or_default();
        if let Some(active) = entry.first() {
            tracing::warn!(
                provider = %name,
                channel = %channel,
                active = %active.name(),
                "Multiple providers for channel, the first registered is used"
            );
        }
        entry.push(provider);

        tracing::info!(provider = %name, channel = %channel, "Provider registered");
        Ok(())
    }

    /// The provider used for a channel
    pub fn resolve(&self, channel: ChannelType) -> Option<Arc<dyn ChannelProvider>> {
        self.providers
            .get(&channel)
            .and_then(|providers| providers.first().cloned())
    }

    pub fn providers_for(&self, channel: ChannelType) -> Vec<Arc<dyn ChannelProvider>> {
        self.providers
            .get(&channel)
            .map(|providers| providers.clone())
            .unwrap_or_default()
    }

    /// (channel, provider name) pairs, ordered by channel then registration
    pub fn list(&self) -> Vec<(ChannelType, String)> {
        let mut out: Vec<(ChannelType, String)> = self
            .providers
            .iter()
            .flat_map(|entry| {
                let channel = *entry.key();
                entry
                    .value()
                    .iter()
                    .map(|p| (channel, p.name().to_string()))
                    .collect::<Vec<_>>()
            })
            .collect();
        out.sort_by_key(|(channel, _)| *channel);
        out
    }

    pub fn len(&self) -> usize {
        self.providers.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::{Behavior, ScriptedProvider};

    #[test]
    fn test_invalid_provider_rejected() {
        let registry = ProviderRegistry::new();
        let provider = ScriptedProvider::new("broken-sms", ChannelType::Sms, Behavior::Succeed).invalid();

        let result = registry.register(Arc::new(provider));
        assert!(matches!(result, Err(ProviderError::InvalidConfig(_))));
        assert!(registry.resolve(ChannelType::Sms).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_first_registered_wins() {
        let registry = ProviderRegistry::new();
        registry
            .register(Arc::new(ScriptedProvider::new("mail-a", ChannelType::Email, Behavior::Succeed)))
            .unwrap();
        registry
            .register(Arc::new(ScriptedProvider::new("mail-b", ChannelType::Email, Behavior::Succeed)))
            .unwrap();

        assert_eq!(registry.resolve(ChannelType::Email).unwrap().name(), "mail-a");
        assert_eq!(registry.providers_for(ChannelType::Email).len(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_list_sorted_by_channel() {
        let registry = ProviderRegistry::new();
        registry
            .register(Arc::new(ScriptedProvider::new("chat", ChannelType::Chat, Behavior::Succeed)))
            .unwrap();
        registry
            .register(Arc::new(ScriptedProvider::new("sms", ChannelType::Sms, Behavior::Succeed)))
            .unwrap();

        let listed = registry.list();
        assert_eq!(
            listed,
            vec![
                (ChannelType::Sms, "sms".to_string()),
                (ChannelType::Chat, "chat".to_string())
            ]
        );
    }
}
