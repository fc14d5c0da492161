use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashSet;

use crate::metrics::WebhookMetrics;

/// Set of nonces already accepted by [`validate_signature`].
///
/// Bounded by clearing the whole set once it holds `max_nonces` entries.
///
/// [`validate_signature`]: super::WebhookDispatcher::validate_signature
pub struct NonceStore {
    seen: DashSet<String>,
    max_nonces: usize,
    clears: AtomicU64,
}

impl NonceStore {
    pub fn new(max_nonces: usize) -> Self {
        Self {
            seen: DashSet::new(),
            max_nonces: max_nonces.max(1),
            clears: AtomicU64::new(0),
        }
    }

    /// Record a nonce. Returns `false` if it was already present.
    pub fn insert(&self, nonce: &str) -> bool {
        if self.seen.len() >= self.max_nonces {
            self.seen.clear();
            self.clears.fetch_add(1, Ordering::Relaxed);
            WebhookMetrics::record_nonce_clear();
            tracing::warn!(
                max_nonces = self.max_nonces,
                "Nonce store reached its limit and was cleared"
            );
        }
        self.seen.insert(nonce.to_string())
    }

    pub fn contains(&self, nonce: &str) -> bool {
        self.seen.contains(nonce)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clears(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }
}
