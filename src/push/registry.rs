//! In-memory subscriber registry keyed by endpoint
//!
//! Shared between the HTTP handlers and the delivery pass. All operations are
//! safe to call concurrently without external locking.

use super::types::Subscription;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscriptions: DashMap<String, Subscription>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the subscription for its endpoint.
    ///
    /// Returns true if the endpoint was not registered before.
    pub fn register(&self, subscription: Subscription) -> bool {
        let endpoint = subscription.endpoint.clone();
        let added = self.subscriptions.insert(endpoint, subscription).is_none();
        log::debug!("Registered subscription (total: {})", self.subscriptions.len());
        added
    }

    /// Remove a subscription; returns true if it was present
    pub fn remove(&self, endpoint: &str) -> bool {
        self.subscriptions.remove(endpoint).is_some()
    }

    /// Remove `subscription` only if the registry still holds exactly it.
    ///
    /// A re-registration of the same endpoint with new keys is kept.
    pub fn remove_if_current(&self, subscription: &Subscription) -> bool {
        self.subscriptions
            .remove_if(&subscription.endpoint, |_, current| current == subscription)
            .is_some()
    }

    /// Batched [`remove_if_current`](Self::remove_if_current); returns the
    /// endpoints that were actually removed
    pub fn remove_all<'a, I>(&self, subscriptions: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a Subscription>,
    {
        subscriptions
            .into_iter()
            .filter(|subscription| self.remove_if_current(subscription))
            .map(|subscription| subscription.endpoint.clone())
            .collect()
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.subscriptions.contains_key(endpoint)
    }

    pub fn get(&self, endpoint: &str) -> Option<Subscription> {
        self.subscriptions
            .get(endpoint)
            .map(|entry| entry.value().clone())
    }

    /// Point-in-time copy of all subscriptions
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.subscriptions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
