//! Push service facade
//!
//! Owns the server identity, the subscriber registry and the delivery
//! coordinator, and exposes the operations the HTTP layer needs.

use super::delivery::{BroadcastReport, DeliveryCoordinator};
use super::error::Result;
use super::identity::ServerIdentity;
use super::keys::UncompressedPoint;
use super::registry::SubscriberRegistry;
use super::types::{Notification, Subscription};
use crate::config::PushConfig;
use anyhow::Context;
use std::sync::Arc;

pub struct PushService {
    identity: Arc<ServerIdentity>,
    registry: Arc<SubscriberRegistry>,
    coordinator: DeliveryCoordinator,
}

impl PushService {
    pub fn new(registry: Arc<SubscriberRegistry>, coordinator: DeliveryCoordinator) -> Self {
        Self {
            identity: coordinator.identity().clone(),
            registry,
            coordinator,
        }
    }

    /// Load (or generate) the server keys and wire up delivery from `config`.
    ///
    /// Fails if the key files cannot be loaded or written.
    pub fn from_config(config: &PushConfig) -> anyhow::Result<Self> {
        let identity = ServerIdentity::load_or_generate(&config.identity_paths())
            .context("Failed to initialize server identity")?;
        let identity = Arc::new(identity);

        let coordinator = DeliveryCoordinator::new(identity.clone(), config.delivery_options())
            .context("Failed to build push HTTP client")?;

        log::info!("Server public key: {}", identity.public_key_base64());

        Ok(Self {
            identity,
            registry: Arc::new(SubscriberRegistry::new()),
            coordinator,
        })
    }

    /// Add or replace a subscription; returns true if it is new
    pub fn register_subscription(&self, subscription: Subscription) -> bool {
        let added = self.registry.register(subscription);
        log::info!("Subscription added (total: {})", self.registry.len());
        added
    }

    pub fn remove_subscription(&self, endpoint: &str) -> bool {
        let removed = self.registry.remove(endpoint);
        if removed {
            log::info!("Subscription removed (total: {})", self.registry.len());
        }
        removed
    }

    pub fn is_subscribed(&self, endpoint: &str) -> bool {
        self.registry.contains(endpoint)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Encrypt and deliver `notification` to every current subscriber
    pub async fn broadcast(&self, notification: &Notification) -> Result<BroadcastReport> {
        self.coordinator
            .send_to_all(notification, &self.registry)
            .await
    }

    /// Deliver `notification` to one registered endpoint.
    ///
    /// Returns `Ok(false)` if the endpoint is not registered.
    pub async fn send_to(&self, endpoint: &str, notification: &Notification) -> Result<bool> {
        let Some(subscription) = self.registry.get(endpoint) else {
            log::debug!("No subscription for {}", endpoint);
            return Ok(false);
        };
        self.coordinator
            .send_to(notification, &subscription, &self.registry)
            .await?;
        Ok(true)
    }

    /// The 65-byte uncompressed server public key (`applicationServerKey`)
    pub fn server_public_key_bytes(&self) -> UncompressedPoint {
        *self.identity.public_key_uncompressed()
    }

    pub fn server_public_key_base64(&self) -> &str {
        self.identity.public_key_base64()
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }
}
