//! Push notification sender
//!
//! Encrypts a notification for every registered subscription, POSTs it to the
//! subscription's push service with a VAPID authorization, and drops the
//! subscriptions the push service reports as gone.

use super::encryption::{self, EncryptedPayload};
use super::error::{PushError, Result};
use super::identity::ServerIdentity;
use super::registry::SubscriberRegistry;
use super::types::{Notification, Subscription};
use super::vapid::{origin_of, VapidToken, DEFAULT_TOKEN_VALIDITY_HOURS};
use futures_util::stream::{self, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Content coding of every push body
pub const CONTENT_ENCODING_AES128GCM: &str = "aes128gcm";

/// Tunables for the delivery pass
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    /// Contact URI placed in the VAPID `sub` claim
    pub subject: String,
    /// Value of the `TTL` header in seconds
    pub ttl_seconds: u32,
    /// Lifetime of each VAPID token
    pub token_validity: chrono::Duration,
    /// Upper bound for a single push request
    pub request_timeout: Duration,
    /// Number of deliveries in flight at once
    pub max_concurrency: usize,
    /// Plaintext padding target passed to the encryption step
    pub padding_target: usize,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            subject: "mailto:example@example.com".to_string(),
            ttl_seconds: 180,
            token_validity: chrono::Duration::hours(DEFAULT_TOKEN_VALIDITY_HOURS),
            request_timeout: Duration::from_secs(10),
            max_concurrency: 16,
            padding_target: 0,
        }
    }
}

/// How a push service answered one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 201 Created
    Delivered,
    /// 404 or 410: the subscription no longer exists
    Invalid,
    /// Anything else: logged, subscription kept, no retry
    TransientFailure,
}

impl DeliveryOutcome {
    pub fn from_status(status: u16) -> Self {
        match status {
            201 => DeliveryOutcome::Delivered,
            404 | 410 => DeliveryOutcome::Invalid,
            _ => DeliveryOutcome::TransientFailure,
        }
    }
}

/// Result of sending one notification to every subscriber
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReport {
    /// Number of notifications accepted by the push service
    pub delivered: usize,
    /// Number of deliveries that failed but kept their subscription
    pub transient: usize,
    /// Number of subscriptions whose payload could not be encrypted
    pub failed_encryption: usize,
    /// Number of subscriptions the push service reported as gone
    pub invalid: usize,
    /// Number of subscriptions removed (expired/invalid)
    pub removed: usize,
    /// Endpoints removed from the registry after the pass
    pub removed_endpoints: Vec<String>,
}

impl BroadcastReport {
    /// Number of subscriptions this pass attempted
    pub fn attempted(&self) -> usize {
        self.delivered + self.transient + self.failed_encryption + self.invalid
    }
}

/// Encrypts, signs and submits push messages
///
/// Cloning is cheap and shares the identity and HTTP connection pool.
#[derive(Clone)]
pub struct DeliveryCoordinator {
    identity: Arc<ServerIdentity>,
    client: reqwest::Client,
    options: DeliveryOptions,
}

impl DeliveryCoordinator {
    /// Create a coordinator with its own HTTP client
    pub fn new(
        identity: Arc<ServerIdentity>,
        options: DeliveryOptions,
    ) -> std::result::Result<Self, reqwest::Error> {
        // A redirect would turn the POST into a request to some other URL;
        // 3xx answers are classified like any other non-201 status.
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::with_client(identity, options, client))
    }

    /// Create a coordinator around an existing HTTP client
    pub fn with_client(
        identity: Arc<ServerIdentity>,
        options: DeliveryOptions,
        client: reqwest::Client,
    ) -> Self {
        Self {
            identity,
            client,
            options,
        }
    }

    pub fn identity(&self) -> &Arc<ServerIdentity> {
        &self.identity
    }

    pub fn options(&self) -> &DeliveryOptions {
        &self.options
    }

    /// Send `notification` to every subscription in the registry.
    ///
    /// Works on a snapshot taken at call time. Subscriptions reported as gone
    /// are removed in one batch after all deliveries have finished; a failure
    /// for one subscriber never affects the others.
    ///
    /// The pass runs on its own task: dropping the returned future does not
    /// abort deliveries already in flight, and the removal still happens.
    pub async fn send_to_all(
        &self,
        notification: &Notification,
        registry: &Arc<SubscriberRegistry>,
    ) -> Result<BroadcastReport> {
        let subscribers = registry.snapshot();
        if subscribers.is_empty() {
            log::warn!("Subscribers list is empty, push messages won't be sent");
            return Ok(BroadcastReport::default());
        }

        let plaintext = serialize_notification(notification)?;
        let coordinator = self.clone();
        let registry = Arc::clone(registry);
        let pass = tokio::spawn(async move {
            coordinator
                .run_pass(subscribers, plaintext, &registry)
                .await
        });
        join_pass(pass).await
    }

    async fn run_pass(
        &self,
        subscribers: Vec<Subscription>,
        plaintext: Vec<u8>,
        registry: &SubscriberRegistry,
    ) -> BroadcastReport {
        let plaintext: Arc<[u8]> = plaintext.into();

        let results: Vec<(Subscription, Result<()>)> = stream::iter(subscribers)
            .map(|subscription| {
                let coordinator = self.clone();
                let plaintext = Arc::clone(&plaintext);
                async move {
                    let result = coordinator
                        .encrypt_and_deliver(&subscription, &plaintext)
                        .await;
                    (subscription, result)
                }
            })
            .buffer_unordered(self.options.max_concurrency.max(1))
            .collect()
            .await;

        let mut report = BroadcastReport::default();
        let mut invalid = Vec::new();
        for (subscription, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) if e.is_permanent_subscription_failure() => invalid.push(subscription),
                Err(PushError::DeliveryTransient { .. }) => report.transient += 1,
                Err(e) => {
                    log::error!(
                        "Error occurred when encrypting push message for {}: {}",
                        subscription.endpoint,
                        e
                    );
                    report.failed_encryption += 1;
                }
            }
        }

        report.invalid = invalid.len();
        report.removed_endpoints = registry.remove_all(&invalid);
        report.removed = report.removed_endpoints.len();
        for endpoint in &report.removed_endpoints {
            log::info!("Removed subscription {}", endpoint);
        }

        log::info!(
            "Push notification result: {} delivered, {} transient, \
             {} encryption failures, {} removed",
            report.delivered,
            report.transient,
            report.failed_encryption,
            report.removed
        );

        report
    }

    /// Send `notification` to a single subscription.
    ///
    /// Applies the same removal rule as [`send_to_all`](Self::send_to_all)
    /// and, like it, keeps running if the returned future is dropped.
    pub async fn send_to(
        &self,
        notification: &Notification,
        subscription: &Subscription,
        registry: &Arc<SubscriberRegistry>,
    ) -> Result<()> {
        let plaintext = serialize_notification(notification)?;
        let coordinator = self.clone();
        let subscription = subscription.clone();
        let registry = Arc::clone(registry);
        let delivery = tokio::spawn(async move {
            let result = coordinator
                .encrypt_and_deliver(&subscription, &plaintext)
                .await;
            if let Err(e) = &result {
                if e.is_permanent_subscription_failure()
                    && registry.remove_if_current(&subscription)
                {
                    log::info!("Removed subscription {}", subscription.endpoint);
                }
            }
            result
        });
        join_pass(delivery).await?
    }

    /// Encrypt `plaintext` for one subscription
    pub fn encrypt_for(
        &self,
        subscription: &Subscription,
        plaintext: &[u8],
    ) -> Result<EncryptedPayload> {
        encryption::encrypt(
            plaintext,
            &subscription.keys.p256dh,
            &subscription.keys.auth,
            self.options.padding_target,
        )
    }

    async fn encrypt_and_deliver(
        &self,
        subscription: &Subscription,
        plaintext: &[u8],
    ) -> Result<()> {
        let payload = self.encrypt_for(subscription, plaintext)?;
        self.deliver_one(subscription, payload.to_bytes()).await
    }

    /// POST one encrypted body to the subscription's push service.
    ///
    /// `Ok` means 201 Created. `DeliveryInvalid` means the subscription must
    /// be dropped; `DeliveryTransient` covers every other failure.
    pub async fn deliver_one(&self, subscription: &Subscription, body: Vec<u8>) -> Result<()> {
        let endpoint = subscription.endpoint.as_str();
        let origin = origin_of(endpoint).map_err(|e| {
            log::error!("Can't get origin for subscriber: {}", e);
            e
        })?;

        let token = VapidToken::sign(
            self.identity.signing_key(),
            &origin,
            &self.options.subject,
            self.options.token_validity,
            chrono::Utc::now(),
        )?;

        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_ENCODING, CONTENT_ENCODING_AES128GCM)
            .header("TTL", self.options.ttl_seconds.to_string())
            .header(
                AUTHORIZATION,
                token.authorization_header(self.identity.public_key_base64()),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("request timed out after {:?}", self.options.request_timeout)
                } else {
                    format!("request failed: {}", e)
                };
                log::error!("Push request to {} failed: {}", endpoint, reason);
                PushError::DeliveryTransient {
                    endpoint: endpoint.to_string(),
                    reason,
                }
            })?;

        check_status(endpoint, response.status().as_u16())
    }
}

/// Wait for a spawned delivery task, re-raising its panic if it had one
async fn join_pass<T>(task: tokio::task::JoinHandle<T>) -> Result<T> {
    match task.await {
        Ok(value) => Ok(value),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(PushError::DeliveryTransient {
            endpoint: "*".to_string(),
            reason: format!("delivery task cancelled: {}", e),
        }),
    }
}

fn serialize_notification(notification: &Notification) -> Result<Vec<u8>> {
    serde_json::to_vec(notification)
        .map_err(|e| PushError::Encryption(format!("Failed to serialize payload: {}", e)))
}

/// Map a push service status code to the delivery result, logging it
fn check_status(endpoint: &str, status: u16) -> Result<()> {
    match DeliveryOutcome::from_status(status) {
        DeliveryOutcome::Delivered => {
            log::info!("Push message successfully sent: {}", endpoint);
            Ok(())
        }
        DeliveryOutcome::Invalid => {
            log::warn!("Subscription not found or gone ({}): {}", status, endpoint);
            Err(PushError::DeliveryInvalid {
                endpoint: endpoint.to_string(),
                reason: format!("push service answered {}", status),
            })
        }
        DeliveryOutcome::TransientFailure => {
            let reason = match status {
                429 => "Too many requests",
                400 => "Invalid request",
                413 => "Payload size too large",
                _ => "Unhandled status code",
            };
            log::error!("{}: {} / {}", reason, status, endpoint);
            Err(PushError::DeliveryTransient {
                endpoint: endpoint.to_string(),
                reason: format!("{} ({})", reason, status),
            })
        }
    }
}
