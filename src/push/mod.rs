//! Web Push engine
//!
//! Encrypts notifications per RFC 8291 (aes128gcm), authenticates the server
//! with VAPID (RFC 8292) and delivers to every registered subscription,
//! pruning the ones the push service reports as gone.

pub mod delivery;
pub mod encryption;
pub mod error;
pub mod identity;
pub mod keys;
pub mod registry;
pub mod service;
pub mod types;
pub mod vapid;

pub use delivery::{BroadcastReport, DeliveryCoordinator, DeliveryOptions, DeliveryOutcome};
pub use encryption::{decrypt, encrypt, EncryptedPayload};
pub use error::{PushError, Result};
pub use identity::{IdentityPaths, ServerIdentity};
pub use keys::UncompressedPoint;
pub use registry::SubscriberRegistry;
pub use service::PushService;
pub use types::{Notification, Subscription, SubscriptionEndpoint, SubscriptionKeys};
pub use vapid::{origin_of, VapidToken};
