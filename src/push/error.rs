//! Error kinds for the push engine

use thiserror::Error;

/// Result alias used throughout the push engine
pub type Result<T> = std::result::Result<T, PushError>;

/// Failures the encryption and delivery engine can report.
///
/// Each variant is a distinct, loggable outcome. Only `DeliveryInvalid`
/// causes a subscription to be dropped from the registry.
#[derive(Debug, Error)]
pub enum PushError {
    /// Key material could not be decoded or is not a valid P-256 point
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// A cryptographic primitive failed while encrypting a payload
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// The push service reports the endpoint is gone (or it cannot be parsed)
    #[error("Subscription invalid ({endpoint}): {reason}")]
    DeliveryInvalid { endpoint: String, reason: String },

    /// The push service rejected or did not answer this attempt
    #[error("Delivery failed ({endpoint}): {reason}")]
    DeliveryTransient { endpoint: String, reason: String },

    /// Server key files could not be read, parsed or written at startup
    #[error("Server identity initialization failed: {0}")]
    IdentityInitialization(String),
}

impl PushError {
    /// True when the subscription should be purged from the registry
    pub fn is_permanent_subscription_failure(&self) -> bool {
        matches!(self, PushError::DeliveryInvalid { .. })
    }
}
