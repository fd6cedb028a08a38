//! Types for push notifications

use serde::{Deserialize, Serialize};

/// Keys for a push subscription (from browser)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// The subscriber's uncompressed P-256 public key, base64url encoded
    pub p256dh: String,
    /// The 16-byte auth secret, base64url encoded
    pub auth: String,
}

/// A browser push subscription as produced by `PushManager.subscribe()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// The push endpoint URL, also the registry key
    pub endpoint: String,
    /// Expiration time in milliseconds since the epoch, if the browser set one
    #[serde(default)]
    pub expiration_time: Option<i64>,
    /// Encryption keys
    pub keys: SubscriptionKeys,
}

impl Subscription {
    /// Create a subscription without an expiration time
    pub fn new(
        endpoint: impl Into<String>,
        p256dh: impl Into<String>,
        auth: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: p256dh.into(),
                auth: auth.into(),
            },
        }
    }
}

/// Body of unsubscribe and status requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEndpoint {
    pub endpoint: String,
}

/// Payload for a push notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification title
    pub title: String,
    /// Notification body text
    pub body: String,
    /// Icon URL (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Tag for notification grouping/replacement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Notification {
    /// Create a new notification payload
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: None,
            tag: None,
        }
    }

    /// Add an icon URL
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Add a tag for notification grouping
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_serializes_only_present_fields() {
        let json = serde_json::to_string(&Notification::new("T", "B")).unwrap();
        assert_eq!(json, r#"{"title":"T","body":"B"}"#);
    }

    #[test]
    fn test_notification_builder() {
        let notification = Notification::new("Title", "Body")
            .with_icon("/icon.png")
            .with_tag("news");

        assert_eq!(notification.icon.as_deref(), Some("/icon.png"));
        assert_eq!(notification.tag.as_deref(), Some("news"));
    }

    #[test]
    fn test_subscription_from_browser_json() {
        let json = r#"{
            "endpoint": "https://fcm.googleapis.com/fcm/send/abc",
            "expirationTime": null,
            "keys": { "p256dh": "BNc", "auth": "tBH" }
        }"#;
        let sub: Subscription = serde_json::from_str(json).unwrap();

        assert_eq!(sub.endpoint, "https://fcm.googleapis.com/fcm/send/abc");
        assert_eq!(sub.expiration_time, None);
        assert_eq!(sub.keys.p256dh, "BNc");
        assert_eq!(sub.keys.auth, "tBH");
    }

    #[test]
    fn test_subscription_without_expiration_field() {
        let json = r#"{"endpoint":"https://e/1","keys":{"p256dh":"a","auth":"b"}}"#;
        let sub: Subscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub, Subscription::new("https://e/1", "a", "b"));
    }
}
