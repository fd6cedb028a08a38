//! VAPID (Voluntary Application Server Identification, RFC 8292)
//!
//! Tokens are ES256 JWTs signed with the server identity key. A fresh token
//! is signed for every delivery attempt.

use super::error::{PushError, Result};
use super::keys::encode_base64url;
use chrono::{DateTime, Duration, Utc};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use serde::Serialize;
use url::Url;

/// Default token lifetime
pub const DEFAULT_TOKEN_VALIDITY_HOURS: i64 = 12;

/// JWT header; always ES256
const JWT_HEADER: &str = r#"{"typ":"JWT","alg":"ES256"}"#;

#[derive(Debug, Serialize)]
struct Claims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

/// A signed VAPID assertion for one push service origin
#[derive(Debug, Clone)]
pub struct VapidToken {
    pub audience: String,
    pub expires_at: DateTime<Utc>,
    pub subject: String,
    /// Compact JWT (`header.claims.signature`)
    pub token: String,
}

impl VapidToken {
    /// Sign a token for `audience` valid for `validity` from `now`
    pub fn sign(
        signing_key: &SigningKey,
        audience: &str,
        subject: &str,
        validity: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let expires_at = now + validity;
        let claims = Claims {
            aud: audience,
            exp: expires_at.timestamp(),
            sub: subject,
        };
        let claims_json = serde_json::to_vec(&claims)
            .map_err(|e| PushError::Encryption(format!("JWT claims serialization failed: {}", e)))?;

        let signing_input = format!(
            "{}.{}",
            encode_base64url(JWT_HEADER.as_bytes()),
            encode_base64url(&claims_json)
        );
        let signature: Signature = signing_key.sign(signing_input.as_bytes());
        let token = format!(
            "{}.{}",
            signing_input,
            encode_base64url(&signature.to_bytes())
        );

        Ok(Self {
            audience: audience.to_string(),
            expires_at,
            subject: subject.to_string(),
            token,
        })
    }

    /// `Authorization` header value: `vapid t=<jwt>, k=<public key>`
    pub fn authorization_header(&self, public_key_base64: &str) -> String {
        format!("vapid t={}, k={}", self.token, public_key_base64)
    }
}

/// Origin of a push endpoint (`scheme://host[:port]`), the token audience.
///
/// The port is only present when it is not the scheme's default.
pub fn origin_of(endpoint: &str) -> Result<String> {
    let invalid = |reason: String| PushError::DeliveryInvalid {
        endpoint: endpoint.to_string(),
        reason,
    };

    let url = Url::parse(endpoint).map_err(|e| invalid(format!("unparseable endpoint: {}", e)))?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    let host = url
        .host_str()
        .ok_or_else(|| invalid("endpoint has no host".to_string()))?;

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}
