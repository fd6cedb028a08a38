// Push server configuration
//
// Read from an optional TOML file, then overridden from the command line
// (see merger.rs). Every field has a default so an empty file is valid.

mod merger;

pub use merger::PartialPushConfig;

use crate::push::{DeliveryOptions, IdentityPaths};
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// RFC 8292 caps VAPID token validity at 24 hours
pub const MAX_TOKEN_VALIDITY_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// X.509 SubjectPublicKeyInfo DER file holding the server public key
    pub public_key_path: PathBuf,
    /// PKCS#8 DER file holding the server private key
    pub private_key_path: PathBuf,
    /// Contact URI sent as the VAPID `sub` claim
    pub vapid_subject: String,
    pub ttl_seconds: u32,
    pub token_validity_hours: i64,
    pub request_timeout_secs: u64,
    /// Deliveries in flight at once during a broadcast
    pub max_concurrency: usize,
    /// Pad plaintexts up to this many bytes (0 = no padding)
    pub padding_target: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            public_key_path: PathBuf::from("keys/server_public.der"),
            private_key_path: PathBuf::from("keys/server_private.der"),
            vapid_subject: "mailto:example@example.com".to_string(),
            ttl_seconds: 180,
            token_validity_hours: 12,
            request_timeout_secs: 10,
            max_concurrency: 16,
            padding_target: 0,
        }
    }
}

impl PushConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        Self::from_toml_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config file '{}': {}", path.display(), e))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Check values that would make the server misbehave at runtime
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            bail!("max_concurrency must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }
        if !(1..=MAX_TOKEN_VALIDITY_HOURS).contains(&self.token_validity_hours) {
            bail!(
                "token_validity_hours must be between 1 and {}, got {}",
                MAX_TOKEN_VALIDITY_HOURS,
                self.token_validity_hours
            );
        }
        if self.vapid_subject.trim().is_empty() {
            bail!("vapid_subject must not be empty");
        }
        Ok(())
    }

    pub fn identity_paths(&self) -> IdentityPaths {
        IdentityPaths::new(&self.public_key_path, &self.private_key_path)
    }

    pub fn delivery_options(&self) -> DeliveryOptions {
        DeliveryOptions {
            subject: self.vapid_subject.clone(),
            ttl_seconds: self.ttl_seconds,
            token_validity: chrono::Duration::hours(self.token_validity_hours),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_concurrency: self.max_concurrency,
            padding_target: self.padding_target,
        }
    }
}
