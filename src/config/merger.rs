// Configuration merging with priority

use super::PushConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Partial configuration for merging
/// Uses Option<T> for all fields to support partial overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialPushConfig {
    pub public_key_path: Option<PathBuf>,
    pub private_key_path: Option<PathBuf>,
    pub vapid_subject: Option<String>,
    pub ttl_seconds: Option<u32>,
    pub token_validity_hours: Option<i64>,
    pub request_timeout_secs: Option<u64>,
    pub max_concurrency: Option<usize>,
    pub padding_target: Option<usize>,
}

impl PartialPushConfig {
    /// Apply the set fields on top of `base`
    /// Priority order: overrides -> base
    pub fn merge_into(self, mut base: PushConfig) -> PushConfig {
        if let Some(v) = self.public_key_path {
            base.public_key_path = v;
        }
        if let Some(v) = self.private_key_path {
            base.private_key_path = v;
        }
        if let Some(v) = self.vapid_subject {
            base.vapid_subject = v;
        }
        if let Some(v) = self.ttl_seconds {
            base.ttl_seconds = v;
        }
        if let Some(v) = self.token_validity_hours {
            base.token_validity_hours = v;
        }
        if let Some(v) = self.request_timeout_secs {
            base.request_timeout_secs = v;
        }
        if let Some(v) = self.max_concurrency {
            base.max_concurrency = v;
        }
        if let Some(v) = self.padding_target {
            base.padding_target = v;
        }
        base
    }
}
