// ABOUTME: Serde data models for stored accounts and cached tokens
// ABOUTME: Field names match the camelCase layout of the on-disk store

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// One connected Google identity, keyed by `profile.id` in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub refresh_token: String,
    pub profile: AccountProfile,
    pub granted_at: DateTime<Utc>,
}

impl AccountRecord {
    pub fn new(refresh_token: impl Into<String>, profile: AccountProfile) -> Self {
        AccountRecord {
            refresh_token: refresh_token.into(),
            profile,
            granted_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.profile.id
    }
}

/// A derived token together with the moment it was minted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedToken {
    pub token: String,
    pub obtained_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(token: impl Into<String>) -> Self {
        CachedToken {
            token: token.into(),
            obtained_at: Utc::now(),
        }
    }

    /// Fresh while strictly younger than `window`. A timestamp in the future
    /// (clock skew, hand-edited store) is never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let age = now.signed_duration_since(self.obtained_at);
        age >= Duration::zero() && age < window
    }
}
