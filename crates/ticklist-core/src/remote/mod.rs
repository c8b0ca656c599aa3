//! Remote backend contract
//!
//! The backend stores one row per (user, collection): `{user_id, data,
//! updated_at}` where `data` is the full JSON array of records. Profiles,
//! subscription status, and usage events are separate per-user rows.
//!
//! The sync engine depends only on the traits here. `RestRemote` talks to
//! the hosted backend; `MemoryRemote` backs tests and offline development.
//!
//! A fetched collection is a tri-state: the difference between "no row at
//! all" and "a row holding an empty collection" decides whether local data
//! is pushed up or overwritten on sign-in, so it must never be collapsed
//! into a plain option.

mod memory;
mod message;
mod rest;

pub use memory::{MemoryAuth, MemoryRemote};
pub use rest::RestRemote;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RemoteError;
use crate::models::{Collection, Record};

/// Result of fetching a user's collection row
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteData {
    /// No row exists for this user
    Absent,
    /// A row exists but holds an empty collection
    Empty,
    /// A row exists with records
    Records(Vec<Record>),
}

impl RemoteData {
    /// Build from an optional payload; `Some(vec![])` maps to `Empty`
    pub fn from_rows(rows: Option<Vec<Record>>) -> Self {
        match rows {
            None => RemoteData::Absent,
            Some(records) if records.is_empty() => RemoteData::Empty,
            Some(records) => RemoteData::Records(records),
        }
    }

    /// Whether a row exists at all, even an empty one
    pub fn is_present(&self) -> bool {
        !matches!(self, RemoteData::Absent)
    }

    /// The records, if a row exists; `Empty` yields an empty vector
    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            RemoteData::Absent => None,
            RemoteData::Empty => Some(Vec::new()),
            RemoteData::Records(records) => Some(records),
        }
    }
}

/// One change notification from the backend
///
/// Delivery may duplicate or reorder events; the idempotent re-merge on the
/// receiving side covers both.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub collection: Collection,
    /// Full row payload; `None` when the notification carried no data field
    pub data: Option<Vec<Record>>,
    /// Row timestamp, when the notification carried one
    pub updated_at: Option<DateTime<Utc>>,
}

/// Per-user profile settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub theme: String,
    pub notifications: bool,
    pub auto_sync: bool,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            notifications: true,
            auto_sync: true,
        }
    }
}

/// Per-user profile row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Matches the user id
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default = "default_tier")]
    pub subscription_tier: String,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    #[serde(default)]
    pub settings: ProfileSettings,
}

fn default_tier() -> String {
    "free".to_string()
}

impl Profile {
    /// A fresh profile with default settings for a just-signed-in user
    pub fn new_default(user: &AuthUser, now: DateTime<Utc>) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            avatar_url: user.avatar_url.clone(),
            subscription_tier: default_tier(),
            created_at: now,
            last_login: now,
            settings: ProfileSettings::default(),
        }
    }
}

/// Per-user subscription row; absence is the normal free-tier outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: String,
    pub status: String,
}

/// One usage event, appended fire-and-forget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub user_id: String,
    pub event_name: String,
    pub properties: Value,
    pub created_at: DateTime<Utc>,
}

/// The signed-in principal as reported by the auth backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// Capability to read and write per-user rows on the backend
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a user's collection row. Absence is an expected outcome and is
    /// distinct from a present-but-empty collection.
    async fn fetch(
        &self,
        collection: Collection,
        user_id: &str,
    ) -> Result<RemoteData, RemoteError>;

    /// Replace the user's collection row. Idempotent: repeated calls with
    /// the same user replace the prior row.
    async fn upsert(
        &self,
        collection: Collection,
        user_id: &str,
        records: &[Record],
        updated_at: DateTime<Utc>,
    ) -> Result<(), RemoteError>;

    /// Open a change-notification stream for one collection, scoped to the
    /// user. Every insert/update/delete for the user's row is delivered,
    /// including echoes of this client's own writes.
    async fn subscribe(
        &self,
        collection: Collection,
        user_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<ChangeEvent>, RemoteError>;

    /// Fetch the user's profile row; `None` for a first sign-in
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, RemoteError>;

    /// Create or replace the user's profile row
    async fn upsert_profile(&self, profile: &Profile) -> Result<(), RemoteError>;

    /// Bump the profile's last-login stamp
    async fn touch_last_login(&self, user_id: &str, at: DateTime<Utc>)
        -> Result<(), RemoteError>;

    /// Fetch the user's active subscription; `None` is the normal free-tier
    /// outcome, not an error
    async fn fetch_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, RemoteError>;

    /// Append a usage event
    async fn record_event(&self, event: &UsageEvent) -> Result<(), RemoteError>;
}

/// Capability to resolve and end the signed-in session
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Query the backend for an existing session; `None` means signed out
    /// and is not an error
    async fn current_session(&self) -> Result<Option<AuthUser>, RemoteError>;

    /// URL starting the provider's redirect-based sign-in flow. No local
    /// state changes until the provider hands a token back.
    fn sign_in_url(&self, provider: &str) -> String;

    /// End the backend session
    async fn sign_out(&self) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_data_tri_state() {
        assert_eq!(RemoteData::from_rows(None), RemoteData::Absent);
        assert_eq!(RemoteData::from_rows(Some(vec![])), RemoteData::Empty);

        let record = Record::from_value(json!({"id": "a"})).unwrap();
        let data = RemoteData::from_rows(Some(vec![record.clone()]));
        assert_eq!(data, RemoteData::Records(vec![record]));
    }

    #[test]
    fn test_remote_data_presence() {
        assert!(!RemoteData::Absent.is_present());
        assert!(RemoteData::Empty.is_present());
        assert!(RemoteData::Absent.into_records().is_none());
        assert_eq!(RemoteData::Empty.into_records(), Some(vec![]));
    }

    #[test]
    fn test_default_profile() {
        let user = AuthUser {
            id: "u-1".to_string(),
            email: "a@example.com".to_string(),
            full_name: "A".to_string(),
            avatar_url: String::new(),
        };
        let profile = Profile::new_default(&user, Utc::now());

        assert_eq!(profile.id, "u-1");
        assert_eq!(profile.subscription_tier, "free");
        assert_eq!(profile.settings.theme, "light");
        assert!(profile.settings.notifications);
        assert!(profile.settings.auto_sync);
    }
}
