//! In-memory backend
//!
//! Backs the test suite and offline development. Behaves like the hosted
//! backend in the one way that matters for sync correctness: an upsert is
//! echoed to every subscriber of that (collection, user) pair, including the
//! writer itself. Failure injection covers the transient-error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::{
    AuthBackend, AuthUser, ChangeEvent, Profile, RemoteData, RemoteStore, Subscription,
    UsageEvent,
};
use crate::error::RemoteError;
use crate::models::{Collection, Record};

#[derive(Debug, Clone)]
struct StoredRow {
    records: Vec<Record>,
    updated_at: DateTime<Utc>,
}

type RowKey = (Collection, String);

#[derive(Default)]
struct Inner {
    rows: HashMap<RowKey, StoredRow>,
    profiles: HashMap<String, Profile>,
    subscriptions: HashMap<String, Subscription>,
    events: Vec<UsageEvent>,
    subscribers: HashMap<RowKey, Vec<mpsc::UnboundedSender<ChangeEvent>>>,
    upsert_counts: HashMap<Collection, usize>,
}

/// In-memory implementation of the backend contract
#[derive(Default)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
    fail_fetches: AtomicBool,
    fail_upserts: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Place a row without notifying subscribers (simulates pre-existing
    /// cloud state)
    pub fn seed(&self, collection: Collection, user_id: &str, records: Vec<Record>) {
        self.lock().rows.insert(
            (collection, user_id.to_string()),
            StoredRow {
                records,
                updated_at: Utc::now(),
            },
        );
    }

    /// Place an empty-but-present row
    pub fn seed_empty(&self, collection: Collection, user_id: &str) {
        self.seed(collection, user_id, Vec::new());
    }

    /// Current row contents, if a row exists
    pub fn rows(&self, collection: Collection, user_id: &str) -> Option<Vec<Record>> {
        self.lock()
            .rows
            .get(&(collection, user_id.to_string()))
            .map(|row| row.records.clone())
    }

    /// When the row was last written, if a row exists
    pub fn row_updated_at(&self, collection: Collection, user_id: &str) -> Option<DateTime<Utc>> {
        self.lock()
            .rows
            .get(&(collection, user_id.to_string()))
            .map(|row| row.updated_at)
    }

    /// How many upserts hit this collection
    pub fn upsert_count(&self, collection: Collection) -> usize {
        self.lock()
            .upsert_counts
            .get(&collection)
            .copied()
            .unwrap_or(0)
    }

    /// Recorded usage events
    pub fn events(&self) -> Vec<UsageEvent> {
        self.lock().events.clone()
    }

    /// Stored profile, if one was created
    pub fn profile(&self, user_id: &str) -> Option<Profile> {
        self.lock().profiles.get(user_id).cloned()
    }

    /// Place a subscription row
    pub fn seed_subscription(&self, subscription: Subscription) {
        self.lock()
            .subscriptions
            .insert(subscription.user_id.clone(), subscription);
    }

    /// Make fetches fail with a transport error
    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Make upserts fail with a transport error
    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Deliver a raw change notification, as another device's write would
    pub fn emit_change(
        &self,
        collection: Collection,
        user_id: &str,
        data: Option<Vec<Record>>,
    ) {
        let event = ChangeEvent {
            collection,
            data,
            updated_at: Some(Utc::now()),
        };
        self.notify(collection, user_id, event);
    }

    fn notify(&self, collection: Collection, user_id: &str, event: ChangeEvent) {
        let mut inner = self.lock();
        if let Some(senders) = inner
            .subscribers
            .get_mut(&(collection, user_id.to_string()))
        {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch(
        &self,
        collection: Collection,
        user_id: &str,
    ) -> Result<RemoteData, RemoteError> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("injected fetch failure".into()));
        }
        let rows = self
            .lock()
            .rows
            .get(&(collection, user_id.to_string()))
            .map(|row| row.records.clone());
        Ok(RemoteData::from_rows(rows))
    }

    async fn upsert(
        &self,
        collection: Collection,
        user_id: &str,
        records: &[Record],
        updated_at: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("injected upsert failure".into()));
        }

        {
            let mut inner = self.lock();
            inner.rows.insert(
                (collection, user_id.to_string()),
                StoredRow {
                    records: records.to_vec(),
                    updated_at,
                },
            );
            *inner.upsert_counts.entry(collection).or_insert(0) += 1;
        }

        // The backend echoes every write back to subscribers, this client
        // included
        self.notify(
            collection,
            user_id,
            ChangeEvent {
                collection,
                data: Some(records.to_vec()),
                updated_at: Some(updated_at),
            },
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: Collection,
        user_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<ChangeEvent>, RemoteError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock()
            .subscribers
            .entry((collection, user_id.to_string()))
            .or_default()
            .push(tx);
        Ok(rx)
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, RemoteError> {
        Ok(self.lock().profiles.get(user_id).cloned())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), RemoteError> {
        self.lock()
            .profiles
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn touch_last_login(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        if let Some(profile) = self.lock().profiles.get_mut(user_id) {
            profile.last_login = at;
        }
        Ok(())
    }

    async fn fetch_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, RemoteError> {
        Ok(self
            .lock()
            .subscriptions
            .get(user_id)
            .filter(|s| s.status == "active")
            .cloned())
    }

    async fn record_event(&self, event: &UsageEvent) -> Result<(), RemoteError> {
        self.lock().events.push(event.clone());
        Ok(())
    }
}

/// In-memory auth backend for tests
#[derive(Default)]
pub struct MemoryAuth {
    user: Mutex<Option<AuthUser>>,
    fail_sign_out: AtomicBool,
    sign_out_calls: AtomicUsize,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// An auth backend with a live session for the given user
    pub fn signed_in(user_id: &str, email: &str) -> Self {
        let auth = Self::new();
        auth.set_user(Some(AuthUser {
            id: user_id.to_string(),
            email: email.to_string(),
            full_name: String::new(),
            avatar_url: String::new(),
        }));
        auth
    }

    pub fn set_user(&self, user: Option<AuthUser>) {
        let mut guard = self.user.lock().unwrap_or_else(|e| e.into_inner());
        *guard = user;
    }

    pub fn set_fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthBackend for MemoryAuth {
    async fn current_session(&self) -> Result<Option<AuthUser>, RemoteError> {
        Ok(self
            .user
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn sign_in_url(&self, provider: &str) -> String {
        format!("https://auth.invalid/authorize?provider={provider}")
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("injected sign-out failure".into()));
        }
        self.set_user(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> Record {
        Record::from_value(json!({"id": id})).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_tri_state() {
        let remote = MemoryRemote::new();
        assert_eq!(
            remote.fetch(Collection::Tasks, "u-1").await.unwrap(),
            RemoteData::Absent
        );

        remote.seed_empty(Collection::Tasks, "u-1");
        assert_eq!(
            remote.fetch(Collection::Tasks, "u-1").await.unwrap(),
            RemoteData::Empty
        );

        remote.seed(Collection::Tasks, "u-1", vec![record("a")]);
        assert!(matches!(
            remote.fetch(Collection::Tasks, "u-1").await.unwrap(),
            RemoteData::Records(_)
        ));
    }

    #[tokio::test]
    async fn test_upsert_echoes_to_subscribers() {
        let remote = MemoryRemote::new();
        let mut rx = remote.subscribe(Collection::Tasks, "u-1").await.unwrap();

        remote
            .upsert(Collection::Tasks, "u-1", &[record("a")], Utc::now())
            .await
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.collection, Collection::Tasks);
        assert_eq!(event.data.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_is_scoped_to_user() {
        let remote = MemoryRemote::new();
        let mut other = remote.subscribe(Collection::Tasks, "u-2").await.unwrap();

        remote
            .upsert(Collection::Tasks, "u-1", &[record("a")], Utc::now())
            .await
            .unwrap();

        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let remote = MemoryRemote::new();
        remote.set_fail_upserts(true);

        let result = remote
            .upsert(Collection::Tasks, "u-1", &[record("a")], Utc::now())
            .await;
        assert!(matches!(result, Err(RemoteError::Transport(_))));
        assert_eq!(remote.upsert_count(Collection::Tasks), 0);
    }

    #[tokio::test]
    async fn test_subscription_requires_active_status() {
        let remote = MemoryRemote::new();
        remote.seed_subscription(Subscription {
            user_id: "u-1".to_string(),
            status: "canceled".to_string(),
        });
        assert!(remote.fetch_subscription("u-1").await.unwrap().is_none());

        remote.seed_subscription(Subscription {
            user_id: "u-1".to_string(),
            status: "active".to_string(),
        });
        assert!(remote.fetch_subscription("u-1").await.unwrap().is_some());
    }
}
