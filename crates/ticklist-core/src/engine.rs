//! The synchronization engine
//!
//! Reconciles the local snapshot with the backend while tolerating an
//! unreliable network and concurrent writers on other devices.
//!
//! ## Lifecycle
//!
//! `start()` runs the initial pull-merge, opens one change subscription per
//! collection, and spawns the periodic push loop. `stop()` aborts every
//! background task. Both are driven by session transitions.
//!
//! ## Consistency policy
//!
//! On the initial pull, the cloud wins whenever it has any row for a
//! collection, even an explicitly empty one; local data is pushed up only
//! when the cloud has no row at all. A device signing in therefore converges
//! to the account's state instead of clobbering it with stale cache.
//!
//! Afterwards, pushes are fingerprint-gated (identical content is never
//! re-pushed) and serialized (a request arriving while one is in flight is
//! dropped). Incoming change notifications are discarded while the last
//! local write to that collection is younger than the guard window; such a
//! notification is presumed to be the echo of this device's own push. The
//! guard is a heuristic: a genuine concurrent edit inside the window is
//! dropped until the next notification, and extreme clock skew can misfire
//! it. Surviving notifications are merged record-by-record and announced
//! with a snapshot-replaced event so every view re-reads consistent state.
//!
//! All failures on the sync path are absorbed here: they are logged, drive
//! the state to offline, and never propagate to callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{Collection, Record};
use crate::remote::{ChangeEvent, RemoteData, RemoteStore};
use crate::session::SessionHandle;
use crate::store::SharedStore;

/// Engine state, published to observers
///
/// `Offline` is both the initial state and the recovery state after any
/// failure; it is never terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Not syncing (initial state, or a failure occurred)
    Offline,
    /// A pull-merge or push is in flight
    Syncing,
    /// Subscriptions are open, push loop running
    Online,
    /// Last push acknowledged, nothing pending
    Synced,
}

/// Events emitted by the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// State changed
    StateChanged(SyncState),
    /// A collection was replaced or merged from a remote-origin change;
    /// views must re-read the snapshot in full
    SnapshotReplaced(Collection),
    /// Views must tear down and re-read everything (sign-in/out)
    ReloadRequired,
    /// A sync-path failure was absorbed
    Error(String),
}

/// Engine tunables
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Interval between periodic push cycles
    pub push_interval: std::time::Duration,
    /// Window after a local write during which matching notifications are
    /// treated as self-echoes
    pub guard_window: chrono::Duration,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            push_interval: config.push_interval(),
            guard_window: config.guard_window(),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            push_interval: std::time::Duration::from_secs(10),
            guard_window: chrono::Duration::seconds(2),
        }
    }
}

struct EngineShared {
    store: SharedStore,
    remote: Arc<dyn RemoteStore>,
    session: SessionHandle,
    options: SyncOptions,
    state_tx: watch::Sender<SyncState>,
    state_rx: watch::Receiver<SyncState>,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
    event_rx: StdMutex<Option<mpsc::UnboundedReceiver<EngineEvent>>>,
    /// Serializes pushes; a request arriving while set is dropped
    pushing: AtomicBool,
    last_synced: StdMutex<Option<DateTime<Utc>>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

/// The synchronization engine
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineShared>,
}

impl SyncEngine {
    /// Create an engine; nothing runs until `start()`
    pub fn new(
        store: SharedStore,
        remote: Arc<dyn RemoteStore>,
        session: SessionHandle,
        options: SyncOptions,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SyncState::Offline);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(EngineShared {
                store,
                remote,
                session,
                options,
                state_tx,
                state_rx,
                event_tx,
                event_rx: StdMutex::new(Some(event_rx)),
                pushing: AtomicBool::new(false),
                last_synced: StdMutex::new(None),
                tasks: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        *self.inner.state_rx.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state_rx.clone()
    }

    /// Take the event receiver (can only be taken once)
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        self.inner
            .event_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// When the last acknowledged push completed
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        *self
            .inner
            .last_synced
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Ask views to tear down and re-read everything
    pub fn notify_reload(&self) {
        self.emit(EngineEvent::ReloadRequired);
    }

    /// Start the engine: initial pull-merge, subscriptions, push loop
    pub async fn start(&self) {
        self.initialize_sync().await;
    }

    /// Stop every background task
    pub fn stop(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            handle.abort();
        }
        self.set_state(SyncState::Offline);
        debug!("sync engine stopped");
    }

    /// Run the initial sync: pull-merge every collection, open the change
    /// subscriptions, start the push loop, and push once.
    ///
    /// A no-op without a session. Failures leave already-persisted data in
    /// place, set the state to offline, and are not propagated.
    pub async fn initialize_sync(&self) {
        let Some(session) = self.inner.session.current() else {
            debug!("not signed in, skipping sync initialization");
            return;
        };

        // Hold the push guard for the whole initialization
        if self.inner.pushing.swap(true, Ordering::SeqCst) {
            debug!("sync already in flight, dropping initialization");
            return;
        }

        self.set_state(SyncState::Syncing);
        match self.run_initial_sync(&session.user_id).await {
            Ok(()) => {
                self.set_state(SyncState::Online);
                self.spawn_push_loop();
                match self.push_cycle(&session.user_id).await {
                    Ok(()) => {
                        self.set_state(SyncState::Synced);
                        info!("sync initialized");
                    }
                    Err(e) => {
                        warn!("initial push failed: {e:#}");
                        self.emit(EngineEvent::Error(format!("{e:#}")));
                        self.set_state(SyncState::Offline);
                    }
                }
            }
            Err(e) => {
                warn!("sync initialization failed: {e:#}");
                self.emit(EngineEvent::Error(format!("{e:#}")));
                self.set_state(SyncState::Offline);
            }
        }
        self.inner.pushing.store(false, Ordering::SeqCst);
    }

    async fn run_initial_sync(&self, user_id: &str) -> Result<()> {
        for collection in Collection::ALL {
            let fetched = self
                .inner
                .remote
                .fetch(collection, user_id)
                .await
                .with_context(|| format!("failed to fetch {collection}"))?;

            match fetched {
                // No row at all: this account has never stored the
                // collection, so local cache becomes the seed
                RemoteData::Absent => {
                    let local: Vec<Record> = {
                        let store = self.inner.store.lock().await;
                        store.snapshot().collection(collection).to_vec()
                    };
                    if !local.is_empty() {
                        self.inner
                            .remote
                            .upsert(collection, user_id, &local, Utc::now())
                            .await
                            .with_context(|| format!("failed to seed {collection}"))?;
                        debug!(%collection, records = local.len(), "seeded cloud from local data");
                    }
                }
                // Any present row wins outright, an empty one included
                fetched => {
                    let records = fetched.into_records().unwrap_or_default();
                    debug!(%collection, records = records.len(), "cloud copy is authoritative");
                    {
                        let mut store = self.inner.store.lock().await;
                        store
                            .replace_from_remote(collection, records)
                            .with_context(|| format!("failed to persist pulled {collection}"))?;
                    }
                    self.emit(EngineEvent::SnapshotReplaced(collection));
                }
            }
        }

        for collection in Collection::ALL {
            let rx = self
                .inner
                .remote
                .subscribe(collection, user_id)
                .await
                .with_context(|| format!("failed to subscribe to {collection}"))?;
            self.spawn_change_consumer(collection, rx);
        }

        Ok(())
    }

    /// Request a push of local changes
    ///
    /// Dropped if a push is already in flight. Skipped if the snapshot
    /// fingerprint matches the last acknowledged push. Failures drive the
    /// state to offline and are not propagated.
    pub async fn request_sync(&self) {
        let Some(session) = self.inner.session.current() else {
            debug!("not signed in, ignoring sync request");
            return;
        };

        if self.inner.pushing.swap(true, Ordering::SeqCst) {
            debug!("push already in flight, dropping sync request");
            return;
        }

        let result = self.push_cycle(&session.user_id).await;
        self.inner.pushing.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => self.set_state(SyncState::Synced),
            Err(e) => {
                warn!("push cycle failed: {e:#}");
                self.emit(EngineEvent::Error(format!("{e:#}")));
                self.set_state(SyncState::Offline);
            }
        }
    }

    /// One push cycle: fingerprint gate, then upsert every non-empty
    /// collection and record the fingerprint.
    async fn push_cycle(&self, user_id: &str) -> Result<()> {
        let (fingerprint, collections) = {
            let store = self.inner.store.lock().await;
            let fingerprint = store.fingerprint();
            if store.snapshot().meta.last_synced_hash.as_deref() == Some(fingerprint.as_str()) {
                debug!("snapshot unchanged since last push, skipping");
                return Ok(());
            }
            let collections: Vec<(Collection, Vec<Record>)> = Collection::ALL
                .iter()
                .map(|&c| (c, store.snapshot().collection(c).to_vec()))
                .filter(|(_, records)| !records.is_empty())
                .collect();
            (fingerprint, collections)
        };

        self.set_state(SyncState::Syncing);

        let pushed_at = Utc::now();
        for (collection, records) in &collections {
            self.inner
                .remote
                .upsert(*collection, user_id, records, pushed_at)
                .await
                .with_context(|| format!("failed to push {collection}"))?;
        }

        {
            let mut store = self.inner.store.lock().await;
            store
                .record_push(fingerprint, pushed_at)
                .context("failed to record push")?;
        }
        *self
            .inner
            .last_synced
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(pushed_at);

        debug!(collections = collections.len(), "push cycle complete");
        Ok(())
    }

    /// Apply one change notification
    ///
    /// Notifications without a data field are ignored. Notifications landing
    /// inside the guard window after a local write are presumed echoes of
    /// this device's own push and discarded. Everything else is merged and
    /// announced.
    async fn handle_remote_change(&self, collection: Collection, event: ChangeEvent) {
        let Some(records) = event.data else {
            debug!(%collection, "ignoring change notification without data");
            return;
        };

        let mut store = self.inner.store.lock().await;

        if let Some(last_write) = store.snapshot().last_local_write_at(collection) {
            let age = Utc::now().signed_duration_since(last_write);
            if age < self.inner.options.guard_window {
                debug!(%collection, "discarding change notification inside guard window");
                return;
            }
        }

        info!(%collection, records = records.len(), "applying remote change");
        if let Err(e) = store.merge_from_remote(collection, records) {
            warn!(%collection, "failed to apply remote change: {e}");
            self.emit(EngineEvent::Error(e.to_string()));
            return;
        }
        drop(store);

        self.emit(EngineEvent::SnapshotReplaced(collection));
    }

    fn spawn_change_consumer(
        &self,
        collection: Collection,
        mut rx: mpsc::UnboundedReceiver<ChangeEvent>,
    ) {
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                engine.handle_remote_change(collection, event).await;
            }
            debug!(%collection, "change subscription closed");
        });
        self.track(handle);
    }

    fn spawn_push_loop(&self) {
        let engine = self.clone();
        let interval = self.inner.options.push_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; initialization already
            // pushed, so skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(session) = engine.inner.session.current() else {
                    continue;
                };
                if !session.auto_sync_enabled() {
                    continue;
                }
                engine.request_sync().await;
            }
        });
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    fn set_state(&self, state: SyncState) {
        let changed = self.state() != state;
        let _ = self.inner.state_tx.send(state);
        if changed {
            self.emit(EngineEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.inner.event_tx.send(event);
    }
}
