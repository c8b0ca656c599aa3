//! Service wiring
//!
//! Builds the store, identity session, sync engine, and telemetry at process
//! start and wires them together by reference. Session transitions drive the
//! engine: a resumed session starts it, sign-out stops it. Views that need a
//! full refresh listen for the engine's reload event, which sign-in delays
//! by a grace window so the initial pull-merge is not torn down mid-flight.

use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::engine::{SyncEngine, SyncOptions};
use crate::error::StoreError;
use crate::remote::{AuthBackend, RemoteStore};
use crate::session::{IdentitySession, Session};
use crate::store::{SharedStore, SnapshotStore};
use crate::telemetry::UsageTelemetry;

/// The application's long-lived services, wired together
pub struct Services {
    pub config: Config,
    pub store: SharedStore,
    pub session: Arc<IdentitySession>,
    pub engine: SyncEngine,
    pub telemetry: UsageTelemetry,
}

impl Services {
    /// Construct every service against the given backend
    pub fn new(
        config: Config,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthBackend>,
    ) -> Result<Self, StoreError> {
        let store = SnapshotStore::open_shared(config.clone())?;
        let session = Arc::new(IdentitySession::new(auth, remote.clone(), store.clone()));
        let engine = SyncEngine::new(
            store.clone(),
            remote.clone(),
            session.handle(),
            SyncOptions::from_config(&config),
        );
        let telemetry = UsageTelemetry::spawn(remote, session.handle());

        Ok(Self {
            config,
            store,
            session,
            engine,
            telemetry,
        })
    }

    /// Resume the session and, when signed in, start the engine
    ///
    /// The reload request that follows a sign-in is deferred by the grace
    /// window so the initial pull-merge can finish first.
    pub async fn start(&self) -> Option<Session> {
        let session = match self.session.resume().await {
            Ok(session) => session,
            Err(e) => {
                warn!("session resume failed: {e}");
                None
            }
        };

        if session.is_some() && self.config.sync_enabled {
            self.engine.start().await;

            let engine = self.engine.clone();
            let grace = self.config.sign_in_grace();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                engine.notify_reload();
            });
        }

        session
    }

    /// Sign out: backup, clear identity, stop the engine, request a reload
    pub async fn sign_out(&self) {
        self.session.sign_out().await;
        self.engine.stop();
        self.engine.notify_reload();
    }

    /// Tear down background tasks
    pub fn shutdown(&self) {
        self.engine.stop();
        self.telemetry.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineEvent, SyncState};
    use crate::models::Collection;
    use crate::remote::{MemoryAuth, MemoryRemote};
    use tempfile::TempDir;

    fn test_services(auth: MemoryAuth) -> (TempDir, Arc<MemoryRemote>, Services) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            sync_enabled: true,
            sign_in_grace_ms: 10,
            ..Config::default()
        };
        let remote = Arc::new(MemoryRemote::new());
        let services = Services::new(config, remote.clone(), Arc::new(auth)).unwrap();
        (temp_dir, remote, services)
    }

    #[tokio::test]
    async fn test_start_without_session_leaves_engine_offline() {
        let (_tmp, remote, services) = test_services(MemoryAuth::new());

        let session = services.start().await;
        assert!(session.is_none());
        assert_eq!(services.engine.state(), SyncState::Offline);
        assert_eq!(remote.upsert_count(Collection::Categories), 0);

        services.shutdown();
    }

    #[tokio::test]
    async fn test_start_with_session_runs_initial_sync() {
        let (_tmp, remote, services) =
            test_services(MemoryAuth::signed_in("u-1", "a@example.com"));
        let mut events = services.engine.take_events().unwrap();

        let session = services.start().await;
        assert!(session.is_some());
        assert_eq!(services.engine.state(), SyncState::Synced);

        // The default categories were seeded to the empty cloud
        assert!(remote.rows(Collection::Categories, "u-1").is_some());

        // The deferred reload request arrives after the grace window
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            loop {
                match events.recv().await {
                    Some(EngineEvent::ReloadRequired) => break,
                    Some(_) => continue,
                    None => panic!("event channel closed"),
                }
            }
        })
        .await
        .unwrap();

        services.shutdown();
    }

    #[tokio::test]
    async fn test_sign_out_stops_engine_and_requests_reload() {
        let (_tmp, _remote, services) =
            test_services(MemoryAuth::signed_in("u-1", "a@example.com"));

        services.start().await;
        let mut events = services.engine.take_events().unwrap();
        while events.try_recv().is_ok() {}

        services.sign_out().await;

        assert!(!services.session.handle().is_signed_in());
        assert_eq!(services.engine.state(), SyncState::Offline);

        let mut reload = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, EngineEvent::ReloadRequired) {
                reload = true;
            }
        }
        assert!(reload);

        services.shutdown();
    }
}
