//! Sync status indicator
//!
//! Pure projection of the engine's state into a user-facing indicator. The
//! display surface may not exist yet when a state change arrives (the UI
//! builds lazily), so the publisher retries on a short delay until the
//! surface accepts the update, then waits for the next change.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::{SyncEngine, SyncState};

/// Default delay between retries while the surface is missing
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// One rendered status update
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub state: SyncState,
    pub label: &'static str,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// User-facing label for a state
pub fn label_for(state: SyncState) -> &'static str {
    match state {
        SyncState::Offline => "disconnected",
        SyncState::Syncing => "syncing",
        SyncState::Online => "connected",
        SyncState::Synced => "up to date",
    }
}

/// Where status updates land; returns `false` while not ready to display
pub trait StatusSurface: Send + Sync {
    fn apply(&self, report: &StatusReport) -> bool;
}

/// Publishes engine state changes to a display surface
pub struct StatusPublisher {
    engine: SyncEngine,
    surface: Arc<dyn StatusSurface>,
    retry_delay: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StatusPublisher {
    pub fn new(engine: SyncEngine, surface: Arc<dyn StatusSurface>) -> Self {
        Self {
            engine,
            surface,
            retry_delay: DEFAULT_RETRY_DELAY,
            task: Mutex::new(None),
        }
    }

    /// Override the retry delay (tests)
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// The current report, for pull-based consumers
    pub fn report(&self) -> StatusReport {
        let state = self.engine.state();
        StatusReport {
            state,
            label: label_for(state),
            last_synced_at: self.engine.last_synced_at(),
        }
    }

    /// Start pushing state changes to the surface
    pub fn start(&self) {
        let engine = self.engine.clone();
        let surface = self.surface.clone();
        let retry_delay = self.retry_delay;

        let handle = tokio::spawn(async move {
            let mut rx = engine.subscribe_state();
            loop {
                let state = *rx.borrow_and_update();
                let report = StatusReport {
                    state,
                    label: label_for(state),
                    last_synced_at: engine.last_synced_at(),
                };

                // Retry until the surface exists, then stop retrying
                while !surface.apply(&report) {
                    debug!("status surface not ready, retrying");
                    tokio::time::sleep(retry_delay).await;
                }

                if rx.changed().await.is_err() {
                    break;
                }
            }
        });

        let mut guard = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = guard.replace(handle) {
            old.abort();
        }
    }

    /// Stop publishing
    pub fn stop(&self) {
        let mut guard = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::SyncOptions;
    use crate::remote::MemoryRemote;
    use crate::session::SessionHandle;
    use crate::store::SnapshotStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Surface that refuses the first few updates, like a DOM node that
    /// hasn't been created yet
    struct LateSurface {
        refusals: AtomicUsize,
        applied: Mutex<Vec<StatusReport>>,
    }

    impl LateSurface {
        fn new(refusals: usize) -> Self {
            Self {
                refusals: AtomicUsize::new(refusals),
                applied: Mutex::new(Vec::new()),
            }
        }

        fn applied(&self) -> Vec<StatusReport> {
            self.applied.lock().unwrap().clone()
        }
    }

    impl StatusSurface for LateSurface {
        fn apply(&self, report: &StatusReport) -> bool {
            if self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return false;
            }
            self.applied.lock().unwrap().push(report.clone());
            true
        }
    }

    fn test_engine() -> (TempDir, SyncEngine) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        let store = SnapshotStore::open_shared(config).unwrap();
        let engine = SyncEngine::new(
            store,
            Arc::new(MemoryRemote::new()),
            SessionHandle::new(),
            SyncOptions::default(),
        );
        (temp_dir, engine)
    }

    #[test]
    fn test_labels() {
        assert_eq!(label_for(SyncState::Offline), "disconnected");
        assert_eq!(label_for(SyncState::Syncing), "syncing");
        assert_eq!(label_for(SyncState::Online), "connected");
        assert_eq!(label_for(SyncState::Synced), "up to date");
    }

    #[tokio::test]
    async fn test_report_projects_engine_state() {
        let (_tmp, engine) = test_engine();
        let publisher = StatusPublisher::new(engine, Arc::new(LateSurface::new(0)));

        let report = publisher.report();
        assert_eq!(report.state, SyncState::Offline);
        assert_eq!(report.label, "disconnected");
        assert!(report.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_retries_until_surface_appears() {
        let (_tmp, engine) = test_engine();
        let surface = Arc::new(LateSurface::new(3));
        let publisher = StatusPublisher::new(engine, surface.clone())
            .with_retry_delay(Duration::from_millis(5));

        publisher.start();

        // The initial offline report goes through after three refusals
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if !surface.applied().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let applied = surface.applied();
        assert_eq!(applied[0].state, SyncState::Offline);
        publisher.stop();
    }
}
