//! Usage telemetry
//!
//! Fire-and-forget event logging, fully decoupled from the reconciliation
//! path. `track` enqueues and returns immediately; a background worker
//! appends events to the backend. A failed insert is logged and dropped.
//! Nothing is recorded while signed out.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::remote::{RemoteStore, UsageEvent};
use crate::session::SessionHandle;

/// Fire-and-forget usage event recorder
pub struct UsageTelemetry {
    tx: mpsc::UnboundedSender<UsageEvent>,
    session: SessionHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl UsageTelemetry {
    /// Spawn the background worker
    pub fn spawn(remote: Arc<dyn RemoteStore>, session: SessionHandle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<UsageEvent>();

        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = remote.record_event(&event).await {
                    debug!(event = %event.event_name, "dropping usage event: {e}");
                }
            }
        });

        Self {
            tx,
            session,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Record an event. Returns immediately; a no-op while signed out.
    pub fn track(&self, event_name: &str, properties: Value) {
        let Some(session) = self.session.current() else {
            return;
        };
        let event = UsageEvent {
            user_id: session.user_id,
            event_name: event_name.to_string(),
            properties,
            created_at: Utc::now(),
        };
        let _ = self.tx.send(event);
    }

    /// Stop the worker; queued events are dropped
    pub fn stop(&self) {
        let mut guard = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemote, Profile, ProfileSettings};
    use crate::session::Session;
    use serde_json::json;
    use std::time::Duration;

    fn signed_in_handle(user_id: &str) -> SessionHandle {
        let handle = SessionHandle::new();
        handle.set(Some(Session {
            user_id: user_id.to_string(),
            email: "a@example.com".to_string(),
            profile: Profile {
                id: user_id.to_string(),
                email: "a@example.com".to_string(),
                full_name: String::new(),
                avatar_url: String::new(),
                subscription_tier: "free".to_string(),
                created_at: Utc::now(),
                last_login: Utc::now(),
                settings: ProfileSettings::default(),
            },
            subscription: None,
        }));
        handle
    }

    async fn wait_for_events(remote: &MemoryRemote, count: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if remote.events().len() >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("events never arrived");
    }

    #[tokio::test]
    async fn test_tracks_while_signed_in() {
        let remote = Arc::new(MemoryRemote::new());
        let telemetry = UsageTelemetry::spawn(remote.clone(), signed_in_handle("u-1"));

        telemetry.track("task_added", json!({"category": "home"}));
        wait_for_events(&remote, 1).await;

        let events = remote.events();
        assert_eq!(events[0].user_id, "u-1");
        assert_eq!(events[0].event_name, "task_added");
        assert_eq!(events[0].properties["category"], "home");

        telemetry.stop();
    }

    #[tokio::test]
    async fn test_noop_while_signed_out() {
        let remote = Arc::new(MemoryRemote::new());
        let telemetry = UsageTelemetry::spawn(remote.clone(), SessionHandle::new());

        telemetry.track("task_added", json!({}));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(remote.events().is_empty());
        telemetry.stop();
    }
}
