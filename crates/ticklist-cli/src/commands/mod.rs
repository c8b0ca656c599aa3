//! Command handlers

pub mod auth;
pub mod backup;
pub mod category;
pub mod config;
pub mod status;
pub mod sync;
pub mod task;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::Value;
use ticklist_core::{Config, RestRemote, Services, SharedStore, SnapshotStore};

/// Shared command context
///
/// Always carries the local store; carries the remote-backed services only
/// when a backend is configured. Commands mutate the store, then call
/// `request_sync` - the engine decides whether anything actually goes out.
pub struct AppContext {
    pub config: Config,
    pub store: SharedStore,
    pub remote: Option<Arc<RestRemote>>,
    pub services: Option<Services>,
}

impl AppContext {
    /// Open the context, resuming any stored session quietly
    pub async fn open(config: Config) -> Result<Self> {
        let Some(remote) = build_remote(&config) else {
            let store = SnapshotStore::open_shared(config.clone())?;
            return Ok(Self {
                config,
                store,
                remote: None,
                services: None,
            });
        };

        let services = Services::new(config.clone(), remote.clone(), remote.clone())?;
        // A failed resume just means we run signed out
        let _ = services.session.resume().await;

        Ok(Self {
            config,
            store: services.store.clone(),
            remote: Some(remote),
            services: Some(services),
        })
    }

    /// The remote services, or an error explaining how to configure them
    pub fn services(&self) -> Result<&Services> {
        self.services.as_ref().ok_or_else(|| {
            anyhow!(
                "No backend configured. Set one with:\n  \
                 ticklist config set remote_url https://your-backend\n  \
                 ticklist config set remote_api_key <key>"
            )
        })
    }

    /// Ask the engine to push local changes (no-op when signed out or no
    /// backend is configured)
    pub async fn request_sync(&self) {
        if let Some(services) = &self.services {
            services.engine.request_sync().await;
        }
    }

    /// Record a usage event, fire-and-forget
    pub fn track(&self, event_name: &str, properties: Value) {
        if let Some(services) = &self.services {
            services.telemetry.track(event_name, properties);
        }
    }

    /// Tear down background tasks before exit
    pub fn shutdown(&self) {
        if let Some(services) = &self.services {
            services.shutdown();
        }
    }
}

/// Build the backend client when both URL and key are configured
fn build_remote(config: &Config) -> Option<Arc<RestRemote>> {
    let url = config.remote_url.as_ref()?;
    let key = config.remote_api_key.as_ref()?;

    let remote = Arc::new(RestRemote::new(url, key));
    if let Some(token) = auth::load_token(config) {
        remote.set_access_token(Some(token));
    }
    Some(remote)
}
