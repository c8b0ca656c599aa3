//! Identity and session lifecycle
//!
//! Tracks the signed-in principal and gatekeeps sync: the engine runs only
//! while a session exists, and it reads the session through a `SessionHandle`
//! that it cannot mutate.
//!
//! Sign-out is engineered to never fail visibly. Whatever the backend does,
//! local identity ends up cleared, and the caller always proceeds to the
//! reload that puts the UI in a signed-out state. The only thing that happens
//! first is a timestamped snapshot backup, so a stale device signing back in
//! later cannot lose data it never pushed.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::remote::{AuthBackend, AuthUser, Profile, RemoteStore, Subscription};
use crate::store::SharedStore;

/// The signed-in principal with its account rows
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub profile: Profile,
    pub subscription: Option<Subscription>,
}

impl Session {
    /// Whether the periodic push loop should run for this user
    pub fn auto_sync_enabled(&self) -> bool {
        self.profile.settings.auto_sync
    }

    /// Whether the user has an active paid subscription
    pub fn is_premium(&self) -> bool {
        self.subscription.is_some() && self.profile.subscription_tier != "free"
    }
}

/// Read-only view of the current session, shared with the sync engine
#[derive(Clone, Default)]
pub struct SessionHandle(Arc<RwLock<Option<Session>>>);

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current session, if signed in
    pub fn current(&self) -> Option<Session> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether a session exists
    pub fn is_signed_in(&self) -> bool {
        self.current().is_some()
    }

    pub(crate) fn set(&self, session: Option<Session>) {
        let mut guard = self.0.write().unwrap_or_else(|e| e.into_inner());
        *guard = session;
    }
}

/// Manages the signed-in identity and its account rows
pub struct IdentitySession {
    auth: Arc<dyn AuthBackend>,
    remote: Arc<dyn RemoteStore>,
    store: SharedStore,
    session: SessionHandle,
}

impl IdentitySession {
    pub fn new(
        auth: Arc<dyn AuthBackend>,
        remote: Arc<dyn RemoteStore>,
        store: SharedStore,
    ) -> Self {
        Self {
            auth,
            remote,
            store,
            session: SessionHandle::new(),
        }
    }

    /// The read-only handle other services hold
    pub fn handle(&self) -> SessionHandle {
        self.session.clone()
    }

    /// The current session, if signed in
    pub fn current(&self) -> Option<Session> {
        self.session.current()
    }

    /// URL starting the provider's redirect-based sign-in flow
    pub fn sign_in_url(&self, provider: &str) -> String {
        self.auth.sign_in_url(provider)
    }

    /// Query the backend for an existing session and load the account rows
    ///
    /// On a live session the profile row is loaded or created with default
    /// settings, its last-login stamp is bumped, and the subscription status
    /// is checked (absence is the normal free-tier outcome).
    pub async fn resume(&self) -> Result<Option<Session>, RemoteError> {
        let Some(user) = self.auth.current_session().await? else {
            self.session.set(None);
            return Ok(None);
        };

        let profile = self.load_profile(&user).await?;
        let subscription = match self.remote.fetch_subscription(&user.id).await {
            Ok(subscription) => {
                if subscription.is_none() {
                    debug!("no active subscription (expected for free accounts)");
                }
                subscription
            }
            Err(e) => {
                debug!("subscription check failed: {e}");
                None
            }
        };

        let session = Session {
            user_id: user.id,
            email: user.email,
            profile,
            subscription,
        };
        info!(user = %session.user_id, "session resumed");
        self.session.set(Some(session.clone()));
        Ok(Some(session))
    }

    /// Load the user's profile row, creating it with defaults on first
    /// sign-in
    async fn load_profile(&self, user: &AuthUser) -> Result<Profile, RemoteError> {
        let now = Utc::now();

        match self.remote.fetch_profile(&user.id).await? {
            Some(mut profile) => {
                if let Err(e) = self.remote.touch_last_login(&user.id, now).await {
                    debug!("failed to bump last login: {e}");
                }
                profile.last_login = now;
                Ok(profile)
            }
            None => {
                let profile = Profile::new_default(user, now);
                if let Err(e) = self.remote.upsert_profile(&profile).await {
                    // Keep the default profile locally so the session still
                    // works; the row gets another chance next sign-in
                    warn!("profile creation failed: {e}");
                }
                Ok(profile)
            }
        }
    }

    /// Sign out. Never fails visibly: local identity is cleared no matter
    /// what the backend reports, and the caller proceeds to its reload.
    pub async fn sign_out(&self) {
        let active = matches!(self.auth.current_session().await, Ok(Some(_)));
        if !active {
            debug!("no active session to sign out");
            self.session.set(None);
            return;
        }

        // Back up local data before touching the backend
        let backup = {
            let store = self.store.lock().await;
            store.write_backup(Utc::now())
        };
        match backup {
            Ok(path) => info!(path = %path.display(), "wrote sign-out backup"),
            Err(e) => warn!("sign-out backup failed: {e}"),
        }

        if let Err(e) = self.auth.sign_out().await {
            warn!("backend sign-out failed: {e}");
        }

        self.session.set(None);
        info!("signed out");
    }
}
