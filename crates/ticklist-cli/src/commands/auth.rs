//! Auth command handlers
//!
//! Sign-in uses the provider's redirect flow: the browser opens the
//! authorize URL, the provider hands back an access token, and
//! `auth complete` stores it. Nothing local changes until the token lands.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use ticklist_core::Config;

use super::AppContext;
use crate::output::Output;

/// Stored session token
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    #[serde(default)]
    email: Option<String>,
}

/// Load the stored access token, if any
pub fn load_token(config: &Config) -> Option<String> {
    let content = std::fs::read_to_string(config.session_path()).ok()?;
    let token: StoredToken = serde_json::from_str(&content).ok()?;
    Some(token.access_token)
}

fn store_token(config: &Config, token: &str, email: Option<String>) -> Result<()> {
    let stored = StoredToken {
        access_token: token.to_string(),
        email,
    };
    let json = serde_json::to_string_pretty(&stored).context("Failed to encode session token")?;
    std::fs::write(config.session_path(), json).context("Failed to store session token")?;
    Ok(())
}

fn clear_token(config: &Config) {
    let path = config.session_path();
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
}

/// Start the redirect-based sign-in flow
pub fn signin(ctx: &AppContext, provider: &str, output: &Output) -> Result<()> {
    let services = ctx.services()?;
    let url = services.session.sign_in_url(provider);

    if open::that(&url).is_ok() {
        output.message("Opening the sign-in page in your browser...");
    } else {
        output.message("Open this URL to sign in:");
    }
    output.message(&format!("  {}", url));
    output.message("");
    output.message("After signing in, finish with:");
    output.message("  ticklist auth complete <access-token>");
    Ok(())
}

/// Store the token handed back by the provider and start syncing
pub async fn complete(ctx: &AppContext, token: String, output: &Output) -> Result<()> {
    let services = ctx.services()?;
    let Some(remote) = &ctx.remote else {
        bail!("No backend configured");
    };

    remote.set_access_token(Some(token.clone()));

    // Signing in starts the engine; the initial pull-merge runs now
    let session = services.start().await;
    let Some(session) = session else {
        remote.set_access_token(None);
        bail!("The token was not accepted. Sign in again and paste a fresh token.");
    };

    store_token(&ctx.config, &token, Some(session.email.clone()))?;
    ctx.track("signed_in", json!({}));

    output.success(&format!("Signed in as {}", session.email));
    Ok(())
}

/// Sign out: backup, clear identity, stop syncing. Never fails.
pub async fn signout(ctx: &AppContext, output: &Output) -> Result<()> {
    let services = ctx.services()?;

    ctx.track("signed_out", json!({}));
    services.sign_out().await;
    clear_token(&ctx.config);

    output.success("Signed out. A backup of your data was kept locally.");
    Ok(())
}

/// Show the signed-in principal
pub fn whoami(ctx: &AppContext, output: &Output) -> Result<()> {
    let services = ctx.services()?;

    match services.session.current() {
        Some(session) => {
            if output.is_json() {
                println!(
                    "{}",
                    json!({
                        "user_id": session.user_id,
                        "email": session.email,
                        "tier": session.profile.subscription_tier,
                        "premium": session.is_premium(),
                    })
                );
            } else {
                output.message(&format!("Signed in as {}", session.email));
                output.message(&format!("Tier: {}", session.profile.subscription_tier));
            }
        }
        None => output.message("Not signed in."),
    }
    Ok(())
}
