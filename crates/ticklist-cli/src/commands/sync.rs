//! Sync command handler

use std::sync::Arc;

use anyhow::{bail, Result};
use ticklist_core::status::label_for;
use ticklist_core::{EngineEvent, StatusPublisher, StatusReport, StatusSurface, SyncState};

use super::AppContext;
use crate::output::Output;

/// Run a full sync cycle, optionally staying connected to watch for changes
pub async fn sync(ctx: &AppContext, watch: bool, output: &Output) -> Result<()> {
    let services = ctx.services()?;

    if !ctx.config.sync_enabled {
        bail!(
            "Sync is not enabled. Enable it with:\n  \
             ticklist config set sync_enabled true"
        );
    }
    if services.session.current().is_none() {
        bail!("Not signed in. Run `ticklist auth signin` first.");
    }

    output.message("Syncing...");
    services.engine.start().await;

    match services.engine.state() {
        SyncState::Synced => {
            output.success("Sync complete - up to date");
            let store = ctx.store.lock().await;
            output.message(&format!(
                "  Categories: {}, Tasks: {}, Boards: {}",
                store.categories().len(),
                store.tasks().len(),
                store.snapshot().boards.len()
            ));
        }
        state => bail!("Sync failed (status: {})", label_for(state)),
    }

    if watch {
        watch_changes(ctx, output).await;
    }

    services.engine.stop();
    Ok(())
}

/// Status line writer for watch mode
struct TermSurface {
    quiet: bool,
}

impl StatusSurface for TermSurface {
    fn apply(&self, report: &StatusReport) -> bool {
        if !self.quiet {
            eprintln!("Status: {}", report.label);
        }
        true
    }
}

/// Stay connected, reporting engine events until interrupted
async fn watch_changes(ctx: &AppContext, output: &Output) {
    let Some(services) = &ctx.services else { return };
    let Some(mut events) = services.engine.take_events() else {
        output.message("Event stream already in use.");
        return;
    };

    let publisher = StatusPublisher::new(
        services.engine.clone(),
        Arc::new(TermSurface {
            quiet: output.is_quiet(),
        }),
    );
    publisher.start();

    output.message("Watching for changes (ctrl-c to stop)...");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(EngineEvent::SnapshotReplaced(collection)) => {
                    output.message(&format!("Updated {} from another device", collection));
                }
                Some(EngineEvent::Error(e)) => {
                    output.message(&format!("Sync error: {}", e));
                }
                Some(EngineEvent::StateChanged(_)) | Some(EngineEvent::ReloadRequired) => {}
                None => break,
            }
        }
    }

    publisher.stop();
}
