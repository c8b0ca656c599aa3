//! Status command handler

use anyhow::Result;
use ticklist_core::status::label_for;

use super::AppContext;
use crate::output::Output;

/// Show local counts, identity, and sync status
pub async fn show(ctx: &AppContext, output: &Output) -> Result<()> {
    let (categories, tasks, boards, last_synced_at) = {
        let store = ctx.store.lock().await;
        (
            store.categories().len(),
            store.tasks().len(),
            store.snapshot().boards.len(),
            store.snapshot().meta.last_synced_at,
        )
    };

    let session = ctx
        .services
        .as_ref()
        .and_then(|s| s.session.current());
    let sync_label = ctx
        .services
        .as_ref()
        .map(|s| label_for(s.engine.state()))
        .unwrap_or("not configured");

    if output.is_json() {
        println!(
            "{}",
            serde_json::json!({
                "categories": categories,
                "tasks": tasks,
                "boards": boards,
                "signed_in": session.is_some(),
                "email": session.as_ref().map(|s| s.email.clone()),
                "sync": sync_label,
                "last_synced_at": last_synced_at,
            })
        );
        return Ok(());
    }

    output.message(&format!("Categories: {}", categories));
    output.message(&format!("Tasks:      {}", tasks));
    output.message(&format!("Boards:     {}", boards));
    output.message("");
    match session {
        Some(session) => output.message(&format!("Signed in as {}", session.email)),
        None => output.message("Not signed in"),
    }
    output.message(&format!("Sync:       {}", sync_label));
    match last_synced_at {
        Some(at) => output.message(&format!("Last sync:  {}", at.format("%Y-%m-%d %H:%M:%S"))),
        None => output.message("Last sync:  never"),
    }
    Ok(())
}
