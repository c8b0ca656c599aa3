//! Export and import handlers
//!
//! Export writes the full user-visible snapshot as pretty-printed JSON.
//! Import replaces local state with a previously exported document; a
//! document that does not parse fails the whole import and leaves local
//! state untouched.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;

use super::AppContext;
use crate::output::Output;

/// Export the snapshot to a file or stdout
pub async fn export(ctx: &AppContext, target: Option<PathBuf>, output: &Output) -> Result<()> {
    let json = {
        let store = ctx.store.lock().await;
        store.export_json()?
    };

    match target {
        Some(path) => {
            std::fs::write(&path, &json)
                .with_context(|| format!("Failed to write export to {:?}", path))?;
            output.success(&format!("Exported to {}", path.display()));
        }
        None => println!("{}", json),
    }

    ctx.track("data_exported", json!({}));
    Ok(())
}

/// Replace local state with an exported document
pub async fn import(ctx: &AppContext, file: PathBuf, output: &Output) -> Result<()> {
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {:?}", file))?;

    {
        let mut store = ctx.store.lock().await;
        store
            .import_json(&content)
            .context("Import failed, local data was not changed")?;
    }

    output.success("Import complete");
    ctx.track("data_imported", json!({}));
    ctx.request_sync().await;
    Ok(())
}
