//! Category command handlers

use anyhow::Result;
use serde_json::json;
use ticklist_core::Category;

use super::AppContext;
use crate::output::Output;

/// List all categories
pub async fn list(ctx: &AppContext, output: &Output) -> Result<()> {
    let categories = {
        let store = ctx.store.lock().await;
        store.categories()
    };
    output.print_categories(&categories);
    Ok(())
}

/// Create a new category
pub async fn add(ctx: &AppContext, name: String, emoji: String, output: &Output) -> Result<()> {
    let category = Category::new(name, emoji);
    {
        let mut store = ctx.store.lock().await;
        store.upsert_category(&category)?;
    }

    output.success(&format!("Added category {} {}", category.emoji, category.name));
    ctx.track("category_added", json!({}));
    ctx.request_sync().await;
    Ok(())
}

/// Remove a category and its tasks
pub async fn delete(ctx: &AppContext, id: String, output: &Output) -> Result<()> {
    let removed = {
        let mut store = ctx.store.lock().await;
        store.remove_category(&id)?
    };

    if removed {
        output.success(&format!("Removed category '{}' and its tasks", id));
        ctx.track("category_deleted", json!({}));
        ctx.request_sync().await;
    } else {
        output.message(&format!("No category '{}' found.", id));
    }
    Ok(())
}
