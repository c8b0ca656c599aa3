//! Task command handlers

use anyhow::{bail, Result};
use serde_json::json;
use ticklist_core::{Collection, Priority, Task};

use super::AppContext;
use crate::output::Output;

fn parse_priority(value: &str) -> Result<Priority> {
    match value.to_ascii_lowercase().as_str() {
        "none" => Ok(Priority::None),
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        other => bail!("Unknown priority '{}'. Use none, low, medium, or high.", other),
    }
}

/// Resolve a task by full id or unique prefix
fn resolve_task(tasks: &[Task], id: &str) -> Result<Task> {
    let matches: Vec<&Task> = tasks.iter().filter(|t| t.id.starts_with(id)).collect();
    match matches.len() {
        0 => bail!("No task matches '{}'", id),
        1 => Ok(matches[0].clone()),
        n => bail!("'{}' is ambiguous ({} tasks match)", id, n),
    }
}

/// Create a new task
pub async fn add(
    ctx: &AppContext,
    title: String,
    category: String,
    priority: Option<String>,
    output: &Output,
) -> Result<()> {
    let task = {
        let mut store = ctx.store.lock().await;

        if !store.categories().iter().any(|c| c.id == category) {
            bail!(
                "Unknown category '{}'. List them with `ticklist category list`.",
                category
            );
        }

        let mut task = Task::new(title, category);
        task.order = store.tasks().len() as i64;
        if let Some(priority) = priority {
            task.priority = parse_priority(&priority)?;
        }
        store.upsert_task(&task)?;
        task
    };

    output.print_task(&task);
    ctx.track("task_added", json!({"category": task.category_id}));
    ctx.request_sync().await;
    Ok(())
}

/// List tasks, optionally filtered by category
pub async fn list(ctx: &AppContext, category: Option<String>, output: &Output) -> Result<()> {
    let mut tasks = {
        let store = ctx.store.lock().await;
        store.tasks()
    };

    if let Some(category) = category {
        tasks.retain(|t| t.category_id == category);
    }
    tasks.sort_by_key(|t| t.order);

    output.print_tasks(&tasks);
    Ok(())
}

/// Check off a task
pub async fn done(ctx: &AppContext, id: String, output: &Output) -> Result<()> {
    let task = {
        let mut store = ctx.store.lock().await;
        let mut task = resolve_task(&store.tasks(), &id)?;
        task.set_checked(true);
        store.upsert_task(&task)?;
        task
    };

    output.success(&format!("Done: {}", task.title));
    ctx.track("task_completed", json!({"category": task.category_id}));
    ctx.request_sync().await;
    Ok(())
}

/// Delete a task
pub async fn delete(ctx: &AppContext, id: String, output: &Output) -> Result<()> {
    let task = {
        let mut store = ctx.store.lock().await;
        let task = resolve_task(&store.tasks(), &id)?;
        store.remove_record(Collection::Tasks, &task.id)?;
        task
    };

    output.success(&format!("Deleted: {}", task.title));
    ctx.track("task_deleted", json!({}));
    ctx.request_sync().await;
    Ok(())
}
