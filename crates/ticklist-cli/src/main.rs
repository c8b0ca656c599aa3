//! ticklist CLI
//!
//! Command-line interface for ticklist - an offline-first checklist with
//! cloud sync. Every command works without a backend; configure one and sign
//! in to sync across devices.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ticklist_core::Config;

mod commands;
mod output;

use commands::AppContext;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "ticklist")]
#[command(about = "ticklist - offline-first checklist with cloud sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Manage categories
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Sign in and out
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Sync with the backend
    Sync {
        /// Stay connected and report remote changes
        #[arg(long)]
        watch: bool,
    },
    /// Show local counts and sync status
    Status,
    /// Export the local snapshot as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace local state with an exported document
    Import {
        /// Previously exported JSON file
        file: PathBuf,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a new task
    #[command(alias = "add")]
    Create {
        /// Task title
        title: String,
        /// Category id
        #[arg(short, long, default_value = "personal")]
        category: String,
        /// Priority (none, low, medium, high)
        #[arg(short, long)]
        priority: Option<String>,
    },
    /// List tasks
    #[command(alias = "ls")]
    List {
        /// Filter by category id
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Check off a task
    Done {
        /// Task id (full or prefix)
        id: String,
    },
    /// Delete a task
    #[command(alias = "rm")]
    Delete {
        /// Task id (full or prefix)
        id: String,
    },
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// List all categories
    #[command(alias = "ls")]
    List,
    /// Create a new category
    #[command(alias = "add")]
    Create {
        /// Category name
        name: String,
        /// Display emoji
        #[arg(short, long, default_value = "📁")]
        emoji: String,
    },
    /// Delete a category and its tasks
    #[command(alias = "rm")]
    Delete {
        /// Category id
        id: String,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Start the sign-in flow in your browser
    Signin {
        /// Identity provider
        #[arg(long, default_value = "google")]
        provider: String,
    },
    /// Finish sign-in with the token the provider handed back
    Complete {
        /// Access token
        token: String,
    },
    /// Sign out (local data is backed up first)
    Signout,
    /// Show the signed-in account
    Whoami,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (remote_url, sync_enabled, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the store or backend
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(&output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, &output)
            }
        };
    }

    let config = Config::load()?;
    let ctx = AppContext::open(config).await?;

    let result = match cli.command {
        Commands::Task { command } => handle_task_command(command, &ctx, &output).await,
        Commands::Category { command } => handle_category_command(command, &ctx, &output).await,
        Commands::Auth { command } => handle_auth_command(command, &ctx, &output).await,
        Commands::Sync { watch } => commands::sync::sync(&ctx, watch, &output).await,
        Commands::Status => commands::status::show(&ctx, &output).await,
        Commands::Export { output: target } => commands::backup::export(&ctx, target, &output).await,
        Commands::Import { file } => commands::backup::import(&ctx, file, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    };

    ctx.shutdown();
    result
}

async fn handle_task_command(
    command: TaskCommands,
    ctx: &AppContext,
    output: &Output,
) -> Result<()> {
    match command {
        TaskCommands::Create {
            title,
            category,
            priority,
        } => commands::task::add(ctx, title, category, priority, output).await,
        TaskCommands::List { category } => commands::task::list(ctx, category, output).await,
        TaskCommands::Done { id } => commands::task::done(ctx, id, output).await,
        TaskCommands::Delete { id } => commands::task::delete(ctx, id, output).await,
    }
}

async fn handle_category_command(
    command: CategoryCommands,
    ctx: &AppContext,
    output: &Output,
) -> Result<()> {
    match command {
        CategoryCommands::List => commands::category::list(ctx, output).await,
        CategoryCommands::Create { name, emoji } => {
            commands::category::add(ctx, name, emoji, output).await
        }
        CategoryCommands::Delete { id } => commands::category::delete(ctx, id, output).await,
    }
}

async fn handle_auth_command(
    command: AuthCommands,
    ctx: &AppContext,
    output: &Output,
) -> Result<()> {
    match command {
        AuthCommands::Signin { provider } => commands::auth::signin(ctx, &provider, output),
        AuthCommands::Complete { token } => commands::auth::complete(ctx, token, output).await,
        AuthCommands::Signout => commands::auth::signout(ctx, output).await,
        AuthCommands::Whoami => commands::auth::whoami(ctx, output),
    }
}
