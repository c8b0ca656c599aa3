//! ticklist Core Library
//!
//! This crate provides the core functionality for ticklist, an offline-first
//! checklist application whose data lives locally and syncs to a cloud
//! backend when signed in.
//!
//! # Architecture
//!
//! - **Snapshot**: one local JSON document holds every collection and is the
//!   sole source of truth for rendering
//! - **Sync engine**: pull-merge on sign-in (cloud wins on presence), then a
//!   fingerprint-gated push loop plus change subscriptions with echo
//!   suppression
//!
//! The UI contract is deliberately small: mutate the local store, then call
//! `SyncEngine::request_sync`.
//!
//! # Quick Start
//!
//! ```text
//! let services = Services::new(config, remote, auth)?;
//! services.start().await;
//!
//! // Add a task
//! let task = Task::new("Water plants", "home");
//! services.store.lock().await.upsert_task(&task)?;
//! services.engine.request_sync().await;
//! ```
//!
//! # Modules
//!
//! - `services`: constructs and wires the long-lived services (entry point)
//! - `store`: durable local snapshot store
//! - `engine`: the synchronization engine
//! - `session`: identity lifecycle and session gatekeeping
//! - `remote`: backend contract plus the REST and in-memory clients
//! - `models`: records and the typed category/task/board structures
//! - `status`: sync indicator projection
//! - `telemetry`: fire-and-forget usage events
//! - `config`: application configuration

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod session;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use engine::{EngineEvent, SyncEngine, SyncOptions, SyncState};
pub use error::{RemoteError, StoreError};
pub use models::{Board, Category, Collection, Priority, Record, Task};
pub use remote::{AuthBackend, MemoryAuth, MemoryRemote, RemoteData, RemoteStore, RestRemote};
pub use services::Services;
pub use session::{IdentitySession, Session, SessionHandle};
pub use snapshot::{merge_records, PortableSnapshot, SnapshotDocument};
pub use status::{StatusPublisher, StatusReport, StatusSurface};
pub use store::{SharedStore, SnapshotStore};
pub use telemetry::UsageTelemetry;
