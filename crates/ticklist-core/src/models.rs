//! Data models for ticklist
//!
//! Defines the collection names, the generic `Record` that sync operates on,
//! and the typed structures (Category, Task, Board) the application edits.
//!
//! Sync only cares about two fields on a record: `id` (identity within its
//! collection) and `updatedAt` (conflict resolution). Everything else is
//! opaque JSON carried along unchanged.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Record field carrying the identity
const ID_FIELD: &str = "id";

/// Record field carrying the conflict-resolution timestamp
const UPDATED_AT_FIELD: &str = "updatedAt";

/// A named group of user records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Categories,
    Tasks,
    Boards,
}

impl Collection {
    /// All collections, in the order they are pulled and pushed
    pub const ALL: [Collection; 3] = [
        Collection::Categories,
        Collection::Tasks,
        Collection::Boards,
    ];

    /// Local name, used in the snapshot document and log output
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Categories => "categories",
            Collection::Tasks => "tasks",
            Collection::Boards => "boards",
        }
    }

    /// Backend table holding this collection's row per user
    pub fn remote_table(&self) -> &'static str {
        match self {
            Collection::Categories => "categories",
            Collection::Tasks => "todos",
            Collection::Boards => "mindmaps",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record in a collection: a JSON object with an `id` and, when it
/// participates in conflict resolution, an `updatedAt` timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Wrap a JSON value; returns `None` if it is not an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Serialize a typed model into a record
    pub fn from_model<T: Serialize>(model: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(model)? {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(serde::ser::Error::custom(
                "model did not serialize to a JSON object",
            )),
        }
    }

    /// Deserialize this record into a typed model
    pub fn to_model<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0.clone()))
    }

    /// The record's identity, if present
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// The record's `updatedAt` timestamp, if present and parseable
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .get(UPDATED_AT_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Timestamp used in conflict comparisons; a missing or unparseable
    /// stamp loses against any record that has one.
    pub fn updated_at_or_epoch(&self) -> DateTime<Utc> {
        self.updated_at().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Stamp `updatedAt`
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.0.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(at.to_rfc3339()),
        );
    }

    /// Assign a fresh id if the record lacks one; returns the id
    pub fn ensure_id(&mut self) -> String {
        if let Some(id) = self.id() {
            return id.to_string();
        }
        let id = Uuid::new_v4().to_string();
        self.0
            .insert(ID_FIELD.to_string(), Value::String(id.clone()));
        id
    }

    /// Read an arbitrary field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Write an arbitrary field
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// Unwrap into a plain JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Task priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::None => "none",
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        };
        f.write_str(label)
    }
}

/// A task category shown in the sidebar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Display emoji
    pub emoji: String,
    /// Built-in categories cannot be renamed or removed
    #[serde(default)]
    pub builtin: bool,
    /// When this category was last updated
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Create a new category
    pub fn new(name: impl Into<String>, emoji: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            emoji: emoji.into(),
            builtin: false,
            updated_at: Utc::now(),
        }
    }

    /// Create a category with a well-known id (for the default seed set)
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        emoji: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            emoji: emoji.into(),
            builtin: false,
            updated_at: Utc::now(),
        }
    }

    /// The categories every fresh profile starts with
    pub fn default_set() -> Vec<Category> {
        vec![
            Category::with_id("work", "Work", "💼"),
            Category::with_id("home", "Home", "🏠"),
            Category::with_id("personal", "Personal", "👤"),
            Category::with_id("study", "Study", "📚"),
        ]
    }

    /// Rename the category
    pub fn rename(&mut self, name: impl Into<String>, emoji: impl Into<String>) {
        self.name = name.into();
        self.emoji = emoji.into();
        self.updated_at = Utc::now();
    }
}

/// A checklist task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Task title
    pub title: String,
    /// Whether the task is checked off
    #[serde(default)]
    pub checked: bool,
    /// Priority level
    #[serde(default)]
    pub priority: Priority,
    /// Free-form due date
    #[serde(default)]
    pub due: String,
    /// Free-form memo
    #[serde(default)]
    pub memo: String,
    /// Category this task belongs to
    pub category_id: String,
    /// Manual sort position within the category
    #[serde(default)]
    pub order: i64,
    /// Pinned to the top of its category
    #[serde(default)]
    pub pinned: bool,
    /// When this task was created
    pub created_at: DateTime<Utc>,
    /// When this task was last updated
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task in the given category
    pub fn new(title: impl Into<String>, category_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            checked: false,
            priority: Priority::None,
            due: String::new(),
            memo: String::new(),
            category_id: category_id.into(),
            order: 0,
            pinned: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.updated_at = Utc::now();
    }

    /// Check or uncheck the task
    pub fn set_checked(&mut self, checked: bool) {
        self.checked = checked;
        self.updated_at = Utc::now();
    }

    /// Update the priority
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
        self.updated_at = Utc::now();
    }

    /// Pin or unpin the task
    pub fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
        self.updated_at = Utc::now();
    }
}

/// A free-form board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    /// Unique identifier
    pub id: String,
    /// Board name
    pub name: String,
    /// Opaque node graph owned by the board editor
    #[serde(default)]
    pub nodes: Value,
    /// When this board was last updated
    pub updated_at: DateTime<Utc>,
}

impl Board {
    /// Create a new empty board
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            nodes: Value::Null,
            updated_at: Utc::now(),
        }
    }
}
