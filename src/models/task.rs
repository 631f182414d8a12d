use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::query::SortField;
use crate::validation::{
    nullable, validate_file_extension, validate_mime_type, validate_priority, validate_status,
};

/// Represents the status of a task or subtask.
/// Corresponds to the `task_status` SQL enum.
#[derive(
    Debug,
    Default,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    sqlx::Type,
)]
#[sqlx(type_name = "task_status")]
pub enum TaskStatus {
    /// Not started yet. The default for new records.
    #[default]
    Open,
    /// Being worked on.
    #[serde(rename = "In Progress")]
    #[sqlx(rename = "In Progress")]
    InProgress,
    /// Done.
    Completed,
}

impl TaskStatus {
    pub const INVALID_MESSAGE: &'static str =
        r#"Status must be one of "Open", "In Progress", "Completed""#;

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "Open",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Open" => Ok(TaskStatus::Open),
            "In Progress" | "InProgress" => Ok(TaskStatus::InProgress),
            "Completed" => Ok(TaskStatus::Completed),
            _ => Err(AppError::invalid("status", "enum", Self::INVALID_MESSAGE)),
        }
    }
}

/// Represents the priority of a task or subtask.
/// Corresponds to the `task_priority` SQL enum.
#[derive(
    Debug,
    Default,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    sqlx::Type,
)]
#[sqlx(type_name = "task_priority")]
pub enum TaskPriority {
    High,
    /// The default for new records.
    #[default]
    Medium,
    Low,
}

impl TaskPriority {
    pub const INVALID_MESSAGE: &'static str = r#"Priority must be one of "High", "Medium", "Low""#;

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::High => "High",
            TaskPriority::Medium => "Medium",
            TaskPriority::Low => "Low",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "High" => Ok(TaskPriority::High),
            "Medium" => Ok(TaskPriority::Medium),
            "Low" => Ok(TaskPriority::Low),
            _ => Err(AppError::invalid("priority", "enum", Self::INVALID_MESSAGE)),
        }
    }
}

/// Metadata of a file attached to a task. The bytes themselves live wherever
/// `storage_path` points; this service never touches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TaskFile {
    #[validate(
        length(min = 1, max = 255, message = "Filename must be between 1 and 255 characters"),
        custom = "validate_file_extension"
    )]
    pub filename: String,
    #[validate(length(min = 1, message = "Storage path is required"))]
    pub storage_path: String,
    #[validate(custom = "validate_mime_type")]
    pub mime_type: String,
    #[validate(range(max = 10485760, message = "File must be at most 10 MB"))]
    pub size_bytes: u64,
}

/// Represents a task entity as stored and returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Optional reference to a category. Cleared when that category is deleted.
    pub category: Option<Uuid>,
    /// Tag references with set semantics.
    pub tags: Vec<Uuid>,
    pub files: Vec<TaskFile>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated task ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub category: Option<Uuid>,
    pub tags: Vec<Uuid>,
    pub files: Vec<TaskFile>,
}

/// A validated partial update. `None` leaves the field untouched; for the optional
/// fields (`description`, `due`, `category`), `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due: Option<Option<DateTime<Utc>>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub category: Option<Option<Uuid>>,
    pub tags: Option<Vec<Uuid>>,
}

impl Task {
    /// Creates a new `Task` owned by `owner_id` with a fresh id and timestamps.
    pub fn new(input: NewTask, owner_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            due: input.due,
            status: input.status,
            priority: input.priority,
            category: input.category,
            tags: input.tags,
            files: input.files,
            owner_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a partial update in place and bumps `updated_at`.
    pub fn apply(&mut self, changes: TaskChanges) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(description) = changes.description {
            self.description = description;
        }
        if let Some(due) = changes.due {
            self.due = due;
        }
        if let Some(status) = changes.status {
            self.status = status;
        }
        if let Some(priority) = changes.priority {
            self.priority = priority;
        }
        if let Some(category) = changes.category {
            self.category = category;
        }
        if let Some(tags) = changes.tags {
            self.tags = tags;
        }
        self.updated_at = Utc::now();
    }
}

/// Drops repeated ids, keeping the first occurrence.
pub fn dedup_ids(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Body of `POST /tasks`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    #[validate(
        required(message = "Task title is required"),
        length(min = 3, max = 100, message = "Task title must be between 3 and 100 characters")
    )]
    pub title: Option<String>,
    #[validate(length(max = 200, message = "Task description must be at most 200 characters"))]
    pub description: Option<String>,
    pub due: Option<DateTime<Utc>>,
    #[validate(custom = "validate_status")]
    pub status: Option<String>,
    #[validate(custom = "validate_priority")]
    pub priority: Option<String>,
    pub category: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<Uuid>,
    #[serde(default)]
    #[validate]
    pub files: Vec<TaskFile>,
}

impl TaskInput {
    /// Converts a validated input into a `NewTask`, filling defaults.
    pub fn into_new_task(self) -> AppResult<NewTask> {
        Ok(NewTask {
            title: self
                .title
                .ok_or_else(|| AppError::invalid("title", "required", "Task title is required"))?,
            description: self.description,
            due: self.due,
            status: self
                .status
                .as_deref()
                .map(str::parse::<TaskStatus>)
                .transpose()?
                .unwrap_or_default(),
            priority: self
                .priority
                .as_deref()
                .map(str::parse::<TaskPriority>)
                .transpose()?
                .unwrap_or_default(),
            category: self.category,
            tags: dedup_ids(self.tags),
            files: self.files,
        })
    }
}

/// Body of `PUT /tasks/{id}`. Every field is optional.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdateInput {
    #[validate(length(min = 3, max = 100, message = "Task title must be between 3 and 100 characters"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 200, message = "Task description must be at most 200 characters"))]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due: Option<Option<DateTime<Utc>>>,
    #[validate(custom = "validate_status")]
    pub status: Option<String>,
    #[validate(custom = "validate_priority")]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<Uuid>>,
    pub tags: Option<Vec<Uuid>>,
}

impl TaskUpdateInput {
    pub fn into_changes(self) -> AppResult<TaskChanges> {
        Ok(TaskChanges {
            title: self.title,
            description: self.description,
            due: self.due,
            status: self.status.as_deref().map(str::parse::<TaskStatus>).transpose()?,
            priority: self
                .priority
                .as_deref()
                .map(str::parse::<TaskPriority>)
                .transpose()?,
            category: self.category,
            tags: self.tags.map(dedup_ids),
        })
    }
}

/// Body of `POST /tasks/{taskId}/upload`.
#[derive(Debug, Deserialize, Validate)]
pub struct FileUploadInput {
    #[serde(default)]
    #[validate]
    pub files: Vec<TaskFile>,
}

/// Fields a task listing may be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSort {
    Title,
    Description,
    Due,
    Status,
    Priority,
    CreatedAt,
    UpdatedAt,
}

impl SortField for TaskSort {
    const ALLOWED: &'static [(&'static str, Self)] = &[
        ("title", TaskSort::Title),
        ("description", TaskSort::Description),
        ("due", TaskSort::Due),
        ("status", TaskSort::Status),
        ("priority", TaskSort::Priority),
        ("createdAt", TaskSort::CreatedAt),
        ("updatedAt", TaskSort::UpdatedAt),
    ];

    fn column(self) -> &'static str {
        match self {
            TaskSort::Title => "title",
            TaskSort::Description => "description",
            TaskSort::Due => "due",
            TaskSort::Status => "status",
            TaskSort::Priority => "priority",
            TaskSort::CreatedAt => "created_at",
            TaskSort::UpdatedAt => "updated_at",
        }
    }

    fn is_text(self) -> bool {
        matches!(self, TaskSort::Title | TaskSort::Description)
    }
}
