use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::query::SortField;
use crate::models::{TaskPriority, TaskStatus};
use crate::validation::{nullable, validate_priority, validate_status};

/// A unit of work under a parent task. Removed together with its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[sqlx(rename = "parent_task_id")]
    pub parent_task: Uuid,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSubtask {
    pub title: String,
    pub description: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub parent_task: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due: Option<Option<DateTime<Utc>>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub parent_task: Option<Uuid>,
}

impl Subtask {
    pub fn new(input: NewSubtask, owner_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            due: input.due,
            status: input.status,
            priority: input.priority,
            parent_task: input.parent_task,
            owner_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, changes: SubtaskChanges) {
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
        if let Some(parent_task) = changes.parent_task {
            self.parent_task = parent_task;
        }
        self.updated_at = Utc::now();
    }
}

/// Body of `POST /subtasks`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskInput {
    #[validate(
        required(message = "Subtask title is required"),
        length(min = 3, max = 100, message = "Subtask title must be between 3 and 100 characters")
    )]
    pub title: Option<String>,
    #[validate(length(max = 200, message = "Subtask description must be between 0 and 200 characters"))]
    pub description: Option<String>,
    pub due: Option<DateTime<Utc>>,
    #[validate(custom = "validate_status")]
    pub status: Option<String>,
    #[validate(custom = "validate_priority")]
    pub priority: Option<String>,
    #[validate(required(message = "Parent task is required"))]
    pub parent_task: Option<Uuid>,
}

impl SubtaskInput {
    pub fn into_new_subtask(self) -> AppResult<NewSubtask> {
        Ok(NewSubtask {
            title: self.title.ok_or_else(|| {
                AppError::invalid("title", "required", "Subtask title is required")
            })?,
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
            parent_task: self.parent_task.ok_or_else(|| {
                AppError::invalid("parentTask", "required", "Parent task is required")
            })?,
        })
    }
}

/// Body of `PUT /subtasks/{id}`. Every field is optional.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskUpdateInput {
    #[validate(length(min = 3, max = 100, message = "Subtask title must be between 3 and 100 characters"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 200, message = "Subtask description must be between 0 and 200 characters"))]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due: Option<Option<DateTime<Utc>>>,
    #[validate(custom = "validate_status")]
    pub status: Option<String>,
    #[validate(custom = "validate_priority")]
    pub priority: Option<String>,
    pub parent_task: Option<Uuid>,
}

impl SubtaskUpdateInput {
    pub fn into_changes(self) -> AppResult<SubtaskChanges> {
        Ok(SubtaskChanges {
            title: self.title,
            description: self.description,
            due: self.due,
            status: self
                .status
                .as_deref()
                .map(str::parse::<TaskStatus>)
                .transpose()?,
            priority: self
                .priority
                .as_deref()
                .map(str::parse::<TaskPriority>)
                .transpose()?,
            parent_task: self.parent_task,
        })
    }
}

/// Fields a subtask listing may be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtaskSort {
    Title,
    Description,
    Due,
    Status,
    Priority,
    ParentTask,
    CreatedAt,
    UpdatedAt,
}

impl SortField for SubtaskSort {
    const ALLOWED: &'static [(&'static str, Self)] = &[
        ("title", SubtaskSort::Title),
        ("description", SubtaskSort::Description),
        ("due", SubtaskSort::Due),
        ("status", SubtaskSort::Status),
        ("priority", SubtaskSort::Priority),
        ("parentTask", SubtaskSort::ParentTask),
        ("createdAt", SubtaskSort::CreatedAt),
        ("updatedAt", SubtaskSort::UpdatedAt),
    ];

    fn column(self) -> &'static str {
        match self {
            SubtaskSort::Title => "title",
            SubtaskSort::Description => "description",
            SubtaskSort::Due => "due",
            SubtaskSort::Status => "status",
            SubtaskSort::Priority => "priority",
            SubtaskSort::ParentTask => "parent_task_id",
            SubtaskSort::CreatedAt => "created_at",
            SubtaskSort::UpdatedAt => "updated_at",
        }
    }

    fn is_text(self) -> bool {
        matches!(self, SubtaskSort::Title | SubtaskSort::Description)
    }
}
