//! Persistence gateway.
//!
//! One trait per entity, each exposing owner-scoped CRUD plus filter/paginate/sort.
//! Deletes that carry a cascade (category -> detach tasks, tag -> pull from tasks,
//! task -> remove subtasks) perform the cascade inside the same atomic step and
//! report how many dependent records it touched.
//!
//! Writes that carry references (a task's category and tags, a subtask's parent)
//! resolve them in the same atomic step as the write, so a concurrent delete can
//! never leave a dangling id behind. `refs_owner` restricts which owner a referenced
//! record must belong to; `None` only requires that it exists.
//!
//! Two engines implement every trait: [`postgres::PgStore`] for production and
//! [`memory::MemoryStore`] for local runs and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult, FieldViolation};
use crate::models::{
    Category, ListQuery, NameSort, Subtask, SubtaskChanges, SubtaskSort, Tag, Task, TaskChanges,
    TaskFile, TaskSort, User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// References a write could not resolve, reported together as one
/// `ReferentialError`.
#[derive(Debug, Default)]
pub struct MissingReferences(Vec<FieldViolation>);

impl MissingReferences {
    pub fn category(&mut self, id: Uuid) {
        self.0.push(FieldViolation::new(
            "category",
            "not_found",
            format!("Category {} does not exist", id),
        ));
    }

    /// `position` is the index of the tag in the submitted list.
    pub fn tag(&mut self, position: usize, id: Uuid) {
        self.0.push(FieldViolation::new(
            format!("tags[{}]", position),
            "not_found",
            format!("Tag {} does not exist", id),
        ));
    }

    pub fn parent_task(&mut self, id: Uuid) {
        self.0.push(FieldViolation::new(
            "parentTask",
            "not_found",
            format!("Task {} does not exist", id),
        ));
    }

    pub fn into_result(self) -> AppResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::ReferentialError(self.0))
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts a user. Fails with `ResourceExists` when the email is taken.
    async fn create(&self, user: User) -> AppResult<User>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, category: Category) -> AppResult<Category>;

    async fn find(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Category>>;

    async fn list(&self, owner_id: Uuid, query: &ListQuery<NameSort>) -> AppResult<Vec<Category>>;

    async fn rename(&self, owner_id: Uuid, id: Uuid, name: String)
        -> AppResult<Option<Category>>;

    /// Deletes the category and clears it from every task referencing it.
    /// Returns the number of tasks detached, or `None` when nothing matched.
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<u64>>;
}

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create(&self, tag: Tag) -> AppResult<Tag>;

    async fn find(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Tag>>;

    async fn list(&self, owner_id: Uuid, query: &ListQuery<NameSort>) -> AppResult<Vec<Tag>>;

    async fn rename(&self, owner_id: Uuid, id: Uuid, name: String) -> AppResult<Option<Tag>>;

    /// Deletes the tag and removes its id from every task holding it.
    /// Returns the number of tasks updated, or `None` when nothing matched.
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<u64>>;
}

/// Extra restriction for task listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub category: Option<Uuid>,
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Inserts the task once its category and tags resolve.
    /// Fails with `ReferentialError` listing every unresolved reference.
    async fn create(&self, task: Task, refs_owner: Option<Uuid>) -> AppResult<Task>;

    async fn find(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Task>>;

    async fn list(
        &self,
        owner_id: Uuid,
        filter: TaskFilter,
        query: &ListQuery<TaskSort>,
    ) -> AppResult<Vec<Task>>;

    /// Applies `changes` once any category or tags they name resolve.
    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: TaskChanges,
        refs_owner: Option<Uuid>,
    ) -> AppResult<Option<Task>>;

    /// Replaces the whole file list of a task.
    async fn replace_files(
        &self,
        owner_id: Uuid,
        id: Uuid,
        files: Vec<TaskFile>,
    ) -> AppResult<Option<Task>>;

    /// Deletes the task and all of its subtasks.
    /// Returns the number of subtasks removed, or `None` when nothing matched.
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<u64>>;
}

#[async_trait]
pub trait SubtaskRepository: Send + Sync {
    /// Inserts the subtask once its parent task resolves.
    async fn create(&self, subtask: Subtask, refs_owner: Option<Uuid>) -> AppResult<Subtask>;

    async fn find(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Subtask>>;

    /// Lists the owner's subtasks, optionally only those under `parent_task`.
    async fn list(
        &self,
        owner_id: Uuid,
        parent_task: Option<Uuid>,
        query: &ListQuery<SubtaskSort>,
    ) -> AppResult<Vec<Subtask>>;

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: SubtaskChanges,
        refs_owner: Option<Uuid>,
    ) -> AppResult<Option<Subtask>>;

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<bool>;
}

/// Every repository the handlers need, behind trait objects so the engine can be
/// swapped without touching them.
#[derive(Clone)]
pub struct Repositories {
    /// Name of the backing engine, reported by the health check.
    pub engine: &'static str,
    pub users: Arc<dyn UserRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub tags: Arc<dyn TagRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub subtasks: Arc<dyn SubtaskRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self::from_store("postgres", Arc::new(PgStore::new(pool)))
    }

    pub fn in_memory() -> Self {
        Self::from_store("memory", Arc::new(MemoryStore::new()))
    }

    fn from_store<S>(engine: &'static str, store: Arc<S>) -> Self
    where
        S: UserRepository
            + CategoryRepository
            + TagRepository
            + TaskRepository
            + SubtaskRepository
            + 'static,
    {
        Self {
            engine,
            users: store.clone(),
            categories: store.clone(),
            tags: store.clone(),
            tasks: store.clone(),
            subtasks: store,
        }
    }
}
