//! In-process storage engine.
//!
//! All tables sit behind one `RwLock`, so a delete and its cascade happen under a
//! single write guard and no reader can observe the half-done state. Writes that
//! carry references resolve them under the same guard. The guard is never held
//! across an `.await`.
//!
//! Text columns order case-insensitively, matching the `lower(...)` ordering of
//! the Postgres engine.

use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Category, ListQuery, NameSort, SortField, SortOrder, Subtask, SubtaskChanges, SubtaskSort,
    Tag, Task, TaskChanges, TaskFile, TaskSort, User,
};
use crate::repository::{
    CategoryRepository, MissingReferences, SubtaskRepository, TagRepository, TaskFilter,
    TaskRepository, UserRepository,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    categories: HashMap<Uuid, Category>,
    tags: HashMap<Uuid, Tag>,
    tasks: HashMap<Uuid, Task>,
    subtasks: HashMap<Uuid, Subtask>,
}

impl Tables {
    fn check_task_refs(
        &self,
        category: Option<Uuid>,
        tags: &[Uuid],
        refs_owner: Option<Uuid>,
    ) -> AppResult<()> {
        let mut missing = MissingReferences::default();
        if let Some(category) = category {
            let found = self
                .categories
                .get(&category)
                .map_or(false, |c| owned_by(c.owner_id, refs_owner));
            if !found {
                missing.category(category);
            }
        }
        for (position, tag) in tags.iter().enumerate() {
            let found = self
                .tags
                .get(tag)
                .map_or(false, |t| owned_by(t.owner_id, refs_owner));
            if !found {
                missing.tag(position, *tag);
            }
        }
        missing.into_result()
    }

    fn check_parent_task(&self, parent_task: Uuid, refs_owner: Option<Uuid>) -> AppResult<()> {
        let mut missing = MissingReferences::default();
        let found = self
            .tasks
            .get(&parent_task)
            .map_or(false, |task| owned_by(task.owner_id, refs_owner));
        if !found {
            missing.parent_task(parent_task);
        }
        missing.into_result()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| AppError::InternalServerError("memory store lock poisoned".into()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| AppError::InternalServerError("memory store lock poisoned".into()))
    }
}

/// How a record orders itself inside a listing.
trait Listed<F: SortField>: Clone {
    fn id(&self) -> Uuid;

    fn compare(&self, other: &Self, field: F, order: SortOrder) -> Ordering;

    fn default_order(&self, other: &Self) -> Ordering;
}

fn by<T: Ord + ?Sized>(a: &T, b: &T, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => a.cmp(b),
        SortOrder::Desc => b.cmp(a),
    }
}

/// Missing values sort last in either direction.
fn by_opt<T: Ord>(a: &Option<T>, b: &Option<T>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => by(a, b, order),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn by_text(a: &str, b: &str, order: SortOrder) -> Ordering {
    by(&a.to_lowercase(), &b.to_lowercase(), order)
}

fn by_opt_text(a: &Option<String>, b: &Option<String>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => by_text(a, b, order),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Sorts, then cuts out the requested page.
fn paginate<T, F>(mut items: Vec<T>, query: &ListQuery<F>) -> Vec<T>
where
    T: Listed<F>,
    F: SortField,
{
    items.sort_by(|a, b| {
        let primary = match query.sort {
            Some((field, order)) => a.compare(b, field, order),
            None => a.default_order(b),
        };
        primary.then_with(|| a.id().cmp(&b.id()))
    });
    items
        .into_iter()
        .skip(query.offset() as usize)
        .take(query.limit as usize)
        .collect()
}

impl Listed<NameSort> for Category {
    fn id(&self) -> Uuid {
        self.id
    }

    fn compare(&self, other: &Self, field: NameSort, order: SortOrder) -> Ordering {
        match field {
            NameSort::Name => by_text(&self.name, &other.name, order),
            NameSort::Id => by(&self.id, &other.id, order),
        }
    }

    fn default_order(&self, other: &Self) -> Ordering {
        by_text(&self.name, &other.name, SortOrder::Asc)
    }
}

impl Listed<NameSort> for Tag {
    fn id(&self) -> Uuid {
        self.id
    }

    fn compare(&self, other: &Self, field: NameSort, order: SortOrder) -> Ordering {
        match field {
            NameSort::Name => by_text(&self.name, &other.name, order),
            NameSort::Id => by(&self.id, &other.id, order),
        }
    }

    fn default_order(&self, other: &Self) -> Ordering {
        by_text(&self.name, &other.name, SortOrder::Asc)
    }
}

impl Listed<TaskSort> for Task {
    fn id(&self) -> Uuid {
        self.id
    }

    fn compare(&self, other: &Self, field: TaskSort, order: SortOrder) -> Ordering {
        match field {
            TaskSort::Title => by_text(&self.title, &other.title, order),
            TaskSort::Description => by_opt_text(&self.description, &other.description, order),
            TaskSort::Due => by_opt(&self.due, &other.due, order),
            TaskSort::Status => by(&self.status, &other.status, order),
            TaskSort::Priority => by(&self.priority, &other.priority, order),
            TaskSort::CreatedAt => by(&self.created_at, &other.created_at, order),
            TaskSort::UpdatedAt => by(&self.updated_at, &other.updated_at, order),
        }
    }

    fn default_order(&self, other: &Self) -> Ordering {
        other.created_at.cmp(&self.created_at)
    }
}

impl Listed<SubtaskSort> for Subtask {
    fn id(&self) -> Uuid {
        self.id
    }

    fn compare(&self, other: &Self, field: SubtaskSort, order: SortOrder) -> Ordering {
        match field {
            SubtaskSort::Title => by_text(&self.title, &other.title, order),
            SubtaskSort::Description => by_opt_text(&self.description, &other.description, order),
            SubtaskSort::Due => by_opt(&self.due, &other.due, order),
            SubtaskSort::Status => by(&self.status, &other.status, order),
            SubtaskSort::Priority => by(&self.priority, &other.priority, order),
            SubtaskSort::ParentTask => by(&self.parent_task, &other.parent_task, order),
            SubtaskSort::CreatedAt => by(&self.created_at, &other.created_at, order),
            SubtaskSort::UpdatedAt => by(&self.updated_at, &other.updated_at, order),
        }
    }

    fn default_order(&self, other: &Self) -> Ordering {
        other.created_at.cmp(&self.created_at)
    }
}

fn owned_by(record_owner: Uuid, owner_id: Option<Uuid>) -> bool {
    owner_id.map_or(true, |owner| owner == record_owner)
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: User) -> AppResult<User> {
        let mut tables = self.write()?;
        let taken = tables
            .users
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&user.email));
        if taken {
            return Err(AppError::ResourceExists(
                "User already exists. Please log in.".into(),
            ));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let tables = self.read()?;
        Ok(tables
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn create(&self, category: Category) -> AppResult<Category> {
        self.write()?.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn find(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Category>> {
        let tables = self.read()?;
        Ok(tables
            .categories
            .get(&id)
            .filter(|category| category.owner_id == owner_id)
            .cloned())
    }

    async fn list(&self, owner_id: Uuid, query: &ListQuery<NameSort>) -> AppResult<Vec<Category>> {
        let tables = self.read()?;
        let matching = tables
            .categories
            .values()
            .filter(|category| category.owner_id == owner_id)
            .filter(|category| {
                query
                    .search
                    .as_deref()
                    .map_or(true, |needle| contains_ci(&category.name, needle))
            })
            .cloned()
            .collect();
        Ok(paginate(matching, query))
    }

    async fn rename(
        &self,
        owner_id: Uuid,
        id: Uuid,
        name: String,
    ) -> AppResult<Option<Category>> {
        let mut tables = self.write()?;
        Ok(tables
            .categories
            .get_mut(&id)
            .filter(|category| category.owner_id == owner_id)
            .map(|category| {
                category.name = name;
                category.clone()
            }))
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<u64>> {
        let mut tables = self.write()?;
        let owned = tables
            .categories
            .get(&id)
            .map_or(false, |category| category.owner_id == owner_id);
        if !owned {
            return Ok(None);
        }
        tables.categories.remove(&id);

        let mut detached = 0;
        for task in tables.tasks.values_mut() {
            if task.category == Some(id) {
                task.category = None;
                detached += 1;
            }
        }
        Ok(Some(detached))
    }
}

#[async_trait]
impl TagRepository for MemoryStore {
    async fn create(&self, tag: Tag) -> AppResult<Tag> {
        self.write()?.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn find(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Tag>> {
        let tables = self.read()?;
        Ok(tables
            .tags
            .get(&id)
            .filter(|tag| tag.owner_id == owner_id)
            .cloned())
    }

    async fn list(&self, owner_id: Uuid, query: &ListQuery<NameSort>) -> AppResult<Vec<Tag>> {
        let tables = self.read()?;
        let matching = tables
            .tags
            .values()
            .filter(|tag| tag.owner_id == owner_id)
            .filter(|tag| {
                query
                    .search
                    .as_deref()
                    .map_or(true, |needle| contains_ci(&tag.name, needle))
            })
            .cloned()
            .collect();
        Ok(paginate(matching, query))
    }

    async fn rename(&self, owner_id: Uuid, id: Uuid, name: String) -> AppResult<Option<Tag>> {
        let mut tables = self.write()?;
        Ok(tables
            .tags
            .get_mut(&id)
            .filter(|tag| tag.owner_id == owner_id)
            .map(|tag| {
                tag.name = name;
                tag.clone()
            }))
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<u64>> {
        let mut tables = self.write()?;
        let owned = tables
            .tags
            .get(&id)
            .map_or(false, |tag| tag.owner_id == owner_id);
        if !owned {
            return Ok(None);
        }
        tables.tags.remove(&id);

        let mut pulled = 0;
        for task in tables.tasks.values_mut() {
            let before = task.tags.len();
            task.tags.retain(|tag| *tag != id);
            if task.tags.len() != before {
                pulled += 1;
            }
        }
        Ok(Some(pulled))
    }
}

fn task_matches(task: &Task, owner_id: Uuid, filter: TaskFilter, query: &ListQuery<TaskSort>) -> bool {
    task.owner_id == owner_id
        && filter.category.map_or(true, |category| task.category == Some(category))
        && query.status.map_or(true, |status| task.status == status)
        && query.priority.map_or(true, |priority| task.priority == priority)
        && query.search.as_deref().map_or(true, |needle| {
            contains_ci(&task.title, needle)
                || task
                    .description
                    .as_deref()
                    .map_or(false, |description| contains_ci(description, needle))
        })
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn create(&self, task: Task, refs_owner: Option<Uuid>) -> AppResult<Task> {
        let mut tables = self.write()?;
        tables.check_task_refs(task.category, &task.tags, refs_owner)?;
        tables.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Task>> {
        let tables = self.read()?;
        Ok(tables
            .tasks
            .get(&id)
            .filter(|task| task.owner_id == owner_id)
            .cloned())
    }

    async fn list(
        &self,
        owner_id: Uuid,
        filter: TaskFilter,
        query: &ListQuery<TaskSort>,
    ) -> AppResult<Vec<Task>> {
        let tables = self.read()?;
        let matching = tables
            .tasks
            .values()
            .filter(|task| task_matches(task, owner_id, filter, query))
            .cloned()
            .collect();
        Ok(paginate(matching, query))
    }

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: TaskChanges,
        refs_owner: Option<Uuid>,
    ) -> AppResult<Option<Task>> {
        let mut tables = self.write()?;
        tables.check_task_refs(
            changes.category.flatten(),
            changes.tags.as_deref().unwrap_or_default(),
            refs_owner,
        )?;
        Ok(tables
            .tasks
            .get_mut(&id)
            .filter(|task| task.owner_id == owner_id)
            .map(|task| {
                task.apply(changes);
                task.clone()
            }))
    }

    async fn replace_files(
        &self,
        owner_id: Uuid,
        id: Uuid,
        files: Vec<TaskFile>,
    ) -> AppResult<Option<Task>> {
        let mut tables = self.write()?;
        Ok(tables
            .tasks
            .get_mut(&id)
            .filter(|task| task.owner_id == owner_id)
            .map(|task| {
                task.files = files;
                task.updated_at = Utc::now();
                task.clone()
            }))
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<u64>> {
        let mut tables = self.write()?;
        let owned = tables
            .tasks
            .get(&id)
            .map_or(false, |task| task.owner_id == owner_id);
        if !owned {
            return Ok(None);
        }
        tables.tasks.remove(&id);

        let orphans: HashSet<Uuid> = tables
            .subtasks
            .values()
            .filter(|subtask| subtask.parent_task == id)
            .map(|subtask| subtask.id)
            .collect();
        tables.subtasks.retain(|subtask_id, _| !orphans.contains(subtask_id));
        Ok(Some(orphans.len() as u64))
    }
}

fn subtask_matches(
    subtask: &Subtask,
    owner_id: Uuid,
    parent_task: Option<Uuid>,
    query: &ListQuery<SubtaskSort>,
) -> bool {
    subtask.owner_id == owner_id
        && parent_task.map_or(true, |parent| subtask.parent_task == parent)
        && query.status.map_or(true, |status| subtask.status == status)
        && query.priority.map_or(true, |priority| subtask.priority == priority)
        && query.search.as_deref().map_or(true, |needle| {
            contains_ci(&subtask.title, needle)
                || subtask
                    .description
                    .as_deref()
                    .map_or(false, |description| contains_ci(description, needle))
        })
}

#[async_trait]
impl SubtaskRepository for MemoryStore {
    async fn create(&self, subtask: Subtask, refs_owner: Option<Uuid>) -> AppResult<Subtask> {
        let mut tables = self.write()?;
        tables.check_parent_task(subtask.parent_task, refs_owner)?;
        tables.subtasks.insert(subtask.id, subtask.clone());
        Ok(subtask)
    }

    async fn find(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Subtask>> {
        let tables = self.read()?;
        Ok(tables
            .subtasks
            .get(&id)
            .filter(|subtask| subtask.owner_id == owner_id)
            .cloned())
    }

    async fn list(
        &self,
        owner_id: Uuid,
        parent_task: Option<Uuid>,
        query: &ListQuery<SubtaskSort>,
    ) -> AppResult<Vec<Subtask>> {
        let tables = self.read()?;
        let matching = tables
            .subtasks
            .values()
            .filter(|subtask| subtask_matches(subtask, owner_id, parent_task, query))
            .cloned()
            .collect();
        Ok(paginate(matching, query))
    }

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: SubtaskChanges,
        refs_owner: Option<Uuid>,
    ) -> AppResult<Option<Subtask>> {
        let mut tables = self.write()?;
        if let Some(parent_task) = changes.parent_task {
            tables.check_parent_task(parent_task, refs_owner)?;
        }
        Ok(tables
            .subtasks
            .get_mut(&id)
            .filter(|subtask| subtask.owner_id == owner_id)
            .map(|subtask| {
                subtask.apply(changes);
                subtask.clone()
            }))
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<bool> {
        let mut tables = self.write()?;
        let owned = tables
            .subtasks
            .get(&id)
            .map_or(false, |subtask| subtask.owner_id == owner_id);
        if owned {
            tables.subtasks.remove(&id);
        }
        Ok(owned)
    }
}
