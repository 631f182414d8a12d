//! PostgreSQL storage engine built on `sqlx`.
//!
//! Queries are assembled at runtime with `QueryBuilder`; every user-supplied value
//! is bound, and sort columns come from the static whitelist in `SortField`.
//! Each delete and its cascade run inside one transaction. Writes that carry
//! references lock the referenced rows `FOR KEY SHARE` in the transaction that
//! performs the write, so a concurrent delete either waits for the write to
//! commit (and then cascades over it) or wins and makes the write fail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, types::Json, FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Category, ListQuery, NameSort, SortField, Subtask, SubtaskChanges, SubtaskSort, Tag, Task,
    TaskChanges, TaskFile, TaskPriority, TaskSort, TaskStatus, User,
};
use crate::repository::{
    CategoryRepository, MissingReferences, SubtaskRepository, TagRepository, TaskFilter,
    TaskRepository, UserRepository,
};

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at";
const TASK_COLUMNS: &str = "id, title, description, due, status, priority, category_id, tag_ids, \
                            files, owner_id, created_at, updated_at";
const SUBTASK_COLUMNS: &str = "id, title, description, due, status, priority, parent_task_id, \
                               owner_id, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Row shape of the `tasks` table.
#[derive(Debug, FromRow)]
struct TaskRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    due: Option<DateTime<Utc>>,
    status: TaskStatus,
    priority: TaskPriority,
    category_id: Option<Uuid>,
    tag_ids: Vec<Uuid>,
    files: Json<Vec<TaskFile>>,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            id: row.id,
            title: row.title,
            description: row.description,
            due: row.due,
            status: row.status,
            priority: row.priority,
            category: row.category_id,
            tags: row.tag_ids,
            files: row.files.0,
            owner_id: row.owner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Escapes `LIKE` wildcards so the search term matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Text columns order by their lowercased bytes, independent of the database collation.
fn order_expr<F: SortField>(field: F) -> String {
    if field.is_text() {
        format!("lower({}) COLLATE \"C\"", field.column())
    } else {
        field.column().to_string()
    }
}

/// Appends `ORDER BY`, `LIMIT` and `OFFSET`.
fn push_page<F: SortField>(qb: &mut QueryBuilder<'_, Postgres>, query: &ListQuery<F>, default_order: &str) {
    match query.sort {
        Some((field, order)) => {
            qb.push(format!(
                " ORDER BY {} {} NULLS LAST, id ASC",
                order_expr(field),
                order.as_sql()
            ));
        }
        None => {
            qb.push(format!(" ORDER BY {}, id ASC", default_order));
        }
    }
    qb.push(" LIMIT ")
        .push_bind(i64::from(query.limit))
        .push(" OFFSET ")
        .push_bind(query.offset() as i64);
}

/// Appends the status/priority/search filters shared by tasks and subtasks.
fn push_work_filters<F>(qb: &mut QueryBuilder<'_, Postgres>, query: &ListQuery<F>) {
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(priority) = query.priority {
        qb.push(" AND priority = ").push_bind(priority);
    }
    if let Some(search) = &query.search {
        let pattern = like_pattern(search);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

async fn fetch_named<T>(
    pool: &PgPool,
    table: &str,
    owner_id: Uuid,
    query: &ListQuery<NameSort>,
) -> AppResult<Vec<T>>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT id, name, owner_id FROM {} WHERE owner_id = ",
        table
    ));
    qb.push_bind(owner_id);
    if let Some(search) = &query.search {
        qb.push(" AND name ILIKE ").push_bind(like_pattern(search));
    }
    push_page(&mut qb, query, "lower(name) COLLATE \"C\" ASC");
    Ok(qb.build_query_as::<T>().fetch_all(pool).await?)
}

/// Locks the category and tags a task points at, reporting any that do not resolve.
async fn lock_task_refs(
    conn: &mut PgConnection,
    category: Option<Uuid>,
    tags: &[Uuid],
    refs_owner: Option<Uuid>,
) -> AppResult<()> {
    let mut missing = MissingReferences::default();
    if let Some(category) = category {
        let found = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM categories WHERE id = $1 AND ($2::uuid IS NULL OR owner_id = $2) \
             FOR KEY SHARE",
        )
        .bind(category)
        .bind(refs_owner)
        .fetch_optional(&mut *conn)
        .await?;
        if found.is_none() {
            missing.category(category);
        }
    }
    if !tags.is_empty() {
        let found: HashSet<Uuid> = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM tags WHERE id = ANY($1) AND ($2::uuid IS NULL OR owner_id = $2) \
             FOR KEY SHARE",
        )
        .bind(tags)
        .bind(refs_owner)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();
        for (position, tag) in tags.iter().enumerate() {
            if !found.contains(tag) {
                missing.tag(position, *tag);
            }
        }
    }
    missing.into_result()
}

async fn lock_parent_task(
    conn: &mut PgConnection,
    parent_task: Uuid,
    refs_owner: Option<Uuid>,
) -> AppResult<()> {
    let found = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM tasks WHERE id = $1 AND ($2::uuid IS NULL OR owner_id = $2) FOR KEY SHARE",
    )
    .bind(parent_task)
    .bind(refs_owner)
    .fetch_optional(&mut *conn)
    .await?;

    let mut missing = MissingReferences::default();
    if found.is_none() {
        missing.parent_task(parent_task);
    }
    missing.into_result()
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create(&self, user: User) -> AppResult<User> {
        let sql = format!(
            "INSERT INTO users ({cols}) VALUES ($1, $2, $3, $4, $5) RETURNING {cols}",
            cols = USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::ResourceExists(_) => {
                    AppError::ResourceExists("User already exists. Please log in.".into())
                }
                other => other,
            })
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1)",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl CategoryRepository for PgStore {
    async fn create(&self, category: Category) -> AppResult<Category> {
        Ok(sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name, owner_id) VALUES ($1, $2, $3) \
             RETURNING id, name, owner_id",
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(category.owner_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Category>> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT id, name, owner_id FROM categories WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list(&self, owner_id: Uuid, query: &ListQuery<NameSort>) -> AppResult<Vec<Category>> {
        fetch_named(&self.pool, "categories", owner_id, query).await
    }

    async fn rename(
        &self,
        owner_id: Uuid,
        id: Uuid,
        name: String,
    ) -> AppResult<Option<Category>> {
        Ok(sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = $1 WHERE id = $2 AND owner_id = $3 \
             RETURNING id, name, owner_id",
        )
        .bind(name)
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM categories WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let detached = sqlx::query("UPDATE tasks SET category_id = NULL WHERE category_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(detached.rows_affected()))
    }
}

#[async_trait]
impl TagRepository for PgStore {
    async fn create(&self, tag: Tag) -> AppResult<Tag> {
        Ok(sqlx::query_as::<_, Tag>(
            "INSERT INTO tags (id, name, owner_id) VALUES ($1, $2, $3) RETURNING id, name, owner_id",
        )
        .bind(tag.id)
        .bind(&tag.name)
        .bind(tag.owner_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Tag>> {
        Ok(sqlx::query_as::<_, Tag>(
            "SELECT id, name, owner_id FROM tags WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list(&self, owner_id: Uuid, query: &ListQuery<NameSort>) -> AppResult<Vec<Tag>> {
        fetch_named(&self.pool, "tags", owner_id, query).await
    }

    async fn rename(&self, owner_id: Uuid, id: Uuid, name: String) -> AppResult<Option<Tag>> {
        Ok(sqlx::query_as::<_, Tag>(
            "UPDATE tags SET name = $1 WHERE id = $2 AND owner_id = $3 RETURNING id, name, owner_id",
        )
        .bind(name)
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM tags WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let pulled = sqlx::query(
            "UPDATE tasks SET tag_ids = array_remove(tag_ids, $1) WHERE $1 = ANY(tag_ids)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(pulled.rows_affected()))
    }
}

#[async_trait]
impl TaskRepository for PgStore {
    async fn create(&self, task: Task, refs_owner: Option<Uuid>) -> AppResult<Task> {
        let mut tx = self.pool.begin().await?;
        lock_task_refs(&mut *tx, task.category, &task.tags, refs_owner).await?;

        let sql = format!(
            "INSERT INTO tasks ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {cols}",
            cols = TASK_COLUMNS
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(task.id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.due)
            .bind(task.status)
            .bind(task.priority)
            .bind(task.category)
            .bind(&task.tags)
            .bind(Json(&task.files))
            .bind(task.owner_id)
            .bind(task.created_at)
            .bind(task.updated_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn find(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE id = $1 AND owner_id = $2",
            TASK_COLUMNS
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Task::from))
    }

    async fn list(
        &self,
        owner_id: Uuid,
        filter: TaskFilter,
        query: &ListQuery<TaskSort>,
    ) -> AppResult<Vec<Task>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM tasks WHERE owner_id = ",
            TASK_COLUMNS
        ));
        qb.push_bind(owner_id);
        if let Some(category) = filter.category {
            qb.push(" AND category_id = ").push_bind(category);
        }
        push_work_filters(&mut qb, query);
        push_page(&mut qb, query, "created_at DESC");

        let rows = qb.build_query_as::<TaskRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Task::from).collect())
    }

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: TaskChanges,
        refs_owner: Option<Uuid>,
    ) -> AppResult<Option<Task>> {
        let mut tx = self.pool.begin().await?;
        lock_task_refs(
            &mut *tx,
            changes.category.flatten(),
            changes.tags.as_deref().unwrap_or_default(),
            refs_owner,
        )
        .await?;

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE tasks SET updated_at = ");
        qb.push_bind(Utc::now());
        if let Some(title) = changes.title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(description) = changes.description {
            qb.push(", description = ").push_bind(description);
        }
        if let Some(due) = changes.due {
            qb.push(", due = ").push_bind(due);
        }
        if let Some(status) = changes.status {
            qb.push(", status = ").push_bind(status);
        }
        if let Some(priority) = changes.priority {
            qb.push(", priority = ").push_bind(priority);
        }
        if let Some(category) = changes.category {
            qb.push(", category_id = ").push_bind(category);
        }
        if let Some(tags) = changes.tags {
            qb.push(", tag_ids = ").push_bind(tags);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND owner_id = ")
            .push_bind(owner_id)
            .push(format!(" RETURNING {}", TASK_COLUMNS));

        let row = qb
            .build_query_as::<TaskRow>()
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.map(Task::from))
    }

    async fn replace_files(
        &self,
        owner_id: Uuid,
        id: Uuid,
        files: Vec<TaskFile>,
    ) -> AppResult<Option<Task>> {
        let sql = format!(
            "UPDATE tasks SET files = $1, updated_at = $2 WHERE id = $3 AND owner_id = $4 \
             RETURNING {}",
            TASK_COLUMNS
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(Json(files))
            .bind(Utc::now())
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Task::from))
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM tasks WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let removed = sqlx::query("DELETE FROM subtasks WHERE parent_task_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(removed.rows_affected()))
    }
}

#[async_trait]
impl SubtaskRepository for PgStore {
    async fn create(&self, subtask: Subtask, refs_owner: Option<Uuid>) -> AppResult<Subtask> {
        let mut tx = self.pool.begin().await?;
        lock_parent_task(&mut *tx, subtask.parent_task, refs_owner).await?;

        let sql = format!(
            "INSERT INTO subtasks ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {cols}",
            cols = SUBTASK_COLUMNS
        );
        let created = sqlx::query_as::<_, Subtask>(&sql)
            .bind(subtask.id)
            .bind(&subtask.title)
            .bind(&subtask.description)
            .bind(subtask.due)
            .bind(subtask.status)
            .bind(subtask.priority)
            .bind(subtask.parent_task)
            .bind(subtask.owner_id)
            .bind(subtask.created_at)
            .bind(subtask.updated_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn find(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Subtask>> {
        let sql = format!(
            "SELECT {} FROM subtasks WHERE id = $1 AND owner_id = $2",
            SUBTASK_COLUMNS
        );
        Ok(sqlx::query_as::<_, Subtask>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list(
        &self,
        owner_id: Uuid,
        parent_task: Option<Uuid>,
        query: &ListQuery<SubtaskSort>,
    ) -> AppResult<Vec<Subtask>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM subtasks WHERE owner_id = ",
            SUBTASK_COLUMNS
        ));
        qb.push_bind(owner_id);
        if let Some(parent) = parent_task {
            qb.push(" AND parent_task_id = ").push_bind(parent);
        }
        push_work_filters(&mut qb, query);
        push_page(&mut qb, query, "created_at DESC");

        Ok(qb.build_query_as::<Subtask>().fetch_all(&self.pool).await?)
    }

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: SubtaskChanges,
        refs_owner: Option<Uuid>,
    ) -> AppResult<Option<Subtask>> {
        let mut tx = self.pool.begin().await?;
        if let Some(parent_task) = changes.parent_task {
            lock_parent_task(&mut *tx, parent_task, refs_owner).await?;
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE subtasks SET updated_at = ");
        qb.push_bind(Utc::now());
        if let Some(title) = changes.title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(description) = changes.description {
            qb.push(", description = ").push_bind(description);
        }
        if let Some(due) = changes.due {
            qb.push(", due = ").push_bind(due);
        }
        if let Some(status) = changes.status {
            qb.push(", status = ").push_bind(status);
        }
        if let Some(priority) = changes.priority {
            qb.push(", priority = ").push_bind(priority);
        }
        if let Some(parent_task) = changes.parent_task {
            qb.push(", parent_task_id = ").push_bind(parent_task);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND owner_id = ")
            .push_bind(owner_id)
            .push(format!(" RETURNING {}", SUBTASK_COLUMNS));

        let updated = qb
            .build_query_as::<Subtask>()
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM subtasks WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SortOrder;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("report"), "%report%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_push_page_uses_whitelisted_column() {
        let query = ListQuery {
            page: 3,
            limit: 5,
            sort: Some((TaskSort::CreatedAt, SortOrder::Asc)),
            ..ListQuery::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM tasks");
        push_page(&mut qb, &query, "created_at DESC");

        assert_eq!(
            qb.sql(),
            "SELECT * FROM tasks ORDER BY created_at ASC NULLS LAST, id ASC LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn test_push_page_orders_text_case_insensitively() {
        let query = ListQuery {
            sort: Some((TaskSort::Title, SortOrder::Desc)),
            ..ListQuery::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM tasks");
        push_page(&mut qb, &query, "created_at DESC");

        assert_eq!(
            qb.sql(),
            "SELECT * FROM tasks ORDER BY lower(title) COLLATE \"C\" DESC NULLS LAST, id ASC \
             LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn test_push_page_default_order() {
        let query = ListQuery::<NameSort>::default();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM tags");
        push_page(&mut qb, &query, "name ASC");

        assert_eq!(
            qb.sql(),
            "SELECT * FROM tags ORDER BY name ASC, id ASC LIMIT $1 OFFSET $2"
        );
    }
}
