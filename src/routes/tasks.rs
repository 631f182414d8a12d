use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde_json::json;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, Resource},
    models::{FileUploadInput, ListParams, SubtaskSort, Task, TaskInput, TaskSort, TaskUpdateInput},
    repository::TaskFilter,
    routes::listing,
    state::AppState,
    validation::{parse_id, ValidJson},
};

/// Creates a task owned by the caller.
///
/// ## Request Body:
/// - `title` (required), `description`, `due`, `status`, `priority`.
/// - `category`: id of an existing category.
/// - `tags`: ids of existing tags. Duplicates are dropped.
/// - `files`: metadata of already stored files.
///
/// ## Responses:
/// - `201 Created`: `{message, task}`.
/// - `422 Unprocessable Entity`: `validation_error` for bad fields, `invalid_reference`
///   when the category or any tag does not resolve.
#[post("")]
pub async fn create_task(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    input: ValidJson<TaskInput>,
) -> Result<impl Responder, AppError> {
    let new_task = input.into_inner().into_new_task()?;
    let task = state
        .repos
        .tasks
        .create(Task::new(new_task, user.id), state.refs_owner(user.id))
        .await?;
    log::info!("task {} created by {}", task.id, user.id);

    Ok(HttpResponse::Created().json(json!({
        "message": "Task created successfully",
        "task": task,
    })))
}

/// Lists the caller's tasks.
///
/// ## Query Parameters:
/// - `status`, `priority`: exact match.
/// - `search`: case-insensitive substring of the title or description.
/// - `page`, `limit`, `sortBy`, `order`.
///
/// ## Responses:
/// - `200 OK`: `{tasks: [...]}`.
/// - `204 No Content`: nothing matched.
#[get("")]
pub async fn get_tasks(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    params: web::Query<ListParams>,
) -> Result<impl Responder, AppError> {
    let query = params.validate::<TaskSort>()?;
    let tasks = state
        .repos
        .tasks
        .list(user.id, TaskFilter::default(), &query)
        .await?;
    Ok(listing("tasks", tasks))
}

#[get("/{id}")]
pub async fn get_task(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Task)?;
    let task = state
        .repos
        .tasks
        .find(user.id, id)
        .await?
        .ok_or(AppError::NotFound(Resource::Task))?;

    Ok(HttpResponse::Ok().json(json!({ "task": task })))
}

/// Lists the subtasks of one of the caller's tasks.
#[get("/{id}/subtasks")]
pub async fn get_task_subtasks(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    params: web::Query<ListParams>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Task)?;
    let query = params.validate::<SubtaskSort>()?;

    if state.repos.tasks.find(user.id, id).await?.is_none() {
        return Err(AppError::NotFound(Resource::Task));
    }

    let subtasks = state.repos.subtasks.list(user.id, Some(id), &query).await?;
    Ok(listing("subtasks", subtasks))
}

/// Partially updates a task. Only supplied fields change; `"category": null`
/// removes the task from its category.
///
/// ## Responses:
/// - `200 OK`: `{message, task}`.
/// - `404 Not Found`: the task is not the caller's.
/// - `422 Unprocessable Entity`: bad fields or unresolved references.
#[put("/{id}")]
pub async fn update_task(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    input: ValidJson<TaskUpdateInput>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Task)?;
    let changes = input.into_inner().into_changes()?;

    let task = state
        .repos
        .tasks
        .update(user.id, id, changes, state.refs_owner(user.id))
        .await?
        .ok_or(AppError::NotFound(Resource::Task))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Task updated successfully",
        "task": task,
    })))
}

/// Replaces the file metadata attached to a task.
///
/// ## Responses:
/// - `200 OK`: `{message, task}`.
/// - `404 Not Found`: the task is not the caller's.
/// - `422 Unprocessable Entity`: no files, or a file breaks the size/type rules.
#[post("/{id}/upload")]
pub async fn upload_files(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    input: ValidJson<FileUploadInput>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Task)?;
    if input.files.is_empty() {
        return Err(AppError::invalid("files", "required", "No files were uploaded."));
    }

    let FileUploadInput { files } = input.into_inner();
    let count = files.len();
    let task = state
        .repos
        .tasks
        .replace_files(user.id, id, files)
        .await?
        .ok_or(AppError::NotFound(Resource::Task))?;
    log::info!("{} file(s) attached to task {}", count, task.id);

    Ok(HttpResponse::Ok().json(json!({
        "message": "Files uploaded successfully",
        "task": task,
    })))
}

/// Deletes a task together with all of its subtasks.
#[delete("/{id}")]
pub async fn delete_task(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Task)?;
    let removed = state
        .repos
        .tasks
        .delete(user.id, id)
        .await?
        .ok_or(AppError::NotFound(Resource::Task))?;
    log::info!("task {} deleted with {} subtask(s)", id, removed);

    Ok(HttpResponse::Ok().json(json!({ "message": "Task deleted successfully" })))
}
