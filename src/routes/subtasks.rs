use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde_json::json;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, Resource},
    models::{ListParams, Subtask, SubtaskInput, SubtaskSort, SubtaskUpdateInput},
    routes::listing,
    state::AppState,
    validation::{parse_id, ValidJson},
};

/// Creates a subtask under one of the caller's tasks.
///
/// ## Responses:
/// - `201 Created`: `{message, subtask}`.
/// - `422 Unprocessable Entity`: bad fields, or `parentTask` does not resolve.
#[post("")]
pub async fn create_subtask(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    input: ValidJson<SubtaskInput>,
) -> Result<impl Responder, AppError> {
    let new_subtask = input.into_inner().into_new_subtask()?;
    let subtask = state
        .repos
        .subtasks
        .create(Subtask::new(new_subtask, user.id), state.refs_owner(user.id))
        .await?;
    log::info!(
        "subtask {} created under task {} by {}",
        subtask.id,
        subtask.parent_task,
        user.id
    );

    Ok(HttpResponse::Created().json(json!({
        "message": "Subtask created successfully",
        "subtask": subtask,
    })))
}

#[get("")]
pub async fn get_subtasks(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    params: web::Query<ListParams>,
) -> Result<impl Responder, AppError> {
    let query = params.validate::<SubtaskSort>()?;
    let subtasks = state.repos.subtasks.list(user.id, None, &query).await?;
    Ok(listing("subtasks", subtasks))
}

#[get("/{id}")]
pub async fn get_subtask(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Subtask)?;
    let subtask = state
        .repos
        .subtasks
        .find(user.id, id)
        .await?
        .ok_or(AppError::NotFound(Resource::Subtask))?;

    Ok(HttpResponse::Ok().json(json!({ "subtask": subtask })))
}

#[put("/{id}")]
pub async fn update_subtask(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    input: ValidJson<SubtaskUpdateInput>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Subtask)?;
    let changes = input.into_inner().into_changes()?;

    let subtask = state
        .repos
        .subtasks
        .update(user.id, id, changes, state.refs_owner(user.id))
        .await?
        .ok_or(AppError::NotFound(Resource::Subtask))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Subtask updated successfully",
        "subtask": subtask,
    })))
}

#[delete("/{id}")]
pub async fn delete_subtask(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Subtask)?;
    if !state.repos.subtasks.delete(user.id, id).await? {
        return Err(AppError::NotFound(Resource::Subtask));
    }
    log::info!("subtask {} deleted", id);

    Ok(HttpResponse::Ok().json(json!({ "message": "Subtask deleted successfully" })))
}
