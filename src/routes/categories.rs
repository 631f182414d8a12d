use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde_json::json;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, Resource},
    models::{Category, CategoryInput, ListParams, NameSort, TaskSort},
    repository::TaskFilter,
    routes::listing,
    state::AppState,
    validation::{parse_id, ValidJson},
};

/// Creates a category owned by the caller.
///
/// ## Responses:
/// - `201 Created`: `{message, category}`.
/// - `422 Unprocessable Entity`: the name is missing or out of bounds.
#[post("")]
pub async fn create_category(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    input: ValidJson<CategoryInput>,
) -> Result<impl Responder, AppError> {
    let name = input.into_inner().into_name()?;

    let category = state
        .repos
        .categories
        .create(Category::new(name, user.id))
        .await?;
    log::info!("category {} created by {}", category.id, user.id);

    Ok(HttpResponse::Created().json(json!({
        "message": "Category created successfully",
        "category": category,
    })))
}

/// Lists the caller's categories.
///
/// ## Query Parameters:
/// - `search`: case-insensitive substring of the name.
/// - `page`, `limit`, `sortBy` (`name` | `id`), `order`.
///
/// ## Responses:
/// - `200 OK`: `{categories: [...]}`.
/// - `204 No Content`: nothing matched.
#[get("")]
pub async fn get_categories(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    params: web::Query<ListParams>,
) -> Result<impl Responder, AppError> {
    let query = params.validate::<NameSort>()?;
    let categories = state.repos.categories.list(user.id, &query).await?;
    Ok(listing("categories", categories))
}

#[get("/{id}")]
pub async fn get_category(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Category)?;
    let category = state
        .repos
        .categories
        .find(user.id, id)
        .await?
        .ok_or(AppError::NotFound(Resource::Category))?;

    Ok(HttpResponse::Ok().json(json!({ "category": category })))
}

/// Lists the caller's tasks filed under a category, with the task listing options.
///
/// ## Responses:
/// - `200 OK`: `{tasks: [...]}`.
/// - `204 No Content`: the category holds no matching tasks.
/// - `404 Not Found`: the category is not the caller's.
#[get("/{id}/tasks")]
pub async fn get_category_tasks(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    params: web::Query<ListParams>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Category)?;
    let query = params.validate::<TaskSort>()?;

    if state.repos.categories.find(user.id, id).await?.is_none() {
        return Err(AppError::NotFound(Resource::Category));
    }

    let filter = TaskFilter { category: Some(id) };
    let tasks = state.repos.tasks.list(user.id, filter, &query).await?;
    Ok(listing("tasks", tasks))
}

#[put("/{id}")]
pub async fn update_category(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    input: ValidJson<CategoryInput>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Category)?;
    let name = input.into_inner().into_name()?;

    let category = state
        .repos
        .categories
        .rename(user.id, id, name)
        .await?
        .ok_or(AppError::NotFound(Resource::Category))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Category updated successfully",
        "category": category,
    })))
}

/// Deletes a category. Tasks filed under it keep existing with no category.
#[delete("/{id}")]
pub async fn delete_category(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Category)?;
    let detached = state
        .repos
        .categories
        .delete(user.id, id)
        .await?
        .ok_or(AppError::NotFound(Resource::Category))?;
    log::info!("category {} deleted, {} task(s) detached", id, detached);

    Ok(HttpResponse::Ok().json(json!({ "message": "Category deleted successfully" })))
}
