use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde_json::json;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, Resource},
    models::{ListParams, NameSort, Tag, TagInput},
    routes::listing,
    state::AppState,
    validation::{parse_id, ValidJson},
};

#[post("")]
pub async fn create_tag(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    input: ValidJson<TagInput>,
) -> Result<impl Responder, AppError> {
    let name = input.into_inner().into_name()?;

    let tag = state.repos.tags.create(Tag::new(name, user.id)).await?;
    log::info!("tag {} created by {}", tag.id, user.id);

    Ok(HttpResponse::Created().json(json!({
        "message": "Tag created successfully",
        "tag": tag,
    })))
}

#[get("")]
pub async fn get_tags(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    params: web::Query<ListParams>,
) -> Result<impl Responder, AppError> {
    let query = params.validate::<NameSort>()?;
    let tags = state.repos.tags.list(user.id, &query).await?;
    Ok(listing("tags", tags))
}

#[get("/{id}")]
pub async fn get_tag(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Tag)?;
    let tag = state
        .repos
        .tags
        .find(user.id, id)
        .await?
        .ok_or(AppError::NotFound(Resource::Tag))?;

    Ok(HttpResponse::Ok().json(json!({ "tag": tag })))
}

#[put("/{id}")]
pub async fn update_tag(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    input: ValidJson<TagInput>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Tag)?;
    let name = input.into_inner().into_name()?;

    let tag = state
        .repos
        .tags
        .rename(user.id, id, name)
        .await?
        .ok_or(AppError::NotFound(Resource::Tag))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Tag updated successfully",
        "tag": tag,
    })))
}

/// Deletes a tag and pulls it out of every task that carried it.
#[delete("/{id}")]
pub async fn delete_tag(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = parse_id(&path, Resource::Tag)?;
    let untagged = state
        .repos
        .tags
        .delete(user.id, id)
        .await?
        .ok_or(AppError::NotFound(Resource::Tag))?;
    log::info!("tag {} deleted, removed from {} task(s)", id, untagged);

    Ok(HttpResponse::Ok().json(json!({ "message": "Tag deleted successfully" })))
}
