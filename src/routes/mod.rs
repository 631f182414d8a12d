pub mod auth;
pub mod categories;
pub mod health;
pub mod subtasks;
pub mod tags;
pub mod tasks;

use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::auth::AuthMiddleware;
use crate::validation::{json_error_handler, query_error_handler};

/// Renders a listing as `{<key>: [...]}`; an empty one is sent as 204.
pub(crate) fn listing<T: Serialize>(key: &str, items: Vec<T>) -> HttpResponse {
    let mut response = if items.is_empty() {
        HttpResponse::NoContent()
    } else {
        HttpResponse::Ok()
    };
    let mut body = Map::new();
    body.insert(key.to_string(), json!(items));
    response.json(Value::Object(body))
}

/// Registers every route. `/health` and `/auth` are public; the resource scopes
/// sit behind `AuthMiddleware`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .service(health::health)
        .service(
            web::scope("/auth")
                .service(auth::signup)
                .service(auth::login),
        )
        .service(
            web::scope("/categories")
                .wrap(AuthMiddleware)
                .service(categories::create_category)
                .service(categories::get_categories)
                .service(categories::get_category)
                .service(categories::get_category_tasks)
                .service(categories::update_category)
                .service(categories::delete_category),
        )
        .service(
            web::scope("/tags")
                .wrap(AuthMiddleware)
                .service(tags::create_tag)
                .service(tags::get_tags)
                .service(tags::get_tag)
                .service(tags::update_tag)
                .service(tags::delete_tag),
        )
        .service(
            web::scope("/tasks")
                .wrap(AuthMiddleware)
                .service(tasks::create_task)
                .service(tasks::get_tasks)
                .service(tasks::get_task)
                .service(tasks::get_task_subtasks)
                .service(tasks::upload_files)
                .service(tasks::update_task)
                .service(tasks::delete_task),
        )
        .service(
            web::scope("/subtasks")
                .wrap(AuthMiddleware)
                .service(subtasks::create_subtask)
                .service(subtasks::get_subtasks)
                .service(subtasks::get_subtask)
                .service(subtasks::update_subtask)
                .service(subtasks::delete_subtask),
        );
}
