mod common;

use actix_web::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{delete, error_fields, get, init_app, post, put, register_and_login, send, test_state};

fn names(body: &Value, key: &str) -> Vec<String> {
    body[key]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect()
}

#[test_log::test(actix_rt::test)]
async fn test_category_crud_flow() {
    let app = init_app(test_state()).await;
    let token = register_and_login(&app, "Ada", "ada@example.com").await;

    let (status, body) = send(&app, post("/categories", &token, json!({ "name": "Work" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Category created successfully");
    assert_eq!(body["category"]["name"], "Work");
    let id = body["category"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get(&format!("/categories/{}", id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"]["id"], id.as_str());

    let (status, body) = send(
        &app,
        put(&format!("/categories/{}", id), &token, json!({ "name": "Office" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Category updated successfully");
    assert_eq!(body["category"]["name"], "Office");

    let (status, body) = send(&app, delete(&format!("/categories/{}", id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Category deleted successfully");

    let (status, body) = send(&app, get(&format!("/categories/{}", id), &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "resource_does_not_exist");
}

#[test_log::test(actix_rt::test)]
async fn test_category_name_bounds() {
    let app = init_app(test_state()).await;
    let token = register_and_login(&app, "Ada", "ada@example.com").await;

    for payload in [json!({}), json!({ "name": "ab" }), json!({ "name": "x".repeat(51) })] {
        let (status, body) = send(&app, post("/categories", &token, payload.clone())).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "payload: {}", payload);
        assert_eq!(error_fields(&body), vec!["name"]);
    }
}

#[test_log::test(actix_rt::test)]
async fn test_categories_are_owner_scoped() {
    let app = init_app(test_state()).await;
    let owner = register_and_login(&app, "Ada", "ada@example.com").await;
    let intruder = register_and_login(&app, "Eve", "eve@example.com").await;

    let (_, body) = send(&app, post("/categories", &owner, json!({ "name": "Private" }))).await;
    let uri = format!("/categories/{}", body["category"]["id"].as_str().unwrap());

    let (status, body) = send(&app, get(&uri, &intruder)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "resource_does_not_exist");

    let (status, _) = send(&app, put(&uri, &intruder, json!({ "name": "Stolen" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, delete(&uri, &intruder)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/categories", &intruder)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, get(&uri, &owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"]["name"], "Private");
}

#[test_log::test(actix_rt::test)]
async fn test_malformed_id_is_not_found() {
    let app = init_app(test_state()).await;
    let token = register_and_login(&app, "Ada", "ada@example.com").await;

    let (status, body) = send(&app, get("/categories/not-a-uuid", &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Category not found");
}

#[test_log::test(actix_rt::test)]
async fn test_category_listing_search_sort_and_paging() {
    let app = init_app(test_state()).await;
    let token = register_and_login(&app, "Ada", "ada@example.com").await;

    for name in ["Work", "Home", "Homework", "Errands"] {
        let (status, _) = send(&app, post("/categories", &token, json!({ "name": name }))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, get("/categories", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body, "categories"), vec!["Errands", "Home", "Homework", "Work"]);

    let (_, body) = send(&app, get("/categories?search=WORK&sortBy=name&order=desc", &token)).await;
    assert_eq!(names(&body, "categories"), vec!["Work", "Homework"]);

    let (_, body) = send(&app, get("/categories?page=2&limit=3", &token)).await;
    assert_eq!(names(&body, "categories"), vec!["Work"]);

    let (status, _) = send(&app, get("/categories?page=3&limit=3", &token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, get("/categories?sortBy=title&page=0", &token)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_fields(&body), vec!["page", "sortBy"]);
}

#[test_log::test(actix_rt::test)]
async fn test_deleting_category_detaches_tasks() {
    let app = init_app(test_state()).await;
    let token = register_and_login(&app, "Ada", "ada@example.com").await;

    let (_, body) = send(&app, post("/categories", &token, json!({ "name": "Work" }))).await;
    let category_id = body["category"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        post("/tasks", &token, json!({ "title": "Quarterly report", "category": category_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let task_uri = format!("/tasks/{}", body["task"]["id"].as_str().unwrap());

    let (status, body) = send(&app, get(&format!("/categories/{}/tasks", category_id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tasks"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, delete(&format!("/categories/{}", category_id), &token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get(&task_uri, &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task"]["category"], Value::Null);

    let (status, _) = send(&app, get(&format!("/categories/{}/tasks", category_id), &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test_log::test(actix_rt::test)]
async fn test_category_tasks_only_lists_own_tasks() {
    let app = init_app(test_state()).await;
    let owner = register_and_login(&app, "Ada", "ada@example.com").await;
    let other = register_and_login(&app, "Bob", "bob@example.com").await;

    let (_, body) = send(&app, post("/categories", &owner, json!({ "name": "Shared" }))).await;
    let category_id = body["category"]["id"].as_str().unwrap().to_string();

    // Existence-only reference checks let another user file a task here.
    let (status, _) = send(
        &app,
        post("/tasks", &other, json!({ "title": "Foreign task", "category": category_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, get(&format!("/categories/{}/tasks", category_id), &owner)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
