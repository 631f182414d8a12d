mod common;

use actix_web::{http::StatusCode, test};
use pretty_assertions::assert_eq;
use serde_json::json;

use common::{error_fields, init_app, send, test_state, PASSWORD};

#[test_log::test(actix_rt::test)]
async fn test_signup_and_login_flow() {
    let app = init_app(test_state()).await;

    let signup = json!({
        "name": "Integration User",
        "email": "integration@example.com",
        "password": PASSWORD
    });
    let (status, body) = send(
        &app,
        test::TestRequest::post().uri("/auth/signup").set_json(&signup),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);
    assert_eq!(body["message"], "User registered successfully!");
    assert_eq!(body["user"]["email"], "integration@example.com");
    assert_eq!(body["user"]["name"], "Integration User");
    assert!(body["user"]["id"].is_string());
    assert!(body["user"].get("password").is_none());
    assert!(body["user"].get("passwordHash").is_none());

    let (status, body) = send(
        &app,
        test::TestRequest::post().uri("/auth/login").set_json(json!({
            "email": "integration@example.com",
            "password": PASSWORD
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    assert_eq!(body["message"], "Login successful!");
    assert_eq!(body["user"]["name"], "Integration User");
    let token = body["token"].as_str().unwrap();
    assert!(!token.is_empty());

    let (status, _) = send(
        &app,
        test::TestRequest::get()
            .uri("/tasks")
            .insert_header(("Authorization", format!("Bearer {}", token))),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[test_log::test(actix_rt::test)]
async fn test_duplicate_signup_is_rejected() {
    let app = init_app(test_state()).await;
    let signup = json!({
        "name": "First",
        "email": "dup@example.com",
        "password": PASSWORD
    });

    let (status, _) = send(
        &app,
        test::TestRequest::post().uri("/auth/signup").set_json(&signup),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        test::TestRequest::post().uri("/auth/signup").set_json(json!({
            "name": "Second",
            "email": "DUP@example.com",
            "password": "another-password"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "resource_exists");
    assert_eq!(body["message"], "User already exists. Please log in.");

    // The original account still logs in with its own password.
    let (status, body) = send(
        &app,
        test::TestRequest::post().uri("/auth/login").set_json(json!({
            "email": "dup@example.com",
            "password": PASSWORD
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "First");
}

#[test_log::test(actix_rt::test)]
async fn test_login_failures_have_distinct_messages() {
    let app = init_app(test_state()).await;
    common::register_and_login(&app, "Ada", "ada@example.com").await;

    let (status, unknown) = send(
        &app,
        test::TestRequest::post().uri("/auth/login").set_json(json!({
            "email": "nobody@example.com",
            "password": PASSWORD
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown["code"], "auth_error");
    assert_eq!(unknown["message"], "Incorrect email.");

    let (status, wrong) = send(
        &app,
        test::TestRequest::post().uri("/auth/login").set_json(json!({
            "email": "ada@example.com",
            "password": "wrong-password"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong["code"], "auth_error");
    assert_eq!(wrong["message"], "Incorrect password.");
}

#[test_log::test(actix_rt::test)]
async fn test_invalid_signup_inputs() {
    let app = init_app(test_state()).await;

    let cases = vec![
        (
            json!({ "email": "test@example.com", "password": PASSWORD }),
            vec!["name"],
        ),
        (
            json!({ "name": "Test", "email": "not-an-email", "password": "short" }),
            vec!["email", "password"],
        ),
        (json!({}), vec!["email", "name", "password"]),
        (
            json!({ "name": ["Test"], "email": 42, "password": "short" }),
            vec!["email", "name", "password"],
        ),
    ];

    for (payload, expected) in cases {
        let (status, body) = send(
            &app,
            test::TestRequest::post().uri("/auth/signup").set_json(&payload),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "payload: {}", payload);
        assert_eq!(body["code"], "validation_error");
        assert_eq!(error_fields(&body), expected, "payload: {}", payload);
    }
}

#[test_log::test(actix_rt::test)]
async fn test_malformed_body_is_a_validation_error() {
    let app = init_app(test_state()).await;

    let (status, body) = send(
        &app,
        test::TestRequest::post()
            .uri("/auth/signup")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{\"name\": 42"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");
    assert_eq!(error_fields(&body), vec!["body"]);
}

#[test_log::test(actix_rt::test)]
async fn test_protected_routes_require_a_token() {
    let app = init_app(test_state()).await;

    let (status, body) = send(&app, test::TestRequest::get().uri("/categories")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "auth_error");
    assert_eq!(
        body["message"],
        "Authentication failed: Missing Authorization header."
    );

    let (status, body) = send(
        &app,
        test::TestRequest::get()
            .uri("/tags")
            .insert_header(("Authorization", "Token abc")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Authentication failed: Token not found.");

    let (status, body) = send(
        &app,
        test::TestRequest::get()
            .uri("/subtasks")
            .insert_header(("Authorization", "Bearer not.a.jwt")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body["message"],
        "Authentication failed: Invalid or expired token."
    );
}

#[test_log::test(actix_rt::test)]
async fn test_health_is_public() {
    let app = init_app(test_state()).await;

    let (status, body) = send(&app, test::TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
