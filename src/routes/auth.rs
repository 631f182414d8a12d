use actix_web::{post, web, HttpResponse, Responder};
use serde_json::json;

use crate::{
    auth::{hash_password, verify_password, Identity},
    error::{AppError, AuthFailure},
    models::{LoginRequest, SignupRequest, User, UserSummary},
    state::AppState,
    validation::ValidJson,
};

fn required(value: Option<String>, field: &str, message: &str) -> Result<String, AppError> {
    value.ok_or_else(|| AppError::invalid(field, "required", message))
}

/// Register a new user
///
/// Creates an account; the password is stored as a bcrypt hash, computed on the
/// blocking thread pool. Emails are unique regardless of case.
#[post("/signup")]
pub async fn signup(
    state: web::Data<AppState>,
    signup_data: ValidJson<SignupRequest>,
) -> Result<impl Responder, AppError> {
    let SignupRequest {
        name,
        email,
        password,
    } = signup_data.into_inner();
    let name = required(name, "name", "Name is required")?;
    let email = required(email, "email", "Email is required")?;
    let password = required(password, "password", "Password is required")?;

    let cost = state.bcrypt_cost;
    let password_hash = web::block(move || hash_password(&password, cost)).await??;
    let user = state
        .repos
        .users
        .create(User::new(name, email, password_hash))
        .await?;
    log::info!("user {} registered", user.id);

    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully!",
        "user": UserSummary::from(&user),
    })))
}

/// Login user
///
/// Authenticates a user and returns a session token. An unknown email and a wrong
/// password are both 401 but carry different messages.
#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    login_data: ValidJson<LoginRequest>,
) -> Result<impl Responder, AppError> {
    let LoginRequest { email, password } = login_data.into_inner();
    let email = required(email, "email", "Email is required")?;
    let password = required(password, "password", "Password is required")?;

    let user = match state.repos.users.find_by_email(&email).await? {
        Some(user) => user,
        None => {
            log::warn!("login rejected: unknown email");
            return Err(AppError::Unauthorized(AuthFailure::IncorrectEmail));
        }
    };

    let stored_hash = user.password_hash.clone();
    if !web::block(move || verify_password(&password, &stored_hash)).await?? {
        log::warn!("login rejected for user {}: wrong password", user.id);
        return Err(AppError::Unauthorized(AuthFailure::IncorrectPassword));
    }

    let summary = UserSummary::from(&user);
    let token = state.tokens.issue(&Identity {
        id: user.id,
        email: user.email,
        name: user.name,
    })?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Login successful!",
        "token": token,
        "user": summary,
    })))
}
