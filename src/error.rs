//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used throughout the application.
//! Every failure a handler can produce is one of its variants, and each variant knows its
//! HTTP status and its stable machine-readable `code`.
//!
//! `AppError` implements `actix_web::error::ResponseError`, so handlers simply return
//! `Result<_, AppError>` and the translation to the uniform `{code, message}` envelope
//! happens here and nowhere else. Validation and referential failures additionally carry
//! the full list of field-level violations under `errors`.
//!
//! `From` implementations for `sqlx::Error`, `validator::ValidationErrors`,
//! `jsonwebtoken::errors::Error` and `bcrypt::BcryptError` allow easy conversion with `?`.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::ValidationErrors;

pub const VALIDATION_FAILED: &str = "Validation failed. Invalid input.";
pub const INVALID_REFERENCE: &str = "One or more referenced resources do not exist.";
pub const INTERNAL_SERVER_ERROR: &str = "An internal server error occurred.";

pub type AppResult<T> = Result<T, AppError>;

/// A single field-level problem found while checking a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Name of the offending field as the client spelled it (camelCase).
    pub field: String,
    /// Short machine-readable rule name, e.g. `length` or `required`.
    pub code: String,
    /// Human readable explanation.
    pub message: String,
}

impl FieldViolation {
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Why a request failed authentication.
///
/// Every reason maps to the same status (401) and code (`auth_error`); only the
/// message differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingHeader,
    MissingToken,
    InvalidToken,
    IncorrectEmail,
    IncorrectPassword,
}

impl AuthFailure {
    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::MissingHeader => "Authentication failed: Missing Authorization header.",
            AuthFailure::MissingToken => "Authentication failed: Token not found.",
            AuthFailure::InvalidToken => "Authentication failed: Invalid or expired token.",
            AuthFailure::IncorrectEmail => "Incorrect email.",
            AuthFailure::IncorrectPassword => "Incorrect password.",
        }
    }
}

/// The owner-scoped resources a lookup can miss on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Category,
    Tag,
    Task,
    Subtask,
}

impl Resource {
    pub fn name(&self) -> &'static str {
        match self {
            Resource::Category => "Category",
            Resource::Tag => "Tag",
            Resource::Task => "Task",
            Resource::Subtask => "Subtask",
        }
    }
}

/// Represents all possible errors that can occur within the application.
#[derive(Debug)]
pub enum AppError {
    /// Authentication failed or is missing (HTTP 401).
    Unauthorized(AuthFailure),
    /// An owner-scoped lookup found nothing (HTTP 404). Also used when the record
    /// exists but belongs to another user.
    NotFound(Resource),
    /// A unique field is already taken, e.g. a signup email (HTTP 409).
    ResourceExists(String),
    /// One or more request fields broke their rules (HTTP 422).
    ValidationError(Vec<FieldViolation>),
    /// A referenced category, tag or parent task does not exist (HTTP 422).
    ReferentialError(Vec<FieldViolation>),
    /// Unexpected server-side failure (HTTP 500). The message is logged, never sent.
    InternalServerError(String),
    /// Failure reported by the persistence layer (HTTP 500). Logged, never sent.
    DatabaseError(String),
}

impl AppError {
    /// Shorthand for a validation failure with a single violation.
    pub fn invalid(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        AppError::ValidationError(vec![FieldViolation::new(field, code, message)])
    }

    /// The stable machine-readable error code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "auth_error",
            AppError::NotFound(_) => "resource_does_not_exist",
            AppError::ResourceExists(_) => "resource_exists",
            AppError::ValidationError(_) => "validation_error",
            AppError::ReferentialError(_) => "invalid_reference",
            AppError::InternalServerError(_) | AppError::DatabaseError(_) => "server_error",
        }
    }

    /// The message sent to clients. Internal details are replaced by a generic text.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Unauthorized(reason) => reason.message().to_string(),
            AppError::NotFound(resource) => format!("{} not found", resource.name()),
            AppError::ResourceExists(msg) => msg.clone(),
            AppError::ValidationError(_) => VALIDATION_FAILED.to_string(),
            AppError::ReferentialError(_) => INVALID_REFERENCE.to_string(),
            AppError::InternalServerError(_) | AppError::DatabaseError(_) => {
                INTERNAL_SERVER_ERROR.to_string()
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Unauthorized(reason) => write!(f, "Unauthorized: {}", reason.message()),
            AppError::NotFound(resource) => write!(f, "Not Found: {}", resource.name()),
            AppError::ResourceExists(msg) => write!(f, "Resource Exists: {}", msg),
            AppError::ValidationError(errors) => {
                write!(f, "Validation Error: {} violation(s)", errors.len())
            }
            AppError::ReferentialError(errors) => {
                write!(f, "Referential Error: {} missing reference(s)", errors.len())
            }
            AppError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
        }
    }
}

/// The JSON envelope every failure is rendered as.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldViolation>,
}

/// Converts `AppError` variants into `HttpResponse` objects.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ResourceExists(_) => StatusCode::CONFLICT,
            AppError::ValidationError(_) | AppError::ReferentialError(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::InternalServerError(_) | AppError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::InternalServerError(_) | AppError::DatabaseError(_) = self {
            log::error!("{}", self);
        }

        let errors = match self {
            AppError::ValidationError(errors) | AppError::ReferentialError(errors) => {
                errors.clone()
            }
            _ => Vec::new(),
        };

        HttpResponse::build(self.status_code()).json(ErrorBody {
            code: self.code().to_string(),
            message: self.public_message(),
            errors,
        })
    }
}

/// Converts `sqlx::Error` into `AppError`.
///
/// Unique-constraint violations become `ResourceExists`; everything else is a
/// `DatabaseError`.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        if let Some(db_error) = error.as_database_error() {
            if db_error.is_unique_violation() {
                return AppError::ResourceExists("Resource already exists.".into());
            }
        }
        AppError::DatabaseError(error.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> AppError {
        AppError::DatabaseError(error.to_string())
    }
}

/// Converts `validator::ValidationErrors` into `AppError::ValidationError`,
/// keeping every violation.
impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> AppError {
        AppError::ValidationError(crate::validation::flatten(&errors))
    }
}

/// A token that fails decoding is treated as invalid, whatever the reason.
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        log::debug!("token rejected: {}", error);
        AppError::Unauthorized(AuthFailure::InvalidToken)
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(error: actix_web::error::BlockingError) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_of(error: AppError) -> (StatusCode, ErrorBody) {
        let response = error.error_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            AppError::Unauthorized(AuthFailure::MissingHeader).status_code(),
            401
        );
        assert_eq!(AppError::NotFound(Resource::Task).status_code(), 404);
        assert_eq!(AppError::ResourceExists("dup".into()).status_code(), 409);
        assert_eq!(AppError::ValidationError(vec![]).status_code(), 422);
        assert_eq!(AppError::ReferentialError(vec![]).status_code(), 422);
        assert_eq!(AppError::InternalServerError("x".into()).status_code(), 500);
        assert_eq!(AppError::DatabaseError("x".into()).status_code(), 500);
    }

    #[actix_rt::test]
    async fn test_validation_body_lists_every_violation() {
        let error = AppError::ValidationError(vec![
            FieldViolation::new("title", "length", "too short"),
            FieldViolation::new("status", "enum", "bad status"),
        ]);
        let (status, body) = body_of(error).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.code, "validation_error");
        assert_eq!(body.message, VALIDATION_FAILED);
        assert_eq!(body.errors.len(), 2);
        assert_eq!(body.errors[1].field, "status");
    }

    #[actix_rt::test]
    async fn test_server_errors_do_not_leak_detail() {
        let (status, body) =
            body_of(AppError::DatabaseError("relation \"tasks\" does not exist".into())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "server_error");
        assert_eq!(body.message, INTERNAL_SERVER_ERROR);
        assert!(body.errors.is_empty());
    }

    #[actix_rt::test]
    async fn test_blocking_pool_failure_is_a_server_error() {
        // `BlockingError` is `#[non_exhaustive]`; obtain one from a failed blocking task.
        let blocking = actix_web::web::block(|| -> () { panic!("blocking task failed") })
            .await
            .unwrap_err();
        let error = AppError::from(blocking);
        let (status, body) = body_of(error).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, INTERNAL_SERVER_ERROR);
    }

    #[actix_rt::test]
    async fn test_not_found_names_the_resource() {
        let (_, body) = body_of(AppError::NotFound(Resource::Category)).await;
        assert_eq!(body.code, "resource_does_not_exist");
        assert_eq!(body.message, "Category not found");
    }

    #[test]
    fn test_auth_failures_share_a_code() {
        for reason in [
            AuthFailure::MissingHeader,
            AuthFailure::MissingToken,
            AuthFailure::InvalidToken,
            AuthFailure::IncorrectEmail,
            AuthFailure::IncorrectPassword,
        ] {
            assert_eq!(AppError::Unauthorized(reason).code(), "auth_error");
        }
        assert_ne!(
            AuthFailure::IncorrectEmail.message(),
            AuthFailure::IncorrectPassword.message()
        );
    }
}
