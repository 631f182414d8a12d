#![doc = "The `taskboard` library crate."]
#![doc = ""]
#![doc = "Domain models, validation, persistence engines, authentication, routing"]
#![doc = "and error translation for the TaskBoard API. The binary (`main.rs`) only"]
#![doc = "reads configuration, picks a storage engine and starts the server."]

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod routes;
pub mod state;
pub mod validation;

pub use crate::error::{AppError, AppResult};
pub use crate::state::AppState;
