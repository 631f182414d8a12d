use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// A user-owned grouping for tasks. A task points at zero or one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
}

impl Category {
    pub fn new(name: String, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            owner_id,
        }
    }
}

/// Body of `POST /categories` and `PUT /categories/{id}`.
#[derive(Debug, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(
        required(message = "Category name is required"),
        length(min = 3, max = 50, message = "Category name must be between 3 and 50 characters")
    )]
    pub name: Option<String>,
}

impl CategoryInput {
    pub fn into_name(self) -> AppResult<String> {
        self.name
            .ok_or_else(|| AppError::invalid("name", "required", "Category name is required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_input_validation() {
        let valid = CategoryInput {
            name: Some("Work".to_string()),
        };
        assert!(valid.validate().is_ok());

        let short = CategoryInput {
            name: Some("ab".to_string()),
        };
        assert!(short.validate().is_err());

        let long = CategoryInput {
            name: Some("c".repeat(51)),
        };
        assert!(long.validate().is_err());

        let missing = CategoryInput { name: None };
        assert!(missing.validate().is_err());
    }
}
