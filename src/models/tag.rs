use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// A user-owned label. Tasks hold a set of tag ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
}

impl Tag {
    pub fn new(name: String, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            owner_id,
        }
    }
}

/// Body of `POST /tags` and `PUT /tags/{id}`.
#[derive(Debug, Deserialize, Validate)]
pub struct TagInput {
    #[validate(
        required(message = "Tag name is required"),
        length(min = 3, max = 20, message = "Tag name must be between 3 and 20 characters")
    )]
    pub name: Option<String>,
}

impl TagInput {
    pub fn into_name(self) -> AppResult<String> {
        self.name
            .ok_or_else(|| AppError::invalid("name", "required", "Tag name is required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_input_validation() {
        assert!(TagInput {
            name: Some("urgent".to_string())
        }
        .validate()
        .is_ok());
        assert!(TagInput {
            name: Some("t".repeat(21))
        }
        .validate()
        .is_err());
        assert!(TagInput { name: None }.validate().is_err());
    }
}
