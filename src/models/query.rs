use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::{TaskPriority, TaskStatus};
use crate::validation::Violations;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

/// A field a listing can be ordered by.
///
/// `ALLOWED` maps the client-facing names accepted in `sortBy` to the variant;
/// `column` is the backing SQL column.
pub trait SortField: Copy + Send + Sync + 'static {
    const ALLOWED: &'static [(&'static str, Self)];

    fn column(self) -> &'static str;

    /// Whether the column holds free text, which orders case-insensitively.
    fn is_text(self) -> bool {
        false
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALLOWED
            .iter()
            .find(|(allowed, _)| *allowed == name)
            .map(|(_, field)| *field)
    }

    fn allowed_names() -> String {
        Self::ALLOWED
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Sort fields shared by the name-only resources (categories and tags).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSort {
    Name,
    Id,
}

impl SortField for NameSort {
    const ALLOWED: &'static [(&'static str, Self)] = &[("name", NameSort::Name), ("id", NameSort::Id)];

    fn column(self) -> &'static str {
        match self {
            NameSort::Name => "name",
            NameSort::Id => "id",
        }
    }

    fn is_text(self) -> bool {
        self == NameSort::Name
    }
}

/// Raw listing query string. Everything arrives as text so that every bad
/// parameter can be reported together instead of failing on the first one.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

/// A checked listing request for resource sort fields `F`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery<F> {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub sort: Option<(F, SortOrder)>,
}

impl<F> ListQuery<F> {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl<F: SortField> Default for ListQuery<F> {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            search: None,
            status: None,
            priority: None,
            sort: None,
        }
    }
}

fn positive(
    raw: Option<&str>,
    field: &str,
    default: u32,
    violations: &mut Violations,
) -> u32 {
    match raw.map(str::trim) {
        None | Some("") => default,
        Some(value) => match value.parse::<u32>() {
            Ok(n) if n >= 1 => n,
            _ => {
                violations.push(
                    field,
                    "min",
                    format!("{} must be an integer greater than or equal to 1", field),
                );
                default
            }
        },
    }
}

impl ListParams {
    /// Checks every parameter against the rules for resource `F` and returns the
    /// normalized query, or one `ValidationError` listing all the problems.
    pub fn validate<F: SortField>(&self) -> AppResult<ListQuery<F>> {
        let mut violations = Violations::new();

        let page = positive(self.page.as_deref(), "page", DEFAULT_PAGE, &mut violations);
        let limit = positive(self.limit.as_deref(), "limit", DEFAULT_LIMIT, &mut violations);

        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => match raw.parse::<TaskStatus>() {
                Ok(status) => Some(status),
                Err(_) => {
                    violations.push("status", "enum", TaskStatus::INVALID_MESSAGE);
                    None
                }
            },
            None => None,
        };

        let priority = match self.priority.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => match raw.parse::<TaskPriority>() {
                Ok(priority) => Some(priority),
                Err(_) => {
                    violations.push("priority", "enum", TaskPriority::INVALID_MESSAGE);
                    None
                }
            },
            None => None,
        };

        let order = match self.order.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("") | Some("desc") => SortOrder::Desc,
            Some("asc") => SortOrder::Asc,
            Some(_) => {
                violations.push("order", "enum", r#"Order must be "asc" or "desc""#);
                SortOrder::Desc
            }
        };

        let sort = match self.sort_by.as_deref().filter(|s| !s.is_empty()) {
            Some(name) => match F::from_name(name) {
                Some(field) => Some((field, order)),
                None => {
                    violations.push(
                        "sortBy",
                        "enum",
                        format!("sortBy must be one of: {}", F::allowed_names()),
                    );
                    None
                }
            },
            None => None,
        };

        violations.into_result()?;

        Ok(ListQuery {
            page,
            limit,
            search,
            status,
            priority,
            sort,
        })
    }
}
