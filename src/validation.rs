//! Request validation helpers.
//!
//! Field rules live on the input structs as `validator` derives. This module turns the
//! nested `ValidationErrors` tree into the flat, ordered list of violations that
//! `AppError::ValidationError` carries, holds the custom rule functions the derives
//! point at, and routes actix extractor failures (bad JSON, bad query strings) into
//! the same error type.

use actix_web::dev::Payload;
use actix_web::{error::JsonPayloadError, error::QueryPayloadError, web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::ops::Deref;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::error::{AppError, AppResult, FieldViolation, Resource};
use crate::models::{TaskPriority, TaskStatus};

/// Largest accepted upload, in bytes.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "application/pdf",
    "application/epub+zip",
];

lazy_static! {
    static ref FILE_EXTENSION_REGEX: Regex =
        Regex::new(r"(?i)\.(jpeg|jpg|png|gif|pdf|epub)$").expect("valid extension regex");
}

/// Collects violations from several sources before failing once with all of them.
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldViolation>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the derived rules of `input` and records whatever they report.
    pub fn check<T: Validate>(input: &T) -> Self {
        let mut violations = Self::new();
        if let Err(errors) = input.validate() {
            violations.0.extend(flatten(&errors));
        }
        violations
    }

    pub fn push(&mut self, field: &str, code: &str, message: impl Into<String>) {
        self.0.push(FieldViolation::new(field, code, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops violations on `field` itself or anything nested under it.
    fn forget(&mut self, field: &str) {
        self.0.retain(|v| {
            let rest = match v.field.strip_prefix(field) {
                Some(rest) => rest,
                None => return true,
            };
            !(rest.is_empty() || rest.starts_with('.') || rest.starts_with('['))
        });
    }

    pub fn into_result(self) -> AppResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::ValidationError(self.0))
        }
    }
}

/// Flattens a `ValidationErrors` tree into violations sorted by field path.
///
/// Nested struct errors are reported as `parent.child`, list items as `parent[2].child`.
pub fn flatten(errors: &ValidationErrors) -> Vec<FieldViolation> {
    let mut out = Vec::new();
    collect(None, errors, &mut out);
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

fn collect(prefix: Option<&str>, errors: &ValidationErrors, out: &mut Vec<FieldViolation>) {
    for (field, kind) in errors.errors() {
        let name = match prefix {
            Some(prefix) => format!("{}.{}", prefix, camel_case(field)),
            None => camel_case(field),
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    out.push(FieldViolation::new(
                        name.clone(),
                        error.code.to_string(),
                        describe(&name, error),
                    ));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(Some(&name), inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(Some(&format!("{}[{}]", name, index)), inner, out);
                }
            }
        }
    }
}

fn describe(field: &str, error: &ValidationError) -> String {
    match &error.message {
        Some(message) => message.to_string(),
        None => format!("{} is invalid ({})", field, error.code),
    }
}

/// `parent_task` -> `parentTask`.
pub fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

pub fn validate_status(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<TaskStatus>()
        .map(|_| ())
        .map_err(|_| rule("enum", TaskStatus::INVALID_MESSAGE))
}

pub fn validate_priority(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<TaskPriority>()
        .map(|_| ())
        .map_err(|_| rule("enum", TaskPriority::INVALID_MESSAGE))
}

pub fn validate_mime_type(value: &str) -> Result<(), ValidationError> {
    if ALLOWED_MIME_TYPES.contains(&value) {
        Ok(())
    } else {
        Err(rule("file_type", "Only images, PDFs, and EPUBs are allowed"))
    }
}

pub fn validate_file_extension(value: &str) -> Result<(), ValidationError> {
    if FILE_EXTENSION_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(rule("file_type", "Only images, PDFs, and EPUBs are allowed"))
    }
}

/// Decodes a JSON object into `T` field by field and runs its rules.
///
/// A field whose value has the wrong JSON type becomes an `invalid_type` violation
/// and is left out of the decoded value, so the remaining fields are still checked
/// and every problem in the body is reported in one error. Every field of `T` must
/// tolerate being absent.
pub fn parse_body<T>(body: Value) -> AppResult<T>
where
    T: DeserializeOwned + Validate,
{
    let fields = match body {
        Value::Object(fields) => fields,
        _ => return Err(AppError::invalid("body", "invalid_type", "Expected a JSON object")),
    };

    let mut mismatched = Vec::new();
    let mut accepted = Map::with_capacity(fields.len());
    for (key, value) in fields {
        let mut single = Map::with_capacity(1);
        single.insert(key.clone(), value.clone());
        match serde_json::from_value::<T>(Value::Object(single)) {
            Ok(_) => {
                accepted.insert(key, value);
            }
            Err(err) => mismatched.push((key, err.to_string())),
        }
    }

    let input: T = serde_json::from_value(Value::Object(accepted))
        .map_err(|err| AppError::invalid("body", "invalid_type", err.to_string()))?;

    let mut violations = Violations::check(&input);
    for (field, message) in mismatched {
        violations.forget(&field);
        violations.push(&field, "invalid_type", message);
    }
    violations.0.sort_by(|a, b| a.field.cmp(&b.field));
    violations.into_result()?;
    Ok(input)
}

/// JSON body extractor that decodes with [`parse_body`].
///
/// Malformed JSON is still rejected by the `JsonConfig` error handler; type and
/// rule violations come back together as one `ValidationError`.
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

impl<T> ValidJson<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for ValidJson<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> FromRequest for ValidJson<T>
where
    T: DeserializeOwned + Validate + 'static,
{
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let body = web::Json::<Value>::from_request(req, payload);
        Box::pin(async move {
            let body = body.await?.into_inner();
            Ok(ValidJson(parse_body(body)?))
        })
    }
}

/// Parses a path id. A malformed id cannot name any record, so it is a plain miss.
pub fn parse_id(raw: &str, resource: Resource) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(resource))
}

/// Maps JSON body extraction failures (not JSON, wrong content type, too large)
/// onto a single `body` violation.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let (code, message) = match &err {
        JsonPayloadError::ContentType => ("content_type", "Expected an application/json body".to_string()),
        JsonPayloadError::Deserialize(inner) => ("invalid_type", inner.to_string()),
        other => ("invalid_body", other.to_string()),
    };
    AppError::invalid("body", code, message).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::invalid("query", "invalid_query", err.to_string()).into()
}

/// Deserializes a field where an explicit `null` differs from an absent key.
///
/// Use with `#[serde(default, deserialize_with = "nullable")]` on an
/// `Option<Option<T>>`: absent -> `None`, `null` -> `Some(None)`, value -> `Some(Some(v))`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Validate)]
    struct Inner {
        #[validate(length(min = 1, message = "must not be empty"))]
        file_name: String,
    }

    #[derive(Debug, Validate)]
    struct Outer {
        #[validate(length(min = 3, message = "too short"))]
        title: String,
        #[validate(custom = "validate_status")]
        status: Option<String>,
        #[validate]
        files: Vec<Inner>,
    }

    #[test]
    fn test_flatten_reports_all_fields() {
        let input = Outer {
            title: "ab".into(),
            status: Some("Done".into()),
            files: vec![
                Inner {
                    file_name: "ok".into(),
                },
                Inner {
                    file_name: "".into(),
                },
            ],
        };
        let violations = flatten(&input.validate().unwrap_err());
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();

        assert_eq!(fields, vec!["files[1].fileName", "status", "title"]);
        assert_eq!(violations[1].code, "enum");
        assert_eq!(violations[2].message, "too short");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("parent_task"), "parentTask");
        assert_eq!(camel_case("storage_path"), "storagePath");
        assert_eq!(camel_case("name"), "name");
    }

    #[test]
    fn test_file_rules() {
        assert!(validate_mime_type("application/pdf").is_ok());
        assert!(validate_mime_type("text/plain").is_err());
        assert!(validate_file_extension("Scan.JPG").is_ok());
        assert!(validate_file_extension("notes.txt").is_err());
        assert!(validate_file_extension("pdf").is_err());
    }

    #[test]
    fn test_violations_collects_extra_entries() {
        let mut violations = Violations::new();
        assert!(violations.is_empty());
        violations.push("files", "required", "No files were uploaded.");
        match violations.into_result() {
            Err(AppError::ValidationError(list)) => assert_eq!(list[0].field, "files"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        category: Option<Option<Uuid>>,
    }

    #[test]
    fn test_nullable_distinguishes_null_from_absent() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        let null: Patch = serde_json::from_str(r#"{"category": null}"#).unwrap();
        let id = Uuid::new_v4();
        let set: Patch = serde_json::from_str(&format!(r#"{{"category": "{}"}}"#, id)).unwrap();

        assert_eq!(absent.category, None);
        assert_eq!(null.category, Some(None));
        assert_eq!(set.category, Some(Some(id)));
    }

    #[derive(Debug, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    struct Draft {
        #[validate(required, length(min = 3))]
        title: Option<String>,
        #[validate(custom = "validate_priority")]
        priority: Option<String>,
        #[serde(default)]
        #[validate]
        files: Vec<Inner>,
        parent_task: Option<Uuid>,
    }

    impl<'de> Deserialize<'de> for Inner {
        fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            String::deserialize(deserializer).map(|file_name| Inner { file_name })
        }
    }

    fn fields(result: AppResult<Draft>) -> Vec<(String, String)> {
        match result {
            Err(AppError::ValidationError(list)) => {
                list.into_iter().map(|v| (v.field, v.code)).collect()
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_body_reports_type_and_rule_violations_together() {
        let body = serde_json::json!({
            "title": 5,
            "priority": "Urgent",
            "parentTask": "not-an-id",
            "unknown": true
        });

        assert_eq!(
            fields(parse_body::<Draft>(body)),
            vec![
                ("parentTask".to_string(), "invalid_type".to_string()),
                ("priority".to_string(), "enum".to_string()),
                ("title".to_string(), "invalid_type".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_body_mismatch_hides_nested_rule_errors() {
        let body = serde_json::json!({ "title": "Fine", "files": [""] });
        assert_eq!(
            fields(parse_body::<Draft>(body)),
            vec![("files[0].fileName".to_string(), "length".to_string())]
        );

        let body = serde_json::json!({ "title": "Fine", "files": "nope" });
        assert_eq!(
            fields(parse_body::<Draft>(body)),
            vec![("files".to_string(), "invalid_type".to_string())]
        );
    }

    #[test]
    fn test_parse_body_accepts_valid_input() {
        let id = Uuid::new_v4();
        let draft: Draft =
            parse_body(serde_json::json!({ "title": "Fine", "parentTask": id })).unwrap();
        assert_eq!(draft.parent_task, Some(id));
        assert!(draft.files.is_empty());

        assert!(matches!(
            parse_body::<Draft>(serde_json::json!(["title"])),
            Err(AppError::ValidationError(list)) if list[0].field == "body"
        ));
    }

    #[test]
    fn test_parse_id() {
        assert!(matches!(
            parse_id("not-a-uuid", Resource::Tag),
            Err(AppError::NotFound(Resource::Tag))
        ));
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), Resource::Tag).unwrap(), id);
    }
}
