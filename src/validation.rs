//! Validation of raw todo form input.
//!
//! [`TodoForm`] is the closed schema for everything a client may submit.
//! [`validate_create`] and [`validate_update`] turn it into typed payloads or
//! a [`ValidationErrors`] listing every failing field at once. Both are pure.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CreateTodoInput, Priority, Todo, UpdateTodoInput};

pub const TITLE_MAX_LEN: usize = 255;

/// Raw, untyped todo input as submitted by a form or JSON client.
///
/// Every field is optional here; presence and shape are checked by the
/// validators, not by deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoForm {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub completed: Option<bool>,
}

impl TodoForm {
    /// Build a form from url-encoded key/value pairs.
    ///
    /// Repeated `tags` keys are collected in order. For the other fields the
    /// last value wins. Unknown keys are ignored, and a `completed` value that
    /// is not a recognizable boolean is treated as absent.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut form = Self::default();
        for (key, value) in pairs {
            let value = value.into();
            match key.as_ref() {
                "id" => form.id = Some(value),
                "title" => form.title = Some(value),
                "description" => form.description = Some(value),
                "priority" => form.priority = Some(value),
                "due_date" => form.due_date = Some(value),
                "parent_id" => form.parent_id = Some(value),
                "tags" => form.tags.push(value),
                "completed" => form.completed = parse_checkbox(&value),
                _ => {}
            }
        }
        form
    }
}

impl From<&Todo> for TodoForm {
    /// Pre-fill an edit form from a stored todo.
    fn from(todo: &Todo) -> Self {
        Self {
            id: Some(todo.id.to_string()),
            title: Some(todo.title.clone()),
            description: todo.description.clone(),
            priority: Some(todo.priority.as_str().to_string()),
            due_date: todo.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
            parent_id: todo.parent_id.map(|p| p.to_string()),
            tags: todo.tags.clone(),
            completed: None,
        }
    }
}

fn parse_checkbox(value: &str) -> Option<bool> {
    match value {
        "true" | "on" | "1" => Some(true),
        "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// One failing field and why it failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the field, e.g. `title`.
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every field-level failure found in one validation pass, in field order.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{}", join_errors(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, message)],
        }
    }

    /// Whether any error is addressed to `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

/// Validate input for creating a todo.
pub fn validate_create(form: &TodoForm) -> Result<CreateTodoInput, ValidationErrors> {
    let mut errors = Vec::new();
    let input = check_fields(form, &mut errors);
    match input {
        Some(input) if errors.is_empty() => Ok(input),
        _ => Err(ValidationErrors { errors }),
    }
}

/// Validate input for updating a todo. Same rules as [`validate_create`],
/// plus a required, well-formed `id`.
pub fn validate_update(form: &TodoForm) -> Result<UpdateTodoInput, ValidationErrors> {
    let mut errors = Vec::new();

    let id = form.id.as_deref().and_then(parse_uuid);
    if id.is_none() {
        errors.push(FieldError::new("id", "Invalid todo ID"));
    }

    let fields = check_fields(form, &mut errors);
    match (id, fields) {
        (Some(id), Some(fields)) if errors.is_empty() => Ok(UpdateTodoInput { id, fields }),
        _ => Err(ValidationErrors { errors }),
    }
}

/// Shared field rules. Pushes one error per failing field and only returns a
/// payload when every field passed.
fn check_fields(form: &TodoForm, errors: &mut Vec<FieldError>) -> Option<CreateTodoInput> {
    let before = errors.len();

    let title = match form.title.as_deref() {
        None | Some("") => {
            errors.push(FieldError::new("title", "Title is required"));
            None
        }
        Some(title) if title.chars().count() > TITLE_MAX_LEN => {
            errors.push(FieldError::new("title", "Title is too long"));
            None
        }
        Some(title) => Some(title.to_string()),
    };

    let description = form
        .description
        .as_ref()
        .filter(|d| !d.trim().is_empty())
        .cloned();

    let priority = form.priority.as_deref().and_then(Priority::from_str);
    if priority.is_none() {
        errors.push(FieldError::new("priority", "Invalid priority value"));
    }

    let due_date = match form.due_date.as_deref() {
        None | Some("") => None,
        Some(raw) => {
            let parsed = parse_iso_date(raw);
            if parsed.is_none() {
                errors.push(FieldError::new("due_date", "Invalid due date"));
            }
            parsed
        }
    };

    let parent_id = match form.parent_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => {
            let parsed = parse_uuid(raw);
            if parsed.is_none() {
                errors.push(FieldError::new("parent_id", "Invalid UUID"));
            }
            parsed
        }
    };

    if errors.len() > before {
        return None;
    }

    Some(CreateTodoInput {
        parent_id,
        title: title?,
        description,
        priority: priority?,
        due_date,
        tags: form.tags.clone(),
        completed: form.completed,
    })
}

/// Strict `YYYY-MM-DD`. Rejects times, offsets and unpadded components.
fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { *b == b'-' } else { b.is_ascii_digit() });
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Hyphenated 36-character UUIDs only.
fn parse_uuid(raw: &str) -> Option<Uuid> {
    if raw.len() != 36 {
        return None;
    }
    Uuid::try_parse(raw).ok()
}
