use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single task on a user's list, optionally nested under a parent task.
///
/// Todos form a forest through `parent_id`. The store never rewrites
/// `id` or `user_id` after creation, and every read or write is scoped to the
/// owning `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Parent todo for subtasks. `None` makes this a root.
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub completed: bool,
    /// Calendar date without a time component.
    pub due_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How urgent a todo is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Sanitized payload for creating a todo, produced by
/// [`validate_create`](crate::validation::validate_create).
///
/// `user_id` is not part of the payload; the caller injects it from the
/// authenticated identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTodoInput {
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Only set by internal flows. `None` means "leave as is" on update and
    /// "not completed" on create.
    pub completed: Option<bool>,
}

/// Sanitized payload for replacing a todo's editable fields, produced by
/// [`validate_update`](crate::validation::validate_update).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateTodoInput {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: CreateTodoInput,
}

/// Body of the dedicated completion toggle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToggleTodoInput {
    pub completed: bool,
}

/// A todo with its nested children, used for tree responses.
///
/// Built fresh from the flat list on every read and never stored. The `todo`
/// fields are flattened into the JSON object next to a `children` array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoWithChildren {
    #[serde(flatten)]
    pub todo: Todo,
    pub children: Vec<TodoWithChildren>,
}

impl Drop for TodoWithChildren {
    // Flatten the subtree so dropping a deep chain does not recurse.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Which root todos a tree view shows. Children are never filtered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TodoFilter {
    #[default]
    All,
    Completed,
    Pending,
}

impl TodoFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Completed => "completed",
            Self::Pending => "pending",
        }
    }
}

impl std::str::FromStr for TodoFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "completed" => Ok(Self::Completed),
            "pending" => Ok(Self::Pending),
            other => Err(format!(
                "unknown filter '{}', expected all, completed or pending",
                other
            )),
        }
    }
}

impl std::fmt::Display for TodoFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
