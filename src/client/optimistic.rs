//! Optimistic local list for quick-add.
//!
//! A placeholder is shown as soon as the user submits a title and is either
//! replaced by the server's record or removed when the request fails.

use chrono::Utc;
use uuid::Uuid;

use super::{ClientError, TodoClient};
use crate::forest::build_forest;
use crate::models::{Priority, Todo, TodoFilter, TodoWithChildren};
use crate::validation::TodoForm;

/// The authoritative list plus speculative placeholders not yet confirmed.
#[derive(Debug, Clone, Default)]
pub struct OptimisticTodos {
    confirmed: Vec<Todo>,
    /// Newest first, shown ahead of `confirmed`.
    pending: Vec<Todo>,
}

impl OptimisticTodos {
    /// Start from a server list (newest first).
    pub fn new(todos: Vec<Todo>) -> Self {
        Self {
            confirmed: todos,
            pending: Vec::new(),
        }
    }

    /// Insert a placeholder root todo and return its temporary id.
    pub fn add_placeholder(&mut self, title: &str) -> Uuid {
        let now = Utc::now();
        let temp_id = Uuid::new_v4();
        self.pending.insert(
            0,
            Todo {
                id: temp_id,
                user_id: Uuid::nil(),
                parent_id: None,
                title: title.to_string(),
                description: None,
                priority: Priority::Medium,
                completed: false,
                due_date: None,
                tags: Vec::new(),
                created_at: now,
                updated_at: now,
            },
        );
        temp_id
    }

    /// Swap a placeholder for the server's record. Returns false if the
    /// placeholder was already gone, in which case nothing changes.
    pub fn confirm(&mut self, temp_id: Uuid, todo: Todo) -> bool {
        if !self.remove_pending(temp_id) {
            return false;
        }
        self.confirmed.retain(|t| t.id != todo.id);
        self.confirmed.insert(0, todo);
        true
    }

    /// Drop a placeholder after a failed round trip.
    pub fn retract(&mut self, temp_id: Uuid) -> bool {
        self.remove_pending(temp_id)
    }

    fn remove_pending(&mut self, temp_id: Uuid) -> bool {
        let before = self.pending.len();
        self.pending.retain(|t| t.id != temp_id);
        self.pending.len() != before
    }

    pub fn is_pending(&self, id: Uuid) -> bool {
        self.pending.iter().any(|t| t.id == id)
    }

    /// What to render right now: placeholders first, then confirmed todos.
    pub fn view(&self) -> Vec<Todo> {
        self.pending
            .iter()
            .chain(self.confirmed.iter())
            .cloned()
            .collect()
    }

    pub fn forest(&self, filter: TodoFilter) -> Vec<TodoWithChildren> {
        build_forest(self.view(), filter)
    }
}

/// Create a medium-priority root todo from a bare title, optimistically.
///
/// Blank titles are ignored and return `Ok(None)`. On failure the placeholder
/// is retracted before the error is returned.
pub async fn quick_add(
    client: &TodoClient,
    list: &mut OptimisticTodos,
    title: &str,
) -> Result<Option<Todo>, ClientError> {
    let title = title.trim();
    if title.is_empty() {
        return Ok(None);
    }

    let temp_id = list.add_placeholder(title);
    let form = TodoForm {
        title: Some(title.to_string()),
        priority: Some(Priority::Medium.as_str().to_string()),
        ..Default::default()
    };

    match client.create(&form).await {
        Ok(todo) => {
            list.confirm(temp_id, todo.clone());
            Ok(Some(todo))
        }
        Err(e) => {
            list.retract(temp_id);
            tracing::warn!("Quick add failed, placeholder retracted: {}", e);
            Err(e)
        }
    }
}
