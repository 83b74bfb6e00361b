mod schema;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::forest::build_forest;
use crate::models::*;
use crate::validation::ValidationErrors;

/// Deepest allowed nesting below a root todo. Keeps tree responses within
/// what JSON clients will parse.
pub const MAX_DEPTH: usize = 50;

const TODO_COLUMNS: &str = "id, user_id, parent_id, title, description, priority, completed, due_date, tags, created_at, updated_at";

/// SQLite-backed todo store.
///
/// Every operation takes the owning user's id and never reads or writes rows
/// belonging to anyone else.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "nested-todos")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("todos.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let mut conn = self.lock()?;
        schema::run_migrations(&mut conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    // ============================================================
    // Reads
    // ============================================================

    /// All of a user's todos, newest first.
    pub fn list_todos(&self, user_id: Uuid) -> Result<Vec<Todo>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM todos WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
            TODO_COLUMNS
        ))?;

        let todos = stmt
            .query_map([user_id.to_string()], row_to_todo)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(todos)
    }

    pub fn get_todo(&self, user_id: Uuid, id: Uuid) -> Result<Option<Todo>> {
        let conn = self.lock()?;
        fetch_todo(&conn, user_id, id)
    }

    /// A user's todos arranged as a filtered forest.
    pub fn get_forest(&self, user_id: Uuid, filter: TodoFilter) -> Result<Vec<TodoWithChildren>> {
        let todos = self.list_todos(user_id)?;
        Ok(build_forest(todos, filter))
    }

    // ============================================================
    // Writes
    // ============================================================

    /// Insert a new todo. Fails with [`ValidationErrors`] on `parent_id` when
    /// the todo would sit deeper than [`MAX_DEPTH`].
    pub fn create_todo(&self, user_id: Uuid, input: CreateTodoInput) -> Result<Todo> {
        let conn = self.lock()?;
        if let Some(parent_id) = input.parent_id {
            if ancestry(&conn, user_id, parent_id)?.len() > MAX_DEPTH {
                return Err(too_deep(parent_id));
            }
        }
        let id = Uuid::new_v4();
        let now = current_time();
        let completed = input.completed.unwrap_or(false);

        conn.execute(
            &format!(
                "INSERT INTO todos ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                TODO_COLUMNS
            ),
            rusqlite::params![
                id.to_string(),
                user_id.to_string(),
                input.parent_id.map(|u| u.to_string()),
                &input.title,
                &input.description,
                input.priority.as_str(),
                completed,
                input.due_date.map(format_date),
                serde_json::to_string(&input.tags)?,
                format_datetime(now),
                format_datetime(now),
            ],
        )?;

        Ok(Todo {
            id,
            user_id,
            parent_id: input.parent_id,
            title: input.title,
            description: input.description,
            priority: input.priority,
            completed,
            due_date: input.due_date,
            tags: input.tags,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace a todo's editable fields. `completed` is only touched when the
    /// payload carries it.
    ///
    /// Returns `None` when the user has no todo with this id. Fails with
    /// [`ValidationErrors`] on `parent_id` when the new parent is the todo
    /// itself or one of its descendants, or when the move would put any of
    /// its subtree deeper than [`MAX_DEPTH`].
    pub fn update_todo(&self, user_id: Uuid, input: UpdateTodoInput) -> Result<Option<Todo>> {
        let conn = self.lock()?;
        let Some(existing) = fetch_todo(&conn, user_id, input.id)? else {
            return Ok(None);
        };

        let fields = input.fields;
        if let Some(parent_id) = fields.parent_id {
            if fields.parent_id != existing.parent_id {
                let chain = ancestry(&conn, user_id, parent_id)?;
                if chain.contains(&input.id) {
                    tracing::warn!("Rejected parent {} for todo {}: cycle", parent_id, input.id);
                    return Err(
                        ValidationErrors::single("parent_id", "Parent would create a cycle").into(),
                    );
                }
                if chain.len() + subtree_height(&conn, user_id, input.id)? > MAX_DEPTH {
                    return Err(too_deep(parent_id));
                }
            }
        }

        let now = current_time();
        let completed = fields.completed.unwrap_or(existing.completed);

        conn.execute(
            "UPDATE todos SET parent_id = ?, title = ?, description = ?, priority = ?, completed = ?,
                 due_date = ?, tags = ?, updated_at = ?
             WHERE id = ? AND user_id = ?",
            rusqlite::params![
                fields.parent_id.map(|u| u.to_string()),
                &fields.title,
                &fields.description,
                fields.priority.as_str(),
                completed,
                fields.due_date.map(format_date),
                serde_json::to_string(&fields.tags)?,
                format_datetime(now),
                input.id.to_string(),
                user_id.to_string(),
            ],
        )?;

        Ok(Some(Todo {
            id: existing.id,
            user_id,
            parent_id: fields.parent_id,
            title: fields.title,
            description: fields.description,
            priority: fields.priority,
            completed,
            due_date: fields.due_date,
            tags: fields.tags,
            created_at: existing.created_at,
            updated_at: now,
        }))
    }

    /// Set the completion flag. Returns false when no such todo exists for the user.
    pub fn toggle_todo(&self, user_id: Uuid, id: Uuid, completed: bool) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE todos SET completed = ?, updated_at = ? WHERE id = ? AND user_id = ?",
            rusqlite::params![
                completed,
                format_datetime(current_time()),
                id.to_string(),
                user_id.to_string(),
            ],
        )?;
        Ok(rows > 0)
    }

    /// Delete one todo. Children are left in place and become orphans.
    pub fn delete_todo(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM todos WHERE id = ? AND user_id = ?",
            (id.to_string(), user_id.to_string()),
        )?;
        Ok(rows > 0)
    }
}

fn fetch_todo(conn: &Connection, user_id: Uuid, id: Uuid) -> Result<Option<Todo>> {
    let todo = conn
        .query_row(
            &format!(
                "SELECT {} FROM todos WHERE id = ? AND user_id = ?",
                TODO_COLUMNS
            ),
            (id.to_string(), user_id.to_string()),
            row_to_todo,
        )
        .optional()?;
    Ok(todo)
}

/// `start` followed by its stored ancestors, nearest first. Stops at a root,
/// a missing row, or a repeated id.
fn ancestry(conn: &Connection, user_id: Uuid, start: Uuid) -> Result<Vec<Uuid>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(start);

    while let Some(ancestor) = current {
        if !seen.insert(ancestor) {
            break;
        }
        chain.push(ancestor);
        current = conn
            .query_row(
                "SELECT parent_id FROM todos WHERE id = ? AND user_id = ?",
                (ancestor.to_string(), user_id.to_string()),
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten()
            .map(parse_uuid);
    }

    Ok(chain)
}

/// Levels of descendants below `id` (0 for a leaf).
fn subtree_height(conn: &Connection, user_id: Uuid, id: Uuid) -> Result<usize> {
    let mut stmt =
        conn.prepare("SELECT id, parent_id FROM todos WHERE user_id = ? AND parent_id IS NOT NULL")?;
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let rows = stmt.query_map([user_id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (child, parent) = row?;
        children.entry(parse_uuid(parent)).or_default().push(parse_uuid(child));
    }

    let mut seen = HashSet::from([id]);
    let mut frontier = vec![id];
    let mut height = 0;
    loop {
        let next: Vec<Uuid> = frontier
            .iter()
            .filter_map(|parent| children.get(parent))
            .flatten()
            .filter(|child| seen.insert(**child))
            .copied()
            .collect();
        if next.is_empty() {
            return Ok(height);
        }
        height += 1;
        frontier = next;
    }
}

fn too_deep(parent_id: Uuid) -> anyhow::Error {
    tracing::warn!("Rejected parent {}: nesting deeper than {}", parent_id, MAX_DEPTH);
    ValidationErrors::single("parent_id", "Todos cannot be nested this deeply").into()
}

fn row_to_todo(row: &Row<'_>) -> rusqlite::Result<Todo> {
    let tags: String = row.get(8)?;
    Ok(Todo {
        id: parse_uuid(row.get::<_, String>(0)?),
        user_id: parse_uuid(row.get::<_, String>(1)?),
        parent_id: row.get::<_, Option<String>>(2)?.map(parse_uuid),
        title: row.get(3)?,
        description: row.get(4)?,
        priority: Priority::from_str(&row.get::<_, String>(5)?).unwrap_or(Priority::Medium),
        completed: row.get(6)?,
        due_date: row
            .get::<_, Option<String>>(7)?
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        created_at: parse_datetime(row.get::<_, String>(9)?),
        updated_at: parse_datetime(row.get::<_, String>(10)?),
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Current time at the precision the store keeps.
fn current_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width so that `ORDER BY created_at` sorts chronologically.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
