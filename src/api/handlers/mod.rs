use axum::{
    extract::{Form, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::Database;
use crate::models::*;
use crate::validation::{validate_create, validate_update, TodoForm, ValidationErrors};

// ============================================================
// Error Handling
// ============================================================

/// Everything a handler can fail with.
///
/// Validation failures are safe to show to the client and carry every field
/// error. Storage failures are logged in full server-side, but clients only
/// see a generic message to avoid leaking internal details.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<ValidationErrors>() {
            Ok(errors) => Self::Validation(errors),
            Err(e) => Self::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => {
                tracing::warn!("Validation error: {}", errors);
                (StatusCode::UNPROCESSABLE_ENTITY, Json(errors)).into_response()
            }
            Self::NotFound(what) => {
                (StatusCode::NOT_FOUND, format!("{} not found", what)).into_response()
            }
            Self::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Todos
// ============================================================

/// Query parameters for the tree view.
#[derive(Debug, Deserialize)]
pub struct TreeQuery {
    /// Which roots to show. Defaults to all.
    #[serde(default)]
    pub filter: TodoFilter,
}

pub async fn list_todos(
    State(db): State<Database>,
    Extension(caller): Extension<CallerIdentity>,
) -> ApiResult<Json<Vec<Todo>>> {
    Ok(Json(db.list_todos(caller.user_id)?))
}

pub async fn get_todo_tree(
    State(db): State<Database>,
    Extension(caller): Extension<CallerIdentity>,
    Query(query): Query<TreeQuery>,
) -> ApiResult<Json<Vec<TodoWithChildren>>> {
    Ok(Json(db.get_forest(caller.user_id, query.filter)?))
}

pub async fn get_todo(
    State(db): State<Database>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Todo>> {
    db.get_todo(caller.user_id, id)?
        .map(Json)
        .ok_or(ApiError::NotFound("Todo"))
}

pub async fn create_todo(
    State(db): State<Database>,
    Extension(caller): Extension<CallerIdentity>,
    Json(form): Json<TodoForm>,
) -> ApiResult<(StatusCode, Json<Todo>)> {
    insert_todo(&db, caller, &form)
}

/// Same as [`create_todo`] for url-encoded form posts, where `tags` may repeat.
pub async fn create_todo_form(
    State(db): State<Database>,
    Extension(caller): Extension<CallerIdentity>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> ApiResult<(StatusCode, Json<Todo>)> {
    insert_todo(&db, caller, &TodoForm::from_pairs(pairs))
}

fn insert_todo(
    db: &Database,
    caller: CallerIdentity,
    form: &TodoForm,
) -> ApiResult<(StatusCode, Json<Todo>)> {
    let mut input = validate_create(form)?;
    // New todos start pending; completion changes go through toggle
    input.completed = None;
    let todo = db.create_todo(caller.user_id, input)?;
    tracing::debug!("Created todo {} for {}", todo.id, caller.user_id);
    Ok((StatusCode::CREATED, Json(todo)))
}

/// Replace a todo's fields. The id in the path takes precedence over any id
/// in the body, and a malformed path id is reported as a field error.
pub async fn update_todo(
    State(db): State<Database>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
    Json(mut form): Json<TodoForm>,
) -> ApiResult<Json<Todo>> {
    form.id = Some(id);
    let input = validate_update(&form)?;
    db.update_todo(caller.user_id, input)?
        .map(Json)
        .ok_or(ApiError::NotFound("Todo"))
}

pub async fn toggle_todo(
    State(db): State<Database>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
    Json(input): Json<ToggleTodoInput>,
) -> ApiResult<StatusCode> {
    if db.toggle_todo(caller.user_id, id, input.completed)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Todo"))
    }
}

pub async fn delete_todo(
    State(db): State<Database>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if db.delete_todo(caller.user_id, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Todo"))
    }
}
