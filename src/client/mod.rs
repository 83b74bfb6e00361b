//! HTTP client for the todo API.
//!
//! Used by the `ntd` subcommands. Connection details come from
//! [`ClientConfig`], which merges the config file with environment overrides.

mod config;
mod optimistic;

pub use config::{ClientConfig, DEFAULT_URL};
pub use optimistic::{quick_add, OptimisticTodos};

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;
use crate::validation::{FieldError, TodoForm, ValidationErrors};

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {}", describe_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Unauthorized: token required or invalid")]
    Unauthorized,

    #[error("Server error: {0}")]
    Server(String),
}

fn describe_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// HTTP client for the todo API.
#[derive(Debug, Clone)]
pub struct TodoClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl TodoClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: Client::new(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.server_url.clone(), config.token.clone())
    }

    /// Build a request with optional auth header.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::error_for(status, response).await)
        }
    }

    /// Handle response that returns an empty body (204 No Content).
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<(), ClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::error_for(status, response).await)
        }
    }

    async fn error_for(status: StatusCode, response: reqwest::Response) -> ClientError {
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => ClientError::NotFound(body),
            StatusCode::UNPROCESSABLE_ENTITY => {
                match serde_json::from_str::<ValidationErrors>(&body) {
                    Ok(errors) => ClientError::Validation(errors.errors),
                    Err(_) => ClientError::Server(format!("{}: {}", status, body)),
                }
            }
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
            _ => ClientError::Server(format!("{}: {}", status, body)),
        }
    }

    // ============================================================
    // Todo Operations
    // ============================================================

    /// All todos, newest first.
    pub async fn list(&self) -> Result<Vec<Todo>, ClientError> {
        let response = self.request(reqwest::Method::GET, "/todos").send().await?;
        self.handle_response(response).await
    }

    /// Todos as a forest, filtered at the root level.
    pub async fn tree(&self, filter: TodoFilter) -> Result<Vec<TodoWithChildren>, ClientError> {
        let response = self
            .request(reqwest::Method::GET, "/todos/tree")
            .query(&[("filter", filter.as_str())])
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Todo, ClientError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/todos/{}", id))
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn create(&self, form: &TodoForm) -> Result<Todo, ClientError> {
        let response = self
            .request(reqwest::Method::POST, "/todos")
            .json(form)
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn update(&self, id: Uuid, form: &TodoForm) -> Result<Todo, ClientError> {
        let response = self
            .request(reqwest::Method::PUT, &format!("/todos/{}", id))
            .json(form)
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn toggle(&self, id: Uuid, completed: bool) -> Result<(), ClientError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/todos/{}/toggle", id))
            .json(&ToggleTodoInput { completed })
            .send()
            .await?;
        self.handle_empty_response(response).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ClientError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/todos/{}", id))
            .send()
            .await?;
        self.handle_empty_response(response).await
    }
}
