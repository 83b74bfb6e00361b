use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "nested-todos";
const CONFIG_FILE: &str = "config.json";

/// Default API base URL for a local server.
pub const DEFAULT_URL: &str = "http://127.0.0.1:3000/api/v1";

/// Where the CLI finds the server and how it authenticates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// API base URL, including the `/api/v1` prefix.
    pub server_url: String,
    /// Bearer token. Not needed against a server in local mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_URL.to_string(),
            token: None,
        }
    }
}

impl ClientConfig {
    /// Load the config file, then apply `NESTED_TODOS_URL` / `NESTED_TODOS_TOKEN`.
    /// Falls back to defaults if the file is missing or unreadable.
    pub fn load() -> Self {
        Self::load_file().with_overrides(
            std::env::var("NESTED_TODOS_URL").ok(),
            std::env::var("NESTED_TODOS_TOKEN").ok(),
        )
    }

    /// The config file alone, without environment overrides.
    pub fn load_file() -> Self {
        match get_config_path().and_then(|path| Self::load_from(&path)) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        }
    }

    /// Merge new values into the user's config file and return what was
    /// written and where.
    pub fn login(url: Option<String>, token: Option<String>) -> Result<(Self, PathBuf)> {
        let path = get_config_path()?;
        let config = Self::login_at(&path, url, token)?;
        Ok((config, path))
    }

    /// Merge new values into the file at `path`. Environment overrides are
    /// never persisted.
    pub fn login_at(path: &Path, url: Option<String>, token: Option<String>) -> Result<Self> {
        let config = Self::load_from(path)?.with_overrides(url, token);
        config.save_to(path)?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_json::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Replace fields with non-empty override values.
    pub fn with_overrides(mut self, url: Option<String>, token: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.is_empty()) {
            self.server_url = url;
        }
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
        self
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }
}

fn get_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
