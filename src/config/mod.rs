//! Configuration file and on-disk locations

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::channel::protocol;

const DEFAULT_SERVER_URL: &str = "http://localhost:4000";
const DEFAULT_SOCKET_PATH: &str = "/api/socket";
const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the chat server; `https` implies a secure socket
    pub server_url: String,
    /// Path of the channel socket endpoint on the server
    pub socket_path: String,
    /// Seconds between socket heartbeats
    pub heartbeat_secs: u64,
    /// Where room state is saved between runs (defaults to the data dir)
    pub state_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            state_dir: None,
        }
    }
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "roomchat", "roomchat")
            .context("Could not determine config directory")
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Directory holding the saved room state.
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("state")),
        }
    }

    pub fn socket_url(&self) -> Result<Url> {
        protocol::socket_url(&self.server_url, &self.socket_path)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}
