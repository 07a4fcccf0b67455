//! Configuration for slotboard.
//!
//! Settings are read from `.slotboard/slotboard.toml` in the project directory,
//! falling back to `<user config dir>/slotboard/slotboard.toml`, then to built-in
//! defaults. Environment variables (a `.env` file is honoured) override the
//! file, and CLI flags override both.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! api_url = "http://127.0.0.1:8000/api/v1"
//! ws_url = "ws://127.0.0.1:8000/ws"
//! port = 8000
//! db_path = ".slotboard/slotboard.db"
//!
//! [board]
//! hide_waitlist = false
//!
//! [reconnect]
//! backoff_ms = 2000
//! max_retries = 10
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::board::StatusModel;

pub const CONFIG_DIR: &str = ".slotboard";
pub const CONFIG_FILE: &str = "slotboard.toml";

/// Where the board finds its backend, and where `serve` binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    /// Base URL of the appointments API, including the `/api/v1` prefix
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Live-update WebSocket endpoint
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Port for the reference backend
    #[serde(default = "default_port")]
    pub port: u16,
    /// SQLite file for the reference backend
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_api_url() -> String {
    "http://127.0.0.1:8000/api/v1".to_string()
}

fn default_ws_url() -> String {
    "ws://127.0.0.1:8000/ws".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("slotboard.db")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: default_ws_url(),
            port: default_port(),
            db_path: default_db_path(),
        }
    }
}

/// Board presentation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSection {
    /// Hide the WAITLIST column
    #[serde(default)]
    pub hide_waitlist: bool,
}

/// Reconnect policy for the live-update channel.
///
/// The channel itself never retries; the application drives reconnection with
/// this policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Fixed delay between attempts
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Consecutive failed attempts before giving up. 0 retries forever.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_backoff_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    10
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            backoff_ms: default_backoff_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (1-based), or `None`
    /// once the retry cap is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if self.max_retries != 0 && attempt > self.max_retries {
            return None;
        }
        Some(Duration::from_millis(self.backoff_ms))
    }
}

/// Parsed `slotboard.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotboardConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl SlotboardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse slotboard.toml")
    }

    /// Project config path (`<project>/.slotboard/slotboard.toml`).
    pub fn project_path(project_dir: &Path) -> PathBuf {
        project_dir.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Per-user fallback config path.
    pub fn user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("slotboard").join(CONFIG_FILE))
    }

    /// Load the project config, then the per-user config, then defaults.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let project = Self::project_path(project_dir);
        if project.exists() {
            return Self::load(&project);
        }
        match Self::user_path() {
            Some(user) if user.exists() => Self::load(&user),
            _ => Ok(Self::default()),
        }
    }

    /// Resolve the effective configuration: file, then `.env` and the process
    /// environment.
    pub fn resolve(project_dir: &Path) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::load_or_default(project_dir)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `SLOTBOARD_*` overrides from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SLOTBOARD_API_URL") {
            self.server.api_url = url;
        }
        if let Some(url) = lookup("SLOTBOARD_WS_URL") {
            self.server.ws_url = url;
        }
        if let Some(port) = lookup("SLOTBOARD_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid SLOTBOARD_PORT '{}'", port))?;
        }
        if let Some(path) = lookup("SLOTBOARD_DB_PATH") {
            self.server.db_path = PathBuf::from(path);
        }
        if let Some(hide) = lookup("SLOTBOARD_HIDE_WAITLIST") {
            self.board.hide_waitlist = matches!(hide.as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize slotboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn status_model(&self) -> StatusModel {
        StatusModel::new(self.board.hide_waitlist)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.server.api_url.starts_with("http://") && !self.server.api_url.starts_with("https://") {
            warnings.push(format!(
                "api_url '{}' should start with http:// or https://",
                self.server.api_url
            ));
        }
        if !self.server.ws_url.starts_with("ws://") && !self.server.ws_url.starts_with("wss://") {
            warnings.push(format!(
                "ws_url '{}' should start with ws:// or wss://",
                self.server.ws_url
            ));
        }
        if self.reconnect.backoff_ms == 0 {
            warnings.push("reconnect.backoff_ms is 0; reconnects will spin".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = SlotboardConfig::parse("").unwrap();
        assert_eq!(config, SlotboardConfig::default());
        assert_eq!(config.server.port, 8000);
        assert!(!config.board.hide_waitlist);
        assert_eq!(config.reconnect.backoff_ms, 2000);
        assert_eq!(config.reconnect.max_retries, 10);
    }

    #[test]
    fn test_parse_partial_sections() {
        let content = r#"
[server]
api_url = "https://shop.example.com/api/v1"

[board]
hide_waitlist = true

[reconnect]
max_retries = 0
"#;
        let config = SlotboardConfig::parse(content).unwrap();
        assert_eq!(config.server.api_url, "https://shop.example.com/api/v1");
        assert_eq!(config.server.ws_url, default_ws_url());
        assert!(config.board.hide_waitlist);
        assert_eq!(config.reconnect.max_retries, 0);
        assert_eq!(config.reconnect.backoff_ms, 2000);
    }

    #[test]
    fn test_parse_invalid_toml_fails() {
        assert!(SlotboardConfig::parse("[server\nport = ").is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SLOTBOARD_API_URL", "http://10.0.0.2:9000/api/v1"),
            ("SLOTBOARD_PORT", "9000"),
            ("SLOTBOARD_HIDE_WAITLIST", "true"),
        ]);
        let mut config = SlotboardConfig::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.api_url, "http://10.0.0.2:9000/api/v1");
        assert_eq!(config.server.port, 9000);
        assert!(config.board.hide_waitlist);
        assert_eq!(config.server.ws_url, default_ws_url());
    }

    #[test]
    fn test_env_invalid_port_is_an_error() {
        let mut config = SlotboardConfig::default();
        let result = config.apply_env(|key| (key == "SLOTBOARD_PORT").then(|| "http".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_save_then_load_from_project_dir() {
        let dir = TempDir::new().unwrap();
        let mut config = SlotboardConfig::default();
        config.board.hide_waitlist = true;
        config.server.port = 8123;
        config.save(&SlotboardConfig::project_path(dir.path())).unwrap();

        let loaded = SlotboardConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_flags_bad_urls() {
        let mut config = SlotboardConfig::default();
        assert!(config.validate().is_empty());

        config.server.api_url = "localhost:8000".to_string();
        config.server.ws_url = "http://localhost:8000/ws".to_string();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("api_url"));
        assert!(warnings[1].contains("ws_url"));
    }

    #[test]
    fn test_reconnect_policy_caps_attempts() {
        let policy = ReconnectPolicy {
            backoff_ms: 500,
            max_retries: 3,
        };
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(4), None);
    }

    #[test]
    fn test_reconnect_policy_zero_retries_forever() {
        let policy = ReconnectPolicy {
            backoff_ms: 100,
            max_retries: 0,
        };
        assert_eq!(policy.delay_for(10_000), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_status_model_follows_hide_waitlist() {
        let mut config = SlotboardConfig::default();
        assert!(config.status_model().is_visible_on_board(slotboard_common::AppointmentStatus::Waitlist));
        config.board.hide_waitlist = true;
        assert!(!config.status_model().is_visible_on_board(slotboard_common::AppointmentStatus::Waitlist));
    }
}
