//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/ticklist/config.toml)
//! 3. Environment variables (TICKLIST_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Environment variable prefix
const ENV_PREFIX: &str = "TICKLIST";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (snapshot, backups, session token)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Backend base URL (optional)
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Backend anonymous API key (optional)
    #[serde(default)]
    pub remote_api_key: Option<String>,

    /// Whether sync is enabled
    #[serde(default)]
    pub sync_enabled: bool,

    /// Seconds between periodic push cycles
    #[serde(default = "default_push_interval_secs")]
    pub push_interval_secs: u64,

    /// Milliseconds after a local write during which matching remote
    /// notifications are treated as echoes of our own push and discarded
    #[serde(default = "default_guard_window_ms")]
    pub guard_window_ms: u64,

    /// Milliseconds to wait after sign-in before asking views to reload,
    /// giving the initial pull-merge time to complete
    #[serde(default = "default_sign_in_grace_ms")]
    pub sign_in_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            remote_url: None,
            remote_api_key: None,
            sync_enabled: false,
            push_interval_secs: default_push_interval_secs(),
            guard_window_ms: default_guard_window_ms(),
            sign_in_grace_ms: default_sign_in_grace_ms(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (TICKLIST_DATA_DIR, TICKLIST_REMOTE_URL, ...)
    /// 2. Config file (~/.config/ticklist/config.toml or TICKLIST_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // TICKLIST_DATA_DIR
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // TICKLIST_REMOTE_URL
        if let Ok(val) = std::env::var(format!("{}_REMOTE_URL", ENV_PREFIX)) {
            self.remote_url = if val.is_empty() { None } else { Some(val) };
        }

        // TICKLIST_REMOTE_API_KEY
        if let Ok(val) = std::env::var(format!("{}_REMOTE_API_KEY", ENV_PREFIX)) {
            self.remote_api_key = if val.is_empty() { None } else { Some(val) };
        }

        // TICKLIST_SYNC_ENABLED
        if let Ok(val) = std::env::var(format!("{}_SYNC_ENABLED", ENV_PREFIX)) {
            self.sync_enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        // TICKLIST_GUARD_WINDOW_MS
        if let Ok(val) = std::env::var(format!("{}_GUARD_WINDOW_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.guard_window_ms = ms;
            }
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with TICKLIST_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ticklist")
            .join("config.toml")
    }

    /// Path to the persisted snapshot document
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("snapshot.json")
    }

    /// Path to the legacy tasks mirror kept for older readers
    pub fn legacy_tasks_path(&self) -> PathBuf {
        self.data_dir.join("tasks.json")
    }

    /// Path to the persisted session token
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    /// Path for a timestamped snapshot backup
    pub fn backup_path(&self, at: &DateTime<Utc>) -> PathBuf {
        self.data_dir
            .join(format!("backup-{}.json", at.format("%Y%m%dT%H%M%SZ")))
    }

    /// Interval between periodic push cycles
    pub fn push_interval(&self) -> Duration {
        Duration::from_secs(self.push_interval_secs)
    }

    /// Echo guard window as a signed duration for timestamp arithmetic
    pub fn guard_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.guard_window_ms as i64)
    }

    /// Delay between sign-in and the reload request sent to views
    pub fn sign_in_grace(&self) -> Duration {
        Duration::from_millis(self.sign_in_grace_ms)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ticklist")
}

fn default_push_interval_secs() -> u64 {
    10
}

fn default_guard_window_ms() -> u64 {
    2000
}

fn default_sign_in_grace_ms() -> u64 {
    1500
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap();
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            // Clear all the vars
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "TICKLIST_DATA_DIR",
        "TICKLIST_REMOTE_URL",
        "TICKLIST_REMOTE_API_KEY",
        "TICKLIST_SYNC_ENABLED",
        "TICKLIST_GUARD_WINDOW_MS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.sync_enabled);
        assert!(config.remote_url.is_none());
        assert!(config.data_dir.ends_with("ticklist"));
        assert_eq!(config.push_interval_secs, 10);
        assert_eq!(config.guard_window_ms, 2000);
        assert_eq!(config.sign_in_grace_ms, 1500);
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();

        assert!(config.snapshot_path().ends_with("snapshot.json"));
        assert!(config.legacy_tasks_path().ends_with("tasks.json"));
        assert!(config.session_path().ends_with("session.json"));

        let at = DateTime::parse_from_rfc3339("2025-06-01T12:30:45Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(config
            .backup_path(&at)
            .ends_with("backup-20250601T123045Z.json"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("TICKLIST_DATA_DIR", "/tmp/ticklist-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/ticklist-test"));
    }

    #[test]
    fn test_env_override_sync_enabled() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        assert!(!config.sync_enabled);

        env::set_var("TICKLIST_SYNC_ENABLED", "true");
        config.apply_env_overrides();
        assert!(config.sync_enabled);

        env::set_var("TICKLIST_SYNC_ENABLED", "1");
        config.sync_enabled = false;
        config.apply_env_overrides();
        assert!(config.sync_enabled);

        env::set_var("TICKLIST_SYNC_ENABLED", "false");
        config.apply_env_overrides();
        assert!(!config.sync_enabled);
    }

    #[test]
    fn test_env_override_remote_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        assert!(config.remote_url.is_none());

        env::set_var("TICKLIST_REMOTE_URL", "https://backend.example.com");
        config.apply_env_overrides();
        assert_eq!(
            config.remote_url,
            Some("https://backend.example.com".to_string())
        );

        // Empty string clears it
        env::set_var("TICKLIST_REMOTE_URL", "");
        config.apply_env_overrides();
        assert!(config.remote_url.is_none());
    }

    #[test]
    fn test_env_override_guard_window() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("TICKLIST_GUARD_WINDOW_MS", "500");
        config.apply_env_overrides();
        assert_eq!(config.guard_window_ms, 500);

        // Garbage is ignored
        env::set_var("TICKLIST_GUARD_WINDOW_MS", "soon");
        config.apply_env_overrides();
        assert_eq!(config.guard_window_ms, 500);
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/ticklist"),
            remote_url: Some("https://backend.example.com".to_string()),
            remote_api_key: Some("anon-key".to_string()),
            sync_enabled: true,
            push_interval_secs: 5,
            guard_window_ms: 1000,
            sign_in_grace_ms: 2000,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("remote_url"));
        assert!(toml_str.contains("sync_enabled"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.remote_url, config.remote_url);
        assert_eq!(parsed.sync_enabled, config.sync_enabled);
        assert_eq!(parsed.guard_window_ms, config.guard_window_ms);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            remote_url = "https://backend.example.com"
            sync_enabled = true
            guard_window_ms = 250
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(
            config.remote_url,
            Some("https://backend.example.com".to_string())
        );
        assert!(config.sync_enabled);
        assert_eq!(config.guard_window_ms, 250);
        // Unset keys fall back to defaults
        assert_eq!(config.push_interval_secs, 10);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        // Should return defaults when file doesn't exist
        assert!(!config.sync_enabled);
        assert!(config.remote_url.is_none());
    }
}
