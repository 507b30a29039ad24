//! Layered configuration for buildwatch.
//!
//! Values are resolved in order: built-in defaults, then the TOML file, then
//! the environment, then command-line flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [api]
//! base_url = "https://builds.example.com/api"
//! token = "..."
//! request_timeout_secs = 30
//!
//! [timing]
//! poll_interval_secs = 5
//! failure_threshold = 3
//! load_timeout_secs = 30
//! countdown_tick_secs = 30
//! expiry_warning_secs = 300
//! resume_backoff_secs = 5
//! resume_max_attempts = 2
//! backfill_limit = 100
//!
//! [logging]
//! level = "info"
//! json = false
//! file = "/tmp/buildwatch/buildwatch.log"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::preview::PreviewTiming;
use crate::session::SessionTiming;
use crate::status::PollConfig;

pub const ENV_API_URL: &str = "BUILDWATCH_API_URL";
pub const ENV_TOKEN: &str = "BUILDWATCH_TOKEN";
pub const ENV_LOG: &str = "BUILDWATCH_LOG";

/// Directory, relative to the working directory, searched for `config.toml`.
pub const PROJECT_DIR: &str = ".buildwatch";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Consecutive failed status fetches before the connection is reported lost
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
    #[serde(default = "default_countdown_tick_secs")]
    pub countdown_tick_secs: u64,
    #[serde(default = "default_expiry_warning_secs")]
    pub expiry_warning_secs: i64,
    #[serde(default = "default_resume_backoff_secs")]
    pub resume_backoff_secs: u64,
    #[serde(default = "default_resume_max_attempts")]
    pub resume_max_attempts: u32,
    #[serde(default = "default_backfill_limit")]
    pub backfill_limit: usize,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_load_timeout_secs() -> u64 {
    30
}

fn default_countdown_tick_secs() -> u64 {
    30
}

fn default_expiry_warning_secs() -> i64 {
    300
}

fn default_resume_backoff_secs() -> u64 {
    5
}

fn default_resume_max_attempts() -> u32 {
    2
}

fn default_backfill_limit() -> usize {
    100
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            failure_threshold: default_failure_threshold(),
            load_timeout_secs: default_load_timeout_secs(),
            countdown_tick_secs: default_countdown_tick_secs(),
            expiry_warning_secs: default_expiry_warning_secs(),
            resume_backoff_secs: default_resume_backoff_secs(),
            resume_max_attempts: default_resume_max_attempts(),
            backfill_limit: default_backfill_limit(),
        }
    }
}

impl TimingConfig {
    pub fn session_timing(&self) -> SessionTiming {
        SessionTiming {
            poll: PollConfig {
                interval: Duration::from_secs(self.poll_interval_secs.max(1)),
                failure_threshold: self.failure_threshold,
            },
            preview: PreviewTiming {
                load_timeout: Duration::from_secs(self.load_timeout_secs),
                countdown_tick: Duration::from_secs(self.countdown_tick_secs.max(1)),
                expiry_warning_secs: self.expiry_warning_secs,
                resume_backoff: Duration::from_secs(self.resume_backoff_secs),
                resume_max_attempts: self.resume_max_attempts,
            },
            backfill_limit: self.backfill_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Mirror logs to a daily-rotated file with this path prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Values given on the command line; `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub verbose: bool,
    pub json_logs: bool,
}

impl WatchConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse buildwatch config")
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Per-user config file location, if the platform has a config dir.
    pub fn user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("buildwatch").join(CONFIG_FILE))
    }

    /// Find the file to load: the explicit path, else the project file under
    /// `cwd`, else the per-user file. Only the explicit path may be missing.
    pub fn discover(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let project = cwd.join(PROJECT_DIR).join(CONFIG_FILE);
        if project.is_file() {
            return Some(project);
        }
        Self::user_path().filter(|p| p.is_file())
    }

    /// Overlay environment values read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(token) = non_empty(ENV_TOKEN) {
            self.api.token = Some(token);
        }
        if let Some(level) = non_empty(ENV_LOG) {
            self.logging.level = level;
        }
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(url) = &cli.api_url {
            self.api.base_url = url.clone();
        }
        if let Some(token) = &cli.token {
            self.api.token = Some(token.clone());
        }
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
        if cli.json_logs {
            self.logging.json = true;
        }
    }

    /// Resolve the effective configuration through every layer.
    pub fn resolve(cli: &CliOverrides, cwd: &Path) -> Result<(Self, Option<PathBuf>)> {
        let path = Self::discover(cli.config_path.as_deref(), cwd);
        let mut config = match &path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_cli(cli);
        Ok((config, path))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Copy with the token masked, for display.
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if shown.api.token.is_some() {
            shown.api.token = Some("********".to_string());
        }
        shown
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if reqwest::Url::parse(&self.api.base_url).is_err() {
            warnings.push(format!("Invalid api.base_url '{}'", self.api.base_url));
        }
        if self.api.token.is_none() {
            warnings.push(format!(
                "No API token configured (set api.token or {})",
                ENV_TOKEN
            ));
        }
        if self.timing.resume_max_attempts == 0 {
            warnings.push("timing.resume_max_attempts is 0; resume will never be attempted".into());
        }
        if self.timing.backfill_limit == 0 {
            warnings.push("timing.backfill_limit is 0; earlier logs cannot be loaded".into());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = WatchConfig::parse("").unwrap();
        assert_eq!(config, WatchConfig::default());
        assert_eq!(config.timing.poll_interval_secs, 5);
        assert_eq!(config.timing.expiry_warning_secs, 300);
        assert_eq!(config.timing.backfill_limit, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_partial_sections() {
        let config = WatchConfig::parse(
            r#"
[api]
base_url = "https://builds.example.com/api"

[timing]
poll_interval_secs = 2
"#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "https://builds.example.com/api");
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.timing.poll_interval_secs, 2);
        assert_eq!(config.timing.load_timeout_secs, 30);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = WatchConfig::parse("[api]\nbase_uri = \"x\"\n").unwrap_err();
        assert!(format!("{:#}", err).contains("base_uri"));

        assert!(WatchConfig::parse("[metrics]\nenabled = true\n").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let mut config = WatchConfig::default();
        config.api.token = Some("secret".into());
        config.logging.json = true;
        config.save(&path).unwrap();

        let loaded = WatchConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_names_the_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        let err = WatchConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_discover_prefers_explicit_then_project() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("custom.toml");
        assert_eq!(
            WatchConfig::discover(Some(&explicit), dir.path()),
            Some(explicit.clone())
        );

        let project = dir.path().join(PROJECT_DIR).join(CONFIG_FILE);
        WatchConfig::default().save(&project).unwrap();
        assert_eq!(WatchConfig::discover(None, dir.path()), Some(project));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = WatchConfig::parse("[api]\nbase_url = \"http://file\"\n").unwrap();
        config.apply_env(env(&[
            (ENV_API_URL, "http://env"),
            (ENV_TOKEN, "tok"),
            (ENV_LOG, "buildwatch=trace"),
        ]));
        assert_eq!(config.api.base_url, "http://env");
        assert_eq!(config.api.token.as_deref(), Some("tok"));
        assert_eq!(config.logging.level, "buildwatch=trace");
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = WatchConfig::default();
        config.apply_env(env(&[(ENV_API_URL, "  "), (ENV_TOKEN, "")]));
        assert_eq!(config.api.base_url, default_base_url());
        assert!(config.api.token.is_none());
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = WatchConfig::default();
        config.apply_env(env(&[(ENV_API_URL, "http://env"), (ENV_TOKEN, "env-token")]));
        config.apply_cli(&CliOverrides {
            api_url: Some("http://cli".into()),
            verbose: true,
            json_logs: true,
            ..CliOverrides::default()
        });
        assert_eq!(config.api.base_url, "http://cli");
        assert_eq!(config.api.token.as_deref(), Some("env-token"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_resolve_reads_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bw.toml");
        std::fs::write(&path, "[timing]\nresume_max_attempts = 4\n").unwrap();
        let (config, used) = WatchConfig::resolve(
            &CliOverrides {
                config_path: Some(path.clone()),
                ..CliOverrides::default()
            },
            dir.path(),
        )
        .unwrap();
        assert_eq!(used, Some(path));
        assert_eq!(config.timing.resume_max_attempts, 4);
    }

    #[test]
    fn test_session_timing_conversion() {
        let timing = TimingConfig {
            poll_interval_secs: 2,
            load_timeout_secs: 10,
            ..TimingConfig::default()
        }
        .session_timing();
        assert_eq!(timing.poll.interval, Duration::from_secs(2));
        assert_eq!(timing.poll.failure_threshold, 3);
        assert_eq!(timing.preview.load_timeout, Duration::from_secs(10));
        assert_eq!(timing.preview.resume_max_attempts, 2);
        assert_eq!(timing.backfill_limit, 100);
    }

    #[test]
    fn test_redacted_masks_token() {
        let mut config = WatchConfig::default();
        config.api.token = Some("secret".into());
        let shown = config.redacted();
        assert_eq!(shown.api.token.as_deref(), Some("********"));
        assert!(WatchConfig::default().redacted().api.token.is_none());
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = WatchConfig::default();
        config.api.token = Some("t".into());
        assert!(config.validate().is_empty());

        config.api.base_url = "not a url".into();
        config.timing.backfill_limit = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("base_url"));
    }
}
