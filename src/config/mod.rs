//! Configuration loading.
//!
//! Read from `config.toml` in the platform config directory unless a path
//! is given.  Every field has a default, so a missing file or a partial one
//! is fine.

pub mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

pub use schema::parse_duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub playback: PlaybackConfig,
    pub logging: LoggingConfig,
}

/// Council backend connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Voice the backend synthesizes with.
    pub voice_id: String,
    /// Fetch timeout, e.g. "60s".  Empty or "0s" disables it.
    pub timeout: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".to_string(),
            voice_id: "Matthew".to_string(),
            timeout: "60s".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Result<Option<Duration>> {
        parse_duration(&self.timeout).map_err(|e| anyhow!("api.timeout: {}", e))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Initial state of the auto-read toggle.
    pub auto_read: bool,
    /// Where downloaded audio is written; `~` is expanded.
    pub download_dir: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            auto_read: false,
            download_dir: "~/Downloads".to_string(),
        }
    }
}

impl PlaybackConfig {
    pub fn download_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.download_dir).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parse and validate TOML content.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default location, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        schema::validate_http_url(&self.api.base_url).map_err(|e| anyhow!("api.base_url: {}", e))?;
        if self.api.voice_id.trim().is_empty() {
            return Err(anyhow!("api.voice_id must not be empty"));
        }
        self.api.timeout()?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }
}

/// `<config dir>/council-voice/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "council-voice").map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://127.0.0.1:8001");
        assert_eq!(config.api.voice_id, "Matthew");
        assert_eq!(config.api.timeout().unwrap(), Some(Duration::from_secs(60)));
        assert!(!config.playback.auto_read);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::from_str(
            r#"
            [api]
            voice_id = "Joanna"

            [playback]
            auto_read = true
            "#,
        )
        .unwrap();
        assert_eq!(config.api.voice_id, "Joanna");
        assert_eq!(config.api.base_url, "http://127.0.0.1:8001");
        assert!(config.playback.auto_read);
        assert_eq!(config.playback.download_dir, "~/Downloads");
    }

    #[test]
    fn empty_timeout_disables_limit() {
        let config = Config::from_str("[api]\ntimeout = \"\"\n").unwrap();
        assert_eq!(config.api.timeout().unwrap(), None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::from_str("[api]\nbase_url = \"localhost\"\n").is_err());
        assert!(Config::from_str("[api]\nvoice_id = \" \"\n").is_err());
        assert!(Config::from_str("[api]\ntimeout = \"soon\"\n").is_err());
        assert!(Config::from_str("[api]\ntimeout = \"9999999999999h\"\n").is_err());
        assert!(Config::from_str("[api\n").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");

        let explicit = Config::load_or_default(Some(file.path())).unwrap();
        assert_eq!(explicit, config);
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn toml_round_trip_preserves_values() {
        let mut config = Config::default();
        config.api.voice_id = "Amy".to_string();
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_str(&text).unwrap(), config);
    }

    #[test]
    fn download_dir_plain_path() {
        let playback = PlaybackConfig {
            download_dir: "/tmp/council".to_string(),
            ..Default::default()
        };
        assert_eq!(playback.download_dir(), PathBuf::from("/tmp/council"));
    }
}
