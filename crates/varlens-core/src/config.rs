use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, VarlensError};

/// Top-level configuration for the Varlens client.
///
/// Loaded from `~/.varlens/config.toml` by default. Every section is optional
/// in the file and falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VarlensConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl VarlensConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VarlensConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the client cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(VarlensError::Config("backend.base_url is empty".to_string()));
        }
        if self.session.redirect_grace_ms == 0 {
            return Err(VarlensError::Config(
                "session.redirect_grace_ms must be greater than zero".to_string(),
            ));
        }
        if self.chat.max_message_length == 0 {
            return Err(VarlensError::Config(
                "chat.max_message_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Analysis backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the analysis backend, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout for result loads.
    pub request_timeout_secs: u64,
    /// Retries for transient result-load failures. `NoData` is never retried.
    pub max_retries: u32,
    /// Initial retry delay; doubles on each attempt.
    pub retry_backoff_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_secs: 30,
            max_retries: 2,
            retry_backoff_ms: 250,
        }
    }
}

/// Session bootstrap settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Grace window before redirecting a host that has no session id.
    pub redirect_grace_ms: u64,
    /// View to redirect to when no session resolves.
    pub default_view: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            redirect_grace_ms: 100,
            default_view: "/".to_string(),
        }
    }
}

/// Conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum user message length in characters.
    pub max_message_length: usize,
    /// Path of the streaming chat endpoint, appended to `backend.base_url`.
    pub stream_path: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: 4000,
            stream_path: "/api/chat/stream".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VarlensConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.backend.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.backend.max_retries, 2);
        assert_eq!(config.session.redirect_grace_ms, 100);
        assert_eq!(config.session.default_view, "/");
        assert_eq!(config.chat.stream_path, "/api/chat/stream");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let toml_str = r#"
            [backend]
            base_url = "https://analysis.example.org"

            [session]
            default_view = "/upload"
        "#;
        let config: VarlensConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend.base_url, "https://analysis.example.org");
        assert_eq!(config.backend.request_timeout_secs, 30);
        assert_eq!(config.session.default_view, "/upload");
        assert_eq!(config.session.redirect_grace_ms, 100);
        assert_eq!(config.chat.max_message_length, 4000);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: VarlensConfig = toml::from_str("").unwrap();
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = VarlensConfig::default();
        config.backend.max_retries = 5;
        config.general.log_level = "debug".to_string();
        config.save(&path).unwrap();

        let loaded = VarlensConfig::load(&path).unwrap();
        assert_eq!(loaded.backend.max_retries, 5);
        assert_eq!(loaded.general.log_level, "debug");
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = VarlensConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(VarlensError::Io(_))));
    }

    #[test]
    fn test_load_or_default_on_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backend = [[[").unwrap();
        let config = VarlensConfig::load_or_default(&path);
        assert_eq!(config.backend.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_validate_rejects_empty_base_url() {
        let mut config = VarlensConfig::default();
        config.backend.base_url = "  ".to_string();
        assert!(matches!(config.validate(), Err(VarlensError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_grace_window() {
        let mut config = VarlensConfig::default();
        config.session.redirect_grace_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_message_length() {
        let mut config = VarlensConfig::default();
        config.chat.max_message_length = 0;
        assert!(config.validate().is_err());
    }
}
