use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::core::cost::cache;
use crate::core::cost::provider::{ClaudeLogFilter, Provider};
use crate::core::cost::scanner::ScanOptions;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_format")]
    pub default_format: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_format() -> String {
    "text".to_string()
}
fn default_color() -> String {
    "auto".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            color: default_color(),
        }
    }
}

/// Where session logs are read from and how often they are rescanned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// codex | claude | vertexai
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Defaults to `$CODEX_HOME/sessions`, then `~/.codex/sessions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions_root: Option<PathBuf>,
    /// Defaults to the `projects` dir of `~/.claude`, `$CLAUDE_CONFIG_DIR`
    /// and the platform config dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_projects_roots: Option<Vec<PathBuf>>,
    /// all | vertexai-only | exclude-vertexai
    #[serde(default = "default_claude_log_filter")]
    pub claude_log_filter: String,
    /// Defaults to `$XDG_CACHE_HOME/aic`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_refresh_min_interval_secs")]
    pub refresh_min_interval_secs: u64,
    #[serde(default = "default_days")]
    pub default_days: u32,
}

fn default_provider() -> String {
    "codex".to_string()
}
fn default_claude_log_filter() -> String {
    "all".to_string()
}
fn default_refresh_min_interval_secs() -> u64 {
    60
}
fn default_days() -> u32 {
    30
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            sessions_root: None,
            claude_projects_roots: None,
            claude_log_filter: default_claude_log_filter(),
            cache_dir: None,
            refresh_min_interval_secs: default_refresh_min_interval_secs(),
            default_days: default_days(),
        }
    }
}

impl ScanSettings {
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(cache::default_cache_root)
    }

    /// The configured default provider, Codex when unrecognized.
    pub fn provider(&self) -> Provider {
        Provider::from_id(&self.default_provider).unwrap_or_default()
    }

    pub fn scan_options(&self, provider: Provider, force_rescan: bool) -> ScanOptions {
        ScanOptions {
            provider,
            sessions_root: self.sessions_root.clone(),
            claude_projects_roots: self.claude_projects_roots.clone(),
            claude_log_filter: ClaudeLogFilter::from_id(&self.claude_log_filter)
                .unwrap_or_default(),
            cache_root: Some(self.cache_root()),
            refresh_min_interval: Duration::from_secs(self.refresh_min_interval_secs),
            force_rescan,
            ..ScanOptions::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub scan: ScanSettings,
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("aic").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config to the config file path.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !["text", "json"].contains(&self.settings.default_format.as_str()) {
            issues.push(format!(
                "Invalid default_format: '{}' (must be 'text' or 'json')",
                self.settings.default_format
            ));
        }
        if !["auto", "always", "never"].contains(&self.settings.color.as_str()) {
            issues.push(format!(
                "Invalid color: '{}' (must be 'auto', 'always', or 'never')",
                self.settings.color
            ));
        }
        if Provider::from_id(&self.scan.default_provider).is_none() {
            issues.push(format!(
                "Invalid default_provider: '{}' (must be 'codex', 'claude', or 'vertexai')",
                self.scan.default_provider
            ));
        }
        if ClaudeLogFilter::from_id(&self.scan.claude_log_filter).is_none() {
            issues.push(format!(
                "Invalid claude_log_filter: '{}' (must be 'all', 'vertexai-only', or 'exclude-vertexai')",
                self.scan.claude_log_filter
            ));
        }
        if self.scan.default_days == 0 {
            issues.push("Invalid default_days: must be at least 1".to_string());
        }
        if let Some(root) = &self.scan.sessions_root {
            if !root.is_dir() {
                issues.push(format!(
                    "sessions_root does not exist: '{}'",
                    root.display()
                ));
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let config = AppConfig::default();
        let issues = config.validate();
        assert!(issues.is_empty(), "Default config should be valid, got: {:?}", issues);
    }

    #[test]
    fn default_format_is_text() {
        let settings = Settings::default();
        assert_eq!(settings.default_format, "text");
    }

    #[test]
    fn default_scan_settings() {
        let scan = ScanSettings::default();
        assert_eq!(scan.refresh_min_interval_secs, 60);
        assert_eq!(scan.default_days, 30);
        assert!(scan.sessions_root.is_none());
    }

    #[test]
    fn validate_catches_invalid_format() {
        let mut config = AppConfig::default();
        config.settings.default_format = "xml".to_string();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("default_format")));
    }

    #[test]
    fn validate_catches_invalid_color() {
        let mut config = AppConfig::default();
        config.settings.color = "blue".to_string();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("color")));
    }

    #[test]
    fn validate_catches_zero_days() {
        let mut config = AppConfig::default();
        config.scan.default_days = 0;
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("default_days")));
    }

    #[test]
    fn validate_catches_missing_sessions_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.scan.sessions_root = Some(dir.path().join("missing"));
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("sessions_root")));

        config.scan.sessions_root = Some(dir.path().to_path_buf());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
[settings]
default_format = "json"
color = "always"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.settings.default_format, "json");
        assert_eq!(config.settings.color, "always");
        assert_eq!(config.scan.default_days, 30);
    }

    #[test]
    fn parse_scan_toml() {
        let toml = r#"
[scan]
sessions_root = "/data/codex/sessions"
refresh_min_interval_secs = 0
default_days = 7
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.scan.sessions_root,
            Some(PathBuf::from("/data/codex/sessions"))
        );
        let options = config.scan.scan_options(config.scan.provider(), true);
        assert_eq!(options.provider, Provider::Codex);
        assert_eq!(options.refresh_min_interval, Duration::ZERO);
        assert!(options.force_rescan);
        assert_eq!(config.scan.default_days, 7);
    }

    #[test]
    fn parse_claude_scan_toml() {
        let toml = r#"
[scan]
default_provider = "vertexai"
claude_projects_roots = ["/data/claude/projects"]
claude_log_filter = "exclude-vertexai"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_empty());
        let options = config.scan.scan_options(config.scan.provider(), false);
        assert_eq!(options.provider, Provider::VertexAi);
        assert_eq!(options.claude_log_filter, ClaudeLogFilter::ExcludeVertexAi);
        assert_eq!(
            options.claude_projects_roots,
            Some(vec![PathBuf::from("/data/claude/projects")])
        );
    }

    #[test]
    fn validate_catches_unknown_provider_and_filter() {
        let mut config = AppConfig::default();
        config.scan.default_provider = "gemini".to_string();
        config.scan.claude_log_filter = "some".to_string();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("default_provider")));
        assert!(issues.iter().any(|i| i.contains("claude_log_filter")));
        assert_eq!(config.scan.provider(), Provider::Codex);
    }

    #[test]
    fn parse_empty_toml_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.settings.default_format, "text");
        assert_eq!(config.settings.color, "auto");
        assert_eq!(config.scan.refresh_min_interval_secs, 60);
    }

    #[test]
    fn serialized_default_round_trips() {
        let text = toml::to_string_pretty(&AppConfig::default()).unwrap();
        let config: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.scan.default_days, 30);
        assert!(!text.contains("sessions_root"));
    }

    #[test]
    fn config_path_uses_xdg_when_set() {
        std::env::set_var("XDG_CONFIG_HOME", "/tmp/test_xdg_config");
        let path = AppConfig::config_path();
        std::env::remove_var("XDG_CONFIG_HOME");
        assert_eq!(path, PathBuf::from("/tmp/test_xdg_config/aic/config.toml"));
    }
}
