//! Undertone Configuration
//!
//! TOML configuration for the orchestrator. Every field has a default, so a
//! partial file (or no file at all) is valid.
//!
//! Lookup order:
//! 1. Explicit path (`--config`)
//! 2. `$UNDERTONE_CONFIG`
//! 3. `$XDG_CONFIG_HOME/undertone/config.toml`
//! 4. Built-in defaults

use crate::error::{ConfigError, ConfigResult};
use crate::privacy::PrivacySettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment override for the config file location
pub const CONFIG_ENV_VAR: &str = "UNDERTONE_CONFIG";
const CONFIG_DIR: &str = "undertone";
const CONFIG_FILE: &str = "config.toml";
const HISTORY_FILE: &str = "history.jsonl";

// ============================================================================
// Sections
// ============================================================================

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Capability registry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum snapshot age before a read re-probes (seconds, valid: 5-3600)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_refresh_interval() -> u64 {
    60
}

impl RegistryConfig {
    pub fn effective_refresh_interval(&self) -> u64 {
        self.refresh_interval_secs.clamp(5, 3600)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

/// Escalation thresholds. Untuned constants, kept as policy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Escalate when local confidence is below this
    #[serde(default = "default_confidence_below")]
    pub confidence_below: f64,

    /// Escalate when overall risk is above this
    #[serde(default = "default_risk_above")]
    pub risk_above: u8,

    /// Lower bound (exclusive) of the ambiguous sarcasm band
    #[serde(default = "default_sarcasm_band_low")]
    pub sarcasm_band_low: u8,

    /// Upper bound (exclusive) of the ambiguous sarcasm band
    #[serde(default = "default_sarcasm_band_high")]
    pub sarcasm_band_high: u8,
}

fn default_confidence_below() -> f64 {
    0.6
}

fn default_risk_above() -> u8 {
    70
}

fn default_sarcasm_band_low() -> u8 {
    30
}

fn default_sarcasm_band_high() -> u8 {
    80
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            confidence_below: default_confidence_below(),
            risk_above: default_risk_above(),
            sarcasm_band_low: default_sarcasm_band_low(),
            sarcasm_band_high: default_sarcasm_band_high(),
        }
    }
}

impl EscalationConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_below) {
            return Err(ConfigError::Invalid(format!(
                "escalation.confidence_below must be within 0.0-1.0, got {}",
                self.confidence_below
            )));
        }
        if self.risk_above > 100 {
            return Err(ConfigError::Invalid(format!(
                "escalation.risk_above must be within 0-100, got {}",
                self.risk_above
            )));
        }
        if self.sarcasm_band_low >= self.sarcasm_band_high {
            return Err(ConfigError::Invalid(format!(
                "escalation sarcasm band is empty: {}..{}",
                self.sarcasm_band_low, self.sarcasm_band_high
            )));
        }
        Ok(())
    }
}

/// On-device generative backend (local Ollama-style model server)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerativeConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_generative_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_generative_model")]
    pub model: String,

    /// Inference bound in milliseconds (valid: 500-120000)
    #[serde(default = "default_generative_timeout")]
    pub timeout_ms: u64,
}

fn default_generative_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_generative_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_generative_timeout() -> u64 {
    15_000
}

impl GenerativeConfig {
    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms.clamp(500, 120_000)
    }
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_generative_endpoint(),
            model: default_generative_model(),
            timeout_ms: default_generative_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Remote-enhanced backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default bound for remote calls when a request supplies none
    /// (milliseconds, valid: 100-60000)
    #[serde(default = "default_remote_timeout")]
    pub timeout_ms: u64,

    /// Treat the network as unavailable regardless of other settings
    #[serde(default)]
    pub offline: bool,
}

fn default_remote_timeout() -> u64 {
    3_000
}

impl RemoteConfig {
    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms.clamp(100, 60_000)
    }

    pub fn is_configured(&self) -> bool {
        self.enabled && !self.endpoint.trim().is_empty()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: None,
            timeout_ms: default_remote_timeout(),
            offline: false,
        }
    }
}

/// Persisted history collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Defaults to the platform data dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Most-recent-N cap (valid: 1-10000)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    50
}

impl HistoryConfig {
    pub fn effective_max_entries(&self) -> usize {
        self.max_entries.clamp(1, 10_000)
    }

    pub fn effective_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(|| {
            dirs::data_local_dir().map(|d| d.join(CONFIG_DIR).join(HISTORY_FILE))
        })
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            max_entries: default_max_entries(),
        }
    }
}

/// Result cache keyed on sanitized content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Most results kept (valid: 1-10000)
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,

    /// Entry lifetime in seconds (valid: 1-86400)
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_entries() -> usize {
    100
}

fn default_cache_ttl() -> u64 {
    600
}

impl CacheConfig {
    pub fn effective_max_entries(&self) -> usize {
        self.max_entries.clamp(1, 10_000)
    }

    pub fn effective_ttl_secs(&self) -> u64 {
        self.ttl_secs.clamp(1, 86_400)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_cache_entries(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

// ============================================================================
// Top-level Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UndertoneConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub privacy: PrivacySettings,
    #[serde(default)]
    pub generative: GenerativeConfig,
    #[serde(default)]
    pub heuristic: HeuristicConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl UndertoneConfig {
    /// Parse from TOML text and validate
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: UndertoneConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.escalation.validate()
    }

    /// Load a specific file. A missing file is an error here.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Resolve and load configuration following the lookup order.
    ///
    /// Returns the config plus the file it came from (`None` for defaults).
    /// An explicitly named file must exist; the default location may not.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load_from(path)?, Some(path.to_path_buf())));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            return Ok((Self::load_from(&path)?, Some(path)));
        }

        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Ok((Self::load_from(&path)?, Some(path)));
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok((Self::default(), None))
    }

    /// `$XDG_CONFIG_HOME/undertone/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let text = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privacy::PrivacyLevel;

    #[test]
    fn test_defaults() {
        let config = UndertoneConfig::default();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.registry.refresh_interval_secs, 60);
        assert_eq!(config.escalation.confidence_below, 0.6);
        assert_eq!(config.escalation.risk_above, 70);
        assert_eq!(config.escalation.sarcasm_band_low, 30);
        assert_eq!(config.escalation.sarcasm_band_high, 80);
        assert_eq!(config.privacy.level, PrivacyLevel::High);
        assert!(!config.privacy.allow_remote);
        assert!(!config.generative.enabled);
        assert!(config.heuristic.enabled);
        assert!(!config.remote.is_configured());
        assert_eq!(config.remote.timeout_ms, 3_000);
        assert_eq!(config.history.max_entries, 50);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_entries, 100);
        assert_eq!(config.cache.ttl_secs, 600);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = UndertoneConfig::from_toml_str(
            r#"
            [privacy]
            level = "standard"
            allow_remote = true

            [remote]
            enabled = true
            endpoint = "https://enhance.example.net/v1/analyze"
            "#,
        )
        .unwrap();
        assert_eq!(config.privacy.level, PrivacyLevel::Standard);
        assert!(config.privacy.allow_remote);
        assert!(config.remote.is_configured());
        assert_eq!(config.remote.timeout_ms, 3_000);
        assert_eq!(config.escalation.risk_above, 70);
    }

    #[test]
    fn test_invalid_band_rejected() {
        let err = UndertoneConfig::from_toml_str(
            r#"
            [escalation]
            sarcasm_band_low = 80
            sarcasm_band_high = 30
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_clamping() {
        let mut config = UndertoneConfig::default();
        config.registry.refresh_interval_secs = 1;
        config.remote.timeout_ms = 10;
        config.history.max_entries = 0;
        config.cache.max_entries = 0;
        config.cache.ttl_secs = 0;
        assert_eq!(config.registry.effective_refresh_interval(), 5);
        assert_eq!(config.cache.effective_max_entries(), 1);
        assert_eq!(config.cache.effective_ttl_secs(), 1);
        assert_eq!(config.remote.effective_timeout_ms(), 100);
        assert_eq!(config.history.effective_max_entries(), 1);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = UndertoneConfig::default();
        config.remote.enabled = true;
        config.remote.endpoint = "https://enhance.example.net".into();
        config.escalation.risk_above = 65;
        config.save(&path).unwrap();

        let (loaded, source) = UndertoneConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = UndertoneConfig::load(Some(Path::new("/nonexistent/undertone.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
