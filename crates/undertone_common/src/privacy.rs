//! Privacy settings and the settings collaborator.
//!
//! Settings are configuration, not orchestrator state: the orchestrator reads
//! them once per request through [`SettingsSource`].

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    /// Nothing leaves the device
    #[default]
    High,
    Standard,
    Low,
}

impl PrivacyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyLevel::High => "high",
            PrivacyLevel::Standard => "standard",
            PrivacyLevel::Low => "low",
        }
    }
}

impl std::str::FromStr for PrivacyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(PrivacyLevel::High),
            "standard" => Ok(PrivacyLevel::Standard),
            "low" => Ok(PrivacyLevel::Low),
            other => Err(format!("unknown privacy level: {}", other)),
        }
    }
}

/// Privacy level plus the remote-enhancement opt-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacySettings {
    #[serde(default)]
    pub level: PrivacyLevel,
    #[serde(default)]
    pub allow_remote: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            level: PrivacyLevel::High,
            allow_remote: false,
        }
    }
}

impl PrivacySettings {
    pub fn new(level: PrivacyLevel, allow_remote: bool) -> Self {
        Self { level, allow_remote }
    }

    /// Settings that permit remote enhancement
    pub fn permissive() -> Self {
        Self::new(PrivacyLevel::Standard, true)
    }

    /// Whether remote enhancement may be used at all.
    ///
    /// Requires opt-in and a level below `high`. A per-request `Some(false)`
    /// vetoes; a per-request `Some(true)` cannot override the settings.
    pub fn permits_remote(&self, request_allow: Option<bool>) -> bool {
        self.allow_remote && self.level != PrivacyLevel::High && request_allow.unwrap_or(true)
    }

    /// Effective settings for one request
    pub fn for_request(&self, request_allow: Option<bool>) -> Self {
        Self {
            level: self.level,
            allow_remote: self.permits_remote(request_allow),
        }
    }
}

/// External source of privacy settings
pub trait SettingsSource: Send + Sync {
    fn privacy_settings(&self) -> PrivacySettings;
}

/// Settings that can be swapped at runtime (e.g. after a preferences update)
#[derive(Debug, Default)]
pub struct SharedSettings {
    inner: RwLock<PrivacySettings>,
}

impl SharedSettings {
    pub fn new(settings: PrivacySettings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn update(&self, settings: PrivacySettings) {
        match self.inner.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }
}

impl SettingsSource for SharedSettings {
    fn privacy_settings(&self) -> PrivacySettings {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl SettingsSource for PrivacySettings {
    fn privacy_settings(&self) -> PrivacySettings {
        *self
    }
}
