//! Undertone Common - shared types, configuration and privacy primitives.
//!
//! Everything here is synchronous and free of I/O except config loading.

pub mod config;
pub mod error;
pub mod lexicon;
pub mod privacy;
pub mod redaction;
pub mod types;

pub use config::UndertoneConfig;
pub use error::{ConfigError, ConfigResult};
pub use privacy::{PrivacyLevel, PrivacySettings, SettingsSource, SharedSettings};
pub use redaction::{sanitize, IdentifierKind};
pub use types::*;
