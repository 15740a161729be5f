//! Escalation configuration loaded from `.env` / process environment, or from a TOML file.
//!
//! Selected once at process start and handed to the orchestrator. Nothing else in the
//! crate reads the environment.

use crate::error::{EscalationError, EscalationResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One hour.
pub const DEFAULT_COOLDOWN_MS: i64 = 3_600_000;
const DEFAULT_SEND_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_GENERATOR_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_STORAGE_PATH: &str = "./data/soulsync";

/// How a qualifying turn reaches the emergency contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// Personal-companion deployment: dispatch without human review.
    Direct,
    /// A moderator must approve every case before anything is sent.
    Moderated,
}

impl DeploymentMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Some(Self::Direct),
            "moderated" => Some(Self::Moderated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Moderated => "moderated",
        }
    }
}

fn default_mode() -> DeploymentMode {
    DeploymentMode::Moderated
}

fn default_cooldown_ms() -> i64 {
    DEFAULT_COOLDOWN_MS
}

fn default_send_timeout_ms() -> u64 {
    DEFAULT_SEND_TIMEOUT_MS
}

fn default_generator_timeout_ms() -> u64 {
    DEFAULT_GENERATOR_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

fn default_storage_path() -> String {
    DEFAULT_STORAGE_PATH.to_string()
}

/// Escalation settings.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | SOULSYNC_MODE | moderated | `direct` or `moderated` |
/// | SOULSYNC_COOLDOWN_MS | 3600000 | Minimum gap between two alerts for one user. |
/// | SOULSYNC_SEND_TIMEOUT_MS | 10000 | Bound on a single transport send. |
/// | SOULSYNC_GENERATOR_TIMEOUT_MS | 8000 | Bound on the optional empathetic framing call. |
/// | SOULSYNC_FRAMING_ENABLED | true | Ask the text generator for a framing sentence. |
/// | SOULSYNC_STORAGE_PATH | ./data/soulsync | Sled directory. |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default = "default_mode")]
    pub mode: DeploymentMode,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: i64,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_generator_timeout_ms")]
    pub generator_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub framing_enabled: bool,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            generator_timeout_ms: DEFAULT_GENERATOR_TIMEOUT_MS,
            framing_enabled: true,
            storage_path: default_storage_path(),
        }
    }
}

impl EscalationConfig {
    /// Load from environment. Unset or unparsable values fall back to defaults; an
    /// unrecognised `SOULSYNC_MODE` keeps the safer moderated mode.
    pub fn from_env() -> Self {
        let mode = match std::env::var("SOULSYNC_MODE") {
            Ok(v) => DeploymentMode::parse(&v).unwrap_or_else(|| {
                tracing::warn!(
                    target: "soulsync::config",
                    value = %v,
                    "Unknown SOULSYNC_MODE; staying in moderated mode"
                );
                DeploymentMode::Moderated
            }),
            Err(_) => default_mode(),
        };
        Self {
            mode,
            cooldown_ms: env_u64("SOULSYNC_COOLDOWN_MS", DEFAULT_COOLDOWN_MS as u64) as i64,
            send_timeout_ms: env_u64("SOULSYNC_SEND_TIMEOUT_MS", DEFAULT_SEND_TIMEOUT_MS).max(100),
            generator_timeout_ms: env_u64("SOULSYNC_GENERATOR_TIMEOUT_MS", DEFAULT_GENERATOR_TIMEOUT_MS)
                .max(100),
            framing_enabled: env_bool("SOULSYNC_FRAMING_ENABLED", true),
            storage_path: env_opt_string("SOULSYNC_STORAGE_PATH").unwrap_or_else(default_storage_path),
        }
    }

    /// Parse a TOML document (missing keys take defaults).
    pub fn from_toml_str(content: &str) -> EscalationResult<Self> {
        toml::from_str(content).map_err(|e| EscalationError::Config(e.to_string()))
    }

    /// Load a TOML file such as `config/escalation.toml`.
    pub fn load_from_path(path: &Path) -> EscalationResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EscalationError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn with_mode(mut self, mode: DeploymentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cooldown_ms(mut self, cooldown_ms: i64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }

    pub fn send_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.send_timeout_ms)
    }

    pub fn generator_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.generator_timeout_ms)
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) if v.trim().is_empty() => default,
        Ok(v) => v.trim().eq_ignore_ascii_case("true") || v.trim() == "1",
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_moderated_with_one_hour_cooldown() {
        let cfg = EscalationConfig::default();
        assert_eq!(cfg.mode, DeploymentMode::Moderated);
        assert_eq!(cfg.cooldown_ms, 3_600_000);
        assert!(cfg.framing_enabled);
    }

    #[test]
    fn toml_overrides_and_defaults() {
        let cfg = EscalationConfig::from_toml_str("mode = \"direct\"\ncooldown_ms = 60000\n").unwrap();
        assert_eq!(cfg.mode, DeploymentMode::Direct);
        assert_eq!(cfg.cooldown_ms, 60_000);
        assert_eq!(cfg.send_timeout_ms, 10_000);
        assert_eq!(cfg.storage_path, "./data/soulsync");
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = EscalationConfig::from_toml_str("mode = \"sideways\"").unwrap_err();
        assert!(matches!(err, EscalationError::Config(_)));
    }

    #[test]
    fn mode_parse_is_case_insensitive() {
        assert_eq!(DeploymentMode::parse(" Direct "), Some(DeploymentMode::Direct));
        assert_eq!(DeploymentMode::parse("MODERATED"), Some(DeploymentMode::Moderated));
        assert_eq!(DeploymentMode::parse("auto"), None);
    }
}
