//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`.
//! Every section is `#[serde(default)]`, so a partial `settings.toml` only
//! needs the keys it changes.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::conversation::{Context, Role};

// ---------------------------------------------------------------------------
// GatewayMode
// ---------------------------------------------------------------------------

/// Where suggestions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GatewayMode {
    /// The remote transcription/suggestion service over HTTP.
    #[default]
    Remote,
    /// In-process simulation; no network and no real transcription.
    Offline,
}

// ---------------------------------------------------------------------------
// GatewayConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub mode: GatewayMode,
    /// Base URL of the service; endpoints are `{base_url}/start` etc.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::default(),
            base_url: "http://localhost:8000".into(),
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Open the microphone at startup.
    pub enabled: bool,
    /// Takes shorter than this are rejected instead of uploaded.
    pub min_recording_secs: f32,
    /// Audio beyond this length is dropped.
    pub max_recording_secs: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_recording_secs: 0.3,
            max_recording_secs: 60.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Text-to-speech program invocation.  The sentence is appended as the last
/// argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "espeak-ng".into(),
            args: vec!["-v".into(), "ko".into()],
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Context preselected at startup.
    pub default_context: Context,
    /// Role preselected at startup; must belong to `default_context`.
    pub default_role: Option<Role>,
    /// How many history lines the front end shows by default.
    pub history_display_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_context: Context::Restaurant,
            default_role: Some(Role::Customer),
            history_display_limit: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// FallbackConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Suggestion override table; `None` means `<config dir>/suggestions.toml`.
    pub table_file: Option<PathBuf>,
}

impl FallbackConfig {
    pub fn resolved_table_file(&self) -> PathBuf {
        self.table_file
            .clone()
            .unwrap_or_else(|| AppPaths::new().suggestions_file)
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub capture: CaptureConfig,
    pub speech: SpeechConfig,
    pub session: SessionConfig,
    pub fallback: FallbackConfig,
}

impl AppConfig {
    /// Load from the platform `settings.toml`; defaults when it is missing.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to the platform `settings.toml`, creating parent directories.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The configured starting role, or the context's default when the
    /// configured one does not belong to the context.
    pub fn starting_role(&self) -> Role {
        let context = self.session.default_context;
        match self.session.default_role {
            Some(role) if context.allows_role(role) => role,
            _ => context.default_role(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.gateway.mode, GatewayMode::Remote);
        assert_eq!(cfg.gateway.base_url, "http://localhost:8000");
        assert_eq!(cfg.gateway.timeout_secs, 10);
        assert!(cfg.capture.enabled);
        assert_eq!(cfg.speech.command, "espeak-ng");
        assert_eq!(cfg.session.default_context, Context::Restaurant);
        assert_eq!(cfg.session.default_role, Some(Role::Customer));
        assert_eq!(cfg.session.history_display_limit, 20);
        assert!(cfg.fallback.table_file.is_none());
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let mut cfg = AppConfig::default();
        cfg.gateway.mode = GatewayMode::Offline;
        cfg.gateway.base_url = "http://223.130.156.155:8000".into();
        cfg.gateway.timeout_secs = 3;
        cfg.speech.args = vec![];
        cfg.session.default_context = Context::Hospital;
        cfg.session.default_role = Some(Role::Visitor);
        cfg.fallback.table_file = Some(dir.path().join("table.toml"));

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.gateway.mode, GatewayMode::Offline);
        assert_eq!(loaded.gateway.base_url, "http://223.130.156.155:8000");
        assert_eq!(loaded.gateway.timeout_secs, 3);
        assert!(loaded.speech.args.is_empty());
        assert_eq!(loaded.session.default_context, Context::Hospital);
        assert_eq!(loaded.session.default_role, Some(Role::Visitor));
        assert_eq!(loaded.fallback.table_file, cfg.fallback.table_file);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let config = AppConfig::load_from(&dir.path().join("nope.toml")).expect("no error");
        assert_eq!(config.gateway.base_url, GatewayConfig::default().base_url);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[gateway]\nbase_url = \"http://example.test\"\n").unwrap();

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.gateway.base_url, "http://example.test");
        assert_eq!(cfg.gateway.timeout_secs, 10);
        assert_eq!(cfg.session.default_context, Context::Restaurant);
    }

    #[test]
    fn starting_role_falls_back_to_context_default() {
        let mut cfg = AppConfig::default();
        cfg.session.default_context = Context::Classroom;
        cfg.session.default_role = Some(Role::Patient);
        assert_eq!(cfg.starting_role(), Role::Student);

        cfg.session.default_role = None;
        assert_eq!(cfg.starting_role(), Role::Student);
    }
}
