//! Cross-platform application paths using the `dirs` crate.
//!
//! Config dir (settings + suggestion overrides):
//!   Windows: %APPDATA%\aacommu\
//!   macOS:   ~/Library/Application Support/aacommu/
//!   Linux:   ~/.config/aacommu/

use std::path::PathBuf;

/// Resolved application file locations.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory holding `settings.toml` and `suggestions.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Full path to the user's fallback suggestion overrides.
    pub suggestions_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "aacommu";

    /// Falls back to the current directory if the platform has no config dir.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            suggestions_file: config_dir.join("suggestions.toml"),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
