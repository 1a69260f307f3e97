//! TOML configuration file loading
//!
//! Supports `~/.config/brochure/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BrochureConfigFile {
    /// Dialogue endpoint configuration
    #[serde(default)]
    pub endpoints: EndpointsFileConfig,

    /// Client flow configuration
    #[serde(default)]
    pub client: ClientFileConfig,

    /// Speech recognizer configuration
    #[serde(default)]
    pub recognizer: RecognizerFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Dialogue endpoints
#[derive(Debug, Default, Deserialize)]
pub struct EndpointsFileConfig {
    /// Process endpoint (speech flow)
    pub process_url: Option<String>,

    /// Chat endpoint (recording and avatar flows)
    pub chat_url: Option<String>,

    /// Request ceiling for flows that enforce one
    pub timeout_secs: Option<u64>,
}

/// Client flow selection
#[derive(Debug, Default, Deserialize)]
pub struct ClientFileConfig {
    /// Flow: "speech", "recording" or "avatar"
    pub variant: Option<String>,

    /// Platform override: "android" or "ios"
    pub platform: Option<String>,
}

/// Speech recognizer used by the transcript flows
#[derive(Debug, Default, Deserialize)]
pub struct RecognizerFileConfig {
    /// Provider: "whisper" or "deepgram"
    pub provider: Option<String>,

    /// Provider model identifier
    pub model: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `BrochureConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> BrochureConfigFile {
    config_file_path().map_or_else(BrochureConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path, falling back to defaults
pub fn load_from(path: &Path) -> BrochureConfigFile {
    if !path.exists() {
        return BrochureConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                BrochureConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            BrochureConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/brochure/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("brochure").join("config.toml"))
}
