//! Configuration management for the brochure voice client
//!
//! Values resolve env > TOML file > defaults.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::recognizer::SttProvider;
use crate::session::Platform;
use crate::variant::{REQUEST_TIMEOUT, Variant, VariantProfile};
use crate::{Error, Result};

use file::BrochureConfigFile;

/// Default process endpoint (speech flow)
pub const DEFAULT_PROCESS_URL: &str = "https://cruncha.querease.ai/api/interactivedemos/process";

/// Default chat endpoint (recording and avatar flows)
pub const DEFAULT_CHAT_URL: &str = "https://tata-sampann-hi.thefirstimpression.ai/api/chat";

/// Brochure client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Dialogue endpoints
    pub endpoints: EndpointsConfig,

    /// Explicit flow; `None` derives it from the platform
    pub variant: Option<Variant>,

    /// Client platform
    pub platform: Platform,

    /// Speech recognizer for the transcript flows
    pub recognizer: RecognizerConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Path to data directory (session markers)
    pub data_dir: PathBuf,
}

/// Dialogue endpoint configuration
#[derive(Debug, Clone)]
pub struct EndpointsConfig {
    pub process_url: String,
    pub chat_url: String,
    /// Ceiling for flows that bound their requests
    pub timeout: Duration,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            process_url: DEFAULT_PROCESS_URL.to_string(),
            chat_url: DEFAULT_CHAT_URL.to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }
}

/// Speech recognizer configuration
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    pub provider: SttProvider,
    pub model: String,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper)
    pub openai: Option<String>,

    /// `Deepgram` API key
    pub deepgram: Option<String>,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        let data_dir = directories::BaseDirs::new()
            .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("brochure"));

        Self::from_sources(fc, |key| std::env::var(key).ok(), data_dir)
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn from_sources(
        fc: BrochureConfigFile,
        env: impl Fn(&str) -> Option<String>,
        data_dir: PathBuf,
    ) -> Result<Self> {
        let timeout_secs = match env("BROCHURE_TIMEOUT_SECS") {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                Error::Config(format!("BROCHURE_TIMEOUT_SECS is not a number: {raw}"))
            })?),
            None => fc.endpoints.timeout_secs,
        };

        let endpoints = EndpointsConfig {
            process_url: env("BROCHURE_PROCESS_URL")
                .or(fc.endpoints.process_url)
                .unwrap_or_else(|| DEFAULT_PROCESS_URL.to_string()),
            chat_url: env("BROCHURE_CHAT_URL")
                .or(fc.endpoints.chat_url)
                .unwrap_or_else(|| DEFAULT_CHAT_URL.to_string()),
            timeout: timeout_secs.map_or(REQUEST_TIMEOUT, Duration::from_secs),
        };

        let variant = env("BROCHURE_VARIANT")
            .or(fc.client.variant)
            .map(|v| v.parse::<Variant>())
            .transpose()?;

        let platform = env("BROCHURE_PLATFORM")
            .or(fc.client.platform)
            .map(|p| p.parse::<Platform>())
            .transpose()?
            .unwrap_or_else(Platform::detect);

        let provider = env("BROCHURE_STT_PROVIDER")
            .or(fc.recognizer.provider)
            .map(|p| p.parse::<SttProvider>())
            .transpose()?
            .unwrap_or_default();
        let recognizer = RecognizerConfig {
            provider,
            model: env("BROCHURE_STT_MODEL")
                .or(fc.recognizer.model)
                .unwrap_or_else(|| provider.default_model().to_string()),
        };

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
        };

        Ok(Self {
            endpoints,
            variant,
            platform,
            recognizer,
            api_keys,
            data_dir,
        })
    }

    /// Flow to run: explicit setting, else the platform's default
    #[must_use]
    pub fn variant(&self) -> Variant {
        self.variant
            .unwrap_or_else(|| Variant::for_platform(self.platform))
    }

    /// Profile for a flow with configured overrides applied
    #[must_use]
    pub const fn profile(&self, variant: Variant) -> VariantProfile {
        VariantProfile::for_variant(variant).with_timeout(self.endpoints.timeout)
    }

    /// API key for the configured recognizer, if one is set
    #[must_use]
    pub fn recognizer_key(&self) -> Option<&str> {
        match self.recognizer.provider {
            SttProvider::Whisper => self.api_keys.openai.as_deref(),
            SttProvider::Deepgram => self.api_keys.deepgram.as_deref(),
        }
        .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use file::{ClientFileConfig, EndpointsFileConfig};

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_configured() {
        let config =
            Config::from_sources(BrochureConfigFile::default(), env_from(&[]), PathBuf::new())
                .unwrap();

        assert_eq!(config.endpoints.process_url, DEFAULT_PROCESS_URL);
        assert_eq!(config.endpoints.chat_url, DEFAULT_CHAT_URL);
        assert_eq!(config.endpoints.timeout, REQUEST_TIMEOUT);
        assert_eq!(config.recognizer.provider, SttProvider::Whisper);
        assert_eq!(config.recognizer.model, "whisper-1");
        assert!(config.recognizer_key().is_none());
    }

    #[test]
    fn env_overrides_file() {
        let fc = BrochureConfigFile {
            endpoints: EndpointsFileConfig {
                chat_url: Some("http://file/chat".to_string()),
                timeout_secs: Some(12),
                ..Default::default()
            },
            client: ClientFileConfig {
                variant: Some("speech".to_string()),
                platform: None,
            },
            ..Default::default()
        };
        let env = env_from(&[
            ("BROCHURE_CHAT_URL", "http://env/chat"),
            ("BROCHURE_VARIANT", "avatar"),
        ]);

        let config = Config::from_sources(fc, env, PathBuf::new()).unwrap();
        assert_eq!(config.endpoints.chat_url, "http://env/chat");
        assert_eq!(config.endpoints.timeout, Duration::from_secs(12));
        assert_eq!(config.variant(), Variant::Avatar);
    }

    #[test]
    fn platform_drives_default_variant() {
        let env = env_from(&[("BROCHURE_PLATFORM", "ios")]);
        let config =
            Config::from_sources(BrochureConfigFile::default(), env, PathBuf::new()).unwrap();
        assert_eq!(config.variant(), Variant::Recording);
        assert_eq!(config.profile(Variant::Recording).timeout, Some(REQUEST_TIMEOUT));
    }

    #[test]
    fn deepgram_uses_its_own_key_and_model() {
        let env = env_from(&[
            ("BROCHURE_STT_PROVIDER", "deepgram"),
            ("OPENAI_API_KEY", "sk-test"),
            ("DEEPGRAM_API_KEY", "dg-test"),
        ]);
        let config =
            Config::from_sources(BrochureConfigFile::default(), env, PathBuf::new()).unwrap();
        assert_eq!(config.recognizer.model, "nova-2");
        assert_eq!(config.recognizer_key(), Some("dg-test"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let env = env_from(&[("BROCHURE_TIMEOUT_SECS", "soon")]);
        assert!(Config::from_sources(BrochureConfigFile::default(), env, PathBuf::new()).is_err());

        let env = env_from(&[("BROCHURE_VARIANT", "hologram")]);
        assert!(Config::from_sources(BrochureConfigFile::default(), env, PathBuf::new()).is_err());
    }
}
