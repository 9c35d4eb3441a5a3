//! Configuration types for the assistant pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Streaming transcription settings.
    pub stt: SttConfig,
    /// Classification / answer generation settings.
    pub model: ModelConfig,
    /// Remote screenshot watcher settings.
    pub watcher: WatcherConfig,
}

/// Streaming transcription configuration.
///
/// Session parameters are passed through to the realtime endpoint unchanged;
/// the segmenter only depends on `debounce_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// API key for the realtime transcription service.
    ///
    /// Empty means the transcription session is unavailable and session
    /// commands report a configuration error instead of connecting.
    pub api_key: String,
    /// Realtime endpoint host.
    pub api_host: String,
    /// Input sample rate in Hz.
    pub sample_rate: u32,
    /// Ask the service to punctuate/format finalized turns.
    pub format_turns: bool,
    /// End-of-turn silence (ms) when the service is confident.
    pub min_end_of_turn_silence_when_confident: u32,
    /// Hard silence limit (ms) that forces an end of turn.
    pub max_turn_silence: u32,
    /// Confidence threshold for explicit end-of-turn marking.
    pub end_of_turn_confidence_threshold: f64,
    /// Quiet period (seconds) before an unfinalized turn is dispatched anyway.
    pub debounce_secs: f64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_host: "streaming.assemblyai.com".to_owned(),
            sample_rate: 16_000,
            format_turns: true,
            min_end_of_turn_silence_when_confident: 2000,
            max_turn_silence: 5000,
            end_of_turn_confidence_threshold: 0.8,
            debounce_secs: 3.0,
        }
    }
}

/// Generative model configuration (classification, answers, vision).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// API key for the generative model service.
    ///
    /// Empty means the dispatcher is unavailable; utterances are still
    /// produced but nothing is dispatched.
    pub api_key: String,
    /// Base URL of the generateContent endpoint.
    pub api_url: String,
    /// Model name used for both classification and answers.
    pub model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://generativelanguage.googleapis.com".to_owned(),
            model: "gemini-flash-lite-latest".to_owned(),
        }
    }
}

/// Remote screenshot watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Bucket to poll. Empty disables the watcher.
    pub bucket: String,
    /// Optional bearer token for the object store. Empty means anonymous.
    pub token: String,
    /// Seconds between poll cycles (5–10 s is the intended range).
    pub poll_interval_secs: u64,
    /// Local directory downloaded images land in.
    pub download_dir: PathBuf,
    /// Object name extension that marks an image (lowercase, no dot).
    pub image_extension: String,
    /// Path of the persisted seen-set snapshot.
    pub state_path: PathBuf,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            token: String::new(),
            poll_interval_secs: 10,
            download_dir: PathBuf::from("downloaded_images"),
            image_extension: "png".to_owned(),
            state_path: PathBuf::from("image_metadata.json"),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::PrompterError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be
    /// serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::PrompterError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/prompter/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("prompter").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("prompter")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/prompter-config/config.toml")
        }
    }

    /// Overlay secrets and identifiers from the environment.
    ///
    /// `PROMPTER_STT_API_KEY`, `PROMPTER_MODEL_API_KEY`, `PROMPTER_BUCKET`
    /// and `PROMPTER_BUCKET_TOKEN` override the corresponding config fields
    /// when set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("PROMPTER_STT_API_KEY")
            && !key.trim().is_empty()
        {
            self.stt.api_key = key;
        }
        if let Ok(key) = std::env::var("PROMPTER_MODEL_API_KEY")
            && !key.trim().is_empty()
        {
            self.model.api_key = key;
        }
        if let Ok(bucket) = std::env::var("PROMPTER_BUCKET")
            && !bucket.trim().is_empty()
        {
            self.watcher.bucket = bucket;
        }
        if let Ok(token) = std::env::var("PROMPTER_BUCKET_TOKEN")
            && !token.trim().is_empty()
        {
            self.watcher.token = token;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.stt.sample_rate > 0);
        assert!(config.stt.debounce_secs > 0.0);
        assert!(config.stt.end_of_turn_confidence_threshold > 0.0);
        assert!(!config.model.model.is_empty());
        assert!(config.watcher.poll_interval_secs > 0);
        assert_eq!(config.watcher.image_extension, "png");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.stt.sample_rate = 44_100;
        config.watcher.bucket = "shots".to_owned();
        config.watcher.poll_interval_secs = 5;

        config.save_to_file(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.stt.sample_rate, 44_100);
        assert_eq!(loaded.watcher.bucket, "shots");
        assert_eq!(loaded.watcher.poll_interval_secs, 5);
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = AppConfig::from_file(std::path::Path::new("/nonexistent/prompter.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(AppConfig::from_file(&path).is_err());
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = AppConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("prompter"));
    }

    #[test]
    fn config_serializes_to_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("sample_rate"));
        assert!(toml_str.contains("poll_interval_secs"));
    }
}
