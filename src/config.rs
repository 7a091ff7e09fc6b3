use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::arbiter::ArbiterConfig;
use crate::error::ConfigError;
use crate::motion::MotionConfig;
use crate::session::SessionSettings;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub arbiter: ArbiterConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Concurrent nng contexts serving requests.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Send predictions as `{type, word, confidence}`.
    #[serde(default)]
    pub legacy_prediction_shape: bool,
}

fn default_listen() -> String {
    "tcp://127.0.0.1:54321".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_idle_timeout_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: default_listen(),
            workers: default_workers(),
            idle_timeout_secs: default_idle_timeout_secs(),
            legacy_prediction_shape: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default = "default_min_quick_frames")]
    pub min_quick_frames: usize,
    #[serde(default = "default_min_dynamic_frames")]
    pub min_dynamic_frames: usize,
    #[serde(default = "default_static_motion_threshold")]
    pub static_motion_threshold: f32,
    #[serde(default = "default_min_match_ratio")]
    pub min_match_ratio: f32,
}

fn default_buffer_size() -> usize {
    30
}

fn default_history_size() -> usize {
    20
}

fn default_min_quick_frames() -> usize {
    5
}

fn default_min_dynamic_frames() -> usize {
    10
}

fn default_static_motion_threshold() -> f32 {
    0.15
}

fn default_min_match_ratio() -> f32 {
    0.5
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        RecognitionConfig {
            buffer_size: default_buffer_size(),
            history_size: default_history_size(),
            min_quick_frames: default_min_quick_frames(),
            min_dynamic_frames: default_min_dynamic_frames(),
            static_motion_threshold: default_static_motion_threshold(),
            min_match_ratio: default_min_match_ratio(),
        }
    }
}

impl RecognitionConfig {
    pub fn motion(&self) -> MotionConfig {
        MotionConfig {
            min_quick_frames: self.min_quick_frames,
            min_frames: self.min_dynamic_frames,
            static_threshold: self.static_motion_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// ONNX artifact. Without it the sequence model stays unloaded.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Metadata sidecar with class names.
    #[serde(default)]
    pub metadata: Option<PathBuf>,
    #[serde(default = "default_sequence_length")]
    pub sequence_length: usize,
}

fn default_sequence_length() -> usize {
    30
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            path: None,
            metadata: None,
            sequence_length: default_sequence_length(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON catalog. Without it the bundled table is used.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn from_toml_str(toml: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(toml)?)
    }

    pub fn from_path(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_toml_str(&text)
    }

    /// Defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Config::from_path(path),
            None => Ok(Config::default()),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            buffer_size: self.recognition.buffer_size,
            history_size: self.recognition.history_size,
            arbiter: self.arbiter.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.listen, "tcp://127.0.0.1:54321");
        assert_eq!(config.arbiter.rejection_threshold, 0.4);
        assert_eq!(config.recognition.motion(), MotionConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml_str(
            r#"
            [server]
            listen = "tcp://0.0.0.0:6000"
            legacy_prediction_shape = true

            [arbiter]
            cooldown_secs = 0.5

            [model]
            path = "models/signs.onnx"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen, "tcp://0.0.0.0:6000");
        assert!(config.server.legacy_prediction_shape);
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.arbiter.cooldown_secs, 0.5);
        assert_eq!(config.arbiter.rejection_threshold, 0.4);
        assert_eq!(config.model.path, Some(PathBuf::from("models/signs.onnx")));
        assert_eq!(config.model.sequence_length, 30);
        assert_eq!(config.catalog.path, None);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_path(Path::new("/nonexistent/silentvoice.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(Config::load(None).is_ok());
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            Config::from_toml_str("[server]\nworkers = \"many\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
