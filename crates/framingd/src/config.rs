use framing_core::{BoundingBox, ReferenceComposition, TargetSize, ThrottleConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::engine::EngineSettings;
use crate::remote::ChatClientConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Agent configuration.
///
/// Built from defaults, then an optional TOML file, then `FRAMING_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory captured photos are written to.
    pub photo_dir: PathBuf,
    pub max_photos_per_session: u32,
    /// Consecutive ready frames required before an automatic capture.
    pub stable_frames: u32,
    pub prompt_interval_secs: u64,
    pub nudge_interval_secs: u64,
    pub keyword_capture_delay_ms: u64,
    pub countdown_step_ms: u64,
    pub target_size: TargetSize,
    /// Reference composition as `[cx, cy, width, height]`.
    pub reference: [f32; 4],
    pub frame_interval_ms: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Upper bound on concurrent background tasks (captures, remote requests).
    pub worker_pool_size: usize,
    pub api_base_url: String,
    /// Empty disables remote suggestions.
    pub api_key: String,
    pub model: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            photo_dir: PathBuf::from("captured_photos"),
            max_photos_per_session: 3,
            stable_frames: 3,
            prompt_interval_secs: 15,
            nudge_interval_secs: 4,
            keyword_capture_delay_ms: 1000,
            countdown_step_ms: 1000,
            target_size: TargetSize::HalfBody,
            reference: [0.5, 0.5, 0.4, 0.6],
            frame_interval_ms: 33,
            frame_width: 640,
            frame_height: 480,
            worker_pool_size: 4,
            api_base_url: "https://api.siliconflow.cn".to_string(),
            api_key: String::new(),
            model: "Qwen/QwQ-32B".to_string(),
            request_timeout_secs: 30,
            max_retries: 2,
        }
    }
}

impl Config {
    /// Load the TOML file (if any), then apply environment overrides.
    ///
    /// `path` falls back to `FRAMING_CONFIG` when not given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("FRAMING_CONFIG").ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Overlay `FRAMING_*` environment variables. Unparseable values keep
    /// the current setting.
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("FRAMING_PHOTO_DIR") {
            self.photo_dir = PathBuf::from(dir);
        }
        self.max_photos_per_session = env_u32("FRAMING_MAX_PHOTOS", self.max_photos_per_session);
        self.stable_frames = env_u32("FRAMING_STABLE_FRAMES", self.stable_frames);
        self.prompt_interval_secs =
            env_u64("FRAMING_PROMPT_INTERVAL_SECS", self.prompt_interval_secs);
        self.nudge_interval_secs = env_u64("FRAMING_NUDGE_INTERVAL_SECS", self.nudge_interval_secs);
        self.keyword_capture_delay_ms =
            env_u64("FRAMING_KEYWORD_DELAY_MS", self.keyword_capture_delay_ms);
        self.countdown_step_ms = env_u64("FRAMING_COUNTDOWN_STEP_MS", self.countdown_step_ms);
        if let Ok(value) = std::env::var("FRAMING_TARGET_SIZE") {
            match value.parse() {
                Ok(target) => self.target_size = target,
                Err(e) => tracing::warn!(error = %e, "ignoring FRAMING_TARGET_SIZE"),
            }
        }
        self.frame_interval_ms = env_u64("FRAMING_FRAME_INTERVAL_MS", self.frame_interval_ms);
        self.worker_pool_size = env_usize("FRAMING_WORKERS", self.worker_pool_size);
        if let Ok(url) = std::env::var("FRAMING_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Ok(key) = std::env::var("FRAMING_API_KEY") {
            self.api_key = key;
        }
        if let Ok(model) = std::env::var("FRAMING_MODEL") {
            self.model = model;
        }
        self.request_timeout_secs =
            env_u64("FRAMING_REQUEST_TIMEOUT_SECS", self.request_timeout_secs);
        self.max_retries = env_u32("FRAMING_MAX_RETRIES", self.max_retries);
    }

    /// Human-readable problems worth warning about. None of them are fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.max_photos_per_session == 0 {
            issues.push("max_photos_per_session is 0; no photo will ever be taken".to_string());
        }
        if self.stable_frames == 0 {
            issues.push("stable_frames is 0; treated as 1".to_string());
        }
        if self.prompt_interval_secs < 10 {
            issues.push(format!(
                "prompt_interval_secs is {}; remote suggestions may be too frequent",
                self.prompt_interval_secs
            ));
        }
        if self.worker_pool_size == 0 {
            issues.push("worker_pool_size is 0; treated as 1".to_string());
        }
        if !self.reference_bbox().is_normalized() {
            issues.push(format!("reference {:?} is outside the unit square", self.reference));
        }
        if self.api_key.is_empty() {
            issues.push("no API key configured; remote suggestions disabled".to_string());
        }
        issues
    }

    fn reference_bbox(&self) -> BoundingBox {
        let [cx, cy, width, height] = self.reference;
        BoundingBox::new(cx, cy, width, height)
    }

    pub fn throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig {
            stable_frames: self.stable_frames.max(1),
            max_photos_per_session: self.max_photos_per_session,
            prompt_interval: Duration::from_secs(self.prompt_interval_secs),
            nudge_interval: Duration::from_secs(self.nudge_interval_secs),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            throttle: self.throttle_config(),
            reference: ReferenceComposition(self.reference_bbox()),
            target_size: self.target_size,
            keyword_capture_delay: Duration::from_millis(self.keyword_capture_delay_ms),
            countdown_step: Duration::from_millis(self.countdown_step_ms),
            worker_pool_size: self.worker_pool_size.max(1),
        }
    }

    pub fn chat_client_config(&self) -> ChatClientConfig {
        ChatClientConfig {
            base_url: self.api_base_url.trim_end_matches('/').to_string(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_photos_per_session, 3);
        assert_eq!(config.target_size, TargetSize::HalfBody);
        assert_eq!(config.throttle_config(), ThrottleConfig::default());
    }

    #[test]
    fn test_toml_overlay_keeps_unset_defaults() {
        let config = Config::from_toml(
            r#"
            photo_dir = "/tmp/shots"
            max_photos_per_session = 5
            target_size = "portrait"
            reference = [0.5, 0.4, 0.3, 0.5]
            "#,
        )
        .unwrap();
        assert_eq!(config.photo_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(config.max_photos_per_session, 5);
        assert_eq!(config.target_size, TargetSize::Portrait);
        assert_eq!(config.stable_frames, 3);
        assert_eq!(config.engine_settings().reference.bbox().cy, 0.4);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_toml("photo_count = 2").is_err());
    }

    #[test]
    fn test_from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framing.toml");
        std::fs::write(&path, "stable_frames = \"three\"").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("framing.toml"));
    }

    #[test]
    fn test_validate_flags_problems() {
        let config = Config {
            max_photos_per_session: 0,
            prompt_interval_secs: 5,
            ..Config::default()
        };
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("max_photos_per_session")));
        assert!(issues.iter().any(|i| i.contains("prompt_interval_secs")));
        assert!(issues.iter().any(|i| i.contains("API key")));
    }

    #[test]
    fn test_validate_clean_config() {
        let config = Config {
            api_key: "sk-test".into(),
            ..Config::default()
        };
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_zero_pool_and_stability_are_clamped() {
        let config = Config {
            worker_pool_size: 0,
            stable_frames: 0,
            ..Config::default()
        };
        let settings = config.engine_settings();
        assert_eq!(settings.worker_pool_size, 1);
        assert_eq!(settings.throttle.stable_frames, 1);
    }

    #[test]
    fn test_chat_config_trims_trailing_slash() {
        let config = Config {
            api_base_url: "http://localhost:9000/".into(),
            ..Config::default()
        };
        assert_eq!(config.chat_client_config().base_url, "http://localhost:9000");
    }
}
