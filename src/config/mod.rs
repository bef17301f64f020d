use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::audio::pcm::{secs_to_duration, MAX_GENERATED};
use crate::error::ConfigError;
use crate::models::AudioQuizType;

/// Quiz engine configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    /// Upper bound for bringing the transcoder up
    pub init_timeout_secs: u64,
    /// Silence appended to the source-language clip
    pub question_tail_sec: f64,
    /// Silence appended to the target-language clip
    pub answer_tail_sec: f64,
    /// Think-time played during the Guess phase
    pub guess_silence_sec: f64,
    /// Pause before the next example's Question under autoplay
    pub settle_delay_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub autoplay: bool,
    /// Output gain for device playback, 0.0 to 1.0
    pub volume: f32,
    pub default_quiz_type: AudioQuizType,
    pub preferred_device: Option<String>,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            init_timeout_secs: 30,
            question_tail_sec: 0.5,
            answer_tail_sec: 0.5,
            guess_silence_sec: 3.0,
            settle_delay_ms: 1500,
            sample_rate: 44_100,
            channels: 1,
            autoplay: true,
            volume: 1.0,
            default_quiz_type: AudioQuizType::Speaking,
            preferred_device: None,
        }
    }
}

impl QuizConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn guess_silence(&self) -> Duration {
        secs_to_duration(self.guess_silence_sec).min(MAX_GENERATED)
    }

    /// Clamp values that would make the transcoder produce unplayable output
    pub fn sanitized(mut self) -> Self {
        let defaults = QuizConfig::default();
        if self.sample_rate < 8_000 || self.sample_rate > 192_000 {
            self.sample_rate = defaults.sample_rate;
        }
        if self.channels == 0 || self.channels > 2 {
            self.channels = defaults.channels;
        }
        let longest = MAX_GENERATED.as_secs_f64();
        if !self.question_tail_sec.is_finite() || self.question_tail_sec < 0.0 {
            self.question_tail_sec = defaults.question_tail_sec;
        }
        if !self.answer_tail_sec.is_finite() || self.answer_tail_sec < 0.0 {
            self.answer_tail_sec = defaults.answer_tail_sec;
        }
        if !self.guess_silence_sec.is_finite() || self.guess_silence_sec < 0.0 {
            self.guess_silence_sec = defaults.guess_silence_sec;
        }
        self.question_tail_sec = self.question_tail_sec.min(longest);
        self.answer_tail_sec = self.answer_tail_sec.min(longest);
        self.guess_silence_sec = self.guess_silence_sec.min(longest);
        if !self.volume.is_finite() {
            self.volume = defaults.volume;
        }
        self.volume = self.volume.clamp(0.0, 1.0);
        if self.init_timeout_secs == 0 {
            self.init_timeout_secs = defaults.init_timeout_secs;
        }
        self
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: QuizConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        let config = Self::load_config(&config_path)?;

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Manager backed by an explicit file, used by `--config`
    pub fn with_path(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config = Self::load_config(&config_path)?;
        Ok(Self {
            config,
            config_path,
        })
    }

    /// Default settings bound to `config_path`, for when the file on disk is unusable
    pub fn with_defaults(config_path: PathBuf) -> Self {
        Self {
            config: QuizConfig::default(),
            config_path,
        }
    }

    /// The path `new()` would load from, if the directory can be resolved
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Self::get_config_path()
    }

    pub fn get_config(&self) -> &QuizConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut QuizConfig),
    {
        updater(&mut self.config);
        self.config = self.config.clone().sanitized();
        self.save_config()
    }

    pub fn set_autoplay(&mut self, enabled: bool) -> Result<(), ConfigError> {
        self.config.autoplay = enabled;
        self.save_config()
    }

    pub fn set_default_quiz_type(&mut self, quiz_type: AudioQuizType) -> Result<(), ConfigError> {
        self.config.default_quiz_type = quiz_type;
        self.save_config()
    }

    pub fn set_preferred_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        self.config.preferred_device = device;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = QuizConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("audio-quiz");

        std::fs::create_dir_all(&config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<QuizConfig, ConfigError> {
        if !path.exists() {
            return Ok(QuizConfig::default());
        }

        let config_content = std::fs::read_to_string(path)?;
        let config: QuizConfig = toml::from_str(&config_content)?;

        Ok(config.sanitized())
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config_content = toml::to_string_pretty(&self.config)?;
        std::fs::write(&self.config_path, config_content)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config_manager = ConfigManager {
            config: QuizConfig::default(),
            config_path,
        };

        (config_manager, temp_dir)
    }

    #[test]
    fn test_quiz_config_default() {
        let config = QuizConfig::default();

        assert_eq!(config.init_timeout(), Duration::from_secs(30));
        assert_eq!(config.settle_delay(), Duration::from_millis(1500));
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.channels, 1);
        assert!(config.autoplay);
        assert_eq!(config.default_quiz_type, AudioQuizType::Speaking);
    }

    #[test]
    fn test_config_serialization() {
        let config = QuizConfig {
            question_tail_sec: 0.25,
            answer_tail_sec: 1.0,
            default_quiz_type: AudioQuizType::Listening,
            preferred_device: Some("USB DAC".to_string()),
            ..QuizConfig::default()
        };

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: QuizConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(config, deserialized);
        assert!(serialized.contains("default_quiz_type = \"listening\""));
    }

    #[test]
    fn test_partial_file_uses_defaults_for_missing_fields() {
        let config: QuizConfig = toml::from_str("answer_tail_sec = 0.8\n").unwrap();
        assert_eq!(config.answer_tail_sec, 0.8);
        assert_eq!(config.question_tail_sec, QuizConfig::default().question_tail_sec);
        assert_eq!(config.settle_delay_ms, 1500);
    }

    #[test]
    fn test_save_and_load_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.config.guess_silence_sec = 4.5;
        config_manager.config.autoplay = false;
        config_manager.save_config().unwrap();

        let loaded = ConfigManager::load_config(&config_manager.config_path).unwrap();
        assert_eq!(loaded.guess_silence_sec, 4.5);
        assert!(!loaded.autoplay);
    }

    #[test]
    fn test_load_nonexistent_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigManager::load_config(&temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, QuizConfig::default());
    }

    #[test]
    fn test_load_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        fs::write(&config_path, "invalid toml content [[[").unwrap();

        match ConfigManager::load_config(&config_path) {
            Err(ConfigError::DeserializationError(_)) => {}
            other => panic!("Expected DeserializationError, got {:?}", other),
        }
    }

    #[test]
    fn test_sanitized_clamps_bad_values() {
        let config = QuizConfig {
            sample_rate: 1,
            channels: 6,
            question_tail_sec: -1.0,
            answer_tail_sec: f64::NAN,
            init_timeout_secs: 0,
            volume: 3.0,
            ..QuizConfig::default()
        }
        .sanitized();
        assert_eq!(config.volume, 1.0);

        let defaults = QuizConfig::default();
        assert_eq!(config.sample_rate, defaults.sample_rate);
        assert_eq!(config.channels, defaults.channels);
        assert_eq!(config.question_tail_sec, defaults.question_tail_sec);
        assert_eq!(config.answer_tail_sec, defaults.answer_tail_sec);
        assert_eq!(config.init_timeout_secs, defaults.init_timeout_secs);
    }

    #[test]
    fn test_sanitized_caps_huge_durations() {
        let config = QuizConfig {
            guess_silence_sec: 1e30,
            answer_tail_sec: 1e30,
            ..QuizConfig::default()
        }
        .sanitized();
        assert_eq!(config.guess_silence_sec, MAX_GENERATED.as_secs_f64());
        assert_eq!(config.answer_tail_sec, MAX_GENERATED.as_secs_f64());
        assert_eq!(config.guess_silence(), MAX_GENERATED);

        let raw = QuizConfig { guess_silence_sec: 1e30, ..QuizConfig::default() };
        assert_eq!(raw.guess_silence(), MAX_GENERATED);
    }

    #[test]
    fn test_update_config_persists() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager
            .update_config(|config| {
                config.settle_delay_ms = 250;
                config.channels = 2;
            })
            .unwrap();

        let loaded = ConfigManager::load_config(&config_manager.config_path).unwrap();
        assert_eq!(loaded.settle_delay_ms, 250);
        assert_eq!(loaded.channels, 2);
    }

    #[test]
    fn test_reset_to_defaults() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.set_autoplay(false).unwrap();
        config_manager.set_default_quiz_type(AudioQuizType::Listening).unwrap();
        config_manager.reset_to_defaults().unwrap();

        assert_eq!(config_manager.get_config(), &QuizConfig::default());
    }

    #[test]
    fn test_with_path_creates_nested_directories_on_save() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("dir").join("config.toml");

        let mut manager = ConfigManager::with_path(nested.clone()).unwrap();
        manager.set_autoplay(false).unwrap();

        assert!(nested.exists());
        assert_eq!(manager.config_path(), nested.as_path());
    }
}
