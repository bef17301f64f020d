use crate::error::{QuizError, TranscodeError, MappingError, SequencerError, PlaybackError, ConfigError, FailureReason};
use crate::logging::QuizLogger;
use log::{info, warn};
use std::collections::HashMap;

/// Decides how the quiz-setup layer reacts to failures
pub struct SetupRecoveryManager {
    logger: QuizLogger,
    recovery_attempts: HashMap<String, u32>,
    max_recovery_attempts: u32,
}

impl SetupRecoveryManager {
    pub fn new(logger: QuizLogger) -> Self {
        Self {
            logger,
            recovery_attempts: HashMap::new(),
            max_recovery_attempts: 3,
        }
    }

    pub fn with_max_attempts(logger: QuizLogger, max_recovery_attempts: u32) -> Self {
        Self {
            max_recovery_attempts,
            ..Self::new(logger)
        }
    }

    /// Pick the setup layer's reaction to an error
    pub fn decide(&mut self, error: &QuizError) -> SetupDecision {
        let error_key = self.get_error_key(error);
        let attempts = self.recovery_attempts.get(&error_key).copied().unwrap_or(0) + 1;

        if attempts > self.max_recovery_attempts {
            warn!("Maximum recovery attempts ({}) exceeded for error: {}",
                self.max_recovery_attempts, error);
            return SetupDecision::Abort("Maximum recovery attempts exceeded".to_string());
        }

        self.recovery_attempts.insert(error_key, attempts);

        let decision = match error {
            QuizError::Transcode(err) => self.decide_transcode(err),
            QuizError::Mapping(err) => self.decide_mapping(err),
            QuizError::Sequencer(err) => self.decide_sequencer(err),
            QuizError::Playback(err) => self.decide_playback(err),
            QuizError::Config(err) => self.decide_config(err),
            QuizError::File(_) => SetupDecision::Abort("File errors require manual intervention".to_string()),
            QuizError::Examples(_) => SetupDecision::Abort("The examples file must be fixed first".to_string()),
            QuizError::Parse(_) => SetupDecision::Abort("Parse errors require correct input".to_string()),
        };

        match &decision {
            SetupDecision::SkipExample(msg) => info!("Setup continues: {}", msg),
            SetupDecision::RetryInit(msg) => info!("Setup retries: {} (attempt {})", msg, attempts),
            SetupDecision::Abort(msg) => warn!("Setup aborted: {}", msg),
        }

        decision
    }

    fn decide_transcode(&mut self, error: &TranscodeError) -> SetupDecision {
        match error {
            TranscodeError::InitTimeout { timeout } => SetupDecision::RetryInit(format!(
                "Transcoder was not ready after {:.0}s",
                timeout.as_secs_f64()
            )),
            TranscodeError::InitFailed(msg) => {
                self.logger.log_engine_failed(msg);
                SetupDecision::RetryInit("Transcoder failed to start".to_string())
            }
            TranscodeError::OperationFailed { reason: FailureReason::NotReady, .. } => {
                SetupDecision::RetryInit("Transcoder is not ready yet".to_string())
            }
            TranscodeError::OperationFailed { reason: FailureReason::Worker(msg), .. } => {
                SetupDecision::RetryInit(format!("Transcoding worker failed: {}", msg))
            }
            TranscodeError::OperationFailed { operation, .. } => {
                SetupDecision::SkipExample(format!("{} failed for one clip", operation))
            }
        }
    }

    fn decide_mapping(&mut self, error: &MappingError) -> SetupDecision {
        match error {
            MappingError::MappingFailed { example_id, source } => {
                self.logger.log_mapping_failed(*example_id, &source.to_string());
                self.logger.log_example_skipped(*example_id);
                match source {
                    // A lost worker is retired by the engine and reloaded by the next init()
                    TranscodeError::OperationFailed { reason: FailureReason::Worker(msg), .. } => {
                        SetupDecision::SkipExample(format!(
                            "Example #{} left out of the quiz, transcoding worker failed: {}",
                            example_id, msg
                        ))
                    }
                    _ => SetupDecision::SkipExample(format!(
                        "Example #{} left out of the quiz",
                        example_id
                    )),
                }
            }
        }
    }

    fn decide_sequencer(&mut self, error: &SequencerError) -> SetupDecision {
        match error {
            SequencerError::EmptyQuiz => {
                SetupDecision::Abort("No playable examples remain".to_string())
            }
            SequencerError::InvalidTransition { from, action } => SetupDecision::Abort(format!(
                "Quiz cannot {} while {}",
                action, from
            )),
        }
    }

    fn decide_playback(&mut self, error: &PlaybackError) -> SetupDecision {
        match error {
            PlaybackError::Device(msg) => {
                SetupDecision::Abort(format!("No audio output: {}", msg))
            }
            PlaybackError::Stream(_) | PlaybackError::MissingMedia { .. } => {
                SetupDecision::SkipExample("Clip could not be played".to_string())
            }
        }
    }

    fn decide_config(&mut self, error: &ConfigError) -> SetupDecision {
        match error {
            ConfigError::ConfigDirNotFound
            | ConfigError::IoError(_)
            | ConfigError::DeserializationError(_) => {
                SetupDecision::SkipExample("Using default configuration settings".to_string())
            }
            ConfigError::SerializationError(_) => {
                SetupDecision::SkipExample("Cannot save configuration. Current settings will be used".to_string())
            }
        }
    }

    /// Generate a unique key for tracking recovery attempts
    fn get_error_key(&self, error: &QuizError) -> String {
        match error {
            QuizError::Transcode(TranscodeError::InitTimeout { .. }) => "transcode_init_timeout".to_string(),
            QuizError::Transcode(TranscodeError::InitFailed(_)) => "transcode_init_failed".to_string(),
            QuizError::Transcode(TranscodeError::OperationFailed { operation, reason }) => {
                format!("transcode_{}_{}", operation, reason_key(reason))
            }
            // Each example gets its own budget so skipping many examples never aborts
            QuizError::Mapping(err) => format!("mapping_{}", err.example_id()),
            QuizError::Sequencer(SequencerError::EmptyQuiz) => "sequencer_empty".to_string(),
            QuizError::Sequencer(SequencerError::InvalidTransition { from, action }) => {
                format!("sequencer_{}_{}", action, from)
            }
            QuizError::Playback(PlaybackError::Device(_)) => "playback_device".to_string(),
            QuizError::Playback(PlaybackError::Stream(_)) => "playback_stream".to_string(),
            QuizError::Playback(PlaybackError::MissingMedia { url }) => format!("playback_missing_{}", url),
            QuizError::Config(config_err) => {
                format!("config_{:?}", std::mem::discriminant(config_err))
            }
            QuizError::File(_) => "file_error".to_string(),
            QuizError::Examples(_) => "examples_error".to_string(),
            QuizError::Parse(_) => "parse_error".to_string(),
        }
    }

    pub fn reset_recovery_attempts(&mut self, error: &QuizError) {
        let error_key = self.get_error_key(error);
        self.recovery_attempts.remove(&error_key);
    }

    pub fn clear_recovery_attempts(&mut self) {
        self.recovery_attempts.clear();
    }

    pub fn get_recovery_statistics(&self) -> RecoveryStatistics {
        RecoveryStatistics {
            total_errors_tracked: self.recovery_attempts.len(),
            errors_with_multiple_attempts: self.recovery_attempts.values()
                .filter(|&&attempts| attempts > 1)
                .count(),
            max_attempts_for_any_error: self.recovery_attempts.values()
                .max()
                .copied()
                .unwrap_or(0),
        }
    }
}

fn reason_key(reason: &FailureReason) -> &'static str {
    match reason {
        FailureReason::NotReady => "not_ready",
        FailureReason::Fetch(_) => "fetch",
        FailureReason::Decode(_) => "decode",
        FailureReason::Encode(_) => "encode",
        FailureReason::Worker(_) => "worker",
    }
}

/// What the setup layer does after a failure
#[derive(Debug, Clone, PartialEq)]
pub enum SetupDecision {
    /// Leave the failing example out and continue with the rest
    SkipExample(String),
    /// Call `init()` again
    RetryInit(String),
    /// Stop preparing the quiz
    Abort(String),
}

impl SetupDecision {
    pub fn is_skip(&self) -> bool {
        matches!(self, SetupDecision::SkipExample(_))
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, SetupDecision::RetryInit(_))
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, SetupDecision::Abort(_))
    }

    pub fn message(&self) -> &str {
        match self {
            SetupDecision::SkipExample(msg) |
            SetupDecision::RetryInit(msg) |
            SetupDecision::Abort(msg) => msg,
        }
    }
}

/// Statistics about error recovery operations
#[derive(Debug, Clone)]
pub struct RecoveryStatistics {
    pub total_errors_tracked: usize,
    pub errors_with_multiple_attempts: usize,
    pub max_attempts_for_any_error: u32,
}
