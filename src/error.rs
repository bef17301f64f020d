use std::time::Duration;
use thiserror::Error;

/// Main quiz engine error type
#[derive(Debug, Error)]
pub enum QuizError {
    #[error("Transcoding error: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Sequencer error: {0}")]
    Sequencer(#[from] SequencerError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Examples file error: {0}")]
    Examples(#[from] serde_json::Error),

    #[error("CLI parse error: {0}")]
    Parse(#[from] crate::cli::ParseError),
}

impl QuizError {
    /// Get user-friendly error message with suggested solutions
    pub fn user_message(&self) -> String {
        match self {
            QuizError::Transcode(err) => err.user_message(),
            QuizError::Mapping(err) => err.user_message(),
            QuizError::Sequencer(err) => err.user_message(),
            QuizError::Playback(err) => err.user_message(),
            QuizError::Config(err) => err.user_message(),
            QuizError::File(err) => format!("File system error: {}", err),
            QuizError::Examples(err) => format!("Examples file is not valid JSON: {}", err),
            QuizError::Parse(err) => format!("Command error: {}", err),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            QuizError::Transcode(err) => err.recovery_suggestions(),
            QuizError::Mapping(err) => err.recovery_suggestions(),
            QuizError::Sequencer(err) => err.recovery_suggestions(),
            QuizError::Playback(err) => err.recovery_suggestions(),
            QuizError::Config(err) => err.recovery_suggestions(),
            QuizError::File(_) => vec![
                "Check that the path is correct".to_string(),
                "Check file permissions".to_string(),
            ],
            QuizError::Examples(_) => vec![
                "The file must contain a JSON array of examples".to_string(),
                "Each example needs id, spanish, english, spanishAudio and englishAudio".to_string(),
            ],
            QuizError::Parse(_) => vec!["Type 'help' to see available commands".to_string()],
        }
    }

    /// Check if this error allows for automatic recovery
    pub fn is_recoverable(&self) -> bool {
        match self {
            QuizError::Transcode(err) => err.is_recoverable(),
            QuizError::Mapping(err) => err.is_recoverable(),
            QuizError::Sequencer(err) => err.is_recoverable(),
            QuizError::Playback(err) => err.is_recoverable(),
            QuizError::Config(err) => err.is_recoverable(),
            QuizError::File(_) => false,
            QuizError::Examples(_) => false,
            QuizError::Parse(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            QuizError::Transcode(TranscodeError::InitTimeout { .. }) => ErrorSeverity::Error,
            QuizError::Transcode(TranscodeError::InitFailed(_)) => ErrorSeverity::Critical,
            QuizError::Transcode(_) => ErrorSeverity::Error,
            QuizError::Mapping(_) => ErrorSeverity::Warning,
            QuizError::Sequencer(SequencerError::EmptyQuiz) => ErrorSeverity::Error,
            QuizError::Sequencer(_) => ErrorSeverity::Info,
            QuizError::Playback(PlaybackError::Device(_)) => ErrorSeverity::Critical,
            QuizError::Playback(_) => ErrorSeverity::Error,
            QuizError::Config(_) => ErrorSeverity::Warning,
            QuizError::File(_) => ErrorSeverity::Error,
            QuizError::Examples(_) => ErrorSeverity::Error,
            QuizError::Parse(_) => ErrorSeverity::Info,
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Why a single transcoding call failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureReason {
    #[error("engine is not ready")]
    NotReady,

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("worker unavailable: {0}")]
    Worker(String),
}

/// Transcoding engine errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranscodeError {
    #[error("Transcoder did not become ready within {:.1}s", .timeout.as_secs_f64())]
    InitTimeout { timeout: Duration },

    #[error("Transcoder initialization failed: {0}")]
    InitFailed(String),

    #[error("{operation} failed: {reason}")]
    OperationFailed {
        operation: String,
        reason: FailureReason,
    },
}

impl TranscodeError {
    pub fn operation(operation: &str, reason: FailureReason) -> Self {
        TranscodeError::OperationFailed {
            operation: operation.to_string(),
            reason,
        }
    }

    pub fn not_ready(operation: &str) -> Self {
        Self::operation(operation, FailureReason::NotReady)
    }

    pub fn user_message(&self) -> String {
        match self {
            TranscodeError::InitTimeout { timeout } => {
                format!("The audio engine took longer than {:.0}s to start", timeout.as_secs_f64())
            }
            TranscodeError::InitFailed(msg) => {
                format!("The audio engine could not be started: {}", msg)
            }
            TranscodeError::OperationFailed { operation, reason } => match reason {
                FailureReason::NotReady => {
                    format!("Cannot run {} before the audio engine is ready", operation)
                }
                FailureReason::Fetch(msg) => format!("Could not download audio: {}", msg),
                FailureReason::Decode(msg) => format!("Audio file could not be decoded: {}", msg),
                FailureReason::Encode(msg) => format!("Could not produce playable audio: {}", msg),
                FailureReason::Worker(msg) => format!("The audio worker failed: {}", msg),
            },
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            TranscodeError::InitTimeout { .. } => vec![
                "Check your network connection and try again".to_string(),
                "Increase init_timeout_secs in the configuration".to_string(),
            ],
            TranscodeError::InitFailed(_) => vec![
                "Restart the application".to_string(),
                "Run with AUDIO_QUIZ_LOG_LEVEL=debug for details".to_string(),
            ],
            TranscodeError::OperationFailed { reason, .. } => match reason {
                FailureReason::NotReady => vec!["Initialize the engine before transcoding".to_string()],
                FailureReason::Fetch(_) => vec![
                    "Check that the audio URL or path is reachable".to_string(),
                    "Try again later if the audio host is down".to_string(),
                ],
                FailureReason::Decode(_) => vec![
                    "Check that the source is a valid compressed audio file".to_string(),
                    "Re-record or re-upload the example audio".to_string(),
                ],
                FailureReason::Encode(_) => vec!["Restart the quiz session".to_string()],
                FailureReason::Worker(_) => vec![
                    "Run the quiz again to restart the audio engine".to_string(),
                    "Run with AUDIO_QUIZ_LOG_LEVEL=debug for details".to_string(),
                ],
            },
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            TranscodeError::InitTimeout { .. } => true, // A later init() may succeed
            TranscodeError::InitFailed(_) => true,
            // A lost worker is replaced by the next init()
            TranscodeError::OperationFailed { .. } => true,
        }
    }
}

/// Example mapping errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("Example {example_id} could not be mapped: {source}")]
    MappingFailed {
        example_id: i64,
        #[source]
        source: TranscodeError,
    },
}

impl MappingError {
    pub fn example_id(&self) -> i64 {
        match self {
            MappingError::MappingFailed { example_id, .. } => *example_id,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            MappingError::MappingFailed { example_id, source } => {
                format!("Example #{} was left out of the quiz: {}", example_id, source.user_message())
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            MappingError::MappingFailed { source, .. } => {
                let mut suggestions = vec!["The quiz continues without this example".to_string()];
                suggestions.extend(source.recovery_suggestions());
                suggestions
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true // The setup layer skips the example
    }
}

/// Playback sequencer errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequencerError {
    #[error("Quiz has no examples")]
    EmptyQuiz,

    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: String, action: String },
}

impl SequencerError {
    pub fn user_message(&self) -> String {
        match self {
            SequencerError::EmptyQuiz => "There are no playable examples in this quiz".to_string(),
            SequencerError::InvalidTransition { from, action } => {
                format!("'{}' is not possible right now ({})", action, from)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            SequencerError::EmptyQuiz => vec![
                "Check that the examples file is not empty".to_string(),
                "Check the audio URLs of the examples".to_string(),
            ],
            SequencerError::InvalidTransition { .. } => {
                vec!["Type 'status' to see where the quiz is".to_string()]
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            SequencerError::EmptyQuiz => false,
            SequencerError::InvalidTransition { .. } => true,
        }
    }
}

/// Clip output errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Output device error: {0}")]
    Device(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("No media registered for {url}")]
    MissingMedia { url: String },
}

impl PlaybackError {
    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::Device(msg) => format!("Audio output is not available: {}", msg),
            PlaybackError::Stream(msg) => format!("Audio playback interrupted: {}", msg),
            PlaybackError::MissingMedia { url } => {
                format!("Clip {} was released before it could be played", url)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PlaybackError::Device(_) => vec![
                "Check that an audio output device is connected".to_string(),
                "Use --dry-run to run the quiz without audio output".to_string(),
            ],
            PlaybackError::Stream(_) => vec!["Type 'replay' to play the clip again".to_string()],
            PlaybackError::MissingMedia { .. } => vec!["Restart the quiz".to_string()],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            PlaybackError::Device(_) => false,
            PlaybackError::Stream(_) => true,
            PlaybackError::MissingMedia { .. } => false,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/audio-quiz/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec![
                "Configuration will use default values".to_string(),
            ],
            ConfigError::DeserializationError(_) => vec![
                "Run 'audio-quiz config reset' to restore defaults".to_string(),
                "Check the configuration file format manually".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true // Defaults are always usable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_quiz_error_from_transcode_error() {
        let err: QuizError = TranscodeError::InitTimeout { timeout: Duration::from_secs(30) }.into();
        match err {
            QuizError::Transcode(TranscodeError::InitTimeout { timeout }) => {
                assert_eq!(timeout, Duration::from_secs(30));
            }
            _ => panic!("Expected Transcode error variant"),
        }
    }

    #[test]
    fn test_transcode_error_display() {
        let error = TranscodeError::InitTimeout { timeout: Duration::from_secs(30) };
        assert_eq!(format!("{}", error), "Transcoder did not become ready within 30.0s");

        let error = TranscodeError::not_ready("mp3_to_wav");
        assert_eq!(format!("{}", error), "mp3_to_wav failed: engine is not ready");

        let error = TranscodeError::operation("mp3_to_wav", FailureReason::Fetch("404".to_string()));
        assert_eq!(format!("{}", error), "mp3_to_wav failed: fetch failed: 404");
    }

    #[test]
    fn test_mapping_error_carries_example_id() {
        let error = MappingError::MappingFailed {
            example_id: 7,
            source: TranscodeError::operation("mp3_to_wav", FailureReason::Decode("bad header".to_string())),
        };
        assert_eq!(error.example_id(), 7);
        assert!(format!("{}", error).contains("Example 7"));
        assert!(error.user_message().contains("#7"));
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_mapping_error_source_chain() {
        use std::error::Error;

        let error = QuizError::Mapping(MappingError::MappingFailed {
            example_id: 1,
            source: TranscodeError::not_ready("generate_silence"),
        });

        let mut current: &dyn Error = &error;
        let mut depth = 0;
        while let Some(source) = current.source() {
            current = source;
            depth += 1;
        }
        assert!(depth >= 2);
    }

    #[test]
    fn test_severity_levels() {
        let timeout: QuizError = TranscodeError::InitTimeout { timeout: Duration::from_secs(1) }.into();
        assert_eq!(timeout.severity(), ErrorSeverity::Error);
        assert!(timeout.is_recoverable());

        let mapping: QuizError = MappingError::MappingFailed {
            example_id: 1,
            source: TranscodeError::not_ready("mp3_to_wav"),
        }
        .into();
        assert_eq!(mapping.severity(), ErrorSeverity::Warning);
        assert_eq!(mapping.severity().log_level(), log::Level::Warn);

        let empty: QuizError = SequencerError::EmptyQuiz.into();
        assert!(!empty.is_recoverable());
    }

    #[test]
    fn test_worker_failures_are_recoverable() {
        let error = TranscodeError::operation("concatenate_audio", FailureReason::Worker("channel closed".to_string()));
        assert!(error.is_recoverable());
        assert!(error.recovery_suggestions()[0].contains("restart the audio engine"));
    }

    #[test]
    fn test_config_error_chain() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "Config file not found");
        let config_error: ConfigError = io_error.into();
        let quiz_error: QuizError = config_error.into();

        assert!(format!("{}", quiz_error).contains("Configuration error"));
        assert!(quiz_error.is_recoverable());
    }

    #[test]
    fn test_sequencer_error_display() {
        let error = SequencerError::InvalidTransition {
            from: "Complete".to_string(),
            action: "start".to_string(),
        };
        assert_eq!(format!("{}", error), "Cannot start while Complete");
        assert_eq!(format!("{}", SequencerError::EmptyQuiz), "Quiz has no examples");
    }

    #[test]
    fn test_playback_error_messages() {
        let error = PlaybackError::MissingMedia { url: "blob:audio-quiz/3".to_string() };
        assert!(error.user_message().contains("blob:audio-quiz/3"));
        assert!(!error.is_recoverable());
    }
}
