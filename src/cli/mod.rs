use crate::models::AudioQuizType;
use crate::quiz::PlayerControl;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod status;
pub use status::StatusDisplay;

/// Spanish/English audio quiz
#[derive(Debug, Parser)]
#[command(name = "audio-quiz")]
#[command(about = "Transcodes example audio into four-phase speaking and listening quizzes")]
#[command(version)]
pub struct CliApp {
    /// Configuration file (defaults to ~/.config/audio-quiz/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Prepare a quiz from an examples file and play it interactively
    Run {
        /// JSON array of examples
        examples: PathBuf,
        /// speaking or listening (defaults to the configured type)
        #[arg(long, value_parser = parse_quiz_type)]
        quiz_type: Option<AudioQuizType>,
        /// Advance automatically when a clip ends
        #[arg(long, conflicts_with = "manual")]
        autoplay: bool,
        /// Wait for 'next' after every clip
        #[arg(long)]
        manual: bool,
        /// Wait out clip durations without opening an audio device
        #[arg(long)]
        dry_run: bool,
        /// Only quiz the first N examples
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Convert one compressed clip to WAV with a silence tail
    Transcode {
        source: String,
        output: PathBuf,
        /// Seconds of silence appended to the clip
        #[arg(long, default_value_t = 0.5)]
        tail_sec: f64,
    },
    /// Write a silent WAV clip
    Silence {
        seconds: f64,
        output: PathBuf,
    },
    /// Join WAV files in order
    Concat {
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Write the four clips of one example as a single WAV file
    Export {
        examples: PathBuf,
        id: i64,
        output: PathBuf,
        #[arg(long, value_parser = parse_quiz_type)]
        quiz_type: Option<AudioQuizType>,
    },
    /// List audio output devices
    Devices,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Restore the default configuration
    Reset,
    /// Turn autoplay on or off by default
    Autoplay {
        #[arg(value_parser = parse_switch, action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Quiz type used when --quiz-type is not given
    QuizType {
        #[arg(value_parser = parse_quiz_type)]
        quiz_type: AudioQuizType,
    },
    /// Output device for quiz playback; omit the name to use the default device
    Device { name: Option<String> },
    /// Clip padding and pacing
    Timing {
        /// Silence after the source-language clip, in seconds
        #[arg(long)]
        question_tail: Option<f64>,
        /// Silence after the target-language clip, in seconds
        #[arg(long)]
        answer_tail: Option<f64>,
        /// Length of the Guess phase, in seconds
        #[arg(long)]
        guess_silence: Option<f64>,
        /// Pause before the next example under autoplay, in milliseconds
        #[arg(long)]
        settle_ms: Option<u64>,
    },
}

/// A line typed while a quiz is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizCommand {
    Control(PlayerControl),
    Status,
}

fn parse_quiz_type(value: &str) -> Result<AudioQuizType, String> {
    AudioQuizType::parse(value)
        .ok_or_else(|| format!("'{}' is not a quiz type (speaking, listening)", value))
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        _ => Err(format!("'{}' is not on or off", value)),
    }
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home_dir) => home_dir.join(rest),
                None => PathBuf::from(path),
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// Parse a control typed during a quiz
    pub fn parse_command(input: &str) -> Result<QuizCommand, ParseError> {
        let args: Vec<&str> = input.split_whitespace().collect();
        if args.is_empty() {
            return Err(ParseError::EmptyCommand);
        }

        let control = match args[0] {
            "next" | "n" => PlayerControl::Advance,
            "prev" | "previous" | "p" => PlayerControl::Previous,
            "skip" => {
                let value = args.get(1).ok_or_else(|| ParseError::MissingArgument {
                    command: "skip".to_string(),
                    argument: "example number".to_string(),
                })?;
                PlayerControl::Skip(Self::parse_example_number(value)?)
            }
            "pause" => PlayerControl::Pause,
            "resume" => PlayerControl::Resume,
            "replay" | "r" => PlayerControl::Replay,
            "autoplay" => match args.get(1).copied() {
                Some("on") => PlayerControl::SetAutoplay(true),
                Some("off") => PlayerControl::SetAutoplay(false),
                Some(other) => {
                    return Err(ParseError::InvalidArgument {
                        argument: "autoplay".to_string(),
                        value: other.to_string(),
                        expected: "on or off".to_string(),
                    })
                }
                None => {
                    return Err(ParseError::MissingArgument {
                        command: "autoplay".to_string(),
                        argument: "on|off".to_string(),
                    })
                }
            },
            "quit" | "exit" | "q" => PlayerControl::Quit,
            "status" => return Ok(QuizCommand::Status),
            "help" => return Err(ParseError::HelpRequested),
            _ => {
                return Err(ParseError::UnknownCommand {
                    command: args[0].to_string(),
                })
            }
        };

        Ok(QuizCommand::Control(control))
    }

    /// One-based example number as typed by the user, returned zero-based
    pub fn parse_example_number(value: &str) -> Result<usize, ParseError> {
        match value.parse::<usize>() {
            Ok(number) if number >= 1 => Ok(number - 1),
            _ => Err(ParseError::InvalidArgument {
                argument: "example number".to_string(),
                value: value.to_string(),
                expected: "a number starting at 1".to_string(),
            }),
        }
    }

    /// Display help information
    pub fn display_help() {
        println!("Audio Quiz - Controls:");
        println!();
        println!("Navigation:");
        println!("  next            - Go to the next phase");
        println!("  prev            - Back to the previous example's question");
        println!("  skip <n>        - Jump to example n");
        println!("  replay          - Play the current clip again");
        println!();
        println!("Playback:");
        println!("  pause           - Pause the quiz");
        println!("  resume          - Continue from the same phase");
        println!("  autoplay on|off - Advance automatically when a clip ends");
        println!();
        println!("General:");
        println!("  status          - Show where the quiz is");
        println!("  help            - Show this help message");
        println!("  quit            - Stop the quiz");
    }
}

/// Command parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Missing argument for {command}: {argument}")]
    MissingArgument { command: String, argument: String },

    #[error("Invalid argument {argument}: got '{value}', expected {expected}")]
    InvalidArgument {
        argument: String,
        value: String,
        expected: String,
    },

    #[error("Help requested")]
    HelpRequested,
}
