use std::path::{Path, PathBuf};
use std::sync::Arc;

use audio_quiz_engine::audio::blob::dispose_all;
use audio_quiz_engine::audio::pcm::secs_to_duration;
use audio_quiz_engine::audio::{
    AudioBlob, ClipPlayer, DevicePlayer, TimedPlayer, TranscodeOptions, Transcoder,
    TranscodingEngine,
};
use audio_quiz_engine::cli::{CliApp, Commands, ConfigAction, ParseError, QuizCommand, StatusDisplay};
use audio_quiz_engine::config::{ConfigManager, QuizConfig};
use audio_quiz_engine::error::{ErrorSeverity, PlaybackError, QuizError};
use audio_quiz_engine::error_recovery::{SetupDecision, SetupRecoveryManager};
use audio_quiz_engine::logging::QuizLogger;
use audio_quiz_engine::models::{AudioQuizType, ExampleRecord};
use audio_quiz_engine::quiz::{PlayerControl, PlayerEvent, QuizPlayer, QuizSession};
use log::{error, info, warn};
use tokio::sync::mpsc;

/// Playback speed of `--dry-run`
const DRY_RUN_SPEED: f64 = 4.0;

/// Main application controller that coordinates all components
pub struct AppController {
    config_manager: ConfigManager,
    logger: QuizLogger,
    recovery: SetupRecoveryManager,
}

impl AppController {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, QuizError> {
        // Initialize logging first (default to 'warn' if unspecified)
        if let Err(e) = QuizLogger::init_with_default("warn") {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }

        let logger = QuizLogger::new();
        let mut recovery = SetupRecoveryManager::new(logger.clone());

        let loaded = match &config_path {
            Some(path) => ConfigManager::with_path(CliApp::expand_path(&path.to_string_lossy())),
            None => ConfigManager::new(),
        };
        let config_manager = match loaded {
            Ok(manager) => manager,
            Err(e) => {
                let error = QuizError::from(e);
                match recovery.decide(&error) {
                    SetupDecision::Abort(_) => return Err(error),
                    decision => {
                        warn!("Configuration unusable: {}", error);
                        eprintln!("Warning: {} {}.", error.user_message(), decision.message());
                        let path = match config_path {
                            Some(path) => path,
                            None => ConfigManager::default_path()?,
                        };
                        ConfigManager::with_defaults(path)
                    }
                }
            }
        };

        info!("Application controller initialized");

        Ok(Self {
            config_manager,
            logger,
            recovery,
        })
    }

    pub async fn execute_command(&mut self, command: Commands) -> Result<(), QuizError> {
        match command {
            Commands::Run { examples, quiz_type, autoplay, manual, dry_run, limit } => {
                let mut config = self.config_manager.get_config().clone();
                if autoplay {
                    config.autoplay = true;
                }
                if manual {
                    config.autoplay = false;
                }
                let quiz_type = quiz_type.unwrap_or(config.default_quiz_type);
                let records = Self::load_records(&examples, limit).await?;
                self.run_quiz(config, records, quiz_type, dry_run).await?;
            }
            Commands::Transcode { source, output, tail_sec } => {
                let engine = self.ready_engine().await?;
                let source = Self::resolve_source(&source);
                let blob = engine.mp3_to_wav(&source, TranscodeOptions::with_tail(tail_sec)).await?;
                Self::write_blob(&blob, &output).await?;
            }
            Commands::Silence { seconds, output } => {
                let engine = self.ready_engine().await?;
                let blob = engine.generate_silence(secs_to_duration(seconds)).await?;
                Self::write_blob(&blob, &output).await?;
            }
            Commands::Concat { output, inputs } => {
                let engine = self.ready_engine().await?;
                let mut parts = Vec::with_capacity(inputs.len());
                for input in &inputs {
                    let source = Self::resolve_source(&input.to_string_lossy());
                    match engine.mp3_to_wav(&source, TranscodeOptions::with_tail(0.0)).await {
                        Ok(blob) => parts.push(blob),
                        Err(e) => {
                            dispose_all(&parts);
                            return Err(e.into());
                        }
                    }
                }
                let joined = engine.concatenate_audio(&parts).await;
                dispose_all(&parts);
                Self::write_blob(&joined?, &output).await?;
            }
            Commands::Export { examples, id, output, quiz_type } => {
                let config = self.config_manager.get_config().clone();
                let quiz_type = quiz_type.unwrap_or(config.default_quiz_type);
                let records = Self::load_records(&examples, None).await?;
                let record = records
                    .into_iter()
                    .find(|record| record.id == id)
                    .ok_or_else(|| {
                        std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            format!("example #{} is not in {}", id, examples.display()),
                        )
                    })?;

                let engine = self.ready_engine_with(&config).await?;
                let session = QuizSession::new(Arc::new(engine), &config, self.logger.clone());
                session.prepare(std::slice::from_ref(&record), quiz_type).await?;
                let summary = session.export_example(0, &output).await;
                session.cleanup();
                let summary = summary?;
                println!(
                    "OK: Exported #{} ({}, {}) to {}",
                    id,
                    quiz_type,
                    StatusDisplay::format_duration(summary.duration),
                    summary.path.display()
                );
            }
            Commands::Devices => {
                let devices = DevicePlayer::list_devices()?;
                if devices.is_empty() {
                    println!("No audio devices found");
                } else {
                    println!("Available audio devices:");
                    let preferred = self.config_manager.get_config().preferred_device.clone();
                    for device in devices {
                        let marker = if Some(&device) == preferred.as_ref() { "*" } else { " " };
                        println!("{} {}", marker, device);
                    }
                }
            }
            Commands::Config { action } => match action {
                ConfigAction::Show => {
                    StatusDisplay::display_config(self.config_manager.get_config());
                    println!("File: {}", self.config_manager.config_path().display());
                }
                ConfigAction::Reset => {
                    self.config_manager.reset_to_defaults()?;
                    println!("OK: Configuration reset");
                }
                ConfigAction::Autoplay { enabled } => {
                    self.config_manager.set_autoplay(enabled)?;
                    println!("OK: Autoplay {}", if enabled { "on" } else { "off" });
                }
                ConfigAction::QuizType { quiz_type } => {
                    self.config_manager.set_default_quiz_type(quiz_type)?;
                    println!("OK: Default quiz type {}", quiz_type);
                }
                ConfigAction::Device { name } => {
                    match &name {
                        Some(device) => println!("OK: Quiz audio goes to {}", device),
                        None => println!("OK: Quiz audio goes to the default device"),
                    }
                    self.config_manager.set_preferred_device(name)?;
                }
                ConfigAction::Timing { question_tail, answer_tail, guess_silence, settle_ms } => {
                    self.config_manager.update_config(|config| {
                        if let Some(value) = question_tail {
                            config.question_tail_sec = value;
                        }
                        if let Some(value) = answer_tail {
                            config.answer_tail_sec = value;
                        }
                        if let Some(value) = guess_silence {
                            config.guess_silence_sec = value;
                        }
                        if let Some(value) = settle_ms {
                            config.settle_delay_ms = value;
                        }
                    })?;
                    StatusDisplay::display_config(self.config_manager.get_config());
                }
            },
        }

        Ok(())
    }

    /// Prepare a quiz and play it until it completes or the user quits
    async fn run_quiz(
        &mut self,
        config: QuizConfig,
        records: Vec<ExampleRecord>,
        quiz_type: AudioQuizType,
        dry_run: bool,
    ) -> Result<(), QuizError> {
        let (interrupt_tx, mut interrupt_rx) = mpsc::unbounded_channel::<()>();
        if let Err(e) = ctrlc::set_handler(move || {
            let _ = interrupt_tx.send(());
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        let engine = self.ready_engine_with(&config).await?;
        let session = Arc::new(QuizSession::new(Arc::new(engine), &config, self.logger.clone()));

        println!("Preparing {} examples ({} quiz)...", records.len(), quiz_type);
        let report = tokio::select! {
            report = session.prepare(&records, quiz_type) => report?,
            Some(()) = interrupt_rx.recv() => {
                let released = session.cleanup();
                println!("\nPreparation cancelled ({} clips released)", released);
                return Ok(());
            }
        };
        StatusDisplay::display_report(&report);
        if report.cancelled {
            return Ok(());
        }

        let output: Arc<dyn ClipPlayer> = if dry_run {
            Arc::new(TimedPlayer::new(DRY_RUN_SPEED))
        } else {
            Arc::new(DevicePlayer::new(config.preferred_device.clone()).with_volume(config.volume))
        };

        println!("Type 'help' for controls, 'quit' to stop.");
        println!();

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let run = QuizPlayer::new(Arc::clone(&session), output)
            .with_events(event_tx)
            .run(control_rx);
        tokio::pin!(run);

        let mut lines = Self::spawn_stdin_reader();
        let mut stdin_open = true;

        let summary = loop {
            tokio::select! {
                summary = &mut run => break summary,

                Some(event) = event_rx.recv() => Self::display_event(event),

                line = lines.recv(), if stdin_open => match line {
                    Some(line) => Self::handle_line(&line, &session, &control_tx),
                    None => stdin_open = false,
                },

                Some(()) = interrupt_rx.recv() => {
                    println!("\nReceived interrupt signal. Stopping quiz...");
                    let _ = control_tx.send(PlayerControl::Quit);
                }
            }
        };

        // Render whatever the player emitted before it returned
        while let Ok(event) = event_rx.try_recv() {
            Self::display_event(event);
        }

        let summary = summary?;
        let stats = session.mapper_stats();
        info!(
            "Quiz finished: {} clips played, {} blobs released, {} transcoder calls saved by the cache",
            summary.clips_played, summary.blobs_released, stats.transcoder_calls_avoided
        );
        if !summary.completed {
            println!("Quiz stopped after {} clips.", summary.clips_played);
        }
        Ok(())
    }

    fn handle_line(
        line: &str,
        session: &QuizSession,
        controls: &mpsc::UnboundedSender<PlayerControl>,
    ) {
        if line.trim().is_empty() {
            return;
        }
        match CliApp::parse_command(line) {
            Ok(QuizCommand::Control(control)) => {
                if controls.send(control).is_err() {
                    warn!("Quiz already stopped; ignoring '{}'", line.trim());
                }
            }
            Ok(QuizCommand::Status) => {
                let (state, autoplay, clip) =
                    session.with_sequencer(|s| (s.state(), s.autoplay(), s.current_clip()));
                let live_blobs = session.transcoder().blob_store().live_count();
                StatusDisplay::display_state(state, autoplay, clip.as_ref(), live_blobs);
            }
            Err(ParseError::HelpRequested) => CliApp::display_help(),
            Err(e) => {
                eprintln!("Error: {}", e);
                println!("Type 'help' for available commands.");
            }
        }
    }

    fn display_event(event: PlayerEvent) {
        match event {
            PlayerEvent::ClipStarted(clip) => StatusDisplay::display_clip(&clip),
            PlayerEvent::Waiting(clip) => {
                println!("  ({} done, type 'next' to continue)", clip.position_label());
            }
            PlayerEvent::Settling(delay) => {
                log::debug!("Advancing in {} ms", delay.as_millis());
            }
            PlayerEvent::Paused => println!("⏸ Paused. Type 'resume' to continue."),
            PlayerEvent::ClipFailed(reason) => eprintln!("⚠ Clip could not be played: {}", reason),
            PlayerEvent::Completed => println!("✓ Quiz complete"),
        }
    }

    /// Lines typed on stdin. The channel closes on EOF.
    fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(line.trim().to_string()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    }

    async fn ready_engine(&mut self) -> Result<TranscodingEngine, QuizError> {
        let config = self.config_manager.get_config().clone();
        self.ready_engine_with(&config).await
    }

    /// Build the transcoder and bring it up, retrying while recovery allows
    async fn ready_engine_with(&mut self, config: &QuizConfig) -> Result<TranscodingEngine, QuizError> {
        let engine = TranscodingEngine::new(config, self.logger.clone())?;
        loop {
            let error = match engine.init().await {
                Ok(()) => return Ok(engine),
                Err(e) => QuizError::from(e),
            };
            match self.recovery.decide(&error) {
                SetupDecision::RetryInit(msg) => println!("🔄 {}, retrying...", msg),
                _ => return Err(error),
            }
        }
    }

    async fn load_records(path: &Path, limit: Option<usize>) -> Result<Vec<ExampleRecord>, QuizError> {
        let path = CliApp::expand_path(&path.to_string_lossy());
        let json = tokio::fs::read_to_string(&path).await?;
        let mut records = ExampleRecord::list_from_json(&json)?;
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        info!("Loaded {} examples from {}", records.len(), path.display());
        Ok(records)
    }

    /// URLs pass through, local paths get `~` expanded
    fn resolve_source(source: &str) -> String {
        if source.contains("://") {
            source.to_string()
        } else {
            CliApp::expand_path(source).to_string_lossy().into_owned()
        }
    }

    async fn write_blob(blob: &AudioBlob, output: &Path) -> Result<(), QuizError> {
        let result = match blob.data() {
            Some(data) => {
                tokio::fs::write(output, &data.bytes).await?;
                println!(
                    "OK: Wrote {} ({}, {} bytes)",
                    output.display(),
                    StatusDisplay::format_duration(data.duration),
                    data.bytes.len()
                );
                Ok(())
            }
            None => Err(PlaybackError::MissingMedia {
                url: blob.url().to_string(),
            }
            .into()),
        };
        blob.dispose();
        result
    }

    /// Log an error at its severity and render it for the user
    fn handle_error(&self, error: &QuizError) {
        match error.severity() {
            ErrorSeverity::Info => info!("{}", error),
            ErrorSeverity::Warning => warn!("{}", error),
            ErrorSeverity::Error | ErrorSeverity::Critical => error!("{}", error),
        }
        StatusDisplay::display_error(error);
    }
}

#[tokio::main]
async fn main() {
    let cli = CliApp::parse();

    let mut app = match AppController::new(cli.config) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to initialize application: {}", e);
            StatusDisplay::display_simple_error(&e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.execute_command(cli.command).await {
        app.handle_error(&e);
        std::process::exit(1);
    }
}
