use log::{info, warn, error, debug, trace};
use std::time::{Duration, Instant};
use std::sync::{Arc, Mutex};
use std::collections::VecDeque;
use chrono::{DateTime, Utc};

/// Environment variable that selects the log level
pub const LOG_LEVEL_ENV: &str = "AUDIO_QUIZ_LOG_LEVEL";

/// Quiz event for logging and debugging
#[derive(Debug, Clone)]
pub struct QuizEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: QuizEventType,
    pub duration: Option<Duration>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizEventType {
    EngineLoading,
    EngineReady,
    EngineFailed,
    ClipTranscoded,
    CacheHit,
    MappingFailed,
    ExampleSkipped,
    PhaseChanged,
    QuizCompleted,
    BlobsDisposed,
    LateResultDiscarded,
    PerformanceWarning,
}

impl QuizEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizEventType::EngineLoading => "ENGINE_LOADING",
            QuizEventType::EngineReady => "ENGINE_READY",
            QuizEventType::EngineFailed => "ENGINE_FAILED",
            QuizEventType::ClipTranscoded => "CLIP_TRANSCODED",
            QuizEventType::CacheHit => "CACHE_HIT",
            QuizEventType::MappingFailed => "MAPPING_FAILED",
            QuizEventType::ExampleSkipped => "EXAMPLE_SKIPPED",
            QuizEventType::PhaseChanged => "PHASE_CHANGED",
            QuizEventType::QuizCompleted => "QUIZ_COMPLETED",
            QuizEventType::BlobsDisposed => "BLOBS_DISPOSED",
            QuizEventType::LateResultDiscarded => "LATE_RESULT_DISCARDED",
            QuizEventType::PerformanceWarning => "PERFORMANCE_WARNING",
        }
    }
}

/// Logger for quiz engine operations with a bounded event history
#[derive(Clone)]
pub struct QuizLogger {
    events: Arc<Mutex<VecDeque<QuizEvent>>>,
    max_events: usize,
}

impl Default for QuizLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl QuizLogger {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: 1000,
        }
    }

    /// Initialize logging system, falling back to `default_level` when the env var is unset
    pub fn init_with_default(default_level: &str) -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var(LOG_LEVEL_ENV)
            .unwrap_or_else(|_| default_level.to_string());

        let mut builder = env_logger::Builder::new();

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        builder.filter_level(parse_level_filter(&log_level));
        builder.try_init()?;

        info!("Audio quiz logging initialized with level: {}", log_level);
        Ok(())
    }

    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        Self::init_with_default("info")
    }

    pub fn log_event(&self, event_type: QuizEventType, details: String, duration: Option<Duration>) {
        match event_type {
            QuizEventType::EngineLoading
            | QuizEventType::EngineReady
            | QuizEventType::QuizCompleted => {
                info!("[{}] {}", event_type.as_str(), details);
            }
            QuizEventType::ClipTranscoded => {
                debug!("[{}] {} (took: {:?})", event_type.as_str(), details, duration);
            }
            QuizEventType::CacheHit
            | QuizEventType::PhaseChanged
            | QuizEventType::BlobsDisposed
            | QuizEventType::LateResultDiscarded => {
                debug!("[{}] {}", event_type.as_str(), details);
            }
            QuizEventType::MappingFailed | QuizEventType::ExampleSkipped => {
                warn!("[{}] {}", event_type.as_str(), details);
            }
            QuizEventType::EngineFailed => {
                error!("[{}] {}", event_type.as_str(), details);
            }
            QuizEventType::PerformanceWarning => {
                warn!("[{}] {} (duration: {:?})", event_type.as_str(), details, duration);
            }
        }

        let event = QuizEvent {
            timestamp: Utc::now(),
            event_type,
            duration,
            details,
        };

        // A poisoned history only loses debugging data
        if let Ok(mut events) = self.events.lock() {
            events.push_back(event);
            while events.len() > self.max_events {
                events.pop_front();
            }
        }
    }

    pub fn log_engine_loading(&self) {
        self.log_event(QuizEventType::EngineLoading, "Loading transcoding runtime".to_string(), None);
    }

    pub fn log_engine_ready(&self, load_time: Duration) {
        self.log_event(
            QuizEventType::EngineReady,
            format!("Transcoder ready after {:.0}ms", load_time.as_millis()),
            Some(load_time),
        );
    }

    pub fn log_engine_failed(&self, reason: &str) {
        self.log_event(
            QuizEventType::EngineFailed,
            format!("Transcoder failed to start: {}", reason),
            None,
        );
    }

    pub fn log_clip_transcoded(&self, source: &str, blob_url: &str, took: Duration) {
        self.log_event(
            QuizEventType::ClipTranscoded,
            format!("{} -> {}", source, blob_url),
            Some(took),
        );
    }

    pub fn log_cache_hit(&self, example_id: i64) {
        self.log_event(
            QuizEventType::CacheHit,
            format!("Reusing transcoded clips for example #{}", example_id),
            None,
        );
    }

    pub fn log_mapping_failed(&self, example_id: i64, reason: &str) {
        self.log_event(
            QuizEventType::MappingFailed,
            format!("Example #{} could not be mapped: {}", example_id, reason),
            None,
        );
    }

    pub fn log_example_skipped(&self, example_id: i64) {
        self.log_event(
            QuizEventType::ExampleSkipped,
            format!("Example #{} excluded from the quiz", example_id),
            None,
        );
    }

    pub fn log_phase_changed(&self, position: &str) {
        self.log_event(QuizEventType::PhaseChanged, format!("Now at {}", position), None);
    }

    pub fn log_quiz_completed(&self, example_count: usize) {
        self.log_event(
            QuizEventType::QuizCompleted,
            format!("Quiz complete after {} examples", example_count),
            None,
        );
    }

    pub fn log_blobs_disposed(&self, count: usize) {
        self.log_event(
            QuizEventType::BlobsDisposed,
            format!("Released {} audio blobs", count),
            None,
        );
    }

    pub fn log_late_result_discarded(&self, example_id: i64) {
        self.log_event(
            QuizEventType::LateResultDiscarded,
            format!("Discarded clips for example #{} that arrived after cleanup", example_id),
            None,
        );
    }

    pub fn log_performance_warning(&self, operation: &str, duration: Duration, threshold: Duration) {
        self.log_event(
            QuizEventType::PerformanceWarning,
            format!("{} took {}ms (threshold: {}ms)",
                operation, duration.as_millis(), threshold.as_millis()),
            Some(duration),
        );
    }

    /// Get recent events for debugging
    pub fn get_recent_events(&self, count: usize) -> Vec<QuizEvent> {
        let events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn clear_events(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    pub fn get_event_statistics(&self) -> EventStatistics {
        let mut stats = EventStatistics::default();
        for event in self.get_recent_events(self.max_events) {
            match event.event_type {
                QuizEventType::ClipTranscoded => stats.clips_transcoded += 1,
                QuizEventType::CacheHit => stats.cache_hits += 1,
                QuizEventType::MappingFailed => stats.mapping_failures += 1,
                QuizEventType::ExampleSkipped => stats.examples_skipped += 1,
                QuizEventType::LateResultDiscarded => stats.late_results += 1,
                QuizEventType::PerformanceWarning => stats.performance_warnings += 1,
                _ => {}
            }
            stats.total_events += 1;
        }
        stats
    }
}

fn parse_level_filter(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Statistics about logged events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStatistics {
    pub total_events: usize,
    pub clips_transcoded: usize,
    pub cache_hits: usize,
    pub mapping_failures: usize,
    pub examples_skipped: usize,
    pub late_results: usize,
    pub performance_warnings: usize,
}

/// Timer utility for measuring operation durations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: String) -> Self {
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.elapsed();
        trace!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        duration
    }

    pub fn finish_with_threshold(self, threshold: Duration) -> Duration {
        let duration = self.elapsed();
        if duration > threshold {
            warn!("Operation '{}' took {}ms (threshold: {}ms)",
                self.operation_name, duration.as_millis(), threshold.as_millis());
        } else {
            debug!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        }
        duration
    }
}

/// Macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($name:expr, $code:block) => {{
        let timer = $crate::logging::OperationTimer::new($name.to_string());
        let result = $code;
        let _duration = timer.finish();
        result
    }};
}

/// Macro for timing operations with threshold warnings
#[macro_export]
macro_rules! time_operation_with_threshold {
    ($name:expr, $threshold:expr, $code:block) => {{
        let timer = $crate::logging::OperationTimer::new($name.to_string());
        let result = $code;
        let _duration = timer.finish_with_threshold($threshold);
        result
    }};
}
