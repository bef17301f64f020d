use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;

use crate::audio::{AudioBlob, Transcoder};
use crate::config::QuizConfig;
use crate::error::{PlaybackError, QuizError, SequencerError};
use crate::error_recovery::{SetupDecision, SetupRecoveryManager};
use crate::logging::QuizLogger;
use crate::models::{AudioQuizType, ExampleRecord, MappedExample};
use crate::quiz::mapper::{MapperStats, QuizMapper};
use crate::quiz::resources::ResourceTracker;
use crate::quiz::sequencer::{PlaybackSequencer, SequencerState};

/// An example left out of the quiz during preparation
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedExample {
    pub example_id: i64,
    pub reason: String,
}

/// Outcome of `QuizSession::prepare`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareReport {
    /// Ids in quiz order
    pub loaded: Vec<i64>,
    pub skipped: Vec<SkippedExample>,
    /// `cleanup()` ran while mapping was in flight; nothing was loaded
    pub cancelled: bool,
}

impl PrepareReport {
    pub fn summary(&self) -> String {
        if self.cancelled {
            return "Preparation cancelled".to_string();
        }
        match self.skipped.len() {
            0 => format!("{} examples ready", self.loaded.len()),
            skipped => format!("{} examples ready, {} skipped", self.loaded.len(), skipped),
        }
    }
}

/// A written example export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub duration: Duration,
    pub bytes: usize,
}

/// One quiz run: a single transcoder shared by the mapper, the resource
/// tracker that owns handed-off blobs, and the sequencer.
///
/// All methods take `&self` so `cleanup()` can run from another task while
/// `prepare()` is still mapping.
pub struct QuizSession {
    transcoder: Arc<dyn Transcoder>,
    mapper: QuizMapper,
    tracker: Arc<ResourceTracker>,
    sequencer: Mutex<PlaybackSequencer>,
    mapped: Mutex<Vec<MappedExample>>,
    quiz_type: Mutex<AudioQuizType>,
    recovery: Mutex<SetupRecoveryManager>,
    logger: QuizLogger,
}

impl QuizSession {
    pub fn new(transcoder: Arc<dyn Transcoder>, config: &QuizConfig, logger: QuizLogger) -> Self {
        let tracker = Arc::new(ResourceTracker::new(logger.clone()));
        let mut sequencer =
            PlaybackSequencer::new(Arc::clone(&tracker), config.settle_delay(), logger.clone());
        sequencer.set_autoplay(config.autoplay);

        Self {
            mapper: QuizMapper::new(Arc::clone(&transcoder), config, logger.clone()),
            transcoder,
            tracker,
            sequencer: Mutex::new(sequencer),
            mapped: Mutex::new(Vec::new()),
            quiz_type: Mutex::new(config.default_quiz_type),
            recovery: Mutex::new(SetupRecoveryManager::new(logger.clone())),
            logger,
        }
    }

    pub fn transcoder(&self) -> &Arc<dyn Transcoder> {
        &self.transcoder
    }

    pub fn logger(&self) -> &QuizLogger {
        &self.logger
    }

    pub fn quiz_type(&self) -> AudioQuizType {
        *lock(&self.quiz_type)
    }

    pub fn mapper_stats(&self) -> MapperStats {
        self.mapper.stats()
    }

    /// Map every record and start the quiz with the ones that succeeded
    pub async fn prepare(
        &self,
        records: &[ExampleRecord],
        quiz_type: AudioQuizType,
    ) -> Result<PrepareReport, QuizError> {
        {
            let sequencer = lock(&self.sequencer);
            if sequencer.state() != SequencerState::Setup {
                return Err(SequencerError::InvalidTransition {
                    from: sequencer.state().name().to_string(),
                    action: "prepare".to_string(),
                }
                .into());
            }
        }

        self.transcoder.init().await?;

        let ticket = self.tracker.ticket();
        let results = join_all(
            records
                .iter()
                .map(|record| self.mapper.parse_example_for_quiz(record)),
        )
        .await;

        let mut report = PrepareReport::default();
        let mut adopted = Vec::new();
        let mut abort = None;

        for result in results {
            match result {
                Ok(mapped) => {
                    let blobs = mapped.blobs().map(AudioBlob::clone).to_vec();
                    if self.tracker.adopt(&ticket, mapped.example_id, blobs) {
                        report.loaded.push(mapped.example_id);
                        adopted.push(mapped);
                    } else {
                        report.cancelled = true;
                    }
                }
                Err(error) => {
                    let example_id = error.example_id();
                    let reason = error.to_string();
                    let error = QuizError::from(error);
                    match lock(&self.recovery).decide(&error) {
                        SetupDecision::SkipExample(_) | SetupDecision::RetryInit(_) => {
                            report.skipped.push(SkippedExample { example_id, reason });
                        }
                        SetupDecision::Abort(_) => {
                            if abort.is_none() {
                                abort = Some(error);
                            }
                        }
                    }
                }
            }
        }

        if report.cancelled {
            report.loaded.clear();
            return Ok(report);
        }
        if let Some(error) = abort {
            self.tracker.dispose_all();
            return Err(error);
        }
        if adopted.is_empty() {
            return Err(SequencerError::EmptyQuiz.into());
        }

        let examples = adopted
            .iter()
            .map(|mapped| mapped.variant(quiz_type).clone())
            .collect();

        {
            let mut sequencer = lock(&self.sequencer);
            if !self.tracker.is_current(&ticket) {
                // Cleaned up between adoption and loading
                report.cancelled = true;
                report.loaded.clear();
                return Ok(report);
            }
            sequencer.load(examples)?;
            sequencer.start()?;
        }

        *lock(&self.mapped) = adopted;
        *lock(&self.quiz_type) = quiz_type;
        log::info!("{}", report.summary());
        Ok(report)
    }

    /// Run `f` against the sequencer. The lock is never held across an await.
    pub fn with_sequencer<R>(&self, f: impl FnOnce(&mut PlaybackSequencer) -> R) -> R {
        f(&mut lock(&self.sequencer))
    }

    /// Resolve a clip URL handed out by this session
    pub fn blob_for(&self, url: &str) -> Option<AudioBlob> {
        lock(&self.mapped)
            .iter()
            .flat_map(|mapped| mapped.blobs())
            .find(|blob| blob.url() == url)
            .cloned()
    }

    /// Write one example's four clips as a single WAV file
    pub async fn export_example(&self, index: usize, path: &Path) -> Result<ExportSummary, QuizError> {
        let inputs = {
            let quiz_type = self.quiz_type();
            let mapped = lock(&self.mapped);
            let example = mapped.get(index).ok_or_else(|| SequencerError::InvalidTransition {
                from: format!("{} examples loaded", mapped.len()),
                action: format!("export example {}", index + 1),
            })?;

            example
                .variant(quiz_type)
                .clips()
                .iter()
                .map(|clip| {
                    example
                        .blobs()
                        .into_iter()
                        .find(|blob| blob.url() == clip.audio_url)
                        .cloned()
                        .ok_or_else(|| PlaybackError::MissingMedia {
                            url: clip.audio_url.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let joined = self.transcoder.concatenate_audio(&inputs).await?;
        let result = match joined.data() {
            Some(data) => tokio::fs::write(path, &data.bytes)
                .await
                .map(|_| ExportSummary {
                    path: path.to_path_buf(),
                    duration: data.duration,
                    bytes: data.bytes.len(),
                })
                .map_err(QuizError::from),
            None => Err(PlaybackError::MissingMedia {
                url: joined.url().to_string(),
            }
            .into()),
        };
        joined.dispose();
        result
    }

    /// Dispose every blob, forget the examples and return to setup.
    /// Never fails and may be called repeatedly or while `prepare()` runs.
    pub fn cleanup(&self) -> usize {
        let released = lock(&self.sequencer).cleanup();
        lock(&self.mapped).clear();
        self.mapper.clear_cache();
        lock(&self.recovery).clear_recovery_attempts();
        released
    }
}

impl Drop for QuizSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
