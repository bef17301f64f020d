use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::audio::blob::{AudioBlob, BlobData, BlobStore};
use crate::audio::decode::extension_hint;
use crate::audio::fetch::{ClipFetcher, SourceFetcher};
use crate::audio::pcm::{OutputFormat, WAV_MIME};
use crate::audio::worker::{EncodedClip, TranscodeWorker};
use crate::audio::{TranscodeOptions, Transcoder};
use crate::config::QuizConfig;
use crate::error::{FailureReason, TranscodeError};
use crate::logging::{OperationTimer, QuizLogger};

const SLOW_TRANSCODE: Duration = Duration::from_millis(750);

/// Lifecycle of the transcoding runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Loading,
    Ready,
    Error,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
            EngineState::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
enum EngineStatus {
    Idle,
    Loading,
    Ready,
    Error(TranscodeError),
}

impl EngineStatus {
    fn state(&self) -> EngineState {
        match self {
            EngineStatus::Idle => EngineState::Idle,
            EngineStatus::Loading => EngineState::Loading,
            EngineStatus::Ready => EngineState::Ready,
            EngineStatus::Error(_) => EngineState::Error,
        }
    }
}

/// Brings up the transcoding runtime; called at most once per `Loading` attempt
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self, format: OutputFormat) -> Result<TranscodeWorker, String>;
}

/// Starts the dedicated worker thread and waits for its ready handshake
pub struct WorkerLoader;

#[async_trait]
impl EngineLoader for WorkerLoader {
    async fn load(&self, format: OutputFormat) -> Result<TranscodeWorker, String> {
        let (worker, ready) = TranscodeWorker::spawn(format).map_err(|e| e.to_string())?;
        let codecs = ready
            .await
            .map_err(|_| "worker exited during startup".to_string())?;
        if codecs == 0 {
            return Err("no audio codecs are available".to_string());
        }
        Ok(worker)
    }
}

struct EngineShared {
    status: watch::Sender<EngineStatus>,
    worker: Mutex<Option<Arc<TranscodeWorker>>>,
    loader: Arc<dyn EngineLoader>,
    fetcher: Arc<dyn ClipFetcher>,
    store: Arc<BlobStore>,
    format: OutputFormat,
    logger: QuizLogger,
}

/// Production `Transcoder`: one lazily started worker shared by every call
#[derive(Clone)]
pub struct TranscodingEngine {
    shared: Arc<EngineShared>,
    init_timeout: Duration,
}

impl TranscodingEngine {
    pub fn new(config: &QuizConfig, logger: QuizLogger) -> Result<Self, TranscodeError> {
        let fetcher = SourceFetcher::new(config.init_timeout())
            .map_err(|e| TranscodeError::InitFailed(e.to_string()))?;
        Ok(Self::with_parts(
            config,
            Arc::new(WorkerLoader),
            Arc::new(fetcher),
            logger,
        ))
    }

    pub fn with_parts(
        config: &QuizConfig,
        loader: Arc<dyn EngineLoader>,
        fetcher: Arc<dyn ClipFetcher>,
        logger: QuizLogger,
    ) -> Self {
        let (status, _) = watch::channel(EngineStatus::Idle);
        Self {
            shared: Arc::new(EngineShared {
                status,
                worker: Mutex::new(None),
                loader,
                fetcher,
                store: BlobStore::new(),
                format: OutputFormat::new(config.sample_rate, config.channels),
                logger,
            }),
            init_timeout: config.init_timeout(),
        }
    }

    /// Override the bound on a single `Loading` attempt
    pub fn with_init_timeout(mut self, init_timeout: Duration) -> Self {
        self.init_timeout = init_timeout;
        self
    }

    pub fn state(&self) -> EngineState {
        self.shared.status.borrow().state()
    }

    pub fn output_format(&self) -> OutputFormat {
        self.shared.format
    }

    /// Error of the last failed attempt, if the engine is in `Error`
    pub fn last_error(&self) -> Option<TranscodeError> {
        match &*self.shared.status.borrow() {
            EngineStatus::Error(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Flip `Idle`/`Error` to `Loading`. Only one caller can win.
    fn begin_loading(&self) -> bool {
        let mut started = false;
        self.shared.status.send_if_modified(|status| match status {
            EngineStatus::Idle | EngineStatus::Error(_) => {
                *status = EngineStatus::Loading;
                started = true;
                true
            }
            _ => false,
        });
        started
    }

    fn spawn_load(&self) {
        let shared = Arc::clone(&self.shared);
        let init_timeout = self.init_timeout;
        shared.logger.log_engine_loading();

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = tokio::time::timeout(init_timeout, shared.loader.load(shared.format)).await;

            let status = match outcome {
                Ok(Ok(worker)) => {
                    match shared.worker.lock() {
                        Ok(mut slot) => *slot = Some(Arc::new(worker)),
                        Err(poisoned) => *poisoned.into_inner() = Some(Arc::new(worker)),
                    }
                    shared.logger.log_engine_ready(started.elapsed());
                    EngineStatus::Ready
                }
                Ok(Err(reason)) => {
                    shared.logger.log_engine_failed(&reason);
                    EngineStatus::Error(TranscodeError::InitFailed(reason))
                }
                Err(_) => {
                    let err = TranscodeError::InitTimeout { timeout: init_timeout };
                    shared.logger.log_engine_failed(&err.to_string());
                    EngineStatus::Error(err)
                }
            };

            shared.status.send_replace(status);
        });
    }

    fn ready_worker(&self, operation: &str) -> Result<Arc<TranscodeWorker>, TranscodeError> {
        if !self.is_ready() {
            return Err(TranscodeError::not_ready(operation));
        }
        let slot = match self.shared.worker.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.clone().ok_or_else(|| TranscodeError::not_ready(operation))
    }

    /// Map a worker failure, retiring the worker if its thread is gone so
    /// the next `init()` starts a fresh one
    fn worker_failure(
        &self,
        worker: &Arc<TranscodeWorker>,
        operation: &str,
        reason: FailureReason,
    ) -> TranscodeError {
        if worker.is_lost() {
            let retired = {
                let mut slot = match self.shared.worker.lock() {
                    Ok(slot) => slot,
                    Err(poisoned) => poisoned.into_inner(),
                };
                match slot.as_ref() {
                    Some(current) if Arc::ptr_eq(current, worker) => {
                        *slot = None;
                        true
                    }
                    _ => false,
                }
            };
            if retired {
                let message = format!("transcode worker stopped during {}: {}", operation, reason);
                self.shared.logger.log_engine_failed(&message);
                self.shared.status.send_if_modified(|status| {
                    if matches!(status, EngineStatus::Ready) {
                        *status = EngineStatus::Error(TranscodeError::InitFailed(message.clone()));
                        true
                    } else {
                        false
                    }
                });
            }
        }
        TranscodeError::operation(operation, reason)
    }

    async fn source_bytes(&self, source_url: &str) -> Result<Vec<u8>, FailureReason> {
        // Previously produced blobs can be re-fed without a round trip
        if let Some(data) = self.shared.store.get(source_url) {
            return Ok(data.bytes.clone());
        }
        self.shared.fetcher.fetch(source_url).await
    }

    fn register(&self, clip: EncodedClip) -> AudioBlob {
        self.shared
            .store
            .create(BlobData::new(clip.bytes, clip.duration, WAV_MIME))
    }
}

#[async_trait]
impl Transcoder for TranscodingEngine {
    async fn init(&self) -> Result<(), TranscodeError> {
        let mut status = self.shared.status.subscribe();
        let mut joined = false;

        loop {
            let current = status.borrow_and_update().clone();
            match current {
                EngineStatus::Ready => return Ok(()),
                EngineStatus::Loading => joined = true,
                EngineStatus::Error(err) if joined => return Err(err),
                EngineStatus::Idle | EngineStatus::Error(_) => {
                    if self.begin_loading() {
                        self.spawn_load();
                    }
                    joined = true;
                    continue;
                }
            }

            if status.changed().await.is_err() {
                return Err(TranscodeError::InitFailed("transcoding engine was dropped".to_string()));
            }
        }
    }

    async fn mp3_to_wav(
        &self,
        source_url: &str,
        options: TranscodeOptions,
    ) -> Result<AudioBlob, TranscodeError> {
        const OP: &str = "mp3_to_wav";
        let worker = self.ready_worker(OP)?;
        let timer = OperationTimer::new(format!("{} {}", OP, source_url));

        let input = self
            .source_bytes(source_url)
            .await
            .map_err(|reason| TranscodeError::operation(OP, reason))?;
        let clip = worker
            .transcode(input, extension_hint(source_url), options.tail())
            .await
            .map_err(|reason| self.worker_failure(&worker, OP, reason))?;

        let blob = self.register(clip);
        let took = timer.finish();
        self.shared.logger.log_clip_transcoded(source_url, blob.url(), took);
        if took > SLOW_TRANSCODE {
            self.shared.logger.log_performance_warning(OP, took, SLOW_TRANSCODE);
        }
        Ok(blob)
    }

    async fn generate_silence(&self, duration: Duration) -> Result<AudioBlob, TranscodeError> {
        const OP: &str = "generate_silence";
        let worker = self.ready_worker(OP)?;
        let clip = crate::time_operation!(OP, { worker.silence(duration).await })
            .map_err(|reason| self.worker_failure(&worker, OP, reason))?;
        Ok(self.register(clip))
    }

    async fn concatenate_audio(&self, blobs: &[AudioBlob]) -> Result<AudioBlob, TranscodeError> {
        const OP: &str = "concatenate_audio";
        let worker = self.ready_worker(OP)?;

        let mut inputs = Vec::with_capacity(blobs.len());
        for blob in blobs {
            let data = blob.data().ok_or_else(|| {
                TranscodeError::operation(
                    OP,
                    FailureReason::Fetch(format!("{} has been disposed", blob.url())),
                )
            })?;
            inputs.push(data.bytes.clone());
        }

        let clip = crate::time_operation_with_threshold!(OP, SLOW_TRANSCODE, {
            worker.concatenate(inputs).await
        })
        .map_err(|reason| self.worker_failure(&worker, OP, reason))?;
        Ok(self.register(clip))
    }

    fn is_ready(&self) -> bool {
        matches!(*self.shared.status.borrow(), EngineStatus::Ready)
    }

    fn blob_store(&self) -> Arc<BlobStore> {
        Arc::clone(&self.shared.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::PcmClip;
    use crate::testing::{CountingLoader, FailingLoader, HangingLoader, LosingLoader, MemoryFetcher};

    fn test_config() -> QuizConfig {
        QuizConfig {
            sample_rate: 8_000,
            ..QuizConfig::default()
        }
    }

    fn engine_with(loader: Arc<dyn EngineLoader>, fetcher: MemoryFetcher, timeout: Duration) -> TranscodingEngine {
        TranscodingEngine::with_parts(&test_config(), loader, Arc::new(fetcher), QuizLogger::new())
            .with_init_timeout(timeout)
    }

    fn wav_bytes(ms: u64, sample_rate: u32) -> Vec<u8> {
        let frames = (sample_rate as u64 * ms / 1000) as usize;
        PcmClip::new(vec![0.3; frames], OutputFormat::new(sample_rate, 1))
            .to_wav_bytes()
            .unwrap()
    }

    #[tokio::test]
    async fn test_starts_idle_and_rejects_calls() {
        let engine = engine_with(Arc::new(CountingLoader::new()), MemoryFetcher::new(), Duration::from_secs(5));
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(!engine.is_ready());

        match engine.generate_silence(Duration::from_secs(1)).await {
            Err(TranscodeError::OperationFailed { operation, reason: FailureReason::NotReady }) => {
                assert_eq!(operation, "generate_silence");
            }
            other => panic!("expected NotReady, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_init_loads_once() {
        let loader = Arc::new(CountingLoader::new());
        let engine = engine_with(loader.clone(), MemoryFetcher::new(), Duration::from_secs(5));

        let (a, b, c) = tokio::join!(engine.init(), engine.init(), engine.init());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(loader.calls(), 1);
        assert_eq!(engine.state(), EngineState::Ready);

        engine.init().await.unwrap();
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn test_init_timeout_then_retry() {
        let loader = Arc::new(HangingLoader::new());
        let engine = engine_with(loader.clone(), MemoryFetcher::new(), Duration::from_millis(50));

        match engine.init().await {
            Err(TranscodeError::InitTimeout { timeout }) => assert_eq!(timeout, Duration::from_millis(50)),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(engine.state(), EngineState::Error);
        assert!(engine.last_error().is_some());

        assert!(engine.init().await.is_err());
        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test]
    async fn test_loader_failure_is_init_failed() {
        let engine = engine_with(Arc::new(FailingLoader), MemoryFetcher::new(), Duration::from_secs(5));
        assert!(matches!(engine.init().await, Err(TranscodeError::InitFailed(_))));
        assert_eq!(engine.state(), EngineState::Error);
    }

    #[tokio::test]
    async fn test_mp3_to_wav_pads_tail() {
        let fetcher = MemoryFetcher::new().with("clips/hola.wav", wav_bytes(1_000, 16_000));
        let engine = engine_with(Arc::new(CountingLoader::new()), fetcher, Duration::from_secs(5));
        engine.init().await.unwrap();
        assert_eq!(engine.output_format(), OutputFormat::new(8_000, 1));

        let blob = engine
            .mp3_to_wav("clips/hola.wav", TranscodeOptions::with_tail(0.5))
            .await
            .unwrap();

        let secs = blob.duration().as_secs_f64();
        assert!((secs - 1.5).abs() < 0.01, "got {}s", secs);

        let data = blob.data().unwrap();
        assert_eq!(data.mime, WAV_MIME);
        let decoded = PcmClip::from_wav_bytes(&data.bytes).unwrap();
        assert_eq!(decoded.format(), OutputFormat::new(8_000, 1));
        assert_eq!(engine.blob_store().live_count(), 1);
    }

    #[tokio::test]
    async fn test_unfetchable_source_fails() {
        let engine = engine_with(Arc::new(CountingLoader::new()), MemoryFetcher::new(), Duration::from_secs(5));
        engine.init().await.unwrap();

        match engine.mp3_to_wav("missing.mp3", TranscodeOptions::default()).await {
            Err(TranscodeError::OperationFailed { reason: FailureReason::Fetch(_), .. }) => {}
            other => panic!("expected fetch failure, got {:?}", other),
        }
        assert_eq!(engine.blob_store().live_count(), 0);
    }

    #[tokio::test]
    async fn test_concatenate_leaves_inputs_alive() {
        let engine = engine_with(Arc::new(CountingLoader::new()), MemoryFetcher::new(), Duration::from_secs(5));
        engine.init().await.unwrap();

        let a = engine.generate_silence(Duration::from_millis(250)).await.unwrap();
        let b = engine.generate_silence(Duration::from_millis(750)).await.unwrap();
        let joined = engine.concatenate_audio(&[a.clone(), b.clone()]).await.unwrap();

        assert_eq!(joined.duration(), Duration::from_secs(1));
        assert!(!a.is_disposed() && !b.is_disposed());
        assert_eq!(engine.blob_store().live_count(), 3);
    }

    #[tokio::test]
    async fn test_concatenate_rejects_disposed_input() {
        let engine = engine_with(Arc::new(CountingLoader::new()), MemoryFetcher::new(), Duration::from_secs(5));
        engine.init().await.unwrap();

        let a = engine.generate_silence(Duration::from_millis(100)).await.unwrap();
        a.dispose();
        assert!(matches!(
            engine.concatenate_audio(&[a]).await,
            Err(TranscodeError::OperationFailed { reason: FailureReason::Fetch(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_blob_url_can_be_transcoded_again() {
        let engine = engine_with(Arc::new(CountingLoader::new()), MemoryFetcher::new(), Duration::from_secs(5));
        engine.init().await.unwrap();

        let silence = engine.generate_silence(Duration::from_millis(500)).await.unwrap();
        let padded = engine
            .mp3_to_wav(silence.url(), TranscodeOptions::with_tail(0.5))
            .await
            .unwrap();
        assert_eq!(padded.duration(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_lost_worker_moves_engine_to_error_and_reloads() {
        let loader = Arc::new(LosingLoader::new());
        let engine = engine_with(loader.clone(), MemoryFetcher::new(), Duration::from_secs(5));
        engine.init().await.unwrap();

        match engine.generate_silence(Duration::from_secs(1)).await {
            Err(TranscodeError::OperationFailed { reason: FailureReason::Worker(_), .. }) => {}
            other => panic!("expected worker failure, got {:?}", other),
        }
        assert_eq!(engine.state(), EngineState::Error);
        assert!(matches!(engine.last_error(), Some(TranscodeError::InitFailed(_))));
        assert!(matches!(
            engine.generate_silence(Duration::from_secs(1)).await,
            Err(TranscodeError::OperationFailed { reason: FailureReason::NotReady, .. })
        ));

        engine.init().await.unwrap();
        assert_eq!(loader.calls(), 2);
        let silence = engine.generate_silence(Duration::from_secs(1)).await.unwrap();
        assert_eq!(silence.duration(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_oversized_silence_leaves_engine_ready() {
        let engine = engine_with(Arc::new(CountingLoader::new()), MemoryFetcher::new(), Duration::from_secs(5));
        engine.init().await.unwrap();

        assert!(matches!(
            engine.generate_silence(Duration::from_secs(1 << 62)).await,
            Err(TranscodeError::OperationFailed { reason: FailureReason::Encode(_), .. })
        ));
        assert_eq!(engine.state(), EngineState::Ready);
        assert!(engine.generate_silence(Duration::from_secs(1)).await.is_ok());
        assert_eq!(engine.blob_store().live_count(), 1);
    }
}
