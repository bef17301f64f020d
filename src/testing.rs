//! Test doubles shared by unit and integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::audio::engine::{EngineLoader, WorkerLoader};
use crate::audio::fetch::ClipFetcher;
use crate::audio::pcm::OutputFormat;
use crate::audio::worker::TranscodeWorker;
use crate::audio::{AudioBlob, BlobData, BlobStore, TranscodeOptions, Transcoder};
use crate::error::{FailureReason, TranscodeError};
use crate::models::ExampleRecord;

/// Loader that starts a real worker and counts invocations
#[derive(Default)]
pub struct CountingLoader {
    calls: AtomicUsize,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for CountingLoader {
    async fn load(&self, format: OutputFormat) -> Result<TranscodeWorker, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up on the same attempt
        tokio::time::sleep(Duration::from_millis(20)).await;
        WorkerLoader.load(format).await
    }
}

/// Loader that never finishes
#[derive(Default)]
pub struct HangingLoader {
    calls: AtomicUsize,
}

impl HangingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for HangingLoader {
    async fn load(&self, _format: OutputFormat) -> Result<TranscodeWorker, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        futures::future::pending().await
    }
}

/// First load hands out a worker whose thread is already gone, later loads start a real one
#[derive(Default)]
pub struct LosingLoader {
    calls: AtomicUsize,
}

impl LosingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for LosingLoader {
    async fn load(&self, format: OutputFormat) -> Result<TranscodeWorker, String> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(TranscodeWorker::detached(format));
        }
        WorkerLoader.load(format).await
    }
}

pub struct FailingLoader;

#[async_trait]
impl EngineLoader for FailingLoader {
    async fn load(&self, _format: OutputFormat) -> Result<TranscodeWorker, String> {
        Err("runtime download was corrupted".to_string())
    }
}

/// Fetcher serving bytes from a map
#[derive(Default)]
pub struct MemoryFetcher {
    sources: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.sources.insert(url.to_string(), bytes);
        self
    }
}

#[async_trait]
impl ClipFetcher for MemoryFetcher {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>, FailureReason> {
        self.sources
            .get(source)
            .cloned()
            .ok_or_else(|| FailureReason::Fetch(format!("{} not found", source)))
    }
}

/// Transcoder that echoes its inputs into blobs.
///
/// `mp3_to_wav` stores the source URL as the blob bytes and reports one second
/// plus the tail. Failures can be injected per source URL.
pub struct EchoTranscoder {
    store: Arc<BlobStore>,
    ready: AtomicBool,
    init_calls: AtomicUsize,
    mp3_calls: AtomicUsize,
    silence_calls: AtomicUsize,
    concat_calls: AtomicUsize,
    failing_sources: Mutex<HashSet<String>>,
    fail_silence: AtomicBool,
    delay: Duration,
}

impl Default for EchoTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoTranscoder {
    pub const CLIP_LENGTH: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            store: BlobStore::new(),
            ready: AtomicBool::new(false),
            init_calls: AtomicUsize::new(0),
            mp3_calls: AtomicUsize::new(0),
            silence_calls: AtomicUsize::new(0),
            concat_calls: AtomicUsize::new(0),
            failing_sources: Mutex::new(HashSet::new()),
            fail_silence: AtomicBool::new(false),
            delay: Duration::ZERO,
        }
    }

    /// Delay every media call, to simulate in-flight work
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_source(&self, url: &str) {
        if let Ok(mut failing) = self.failing_sources.lock() {
            failing.insert(url.to_string());
        }
    }

    pub fn fail_silence(&self) {
        self.fail_silence.store(true, Ordering::SeqCst);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn mp3_calls(&self) -> usize {
        self.mp3_calls.load(Ordering::SeqCst)
    }

    pub fn silence_calls(&self) -> usize {
        self.silence_calls.load(Ordering::SeqCst)
    }

    pub fn concat_calls(&self) -> usize {
        self.concat_calls.load(Ordering::SeqCst)
    }

    pub fn live_blobs(&self) -> usize {
        self.store.live_count()
    }

    /// What a blob produced by this transcoder echoes
    pub fn echo_of(&self, url: &str) -> Option<String> {
        self.store
            .get(url)
            .map(|data| String::from_utf8_lossy(&data.bytes).into_owned())
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn check_ready(&self, operation: &str) -> Result<(), TranscodeError> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TranscodeError::not_ready(operation))
        }
    }
}

#[async_trait]
impl Transcoder for EchoTranscoder {
    async fn init(&self) -> Result<(), TranscodeError> {
        if !self.ready.swap(true, Ordering::SeqCst) {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn mp3_to_wav(
        &self,
        source_url: &str,
        options: TranscodeOptions,
    ) -> Result<AudioBlob, TranscodeError> {
        self.check_ready("mp3_to_wav")?;
        self.mp3_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let failing = self
            .failing_sources
            .lock()
            .map(|failing| failing.contains(source_url))
            .unwrap_or(false);
        if failing {
            return Err(TranscodeError::operation(
                "mp3_to_wav",
                FailureReason::Fetch(format!("{} unreachable", source_url)),
            ));
        }

        Ok(self.store.create(BlobData::new(
            source_url.as_bytes().to_vec(),
            Self::CLIP_LENGTH + options.tail(),
            "text/plain",
        )))
    }

    async fn generate_silence(&self, duration: Duration) -> Result<AudioBlob, TranscodeError> {
        self.check_ready("generate_silence")?;
        self.silence_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if self.fail_silence.load(Ordering::SeqCst) {
            return Err(TranscodeError::operation(
                "generate_silence",
                FailureReason::Encode("silence disabled".to_string()),
            ));
        }

        Ok(self.store.create(BlobData::new(
            format!("silence:{}ms", duration.as_millis()).into_bytes(),
            duration,
            "text/plain",
        )))
    }

    async fn concatenate_audio(&self, blobs: &[AudioBlob]) -> Result<AudioBlob, TranscodeError> {
        self.check_ready("concatenate_audio")?;
        self.concat_calls.fetch_add(1, Ordering::SeqCst);

        let mut parts = Vec::with_capacity(blobs.len());
        let mut total = Duration::ZERO;
        for blob in blobs {
            let data = blob.data().ok_or_else(|| {
                TranscodeError::operation(
                    "concatenate_audio",
                    FailureReason::Fetch(format!("{} has been disposed", blob.url())),
                )
            })?;
            parts.push(String::from_utf8_lossy(&data.bytes).into_owned());
            total += data.duration;
        }

        Ok(self.store.create(BlobData::new(parts.join("+").into_bytes(), total, "text/plain")))
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn blob_store(&self) -> Arc<BlobStore> {
        Arc::clone(&self.store)
    }
}

/// The canonical greeting example
pub fn hola_record() -> ExampleRecord {
    ExampleRecord::new(1, "Hola", "Hello", "a.mp3", "b.mp3")
}

/// `count` distinct examples with ids starting at 1
pub fn sample_records(count: usize) -> Vec<ExampleRecord> {
    (1..=count as i64)
        .map(|id| {
            ExampleRecord::new(
                id,
                format!("frase {}", id),
                format!("sentence {}", id),
                format!("es/{}.mp3", id),
                format!("en/{}.mp3", id),
            )
        })
        .collect()
}
