pub mod blob;
pub mod decode;
pub mod device;
pub mod engine;
pub mod fetch;
pub mod pcm;
pub mod resampler;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TranscodeError;

pub use blob::{AudioBlob, BlobData, BlobStore};
pub use device::{ClipPlayer, DevicePlayer, TimedPlayer};
pub use engine::{EngineLoader, EngineState, TranscodingEngine, WorkerLoader};
pub use fetch::{ClipFetcher, SourceFetcher};
pub use pcm::{OutputFormat, PcmClip};
pub use resampler::LinearResampler;

/// Per-call options for `Transcoder::mp3_to_wav`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscodeOptions {
    /// Silence appended after the clip
    pub tail_sec: f64,
}

impl TranscodeOptions {
    pub fn with_tail(tail_sec: f64) -> Self {
        Self { tail_sec }
    }

    /// Tail as a duration, capped at `pcm::MAX_GENERATED`
    pub fn tail(&self) -> Duration {
        pcm::secs_to_duration(self.tail_sec).min(pcm::MAX_GENERATED)
    }
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self::with_tail(0.5)
    }
}

/// Narrow port in front of whatever performs media conversion.
///
/// Every media call fails fast with `FailureReason::NotReady` unless `init()`
/// has completed. Returned blobs belong to the caller.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Bring the engine up. Concurrent callers share a single attempt.
    async fn init(&self) -> Result<(), TranscodeError>;

    /// Fetch a compressed clip, convert it to the playback format and pad it with silence
    async fn mp3_to_wav(
        &self,
        source_url: &str,
        options: TranscodeOptions,
    ) -> Result<AudioBlob, TranscodeError>;

    async fn generate_silence(&self, duration: Duration) -> Result<AudioBlob, TranscodeError>;

    /// Join clips in order. Inputs are left untouched.
    async fn concatenate_audio(&self, blobs: &[AudioBlob]) -> Result<AudioBlob, TranscodeError>;

    fn is_ready(&self) -> bool;

    /// Store resolving the URLs this transcoder hands out
    fn blob_store(&self) -> Arc<BlobStore>;
}
