use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::audio::decode::{decode_bytes, warm_registries};
use crate::audio::pcm::{OutputFormat, PcmClip};
use crate::audio::resampler::conform;
use crate::error::FailureReason;

/// In-memory staging area for one worker call
#[derive(Debug, Default)]
pub struct ScratchFs {
    files: HashMap<String, Vec<u8>>,
}

impl ScratchFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, name: &str, bytes: Vec<u8>) {
        self.files.insert(name.to_string(), bytes);
    }

    pub fn read(&self, name: &str) -> Result<&[u8], FailureReason> {
        self.files
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| FailureReason::Worker(format!("scratch file '{}' missing", name)))
    }

    pub fn take(&mut self, name: &str) -> Result<Vec<u8>, FailureReason> {
        self.files
            .remove(name)
            .ok_or_else(|| FailureReason::Worker(format!("scratch file '{}' missing", name)))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Finished WAV plus its playing time
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedClip {
    pub bytes: Vec<u8>,
    pub duration: Duration,
}

type Reply = oneshot::Sender<Result<EncodedClip, FailureReason>>;

/// Requests processed by the worker thread
#[derive(Debug)]
pub enum WorkerRequest {
    Transcode {
        input: Vec<u8>,
        extension: Option<String>,
        tail: Duration,
        reply: Reply,
    },
    Silence {
        duration: Duration,
        reply: Reply,
    },
    Concatenate {
        inputs: Vec<Vec<u8>>,
        reply: Reply,
    },
    Shutdown,
}

/// Handle to the dedicated thread doing all media work
pub struct TranscodeWorker {
    sender: mpsc::UnboundedSender<WorkerRequest>,
    format: OutputFormat,
    lost: AtomicBool,
}

impl TranscodeWorker {
    /// Start the `transcode-worker` thread. The receiver resolves once the
    /// codec registries are warm, carrying the number of codecs found.
    pub fn spawn(format: OutputFormat) -> Result<(Self, oneshot::Receiver<usize>), FailureReason> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        thread::Builder::new()
            .name("transcode-worker".to_string())
            .spawn(move || run_worker(receiver, ready_tx, format))
            .map_err(|e| FailureReason::Worker(format!("failed to start worker thread: {}", e)))?;

        Ok((Self { sender, format, lost: AtomicBool::new(false) }, ready_rx))
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// True once a call found the thread gone. A lost worker never comes back.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst) || self.sender.is_closed()
    }

    pub async fn transcode(
        &self,
        input: Vec<u8>,
        extension: Option<String>,
        tail: Duration,
    ) -> Result<EncodedClip, FailureReason> {
        self.call(|reply| WorkerRequest::Transcode { input, extension, tail, reply })
            .await
    }

    pub async fn silence(&self, duration: Duration) -> Result<EncodedClip, FailureReason> {
        self.call(|reply| WorkerRequest::Silence { duration, reply }).await
    }

    pub async fn concatenate(&self, inputs: Vec<Vec<u8>>) -> Result<EncodedClip, FailureReason> {
        self.call(|reply| WorkerRequest::Concatenate { inputs, reply }).await
    }

    async fn call<F>(&self, build: F) -> Result<EncodedClip, FailureReason>
    where
        F: FnOnce(Reply) -> WorkerRequest,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.sender.send(build(reply_tx)).is_err() {
            return Err(self.mark_lost("worker thread has stopped"));
        }
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(self.mark_lost("worker dropped the request")),
        }
    }

    /// Handle whose thread has already gone away
    #[cfg(test)]
    pub(crate) fn detached(format: OutputFormat) -> Self {
        let (sender, _) = mpsc::unbounded_channel();
        Self { sender, format, lost: AtomicBool::new(false) }
    }

    fn mark_lost(&self, message: &str) -> FailureReason {
        self.lost.store(true, Ordering::SeqCst);
        FailureReason::Worker(message.to_string())
    }
}

impl Drop for TranscodeWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(WorkerRequest::Shutdown);
    }
}

fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<WorkerRequest>,
    ready: oneshot::Sender<usize>,
    format: OutputFormat,
) {
    let codecs = warm_registries();
    log::debug!("Transcode worker ready ({} codecs, {} Hz/{} ch)", codecs, format.sample_rate, format.channels);
    if ready.send(codecs).is_err() {
        // Loader gave up waiting
        return;
    }

    while let Some(request) = receiver.blocking_recv() {
        let mut scratch = ScratchFs::new();
        let (reply, result) = match request {
            WorkerRequest::Transcode { input, extension, tail, reply } => {
                let result = guarded("transcode", || {
                    transcode_clip(&mut scratch, input, extension.as_deref(), tail, format)
                });
                (reply, result)
            }
            WorkerRequest::Silence { duration, reply } => {
                (reply, guarded("silence", || silence_clip(&mut scratch, duration, format)))
            }
            WorkerRequest::Concatenate { inputs, reply } => {
                (reply, guarded("concatenate", || concat_clips(&mut scratch, inputs, format)))
            }
            WorkerRequest::Shutdown => break,
        };
        let _ = reply.send(result);
        scratch.clear();
    }

    log::debug!("Transcode worker stopped");
}

/// Run one request, turning a panic into a failed reply so the thread keeps serving
fn guarded<F>(request: &str, work: F) -> Result<EncodedClip, FailureReason>
where
    F: FnOnce() -> Result<EncodedClip, FailureReason>,
{
    panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!("Transcode worker {} request panicked: {}", request, message);
        Err(FailureReason::Worker(format!("{} request panicked: {}", request, message)))
    })
}

/// Decode, normalize and pad one compressed clip
pub fn transcode_clip(
    scratch: &mut ScratchFs,
    input: Vec<u8>,
    extension: Option<&str>,
    tail: Duration,
    format: OutputFormat,
) -> Result<EncodedClip, FailureReason> {
    let input_name = format!("input.{}", extension.unwrap_or("bin"));
    scratch.write(&input_name, input);

    let decoded = decode_bytes(scratch.take(&input_name)?, extension)?;
    let padded = conform(decoded, format).with_tail(tail)?;
    finish(scratch, padded)
}

pub fn silence_clip(
    scratch: &mut ScratchFs,
    duration: Duration,
    format: OutputFormat,
) -> Result<EncodedClip, FailureReason> {
    finish(scratch, PcmClip::silence(duration, format)?)
}

/// Join WAV inputs in order
pub fn concat_clips(
    scratch: &mut ScratchFs,
    inputs: Vec<Vec<u8>>,
    format: OutputFormat,
) -> Result<EncodedClip, FailureReason> {
    if inputs.is_empty() {
        return Err(FailureReason::Encode("nothing to concatenate".to_string()));
    }

    let names: Vec<String> = (0..inputs.len()).map(|i| format!("part{}.wav", i)).collect();
    for (name, bytes) in names.iter().zip(inputs) {
        scratch.write(name, bytes);
    }

    let mut clips = Vec::with_capacity(names.len());
    for name in &names {
        let clip = PcmClip::from_wav_bytes(scratch.read(name)?)?;
        clips.push(conform(clip, format));
    }

    finish(scratch, PcmClip::concat(&clips, format)?)
}

fn finish(scratch: &mut ScratchFs, clip: PcmClip) -> Result<EncodedClip, FailureReason> {
    let duration = clip.duration();
    scratch.write("output.wav", clip.to_wav_bytes()?);
    let bytes = scratch.take("output.wav")?;
    Ok(EncodedClip { bytes, duration })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav(duration_ms: u64, format: OutputFormat, level: f32) -> Vec<u8> {
        let frames = (format.sample_rate as u64 * duration_ms / 1000) as usize;
        PcmClip::new(vec![level; frames * format.channels as usize], format)
            .to_wav_bytes()
            .unwrap()
    }

    #[test]
    fn test_scratch_fs_basics() {
        let mut scratch = ScratchFs::new();
        scratch.write("a.wav", vec![1, 2]);
        assert_eq!(scratch.read("a.wav").unwrap(), &[1, 2]);
        assert_eq!(scratch.len(), 1);
        assert_eq!(scratch.take("a.wav").unwrap(), vec![1, 2]);
        assert!(scratch.is_empty());
        assert!(matches!(scratch.read("a.wav"), Err(FailureReason::Worker(_))));
    }

    #[test]
    fn test_transcode_appends_tail_and_normalizes() {
        let mut scratch = ScratchFs::new();
        let target = OutputFormat::new(16_000, 1);
        let source = wav(1_000, OutputFormat::new(8_000, 2), 0.5);

        let clip = transcode_clip(&mut scratch, source, Some("wav"), Duration::from_millis(500), target).unwrap();

        let secs = clip.duration.as_secs_f64();
        assert!((secs - 1.5).abs() < 0.01, "got {}s", secs);
        let decoded = PcmClip::from_wav_bytes(&clip.bytes).unwrap();
        assert_eq!(decoded.format(), target);
        assert!(scratch.is_empty());
    }

    #[test]
    fn test_transcode_rejects_undecodable_input() {
        let mut scratch = ScratchFs::new();
        let result = transcode_clip(
            &mut scratch,
            b"garbage".to_vec(),
            Some("mp3"),
            Duration::ZERO,
            OutputFormat::default(),
        );
        assert!(matches!(result, Err(FailureReason::Decode(_))));
    }

    #[test]
    fn test_silence_clip_duration() {
        let mut scratch = ScratchFs::new();
        let clip = silence_clip(&mut scratch, Duration::from_secs(3), OutputFormat::new(8_000, 1)).unwrap();
        assert_eq!(clip.duration, Duration::from_secs(3));
    }

    #[test]
    fn test_concat_sums_durations() {
        let mut scratch = ScratchFs::new();
        let format = OutputFormat::new(8_000, 1);
        let inputs = vec![wav(250, format, 0.1), wav(500, format, 0.2), wav(250, format, 0.3)];

        let clip = concat_clips(&mut scratch, inputs, format).unwrap();
        assert_eq!(clip.duration, Duration::from_secs(1));
    }

    #[test]
    fn test_concat_empty_fails() {
        let mut scratch = ScratchFs::new();
        assert!(matches!(
            concat_clips(&mut scratch, Vec::new(), OutputFormat::default()),
            Err(FailureReason::Encode(_))
        ));
    }

    #[test]
    fn test_guarded_turns_panic_into_failure() {
        let result = guarded("silence", || panic!("capacity overflow"));
        match result {
            Err(FailureReason::Worker(msg)) => {
                assert!(msg.contains("silence"));
                assert!(msg.contains("capacity overflow"));
            }
            other => panic!("expected worker failure, got {:?}", other),
        }

        let owned = guarded("concatenate", || panic!("{} frames", 12));
        assert!(matches!(owned, Err(FailureReason::Worker(msg)) if msg.contains("12 frames")));
    }

    #[tokio::test]
    async fn test_oversized_silence_fails_and_worker_keeps_serving() {
        let (worker, ready) = TranscodeWorker::spawn(OutputFormat::new(8_000, 1)).unwrap();
        ready.await.unwrap();

        let huge = worker.silence(Duration::from_secs(1 << 62)).await;
        assert!(matches!(huge, Err(FailureReason::Encode(_))));
        assert!(!worker.is_lost());

        let clip = worker.silence(Duration::from_secs(1)).await.unwrap();
        assert_eq!(clip.duration, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_detached_worker_reports_loss() {
        let worker = TranscodeWorker::detached(OutputFormat::default());
        assert!(matches!(
            worker.silence(Duration::from_millis(10)).await,
            Err(FailureReason::Worker(_))
        ));
        assert!(worker.is_lost());
    }

    #[tokio::test]
    async fn test_worker_thread_round_trip() {
        let format = OutputFormat::new(8_000, 1);
        let (worker, ready) = TranscodeWorker::spawn(format).unwrap();
        assert!(ready.await.unwrap() > 0);

        let silence = worker.silence(Duration::from_millis(500)).await.unwrap();
        assert_eq!(silence.duration, Duration::from_millis(500));

        let joined = worker
            .concatenate(vec![silence.bytes.clone(), silence.bytes])
            .await
            .unwrap();
        assert_eq!(joined.duration, Duration::from_secs(1));
    }
}
