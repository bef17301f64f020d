use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use tokio::sync::oneshot;

use crate::audio::blob::AudioBlob;
use crate::audio::pcm::{OutputFormat, PcmClip};
use crate::audio::resampler::conform;
use crate::error::PlaybackError;

/// Plays one clip to completion.
///
/// The returned future resolves when the clip has ended. Dropping it stops
/// playback, which is how pause and navigation cut a clip short.
#[async_trait]
pub trait ClipPlayer: Send + Sync {
    async fn play(&self, blob: &AudioBlob) -> Result<(), PlaybackError>;
}

/// Plays clips on a cpal output device
pub struct DevicePlayer {
    preferred_device: Option<String>,
    volume: f32,
}

impl DevicePlayer {
    pub fn new(preferred_device: Option<String>) -> Self {
        Self {
            preferred_device,
            volume: 1.0,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    /// Names of the output devices the host reports
    pub fn list_devices() -> Result<Vec<String>, PlaybackError> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| PlaybackError::Device(format!("Failed to enumerate devices: {}", e)))?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }
}

#[async_trait]
impl ClipPlayer for DevicePlayer {
    async fn play(&self, blob: &AudioBlob) -> Result<(), PlaybackError> {
        let data = blob.data().ok_or_else(|| PlaybackError::MissingMedia {
            url: blob.url().to_string(),
        })?;
        let clip = PcmClip::from_wav_bytes(&data.bytes)
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        let (done_tx, done_rx) = oneshot::channel();
        let stop = StopOnDrop(Arc::new(AtomicBool::new(false)));
        let stop_flag = Arc::clone(&stop.0);
        let preferred = self.preferred_device.clone();
        let volume = self.volume;

        // cpal streams are not Send, so each clip owns an output thread
        thread::Builder::new()
            .name("clip-output".to_string())
            .spawn(move || {
                let result = play_blocking(clip, preferred.as_deref(), volume, &stop_flag);
                let _ = done_tx.send(result);
            })
            .map_err(|e| PlaybackError::Device(format!("Failed to start output thread: {}", e)))?;

        let result = done_rx
            .await
            .map_err(|_| PlaybackError::Stream("output thread exited early".to_string()))?;
        drop(stop);
        result
    }
}

struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn select_device(preferred: Option<&str>) -> Result<Device, PlaybackError> {
    let host = cpal::default_host();

    if let Some(name) = preferred {
        let found = host
            .output_devices()
            .map_err(|e| PlaybackError::Device(format!("Failed to enumerate devices: {}", e)))?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false));
        match found {
            Some(device) => return Ok(device),
            None => log::warn!("Output device '{}' not found, using the default device", name),
        }
    }

    host.default_output_device()
        .ok_or_else(|| PlaybackError::Device("No default output device available".to_string()))
}

fn play_blocking(
    clip: PcmClip,
    preferred: Option<&str>,
    volume: f32,
    stop: &AtomicBool,
) -> Result<(), PlaybackError> {
    let device = select_device(preferred)?;
    let default_config = device
        .default_output_config()
        .map_err(|e| PlaybackError::Device(format!("Failed to get default config: {}", e)))?;
    let config: StreamConfig = default_config.config();

    let target = OutputFormat::new(config.sample_rate.0, config.channels);
    let samples = Arc::new(conform(clip, target).into_samples());
    let total = samples.len();
    let position = Arc::new(AtomicUsize::new(0));

    let stream = match default_config.sample_format() {
        SampleFormat::F32 => create_stream::<f32>(&device, &config, &samples, &position, volume)?,
        SampleFormat::I16 => create_stream::<i16>(&device, &config, &samples, &position, volume)?,
        SampleFormat::U16 => create_stream::<u16>(&device, &config, &samples, &position, volume)?,
        sample_format => {
            return Err(PlaybackError::Device(format!(
                "Unsupported sample format: {:?}",
                sample_format
            )));
        }
    };

    stream
        .play()
        .map_err(|e| PlaybackError::Stream(format!("Failed to start stream: {}", e)))?;

    while position.load(Ordering::Relaxed) < total {
        if stop.load(Ordering::Relaxed) {
            log::debug!("Clip stopped early");
            return Ok(());
        }
        thread::sleep(Duration::from_millis(10));
    }

    // Let the device drain its last buffer
    thread::sleep(Duration::from_millis(50));
    Ok(())
}

fn create_stream<T>(
    device: &Device,
    config: &StreamConfig,
    samples: &Arc<Vec<f32>>,
    position: &Arc<AtomicUsize>,
    volume: f32,
) -> Result<Stream, PlaybackError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    T: cpal::FromSample<f32>,
{
    let samples = Arc::clone(samples);
    let position = Arc::clone(position);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let start = position.load(Ordering::Relaxed);
                for (i, sample) in data.iter_mut().enumerate() {
                    let value = samples.get(start + i).copied().unwrap_or(0.0);
                    *sample = cpal::Sample::from_sample(value * volume);
                }
                position.store((start + data.len()).min(samples.len()), Ordering::Relaxed);
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| PlaybackError::Stream(format!("Failed to build stream: {}", e)))
}

/// Waits out each clip's duration instead of producing sound.
///
/// Used for silent runs and in tests; records the URLs it was asked to play.
pub struct TimedPlayer {
    speed: f64,
    history: Mutex<Vec<String>>,
}

impl TimedPlayer {
    pub fn new(speed: f64) -> Self {
        let speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
        Self {
            speed,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }
}

impl Default for TimedPlayer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl ClipPlayer for TimedPlayer {
    async fn play(&self, blob: &AudioBlob) -> Result<(), PlaybackError> {
        if blob.is_disposed() {
            return Err(PlaybackError::MissingMedia {
                url: blob.url().to_string(),
            });
        }
        if let Ok(mut history) = self.history.lock() {
            history.push(blob.url().to_string());
        }
        tokio::time::sleep(blob.duration().div_f64(self.speed)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::blob::{BlobData, BlobStore};
    use std::time::Instant;

    #[tokio::test]
    async fn test_timed_player_waits_scaled_duration() {
        let store = BlobStore::new();
        let blob = store.create(BlobData::new(vec![0], Duration::from_millis(400), "audio/wav"));
        let player = TimedPlayer::new(4.0);

        let started = Instant::now();
        player.play(&blob).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(400));
        assert_eq!(player.played(), vec![blob.url().to_string()]);
    }

    #[tokio::test]
    async fn test_timed_player_rejects_disposed_blob() {
        let store = BlobStore::new();
        let blob = store.create(BlobData::new(vec![0], Duration::from_millis(10), "audio/wav"));
        blob.dispose();

        match TimedPlayer::default().play(&blob).await {
            Err(PlaybackError::MissingMedia { url }) => assert_eq!(url, blob.url()),
            other => panic!("expected missing media, got {:?}", other),
        }
    }

    #[test]
    fn test_timed_player_sanitizes_speed() {
        assert_eq!(TimedPlayer::new(0.0).speed, 1.0);
        assert_eq!(TimedPlayer::new(f64::NAN).speed, 1.0);
        assert_eq!(TimedPlayer::new(2.0).speed, 2.0);
    }

    #[tokio::test]
    async fn test_device_player_rejects_disposed_blob() {
        let store = BlobStore::new();
        let blob = store.create(BlobData::new(vec![0], Duration::from_millis(10), "audio/wav"));
        blob.dispose();

        let result = DevicePlayer::new(None).play(&blob).await;
        assert!(matches!(result, Err(PlaybackError::MissingMedia { .. })));
    }
}
