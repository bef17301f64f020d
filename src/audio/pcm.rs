use std::io::Cursor;
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::FailureReason;

pub const WAV_MIME: &str = "audio/wav";

/// Longest stretch of silence a single call may generate
pub const MAX_GENERATED: Duration = Duration::from_secs(120);

/// Seconds from config or the command line as a `Duration`. Non-finite and
/// non-positive values are zero; values beyond `Duration`'s range saturate.
pub fn secs_to_duration(secs: f64) -> Duration {
    if !(secs.is_finite() && secs > 0.0) {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Sample layout every clip produced by the transcoder shares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl OutputFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self { sample_rate, channels }
    }

    fn frames_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.sample_rate as f64).round() as usize
    }

    /// Interleaved sample count for generated silence, refusing anything over `MAX_GENERATED`
    fn silence_samples(&self, duration: Duration) -> Result<usize, FailureReason> {
        if duration > MAX_GENERATED {
            return Err(FailureReason::Encode(format!(
                "{:.1}s of silence exceeds the {}s limit",
                duration.as_secs_f64(),
                MAX_GENERATED.as_secs()
            )));
        }
        Ok(self.frames_for(duration) * self.channels as usize)
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(44_100, 1)
    }
}

/// Interleaved f32 samples plus their format
#[derive(Debug, Clone, PartialEq)]
pub struct PcmClip {
    samples: Vec<f32>,
    format: OutputFormat,
}

impl PcmClip {
    pub fn new(samples: Vec<f32>, format: OutputFormat) -> Self {
        Self { samples, format }
    }

    pub fn silence(duration: Duration, format: OutputFormat) -> Result<Self, FailureReason> {
        let len = format.silence_samples(duration)?;
        Ok(Self::new(vec![0.0; len], format))
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn frames(&self) -> usize {
        if self.format.channels == 0 {
            return 0;
        }
        self.samples.len() / self.format.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.format.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append `tail` of silence
    pub fn with_tail(mut self, tail: Duration) -> Result<Self, FailureReason> {
        let extra = self.format.silence_samples(tail)?;
        self.samples.resize(self.samples.len() + extra, 0.0);
        Ok(self)
    }

    /// Join clips in order; every clip must share `format`
    pub fn concat(clips: &[PcmClip], format: OutputFormat) -> Result<PcmClip, FailureReason> {
        let total = clips.iter().map(|clip| clip.samples.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for (index, clip) in clips.iter().enumerate() {
            if clip.format != format {
                return Err(FailureReason::Encode(format!(
                    "clip {} is {} Hz/{} ch, expected {} Hz/{} ch",
                    index,
                    clip.format.sample_rate,
                    clip.format.channels,
                    format.sample_rate,
                    format.channels
                )));
            }
            samples.extend_from_slice(&clip.samples);
        }
        Ok(PcmClip::new(samples, format))
    }

    /// Encode as 16-bit PCM WAV
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, FailureReason> {
        let spec = WavSpec {
            channels: self.format.channels,
            sample_rate: self.format.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut bytes = Vec::with_capacity(44 + self.samples.len() * 2);
        {
            let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec)
                .map_err(|e| FailureReason::Encode(e.to_string()))?;
            for &sample in &self.samples {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer
                    .write_sample(value)
                    .map_err(|e| FailureReason::Encode(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| FailureReason::Encode(e.to_string()))?;
        }
        Ok(bytes)
    }

    /// Decode any integer or float WAV back to f32 samples
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<PcmClip, FailureReason> {
        let reader = WavReader::new(Cursor::new(bytes))
            .map_err(|e| FailureReason::Decode(e.to_string()))?;
        let spec = reader.spec();
        let format = OutputFormat::new(spec.sample_rate, spec.channels);

        let samples = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| FailureReason::Decode(e.to_string()))?,
            SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| FailureReason::Decode(e.to_string()))?
            }
        };

        Ok(PcmClip::new(samples, format))
    }
}
