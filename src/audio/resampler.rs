/*!
Streaming linear resampler and channel mapper for interleaved f32 audio.

Every clip the transcoder emits shares one `OutputFormat`, so decoded clips are
passed through `conform()` before silence is appended. That keeps concatenation a
plain sample append.

```ignore
use crate::audio::resampler::conform;

let normalized = conform(decoded_clip, OutputFormat::new(44_100, 1));
```
*/

use crate::audio::pcm::{OutputFormat, PcmClip};

#[derive(Debug, Clone)]
pub struct LinearResampler {
    src_rate: u32,
    dst_rate: u32,
    channels: usize,

    // source frames consumed per output frame (src/dst)
    step: f64,

    // position relative to `prev_frame`, which is prepended to the next block
    pos: f64,
    prev_frame: Vec<f32>,
}

impl LinearResampler {
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize) -> Self {
        let step = if dst_rate == 0 { 0.0 } else { src_rate as f64 / dst_rate as f64 };
        Self {
            src_rate,
            dst_rate,
            channels,
            step,
            pos: 0.0,
            prev_frame: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.prev_frame.clear();
    }

    pub fn config(&self) -> (u32, u32, usize) {
        (self.src_rate, self.dst_rate, self.channels)
    }

    /// Resample one block, keeping phase across calls so chunk boundaries stay continuous.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.channels == 0 || self.dst_rate == 0 || self.src_rate == 0 {
            return Vec::new();
        }

        let ch = self.channels;
        let in_frames = input.len() / ch;
        if in_frames == 0 {
            return Vec::new();
        }

        let mut work = Vec::with_capacity((in_frames + 1) * ch);
        if self.prev_frame.len() == ch {
            work.extend_from_slice(&self.prev_frame);
        } else {
            // First block: hold the first frame instead of ramping up from zero
            work.extend_from_slice(&input[..ch]);
        }
        work.extend_from_slice(&input[..in_frames * ch]);

        let total_frames = work.len() / ch;
        let expected_out_frames =
            ((in_frames as f64) * (self.dst_rate as f64 / self.src_rate as f64)).ceil() as usize + 4;
        let mut out = Vec::with_capacity(expected_out_frames * ch);

        // Every position in [i, i + 1) with i + 1 inside `work` is interpolated here,
        // so the leftover after rebasing is never negative
        let last = total_frames as f64 - 1.0;
        while self.pos < last {
            let i = self.pos.floor() as usize;
            let frac = (self.pos - i as f64) as f32;
            let base0 = i * ch;
            let base1 = (i + 1) * ch;

            out.extend((0..ch).map(|c| {
                let s0 = work[base0 + c];
                let s1 = work[base1 + c];
                s0 + (s1 - s0) * frac
            }));

            self.pos += self.step;
        }

        let last_base = (total_frames - 1) * ch;
        self.prev_frame.clear();
        self.prev_frame.extend_from_slice(&work[last_base..last_base + ch]);
        self.pos -= last;

        out
    }
}

/// Map interleaved frames from `from` channels to `to` channels.
/// Downmixing averages, upmixing from mono duplicates, other layouts truncate or pad.
pub fn remap_channels(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else if to < from {
            out.extend_from_slice(&frame[..to]);
        } else {
            out.extend_from_slice(frame);
            out.extend(std::iter::repeat(0.0).take(to - from));
        }
    }
    out
}

/// Bring a decoded clip to the engine's output format
pub fn conform(clip: PcmClip, target: OutputFormat) -> PcmClip {
    let source = clip.format();
    if source == target {
        return clip;
    }

    let remapped = remap_channels(
        clip.samples(),
        source.channels as usize,
        target.channels as usize,
    );

    let samples = if source.sample_rate == target.sample_rate {
        remapped
    } else {
        let mut resampler = LinearResampler::new(
            source.sample_rate,
            target.sample_rate,
            target.channels as usize,
        );
        resampler.process(&remapped)
    };

    PcmClip::new(samples, target)
}
