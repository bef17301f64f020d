use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::pcm::{OutputFormat, PcmClip};
use crate::error::FailureReason;

/// Decode a compressed clip (MP3, AAC, OGG, FLAC, WAV...) held in memory.
/// `extension` is only a probe hint.
pub fn decode_bytes(data: Vec<u8>, extension: Option<&str>) -> Result<PcmClip, FailureReason> {
    let media_source = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| FailureReason::Decode(format!("probe: {}", e)))?;

    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| FailureReason::Decode("no audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| FailureReason::Decode(format!("codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(FailureReason::Decode(format!("packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping corrupt audio frame: {}", e);
                continue;
            }
            Err(e) => return Err(FailureReason::Decode(format!("decode: {}", e))),
        };

        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            continue;
        }

        // Some containers only report the layout once the first frame decodes
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }
        if channels == 0 {
            channels = spec.channels.count() as u16;
        }

        let mut sample_buf = SampleBuffer::<f32>::new(frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(FailureReason::Decode("no audio samples decoded".to_string()));
    }

    Ok(PcmClip::new(samples, OutputFormat::new(sample_rate, channels)))
}

/// Warm symphonia's lazily built probe and codec registries
pub fn warm_registries() -> usize {
    let _ = symphonia::default::get_probe();
    let codecs = symphonia::default::get_codecs();
    [
        symphonia::core::codecs::CODEC_TYPE_MP3,
        symphonia::core::codecs::CODEC_TYPE_AAC,
        symphonia::core::codecs::CODEC_TYPE_VORBIS,
        symphonia::core::codecs::CODEC_TYPE_FLAC,
        symphonia::core::codecs::CODEC_TYPE_PCM_S16LE,
    ]
    .iter()
    .filter(|codec| codecs.get_codec(**codec).is_some())
    .count()
}

/// Extension of a URL or path, lowercased, ignoring any query string
pub fn extension_hint(source: &str) -> Option<String> {
    let path = source.split(|c: char| c == '?' || c == '#').next().unwrap_or(source);
    let file_name = path.rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_decode_wav_bytes() {
        let format = OutputFormat::new(16_000, 1);
        let clip = PcmClip::new(vec![0.25; 1_600], format);
        let bytes = clip.to_wav_bytes().unwrap();

        let decoded = decode_bytes(bytes, Some("wav")).unwrap();
        assert_eq!(decoded.format(), format);
        assert_eq!(decoded.frames(), 1_600);
    }

    #[test]
    fn test_decode_without_hint() {
        let clip = PcmClip::silence(Duration::from_millis(50), OutputFormat::new(8_000, 2)).unwrap();
        let decoded = decode_bytes(clip.to_wav_bytes().unwrap(), None).unwrap();
        assert_eq!(decoded.format().channels, 2);
    }

    #[test]
    fn test_decode_garbage_fails() {
        match decode_bytes(b"this is not audio at all".to_vec(), Some("mp3")) {
            Err(FailureReason::Decode(_)) => {}
            other => panic!("expected decode failure, got {:?}", other),
        }
    }

    #[test]
    fn test_registries_know_common_codecs() {
        assert!(warm_registries() >= 4);
    }

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_hint("https://cdn.example.com/a/b/Hola.MP3?sig=1"), Some("mp3".to_string()));
        assert_eq!(extension_hint("/tmp/clip.wav"), Some("wav".to_string()));
        assert_eq!(extension_hint("https://cdn.example.com/audio"), None);
        assert_eq!(extension_hint("blob:audio-quiz/3"), None);
    }
}
