use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::audio::{AudioBlob, TranscodeOptions, Transcoder};
use crate::config::QuizConfig;
use crate::error::{MappingError, TranscodeError};
use crate::logging::QuizLogger;
use crate::models::{
    AudioClip, AudioQuizExample, AudioQuizStep, AudioQuizType, ClipDuration, ExampleRecord,
    MappedExample,
};

/// Transcoder calls behind one mapped example
const CALLS_PER_EXAMPLE: u64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    spanish_audio: String,
    english_audio: String,
}

impl CacheKey {
    fn of(record: &ExampleRecord) -> Self {
        Self {
            spanish_audio: record.spanish_audio.clone(),
            english_audio: record.english_audio.clone(),
        }
    }
}

struct CacheEntry {
    key: CacheKey,
    mapped: MappedExample,
}

/// Cache counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapperStats {
    pub examples_mapped: u64,
    pub cache_hits: u64,
    pub evictions: u64,
    pub transcoder_calls_avoided: u64,
}

/// Turns example records into quiz-ready clips.
///
/// Each record costs two transcodes and one silence clip; both quiz variants
/// are assembled from that same media. Results are cached per example id and
/// audio URL pair for as long as the cached blobs stay live.
pub struct QuizMapper {
    transcoder: Arc<dyn Transcoder>,
    question_tail: TranscodeOptions,
    answer_tail: TranscodeOptions,
    guess_silence: Duration,
    cache: Mutex<HashMap<i64, CacheEntry>>,
    examples_mapped: AtomicU64,
    cache_hits: AtomicU64,
    evictions: AtomicU64,
    logger: QuizLogger,
}

impl QuizMapper {
    pub fn new(transcoder: Arc<dyn Transcoder>, config: &QuizConfig, logger: QuizLogger) -> Self {
        Self {
            transcoder,
            question_tail: TranscodeOptions::with_tail(config.question_tail_sec),
            answer_tail: TranscodeOptions::with_tail(config.answer_tail_sec),
            guess_silence: config.guess_silence(),
            cache: Mutex::new(HashMap::new()),
            examples_mapped: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            logger,
        }
    }

    pub async fn parse_example_for_quiz(
        &self,
        record: &ExampleRecord,
    ) -> Result<MappedExample, MappingError> {
        if let Some(hit) = self.cached(record) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            self.logger.log_cache_hit(record.id);
            return Ok(hit);
        }

        let mapped = self.map_fresh(record).await?;
        self.examples_mapped.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                record.id,
                CacheEntry {
                    key: CacheKey::of(record),
                    mapped: mapped.clone(),
                },
            );
        }

        Ok(mapped)
    }

    pub fn stats(&self) -> MapperStats {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        MapperStats {
            examples_mapped: self.examples_mapped.load(Ordering::Relaxed),
            cache_hits,
            evictions: self.evictions.load(Ordering::Relaxed),
            transcoder_calls_avoided: cache_hits * CALLS_PER_EXAMPLE,
        }
    }

    /// Drop every cache entry. Blobs stay with whoever received them.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn cached(&self, record: &ExampleRecord) -> Option<MappedExample> {
        let mut cache = self.cache.lock().ok()?;
        let entry = cache.get(&record.id)?;

        if entry.key == CacheKey::of(record) && entry.mapped.is_live() {
            return Some(entry.mapped.clone());
        }

        log::debug!("Evicting stale cache entry for example {}", record.id);
        cache.remove(&record.id);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn map_fresh(&self, record: &ExampleRecord) -> Result<MappedExample, MappingError> {
        let (spanish, english, guess) = tokio::join!(
            self.transcoder.mp3_to_wav(&record.spanish_audio, self.answer_tail),
            self.transcoder.mp3_to_wav(&record.english_audio, self.question_tail),
            self.transcoder.generate_silence(self.guess_silence),
        );

        let (spanish_clip, english_clip, guess_clip) = match (spanish, english, guess) {
            (Ok(spanish), Ok(english), Ok(guess)) => (spanish, english, guess),
            (spanish, english, guess) => {
                let error = first_error(&spanish, &english, &guess);
                for blob in [spanish, english, guess].into_iter().flatten() {
                    blob.dispose();
                }
                return Err(MappingError::MappingFailed {
                    example_id: record.id,
                    source: error,
                });
            }
        };

        let speaking = assemble(
            AudioQuizType::Speaking,
            record,
            &spanish_clip,
            &english_clip,
            &guess_clip,
        );
        let listening = assemble(
            AudioQuizType::Listening,
            record,
            &spanish_clip,
            &english_clip,
            &guess_clip,
        );

        Ok(MappedExample {
            example_id: record.id,
            speaking,
            listening,
            spanish_clip,
            english_clip,
            guess_clip,
        })
    }
}

fn first_error(
    spanish: &Result<AudioBlob, TranscodeError>,
    english: &Result<AudioBlob, TranscodeError>,
    guess: &Result<AudioBlob, TranscodeError>,
) -> TranscodeError {
    [spanish, english, guess]
        .into_iter()
        .find_map(|result| result.as_ref().err().cloned())
        .unwrap_or_else(|| TranscodeError::InitFailed("mapping failed without an error".to_string()))
}

/// Assign the shared media to the four roles of one quiz variant
fn assemble(
    quiz_type: AudioQuizType,
    record: &ExampleRecord,
    spanish: &AudioBlob,
    english: &AudioBlob,
    guess: &AudioBlob,
) -> AudioQuizExample {
    let spanish_clip = |step| {
        AudioClip::new(
            step,
            true,
            &record.spanish,
            spanish.url(),
            ClipDuration::Known(spanish.duration()),
        )
    };
    let english_clip = |step| {
        AudioClip::new(
            step,
            false,
            &record.english,
            english.url(),
            ClipDuration::Known(english.duration()),
        )
    };

    let (question, answer) = match quiz_type {
        AudioQuizType::Speaking => (
            english_clip(AudioQuizStep::Question),
            spanish_clip(AudioQuizStep::Answer),
        ),
        AudioQuizType::Listening => (
            spanish_clip(AudioQuizStep::Question),
            english_clip(AudioQuizStep::Answer),
        ),
    };

    // Guess is flagged with the language the learner has to produce
    let guess = AudioClip::new(
        AudioQuizStep::Guess,
        answer.spanish,
        question.display_text.clone(),
        guess.url(),
        ClipDuration::Pending,
    );

    AudioQuizExample {
        quiz_type,
        question,
        guess,
        hint: spanish_clip(AudioQuizStep::Hint),
        answer,
    }
}
