use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::audio::AudioBlob;

/// One vocabulary example as delivered by the example provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExampleRecord {
    pub id: i64,
    pub spanish: String,
    pub english: String,
    pub spanish_audio: String,
    pub english_audio: String,
}

impl ExampleRecord {
    pub fn new(
        id: i64,
        spanish: impl Into<String>,
        english: impl Into<String>,
        spanish_audio: impl Into<String>,
        english_audio: impl Into<String>,
    ) -> Self {
        Self {
            id,
            spanish: spanish.into(),
            english: english.into(),
            spanish_audio: spanish_audio.into(),
            english_audio: english_audio.into(),
        }
    }

    /// Parse a JSON array of example records
    pub fn list_from_json(json: &str) -> Result<Vec<ExampleRecord>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// The four phases every quizzed example passes through, in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioQuizStep {
    Question,
    Guess,
    Hint,
    Answer,
}

impl AudioQuizStep {
    pub const ALL: [AudioQuizStep; 4] = [
        AudioQuizStep::Question,
        AudioQuizStep::Guess,
        AudioQuizStep::Hint,
        AudioQuizStep::Answer,
    ];

    /// Next step in the cycle, or `None` after `Answer`
    pub fn next(self) -> Option<AudioQuizStep> {
        match self {
            AudioQuizStep::Question => Some(AudioQuizStep::Guess),
            AudioQuizStep::Guess => Some(AudioQuizStep::Hint),
            AudioQuizStep::Hint => Some(AudioQuizStep::Answer),
            AudioQuizStep::Answer => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AudioQuizStep::Question => "Question",
            AudioQuizStep::Guess => "Guess",
            AudioQuizStep::Hint => "Hint",
            AudioQuizStep::Answer => "Answer",
        }
    }

    /// Single-letter code used in compact displays and logs
    pub fn short(&self) -> char {
        match self {
            AudioQuizStep::Question => 'Q',
            AudioQuizStep::Guess => 'G',
            AudioQuizStep::Hint => 'H',
            AudioQuizStep::Answer => 'A',
        }
    }
}

impl fmt::Display for AudioQuizStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which language the learner is given and which one is expected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuizType {
    /// Hear the source language, produce the target language
    Speaking,
    /// Hear the target language, understand it in the source language
    Listening,
}

impl AudioQuizType {
    pub fn name(&self) -> &'static str {
        match self {
            AudioQuizType::Speaking => "speaking",
            AudioQuizType::Listening => "listening",
        }
    }

    pub fn parse(value: &str) -> Option<AudioQuizType> {
        match value.trim().to_lowercase().as_str() {
            "speaking" | "speak" | "s" => Some(AudioQuizType::Speaking),
            "listening" | "listen" | "l" => Some(AudioQuizType::Listening),
            _ => None,
        }
    }
}

impl fmt::Display for AudioQuizType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Length of a clip, or `Pending` when it is only known from the media itself
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ClipDuration {
    Known(Duration),
    Pending,
}

impl ClipDuration {
    pub fn as_secs_f64(&self) -> Option<f64> {
        match self {
            ClipDuration::Known(duration) => Some(duration.as_secs_f64()),
            ClipDuration::Pending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ClipDuration::Pending)
    }
}

impl fmt::Display for ClipDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipDuration::Known(duration) => write!(f, "{:.2}s", duration.as_secs_f64()),
            ClipDuration::Pending => f.write_str("pending"),
        }
    }
}

/// One playable unit of a quiz turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioClip {
    pub step: AudioQuizStep,
    /// True when the clip presents target-language content
    pub spanish: bool,
    pub display_text: String,
    pub audio_url: String,
    pub duration: ClipDuration,
}

impl AudioClip {
    pub fn new(
        step: AudioQuizStep,
        spanish: bool,
        display_text: impl Into<String>,
        audio_url: impl Into<String>,
        duration: ClipDuration,
    ) -> Self {
        Self {
            step,
            spanish,
            display_text: display_text.into(),
            audio_url: audio_url.into(),
            duration,
        }
    }

    pub fn language_label(&self) -> &'static str {
        if self.spanish { "ES" } else { "EN" }
    }
}

/// A fully resolved quiz turn for one example and one quiz type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioQuizExample {
    pub quiz_type: AudioQuizType,
    pub question: AudioClip,
    pub guess: AudioClip,
    pub hint: AudioClip,
    pub answer: AudioClip,
}

impl AudioQuizExample {
    pub fn clip(&self, step: AudioQuizStep) -> &AudioClip {
        match step {
            AudioQuizStep::Question => &self.question,
            AudioQuizStep::Guess => &self.guess,
            AudioQuizStep::Hint => &self.hint,
            AudioQuizStep::Answer => &self.answer,
        }
    }

    /// Clips in playback order
    pub fn clips(&self) -> [&AudioClip; 4] {
        [&self.question, &self.guess, &self.hint, &self.answer]
    }

    /// Check the language invariants for this example's quiz type
    pub fn is_consistent(&self) -> bool {
        let roles = match self.quiz_type {
            AudioQuizType::Listening => self.question.spanish && !self.answer.spanish,
            AudioQuizType::Speaking => !self.question.spanish && self.answer.spanish,
        };
        let steps = AudioQuizStep::ALL
            .iter()
            .all(|step| self.clip(*step).step == *step);
        roles && steps && self.hint.spanish
    }
}

/// Both quiz variants of one example plus the media they share.
///
/// The variants only differ in role assignment; the three blobs back every
/// clip URL in `speaking` and `listening`.
#[derive(Debug, Clone)]
pub struct MappedExample {
    pub example_id: i64,
    pub speaking: AudioQuizExample,
    pub listening: AudioQuizExample,
    pub spanish_clip: AudioBlob,
    pub english_clip: AudioBlob,
    pub guess_clip: AudioBlob,
}

impl MappedExample {
    pub fn variant(&self, quiz_type: AudioQuizType) -> &AudioQuizExample {
        match quiz_type {
            AudioQuizType::Speaking => &self.speaking,
            AudioQuizType::Listening => &self.listening,
        }
    }

    pub fn blobs(&self) -> [&AudioBlob; 3] {
        [&self.spanish_clip, &self.english_clip, &self.guess_clip]
    }

    /// True while none of the shared media has been released
    pub fn is_live(&self) -> bool {
        self.blobs().iter().all(|blob| !blob.is_disposed())
    }
}

/// Projection of the clip the sequencer currently exposes for playback
#[derive(Debug, Clone, PartialEq)]
pub struct ClipView {
    pub example_index: usize,
    pub example_count: usize,
    pub step: AudioQuizStep,
    pub spanish: bool,
    pub display_text: String,
    pub audio_url: String,
    pub duration: ClipDuration,
}

impl ClipView {
    pub fn from_clip(example_index: usize, example_count: usize, clip: &AudioClip) -> Self {
        Self {
            example_index,
            example_count,
            step: clip.step,
            spanish: clip.spanish,
            display_text: clip.display_text.clone(),
            audio_url: clip.audio_url.clone(),
            duration: clip.duration,
        }
    }

    pub fn language_label(&self) -> &'static str {
        if self.spanish { "ES" } else { "EN" }
    }

    pub fn position_label(&self) -> String {
        format!(
            "{}/{} {}",
            self.example_index + 1,
            self.example_count,
            self.step.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(step: AudioQuizStep, spanish: bool) -> AudioClip {
        AudioClip::new(step, spanish, "text", "blob:test/1", ClipDuration::Pending)
    }

    #[test]
    fn test_example_record_from_provider_json() {
        let json = r#"[
            {"id": 1, "spanish": "Hola", "english": "Hello", "spanishAudio": "a.mp3", "englishAudio": "b.mp3"},
            {"id": 2, "spanish": "Adiós", "english": "Goodbye", "spanishAudio": "c.mp3", "englishAudio": "d.mp3"}
        ]"#;

        let records = ExampleRecord::list_from_json(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], ExampleRecord::new(1, "Hola", "Hello", "a.mp3", "b.mp3"));
        assert_eq!(records[1].spanish_audio, "c.mp3");
    }

    #[test]
    fn test_example_record_missing_field() {
        let json = r#"[{"id": 1, "spanish": "Hola", "english": "Hello"}]"#;
        assert!(ExampleRecord::list_from_json(json).is_err());
    }

    #[test]
    fn test_step_cycle_order() {
        let mut visited = vec![AudioQuizStep::Question];
        let mut step = AudioQuizStep::Question;
        while let Some(next) = step.next() {
            visited.push(next);
            step = next;
        }
        assert_eq!(visited, AudioQuizStep::ALL.to_vec());
        assert_eq!(AudioQuizStep::Answer.next(), None);
    }

    #[test]
    fn test_step_short_codes() {
        let codes: String = AudioQuizStep::ALL.iter().map(|s| s.short()).collect();
        assert_eq!(codes, "QGHA");
    }

    #[test]
    fn test_quiz_type_parse() {
        assert_eq!(AudioQuizType::parse("Speaking"), Some(AudioQuizType::Speaking));
        assert_eq!(AudioQuizType::parse(" listen "), Some(AudioQuizType::Listening));
        assert_eq!(AudioQuizType::parse("reading"), None);
        assert_eq!(AudioQuizType::Listening.to_string(), "listening");
    }

    #[test]
    fn test_quiz_type_serde_lowercase() {
        let json = serde_json::to_string(&AudioQuizType::Speaking).unwrap();
        assert_eq!(json, "\"speaking\"");
    }

    #[test]
    fn test_clip_duration_display() {
        assert_eq!(ClipDuration::Known(Duration::from_millis(1500)).to_string(), "1.50s");
        assert_eq!(ClipDuration::Pending.to_string(), "pending");
        assert!(ClipDuration::Pending.is_pending());
        assert_eq!(ClipDuration::Pending.as_secs_f64(), None);
    }

    #[test]
    fn test_example_consistency() {
        let speaking = AudioQuizExample {
            quiz_type: AudioQuizType::Speaking,
            question: clip(AudioQuizStep::Question, false),
            guess: clip(AudioQuizStep::Guess, true),
            hint: clip(AudioQuizStep::Hint, true),
            answer: clip(AudioQuizStep::Answer, true),
        };
        assert!(speaking.is_consistent());

        let mut broken = speaking.clone();
        broken.hint.spanish = false;
        assert!(!broken.is_consistent());

        let mut wrong_type = speaking.clone();
        wrong_type.quiz_type = AudioQuizType::Listening;
        assert!(!wrong_type.is_consistent());
    }

    #[test]
    fn test_clip_view_position_label() {
        let view = ClipView::from_clip(0, 3, &clip(AudioQuizStep::Hint, true));
        assert_eq!(view.position_label(), "1/3 Hint");
        assert_eq!(view.audio_url, "blob:test/1");
    }
}
