use std::time::Duration;

use crate::config::QuizConfig;
use crate::error::{ErrorSeverity, QuizError};
use crate::models::{AudioQuizStep, ClipDuration, ClipView};
use crate::quiz::{PrepareReport, SequencerState};

/// Terminal rendering for the quiz CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// One line per clip as it starts
    pub fn display_clip(clip: &ClipView) {
        println!(
            "[{}] {} {:<8} {}",
            Self::format_position(clip),
            clip.language_label(),
            Self::step_prompt(clip.step),
            Self::truncate(&clip.display_text, 50)
        );
    }

    pub fn display_state(
        state: SequencerState,
        autoplay: bool,
        clip: Option<&ClipView>,
        live_blobs: usize,
    ) {
        println!("┌─ Quiz Status ───────────────────────────────────────────┐");
        println!("│ State: {}", Self::format_state(state));
        println!("│ Autoplay: {}", if autoplay { "on" } else { "off" });
        println!("│ Clips in memory: {}", live_blobs);
        if let Some(clip) = clip {
            println!("│ Example: {}/{}", clip.example_index + 1, clip.example_count);
            println!("│ Phase: {} ({})", clip.step, clip.language_label());
            println!("│ Text: {}", Self::truncate(&clip.display_text, 50));
            println!("│ Length: {}", Self::format_clip_duration(clip.duration));
        }
        println!("└─────────────────────────────────────────────────────────┘");
    }

    pub fn display_report(report: &PrepareReport) {
        println!("{}", report.summary());
        for skipped in &report.skipped {
            println!("  skipped #{}: {}", skipped.example_id, Self::truncate(&skipped.reason, 60));
        }
    }

    pub fn display_config(config: &QuizConfig) {
        println!("┌─ Configuration ─────────────────────────────────────────┐");
        println!("│ Quiz type: {}", config.default_quiz_type);
        println!("│ Autoplay: {}", if config.autoplay { "on" } else { "off" });
        println!("│ Volume: {:.0}%", config.volume * 100.0);
        println!("│ Settle delay: {} ms", config.settle_delay_ms);
        println!("│ Question tail: {:.2}s", config.question_tail_sec);
        println!("│ Answer tail: {:.2}s", config.answer_tail_sec);
        println!("│ Guess silence: {:.2}s", config.guess_silence_sec);
        println!("│ Output: {} Hz, {}", config.sample_rate, Self::channel_description(config.channels));
        println!("│ Init timeout: {}s", config.init_timeout_secs);
        match &config.preferred_device {
            Some(device) => println!("│ Device: {}", Self::truncate(device, 49)),
            None => println!("│ Device: Default"),
        }
        println!("└─────────────────────────────────────────────────────────┘");
    }

    /// Display error message with formatting and recovery suggestions
    pub fn display_error(error: &QuizError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!("┌─ {} {} ─────────────────────────────────────────────────┐",
            severity_icon, severity.as_str());

        for line in Self::wrap_text(&error.user_message(), 55) {
            eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("│");
            eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), 53) {
                    eprintln!("│   {}", line);
                }
            }
        }

        eprintln!("└─────────────────────────────────────────────────────────┘");
    }

    /// Display a simple error message for non-interactive contexts
    pub fn display_simple_error(error: &QuizError) {
        eprintln!("[{}] {}", error.severity().as_str(), error.user_message());

        if let Some(suggestion) = error.recovery_suggestions().first() {
            eprintln!("Suggestion: {}", suggestion);
        }
    }

    pub fn step_prompt(step: AudioQuizStep) -> &'static str {
        match step {
            AudioQuizStep::Question => "Listen",
            AudioQuizStep::Guess => "Your turn",
            AudioQuizStep::Hint => "Hint",
            AudioQuizStep::Answer => "Answer",
        }
    }

    pub fn format_position(clip: &ClipView) -> String {
        format!("{}/{} {}", clip.example_index + 1, clip.example_count, clip.step.short())
    }

    pub fn format_state(state: SequencerState) -> String {
        match state {
            SequencerState::Setup => "⏹ Setup".to_string(),
            SequencerState::Playing { .. } => "▶ Playing".to_string(),
            SequencerState::Paused { .. } => "⏸ Paused".to_string(),
            SequencerState::Complete => "✓ Complete".to_string(),
        }
    }

    pub fn format_clip_duration(duration: ClipDuration) -> String {
        match duration {
            ClipDuration::Known(duration) => Self::format_duration(duration),
            ClipDuration::Pending => "--:--".to_string(),
        }
    }

    /// Format duration as MM:SS.s
    pub fn format_duration(duration: Duration) -> String {
        let tenths = duration.as_millis() / 100;
        let minutes = tenths / 600;
        let seconds = (tenths % 600) / 10;
        format!("{:02}:{:02}.{}", minutes, seconds, tenths % 10)
    }

    pub fn channel_description(channels: u16) -> &'static str {
        match channels {
            1 => "Mono",
            2 => "Stereo",
            _ => "Multi-channel",
        }
    }

    /// Truncate string to fit display width
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_line = String::new();

        for word in text.split_whitespace() {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.len() + word.len() < width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current_line));
                current_line = word.to_string();
            }
        }

        if !current_line.is_empty() {
            lines.push(current_line);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SequencerError;

    fn view(step: AudioQuizStep) -> ClipView {
        ClipView {
            example_index: 1,
            example_count: 4,
            step,
            spanish: true,
            display_text: "¿Dónde está la biblioteca?".to_string(),
            audio_url: "blob:audio-quiz/9".to_string(),
            duration: ClipDuration::Known(Duration::from_millis(2_350)),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(StatusDisplay::format_duration(Duration::from_millis(2_350)), "00:02.3");
        assert_eq!(StatusDisplay::format_duration(Duration::from_secs(75)), "01:15.0");
        assert_eq!(StatusDisplay::format_clip_duration(ClipDuration::Pending), "--:--");
    }

    #[test]
    fn test_format_position() {
        assert_eq!(StatusDisplay::format_position(&view(AudioQuizStep::Hint)), "2/4 H");
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(StatusDisplay::truncate("¿Dónde está?", 20), "¿Dónde está?");
        assert_eq!(StatusDisplay::truncate("¿Dónde está la biblioteca?", 10), "¿Dónde ...");
        assert_eq!(StatusDisplay::truncate("abc", 2), "abc");
    }

    #[test]
    fn test_wrap_text() {
        let lines = StatusDisplay::wrap_text("one two three four", 9);
        assert_eq!(lines, vec!["one two", "three", "four"]);
    }

    #[test]
    fn test_format_state() {
        assert_eq!(StatusDisplay::format_state(SequencerState::Complete), "✓ Complete");
        assert_eq!(
            StatusDisplay::format_state(SequencerState::Paused {
                example_index: 0,
                step: AudioQuizStep::Guess
            }),
            "⏸ Paused"
        );
    }

    #[test]
    fn test_display_functions_dont_panic() {
        StatusDisplay::display_clip(&view(AudioQuizStep::Question));
        StatusDisplay::display_state(SequencerState::Setup, true, None, 0);
        StatusDisplay::display_config(&QuizConfig::default());
        StatusDisplay::display_report(&PrepareReport::default());
        StatusDisplay::display_error(&QuizError::from(SequencerError::EmptyQuiz));
        StatusDisplay::display_simple_error(&QuizError::from(SequencerError::EmptyQuiz));
    }
}
