use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SequencerError;
use crate::logging::QuizLogger;
use crate::models::{AudioQuizExample, AudioQuizStep, ClipView};
use crate::quiz::resources::ResourceTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Setup,
    Playing { example_index: usize, step: AudioQuizStep },
    Paused { example_index: usize, step: AudioQuizStep },
    Complete,
}

impl SequencerState {
    pub fn name(&self) -> &'static str {
        match self {
            SequencerState::Setup => "setup",
            SequencerState::Playing { .. } => "playing",
            SequencerState::Paused { .. } => "paused",
            SequencerState::Complete => "complete",
        }
    }

    /// `(example_index, step)` while playing or paused
    pub fn position(&self) -> Option<(usize, AudioQuizStep)> {
        match *self {
            SequencerState::Playing { example_index, step }
            | SequencerState::Paused { example_index, step } => Some((example_index, step)),
            SequencerState::Setup | SequencerState::Complete => None,
        }
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position() {
            Some((index, step)) => write!(f, "{} ({} {})", self.name(), index + 1, step),
            None => f.write_str(self.name()),
        }
    }
}

/// What a playback-ended signal did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    /// No clip was armed, or the sequencer is not playing
    Ignored,
    /// Autoplay is off; the clip stays current until the user navigates
    Held,
    Advanced,
    /// The last example finished
    Completed,
    /// An example finished; call `advance_after_settle(epoch)` after `delay`
    Settle { delay: Duration, epoch: u64 },
}

/// Drives one quiz through `Question → Guess → Hint → Answer` for every example.
///
/// Exactly one clip is current at any time. Navigation bumps an epoch so a
/// pending settle that was overtaken by the user cannot advance twice.
pub struct PlaybackSequencer {
    state: SequencerState,
    examples: Vec<AudioQuizExample>,
    autoplay: bool,
    settle_delay: Duration,
    armed: bool,
    epoch: u64,
    tracker: Arc<ResourceTracker>,
    logger: QuizLogger,
}

impl PlaybackSequencer {
    pub fn new(tracker: Arc<ResourceTracker>, settle_delay: Duration, logger: QuizLogger) -> Self {
        Self {
            state: SequencerState::Setup,
            examples: Vec::new(),
            autoplay: true,
            settle_delay,
            armed: false,
            epoch: 0,
            tracker,
            logger,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn example_count(&self) -> usize {
        self.examples.len()
    }

    pub fn examples(&self) -> &[AudioQuizExample] {
        &self.examples
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_complete(&self) -> bool {
        self.state == SequencerState::Complete
    }

    /// Hand over fully mapped examples. Only accepted during setup.
    pub fn load(&mut self, examples: Vec<AudioQuizExample>) -> Result<(), SequencerError> {
        if self.state != SequencerState::Setup {
            return Err(self.invalid("load"));
        }
        self.examples = examples;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), SequencerError> {
        if self.state != SequencerState::Setup {
            return Err(self.invalid("start"));
        }
        if self.examples.is_empty() {
            return Err(SequencerError::EmptyQuiz);
        }
        self.move_to(SequencerState::Playing {
            example_index: 0,
            step: AudioQuizStep::Question,
        });
        Ok(())
    }

    /// Step forward in the cycle. Returns false when nothing changed.
    pub fn advance(&mut self) -> bool {
        let SequencerState::Playing { example_index, step } = self.state else {
            return false;
        };

        let next = match step.next() {
            Some(step) => SequencerState::Playing { example_index, step },
            None if example_index + 1 < self.examples.len() => SequencerState::Playing {
                example_index: example_index + 1,
                step: AudioQuizStep::Question,
            },
            None => SequencerState::Complete,
        };

        self.move_to(next);
        if next == SequencerState::Complete {
            self.logger.log_quiz_completed(self.examples.len());
        }
        true
    }

    /// Go back to the previous example's Question
    pub fn previous(&mut self) -> bool {
        let target = match self.state {
            SequencerState::Playing { example_index, .. } if example_index > 0 => example_index - 1,
            SequencerState::Complete if !self.examples.is_empty() => self.examples.len() - 1,
            _ => return false,
        };
        self.move_to(SequencerState::Playing {
            example_index: target,
            step: AudioQuizStep::Question,
        });
        true
    }

    /// Jump to an example's Question. Out of range is a no-op.
    pub fn skip(&mut self, example_index: usize) -> bool {
        let navigable = matches!(
            self.state,
            SequencerState::Playing { .. } | SequencerState::Complete
        );
        if !navigable || example_index >= self.examples.len() {
            return false;
        }
        self.move_to(SequencerState::Playing {
            example_index,
            step: AudioQuizStep::Question,
        });
        true
    }

    pub fn pause(&mut self) -> bool {
        let SequencerState::Playing { example_index, step } = self.state else {
            return false;
        };
        self.state = SequencerState::Paused { example_index, step };
        self.armed = false;
        true
    }

    pub fn resume(&mut self) -> bool {
        let SequencerState::Paused { example_index, step } = self.state else {
            return false;
        };
        self.state = SequencerState::Playing { example_index, step };
        true
    }

    pub fn set_autoplay(&mut self, enabled: bool) {
        self.autoplay = enabled;
    }

    /// The current clip began playing
    pub fn clip_started(&mut self) -> bool {
        if matches!(self.state, SequencerState::Playing { .. }) {
            self.armed = true;
        }
        self.armed
    }

    /// The current clip finished. Each started clip is consumed at most once.
    pub fn clip_ended(&mut self) -> EndOutcome {
        if !std::mem::take(&mut self.armed) {
            return EndOutcome::Ignored;
        }
        let SequencerState::Playing { example_index, step } = self.state else {
            return EndOutcome::Ignored;
        };
        if !self.autoplay {
            return EndOutcome::Held;
        }

        if step == AudioQuizStep::Answer && example_index + 1 < self.examples.len() {
            return EndOutcome::Settle {
                delay: self.settle_delay,
                epoch: self.epoch,
            };
        }

        self.advance();
        if self.is_complete() {
            EndOutcome::Completed
        } else {
            EndOutcome::Advanced
        }
    }

    /// Finish a settle started by `clip_ended`, unless the user navigated meanwhile
    pub fn advance_after_settle(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch {
            log::debug!("Settle from epoch {} overtaken (now {})", epoch, self.epoch);
            return false;
        }
        self.advance()
    }

    pub fn current_clip(&self) -> Option<ClipView> {
        let (index, step) = self.state.position()?;
        let example = self.examples.get(index)?;
        Some(ClipView::from_clip(index, self.examples.len(), example.clip(step)))
    }

    /// Dispose every tracked blob and return to setup. Safe to repeat.
    pub fn cleanup(&mut self) -> usize {
        let released = self.tracker.dispose_all();
        self.examples.clear();
        self.state = SequencerState::Setup;
        self.armed = false;
        self.epoch += 1;
        released
    }

    fn move_to(&mut self, state: SequencerState) {
        self.state = state;
        self.armed = false;
        self.epoch += 1;
        if let Some((index, step)) = state.position() {
            self.logger
                .log_phase_changed(&format!("{}/{} {}", index + 1, self.examples.len(), step));
        }
    }

    fn invalid(&self, action: &str) -> SequencerError {
        SequencerError::InvalidTransition {
            from: self.state.name().to_string(),
            action: action.to_string(),
        }
    }
}
