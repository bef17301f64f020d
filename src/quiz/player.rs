use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::audio::ClipPlayer;
use crate::error::{PlaybackError, QuizError};
use crate::models::ClipView;
use crate::quiz::sequencer::{EndOutcome, SequencerState};
use crate::quiz::session::QuizSession;

/// Commands accepted while a quiz is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerControl {
    Advance,
    Previous,
    /// Jump to an example by zero-based index
    Skip(usize),
    Pause,
    Resume,
    SetAutoplay(bool),
    Replay,
    Quit,
}

/// Progress reported to whoever renders the quiz
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    ClipStarted(ClipView),
    Waiting(ClipView),
    Settling(Duration),
    Paused,
    ClipFailed(String),
    Completed,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSummary {
    pub clips_played: usize,
    pub completed: bool,
    pub blobs_released: usize,
}

enum Flow {
    Continue,
    Stop,
}

enum SettleWake {
    Elapsed,
    Control(Option<PlayerControl>),
}

/// Drives a session's sequencer from clip completions and user controls.
///
/// Clips play strictly one at a time. Any control message aborts the clip in
/// flight by dropping its play future.
pub struct QuizPlayer {
    session: Arc<QuizSession>,
    output: Arc<dyn ClipPlayer>,
    events: Option<mpsc::UnboundedSender<PlayerEvent>>,
    clips_played: usize,
    /// Settle epoch interrupted by `Pause`, finished on resume
    paused_settle: Option<u64>,
}

impl QuizPlayer {
    pub fn new(session: Arc<QuizSession>, output: Arc<dyn ClipPlayer>) -> Self {
        Self {
            session,
            output,
            events: None,
            clips_played: 0,
            paused_settle: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run until the quiz completes, `Quit` arrives or the control channel
    /// closes. The session is cleaned up on every exit path.
    pub async fn run(
        mut self,
        mut controls: mpsc::UnboundedReceiver<PlayerControl>,
    ) -> Result<PlayerSummary, QuizError> {
        let outcome = self.drive(&mut controls).await;
        let blobs_released = self.session.cleanup();
        let completed = outcome?;

        Ok(PlayerSummary {
            clips_played: self.clips_played,
            completed,
            blobs_released,
        })
    }

    async fn drive(
        &mut self,
        controls: &mut mpsc::UnboundedReceiver<PlayerControl>,
    ) -> Result<bool, QuizError> {
        loop {
            let (state, clip) = self
                .session
                .with_sequencer(|s| (s.state(), s.current_clip()));

            let clip = match (state, clip) {
                (SequencerState::Complete, _) => {
                    self.emit(PlayerEvent::Completed);
                    return Ok(true);
                }
                (SequencerState::Setup, _) => return Ok(false),
                (SequencerState::Paused { .. }, _) => {
                    self.emit(PlayerEvent::Paused);
                    match self.next_control(controls).await {
                        Flow::Continue => {
                            self.finish_paused_settle();
                            continue;
                        }
                        Flow::Stop => return Ok(false),
                    }
                }
                (SequencerState::Playing { .. }, Some(clip)) => clip,
                (SequencerState::Playing { .. }, None) => return Ok(false),
            };

            let blob = self
                .session
                .blob_for(&clip.audio_url)
                .ok_or_else(|| PlaybackError::MissingMedia { url: clip.audio_url.clone() })?;

            self.session.with_sequencer(|s| s.clip_started());
            self.emit(PlayerEvent::ClipStarted(clip.clone()));

            let played = tokio::select! {
                result = self.output.play(&blob) => Some(result),
                control = controls.recv() => {
                    log::debug!("Clip interrupted by {:?}", control);
                    match self.apply(control) {
                        Flow::Continue => None,
                        Flow::Stop => return Ok(false),
                    }
                }
            };

            let Some(result) = played else {
                continue;
            };
            self.clips_played += 1;

            if let Err(error) = result {
                if !error.is_recoverable() {
                    return Err(error.into());
                }
                log::warn!("Clip {} failed: {}", clip.position_label(), error);
                self.emit(PlayerEvent::ClipFailed(error.user_message()));
            }

            match self.session.with_sequencer(|s| s.clip_ended()) {
                EndOutcome::Advanced | EndOutcome::Completed | EndOutcome::Ignored => {}
                EndOutcome::Held => {
                    self.emit(PlayerEvent::Waiting(clip));
                    if let Flow::Stop = self.wait_while_held(controls).await {
                        return Ok(false);
                    }
                }
                EndOutcome::Settle { delay, epoch } => {
                    if let Flow::Stop = self.settle(clip, delay, epoch, controls).await {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Pause between an Answer and the next Question. `Pause` defers the
    /// advance until resume, and turning autoplay off holds the finished Answer.
    async fn settle(
        &mut self,
        clip: ClipView,
        delay: Duration,
        epoch: u64,
        controls: &mut mpsc::UnboundedReceiver<PlayerControl>,
    ) -> Flow {
        self.emit(PlayerEvent::Settling(delay));
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            let wake = tokio::select! {
                _ = &mut sleep => SettleWake::Elapsed,
                control = controls.recv() => SettleWake::Control(control),
            };

            let control = match wake {
                SettleWake::Elapsed => {
                    self.session.with_sequencer(|s| s.advance_after_settle(epoch));
                    return Flow::Continue;
                }
                SettleWake::Control(control) => control,
            };

            let flow = self.apply(control);
            match control {
                Some(PlayerControl::SetAutoplay(true)) | Some(PlayerControl::Resume) => continue,
                Some(PlayerControl::Pause) => {
                    self.paused_settle = Some(epoch);
                    return flow;
                }
                Some(PlayerControl::SetAutoplay(false)) => {
                    self.emit(PlayerEvent::Waiting(clip));
                    return self.wait_while_held(controls).await;
                }
                _ => return flow,
            }
        }
    }

    fn finish_paused_settle(&mut self) {
        let Some(epoch) = self.paused_settle else {
            return;
        };
        let resumed = self.session.with_sequencer(|s| {
            if matches!(s.state(), SequencerState::Playing { .. }) {
                s.advance_after_settle(epoch);
                true
            } else {
                false
            }
        });
        if resumed {
            self.paused_settle = None;
        }
    }

    /// Manual mode: the finished clip stays current until a control arrives
    async fn wait_while_held(
        &mut self,
        controls: &mut mpsc::UnboundedReceiver<PlayerControl>,
    ) -> Flow {
        let control = controls.recv().await;
        let flow = self.apply(control);
        if control == Some(PlayerControl::SetAutoplay(true)) {
            self.session.with_sequencer(|s| s.advance());
        }
        flow
    }

    async fn next_control(&mut self, controls: &mut mpsc::UnboundedReceiver<PlayerControl>) -> Flow {
        let control = controls.recv().await;
        self.apply(control)
    }

    fn apply(&self, control: Option<PlayerControl>) -> Flow {
        let Some(control) = control else {
            return Flow::Stop;
        };

        self.session.with_sequencer(|s| match control {
            PlayerControl::Advance => {
                s.advance();
            }
            PlayerControl::Previous => {
                s.previous();
            }
            PlayerControl::Skip(index) => {
                s.skip(index);
            }
            PlayerControl::Pause => {
                s.pause();
            }
            PlayerControl::Resume => {
                s.resume();
            }
            PlayerControl::SetAutoplay(enabled) => s.set_autoplay(enabled),
            PlayerControl::Replay | PlayerControl::Quit => {}
        });

        if control == PlayerControl::Quit {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
