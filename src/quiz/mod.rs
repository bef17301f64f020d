pub mod mapper;
pub mod player;
pub mod resources;
pub mod sequencer;
pub mod session;

pub use mapper::{MapperStats, QuizMapper};
pub use player::{PlayerControl, PlayerEvent, PlayerSummary, QuizPlayer};
pub use resources::{ResourceTracker, Ticket};
pub use sequencer::{EndOutcome, PlaybackSequencer, SequencerState};
pub use session::{ExportSummary, PrepareReport, QuizSession, SkippedExample};
