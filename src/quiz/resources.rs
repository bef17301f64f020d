use std::sync::{Mutex, MutexGuard};

use crate::audio::AudioBlob;
use crate::logging::QuizLogger;

/// Proof that a result was requested during a particular generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Default)]
struct TrackerState {
    generation: u64,
    blobs: Vec<AudioBlob>,
}

/// Owns every blob handed to the quiz after mapping.
///
/// Cleanup bumps the generation, so results that arrive afterwards carry a
/// stale ticket and are disposed on arrival instead of being adopted.
pub struct ResourceTracker {
    state: Mutex<TrackerState>,
    logger: QuizLogger,
}

impl ResourceTracker {
    pub fn new(logger: QuizLogger) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            logger,
        }
    }

    pub fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.lock().generation,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.lock().generation == ticket.generation
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Take ownership of `blobs` if `ticket` is still current, otherwise
    /// dispose them immediately. Returns whether they were adopted.
    pub fn adopt(&self, ticket: &Ticket, example_id: i64, blobs: Vec<AudioBlob>) -> bool {
        {
            let mut state = self.lock();
            if state.generation == ticket.generation {
                state.blobs.extend(blobs);
                return true;
            }
        }

        for blob in &blobs {
            blob.dispose();
        }
        self.logger.log_late_result_discarded(example_id);
        false
    }

    /// Dispose everything adopted so far and invalidate outstanding tickets.
    /// Never fails; blobs already released are skipped.
    pub fn dispose_all(&self) -> usize {
        let blobs = {
            let mut state = self.lock();
            state.generation += 1;
            std::mem::take(&mut state.blobs)
        };

        let released = blobs.iter().filter(|blob| blob.dispose()).count();
        if released > 0 {
            self.logger.log_blobs_disposed(released);
        }
        released
    }

    pub fn tracked_count(&self) -> usize {
        self.lock().blobs.len()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{BlobData, BlobStore};
    use crate::logging::QuizEventType;
    use std::time::Duration;

    fn blobs(store: &std::sync::Arc<BlobStore>, count: usize) -> Vec<AudioBlob> {
        (0..count)
            .map(|_| store.create(BlobData::new(vec![0; 4], Duration::from_millis(100), "audio/wav")))
            .collect()
    }

    #[test]
    fn test_adopt_with_current_ticket() {
        let store = BlobStore::new();
        let tracker = ResourceTracker::new(QuizLogger::new());
        let ticket = tracker.ticket();

        assert!(tracker.adopt(&ticket, 1, blobs(&store, 3)));
        assert_eq!(tracker.tracked_count(), 3);
        assert_eq!(store.live_count(), 3);
    }

    #[test]
    fn test_late_result_is_disposed() {
        let store = BlobStore::new();
        let logger = QuizLogger::new();
        let tracker = ResourceTracker::new(logger.clone());
        let ticket = tracker.ticket();

        tracker.dispose_all();
        assert!(!tracker.is_current(&ticket));

        let late = blobs(&store, 2);
        let handles = late.clone();
        assert!(!tracker.adopt(&ticket, 7, late));
        assert!(handles.iter().all(AudioBlob::is_disposed));
        assert_eq!(store.live_count(), 0);
        assert_eq!(tracker.tracked_count(), 0);

        let events = logger.get_recent_events(10);
        assert!(events
            .iter()
            .any(|e| e.event_type == QuizEventType::LateResultDiscarded));
    }

    #[test]
    fn test_dispose_all_is_idempotent() {
        let store = BlobStore::new();
        let tracker = ResourceTracker::new(QuizLogger::new());
        let ticket = tracker.ticket();
        let shared = blobs(&store, 2);

        tracker.adopt(&ticket, 1, shared.clone());
        tracker.adopt(&ticket, 1, shared);

        assert_eq!(tracker.dispose_all(), 2);
        assert_eq!(tracker.dispose_all(), 0);
        assert_eq!(store.live_count(), 0);
        assert_eq!(tracker.generation(), 2);
    }

    #[test]
    fn test_externally_disposed_blobs_are_skipped() {
        let store = BlobStore::new();
        let tracker = ResourceTracker::new(QuizLogger::new());
        let ticket = tracker.ticket();
        let owned = blobs(&store, 3);
        owned[0].dispose();

        tracker.adopt(&ticket, 1, owned);
        assert_eq!(tracker.dispose_all(), 2);
    }
}
