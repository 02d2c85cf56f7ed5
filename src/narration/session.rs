use crate::paragraphs::Paragraph;
use crate::playback::AudioClip;
use std::time::{Duration, Instant};

/// Narration state machine states. `Waiting` is entered when advancing to a
/// paragraph whose audio is not ready yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Playing,
    Paused,
    Waiting,
    Ended,
}

/// In-memory state of one active narration. Created when narration is toggled
/// on (or started from a paragraph), torn down on pause-to-idle, book switch,
/// or end of book. At most one clip is attached to the playback surface at a
/// time; the prefetched next clip is held here until promotion.
pub struct NarrationSession {
    pub(super) book_id: String,
    pub(super) paragraphs: Vec<Paragraph>,
    pub(super) current_index: usize,
    pub(super) lifecycle: Lifecycle,
    pub(super) progress_percent: f32,
    pub(super) current_clip: Option<AudioClip>,
    pub(super) next_clip: Option<AudioClip>,
    pub(super) preloading: bool,
    pub(super) waiting_for_next: bool,
    pub(super) prefetched_for: Option<usize>,
    pub(super) pending_start_at: Duration,
    pub(super) request_id: u64,
    pub(super) last_position_save: Option<Instant>,
}

impl NarrationSession {
    pub(super) fn new(book_id: String, paragraphs: Vec<Paragraph>, request_id: u64) -> Self {
        Self {
            book_id,
            paragraphs,
            current_index: 0,
            lifecycle: Lifecycle::Idle,
            progress_percent: 0.0,
            current_clip: None,
            next_clip: None,
            preloading: false,
            waiting_for_next: false,
            prefetched_for: None,
            pending_start_at: Duration::ZERO,
            request_id,
            last_position_save: None,
        }
    }

    pub(super) fn current_paragraph(&self) -> Option<&Paragraph> {
        self.paragraphs.get(self.current_index)
    }

    pub(super) fn is_last_paragraph(&self) -> bool {
        self.current_index + 1 >= self.paragraphs.len()
    }

    pub(super) fn is_playing(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Playing)
    }
}
