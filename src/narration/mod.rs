//! The narration controller: paragraph sequencing, playback transport,
//! prefetch scheduling, and position persistence.
//!
//! Control flow is tick-driven. The transport loop calls [`NarrationController::tick`]
//! at a fixed cadence; each tick drains resolve outcomes from worker threads,
//! updates progress against the current clip's metadata duration, fires the
//! prefetch rule, performs the throttled position save, and handles
//! end-of-clip transitions. Cache hits resolve synchronously; misses run on a
//! worker thread and report back over an mpsc channel tagged with the session
//! request id, so completions that outlive their session are discarded.

mod session;

#[cfg(test)]
mod tests;

pub use session::Lifecycle;
use session::NarrationSession;

use crate::paragraphs::{Paragraph, normalize_key, split_paragraphs};
use crate::playback::{AudioClip, PlaybackSurface};
use crate::position::{PositionStore, SavedPosition};
use crate::speech_cache::SpeechCache;
use crate::synthesis::{SynthesisError, SynthesizedAudio, Synthesizer, VoiceSelector};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tunables for the controller, derived from `AppConfig`.
#[derive(Debug, Clone)]
pub struct NarrationSettings {
    pub skip_seconds: f32,
    pub prefetch_threshold_percent: f32,
    pub position_save_interval: Duration,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            skip_seconds: 10.0,
            prefetch_threshold_percent: 75.0,
            position_save_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolveSlot {
    Current,
    Prefetch,
}

struct ResolveOutcome {
    request_id: u64,
    index: usize,
    slot: ResolveSlot,
    text: String,
    result: Result<SynthesizedAudio, SynthesisError>,
}

enum EndAction {
    Finished,
    Promote(AudioClip),
    Advance,
}

pub struct NarrationController<Y, P> {
    book_id: String,
    voice: VoiceSelector,
    book_text: String,
    cache: SpeechCache,
    positions: PositionStore,
    synthesizer: Y,
    surface: P,
    settings: NarrationSettings,
    session: Option<NarrationSession>,
    next_request_id: u64,
    outcomes_tx: Sender<ResolveOutcome>,
    outcomes_rx: Receiver<ResolveOutcome>,
}

impl<Y, P> NarrationController<Y, P>
where
    Y: Synthesizer + Clone + Send + 'static,
    P: PlaybackSurface,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        book_id: impl Into<String>,
        voice: VoiceSelector,
        book_text: String,
        cache: SpeechCache,
        positions: PositionStore,
        synthesizer: Y,
        surface: P,
        settings: NarrationSettings,
    ) -> Self {
        let (outcomes_tx, outcomes_rx) = channel();
        Self {
            book_id: book_id.into(),
            voice,
            book_text,
            cache,
            positions,
            synthesizer,
            surface,
            settings,
            session: None,
            next_request_id: 0,
            outcomes_tx,
            outcomes_rx,
        }
    }

    /// Play, pause, or resume per the session state machine.
    pub fn toggle_narration(&mut self) {
        match self.session.as_ref().map(|s| s.lifecycle) {
            None | Some(Lifecycle::Idle) | Some(Lifecycle::Ended) => self.start(),
            Some(Lifecycle::Playing) | Some(Lifecycle::Waiting) => self.pause(),
            Some(Lifecycle::Paused) => self.resume(),
        }
    }

    /// Skip forward within the current paragraph's audio.
    pub fn skip_forward(&mut self) {
        self.skip_by(self.settings.skip_seconds);
    }

    /// Skip backward within the current paragraph's audio.
    pub fn skip_backward(&mut self) {
        self.skip_by(-self.settings.skip_seconds);
    }

    /// Scrub to a fractional position of the current paragraph. Never starts
    /// playback on its own: a paused session stays paused after the seek.
    pub fn seek_to_percent(&mut self, percent: f32) {
        let Some(duration) = self.current_clip_duration() else {
            return;
        };
        if !self.surface.is_attached() || duration.is_zero() {
            return;
        }
        let fraction = (percent / 100.0).clamp(0.0, 1.0);
        let was_playing = self.is_playing();
        self.surface.seek(duration.mul_f32(fraction));
        if let Some(session) = self.session.as_mut() {
            session.progress_percent = fraction * 100.0;
        }
        if was_playing {
            self.surface.resume();
        }
    }

    /// "Read from here": start playback at an externally chosen paragraph,
    /// bypassing the saved position.
    pub fn start_from_paragraph(&mut self, index: usize, paragraphs: Vec<Paragraph>) {
        if paragraphs.is_empty() {
            return;
        }
        let request_id = self.bump_request_id();
        self.surface.release();
        let clamped = index.min(paragraphs.len() - 1);
        let mut session = NarrationSession::new(self.book_id.clone(), paragraphs, request_id);
        session.current_index = clamped;
        self.session = Some(session);
        info!(index = clamped, "Starting narration from paragraph");
        self.begin_current_paragraph(Duration::ZERO);
    }

    /// Tear down the session: save the position, release the audio handle,
    /// and drop all session state. Required before narrating another book.
    pub fn stop(&mut self) {
        if self.session.is_some() && self.surface.is_attached() {
            let position = self.surface.position();
            self.save_position_now(position);
        }
        self.surface.release();
        if self.session.take().is_some() {
            info!("Narration session torn down");
        }
        self.bump_request_id();
    }

    /// Drive the controller forward. Call at a fixed cadence while the app is
    /// running; cheap when nothing is active.
    pub fn tick(&mut self) {
        self.drain_outcomes();

        let (playing, duration) = match self.session.as_ref() {
            Some(session) => (
                session.is_playing(),
                session.current_clip.as_ref().map(|clip| clip.duration),
            ),
            None => return,
        };
        if !playing || !self.surface.is_attached() {
            return;
        }

        let position = self.surface.position();
        let progress = match duration {
            Some(duration) if !duration.is_zero() => {
                ((position.as_secs_f32() / duration.as_secs_f32()) * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        };
        if let Some(session) = self.session.as_mut() {
            session.progress_percent = progress;
        }

        self.maybe_save_position(position);
        self.maybe_prefetch(progress);

        if self.surface.is_finished() {
            self.handle_clip_ended();
        }
    }

    pub fn clear_saved_position(&mut self) {
        self.positions.clear(&self.book_id);
    }

    pub fn clear_book_data(&mut self) {
        self.cache.clear_book(&self.book_id);
        self.positions.clear(&self.book_id);
    }

    pub fn clear_all_data(&mut self) {
        self.cache.clear_all();
        self.positions.clear_all();
    }

    pub fn is_playing(&self) -> bool {
        self.session.as_ref().map(|s| s.is_playing()).unwrap_or(false)
    }

    pub fn progress_percent(&self) -> f32 {
        self.session.as_ref().map(|s| s.progress_percent).unwrap_or(0.0)
    }

    pub fn duration_seconds(&self) -> f32 {
        self.current_clip_duration()
            .map(|d| d.as_secs_f32())
            .unwrap_or(0.0)
    }

    pub fn current_paragraph_index(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.current_index)
    }

    pub fn is_waiting_for_next_paragraph(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.waiting_for_next)
            .unwrap_or(false)
    }

    pub fn paragraph_count(&self) -> usize {
        self.session.as_ref().map(|s| s.paragraphs.len()).unwrap_or(0)
    }

    fn start(&mut self) {
        let paragraphs = split_paragraphs(&self.book_text);
        if paragraphs.is_empty() {
            warn!("Book contains no narratable text");
            return;
        }
        let (start_index, start_at) = self.resolve_start(&paragraphs);
        let request_id = self.bump_request_id();
        self.surface.release();
        let mut session = NarrationSession::new(self.book_id.clone(), paragraphs, request_id);
        session.current_index = start_index;
        self.session = Some(session);
        info!(
            start_index,
            start_secs = start_at.as_secs_f32(),
            "Starting narration"
        );
        self.begin_current_paragraph(start_at);
    }

    fn pause(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.surface.pause();
        let position = self.surface.position();
        let attached = self.surface.is_attached();
        if let Some(session) = self.session.as_mut() {
            session.lifecycle = Lifecycle::Paused;
            session.waiting_for_next = false;
        }
        if attached {
            self.save_position_now(position);
        }
        info!("Paused narration");
    }

    fn resume(&mut self) {
        if self.surface.is_attached() {
            info!("Resuming narration");
            self.surface.resume();
            if let Some(session) = self.session.as_mut() {
                session.lifecycle = Lifecycle::Playing;
            }
        } else {
            // The handle was lost (stall or playback failure); start over from
            // the saved position.
            self.start();
        }
    }

    /// Map the saved position onto the fresh paragraph sequence. A position is
    /// only honored when its recorded text still matches a paragraph;
    /// otherwise narration starts at the beginning.
    fn resolve_start(&self, paragraphs: &[Paragraph]) -> (usize, Duration) {
        let Some(saved) = self.positions.load(&self.book_id) else {
            return (0, Duration::ZERO);
        };
        let key = normalize_key(&saved.paragraph_text);
        match paragraphs.iter().find(|p| normalize_key(&p.text) == key) {
            Some(paragraph) => {
                let offset = saved.time_position_secs.max(0.0);
                debug!(
                    index = paragraph.index,
                    offset_secs = offset,
                    "Resuming from saved position"
                );
                (paragraph.index, Duration::from_secs_f32(offset))
            }
            None => {
                debug!("Saved position no longer matches book text; starting from the beginning");
                (0, Duration::ZERO)
            }
        }
    }

    /// Shared resolve-audio path for start, advance, and start-from-paragraph:
    /// cache hit attaches immediately; a miss enters `Waiting` and hands the
    /// fetch to a worker thread.
    fn begin_current_paragraph(&mut self, start_at: Duration) {
        let Some((index, request_id, text)) = self.session.as_ref().and_then(|session| {
            session
                .current_paragraph()
                .map(|p| (session.current_index, session.request_id, p.text.clone()))
        }) else {
            return;
        };

        if let Some(clip) = self.cache.get(&self.book_id, &text) {
            debug!(index, "Resolved paragraph audio from cache");
            self.attach_and_play(clip, start_at);
            return;
        }

        let mut spawn = true;
        if let Some(session) = self.session.as_mut() {
            session.current_clip = None;
            session.lifecycle = Lifecycle::Waiting;
            session.waiting_for_next = true;
            session.pending_start_at = start_at;
            // A prefetch already in flight for this paragraph doubles as the
            // current resolve; fetching again would duplicate the request.
            if session.preloading && session.prefetched_for.map(|i| i + 1) == Some(index) {
                debug!(index, "Reusing in-flight prefetch as current resolve");
                spawn = false;
            }
        }
        if spawn {
            self.spawn_fetch(request_id, index, ResolveSlot::Current, text);
        }
    }

    fn attach_and_play(&mut self, clip: AudioClip, start_at: Duration) {
        let duration = clip.duration;
        match self.surface.attach(&clip, start_at) {
            Ok(()) => {
                if let Some(session) = self.session.as_mut() {
                    session.current_clip = Some(clip);
                    session.lifecycle = Lifecycle::Playing;
                    session.waiting_for_next = false;
                    session.pending_start_at = Duration::ZERO;
                    session.progress_percent = if duration.is_zero() {
                        0.0
                    } else {
                        ((start_at.as_secs_f32() / duration.as_secs_f32()) * 100.0)
                            .clamp(0.0, 100.0)
                    };
                }
                self.save_position_now(start_at);
            }
            Err(err) => {
                warn!("Playback failed: {err}");
                self.surface.release();
                if let Some(session) = self.session.as_mut() {
                    session.current_clip = None;
                    session.lifecycle = Lifecycle::Paused;
                    session.waiting_for_next = false;
                }
            }
        }
    }

    fn handle_clip_ended(&mut self) {
        let action = {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            if session.is_last_paragraph() {
                session.lifecycle = Lifecycle::Ended;
                session.current_clip = None;
                session.progress_percent = 100.0;
                EndAction::Finished
            } else {
                // Advance before any fetch so a slow response cannot land
                // against a stale index.
                session.current_index += 1;
                session.progress_percent = 0.0;
                session.prefetched_for = None;
                match session.next_clip.take() {
                    Some(clip) => EndAction::Promote(clip),
                    None => {
                        session.current_clip = None;
                        EndAction::Advance
                    }
                }
            }
        };

        match action {
            EndAction::Finished => {
                info!("Narration reached the end of the book");
                self.surface.release();
            }
            EndAction::Promote(clip) => {
                debug!("Promoting prefetched clip; gapless advance");
                self.attach_and_play(clip, Duration::ZERO);
            }
            EndAction::Advance => {
                self.surface.release();
                self.begin_current_paragraph(Duration::ZERO);
            }
        }
    }

    /// Prefetch rule: once the current paragraph crosses the threshold and a
    /// next paragraph exists, resolve its audio without interrupting playback.
    /// Initiated at most once per paragraph, even across repeated ticks above
    /// the threshold.
    fn maybe_prefetch(&mut self, progress: f32) {
        let Some((index, request_id, next_text)) = ({
            let Some(session) = self.session.as_ref() else {
                return;
            };
            if progress < self.settings.prefetch_threshold_percent
                || session.preloading
                || session.next_clip.is_some()
                || session.prefetched_for == Some(session.current_index)
            {
                None
            } else {
                session
                    .paragraphs
                    .get(session.current_index + 1)
                    .map(|next| (session.current_index, session.request_id, next.text.clone()))
            }
        }) else {
            return;
        };

        if let Some(session) = self.session.as_mut() {
            session.prefetched_for = Some(index);
        }
        if let Some(clip) = self.cache.get(&self.book_id, &next_text) {
            debug!(next_index = index + 1, "Prefetched next paragraph from cache");
            if let Some(session) = self.session.as_mut() {
                session.next_clip = Some(clip);
            }
        } else {
            if let Some(session) = self.session.as_mut() {
                session.preloading = true;
            }
            self.spawn_fetch(request_id, index + 1, ResolveSlot::Prefetch, next_text);
        }
    }

    fn spawn_fetch(&self, request_id: u64, index: usize, slot: ResolveSlot, text: String) {
        debug!(index, ?slot, "Resolving paragraph audio from backend");
        let synthesizer = self.synthesizer.clone();
        let voice = self.voice.clone();
        let tx = self.outcomes_tx.clone();
        thread::spawn(move || {
            let result = synthesizer.synthesize(&text, &voice);
            let _ = tx.send(ResolveOutcome {
                request_id,
                index,
                slot,
                text,
                result,
            });
        });
    }

    fn drain_outcomes(&mut self) {
        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            self.handle_outcome(outcome);
        }
    }

    fn handle_outcome(&mut self, outcome: ResolveOutcome) {
        let Some((session_request_id, current, waiting, pending_start_at)) =
            self.session.as_ref().map(|s| {
                (
                    s.request_id,
                    s.current_index,
                    s.waiting_for_next,
                    s.pending_start_at,
                )
            })
        else {
            return;
        };
        if outcome.request_id != session_request_id {
            debug!(
                request_id = outcome.request_id,
                current = session_request_id,
                "Ignoring stale resolve outcome"
            );
            return;
        }

        let audio = match outcome.result {
            Ok(audio) => audio,
            Err(err) => {
                warn!(index = outcome.index, "Synthesis failed: {err}");
                self.resolve_failed(outcome.slot, outcome.index);
                return;
            }
        };

        let clip = match self
            .cache
            .put(&self.book_id, &outcome.text, &audio.bytes, audio.duration)
        {
            Ok(clip) => clip,
            Err(err) => {
                warn!(index = outcome.index, "Failed to store synthesized audio: {err:#}");
                self.resolve_failed(outcome.slot, outcome.index);
                return;
            }
        };

        if outcome.index == current && waiting {
            if outcome.slot == ResolveSlot::Prefetch {
                if let Some(session) = self.session.as_mut() {
                    session.preloading = false;
                }
            }
            self.attach_and_play(clip, pending_start_at);
        } else if outcome.index == current + 1 && outcome.slot == ResolveSlot::Prefetch {
            debug!(index = outcome.index, "Prefetch resolved");
            if let Some(session) = self.session.as_mut() {
                session.preloading = false;
                session.next_clip = Some(clip);
            }
        } else {
            debug!(
                index = outcome.index,
                current, "Discarding resolve outcome for superseded paragraph"
            );
            if outcome.slot == ResolveSlot::Prefetch {
                if let Some(session) = self.session.as_mut() {
                    session.preloading = false;
                }
            }
        }
    }

    /// A failed resolve flips the blocking flags off and leaves narration
    /// stalled at the current paragraph. No automatic retry.
    fn resolve_failed(&mut self, slot: ResolveSlot, index: usize) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if slot == ResolveSlot::Prefetch {
            session.preloading = false;
        }
        if index == session.current_index && session.waiting_for_next {
            session.waiting_for_next = false;
            if session.lifecycle == Lifecycle::Waiting {
                session.lifecycle = Lifecycle::Paused;
            }
        }
    }

    fn skip_by(&mut self, delta_secs: f32) {
        let Some(duration) = self.current_clip_duration() else {
            return;
        };
        if !self.surface.is_attached() || duration.is_zero() {
            return;
        }
        let target = (self.surface.position().as_secs_f32() + delta_secs)
            .clamp(0.0, duration.as_secs_f32());
        self.surface.seek(Duration::from_secs_f32(target));
        if let Some(session) = self.session.as_mut() {
            session.progress_percent =
                ((target / duration.as_secs_f32()) * 100.0).clamp(0.0, 100.0);
        }
    }

    fn maybe_save_position(&mut self, position: Duration) {
        let due = self
            .session
            .as_ref()
            .map(|session| {
                session
                    .last_position_save
                    .map(|at| at.elapsed() >= self.settings.position_save_interval)
                    .unwrap_or(true)
            })
            .unwrap_or(false);
        if due {
            self.save_position_now(position);
        }
    }

    fn save_position_now(&mut self, time: Duration) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(paragraph) = session.paragraphs.get(session.current_index) else {
            return;
        };
        self.positions.save(
            &session.book_id,
            &SavedPosition {
                paragraph_index: session.current_index,
                time_position_secs: time.as_secs_f32(),
                paragraph_text: paragraph.text.clone(),
            },
        );
        session.last_position_save = Some(Instant::now());
    }

    fn current_clip_duration(&self) -> Option<Duration> {
        self.session
            .as_ref()?
            .current_clip
            .as_ref()
            .map(|clip| clip.duration)
    }

    fn bump_request_id(&mut self) -> u64 {
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.next_request_id
    }
}
