use super::{Lifecycle, NarrationController, NarrationSettings, ResolveOutcome, ResolveSlot};
use crate::playback::{AudioClip, PlaybackError, PlaybackSurface};
use crate::position::{PositionStore, SavedPosition};
use crate::speech_cache::SpeechCache;
use crate::synthesis::{SynthesisError, SynthesizedAudio, Synthesizer, VoiceSelector};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const BOOK: &str = "Para one.\n\nPara two.\n\nPara three.";

#[derive(Clone, Default)]
struct FakeSynthesizer {
    calls: Arc<Mutex<Vec<String>>>,
    fail: bool,
    delay: Duration,
}

impl Synthesizer for FakeSynthesizer {
    fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceSelector,
    ) -> Result<SynthesizedAudio, SynthesisError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.calls.lock().unwrap().push(text.to_string());
        if self.fail {
            Err(SynthesisError::MissingAudio)
        } else {
            Ok(SynthesizedAudio {
                bytes: vec![0u8; 16_000],
                duration: Duration::from_secs(1),
            })
        }
    }
}

/// Scripted playback surface: tests drive `position` and `finished` directly.
#[derive(Default)]
struct FakeSurface {
    attached: Option<AudioClip>,
    paused: bool,
    position: Duration,
    finished: bool,
    attach_count: usize,
    events: Vec<&'static str>,
}

impl PlaybackSurface for FakeSurface {
    fn attach(&mut self, clip: &AudioClip, start_at: Duration) -> Result<(), PlaybackError> {
        self.release();
        self.events.push("attach");
        self.attach_count += 1;
        self.attached = Some(clip.clone());
        self.position = start_at;
        self.paused = false;
        self.finished = false;
        Ok(())
    }

    fn pause(&mut self) {
        if self.attached.is_some() {
            self.paused = true;
        }
    }

    fn resume(&mut self) {
        if self.attached.is_some() {
            self.paused = false;
        }
    }

    fn seek(&mut self, position: Duration) {
        if self.attached.is_some() {
            self.position = position;
        }
    }

    fn release(&mut self) {
        if self.attached.take().is_some() {
            self.events.push("release");
            self.position = Duration::ZERO;
            self.finished = false;
        }
    }

    fn position(&self) -> Duration {
        self.position
    }

    fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn is_finished(&self) -> bool {
        self.attached.is_some() && self.finished
    }
}

type TestController = NarrationController<FakeSynthesizer, FakeSurface>;

struct Harness {
    _dir: TempDir,
    controller: TestController,
    calls: Arc<Mutex<Vec<String>>>,
}

fn harness(book_text: &str) -> Harness {
    harness_with(book_text, FakeSynthesizer::default())
}

fn harness_with(book_text: &str, synthesizer: FakeSynthesizer) -> Harness {
    let dir = TempDir::new().unwrap();
    let calls = synthesizer.calls.clone();
    let controller = NarrationController::new(
        "book-1",
        VoiceSelector::new("narrator"),
        book_text.to_string(),
        SpeechCache::new(dir.path().join("speech"), 50),
        PositionStore::new(dir.path()),
        synthesizer,
        FakeSurface::default(),
        NarrationSettings::default(),
    );
    Harness {
        _dir: dir,
        controller,
        calls,
    }
}

impl Harness {
    fn seed_cache(&self, text: &str, duration: Duration) {
        self.controller
            .cache
            .put("book-1", text, b"seeded", duration)
            .unwrap();
    }

    fn seed_whole_book(&self) {
        for text in ["Para one.", "Para two.", "Para three."] {
            self.seed_cache(text, Duration::from_secs(1));
        }
    }

    fn synth_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn pump_until(controller: &mut TestController, pred: impl Fn(&TestController) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        controller.tick();
        if pred(controller) {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for controller state"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn starts_at_beginning_without_saved_position() {
    let mut h = harness(BOOK);
    h.seed_whole_book();

    h.controller.toggle_narration();

    assert!(h.controller.is_playing());
    assert_eq!(h.controller.current_paragraph_index(), Some(0));
    assert!(h.controller.surface.is_attached());
    assert_eq!(h.controller.surface.position, Duration::ZERO);
    assert!(h.synth_calls().is_empty(), "cache hits need no synthesis");
}

#[test]
fn resume_honors_saved_position_with_matching_text() {
    let mut h = harness(BOOK);
    for text in ["Para one.", "Para two.", "Para three."] {
        h.seed_cache(text, Duration::from_secs(10));
    }
    h.controller.positions.save(
        "book-1",
        &SavedPosition {
            paragraph_index: 1,
            time_position_secs: 3.0,
            paragraph_text: "Para two.".to_string(),
        },
    );

    h.controller.toggle_narration();

    assert_eq!(h.controller.current_paragraph_index(), Some(1));
    assert_eq!(h.controller.surface.position, Duration::from_secs_f32(3.0));
    assert!(h.controller.is_playing());
}

#[test]
fn mismatched_saved_text_falls_back_to_start() {
    let mut h = harness(BOOK);
    h.seed_whole_book();
    h.controller.positions.save(
        "book-1",
        &SavedPosition {
            paragraph_index: 1,
            time_position_secs: 3.0,
            paragraph_text: "This paragraph no longer exists.".to_string(),
        },
    );

    h.controller.toggle_narration();

    assert_eq!(h.controller.current_paragraph_index(), Some(0));
    assert_eq!(h.controller.surface.position, Duration::ZERO);
}

#[test]
fn saved_position_matches_by_text_not_stale_index() {
    let mut h = harness(BOOK);
    h.seed_whole_book();
    h.controller.positions.save(
        "book-1",
        &SavedPosition {
            paragraph_index: 99,
            time_position_secs: 0.0,
            paragraph_text: "Para three.".to_string(),
        },
    );

    h.controller.toggle_narration();

    assert_eq!(h.controller.current_paragraph_index(), Some(2));
}

#[test]
fn gapless_advance_promotes_prefetched_clip() {
    let mut h = harness(BOOK);
    h.seed_whole_book();
    h.controller.toggle_narration();

    // Cross the prefetch threshold; the next clip resolves from cache.
    h.controller.surface.position = Duration::from_secs_f32(0.8);
    h.controller.tick();
    assert!(h.controller.session.as_ref().unwrap().next_clip.is_some());

    h.controller.surface.finished = true;
    h.controller.tick();

    assert_eq!(h.controller.current_paragraph_index(), Some(1));
    assert!(h.controller.is_playing());
    assert!(h.synth_calls().is_empty(), "advance must not hit the network");
    // The prior clip was released before the new one attached.
    assert_eq!(
        h.controller.surface.events,
        vec!["attach", "release", "attach"]
    );
}

#[test]
fn prefetch_not_initiated_below_threshold() {
    let mut h = harness(BOOK);
    h.seed_cache("Para one.", Duration::from_secs(1));
    h.controller.toggle_narration();

    for position in [0.1, 0.5, 0.74] {
        h.controller.surface.position = Duration::from_secs_f32(position);
        h.controller.tick();
    }

    let session = h.controller.session.as_ref().unwrap();
    assert!(session.next_clip.is_none());
    assert!(session.prefetched_for.is_none());
    assert!(!session.preloading);
    assert!(h.synth_calls().is_empty());
}

#[test]
fn prefetch_initiated_exactly_once_per_paragraph() {
    let mut h = harness(BOOK);
    h.seed_cache("Para one.", Duration::from_secs(1));
    h.controller.toggle_narration();

    // Repeated ticks above the threshold must spawn a single resolve.
    h.controller.surface.position = Duration::from_secs_f32(0.8);
    for _ in 0..5 {
        h.controller.tick();
    }
    pump_until(&mut h.controller, |c| {
        c.session.as_ref().unwrap().next_clip.is_some()
    });
    h.controller.surface.position = Duration::from_secs_f32(0.9);
    h.controller.tick();

    assert_eq!(h.synth_calls(), vec!["Para two.".to_string()]);
}

#[test]
fn advance_without_prefetch_issues_exactly_one_resolve() {
    let mut h = harness(BOOK);
    h.seed_cache("Para one.", Duration::from_secs(1));
    h.controller.toggle_narration();
    assert!(h.controller.is_playing());

    // End paragraph one before any prefetch fired.
    h.controller.surface.finished = true;
    h.controller.tick();

    // Index advanced before the fetch resolved.
    assert_eq!(h.controller.current_paragraph_index(), Some(1));
    assert!(h.controller.is_waiting_for_next_paragraph());
    assert!(!h.controller.is_playing());

    pump_until(&mut h.controller, |c| c.is_playing());
    assert_eq!(h.synth_calls(), vec!["Para two.".to_string()]);
    assert!(!h.controller.is_waiting_for_next_paragraph());
}

#[test]
fn end_of_book_stops_without_further_resolves() {
    let mut h = harness("Only paragraph.");
    h.seed_cache("Only paragraph.", Duration::from_secs(1));
    h.controller.toggle_narration();

    h.controller.surface.finished = true;
    h.controller.tick();

    assert!(!h.controller.is_playing());
    assert!(!h.controller.surface.is_attached());
    for _ in 0..3 {
        h.controller.tick();
    }
    assert!(h.synth_calls().is_empty());
}

#[test]
fn pause_resume_restores_exact_position() {
    let mut h = harness(BOOK);
    h.seed_whole_book();
    h.controller.toggle_narration();
    h.controller.surface.position = Duration::from_secs_f32(0.42);

    h.controller.toggle_narration();
    assert!(!h.controller.is_playing());
    assert!(h.controller.surface.is_paused());
    assert!(h.controller.surface.is_attached(), "pause keeps the handle");

    h.controller.toggle_narration();
    assert!(h.controller.is_playing());
    assert_eq!(h.controller.surface.attach_count, 1, "resume must not re-attach");
    assert_eq!(h.controller.surface.position, Duration::from_secs_f32(0.42));
}

#[test]
fn seek_clamps_and_never_starts_playback() {
    let mut h = harness(BOOK);
    h.seed_cache("Para one.", Duration::from_secs(2));
    h.controller.toggle_narration();
    h.controller.toggle_narration();
    assert!(!h.controller.is_playing());

    h.controller.seek_to_percent(150.0);
    assert_eq!(h.controller.surface.position, Duration::from_secs(2));
    assert!(!h.controller.is_playing());
    assert!(h.controller.surface.is_paused());

    h.controller.seek_to_percent(25.0);
    assert_eq!(h.controller.surface.position, Duration::from_secs_f32(0.5));
    assert!(!h.controller.is_playing());
}

#[test]
fn seek_resumes_when_playing_before_the_gesture() {
    let mut h = harness(BOOK);
    h.seed_cache("Para one.", Duration::from_secs(2));
    h.controller.toggle_narration();
    assert!(h.controller.is_playing());

    h.controller.seek_to_percent(50.0);
    assert_eq!(h.controller.surface.position, Duration::from_secs(1));
    assert!(h.controller.is_playing());
    assert!(!h.controller.surface.is_paused());
}

#[test]
fn skip_stays_within_the_current_paragraph() {
    let mut h = harness(BOOK);
    h.seed_cache("Para one.", Duration::from_secs(30));
    h.controller.toggle_narration();

    h.controller.surface.position = Duration::from_secs(5);
    h.controller.skip_backward();
    assert_eq!(h.controller.surface.position, Duration::ZERO);
    assert_eq!(h.controller.current_paragraph_index(), Some(0));

    h.controller.surface.position = Duration::from_secs(25);
    h.controller.skip_forward();
    assert_eq!(h.controller.surface.position, Duration::from_secs(30));
    assert_eq!(h.controller.current_paragraph_index(), Some(0));
}

#[test]
fn start_from_paragraph_bypasses_saved_position() {
    let mut h = harness(BOOK);
    h.seed_whole_book();
    h.controller.positions.save(
        "book-1",
        &SavedPosition {
            paragraph_index: 0,
            time_position_secs: 0.5,
            paragraph_text: "Para one.".to_string(),
        },
    );

    let paragraphs = crate::paragraphs::split_paragraphs(BOOK);
    h.controller.start_from_paragraph(2, paragraphs);

    assert_eq!(h.controller.current_paragraph_index(), Some(2));
    assert_eq!(h.controller.surface.position, Duration::ZERO);
    assert!(h.controller.is_playing());
}

#[test]
fn stale_resolve_outcomes_are_discarded() {
    let mut h = harness(BOOK);
    h.seed_whole_book();
    h.controller.toggle_narration();
    let attach_count = h.controller.surface.attach_count;

    h.controller
        .outcomes_tx
        .send(ResolveOutcome {
            request_id: 999,
            index: 0,
            slot: ResolveSlot::Current,
            text: "Para one.".to_string(),
            result: Ok(SynthesizedAudio {
                bytes: vec![0u8; 100],
                duration: Duration::from_secs(1),
            }),
        })
        .unwrap();
    h.controller.tick();

    assert_eq!(h.controller.surface.attach_count, attach_count);
    assert_eq!(h.controller.current_paragraph_index(), Some(0));
}

#[test]
fn synthesis_failure_stalls_without_retry() {
    let mut h = harness_with(
        BOOK,
        FakeSynthesizer {
            fail: true,
            ..FakeSynthesizer::default()
        },
    );

    h.controller.toggle_narration();
    pump_until(&mut h.controller, |c| {
        !c.is_waiting_for_next_paragraph()
    });

    assert!(!h.controller.is_playing());
    assert!(!h.controller.surface.is_attached());
    assert_eq!(
        h.controller.session.as_ref().unwrap().lifecycle,
        Lifecycle::Paused
    );
    let calls_after_failure = h.synth_calls().len();
    assert_eq!(calls_after_failure, 1);
    for _ in 0..5 {
        h.controller.tick();
    }
    assert_eq!(h.synth_calls().len(), calls_after_failure, "no automatic retry");
}

#[test]
fn advance_reuses_inflight_prefetch_instead_of_refetching() {
    let mut h = harness_with(
        BOOK,
        FakeSynthesizer {
            delay: Duration::from_millis(150),
            ..FakeSynthesizer::default()
        },
    );
    h.seed_cache("Para one.", Duration::from_secs(1));
    h.controller.toggle_narration();

    // Trigger the prefetch, then end the paragraph while it is in flight.
    h.controller.surface.position = Duration::from_secs_f32(0.8);
    h.controller.tick();
    assert!(h.controller.session.as_ref().unwrap().preloading);
    h.controller.surface.finished = true;
    h.controller.tick();

    assert_eq!(h.controller.current_paragraph_index(), Some(1));
    assert!(h.controller.is_waiting_for_next_paragraph());

    pump_until(&mut h.controller, |c| c.is_playing());
    assert_eq!(
        h.synth_calls(),
        vec!["Para two.".to_string()],
        "the in-flight prefetch doubles as the current resolve"
    );
}

#[test]
fn position_saved_on_index_change_and_throttled_between() {
    let mut h = harness(BOOK);
    h.seed_whole_book();
    h.controller.toggle_narration();

    let saved = h.controller.positions.load("book-1").expect("saved on start");
    assert_eq!(saved.paragraph_index, 0);
    assert_eq!(saved.time_position_secs, 0.0);

    // Within the save interval the position on disk does not move.
    h.controller.surface.position = Duration::from_secs_f32(0.3);
    h.controller.tick();
    let saved = h.controller.positions.load("book-1").unwrap();
    assert_eq!(saved.time_position_secs, 0.0);

    // Once the save is due again the next tick persists the offset.
    h.controller.session.as_mut().unwrap().last_position_save = None;
    h.controller.tick();
    let saved = h.controller.positions.load("book-1").unwrap();
    assert!((saved.time_position_secs - 0.3).abs() < 1e-6);

    // Advancing to the next paragraph saves immediately.
    h.controller.surface.position = Duration::from_secs_f32(0.9);
    h.controller.tick();
    h.controller.surface.finished = true;
    h.controller.tick();
    let saved = h.controller.positions.load("book-1").unwrap();
    assert_eq!(saved.paragraph_index, 1);
    assert_eq!(saved.paragraph_text, "Para two.");
}

#[test]
fn stop_saves_position_and_tears_down() {
    let mut h = harness(BOOK);
    h.seed_whole_book();
    h.controller.toggle_narration();
    h.controller.surface.position = Duration::from_secs_f32(1.2);

    h.controller.stop();

    assert!(h.controller.session.is_none());
    assert!(!h.controller.surface.is_attached());
    let saved = h.controller.positions.load("book-1").unwrap();
    assert!((saved.time_position_secs - 1.2).abs() < 1e-6);

    // A fresh session can be created afterwards.
    h.controller.toggle_narration();
    assert!(h.controller.is_playing());
}

#[test]
fn clear_book_data_drops_cache_and_position() {
    let mut h = harness(BOOK);
    h.seed_whole_book();
    h.controller.toggle_narration();
    h.controller.stop();

    h.controller.clear_book_data();

    assert!(h.controller.positions.load("book-1").is_none());
    assert!(h.controller.cache.get("book-1", "Para one.").is_none());
}
