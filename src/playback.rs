//! Single-sink audio output.
//!
//! The narration controller talks to a `PlaybackSurface` holding at most one
//! live audio resource. Attaching a new clip always releases the prior one
//! first, so two clips can never play concurrently. Progress is computed by
//! the caller against the clip's metadata duration, not the decoder's own
//! reported duration, because the metadata duration is known before the
//! resource finishes loading.

use rodio::{Decoder, OutputStream, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// A playable audio resource: the synthesized file plus its metadata duration.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub path: PathBuf,
    pub duration: Duration,
}

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("failed to open audio output: {0}")]
    Output(String),
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
}

/// Abstraction over one platform audio output resource.
pub trait PlaybackSurface {
    /// Attach and start playing a clip, releasing any prior clip first.
    fn attach(&mut self, clip: &AudioClip, start_at: Duration) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn seek(&mut self, position: Duration);
    fn release(&mut self);
    /// Playback position within the attached clip.
    fn position(&self) -> Duration;
    fn is_attached(&self) -> bool;
    fn is_paused(&self) -> bool;
    /// True once the attached clip has played to its end.
    fn is_finished(&self) -> bool;
}

/// `rodio`-backed surface. The output stream and sink live and die together;
/// dropping them detaches the platform resource.
pub struct RodioSurface {
    active: Option<ActiveSink>,
}

struct ActiveSink {
    _stream: OutputStream,
    sink: Sink,
}

impl RodioSurface {
    pub fn new() -> Self {
        Self { active: None }
    }
}

impl Default for RodioSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSurface for RodioSurface {
    fn attach(&mut self, clip: &AudioClip, start_at: Duration) -> Result<(), PlaybackError> {
        self.release();

        let (stream, handle) = OutputStream::try_default()
            .map_err(|err| PlaybackError::Output(err.to_string()))?;
        let sink =
            Sink::try_new(&handle).map_err(|err| PlaybackError::Output(err.to_string()))?;

        let file = File::open(&clip.path).map_err(|err| PlaybackError::Decode {
            path: clip.path.clone(),
            message: err.to_string(),
        })?;
        let source = Decoder::new(BufReader::new(file)).map_err(|err| PlaybackError::Decode {
            path: clip.path.clone(),
            message: err.to_string(),
        })?;
        sink.append(source);

        if start_at > Duration::ZERO {
            if let Err(err) = sink.try_seek(start_at) {
                warn!(start_secs = start_at.as_secs_f32(), "Seek on attach failed: {err}");
            }
        }
        sink.play();
        debug!(path = %clip.path.display(), start_secs = start_at.as_secs_f32(), "Attached clip");

        self.active = Some(ActiveSink {
            _stream: stream,
            sink,
        });
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(active) = &self.active {
            active.sink.pause();
        }
    }

    fn resume(&mut self) {
        if let Some(active) = &self.active {
            active.sink.play();
        }
    }

    fn seek(&mut self, position: Duration) {
        if let Some(active) = &self.active {
            if let Err(err) = active.sink.try_seek(position) {
                warn!(secs = position.as_secs_f32(), "Seek failed: {err}");
            }
        }
    }

    fn release(&mut self) {
        if let Some(active) = self.active.take() {
            active.sink.stop();
            debug!("Released audio sink");
        }
    }

    fn position(&self) -> Duration {
        self.active
            .as_ref()
            .map(|active| active.sink.get_pos())
            .unwrap_or(Duration::ZERO)
    }

    fn is_attached(&self) -> bool {
        self.active.is_some()
    }

    fn is_paused(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| active.sink.is_paused())
            .unwrap_or(false)
    }

    fn is_finished(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| active.sink.empty())
            .unwrap_or(false)
    }
}
