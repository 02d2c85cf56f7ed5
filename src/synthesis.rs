//! Text-to-speech synthesis over the HTTP backend.
//!
//! The backend accepts `POST /synthesize` with `{ "text": ..., "bookId": ... }`
//! and answers `{ "audio": <data URI or URL>, "duration": <seconds> }`. The
//! `bookId` field carries the voice selector; the server maps it to a voice.
//! The client never retries; retry policy belongs to the caller.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Assumed bitrate when the backend omits a duration. The duration derived
/// from payload size at this bitrate is an approximation, not a measurement
/// of the decoded audio.
pub const DEFAULT_FALLBACK_BITRATE_KBPS: u32 = 128;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("synthesis request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("synthesis backend returned status {status}")]
    Backend { status: reqwest::StatusCode },
    #[error("synthesis response carried no audio payload")]
    MissingAudio,
    #[error("invalid audio payload: {0}")]
    InvalidPayload(String),
}

/// Per-book identifier used to choose a synthesis voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSelector(String);

impl VoiceSelector {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Synthesized audio bytes plus the duration reported (or estimated) for them.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub duration: Duration,
}

/// Seam between the narration controller and the synthesis backend.
pub trait Synthesizer {
    fn synthesize(&self, text: &str, voice: &VoiceSelector)
    -> Result<SynthesizedAudio, SynthesisError>;
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    #[serde(rename = "bookId")]
    book_id: &'a str,
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    audio: Option<String>,
    duration: Option<f64>,
}

#[derive(Clone)]
pub struct HttpSynthesizer {
    client: reqwest::blocking::Client,
    base_url: String,
    fallback_bitrate_kbps: u32,
}

impl HttpSynthesizer {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        fallback_bitrate_kbps: u32,
    ) -> Result<Self, SynthesisError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fallback_bitrate_kbps: fallback_bitrate_kbps.max(1),
        })
    }

    fn fetch_payload(&self, audio: &str) -> Result<Vec<u8>, SynthesisError> {
        if audio.starts_with("data:") {
            return decode_data_uri(audio);
        }
        if audio.starts_with("http://") || audio.starts_with("https://") {
            let response = self.client.get(audio).send()?;
            if !response.status().is_success() {
                return Err(SynthesisError::Backend {
                    status: response.status(),
                });
            }
            return Ok(response.bytes()?.to_vec());
        }
        Err(SynthesisError::InvalidPayload(format!(
            "unrecognized audio reference: {}",
            audio.chars().take(32).collect::<String>()
        )))
    }
}

impl Synthesizer for HttpSynthesizer {
    fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSelector,
    ) -> Result<SynthesizedAudio, SynthesisError> {
        let url = format!("{}/synthesize", self.base_url);
        let body = SynthesizeRequest {
            text,
            book_id: voice.as_str(),
        };
        debug!(voice = voice.as_str(), chars = text.len(), "Requesting synthesis");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(&body).map_err(|err| {
                SynthesisError::InvalidPayload(format!("encoding request: {err}"))
            })?)
            .send()?;
        if !response.status().is_success() {
            return Err(SynthesisError::Backend {
                status: response.status(),
            });
        }

        let raw = response.bytes()?;
        let parsed: SynthesizeResponse = serde_json::from_slice(&raw)
            .map_err(|err| SynthesisError::InvalidPayload(err.to_string()))?;
        let audio = parsed.audio.ok_or(SynthesisError::MissingAudio)?;
        let bytes = self.fetch_payload(&audio)?;
        if bytes.is_empty() {
            return Err(SynthesisError::MissingAudio);
        }

        let duration = parsed
            .duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or_else(|| estimate_duration(bytes.len(), self.fallback_bitrate_kbps));

        debug!(
            bytes = bytes.len(),
            duration_secs = duration.as_secs_f32(),
            "Synthesis complete"
        );
        Ok(SynthesizedAudio { bytes, duration })
    }
}

fn decode_data_uri(uri: &str) -> Result<Vec<u8>, SynthesisError> {
    let encoded = uri
        .split_once(";base64,")
        .map(|(_, rest)| rest)
        .ok_or_else(|| {
            SynthesisError::InvalidPayload("data URI is not base64-encoded".to_string())
        })?;
    BASE64
        .decode(encoded.trim())
        .map_err(|err| SynthesisError::InvalidPayload(format!("base64: {err}")))
}

/// Duration at an assumed constant bitrate: `bytes * 8 / (kbps * 1000)`.
fn estimate_duration(byte_len: usize, bitrate_kbps: u32) -> Duration {
    let bits = byte_len as f64 * 8.0;
    Duration::from_secs_f64(bits / (bitrate_kbps.max(1) as f64 * 1000.0))
}
