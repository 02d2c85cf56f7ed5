//! Durable per-book cache of synthesized paragraph audio.
//!
//! Entries are keyed by a content hash of the normalized paragraph text and
//! stored under `<root>/<book>/`: the audio payload as `<hash>.mp3`, its
//! metadata as `<hash>.toml`, and an `index.toml` listing the book's hashes in
//! insertion order. A stored entry is only trusted when its recorded text
//! matches the lookup text, so a hash collision degrades to a miss instead of
//! playing the wrong audio.

use crate::paragraphs::normalize_key;
use crate::playback::AudioClip;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub const DEFAULT_MAX_ENTRIES_PER_BOOK: usize = 50;

pub struct SpeechCache {
    root: PathBuf,
    max_entries_per_book: usize,
}

#[derive(Serialize, Deserialize, Default)]
struct CacheIndex {
    entries: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    text: String,
    audio: String,
    duration_secs: f32,
    created_at: u64,
}

impl SpeechCache {
    pub fn new(root: impl Into<PathBuf>, max_entries_per_book: usize) -> Self {
        Self {
            root: root.into(),
            max_entries_per_book: max_entries_per_book.max(1),
        }
    }

    /// Look up previously synthesized audio for a paragraph.
    pub fn get(&self, book_id: &str, text: &str) -> Option<AudioClip> {
        let key = normalize_key(text);
        if key.is_empty() {
            return None;
        }
        let dir = self.book_dir(book_id);
        let hash = content_hash(&key);
        let data = fs::read_to_string(dir.join(format!("{hash}.toml"))).ok()?;
        let entry: CacheEntry = toml::from_str(&data).ok()?;

        if entry.text != key {
            debug!(book_id, hash, "Cached text does not match lookup; treating as miss");
            return None;
        }

        let path = dir.join(&entry.audio);
        if !path.exists() {
            return None;
        }
        Some(AudioClip {
            path,
            duration: Duration::from_secs_f32(entry.duration_secs.max(0.0)),
        })
    }

    /// Store synthesized audio, returning the playable clip. Enforces the
    /// per-book ceiling by deleting oldest entries beyond it.
    pub fn put(
        &self,
        book_id: &str,
        text: &str,
        bytes: &[u8],
        duration: Duration,
    ) -> Result<AudioClip> {
        let key = normalize_key(text);
        let dir = self.book_dir(book_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache dir {}", dir.display()))?;

        let hash = content_hash(&key);
        let audio_name = format!("{hash}.mp3");
        let audio_path = dir.join(&audio_name);
        fs::write(&audio_path, bytes)
            .with_context(|| format!("writing {}", audio_path.display()))?;

        let entry = CacheEntry {
            text: key,
            audio: audio_name,
            duration_secs: duration.as_secs_f32(),
            created_at: now_unix_secs(),
        };
        let serialized = toml::to_string(&entry).context("serializing cache entry")?;
        fs::write(dir.join(format!("{hash}.toml")), serialized)
            .with_context(|| format!("writing cache entry {hash}"))?;

        let mut index = self.load_index(&dir);
        if !index.entries.iter().any(|e| e == &hash) {
            index.entries.push(hash.clone());
        }
        self.enforce_ceiling(&dir, &mut index);
        self.save_index(&dir, &index);

        debug!(book_id, hash, bytes = bytes.len(), "Cached synthesized audio");
        Ok(AudioClip {
            path: audio_path,
            duration,
        })
    }

    /// Delete every cached entry for one book.
    pub fn clear_book(&self, book_id: &str) {
        let dir = self.book_dir(book_id);
        if dir.exists() {
            if let Err(err) = fs::remove_dir_all(&dir) {
                warn!(book_id, "Failed to clear book cache: {err}");
            }
        }
    }

    /// Delete every cached entry for every book.
    pub fn clear_all(&self) {
        if self.root.exists() {
            if let Err(err) = fs::remove_dir_all(&self.root) {
                warn!("Failed to clear speech cache: {err}");
            }
        }
    }

    fn book_dir(&self, book_id: &str) -> PathBuf {
        let simple = !book_id.is_empty()
            && book_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if simple {
            self.root.join(book_id)
        } else {
            // Hash ids that would make awkward directory names.
            self.root.join(&content_hash(book_id)[..16])
        }
    }

    fn load_index(&self, dir: &Path) -> CacheIndex {
        fs::read_to_string(dir.join("index.toml"))
            .ok()
            .and_then(|data| toml::from_str(&data).ok())
            .unwrap_or_default()
    }

    fn save_index(&self, dir: &Path, index: &CacheIndex) {
        // Best-effort: a lost index only costs eviction bookkeeping.
        if let Ok(serialized) = toml::to_string(index) {
            if let Err(err) = fs::write(dir.join("index.toml"), serialized) {
                warn!("Failed to write cache index: {err}");
            }
        }
    }

    fn enforce_ceiling(&self, dir: &Path, index: &mut CacheIndex) {
        if index.entries.len() <= self.max_entries_per_book {
            return;
        }

        let mut dated: Vec<(String, u64)> = index
            .entries
            .iter()
            .map(|hash| {
                let created_at = fs::read_to_string(dir.join(format!("{hash}.toml")))
                    .ok()
                    .and_then(|data| toml::from_str::<CacheEntry>(&data).ok())
                    .map(|entry| entry.created_at)
                    .unwrap_or(0);
                (hash.clone(), created_at)
            })
            .collect();
        // Stable sort keeps insertion order within one timestamp.
        dated.sort_by_key(|(_, created_at)| *created_at);

        let excess = dated.len() - self.max_entries_per_book;
        for (hash, _) in dated.into_iter().take(excess) {
            let _ = fs::remove_file(dir.join(format!("{hash}.toml")));
            let _ = fs::remove_file(dir.join(format!("{hash}.mp3")));
            index.entries.retain(|e| e != &hash);
            debug!(hash, "Evicted oldest cache entry");
        }
    }
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
