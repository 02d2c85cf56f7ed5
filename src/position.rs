//! Saved narration position per book.
//!
//! One TOML file per book under `<root>/narration/`, last-write-wins. The
//! saved paragraph text is kept alongside the index so a stale position can be
//! detected against the current book content before it is honored. Saves are
//! best-effort; errors are logged and ignored to keep the transport loop
//! responsive.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedPosition {
    pub paragraph_index: usize,
    pub time_position_secs: f32,
    pub paragraph_text: String,
}

pub struct PositionStore {
    root: PathBuf,
}

impl PositionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn load(&self, book_id: &str) -> Option<SavedPosition> {
        let data = fs::read_to_string(self.position_path(book_id)).ok()?;
        toml::from_str(&data).ok()
    }

    pub fn save(&self, book_id: &str, position: &SavedPosition) {
        let path = self.position_path(book_id);
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match toml::to_string(position) {
            Ok(serialized) => {
                if let Err(err) = fs::write(&path, serialized) {
                    warn!(book_id, "Failed to save narration position: {err}");
                }
            }
            Err(err) => warn!(book_id, "Failed to serialize narration position: {err}"),
        }
    }

    pub fn clear(&self, book_id: &str) {
        let path = self.position_path(book_id);
        if path.exists() {
            let _ = fs::remove_file(path);
        }
    }

    pub fn clear_all(&self) {
        let dir = self.root.join("narration");
        if dir.exists() {
            if let Err(err) = fs::remove_dir_all(&dir) {
                warn!("Failed to clear narration positions: {err}");
            }
        }
    }

    fn position_path(&self, book_id: &str) -> PathBuf {
        let simple = !book_id.is_empty()
            && book_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        let name = if simple {
            book_id.to_string()
        } else {
            let mut hasher = Sha256::new();
            hasher.update(book_id.as_bytes());
            format!("{:x}", hasher.finalize())[..16].to_string()
        };
        self.root.join("narration").join(format!("{name}.toml"))
    }
}
