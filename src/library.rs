//! Book identity and per-book voice metadata.
//!
//! Known books are listed in `conf/library.toml` with a stable id, title,
//! author, and the voice their narration should use. A book file not listed
//! there still narrates: it gets an id derived from a hash of its path and the
//! configured default voice.

use crate::synthesis::VoiceSelector;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const DEFAULT_LIBRARY_PATH: &str = "conf/library.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BookEntry {
    pub id: String,
    pub title: String,
    pub path: PathBuf,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
struct LibraryFile {
    book: Vec<BookEntry>,
}

pub struct Library {
    books: Vec<BookEntry>,
}

impl Library {
    pub fn load_default() -> Self {
        Self::load(Path::new(DEFAULT_LIBRARY_PATH))
    }

    pub fn load(path: &Path) -> Self {
        let Ok(contents) = fs::read_to_string(path) else {
            return Self { books: Vec::new() };
        };
        match toml::from_str::<LibraryFile>(&contents) {
            Ok(file) => Self { books: file.book },
            Err(err) => {
                warn!(
                    path = %path.display(),
                    "Invalid library TOML; continuing without metadata: {err}"
                );
                Self { books: Vec::new() }
            }
        }
    }

    /// Resolve metadata for a book file, falling back to a derived identity
    /// when the path is not listed.
    pub fn resolve(&self, book_path: &Path) -> BookEntry {
        if let Some(entry) = self.books.iter().find(|b| b.path == book_path) {
            return entry.clone();
        }

        let mut hasher = Sha256::new();
        hasher.update(book_path.as_os_str().to_string_lossy().as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        let title = book_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        BookEntry {
            id: format!("book-{}", &hash[..16]),
            title,
            path: book_path.to_path_buf(),
            author: None,
            voice_id: None,
        }
    }
}

impl BookEntry {
    /// Voice selector sent to the synthesis backend: the configured per-book
    /// voice when present, otherwise the default voice.
    pub fn voice_selector(&self, default_voice: &str) -> VoiceSelector {
        let voice = self
            .voice_id
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(default_voice);
        if voice.trim().is_empty() {
            VoiceSelector::new(self.id.clone())
        } else {
            VoiceSelector::new(voice.trim())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_listed_books_by_path() {
        let library = Library {
            books: vec![BookEntry {
                id: "feynman-lectures".to_string(),
                title: "The Feynman Lectures On Physics".to_string(),
                path: PathBuf::from("books/feynman.md"),
                author: Some("Richard P. Feynman".to_string()),
                voice_id: Some("CLYGFM7xUpqUpCICyooH".to_string()),
            }],
        };
        let entry = library.resolve(Path::new("books/feynman.md"));
        assert_eq!(entry.id, "feynman-lectures");
        assert_eq!(entry.voice_selector("narrator").as_str(), "CLYGFM7xUpqUpCICyooH");
    }

    #[test]
    fn unlisted_books_get_derived_identity_and_default_voice() {
        let library = Library { books: Vec::new() };
        let entry = library.resolve(Path::new("books/unknown.txt"));
        assert!(entry.id.starts_with("book-"));
        assert_eq!(entry.title, "unknown");
        assert_eq!(entry.voice_selector("narrator").as_str(), "narrator");
    }

    #[test]
    fn derived_identity_is_stable() {
        let library = Library { books: Vec::new() };
        let a = library.resolve(Path::new("books/unknown.txt"));
        let b = library.resolve(Path::new("books/unknown.txt"));
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn blank_default_voice_falls_back_to_book_id() {
        let library = Library { books: Vec::new() };
        let entry = library.resolve(Path::new("books/unknown.txt"));
        assert_eq!(entry.voice_selector("").as_str(), entry.id);
    }
}
