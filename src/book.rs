//! Book text provider.
//!
//! Loads the full plain text of a book file. Markdown and plain text are read
//! directly; HTML is flattened with `html2text`, which separates block
//! elements with blank lines and so preserves the paragraph boundaries the
//! narration splitter relies on.

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::Path;
use tracing::info;

pub fn load_book_text(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();

    let text = match extension.as_str() {
        "txt" | "md" | "markdown" => fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        "html" | "htm" | "xhtml" => {
            let contents =
                fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            // Wide enough that lines never wrap mid-paragraph.
            html2text::from_read(contents.as_slice(), 10_000)
                .map_err(|err| anyhow!("extracting text from {}: {err}", path.display()))?
        }
        other => {
            return Err(anyhow!(
                "Unsupported book format '{other}' (expected txt, md, or html): {}",
                path.display()
            ));
        }
    };

    info!(path = %path.display(), chars = text.len(), "Loaded book text");
    Ok(text)
}
