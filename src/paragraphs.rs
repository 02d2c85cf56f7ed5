//! Paragraph segmentation for narration.
//!
//! A paragraph is a blank-line-delimited unit of book text and is the atomic
//! narration segment. Paragraphs are derived fresh each time narration starts;
//! they are matched across sessions by normalized text, never by index alone,
//! since indices shift whenever the book content changes.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static RE_WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\u{00A0}]+").unwrap());

/// One narration segment of the current book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub index: usize,
    pub text: String,
}

/// Split text into paragraphs separated by blank lines. Whitespace-only
/// segments are discarded and the surviving segments are trimmed.
pub fn split_paragraphs(text: &str) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();

    let mut push = |buffer: &mut Vec<&str>, paragraphs: &mut Vec<Paragraph>| {
        if buffer.is_empty() {
            return;
        }
        let joined = buffer.join("\n");
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            paragraphs.push(Paragraph {
                index: paragraphs.len(),
                text: trimmed.to_string(),
            });
        }
        buffer.clear();
    };

    for line in text.lines() {
        if line.trim().is_empty() {
            push(&mut buffer, &mut paragraphs);
        } else {
            buffer.push(line);
        }
    }
    push(&mut buffer, &mut paragraphs);

    paragraphs
}

/// Matching key for cache lookups and saved-position validation: NFC
/// normalization, whitespace runs collapsed to a single space, trimmed.
/// Applied identically on store and lookup so comparisons stay verbatim.
pub fn normalize_key(text: &str) -> String {
    let composed: String = text.nfc().collect();
    RE_WHITESPACE_RUN
        .replace_all(&composed, " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{normalize_key, split_paragraphs};

    #[test]
    fn splits_on_blank_lines() {
        let paragraphs = split_paragraphs("Para one.\n\nPara two.\n\nPara three.");
        let texts: Vec<&str> = paragraphs.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["Para one.", "Para two.", "Para three."]);
        assert_eq!(paragraphs[2].index, 2);
    }

    #[test]
    fn discards_whitespace_only_segments() {
        let paragraphs = split_paragraphs("First.\n\n   \n\t\n\nSecond.\n\n\n");
        let texts: Vec<&str> = paragraphs.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["First.", "Second."]);
    }

    #[test]
    fn keeps_single_newlines_inside_a_paragraph() {
        let paragraphs = split_paragraphs("line one\nline two\n\nnext");
        assert_eq!(paragraphs[0].text, "line one\nline two");
        assert_eq!(paragraphs[1].text, "next");
    }

    #[test]
    fn empty_input_yields_no_paragraphs() {
        assert!(split_paragraphs("").is_empty());
        assert!(split_paragraphs("  \n \n\t").is_empty());
    }

    #[test]
    fn normalization_is_stable_across_whitespace_variants() {
        assert_eq!(
            normalize_key("  A  tale\nof\ttwo cities "),
            normalize_key("A tale of two cities")
        );
    }

    #[test]
    fn normalization_composes_unicode() {
        // "e" + combining acute vs. precomposed "é".
        assert_eq!(normalize_key("caf\u{0065}\u{0301}"), normalize_key("caf\u{00e9}"));
    }
}
