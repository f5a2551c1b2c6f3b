//! Extracted page content.
//!
//! `ContentSnapshot` is the fixed schema every extraction routine produces,
//! whether it ran against a local document or inside a remote tab.

use serde::{Deserialize, Serialize};

/// Current version of the snapshot schema.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Default cap on `main_text`, in characters.
pub const MAX_MAIN_TEXT_CHARS: usize = 5000;

/// Characters of surrounding text kept on each side of a selection.
pub const SELECTION_CONTEXT_CHARS: usize = 200;

/// A heading found in the document (h1-h3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// A hyperlink with visible text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub text: String,
    pub href: String,
    #[serde(default)]
    pub title: String,
}

/// The current selection and the text immediately around it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionContext {
    pub selected_text: String,
    pub context_before: String,
    pub context_after: String,
    pub page_title: String,
    pub page_url: String,
}

/// Result of one content acquisition. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSnapshot {
    pub schema_version: u32,
    pub title: String,
    pub url: String,
    /// Whitespace-collapsed and capped main body text.
    pub main_text: String,
    #[serde(default)]
    pub selected_text: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub headings: Vec<Heading>,
    #[serde(default)]
    pub paragraphs: Vec<String>,
    #[serde(default)]
    pub links: Vec<LinkRef>,
    #[serde(default)]
    pub selection_context: Option<SelectionContext>,
    /// Set when `main_text` was cut at the length cap.
    #[serde(default)]
    pub truncated: bool,
}

impl ContentSnapshot {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            title: title.into(),
            url: url.into(),
            main_text: String::new(),
            selected_text: String::new(),
            description: String::new(),
            headings: Vec::new(),
            paragraphs: Vec::new(),
            links: Vec::new(),
            selection_context: None,
            truncated: false,
        }
    }

    /// Hostname of `url`, or `"unknown site"` when it does not parse.
    pub fn domain(&self) -> String {
        domain_of(&self.url).unwrap_or_else(|| "unknown site".to_string())
    }

    /// Selection if present, otherwise the main text.
    pub fn focus_text(&self) -> &str {
        if self.selected_text.trim().is_empty() {
            &self.main_text
        } else {
            &self.selected_text
        }
    }

    pub fn has_text(&self) -> bool {
        !self.main_text.trim().is_empty() || !self.selected_text.trim().is_empty()
    }
}

/// Hostname for a URL string.
pub fn domain_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

/// Collapse every whitespace run into a single space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max_chars` characters, appending `...` when cut.
///
/// Returns the (possibly shortened) text and whether it was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (format!("{}...", &text[..byte_idx]), true),
        None => (text.to_string(), false),
    }
}

/// First `max_chars` characters of `text`, with `...` when shortened.
pub fn preview(text: &str, max_chars: usize) -> String {
    truncate_chars(text, max_chars).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\n b\t c  "), "a b c");
        assert_eq!(normalize_whitespace("\n \t"), "");
    }

    #[test]
    fn test_truncate_marks_cut() {
        let (short, cut) = truncate_chars("hello", 10);
        assert_eq!(short, "hello");
        assert!(!cut);

        let (long, cut) = truncate_chars("hello world", 5);
        assert_eq!(long, "hello...");
        assert!(cut);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let (text, cut) = truncate_chars("héllo wörld", 4);
        assert_eq!(text, "héll...");
        assert!(cut);
    }

    #[test]
    fn test_domain() {
        let snapshot = ContentSnapshot::new("Docs", "https://docs.rs/tokio/latest");
        assert_eq!(snapshot.domain(), "docs.rs");
        assert_eq!(ContentSnapshot::new("x", "not a url").domain(), "unknown site");
    }

    #[test]
    fn test_focus_text_prefers_selection() {
        let mut snapshot = ContentSnapshot::new("T", "https://example.com");
        snapshot.main_text = "body".into();
        assert_eq!(snapshot.focus_text(), "body");
        snapshot.selected_text = "picked".into();
        assert_eq!(snapshot.focus_text(), "picked");
    }
}
