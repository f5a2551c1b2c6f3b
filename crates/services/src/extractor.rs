//! Content extraction from HTML documents.
//!
//! Produces a [`ContentSnapshot`] from a page: title, meta description, the
//! main content region, and optionally headings, paragraphs, links and the
//! text around the current selection.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use shared::content::{
    normalize_whitespace, truncate_chars, ContentSnapshot, Heading, LinkRef, SelectionContext,
};
use shared::error::{AssistantError, Result};
use shared::settings::AssistantSettings;
use std::sync::LazyLock;

use crate::browser::ExtractionRoutine;

/// Content regions, in priority order. First non-empty match wins.
const CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=\"main\"]",
    ".content",
    ".post-content",
    ".entry-content",
    ".article-content",
    ".article-body",
    ".story-body",
    "#content",
    ".main-content",
    ".page-content",
];

/// Internal pages no extension may script.
const RESTRICTED_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "edge://",
    "about:",
    "moz-extension://",
    "view-source:",
    "devtools://",
];

/// Elements whose text never counts as page content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

const MIN_BLOCK_CHARS: usize = 50;
/// Share of link text above which a region reads as navigation.
const MAX_LINK_DENSITY: f64 = 0.5;
const MIN_PARAGRAPH_CHARS: usize = 20;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static CONTENT: LazyLock<Vec<Selector>> =
    LazyLock::new(|| CONTENT_SELECTORS.iter().map(|css| selector(css)).collect());
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| selector("meta[name=\"description\"], meta[property=\"og:description\"]"));
static BODY: LazyLock<Selector> = LazyLock::new(|| selector("body"));
static BLOCKS: LazyLock<Selector> = LazyLock::new(|| selector("p, div"));
static HEADINGS: LazyLock<Selector> = LazyLock::new(|| selector("h1, h2, h3"));
static PARAGRAPHS: LazyLock<Selector> = LazyLock::new(|| selector("p"));
static LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector("a"));

/// A loaded document: its URL, markup and the user's current selection.
#[derive(Debug, Clone, Default)]
pub struct PageDocument {
    pub url: String,
    pub html: String,
    pub selection: Option<String>,
}

impl PageDocument {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            selection: None,
        }
    }

    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = Some(selection.into());
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractorConfig {
    pub max_main_text_chars: usize,
    pub selection_context_chars: usize,
    pub max_longest_blocks: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::from(&AssistantSettings::default())
    }
}

impl From<&AssistantSettings> for ExtractorConfig {
    fn from(settings: &AssistantSettings) -> Self {
        Self {
            max_main_text_chars: settings.max_main_text_chars,
            selection_context_chars: settings.selection_context_chars,
            max_longest_blocks: settings.max_longest_blocks,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentExtractor {
    config: ExtractorConfig,
}

/// The document's `<title>`, whatever the page's URL or content.
pub fn page_title(html: &str) -> String {
    title_of(&Html::parse_document(html))
}

fn title_of(html: &Html) -> String {
    html.select(&TITLE)
        .next()
        .map(|t| normalize_whitespace(&element_text(t)))
        .unwrap_or_default()
}

/// Fail fast on pages that cannot be scripted at all.
pub fn check_access(url: &str) -> Result<()> {
    let lower = url.trim().to_ascii_lowercase();
    if RESTRICTED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return Err(AssistantError::access_denied(
            url,
            "browser-internal pages cannot be read by extensions",
        ));
    }
    Ok(())
}

impl ContentExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, doc: &PageDocument, routine: ExtractionRoutine) -> Result<ContentSnapshot> {
        check_access(&doc.url)?;
        let html = Html::parse_document(&doc.html);

        let mut snapshot = ContentSnapshot::new(title_of(&html), doc.url.clone());
        snapshot.description = html
            .select(&DESCRIPTION)
            .find_map(|m| m.value().attr("content"))
            .map(normalize_whitespace)
            .unwrap_or_default();
        snapshot.selected_text = doc
            .selection
            .as_deref()
            .map(normalize_whitespace)
            .unwrap_or_default();

        let main_text = self.main_text(&html);
        let (main_text, truncated) = truncate_chars(&main_text, self.config.max_main_text_chars);
        snapshot.main_text = main_text;
        snapshot.truncated = truncated;

        match routine {
            ExtractionRoutine::PageSnapshot => {}
            ExtractionRoutine::StructuredDump => {
                snapshot.headings = headings(&html);
                snapshot.paragraphs = paragraphs(&html);
                snapshot.links = links(&html);
            }
            ExtractionRoutine::SelectionContext => {
                snapshot.selection_context = self.selection_context(&html, &snapshot);
            }
        }

        if !snapshot.has_text() {
            return Err(AssistantError::ExtractionEmpty { url: doc.url.clone() });
        }
        Ok(snapshot)
    }

    /// Selector priority, then whole body, then the longest blocks.
    ///
    /// A body that is mostly link text (menus, footers, tag clouds) only wins
    /// when no substantial block survives on its own.
    fn main_text(&self, html: &Html) -> String {
        for sel in CONTENT.iter() {
            if let Some(region) = html.select(sel).next() {
                let text = normalize_whitespace(&element_text(region));
                if !text.is_empty() {
                    return text;
                }
            }
        }

        let Some(body) = html.select(&BODY).next() else {
            return self.longest_blocks(html);
        };
        let text = normalize_whitespace(&element_text(body));
        if !text.is_empty() && link_density(body) <= MAX_LINK_DENSITY {
            return text;
        }

        let blocks = self.longest_blocks(html);
        if blocks.is_empty() {
            text
        } else {
            blocks
        }
    }

    fn longest_blocks(&self, html: &Html) -> String {
        let mut blocks: Vec<String> = html
            .select(&BLOCKS)
            .filter(|b| link_density(*b) <= MAX_LINK_DENSITY)
            .map(|b| normalize_whitespace(&element_text(b)))
            .filter(|t| t.chars().count() > MIN_BLOCK_CHARS)
            .collect();
        blocks.sort_by_key(|b| std::cmp::Reverse(b.chars().count()));
        blocks.truncate(self.config.max_longest_blocks);
        blocks.join("\n\n")
    }

    fn selection_context(&self, html: &Html, snapshot: &ContentSnapshot) -> Option<SelectionContext> {
        if snapshot.selected_text.is_empty() {
            return None;
        }
        let body = html
            .select(&BODY)
            .next()
            .map(|b| normalize_whitespace(&element_text(b)))
            .unwrap_or_default();

        let (before, after) = match body.find(&snapshot.selected_text) {
            Some(start) => {
                let end = start + snapshot.selected_text.len();
                (
                    tail_chars(body[..start].trim_end(), self.config.selection_context_chars),
                    head_chars(body[end..].trim_start(), self.config.selection_context_chars),
                )
            }
            None => (String::new(), String::new()),
        };

        Some(SelectionContext {
            selected_text: snapshot.selected_text.clone(),
            context_before: before,
            context_after: after,
            page_title: snapshot.title.clone(),
            page_url: snapshot.url.clone(),
        })
    }
}

/// Text of an element, skipping script-like children.
fn element_text(element: ElementRef) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                if SKIPPED_ELEMENTS.contains(&el.name()) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    // block boundaries must not glue words together
                    out.push(' ');
                    collect_text(child_el, out);
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Fraction of an element's text that sits inside anchors.
fn link_density(element: ElementRef) -> f64 {
    let total = normalize_whitespace(&element_text(element)).chars().count();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = element
        .select(&ANCHORS)
        .map(|a| normalize_whitespace(&element_text(a)).chars().count())
        .sum();
    linked as f64 / total as f64
}

fn headings(html: &Html) -> Vec<Heading> {
    html.select(&HEADINGS)
        .filter_map(|h| {
            let level = h.value().name()[1..].parse().ok()?;
            let text = normalize_whitespace(&element_text(h));
            (!text.is_empty()).then_some(Heading { level, text })
        })
        .collect()
}

fn paragraphs(html: &Html) -> Vec<String> {
    html.select(&PARAGRAPHS)
        .map(|p| normalize_whitespace(&element_text(p)))
        .filter(|t| t.chars().count() > MIN_PARAGRAPH_CHARS)
        .collect()
}

fn links(html: &Html) -> Vec<LinkRef> {
    html.select(&LINKS)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim().to_string();
            let text = normalize_whitespace(&element_text(a));
            if text.is_empty() || href.is_empty() {
                return None;
            }
            Some(LinkRef {
                text,
                href,
                title: a.value().attr("title").unwrap_or_default().to_string(),
            })
        })
        .collect()
}

fn tail_chars(text: &str, n: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(n)).collect()
}

fn head_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}
