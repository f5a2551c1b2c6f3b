//! Contextual actions raised outside the chat surface's lifetime.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::content::preview;

/// Which contextual action was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Link,
    Selection,
    Page,
    Image,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Link => "link",
            ActionKind::Selection => "selection",
            ActionKind::Page => "page",
            ActionKind::Image => "image",
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "link" => Ok(ActionKind::Link),
            "selection" => Ok(ActionKind::Selection),
            "page" => Ok(ActionKind::Page),
            "image" => Ok(ActionKind::Image),
            other => Err(format!("unknown action kind: {}", other)),
        }
    }
}

/// A contextual request waiting for the chat surface to open.
///
/// Payload fields are optional because each kind uses a different subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl PendingAction {
    fn blank(kind: ActionKind) -> Self {
        Self {
            kind,
            url: None,
            text: None,
            page_url: None,
            page_title: None,
            image_url: None,
            created_at: Utc::now(),
        }
    }

    pub fn link(url: impl Into<String>, link_text: Option<String>) -> Self {
        Self {
            url: Some(url.into()),
            text: link_text.filter(|t| !t.is_empty()),
            ..Self::blank(ActionKind::Link)
        }
    }

    pub fn selection(
        text: impl Into<String>,
        page_url: impl Into<String>,
        page_title: impl Into<String>,
    ) -> Self {
        Self {
            text: Some(text.into()),
            page_url: Some(page_url.into()),
            page_title: Some(page_title.into()),
            ..Self::blank(ActionKind::Selection)
        }
    }

    pub fn page(page_url: impl Into<String>, page_title: impl Into<String>) -> Self {
        Self {
            page_url: Some(page_url.into()),
            page_title: Some(page_title.into()),
            ..Self::blank(ActionKind::Page)
        }
    }

    pub fn image(
        image_url: impl Into<String>,
        page_url: impl Into<String>,
        page_title: impl Into<String>,
    ) -> Self {
        Self {
            image_url: Some(image_url.into()),
            page_url: Some(page_url.into()),
            page_title: Some(page_title.into()),
            ..Self::blank(ActionKind::Image)
        }
    }

    /// Override the creation time.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
    }

    /// True when the action is older than `ttl` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) > ttl
    }

    /// Page title, falling back to the page URL, then to a placeholder.
    pub fn page_label(&self) -> String {
        self.page_title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(self.page_url.as_deref().filter(|u| !u.is_empty()))
            .unwrap_or("this page")
            .to_string()
    }

    /// Short user-facing description of the action being taken.
    pub fn label(&self) -> String {
        match self.kind {
            ActionKind::Link => format!(
                "Explaining content from: {}",
                self.url.as_deref().unwrap_or("unknown link")
            ),
            ActionKind::Selection => format!(
                "Explaining selected text: \"{}\"",
                preview(self.text.as_deref().unwrap_or_default(), 50)
            ),
            ActionKind::Page => format!("Summarizing page: {}", self.page_label()),
            ActionKind::Image => format!("Describing image from: {}", self.page_label()),
        }
    }
}
