//! Contracts of the browser-side collaborators.
//!
//! The orchestration core never talks to a browser directly. It goes through
//! these traits, which a real extension bridge, the in-process
//! [`crate::headless::HeadlessBrowser`] or a test fake can implement.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::content::ContentSnapshot;
use shared::error::AssistantError;
use tokio::sync::broadcast;

pub type TabId = u64;
pub type WindowId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: WindowId,
    pub url: String,
    pub title: String,
    pub status: TabStatus,
    pub active: bool,
}

/// Load-state notification for one tab.
#[derive(Debug, Clone, PartialEq)]
pub struct TabUpdate {
    pub tab_id: TabId,
    pub status: TabStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTab {
    pub url: String,
    pub window_id: Option<WindowId>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Normal,
    Minimized,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateWindow {
    pub url: String,
    pub focused: bool,
    pub state: WindowState,
}

/// A freshly created window and the tab it was opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedWindow {
    pub window_id: WindowId,
    pub tab: TabInfo,
}

/// Self-contained extraction routines that can run inside a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionRoutine {
    /// Title, description, main text and current selection.
    PageSnapshot,
    /// Page snapshot plus headings, paragraphs and links.
    StructuredDump,
    /// Current selection with the text around it.
    SelectionContext,
}

#[async_trait]
pub trait ActiveTabProvider: Send + Sync {
    async fn active_tab(&self) -> Result<Option<TabInfo>>;
}

#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Run `routine` in the tab's document. Restricted pages fail with
    /// `AccessDenied`.
    async fn execute(
        &self,
        tab: TabId,
        routine: ExtractionRoutine,
    ) -> Result<ContentSnapshot, AssistantError>;
}

#[async_trait]
pub trait TabLifecycle: Send + Sync {
    async fn query_by_url(&self, url: &str) -> Result<Vec<TabInfo>>;
    async fn list_windows(&self) -> Result<Vec<WindowId>>;
    async fn create_tab(&self, request: CreateTab) -> Result<TabInfo>;
    async fn create_window(&self, request: CreateWindow) -> Result<CreatedWindow>;
    async fn remove_tab(&self, tab: TabId) -> Result<()>;
    async fn remove_window(&self, window: WindowId) -> Result<()>;
    /// Load-state notifications for every tab.
    fn subscribe(&self) -> broadcast::Receiver<TabUpdate>;
}

/// Durable key-value storage surviving UI lifetimes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Raw bytes with the declared content type.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBinary {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait BinaryFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedBinary>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionStatus {
    pub active_tab: bool,
    pub scripting: bool,
    pub storage: bool,
}

impl PermissionStatus {
    pub fn all_granted(&self) -> bool {
        self.active_tab && self.scripting && self.storage
    }
}

#[async_trait]
pub trait PermissionQuery: Send + Sync {
    async fn permissions(&self) -> Result<PermissionStatus>;
}

/// Fixed permission answer, for hosts where access is decided up front.
pub struct StaticPermissions(pub PermissionStatus);

impl StaticPermissions {
    pub fn granted() -> Self {
        Self(PermissionStatus {
            active_tab: true,
            scripting: true,
            storage: true,
        })
    }
}

#[async_trait]
impl PermissionQuery for StaticPermissions {
    async fn permissions(&self) -> Result<PermissionStatus> {
        Ok(self.0)
    }
}
