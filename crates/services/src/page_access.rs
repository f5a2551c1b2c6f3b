use shared::content::{ContentSnapshot, SelectionContext};
use shared::error::{AssistantError, Result};
use std::sync::Arc;
use tracing::debug;

use crate::browser::{ActiveTabProvider, ExtractionRoutine, ScriptExecutor, TabInfo};
use crate::extractor::check_access;

/// Reads content from whatever tab is currently focused.
pub struct PageAccess {
    tabs: Arc<dyn ActiveTabProvider>,
    scripts: Arc<dyn ScriptExecutor>,
}

impl PageAccess {
    pub fn new(tabs: Arc<dyn ActiveTabProvider>, scripts: Arc<dyn ScriptExecutor>) -> Self {
        Self { tabs, scripts }
    }

    /// Title and URL of the active tab, without touching its document.
    pub async fn basics(&self) -> Result<TabInfo> {
        self.tabs.active_tab().await?.ok_or(AssistantError::NoActiveTab)
    }

    /// Title, description, main text and selection of the active tab.
    pub async fn snapshot(&self) -> Result<ContentSnapshot> {
        self.run(ExtractionRoutine::PageSnapshot).await
    }

    /// Snapshot plus headings, paragraphs and links.
    pub async fn structured_dump(&self) -> Result<ContentSnapshot> {
        self.run(ExtractionRoutine::StructuredDump).await
    }

    /// The active tab's selection and the text around it, if any.
    pub async fn selection_context(&self) -> Result<Option<SelectionContext>> {
        Ok(self.run(ExtractionRoutine::SelectionContext).await?.selection_context)
    }

    async fn run(&self, routine: ExtractionRoutine) -> Result<ContentSnapshot> {
        let tab = self.basics().await?;
        check_access(&tab.url)?;
        debug!(tab = tab.id, ?routine, "extracting from active tab");
        self.scripts.execute(tab.id, routine).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{TabId, TabStatus};
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct OneTab(Option<TabInfo>);

    #[async_trait]
    impl ActiveTabProvider for OneTab {
        async fn active_tab(&self) -> anyhow::Result<Option<TabInfo>> {
            Ok(self.0.clone())
        }
    }

    struct Scripts;

    #[async_trait]
    impl ScriptExecutor for Scripts {
        async fn execute(&self, tab: TabId, routine: ExtractionRoutine) -> Result<ContentSnapshot> {
            if tab != 1 {
                return Err(anyhow!("no such tab").into());
            }
            let mut snapshot = ContentSnapshot::new("Page", "https://page.test");
            snapshot.main_text = "body".into();
            if routine == ExtractionRoutine::SelectionContext {
                snapshot.selected_text = "sel".into();
                snapshot.selection_context = Some(SelectionContext {
                    selected_text: "sel".into(),
                    ..Default::default()
                });
            }
            Ok(snapshot)
        }
    }

    fn tab(url: &str) -> TabInfo {
        TabInfo {
            id: 1,
            window_id: 1,
            url: url.into(),
            title: "Page".into(),
            status: TabStatus::Complete,
            active: true,
        }
    }

    #[tokio::test]
    async fn test_no_active_tab() {
        let access = PageAccess::new(Arc::new(OneTab(None)), Arc::new(Scripts));
        assert_eq!(access.snapshot().await.unwrap_err().kind(), "no_active_tab");
    }

    #[tokio::test]
    async fn test_restricted_active_tab() {
        let access = PageAccess::new(Arc::new(OneTab(Some(tab("edge://settings")))), Arc::new(Scripts));
        assert_eq!(access.structured_dump().await.unwrap_err().kind(), "access_denied");
        assert_eq!(access.basics().await.unwrap().url, "edge://settings");
    }

    #[tokio::test]
    async fn test_selection_context() {
        let access = PageAccess::new(Arc::new(OneTab(Some(tab("https://page.test")))), Arc::new(Scripts));
        let ctx = access.selection_context().await.unwrap().unwrap();
        assert_eq!(ctx.selected_text, "sel");
        assert_eq!(access.snapshot().await.unwrap().main_text, "body");
    }
}
