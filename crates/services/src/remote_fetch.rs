//! Content retrieval for pages that are not the active tab.
//!
//! Reuses a tab already showing the URL; otherwise opens a background tab
//! (or a minimized window when none exist), waits for it to load, extracts
//! and closes exactly what it opened.

use shared::content::ContentSnapshot;
use shared::error::{AssistantError, Result};
use shared::settings::FetchSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::browser::{
    CreateTab, CreateWindow, ExtractionRoutine, ScriptExecutor, TabId, TabInfo, TabLifecycle,
    TabStatus, TabUpdate, WindowId, WindowState,
};
use crate::extractor::check_access;

#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub load_timeout: Duration,
    /// Extra wait after load-complete for deferred rendering
    pub settle_delay: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from(&FetchSettings::default())
    }
}

impl From<&FetchSettings> for FetchPolicy {
    fn from(settings: &FetchSettings) -> Self {
        Self {
            load_timeout: settings.load_timeout(),
            settle_delay: settings.settle_delay(),
        }
    }
}

/// What one fetch opened and must close again.
struct Opened {
    tab: TabInfo,
    window: Option<WindowId>,
}

pub struct RemoteTabFetcher {
    tabs: Arc<dyn TabLifecycle>,
    scripts: Arc<dyn ScriptExecutor>,
    policy: FetchPolicy,
}

impl RemoteTabFetcher {
    pub fn new(tabs: Arc<dyn TabLifecycle>, scripts: Arc<dyn ScriptExecutor>, policy: FetchPolicy) -> Self {
        Self {
            tabs,
            scripts,
            policy,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<ContentSnapshot> {
        check_access(url)?;

        if let Some(tab) = self.tabs.query_by_url(url).await?.into_iter().next() {
            debug!(url, tab = tab.id, "reusing open tab");
            return self.scripts.execute(tab.id, ExtractionRoutine::PageSnapshot).await;
        }

        // subscribe first so a fast load cannot slip past us
        let mut updates = self.tabs.subscribe();
        let opened = self.open(url).await?;
        let result = self.load_and_extract(url, &opened.tab, &mut updates).await;
        self.close(&opened).await;
        result
    }

    async fn open(&self, url: &str) -> Result<Opened> {
        let windows = self.tabs.list_windows().await?;
        match windows.first() {
            Some(&window_id) => {
                let tab = self
                    .tabs
                    .create_tab(CreateTab {
                        url: url.to_string(),
                        window_id: Some(window_id),
                        active: false,
                    })
                    .await?;
                info!(url, tab = tab.id, "opened background tab");
                Ok(Opened { tab, window: None })
            }
            None => {
                let created = self
                    .tabs
                    .create_window(CreateWindow {
                        url: url.to_string(),
                        focused: false,
                        state: WindowState::Minimized,
                    })
                    .await?;
                info!(url, window = created.window_id, tab = created.tab.id, "opened minimized window");
                Ok(Opened {
                    tab: created.tab,
                    window: Some(created.window_id),
                })
            }
        }
    }

    async fn load_and_extract(
        &self,
        url: &str,
        tab: &TabInfo,
        updates: &mut broadcast::Receiver<TabUpdate>,
    ) -> Result<ContentSnapshot> {
        if tab.status != TabStatus::Complete {
            match tokio::time::timeout(self.policy.load_timeout, wait_complete(updates, tab.id)).await {
                Ok(loaded) => loaded?,
                Err(_) => {
                    warn!(url, "tab did not finish loading in time");
                    return Err(AssistantError::Timeout {
                        url: url.to_string(),
                        waited_ms: self.policy.load_timeout.as_millis() as u64,
                    });
                }
            }
        }
        tokio::time::sleep(self.policy.settle_delay).await;
        self.scripts.execute(tab.id, ExtractionRoutine::PageSnapshot).await
    }

    async fn close(&self, opened: &Opened) {
        if let Err(e) = self.tabs.remove_tab(opened.tab.id).await {
            warn!(tab = opened.tab.id, error = %e, "failed to close tab");
        }
        if let Some(window) = opened.window {
            if let Err(e) = self.tabs.remove_window(window).await {
                warn!(window, error = %e, "failed to close window");
            }
        }
        debug!(tab = opened.tab.id, "remote fetch cleaned up");
    }
}

async fn wait_complete(updates: &mut broadcast::Receiver<TabUpdate>, tab: TabId) -> Result<()> {
    loop {
        match updates.recv().await {
            Ok(update) if update.tab_id == tab && update.status == TabStatus::Complete => {
                return Ok(())
            }
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => {
                return Err(anyhow::anyhow!("tab update channel closed").into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::CreatedWindow;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        CreateTab,
        CreateWindow,
        RemoveTab(TabId),
        RemoveWindow(WindowId),
    }

    struct FakeTabs {
        open: Vec<TabInfo>,
        windows: Vec<WindowId>,
        completes: bool,
        calls: Mutex<Vec<Call>>,
        updates: broadcast::Sender<TabUpdate>,
    }

    impl FakeTabs {
        fn new(open: Vec<TabInfo>, windows: Vec<WindowId>, completes: bool) -> Self {
            Self {
                open,
                windows,
                completes,
                calls: Mutex::new(Vec::new()),
                updates: broadcast::channel(16).0,
            }
        }

        fn new_tab(&self, url: String, window_id: WindowId) -> TabInfo {
            let tab = TabInfo {
                id: 99,
                window_id,
                url,
                title: String::new(),
                status: TabStatus::Loading,
                active: false,
            };
            if self.completes {
                let _ = self.updates.send(TabUpdate {
                    tab_id: tab.id,
                    status: TabStatus::Complete,
                });
            }
            tab
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl TabLifecycle for FakeTabs {
        async fn query_by_url(&self, url: &str) -> anyhow::Result<Vec<TabInfo>> {
            Ok(self.open.iter().filter(|t| t.url == url).cloned().collect())
        }

        async fn list_windows(&self) -> anyhow::Result<Vec<WindowId>> {
            Ok(self.windows.clone())
        }

        async fn create_tab(&self, request: CreateTab) -> anyhow::Result<TabInfo> {
            self.calls.lock().push(Call::CreateTab);
            assert!(!request.active);
            Ok(self.new_tab(request.url, request.window_id.unwrap_or(1)))
        }

        async fn create_window(&self, request: CreateWindow) -> anyhow::Result<CreatedWindow> {
            self.calls.lock().push(Call::CreateWindow);
            assert!(!request.focused);
            Ok(CreatedWindow {
                window_id: 7,
                tab: self.new_tab(request.url, 7),
            })
        }

        async fn remove_tab(&self, tab: TabId) -> anyhow::Result<()> {
            self.calls.lock().push(Call::RemoveTab(tab));
            Ok(())
        }

        async fn remove_window(&self, window: WindowId) -> anyhow::Result<()> {
            self.calls.lock().push(Call::RemoveWindow(window));
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<TabUpdate> {
            self.updates.subscribe()
        }
    }

    struct FakeScripts {
        fail: bool,
        executed: Mutex<Vec<TabId>>,
    }

    impl FakeScripts {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                executed: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ScriptExecutor for FakeScripts {
        async fn execute(&self, tab: TabId, _routine: ExtractionRoutine) -> Result<ContentSnapshot> {
            self.executed.lock().push(tab);
            if self.fail {
                return Err(anyhow!("script injection failed").into());
            }
            let mut snapshot = ContentSnapshot::new("Linked", "https://linked.test");
            snapshot.main_text = "linked text".into();
            Ok(snapshot)
        }
    }

    fn fast_policy() -> FetchPolicy {
        FetchPolicy {
            load_timeout: Duration::from_millis(50),
            settle_delay: Duration::from_millis(1),
        }
    }

    fn open_tab(url: &str) -> TabInfo {
        TabInfo {
            id: 3,
            window_id: 1,
            url: url.into(),
            title: "Open".into(),
            status: TabStatus::Complete,
            active: false,
        }
    }

    #[tokio::test]
    async fn test_reuses_open_tab_without_creating() {
        let tabs = Arc::new(FakeTabs::new(vec![open_tab("https://linked.test")], vec![1], true));
        let scripts = FakeScripts::new(false);
        let fetcher = RemoteTabFetcher::new(tabs.clone(), scripts.clone(), fast_policy());

        let snapshot = fetcher.fetch("https://linked.test").await.unwrap();
        assert_eq!(snapshot.main_text, "linked text");
        assert!(tabs.calls().is_empty());
        assert_eq!(*scripts.executed.lock(), vec![3]);
    }

    #[tokio::test]
    async fn test_no_window_creates_and_removes_window_and_tab() {
        let tabs = Arc::new(FakeTabs::new(vec![], vec![], true));
        let fetcher = RemoteTabFetcher::new(tabs.clone(), FakeScripts::new(false), fast_policy());

        fetcher.fetch("https://linked.test").await.unwrap();
        assert_eq!(
            tabs.calls(),
            vec![Call::CreateWindow, Call::RemoveTab(99), Call::RemoveWindow(7)]
        );
    }

    #[tokio::test]
    async fn test_cleanup_on_extraction_failure() {
        let tabs = Arc::new(FakeTabs::new(vec![], vec![], true));
        let fetcher = RemoteTabFetcher::new(tabs.clone(), FakeScripts::new(true), fast_policy());

        let err = fetcher.fetch("https://linked.test").await.unwrap_err();
        assert_eq!(err.kind(), "collaborator");
        assert_eq!(
            tabs.calls(),
            vec![Call::CreateWindow, Call::RemoveTab(99), Call::RemoveWindow(7)]
        );
    }

    #[tokio::test]
    async fn test_timeout_still_closes_background_tab() {
        let tabs = Arc::new(FakeTabs::new(vec![], vec![1], false));
        let scripts = FakeScripts::new(false);
        let fetcher = RemoteTabFetcher::new(tabs.clone(), scripts.clone(), fast_policy());

        let err = fetcher.fetch("https://never-loads.test").await.unwrap_err();
        assert!(matches!(err, AssistantError::Timeout { waited_ms: 50, .. }));
        assert_eq!(tabs.calls(), vec![Call::CreateTab, Call::RemoveTab(99)]);
        assert!(scripts.executed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_restricted_url_fails_fast() {
        let tabs = Arc::new(FakeTabs::new(vec![], vec![], true));
        let fetcher = RemoteTabFetcher::new(tabs.clone(), FakeScripts::new(false), fast_policy());

        let err = fetcher.fetch("chrome://flags").await.unwrap_err();
        assert_eq!(err.kind(), "access_denied");
        assert!(tabs.calls().is_empty());
    }
}
