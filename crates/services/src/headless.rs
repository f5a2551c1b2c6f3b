//! In-process browser host.
//!
//! Implements the active-tab, script-execution and tab/window contracts
//! without a real browser: tabs load their markup through a [`PageSource`]
//! and extraction routines run with the [`ContentExtractor`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use shared::content::ContentSnapshot;
use shared::error::AssistantError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::browser::{
    ActiveTabProvider, CreateTab, CreateWindow, CreatedWindow, ExtractionRoutine, ScriptExecutor,
    TabId, TabInfo, TabLifecycle, TabStatus, TabUpdate, WindowId,
};
use crate::extractor::{check_access, page_title, ContentExtractor, PageDocument};

/// Where tab markup comes from.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn load(&self, url: &str) -> Result<String>;
}

/// Loads pages over HTTP.
pub struct HttpPageSource {
    http: Client,
}

impl HttpPageSource {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; ClarifAI/1.0)")
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn load(&self, url: &str) -> Result<String> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {}", response.status()));
        }
        Ok(response.text().await?)
    }
}

/// Fixed URL to markup map. Unknown URLs never finish loading.
#[derive(Default)]
pub struct StaticPageSource {
    pages: HashMap<String, String>,
}

impl StaticPageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }
}

#[async_trait]
impl PageSource for StaticPageSource {
    async fn load(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no such page: {}", url))
    }
}

struct HeadlessTab {
    info: TabInfo,
    html: Option<String>,
    selection: Option<String>,
}

#[derive(Default)]
struct BrowserState {
    next_id: u64,
    windows: BTreeMap<WindowId, Vec<TabId>>,
    tabs: BTreeMap<TabId, HeadlessTab>,
    active: Option<TabId>,
}

impl BrowserState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct Inner {
    state: Mutex<BrowserState>,
    updates: broadcast::Sender<TabUpdate>,
    source: Arc<dyn PageSource>,
    extractor: ContentExtractor,
}

#[derive(Clone)]
pub struct HeadlessBrowser {
    inner: Arc<Inner>,
}

impl HeadlessBrowser {
    pub fn new(source: Arc<dyn PageSource>, extractor: ContentExtractor) -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrowserState::default()),
                updates,
                source,
                extractor,
            }),
        }
    }

    /// Open `url` as the focused tab and wait until it has loaded.
    pub async fn open_active(&self, url: &str, timeout: Duration) -> Result<TabInfo> {
        let mut updates = self.inner.updates.subscribe();
        let window = self.inner.state.lock().windows.keys().next().copied();
        let tab = match window {
            Some(window_id) => {
                self.create_tab(CreateTab {
                    url: url.to_string(),
                    window_id: Some(window_id),
                    active: true,
                })
                .await?
            }
            None => {
                let created = self
                    .create_window(CreateWindow {
                        url: url.to_string(),
                        focused: true,
                        state: crate::browser::WindowState::Normal,
                    })
                    .await?;
                self.inner.state.lock().active = Some(created.tab.id);
                created.tab
            }
        };

        let wait = async {
            loop {
                match updates.recv().await {
                    Ok(u) if u.tab_id == tab.id && u.status == TabStatus::Complete => return Ok(()),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(anyhow!("tab update channel closed"))
                    }
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| anyhow!("timed out loading {}", url))??;
        self.tab(tab.id).ok_or_else(|| anyhow!("tab {} disappeared", tab.id))
    }

    /// Set the user's text selection in a tab.
    pub fn select_text(&self, tab: TabId, text: impl Into<String>) -> Result<()> {
        let mut state = self.inner.state.lock();
        let entry = state.tabs.get_mut(&tab).ok_or_else(|| anyhow!("no tab {}", tab))?;
        entry.selection = Some(text.into());
        Ok(())
    }

    pub fn tab(&self, tab: TabId) -> Option<TabInfo> {
        let state = self.inner.state.lock();
        state.tabs.get(&tab).map(|t| {
            let mut info = t.info.clone();
            info.active = state.active == Some(tab);
            info
        })
    }

    pub fn tab_count(&self) -> usize {
        self.inner.state.lock().tabs.len()
    }

    pub fn window_count(&self) -> usize {
        self.inner.state.lock().windows.len()
    }

    fn insert_tab(&self, url: &str, window_id: WindowId, active: bool) -> TabInfo {
        let mut state = self.inner.state.lock();
        let id = state.allocate();
        let info = TabInfo {
            id,
            window_id,
            url: url.to_string(),
            title: String::new(),
            status: TabStatus::Loading,
            active,
        };
        state.windows.entry(window_id).or_default().push(id);
        state.tabs.insert(
            id,
            HeadlessTab {
                info: info.clone(),
                html: None,
                selection: None,
            },
        );
        if active {
            state.active = Some(id);
        }
        info
    }

    fn start_loading(&self, tab: TabId, url: String) {
        let _ = self.inner.updates.send(TabUpdate {
            tab_id: tab,
            status: TabStatus::Loading,
        });
        let inner = self.inner.clone();
        tokio::spawn(async move {
            match inner.source.load(&url).await {
                Ok(html) => {
                    // restricted and empty pages still have a title
                    let title = page_title(&html);
                    {
                        let mut state = inner.state.lock();
                        let Some(entry) = state.tabs.get_mut(&tab) else {
                            return;
                        };
                        entry.html = Some(html);
                        entry.info.title = title;
                        entry.info.status = TabStatus::Complete;
                    }
                    debug!(tab, url = %url, "tab loaded");
                    let _ = inner.updates.send(TabUpdate {
                        tab_id: tab,
                        status: TabStatus::Complete,
                    });
                }
                // like a real browser, a failed navigation never reports complete
                Err(e) => warn!(tab, url = %url, error = %e, "page failed to load"),
            }
        });
    }
}

#[async_trait]
impl ActiveTabProvider for HeadlessBrowser {
    async fn active_tab(&self) -> Result<Option<TabInfo>> {
        let active = self.inner.state.lock().active;
        Ok(active.and_then(|id| self.tab(id)))
    }
}

#[async_trait]
impl ScriptExecutor for HeadlessBrowser {
    async fn execute(
        &self,
        tab: TabId,
        routine: ExtractionRoutine,
    ) -> Result<ContentSnapshot, AssistantError> {
        let doc = {
            let state = self.inner.state.lock();
            let entry = state
                .tabs
                .get(&tab)
                .ok_or_else(|| anyhow!("no tab with id {}", tab))?;
            check_access(&entry.info.url)?;
            let html = entry
                .html
                .clone()
                .ok_or_else(|| anyhow!("tab {} has not finished loading", tab))?;
            PageDocument {
                url: entry.info.url.clone(),
                html,
                selection: entry.selection.clone(),
            }
        };
        self.inner.extractor.extract(&doc, routine)
    }
}

#[async_trait]
impl TabLifecycle for HeadlessBrowser {
    async fn query_by_url(&self, url: &str) -> Result<Vec<TabInfo>> {
        let ids: Vec<TabId> = {
            let state = self.inner.state.lock();
            state
                .tabs
                .values()
                .filter(|t| t.info.url == url)
                .map(|t| t.info.id)
                .collect()
        };
        Ok(ids.into_iter().filter_map(|id| self.tab(id)).collect())
    }

    async fn list_windows(&self) -> Result<Vec<WindowId>> {
        Ok(self.inner.state.lock().windows.keys().copied().collect())
    }

    async fn create_tab(&self, request: CreateTab) -> Result<TabInfo> {
        let window_id = match request.window_id {
            Some(id) if self.inner.state.lock().windows.contains_key(&id) => id,
            Some(id) => return Err(anyhow!("no window with id {}", id)),
            None => self
                .inner
                .state
                .lock()
                .windows
                .keys()
                .next()
                .copied()
                .ok_or_else(|| anyhow!("no window to open a tab in"))?,
        };
        let info = self.insert_tab(&request.url, window_id, request.active);
        self.start_loading(info.id, request.url);
        Ok(info)
    }

    async fn create_window(&self, request: CreateWindow) -> Result<CreatedWindow> {
        let window_id = {
            let mut state = self.inner.state.lock();
            let id = state.allocate();
            state.windows.insert(id, Vec::new());
            id
        };
        let tab = self.insert_tab(&request.url, window_id, false);
        self.start_loading(tab.id, request.url);
        Ok(CreatedWindow { window_id, tab })
    }

    async fn remove_tab(&self, tab: TabId) -> Result<()> {
        let mut state = self.inner.state.lock();
        let entry = state.tabs.remove(&tab).ok_or_else(|| anyhow!("no tab with id {}", tab))?;
        if let Some(ids) = state.windows.get_mut(&entry.info.window_id) {
            ids.retain(|id| *id != tab);
        }
        if state.active == Some(tab) {
            state.active = None;
        }
        Ok(())
    }

    async fn remove_window(&self, window: WindowId) -> Result<()> {
        let mut state = self.inner.state.lock();
        let ids = state
            .windows
            .remove(&window)
            .ok_or_else(|| anyhow!("no window with id {}", window))?;
        for id in ids {
            state.tabs.remove(&id);
            if state.active == Some(id) {
                state.active = None;
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TabUpdate> {
        self.inner.updates.subscribe()
    }
}
