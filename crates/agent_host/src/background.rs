//! Always-running coordinator between context menus, the chat surface and
//! page-embedded scripts.
//!
//! Context-menu clicks become pending actions. Other surfaces talk to the
//! coordinator through `BackgroundHandle`; every request carries its own
//! reply channel so answers can be produced asynchronously.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use services::binary_fetch::validate_image;
use services::browser::{BinaryFetch, PermissionQuery, PermissionStatus};
use services::remote_fetch::RemoteTabFetcher;
use shared::action::PendingAction;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::pending::PendingActionQueue;
use crate::prompts;

/// A context-menu entry chosen by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "menu", rename_all = "camelCase")]
pub enum ContextMenuClick {
    Link {
        url: String,
        link_text: Option<String>,
    },
    Selection {
        text: String,
        page_url: String,
        page_title: String,
    },
    Page {
        page_url: String,
        page_title: String,
    },
    Image {
        src_url: String,
        page_url: String,
        page_title: String,
    },
}

impl ContextMenuClick {
    pub fn into_action(self) -> PendingAction {
        match self {
            ContextMenuClick::Link { url, link_text } => PendingAction::link(url, link_text),
            ContextMenuClick::Selection {
                text,
                page_url,
                page_title,
            } => PendingAction::selection(text, page_url, page_title),
            ContextMenuClick::Page {
                page_url,
                page_title,
            } => PendingAction::page(page_url, page_title),
            ContextMenuClick::Image {
                src_url,
                page_url,
                page_title,
            } => PendingAction::image(src_url, page_url, page_title),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ExtensionMessage {
    FetchLinkContent { url: String },
    FetchImage { url: String },
    GetPendingRequest,
    ClearPendingRequest,
    CheckPermissions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExtensionResponse {
    LinkContent { content: String },
    /// Image as a `data:` URL.
    Image { data_url: String, mime_type: String },
    Pending { request: Option<PendingAction> },
    Cleared,
    Permissions { permissions: PermissionStatus },
    Error { message: String },
}

impl ExtensionResponse {
    fn error(message: impl ToString) -> Self {
        ExtensionResponse::Error {
            message: message.to_string(),
        }
    }
}

struct Envelope {
    message: ExtensionMessage,
    reply: oneshot::Sender<ExtensionResponse>,
}

pub struct BackgroundCoordinator {
    queue: Arc<PendingActionQueue>,
    fetcher: RemoteTabFetcher,
    binaries: Arc<dyn BinaryFetch>,
    permissions: Arc<dyn PermissionQuery>,
}

impl BackgroundCoordinator {
    pub fn new(
        queue: Arc<PendingActionQueue>,
        fetcher: RemoteTabFetcher,
        binaries: Arc<dyn BinaryFetch>,
        permissions: Arc<dyn PermissionQuery>,
    ) -> Self {
        Self {
            queue,
            fetcher,
            binaries,
            permissions,
        }
    }

    /// Store the click as the pending action and keep a debug record of it.
    pub async fn on_context_menu(&self, click: ContextMenuClick) -> anyhow::Result<PendingAction> {
        let target = serde_json::to_value(&click)?;
        let action = click.into_action();
        self.queue.store(&action).await?;
        if let Err(e) = self.queue.record_context_target(target).await {
            warn!(error = %e, "could not record context target");
        }
        Ok(action)
    }

    pub async fn handle(&self, message: ExtensionMessage) -> ExtensionResponse {
        debug!(?message, "background message");
        match message {
            ExtensionMessage::FetchLinkContent { url } => match self.fetcher.fetch(&url).await {
                Ok(snapshot) => ExtensionResponse::LinkContent {
                    content: prompts::link_content(&snapshot),
                },
                Err(e) => ExtensionResponse::error(e),
            },
            ExtensionMessage::FetchImage { url } => {
                let fetched = match self.binaries.fetch(&url).await {
                    Ok(fetched) => fetched,
                    Err(e) => return ExtensionResponse::error(e),
                };
                match validate_image(&url, fetched) {
                    Ok(blob) => ExtensionResponse::Image {
                        data_url: format!("data:{};base64,{}", blob.mime_type, STANDARD.encode(&blob.data)),
                        mime_type: blob.mime_type,
                    },
                    Err(e) => ExtensionResponse::error(e),
                }
            }
            ExtensionMessage::GetPendingRequest => match self.queue.peek().await {
                Ok(request) => ExtensionResponse::Pending { request },
                Err(e) => ExtensionResponse::error(e),
            },
            ExtensionMessage::ClearPendingRequest => match self.queue.clear().await {
                Ok(()) => ExtensionResponse::Cleared,
                Err(e) => ExtensionResponse::error(e),
            },
            ExtensionMessage::CheckPermissions => match self.permissions.permissions().await {
                Ok(permissions) => ExtensionResponse::Permissions { permissions },
                Err(e) => ExtensionResponse::error(e),
            },
        }
    }

    /// Serve messages on a background task until every handle is dropped.
    pub fn spawn(self: Arc<Self>) -> BackgroundHandle {
        let (tx, mut rx) = mpsc::channel::<Envelope>(32);
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let coordinator = self.clone();
                // each request answers on its own; a slow fetch must not block the rest
                tokio::spawn(async move {
                    let response = coordinator.handle(envelope.message).await;
                    if envelope.reply.send(response).is_err() {
                        debug!("requester went away before the reply");
                    }
                });
            }
            info!("background coordinator stopped");
        });
        BackgroundHandle { tx }
    }
}

#[derive(Clone)]
pub struct BackgroundHandle {
    tx: mpsc::Sender<Envelope>,
}

impl BackgroundHandle {
    pub async fn request(&self, message: ExtensionMessage) -> ExtensionResponse {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Envelope { message, reply }).await.is_err() {
            return ExtensionResponse::error("background coordinator is not running");
        }
        rx.await
            .unwrap_or_else(|_| ExtensionResponse::error("background coordinator dropped the request"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use services::browser::{FetchedBinary, KeyValueStore, StaticPermissions};
    use services::extractor::ContentExtractor;
    use services::headless::{HeadlessBrowser, StaticPageSource};
    use services::remote_fetch::FetchPolicy;
    use services::storage::MemoryStore;
    use shared::action::ActionKind;
    use std::time::Duration;

    use crate::pending::LAST_CONTEXT_KEY;

    struct OnePixel;

    #[async_trait]
    impl BinaryFetch for OnePixel {
        async fn fetch(&self, url: &str) -> anyhow::Result<FetchedBinary> {
            if url.ends_with(".png") {
                Ok(FetchedBinary {
                    data: vec![1, 2, 3],
                    content_type: "image/png".into(),
                })
            } else {
                Ok(FetchedBinary {
                    data: b"<html></html>".to_vec(),
                    content_type: "text/html; charset=utf-8".into(),
                })
            }
        }
    }

    fn coordinator() -> (Arc<BackgroundCoordinator>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(PendingActionQueue::new(store.clone(), ChronoDuration::seconds(30)));
        let browser = HeadlessBrowser::new(
            Arc::new(StaticPageSource::new().with_page(
                "https://docs.test/intro",
                "<html><head><title>Intro</title></head><body><article>Getting started with the tool.</article></body></html>",
            )),
            ContentExtractor::default(),
        );
        let fetcher = RemoteTabFetcher::new(
            Arc::new(browser.clone()),
            Arc::new(browser),
            FetchPolicy {
                load_timeout: Duration::from_millis(50),
                settle_delay: Duration::from_millis(1),
            },
        );
        let coordinator = BackgroundCoordinator::new(
            queue,
            fetcher,
            Arc::new(OnePixel),
            Arc::new(StaticPermissions::granted()),
        );
        (Arc::new(coordinator), store)
    }

    #[tokio::test]
    async fn test_context_menu_stores_pending_action() {
        let (coordinator, store) = coordinator();
        coordinator
            .on_context_menu(ContextMenuClick::Link {
                url: "https://docs.test/intro".into(),
                link_text: Some("intro".into()),
            })
            .await
            .unwrap();
        coordinator
            .on_context_menu(ContextMenuClick::Image {
                src_url: "https://cdn.test/a.png".into(),
                page_url: "https://docs.test".into(),
                page_title: "Docs".into(),
            })
            .await
            .unwrap();

        let handle = coordinator.clone().spawn();
        match handle.request(ExtensionMessage::GetPendingRequest).await {
            ExtensionResponse::Pending { request: Some(action) } => {
                assert_eq!(action.kind, ActionKind::Image);
            }
            other => panic!("unexpected response {:?}", other),
        }
        let record = store.get(LAST_CONTEXT_KEY).await.unwrap().unwrap();
        assert_eq!(record["target"]["menu"], "image");

        assert_eq!(
            handle.request(ExtensionMessage::ClearPendingRequest).await,
            ExtensionResponse::Cleared
        );
        assert_eq!(
            handle.request(ExtensionMessage::GetPendingRequest).await,
            ExtensionResponse::Pending { request: None }
        );
    }

    #[tokio::test]
    async fn test_fetch_link_content() {
        let (coordinator, _) = coordinator();
        let handle = coordinator.spawn();
        match handle
            .request(ExtensionMessage::FetchLinkContent {
                url: "https://docs.test/intro".into(),
            })
            .await
        {
            ExtensionResponse::LinkContent { content } => {
                assert!(content.starts_with("Title: Intro"));
                assert!(content.contains("Getting started with the tool."));
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_link_timeout_is_error() {
        let (coordinator, _) = coordinator();
        let handle = coordinator.spawn();
        let response = handle
            .request(ExtensionMessage::FetchLinkContent {
                url: "https://nowhere.test".into(),
            })
            .await;
        assert!(matches!(response, ExtensionResponse::Error { .. }));
    }

    #[tokio::test]
    async fn test_fetch_image() {
        let (coordinator, _) = coordinator();
        let handle = coordinator.spawn();

        match handle
            .request(ExtensionMessage::FetchImage {
                url: "https://cdn.test/a.png".into(),
            })
            .await
        {
            ExtensionResponse::Image { data_url, mime_type } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(data_url, "data:image/png;base64,AQID");
            }
            other => panic!("unexpected response {:?}", other),
        }

        let response = handle
            .request(ExtensionMessage::FetchImage {
                url: "https://cdn.test/page".into(),
            })
            .await;
        assert!(matches!(response, ExtensionResponse::Error { .. }));
    }

    #[tokio::test]
    async fn test_permissions() {
        let (coordinator, _) = coordinator();
        let handle = coordinator.spawn();
        match handle.request(ExtensionMessage::CheckPermissions).await {
            ExtensionResponse::Permissions { permissions } => assert!(permissions.all_granted()),
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_message_wire_format() {
        let message: ExtensionMessage =
            serde_json::from_str(r#"{"action":"fetchLinkContent","url":"https://a.test"}"#).unwrap();
        assert_eq!(
            message,
            ExtensionMessage::FetchLinkContent {
                url: "https://a.test".into()
            }
        );
    }
}
