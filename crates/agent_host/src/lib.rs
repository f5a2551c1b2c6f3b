//! Agent Host - the ClarifAI request pipeline
//!
//! This crate turns what the user asks into display-ready text:
//! - Classify chat messages and build prompts from the active page
//! - Carry out contextual actions (link, selection, page, image)
//! - Degrade through canned answers and apologies when the model is missing
//! - Keep the single pending action slot between surfaces

pub mod background;
pub mod canned;
pub mod classifier;
pub mod fallback;
pub mod orchestrator;
pub mod pending;
pub mod prompts;
pub mod url_heuristics;

pub use background::{BackgroundCoordinator, BackgroundHandle, ContextMenuClick, ExtensionMessage, ExtensionResponse};
pub use fallback::{FallbackLadder, FallbackStrategy, StrategyOutcome};
pub use orchestrator::Orchestrator;
pub use pending::PendingActionQueue;

use std::sync::Arc;

use shared::agent_api::{ChatMessage, ChatTranscript, Role};
use tracing::warn;

/// Chat surface state: the orchestrator plus the visible transcript.
pub struct Assistant {
    orchestrator: Orchestrator,
    queue: Arc<PendingActionQueue>,
    transcript: ChatTranscript,
}

impl Assistant {
    pub fn new(orchestrator: Orchestrator, queue: Arc<PendingActionQueue>) -> Self {
        Self {
            orchestrator,
            queue,
            transcript: ChatTranscript::with_greeting(prompts::GREETING),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.transcript.messages()
    }

    /// Append the user's message and the assistant's reply.
    pub async fn send(&mut self, text: &str) -> String {
        self.transcript.push(Role::User, text);
        let reply = self.orchestrator.handle_user_message(text).await;
        self.transcript.push(Role::Assistant, reply.clone());
        reply
    }

    /// Consume the pending action, if any, as the chat surface opens.
    pub async fn activate(&mut self) -> Option<String> {
        let action = match self.queue.take().await {
            Ok(action) => action?,
            Err(e) => {
                warn!(error = %e, "could not read pending action");
                return None;
            }
        };
        self.transcript.push(Role::User, action.label());
        let reply = self.orchestrator.handle_pending_action(&action).await;
        self.transcript.push(Role::Assistant, reply.clone());
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use providers::{CapabilityHost, CreateRequest, HostSession, SessionManager};
    use services::browser::{BinaryFetch, FetchedBinary};
    use services::extractor::ContentExtractor;
    use services::headless::{HeadlessBrowser, StaticPageSource};
    use services::page_access::PageAccess;
    use services::remote_fetch::{FetchPolicy, RemoteTabFetcher};
    use services::storage::JsonFileStore;
    use shared::action::PendingAction;
    use shared::capability::{Availability, CapabilityProfile, ModelParams};
    use std::time::Duration;

    struct NoModel;

    #[async_trait]
    impl CapabilityHost for NoModel {
        async fn availability(&self, _profile: &CapabilityProfile) -> anyhow::Result<Availability> {
            Ok(Availability::Unavailable)
        }

        async fn params(&self) -> anyhow::Result<ModelParams> {
            anyhow::bail!("no model")
        }

        async fn create(&self, _request: CreateRequest) -> anyhow::Result<Box<dyn HostSession>> {
            anyhow::bail!("no model")
        }
    }

    struct NoFetch;

    #[async_trait]
    impl BinaryFetch for NoFetch {
        async fn fetch(&self, _url: &str) -> anyhow::Result<FetchedBinary> {
            anyhow::bail!("offline")
        }
    }

    fn assistant(queue: Arc<PendingActionQueue>) -> Assistant {
        let browser = HeadlessBrowser::new(Arc::new(StaticPageSource::new()), ContentExtractor::default());
        let orchestrator = Orchestrator::new(
            Arc::new(SessionManager::new(Arc::new(NoModel))),
            PageAccess::new(Arc::new(browser.clone()), Arc::new(browser.clone())),
            RemoteTabFetcher::new(
                Arc::new(browser.clone()),
                Arc::new(browser),
                FetchPolicy {
                    load_timeout: Duration::from_millis(20),
                    settle_delay: Duration::from_millis(1),
                },
            ),
            Arc::new(NoFetch),
        );
        Assistant::new(orchestrator, queue)
    }

    #[tokio::test]
    async fn test_send_appends_both_turns() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("storage.json")));
        let queue = Arc::new(PendingActionQueue::new(store, ChronoDuration::seconds(30)));
        let mut assistant = assistant(queue);

        assert_eq!(assistant.messages()[0].content, prompts::GREETING);
        let reply = assistant.send("what is css").await;
        assert!(reply.starts_with("**CSS**"));
        let messages = assistant.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].content, reply);
    }

    #[tokio::test]
    async fn test_activate_consumes_pending_action_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("storage.json")));
        let queue = Arc::new(PendingActionQueue::new(store, ChronoDuration::seconds(30)));
        queue
            .store(&PendingAction::link("https://github.com/org/repo/pull/7", None))
            .await
            .unwrap();

        let mut assistant = assistant(queue.clone());
        let reply = assistant.activate().await.unwrap();
        assert!(reply.starts_with("**Explaining content from: https://github.com/org/repo/pull/7**"));
        assert_eq!(assistant.messages()[1].content, "Explaining content from: https://github.com/org/repo/pull/7");

        assert!(assistant.activate().await.is_none());
        assert!(queue.peek().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_without_action() {
        let store = Arc::new(services::storage::MemoryStore::new());
        let queue = Arc::new(PendingActionQueue::new(store, ChronoDuration::seconds(30)));
        let mut assistant = assistant(queue);
        assert!(assistant.activate().await.is_none());
        assert_eq!(assistant.messages().len(), 1);
    }
}
