//! Request orchestration.
//!
//! Turns a chat message or a pending contextual action into display-ready
//! text. Acquisition failures degrade the context, capability failures go
//! through the fallback ladder, and nothing here ever returns an error to
//! the chat surface.

use std::sync::Arc;
use std::time::Instant;

use providers::SessionManager;
use services::binary_fetch::validate_image;
use services::browser::BinaryFetch;
use services::page_access::PageAccess;
use services::remote_fetch::RemoteTabFetcher;
use shared::action::{ActionKind, PendingAction};
use shared::capability::{
    BinaryBlob, CapabilityProfile, PromptMessage, PromptOptions, PromptPart, SessionInput,
    SummarizerOptions, SummaryLength, SummaryType,
};
use shared::content::ContentSnapshot;
use shared::error::{AssistantError, Result};
use shared::events::{AssistantEvent, ProgressReporter};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{classify, extract_topic, is_programming_topic};
use crate::fallback::{
    CapabilityAnswer, CapabilityRequest, FallbackContext, FallbackLadder, Resolution,
};
use crate::prompts::{self, ImageClues};
use crate::url_heuristics::describe_link;

const BASICS_FAILED: &str = "Could not extract content from current page and fallback failed";

pub struct Orchestrator {
    manager: Arc<SessionManager>,
    page: PageAccess,
    fetcher: RemoteTabFetcher,
    binaries: Arc<dyn BinaryFetch>,
    events: Option<UnboundedSender<AssistantEvent>>,
}

/// Bookkeeping for one request: id, progress relay and timing.
struct RequestScope {
    reporter: ProgressReporter,
    started: Instant,
}

impl RequestScope {
    fn progress(&self) -> Option<ProgressReporter> {
        Some(self.reporter.clone())
    }

    fn degraded(&self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(request_id = %self.reporter.request_id(), %reason, "degraded path");
        self.reporter.emit(AssistantEvent::Degraded {
            request_id: self.reporter.request_id(),
            reason,
        });
    }

    fn note(&self, resolution: &Resolution) {
        if resolution.tier > 0 {
            self.degraded(format!("answered by {} fallback", resolution.strategy));
        }
    }

    fn finish(self, text: String) -> String {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        self.reporter.emit(AssistantEvent::Completed {
            request_id: self.reporter.request_id(),
            duration_ms,
        });
        text
    }
}

fn labeled(label: &str, text: &str) -> String {
    format!("**{}**\n\n{}", label, text)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Orchestrator {
    pub fn new(
        manager: Arc<SessionManager>,
        page: PageAccess,
        fetcher: RemoteTabFetcher,
        binaries: Arc<dyn BinaryFetch>,
    ) -> Self {
        Self {
            manager,
            page,
            fetcher,
            binaries,
            events: None,
        }
    }

    /// Emit lifecycle and progress events on `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<AssistantEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    fn begin(&self, label: &str) -> RequestScope {
        let reporter = match &self.events {
            Some(tx) => ProgressReporter::new(Uuid::new_v4(), tx.clone()),
            None => ProgressReporter::silent(),
        };
        reporter.emit(AssistantEvent::Started {
            request_id: reporter.request_id(),
            label: label.to_string(),
        });
        RequestScope {
            reporter,
            started: Instant::now(),
        }
    }

    /// Answer a free-typed chat message about the active page.
    pub async fn handle_user_message(&self, message: &str) -> String {
        let scope = self.begin("Answering question");

        let summarization = CapabilityProfile::Summarization(SummarizerOptions::default());
        if !self.manager.probe(&summarization).await.is_usable() {
            scope.degraded("summarization capability unavailable");
            let text = FallbackLadder::offline()
                .run(FallbackContext::new(message, None))
                .await;
            return scope.finish(text);
        }

        let request = match self.page.snapshot().await {
            Ok(snapshot) => question_request(message, &snapshot),
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "page extraction failed, using tab basics");
                scope.degraded(format!("page content unavailable: {}", e.kind()));
                match self.page.basics().await {
                    Ok(tab) => CapabilityRequest::Summarize {
                        text: prompts::basic_context(&tab.title, &tab.url, message),
                        options: SummarizerOptions::new(SummaryType::Tldr, SummaryLength::Medium),
                        context: Some(prompts::basic_context_instruction(message)),
                    },
                    Err(e) => {
                        warn!(error = %e, "no tab basics either, answering offline");
                        let text = FallbackLadder::offline()
                            .run(FallbackContext::new(message, Some(BASICS_FAILED.into())))
                            .await;
                        return scope.finish(text);
                    }
                }
            }
        };

        let answer = CapabilityAnswer::new(self.manager.clone(), request, scope.progress());
        let resolution = FallbackLadder::with_capability(answer)
            .resolve(FallbackContext::new(message, None))
            .await;
        scope.note(&resolution);
        scope.finish(resolution.text)
    }

    /// Carry out a contextual action raised from a context menu.
    pub async fn handle_pending_action(&self, action: &PendingAction) -> String {
        let label = action.label();
        let scope = self.begin(&label);
        info!(kind = action.kind.as_str(), "handling pending action");

        let text = match action.kind {
            ActionKind::Link => match non_empty(action.url.as_deref()) {
                Some(url) => labeled(
                    &label,
                    &self.explain_link(url, action.text.as_deref(), &scope).await,
                ),
                None => labeled(&label, &missing_payload("link address")),
            },
            ActionKind::Selection => match non_empty(action.text.as_deref()) {
                Some(text) => labeled(&label, &self.explain_selection(text, &scope).await),
                None => labeled(&label, &missing_payload("selected text")),
            },
            ActionKind::Page => labeled(&label, &self.summarize_page(action, &scope).await),
            ActionKind::Image => match non_empty(action.image_url.as_deref()) {
                Some(url) => self.describe_image(action, url, &label, &scope).await,
                None => labeled(&label, &missing_payload("image address")),
            },
        };
        scope.finish(text)
    }

    async fn explain_link(&self, url: &str, link_text: Option<&str>, scope: &RequestScope) -> String {
        let snapshot = match self.fetcher.fetch(url).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(url, error = %e, kind = e.kind(), "link fetch failed, analyzing the address");
                scope.degraded(format!("link content unavailable: {}", e.kind()));
                return describe_link(url, link_text, Some(&e.to_string()));
            }
        };
        let content = prompts::link_content(&snapshot);
        let result = self
            .manager
            .summarize(
                &prompts::link_explanation(url, &content),
                SummarizerOptions::new(SummaryType::KeyPoints, SummaryLength::Medium),
                Some(prompts::link_summary_context(url)),
                scope.progress(),
            )
            .await;
        match result {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                scope.degraded("empty link summary");
                describe_link(url, link_text, Some("The model returned an empty answer"))
            }
            Err(e) => {
                warn!(url, error = %e, "link summary failed, analyzing the address");
                scope.degraded(format!("link summary failed: {}", e.kind()));
                describe_link(url, link_text, Some(&e.to_string()))
            }
        }
    }

    async fn explain_selection(&self, text: &str, scope: &RequestScope) -> String {
        let context = match self.page.selection_context().await {
            Ok(context) => context,
            Err(e) => {
                debug!(error = %e, "selection context unavailable");
                None
            }
        };
        let request = CapabilityRequest::Summarize {
            text: prompts::selection_prompt(text, context.as_ref()),
            options: SummarizerOptions::new(SummaryType::Tldr, SummaryLength::Long),
            context: Some(prompts::EXPLANATION_CONTEXT.into()),
        };
        let answer = CapabilityAnswer::new(self.manager.clone(), request, scope.progress());
        let resolution = FallbackLadder::with_capability(answer)
            .resolve(FallbackContext::new(text, None))
            .await;
        scope.note(&resolution);
        resolution.text
    }

    async fn summarize_page(&self, action: &PendingAction, scope: &RequestScope) -> String {
        let page_label = action.page_label();
        let snapshot = match self.page.structured_dump().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "page dump failed");
                scope.degraded(format!("page content unavailable: {}", e.kind()));
                return prompts::page_apology(&page_label, Some(&e.to_string()));
            }
        };
        let prompt = prompts::page_prompt(action.page_url.as_deref().unwrap_or_default(), &snapshot);
        let result = self
            .manager
            .summarize(
                &prompt,
                SummarizerOptions::new(SummaryType::KeyPoints, SummaryLength::Long),
                Some(prompts::PAGE_SUMMARY_CONTEXT.into()),
                scope.progress(),
            )
            .await;
        match result {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                scope.degraded("empty page summary");
                prompts::page_apology(&page_label, Some("The model returned an empty answer"))
            }
            Err(e) => {
                warn!(error = %e, "page summary failed");
                scope.degraded(format!("page summary failed: {}", e.kind()));
                prompts::page_apology(&page_label, Some(&e.to_string()))
            }
        }
    }

    /// Vision description when possible, context-only description otherwise.
    ///
    /// The raw vision output is returned without a label.
    async fn describe_image(
        &self,
        action: &PendingAction,
        image_url: &str,
        label: &str,
        scope: &RequestScope,
    ) -> String {
        let clues = ImageClues::new(
            image_url,
            action.page_title.as_deref(),
            action.page_url.as_deref(),
        );
        let multimodal = CapabilityProfile::Prompting(PromptOptions::multimodal());
        if !self.manager.probe(&multimodal).await.is_usable() {
            scope.degraded("multimodal capability unavailable");
            return labeled(label, &self.describe_from_context(&clues, None, scope).await);
        }

        match self.describe_with_vision(action, image_url, scope).await {
            Ok(description) => description,
            Err(e) => {
                warn!(image_url, error = %e, kind = e.kind(), "vision description failed, using context");
                scope.degraded(format!("image analysis failed: {}", e.kind()));
                let error = e.to_string();
                labeled(
                    label,
                    &self.describe_from_context(&clues, Some(&error), scope).await,
                )
            }
        }
    }

    async fn describe_with_vision(
        &self,
        action: &PendingAction,
        image_url: &str,
        scope: &RequestScope,
    ) -> Result<String> {
        let image = self.fetch_image(image_url).await?;
        let message = PromptMessage::user(prompts::image_description_request(action))
            .with_part(PromptPart::Image(image));
        let text = self
            .manager
            .prompt(
                PromptOptions::multimodal().with_system_prompt(prompts::IMAGE_SYSTEM_PROMPT),
                vec![message],
                scope.progress(),
            )
            .await?;
        if text.trim().is_empty() {
            return Err(AssistantError::MalformedResponse {
                reason: "empty image description".into(),
            });
        }
        Ok(text)
    }

    /// Text-only inference from the image's address and page. Never fails.
    async fn describe_from_context(
        &self,
        clues: &ImageClues,
        error: Option<&str>,
        scope: &RequestScope,
    ) -> String {
        let result = self
            .manager
            .prompt(
                PromptOptions::text_only(),
                vec![PromptMessage::user(prompts::image_context_prompt(clues))],
                scope.progress(),
            )
            .await;
        match result {
            Ok(text) if !text.trim().is_empty() => prompts::context_based_description(&text),
            Ok(_) => prompts::offline_image_description(clues, error),
            Err(e) => {
                debug!(error = %e, "context-only image prompt failed");
                let error = error.map(str::to_string).unwrap_or_else(|| e.to_string());
                prompts::offline_image_description(clues, Some(&error))
            }
        }
    }

    /// Download an image and check that it really is one.
    pub async fn fetch_image(&self, url: &str) -> Result<BinaryBlob> {
        let fetched = self.binaries.fetch(url).await?;
        validate_image(url, fetched)
    }

    /// Short screen-reader description of one image.
    pub async fn generate_alt_text(&self, image: BinaryBlob) -> Result<String> {
        let message = PromptMessage::user(prompts::ALT_TEXT_REQUEST).with_part(PromptPart::Image(image));
        let text = self
            .manager
            .prompt(
                PromptOptions::multimodal().with_system_prompt(prompts::ALT_TEXT_SYSTEM_PROMPT),
                vec![message],
                None,
            )
            .await?;
        Ok(text.trim().to_string())
    }

    /// Compare several images in one session.
    pub async fn analyze_images(&self, images: Vec<BinaryBlob>, prompt: &str) -> Result<String> {
        if images.is_empty() {
            return Err(AssistantError::MalformedResponse {
                reason: "no images to analyze".into(),
            });
        }
        let options = PromptOptions::multimodal().with_system_prompt(prompts::MULTI_IMAGE_SYSTEM_PROMPT);
        let profile = CapabilityProfile::Prompting(options);
        let name = profile.name();
        let mut session = self
            .manager
            .create_session(profile, None, None)
            .await
            .ok_or_else(|| AssistantError::unavailable(name))?;

        let total = images.len();
        let result = async {
            for (i, image) in images.into_iter().enumerate() {
                let message = PromptMessage::user(format!("Image {} of {}:", i + 1, total))
                    .with_part(PromptPart::Image(image));
                session.append(vec![message]).await?;
            }
            session.submit(SessionInput::prompt(prompt)).await
        }
        .await;
        session.destroy();
        result
    }

    /// Summarize the active tab's selection, or its main text when nothing
    /// is selected.
    pub async fn summarize_selection(&self, summary_type: SummaryType) -> Result<String> {
        let snapshot = self.page.snapshot().await?;
        let text = snapshot.focus_text();
        if text.trim().is_empty() {
            return Err(AssistantError::ExtractionEmpty { url: snapshot.url });
        }
        self.manager
            .summarize(
                text,
                SummarizerOptions::new(summary_type, SummaryLength::Medium),
                Some(prompts::selection_summary_context(&snapshot.domain())),
                None,
            )
            .await
    }
}

/// Explanation or page question, depending on what the message asks for.
fn question_request(message: &str, snapshot: &ContentSnapshot) -> CapabilityRequest {
    let intent = classify(message);
    if intent.wants_explanation() {
        let topic = extract_topic(message);
        let mut context = snapshot.focus_text().to_string();
        if intent.programming && context.chars().count() < prompts::MIN_PROGRAMMING_CONTEXT_CHARS {
            context = prompts::programming_context(message);
        }
        CapabilityRequest::Summarize {
            text: prompts::explanation_request(&topic, &context, is_programming_topic(&topic)),
            options: SummarizerOptions::new(SummaryType::Tldr, SummaryLength::Long),
            context: Some(prompts::EXPLANATION_CONTEXT.into()),
        }
    } else {
        CapabilityRequest::Summarize {
            text: prompts::page_question(snapshot, message),
            options: SummarizerOptions::new(SummaryType::Tldr, SummaryLength::Medium),
            context: Some(prompts::page_question_context(message)),
        }
    }
}

fn missing_payload(what: &str) -> String {
    format!(
        "I couldn't find the {} for this request. Please try the menu entry again.",
        what
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use providers::{CapabilityHost, CreateRequest, HostSession};
    use services::browser::{ActiveTabProvider, FetchedBinary};
    use services::extractor::ContentExtractor;
    use services::headless::{HeadlessBrowser, StaticPageSource};
    use services::remote_fetch::FetchPolicy;
    use shared::capability::{Availability, Modality, ModelParams};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const ARTICLE: &str = "<html><head><title>Hooks Guide</title></head><body><main>React hooks let function components keep state between renders. The useEffect hook runs after rendering.</main></body></html>";

    const EMPTY_PAGE: &str = "<html><head><title>Loading Dashboard</title></head><body>  </body></html>";

    /// Host whose availability depends on the profile and whose sessions
    /// answer with a fixed text or fail.
    struct ScriptedHost {
        summarization: Availability,
        multimodal: Availability,
        text_prompting: Availability,
        answer: Option<String>,
        inputs: Arc<Mutex<Vec<SessionInput>>>,
        creates: AtomicUsize,
        destroys: Arc<AtomicUsize>,
    }

    impl ScriptedHost {
        fn new(availability: Availability, answer: Option<&str>) -> Self {
            Self {
                summarization: availability,
                multimodal: availability,
                text_prompting: availability,
                answer: answer.map(String::from),
                inputs: Arc::new(Mutex::new(Vec::new())),
                creates: AtomicUsize::new(0),
                destroys: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    struct ScriptedSession {
        answer: Option<String>,
        inputs: Arc<Mutex<Vec<SessionInput>>>,
        destroys: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl HostSession for ScriptedSession {
        async fn submit(&mut self, input: SessionInput) -> anyhow::Result<String> {
            self.inputs.lock().push(input);
            self.answer.clone().ok_or_else(|| anyhow::anyhow!("session crashed"))
        }

        async fn append(&mut self, messages: Vec<PromptMessage>) -> anyhow::Result<()> {
            self.inputs.lock().push(SessionInput::Prompt(messages));
            Ok(())
        }

        fn destroy(&mut self) {
            self.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CapabilityHost for ScriptedHost {
        async fn availability(&self, profile: &CapabilityProfile) -> anyhow::Result<Availability> {
            Ok(match profile {
                CapabilityProfile::Summarization(_) => self.summarization,
                CapabilityProfile::Prompting(o) if o.accepts(Modality::Image) => self.multimodal,
                CapabilityProfile::Prompting(_) => self.text_prompting,
            })
        }

        async fn params(&self) -> anyhow::Result<ModelParams> {
            Ok(ModelParams {
                default_temperature: 0.8,
                max_temperature: 2.0,
                default_top_k: 40,
                max_top_k: 128,
            })
        }

        async fn create(&self, _request: CreateRequest) -> anyhow::Result<Box<dyn HostSession>> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedSession {
                answer: self.answer.clone(),
                inputs: self.inputs.clone(),
                destroys: self.destroys.clone(),
            }))
        }
    }

    struct CountingFetch {
        calls: AtomicUsize,
        response: Option<FetchedBinary>,
    }

    #[async_trait]
    impl BinaryFetch for CountingFetch {
        async fn fetch(&self, _url: &str) -> anyhow::Result<FetchedBinary> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .clone()
                .ok_or_else(|| anyhow::anyhow!("connection reset"))
        }
    }

    struct Rig {
        orchestrator: Orchestrator,
        browser: HeadlessBrowser,
        host: Arc<ScriptedHost>,
        fetch: Arc<CountingFetch>,
    }

    fn rig(host: ScriptedHost, image: Option<FetchedBinary>) -> Rig {
        let source = StaticPageSource::new()
            .with_page("https://guide.test/hooks", ARTICLE)
            .with_page("https://linked.test/post", ARTICLE)
            .with_page("chrome://settings", ARTICLE)
            .with_page("https://empty.test", EMPTY_PAGE);
        let browser = HeadlessBrowser::new(Arc::new(source), ContentExtractor::default());
        let host = Arc::new(host);
        let fetch = Arc::new(CountingFetch {
            calls: AtomicUsize::new(0),
            response: image,
        });
        let orchestrator = Orchestrator::new(
            Arc::new(SessionManager::new(host.clone())),
            PageAccess::new(Arc::new(browser.clone()), Arc::new(browser.clone())),
            RemoteTabFetcher::new(
                Arc::new(browser.clone()),
                Arc::new(browser.clone()),
                FetchPolicy {
                    load_timeout: Duration::from_millis(50),
                    settle_delay: Duration::from_millis(1),
                },
            ),
            fetch.clone(),
        );
        Rig {
            orchestrator,
            browser,
            host,
            fetch,
        }
    }

    async fn open(rig: &Rig, url: &str) {
        rig.browser
            .open_active(url, Duration::from_secs(1))
            .await
            .unwrap();
    }

    fn png() -> Option<FetchedBinary> {
        Some(FetchedBinary {
            data: vec![0x89, 0x50, 0x4e, 0x47],
            content_type: "image/png".into(),
        })
    }

    fn submitted_text(host: &ScriptedHost) -> Vec<String> {
        host.inputs
            .lock()
            .iter()
            .map(|input| match input {
                SessionInput::Summarize { text, .. } => text.clone(),
                SessionInput::Prompt(messages) => messages
                    .iter()
                    .map(|m| m.text())
                    .collect::<Vec<_>>()
                    .join("\n"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_question_uses_page_content() {
        let rig = rig(ScriptedHost::new(Availability::Available, Some("It lists reviews.")), None);
        open(&rig, "https://guide.test/hooks").await;

        let text = rig.orchestrator.handle_user_message("Summarize the reviews").await;
        assert_eq!(text, "It lists reviews.");
        let inputs = submitted_text(&rig.host);
        assert!(inputs[0].starts_with("Page: Hooks Guide\nURL: https://guide.test/hooks"));
        assert!(inputs[0].ends_with("User Question: Summarize the reviews"));
        assert_eq!(rig.host.destroys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_explanation_strips_interrogative() {
        let rig = rig(ScriptedHost::new(Availability::Available, Some("Closures capture.")), None);
        open(&rig, "https://guide.test/hooks").await;

        rig.orchestrator.handle_user_message("What is a closure").await;
        let inputs = submitted_text(&rig.host);
        assert!(inputs[0].contains("Topic to explain: a closure"));
        assert!(inputs[0].starts_with("Context: React hooks"));
    }

    #[tokio::test]
    async fn test_react_with_capability_unavailable_is_canned() {
        let rig = rig(ScriptedHost::new(Availability::Unavailable, None), None);
        open(&rig, "https://guide.test/hooks").await;

        let text = rig.orchestrator.handle_user_message("how does react work").await;
        assert!(text.starts_with("**React** is a JavaScript library"));
        assert_eq!(rig.host.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restricted_page_falls_back_to_basics() {
        let rig = rig(ScriptedHost::new(Availability::Available, Some("General answer.")), None);
        open(&rig, "chrome://settings").await;

        let text = rig.orchestrator.handle_user_message("Is this safe?").await;
        assert_eq!(text, "General answer.");
        let inputs = submitted_text(&rig.host);
        assert_eq!(
            inputs[0],
            "Page Title: Hooks Guide\nURL: chrome://settings\nUser Question: Is this safe?"
        );
    }

    #[tokio::test]
    async fn test_empty_page_basics_keep_title() {
        let rig = rig(ScriptedHost::new(Availability::Available, Some("General answer.")), None);
        open(&rig, "https://empty.test").await;

        let text = rig.orchestrator.handle_user_message("what is this").await;
        assert_eq!(text, "General answer.");
        let inputs = submitted_text(&rig.host);
        assert_eq!(
            inputs[0],
            "Page Title: Loading Dashboard\nURL: https://empty.test\nUser Question: what is this"
        );
    }

    #[tokio::test]
    async fn test_no_active_tab_still_answers() {
        let rig = rig(ScriptedHost::new(Availability::Available, Some("unused")), None);

        let text = rig.orchestrator.handle_user_message("Why is the sky blue?").await;
        assert!(text.contains("\"Why is the sky blue?\""));
        assert!(text.contains(BASICS_FAILED));
        assert_eq!(rig.host.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_user_message_never_empty() {
        for availability in [Availability::Available, Availability::Unavailable] {
            for answer in [Some("ok"), None] {
                for url in [
                    None,
                    Some("https://guide.test/hooks"),
                    Some("chrome://settings"),
                    Some("https://empty.test"),
                ] {
                    let rig = rig(ScriptedHost::new(availability, answer), None);
                    if let Some(url) = url {
                        open(&rig, url).await;
                    }
                    for message in ["", "explain css", "tell me more"] {
                        let text = rig.orchestrator.handle_user_message(message).await;
                        assert!(!text.trim().is_empty());
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_link_action_summarizes_fetched_page() {
        let rig = rig(ScriptedHost::new(Availability::Available, Some("A guide to hooks.")), None);
        let action = PendingAction::link("https://linked.test/post", None);

        let text = rig.orchestrator.handle_pending_action(&action).await;
        assert_eq!(
            text,
            "**Explaining content from: https://linked.test/post**\n\nA guide to hooks."
        );
        let inputs = submitted_text(&rig.host);
        assert!(inputs[0].starts_with("Please explain the content from this link: https://linked.test/post"));
        assert!(inputs[0].contains("Title: Hooks Guide"));
        assert_eq!(rig.browser.tab_count(), 0);
    }

    #[tokio::test]
    async fn test_link_failure_uses_address_analysis() {
        let rig = rig(ScriptedHost::new(Availability::Available, Some("unused")), None);
        let action = PendingAction::link("https://github.com/org/repo/issues/42", None);

        let text = rig.orchestrator.handle_pending_action(&action).await;
        assert!(text.starts_with("**Explaining content from: https://github.com/org/repo/issues/42**"));
        assert!(text.contains("42"));
        assert!(text.contains("org/repo"));
        assert_eq!(rig.host.creates.load(Ordering::SeqCst), 0);
        assert_eq!(rig.browser.tab_count(), 0);
    }

    #[tokio::test]
    async fn test_selection_includes_surrounding_text() {
        let rig = rig(ScriptedHost::new(Availability::Available, Some("Effects run later.")), None);
        open(&rig, "https://guide.test/hooks").await;
        let tab = rig.browser.active_tab().await.unwrap().unwrap().id;
        rig.browser.select_text(tab, "useEffect").unwrap();

        let action = PendingAction::selection("useEffect", "https://guide.test/hooks", "Hooks Guide");
        let text = rig.orchestrator.handle_pending_action(&action).await;
        assert!(text.starts_with("**Explaining selected text: \"useEffect\"**"));
        assert!(text.ends_with("Effects run later."));
        let inputs = submitted_text(&rig.host);
        assert!(inputs[0].contains("Context from the page \"Hooks Guide\""));
        assert!(inputs[0].contains("Before: \""));
    }

    #[tokio::test]
    async fn test_page_failure_is_apology() {
        let rig = rig(ScriptedHost::new(Availability::Available, Some("unused")), None);
        open(&rig, "chrome://settings").await;

        let action = PendingAction::page("chrome://settings", "Settings");
        let text = rig.orchestrator.handle_pending_action(&action).await;
        assert!(text.starts_with("**Summarizing page: Settings**"));
        assert!(text.contains("dynamically"));
        assert!(text.contains("restricted"));
    }

    #[tokio::test]
    async fn test_image_vision_description_is_unlabeled() {
        let rig = rig(ScriptedHost::new(Availability::Available, Some("A red bicycle.")), png());
        let action = PendingAction::image("https://cdn.test/bike.png", "https://shop.test", "Bikes");

        let text = rig.orchestrator.handle_pending_action(&action).await;
        assert_eq!(text, "A red bicycle.");
        assert_eq!(rig.fetch.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_image_without_multimodal_never_fetches() {
        let mut host = ScriptedHost::new(Availability::Available, Some("Probably a product photo."));
        host.multimodal = Availability::Unavailable;
        let rig = rig(host, png());
        let action = PendingAction::image("https://cdn.test/bike.png", "https://shop.test", "Bikes");

        let text = rig.orchestrator.handle_pending_action(&action).await;
        assert_eq!(rig.fetch.calls.load(Ordering::SeqCst), 0);
        assert!(text.starts_with("**Describing image from: Bikes**"));
        assert!(text.contains("**Image Analysis (Context-based)**"));
        assert!(text.contains("Probably a product photo."));
    }

    #[tokio::test]
    async fn test_image_that_is_not_an_image_falls_back() {
        let rig = rig(
            ScriptedHost::new(Availability::Available, Some("Context guess.")),
            Some(FetchedBinary {
                data: b"<html>".to_vec(),
                content_type: "text/html".into(),
            }),
        );
        let action = PendingAction::image("https://cdn.test/bike.png", "https://shop.test", "Bikes");

        let text = rig.orchestrator.handle_pending_action(&action).await;
        assert!(text.contains("**Image Analysis (Context-based)**"));
        assert!(text.contains("Context guess."));
        assert_eq!(rig.host.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_every_action_survives_total_failure() {
        let actions = [
            PendingAction::link("https://unknown.test/a", None),
            PendingAction::selection("borrowck", "https://a.test", "A"),
            PendingAction::page("https://a.test", "A"),
            PendingAction::image("https://cdn.test/x.jpg", "https://a.test", "A"),
        ];
        for availability in [Availability::Available, Availability::Unavailable] {
            let rig = rig(ScriptedHost::new(availability, None), None);
            for action in &actions {
                let text = rig.orchestrator.handle_pending_action(action).await;
                assert!(text.starts_with(&format!("**{}**", action.label())), "{}", text);
                assert!(text.len() > action.label().len() + 10);
            }
            let created = rig.host.creates.load(Ordering::SeqCst);
            assert_eq!(rig.host.destroys.load(Ordering::SeqCst), created);
        }
    }

    #[tokio::test]
    async fn test_events_bracket_request() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut rig = rig(ScriptedHost::new(Availability::Unavailable, None), None);
        rig.orchestrator = rig.orchestrator.with_events(tx);

        rig.orchestrator.handle_user_message("html?").await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(AssistantEvent::Started { .. })));
        assert!(events.iter().any(|e| matches!(e, AssistantEvent::Degraded { .. })));
        assert!(matches!(events.last(), Some(AssistantEvent::Completed { .. })));
        let id = events[0].request_id();
        assert!(events.iter().all(|e| e.request_id() == id));
    }

    #[tokio::test]
    async fn test_analyze_images_appends_each_image() {
        let rig = rig(ScriptedHost::new(Availability::Available, Some("Both show bikes.")), None);
        let blob = |name: &str| BinaryBlob {
            name: name.into(),
            mime_type: "image/png".into(),
            data: vec![1, 2, 3],
        };

        let text = rig
            .orchestrator
            .analyze_images(vec![blob("a.png"), blob("b.png")], "Compare them")
            .await
            .unwrap();
        assert_eq!(text, "Both show bikes.");
        let inputs = submitted_text(&rig.host);
        assert_eq!(inputs, vec!["Image 1 of 2:", "Image 2 of 2:", "Compare them"]);
        assert_eq!(rig.host.destroys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_alt_text_requires_capability() {
        let rig = rig(ScriptedHost::new(Availability::Unavailable, None), png());
        let image = rig.orchestrator.fetch_image("https://cdn.test/x.png").await.unwrap();
        let err = rig.orchestrator.generate_alt_text(image).await.unwrap_err();
        assert!(matches!(err, AssistantError::CapabilityUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_summarize_selection() {
        let rig = rig(ScriptedHost::new(Availability::Available, Some("Short.")), None);
        open(&rig, "https://guide.test/hooks").await;

        let text = rig
            .orchestrator
            .summarize_selection(SummaryType::Headline)
            .await
            .unwrap();
        assert_eq!(text, "Short.");
        let inputs = rig.host.inputs.lock();
        match &inputs[0] {
            SessionInput::Summarize { context, .. } => {
                assert_eq!(context.as_deref(), Some("Summarize this content from guide.test"));
            }
            other => panic!("unexpected input {:?}", other),
        }
    }
}
