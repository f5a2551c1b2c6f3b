//! Ordered degradation for chat answers.
//!
//! Each strategy either answers or hands over to the next one. The ladder
//! itself never fails: when every strategy passes, the generic apology is
//! returned.

use std::sync::Arc;

use async_trait::async_trait;
use providers::SessionManager;
use shared::capability::{PromptMessage, PromptOptions, SummarizerOptions};
use shared::events::ProgressReporter;
use tracing::{debug, info};

use crate::canned::canned_explanation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Answer(String),
    TryNext,
}

/// State shared by the strategies of one ladder run.
#[derive(Debug, Clone, Default)]
pub struct FallbackContext {
    /// The user's literal question.
    pub question: String,
    /// Most recent technical failure, appended by the generic apology.
    pub error: Option<String>,
}

impl FallbackContext {
    pub fn new(question: impl Into<String>, error: Option<String>) -> Self {
        Self {
            question: question.into(),
            error,
        }
    }
}

#[async_trait]
pub trait FallbackStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn attempt(&self, ctx: &mut FallbackContext) -> StrategyOutcome;
}

/// One capability call, described up front so it can be retried by tier.
#[derive(Debug, Clone)]
pub enum CapabilityRequest {
    Summarize {
        text: String,
        options: SummarizerOptions,
        context: Option<String>,
    },
    Prompt {
        options: PromptOptions,
        messages: Vec<PromptMessage>,
    },
}

/// Answer with the generative capability.
pub struct CapabilityAnswer {
    manager: Arc<SessionManager>,
    request: CapabilityRequest,
    progress: Option<ProgressReporter>,
}

impl CapabilityAnswer {
    pub fn new(
        manager: Arc<SessionManager>,
        request: CapabilityRequest,
        progress: Option<ProgressReporter>,
    ) -> Self {
        Self {
            manager,
            request,
            progress,
        }
    }
}

#[async_trait]
impl FallbackStrategy for CapabilityAnswer {
    fn name(&self) -> &'static str {
        "capability"
    }

    async fn attempt(&self, ctx: &mut FallbackContext) -> StrategyOutcome {
        let result = match self.request.clone() {
            CapabilityRequest::Summarize {
                text,
                options,
                context,
            } => {
                self.manager
                    .summarize(&text, options, context, self.progress.clone())
                    .await
            }
            CapabilityRequest::Prompt { options, messages } => {
                self.manager
                    .prompt(options, messages, self.progress.clone())
                    .await
            }
        };
        match result {
            Ok(text) if !text.trim().is_empty() => StrategyOutcome::Answer(text),
            Ok(_) => {
                ctx.error = Some("The model returned an empty answer".into());
                StrategyOutcome::TryNext
            }
            Err(e) => {
                ctx.error = Some(e.to_string());
                StrategyOutcome::TryNext
            }
        }
    }
}

/// Hand-written explanations for a few well-known terms.
pub struct CannedExplanations;

#[async_trait]
impl FallbackStrategy for CannedExplanations {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn attempt(&self, ctx: &mut FallbackContext) -> StrategyOutcome {
        match canned_explanation(&ctx.question) {
            Some(text) => StrategyOutcome::Answer(text.to_string()),
            None => StrategyOutcome::TryNext,
        }
    }
}

pub struct GenericApology;

#[async_trait]
impl FallbackStrategy for GenericApology {
    fn name(&self) -> &'static str {
        "apology"
    }

    async fn attempt(&self, ctx: &mut FallbackContext) -> StrategyOutcome {
        StrategyOutcome::Answer(generic_apology(&ctx.question, ctx.error.as_deref()))
    }
}

pub fn generic_apology(question: &str, error: Option<&str>) -> String {
    let technical = error
        .filter(|e| !e.trim().is_empty())
        .map(|e| format!("\n\n**Technical Issue:** {}", e))
        .unwrap_or_default();
    format!(
        "I'd love to help explain that concept! Unfortunately, the local AI model isn't available right now.\n\n**Your question:** \"{}\"{}\n\nTry asking me directly about common web development concepts, or check that Ollama is running and the configured model is installed.",
        question, technical
    )
}

#[derive(Default)]
pub struct FallbackLadder {
    strategies: Vec<Box<dyn FallbackStrategy>>,
}

impl FallbackLadder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, strategy: impl FallbackStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Local tiers only: canned explanations, then the apology.
    pub fn offline() -> Self {
        Self::new().then(CannedExplanations).then(GenericApology)
    }

    /// Capability answer first, then the local tiers.
    pub fn with_capability(answer: CapabilityAnswer) -> Self {
        Self::new()
            .then(answer)
            .then(CannedExplanations)
            .then(GenericApology)
    }

    /// Run strategies in order until one answers.
    pub async fn run(&self, ctx: FallbackContext) -> String {
        self.resolve(ctx).await.text
    }

    /// Like `run`, but also reports which strategy produced the answer.
    pub async fn resolve(&self, mut ctx: FallbackContext) -> Resolution {
        for (tier, strategy) in self.strategies.iter().enumerate() {
            match strategy.attempt(&mut ctx).await {
                StrategyOutcome::Answer(text) if !text.trim().is_empty() => {
                    if tier > 0 {
                        info!(strategy = strategy.name(), tier, "answered from fallback tier");
                    }
                    return Resolution {
                        text,
                        strategy: strategy.name(),
                        tier,
                        error: ctx.error,
                    };
                }
                _ => {
                    debug!(strategy = strategy.name(), error = ?ctx.error, "strategy passed");
                }
            }
        }
        Resolution {
            text: generic_apology(&ctx.question, ctx.error.as_deref()),
            strategy: "apology",
            tier: self.strategies.len(),
            error: ctx.error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub text: String,
    pub strategy: &'static str,
    /// Position of the answering strategy; 0 means no degradation.
    pub tier: usize,
    pub error: Option<String>,
}
