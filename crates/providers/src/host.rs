//! Contract of the generative capability host.
//!
//! The host is a black box: it reports availability per profile, exposes
//! its tuning parameters and opens sessions. Everything the orchestrator
//! needs from it goes through these two traits.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::capability::{Availability, CapabilityProfile, ModelParams, PromptMessage, SessionInput};
use shared::events::ProgressReporter;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Everything the host needs to open one session.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub profile: CapabilityProfile,
    /// Receives download/preparation progress while the session is created.
    pub monitor: Option<ProgressReporter>,
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait CapabilityHost: Send + Sync {
    /// Probe a profile without creating anything.
    async fn availability(&self, profile: &CapabilityProfile) -> Result<Availability>;

    /// Default and maximum tuning parameters. May change between calls.
    async fn params(&self) -> Result<ModelParams>;

    /// Open a session for the given (already negotiated) profile.
    async fn create(&self, request: CreateRequest) -> Result<Box<dyn HostSession>>;
}

/// An open session inside the host runtime.
#[async_trait]
pub trait HostSession: Send {
    async fn submit(&mut self, input: SessionInput) -> Result<String>;

    /// Streams text chunks over `tx` and returns the full text.
    async fn submit_streaming(
        &mut self,
        input: SessionInput,
        tx: UnboundedSender<String>,
    ) -> Result<String> {
        let text = self.submit(input).await?;
        let _ = tx.send(text.clone());
        Ok(text)
    }

    /// Append conversation turns without asking for a reply.
    async fn append(&mut self, _messages: Vec<PromptMessage>) -> Result<()> {
        Err(anyhow!("this session does not support appending messages"))
    }

    /// Release host resources. Called exactly once per session.
    fn destroy(&mut self);
}
