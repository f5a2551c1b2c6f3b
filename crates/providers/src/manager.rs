//! Capability session manager.
//!
//! Probes capability profiles, negotiates tuning parameters, opens sessions
//! (retrying once with a minimal option set) and guarantees that every
//! opened session is destroyed exactly once.

use std::sync::Arc;

use shared::capability::{
    Availability, CapabilityProfile, CapabilityTier, Modality, NegotiatedParams, PromptMessage,
    PromptOptions, SessionInput, SessionState, SummarizerOptions,
};
use shared::error::{AssistantError, Result};
use shared::events::ProgressReporter;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::host::{CapabilityHost, CreateRequest, HostSession};

pub struct SessionManager {
    host: Arc<dyn CapabilityHost>,
}

impl SessionManager {
    pub fn new(host: Arc<dyn CapabilityHost>) -> Self {
        Self { host }
    }

    /// Probe a profile. Host errors count as `Unavailable`.
    pub async fn probe(&self, profile: &CapabilityProfile) -> Availability {
        match self.host.availability(profile).await {
            Ok(availability) => {
                debug!(profile = profile.name(), availability = availability.as_str(), "probed capability");
                availability
            }
            Err(e) => {
                warn!(profile = profile.name(), error = %e, "capability probe failed");
                Availability::Unavailable
            }
        }
    }

    /// Resolve the highest usable tier: image+text first, then text.
    pub async fn probe_tier(&self) -> CapabilityTier {
        let multimodal = CapabilityProfile::Prompting(PromptOptions::multimodal());
        if self.probe(&multimodal).await.is_usable() {
            return CapabilityTier::Multimodal;
        }
        let text = CapabilityProfile::Prompting(PromptOptions::text_only());
        if self.probe(&text).await.is_usable() {
            return CapabilityTier::TextOnly;
        }
        CapabilityTier::Unavailable
    }

    /// Open a session, or `None` when the capability is unusable right now.
    ///
    /// Creation is retried once with a minimal option set before giving up.
    pub async fn create_session(
        &self,
        profile: CapabilityProfile,
        progress: Option<ProgressReporter>,
        cancel: Option<CancellationToken>,
    ) -> Option<Session> {
        let cancel = cancel.unwrap_or_default();
        let availability = self.probe(&profile).await;
        if !availability.is_usable() {
            return None;
        }
        if availability == Availability::Downloading {
            info!(profile = profile.name(), "model is downloading, session creation may take a while");
        }

        let negotiated = self.negotiate(profile.clone()).await;
        match self.try_create(&negotiated, progress.clone(), &cancel).await {
            Ok(session) => return Some(session),
            Err(e) => {
                warn!(profile = profile.name(), error = %e, "session creation failed, retrying with minimal options");
            }
        }

        if cancel.is_cancelled() {
            return None;
        }

        let minimal = minimal_profile(&profile);
        match self.try_create(&minimal, progress, &cancel).await {
            Ok(session) => {
                info!(profile = profile.name(), "session created with minimal options");
                Some(session)
            }
            Err(e) => {
                warn!(profile = profile.name(), error = %e, "minimal session creation also failed");
                None
            }
        }
    }

    /// Create, summarize and destroy in one logical operation.
    pub async fn summarize(
        &self,
        text: &str,
        options: SummarizerOptions,
        context: Option<String>,
        progress: Option<ProgressReporter>,
    ) -> Result<String> {
        self.run_once(
            CapabilityProfile::Summarization(options),
            SessionInput::summarize(text, context),
            progress,
        )
        .await
    }

    /// Create, prompt and destroy in one logical operation.
    pub async fn prompt(
        &self,
        options: PromptOptions,
        messages: Vec<PromptMessage>,
        progress: Option<ProgressReporter>,
    ) -> Result<String> {
        self.run_once(
            CapabilityProfile::Prompting(options),
            SessionInput::Prompt(messages),
            progress,
        )
        .await
    }

    async fn run_once(
        &self,
        profile: CapabilityProfile,
        input: SessionInput,
        progress: Option<ProgressReporter>,
    ) -> Result<String> {
        let name = profile.name();
        let mut session = self
            .create_session(profile, progress, None)
            .await
            .ok_or_else(|| AssistantError::unavailable(name))?;
        let result = session.submit(input).await;
        session.destroy();
        result
    }

    /// Fill in temperature and top-K from the host's current parameters.
    ///
    /// Parameters are queried on every call; caller overrides are clamped
    /// to the reported maxima.
    async fn negotiate(&self, profile: CapabilityProfile) -> CapabilityProfile {
        let mut options = match profile {
            CapabilityProfile::Prompting(options) => options,
            other => return other,
        };
        match self.host.params().await {
            Ok(params) => {
                options.temperature = Some(
                    options
                        .temperature
                        .map(|t| t.clamp(0.0, params.max_temperature))
                        .unwrap_or(params.default_temperature),
                );
                options.top_k = Some(
                    options
                        .top_k
                        .map(|k| k.clamp(1, params.max_top_k.max(1)))
                        .unwrap_or(params.default_top_k),
                );
            }
            Err(e) => {
                warn!(error = %e, "could not read capability parameters, using host defaults");
            }
        }
        if options.expected_inputs.is_empty() {
            options.expected_inputs = PromptOptions::text_only().expected_inputs;
        }
        if options.expected_outputs.is_empty() {
            options.expected_outputs = PromptOptions::text_only().expected_outputs;
        }
        CapabilityProfile::Prompting(options)
    }

    async fn try_create(
        &self,
        profile: &CapabilityProfile,
        progress: Option<ProgressReporter>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Session> {
        if cancel.is_cancelled() {
            anyhow::bail!("session creation cancelled");
        }
        let request = CreateRequest {
            profile: profile.clone(),
            monitor: progress,
            cancel: cancel.clone(),
        };
        let inner = tokio::select! {
            created = self.host.create(request) => created?,
            _ = cancel.cancelled() => anyhow::bail!("session creation cancelled"),
        };
        debug!(profile = profile.name(), "session created");
        Ok(Session::new(inner, negotiated_params(profile), profile.name()))
    }
}

/// Lowest-common-denominator version of a profile.
///
/// Requested modalities are kept so the input can still be accepted;
/// tuning overrides and initial prompts are dropped.
fn minimal_profile(profile: &CapabilityProfile) -> CapabilityProfile {
    match profile {
        CapabilityProfile::Summarization(_) => {
            CapabilityProfile::Summarization(SummarizerOptions::minimal())
        }
        CapabilityProfile::Prompting(options) => {
            let base = if options.accepts(Modality::Image) {
                PromptOptions::multimodal()
            } else {
                PromptOptions::text_only()
            };
            CapabilityProfile::Prompting(base)
        }
    }
}

fn negotiated_params(profile: &CapabilityProfile) -> NegotiatedParams {
    match profile {
        CapabilityProfile::Summarization(_) => NegotiatedParams {
            temperature: None,
            top_k: None,
            expected_inputs: vec![Modality::Text],
            expected_outputs: vec![Modality::Text],
        },
        CapabilityProfile::Prompting(options) => NegotiatedParams {
            temperature: options.temperature,
            top_k: options.top_k,
            expected_inputs: options.expected_inputs.iter().map(|m| m.modality).collect(),
            expected_outputs: options.expected_outputs.iter().map(|m| m.modality).collect(),
        },
    }
}

/// Exclusively owned handle to one open session.
///
/// Destroy it after the logical unit of work; dropping it destroys it too.
pub struct Session {
    inner: Option<Box<dyn HostSession>>,
    state: SessionState,
    params: NegotiatedParams,
    profile: &'static str,
}

impl Session {
    fn new(inner: Box<dyn HostSession>, params: NegotiatedParams, profile: &'static str) -> Self {
        Self {
            inner: Some(inner),
            state: SessionState::Created,
            params,
            profile,
        }
    }

    pub fn params(&self) -> &NegotiatedParams {
        &self.params
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub async fn submit(&mut self, input: SessionInput) -> Result<String> {
        self.check_input(&input)?;
        let inner = self.inner.as_mut().ok_or_else(destroyed)?;
        self.state = SessionState::InUse;
        let result = inner.submit(input).await;
        self.state = SessionState::Created;
        result.map_err(|e| AssistantError::CapabilityTransient(e.to_string()))
    }

    pub async fn submit_streaming(
        &mut self,
        input: SessionInput,
        tx: UnboundedSender<String>,
    ) -> Result<String> {
        self.check_input(&input)?;
        let inner = self.inner.as_mut().ok_or_else(destroyed)?;
        self.state = SessionState::InUse;
        let result = inner.submit_streaming(input, tx).await;
        self.state = SessionState::Created;
        result.map_err(|e| AssistantError::CapabilityTransient(e.to_string()))
    }

    pub async fn append(&mut self, messages: Vec<PromptMessage>) -> Result<()> {
        let inner = self.inner.as_mut().ok_or_else(destroyed)?;
        inner
            .append(messages)
            .await
            .map_err(|e| AssistantError::CapabilityTransient(e.to_string()))
    }

    pub fn destroy(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.destroy();
            self.state = SessionState::Destroyed;
            debug!(profile = self.profile, "session destroyed");
        }
    }

    /// Reject parts whose modality the session was not created for.
    fn check_input(&self, input: &SessionInput) -> Result<()> {
        if let SessionInput::Prompt(messages) = input {
            for part in messages.iter().flat_map(|m| m.parts.iter()) {
                let modality = part.modality();
                if !self.params.expected_inputs.contains(&modality) {
                    return Err(AssistantError::CapabilityTransient(format!(
                        "{} session was not created for {:?} input",
                        self.profile, modality
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn destroyed() -> AssistantError {
    AssistantError::CapabilityTransient("session already destroyed".into())
}
