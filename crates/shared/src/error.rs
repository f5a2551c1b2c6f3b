//! Error taxonomy shared by acquisition and capability layers.

/// Failure kinds the orchestrator branches on.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Cannot access {url}: {reason}")]
    AccessDenied { url: String, reason: String },

    #[error("No readable content found on {url}")]
    ExtractionEmpty { url: String },

    #[error("Timed out after {waited_ms}ms waiting for {url} to load")]
    Timeout { url: String, waited_ms: u64 },

    #[error("{profile} capability is unavailable")]
    CapabilityUnavailable { profile: String },

    #[error("Capability call failed: {0}")]
    CapabilityTransient(String),

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("No active tab found")]
    NoActiveTab,

    #[error("Browser host error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl AssistantError {
    pub fn access_denied(url: impl Into<String>, reason: impl Into<String>) -> Self {
        AssistantError::AccessDenied {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(profile: impl Into<String>) -> Self {
        AssistantError::CapabilityUnavailable {
            profile: profile.into(),
        }
    }

    /// Short machine-friendly name of the kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantError::AccessDenied { .. } => "access_denied",
            AssistantError::ExtractionEmpty { .. } => "extraction_empty",
            AssistantError::Timeout { .. } => "timeout",
            AssistantError::CapabilityUnavailable { .. } => "capability_unavailable",
            AssistantError::CapabilityTransient(_) => "capability_transient",
            AssistantError::MalformedResponse { .. } => "malformed_response",
            AssistantError::NoActiveTab => "no_active_tab",
            AssistantError::Collaborator(_) => "collaborator",
        }
    }
}

pub type Result<T, E = AssistantError> = std::result::Result<T, E>;
