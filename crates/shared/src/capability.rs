//! Types describing the on-device generative capability and its sessions.

use serde::{Deserialize, Serialize};

/// Result of probing a capability profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Downloadable,
    Downloading,
    Unavailable,
}

impl Availability {
    /// Anything other than `Unavailable` can produce a session, possibly
    /// after a download.
    pub fn is_usable(&self) -> bool {
        !matches!(self, Availability::Unavailable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Available => "available",
            Availability::Downloadable => "downloadable",
            Availability::Downloading => "downloading",
            Availability::Unavailable => "unavailable",
        }
    }
}

/// Resolved level of generative support on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityTier {
    Unavailable,
    TextOnly,
    Multimodal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
}

/// Expected input or output modality, optionally restricted to languages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalitySpec {
    #[serde(rename = "type")]
    pub modality: Modality,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
}

impl ModalitySpec {
    pub fn text() -> Self {
        Self {
            modality: Modality::Text,
            languages: Vec::new(),
        }
    }

    pub fn image() -> Self {
        Self {
            modality: Modality::Image,
            languages: Vec::new(),
        }
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| l.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryType {
    KeyPoints,
    Tldr,
    Teaser,
    Headline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryFormat {
    Markdown,
    PlainText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    Medium,
    Long,
}

/// Options for the summarization profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizerOptions {
    #[serde(rename = "type")]
    pub summary_type: SummaryType,
    pub format: SummaryFormat,
    pub length: SummaryLength,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_context: Option<String>,
    pub output_language: String,
    pub expected_input_languages: Vec<String>,
}

impl Default for SummarizerOptions {
    fn default() -> Self {
        Self {
            summary_type: SummaryType::KeyPoints,
            format: SummaryFormat::Markdown,
            length: SummaryLength::Medium,
            shared_context: None,
            output_language: "en-US".into(),
            expected_input_languages: vec!["en-US".into()],
        }
    }
}

impl SummarizerOptions {
    pub fn new(summary_type: SummaryType, length: SummaryLength) -> Self {
        Self {
            summary_type,
            length,
            ..Self::default()
        }
    }

    /// Lowest-common-denominator option set used for the creation retry.
    pub fn minimal() -> Self {
        Self {
            summary_type: SummaryType::KeyPoints,
            format: SummaryFormat::PlainText,
            length: SummaryLength::Short,
            ..Self::default()
        }
    }
}

/// Tuning parameters reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParams {
    pub default_temperature: f32,
    pub max_temperature: f32,
    pub default_top_k: u32,
    pub max_top_k: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// Raw bytes with a declared media type (an image or audio clip).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryBlob {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Image(BinaryBlob),
    Audio(BinaryBlob),
}

impl PromptPart {
    pub fn modality(&self) -> Modality {
        match self {
            PromptPart::Text(_) => Modality::Text,
            PromptPart::Image(_) => Modality::Image,
            PromptPart::Audio(_) => Modality::Audio,
        }
    }
}

/// One message of a (possibly multimodal) conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub parts: Vec<PromptPart>,
}

impl PromptMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            parts: vec![PromptPart::Text(text.into())],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            parts: vec![PromptPart::Text(text.into())],
        }
    }

    pub fn with_part(mut self, part: PromptPart) -> Self {
        self.parts.push(part);
        self
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                PromptPart::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Options for the general prompting profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptOptions {
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    pub initial_prompts: Vec<PromptMessage>,
    pub expected_inputs: Vec<ModalitySpec>,
    pub expected_outputs: Vec<ModalitySpec>,
}

impl PromptOptions {
    pub fn text_only() -> Self {
        Self {
            expected_inputs: vec![ModalitySpec::text()],
            expected_outputs: vec![ModalitySpec::text().with_languages(&["en"])],
            ..Self::default()
        }
    }

    pub fn multimodal() -> Self {
        Self {
            expected_inputs: vec![ModalitySpec::image(), ModalitySpec::text()],
            expected_outputs: vec![ModalitySpec::text().with_languages(&["en"])],
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, text: impl Into<String>) -> Self {
        self.initial_prompts.push(PromptMessage::system(text));
        self
    }

    pub fn accepts(&self, modality: Modality) -> bool {
        self.expected_inputs.iter().any(|m| m.modality == modality)
    }
}

/// A named capability profile, carrying the options to negotiate.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityProfile {
    Summarization(SummarizerOptions),
    Prompting(PromptOptions),
}

impl CapabilityProfile {
    pub fn name(&self) -> &'static str {
        match self {
            CapabilityProfile::Summarization(_) => "summarization",
            CapabilityProfile::Prompting(o) if o.accepts(Modality::Image) => "multimodal prompting",
            CapabilityProfile::Prompting(_) => "prompting",
        }
    }
}

/// Parameters a session was actually created with.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatedParams {
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    pub expected_inputs: Vec<Modality>,
    pub expected_outputs: Vec<Modality>,
}

/// Input submitted to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// Single-shot summarization with optional steering context.
    Summarize {
        text: String,
        context: Option<String>,
    },
    /// One or more conversation turns for the prompting profile.
    Prompt(Vec<PromptMessage>),
}

impl SessionInput {
    pub fn summarize(text: impl Into<String>, context: Option<String>) -> Self {
        SessionInput::Summarize {
            text: text.into(),
            context,
        }
    }

    pub fn prompt(text: impl Into<String>) -> Self {
        SessionInput::Prompt(vec![PromptMessage::user(text)])
    }
}

/// Lifecycle state of one session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unprobed,
    Probed(Availability),
    Created,
    InUse,
    Destroyed,
}
