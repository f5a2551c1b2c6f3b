use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::capability::{
    Availability, CapabilityProfile, Modality, ModelParams, PromptMessage, PromptOptions,
    PromptPart, PromptRole, SessionInput, SummarizerOptions, SummaryFormat, SummaryLength,
    SummaryType,
};
use shared::events::ProgressReporter;
use shared::settings::CapabilitySettings;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::host::{CapabilityHost, CreateRequest, HostSession};

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [OllamaMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

/// Streaming response: each line is one of these JSON objects.
#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OllamaPullStatus {
    #[serde(default)]
    status: String,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

/// Capability host backed by a local Ollama daemon.
///
/// Text profiles use `text_model`; image input requires `vision_model`.
/// Models that are not installed yet report `Downloadable` and are pulled
/// on session creation, with pull progress relayed to the monitor.
pub struct OllamaCapabilityHost {
    http: Client,
    settings: CapabilitySettings,
}

impl OllamaCapabilityHost {
    pub fn new(settings: CapabilitySettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .pool_max_idle_per_host(2)
            .build()?;
        Ok(Self { http, settings })
    }

    fn model_for(&self, profile: &CapabilityProfile) -> Option<&str> {
        match profile {
            CapabilityProfile::Prompting(o) if o.accepts(Modality::Image) => {
                self.settings.vision_model.as_deref()
            }
            _ => Some(self.settings.text_model.as_str()),
        }
    }

    async fn installed_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.settings.base_url);
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("ollama error: {}", resp.status()));
        }
        let tags: OllamaTags = resp.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull(&self, model: &str, monitor: Option<&ProgressReporter>, cancel: &CancellationToken) -> Result<()> {
        info!(model, "pulling model");
        let url = format!("{}/api/pull", self.settings.base_url);
        let body = serde_json::json!({ "model": model, "stream": true });
        let resp = self.http.post(url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("ollama pull error: {}", resp.status()));
        }

        let mut stream = resp.bytes_stream();
        let mut buf = String::new();
        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = cancel.cancelled() => return Err(anyhow!("model pull cancelled")),
            };
            let Some(chunk) = chunk else { break };
            let bytes = chunk.map_err(|e| anyhow!("stream read error: {}", e))?;
            buf.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim().to_string();
                buf = buf[pos + 1..].to_string();
                if line.is_empty() {
                    continue;
                }
                let status: OllamaPullStatus = serde_json::from_str(&line)?;
                if let Some(err) = status.error {
                    return Err(anyhow!("ollama pull failed: {}", err));
                }
                if let (Some(monitor), Some(percent)) = (monitor, pull_percent(&status)) {
                    monitor.report(percent);
                }
                if status.status == "success" {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

fn pull_percent(status: &OllamaPullStatus) -> Option<f32> {
    match (status.total, status.completed) {
        (Some(total), Some(completed)) if total > 0 => {
            Some(completed as f32 / total as f32 * 100.0)
        }
        _ => None,
    }
}

/// Tags may omit the implicit `:latest` suffix.
fn is_installed(installed: &[String], model: &str) -> bool {
    installed.iter().any(|name| {
        name == model
            || name.strip_suffix(":latest") == Some(model)
            || model.strip_suffix(":latest") == Some(name.as_str())
    })
}

#[async_trait]
impl CapabilityHost for OllamaCapabilityHost {
    async fn availability(&self, profile: &CapabilityProfile) -> Result<Availability> {
        let Some(model) = self.model_for(profile) else {
            return Ok(Availability::Unavailable);
        };
        match self.installed_models().await {
            Ok(installed) if is_installed(&installed, model) => Ok(Availability::Available),
            Ok(_) => Ok(Availability::Downloadable),
            Err(e) => {
                debug!(error = %e, "ollama is not reachable");
                Ok(Availability::Unavailable)
            }
        }
    }

    async fn params(&self) -> Result<ModelParams> {
        Ok(ModelParams {
            default_temperature: self.settings.default_temperature,
            max_temperature: self.settings.max_temperature,
            default_top_k: self.settings.default_top_k,
            max_top_k: self.settings.max_top_k,
        })
    }

    async fn create(&self, request: CreateRequest) -> Result<Box<dyn HostSession>> {
        let model = self
            .model_for(&request.profile)
            .ok_or_else(|| anyhow!("no model configured for {}", request.profile.name()))?
            .to_string();

        let installed = self.installed_models().await?;
        if !is_installed(&installed, &model) {
            self.pull(&model, request.monitor.as_ref(), &request.cancel).await?;
        }
        if let Some(monitor) = &request.monitor {
            monitor.report(100.0);
        }

        let session = match request.profile {
            CapabilityProfile::Summarization(options) => OllamaSession {
                http: self.http.clone(),
                base: self.settings.base_url.clone(),
                model,
                options: None,
                history: Vec::new(),
                summarizer: Some(options),
            },
            CapabilityProfile::Prompting(options) => OllamaSession {
                http: self.http.clone(),
                base: self.settings.base_url.clone(),
                model,
                options: Some(OllamaOptions {
                    temperature: options.temperature,
                    top_k: options.top_k,
                }),
                history: initial_history(&options),
                summarizer: None,
            },
        };
        Ok(Box::new(session))
    }
}

fn initial_history(options: &PromptOptions) -> Vec<OllamaMessage> {
    options.initial_prompts.iter().map(to_ollama).collect()
}

fn to_ollama(message: &PromptMessage) -> OllamaMessage {
    let role = match message.role {
        PromptRole::System => "system",
        PromptRole::User => "user",
        PromptRole::Assistant => "assistant",
    };
    let images = message
        .parts
        .iter()
        .filter_map(|p| match p {
            PromptPart::Image(blob) => Some(STANDARD.encode(&blob.data)),
            _ => None,
        })
        .collect();
    OllamaMessage {
        role: role.to_string(),
        content: message.text(),
        images,
    }
}

/// System instruction equivalent to a summarizer configuration.
fn summarizer_instruction(options: &SummarizerOptions, context: Option<&str>) -> String {
    let shape = match options.summary_type {
        SummaryType::KeyPoints => "the key points as a bulleted list",
        SummaryType::Tldr => "a short TL;DR overview",
        SummaryType::Teaser => "an enticing teaser that highlights the most interesting parts",
        SummaryType::Headline => "a single headline",
    };
    let length = match options.length {
        SummaryLength::Short => "Keep it short.",
        SummaryLength::Medium => "Use a medium length.",
        SummaryLength::Long => "Be thorough.",
    };
    let format = match options.format {
        SummaryFormat::Markdown => "Format the output as markdown.",
        SummaryFormat::PlainText => "Use plain text without markdown.",
    };
    let mut instruction = format!(
        "Summarize the text you are given as {}. {} {} Respond in {}.",
        shape, length, format, options.output_language
    );
    for ctx in [options.shared_context.as_deref(), context].into_iter().flatten() {
        instruction.push_str("\n\nContext: ");
        instruction.push_str(ctx);
    }
    instruction
}

struct OllamaSession {
    http: Client,
    base: String,
    model: String,
    options: Option<OllamaOptions>,
    history: Vec<OllamaMessage>,
    summarizer: Option<SummarizerOptions>,
}

impl OllamaSession {
    /// Messages for this call. Summaries are single-shot; prompts extend the history.
    fn conversation(&mut self, input: SessionInput) -> Vec<OllamaMessage> {
        match input {
            SessionInput::Summarize { text, context } => {
                let options = self.summarizer.clone().unwrap_or_default();
                vec![
                    OllamaMessage {
                        role: "system".into(),
                        content: summarizer_instruction(&options, context.as_deref()),
                        images: Vec::new(),
                    },
                    OllamaMessage {
                        role: "user".into(),
                        content: text,
                        images: Vec::new(),
                    },
                ]
            }
            SessionInput::Prompt(messages) => {
                self.history.extend(messages.iter().map(to_ollama));
                self.history.clone()
            }
        }
    }

    fn remember_reply(&mut self, reply: &str) {
        if self.summarizer.is_none() {
            self.history.push(OllamaMessage {
                role: "assistant".into(),
                content: reply.to_string(),
                images: Vec::new(),
            });
        }
    }
}

#[async_trait]
impl HostSession for OllamaSession {
    async fn submit(&mut self, input: SessionInput) -> Result<String> {
        let messages = self.conversation(input);
        let url = format!("{}/api/chat", self.base);
        let req = OllamaChatRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
            options: self.options,
        };
        let resp = self.http.post(url).json(&req).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("ollama error: {}", resp.status()));
        }
        let body: OllamaChatResponse = resp.json().await?;
        self.remember_reply(&body.message.content);
        Ok(body.message.content)
    }

    async fn submit_streaming(
        &mut self,
        input: SessionInput,
        tx: UnboundedSender<String>,
    ) -> Result<String> {
        let messages = self.conversation(input);
        let url = format!("{}/api/chat", self.base);
        let req = OllamaChatRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
            options: self.options,
        };
        let resp = self.http.post(url).json(&req).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("ollama error: {}", resp.status()));
        }

        // Ollama streams line-delimited JSON
        let mut stream = resp.bytes_stream();
        let mut buf = String::new();
        let mut full = String::new();

        'read: while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| anyhow!("stream read error: {}", e))?;
            buf.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim().to_string();
                buf = buf[pos + 1..].to_string();

                if line.is_empty() {
                    continue;
                }

                let chunk_data = serde_json::from_str::<OllamaStreamChunk>(&line)
                    .map_err(|e| anyhow!("Failed to parse Ollama stream: {}", e))?;
                if let Some(msg) = &chunk_data.message {
                    if !msg.content.is_empty() {
                        full.push_str(&msg.content);
                        let _ = tx.send(msg.content.clone());
                    }
                }
                if chunk_data.done {
                    break 'read;
                }
            }
        }

        self.remember_reply(&full);
        Ok(full)
    }

    async fn append(&mut self, messages: Vec<PromptMessage>) -> Result<()> {
        if self.summarizer.is_some() {
            return Err(anyhow!("summarization sessions do not keep a conversation"));
        }
        self.history.extend(messages.iter().map(to_ollama));
        Ok(())
    }

    fn destroy(&mut self) {
        self.history.clear();
        debug!(model = %self.model, "ollama session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::capability::BinaryBlob;

    #[test]
    fn test_installed_model_matching() {
        let installed = vec!["llama3.2:3b".to_string(), "llava:latest".to_string()];
        assert!(is_installed(&installed, "llama3.2:3b"));
        assert!(is_installed(&installed, "llava"));
        assert!(!is_installed(&installed, "mistral"));
    }

    #[test]
    fn test_images_are_base64_encoded() {
        let message = PromptMessage::user("describe").with_part(PromptPart::Image(BinaryBlob {
            name: "pic.png".into(),
            mime_type: "image/png".into(),
            data: b"abc".to_vec(),
        }));
        let converted = to_ollama(&message);
        assert_eq!(converted.role, "user");
        assert_eq!(converted.content, "describe");
        assert_eq!(converted.images, vec!["YWJj".to_string()]);
    }

    #[test]
    fn test_summarizer_instruction_carries_context() {
        let mut options = SummarizerOptions::new(SummaryType::Tldr, SummaryLength::Long);
        options.shared_context = Some("educational".into());
        let text = summarizer_instruction(&options, Some("Answer the question"));
        assert!(text.contains("TL;DR"));
        assert!(text.contains("Be thorough."));
        assert!(text.contains("Context: educational"));
        assert!(text.contains("Context: Answer the question"));
    }

    #[test]
    fn test_pull_percent() {
        let status = OllamaPullStatus {
            status: "pulling".into(),
            total: Some(200),
            completed: Some(50),
            error: None,
        };
        assert_eq!(pull_percent(&status), Some(25.0));
    }

    #[test]
    fn test_vision_profile_without_model_has_no_model() {
        let host = OllamaCapabilityHost::new(CapabilitySettings::default()).unwrap();
        let profile = CapabilityProfile::Prompting(PromptOptions::multimodal());
        assert!(host.model_for(&profile).is_none());
    }
}
