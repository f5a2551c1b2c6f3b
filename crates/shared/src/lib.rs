pub mod action;
pub mod capability;
pub mod content;
pub mod error;
pub mod events;

pub mod settings {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    fn default_base_url() -> String {
        "http://127.0.0.1:11434".into()
    }

    /// Where and how the generative capability is reached.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CapabilitySettings {
        #[serde(default = "default_base_url")]
        pub base_url: String,
        pub text_model: String,              // e.g., "llama3.2:3b"
        pub vision_model: Option<String>,    // e.g., "llava:7b"; None disables image input
        pub default_temperature: f32,
        pub max_temperature: f32,
        pub default_top_k: u32,
        pub max_top_k: u32,
        pub request_timeout_secs: u64,
    }

    /// Remote tab fetch policy.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct FetchSettings {
        pub tab_load_timeout_ms: u64,
        /// Extra wait after load-complete for deferred rendering
        pub settle_delay_ms: u64,
    }

    impl FetchSettings {
        pub fn load_timeout(&self) -> Duration {
            Duration::from_millis(self.tab_load_timeout_ms)
        }

        pub fn settle_delay(&self) -> Duration {
            Duration::from_millis(self.settle_delay_ms)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AssistantSettings {
        pub capability: CapabilitySettings,
        #[serde(default)]
        pub fetch: FetchSettings,
        #[serde(default = "default_ttl")]
        pub pending_action_ttl_secs: u64,
        #[serde(default = "default_max_chars")]
        pub max_main_text_chars: usize,
        #[serde(default = "default_context_chars")]
        pub selection_context_chars: usize,
        #[serde(default = "default_longest_blocks")]
        pub max_longest_blocks: usize,
    }

    fn default_ttl() -> u64 {
        30
    }

    fn default_max_chars() -> usize {
        crate::content::MAX_MAIN_TEXT_CHARS
    }

    fn default_context_chars() -> usize {
        crate::content::SELECTION_CONTEXT_CHARS
    }

    fn default_longest_blocks() -> usize {
        5
    }

    impl AssistantSettings {
        pub fn pending_action_ttl(&self) -> chrono::Duration {
            chrono::Duration::seconds(self.pending_action_ttl_secs as i64)
        }
    }

    impl Default for CapabilitySettings {
        fn default() -> Self {
            Self {
                base_url: std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| default_base_url()),
                text_model: "llama3.2:3b".into(),
                vision_model: None,
                default_temperature: 0.8,
                max_temperature: 2.0,
                default_top_k: 40,
                max_top_k: 128,
                request_timeout_secs: 120,
            }
        }
    }

    impl Default for FetchSettings {
        fn default() -> Self {
            Self {
                tab_load_timeout_ms: 10_000,
                settle_delay_ms: 1_000,
            }
        }
    }

    impl Default for AssistantSettings {
        fn default() -> Self {
            Self {
                capability: CapabilitySettings::default(),
                fetch: FetchSettings::default(),
                pending_action_ttl_secs: default_ttl(),
                max_main_text_chars: default_max_chars(),
                selection_context_chars: default_context_chars(),
                max_longest_blocks: default_longest_blocks(),
            }
        }
    }
}

pub mod agent_api {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        Assistant,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub id: Uuid,
        pub role: Role,
        pub content: String,
        pub timestamp: DateTime<Utc>,
    }

    impl ChatMessage {
        pub fn new(role: Role, content: impl Into<String>) -> Self {
            Self {
                id: Uuid::new_v4(),
                role,
                content: content.into(),
                timestamp: Utc::now(),
            }
        }
    }

    /// Ordered chat history. Only ever appended to.
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct ChatTranscript {
        messages: Vec<ChatMessage>,
    }

    impl ChatTranscript {
        pub fn with_greeting(greeting: impl Into<String>) -> Self {
            let mut transcript = Self::default();
            transcript.push(Role::Assistant, greeting);
            transcript
        }

        pub fn push(&mut self, role: Role, content: impl Into<String>) -> &ChatMessage {
            self.messages.push(ChatMessage::new(role, content));
            &self.messages[self.messages.len() - 1]
        }

        pub fn messages(&self) -> &[ChatMessage] {
            &self.messages
        }

        pub fn last(&self) -> Option<&ChatMessage> {
            self.messages.last()
        }

        pub fn len(&self) -> usize {
            self.messages.len()
        }

        pub fn is_empty(&self) -> bool {
            self.messages.is_empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::agent_api::{ChatTranscript, Role};
    use super::settings::AssistantSettings;

    #[test]
    fn test_settings_defaults() {
        let settings = AssistantSettings::default();
        assert_eq!(settings.fetch.tab_load_timeout_ms, 10_000);
        assert_eq!(settings.fetch.settle_delay_ms, 1_000);
        assert_eq!(settings.pending_action_ttl_secs, 30);
        assert_eq!(settings.selection_context_chars, 200);
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let json = r#"{"capability":{"text_model":"m","vision_model":null,
            "default_temperature":1.0,"max_temperature":2.0,"default_top_k":3,
            "max_top_k":8,"request_timeout_secs":5}}"#;
        let settings: AssistantSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.capability.text_model, "m");
        assert_eq!(settings.capability.base_url, "http://127.0.0.1:11434");
        assert_eq!(settings.pending_action_ttl_secs, 30);
        assert_eq!(settings.fetch.tab_load_timeout_ms, 10_000);
    }

    #[test]
    fn test_transcript_appends() {
        let mut transcript = ChatTranscript::with_greeting("Hello!");
        transcript.push(Role::User, "hi");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].role, Role::Assistant);
        assert_eq!(transcript.last().unwrap().content, "hi");
    }
}
