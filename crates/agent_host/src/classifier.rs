//! Keyword classification of free-typed chat messages.

use regex::Regex;
use std::sync::LazyLock;

static EXPLANATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(explain|clarify|what|how|why|mean|understand|breakdown|simplify)\b")
        .expect("static regex")
});

static PROGRAMMING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(ref|react|javascript|js|css|html|function|component|hook|useState|useEffect|props|state|mounted|render)\b",
    )
    .expect("static regex")
});

/// Programming markers for a derived topic; broader than the message set.
static PROGRAMMING_TOPIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(ref|react|javascript|js|css|html|function|component|hook|useState|useEffect|props|state|mounted|render|api|code|programming)\b",
    )
    .expect("static regex")
});

static LEADING_INTERROGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(what does|what is|how does|explain|clarify|what|how|why)\s*")
        .expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Intent {
    pub explanation: bool,
    pub programming: bool,
}

impl Intent {
    /// Explanatory answer rather than page question-answering.
    pub fn wants_explanation(&self) -> bool {
        self.explanation || self.programming
    }
}

pub fn classify(message: &str) -> Intent {
    Intent {
        explanation: EXPLANATION.is_match(message),
        programming: PROGRAMMING.is_match(message),
    }
}

pub fn is_programming_topic(topic: &str) -> bool {
    PROGRAMMING_TOPIC.is_match(topic)
}

/// Strip one leading interrogative phrase ("what is", "explain", ...).
pub fn extract_topic(message: &str) -> String {
    let trimmed = message.trim();
    let topic = LEADING_INTERROGATIVE.replace(trimmed, "").trim().to_string();
    if topic.is_empty() {
        trimmed.to_string()
    } else {
        topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let intent = classify("Why does useEffect run twice?");
        assert!(intent.explanation);
        assert!(intent.programming);

        let intent = classify("Summarize the reviews on this page");
        assert!(!intent.wants_explanation());

        // word boundaries: "whatever" is not "what"
        assert!(!classify("whatever works").explanation);
        assert!(classify("Tell me about REACT").programming);
    }

    #[test]
    fn test_extract_topic() {
        assert_eq!(extract_topic("What is a closure?"), "a closure?");
        assert_eq!(extract_topic("what does   this mean"), "this mean");
        assert_eq!(extract_topic("explain hooks"), "hooks");
        assert_eq!(extract_topic("closures please"), "closures please");
        assert_eq!(extract_topic("why"), "why");
    }

    #[test]
    fn test_programming_topic() {
        assert!(is_programming_topic("the fetch API"));
        assert!(!is_programming_topic("photosynthesis"));
    }
}
