//! Prompt templates for every acquisition path.
//!
//! Templates are plain functions of the acquired content so they can be
//! checked without a capability host.

use shared::action::PendingAction;
use shared::content::{domain_of, truncate_chars, ContentSnapshot, SelectionContext};

pub const GREETING: &str = "Hello! I'm ClarifAI. What can I help you with?";

/// Steering context for explanatory answers.
pub const EXPLANATION_CONTEXT: &str =
    "This should be an educational explanation using simple terms and examples";

/// Programming questions with less page context than this use a generic
/// programming context instead.
pub const MIN_PROGRAMMING_CONTEXT_CHARS: usize = 100;

/// Below this much context, programming topics get the self-contained
/// explanation request.
pub const RICH_CONTEXT_CHARS: usize = 200;

pub const LINK_CONTENT_MAX_CHARS: usize = 5000;

pub const IMAGE_SYSTEM_PROMPT: &str = "You are a helpful assistant that provides detailed, accurate descriptions of images. Focus on the main elements, colors, composition, and any text or important details visible in the image.";

pub const ALT_TEXT_SYSTEM_PROMPT: &str = "You are an accessibility expert. Generate concise, descriptive alt text for images that would be helpful for screen readers. Focus on the essential visual information in 1-2 sentences.";

pub const ALT_TEXT_REQUEST: &str =
    "Generate concise alt text for this image suitable for screen readers. Keep it brief but descriptive.";

pub const MULTI_IMAGE_SYSTEM_PROMPT: &str = "You are a skilled analyst who correlates patterns across multiple images. Provide detailed analysis comparing and contrasting the images.";

/// Context for a programming question asked without useful page text.
pub fn programming_context(message: &str) -> String {
    format!(
        "Programming Question: {}\nGeneral web development and React context.",
        message
    )
}

/// Explanation request, structured as definition, importance, examples and
/// pitfalls.
pub fn explanation_request(topic: &str, context: &str, programming_topic: bool) -> String {
    if programming_topic && context.chars().count() < RICH_CONTEXT_CHARS {
        format!(
            r#"Topic to explain: {topic}

Instructions: Provide a comprehensive explanation of this programming concept:
1. What it is and its purpose
2. How it works in simple terms
3. Common use cases and examples
4. Best practices
5. Common misconceptions or pitfalls

Use markdown formatting and make it beginner-friendly but thorough."#
        )
    } else {
        format!(
            r#"Context: {context}

Topic to explain: {topic}

Instructions: Explain this topic using clear, simple language:
1. What it means in simple terms
2. Why it's important or useful
3. Provide concrete examples
4. Break down any complex parts
5. Use analogies where helpful

Make it engaging and easy to understand."#
        )
    }
}

/// Page question-answering input.
pub fn page_question(snapshot: &ContentSnapshot, message: &str) -> String {
    format!(
        "Page: {}\nURL: {}\nContent: {}\nUser Question: {}",
        snapshot.title, snapshot.url, snapshot.main_text, message
    )
}

pub fn page_question_context(message: &str) -> String {
    format!(
        "Answer the user's question about this webpage content: \"{}\"",
        message
    )
}

/// Input when only the tab title and URL are known.
pub fn basic_context(title: &str, url: &str, message: &str) -> String {
    let or_unknown = |s: &str| {
        if s.trim().is_empty() {
            "Unknown".to_string()
        } else {
            s.to_string()
        }
    };
    format!(
        "Page Title: {}\nURL: {}\nUser Question: {}",
        or_unknown(title),
        or_unknown(url),
        message
    )
}

pub fn basic_context_instruction(message: &str) -> String {
    format!(
        "Answer this question: \"{}\". If you don't have enough context, provide a general explanation of the concept.",
        message
    )
}

/// Title, description and capped body of a fetched link.
pub fn link_content(snapshot: &ContentSnapshot) -> String {
    let (content, _) = truncate_chars(&snapshot.main_text, LINK_CONTENT_MAX_CHARS);
    format!(
        "Title: {}\n\nDescription: {}\n\nContent: {}",
        snapshot.title, snapshot.description, content
    )
}

pub fn link_explanation(url: &str, content: &str) -> String {
    format!(
        "Please explain the content from this link: {}\n\nContent from the linked page:\n{}\n\nPlease provide a clear and concise explanation of what this page is about, its main points, and why it might be relevant or interesting. Format your response in a friendly, conversational way.",
        url, content
    )
}

pub fn link_summary_context(url: &str) -> String {
    format!(
        "Summarize the key points of the content from this link: {}. Explain what the page is about and why it might be relevant.",
        url
    )
}

pub fn selection_prompt(text: &str, context: Option<&SelectionContext>) -> String {
    let context_info = context
        .filter(|c| !c.context_before.is_empty() || !c.context_after.is_empty())
        .map(|c| {
            format!(
                "\n\nContext from the page \"{}\" ({}):\nBefore: \"{}\"\nAfter: \"{}\"",
                c.page_title, c.page_url, c.context_before, c.context_after
            )
        })
        .unwrap_or_default();
    format!(
        r#"Please explain this selected text: "{text}"{context_info}

Please provide a clear explanation of what this text means, including:
1. The main concept or idea
2. Any technical terms or jargon explained in simple language
3. Why this might be important or relevant
4. Additional context if needed

Format your response in a friendly, educational way that's easy to understand."#
    )
}

pub fn page_prompt(page_url: &str, snapshot: &ContentSnapshot) -> String {
    let headings = snapshot
        .headings
        .iter()
        .map(|h| format!("H{}: {}", h.level, h.text))
        .collect::<Vec<_>>()
        .join("\n");
    let paragraphs = snapshot
        .paragraphs
        .iter()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n\n");
    let url = if page_url.is_empty() { &snapshot.url } else { page_url };
    format!(
        r#"Please provide a comprehensive summary of this webpage:

Title: {title}
URL: {url}
Description: {description}

Main headings:
{headings}

Main content:
{main}

Key paragraphs:
{paragraphs}

Please provide:
1. A concise summary of the main topic and key points
2. The primary purpose or goal of this page
3. Important details or insights
4. Who this content might be most relevant for

Format your response as a clear, well-structured summary that captures the essence of the page."#,
        title = snapshot.title,
        description = snapshot.description,
        main = snapshot.main_text,
    )
}

pub const PAGE_SUMMARY_CONTEXT: &str = "Summarize this webpage for a reader who has not opened it yet";

/// Shown when a page could not be summarized at all.
pub fn page_apology(page_label: &str, error: Option<&str>) -> String {
    let detail = error
        .filter(|e| !e.is_empty())
        .map(|e| format!("\n\n**Technical Issue:** {}", e))
        .unwrap_or_default();
    format!(
        "I wasn't able to summarize **{}**.\n\nThis usually happens when:\n- the page builds its content dynamically after loading\n- the page is restricted and extensions cannot read it\n- the page structure is too complex to find the main content{}\n\nTry selecting the part you are interested in and asking me to explain it instead.",
        page_label, detail
    )
}

pub fn image_description_request(action: &PendingAction) -> String {
    format!(
        "Please provide a detailed description of this image from the webpage \"{}\". Include what you see, any text content, colors, composition, and context that might be relevant.",
        action.page_label()
    )
}

/// Facts about an image that can be derived without seeing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageClues {
    pub image_url: String,
    pub file_name: String,
    pub extension: String,
    pub page_title: String,
    pub domain: String,
}

impl ImageClues {
    pub fn new(image_url: &str, page_title: Option<&str>, page_url: Option<&str>) -> Self {
        let path = image_url.split(['?', '#']).next().unwrap_or(image_url);
        let file_name = path
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("image")
            .to_string();
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            image_url: image_url.to_string(),
            file_name,
            extension,
            page_title: page_title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or("Unknown page")
                .to_string(),
            domain: page_url
                .and_then(domain_of)
                .unwrap_or_else(|| "unknown site".to_string()),
        }
    }
}

pub fn image_context_prompt(clues: &ImageClues) -> String {
    format!(
        r#"I found an image on a webpage but cannot directly analyze it. Here's what I know:

Image URL: {url}
Image file: {file}
File type: {ext}
Source page: {page}
Website: {domain}

Based on this context and the source website, please provide:
1. What this image might contain based on the page context
2. The likely purpose of this image on this type of website
3. General characteristics common to images in this context
4. Suggestions for what the user might want to know about this image

Please be helpful while acknowledging that I cannot directly see the image content."#,
        url = clues.image_url,
        file = clues.file_name,
        ext = clues.extension,
        page = clues.page_title,
        domain = clues.domain,
    )
}

pub fn context_based_description(description: &str) -> String {
    format!(
        "**Image Analysis (Context-based)**\n\n{}\n\n*Note: This description is based on context clues since direct image analysis needs a vision-capable model.*",
        description.trim()
    )
}

/// Description assembled from the clues alone, when no model can help.
pub fn offline_image_description(clues: &ImageClues, error: Option<&str>) -> String {
    let detail = error
        .filter(|e| !e.is_empty())
        .map(|e| format!("\n\n**Technical Issue:** {}", e))
        .unwrap_or_default();
    format!(
        "**Image Analysis (Context-based)**\n\nI can't look at this image right now, but here is what its context tells me:\n\n- **File:** {} ({} image)\n- **Found on:** {} ({})\n- **Address:** {}\n\nImages like this usually illustrate the surrounding content of the page. Open it directly or ask me about the page it appears on for more detail.{}",
        clues.file_name, clues.extension, clues.page_title, clues.domain, clues.image_url, detail
    )
}

pub fn selection_summary_context(domain: &str) -> String {
    format!("Summarize this content from {}", domain)
}
