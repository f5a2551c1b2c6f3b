//! Hand-written explanations of a few well-known web terms.

/// Checked in order; the first key found in the message wins.
const CANNED: &[(&[&str], &str)] = &[
    (
        &["ecmascript", "javascript"],
        "**ECMAScript** is the standard that JavaScript is based on. Think of it as the rules and specifications that define how JavaScript should work. It's like a blueprint that browsers follow to make JavaScript run consistently everywhere. The most common versions you'll hear about are ES5, ES6/ES2015, and newer versions that add new features to make coding easier and more powerful.",
    ),
    (
        &["html"],
        "**HTML** (HyperText Markup Language) is the basic building blocks of web pages. It's like the skeleton of a website - it defines the structure and content like headings, paragraphs, links, and images. Think of it as writing the outline of a document, but for web browsers to understand.",
    ),
    (
        &["css"],
        "**CSS** (Cascading Style Sheets) is what makes websites look good. If HTML is the skeleton, CSS is the styling - colors, fonts, layouts, animations. It's like the interior designer for your website, making everything look pretty and organized.",
    ),
    (
        &["react"],
        "**React** is a JavaScript library for building user interfaces, especially web applications. It's like having pre-built components (like LEGO blocks) that you can combine to create interactive websites. Instead of writing everything from scratch, React helps you build reusable pieces that update automatically when data changes.",
    ),
    (
        &["api"],
        "**API** (Application Programming Interface) is like a waiter in a restaurant. You (the application) tell the waiter (API) what you want, the waiter goes to the kitchen (server/database) to get it, and brings back what you ordered. It's how different software applications talk to each other.",
    ),
];

/// Case-insensitive substring match against the known terms.
pub fn canned_explanation(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    CANNED
        .iter()
        .find(|(keys, _)| keys.iter().any(|k| lower.contains(k)))
        .map(|(_, text)| *text)
}
