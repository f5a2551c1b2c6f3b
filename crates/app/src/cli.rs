//! CLI definitions for clarify.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use shared::capability::SummaryType;

/// ClarifAI command line.
#[derive(Parser)]
#[command(name = "clarify")]
#[command(about = "Explain pages, links, selections and images with a local model")]
#[command(version)]
pub(crate) struct Cli {
    /// Settings file (default: <config dir>/clarify/settings.json)
    #[arg(short, long, global = true, env = "CLARIFY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Ask a question, optionally about a page
    Ask {
        message: String,

        /// Page to open as the active tab first
        #[arg(long)]
        page: Option<String>,
    },

    /// Interactive chat about a page
    Chat {
        #[arg(long)]
        page: Option<String>,
    },

    /// Explain what a link points to
    ExplainLink {
        url: String,

        /// Page the link was found on
        #[arg(long)]
        page: Option<String>,
    },

    /// Explain a piece of text selected on a page
    ExplainSelection {
        text: String,

        #[arg(long)]
        page: String,
    },

    /// Summarize a page
    Summarize { url: String },

    /// Summarize the selection on a page, or the whole page when nothing is selected
    SummarizeSelection {
        #[arg(long)]
        page: String,

        /// Text to select before summarizing
        #[arg(long)]
        select: Option<String>,

        #[arg(long, value_enum, default_value_t = SummaryKind::KeyPoints)]
        kind: SummaryKind,
    },

    /// Describe an image found on a page
    DescribeImage {
        image_url: String,

        #[arg(long)]
        page: Option<String>,
    },

    /// Generate screen-reader alt text for an image
    AltText { image_url: String },

    /// Compare several images
    CompareImages {
        #[arg(required = true, num_args = 1..)]
        image_urls: Vec<String>,

        #[arg(long, default_value = "Compare these images and describe how they differ.")]
        prompt: String,
    },

    /// Store a pending action, as a context menu click would
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Consume and carry out the pending action
    Activate,

    /// Report capability availability
    Probe,

    /// Write the default settings file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum QueueAction {
    Link {
        url: String,

        /// Text of the link
        #[arg(long)]
        text: Option<String>,
    },
    Selection {
        text: String,

        #[arg(long)]
        page: String,

        #[arg(long, default_value = "")]
        title: String,
    },
    Page {
        page: String,

        #[arg(long, default_value = "")]
        title: String,
    },
    Image {
        src: String,

        #[arg(long)]
        page: String,

        #[arg(long, default_value = "")]
        title: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum SummaryKind {
    KeyPoints,
    Tldr,
    Teaser,
    Headline,
}

impl From<SummaryKind> for SummaryType {
    fn from(kind: SummaryKind) -> Self {
        match kind {
            SummaryKind::KeyPoints => SummaryType::KeyPoints,
            SummaryKind::Tldr => SummaryType::Tldr,
            SummaryKind::Teaser => SummaryType::Teaser,
            SummaryKind::Headline => SummaryType::Headline,
        }
    }
}
