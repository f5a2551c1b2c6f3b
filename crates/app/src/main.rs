//! clarify - ClarifAI on the command line
//!
//! Wires the headless browser, the Ollama capability host and the durable
//! store into the request pipeline, then runs one subcommand.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use agent_host::{Assistant, BackgroundCoordinator, ContextMenuClick, Orchestrator, PendingActionQueue};
use anyhow::{Context, Result};
use clap::Parser;
use providers::{OllamaCapabilityHost, SessionManager};
use services::binary_fetch::HttpBinaryFetch;
use services::browser::{BinaryFetch, KeyValueStore, StaticPermissions, TabInfo};
use services::extractor::{ContentExtractor, ExtractorConfig};
use services::headless::{HeadlessBrowser, HttpPageSource};
use services::page_access::PageAccess;
use services::remote_fetch::{FetchPolicy, RemoteTabFetcher};
use services::storage::{JsonFileStore, MemoryStore};
use shared::action::PendingAction;
use shared::capability::{CapabilityProfile, PromptOptions, SummarizerOptions};
use shared::events::AssistantEvent;
use shared::settings::AssistantSettings;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod utils;

use cli::{Cli, Commands, QueueAction};

/// Everything a subcommand needs, built once from settings.
struct Runtime {
    settings: AssistantSettings,
    browser: HeadlessBrowser,
    manager: Arc<SessionManager>,
    binaries: Arc<dyn BinaryFetch>,
    queue: Arc<PendingActionQueue>,
}

impl Runtime {
    fn new(settings: AssistantSettings) -> Result<Self> {
        let extractor = ContentExtractor::new(ExtractorConfig::from(&settings));
        let browser = HeadlessBrowser::new(Arc::new(HttpPageSource::new()?), extractor);
        let host = OllamaCapabilityHost::new(settings.capability.clone())?;
        let store: Arc<dyn KeyValueStore> = match JsonFileStore::default_location() {
            Some(store) => {
                debug!(path = %store.path().display(), "using durable store");
                Arc::new(store)
            }
            None => {
                warn!("no config directory, pending actions will not survive this process");
                Arc::new(MemoryStore::new())
            }
        };
        let queue = Arc::new(PendingActionQueue::new(store, settings.pending_action_ttl()));
        Ok(Self {
            browser,
            manager: Arc::new(SessionManager::new(Arc::new(host))),
            binaries: Arc::new(HttpBinaryFetch::new()?),
            queue,
            settings,
        })
    }

    fn fetcher(&self) -> RemoteTabFetcher {
        RemoteTabFetcher::new(
            Arc::new(self.browser.clone()),
            Arc::new(self.browser.clone()),
            FetchPolicy::from(&self.settings.fetch),
        )
    }

    fn orchestrator(&self) -> Orchestrator {
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_event_logger(rx);
        Orchestrator::new(
            self.manager.clone(),
            PageAccess::new(Arc::new(self.browser.clone()), Arc::new(self.browser.clone())),
            self.fetcher(),
            self.binaries.clone(),
        )
        .with_events(tx)
    }

    fn coordinator(&self) -> BackgroundCoordinator {
        BackgroundCoordinator::new(
            self.queue.clone(),
            self.fetcher(),
            self.binaries.clone(),
            Arc::new(StaticPermissions::granted()),
        )
    }

    async fn open(&self, url: &str) -> Result<TabInfo> {
        info!(url, "opening page");
        self.browser
            .open_active(url, self.settings.fetch.load_timeout())
            .await
            .with_context(|| format!("opening {}", url))
    }

    /// Open a page when one is given; a failure leaves no active tab.
    async fn open_optional(&self, url: Option<&str>) -> Option<TabInfo> {
        let url = url?;
        match self.open(url).await {
            Ok(tab) => Some(tab),
            Err(e) => {
                warn!(error = %e, "continuing without the page");
                None
            }
        }
    }
}

fn spawn_event_logger(mut rx: mpsc::UnboundedReceiver<AssistantEvent>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                AssistantEvent::Started { label, .. } => debug!(%label, "request started"),
                AssistantEvent::Progress { percent, .. } => info!(percent, "preparing model"),
                AssistantEvent::Degraded { reason, .. } => info!(%reason, "degraded"),
                AssistantEvent::Completed { duration_ms, .. } => debug!(duration_ms, "request completed"),
            }
        }
    });
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = match cli.command {
        Commands::InitConfig { force } => return init_config(cli.config, force),
        command => command,
    };

    let (settings, found) = utils::load_settings_or_default(cli.config.as_deref())?;
    if !found {
        debug!("no settings file, using defaults");
    }
    let runtime = Runtime::new(settings)?;
    run(&runtime, command).await
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => utils::config_path().context("no config directory on this system")?,
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    utils::save_settings(&AssistantSettings::default(), &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn run(runtime: &Runtime, command: Commands) -> Result<()> {
    match command {
        Commands::Ask { message, page } => {
            runtime.open_optional(page.as_deref()).await;
            let text = runtime.orchestrator().handle_user_message(&message).await;
            println!("{}", text);
        }
        Commands::Chat { page } => {
            runtime.open_optional(page.as_deref()).await;
            chat(runtime).await?;
        }
        Commands::ExplainLink { url, page } => {
            runtime.open_optional(page.as_deref()).await;
            let action = PendingAction::link(url, None);
            println!("{}", runtime.orchestrator().handle_pending_action(&action).await);
        }
        Commands::ExplainSelection { text, page } => {
            let title = match runtime.open(&page).await {
                Ok(tab) => {
                    runtime.browser.select_text(tab.id, text.clone())?;
                    tab.title
                }
                Err(e) => {
                    warn!(error = %e, "continuing without the page");
                    String::new()
                }
            };
            let action = PendingAction::selection(text, page, title);
            println!("{}", runtime.orchestrator().handle_pending_action(&action).await);
        }
        Commands::Summarize { url } => {
            let title = runtime
                .open_optional(Some(url.as_str()))
                .await
                .map(|tab| tab.title)
                .unwrap_or_default();
            let action = PendingAction::page(url, title);
            println!("{}", runtime.orchestrator().handle_pending_action(&action).await);
        }
        Commands::SummarizeSelection { page, select, kind } => {
            let tab = runtime.open(&page).await?;
            if let Some(select) = select {
                runtime.browser.select_text(tab.id, select)?;
            }
            match runtime.orchestrator().summarize_selection(kind.into()).await {
                Ok(text) => println!("{}", text),
                Err(e) => println!("{}", utils::format_error_message(&e.to_string())),
            }
        }
        Commands::DescribeImage { image_url, page } => {
            let tab = runtime.open_optional(page.as_deref()).await;
            let title = tab.map(|t| t.title).unwrap_or_default();
            let action = PendingAction::image(image_url, page.unwrap_or_default(), title);
            println!("{}", runtime.orchestrator().handle_pending_action(&action).await);
        }
        Commands::AltText { image_url } => {
            let orchestrator = runtime.orchestrator();
            let result = match orchestrator.fetch_image(&image_url).await {
                Ok(image) => orchestrator.generate_alt_text(image).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(text) => println!("{}", text),
                Err(e) => println!("{}", utils::format_error_message(&e.to_string())),
            }
        }
        Commands::CompareImages { image_urls, prompt } => {
            let orchestrator = runtime.orchestrator();
            let mut images = Vec::with_capacity(image_urls.len());
            for url in &image_urls {
                images.push(
                    orchestrator
                        .fetch_image(url)
                        .await
                        .with_context(|| format!("fetching {}", url))?,
                );
            }
            match orchestrator.analyze_images(images, &prompt).await {
                Ok(text) => println!("{}", text),
                Err(e) => println!("{}", utils::format_error_message(&e.to_string())),
            }
        }
        Commands::Queue { action } => {
            let click = match action {
                QueueAction::Link { url, text } => ContextMenuClick::Link {
                    url,
                    link_text: text,
                },
                QueueAction::Selection { text, page, title } => ContextMenuClick::Selection {
                    text,
                    page_url: page,
                    page_title: title,
                },
                QueueAction::Page { page, title } => ContextMenuClick::Page {
                    page_url: page,
                    page_title: title,
                },
                QueueAction::Image { src, page, title } => ContextMenuClick::Image {
                    src_url: src,
                    page_url: page,
                    page_title: title,
                },
            };
            let action = runtime.coordinator().on_context_menu(click).await?;
            println!("Queued: {}", action.label());
        }
        Commands::Activate => {
            // the pending page has to be the active tab before the action runs
            let pending = runtime.queue.peek().await?;
            if let Some(pending) = &pending {
                let page = pending.page_url.as_deref().filter(|p| !p.is_empty());
                if let Some(tab) = runtime.open_optional(page).await {
                    if let Some(text) = pending.text.as_deref().filter(|_| pending.url.is_none()) {
                        runtime.browser.select_text(tab.id, text)?;
                    }
                }
            }
            let mut assistant = Assistant::new(runtime.orchestrator(), runtime.queue.clone());
            match assistant.activate().await {
                Some(text) => println!("{}", text),
                None => println!("No pending action."),
            }
        }
        Commands::Probe => probe(runtime).await,
        Commands::InitConfig { force } => init_config(None, force)?,
    }
    Ok(())
}

async fn probe(runtime: &Runtime) {
    let profiles = [
        CapabilityProfile::Summarization(SummarizerOptions::default()),
        CapabilityProfile::Prompting(PromptOptions::text_only()),
        CapabilityProfile::Prompting(PromptOptions::multimodal()),
    ];
    for profile in &profiles {
        let availability = runtime.manager.probe(profile).await;
        println!("{:<22} {}", profile.name(), availability.as_str());
    }
    println!("{:<22} {:?}", "tier", runtime.manager.probe_tier().await);
}

async fn chat(runtime: &Runtime) -> Result<()> {
    let mut assistant = Assistant::new(runtime.orchestrator(), runtime.queue.clone());
    if let Some(greeting) = assistant.messages().first() {
        println!("{}", greeting.content);
    }
    if let Some(text) = assistant.activate().await {
        println!("\n{}", text);
    }

    let stdin = std::io::stdin();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message, "exit" | "quit") {
            break;
        }
        println!("\n{}", assistant.send(message).await);
    }
    Ok(())
}
