//! Settings file helpers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use shared::settings::AssistantSettings;
use tracing::{debug, warn};

/// Get the config file path
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("clarify");
        p.push("settings.json");
        p
    })
}

/// Load settings from disk or return defaults.
///
/// An explicitly named file must exist and parse. The default location is
/// optional; a broken file there is reported and replaced by defaults.
pub fn load_settings_or_default(explicit: Option<&Path>) -> Result<(AssistantSettings, bool)> {
    if let Some(path) = explicit {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings = serde_json::from_str(&contents)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        return Ok((settings, true));
    }

    let Some(path) = config_path() else {
        return Ok((AssistantSettings::default(), false));
    };
    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<AssistantSettings>(&contents) {
            Ok(settings) => {
                debug!(path = %path.display(), "loaded settings");
                Ok((settings, true))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
                Ok((AssistantSettings::default(), false))
            }
        },
        Err(_) => Ok((AssistantSettings::default(), false)),
    }
}

/// Save settings to disk, creating the parent directory.
pub fn save_settings(settings: &AssistantSettings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Format an error message with helpful context
pub fn format_error_message(error: &str) -> String {
    format!(
        "I encountered an error while processing your request:\n\n```\n{}\n```\n\n\
        Please try again or check that Ollama is running.",
        error
    )
}
