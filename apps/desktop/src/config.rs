//! Startup configuration: log filter and settings file location.

use std::path::PathBuf;

use anyhow::Context;
use hassdesk_settings::{SettingsStore, default_settings_path};

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,hassdesk=debug";

/// Resolves the settings file path.
pub fn settings_path() -> anyhow::Result<PathBuf> {
    default_settings_path().context("could not determine a configuration directory")
}

/// Opens the settings store at its default location.
pub fn open_settings() -> anyhow::Result<SettingsStore> {
    let path = settings_path()?;
    let store = SettingsStore::open(path.clone())
        .with_context(|| format!("failed to read settings from {}", path.display()))?;
    tracing::info!(path = %path.display(), "settings loaded");
    Ok(store)
}
