//! Persisted application settings.
//!
//! Holds the list of known Home Assistant instances, the selected one,
//! per-mode window geometry and the boolean mode flags. Everything is
//! kept in memory and written through to a JSON file on every change.

pub mod registry;
pub mod store;

pub use registry::{AddOutcome, InstanceRegistry};
pub use store::{
    DEFAULT_SHORTCUT, SETTINGS_PATH_ENV, Settings, SettingsStore, default_settings_path,
};

/// Errors from reading or writing the settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
