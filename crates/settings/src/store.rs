//! Typed settings persisted as a single JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::SettingsError;
use crate::registry::{AddOutcome, InstanceRegistry};

/// Default global shortcut that toggles the window.
pub const DEFAULT_SHORTCUT: &str = "CommandOrControl+Alt+X";

/// Environment variable overriding the settings file location.
pub const SETTINGS_PATH_ENV: &str = "HASSDESK_SETTINGS";

/// All persisted application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    #[serde(flatten)]
    pub registry: InstanceRegistry,
    pub auto_update: bool,
    pub automatic_switching: bool,
    pub auto_reconnect: bool,
    pub detached_mode: bool,
    pub disable_hover: bool,
    pub stay_on_top: bool,
    pub full_screen: bool,
    pub shortcut_enabled: bool,
    pub shortcut_fullscreen_enabled: bool,
    pub user_shortcut: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_tray_icon: Option<String>,
    /// Tray-anchored window size `[width, height]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_size: Option<[u32; 2]>,
    /// Detached window size `[width, height]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_size_detached: Option<[u32; 2]>,
    /// Detached window position `[x, y]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_position: Option<[i32; 2]>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry: InstanceRegistry::new(),
            auto_update: false,
            automatic_switching: true,
            auto_reconnect: false,
            detached_mode: false,
            disable_hover: false,
            stay_on_top: false,
            full_screen: false,
            shortcut_enabled: true,
            shortcut_fullscreen_enabled: false,
            user_shortcut: DEFAULT_SHORTCUT.into(),
            user_tray_icon: None,
            window_size: None,
            window_size_detached: None,
            window_position: None,
        }
    }
}

impl Settings {
    /// Shorthand for the registry's current instance.
    pub fn current_instance(&self) -> Option<&str> {
        self.registry.current_instance()
    }

    /// Forgets every stored window geometry and display mode.
    pub fn reset_windows(&mut self) {
        self.window_size = None;
        self.window_size_detached = None;
        self.window_position = None;
        self.full_screen = false;
        self.detached_mode = false;
    }
}

/// Settings cached in memory and written through to disk on each change.
///
/// A store without a path never touches the filesystem.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    settings: Settings,
}

impl SettingsStore {
    /// Opens the store at `path`, falling back to defaults when the file is
    /// missing or unreadable as settings.
    pub fn open(path: PathBuf) -> Result<Self, SettingsError> {
        let settings = load_settings(&path)?;
        Ok(Self {
            path: Some(path),
            settings,
        })
    }

    /// A store that lives only in memory.
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            settings,
        }
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Applies `f` and persists the result.
    pub fn update<F>(&mut self, f: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut Settings),
    {
        f(&mut self.settings);
        self.persist()
    }

    /// Restores every setting to its default.
    pub fn clear(&mut self) -> Result<(), SettingsError> {
        self.update(|s| *s = Settings::default())
    }

    /// Adds an instance and selects it.
    ///
    /// The very first instance re-enables hover-to-show, which is
    /// suppressed while the setup page is on screen.
    pub fn add_instance(&mut self, url: &str) -> Result<AddOutcome, SettingsError> {
        let outcome = self.settings.registry.add_instance(url);
        if outcome == (AddOutcome::Appended { first: true }) {
            self.settings.disable_hover = false;
        }
        debug!(url, ?outcome, "instance added");
        self.persist()?;
        Ok(outcome)
    }

    /// Selects a known instance. Returns `false` for unknown URLs.
    pub fn select_instance(&mut self, url: &str) -> Result<bool, SettingsError> {
        if !self.settings.registry.select_instance(url) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Unsets the current instance, keeping the list.
    pub fn clear_current(&mut self) -> Result<(), SettingsError> {
        self.update(|s| s.registry.clear_current())
    }

    pub fn current_instance(&self) -> Option<&str> {
        self.settings.current_instance()
    }

    fn persist(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.settings)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        set_permissions_0600(path);
        Ok(())
    }
}

fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let data = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Settings>(&data) {
        Ok(mut settings) => {
            settings.registry.normalize();
            debug!(
                path = %path.display(),
                instances = settings.registry.len(),
                "settings loaded"
            );
            Ok(settings)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse settings, using defaults");
            Ok(Settings::default())
        }
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// Returns the settings file location, honouring [`SETTINGS_PATH_ENV`].
pub fn default_settings_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(SETTINGS_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    config_dir().map(|d| d.join("hassdesk").join("settings.json"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
