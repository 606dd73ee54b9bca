//! Tray icon artwork and host platform.

use tracing::debug;

/// Desktop platform the shell runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Platform this binary was compiled for. Unknown targets behave like Linux.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
        }
    }
}

/// User-selectable tray icon colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayIcon {
    White,
    Blue,
    Black,
}

impl TrayIcon {
    pub const ALL: [TrayIcon; 3] = [TrayIcon::White, TrayIcon::Blue, TrayIcon::Black];

    pub fn label(&self) -> &'static str {
        match self {
            TrayIcon::White => "White",
            TrayIcon::Blue => "Blue",
            TrayIcon::Black => "Black",
        }
    }

    /// Asset file name, as persisted in the settings.
    ///
    /// The white icon is a template image on macOS so the menu bar can tint it.
    pub fn file_name(&self, platform: Platform) -> &'static str {
        match (self, platform) {
            (TrayIcon::White, Platform::MacOs) => "IconTemplate.png",
            (TrayIcon::White, _) => "IconWin.png",
            (TrayIcon::Blue, _) => "IconWinAlt.png",
            (TrayIcon::Black, _) => "IconWinBlack.png",
        }
    }

    /// Resolves a persisted file name. Missing or unknown names map to white.
    pub fn from_file_name(name: Option<&str>) -> Self {
        match name {
            None | Some("IconTemplate.png") | Some("IconWin.png") => TrayIcon::White,
            Some("IconWinAlt.png") => TrayIcon::Blue,
            Some("IconWinBlack.png") => TrayIcon::Black,
            Some(other) => {
                debug!(icon = other, "unknown tray icon, using default");
                TrayIcon::White
            }
        }
    }
}
