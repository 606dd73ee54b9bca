//! Tray icon model for the hassdesk shell.
//!
//! Holds the pieces of the tray that do not need a GUI toolkit:
//! - [`TrayEvent`]: pointer events coming from the icon
//! - [`TrayIcon`]: the selectable artwork
//! - [`MenuState`]: projection of the settings into the context menu
//!
//! # Platform notes
//! - Linux trays do not report hover or clicks reliably, so the context
//!   menu is attached up front and gains a "Show/Hide Window" entry.
//! - macOS uses a template image for the white icon.

mod event;
mod icon;
mod menu;

pub use event::{ClickResponse, TrayEvent};
pub use icon::{Platform, TrayIcon};
pub use menu::{
    FULLSCREEN_SHORTCUT, MenuAction, MenuItem, MenuKind, MenuState, PROJECT_URL, ResetScope,
    SHORTCUT_CHOICES,
};
