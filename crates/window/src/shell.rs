//! Capabilities the lifecycle controller needs from the desktop shell.
//!
//! The controller never talks to a GUI toolkit directly. It drives a
//! [`Shell`] (tray, screen, shortcuts) and the [`WindowHandle`]s it
//! creates, which keeps all window behaviour testable.

use hassdesk_tray::{MenuItem, Platform};

use crate::geometry::{Display, Point, Rect, Size};

/// Fixed size of the popup window.
pub const WINDOW_SIZE: Size = Size {
    width: 400,
    height: 500,
};

/// Content the window can display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    /// Bundled setup page asking for an instance URL.
    Setup,
    /// Bundled page shown while the instance is unavailable.
    Error,
    /// Bundled placeholder while the system sleeps.
    Sleeping,
    /// A Home Assistant instance.
    Instance(String),
}

impl Page {
    pub fn is_error(&self) -> bool {
        matches!(self, Page::Error)
    }
}

/// Construction parameters for a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOptions {
    pub size: Size,
    /// Draw native decorations.
    pub framed: bool,
    pub skip_taskbar: bool,
}

/// One live window. Dropping the handle without [`WindowHandle::destroy`]
/// leaks the native window.
pub trait WindowHandle {
    fn load(&mut self, page: &Page);
    fn show(&mut self);
    fn hide(&mut self);
    fn focus(&mut self);
    /// Un-minimizes the window.
    fn restore(&mut self);
    fn is_visible(&self) -> bool;

    fn bounds(&self) -> Rect;
    fn set_position(&mut self, position: Point);
    fn set_size(&mut self, size: Size);
    /// Records geometry changed by the user rather than by us.
    fn note_bounds(&mut self, bounds: Rect);

    fn set_always_on_top(&mut self, on: bool);
    fn is_always_on_top(&self) -> bool;
    fn set_full_screen(&mut self, on: bool);
    fn is_full_screen(&self) -> bool;
    fn set_visible_on_all_workspaces(&mut self, on: bool);
    fn set_skip_taskbar(&mut self, skip: bool);

    fn destroy(self);
}

/// Tray, screen and global-shortcut services of the desktop.
pub trait Shell {
    type Window: WindowHandle;

    fn platform(&self) -> Platform;
    fn create_window(&mut self, options: &WindowOptions) -> Self::Window;

    fn tray_bounds(&self) -> Rect;
    fn cursor_position(&self) -> Point;
    fn display_nearest(&self, point: Point) -> Display;

    fn set_tray_icon(&mut self, file_name: &str);
    /// Attaches a menu that the tray shows on its own (Linux).
    fn set_context_menu(&mut self, items: Vec<MenuItem>);
    fn pop_up_menu(&mut self, items: Vec<MenuItem>);

    /// Replaces every registered global shortcut with `accelerators`.
    fn set_shortcuts(&mut self, accelerators: &[String]);
    /// Wipes the web view's cache and storage.
    fn clear_web_data(&mut self);
}
