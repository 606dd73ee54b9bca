//! Channel-backed [`Shell`] for hosting the controller next to a UI thread.
//!
//! The native event loop has to own the real tray and web view, and on
//! some platforms it must run on the main thread. The bridge turns every
//! shell call into a [`ShellCommand`] for that loop and answers queries
//! (tray bounds, cursor, displays) from a [`ShellMirror`] the loop keeps
//! current.

use std::sync::{Arc, Mutex, MutexGuard, mpsc};

use hassdesk_tray::{MenuItem, Platform};
use tracing::trace;

use crate::geometry::{Display, Point, Rect, Size};
use crate::shell::{Page, Shell, WindowHandle, WindowOptions};

/// Identifies a window across the channel.
pub type WindowId = u64;

/// Requests for the native event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    CreateWindow { id: WindowId, options: WindowOptions },
    DestroyWindow { id: WindowId },
    Load { id: WindowId, page: Page },
    Show { id: WindowId },
    Hide { id: WindowId },
    Focus { id: WindowId },
    Restore { id: WindowId },
    SetPosition { id: WindowId, position: Point },
    SetSize { id: WindowId, size: Size },
    SetAlwaysOnTop { id: WindowId, on: bool },
    SetFullScreen { id: WindowId, on: bool },
    SetVisibleOnAllWorkspaces { id: WindowId, on: bool },
    SetSkipTaskbar { id: WindowId, skip: bool },
    SetTrayIcon(String),
    SetContextMenu(Vec<MenuItem>),
    PopUpMenu(Vec<MenuItem>),
    SetShortcuts(Vec<String>),
    ClearWebData,
}

/// Screen facts reported by the native event loop.
#[derive(Debug, Clone)]
pub struct ShellMirror {
    pub tray_bounds: Rect,
    pub cursor: Point,
    pub displays: Vec<Display>,
}

impl Default for ShellMirror {
    fn default() -> Self {
        Self {
            tray_bounds: Rect::default(),
            cursor: Point::default(),
            displays: vec![Display::bare(Rect::new(0, 0, 1920, 1080))],
        }
    }
}

/// Write side of the mirror, held by the native event loop.
#[derive(Debug, Clone)]
pub struct MirrorHandle(Arc<Mutex<ShellMirror>>);

impl MirrorHandle {
    pub fn set_cursor(&self, cursor: Point) {
        lock(&self.0).cursor = cursor;
    }

    pub fn set_tray_bounds(&self, bounds: Rect) {
        lock(&self.0).tray_bounds = bounds;
    }

    pub fn set_displays(&self, displays: Vec<Display>) {
        lock(&self.0).displays = displays;
    }
}

fn lock(mirror: &Mutex<ShellMirror>) -> MutexGuard<'_, ShellMirror> {
    // A panic elsewhere cannot leave the plain-data mirror inconsistent.
    mirror.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// [`Shell`] that forwards everything over a channel.
pub struct ChannelShell {
    platform: Platform,
    tx: mpsc::Sender<ShellCommand>,
    mirror: Arc<Mutex<ShellMirror>>,
    next_id: WindowId,
}

impl ChannelShell {
    /// Creates a bridge with its channel pair.
    ///
    /// Returns `(shell, command_receiver, mirror)`; the receiver and mirror
    /// go to the native event loop.
    pub fn new(
        platform: Platform,
        initial: ShellMirror,
    ) -> (Self, mpsc::Receiver<ShellCommand>, MirrorHandle) {
        let (tx, rx) = mpsc::channel();
        let mirror = Arc::new(Mutex::new(initial));
        let shell = Self {
            platform,
            tx,
            mirror: mirror.clone(),
            next_id: 1,
        };
        (shell, rx, MirrorHandle(mirror))
    }

    fn send(&self, command: ShellCommand) {
        trace!(?command, "shell command");
        // The UI loop going away means we are shutting down.
        let _ = self.tx.send(command);
    }
}

impl Shell for ChannelShell {
    type Window = ChannelWindow;

    fn platform(&self) -> Platform {
        self.platform
    }

    fn create_window(&mut self, options: &WindowOptions) -> ChannelWindow {
        let id = self.next_id;
        self.next_id += 1;
        self.send(ShellCommand::CreateWindow {
            id,
            options: options.clone(),
        });

        let origin = lock(&self.mirror)
            .displays
            .first()
            .map(|d| d.work_area.origin())
            .unwrap_or_default();
        ChannelWindow {
            id,
            tx: self.tx.clone(),
            visible: false,
            bounds: Rect::new(origin.x, origin.y, options.size.width, options.size.height),
            always_on_top: false,
            full_screen: false,
        }
    }

    fn tray_bounds(&self) -> Rect {
        lock(&self.mirror).tray_bounds
    }

    fn cursor_position(&self) -> Point {
        lock(&self.mirror).cursor
    }

    fn display_nearest(&self, point: Point) -> Display {
        let mirror = lock(&self.mirror);
        mirror
            .displays
            .iter()
            .find(|d| d.bounds.contains(point))
            .or_else(|| mirror.displays.first())
            .copied()
            .unwrap_or_else(|| Display::bare(Rect::new(0, 0, 1920, 1080)))
    }

    fn set_tray_icon(&mut self, file_name: &str) {
        self.send(ShellCommand::SetTrayIcon(file_name.to_string()));
    }

    fn set_context_menu(&mut self, items: Vec<MenuItem>) {
        self.send(ShellCommand::SetContextMenu(items));
    }

    fn pop_up_menu(&mut self, items: Vec<MenuItem>) {
        self.send(ShellCommand::PopUpMenu(items));
    }

    fn set_shortcuts(&mut self, accelerators: &[String]) {
        self.send(ShellCommand::SetShortcuts(accelerators.to_vec()));
    }

    fn clear_web_data(&mut self) {
        self.send(ShellCommand::ClearWebData);
    }
}

/// Window proxy created by [`ChannelShell`]. Tracks the state it asked for.
#[derive(Debug)]
pub struct ChannelWindow {
    id: WindowId,
    tx: mpsc::Sender<ShellCommand>,
    visible: bool,
    bounds: Rect,
    always_on_top: bool,
    full_screen: bool,
}

impl ChannelWindow {
    pub fn id(&self) -> WindowId {
        self.id
    }

    fn send(&self, command: ShellCommand) {
        let _ = self.tx.send(command);
    }
}

impl WindowHandle for ChannelWindow {
    fn load(&mut self, page: &Page) {
        self.send(ShellCommand::Load {
            id: self.id,
            page: page.clone(),
        });
    }

    fn show(&mut self) {
        self.visible = true;
        self.send(ShellCommand::Show { id: self.id });
    }

    fn hide(&mut self) {
        self.visible = false;
        self.send(ShellCommand::Hide { id: self.id });
    }

    fn focus(&mut self) {
        self.send(ShellCommand::Focus { id: self.id });
    }

    fn restore(&mut self) {
        self.send(ShellCommand::Restore { id: self.id });
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn set_position(&mut self, position: Point) {
        self.bounds.x = position.x;
        self.bounds.y = position.y;
        self.send(ShellCommand::SetPosition {
            id: self.id,
            position,
        });
    }

    fn set_size(&mut self, size: Size) {
        self.bounds.width = size.width;
        self.bounds.height = size.height;
        self.send(ShellCommand::SetSize { id: self.id, size });
    }

    fn note_bounds(&mut self, bounds: Rect) {
        self.bounds = bounds;
    }

    fn set_always_on_top(&mut self, on: bool) {
        self.always_on_top = on;
        self.send(ShellCommand::SetAlwaysOnTop { id: self.id, on });
    }

    fn is_always_on_top(&self) -> bool {
        self.always_on_top
    }

    fn set_full_screen(&mut self, on: bool) {
        self.full_screen = on;
        self.send(ShellCommand::SetFullScreen { id: self.id, on });
    }

    fn is_full_screen(&self) -> bool {
        self.full_screen
    }

    fn set_visible_on_all_workspaces(&mut self, on: bool) {
        self.send(ShellCommand::SetVisibleOnAllWorkspaces { id: self.id, on });
    }

    fn set_skip_taskbar(&mut self, skip: bool) {
        self.send(ShellCommand::SetSkipTaskbar { id: self.id, skip });
    }

    fn destroy(self) {
        self.send(ShellCommand::DestroyWindow { id: self.id });
    }
}
