//! Window/tray lifecycle controller.
//!
//! Owns at most one window at a time. Window and tray events are fed in by
//! the application loop; delayed work (resize debounce, hover polling) is
//! returned as [`TimerRequest`]s for the caller to schedule and hand back
//! through [`WindowController::on_timer`].

use std::time::Duration;

use hassdesk_settings::{Settings, SettingsStore};
use hassdesk_tray::Platform;
use tracing::{debug, info, warn};

use crate::geometry::{Point, Rect, Size, position_near_tray};
use crate::shell::{Page, Shell, WINDOW_SIZE, WindowHandle, WindowOptions};

/// Quiet period after the last resize before hover-to-show resumes.
pub const RESIZE_SETTLE: Duration = Duration::from_millis(600);
/// Delay before checking whether the pointer left the tray icon.
pub const HOVER_LEAVE_CHECK: Duration = Duration::from_millis(100);
/// Cadence of the pointer-outside-window poll.
pub const FOCUS_POLL: Duration = Duration::from_millis(110);

/// Delayed work owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowTimer {
    ResizeSettled { generation: u64 },
    HoverLeave { generation: u64 },
    FocusPoll { generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub timer: WindowTimer,
    pub after: Duration,
}

impl TimerRequest {
    fn new(timer: WindowTimer, after: Duration) -> Self {
        Self { timer, after }
    }
}

pub struct WindowController<S: Shell> {
    shell: S,
    window: Option<S::Window>,
    page: Option<Page>,
    force_quit: bool,
    resizing: bool,
    resize_generation: u64,
    hover_generation: u64,
}

fn persist(settings: &mut SettingsStore, f: impl FnOnce(&mut Settings)) {
    if let Err(e) = settings.update(f) {
        warn!("failed to save settings: {e}");
    }
}

impl<S: Shell> WindowController<S> {
    pub fn new(shell: S) -> Self {
        Self {
            shell,
            window: None,
            page: None,
            force_quit: false,
            resizing: false,
            resize_generation: 0,
            hover_generation: 0,
        }
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn shell_mut(&mut self) -> &mut S {
        &mut self.shell
    }

    pub fn has_window(&self) -> bool {
        self.window.is_some()
    }

    /// Page currently loaded in the window.
    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    pub fn is_visible(&self) -> bool {
        self.window.as_ref().is_some_and(|w| w.is_visible())
    }

    /// True while a resize is settling; hover-to-show is paused meanwhile.
    pub fn is_resizing(&self) -> bool {
        self.resizing
    }

    /// Lets the next close request actually close the window.
    pub fn set_force_quit(&mut self) {
        self.force_quit = true;
    }

    /// Creates the window, replacing any existing one.
    ///
    /// Loads the current instance or the setup page, restores the stored
    /// geometry for the active mode and applies the stay-on-top and
    /// fullscreen preferences.
    pub fn create_window(&mut self, settings: &mut SettingsStore, show: bool) {
        self.destroy();

        let detached = settings.get().detached_mode;
        let stay_on_top = settings.get().stay_on_top;
        let full_screen = settings.get().full_screen;

        let options = WindowOptions {
            size: WINDOW_SIZE,
            framed: detached && self.shell.platform() != Platform::MacOs,
            skip_taskbar: !show,
        };
        let mut window = self.shell.create_window(&options);

        let page = match settings.current_instance() {
            Some(url) => Page::Instance(url.to_string()),
            None => Page::Setup,
        };
        window.load(&page);
        self.page = Some(page);

        restore_geometry(&mut window, settings, detached);
        window.set_always_on_top(stay_on_top);
        self.window = Some(window);
        info!(detached, "initialized main window");

        if show || stay_on_top {
            self.show_window(settings);
        }
        self.toggle_full_screen(settings, Some(full_screen));
    }

    /// Destroys and recreates the window.
    pub fn reinit(&mut self, settings: &mut SettingsStore) {
        info!("re-initialized main window");
        let show = settings.current_instance().is_none();
        self.create_window(settings, show);
    }

    /// Disposes of the window, if any.
    pub fn destroy(&mut self) {
        if let Some(window) = self.window.take() {
            window.destroy();
        }
        self.page = None;
        self.hover_generation += 1;
        self.resizing = false;
        self.resize_generation += 1;
    }

    /// Shows and focuses the window, next to the tray unless detached.
    /// Does nothing beyond repositioning when already visible.
    pub fn show_window(&mut self, settings: &SettingsStore) {
        let detached = settings.get().detached_mode;
        let Some(window) = self.window.as_mut() else {
            return;
        };

        if !detached {
            reposition(&self.shell, window);
        }

        if !window.is_visible() {
            window.set_visible_on_all_workspaces(true);
            window.show();
            window.focus();
            window.set_visible_on_all_workspaces(false);
            window.set_skip_taskbar(!detached);
        }
    }

    pub fn hide_window(&mut self) {
        if let Some(window) = self.window.as_mut() {
            window.hide();
        }
    }

    pub fn toggle_window(&mut self, settings: &SettingsStore) {
        if self.is_visible() {
            self.hide_window();
        } else {
            self.show_window(settings);
        }
    }

    /// Sets fullscreen to `mode`, or flips it. Fullscreen is always on top;
    /// leaving it restores the stay-on-top preference.
    pub fn toggle_full_screen(&mut self, settings: &mut SettingsStore, mode: Option<bool>) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        let mode = mode.unwrap_or(!window.is_full_screen());
        persist(settings, |s| s.full_screen = mode);
        window.set_full_screen(mode);
        window.set_always_on_top(mode || settings.get().stay_on_top);
    }

    /// Applies the stay-on-top preference and reveals the window when pinned.
    pub fn set_stay_on_top(&mut self, settings: &mut SettingsStore, on: bool) {
        persist(settings, |s| s.stay_on_top = on);
        if let Some(window) = self.window.as_mut() {
            window.set_always_on_top(on);
        }
        if on {
            self.show_window(settings);
        }
    }

    pub fn load(&mut self, page: Page) {
        if let Some(window) = self.window.as_mut() {
            debug!(?page, "loading page");
            window.load(&page);
            self.page = Some(page);
        }
    }

    /// Swaps in the error page, once, when an instance is configured.
    pub fn show_error(&mut self, settings: &SettingsStore) {
        let showing = self.page.as_ref().is_some_and(Page::is_error);
        if settings.current_instance().is_some() && !showing {
            self.load(Page::Error);
        }
    }

    /// Leaves the error page, if it is showing.
    pub fn clear_error(&mut self) {
        if self.page.as_ref().is_some_and(Page::is_error) {
            self.load(Page::Setup);
        }
    }

    /// Brings the existing window forward for a second launch.
    pub fn focus_existing(&mut self) {
        if let Some(window) = self.window.as_mut() {
            window.restore();
            window.focus();
        }
    }

    /// Handles a close request. Returns true when the window may close.
    pub fn on_close(&mut self) -> bool {
        if self.force_quit {
            return true;
        }
        self.hide_window();
        false
    }

    /// Popups vanish on focus loss unless detached or pinned.
    pub fn on_blur(&mut self, settings: &SettingsStore) {
        let detached = settings.get().detached_mode;
        if let Some(window) = self.window.as_mut()
            && !detached
            && !window.is_always_on_top()
        {
            window.hide();
        }
    }

    /// Records new bounds after a user resize.
    pub fn on_resize(&mut self, settings: &mut SettingsStore, bounds: Rect) -> Vec<TimerRequest> {
        let detached = settings.get().detached_mode;
        let platform = self.shell.platform();
        let Some(window) = self.window.as_mut() else {
            return Vec::new();
        };
        window.note_bounds(bounds);
        if window.is_full_screen() {
            return Vec::new();
        }

        self.resizing = true;
        self.resize_generation += 1;

        let (width, height) = (bounds.width, bounds.height);
        if detached {
            persist(settings, |s| s.window_size_detached = Some([width, height]));
        } else {
            if platform != Platform::Linux {
                reposition(&self.shell, window);
            }
            persist(settings, |s| s.window_size = Some([width, height]));
        }

        vec![TimerRequest::new(
            WindowTimer::ResizeSettled {
                generation: self.resize_generation,
            },
            RESIZE_SETTLE,
        )]
    }

    /// Records a new position. Only detached windows remember theirs.
    pub fn on_move(&mut self, settings: &mut SettingsStore, position: Point) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        let size = window.bounds().size();
        window.note_bounds(Rect::new(position.x, position.y, size.width, size.height));
        if settings.get().detached_mode {
            persist(settings, |s| s.window_position = Some([position.x, position.y]));
        }
    }

    /// Pointer over the tray icon: show the window and start watching for
    /// the pointer to leave.
    pub fn on_tray_hover(&mut self, settings: &SettingsStore) -> Vec<TimerRequest> {
        if self.shell.platform() == Platform::Linux || self.resizing {
            return Vec::new();
        }
        let s = settings.get();
        if s.detached_mode || s.disable_hover {
            return Vec::new();
        }
        let Some(window) = self.window.as_ref() else {
            return Vec::new();
        };
        if window.is_always_on_top() {
            return Vec::new();
        }

        if !window.is_visible() {
            self.show_window(settings);
        }

        self.hover_generation += 1;
        vec![TimerRequest::new(
            WindowTimer::HoverLeave {
                generation: self.hover_generation,
            },
            HOVER_LEAVE_CHECK,
        )]
    }

    /// Handles an expired [`WindowTimer`]. Superseded timers do nothing.
    pub fn on_timer(&mut self, timer: WindowTimer) -> Vec<TimerRequest> {
        match timer {
            WindowTimer::ResizeSettled { generation } => {
                if generation == self.resize_generation {
                    self.resizing = false;
                }
                Vec::new()
            }
            WindowTimer::HoverLeave { generation } => {
                if generation != self.hover_generation {
                    return Vec::new();
                }
                let cursor = self.shell.cursor_position();
                if self.shell.tray_bounds().contains(cursor) {
                    return Vec::new();
                }
                vec![TimerRequest::new(
                    WindowTimer::FocusPoll { generation },
                    FOCUS_POLL,
                )]
            }
            WindowTimer::FocusPoll { generation } => {
                if generation != self.hover_generation {
                    return Vec::new();
                }
                let cursor = self.shell.cursor_position();
                let Some(window) = self.window.as_mut().filter(|w| w.is_visible()) else {
                    return Vec::new();
                };
                if !self.resizing && !window.bounds().contains(cursor) {
                    window.hide();
                    return Vec::new();
                }
                vec![TimerRequest::new(timer, FOCUS_POLL)]
            }
        }
    }
}

/// Moves `window` next to the tray icon on the display nearest to it.
fn reposition<S: Shell>(shell: &S, window: &mut S::Window) {
    let tray = shell.tray_bounds();
    let display = shell.display_nearest(tray.origin());
    let position = position_near_tray(window.bounds().size(), tray, &display);
    window.set_position(position);
}

/// Applies stored geometry for the active mode, recording the defaults
/// the first time a mode is used.
fn restore_geometry<W: WindowHandle>(window: &mut W, settings: &mut SettingsStore, detached: bool) {
    let stored = settings.get().clone();
    if detached {
        match stored.window_size_detached {
            Some([w, h]) => window.set_size(Size::new(w, h)),
            None => {
                let size = window.bounds().size();
                persist(settings, |s| {
                    s.window_size_detached = Some([size.width, size.height])
                });
            }
        }
        match stored.window_position {
            Some([x, y]) => window.set_position(Point::new(x, y)),
            None => {
                let origin = window.bounds().origin();
                persist(settings, |s| s.window_position = Some([origin.x, origin.y]));
            }
        }
    } else {
        match stored.window_size {
            Some([w, h]) => window.set_size(Size::new(w, h)),
            None => {
                let size = window.bounds().size();
                persist(settings, |s| s.window_size = Some([size.width, size.height]));
            }
        }
    }
}
