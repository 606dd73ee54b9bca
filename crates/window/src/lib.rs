//! Window lifecycle for the hassdesk tray shell.
//!
//! [`WindowController`] owns the single popup window and implements its
//! behaviour (tray-anchored placement, hide on blur, hover-to-show,
//! fullscreen) against the [`Shell`] capability traits. [`ChannelShell`]
//! implements those traits by talking to a native event loop over a
//! channel.

pub mod bridge;
pub mod controller;
pub mod geometry;
pub mod shell;

pub use bridge::{ChannelShell, ChannelWindow, MirrorHandle, ShellCommand, ShellMirror, WindowId};
pub use controller::{
    FOCUS_POLL, HOVER_LEAVE_CHECK, RESIZE_SETTLE, TimerRequest, WindowController, WindowTimer,
};
pub use geometry::{Display, Point, Rect, Size, TaskbarEdge, position_near_tray, taskbar_edge};
pub use shell::{Page, Shell, WINDOW_SIZE, WindowHandle, WindowOptions};
