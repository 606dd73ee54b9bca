//! Events raised by the tray icon.

/// Pointer interaction with the tray icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayEvent {
    /// Primary click.
    Click,
    /// Secondary click.
    RightClick,
    /// The pointer moved over the icon.
    MouseMove,
}

/// What a tray click should do, given the window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickResponse {
    Show,
    Hide,
    /// Hide if `hide_window` is set, then pop up the context menu.
    PopUpMenu { hide_window: bool },
    /// Let the hover logic decide.
    Hover,
}

impl TrayEvent {
    /// Maps an event onto a response for a window that is `visible`.
    ///
    /// Right click hides a tray-anchored window before the menu appears.
    pub fn response(&self, visible: bool, detached: bool) -> ClickResponse {
        match self {
            TrayEvent::Click if visible => ClickResponse::Hide,
            TrayEvent::Click => ClickResponse::Show,
            TrayEvent::RightClick => ClickResponse::PopUpMenu {
                hide_window: !detached,
            },
            TrayEvent::MouseMove => ClickResponse::Hover,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_toggles() {
        assert_eq!(TrayEvent::Click.response(true, false), ClickResponse::Hide);
        assert_eq!(TrayEvent::Click.response(false, false), ClickResponse::Show);
    }

    #[test]
    fn right_click_keeps_detached_window() {
        assert_eq!(
            TrayEvent::RightClick.response(true, true),
            ClickResponse::PopUpMenu { hide_window: false }
        );
        assert_eq!(
            TrayEvent::RightClick.response(true, false),
            ClickResponse::PopUpMenu { hide_window: true }
        );
    }
}
