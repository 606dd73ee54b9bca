//! Context menu for the tray icon.
//!
//! The menu is a pure projection of [`MenuState`] and is rebuilt every
//! time it is displayed, so it never drifts from the settings.

use crate::icon::{Platform, TrayIcon};

/// Accelerator toggling fullscreen when the fullscreen shortcut is enabled.
pub const FULLSCREEN_SHORTCUT: &str = "CommandOrControl+Alt+Return";

/// Accelerators offered for showing and hiding the window.
pub const SHORTCUT_CHOICES: [&str; 3] = [
    "CommandOrControl+Alt+X",
    "CommandOrControl+Alt+Y",
    "CommandOrControl+Alt+Z",
];

/// Project page opened from the menu.
pub const PROJECT_URL: &str = "https://github.com/hassdesk/hassdesk";

/// What "Reset Application" wipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    /// All settings plus the web view's cache and storage.
    Everything,
    /// Window geometry and window mode only.
    Windows,
}

/// Actions that can be triggered from the tray context menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    ToggleWindow,
    OpenInBrowser,
    SelectInstance(String),
    AddInstance,
    ToggleAutomaticSwitching,
    ToggleHover,
    ToggleStayOnTop,
    SelectShortcut(String),
    ToggleShortcut,
    SelectTrayIcon(TrayIcon),
    ToggleDetached,
    ToggleFullScreen,
    ToggleFullScreenShortcut,
    CheckForUpdates,
    ToggleAutoUpdate,
    ToggleAutoReconnect,
    OpenProjectPage,
    Restart,
    Reset(ResetScope),
    Quit,
}

/// Presentation of a menu entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuKind {
    Normal,
    Checkbox { checked: bool },
    Radio { checked: bool },
    Separator,
    Submenu(Vec<MenuItem>),
}

/// A single menu item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub label: String,
    pub enabled: bool,
    pub visible: bool,
    pub kind: MenuKind,
    /// Accelerator hint displayed next to the label.
    pub accelerator: Option<String>,
    pub action: Option<MenuAction>,
}

impl MenuItem {
    fn new(label: impl Into<String>, kind: MenuKind, action: Option<MenuAction>) -> Self {
        Self {
            label: label.into(),
            enabled: true,
            visible: true,
            kind,
            accelerator: None,
            action,
        }
    }

    fn action(label: impl Into<String>, action: MenuAction) -> Self {
        Self::new(label, MenuKind::Normal, Some(action))
    }

    fn checkbox(label: impl Into<String>, checked: bool, action: MenuAction) -> Self {
        Self::new(label, MenuKind::Checkbox { checked }, Some(action))
    }

    fn radio(label: impl Into<String>, checked: bool, action: MenuAction) -> Self {
        Self::new(label, MenuKind::Radio { checked }, Some(action))
    }

    fn submenu(label: impl Into<String>, items: Vec<MenuItem>) -> Self {
        Self::new(label, MenuKind::Submenu(items), None)
    }

    fn heading(label: impl Into<String>) -> Self {
        Self::new(label, MenuKind::Normal, None).enabled(false)
    }

    fn separator() -> Self {
        Self::new("", MenuKind::Separator, None)
    }

    fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    fn accelerator(mut self, accelerator: impl Into<String>) -> Self {
        self.accelerator = Some(accelerator.into());
        self
    }

    /// True for checkbox and radio entries that are checked.
    pub fn is_checked(&self) -> bool {
        matches!(
            self.kind,
            MenuKind::Checkbox { checked: true } | MenuKind::Radio { checked: true }
        )
    }

    /// Depth-first search by label, descending into submenus.
    pub fn find<'a>(items: &'a [MenuItem], label: &str) -> Option<&'a MenuItem> {
        items.iter().find_map(|item| {
            if item.label == label {
                return Some(item);
            }
            match &item.kind {
                MenuKind::Submenu(children) => MenuItem::find(children, label),
                _ => None,
            }
        })
    }
}

/// Everything the menu depends on.
#[derive(Debug, Clone)]
pub struct MenuState {
    pub platform: Platform,
    /// Application version shown as a disabled label.
    pub version: String,
    pub instances: Vec<String>,
    pub current_instance: Option<String>,
    pub automatic_switching: bool,
    pub disable_hover: bool,
    pub stay_on_top: bool,
    pub user_shortcut: String,
    pub shortcut_enabled: bool,
    pub tray_icon: TrayIcon,
    pub detached_mode: bool,
    pub full_screen: bool,
    pub shortcut_fullscreen_enabled: bool,
    pub auto_update: bool,
    pub auto_reconnect: bool,
}

impl Default for MenuState {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            version: env!("CARGO_PKG_VERSION").into(),
            instances: Vec::new(),
            current_instance: None,
            automatic_switching: true,
            disable_hover: false,
            stay_on_top: false,
            user_shortcut: SHORTCUT_CHOICES[0].into(),
            shortcut_enabled: true,
            tray_icon: TrayIcon::White,
            detached_mode: false,
            full_screen: false,
            shortcut_fullscreen_enabled: false,
            auto_update: false,
            auto_reconnect: false,
        }
    }
}

impl MenuState {
    /// Builds the menu items from the current state.
    pub fn build_menu(&self) -> Vec<MenuItem> {
        let linux = self.platform == Platform::Linux;

        let mut items = vec![
            MenuItem::action("Show/Hide Window", MenuAction::ToggleWindow).visible(linux),
            MenuItem::separator().visible(linux),
        ];

        items.extend(self.instances_section());

        items.push(MenuItem::separator());
        items.push(
            MenuItem::checkbox("Hover to Show", !self.disable_hover, MenuAction::ToggleHover)
                .visible(!linux && !self.detached_mode)
                .enabled(!self.detached_mode),
        );
        items.push(MenuItem::checkbox(
            "Stay on Top",
            self.stay_on_top,
            MenuAction::ToggleStayOnTop,
        ));
        items.push(self.shortcuts_submenu());
        items.push(self.appearance_submenu());

        items.push(MenuItem::separator());
        items.push(MenuItem::checkbox(
            "Use detached Window",
            self.detached_mode,
            MenuAction::ToggleDetached,
        ));
        items.push(MenuItem::checkbox(
            "Use Fullscreen",
            self.full_screen,
            MenuAction::ToggleFullScreen,
        ));
        items.push(
            MenuItem::checkbox(
                "Enable Fullscreen Shortcut",
                self.shortcut_fullscreen_enabled,
                MenuAction::ToggleFullScreenShortcut,
            )
            .accelerator(FULLSCREEN_SHORTCUT),
        );

        items.push(MenuItem::separator());
        items.push(MenuItem::heading(format!("v{}", self.version)));
        items.push(MenuItem::action(
            "Check for Updates",
            MenuAction::CheckForUpdates,
        ));
        items.push(MenuItem::checkbox(
            "Enable Update Check on Startup",
            self.auto_update,
            MenuAction::ToggleAutoUpdate,
        ));
        items.push(MenuItem::checkbox(
            "Enable Automatic Reconnect",
            self.auto_reconnect,
            MenuAction::ToggleAutoReconnect,
        ));
        items.push(MenuItem::action(
            "Open on github.com",
            MenuAction::OpenProjectPage,
        ));

        items.push(MenuItem::separator());
        items.push(MenuItem::action("Restart Application", MenuAction::Restart));
        items.push(MenuItem::submenu(
            "Reset Application",
            vec![
                MenuItem::action(
                    "Reset Everything!",
                    MenuAction::Reset(ResetScope::Everything),
                ),
                MenuItem::action("Reset Windows", MenuAction::Reset(ResetScope::Windows)),
            ],
        ));

        items.push(MenuItem::separator());
        items.push(MenuItem::action("Quit", MenuAction::Quit));

        items
    }

    fn instances_section(&self) -> Vec<MenuItem> {
        let mut items = vec![
            MenuItem::action("Open in Browser", MenuAction::OpenInBrowser)
                .enabled(self.current_instance.is_some()),
            MenuItem::separator(),
        ];

        if self.instances.is_empty() {
            items.push(MenuItem::heading("Not Connected..."));
            return items;
        }

        for url in &self.instances {
            let checked = self.current_instance.as_deref() == Some(url.as_str());
            items.push(MenuItem::checkbox(
                url.clone(),
                checked,
                MenuAction::SelectInstance(url.clone()),
            ));
        }
        items.push(MenuItem::separator());
        items.push(MenuItem::action(
            "Add another Instance...",
            MenuAction::AddInstance,
        ));
        items.push(
            MenuItem::checkbox(
                "Automatic Switching",
                self.automatic_switching,
                MenuAction::ToggleAutomaticSwitching,
            )
            .enabled(self.instances.len() > 1),
        );
        items
    }

    fn shortcuts_submenu(&self) -> MenuItem {
        let choices = SHORTCUT_CHOICES
            .iter()
            .map(|accel| {
                MenuItem::radio(
                    *accel,
                    self.user_shortcut == *accel,
                    MenuAction::SelectShortcut(accel.to_string()),
                )
            })
            .collect();

        MenuItem::submenu(
            "Shortcuts",
            vec![
                MenuItem::submenu("Select Shortcut", choices),
                MenuItem::checkbox(
                    "Enable Shortcut",
                    self.shortcut_enabled,
                    MenuAction::ToggleShortcut,
                )
                .accelerator(self.user_shortcut.clone()),
            ],
        )
    }

    fn appearance_submenu(&self) -> MenuItem {
        let icons = TrayIcon::ALL
            .iter()
            .map(|icon| {
                MenuItem::radio(
                    icon.label(),
                    self.tray_icon == *icon,
                    MenuAction::SelectTrayIcon(*icon),
                )
            })
            .collect();

        MenuItem::submenu(
            "Appearance",
            vec![MenuItem::submenu("Tray Icon", icons)],
        )
    }
}
