//! Application context: wires settings, window, tray and the reconnection
//! machine together and drives them from one event loop.
//!
//! Everything runs on the loop's task. Network work (probes, discovery,
//! update checks) is spawned and reports back through an internal channel,
//! so state is only ever touched between awaits of [`App::step`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use hassdesk_connection::{
    Action, ProbeOutcome, ProbeTicket, Prober, ReconnectConfig, ReconnectMachine,
    RecoveryPolicy, find_alternative, probe_outcome,
};
use hassdesk_discovery::{AnnouncementSource, DEFAULT_COLLECTION_WINDOW, discover};
use hassdesk_settings::{Settings, SettingsStore};
use hassdesk_tray::{
    ClickResponse, FULLSCREEN_SHORTCUT, MenuAction, MenuState, PROJECT_URL, Platform, ResetScope,
    TrayEvent, TrayIcon,
};
use hassdesk_window::{Page, Point, Rect, Shell, TimerRequest, WindowController};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ipc::{IpcRequest, Signal};
use crate::timers::{Due, Timers};
use crate::updates::{RELEASES_PAGE, UpdateChecker};

/// Probes made after a system resume before relaunching.
const RESUME_PROBES: u32 = 2;
const RESUME_PROBE_DELAY: Duration = Duration::from_millis(100);

/// Opens a URL in the user's browser.
pub type UrlOpener = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Events reported by the window of the native shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    CloseRequested,
    Blurred,
    Resized(Rect),
    Moved(Point),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Suspend,
    Resume,
    Shutdown,
}

/// Inputs of the application loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Tray(TrayEvent),
    Window(WindowEvent),
    Menu(MenuAction),
    /// A registered global shortcut fired.
    Shortcut(String),
    Ipc(IpcRequest),
    Power(PowerEvent),
    /// Another launch of the application was attempted.
    SecondInstance,
    Quit,
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Quit,
    /// Start a fresh process.
    Relaunch,
}

/// External collaborators of the application.
#[derive(Clone)]
pub struct Services {
    pub prober: Arc<dyn Prober>,
    pub discovery: Arc<dyn AnnouncementSource>,
    pub updates: Option<Arc<UpdateChecker>>,
    pub open_url: UrlOpener,
    pub signals: mpsc::UnboundedSender<Signal>,
}

/// Completions of spawned work.
#[derive(Debug)]
enum Internal {
    Probe {
        ticket: ProbeTicket,
        outcome: ProbeOutcome,
    },
    Failover(Option<String>),
    ResumeProbed {
        healthy: bool,
    },
}

enum Step {
    Internal(Internal),
    Event(Option<AppEvent>),
    Timers,
}

pub struct App<S: Shell> {
    settings: SettingsStore,
    window: WindowController<S>,
    machine: ReconnectMachine,
    services: Services,
    timers: Timers,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    cancel: CancellationToken,
    platform: Platform,
    failover_running: bool,
    sleep_handled: bool,
    resume_handled: bool,
    exit: Option<Exit>,
}

impl<S: Shell> App<S> {
    pub fn new(
        settings: SettingsStore,
        shell: S,
        services: Services,
        config: ReconnectConfig,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let platform = shell.platform();
        Self {
            settings,
            window: WindowController::new(shell),
            machine: ReconnectMachine::new(config),
            services,
            timers: Timers::default(),
            internal_tx,
            internal_rx,
            cancel: CancellationToken::new(),
            platform,
            failover_running: false,
            sleep_handled: false,
            resume_handled: false,
            exit: None,
        }
    }

    /// Runs until the user quits or a relaunch is requested.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<AppEvent>) -> Exit {
        self.startup();
        loop {
            if let Some(exit) = self.step(&mut events).await {
                return exit;
            }
        }
    }

    /// Creates the window and tray, registers shortcuts and starts
    /// monitoring.
    pub fn startup(&mut self) {
        let show = self.settings.current_instance().is_none();
        self.window.create_window(&mut self.settings, show);

        let icon = TrayIcon::from_file_name(self.settings.get().user_tray_icon.as_deref());
        self.window
            .shell_mut()
            .set_tray_icon(icon.file_name(self.platform));
        info!("initialized tray menu");

        if self.settings.get().auto_update {
            self.check_for_updates();
        }

        if self.platform == Platform::Linux {
            self.refresh_context_menu();
        }

        info!("initialized availability check");
        let actions = self.machine.start();
        self.apply(actions);

        self.register_shortcuts();

        if self.settings.current_instance().is_none() {
            self.save(|s| s.disable_hover = true);
        }
    }

    /// Processes one input: a completion, an event or the due timers.
    /// Returns the exit reason once the loop should end.
    pub async fn step(&mut self, events: &mut mpsc::UnboundedReceiver<AppEvent>) -> Option<Exit> {
        let deadline = self.timers.next_deadline();
        let step = tokio::select! {
            biased;
            Some(internal) = self.internal_rx.recv() => Step::Internal(internal),
            event = events.recv() => Step::Event(event),
            _ = sleep_or_pending(deadline) => Step::Timers,
        };

        match step {
            Step::Internal(internal) => self.on_internal(internal),
            Step::Event(Some(event)) => self.handle_event(event),
            Step::Event(None) => {
                info!("event source closed");
                self.exit = Some(Exit::Quit);
            }
            Step::Timers => self.on_timers(),
        }

        let exit = self.exit.take()?;
        self.shutdown();
        Some(exit)
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Tray(event) => self.on_tray(event),
            AppEvent::Window(event) => self.on_window(event),
            AppEvent::Menu(action) => self.on_menu(action),
            AppEvent::Shortcut(accelerator) => self.on_shortcut(&accelerator),
            AppEvent::Ipc(request) => self.on_ipc(request),
            AppEvent::Power(event) => self.on_power(event),
            AppEvent::SecondInstance => self.window.focus_existing(),
            AppEvent::Quit => self.quit(),
        }
    }

    fn on_tray(&mut self, event: TrayEvent) {
        let visible = self.window.is_visible();
        let detached = self.settings.get().detached_mode;

        match event.response(visible, detached) {
            ClickResponse::Show => self.window.show_window(&self.settings),
            ClickResponse::Hide => self.window.hide_window(),
            ClickResponse::PopUpMenu { hide_window } => {
                if hide_window {
                    self.window.hide_window();
                }
                let menu = self.menu_state().build_menu();
                self.window.shell_mut().pop_up_menu(menu);
            }
            ClickResponse::Hover => {
                let requests = self.window.on_tray_hover(&self.settings);
                self.schedule(requests);
            }
        }
    }

    fn on_window(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if self.window.on_close() {
                    self.window.destroy();
                }
            }
            WindowEvent::Blurred => self.window.on_blur(&self.settings),
            WindowEvent::Resized(bounds) => {
                let requests = self.window.on_resize(&mut self.settings, bounds);
                self.schedule(requests);
            }
            WindowEvent::Moved(position) => self.window.on_move(&mut self.settings, position),
        }
    }

    fn on_shortcut(&mut self, accelerator: &str) {
        if accelerator == FULLSCREEN_SHORTCUT {
            self.window.toggle_full_screen(&mut self.settings, None);
        } else if accelerator == self.settings.get().user_shortcut {
            self.window.toggle_window(&self.settings);
        } else {
            debug!(accelerator, "unexpected shortcut");
        }
    }

    fn on_menu(&mut self, action: MenuAction) {
        debug!(?action, "menu action");
        match action {
            MenuAction::ToggleWindow => self.window.toggle_window(&self.settings),
            MenuAction::OpenInBrowser => {
                if let Some(url) = self.settings.current_instance().map(str::to_string) {
                    self.open(&url);
                }
            }
            MenuAction::SelectInstance(url) => self.select_instance(&url),
            MenuAction::AddInstance => {
                if let Err(e) = self.settings.clear_current() {
                    warn!("failed to save settings: {e}");
                }
                self.instance_changed(Page::Setup);
                self.window.show_window(&self.settings);
            }
            MenuAction::ToggleAutomaticSwitching => {
                self.save(|s| s.automatic_switching = !s.automatic_switching)
            }
            MenuAction::ToggleHover => self.save(|s| s.disable_hover = !s.disable_hover),
            MenuAction::ToggleStayOnTop => {
                let on = !self.settings.get().stay_on_top;
                self.window.set_stay_on_top(&mut self.settings, on);
            }
            MenuAction::SelectShortcut(accelerator) => {
                self.save(|s| s.user_shortcut = accelerator);
                self.register_shortcuts();
            }
            MenuAction::ToggleShortcut => {
                self.save(|s| s.shortcut_enabled = !s.shortcut_enabled);
                self.register_shortcuts();
            }
            MenuAction::SelectTrayIcon(icon) => {
                let file_name = icon.file_name(self.platform);
                self.save(|s| s.user_tray_icon = Some(file_name.to_string()));
                self.window.shell_mut().set_tray_icon(file_name);
                info!(icon = file_name, "changed tray icon");
            }
            MenuAction::ToggleDetached => {
                self.save(|s| s.detached_mode = !s.detached_mode);
                self.window.hide_window();
                let detached = self.settings.get().detached_mode;
                self.window.create_window(&mut self.settings, detached);
            }
            MenuAction::ToggleFullScreen => {
                self.window.toggle_full_screen(&mut self.settings, None)
            }
            MenuAction::ToggleFullScreenShortcut => {
                self.save(|s| s.shortcut_fullscreen_enabled = !s.shortcut_fullscreen_enabled);
                self.register_shortcuts();
            }
            MenuAction::CheckForUpdates => self.check_for_updates(),
            MenuAction::ToggleAutoUpdate => self.save(|s| s.auto_update = !s.auto_update),
            MenuAction::ToggleAutoReconnect => {
                self.save(|s| s.auto_reconnect = !s.auto_reconnect)
            }
            MenuAction::OpenProjectPage => self.open(PROJECT_URL),
            MenuAction::Restart => self.relaunch(),
            MenuAction::Reset(scope) => self.reset(scope),
            MenuAction::Quit => self.quit(),
        }

        if self.platform == Platform::Linux {
            self.refresh_context_menu();
        }
    }

    fn on_ipc(&mut self, request: IpcRequest) {
        debug!(?request, "ipc request");
        match request {
            IpcRequest::GetHaInstance { url } => {
                if let Some(url) = url {
                    if let Err(e) = self.settings.add_instance(&url) {
                        warn!("failed to save settings: {e}");
                    }
                    self.instance_changed(Page::Instance(url));
                }
                if let Some(current) = self.settings.current_instance() {
                    self.signal(Signal::ReceiveHaInstance(current.to_string()));
                }
            }
            IpcRequest::GetInstances => {
                let source = self.services.discovery.clone();
                let signals = self.services.signals.clone();
                let known = self.settings.get().registry.instances().to_vec();
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        found = discover(source.as_ref(), &known, DEFAULT_COLLECTION_WINDOW) => {
                            let _ = signals.send(Signal::ReceiveInstances(found));
                        }
                    }
                });
            }
            IpcRequest::Reconnect => {
                let actions = self.machine.reconnect();
                self.apply(actions);
            }
            IpcRequest::Restart => self.relaunch(),
            IpcRequest::DownloadUpdate => self.open(RELEASES_PAGE),
        }
    }

    fn on_power(&mut self, event: PowerEvent) {
        match event {
            PowerEvent::Suspend => {
                if self.sleep_handled {
                    return;
                }
                info!("going to sleep");
                self.window.load(Page::Sleeping);
                let actions = self.machine.stop();
                self.apply(actions);
                self.sleep_handled = true;
            }
            PowerEvent::Resume => {
                if self.resume_handled {
                    return;
                }
                info!("power state resumed, re-launching");
                self.resume_handled = true;
                self.probe_after_resume();
            }
            PowerEvent::Shutdown => {
                info!("shutdown initiated, quitting");
                let actions = self.machine.stop();
                self.apply(actions);
                self.quit();
            }
        }
    }

    fn on_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Probe { ticket, outcome } => {
                let actions = self.machine.on_probe(ticket, outcome, self.policy());
                self.apply(actions);
            }
            Internal::Failover(found) => {
                self.failover_running = false;
                let Some(url) = found else {
                    debug!("no alternative instance reachable");
                    return;
                };
                if !self.machine.is_disrupted() {
                    debug!(url = %url, "instance recovered before failover finished");
                    return;
                }
                info!(url = %url, "switching to alternative instance");
                if let Err(e) = self.settings.add_instance(&url) {
                    warn!("failed to save settings: {e}");
                }
                let actions = self.machine.instance_switched();
                self.apply(actions);
            }
            Internal::ResumeProbed { healthy } => {
                if !healthy {
                    error!("network wasn't ready, relaunching anyway");
                }
                self.relaunch();
            }
        }
    }

    fn on_timers(&mut self) {
        for due in self.timers.take_due(Instant::now()) {
            match due {
                Due::Connection(timer) => {
                    let current = self.settings.current_instance().map(str::to_string);
                    let actions = self.machine.on_timer(timer, current.as_deref());
                    self.apply(actions);
                }
                Due::Window(timer) => {
                    let requests = self.window.on_timer(timer);
                    self.schedule(requests);
                }
            }
        }
    }

    /// Performs machine actions, including the ones they cause.
    fn apply(&mut self, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Probe { ticket, url } => self.spawn_probe(ticket, url),
                Action::ArmTimer { timer, after } => {
                    debug!(?timer, ?after, "timer armed");
                    self.timers.arm_connection(timer, Instant::now() + after);
                }
                Action::CancelTimer => self.timers.cancel_connection(),
                Action::ShowError => self.window.show_error(&self.settings),
                Action::Signal(signal) => self.signal(signal.into()),
                Action::Failover { current } => self.spawn_failover(current),
                Action::ReinitWindow => {
                    self.timers.clear_window();
                    self.window.reinit(&mut self.settings);
                    queue.extend(self.machine.window_reinitialized());
                }
            }
        }
    }

    fn spawn_probe(&self, ticket: ProbeTicket, url: String) {
        let prober = self.services.prober.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = probe_outcome(prober.as_ref(), &url).await;
            let _ = tx.send(Internal::Probe { ticket, outcome });
        });
    }

    fn spawn_failover(&mut self, current: String) {
        if self.failover_running {
            return;
        }
        self.failover_running = true;

        let prober = self.services.prober.clone();
        let source = self.services.discovery.clone();
        let known = self.settings.get().registry.instances().to_vec();
        let tx = self.internal_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                found = find_alternative(
                    prober.as_ref(),
                    source.as_ref(),
                    &current,
                    &known,
                    DEFAULT_COLLECTION_WINDOW,
                ) => {
                    let _ = tx.send(Internal::Failover(found));
                }
            }
        });
    }

    fn probe_after_resume(&self) {
        let prober = self.services.prober.clone();
        let instance = self.settings.current_instance().map(str::to_string);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let mut healthy = false;
            if let Some(url) = instance {
                for attempt in 0..RESUME_PROBES {
                    if probe_outcome(prober.as_ref(), &url).await.is_healthy() {
                        healthy = true;
                        break;
                    }
                    debug!(attempt, "instance not reachable after resume");
                    sleep(RESUME_PROBE_DELAY).await;
                }
            }
            let _ = tx.send(Internal::ResumeProbed { healthy });
        });
    }

    fn check_for_updates(&self) {
        let Some(checker) = self.services.updates.clone() else {
            return;
        };
        let signals = self.services.signals.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = checker.check() => result,
            };
            match result {
                Ok(Some(update)) => {
                    info!(current = %update.current, latest = %update.latest, "update available");
                    let _ = signals.send(Signal::UpdateAvailable {
                        current: update.current.to_string(),
                        latest: update.latest.to_string(),
                        url: RELEASES_PAGE.into(),
                    });
                }
                Ok(None) => {}
                Err(e) => error!("there was a problem checking for updates: {e}"),
            }
        });
    }

    fn select_instance(&mut self, url: &str) {
        match self.settings.select_instance(url) {
            Ok(true) => {}
            Ok(false) => {
                debug!(url, "selected instance is not registered");
                return;
            }
            Err(e) => warn!("failed to save settings: {e}"),
        }

        self.instance_changed(Page::Instance(url.to_string()));
        self.window.show_window(&self.settings);
    }

    /// Retargets monitoring after the current instance changed. A disrupted
    /// connection recovers through a window reinit, which loads the new
    /// instance itself; otherwise `page` is loaded.
    fn instance_changed(&mut self, page: Page) {
        let disrupted = self.machine.is_disrupted();
        let actions = self.machine.instance_changed();
        self.apply(actions);
        if !disrupted {
            self.window.load(page);
        }
    }

    fn reset(&mut self, scope: ResetScope) {
        info!(?scope, "resetting application");
        let result = match scope {
            ResetScope::Everything => {
                self.window.shell_mut().clear_web_data();
                self.settings.clear()
            }
            ResetScope::Windows => self.settings.update(Settings::reset_windows),
        };
        if let Err(e) = result {
            warn!("failed to save settings: {e}");
        }
        self.relaunch();
    }

    fn register_shortcuts(&mut self) {
        let s = self.settings.get();
        let mut accelerators = Vec::new();
        if s.shortcut_enabled {
            accelerators.push(s.user_shortcut.clone());
        }
        if s.shortcut_fullscreen_enabled {
            accelerators.push(FULLSCREEN_SHORTCUT.to_string());
        }
        self.window.shell_mut().set_shortcuts(&accelerators);
    }

    fn refresh_context_menu(&mut self) {
        let menu = self.menu_state().build_menu();
        self.window.shell_mut().set_context_menu(menu);
    }

    fn menu_state(&self) -> MenuState {
        let s = self.settings.get();
        MenuState {
            platform: self.platform,
            version: env!("CARGO_PKG_VERSION").into(),
            instances: s.registry.instances().to_vec(),
            current_instance: s.current_instance().map(str::to_string),
            automatic_switching: s.automatic_switching,
            disable_hover: s.disable_hover,
            stay_on_top: s.stay_on_top,
            user_shortcut: s.user_shortcut.clone(),
            shortcut_enabled: s.shortcut_enabled,
            tray_icon: TrayIcon::from_file_name(s.user_tray_icon.as_deref()),
            detached_mode: s.detached_mode,
            full_screen: s.full_screen,
            shortcut_fullscreen_enabled: s.shortcut_fullscreen_enabled,
            auto_update: s.auto_update,
            auto_reconnect: s.auto_reconnect,
        }
    }

    fn policy(&self) -> RecoveryPolicy {
        let s = self.settings.get();
        RecoveryPolicy {
            auto_reconnect: s.auto_reconnect,
            automatic_switching: s.automatic_switching,
        }
    }

    fn schedule(&mut self, requests: Vec<TimerRequest>) {
        let now = Instant::now();
        for request in requests {
            self.timers.schedule_window(request, now);
        }
    }

    fn save(&mut self, f: impl FnOnce(&mut Settings)) {
        if let Err(e) = self.settings.update(f) {
            warn!("failed to save settings: {e}");
        }
    }

    fn signal(&self, signal: Signal) {
        // Nobody listening just means no page is loaded.
        let _ = self.services.signals.send(signal);
    }

    fn open(&self, url: &str) {
        if let Err(e) = (self.services.open_url)(url) {
            warn!(url, "failed to open browser: {e}");
        }
    }

    fn relaunch(&mut self) {
        self.exit = Some(Exit::Relaunch);
    }

    fn quit(&mut self) {
        self.window.set_force_quit();
        self.exit = Some(Exit::Quit);
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        let actions = self.machine.stop();
        self.apply(actions);
        self.timers.clear_window();
        self.window.shell_mut().set_shortcuts(&[]);
        self.window.set_force_quit();
        self.window.destroy();
    }
}

async fn sleep_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::mpsc::Receiver;

    use hassdesk_connection::{ConnectionState, ProbeError, ProbeFuture};
    use hassdesk_discovery::{Announcement, BrowseFuture};
    use hassdesk_window::{ChannelShell, ShellCommand, ShellMirror};

    use super::*;

    impl<S: Shell> App<S> {
        fn settings(&self) -> &Settings {
            self.settings.get()
        }

        fn window(&self) -> &WindowController<S> {
            &self.window
        }

        fn connection_state(&self) -> ConnectionState {
            self.machine.state()
        }
    }

    const HA: &str = "http://ha.local:8123";
    const BACKUP: &str = "http://backup.local:8123";

    /// Answers probes from a per-URL script; an exhausted script repeats
    /// its last status.
    struct Scripted {
        script: Mutex<HashMap<String, VecDeque<u16>>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(script: &[(&str, &[u16])]) -> Arc<Self> {
            let script = script
                .iter()
                .map(|(url, statuses)| (url.to_string(), statuses.iter().copied().collect()))
                .collect();
            Arc::new(Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
        }
    }

    impl Prober for Scripted {
        fn probe(&self, url: &str) -> ProbeFuture {
            self.calls.lock().unwrap().push(url.to_string());
            let mut script = self.script.lock().unwrap();
            let result = match script.get_mut(url) {
                Some(queue) if queue.len() > 1 => Ok(queue.pop_front().unwrap()),
                Some(queue) => Ok(*queue.front().unwrap()),
                None => Err(ProbeError::InvalidUrl(url.to_string())),
            };
            Box::pin(async move { result })
        }
    }

    struct Quiet;

    impl AnnouncementSource for Quiet {
        fn browse(&self, _window: Duration) -> BrowseFuture {
            Box::pin(async { Ok(Vec::<Announcement>::new()) })
        }
    }

    struct Harness {
        app: App<ChannelShell>,
        prober: Arc<Scripted>,
        events_tx: mpsc::UnboundedSender<AppEvent>,
        events: mpsc::UnboundedReceiver<AppEvent>,
        signals: mpsc::UnboundedReceiver<Signal>,
        commands: Receiver<ShellCommand>,
        opened: Arc<Mutex<Vec<String>>>,
    }

    impl Harness {
        fn new(platform: Platform, settings: Settings, prober: Arc<Scripted>) -> Self {
            let (shell, commands, _mirror) = ChannelShell::new(platform, ShellMirror::default());
            let (signals_tx, signals) = mpsc::unbounded_channel();
            let (events_tx, events) = mpsc::unbounded_channel();
            let opened = Arc::new(Mutex::new(Vec::new()));
            let record = opened.clone();
            let services = Services {
                prober: prober.clone(),
                discovery: Arc::new(Quiet),
                updates: None,
                open_url: Arc::new(move |url: &str| {
                    record.lock().unwrap().push(url.to_string());
                    Ok(())
                }),
                signals: signals_tx,
            };
            let app = App::new(
                SettingsStore::in_memory(settings),
                shell,
                services,
                ReconnectConfig::default(),
            );
            Self {
                app,
                prober,
                events_tx,
                events,
                signals,
                commands,
                opened,
            }
        }

        fn with_instance(settings: Settings, prober: Arc<Scripted>) -> Self {
            let mut settings = settings;
            settings.registry.add_instance(HA);
            let mut h = Self::new(Platform::Windows, settings, prober);
            h.app.startup();
            h
        }

        async fn step(&mut self) -> Option<Exit> {
            self.app.step(&mut self.events).await
        }

        /// Steps until `done` holds. Fails after a bounded number of steps.
        async fn step_until(&mut self, done: impl Fn(&App<ChannelShell>) -> bool) {
            for _ in 0..100 {
                if done(&self.app) {
                    return;
                }
                assert!(self.step().await.is_none(), "loop exited early");
            }
            panic!("condition not reached");
        }

        async fn send(&mut self, event: AppEvent) -> Option<Exit> {
            self.events_tx.send(event).unwrap();
            self.step().await
        }

        fn signals(&mut self) -> Vec<Signal> {
            let mut out = Vec::new();
            while let Ok(signal) = self.signals.try_recv() {
                out.push(signal);
            }
            out
        }

        fn commands(&self) -> Vec<ShellCommand> {
            self.commands.try_iter().collect()
        }
    }

    fn reconnecting() -> Settings {
        Settings {
            auto_reconnect: true,
            automatic_switching: false,
            ..Settings::default()
        }
    }

    fn windows_created(commands: &[ShellCommand]) -> usize {
        commands
            .iter()
            .filter(|c| matches!(c, ShellCommand::CreateWindow { .. }))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn first_instance_then_outage_starts_retrying() {
        let prober = Scripted::new(&[(HA, &[200, 503, 503])]);
        let mut h = Harness::new(Platform::Windows, reconnecting(), prober);
        h.app.startup();
        assert_eq!(h.app.window().page(), Some(&Page::Setup));
        assert!(h.app.settings().disable_hover);

        h.send(AppEvent::Ipc(IpcRequest::GetHaInstance {
            url: Some(HA.into()),
        }))
        .await;
        assert_eq!(h.signals(), [Signal::ReceiveHaInstance(HA.into())]);
        assert_eq!(h.app.settings().current_instance(), Some(HA));
        assert!(!h.app.settings().disable_hover);

        h.step_until(|app| app.connection_state() == ConnectionState::Monitoring)
            .await;
        let prober = h.prober.clone();
        h.step_until(|_| prober.calls_to(HA) == 1).await;
        h.step().await;
        assert_eq!(h.app.connection_state(), ConnectionState::Monitoring);

        h.step_until(|app| app.connection_state() == ConnectionState::Retrying { attempt: 0 })
            .await;
        assert_eq!(h.app.window().page(), Some(&Page::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_on_third_retry_reinitializes_once() {
        let prober = Scripted::new(&[(HA, &[503, 503, 503, 503, 200])]);
        let mut h = Harness::with_instance(reconnecting(), prober);
        h.commands();

        h.step_until(|app| app.connection_state() == ConnectionState::Retrying { attempt: 3 })
            .await;
        h.step_until(|app| app.connection_state() == ConnectionState::Monitoring)
            .await;

        assert_eq!(h.prober.calls_to(HA), 5);
        assert_eq!(windows_created(&h.commands()), 1);
        assert_eq!(
            h.signals(),
            [
                Signal::RetryUpdate("Trying to reconnect 0 of 5".into()),
                Signal::RetryUpdate("Trying to reconnect 1 of 5".into()),
                Signal::RetryUpdate("Trying to reconnect 2 of 5".into()),
                Signal::RetrySuccess("Instance alive, reconnecting.".into()),
            ]
        );
        assert_eq!(h.app.window().page(), Some(&Page::Instance(HA.into())));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_session_fails_without_reinit() {
        let prober = Scripted::new(&[(HA, &[503])]);
        let mut h = Harness::with_instance(reconnecting(), prober);
        h.commands();

        h.step_until(|app| app.connection_state() == ConnectionState::Failed)
            .await;

        assert_eq!(h.prober.calls_to(HA), 1 + 6);
        assert_eq!(windows_created(&h.commands()), 0);
        let signals = h.signals();
        assert_eq!(signals.len(), 6);
        assert_eq!(
            signals.last(),
            Some(&Signal::RetryUpdate("Unable to connect to instance!".into()))
        );
        assert_eq!(h.app.timers.connection(), None);

        // A manual reconnect brings monitoring back.
        h.send(AppEvent::Ipc(IpcRequest::Reconnect)).await;
        assert_eq!(h.app.connection_state(), ConnectionState::Monitoring);
        assert_eq!(windows_created(&h.commands()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn automatic_switching_moves_to_reachable_instance() {
        let prober = Scripted::new(&[(HA, &[503]), (BACKUP, &[200])]);
        let mut settings = Settings::default();
        settings.registry.add_instance(BACKUP);
        let mut h = Harness::with_instance(settings, prober);

        h.step_until(|app| app.settings().current_instance() == Some(BACKUP))
            .await;

        assert_eq!(h.app.connection_state(), ConnectionState::Monitoring);
        assert_eq!(h.app.window().page(), Some(&Page::Instance(BACKUP.into())));
    }

    #[tokio::test(start_paused = true)]
    async fn switching_instance_ignores_answer_for_previous_one() {
        let prober = Scripted::new(&[(HA, &[503]), (BACKUP, &[200])]);
        let mut settings = reconnecting();
        settings.registry.add_instance(BACKUP);
        let mut h = Harness::with_instance(settings, prober);

        // The availability check against HA is spawned but not yet answered.
        h.step().await;
        assert_eq!(h.prober.calls_to(HA), 0);

        h.send(AppEvent::Menu(MenuAction::SelectInstance(BACKUP.into())))
            .await;
        let prober = h.prober.clone();
        h.step_until(|_| prober.calls_to(BACKUP) == 1).await;

        assert_eq!(h.prober.calls_to(HA), 1);
        assert_eq!(h.app.settings().current_instance(), Some(BACKUP));
        assert_eq!(h.app.connection_state(), ConnectionState::Monitoring);
        assert_eq!(h.app.window().page(), Some(&Page::Instance(BACKUP.into())));
        assert!(h.signals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn page_choosing_instance_while_degraded_resumes_monitoring() {
        let prober = Scripted::new(&[(HA, &[503]), (BACKUP, &[200])]);
        let settings = Settings {
            automatic_switching: false,
            ..Settings::default()
        };
        let mut h = Harness::with_instance(settings, prober);

        h.step_until(|app| app.connection_state() == ConnectionState::Degraded)
            .await;
        assert_eq!(h.app.window().page(), Some(&Page::Error));
        h.commands();

        h.send(AppEvent::Ipc(IpcRequest::GetHaInstance {
            url: Some(BACKUP.into()),
        }))
        .await;

        assert_eq!(h.app.connection_state(), ConnectionState::Monitoring);
        assert_eq!(h.app.window().page(), Some(&Page::Instance(BACKUP.into())));
        assert_eq!(windows_created(&h.commands()), 1);
        assert_eq!(
            h.signals(),
            [
                Signal::RetrySuccess("Instance alive, reconnecting.".into()),
                Signal::ReceiveHaInstance(BACKUP.into()),
            ]
        );

        let prober = h.prober.clone();
        h.step_until(|_| prober.calls_to(BACKUP) == 1).await;
        assert_eq!(h.app.connection_state(), ConnectionState::Monitoring);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_during_resize_keeps_hover_working() {
        let prober = Scripted::new(&[(HA, &[200])]);
        let mut h = Harness::with_instance(Settings::default(), prober);

        h.send(AppEvent::Window(WindowEvent::Resized(Rect::new(0, 0, 420, 520))))
            .await;
        assert!(h.app.window().is_resizing());

        h.send(AppEvent::Ipc(IpcRequest::Reconnect)).await;
        assert!(!h.app.window().is_resizing());
        assert!(!h.app.window().is_visible());

        h.send(AppEvent::Tray(TrayEvent::MouseMove)).await;
        assert!(h.app.window().is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_then_resume_relaunches() {
        let prober = Scripted::new(&[(HA, &[200])]);
        let mut h = Harness::with_instance(Settings::default(), prober);

        assert!(h.send(AppEvent::Power(PowerEvent::Suspend)).await.is_none());
        assert_eq!(h.app.window().page(), Some(&Page::Sleeping));
        assert_eq!(h.app.connection_state(), ConnectionState::Idle);
        assert_eq!(h.app.timers.connection(), None);

        assert!(h.send(AppEvent::Power(PowerEvent::Resume)).await.is_none());
        assert_eq!(h.step().await, Some(Exit::Relaunch));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_relaunches_even_when_unreachable() {
        let prober = Scripted::new(&[(HA, &[503])]);
        let mut h = Harness::with_instance(Settings::default(), prober);

        assert!(h.send(AppEvent::Power(PowerEvent::Resume)).await.is_none());
        assert_eq!(h.step().await, Some(Exit::Relaunch));
        assert_eq!(h.prober.calls_to(HA), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn menu_actions_update_settings_and_shell() {
        let prober = Scripted::new(&[(HA, &[200])]);
        let mut h = Harness::with_instance(Settings::default(), prober);
        h.commands();

        h.send(AppEvent::Menu(MenuAction::SelectTrayIcon(TrayIcon::Black)))
            .await;
        assert_eq!(
            h.app.settings().user_tray_icon.as_deref(),
            Some("IconWinBlack.png")
        );
        assert!(
            h.commands()
                .contains(&ShellCommand::SetTrayIcon("IconWinBlack.png".into()))
        );

        h.send(AppEvent::Menu(MenuAction::ToggleFullScreenShortcut))
            .await;
        assert!(h.commands().contains(&ShellCommand::SetShortcuts(vec![
            "CommandOrControl+Alt+X".into(),
            FULLSCREEN_SHORTCUT.into(),
        ])));

        h.send(AppEvent::Menu(MenuAction::ToggleDetached)).await;
        assert!(h.app.settings().detached_mode);
        assert_eq!(windows_created(&h.commands()), 1);
        assert!(h.app.window().is_visible());

        h.send(AppEvent::Menu(MenuAction::OpenInBrowser)).await;
        assert_eq!(*h.opened.lock().unwrap(), [HA]);

        h.send(AppEvent::Menu(MenuAction::AddInstance)).await;
        assert_eq!(h.app.settings().current_instance(), None);
        assert_eq!(h.app.window().page(), Some(&Page::Setup));
    }

    #[tokio::test(start_paused = true)]
    async fn shortcuts_toggle_window_and_fullscreen() {
        let prober = Scripted::new(&[(HA, &[200])]);
        let mut h = Harness::with_instance(Settings::default(), prober);
        assert!(!h.app.window().is_visible());

        h.send(AppEvent::Shortcut("CommandOrControl+Alt+X".into()))
            .await;
        assert!(h.app.window().is_visible());

        h.send(AppEvent::Shortcut(FULLSCREEN_SHORTCUT.into())).await;
        assert!(h.app.settings().full_screen);
    }

    #[tokio::test(start_paused = true)]
    async fn tray_clicks() {
        let prober = Scripted::new(&[(HA, &[200])]);
        let mut h = Harness::with_instance(Settings::default(), prober);

        h.send(AppEvent::Tray(TrayEvent::Click)).await;
        assert!(h.app.window().is_visible());

        h.commands();
        h.send(AppEvent::Tray(TrayEvent::RightClick)).await;
        assert!(!h.app.window().is_visible());
        assert!(
            h.commands()
                .iter()
                .any(|c| matches!(c, ShellCommand::PopUpMenu(_)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_launch_focuses_existing_window() {
        let prober = Scripted::new(&[(HA, &[200])]);
        let mut h = Harness::with_instance(Settings::default(), prober);
        h.commands();

        h.send(AppEvent::SecondInstance).await;

        let commands = h.commands();
        assert!(commands.contains(&ShellCommand::Restore { id: 1 }));
        assert!(commands.contains(&ShellCommand::Focus { id: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_windows_relaunches_with_geometry_cleared() {
        let prober = Scripted::new(&[(HA, &[200])]);
        let settings = Settings {
            window_position: Some([1, 2]),
            full_screen: true,
            ..Settings::default()
        };
        let mut h = Harness::with_instance(settings, prober);

        let exit = h
            .send(AppEvent::Menu(MenuAction::Reset(ResetScope::Windows)))
            .await;

        assert_eq!(exit, Some(Exit::Relaunch));
        assert_eq!(h.app.settings().window_position, None);
        assert!(!h.app.settings().full_screen);
        assert_eq!(h.app.settings().current_instance(), Some(HA));
    }

    #[tokio::test(start_paused = true)]
    async fn quit_tears_down_window() {
        let prober = Scripted::new(&[(HA, &[200])]);
        let mut h = Harness::with_instance(Settings::default(), prober);

        let exit = h.send(AppEvent::Menu(MenuAction::Quit)).await;

        assert_eq!(exit, Some(Exit::Quit));
        assert!(!h.app.window().has_window());
        assert!(h.commands().contains(&ShellCommand::SetShortcuts(Vec::new())));
    }

    #[tokio::test(start_paused = true)]
    async fn linux_attaches_context_menu_at_startup() {
        let prober = Scripted::new(&[(HA, &[200])]);
        let mut h = Harness::new(Platform::Linux, Settings::default(), prober);
        h.app.startup();

        assert!(
            h.commands()
                .iter()
                .any(|c| matches!(c, ShellCommand::SetContextMenu(_)))
        );
    }
}
