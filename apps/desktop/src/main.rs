//! hassdesk desktop entry point.

mod app;
mod config;
mod host;
mod ipc;
mod timers;
mod updates;

use std::process::Command;
use std::sync::Arc;

use hassdesk_connection::{HttpProber, ReconnectConfig};
use hassdesk_discovery::Client as DiscoveryClient;
use hassdesk_settings::SettingsStore;
use hassdesk_tray::Platform;
use hassdesk_window::{ChannelShell, ShellMirror};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::app::{App, AppEvent, Exit, Services};
use crate::updates::UpdateChecker;

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER)),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "starting hassdesk"
    );

    let settings = config::open_settings()?;

    let rt = tokio::runtime::Runtime::new()?;
    let exit = rt.block_on(run(settings))?;
    drop(rt);

    if exit == Exit::Relaunch {
        relaunch()?;
    }

    tracing::info!("hassdesk shut down cleanly");
    Ok(())
}

async fn run(settings: SettingsStore) -> anyhow::Result<Exit> {
    let (shell, commands, _mirror) = ChannelShell::new(Platform::current(), ShellMirror::default());
    host::spawn_shell_log(commands)?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (signals_tx, signals_rx) = mpsc::unbounded_channel();
    host::spawn_ipc(events_tx.clone(), signals_rx)?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("SIGINT received, shutting down");
            let _ = events_tx.send(AppEvent::Quit);
        }
    });

    let services = Services {
        prober: Arc::new(HttpProber::new()?),
        discovery: Arc::new(DiscoveryClient::new()),
        updates: Some(Arc::new(UpdateChecker::new()?)),
        open_url: Arc::new(|url: &str| open::that_detached(url)),
        signals: signals_tx,
    };

    let app = App::new(settings, shell, services, ReconnectConfig::default());
    tracing::info!("hassdesk ready");
    Ok(app.run(events_rx).await)
}

/// Starts a new process with the same arguments.
fn relaunch() -> anyhow::Result<()> {
    let exe = std::env::current_exe()?;
    tracing::info!(exe = %exe.display(), "relaunching");
    Command::new(exe).args(std::env::args_os().skip(1)).spawn()?;
    Ok(())
}
