//! Headless host for the shell bridge.
//!
//! Shell commands are logged instead of rendered. Page messages travel as
//! JSON lines: requests on stdin, signals on stdout.

use std::io::{BufRead, BufReader, Write};
use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;

use hassdesk_window::ShellCommand;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::app::AppEvent;
use crate::ipc::{IpcRequest, Signal};

/// Drains shell commands on a dedicated thread.
pub fn spawn_shell_log(commands: Receiver<ShellCommand>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("shell".into())
        .spawn(move || {
            for command in commands {
                debug!(?command, "shell command");
            }
        })?;
    Ok(())
}

/// Parses one stdin line into an event. Blank and malformed lines yield
/// nothing.
pub fn request_event(line: &str) -> Option<AppEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match IpcRequest::from_json(line) {
        Ok(request) => Some(AppEvent::Ipc(request)),
        Err(e) => {
            warn!("ignoring malformed request: {e}");
            None
        }
    }
}

/// Reads requests from `reader` on its own thread until EOF or until the
/// loop stops listening.
///
/// The thread is never joined on exit, so a reader blocked on an open
/// pipe does not hold up shutdown.
pub fn spawn_request_reader<R>(
    reader: R,
    events: mpsc::UnboundedSender<AppEvent>,
) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    std::thread::Builder::new()
        .name("ipc-requests".into())
        .spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("request read failed: {e}");
                        break;
                    }
                };
                if let Some(event) = request_event(&line)
                    && events.send(event).is_err()
                {
                    break;
                }
            }
            debug!("request reader stopped");
        })
}

/// Writes each signal as one JSON line to `out`.
pub fn spawn_signal_writer<W>(
    mut out: W,
    mut signals: mpsc::UnboundedReceiver<Signal>,
) -> std::io::Result<JoinHandle<()>>
where
    W: Write + Send + 'static,
{
    std::thread::Builder::new()
        .name("ipc-signals".into())
        .spawn(move || {
            while let Some(signal) = signals.blocking_recv() {
                let json = match signal.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("failed to encode signal: {e}");
                        continue;
                    }
                };
                if let Err(e) = writeln!(out, "{json}").and_then(|()| out.flush()) {
                    warn!("signal write failed: {e}");
                    break;
                }
            }
        })
}

/// Connects stdin and stdout to the loop.
pub fn spawn_ipc(
    events: mpsc::UnboundedSender<AppEvent>,
    signals: mpsc::UnboundedReceiver<Signal>,
) -> std::io::Result<()> {
    spawn_request_reader(BufReader::new(std::io::stdin()), events)?;
    spawn_signal_writer(std::io::stdout(), signals)?;
    Ok(())
}
