//! Messages exchanged with the pages shown in the window.
//!
//! Both directions are JSON objects of the form
//! `{"channel": "<name>", "payload": ...}`.

use hassdesk_connection::RetrySignal;
use serde::{Deserialize, Serialize};

/// Requests sent by the pages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
pub enum IpcRequest {
    /// Optionally registers `url`, then asks for the current instance.
    GetHaInstance {
        #[serde(default)]
        url: Option<String>,
    },
    /// Asks for instances announced on the network but not yet known.
    GetInstances,
    /// Rebuilds the window and resumes monitoring.
    Reconnect,
    Restart,
    /// Opens the release page after an update notice.
    DownloadUpdate,
}

impl IpcRequest {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Notifications for the pages. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
pub enum Signal {
    ReceiveHaInstance(String),
    ReceiveInstances(Vec<String>),
    RetryUpdate(String),
    RetrySuccess(String),
    RetryError(String),
    UpdateAvailable {
        current: String,
        latest: String,
        url: String,
    },
}

impl Signal {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<RetrySignal> for Signal {
    fn from(signal: RetrySignal) -> Self {
        let message = signal.message();
        match signal {
            RetrySignal::Progress { .. } | RetrySignal::Exhausted => Signal::RetryUpdate(message),
            RetrySignal::Recovered => Signal::RetrySuccess(message),
            RetrySignal::ConnectionFailed => Signal::RetryError(message),
        }
    }
}
