//! Public types for instance monitoring and reconnection.

use std::fmt;
use std::time::Duration;

/// Connectivity state of the current instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing is being watched (before start, while asleep, after shutdown).
    Idle,
    /// Periodic probes are succeeding.
    Monitoring,
    /// A probe returned a non-200 status and no retry session is running.
    Degraded,
    /// A bounded retry session is in progress.
    Retrying { attempt: u32 },
    /// The instance answered again; the window is being rebuilt.
    Recovered,
    /// Retries exhausted. Only a manual reconnect leaves this state.
    Failed,
}

/// Result of one probe as seen by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The server answered with this HTTP status.
    Status(u16),
    /// No HTTP response (DNS, refused connection, timeout).
    TransportError(String),
}

impl ProbeOutcome {
    /// Only a 200 counts as healthy.
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Status(200))
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Status(code) => write!(f, "HTTP {code}"),
            ProbeOutcome::TransportError(e) => write!(f, "transport error: {e}"),
        }
    }
}

/// Notifications for the presentation layer during a retry session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrySignal {
    /// Attempt `attempt` failed; another one follows.
    Progress { attempt: u32, max_retries: u32 },
    /// The final attempt failed.
    Exhausted,
    /// The instance is healthy again.
    Recovered,
    /// An attempt could not reach the instance at all.
    ConnectionFailed,
}

impl RetrySignal {
    /// Channel name the presentation layer listens on.
    pub fn channel(&self) -> &'static str {
        match self {
            RetrySignal::Progress { .. } | RetrySignal::Exhausted => "retry-update",
            RetrySignal::Recovered => "retry-success",
            RetrySignal::ConnectionFailed => "retry-error",
        }
    }

    /// Human-readable text shown on the error page.
    pub fn message(&self) -> String {
        match self {
            RetrySignal::Progress {
                attempt,
                max_retries,
            } => format!("Trying to reconnect {attempt} of {max_retries}"),
            RetrySignal::Exhausted => "Unable to connect to instance!".into(),
            RetrySignal::Recovered => "Instance alive, reconnecting.".into(),
            RetrySignal::ConnectionFailed => "Connection to instance failed.".into(),
        }
    }
}

/// Timing and bounds for monitoring and retries.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Cadence of passive health probes while monitoring.
    pub monitor_interval: Duration,
    /// Pause between failed retry attempts.
    pub retry_delay: Duration,
    /// Highest attempt number; a session makes `max_retries + 1` attempts.
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(3),
            retry_delay: Duration::from_secs(4),
            max_retries: 5,
        }
    }
}

/// User preferences consulted when the instance degrades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub auto_reconnect: bool,
    pub automatic_switching: bool,
}
