//! Liveness probing and reconnection for the selected Home Assistant
//! instance.
//!
//! [`ReconnectMachine`] is a pure state machine; callers feed it timer
//! expiries and probe results and perform the [`Action`]s it returns.
//! [`HttpProber`] is the production [`Prober`].

pub mod failover;
pub mod machine;
pub mod probe;
pub mod types;

pub use failover::{failover_candidates, find_alternative};
pub use machine::{Action, ConnectionTimer, ProbeTicket, ReconnectMachine};
pub use probe::{HEALTH_PATH, HttpProber, PROBE_TIMEOUT, ProbeFuture, Prober, health_url, probe_outcome};
pub use types::{ConnectionState, ProbeOutcome, ReconnectConfig, RecoveryPolicy, RetrySignal};

/// Errors for a single probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid instance URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
