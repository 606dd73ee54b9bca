//! Monitoring and reconnection state machine.
//!
//! The machine is pure: every input returns the [`Action`]s the caller must
//! perform (issue a probe, arm or cancel the timer, notify the UI, rebuild
//! the window). It owns a single timer slot, so the monitoring interval
//! and a retry delay can never be armed at the same time.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::types::{ConnectionState, ProbeOutcome, ReconnectConfig, RecoveryPolicy, RetrySignal};

/// Identifies which request a probe result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTicket {
    Monitor { generation: u64 },
    Retry { session: u64, attempt: u32 },
}

/// The one timer the machine may have armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionTimer {
    Monitor,
    RetryDelay { session: u64 },
}

/// Side effects requested by the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Probe `url` and report back with `ticket`.
    Probe { ticket: ProbeTicket, url: String },
    /// Arm the timer slot, replacing whatever was armed.
    ArmTimer {
        timer: ConnectionTimer,
        after: Duration,
    },
    /// Disarm the timer slot.
    CancelTimer,
    /// Swap the window content for the error page.
    ShowError,
    /// Forward a retry notification to the presentation layer.
    Signal(RetrySignal),
    /// Look for another reachable instance than `current`.
    Failover { current: String },
    /// Tear down and recreate the window, then call
    /// [`ReconnectMachine::window_reinitialized`].
    ReinitWindow,
}

#[derive(Debug, Clone)]
struct RetrySession {
    id: u64,
    url: String,
    attempt: u32,
}

/// Drives monitoring, retry sessions and recovery for the current instance.
#[derive(Debug)]
pub struct ReconnectMachine {
    config: ReconnectConfig,
    state: ConnectionState,
    session: Option<RetrySession>,
    next_session: u64,
    armed: Option<ConnectionTimer>,
    /// Generation and URL of the in-flight monitoring probe.
    monitor_probe: Option<(u64, String)>,
    monitor_generation: u64,
}

impl ReconnectMachine {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Idle,
            session: None,
            next_session: 0,
            armed: None,
            monitor_probe: None,
            monitor_generation: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// The currently armed timer, if any.
    pub fn armed_timer(&self) -> Option<ConnectionTimer> {
        self.armed
    }

    /// Attempt number of the running retry session.
    pub fn retry_attempt(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.attempt)
    }

    /// True while the current instance is known to be unhealthy.
    pub fn is_disrupted(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Degraded | ConnectionState::Retrying { .. } | ConnectionState::Failed
        )
    }

    /// Begins periodic monitoring. No-op when already monitoring.
    pub fn start(&mut self) -> Vec<Action> {
        if self.state == ConnectionState::Monitoring && self.armed.is_some() {
            return Vec::new();
        }
        let mut actions = Vec::new();
        self.session = None;
        self.enter_monitoring(&mut actions);
        info!("availability monitoring started");
        actions
    }

    /// Handles expiry of `timer`. `current` is the selected instance.
    pub fn on_timer(&mut self, timer: ConnectionTimer, current: Option<&str>) -> Vec<Action> {
        if self.armed != Some(timer) {
            debug!(?timer, "ignoring stale timer");
            return Vec::new();
        }
        self.armed = None;

        let mut actions = Vec::new();
        match timer {
            ConnectionTimer::Monitor => {
                if self.state != ConnectionState::Monitoring {
                    return actions;
                }
                if let Some(url) = current
                    && self.monitor_probe.is_none()
                {
                    self.monitor_generation += 1;
                    let generation = self.monitor_generation;
                    self.monitor_probe = Some((generation, url.to_string()));
                    actions.push(Action::Probe {
                        ticket: ProbeTicket::Monitor { generation },
                        url: url.to_string(),
                    });
                }
                self.arm(
                    ConnectionTimer::Monitor,
                    self.config.monitor_interval,
                    &mut actions,
                );
            }
            ConnectionTimer::RetryDelay { session } => {
                let Some(s) = self.session.as_mut().filter(|s| s.id == session) else {
                    return actions;
                };
                s.attempt += 1;
                self.state = ConnectionState::Retrying { attempt: s.attempt };
                actions.push(Action::Probe {
                    ticket: ProbeTicket::Retry {
                        session: s.id,
                        attempt: s.attempt,
                    },
                    url: s.url.clone(),
                });
            }
        }
        actions
    }

    /// Handles a settled probe. Results for superseded tickets are dropped.
    pub fn on_probe(
        &mut self,
        ticket: ProbeTicket,
        outcome: ProbeOutcome,
        policy: RecoveryPolicy,
    ) -> Vec<Action> {
        match ticket {
            ProbeTicket::Monitor { generation } => {
                self.on_monitor_probe(generation, outcome, policy)
            }
            ProbeTicket::Retry { session, attempt } => {
                self.on_retry_probe(session, attempt, outcome)
            }
        }
    }

    /// Manual reconnect: abandons any session and rebuilds the window.
    pub fn reconnect(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        self.session = None;
        self.monitor_probe = None;
        self.disarm(&mut actions);
        self.state = ConnectionState::Recovered;
        info!("manual reconnect requested");
        actions.push(Action::ReinitWindow);
        actions
    }

    /// Another instance was selected while the current one was unhealthy.
    ///
    /// Treated like a recovery. Returns nothing when not disrupted.
    pub fn instance_switched(&mut self) -> Vec<Action> {
        if !self.is_disrupted() {
            return Vec::new();
        }
        let mut actions = Vec::new();
        self.session = None;
        self.disarm(&mut actions);
        self.state = ConnectionState::Recovered;
        actions.push(Action::Signal(RetrySignal::Recovered));
        actions.push(Action::ReinitWindow);
        actions
    }

    /// The current instance was replaced or unset.
    ///
    /// Results of probes against the previous instance are discarded. A
    /// disrupted machine recovers as in [`Self::instance_switched`];
    /// a monitoring one restarts its interval.
    pub fn instance_changed(&mut self) -> Vec<Action> {
        self.monitor_probe = None;
        if self.is_disrupted() {
            return self.instance_switched();
        }
        let mut actions = Vec::new();
        if self.state == ConnectionState::Monitoring {
            debug!("instance changed, monitoring restarted");
            self.disarm(&mut actions);
            self.enter_monitoring(&mut actions);
        }
        actions
    }

    /// The window has been rebuilt; resume monitoring.
    pub fn window_reinitialized(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state != ConnectionState::Recovered {
            return actions;
        }
        self.enter_monitoring(&mut actions);
        info!("availability monitoring re-armed");
        actions
    }

    /// Stops everything (system sleep or shutdown).
    pub fn stop(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        self.session = None;
        self.monitor_probe = None;
        self.disarm(&mut actions);
        self.state = ConnectionState::Idle;
        actions
    }

    fn on_monitor_probe(
        &mut self,
        generation: u64,
        outcome: ProbeOutcome,
        policy: RecoveryPolicy,
    ) -> Vec<Action> {
        let url = match self.monitor_probe.take() {
            Some((current, url)) if current == generation => url,
            other => {
                self.monitor_probe = other;
                debug!(generation, "discarding superseded monitor probe");
                return Vec::new();
            }
        };
        if self.state != ConnectionState::Monitoring {
            return Vec::new();
        }

        match outcome {
            ProbeOutcome::Status(200) => Vec::new(),
            ProbeOutcome::Status(status) => {
                error!(url = %url, status, "instance unavailable");
                self.degrade(url, policy)
            }
            ProbeOutcome::TransportError(e) => {
                warn!(url = %url, error = %e, "availability check failed");
                Vec::new()
            }
        }
    }

    fn degrade(&mut self, url: String, policy: RecoveryPolicy) -> Vec<Action> {
        let mut actions = Vec::new();
        self.disarm(&mut actions);
        self.state = ConnectionState::Degraded;
        actions.push(Action::ShowError);

        if policy.auto_reconnect {
            let id = self.next_session;
            self.next_session += 1;
            self.state = ConnectionState::Retrying { attempt: 0 };
            self.session = Some(RetrySession {
                id,
                url: url.clone(),
                attempt: 0,
            });
            debug!(session = id, "retry session started");
            actions.push(Action::Probe {
                ticket: ProbeTicket::Retry {
                    session: id,
                    attempt: 0,
                },
                url: url.clone(),
            });
        }

        if policy.automatic_switching {
            actions.push(Action::Failover { current: url });
        }
        actions
    }

    fn on_retry_probe(&mut self, session: u64, attempt: u32, outcome: ProbeOutcome) -> Vec<Action> {
        let matches = self
            .session
            .as_ref()
            .is_some_and(|s| s.id == session && s.attempt == attempt);
        if !matches {
            debug!(session, attempt, "discarding superseded retry probe");
            return Vec::new();
        }

        let mut actions = Vec::new();
        let max_retries = self.config.max_retries;

        if outcome.is_healthy() {
            info!(attempt, "automatic reconnection successful");
            self.session = None;
            self.state = ConnectionState::Recovered;
            actions.push(Action::Signal(RetrySignal::Recovered));
            actions.push(Action::ReinitWindow);
            return actions;
        }

        if let ProbeOutcome::TransportError(e) = &outcome {
            warn!(attempt, error = %e, "error trying to reconnect");
            actions.push(Action::Signal(RetrySignal::ConnectionFailed));
        }

        if attempt >= max_retries {
            error!(attempt, "cannot automatically connect to instance");
            self.session = None;
            self.state = ConnectionState::Failed;
            actions.push(Action::Signal(RetrySignal::Exhausted));
            return actions;
        }

        if let ProbeOutcome::Status(status) = outcome {
            warn!(attempt, status, "instance unavailable, retrying");
            actions.push(Action::Signal(RetrySignal::Progress {
                attempt,
                max_retries,
            }));
        }
        self.arm(
            ConnectionTimer::RetryDelay { session },
            self.config.retry_delay,
            &mut actions,
        );
        actions
    }

    fn enter_monitoring(&mut self, actions: &mut Vec<Action>) {
        self.state = ConnectionState::Monitoring;
        self.arm(
            ConnectionTimer::Monitor,
            self.config.monitor_interval,
            actions,
        );
    }

    fn arm(&mut self, timer: ConnectionTimer, after: Duration, actions: &mut Vec<Action>) {
        self.armed = Some(timer);
        actions.push(Action::ArmTimer { timer, after });
    }

    fn disarm(&mut self, actions: &mut Vec<Action>) {
        if self.armed.take().is_some() {
            actions.push(Action::CancelTimer);
        }
    }
}

impl Default for ReconnectMachine {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://ha.local:8123";

    const RECONNECT: RecoveryPolicy = RecoveryPolicy {
        auto_reconnect: true,
        automatic_switching: false,
    };

    /// Applies actions the way the scheduler would and records them.
    struct Harness {
        machine: ReconnectMachine,
        policy: RecoveryPolicy,
        armed: Vec<ConnectionTimer>,
        probes: Vec<(ProbeTicket, String)>,
        signals: Vec<RetrySignal>,
        reinits: usize,
        errors_shown: usize,
        failovers: Vec<String>,
    }

    impl Harness {
        fn new(policy: RecoveryPolicy) -> Self {
            Self {
                machine: ReconnectMachine::default(),
                policy,
                armed: Vec::new(),
                probes: Vec::new(),
                signals: Vec::new(),
                reinits: 0,
                errors_shown: 0,
                failovers: Vec::new(),
            }
        }

        fn apply(&mut self, actions: Vec<Action>) {
            for action in actions {
                match action {
                    Action::Probe { ticket, url } => self.probes.push((ticket, url)),
                    Action::ArmTimer { timer, .. } => {
                        self.armed.push(timer);
                        assert!(
                            self.armed.len() <= 1,
                            "two timers armed at once: {:?}",
                            self.armed
                        );
                    }
                    Action::CancelTimer => self.armed.clear(),
                    Action::ShowError => self.errors_shown += 1,
                    Action::Signal(s) => self.signals.push(s),
                    Action::Failover { current } => self.failovers.push(current),
                    Action::ReinitWindow => self.reinits += 1,
                }
            }
        }

        fn start(&mut self) {
            let actions = self.machine.start();
            self.apply(actions);
        }

        fn fire(&mut self) {
            let timer = self.armed.pop().expect("a timer should be armed");
            let actions = self.machine.on_timer(timer, Some(URL));
            self.apply(actions);
        }

        fn answer(&mut self, outcome: ProbeOutcome) {
            let (ticket, _) = self.probes.last().cloned().expect("a probe was issued");
            let actions = self.machine.on_probe(ticket, outcome, self.policy);
            self.apply(actions);
        }

        /// Monitoring tick answered with 503.
        fn degrade(&mut self) {
            self.start();
            self.fire();
            self.answer(ProbeOutcome::Status(503));
        }

        fn retry_probe_count(&self) -> usize {
            self.probes
                .iter()
                .filter(|(t, _)| matches!(t, ProbeTicket::Retry { .. }))
                .count()
        }
    }

    #[test]
    fn healthy_probe_keeps_monitoring() {
        let mut h = Harness::new(RECONNECT);
        h.start();
        h.fire();
        assert_eq!(h.probes.len(), 1);
        assert_eq!(h.probes[0].1, URL);

        h.answer(ProbeOutcome::Status(200));

        assert_eq!(h.machine.state(), ConnectionState::Monitoring);
        assert_eq!(h.armed, [ConnectionTimer::Monitor]);
        assert_eq!(h.errors_shown, 0);
    }

    #[test]
    fn non_200_degrades_and_starts_retry_at_attempt_zero() {
        let mut h = Harness::new(RECONNECT);
        h.degrade();

        assert_eq!(h.machine.state(), ConnectionState::Retrying { attempt: 0 });
        assert_eq!(h.errors_shown, 1);
        assert!(h.armed.is_empty(), "monitor timer must be cancelled");
        assert!(matches!(
            h.probes.last(),
            Some((ProbeTicket::Retry { attempt: 0, .. }, _))
        ));
    }

    #[test]
    fn degraded_without_auto_reconnect_waits() {
        let mut h = Harness::new(RecoveryPolicy::default());
        h.degrade();

        assert_eq!(h.machine.state(), ConnectionState::Degraded);
        assert!(h.armed.is_empty());
        assert_eq!(h.retry_probe_count(), 0);
        assert!(h.failovers.is_empty());
    }

    #[test]
    fn automatic_switching_requests_failover() {
        let mut h = Harness::new(RecoveryPolicy {
            auto_reconnect: true,
            automatic_switching: true,
        });
        h.degrade();
        assert_eq!(h.failovers, [URL]);
    }

    #[test]
    fn recovery_on_attempt_three() {
        let mut h = Harness::new(RECONNECT);
        h.degrade();

        for _ in 0..3 {
            h.answer(ProbeOutcome::Status(503));
            h.fire();
        }
        h.answer(ProbeOutcome::Status(200));

        assert_eq!(h.retry_probe_count(), 4);
        assert_eq!(h.reinits, 1);
        assert_eq!(h.machine.state(), ConnectionState::Recovered);
        assert_eq!(h.signals.last(), Some(&RetrySignal::Recovered));
        assert!(h.armed.is_empty());

        let actions = h.machine.window_reinitialized();
        h.apply(actions);
        assert_eq!(h.machine.state(), ConnectionState::Monitoring);
        assert_eq!(h.armed, [ConnectionTimer::Monitor]);
    }

    #[test]
    fn exhaustion_after_six_attempts() {
        let mut h = Harness::new(RECONNECT);
        h.degrade();

        for _ in 0..5 {
            h.answer(ProbeOutcome::Status(503));
            h.fire();
        }
        h.answer(ProbeOutcome::Status(503));

        assert_eq!(h.retry_probe_count(), 6);
        assert_eq!(h.reinits, 0);
        assert_eq!(h.machine.state(), ConnectionState::Failed);
        assert_eq!(h.signals.last(), Some(&RetrySignal::Exhausted));
        assert!(h.armed.is_empty(), "failed sessions schedule nothing");
    }

    #[test]
    fn progress_signals_name_attempt_and_limit() {
        let mut h = Harness::new(RECONNECT);
        h.degrade();
        for _ in 0..5 {
            h.answer(ProbeOutcome::Status(502));
            h.fire();
        }

        let progress: Vec<String> = h.signals.iter().map(RetrySignal::message).collect();
        assert_eq!(progress.len(), 5);
        for (k, message) in progress.iter().enumerate() {
            assert!(message.contains(&k.to_string()), "{message}");
            assert!(message.contains('5'), "{message}");
        }
    }

    #[test]
    fn transport_errors_do_not_end_the_session_early() {
        let mut h = Harness::new(RECONNECT);
        h.degrade();

        h.answer(ProbeOutcome::TransportError("connection refused".into()));
        assert_eq!(h.signals, [RetrySignal::ConnectionFailed]);
        assert_eq!(h.machine.state(), ConnectionState::Retrying { attempt: 0 });

        h.fire();
        h.answer(ProbeOutcome::TransportError("connection refused".into()));
        h.fire();
        h.answer(ProbeOutcome::Status(200));

        assert_eq!(h.retry_probe_count(), 3);
        assert_eq!(h.reinits, 1);
    }

    #[test]
    fn transport_error_on_final_attempt_fails_session() {
        let mut h = Harness::new(RECONNECT);
        h.degrade();
        for _ in 0..5 {
            h.answer(ProbeOutcome::TransportError("dns".into()));
            h.fire();
        }
        h.answer(ProbeOutcome::TransportError("dns".into()));

        assert_eq!(h.retry_probe_count(), 6);
        assert_eq!(h.machine.state(), ConnectionState::Failed);
        assert_eq!(h.signals.last(), Some(&RetrySignal::Exhausted));
    }

    #[test]
    fn monitoring_transport_error_keeps_monitoring() {
        let mut h = Harness::new(RECONNECT);
        h.start();
        h.fire();
        h.answer(ProbeOutcome::TransportError("timeout".into()));

        assert_eq!(h.machine.state(), ConnectionState::Monitoring);
        assert_eq!(h.armed, [ConnectionTimer::Monitor]);
    }

    #[test]
    fn tick_without_instance_does_not_probe() {
        let mut machine = ReconnectMachine::default();
        machine.start();
        let actions = machine.on_timer(ConnectionTimer::Monitor, None);

        assert!(!actions.iter().any(|a| matches!(a, Action::Probe { .. })));
        assert_eq!(machine.armed_timer(), Some(ConnectionTimer::Monitor));
    }

    #[test]
    fn overlapping_ticks_issue_one_probe() {
        let mut h = Harness::new(RECONNECT);
        h.start();
        h.fire();
        h.fire();
        assert_eq!(h.probes.len(), 1);
    }

    #[test]
    fn manual_reconnect_discards_in_flight_retry() {
        let mut h = Harness::new(RECONNECT);
        h.degrade();
        let (stale, _) = h.probes.last().cloned().unwrap();

        let actions = h.machine.reconnect();
        h.apply(actions);
        assert_eq!(h.reinits, 1);

        let late = h
            .machine
            .on_probe(stale, ProbeOutcome::Status(200), RECONNECT);
        assert!(late.is_empty());

        let actions = h.machine.window_reinitialized();
        h.apply(actions);
        assert_eq!(h.machine.state(), ConnectionState::Monitoring);
    }

    #[test]
    fn failed_is_left_only_by_manual_reconnect() {
        let mut h = Harness::new(RECONNECT);
        h.degrade();
        for _ in 0..5 {
            h.answer(ProbeOutcome::Status(503));
            h.fire();
        }
        h.answer(ProbeOutcome::Status(503));
        assert_eq!(h.machine.state(), ConnectionState::Failed);

        let stale = h.machine.on_timer(ConnectionTimer::Monitor, Some(URL));
        assert!(stale.is_empty());

        let actions = h.machine.reconnect();
        h.apply(actions);
        let actions = h.machine.window_reinitialized();
        h.apply(actions);
        assert_eq!(h.machine.state(), ConnectionState::Monitoring);
    }

    #[test]
    fn instance_switch_during_retry_recovers() {
        let mut h = Harness::new(RECONNECT);
        h.degrade();
        h.answer(ProbeOutcome::Status(503));
        assert_eq!(h.armed.len(), 1);

        let actions = h.machine.instance_switched();
        h.apply(actions);

        assert!(h.armed.is_empty());
        assert_eq!(h.reinits, 1);
        assert_eq!(h.machine.state(), ConnectionState::Recovered);
    }

    #[test]
    fn instance_switch_while_healthy_is_ignored() {
        let mut machine = ReconnectMachine::default();
        machine.start();
        assert!(machine.instance_switched().is_empty());
    }

    #[test]
    fn stop_cancels_everything() {
        let mut h = Harness::new(RECONNECT);
        h.degrade();
        h.answer(ProbeOutcome::Status(503));

        let actions = h.machine.stop();
        h.apply(actions);

        assert!(h.armed.is_empty());
        assert_eq!(h.machine.state(), ConnectionState::Idle);
        assert!(h.machine.retry_attempt().is_none());
    }

    #[test]
    fn stale_retry_delay_is_ignored_after_stop() {
        let mut machine = ReconnectMachine::default();
        let actions = machine.stop();
        assert!(actions.is_empty());
        let actions = machine.on_timer(ConnectionTimer::RetryDelay { session: 0 }, Some(URL));
        assert!(actions.is_empty());
    }

    #[test]
    fn instance_change_discards_in_flight_monitor_result() {
        let mut h = Harness::new(RECONNECT);
        h.start();
        h.fire();
        let (old, _) = h.probes.last().cloned().unwrap();

        let actions = h.machine.instance_changed();
        h.apply(actions);
        assert_eq!(h.armed, [ConnectionTimer::Monitor]);

        let late = h
            .machine
            .on_probe(old, ProbeOutcome::Status(503), RECONNECT);
        assert!(late.is_empty());
        assert_eq!(h.machine.state(), ConnectionState::Monitoring);
        assert_eq!(h.errors_shown, 0);
    }

    #[test]
    fn old_monitor_result_does_not_answer_newer_check() {
        let mut h = Harness::new(RECONNECT);
        h.start();
        h.fire();
        let (old, _) = h.probes.last().cloned().unwrap();
        let actions = h.machine.instance_changed();
        h.apply(actions);
        h.fire();
        assert_eq!(h.probes.len(), 2);

        let late = h
            .machine
            .on_probe(old, ProbeOutcome::Status(503), RECONNECT);
        assert!(late.is_empty());

        h.answer(ProbeOutcome::Status(503));
        assert_eq!(h.machine.state(), ConnectionState::Retrying { attempt: 0 });
    }

    #[test]
    fn instance_change_while_degraded_recovers() {
        let mut h = Harness::new(RecoveryPolicy::default());
        h.degrade();
        assert_eq!(h.machine.state(), ConnectionState::Degraded);

        let actions = h.machine.instance_changed();
        h.apply(actions);

        assert_eq!(h.reinits, 1);
        assert_eq!(h.signals, [RetrySignal::Recovered]);
    }

    #[test]
    fn start_twice_arms_once() {
        let mut machine = ReconnectMachine::default();
        assert_eq!(machine.start().len(), 1);
        assert!(machine.start().is_empty());
    }
}
