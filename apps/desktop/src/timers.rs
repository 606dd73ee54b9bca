//! Deadlines for the coordinator loop.
//!
//! The connection timer is a single slot, so arming it replaces whatever
//! was armed. Window timers are keyed by kind: re-arming a kind pushes its
//! deadline out, which gives the resize debounce and the hover checks
//! their restart-on-activity behaviour.

use std::mem::discriminant;

use hassdesk_connection::ConnectionTimer;
use hassdesk_window::{TimerRequest, WindowTimer};
use tokio::time::Instant;

/// A timer whose deadline has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    Connection(ConnectionTimer),
    Window(WindowTimer),
}

#[derive(Debug, Default)]
pub struct Timers {
    connection: Option<(Instant, ConnectionTimer)>,
    window: Vec<(Instant, WindowTimer)>,
}

impl Timers {
    pub fn arm_connection(&mut self, timer: ConnectionTimer, at: Instant) {
        self.connection = Some((at, timer));
    }

    pub fn cancel_connection(&mut self) {
        self.connection = None;
    }

    /// The armed connection timer, if any.
    pub fn connection(&self) -> Option<ConnectionTimer> {
        self.connection.map(|(_, t)| t)
    }

    pub fn schedule_window(&mut self, request: TimerRequest, now: Instant) {
        let kind = discriminant(&request.timer);
        self.window.retain(|(_, t)| discriminant(t) != kind);
        self.window.push((now + request.after, request.timer));
    }

    pub fn clear_window(&mut self) {
        self.window.clear();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.connection
            .iter()
            .map(|(at, _)| *at)
            .chain(self.window.iter().map(|(at, _)| *at))
            .min()
    }

    /// Removes and returns every timer due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<Due> {
        let mut due: Vec<(Instant, Due)> = Vec::new();

        if let Some((at, timer)) = self.connection
            && at <= now
        {
            self.connection = None;
            due.push((at, Due::Connection(timer)));
        }

        self.window.retain(|(at, timer)| {
            if *at <= now {
                due.push((*at, Due::Window(*timer)));
                false
            } else {
                true
            }
        });

        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, d)| d).collect()
    }
}
