//! The simulated-user state machine behind the decoy feed.
//!
//! Pure logic, no timers: the engine drives it with tick and expiry
//! callbacks and asks it how long to wait between ticks. Keeping the
//! transitions synchronous makes the session fully unit-testable with a
//! seeded RNG.

use std::time::Duration;

use rand::Rng;

use super::events::{build_value, Envelope, EventKind};

/// Lifecycle state of a simulated user session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Between sessions; long pauses, next tick "logs in".
    Idle,
    /// Actively "browsing"; frequent ticks emit usage events.
    Active,
}

/// Tick cadence while Active.
const ACTIVE_TICK: std::ops::Range<u64> = 500..3000;
/// Tick cadence while Idle.
const IDLE_TICK: std::ops::Range<u64> = 7000..13_000;
/// How long an active session lasts before expiring back to Idle.
const SESSION_LENGTH: std::ops::Range<u64> = 15_000..35_000;

/// Result of driving one tick.
pub struct TickOutcome {
    /// The event to emit.
    pub envelope: Envelope,
    /// True when this tick transitioned Idle → Active; the caller must
    /// arm the session-expiry timer.
    pub session_started: bool,
}

/// Per-connection simulated session.
///
/// Owned exclusively by the connection's decoy engine; destroyed when the
/// socket closes or a relay is established, whichever happens first.
#[derive(Debug)]
pub struct DecoySession {
    state: SessionState,
    user_id: String,
    last_event: Option<EventKind>,
}

impl DecoySession {
    /// Create an idle session with a fresh synthetic identity.
    pub fn new<R: Rng>(rng: &mut R) -> Self {
        Self {
            state: SessionState::Idle,
            user_id: format!("user-{}", rng.gen_range(1000..10_000)),
            last_event: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The synthetic user identifier carried in login events.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Drive one tick of the simulation.
    pub fn tick<R: Rng>(&mut self, rng: &mut R) -> TickOutcome {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::Active;
                self.last_event = Some(EventKind::UserLogin);
                let value = build_value(EventKind::UserLogin, &self.user_id, rng);
                TickOutcome {
                    envelope: Envelope::new(EventKind::UserLogin, value, rng),
                    session_started: true,
                }
            }
            SessionState::Active => {
                let kind = self.pick_active_event(rng);
                self.last_event = Some(kind);
                let value = build_value(kind, &self.user_id, rng);
                TickOutcome {
                    envelope: Envelope::new(kind, value, rng),
                    session_started: false,
                }
            }
        }
    }

    /// Force the session back to Idle, emitting the session-end event.
    /// Driven by the expiry timer, independent of the tick cadence.
    pub fn expire<R: Rng>(&mut self, rng: &mut R) -> Envelope {
        self.state = SessionState::Idle;
        self.last_event = Some(EventKind::SessionEnd);
        let value = build_value(EventKind::SessionEnd, &self.user_id, rng);
        Envelope::new(EventKind::SessionEnd, value, rng)
    }

    /// Sample the delay before the next tick for the current state.
    pub fn next_tick_delay<R: Rng>(&self, rng: &mut R) -> Duration {
        let range = match self.state {
            SessionState::Active => ACTIVE_TICK,
            SessionState::Idle => IDLE_TICK,
        };
        Duration::from_millis(rng.gen_range(range))
    }

    /// Sample how long a newly started session stays active.
    pub fn session_length<R: Rng>(rng: &mut R) -> Duration {
        Duration::from_millis(rng.gen_range(SESSION_LENGTH))
    }

    /// Pick the next usage event. Page views are four times as likely
    /// immediately after a login; otherwise the three kinds are uniform.
    fn pick_active_event<R: Rng>(&self, rng: &mut R) -> EventKind {
        const AFTER_LOGIN: [EventKind; 6] = [
            EventKind::PageView,
            EventKind::PageView,
            EventKind::PageView,
            EventKind::PageView,
            EventKind::ApiLatency,
            EventKind::DbQuery,
        ];
        const STEADY: [EventKind; 3] =
            [EventKind::PageView, EventKind::ApiLatency, EventKind::DbQuery];

        if self.last_event == Some(EventKind::UserLogin) {
            AFTER_LOGIN[rng.gen_range(0..AFTER_LOGIN.len())]
        } else {
            STEADY[rng.gen_range(0..STEADY.len())]
        }
    }
}
