//! Decoy traffic engine.
//!
//! Every connection gets its own engine: a spawned task that drives a
//! [`DecoySession`] on a randomized schedule and pushes the resulting
//! telemetry into the connection's outbound queue. The engine knows
//! nothing about handshakes or relaying; it only simulates a plausible
//! analytics feed until told to stop.
//!
//! Two connection-scoped timers drive it:
//!
//! 1. A self-rescheduling tick (fast while Active, slow while Idle).
//! 2. An independent session-expiry timer armed on login, which forces
//!    the session back to Idle after 15–35 seconds.
//!
//! Both are cancelled together when the engine is stopped or when the
//! outbound queue closes (socket gone).

mod events;
mod session;

pub use events::{greeting, Envelope, EventKind};
pub use session::{DecoySession, SessionState, TickOutcome};

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;

/// Placeholder deadline for the unarmed expiry timer.
const UNARMED: Duration = Duration::from_secs(24 * 60 * 60);

enum Command {
    /// Override the delay of the next tick only.
    DeferNextTick(Duration),
}

/// Handle to a per-connection decoy task.
///
/// Dropping the handle stops the engine, so a connection that unwinds on
/// error can never leak a ticking timer.
pub struct DecoyEngine {
    ctrl: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl DecoyEngine {
    /// Spawn the engine for one connection.
    ///
    /// The first tick fires with zero delay so an observer sees feed
    /// traffic immediately. Emissions go through `out`; when the channel
    /// closes the engine self-cancels.
    pub fn spawn(out: mpsc::Sender<Message>) -> Self {
        let (ctrl, ctrl_rx) = mpsc::channel(4);
        let task = tokio::spawn(run(out, ctrl_rx));
        Self { ctrl, task }
    }

    /// Override the delay of the next tick only; subsequent ticks resume
    /// the state-dependent cadence. Used to taper emission during the
    /// handshake handoff.
    pub fn defer_next_tick(&self, delay: Duration) {
        let _ = self.ctrl.try_send(Command::DeferNextTick(delay));
    }

    /// Cancel both pending timers and stop the engine.
    ///
    /// Idempotent and safe from any state; nothing is emitted after this
    /// returns, even if a timer was already pending.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for DecoyEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(out: mpsc::Sender<Message>, mut ctrl: mpsc::Receiver<Command>) {
    let mut session = DecoySession::new(&mut rand::thread_rng());
    tracing::debug!(user_id = session.user_id(), "decoy session started");

    let tick = time::sleep(Duration::ZERO);
    tokio::pin!(tick);
    let expiry = time::sleep(UNARMED);
    tokio::pin!(expiry);
    let mut expiry_armed = false;

    loop {
        tokio::select! {
            cmd = ctrl.recv() => match cmd {
                Some(Command::DeferNextTick(delay)) => {
                    tick.as_mut().reset(Instant::now() + delay);
                }
                None => break,
            },
            _ = expiry.as_mut(), if expiry_armed => {
                expiry_armed = false;
                let envelope = session.expire(&mut rand::thread_rng());
                if !emit(&out, &envelope).await {
                    break;
                }
            }
            _ = tick.as_mut() => {
                let outcome = session.tick(&mut rand::thread_rng());
                if outcome.session_started {
                    let length = DecoySession::session_length(&mut rand::thread_rng());
                    expiry.as_mut().reset(Instant::now() + length);
                    expiry_armed = true;
                }
                if !emit(&out, &outcome.envelope).await {
                    break;
                }
                let delay = session.next_tick_delay(&mut rand::thread_rng());
                tick.as_mut().reset(Instant::now() + delay);
            }
        }
    }
}

/// Returns false when the connection's outbound queue is gone.
async fn emit(out: &mpsc::Sender<Message>, envelope: &Envelope) -> bool {
    out.send(Message::Text(envelope.to_json())).await.is_ok()
}
