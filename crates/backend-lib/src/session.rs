// ============================
// crates/backend-lib/src/session.rs
// ============================
//! Meeting session controller.
//!
//! One tokio task per meeting-page visit drives the whole lifecycle:
//! checking access, polling while too early, acquiring a credential,
//! counting down to the end of the window, and landing in a terminal phase.
//! All transitions happen inside the one task, so there is never a
//! concurrent writer of controller state and a torn-down task can never
//! apply a stale response. Entering a phase drops the previous phase's
//! timers before starting its own.
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use meetgate_common::{ending_soon_window, late_expiry, AccessDecision, AccessOutcome};
use crate::error::AppError;
use crate::gate::AccessGate;
use crate::metrics::{SESSION_ENDING_SOON, SESSION_PHASE};
use crate::store::BookingStore;
use crate::token::{issue_checked, TokenIssuer};

/// Poll cadence while more than a minute from start.
const SLOW_POLL_SECS: u64 = 5;
/// Poll cadence inside the final minute.
const FAST_POLL_SECS: u64 = 1;

/// Lifecycle phase of one meeting-page visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Checking,
    WaitingTooEarly { scheduled_start: DateTime<Utc> },
    Denied { reason: String },
    TokenPending,
    InSession,
    EndingSoon,
    Ended,
}

impl Phase {
    fn label(&self) -> &'static str {
        match self {
            Phase::Checking => "checking",
            Phase::WaitingTooEarly { .. } => "waiting_too_early",
            Phase::Denied { .. } => "denied",
            Phase::TokenPending => "token_pending",
            Phase::InSession => "in_session",
            Phase::EndingSoon => "ending_soon",
            Phase::Ended => "ended",
        }
    }
}

/// Events surfaced to whatever is rendering the meeting page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PhaseChanged(Phase),
    /// Human-readable time-to-start, recomputed every second while waiting.
    Countdown(String),
    /// One-shot warning that the window closes soon. Fires exactly once per
    /// visit, on the crossing, never again on later ticks.
    EndingSoon { remaining_secs: i64 },
    CredentialReady(String),
    Ended,
}

/// Clock seam so tests can drive the controller through virtual time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock UTC.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The two calls the controller makes against the backend. In production
/// this is the gate and issuer in-process; tests substitute a scripted fake.
#[async_trait]
pub trait AccessClient: Send + Sync + 'static {
    async fn check_access(&self, room_key: &str) -> Result<AccessDecision, AppError>;
    async fn issue_token(&self, room_key: &str, identity: &str) -> Result<String, AppError>;
}

/// Production [`AccessClient`] that evaluates the gate and issuer directly.
#[derive(Clone)]
pub struct DirectAccessClient<S> {
    gate: AccessGate<S>,
    issuer: Arc<TokenIssuer>,
}

impl<S: BookingStore> DirectAccessClient<S> {
    pub fn new(gate: AccessGate<S>, issuer: Arc<TokenIssuer>) -> Self {
        DirectAccessClient { gate, issuer }
    }
}

#[async_trait]
impl<S: BookingStore + Clone + 'static> AccessClient for DirectAccessClient<S> {
    async fn check_access(&self, room_key: &str) -> Result<AccessDecision, AppError> {
        self.gate.evaluate(room_key, Utc::now()).await
    }

    async fn issue_token(&self, room_key: &str, identity: &str) -> Result<String, AppError> {
        issue_checked(&self.gate, &self.issuer, room_key, identity, Utc::now()).await
    }
}

/// Adaptive gate-poll cadence while waiting for the window to open.
pub fn poll_interval(time_to_start: Duration) -> std::time::Duration {
    if time_to_start > Duration::seconds(60) {
        std::time::Duration::from_secs(SLOW_POLL_SECS)
    } else {
        std::time::Duration::from_secs(FAST_POLL_SECS)
    }
}

/// Decompose remaining time into `Xh Ym Zs`, omitting zero-valued leading
/// units. Seconds are always shown. Non-positive remainders render as the
/// literal "Starting now".
pub fn format_countdown(remaining: Duration) -> String {
    if remaining <= Duration::zero() {
        return "Starting now".to_string();
    }
    let total_secs = remaining.num_seconds();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || hours > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}

/// Handle kept by the component driving the meeting page: event stream in,
/// shutdown signal out. Dropping the handle or sending shutdown tears the
/// visit down; pending timers die with the task.
pub struct SessionHandle {
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    shutdown_tx: mpsc::UnboundedSender<()>,
    pub task: JoinHandle<()>,
}

impl SessionHandle {
    /// Signal the controller task to stop. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

struct SessionController<A, C> {
    room_key: Option<String>,
    access: A,
    clock: C,
    events: mpsc::UnboundedSender<SessionEvent>,
    phase: Phase,
    scheduled_start: Option<DateTime<Utc>>,
    credential: Option<String>,
    ending_warned: bool,
}

impl<A: AccessClient, C: Clock> SessionController<A, C> {
    fn new(
        room_key: Option<String>,
        access: A,
        clock: C,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        SessionController {
            room_key,
            access,
            clock,
            events,
            phase: Phase::Checking,
            scheduled_start: None,
            credential: None,
            ending_warned: false,
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        counter!(SESSION_PHASE, "phase" => phase.label()).increment(1);
        debug!(phase = phase.label(), "session phase change");
        self.phase = phase.clone();
        let _ = self.events.send(SessionEvent::PhaseChanged(phase));
    }

    fn deny(&mut self, reason: &str) {
        self.credential = None;
        self.set_phase(Phase::Denied {
            reason: reason.to_string(),
        });
    }

    async fn run(mut self, mut shutdown: mpsc::UnboundedReceiver<()>) {
        self.set_phase(Phase::Checking);

        let Some(room_key) = self.room_key.clone() else {
            self.deny("missing identifier");
            return;
        };

        match self.access.check_access(&room_key).await {
            Ok(decision) => self.apply_decision(&room_key, decision).await,
            Err(err) => {
                // Infrastructure fault: logged with its own code, surfaced
                // with the same generic copy as a denial.
                error!(code = err.error_code(), %err, "initial access check failed");
                self.deny("error fetching status");
            },
        }

        loop {
            match self.phase {
                Phase::WaitingTooEarly { .. } => {
                    if !self.wait_for_start(&room_key, &mut shutdown).await {
                        return;
                    }
                },
                Phase::InSession => {
                    self.monitor_end(&mut shutdown).await;
                    return;
                },
                // Denied / Ended are terminal for this visit.
                _ => return,
            }
        }
    }

    /// Route one gate decision into the matching phase.
    async fn apply_decision(&mut self, room_key: &str, decision: AccessDecision) {
        match decision.outcome {
            AccessOutcome::Allowed => {
                self.scheduled_start = decision.scheduled_start;
                self.acquire_credential(room_key).await;
            },
            AccessOutcome::TooEarly => match decision.scheduled_start {
                Some(start) => {
                    self.scheduled_start = Some(start);
                    self.set_phase(Phase::WaitingTooEarly {
                        scheduled_start: start,
                    });
                },
                None => self.deny("error fetching status"),
            },
            AccessOutcome::Expired => self.deny("meeting expired"),
            AccessOutcome::NotFound => self.deny("booking not found"),
        }
    }

    /// Token acquisition after an ALLOWED decision. A failure here lands in
    /// `Denied` rather than leaving the visit stuck in `TokenPending`.
    async fn acquire_credential(&mut self, room_key: &str) {
        self.set_phase(Phase::TokenPending);
        let identity = crate::token::guest_identity();
        match self.access.issue_token(room_key, &identity).await {
            Ok(token) => {
                self.credential = Some(token.clone());
                let _ = self.events.send(SessionEvent::CredentialReady(token));
                self.set_phase(Phase::InSession);
            },
            Err(err) => {
                warn!(code = err.error_code(), %err, "token acquisition failed");
                self.deny("error fetching token");
            },
        }
    }

    /// Polling loop for `WaitingTooEarly`. Returns `false` when the visit
    /// was torn down, `true` when the phase changed and the caller should
    /// re-dispatch. Polls are strictly sequential: the next one is not due
    /// until the previous response has been applied.
    async fn wait_for_start(
        &mut self,
        room_key: &str,
        shutdown: &mut mpsc::UnboundedReceiver<()>,
    ) -> bool {
        let mut ticker = interval(std::time::Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let Some(start) = self.scheduled_start else {
            self.deny("error fetching status");
            return true;
        };
        let mut next_poll = Instant::now() + poll_interval(start - self.clock.now());

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("session torn down while waiting");
                    return false;
                }
                _ = ticker.tick() => {
                    let Some(start) = self.scheduled_start else {
                        self.deny("error fetching status");
                        return true;
                    };
                    let to_start = start - self.clock.now();
                    let _ = self
                        .events
                        .send(SessionEvent::Countdown(format_countdown(to_start)));

                    if Instant::now() >= next_poll {
                        next_poll = Instant::now() + poll_interval(to_start);
                        match self.access.check_access(room_key).await {
                            Ok(decision) => {
                                if decision.outcome == AccessOutcome::TooEarly {
                                    self.maybe_reset_start(&decision);
                                } else {
                                    self.apply_decision(room_key, decision).await;
                                    return true;
                                }
                            },
                            // A failed poll never crashes the loop; the next
                            // tick retries.
                            Err(err) => {
                                warn!(code = err.error_code(), %err, "access poll failed");
                            },
                        }
                    }
                }
            }
        }
    }

    /// A later poll may report a different scheduled start; the countdown
    /// and end monitor reset against the new value.
    fn maybe_reset_start(&mut self, decision: &AccessDecision) {
        if decision.scheduled_start.is_some() && decision.scheduled_start != self.scheduled_start {
            info!(
                old = ?self.scheduled_start,
                new = ?decision.scheduled_start,
                "scheduled start changed; resetting countdown"
            );
            self.scheduled_start = decision.scheduled_start;
            self.ending_warned = false;
            if let Some(start) = decision.scheduled_start {
                self.set_phase(Phase::WaitingTooEarly {
                    scheduled_start: start,
                });
            }
        }
    }

    /// End-of-meeting monitor for `InSession`. Ticks once a second until
    /// the window closes; the ending-soon warning is edge-triggered on its
    /// first crossing.
    async fn monitor_end(&mut self, shutdown: &mut mpsc::UnboundedReceiver<()>) {
        let mut ticker = interval(std::time::Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("session torn down in-session");
                    return;
                }
                _ = ticker.tick() => {
                    let Some(start) = self.scheduled_start else {
                        self.deny("error fetching status");
                        return;
                    };
                    let remaining = (start + late_expiry()) - self.clock.now();

                    if remaining <= Duration::zero() {
                        self.credential = None;
                        self.set_phase(Phase::Ended);
                        let _ = self.events.send(SessionEvent::Ended);
                        return;
                    }

                    if !self.ending_warned && remaining <= ending_soon_window() {
                        self.ending_warned = true;
                        counter!(SESSION_ENDING_SOON).increment(1);
                        let _ = self.events.send(SessionEvent::EndingSoon {
                            remaining_secs: remaining.num_seconds(),
                        });
                        self.set_phase(Phase::EndingSoon);
                    }
                }
            }
        }
    }
}

/// Spawn a session controller for one meeting-page visit and return its
/// handle.
pub fn spawn_session_controller<A: AccessClient, C: Clock>(
    room_key: Option<String>,
    access: A,
    clock: C,
) -> SessionHandle {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

    let controller = SessionController::new(room_key, access, clock, event_tx);
    let task = tokio::spawn(controller.run(shutdown_rx));

    SessionHandle {
        events: event_rx,
        shutdown_tx,
        task,
    }
}
