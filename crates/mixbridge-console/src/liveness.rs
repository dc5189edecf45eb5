//! Session liveness classification and one-shot recovery bookkeeping.
//!
//! Liveness is never stored as independent truth. [`classify`] is a pure
//! function of the time since the last console reply and the time since the
//! last meter frame. [`LivenessMonitor`] records the two receipt timestamps,
//! re-runs the classification on demand, and reports a [`Transition`] only
//! when the derived state changes.
//!
//! Recovery is edge-driven: entering STALE schedules at most one recovery
//! per STALE episode. The episode guard resets only on LIVE or OFFLINE.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use mixbridge_core::events::ConsoleEvent;
use mixbridge_core::types::LivenessState;

/// Default time without any console reply before the session is OFFLINE.
pub const DEFAULT_OFFLINE_THRESHOLD: Duration = Duration::from_millis(4000);

/// Default maximum reply age for LIVE.
pub const DEFAULT_LIVE_THRESHOLD: Duration = Duration::from_millis(1500);

/// Default maximum meter-frame age for LIVE.
pub const DEFAULT_METER_LIVE_THRESHOLD: Duration = Duration::from_millis(1500);

/// Default fixed recompute cadence.
pub const DEFAULT_RECOMPUTE_INTERVAL: Duration = Duration::from_millis(250);

/// Default delay between entering STALE and the recovery attempt.
pub const DEFAULT_RECOVERY_DEBOUNCE: Duration = Duration::from_millis(250);

/// Thresholds and cadences for the liveness model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessThresholds {
    /// Reply age at or beyond which the session is OFFLINE.
    pub offline: Duration,
    /// Reply age at or below which the session may be LIVE.
    pub live: Duration,
    /// Meter-frame age at or below which the session may be LIVE.
    pub meter_live: Duration,
    /// How often the state is recomputed when no frames arrive.
    pub recompute_interval: Duration,
    /// Delay before the one-shot recovery fires.
    pub recovery_debounce: Duration,
}

impl Default for LivenessThresholds {
    fn default() -> Self {
        LivenessThresholds {
            offline: DEFAULT_OFFLINE_THRESHOLD,
            live: DEFAULT_LIVE_THRESHOLD,
            meter_live: DEFAULT_METER_LIVE_THRESHOLD,
            recompute_interval: DEFAULT_RECOMPUTE_INTERVAL,
            recovery_debounce: DEFAULT_RECOVERY_DEBOUNCE,
        }
    }
}

/// Classify session health from receipt ages.
///
/// `None` means nothing of that kind has ever been received. A session that
/// has never heard a reply is OFFLINE.
pub fn classify(
    since_reply: Option<Duration>,
    since_meter: Option<Duration>,
    thresholds: &LivenessThresholds,
) -> LivenessState {
    let Some(since_reply) = since_reply else {
        return LivenessState::Offline;
    };

    if since_reply >= thresholds.offline {
        LivenessState::Offline
    } else if since_reply <= thresholds.live
        && since_meter.is_some_and(|m| m <= thresholds.meter_live)
    {
        LivenessState::Live
    } else {
        LivenessState::Stale
    }
}

/// A change in derived liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: LivenessState,
    pub to: LivenessState,
    /// Entered STALE with no recovery yet attempted this episode.
    pub schedule_recovery: bool,
    /// Left STALE; any pending recovery must be canceled.
    pub cancel_recovery: bool,
}

/// Milliseconds since the Unix epoch, for client-facing timestamps.
fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Receipt timestamps plus the last broadcast state.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    thresholds: LivenessThresholds,
    state: LivenessState,
    last_reply: Option<Instant>,
    last_meter: Option<Instant>,
    last_reply_wall_ms: Option<u64>,
    last_meter_wall_ms: Option<u64>,
    recovery_attempted: bool,
}

impl LivenessMonitor {
    /// A monitor that has received nothing yet (OFFLINE).
    pub fn new(thresholds: LivenessThresholds) -> Self {
        LivenessMonitor {
            thresholds,
            state: LivenessState::Offline,
            last_reply: None,
            last_meter: None,
            last_reply_wall_ms: None,
            last_meter_wall_ms: None,
            recovery_attempted: false,
        }
    }

    pub fn thresholds(&self) -> &LivenessThresholds {
        &self.thresholds
    }

    /// State as of the last [`evaluate`](Self::evaluate).
    pub fn state(&self) -> LivenessState {
        self.state
    }

    /// Record a successfully decoded console reply of any kind.
    pub fn note_reply(&mut self, at: Instant) {
        self.last_reply = Some(at);
        self.last_reply_wall_ms = Some(wall_clock_ms());
    }

    /// Record a successfully decoded meter frame. A meter frame is also a
    /// console reply.
    pub fn note_meter(&mut self, at: Instant) {
        self.note_reply(at);
        self.last_meter = Some(at);
        self.last_meter_wall_ms = self.last_reply_wall_ms;
    }

    /// Classify as of `now` without changing anything.
    pub fn classify_at(&self, now: Instant) -> LivenessState {
        classify(
            self.last_reply.map(|t| now.saturating_duration_since(t)),
            self.last_meter.map(|t| now.saturating_duration_since(t)),
            &self.thresholds,
        )
    }

    /// Recompute the state. Returns a transition only if it changed.
    pub fn evaluate(&mut self, now: Instant) -> Option<Transition> {
        let next = self.classify_at(now);
        if next == self.state {
            return None;
        }

        let from = self.state;
        self.state = next;

        let schedule_recovery = next == LivenessState::Stale && !self.recovery_attempted;
        if schedule_recovery {
            self.recovery_attempted = true;
        }
        if next != LivenessState::Stale {
            self.recovery_attempted = false;
        }

        tracing::info!(from = %from, to = %next, "Liveness changed");

        Some(Transition {
            from,
            to: next,
            schedule_recovery,
            cancel_recovery: from == LivenessState::Stale,
        })
    }

    /// Whether a recovery scheduled earlier should still run.
    pub fn recovery_still_wanted(&self) -> bool {
        self.state == LivenessState::Stale
    }

    /// The client-facing event describing the current state.
    pub fn event(&self) -> ConsoleEvent {
        ConsoleEvent::LivenessChanged {
            state: self.state,
            last_console_reply_at: self.last_reply_wall_ms,
            last_meter_frame_at: self.last_meter_wall_ms,
        }
    }
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        LivenessMonitor::new(LivenessThresholds::default())
    }
}
