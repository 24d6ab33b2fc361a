use std::time::{Duration, Instant};

/// Snapshot of the look-away bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttentionState {
    pub looking_away: bool,
    pub look_away_start: Option<Instant>,
    pub penalty_active: bool,
}

/// What one verdict did to the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerUpdate {
    /// Attention is on screen. `penalty_ended` is set only when a penalty was running.
    Focused { penalty_ended: bool },
    /// Continuously away for `elapsed`. `penalty_started` marks the activating sample.
    Away {
        elapsed: Duration,
        penalty_started: bool,
    },
}

/// Tracks how long the user has been continuously looking away.
///
/// Once the limit is exceeded the penalty stays active for the rest of the
/// look-away episode and only a focused verdict clears it.
pub struct AttentionTimer {
    limit: Duration,
    state: AttentionState,
}

impl AttentionTimer {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            state: AttentionState::default(),
        }
    }

    pub fn state(&self) -> AttentionState {
        self.state
    }

    pub fn penalty_active(&self) -> bool {
        self.state.penalty_active
    }

    pub fn update(&mut self, focused: bool, now: Instant) -> TimerUpdate {
        if focused {
            let penalty_ended = self.state.penalty_active;
            self.state = AttentionState::default();
            return TimerUpdate::Focused { penalty_ended };
        }

        let start = *self.state.look_away_start.get_or_insert(now);
        self.state.looking_away = true;

        let elapsed = now.saturating_duration_since(start);
        let penalty_started = !self.state.penalty_active && elapsed > self.limit;
        if penalty_started {
            self.state.penalty_active = true;
        }

        TimerUpdate::Away {
            elapsed,
            penalty_started,
        }
    }
}

impl TimerUpdate {
    /// Suffix appended to the status label while looking away.
    pub fn label_suffix(&self) -> Option<String> {
        match self {
            TimerUpdate::Away { elapsed, .. } => Some(format!(" | {:.1}s", elapsed.as_secs_f64())),
            TimerUpdate::Focused { .. } => None,
        }
    }
}
