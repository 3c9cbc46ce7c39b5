use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrackerPhase {
    #[default]
    Created,
    Initializing,
    Ready,
    Starting,
    TornDown,
}

/// Lifecycle bookkeeping. `pending` counts operations still in flight; the
/// tracker only reports `Ready` once it drops back to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerState {
    pub phase: TrackerPhase,
    pub pending: usize,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operation. Refused once torn down.
    pub fn begin(&mut self, phase: TrackerPhase) -> bool {
        if self.is_torn_down() {
            return false;
        }
        self.pending += 1;
        self.phase = phase;
        true
    }

    /// Returns `true` when the phase changed.
    pub fn finish(&mut self) -> bool {
        self.pending = self.pending.saturating_sub(1);
        if self.pending == 0 && !self.is_torn_down() && self.phase != TrackerPhase::Ready {
            self.phase = TrackerPhase::Ready;
            return true;
        }
        false
    }

    /// Returns `true` only for the first call.
    pub fn tear_down(&mut self) -> bool {
        if self.is_torn_down() {
            return false;
        }
        self.phase = TrackerPhase::TornDown;
        true
    }

    pub fn is_torn_down(&self) -> bool {
        self.phase == TrackerPhase::TornDown
    }

    /// Nothing in flight, or nothing ever will be again.
    pub fn is_settled(&self) -> bool {
        matches!(self.phase, TrackerPhase::Ready | TrackerPhase::TornDown)
    }
}
