//! Phases of a full repair run and the transitions allowed between them.
//!
//! ```text
//! Idle -> Scanning(t) -> Repairing(t) -> Scanning(t') -> ... -> [RebuildingStats] -> Done
//! ```
//!
//! A declined pass gate moves from `Scanning(t)` straight to the next scan
//! (or to `Done`). A declined backup gate moves from `Idle` to `Done`.

use std::fmt;

use crate::error::CoreError;
use crate::target::RepairTarget;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Scanning(RepairTarget),
    Repairing(RepairTarget),
    RebuildingStats,
    Done,
}

impl RunPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning(_) => "scanning",
            Self::Repairing(_) => "repairing",
            Self::RebuildingStats => "rebuilding_stats",
            Self::Done => "done",
        }
    }

    /// Check whether moving from `self` to `next` is a legal step.
    pub fn can_advance_to(&self, next: &RunPhase) -> bool {
        use RunPhase::*;
        match (self, next) {
            (Idle, Scanning(_) | RebuildingStats | Done) => true,
            (Scanning(a), Repairing(b)) => a == b,
            (Scanning(a), Scanning(b)) => a != b,
            (Scanning(_), Done) => true,
            (Repairing(a), RebuildingStats) => a.feeds_user_stats(),
            (Repairing(a), Scanning(b)) => a != b,
            (Repairing(a), Done) => !a.feeds_user_stats(),
            (RebuildingStats, Scanning(_) | Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scanning(t) | Self::Repairing(t) => {
                write!(f, "{}({})", self.name(), t.qualified())
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Tracks the current phase and the path taken so far.
#[derive(Debug, Clone)]
pub struct RunProgress {
    current: RunPhase,
    history: Vec<RunPhase>,
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl RunProgress {
    pub fn new() -> Self {
        Self {
            current: RunPhase::Idle,
            history: vec![RunPhase::Idle],
        }
    }

    pub fn history(&self) -> &[RunPhase] {
        &self.history
    }

    /// Move to `next`, rejecting transitions the run graph does not allow.
    pub fn advance(&mut self, next: RunPhase) -> Result<(), CoreError> {
        if !self.current.can_advance_to(&next) {
            return Err(CoreError::Internal(format!(
                "Illegal run phase transition {} -> {next}",
                self.current
            )));
        }
        tracing::debug!(from = %self.current, to = %next, "Run phase changed");
        self.history.push(next.clone());
        self.current = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
