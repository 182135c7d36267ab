//! Violation score tracking.

use crate::level::{InterventionLevel, level_for};

/// Points added for each violating verdict.
pub const VIOLATION_INCREMENT: u32 = 30;

/// Points removed for each compliant verdict.
pub const COMPLIANCE_DECREMENT: u32 = 5;

/// Result of feeding one verdict to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreUpdate {
    pub previous: u32,
    pub current: u32,
    /// True only on the transition from a positive score into zero.
    pub reached_zero: bool,
}

impl ScoreUpdate {
    pub fn level(&self) -> InterventionLevel {
        level_for(self.current)
    }

    pub fn level_changed(&self) -> bool {
        level_for(self.previous) != level_for(self.current)
    }
}

/// Process-wide score for the active monitoring session.
#[derive(Debug, Default, Clone)]
pub struct ScoreTracker {
    score: u32,
}

impl ScoreTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a non-zero baseline.
    pub fn with_score(score: u32) -> Self {
        Self { score }
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn level(&self) -> InterventionLevel {
        level_for(self.score)
    }

    pub fn update(&mut self, is_violation: bool) -> ScoreUpdate {
        let previous = self.score;
        self.score = if is_violation {
            previous.saturating_add(VIOLATION_INCREMENT)
        } else {
            previous.saturating_sub(COMPLIANCE_DECREMENT)
        };
        ScoreUpdate {
            previous,
            current: self.score,
            reached_zero: previous > 0 && self.score == 0,
        }
    }

    /// Explicit user stop.
    pub fn reset(&mut self) {
        self.score = 0;
    }
}
