//! Intervention levels and the score → level table.
//!
//! Levels are cumulative: entering a level re-affirms every lower level's
//! effect. The table is the single source of truth for thresholds and for
//! which held resources each level needs.

use serde::{Deserialize, Serialize};

/// Escalation tier derived from the violation score.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionLevel {
    /// Notification only.
    Warn,
    /// Audible alert at forced volume.
    Alert,
    /// Alphanumeric keystrokes are delayed.
    InputDelay,
    /// Full-screen desaturation.
    Grayscale,
    /// Pointer movement is amplified and inverted.
    PointerInvert,
    /// Session lock after a grace delay.
    Lock,
    /// Forced power-off after a grace delay.
    Shutdown,
}

impl InterventionLevel {
    /// Short label for logs and the CLI.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Alert => "alert",
            Self::InputDelay => "input-delay",
            Self::Grayscale => "grayscale",
            Self::PointerInvert => "pointer-invert",
            Self::Lock => "lock",
            Self::Shutdown => "shutdown",
        }
    }

    /// Whether the level ends the current cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Lock | Self::Shutdown)
    }
}

impl std::fmt::Display for InterventionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Session resources that stay held across cycles.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Low-level keyboard interception.
    InputHook,
    /// Compositor color transform.
    ColorFilter,
    /// Pointer polling task and its expiry timer.
    PointerInversion,
}

impl Resource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::InputHook => "input hook",
            Self::ColorFilter => "color filter",
            Self::PointerInversion => "pointer inversion",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of the escalation table.
#[derive(Debug, Clone, Copy)]
pub struct LevelSpec {
    /// Lowest score (inclusive) at which this level applies.
    pub min_score: u32,
    pub level: InterventionLevel,
    /// Resources this level holds in addition to those of lower levels.
    pub resources: &'static [Resource],
}

/// Ascending escalation table. Bands: [0,30] warn, (30,60] alert,
/// (60,100] input delay, (100,150] grayscale, (150,200] pointer inversion,
/// (200,250] lock, above 250 shutdown.
pub const LEVEL_TABLE: &[LevelSpec] = &[
    LevelSpec {
        min_score: 0,
        level: InterventionLevel::Warn,
        resources: &[],
    },
    LevelSpec {
        min_score: 31,
        level: InterventionLevel::Alert,
        resources: &[],
    },
    LevelSpec {
        min_score: 61,
        level: InterventionLevel::InputDelay,
        resources: &[Resource::InputHook],
    },
    LevelSpec {
        min_score: 101,
        level: InterventionLevel::Grayscale,
        resources: &[Resource::ColorFilter],
    },
    LevelSpec {
        min_score: 151,
        level: InterventionLevel::PointerInvert,
        resources: &[Resource::PointerInversion],
    },
    LevelSpec {
        min_score: 201,
        level: InterventionLevel::Lock,
        resources: &[],
    },
    LevelSpec {
        min_score: 251,
        level: InterventionLevel::Shutdown,
        resources: &[],
    },
];

/// Resolve the level for a score: the highest row whose threshold is met.
pub fn level_for(score: u32) -> InterventionLevel {
    LEVEL_TABLE
        .iter()
        .rev()
        .find(|spec| score >= spec.min_score)
        .map_or(InterventionLevel::Warn, |spec| spec.level)
}

/// Every resource required at `level`, in acquisition order.
pub fn required_resources(level: InterventionLevel) -> Vec<Resource> {
    LEVEL_TABLE
        .iter()
        .filter(|spec| spec.level <= level)
        .flat_map(|spec| spec.resources.iter().copied())
        .collect()
}

/// Table row for a level.
pub fn spec_for(level: InterventionLevel) -> Option<&'static LevelSpec> {
    LEVEL_TABLE.iter().find(|spec| spec.level == level)
}
