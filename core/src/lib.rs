//! Screen-monitoring self-enforcement engine.
//!
//! A jittered scheduler captures the user's displays, asks a visual
//! reasoning service whether the activity follows the user's rules, and
//! escalates reversible session interventions as violations accumulate.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod analysis;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod intervention;
pub mod level;
pub mod platform;
pub mod retry;
pub mod scheduler;
pub mod score;
pub mod verdict;

pub use error::{Result, VigilError};
pub use events::{EventSink, LogLine, LogSeverity, MonitorEvent};
pub use intervention::{InterventionController, LevelOutcome};
pub use level::{InterventionLevel, Resource, level_for};
pub use scheduler::{RunStats, Scheduler, SchedulerConfig, StopReason};
pub use score::{ScoreTracker, ScoreUpdate};
pub use verdict::{Verdict, VerdictSource, classify};
