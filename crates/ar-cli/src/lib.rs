//! Activity range analyzer CLI library.
//!
//! This crate wires the pure pipeline in `ar-core` to its collaborators:
//! the event store, the git commit collector, the generation service, and
//! the calendar.

pub mod analysis;
pub mod calendar;
mod cli;
pub mod commands;
mod config;
pub mod git;
pub mod persist;
pub mod scheduler;

pub use cli::{AnalyzeArgs, Cli, Commands, ScheduleArgs};
pub use config::{CalendarConfig, Config, GitConfig, LlmSettings, ReportConfig};
