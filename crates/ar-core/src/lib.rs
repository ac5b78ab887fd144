//! Core domain logic for the activity range analyzer.
//!
//! This crate contains the pure pipeline stages:
//! - Normalization: raw store rows into canonical, categorized events
//! - Statistics: totals, streaks, switch counts, peak windows
//! - Serialization: the XML document fed to the generation service
//! - Prompts: the free-text and calendar-object prompt variants
//!
//! Everything here is side-effect free; fetching events, running git, and
//! calling the generation service live in the outer crates.

pub mod commit;
pub mod event;
pub mod format;
pub mod prompt;
pub mod range;
pub mod stats;
pub mod xml;

pub use commit::{Change, CommitRecord, FileSnapshot, SnapshotBounds, build_commit_events, snapshot_plan};
pub use event::{Category, CategoryRules, NormalizedEvent, RawEvent, SourceType, normalize_event};
pub use format::{ReportClock, format_duration};
pub use prompt::{PromptInput, build_analysis_prompt, build_calendar_prompt, build_human_summary};
pub use range::{format_range_label, parse_date_input};
pub use stats::{LocalDevRules, Stats, compute_stats};
pub use xml::build_activity_document;
