// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod flag;
pub mod geo;
pub mod ingest;
pub mod item;
pub mod merge;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod state;

// ---- Re-exports for stable public API ----
pub use crate::config::MonitorConfig;
pub use crate::error::{Error, Result};
pub use crate::flag::apply_flags;
pub use crate::geo::{is_in_scope, GeoConfig, GeoMatcher};
pub use crate::ingest::types::{RawRecord, RecordShape, SourceAdapter};
pub use crate::item::{Category, Item, SourceKind};
pub use crate::merge::merge;
pub use crate::normalize::normalize;
pub use crate::pipeline::{run, RunOptions, RunOutcome};
pub use crate::report::{HtmlReport, ReportInput, ReportRenderer};
pub use crate::state::{FileStateStore, MemoryStateStore, PersistedState, StateStore};
