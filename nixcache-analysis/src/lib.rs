//! Nix cache benchmark analysis
//!
//! This crate turns CI run/job/step timing exports into comparisons between
//! build cache tools. It includes:
//! - CSV loading and job-name classification
//! - Run selection (whitelist or fixed run numbers)
//! - Aggregation: cycle indices, baselines, speedups and group statistics
//! - CSV reports and bar charts

pub mod analysis;
pub mod charts;
pub mod classifier;
pub mod config;
pub mod loader;
pub mod pipeline;
pub mod preliminary;
pub mod report;
pub mod selection;
pub mod utils;

use nixcache_common::{Phase, RunNumber, Tool};

/// One observed execution of the build step
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRow {
    pub run_id: String,
    pub run_number: RunNumber,
    /// Job identifier exactly as exported
    pub job_name_raw: String,
    /// Friendly label, e.g. `zenn_build`
    pub job_name: String,
    pub target: String,
    pub tool: Tool,
    pub phase: Phase,
    /// Always strictly positive
    pub duration_s: f64,
}

/// A whitelisted run. Only `run_id` takes part in filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedEntry {
    pub run_id: String,
    pub run_number: Option<RunNumber>,
    pub note: String,
}

pub use analysis::{CombinedRow, DetailRow, SpeedupRow, SummaryRow};
pub use config::{ConfigSource, InputPaths, OutputPaths, ReportConfig};
pub use loader::{JobTotals, LoadOutcome, LoadStats};
pub use pipeline::{run_analysis, AnalysisOptions, PipelineReport};
pub use preliminary::{detect_run_tools, run_preliminary, TrialPhase, TrialRow};
pub use selection::{RunSelector, TargetRuns, Whitelist};
