//! Main analysis pipeline
//!
//! Loads the exported CI records of whitelisted runs, then writes the detail,
//! speedup, combined and summary reports followed by the error-bar charts.

use crate::analysis::{baseline_mean, combined_rows, detail_rows, speedup_rows, summary_rows};
use crate::charts::{build_errorbar_charts, job_total_errorbar_charts, render_all};
use crate::config::{InputPaths, OutputPaths, ReportConfig};
use crate::loader::{check_inputs, load_build_rows, load_job_totals, read_records, LoadOutcome, LoadStats};
use crate::report::{write_combined, write_detail, write_speedup, write_summary};
use crate::selection::{read_selection, Whitelist};
use nixcache_common::{Result, BUILD_STEP_NAME};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Knobs shared by both pipelines
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    /// Step whose duration is measured
    pub build_step_name: String,
    /// Render figures after the CSV reports
    pub charts: bool,
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            build_step_name: BUILD_STEP_NAME.to_string(),
            charts: true,
            chart_width: 1500,
            chart_height: 600,
        }
    }
}

impl AnalysisOptions {
    pub fn from_config(config: &ReportConfig) -> Self {
        Self {
            build_step_name: config.build_step_name.clone(),
            charts: true,
            chart_width: config.chart_width,
            chart_height: config.chart_height,
        }
    }
}

/// What a pipeline run produced
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub stats: LoadStats,
    /// Every report and figure written, in write order
    pub written: Vec<PathBuf>,
    pub figures: usize,
}

impl PipelineReport {
    pub(crate) fn record(&mut self, path: &Path) {
        self.written.push(path.to_path_buf());
    }

    pub(crate) fn record_figures(&mut self, figures: Vec<PathBuf>) {
        self.figures += figures.len();
        self.written.extend(figures);
    }
}

/// Run the whitelist-driven analysis.
///
/// Fails before reading anything when any of the four inputs is missing.
pub fn run_analysis(
    inputs: &InputPaths,
    outputs: &OutputPaths,
    options: &AnalysisOptions,
) -> Result<PipelineReport> {
    check_inputs(
        &inputs.dir,
        &[&inputs.runs, &inputs.jobs, &inputs.steps, &inputs.selection],
    )?;

    let whitelist = Whitelist::new(&read_selection(&inputs.selection)?);
    if whitelist.is_empty() {
        warn!("{} lists no runs; reports will be empty", inputs.selection.display());
    } else {
        info!("Whitelist contains {} runs", whitelist.len());
    }

    let steps = read_records(&inputs.steps)?;
    let runs = read_records(&inputs.runs)?;
    let LoadOutcome { rows, stats } =
        load_build_rows(&steps, &runs, &whitelist, &options.build_step_name);
    stats.log();
    let totals = load_job_totals(&inputs.jobs)?;

    let mut report = PipelineReport {
        stats,
        ..Default::default()
    };

    write_detail(&detail_rows(&rows), &outputs.detail)?;
    report.record(&outputs.detail);

    let speedups = speedup_rows(&rows, |job| baseline_mean(&rows, job));
    write_speedup(&speedups, &outputs.speedup)?;
    report.record(&outputs.speedup);

    write_combined(&combined_rows(&rows, &totals), &outputs.combined)?;
    report.record(&outputs.combined);

    let summary = summary_rows(&rows, &totals);
    write_summary(&summary, &outputs.summary)?;
    report.record(&outputs.summary);

    if options.charts {
        let mut charts = build_errorbar_charts(&summary);
        charts.extend(job_total_errorbar_charts(&rows, &totals));
        report.record_figures(render_all(
            &charts,
            &outputs.fig_dir,
            options.chart_width,
            options.chart_height,
        ));
    }

    info!(
        "Analysis complete: {} build rows, {} files written",
        rows.len(),
        report.written.len()
    );
    Ok(report)
}
