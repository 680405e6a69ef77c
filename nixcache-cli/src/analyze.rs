//! `nixcache analyze`

use anyhow::Result;
use clap::Args;
use nixcache_analysis::config::{InputPaths, OutputPaths, ReportConfig};
use nixcache_analysis::{run_analysis, AnalysisOptions, PipelineReport};
use std::path::PathBuf;
use tracing::debug;

#[derive(Args, Debug, Default)]
pub struct AnalyzeArgs {
    /// Step records export (default: <log_dir>/actions_steps.csv)
    #[arg(long)]
    pub steps: Option<PathBuf>,

    /// Run records export
    #[arg(long)]
    pub runs: Option<PathBuf>,

    /// Job records export
    #[arg(long)]
    pub jobs: Option<PathBuf>,

    /// Whitelist of run ids to include
    #[arg(long)]
    pub selection_csv: Option<PathBuf>,

    /// Detail report (default: <result_dir>/detail.csv)
    #[arg(long)]
    pub out_detail: Option<PathBuf>,

    /// Speedup report
    #[arg(long)]
    pub out_speed: Option<PathBuf>,

    /// Build vs job total report
    #[arg(long)]
    pub out_combined: Option<PathBuf>,

    /// Per-configuration summary
    #[arg(long)]
    pub out_summary: Option<PathBuf>,

    /// Directory for PNG figures
    #[arg(long)]
    pub fig_dir: Option<PathBuf>,

    /// Skip figure rendering
    #[arg(long)]
    pub no_charts: bool,
}

impl AnalyzeArgs {
    /// Configured locations with command line overrides applied
    pub fn resolve(&self, config: &ReportConfig) -> (InputPaths, OutputPaths) {
        let mut inputs = config.inputs();
        let mut outputs = config.outputs();

        override_path(&mut inputs.steps, &self.steps);
        override_path(&mut inputs.runs, &self.runs);
        override_path(&mut inputs.jobs, &self.jobs);
        override_path(&mut inputs.selection, &self.selection_csv);
        override_path(&mut outputs.detail, &self.out_detail);
        override_path(&mut outputs.speedup, &self.out_speed);
        override_path(&mut outputs.combined, &self.out_combined);
        override_path(&mut outputs.summary, &self.out_summary);
        override_path(&mut outputs.fig_dir, &self.fig_dir);

        (inputs, outputs)
    }
}

pub(crate) fn override_path(target: &mut PathBuf, value: &Option<PathBuf>) {
    if let Some(path) = value {
        *target = path.clone();
    }
}

pub fn handle_command(args: AnalyzeArgs, config: &ReportConfig) -> Result<PipelineReport> {
    let (inputs, outputs) = args.resolve(config);
    debug!("Analyze inputs: {:?}", inputs);

    let mut options = AnalysisOptions::from_config(config);
    options.charts = !args.no_charts;

    let report = run_analysis(&inputs, &outputs, &options)?;
    Ok(report)
}
