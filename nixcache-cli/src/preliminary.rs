//! `nixcache preliminary`

use crate::analyze::override_path;
use anyhow::Result;
use clap::Args;
use nixcache_analysis::config::{InputPaths, OutputPaths, ReportConfig};
use nixcache_analysis::{run_preliminary, AnalysisOptions, PipelineReport};
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub struct PreliminaryArgs {
    /// Step records export (default: <preliminary_log_dir>/actions_steps.csv)
    #[arg(long)]
    pub steps: Option<PathBuf>,

    /// Run records export
    #[arg(long)]
    pub runs: Option<PathBuf>,

    /// Job records export
    #[arg(long)]
    pub jobs: Option<PathBuf>,

    /// Detail report
    #[arg(long)]
    pub out_detail: Option<PathBuf>,

    /// Speedup report
    #[arg(long)]
    pub out_speed: Option<PathBuf>,

    /// Build vs job total report
    #[arg(long)]
    pub out_combined: Option<PathBuf>,

    /// Directory for PNG figures
    #[arg(long)]
    pub fig_dir: Option<PathBuf>,

    /// Skip figure rendering
    #[arg(long)]
    pub no_charts: bool,
}

impl PreliminaryArgs {
    pub fn resolve(&self, config: &ReportConfig) -> (InputPaths, OutputPaths) {
        let mut inputs = config.preliminary_inputs();
        let mut outputs = config.preliminary_outputs();

        override_path(&mut inputs.steps, &self.steps);
        override_path(&mut inputs.runs, &self.runs);
        override_path(&mut inputs.jobs, &self.jobs);
        override_path(&mut outputs.detail, &self.out_detail);
        override_path(&mut outputs.speedup, &self.out_speed);
        override_path(&mut outputs.combined, &self.out_combined);
        override_path(&mut outputs.fig_dir, &self.fig_dir);

        (inputs, outputs)
    }
}

pub fn handle_command(args: PreliminaryArgs, config: &ReportConfig) -> Result<PipelineReport> {
    let (inputs, outputs) = args.resolve(config);

    let mut options = AnalysisOptions::from_config(config);
    options.charts = !args.no_charts;

    Ok(run_preliminary(&inputs, &outputs, &options)?)
}
