//! Preliminary study pipeline
//!
//! The preliminary runs predate the structured job naming, so tool and phase
//! are derived from fixed run-number tables (with a fallback on the cache
//! actions seen in each run's steps) and inclusion is limited to a fixed set
//! of run numbers.

use crate::analysis::{combined_rows, speedup_rows, Measurement};
use crate::charts::{render_all, slot_label, Chart, ChartKind, Series, ValueLabel, BLUE_BAR, ORANGE_BAR, TEAL_BAR};
use crate::config::{InputPaths, OutputPaths};
use crate::loader::{
    check_inputs, collect_build_steps, load_job_totals, map_run_numbers, read_records, JobTotals, LoadStats, Record,
};
use crate::pipeline::{AnalysisOptions, PipelineReport};
use crate::report::{write_combined, write_speedup, write_trial_detail};
use crate::selection::TargetRuns;
use crate::utils::unquote;
use nixcache_common::{Result, RunNumber, Tool};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info};

/// Runs taking part in the study
pub const TARGET_RUNS: [RunNumber; 7] = [2, 3, 4, 7, 8, 9, 10];
/// Run providing the uncached reference duration
pub const BASELINE_RUN: RunNumber = 2;

/// Step-name fragments identifying a cache action
static TOOL_MARKERS: [(&str, Tool); 3] = [
    ("cachix/cachix-action", Tool::Cachix),
    ("cache-nix-action", Tool::CacheNixAction),
    ("DeterminateSystems/magic-nix-cache-action", Tool::MagicNixCache),
];

/// Position of a run within its tool's trial pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrialPhase {
    Baseline,
    First,
    Second,
    Other,
}

impl TrialPhase {
    pub fn for_run(run_number: RunNumber) -> Self {
        match run_number {
            2 => TrialPhase::Baseline,
            3 | 7 | 9 => TrialPhase::First,
            4 | 8 | 10 => TrialPhase::Second,
            _ => TrialPhase::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrialPhase::Baseline => "baseline",
            TrialPhase::First => "first",
            TrialPhase::Second => "second",
            TrialPhase::Other => "other",
        }
    }
}

impl fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool a run was dispatched with, when the run is part of the study
pub fn tool_override(run_number: RunNumber) -> Option<Tool> {
    match run_number {
        2 => Some(Tool::None),
        3 | 4 => Some(Tool::Cachix),
        7 | 8 => Some(Tool::CacheNixAction),
        9 | 10 => Some(Tool::MagicNixCache),
        _ => None,
    }
}

/// Chart slots in presentation order
pub fn slot_order() -> [(TrialPhase, Tool); 7] {
    [
        (TrialPhase::Baseline, Tool::None),
        (TrialPhase::First, Tool::Cachix),
        (TrialPhase::Second, Tool::Cachix),
        (TrialPhase::First, Tool::CacheNixAction),
        (TrialPhase::Second, Tool::CacheNixAction),
        (TrialPhase::First, Tool::MagicNixCache),
        (TrialPhase::Second, Tool::MagicNixCache),
    ]
}

/// Cache tool observed in each run's steps.
///
/// Every run appearing in the step records gets an entry: `none` without any
/// marker, the tool itself for one marker, and the sorted tool names joined
/// with `+` for several.
pub fn detect_run_tools(steps: &[Record]) -> HashMap<String, Tool> {
    let mut flags: HashMap<String, BTreeSet<&str>> = HashMap::new();
    for record in steps {
        let run_id = unquote(record.get("run_id").map(String::as_str).unwrap_or_default());
        if run_id.is_empty() {
            continue;
        }
        let step_name = record.get("step_name").map(String::as_str).unwrap_or_default();
        let seen = flags.entry(run_id.to_string()).or_default();
        for (marker, tool) in &TOOL_MARKERS {
            if step_name.contains(marker) {
                seen.insert(tool.as_str());
            }
        }
    }

    flags
        .into_iter()
        .map(|(run_id, seen)| {
            let tool = match seen.len() {
                0 => Tool::None,
                _ => Tool::normalize(&seen.into_iter().collect::<Vec<_>>().join("+")),
            };
            (run_id, tool)
        })
        .collect()
}

/// A build step of one study run
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRow {
    pub run_id: String,
    pub run_number: RunNumber,
    /// Raw job name; the study has no friendly labels
    pub job_name: String,
    pub tool: Tool,
    pub phase: TrialPhase,
    pub duration_s: f64,
}

impl Measurement for TrialRow {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn run_number(&self) -> RunNumber {
        self.run_number
    }

    fn job_name(&self) -> &str {
        &self.job_name
    }

    fn job_name_raw(&self) -> &str {
        &self.job_name
    }

    fn tool(&self) -> &Tool {
        &self.tool
    }

    fn phase_label(&self) -> &str {
        self.phase.as_str()
    }

    fn duration_s(&self) -> f64 {
        self.duration_s
    }
}

/// Load the build steps of the target runs
pub fn load_trial_rows(
    steps: &[Record],
    run_numbers: &HashMap<String, RunNumber>,
    step_name: &str,
) -> (Vec<TrialRow>, LoadStats) {
    let observed = detect_run_tools(steps);
    let targets = TargetRuns::new(TARGET_RUNS);
    let mut stats = LoadStats::default();

    let rows: Vec<TrialRow> = collect_build_steps(steps, run_numbers, &targets, step_name, &mut stats)
        .into_iter()
        .map(|sample| {
            let tool = tool_override(sample.run_number)
                .or_else(|| observed.get(&sample.run_id).cloned())
                .unwrap_or(Tool::None);
            TrialRow {
                phase: TrialPhase::for_run(sample.run_number),
                run_id: sample.run_id,
                run_number: sample.run_number,
                job_name: sample.job_name_raw,
                tool,
                duration_s: sample.duration_s,
            }
        })
        .collect();

    stats.accepted = rows.len();
    (rows, stats)
}

/// Duration of the job's first row in the baseline run
pub fn baseline_duration(rows: &[TrialRow], job_name: &str) -> Option<f64> {
    rows.iter()
        .find(|r| r.job_name == job_name && r.run_number == BASELINE_RUN)
        .map(|r| r.duration_s)
}

/// Rows ordered by (job, run number, tool)
pub fn sorted_trials(rows: &[TrialRow]) -> Vec<TrialRow> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| (&a.job_name, a.run_number, &a.tool).cmp(&(&b.job_name, b.run_number, &b.tool)));
    sorted
}

/// Earliest run of a job for every chart slot that has one
pub fn chart_slots<'a>(rows: &'a [TrialRow], job_name: &str) -> Vec<(String, &'a TrialRow)> {
    slot_order()
        .iter()
        .filter_map(|(phase, tool)| {
            rows.iter()
                .filter(|r| r.job_name == job_name && &r.phase == phase && &r.tool == tool)
                .min_by_key(|r| r.run_number)
                .map(|r| (slot_label(tool.as_str(), phase.as_str()), r))
        })
        .collect()
}

fn bar_chart(kind: ChartKind, job: &str, title: String, labels: Vec<String>, series: Vec<Series>) -> Chart {
    Chart {
        kind,
        job_name: job.to_string(),
        title,
        y_desc: "seconds".to_string(),
        labels,
        series,
        errors: None,
        value_label: Some(ValueLabel::Seconds),
        reference: None,
    }
}

/// Durations, speedup, total-vs-build and job-total charts for every job
pub fn trial_charts(rows: &[TrialRow], totals: &JobTotals) -> Vec<Chart> {
    let jobs: BTreeSet<&str> = rows.iter().map(|r| r.job_name.as_str()).collect();
    let mut charts = Vec::new();

    for job in jobs {
        let slots = chart_slots(rows, job);
        if slots.is_empty() {
            continue;
        }
        let labels: Vec<String> = slots.iter().map(|(label, _)| label.clone()).collect();
        let durations: Vec<f64> = slots.iter().map(|(_, r)| r.duration_s).collect();

        charts.push(bar_chart(
            ChartKind::Durations,
            job,
            format!("{} - Run nix build durations", job),
            labels.clone(),
            vec![Series {
                name: "build step".to_string(),
                values: durations.clone(),
                color: BLUE_BAR,
            }],
        ));

        if let Some(base) = baseline_duration(rows, job) {
            let mut chart = bar_chart(
                ChartKind::Speedup,
                job,
                format!("{} - Speedup vs baseline (run {})", job, BASELINE_RUN),
                labels,
                vec![Series {
                    name: "speedup".to_string(),
                    values: durations.iter().map(|d| base / d).collect(),
                    color: ORANGE_BAR,
                }],
            );
            chart.y_desc = "speedup (x)".to_string();
            chart.value_label = Some(ValueLabel::Factor);
            chart.reference = Some(1.0);
            charts.push(chart);
        }

        let with_totals: Vec<(String, f64, f64)> = slots
            .iter()
            .filter_map(|(label, r)| {
                totals
                    .get(&r.run_id, &r.job_name)
                    .map(|total| (label.clone(), total, r.duration_s))
            })
            .collect();
        if with_totals.is_empty() {
            debug!("No job totals for {}; skipping total charts", job);
            continue;
        }
        let total_labels: Vec<String> = with_totals.iter().map(|(l, _, _)| l.clone()).collect();
        let job_totals: Vec<f64> = with_totals.iter().map(|(_, t, _)| *t).collect();

        charts.push(bar_chart(
            ChartKind::TotalVsBuild,
            job,
            format!("{} - Job total vs Run nix build", job),
            total_labels.clone(),
            vec![
                Series {
                    name: "job total".to_string(),
                    values: job_totals.clone(),
                    color: TEAL_BAR,
                },
                Series {
                    name: "build step".to_string(),
                    values: with_totals.iter().map(|(_, _, b)| *b).collect(),
                    color: BLUE_BAR,
                },
            ],
        ));
        charts.push(bar_chart(
            ChartKind::JobTotals,
            job,
            format!("{} - Job total durations", job),
            total_labels,
            vec![Series {
                name: "job total".to_string(),
                values: job_totals,
                color: TEAL_BAR,
            }],
        ));
    }
    charts
}

/// Run the preliminary study.
///
/// Needs the step, run and job records; the summary output path is unused.
pub fn run_preliminary(
    inputs: &InputPaths,
    outputs: &OutputPaths,
    options: &AnalysisOptions,
) -> Result<PipelineReport> {
    check_inputs(&inputs.dir, &[&inputs.runs, &inputs.jobs, &inputs.steps])?;

    let steps = read_records(&inputs.steps)?;
    let runs = read_records(&inputs.runs)?;
    let run_numbers = map_run_numbers(&runs);
    let (rows, stats) = load_trial_rows(&steps, &run_numbers, &options.build_step_name);
    stats.log();

    let targets = TargetRuns::new(TARGET_RUNS);
    let mut totals = load_job_totals(&inputs.jobs)?;
    totals.retain_runs(|run_id| {
        run_numbers
            .get(run_id)
            .map_or(false, |run_number| targets.contains(*run_number))
    });

    let mut report = PipelineReport {
        stats,
        ..Default::default()
    };

    write_trial_detail(&sorted_trials(&rows), &outputs.detail)?;
    report.record(&outputs.detail);

    let speedups = speedup_rows(&rows, |job| baseline_duration(&rows, job));
    write_speedup(&speedups, &outputs.speedup)?;
    report.record(&outputs.speedup);

    write_combined(&combined_rows(&rows, &totals), &outputs.combined)?;
    report.record(&outputs.combined);

    if options.charts {
        let charts = trial_charts(&rows, &totals);
        report.record_figures(render_all(
            &charts,
            &outputs.fig_dir,
            options.chart_width,
            options.chart_height,
        ));
    }

    info!(
        "Preliminary study complete: {} build rows, {} files written",
        rows.len(),
        report.written.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn step(run_id: &str, job: &str, step: &str, duration: &str) -> Record {
        [
            ("run_id", run_id),
            ("job_name", job),
            ("step_name", step),
            ("duration_s", duration),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn trial(run_number: RunNumber, tool: Tool, duration_s: f64) -> TrialRow {
        TrialRow {
            run_id: format!("r{}", run_number),
            run_number,
            job_name: "build".to_string(),
            tool,
            phase: TrialPhase::for_run(run_number),
            duration_s,
        }
    }

    #[test]
    fn test_phase_and_override_tables() {
        assert_eq!(TrialPhase::for_run(2), TrialPhase::Baseline);
        assert_eq!(TrialPhase::for_run(7), TrialPhase::First);
        assert_eq!(TrialPhase::for_run(10), TrialPhase::Second);
        assert_eq!(TrialPhase::for_run(5), TrialPhase::Other);
        assert_eq!(tool_override(8), Some(Tool::CacheNixAction));
        assert_eq!(tool_override(11), None);
    }

    #[test]
    fn test_detect_run_tools() {
        let steps = vec![
            step("a", "build", "Run cachix/cachix-action@v15", "1"),
            step("b", "build", "Run nix-community/cache-nix-action@v5", "1"),
            step("b", "build", "Run DeterminateSystems/magic-nix-cache-action@main", "1"),
            step("c", "build", "Run nix build", "1"),
            step("\"d\"", "build", "Run DeterminateSystems/magic-nix-cache-action@main", "1"),
        ];
        let tools = detect_run_tools(&steps);

        assert_eq!(tools["a"], Tool::Cachix);
        assert_eq!(tools["b"], Tool::Other("cache-nix-action+magic-nix-cache".to_string()));
        assert_eq!(tools["c"], Tool::None);
        assert_eq!(tools["d"], Tool::MagicNixCache);
    }

    #[test]
    fn test_load_trial_rows_prefers_override() {
        let steps = vec![
            step("r3", "build", "Run DeterminateSystems/magic-nix-cache-action@main", "2"),
            step("r3", "build", "Run nix build", "8.0"),
            step("r5", "build", "Run nix build", "9.0"),
            step("r2", "build", "Run nix build", "0"),
        ];
        let run_numbers: HashMap<String, RunNumber> = [("r3", 3), ("r5", 5), ("r2", 2)]
            .iter()
            .map(|(id, rn)| (id.to_string(), *rn))
            .collect();

        let (rows, stats) = load_trial_rows(&steps, &run_numbers, "Run nix build");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tool, Tool::Cachix);
        assert_eq!(rows[0].phase, TrialPhase::First);
        assert_eq!(stats.unselected, 1);
        assert_eq!(stats.non_positive_duration, 1);
        assert_eq!(stats.accepted, 1);
    }

    #[test]
    fn test_baseline_is_first_baseline_row() {
        let rows = vec![
            trial(3, Tool::Cachix, 5.0),
            trial(2, Tool::None, 20.0),
            trial(2, Tool::None, 30.0),
        ];
        assert_eq!(baseline_duration(&rows, "build"), Some(20.0));
        assert_eq!(baseline_duration(&rows, "other"), None);

        let speedups = speedup_rows(&rows, |job| baseline_duration(&rows, job));
        let cachix = speedups.iter().find(|s| s.tool == Tool::Cachix).unwrap();
        assert_eq!(cachix.speedup, Some(4.0));
        assert_eq!(cachix.phase, "first");
    }

    #[test]
    fn test_chart_slots_take_earliest_run() {
        let mut late = trial(4, Tool::Cachix, 7.0);
        late.phase = TrialPhase::First;
        let rows = vec![late, trial(3, Tool::Cachix, 5.0), trial(9, Tool::MagicNixCache, 2.0)];

        let slots = chart_slots(&rows, "build");
        let summary: Vec<(&str, RunNumber)> = slots.iter().map(|(l, r)| (l.as_str(), r.run_number)).collect();
        assert_eq!(summary, vec![("cachix/first", 3), ("magic-nix-cache/first", 9)]);
    }

    #[test]
    fn test_trial_charts() {
        let rows = vec![trial(2, Tool::None, 20.0), trial(3, Tool::Cachix, 5.0)];
        let records: Vec<Record> = vec![[("run_id", "r3"), ("job_name", "build"), ("duration_s", "50")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()];
        let totals = JobTotals::from_records(&records);

        let charts = trial_charts(&rows, &totals);
        let names: Vec<String> = charts.iter().map(Chart::file_name).collect();
        assert_eq!(
            names,
            vec![
                "durations_build.png",
                "speedup_build.png",
                "total_vs_build_build.png",
                "job_totals_build.png",
            ]
        );
        assert_eq!(charts[1].series[0].values, vec![1.0, 4.0]);
        assert_eq!(charts[2].labels, vec!["cachix/first".to_string()]);
        assert_eq!(charts[2].series.len(), 2);
    }

    #[test]
    fn test_run_preliminary() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = InputPaths::in_dir(dir.path());
        fs::write(&inputs.runs, "id,run_number\nr2,2\nr3,3\nr5,5\n").unwrap();
        fs::write(
            &inputs.steps,
            "run_id,job_name,step_name,duration_s\n\
             r3,build,Run cachix/cachix-action@v15,1.0\n\
             r3,build,Run nix build,5.0\n\
             r2,build,Run nix build,20.0\n\
             r5,build,Run nix build,9.0\n",
        )
        .unwrap();
        fs::write(
            &inputs.jobs,
            "run_id,job_name,duration_s\nr3,build,50\nr5,build,90\n",
        )
        .unwrap();
        let outputs = OutputPaths::in_dir(&dir.path().join("result"));
        let options = AnalysisOptions {
            charts: false,
            ..Default::default()
        };

        let report = run_preliminary(&inputs, &outputs, &options).unwrap();
        assert_eq!(report.stats.accepted, 2);
        assert_eq!(report.written.len(), 3);
        assert!(!outputs.summary.exists());

        let detail = fs::read_to_string(&outputs.detail).unwrap();
        assert_eq!(
            detail,
            "run_number,job_name,tool,phase,duration_s,run_id\n\
             2,build,none,baseline,20.000,r2\n\
             3,build,cachix,first,5.000,r3\n"
        );
        let speedup = fs::read_to_string(&outputs.speedup).unwrap();
        assert_eq!(speedup.lines().nth(2), Some("build,cachix,first,3,5.000,4.000"));
        let combined = fs::read_to_string(&outputs.combined).unwrap();
        assert_eq!(combined.lines().nth(1), Some("2,build,none,baseline,20.000,,,r2"));
        assert_eq!(combined.lines().nth(2), Some("3,build,cachix,first,5.000,50.000,0.100,r3"));
    }

    #[test]
    fn test_missing_inputs_do_not_ask_for_selection() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = InputPaths::in_dir(dir.path());
        let outputs = OutputPaths::in_dir(&dir.path().join("result"));

        let err = run_preliminary(&inputs, &outputs, &AnalysisOptions::default()).unwrap_err();
        assert!(err.is_fatal_input());

        let message = err.to_string();
        assert_eq!(message.lines().filter(|line| line.starts_with(" - ")).count(), 3);
        assert!(message.contains("Place actions_runs.csv, actions_jobs.csv, actions_steps.csv in "));
        assert!(!message.contains("selection.csv"));
        assert!(!outputs.detail.exists());
    }
}
