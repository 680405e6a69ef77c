//! CSV loading for exported CI records
//!
//! Inputs are header-driven CSV files; every record is kept as a mapping of
//! column name to raw string value. Typed build rows are derived from the
//! step records, with malformed rows dropped and counted in [`LoadStats`].

use crate::classifier::parse_job;
use crate::selection::RunSelector;
use crate::utils::unquote;
use crate::BuildRow;
use nixcache_common::{ReportError, Result, RunNumber};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One CSV record: column name to raw value
pub type Record = HashMap<String, String>;

/// Read every record of a CSV file, preserving file order
pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        records.push(record);
    }

    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// First non-empty value among the given column names
pub fn field<'a>(record: &'a Record, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| record.get(*name))
        .map(String::as_str)
        .find(|value| !value.is_empty())
}

/// Fail with every missing path when any expected input is absent.
///
/// The error names all checked files, in the order given, so the
/// remediation hint matches what the caller reads.
pub fn check_inputs(dir: &Path, paths: &[&Path]) -> Result<()> {
    let missing: Vec<PathBuf> = paths
        .iter()
        .filter(|path| !path.exists())
        .map(|path| path.to_path_buf())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        let expected = paths
            .iter()
            .map(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            })
            .collect();
        Err(ReportError::MissingInputs {
            dir: dir.to_path_buf(),
            paths: missing,
            expected,
        })
    }
}

/// Parse a duration cell. Missing, empty, `null`, unparseable and
/// non-finite values are all undefined.
pub fn parse_duration(value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    if value.is_empty() || value == "null" {
        return None;
    }
    value.parse::<f64>().ok().filter(|d| d.is_finite())
}

/// Map run id to run number. Runs without a usable number are left out.
pub fn map_run_numbers(runs: &[Record]) -> HashMap<String, RunNumber> {
    let mut out = HashMap::with_capacity(runs.len());
    for record in runs {
        let run_id = match field(record, &["run_id", "id"]) {
            Some(id) => unquote(id),
            None => continue,
        };
        let run_number = field(record, &["run_number"])
            .and_then(|rn| rn.trim().parse::<RunNumber>().ok());
        if let Some(run_number) = run_number {
            out.insert(run_id.to_string(), run_number);
        }
    }
    out
}

/// Counts of step records by fate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Step records read
    pub considered: usize,
    /// Steps other than the build step
    pub other_steps: usize,
    /// Missing, `null` or unparseable duration
    pub invalid_duration: usize,
    pub non_positive_duration: usize,
    /// Run id absent from the run records
    pub unknown_run: usize,
    pub unselected: usize,
    /// Job name not following the build job convention
    pub unrecognised_job: usize,
    pub accepted: usize,
}

impl LoadStats {
    pub fn skipped(&self) -> usize {
        self.invalid_duration
            + self.non_positive_duration
            + self.unknown_run
            + self.unselected
            + self.unrecognised_job
    }

    pub fn log(&self) {
        info!(
            "Accepted {} build rows from {} step records ({} skipped)",
            self.accepted,
            self.considered,
            self.skipped()
        );
        debug!(
            "Skips: invalid duration {}, non-positive duration {}, unknown run {}, unselected {}, unrecognised job {}; other steps {}",
            self.invalid_duration,
            self.non_positive_duration,
            self.unknown_run,
            self.unselected,
            self.unrecognised_job,
            self.other_steps
        );
    }
}

/// A build step execution before classification
#[derive(Debug, Clone, PartialEq)]
pub struct StepSample {
    pub run_id: String,
    pub run_number: RunNumber,
    pub job_name_raw: String,
    pub duration_s: f64,
}

/// Select valid build step samples from the step records.
///
/// Only records whose step name equals `step_name` are looked at; of those,
/// rows with an undefined or non-positive duration, an unknown run, or a run
/// rejected by `selector` are dropped and counted.
pub fn collect_build_steps(
    steps: &[Record],
    run_numbers: &HashMap<String, RunNumber>,
    selector: &dyn RunSelector,
    step_name: &str,
    stats: &mut LoadStats,
) -> Vec<StepSample> {
    let mut samples = Vec::new();

    for record in steps {
        stats.considered += 1;
        if record.get("step_name").map(String::as_str) != Some(step_name) {
            stats.other_steps += 1;
            continue;
        }

        let duration_s = match parse_duration(record.get("duration_s").map(String::as_str)) {
            Some(d) if d > 0.0 => d,
            Some(_) => {
                stats.non_positive_duration += 1;
                continue;
            }
            None => {
                stats.invalid_duration += 1;
                continue;
            }
        };

        let run_id = unquote(record.get("run_id").map(String::as_str).unwrap_or_default());
        let run_number = match run_numbers.get(run_id) {
            Some(rn) => *rn,
            None => {
                stats.unknown_run += 1;
                continue;
            }
        };

        let job_name_raw = record.get("job_name").cloned().unwrap_or_default();
        if !selector.includes(run_id, run_number, &job_name_raw) {
            stats.unselected += 1;
            continue;
        }

        samples.push(StepSample {
            run_id: run_id.to_string(),
            run_number,
            job_name_raw,
            duration_s,
        });
    }

    samples
}

/// Rows accepted by the loader together with the skip accounting
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub rows: Vec<BuildRow>,
    pub stats: LoadStats,
}

/// Load classified build rows for the main analysis
pub fn load_build_rows(
    steps: &[Record],
    runs: &[Record],
    selector: &dyn RunSelector,
    step_name: &str,
) -> LoadOutcome {
    let run_numbers = map_run_numbers(runs);
    let mut stats = LoadStats::default();
    let samples = collect_build_steps(steps, &run_numbers, selector, step_name, &mut stats);

    let mut rows = Vec::with_capacity(samples.len());
    for sample in samples {
        let class = match parse_job(&sample.job_name_raw) {
            Some(class) => class,
            None => {
                stats.unrecognised_job += 1;
                continue;
            }
        };
        rows.push(BuildRow {
            job_name: class.job_label(),
            run_id: sample.run_id,
            run_number: sample.run_number,
            job_name_raw: sample.job_name_raw,
            target: class.target,
            tool: class.tool,
            phase: class.phase,
            duration_s: sample.duration_s,
        });
    }

    stats.accepted = rows.len();
    LoadOutcome { rows, stats }
}

/// Total job durations keyed by (run id, raw job name)
#[derive(Debug, Clone, Default)]
pub struct JobTotals {
    totals: HashMap<(String, String), f64>,
}

impl JobTotals {
    /// Build from job records; rows without a run id or a defined duration are skipped
    pub fn from_records(jobs: &[Record]) -> Self {
        let mut totals = HashMap::with_capacity(jobs.len());
        for record in jobs {
            let run_id = unquote(record.get("run_id").map(String::as_str).unwrap_or_default());
            let duration = parse_duration(record.get("duration_s").map(String::as_str));
            let duration = match duration {
                Some(d) if !run_id.is_empty() => d,
                _ => continue,
            };
            let job_name = record.get("job_name").cloned().unwrap_or_default();
            totals.insert((run_id.to_string(), job_name), duration);
        }
        Self { totals }
    }

    /// Keep only the runs accepted by `keep`
    pub fn retain_runs<F>(&mut self, keep: F)
    where
        F: Fn(&str) -> bool,
    {
        self.totals.retain(|(run_id, _), _| keep(run_id));
    }

    pub fn get(&self, run_id: &str, job_name_raw: &str) -> Option<f64> {
        self.totals
            .get(&(run_id.to_string(), job_name_raw.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

/// Load job totals from the job records file
pub fn load_job_totals(jobs_path: &Path) -> Result<JobTotals> {
    let records = read_records(jobs_path)?;
    let totals = JobTotals::from_records(&records);
    if totals.is_empty() {
        warn!("{} has no usable job totals; build shares will be blank", jobs_path.display());
    } else {
        info!("Loaded {} job totals from {}", totals.len(), jobs_path.display());
    }
    Ok(totals)
}
