//! Aggregation of build timings
//!
//! This module assigns cycle indices to repeated trials, derives per-job
//! baselines and speedups, joins build durations with job totals and
//! computes per-configuration statistics. Values that cannot be computed are
//! `None` all the way to the report writer.

use crate::loader::JobTotals;
use crate::utils::{mean, ratio, sample_std_dev};
use crate::BuildRow;
use nixcache_common::{Phase, RunNumber, Tool};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A timed build step as seen by the aggregator
pub trait Measurement {
    fn run_id(&self) -> &str;
    fn run_number(&self) -> RunNumber;
    /// Label reports group by
    fn job_name(&self) -> &str;
    /// Name used to look up the enclosing job's total
    fn job_name_raw(&self) -> &str;
    fn tool(&self) -> &Tool;
    fn phase_label(&self) -> &str;
    fn duration_s(&self) -> f64;
}

impl Measurement for BuildRow {
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
        &self.job_name_raw
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

/// Row of the detail report
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRow {
    pub run_number: RunNumber,
    pub job_name: String,
    pub tool: Tool,
    pub phase: Phase,
    pub cycle_index: usize,
    pub duration_s: f64,
    pub run_id: String,
}

/// Row of the speedup report
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedupRow {
    pub job_name: String,
    pub tool: Tool,
    pub phase: String,
    pub run_number: RunNumber,
    pub duration_s: f64,
    /// Baseline mean over this row's duration; `None` without a baseline
    pub speedup: Option<f64>,
}

/// Row of the build-vs-job-total report
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedRow {
    pub run_number: RunNumber,
    pub job_name: String,
    pub tool: Tool,
    pub phase: String,
    pub build_s: f64,
    pub job_total_s: Option<f64>,
    pub build_share: Option<f64>,
    pub run_id: String,
}

/// Statistics for one (job, tool, phase) configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub job_name: String,
    pub tool: Tool,
    pub phase: Phase,
    pub n: usize,
    pub build_mean_s: Option<f64>,
    pub build_std_s: Option<f64>,
    pub job_total_mean_s: Option<f64>,
    pub build_share_mean: Option<f64>,
}

/// Distinct job labels in sorted order
pub fn job_names<M: Measurement>(rows: &[M]) -> BTreeSet<&str> {
    rows.iter().map(|r| r.job_name()).collect()
}

/// Assign each row its 1-based trial number within its (target, tool, phase) group.
///
/// Rows are numbered in run-number order (ties broken by run id, then raw
/// job name), so every group receives exactly 1..=N. The result is parallel
/// to `rows`.
pub fn assign_cycle_indices(rows: &[BuildRow]) -> Vec<usize> {
    let mut groups: HashMap<(&str, &Tool, &Phase), Vec<usize>> = HashMap::new();
    for (position, row) in rows.iter().enumerate() {
        groups
            .entry((row.target.as_str(), &row.tool, &row.phase))
            .or_default()
            .push(position);
    }

    let mut indices = vec![0; rows.len()];
    for members in groups.values_mut() {
        members.sort_by(|&a, &b| {
            let (a, b) = (&rows[a], &rows[b]);
            (a.run_number, &a.run_id, &a.job_name_raw).cmp(&(b.run_number, &b.run_id, &b.job_name_raw))
        });
        for (cycle, &position) in members.iter().enumerate() {
            indices[position] = cycle + 1;
        }
    }
    indices
}

/// Detail rows ordered by (job, tool, phase, run number)
pub fn detail_rows(rows: &[BuildRow]) -> Vec<DetailRow> {
    let indices = assign_cycle_indices(rows);
    let mut details: Vec<DetailRow> = rows
        .iter()
        .zip(indices)
        .map(|(row, cycle_index)| DetailRow {
            run_number: row.run_number,
            job_name: row.job_name.clone(),
            tool: row.tool.clone(),
            phase: row.phase.clone(),
            cycle_index,
            duration_s: row.duration_s,
            run_id: row.run_id.clone(),
        })
        .collect();

    details.sort_by(|a, b| {
        (&a.job_name, &a.tool, &a.phase, a.run_number)
            .cmp(&(&b.job_name, &b.tool, &b.phase, b.run_number))
    });
    details
}

/// Mean duration of the uncached cache-generation runs of a job
pub fn baseline_mean(rows: &[BuildRow], job_name: &str) -> Option<f64> {
    let values: Vec<f64> = rows
        .iter()
        .filter(|r| r.job_name == job_name && r.tool.is_baseline() && r.phase == Phase::GenerateCache)
        .map(|r| r.duration_s)
        .collect();
    mean(&values)
}

/// Speedup of one duration against a baseline
pub fn speedup(baseline: Option<f64>, duration_s: f64) -> Option<f64> {
    match baseline {
        Some(base) if base > 0.0 && duration_s > 0.0 => Some(base / duration_s),
        _ => None,
    }
}

/// Per-row speedups, grouped by job and ordered by (run number, tool, phase) within a job
pub fn speedup_rows<M, F>(rows: &[M], baseline: F) -> Vec<SpeedupRow>
where
    M: Measurement,
    F: Fn(&str) -> Option<f64>,
{
    let mut out = Vec::with_capacity(rows.len());
    for job in job_names(rows) {
        let base = baseline(job);
        let mut job_rows: Vec<&M> = rows.iter().filter(|r| r.job_name() == job).collect();
        job_rows.sort_by(|a, b| {
            (a.run_number(), a.tool(), a.phase_label()).cmp(&(b.run_number(), b.tool(), b.phase_label()))
        });

        for row in job_rows {
            out.push(SpeedupRow {
                job_name: job.to_string(),
                tool: row.tool().clone(),
                phase: row.phase_label().to_string(),
                run_number: row.run_number(),
                duration_s: row.duration_s(),
                speedup: speedup(base, row.duration_s()),
            });
        }
    }
    out
}

/// Build durations joined with job totals, ordered by (job, run number, tool)
pub fn combined_rows<M: Measurement>(rows: &[M], totals: &JobTotals) -> Vec<CombinedRow> {
    let mut sorted: Vec<&M> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        (a.job_name(), a.run_number(), a.tool()).cmp(&(b.job_name(), b.run_number(), b.tool()))
    });

    sorted
        .into_iter()
        .map(|row| {
            let job_total_s = totals.get(row.run_id(), row.job_name_raw());
            CombinedRow {
                run_number: row.run_number(),
                job_name: row.job_name().to_string(),
                tool: row.tool().clone(),
                phase: row.phase_label().to_string(),
                build_s: row.duration_s(),
                job_total_s,
                build_share: ratio(row.duration_s(), job_total_s),
                run_id: row.run_id().to_string(),
            }
        })
        .collect()
}

/// Group statistics keyed by (job, tool, phase), in key order
pub fn summary_rows(rows: &[BuildRow], totals: &JobTotals) -> Vec<SummaryRow> {
    let mut grouped: BTreeMap<(&str, &Tool, &Phase), Vec<(f64, Option<f64>)>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry((row.job_name.as_str(), &row.tool, &row.phase))
            .or_default()
            .push((row.duration_s, totals.get(&row.run_id, &row.job_name_raw)));
    }

    grouped
        .into_iter()
        .map(|((job_name, tool, phase), values)| {
            let builds: Vec<f64> = values.iter().map(|(b, _)| *b).collect();
            let job_totals: Vec<f64> = values.iter().filter_map(|(_, t)| *t).collect();
            let shares: Vec<f64> = values.iter().filter_map(|(b, t)| ratio(*b, *t)).collect();

            SummaryRow {
                job_name: job_name.to_string(),
                tool: tool.clone(),
                phase: phase.clone(),
                n: values.len(),
                build_mean_s: mean(&builds),
                build_std_s: sample_std_dev(&builds),
                job_total_mean_s: mean(&job_totals),
                build_share_mean: mean(&shares),
            }
        })
        .collect()
}

/// Job totals of one job's rows grouped by (phase, tool)
pub fn job_totals_by_config<'a>(
    rows: &'a [BuildRow],
    totals: &JobTotals,
    job_name: &str,
) -> HashMap<(&'a Phase, &'a Tool), Vec<f64>> {
    let mut grouped: HashMap<(&Phase, &Tool), Vec<f64>> = HashMap::new();
    for row in rows.iter().filter(|r| r.job_name == job_name) {
        if let Some(total) = totals.get(&row.run_id, &row.job_name_raw) {
            grouped.entry((&row.phase, &row.tool)).or_default().push(total);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Record;
    use proptest::prelude::*;

    fn row(run_id: &str, run_number: RunNumber, tool: Tool, phase: Phase, duration_s: f64) -> BuildRow {
        let job_name_raw = format!(
            "build_zenn_cachetool_{}_phase_{}",
            tool.as_str(),
            phase.as_str()
        );
        BuildRow {
            run_id: run_id.to_string(),
            run_number,
            job_name_raw,
            job_name: "zenn_build".to_string(),
            target: "zenn".to_string(),
            tool,
            phase,
            duration_s,
        }
    }

    fn totals(entries: &[(&str, &str, &str)]) -> JobTotals {
        let records: Vec<Record> = entries
            .iter()
            .map(|(run_id, job, duration)| {
                [
                    ("run_id".to_string(), run_id.to_string()),
                    ("job_name".to_string(), job.to_string()),
                    ("duration_s".to_string(), duration.to_string()),
                ]
                .into_iter()
                .collect()
            })
            .collect();
        JobTotals::from_records(&records)
    }

    #[test]
    fn test_cycle_indices_follow_run_number() {
        let rows = vec![
            row("r3", 30, Tool::Cachix, Phase::UseCache, 5.0),
            row("r1", 10, Tool::Cachix, Phase::UseCache, 6.0),
            row("r2", 20, Tool::None, Phase::GenerateCache, 9.0),
            row("r2b", 20, Tool::Cachix, Phase::UseCache, 7.0),
        ];
        assert_eq!(assign_cycle_indices(&rows), vec![3, 1, 1, 2]);
    }

    #[test]
    fn test_detail_rows_order() {
        let rows = vec![
            row("r2", 20, Tool::None, Phase::GenerateCache, 9.0),
            row("r3", 30, Tool::Cachix, Phase::UseCache, 5.0),
            row("r1", 10, Tool::None, Phase::GenerateCache, 6.0),
        ];
        let details = detail_rows(&rows);

        let keys: Vec<(&str, RunNumber, usize)> = details
            .iter()
            .map(|d| (d.tool.as_str(), d.run_number, d.cycle_index))
            .collect();
        assert_eq!(keys, vec![("cachix", 30, 1), ("none", 10, 1), ("none", 20, 2)]);
    }

    #[test]
    fn test_baseline_and_speedup() {
        let rows = vec![
            row("r1", 1, Tool::None, Phase::GenerateCache, 10.0),
            row("r2", 2, Tool::None, Phase::GenerateCache, 20.0),
            row("r3", 3, Tool::Cachix, Phase::UseCache, 5.0),
        ];
        assert_eq!(baseline_mean(&rows, "zenn_build"), Some(15.0));

        let speedups = speedup_rows(&rows, |job| baseline_mean(&rows, job));
        assert_eq!(speedups.len(), 3);
        assert_eq!(speedups[2].tool, Tool::Cachix);
        assert_eq!(speedups[2].speedup, Some(3.0));
        assert_eq!(speedups[0].speedup, Some(1.5));
    }

    #[test]
    fn test_speedup_blank_without_baseline() {
        let rows = vec![
            row("r1", 1, Tool::None, Phase::UseCache, 10.0),
            row("r3", 3, Tool::Cachix, Phase::UseCache, 5.0),
        ];
        assert_eq!(baseline_mean(&rows, "zenn_build"), None);

        let speedups = speedup_rows(&rows, |job| baseline_mean(&rows, job));
        assert!(speedups.iter().all(|s| s.speedup.is_none()));
    }

    #[test]
    fn test_speedup_guards() {
        assert_eq!(speedup(Some(10.0), 0.0), None);
        assert_eq!(speedup(None, 4.0), None);
        assert_eq!(speedup(Some(10.0), 4.0), Some(2.5));
    }

    #[test]
    fn test_combined_rows_share() {
        let rows = vec![
            row("r2", 2, Tool::Cachix, Phase::UseCache, 5.0),
            row("r1", 1, Tool::None, Phase::GenerateCache, 10.0),
        ];
        let totals = totals(&[
            ("r1", "build_zenn_cachetool_none_phase_generate-cache", "40"),
            ("r2", "build_zenn_cachetool_cachix_phase_use-cache", "0"),
        ]);

        let combined = combined_rows(&rows, &totals);
        assert_eq!(combined[0].run_number, 1);
        assert_eq!(combined[0].job_total_s, Some(40.0));
        assert_eq!(combined[0].build_share, Some(0.25));
        assert_eq!(combined[1].job_total_s, Some(0.0));
        assert_eq!(combined[1].build_share, None);
    }

    #[test]
    fn test_summary_rows() {
        let rows = vec![
            row("r1", 1, Tool::None, Phase::GenerateCache, 10.0),
            row("r2", 2, Tool::None, Phase::GenerateCache, 20.0),
            row("r3", 3, Tool::Cachix, Phase::UseCache, 5.0),
        ];
        let totals = totals(&[
            ("r1", "build_zenn_cachetool_none_phase_generate-cache", "20"),
            ("r2", "build_zenn_cachetool_none_phase_generate-cache", "40"),
        ]);

        let summary = summary_rows(&rows, &totals);
        assert_eq!(summary.len(), 2);

        let cachix = &summary[0];
        assert_eq!(cachix.tool, Tool::Cachix);
        assert_eq!(cachix.n, 1);
        assert_eq!(cachix.build_mean_s, Some(5.0));
        assert_eq!(cachix.build_std_s, Some(0.0));
        assert_eq!(cachix.job_total_mean_s, None);
        assert_eq!(cachix.build_share_mean, None);

        let none = &summary[1];
        assert_eq!(none.n, 2);
        assert_eq!(none.build_mean_s, Some(15.0));
        assert!((none.build_std_s.unwrap() - 7.0711).abs() < 1e-3);
        assert_eq!(none.job_total_mean_s, Some(30.0));
        assert_eq!(none.build_share_mean, Some(0.5));
    }

    #[test]
    fn test_job_totals_by_config() {
        let rows = vec![
            row("r1", 1, Tool::None, Phase::GenerateCache, 10.0),
            row("r2", 2, Tool::None, Phase::GenerateCache, 20.0),
            row("r3", 3, Tool::Cachix, Phase::UseCache, 5.0),
        ];
        let totals = totals(&[
            ("r1", "build_zenn_cachetool_none_phase_generate-cache", "20"),
            ("r2", "build_zenn_cachetool_none_phase_generate-cache", "40"),
        ]);

        let (phase, tool) = (Phase::GenerateCache, Tool::None);
        let grouped = job_totals_by_config(&rows, &totals, "zenn_build");
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped.get(&(&phase, &tool)), Some(&vec![20.0, 40.0]));
    }

    proptest! {
        #[test]
        fn test_cycle_indices_are_contiguous(
            trials in prop::collection::vec((0u64..50, 0usize..3, 0usize..2), 0..40),
        ) {
            let tools = [Tool::None, Tool::Cachix, Tool::MagicNixCache];
            let phases = [Phase::GenerateCache, Phase::UseCache];
            let rows: Vec<BuildRow> = trials
                .iter()
                .enumerate()
                .map(|(i, (rn, t, p))| row(&format!("r{}", i), *rn, tools[*t].clone(), phases[*p].clone(), 1.0))
                .collect();

            let indices = assign_cycle_indices(&rows);
            let mut groups: HashMap<(Tool, Phase), Vec<(RunNumber, usize)>> = HashMap::new();
            for (row, index) in rows.iter().zip(&indices) {
                groups.entry((row.tool.clone(), row.phase.clone())).or_default().push((row.run_number, *index));
            }

            for members in groups.values_mut() {
                members.sort_by_key(|(_, index)| *index);
                let expected: Vec<usize> = (1..=members.len()).collect();
                let actual: Vec<usize> = members.iter().map(|(_, index)| *index).collect();
                prop_assert_eq!(actual, expected);
                prop_assert!(members.windows(2).all(|w| w[0].0 <= w[1].0));
            }
        }

        #[test]
        fn test_speedup_matches_formula(
            base in prop::collection::vec(0.1f64..1000.0, 1..5),
            duration in 0.1f64..1000.0,
        ) {
            let mut rows: Vec<BuildRow> = base
                .iter()
                .enumerate()
                .map(|(i, d)| row(&format!("b{}", i), i as u64, Tool::None, Phase::GenerateCache, *d))
                .collect();
            rows.push(row("c", 99, Tool::Cachix, Phase::UseCache, duration));

            let expected = base.iter().sum::<f64>() / base.len() as f64 / duration;
            let speedups = speedup_rows(&rows, |job| baseline_mean(&rows, job));
            let last = speedups.last().unwrap();
            prop_assert!((last.speedup.unwrap() - expected).abs() < 1e-9 * expected.max(1.0));
        }
    }
}
