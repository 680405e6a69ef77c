//! CSV report generation
//!
//! Every report starts with a fixed header row followed by serialized
//! records. Durations and ratios are written with three decimals and
//! undefined values as empty cells.

use crate::analysis::{CombinedRow, DetailRow, Measurement, SpeedupRow, SummaryRow};
use crate::utils::format_seconds;
use nixcache_common::{Result, RunNumber};
use serde::Serialize;
use std::fs::{create_dir_all, File};
use std::path::Path;
use tracing::info;

pub const DETAIL_HEADERS: [&str; 7] = [
    "run_number", "job_name", "tool", "phase", "cycle_index", "duration_s", "run_id",
];
pub const TRIAL_DETAIL_HEADERS: [&str; 6] = [
    "run_number", "job_name", "tool", "phase", "duration_s", "run_id",
];
pub const SPEEDUP_HEADERS: [&str; 6] = [
    "job_name", "tool", "phase", "run_number", "duration_s", "speedup_vs_baseline",
];
pub const COMBINED_HEADERS: [&str; 8] = [
    "run_number", "job_name", "tool", "phase", "build_s", "job_total_s", "build_share", "run_id",
];
pub const SUMMARY_HEADERS: [&str; 8] = [
    "job_name", "tool", "phase", "n", "build_mean_s", "build_std_s", "job_total_mean_s", "build_share_mean",
];

#[derive(Serialize)]
struct DetailRecord<'a> {
    run_number: RunNumber,
    job_name: &'a str,
    tool: &'a str,
    phase: &'a str,
    cycle_index: usize,
    duration_s: String,
    run_id: &'a str,
}

#[derive(Serialize)]
struct TrialDetailRecord<'a> {
    run_number: RunNumber,
    job_name: &'a str,
    tool: &'a str,
    phase: &'a str,
    duration_s: String,
    run_id: &'a str,
}

#[derive(Serialize)]
struct SpeedupRecord<'a> {
    job_name: &'a str,
    tool: &'a str,
    phase: &'a str,
    run_number: RunNumber,
    duration_s: String,
    speedup_vs_baseline: String,
}

#[derive(Serialize)]
struct CombinedRecord<'a> {
    run_number: RunNumber,
    job_name: &'a str,
    tool: &'a str,
    phase: &'a str,
    build_s: String,
    job_total_s: String,
    build_share: String,
    run_id: &'a str,
}

#[derive(Serialize)]
struct SummaryRecord<'a> {
    job_name: &'a str,
    tool: &'a str,
    phase: &'a str,
    n: usize,
    build_mean_s: String,
    build_std_s: String,
    job_total_mean_s: String,
    build_share_mean: String,
}

/// Create the parent directory and open a header-less writer
fn open_report(path: &Path, headers: &[&str]) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(headers)?;
    Ok(writer)
}

fn finish(mut writer: csv::Writer<File>, path: &Path, rows: usize) -> Result<usize> {
    writer.flush()?;
    info!("Wrote {} rows to {}", rows, path.display());
    Ok(rows)
}

/// Write the detail report (with cycle indices)
pub fn write_detail(rows: &[DetailRow], path: &Path) -> Result<usize> {
    let mut writer = open_report(path, &DETAIL_HEADERS)?;
    for row in rows {
        writer.serialize(DetailRecord {
            run_number: row.run_number,
            job_name: &row.job_name,
            tool: row.tool.as_str(),
            phase: row.phase.as_str(),
            cycle_index: row.cycle_index,
            duration_s: format_seconds(Some(row.duration_s)),
            run_id: &row.run_id,
        })?;
    }
    finish(writer, path, rows.len())
}

/// Write a detail report without cycle indices, in the given order
pub fn write_trial_detail<M: Measurement>(rows: &[M], path: &Path) -> Result<usize> {
    let mut writer = open_report(path, &TRIAL_DETAIL_HEADERS)?;
    for row in rows {
        writer.serialize(TrialDetailRecord {
            run_number: row.run_number(),
            job_name: row.job_name(),
            tool: row.tool().as_str(),
            phase: row.phase_label(),
            duration_s: format_seconds(Some(row.duration_s())),
            run_id: row.run_id(),
        })?;
    }
    finish(writer, path, rows.len())
}

/// Write the speedup report
pub fn write_speedup(rows: &[SpeedupRow], path: &Path) -> Result<usize> {
    let mut writer = open_report(path, &SPEEDUP_HEADERS)?;
    for row in rows {
        writer.serialize(SpeedupRecord {
            job_name: &row.job_name,
            tool: row.tool.as_str(),
            phase: &row.phase,
            run_number: row.run_number,
            duration_s: format_seconds(Some(row.duration_s)),
            speedup_vs_baseline: format_seconds(row.speedup),
        })?;
    }
    finish(writer, path, rows.len())
}

/// Write the build-vs-job-total report
pub fn write_combined(rows: &[CombinedRow], path: &Path) -> Result<usize> {
    let mut writer = open_report(path, &COMBINED_HEADERS)?;
    for row in rows {
        writer.serialize(CombinedRecord {
            run_number: row.run_number,
            job_name: &row.job_name,
            tool: row.tool.as_str(),
            phase: &row.phase,
            build_s: format_seconds(Some(row.build_s)),
            job_total_s: format_seconds(row.job_total_s),
            build_share: format_seconds(row.build_share),
            run_id: &row.run_id,
        })?;
    }
    finish(writer, path, rows.len())
}

/// Write the per-configuration summary
pub fn write_summary(rows: &[SummaryRow], path: &Path) -> Result<usize> {
    let mut writer = open_report(path, &SUMMARY_HEADERS)?;
    for row in rows {
        writer.serialize(SummaryRecord {
            job_name: &row.job_name,
            tool: row.tool.as_str(),
            phase: row.phase.as_str(),
            n: row.n,
            build_mean_s: format_seconds(row.build_mean_s),
            build_std_s: format_seconds(row.build_std_s),
            job_total_mean_s: format_seconds(row.job_total_mean_s),
            build_share_mean: format_seconds(row.build_share_mean),
        })?;
    }
    finish(writer, path, rows.len())
}
