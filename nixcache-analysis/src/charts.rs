//! Bar charts for cache tool comparisons
//!
//! Chart contents are assembled as plain [`Chart`] values so they can be
//! inspected without a drawing backend. Rendering uses the [`plotters`]
//! bitmap backend when the `charts` feature is enabled; PNG files are named
//! `<kind>_<job>.png`.
//!
//! A failed chart never aborts a report run: failures are logged and the
//! remaining charts are still attempted.

use crate::analysis::{job_totals_by_config, SummaryRow};
use crate::loader::JobTotals;
use crate::utils::{mean, sample_std_dev};
use crate::BuildRow;
use nixcache_common::{presentation_order, ReportError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const BLUE_BAR: (u8, u8, u8) = (0x4C, 0x78, 0xA8);
pub const TEAL_BAR: (u8, u8, u8) = (0x72, 0xB7, 0xB2);
pub const ORANGE_BAR: (u8, u8, u8) = (0xF5, 0x85, 0x18);

/// Kind of figure; determines the file name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    BuildErrorbars,
    JobTotalErrorbars,
    Durations,
    Speedup,
    TotalVsBuild,
    JobTotals,
}

impl ChartKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ChartKind::BuildErrorbars => "errorbars_build",
            ChartKind::JobTotalErrorbars => "errorbars_job_total",
            ChartKind::Durations => "durations",
            ChartKind::Speedup => "speedup",
            ChartKind::TotalVsBuild => "total_vs_build",
            ChartKind::JobTotals => "job_totals",
        }
    }
}

/// How bar values are annotated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueLabel {
    /// `12.3s`
    Seconds,
    /// `2.50x`
    Factor,
}

impl ValueLabel {
    pub fn format(&self, value: f64) -> String {
        match self {
            ValueLabel::Seconds => format!("{:.1}s", value),
            ValueLabel::Factor => format!("{:.2}x", value),
        }
    }
}

/// One bar per label
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
    pub color: (u8, u8, u8),
}

/// A bar chart for one job
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub kind: ChartKind,
    pub job_name: String,
    pub title: String,
    pub y_desc: String,
    /// Slot labels, one per bar position
    pub labels: Vec<String>,
    /// Drawn side by side within each slot
    pub series: Vec<Series>,
    /// Standard deviations drawn as whiskers on the first series
    pub errors: Option<Vec<f64>>,
    pub value_label: Option<ValueLabel>,
    /// Horizontal dashed reference line
    pub reference: Option<f64>,
}

impl Chart {
    pub fn file_name(&self) -> String {
        format!("{}_{}.png", self.kind.prefix(), self.job_name)
    }

    /// Upper bound of the value axis including whiskers and headroom
    pub fn y_max(&self) -> f64 {
        let mut top = self.reference.unwrap_or(0.0);
        for series in &self.series {
            for (i, value) in series.values.iter().enumerate() {
                let error = self
                    .errors
                    .as_ref()
                    .and_then(|e| e.get(i))
                    .copied()
                    .unwrap_or(0.0);
                top = top.max(value + error);
            }
        }
        if top > 0.0 {
            top * 1.15
        } else {
            1.0
        }
    }
}

/// Slot label for a (phase, tool) combination
pub fn slot_label(tool: &str, phase: &str) -> String {
    format!("{}/{}", tool, phase)
}

/// Mean ± std of the build step per configuration, one chart per job
pub fn build_errorbar_charts(summary: &[SummaryRow]) -> Vec<Chart> {
    let jobs: BTreeSet<&str> = summary.iter().map(|s| s.job_name.as_str()).collect();
    let order = presentation_order();
    let mut charts = Vec::new();

    for job in jobs {
        let mut labels = Vec::new();
        let mut means = Vec::new();
        let mut stds = Vec::new();
        for (phase, tool) in &order {
            let found = summary
                .iter()
                .find(|s| s.job_name == job && &s.phase == phase && &s.tool == tool);
            let (mean, std) = match found.and_then(|s| s.build_mean_s.map(|m| (m, s.build_std_s))) {
                Some(stats) => stats,
                None => continue,
            };
            labels.push(slot_label(tool.as_str(), phase.as_str()));
            means.push(mean);
            stds.push(std.unwrap_or(0.0));
        }
        if means.is_empty() {
            continue;
        }

        charts.push(Chart {
            kind: ChartKind::BuildErrorbars,
            job_name: job.to_string(),
            title: format!("{} - Mean ± Std of Run nix build (s)", job),
            y_desc: "seconds".to_string(),
            labels,
            series: vec![Series {
                name: "build step".to_string(),
                values: means,
                color: BLUE_BAR,
            }],
            errors: Some(stds),
            value_label: None,
            reference: None,
        });
    }
    charts
}

/// Mean ± std of job totals per configuration, one chart per job
pub fn job_total_errorbar_charts(rows: &[BuildRow], totals: &JobTotals) -> Vec<Chart> {
    let jobs: BTreeSet<&str> = rows.iter().map(|r| r.job_name.as_str()).collect();
    let order = presentation_order();
    let mut charts = Vec::new();

    for job in jobs {
        let grouped = job_totals_by_config(rows, totals, job);
        let mut labels = Vec::new();
        let mut means = Vec::new();
        let mut stds = Vec::new();
        for (phase, tool) in &order {
            let values = match grouped.get(&(phase, tool)) {
                Some(values) => values,
                None => continue,
            };
            let m = match mean(values) {
                Some(m) => m,
                None => continue,
            };
            labels.push(slot_label(tool.as_str(), phase.as_str()));
            means.push(m);
            stds.push(sample_std_dev(values).unwrap_or(0.0));
        }
        if means.is_empty() {
            continue;
        }

        charts.push(Chart {
            kind: ChartKind::JobTotalErrorbars,
            job_name: job.to_string(),
            title: format!("{} - Mean ± Std of job total (s)", job),
            y_desc: "seconds".to_string(),
            labels,
            series: vec![Series {
                name: "job total".to_string(),
                values: means,
                color: TEAL_BAR,
            }],
            errors: Some(stds),
            value_label: None,
            reference: None,
        });
    }
    charts
}

/// Render every chart into `dir`, returning the files written.
///
/// Individual failures are logged and skipped. A build without a chart
/// backend logs one warning and renders nothing.
pub fn render_all(charts: &[Chart], dir: &Path, width: u32, height: u32) -> Vec<PathBuf> {
    let mut rendered = Vec::new();
    if charts.is_empty() {
        return rendered;
    }
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Cannot create figure directory {}: {}", dir.display(), e);
        return rendered;
    }

    for chart in charts {
        let path = dir.join(chart.file_name());
        match render_chart(chart, &path, width, height) {
            Ok(()) => {
                debug!("Chart written to {}", path.display());
                rendered.push(path);
            }
            Err(ReportError::ChartsUnavailable) => {
                warn!("Chart rendering is not available in this build; skipping figures");
                return rendered;
            }
            Err(e) => warn!("{} chart for {} failed: {}", chart.kind.prefix(), chart.job_name, e),
        }
    }
    rendered
}

/// Render one chart as a PNG file
pub fn render_chart(chart: &Chart, path: &Path, width: u32, height: u32) -> Result<()> {
    if chart.labels.is_empty() || chart.series.iter().any(|s| s.values.len() != chart.labels.len()) {
        return Err(ReportError::Chart(format!(
            "{} has inconsistent bar data",
            chart.file_name()
        )));
    }
    draw(chart, path, width, height)
}

#[cfg(not(feature = "charts"))]
fn draw(_chart: &Chart, _path: &Path, _width: u32, _height: u32) -> Result<()> {
    Err(ReportError::ChartsUnavailable)
}

#[cfg(feature = "charts")]
fn chart_err<E: std::fmt::Display>(e: E) -> ReportError {
    ReportError::Chart(e.to_string())
}

#[cfg(feature = "charts")]
fn draw(chart: &Chart, path: &Path, width: u32, height: u32) -> Result<()> {
    use plotters::prelude::*;
    use plotters::style::text_anchor::{HPos, Pos, VPos};

    let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let slots = chart.labels.len();
    let x_range = -0.5f64..(slots as f64 - 0.5);
    let y_range = 0f64..chart.y_max();

    let mut context = ChartBuilder::on(&root)
        .caption(&chart.title, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, y_range)
        .map_err(chart_err)?;

    // Integer ticks land on slot centres; anything else gets no label
    let labels = chart.labels.clone();
    context
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(slots)
        .x_label_formatter(&move |x| {
            let slot = x.round();
            if (x - slot).abs() > 1e-6 || slot < 0.0 {
                return String::new();
            }
            labels.get(slot as usize).cloned().unwrap_or_default()
        })
        .x_label_style(("sans-serif", 13))
        .y_desc(chart.y_desc.as_str())
        .label_style(("sans-serif", 15))
        .draw()
        .map_err(chart_err)?;

    let group_width = 0.8;
    let bar_width = group_width / chart.series.len() as f64;

    for (k, series) in chart.series.iter().enumerate() {
        let (r, g, b) = series.color;
        let color = RGBColor(r, g, b);
        let offset = -group_width / 2.0 + k as f64 * bar_width;

        let bars = series.values.iter().enumerate().map(move |(i, value)| {
            let left = i as f64 + offset;
            Rectangle::new([(left, 0.0), (left + bar_width, *value)], color.mix(0.9).filled())
        });
        let anno = context.draw_series(bars).map_err(chart_err)?;
        if chart.series.len() > 1 {
            anno.label(series.name.clone()).legend(move |(x, y)| {
                Rectangle::new([(x, y - 5), (x + 12, y + 5)], color.filled())
            });
        }

        if let Some(value_label) = chart.value_label {
            let style = TextStyle::from(("sans-serif", 13).into_font())
                .pos(Pos::new(HPos::Center, VPos::Bottom));
            let texts = series.values.iter().enumerate().map(|(i, value)| {
                let centre = i as f64 + offset + bar_width / 2.0;
                Text::new(value_label.format(*value), (centre, *value), style.clone())
            });
            context.draw_series(texts).map_err(chart_err)?;
        }
    }

    if let (Some(errors), Some(first)) = (&chart.errors, chart.series.first()) {
        let centre_offset = -group_width / 2.0 + bar_width / 2.0;
        let cap = bar_width / 6.0;
        let mut whiskers = Vec::new();
        for (i, (value, error)) in first.values.iter().zip(errors).enumerate() {
            if *error <= 0.0 {
                continue;
            }
            let x = i as f64 + centre_offset;
            let (low, high) = ((value - error).max(0.0), value + error);
            whiskers.push(vec![(x, low), (x, high)]);
            whiskers.push(vec![(x - cap, low), (x + cap, low)]);
            whiskers.push(vec![(x - cap, high), (x + cap, high)]);
        }
        context
            .draw_series(
                whiskers
                    .into_iter()
                    .map(|points| PathElement::new(points, BLACK.stroke_width(1))),
            )
            .map_err(chart_err)?;
    }

    if let Some(reference) = chart.reference {
        let dashes = (0..slots * 5).map(|d| {
            let start = -0.5 + d as f64 * 0.2;
            PathElement::new(vec![(start, reference), (start + 0.1, reference)], BLACK.mix(0.5))
        });
        context.draw_series(dashes).map_err(chart_err)?;
    }

    if chart.series.len() > 1 {
        context
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(chart_err)?;
    }

    root.present().map_err(chart_err)?;
    Ok(())
}
