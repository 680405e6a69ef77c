use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for cache benchmark reporting
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{}", missing_inputs_message(.dir, .paths, .expected))]
    MissingInputs {
        dir: PathBuf,
        /// Inputs that were not found
        paths: Vec<PathBuf>,
        /// File names of every input the command reads
        expected: Vec<String>,
    },

    #[error("Chart rendering failed: {0}")]
    Chart(String),

    #[error("Chart rendering is not available in this build")]
    ChartsUnavailable,
}

impl ReportError {
    /// True for errors that must abort before any processing
    pub fn is_fatal_input(&self) -> bool {
        matches!(self, ReportError::MissingInputs { .. })
    }
}

fn missing_inputs_message(dir: &Path, paths: &[PathBuf], expected: &[String]) -> String {
    let mut lines = vec![format!("Input CSV missing under {}:", dir.display())];
    for path in paths {
        lines.push(format!(" - {}", path.display()));
    }
    lines.push(format!("Place {} in {}.", expected.join(", "), dir.display()));
    lines.push(format!(
        "You can fetch them via: OWNER=<OWNER> REPO=<REPO> WORKFLOW=build.yml OUTDIR={} GH_TOKEN=$GH_TOKEN bash {}/export_actions_csv.sh",
        dir.display(),
        dir.display()
    ));
    lines.join("\n")
}

pub type Result<T> = std::result::Result<T, ReportError>;
