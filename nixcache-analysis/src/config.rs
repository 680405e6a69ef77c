//! Configuration management for nix cache reports

use nixcache_common::{
    ReportError, Result, BUILD_STEP_NAME, COMBINED_FILE, DETAIL_FILE, FIGURES_DIR, JOBS_FILE,
    RUNS_FILE, SELECTION_FILE, SPEEDUP_FILE, STEPS_FILE, SUMMARY_FILE,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the main variant's log directory
pub const ENV_LOG_DIR: &str = "NIXCACHE_LOG_DIR";
/// Environment variable overriding the main variant's result directory
pub const ENV_RESULT_DIR: &str = "NIXCACHE_RESULT_DIR";
/// Environment variable overriding the measured step name
pub const ENV_BUILD_STEP: &str = "NIXCACHE_BUILD_STEP";

/// Report configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory holding the exported CSVs
    pub log_dir: PathBuf,
    /// Directory receiving reports and figures
    pub result_dir: PathBuf,
    pub preliminary_log_dir: PathBuf,
    pub preliminary_result_dir: PathBuf,
    /// Step whose duration is measured
    pub build_step_name: String,
    /// Chart width in pixels
    pub chart_width: u32,
    /// Chart height in pixels
    pub chart_height: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("reports/actions_log"),
            result_dir: PathBuf::from("reports/my_result"),
            preliminary_log_dir: PathBuf::from("reports/preliminary_study/actions_log"),
            preliminary_result_dir: PathBuf::from("reports/preliminary_study/my_result"),
            build_step_name: BUILD_STEP_NAME.to_string(),
            chart_width: 1500,
            chart_height: 600,
        }
    }
}

impl ReportConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ReportError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply overrides from a variable lookup (the process environment in practice)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_RESULT_DIR) {
            self.result_dir = PathBuf::from(dir);
        }
        if let Some(step) = lookup(ENV_BUILD_STEP) {
            if !step.trim().is_empty() {
                self.build_step_name = step;
            }
        }
    }

    /// Input locations of the main variant
    pub fn inputs(&self) -> InputPaths {
        InputPaths::in_dir(&self.log_dir)
    }

    /// Output locations of the main variant
    pub fn outputs(&self) -> OutputPaths {
        OutputPaths::in_dir(&self.result_dir)
    }

    /// Input locations of the preliminary variant
    pub fn preliminary_inputs(&self) -> InputPaths {
        InputPaths::in_dir(&self.preliminary_log_dir)
    }

    /// Output locations of the preliminary variant
    pub fn preliminary_outputs(&self) -> OutputPaths {
        OutputPaths::in_dir(&self.preliminary_result_dir)
    }
}

/// Configuration source for loading report settings
pub enum ConfigSource {
    File(PathBuf),
    Environment,
}

/// Load report configuration from a source, then apply environment overrides
pub fn load_config(source: ConfigSource) -> Result<ReportConfig> {
    let mut config = match source {
        ConfigSource::File(path) => ReportConfig::from_file(&path)?,
        ConfigSource::Environment => ReportConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

/// Locations of the exported CI records
#[derive(Debug, Clone, PartialEq)]
pub struct InputPaths {
    pub dir: PathBuf,
    pub steps: PathBuf,
    pub runs: PathBuf,
    pub jobs: PathBuf,
    pub selection: PathBuf,
}

impl InputPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            steps: dir.join(STEPS_FILE),
            runs: dir.join(RUNS_FILE),
            jobs: dir.join(JOBS_FILE),
            selection: dir.join(SELECTION_FILE),
        }
    }
}

/// Locations of the generated reports
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub detail: PathBuf,
    pub speedup: PathBuf,
    pub combined: PathBuf,
    pub summary: PathBuf,
    pub fig_dir: PathBuf,
}

impl OutputPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detail: dir.join(DETAIL_FILE),
            speedup: dir.join(SPEEDUP_FILE),
            combined: dir.join(COMBINED_FILE),
            summary: dir.join(SUMMARY_FILE),
            fig_dir: dir.join(FIGURES_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_layout() {
        let config = ReportConfig::default();
        let inputs = config.inputs();
        let outputs = config.outputs();

        assert_eq!(inputs.steps, PathBuf::from("reports/actions_log/actions_steps.csv"));
        assert_eq!(inputs.selection, PathBuf::from("reports/actions_log/selection.csv"));
        assert_eq!(outputs.summary, PathBuf::from("reports/my_result/summary.csv"));
        assert_eq!(outputs.fig_dir, PathBuf::from("reports/my_result/figures"));
        assert_eq!(
            config.preliminary_inputs().runs,
            PathBuf::from("reports/preliminary_study/actions_log/actions_runs.csv")
        );
        assert_eq!(config.build_step_name, "Run nix build");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_LOG_DIR, "/data/logs"),
            (ENV_BUILD_STEP, "Build"),
        ]
        .into_iter()
        .collect();

        let mut config = ReportConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.log_dir, PathBuf::from("/data/logs"));
        assert_eq!(config.result_dir, PathBuf::from("reports/my_result"));
        assert_eq!(config.build_step_name, "Build");
    }

    #[test]
    fn test_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.toml");
        std::fs::write(
            &path,
            "log_dir = \"ci/logs\"\n\
             result_dir = \"ci/out\"\n\
             build_step_name = \"Build\"\n\
             chart_width = 800\n\
             chart_height = 400\n",
        )
        .unwrap();

        let loaded = ReportConfig::from_file(&path).unwrap();
        assert_eq!(loaded.log_dir, PathBuf::from("ci/logs"));
        assert_eq!(loaded.inputs().selection, PathBuf::from("ci/logs/selection.csv"));
        assert_eq!(loaded.outputs().fig_dir, PathBuf::from("ci/out/figures"));
        assert_eq!(loaded.build_step_name, "Build");
        assert_eq!((loaded.chart_width, loaded.chart_height), (800, 400));
        assert_eq!(loaded.preliminary_log_dir, ReportConfig::default().preliminary_log_dir);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.toml");
        std::fs::write(&path, "result_dir = \"out\"\n").unwrap();

        let loaded = ReportConfig::from_file(&path).unwrap();
        assert_eq!(loaded.result_dir, PathBuf::from("out"));
        assert_eq!(loaded.log_dir, PathBuf::from("reports/actions_log"));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.toml");
        std::fs::write(&path, "chart_width = \"wide\"\n").unwrap();

        let err = ReportConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ReportError::Config(_)));
    }
}
