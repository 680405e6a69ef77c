//! Job name classification
//!
//! Build jobs follow the naming convention
//! `build_<target>_cachetool_<tool>_phase_<phase>`. Anything else is not a
//! recognised build job and is dropped by the loader.

use nixcache_common::{Phase, Tool};
use once_cell::sync::Lazy;
use regex::Regex;

static JOB_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^build_(?P<target>[^_]+)_cachetool_(?P<tool>[^_]+)_phase_(?P<phase>.+)$")
        .expect("job name pattern is valid")
});

/// Components recovered from a build job name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobClass {
    pub target: String,
    pub tool: Tool,
    pub phase: Phase,
}

impl JobClass {
    /// Friendly job label shown in reports
    pub fn job_label(&self) -> String {
        format!("{}_build", self.target)
    }
}

/// Parse a raw job name; `None` means "not a recognised build job"
pub fn parse_job(job_name: &str) -> Option<JobClass> {
    let caps = JOB_NAME_RE.captures(job_name)?;
    Some(JobClass {
        target: caps["target"].to_string(),
        tool: Tool::normalize(&caps["tool"]),
        phase: Phase::parse(&caps["phase"]),
    })
}
