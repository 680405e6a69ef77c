use std::cmp::Ordering;
use std::fmt;

/// Name of the CI step whose duration is measured
pub const BUILD_STEP_NAME: &str = "Run nix build";

/// Input file names expected in the actions log directory
pub const STEPS_FILE: &str = "actions_steps.csv";
pub const RUNS_FILE: &str = "actions_runs.csv";
pub const JOBS_FILE: &str = "actions_jobs.csv";
pub const SELECTION_FILE: &str = "selection.csv";

/// Output file names written to the result directory
pub const DETAIL_FILE: &str = "detail.csv";
pub const SPEEDUP_FILE: &str = "speedup.csv";
pub const COMBINED_FILE: &str = "combined.csv";
pub const SUMMARY_FILE: &str = "summary.csv";
pub const FIGURES_DIR: &str = "figures";

/// Run number as assigned by the CI provider
pub type RunNumber = u64;

/// Build cache mechanism under test.
///
/// Normalization is total: every raw identifier maps to a variant, with
/// unrecognised names carried verbatim in [`Tool::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tool {
    None,
    Cachix,
    CacheNixAction,
    MagicNixCache,
    Other(String),
}

impl Tool {
    /// Maps a raw tool identifier (canonical name or action alias) to a tool
    pub fn normalize(raw: &str) -> Tool {
        match raw {
            "none" => Tool::None,
            "cachix" | "cachix-action" => Tool::Cachix,
            "cache-nix-action" => Tool::CacheNixAction,
            "magic-nix-cache" | "magic-nix-cache-action" => Tool::MagicNixCache,
            other => Tool::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Tool::None => "none",
            Tool::Cachix => "cachix",
            Tool::CacheNixAction => "cache-nix-action",
            Tool::MagicNixCache => "magic-nix-cache",
            Tool::Other(name) => name,
        }
    }

    pub fn is_baseline(&self) -> bool {
        matches!(self, Tool::None)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Tool {
    fn from(raw: String) -> Self {
        Tool::normalize(&raw)
    }
}

impl From<Tool> for String {
    fn from(tool: Tool) -> Self {
        tool.as_str().to_string()
    }
}

// Reports sort on the rendered name, not on declaration order.
impl Ord for Tool {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for Tool {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Build phase encoded in the job name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Priming a cache from scratch
    GenerateCache,
    /// Consuming a cache produced by an earlier run
    UseCache,
    Other(String),
}

impl Phase {
    pub fn parse(raw: &str) -> Phase {
        match raw {
            "generate-cache" => Phase::GenerateCache,
            "use-cache" => Phase::UseCache,
            other => Phase::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Phase::GenerateCache => "generate-cache",
            Phase::UseCache => "use-cache",
            Phase::Other(name) => name,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Phase {
    fn from(raw: String) -> Self {
        Phase::parse(&raw)
    }
}

impl From<Phase> for String {
    fn from(phase: Phase) -> Self {
        phase.as_str().to_string()
    }
}

impl Ord for Phase {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for Phase {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fixed (phase, tool) order used when presenting a job's configurations
pub fn presentation_order() -> [(Phase, Tool); 7] {
    [
        (Phase::GenerateCache, Tool::None),
        (Phase::GenerateCache, Tool::Cachix),
        (Phase::UseCache, Tool::Cachix),
        (Phase::GenerateCache, Tool::CacheNixAction),
        (Phase::UseCache, Tool::CacheNixAction),
        (Phase::GenerateCache, Tool::MagicNixCache),
        (Phase::UseCache, Tool::MagicNixCache),
    ]
}
