//! nixcache - build timing reports for nix cache tools
//!
//! Umbrella crate re-exporting the shared types and the analysis pipelines.

pub use nixcache_analysis as analysis;
pub use nixcache_common as common;

/// Re-export common types and entry points
pub mod prelude {
    pub use crate::analysis::{
        run_analysis, run_preliminary, AnalysisOptions, InputPaths, OutputPaths, PipelineReport, ReportConfig,
    };
    pub use crate::common::{Phase, ReportError, Tool};
}
