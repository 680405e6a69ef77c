//! Shared vocabulary for the nix cache benchmark reports: tool and phase
//! identifiers, well-known file names and the common error type.

pub mod error;
pub mod types;

pub use error::{ReportError, Result};
pub use types::*;
