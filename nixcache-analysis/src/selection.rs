//! Run selection
//!
//! The main analysis includes every build job of whitelisted runs; the
//! preliminary study includes a fixed set of run numbers.

use crate::loader::{field, read_records};
use crate::utils::unquote;
use crate::AllowedEntry;
use nixcache_common::{Result, RunNumber};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Inclusion predicate applied to every candidate build row
pub trait RunSelector {
    fn includes(&self, run_id: &str, run_number: RunNumber, job_name_raw: &str) -> bool;
}

/// Read the selection whitelist. Rows without a run id are ignored.
pub fn read_selection(path: &Path) -> Result<Vec<AllowedEntry>> {
    let records = read_records(path)?;
    let mut entries = Vec::with_capacity(records.len());

    for record in &records {
        let run_id = unquote(field(record, &["run_id"]).unwrap_or_default());
        if run_id.is_empty() {
            continue;
        }
        let run_number = field(record, &["run_number", "run_no"])
            .and_then(|rn| rn.trim().parse::<RunNumber>().ok());
        let note = field(record, &["note", "reason"]).unwrap_or_default().trim();

        entries.push(AllowedEntry {
            run_id: run_id.to_string(),
            run_number,
            note: note.to_string(),
        });
    }

    debug!("Selection {} lists {} runs", path.display(), entries.len());
    Ok(entries)
}

/// Whitelist of run ids; a listed run contributes all of its build jobs
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    run_ids: HashSet<String>,
}

impl Whitelist {
    pub fn new(entries: &[AllowedEntry]) -> Self {
        Self {
            run_ids: entries.iter().map(|e| e.run_id.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.run_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.run_ids.is_empty()
    }
}

impl RunSelector for Whitelist {
    fn includes(&self, run_id: &str, _run_number: RunNumber, _job_name_raw: &str) -> bool {
        self.run_ids.contains(run_id)
    }
}

/// Fixed set of run numbers
#[derive(Debug, Clone)]
pub struct TargetRuns {
    run_numbers: HashSet<RunNumber>,
}

impl TargetRuns {
    pub fn new(run_numbers: impl IntoIterator<Item = RunNumber>) -> Self {
        Self {
            run_numbers: run_numbers.into_iter().collect(),
        }
    }

    pub fn contains(&self, run_number: RunNumber) -> bool {
        self.run_numbers.contains(&run_number)
    }
}

impl RunSelector for TargetRuns {
    fn includes(&self, _run_id: &str, run_number: RunNumber, _job_name_raw: &str) -> bool {
        self.contains(run_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_read_selection_with_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selection.csv");
        fs::write(
            &path,
            "run_id,run_no,reason\n\"111\",5,first cycle\n222,,\n,7,no id\n333,abc,bad number\n",
        )
        .unwrap();

        let entries = read_selection(&path).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0],
            AllowedEntry {
                run_id: "111".to_string(),
                run_number: Some(5),
                note: "first cycle".to_string(),
            }
        );
        assert_eq!(entries[1].run_number, None);
        assert_eq!(entries[1].note, "");
        assert_eq!(entries[2].run_id, "333");
        assert_eq!(entries[2].run_number, None);
    }

    #[test]
    fn test_read_selection_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_selection(&dir.path().join("selection.csv")).is_err());
    }

    #[test]
    fn test_whitelist_ignores_run_number_and_note() {
        let whitelist = Whitelist::new(&[AllowedEntry {
            run_id: "r1".to_string(),
            run_number: Some(99),
            note: "anything".to_string(),
        }]);

        assert!(whitelist.includes("r1", 5, "build_zenn_cachetool_none_phase_use-cache"));
        assert!(whitelist.includes("r1", 99, "lint"));
        assert!(!whitelist.includes("r2", 99, "build_zenn_cachetool_none_phase_use-cache"));
        assert_eq!(whitelist.len(), 1);
    }

    #[test]
    fn test_target_runs() {
        let targets = TargetRuns::new([2, 3, 4]);
        assert!(targets.includes("any", 3, "job"));
        assert!(!targets.includes("any", 5, "job"));
    }
}
