//! Persistence of validation runs.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use parityguard_core::ValidationRun;

use crate::atomic::write_json_atomic;
use crate::errors::{MonitorError, Result};

/// Storage for completed validation runs.
pub trait HistoryStore: Send + Sync {
    fn append(&self, run: &ValidationRun) -> Result<()>;

    /// Runs at or after `since`, oldest first.
    fn query(&self, since: DateTime<Utc>) -> Result<Vec<ValidationRun>>;

    /// Delete runs older than `older_than`. Returns how many were removed.
    fn prune(&self, older_than: DateTime<Utc>) -> Result<usize>;
}

/// One JSON file per run under `<dir>/runs/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    root: PathBuf,
}

impl FileHistoryStore {
    /// Open a store rooted at `root`, creating the runs directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { root: root.into() };
        std::fs::create_dir_all(store.runs_dir())?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    fn run_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(MonitorError::InvalidPath(format!("unusable run id '{id}'")));
        }
        Ok(self.runs_dir().join(format!("{id}.json")))
    }

    fn read_all(&self) -> Result<Vec<(PathBuf, ValidationRun)>> {
        let dir = self.runs_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut runs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_run(&path) {
                Ok(run) => runs.push((path, run)),
                Err(err) => {
                    tracing::warn!(
                        event = "history_record_skipped",
                        path = %path.display(),
                        error = %err
                    );
                }
            }
        }
        Ok(runs)
    }
}

fn read_run(path: &Path) -> Result<ValidationRun> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn sort_runs(runs: &mut [ValidationRun]) {
    runs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
}

impl HistoryStore for FileHistoryStore {
    fn append(&self, run: &ValidationRun) -> Result<()> {
        let path = self.run_path(&run.id)?;
        write_json_atomic(&path, run)?;
        tracing::debug!(event = "history_run_recorded", run_id = %run.id, path = %path.display());
        Ok(())
    }

    fn query(&self, since: DateTime<Utc>) -> Result<Vec<ValidationRun>> {
        let mut runs: Vec<ValidationRun> = self
            .read_all()?
            .into_iter()
            .map(|(_, run)| run)
            .filter(|run| run.timestamp >= since)
            .collect();
        sort_runs(&mut runs);
        Ok(runs)
    }

    fn prune(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for (path, run) in self.read_all()? {
            if run.timestamp < older_than {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(event = "history_pruned", removed, before = %older_than);
        }
        Ok(removed)
    }
}

/// In-process store, used when no history directory is configured.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    runs: Mutex<Vec<ValidationRun>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&self, run: &ValidationRun) -> Result<()> {
        let mut runs = self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        runs.retain(|existing| existing.id != run.id);
        runs.push(run.clone());
        Ok(())
    }

    fn query(&self, since: DateTime<Utc>) -> Result<Vec<ValidationRun>> {
        let runs = self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut selected: Vec<ValidationRun> = runs
            .iter()
            .filter(|run| run.timestamp >= since)
            .cloned()
            .collect();
        sort_runs(&mut selected);
        Ok(selected)
    }

    fn prune(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut runs = self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = runs.len();
        runs.retain(|run| run.timestamp >= older_than);
        Ok(before - runs.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};
    use parityguard_core::{RunKind, ValidationResult};

    use super::*;

    fn run(id: &str, at: DateTime<Utc>) -> ValidationRun {
        ValidationRun::from_results(
            id,
            RunKind::Quick,
            at,
            5,
            vec![ValidationResult::skipped("Top Wait Events", "no data")],
        )
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, hour, 0, 0).single().expect("timestamp")
    }

    #[test]
    fn query_filters_and_sorts_by_timestamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileHistoryStore::open(dir.path()).expect("store");
        store.append(&run("run_c", at(3))).expect("append");
        store.append(&run("run_a", at(1))).expect("append");
        store.append(&run("run_b", at(2))).expect("append");

        let runs = store.query(at(2)).expect("query");
        let ids: Vec<_> = runs.iter().map(|run| run.id.as_str()).collect();
        assert_eq!(ids, vec!["run_b", "run_c"]);
        assert!(dir.path().join("runs").join("run_a.json").exists());
    }

    #[test]
    fn malformed_and_foreign_files_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileHistoryStore::open(dir.path()).expect("store");
        store.append(&run("run_ok", at(1))).expect("append");
        std::fs::write(store.runs_dir().join("broken.json"), "{not json").expect("write");
        std::fs::write(store.runs_dir().join("notes.txt"), "ignored").expect("write");

        let runs = store.query(at(0)).expect("query");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, "run_ok");
    }

    #[test]
    fn prune_removes_old_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileHistoryStore::open(dir.path()).expect("store");
        store.append(&run("run_old", at(1))).expect("append");
        store.append(&run("run_new", at(5))).expect("append");

        let removed = store.prune(at(5) - TimeDelta::hours(1)).expect("prune");
        assert_eq!(removed, 1);
        let runs = store.query(at(0)).expect("query");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, "run_new");
    }

    #[test]
    fn rejects_path_like_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileHistoryStore::open(dir.path()).expect("store");
        assert!(matches!(
            store.append(&run("../escape", at(1))),
            Err(MonitorError::InvalidPath(_))
        ));
    }

    #[test]
    fn memory_store_replaces_same_id() {
        let store = MemoryHistoryStore::new();
        store.append(&run("run_a", at(1))).expect("append");
        store.append(&run("run_a", at(2))).expect("append");
        assert_eq!(store.len(), 1);
        assert_eq!(store.query(at(0)).expect("query")[0].timestamp, at(2));
    }
}
