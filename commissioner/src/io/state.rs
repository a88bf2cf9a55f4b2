//! Durable run state, persisted after every mutation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::protocol::FIRST_STEP;
use crate::core::types::{FunctionContract, RunStatus};

/// Persisted bookkeeping for one brick run (`<runs_dir>/<run_id>.json`).
///
/// Mutated exclusively by the orchestrator and written through synchronously,
/// so an external observer sees true progress at all times.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrickState {
    /// Unique, immutable run identifier.
    pub run_id: String,
    /// Module being implemented.
    pub module_name: String,
    /// Provenance pointer to the module spec file, when one was given.
    pub module_spec_path: Option<String>,
    /// Current protocol step (1..=8).
    pub current_step: u8,
    /// Function contracts from step 1; write-once.
    pub enumerated_functions: Vec<FunctionContract>,
    /// Name of the brick function, set once in step 2.
    pub selected_function: Option<String>,
    /// Paths written so far; append-only, recorded at or before the write.
    pub files_touched: Vec<String>,
    /// Command recorded in step 5 for reuse by step 6 and the report.
    pub test_command: Option<String>,
    /// Command recorded in step 6 for the report.
    pub coverage_command: Option<String>,
    pub ui_path: Option<String>,
    pub ui_runner_path: Option<String>,
    pub report_path: Option<String>,
    /// Populated only when the model reports incompleteness.
    pub blocking_questions: Vec<String>,
    /// Creation timestamp, the wall-time accounting origin.
    pub started_at_epoch_secs: u64,
    /// Seconds since start; clamped non-decreasing.
    pub wall_time_elapsed: f64,
    /// Model call attempts, abandoned-by-timeout calls included.
    pub llm_calls_made: u32,
    pub status: RunStatus,
}

/// Store keyed by `run_id` under a runs directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    runs_dir: PathBuf,
}

impl StateStore {
    pub fn new(runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            runs_dir: runs_dir.into(),
        }
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    pub fn state_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(format!("{run_id}.json"))
    }

    /// Create and persist a fresh state at step 1.
    pub fn create_state(
        &self,
        module_name: &str,
        module_spec_path: Option<&Path>,
    ) -> Result<BrickState> {
        let run_id = self.generate_run_id(module_name)?;
        let state = BrickState {
            run_id,
            module_name: module_name.to_string(),
            module_spec_path: module_spec_path.map(|p| p.display().to_string()),
            current_step: FIRST_STEP,
            enumerated_functions: Vec::new(),
            selected_function: None,
            files_touched: Vec::new(),
            test_command: None,
            coverage_command: None,
            ui_path: None,
            ui_runner_path: None,
            report_path: None,
            blocking_questions: Vec::new(),
            started_at_epoch_secs: epoch_secs(),
            wall_time_elapsed: 0.0,
            llm_calls_made: 0,
            status: RunStatus::Running,
        };
        self.save_state(&state)?;
        Ok(state)
    }

    /// Atomically persist state (temp file + rename).
    pub fn save_state(&self, state: &BrickState) -> Result<()> {
        debug!(run_id = %state.run_id, step = state.current_step, "writing run state");
        let path = self.state_path(&state.run_id);
        fs::create_dir_all(&self.runs_dir)
            .with_context(|| format!("create runs dir {}", self.runs_dir.display()))?;
        let mut buf = serde_json::to_string_pretty(state)?;
        buf.push('\n');
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, buf)
            .with_context(|| format!("write temp state {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("replace state {}", path.display()))?;
        Ok(())
    }

    pub fn load_state(&self, run_id: &str) -> Result<BrickState> {
        let path = self.state_path(run_id);
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read state {}", path.display()))?;
        let state: BrickState = serde_json::from_str(&contents)
            .with_context(|| format!("parse state {}", path.display()))?;
        Ok(state)
    }

    /// Refresh `wall_time_elapsed`, never letting it decrease.
    pub fn update_wall_time(&self, state: &mut BrickState) {
        let elapsed = epoch_secs().saturating_sub(state.started_at_epoch_secs) as f64;
        if elapsed > state.wall_time_elapsed {
            state.wall_time_elapsed = elapsed;
        }
    }

    /// Sorted run ids with a persisted state file.
    pub fn list_runs(&self) -> Result<Vec<String>> {
        if !self.runs_dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.runs_dir)
            .with_context(|| format!("read {}", self.runs_dir.display()))?
        {
            let entry = entry.context("read entry")?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// `<module>_<epoch>`, suffixed if a state file already holds the id.
    fn generate_run_id(&self, module_name: &str) -> Result<String> {
        let base = format!("{module_name}_{}", epoch_secs());
        if !self.state_path(&base).exists() {
            return Ok(base);
        }
        for suffix in 2..=999u32 {
            let id = format!("{base}_{suffix}");
            if !self.state_path(&id).exists() {
                return Ok(id);
            }
        }
        Err(anyhow!("could not allocate a unique run id for {base}"))
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies write -> read preserves all fields.
    #[test]
    fn state_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path().join("runs"));

        let mut state = store.create_state("calc", None).expect("create");
        state.selected_function = Some("add".to_string());
        state.files_touched.push("calc.py".to_string());
        state.llm_calls_made = 3;
        state.status = RunStatus::Halted;
        store.save_state(&state).expect("save");

        let loaded = store.load_state(&state.run_id).expect("load");
        assert_eq!(loaded, state);
    }

    #[test]
    fn create_starts_at_step_one_running() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path().join("runs"));
        let state = store.create_state("calc", None).expect("create");
        assert_eq!(state.current_step, FIRST_STEP);
        assert_eq!(state.status, RunStatus::Running);
        assert!(store.state_path(&state.run_id).is_file());
    }

    /// Two states created in the same second get distinct run ids.
    #[test]
    fn run_ids_are_unique() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path().join("runs"));
        let first = store.create_state("calc", None).expect("first");
        let second = store.create_state("calc", None).expect("second");
        assert_ne!(first.run_id, second.run_id);
    }

    /// Wall time never decreases, even against a future start timestamp.
    #[test]
    fn wall_time_is_monotonic() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path().join("runs"));
        let mut state = store.create_state("calc", None).expect("create");
        state.wall_time_elapsed = 10.0;
        state.started_at_epoch_secs = epoch_secs();
        store.update_wall_time(&mut state);
        assert!(state.wall_time_elapsed >= 10.0);
    }

    #[test]
    fn list_runs_is_sorted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path().join("runs"));
        let a = store.create_state("beta", None).expect("a");
        let b = store.create_state("alpha", None).expect("b");
        let runs = store.list_runs().expect("list");
        assert_eq!(runs.len(), 2);
        assert!(runs.contains(&a.run_id));
        assert!(runs.contains(&b.run_id));
        let mut sorted = runs.clone();
        sorted.sort();
        assert_eq!(runs, sorted);
    }
}
