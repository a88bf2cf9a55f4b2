//! Commissioner configuration stored as TOML (default `commissioner.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Commissioner configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommissionerConfig {
    pub limits: Limits,

    /// Skip model calls, schema validation, and file writes; every step
    /// simulates its decision instead.
    pub dry_run: bool,

    /// Sentinel file polled before every step; its presence halts the run.
    pub stop_file: String,

    /// Directory for run state, reports, and run-scoped artifacts.
    pub runs_dir: String,

    /// Directory for per-call model logs and coverage logs.
    pub logs_dir: String,

    pub model: ModelConfig,
}

/// Hard resource ceilings for one brick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
    /// Per model round trip timeout in seconds. The adapter process is killed
    /// at the deadline.
    pub per_call_timeout_secs: u64,

    /// Maximum model calls attempted per brick.
    pub max_calls_per_brick: u32,

    /// Total wall-clock budget for the brick in seconds.
    pub max_brick_wall_time_secs: u64,

    /// Maximum file writes per brick, generated artifacts included.
    pub max_file_changes: u32,

    /// Timeout for the local test/coverage subprocess in seconds.
    pub coverage_timeout_secs: u64,
}

/// Model adapter invocation.
///
/// The adapter command receives a JSON request
/// `{"system_prompt", "user_prompt", "schema"}` on stdin and must print the
/// model's JSON reply on stdout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Adapter argv (e.g. `["brick-model"]`).
    pub command: Vec<String>,

    /// Truncate adapter stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            per_call_timeout_secs: 300,
            max_calls_per_brick: 8,
            max_brick_wall_time_secs: 300,
            max_file_changes: 6,
            coverage_timeout_secs: 600,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: vec!["brick-model".to_string()],
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for CommissionerConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            dry_run: false,
            stop_file: "STOP".to_string(),
            runs_dir: "runs".to_string(),
            logs_dir: "logs".to_string(),
            model: ModelConfig::default(),
        }
    }
}

impl CommissionerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.limits.per_call_timeout_secs == 0 {
            return Err(anyhow!("limits.per_call_timeout_secs must be > 0"));
        }
        if self.limits.max_brick_wall_time_secs == 0 {
            return Err(anyhow!("limits.max_brick_wall_time_secs must be > 0"));
        }
        if self.limits.coverage_timeout_secs == 0 {
            return Err(anyhow!("limits.coverage_timeout_secs must be > 0"));
        }
        if self.model.command.is_empty() || self.model.command[0].trim().is_empty() {
            return Err(anyhow!("model.command must be a non-empty array"));
        }
        if self.model.output_limit_bytes == 0 {
            return Err(anyhow!("model.output_limit_bytes must be > 0"));
        }
        if self.stop_file.trim().is_empty() {
            return Err(anyhow!("stop_file must be non-empty"));
        }
        Ok(())
    }

    /// Stop-file path relative to the working root.
    pub fn stop_file_path(&self, root: &Path) -> PathBuf {
        root.join(&self.stop_file)
    }

    /// Whether the stop sentinel is present under `root`.
    pub fn stop_file_present(&self, root: &Path) -> bool {
        self.stop_file_path(root).exists()
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CommissionerConfig::default()`.
pub fn load_config(path: &Path) -> Result<CommissionerConfig> {
    if !path.exists() {
        let cfg = CommissionerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CommissionerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CommissionerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, CommissionerConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("commissioner.toml");
        let mut cfg = CommissionerConfig::default();
        cfg.limits.max_file_changes = 2;
        cfg.dry_run = true;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut cfg = CommissionerConfig::default();
        cfg.limits.per_call_timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn stop_file_probe_sees_sentinel() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = CommissionerConfig::default();
        assert!(!cfg.stop_file_present(temp.path()));
        fs::write(temp.path().join("STOP"), "").expect("write sentinel");
        assert!(cfg.stop_file_present(temp.path()));
    }
}
