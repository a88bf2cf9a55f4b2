//! Coverage confirmation for the recorded test command.
//!
//! The [`CoverageRunner`] trait decouples step 6 from the actual coverage
//! tool. Tests use scripted runners that return predetermined reports.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, warn};

use crate::io::process::run_command_with_timeout;

/// Measured coverage for one test run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageReport {
    pub percent_covered: f64,
    pub success: bool,
}

/// Parameters for one coverage run.
#[derive(Debug, Clone)]
pub struct CoverageRequest {
    pub workdir: PathBuf,
    /// The test command recorded in step 5, split on whitespace.
    pub test_command: String,
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

pub trait CoverageRunner {
    fn run(&self, request: &CoverageRequest) -> Result<CoverageReport>;
}

/// Runner that executes the test command and parses the coverage TOTAL line.
pub struct CoverageCmdRunner;

impl CoverageRunner for CoverageCmdRunner {
    fn run(&self, request: &CoverageRequest) -> Result<CoverageReport> {
        let mut parts = request.test_command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("empty test command"))?;
        let mut cmd = Command::new(program);
        cmd.args(parts).current_dir(&request.workdir);

        let output =
            run_command_with_timeout(cmd, None, request.timeout, request.output_limit_bytes)
                .context("run coverage command")?;
        write_coverage_log(&request.log_path, &output.combined_text())?;

        if output.timed_out {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "coverage run timed out"
            );
            return Ok(CoverageReport {
                percent_covered: 0.0,
                success: false,
            });
        }

        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let percent = parse_coverage_percent(&combined);
        debug!(percent, success = output.status.success(), "coverage measured");
        Ok(CoverageReport {
            percent_covered: percent,
            success: output.status.success(),
        })
    }
}

/// Extract the covered percentage from a coverage report's TOTAL line.
///
/// Returns 0.0 when no TOTAL line is present.
pub fn parse_coverage_percent(output: &str) -> f64 {
    static TOTAL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^TOTAL\b.*?(\d+(?:\.\d+)?)%").expect("total line pattern")
    });
    TOTAL_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn write_coverage_log(path: &PathBuf, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create coverage log dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write coverage log {}", path.display()))
}
