//! Model client abstraction for the commissioning steps.
//!
//! The [`ModelClient`] trait decouples the orchestrator from the model
//! backend. Production shells out to a configured adapter command; tests use
//! scripted clients that return predetermined replies without spawning
//! processes.
//!
//! Counting rule: every attempted round trip increments the call counter,
//! including calls abandoned at the per-call deadline, so budget accounting
//! stays accurate.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::core::budget::check_call_budget;
use crate::core::errors::CallTimeoutError;
use crate::io::config::CommissionerConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::schema::StepSchema;

/// One model round trip request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub schema: StepSchema,
}

/// Abstraction over model backends.
pub trait ModelClient {
    /// Perform one round trip and return the raw JSON reply.
    fn call(&mut self, request: &ModelRequest) -> Result<Value>;

    /// Round trips attempted so far, abandoned-by-timeout calls included.
    fn calls_made(&self) -> u32;
}

/// The fabricated reply used when `dry_run` is enabled.
///
/// No adapter process is spawned and the attempt is not counted; the
/// orchestrator short-circuits on the `dry_run` marker.
pub fn dry_run_reply() -> Value {
    json!({
        "dry_run": true,
        "mock_response": "Dry-run mode: no model call was made.",
        "questions": [],
        "is_complete": true
    })
}

/// Client that spawns the configured model adapter command.
///
/// The adapter receives `{"system_prompt", "user_prompt", "schema"}` as JSON
/// on stdin and must print the model's JSON reply on stdout. A call still
/// running at `per_call_timeout_secs` is killed and surfaces as
/// [`CallTimeoutError`].
pub struct CmdModelClient {
    command: Vec<String>,
    timeout: Duration,
    max_calls: u32,
    output_limit_bytes: usize,
    dry_run: bool,
    logs_dir: PathBuf,
    calls_made: u32,
}

impl CmdModelClient {
    pub fn from_config(config: &CommissionerConfig, root: &Path) -> Self {
        Self {
            command: config.model.command.clone(),
            timeout: Duration::from_secs(config.limits.per_call_timeout_secs),
            max_calls: config.limits.max_calls_per_brick,
            output_limit_bytes: config.model.output_limit_bytes,
            dry_run: config.dry_run,
            logs_dir: root.join(&config.logs_dir),
            calls_made: 0,
        }
    }
}

impl ModelClient for CmdModelClient {
    fn call(&mut self, request: &ModelRequest) -> Result<Value> {
        if self.dry_run {
            debug!(schema = request.schema.name(), "dry run, fabricating reply");
            return Ok(dry_run_reply());
        }

        check_call_budget(self.calls_made, self.max_calls)?;
        // Count before the round trip so an abandoned call is still included.
        self.calls_made += 1;
        let attempt = self.calls_made;
        let started = Instant::now();
        info!(attempt, schema = request.schema.name(), "calling model adapter");

        let payload = serde_json::to_vec(&json!({
            "system_prompt": request.system_prompt,
            "user_prompt": request.user_prompt,
            "schema": request.schema.as_value(),
        }))
        .context("serialize adapter request")?;

        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);

        let outcome = run_command_with_timeout(
            cmd,
            Some(payload.as_slice()),
            self.timeout,
            self.output_limit_bytes,
        );

        let output = match outcome {
            Ok(output) => output,
            Err(err) => {
                self.write_call_log(attempt, request, started, Err(&err))?;
                return Err(err.context("run model adapter"));
            }
        };

        let reply = if output.timed_out {
            warn!(
                timeout_secs = self.timeout.as_secs(),
                "model adapter timed out"
            );
            Err(anyhow::Error::from(CallTimeoutError {
                timeout_secs: self.timeout.as_secs(),
            }))
        } else if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model adapter failed");
            Err(anyhow!(
                "model adapter exited with status {:?}",
                output.status.code()
            ))
        } else {
            serde_json::from_slice(&output.stdout)
                .context("parse adapter reply as JSON")
        };

        match reply {
            Ok(value) => {
                self.write_call_log(attempt, request, started, Ok(&value))?;
                Ok(value)
            }
            Err(err) => {
                self.write_call_log(attempt, request, started, Err(&err))?;
                Err(err)
            }
        }
    }

    fn calls_made(&self) -> u32 {
        self.calls_made
    }
}

impl CmdModelClient {
    /// Persist one call log under `logs_dir` (`call_<n>.json`).
    fn write_call_log(
        &self,
        attempt: u32,
        request: &ModelRequest,
        started: Instant,
        outcome: std::result::Result<&Value, &anyhow::Error>,
    ) -> Result<()> {
        fs::create_dir_all(&self.logs_dir)
            .with_context(|| format!("create logs dir {}", self.logs_dir.display()))?;
        let entry = match outcome {
            Ok(reply) => json!({
                "attempt": attempt,
                "schema": request.schema.name(),
                "system_prompt": request.system_prompt,
                "user_prompt": request.user_prompt,
                "reply": reply,
                "elapsed_seconds": started.elapsed().as_secs_f64(),
            }),
            Err(err) => json!({
                "attempt": attempt,
                "schema": request.schema.name(),
                "system_prompt": request.system_prompt,
                "user_prompt": request.user_prompt,
                "error": format!("{err:#}"),
                "elapsed_seconds": started.elapsed().as_secs_f64(),
                "failed": true,
            }),
        };
        let path = self.logs_dir.join(format!("call_{attempt}.json"));
        let mut buf = serde_json::to_string_pretty(&entry)?;
        buf.push('\n');
        fs::write(&path, buf).with_context(|| format!("write call log {}", path.display()))
    }
}
