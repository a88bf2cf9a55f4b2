//! Plaintext run reports.
//!
//! Exactly one report exists per run: `{run_id}_report.txt` after normal
//! completion of step 8, or `{run_id}_halted_report.txt` written by the halt
//! handler. Reports are product artifacts, independent of dev tracing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::protocol::step_name;
use crate::core::types::HaltKind;
use crate::io::artifacts::write_text;
use crate::io::config::Limits;
use crate::io::state::BrickState;

const RULE: &str = "============================================================";

/// Report path for a run; halted reports get their own name.
pub fn report_path(runs_dir: &Path, run_id: &str, halted: bool) -> PathBuf {
    if halted {
        runs_dir.join(format!("{run_id}_halted_report.txt"))
    } else {
        runs_dir.join(format!("{run_id}_report.txt"))
    }
}

/// Write report content to its run-scoped path.
pub fn write_report(runs_dir: &Path, run_id: &str, content: &str, halted: bool) -> Result<PathBuf> {
    let path = report_path(runs_dir, run_id, halted);
    write_text(&path, content).context("write report")?;
    Ok(path)
}

/// Full human-readable report for a completed run.
pub fn completed_report(state: &BrickState) -> String {
    let contracts = serde_json::to_string_pretty(&state.enumerated_functions)
        .unwrap_or_else(|_| "[]".to_string());
    let test_command = state.test_command.as_deref().unwrap_or("-");
    let ui_run_command = match state.ui_runner_path.as_deref() {
        Some(runner) => format!("python {runner}"),
        None => "-".to_string(),
    };

    let mut out = String::new();
    out.push_str(&format!("{RULE}\nBRICK COMMISSION REPORT\n{RULE}\n\n"));
    out.push_str(&format!("Module: {}\n", state.module_name));
    out.push_str(&format!(
        "Brick Function: {}\n",
        state.selected_function.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!("Run ID: {}\n", state.run_id));
    out.push_str("Status: completed\n\n");
    out.push_str(&format!("FUNCTION CONTRACT\n-----------------\n{contracts}\n\n"));
    out.push_str("FILES CHANGED\n-------------\n");
    push_list(&mut out, &state.files_touched);
    out.push_str(&format!("\nTEST COMMAND\n------------\n{test_command}\n\n"));
    out.push_str(&format!(
        "COVERAGE COMMAND\n----------------\n{}\n\n",
        state.coverage_command.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!("UI RUN COMMAND\n--------------\n{ui_run_command}\n\n"));
    out.push_str("UI URL\n------\nhttp://127.0.0.1:8000\n\n");
    out.push_str(&format!(
        "UI FILE\n-------\n{}\n\n",
        state.ui_path.as_deref().unwrap_or("-")
    ));
    out.push_str("RUNTIME METRICS\n---------------\n");
    out.push_str(&format!("Wall Time: {:.2}s\n", state.wall_time_elapsed));
    out.push_str(&format!("LLM Calls: {}\n\n", state.llm_calls_made));
    out.push_str("NEXT STEPS\n----------\n");
    out.push_str(&format!("1. Run tests: {test_command}\n"));
    out.push_str(&format!("2. Run UI server: {ui_run_command}\n"));
    out.push_str("3. Open UI in browser: http://127.0.0.1:8000\n");
    out.push_str("4. Verify function behavior matches expectations\n\n");
    out.push_str(&format!("{RULE}\n"));
    out
}

/// Diagnostic report written by the halt handler.
pub fn halted_report(state: &BrickState, limits: &Limits, kind: HaltKind, reason: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{RULE}\nBRICK COMMISSION HALTED - {}\n{RULE}\n\n",
        kind.as_str().to_uppercase()
    ));
    out.push_str(&format!("Reason: {reason}\n"));
    out.push_str(&format!("Module: {}\n", state.module_name));
    out.push_str(&format!(
        "Current Step: {} - {}\n",
        state.current_step,
        step_name(state.current_step)
    ));
    out.push_str(&format!("Wall Time Elapsed: {:.2}s\n", state.wall_time_elapsed));
    out.push_str(&format!("LLM Calls Made: {}\n\n", state.llm_calls_made));
    out.push_str("BLOCKING QUESTIONS\n------------------\n");
    push_list(&mut out, &state.blocking_questions);
    out.push_str("\nFILES TOUCHED\n-------------\n");
    push_list(&mut out, &state.files_touched);
    out.push_str("\nWHAT TO ADJUST\n--------------\n");
    if kind == HaltKind::Protocol {
        out.push_str(
            "- Internal fault (illegal step transition); please report this run's state file\n",
        );
    } else {
        out.push_str(
            "- If timeout: increase limits.per_call_timeout_secs or limits.max_brick_wall_time_secs\n",
        );
        out.push_str("- If max calls: increase limits.max_calls_per_brick\n");
        out.push_str("- If max files: increase limits.max_file_changes\n");
        out.push_str("- If questions: clarify the specification and retry\n");
        out.push_str("- If coverage: review test coverage requirements\n");
        out.push_str("- If stop: remove the stop file to allow a new run\n");
    }
    out.push_str("\nCurrent Limits:\n");
    out.push_str(&format!(
        "- Per call timeout: {}s\n",
        limits.per_call_timeout_secs
    ));
    out.push_str(&format!(
        "- Max calls per brick: {}\n",
        limits.max_calls_per_brick
    ));
    out.push_str(&format!(
        "- Max brick wall time: {}s\n",
        limits.max_brick_wall_time_secs
    ));
    out.push_str(&format!("- Max file changes: {}\n\n", limits.max_file_changes));
    out.push_str(&format!("{RULE}\n"));
    out
}

fn push_list(out: &mut String, items: &[String]) {
    if items.is_empty() {
        out.push_str("  None\n");
        return;
    }
    for item in items {
        out.push_str(&format!("  - {item}\n"));
    }
}
