//! Orchestration for one brick commission.
//!
//! `run_brick` drives the eight protocol steps in order. Budget and
//! stop-signal checks precede every step, every state mutation is persisted
//! immediately, and every failure unwinds to the single halt handler, which
//! writes the halted report and re-raises.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{info, warn};

use crate::core::budget::{check_file_changes, check_wall_time, reserve_file_change};
use crate::core::errors::{CoverageShortfallError, IncompleteError, StopRequestedError, classify};
use crate::core::events::{BrickEvent, EventSink};
use crate::core::protocol::{step_name, validate_transition};
use crate::core::types::{
    EnumerationReply, FunctionContract, PlanReply, RunStatus, TestPlanReply, UiReply,
};
use crate::io::artifacts::{
    fallback_ui_page, render_runner_script, runner_script_path, ui_page_path,
    write_text, write_workspace_file,
};
use crate::io::config::CommissionerConfig;
use crate::io::coverage::{CoverageRequest, CoverageRunner};
use crate::io::model::{ModelClient, ModelRequest};
use crate::io::prompt::{PromptEngine, StepPrompt};
use crate::io::report::{completed_report, halted_report, write_report};
use crate::io::schema::{Decoded, StepSchema, decode, validate_output};
use crate::io::spec::ModuleSpec;
use crate::io::state::{BrickState, StateStore};

/// Fixed command strings recorded for reuse by step 6 and the report.
const COVERAGE_COMMAND: &str = "coverage run -m pytest && coverage report";

/// Result of a successful commission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrickOutcome {
    pub run_id: String,
    pub report_path: PathBuf,
}

/// Drives one state object through the protocol to completion or halt.
pub struct BrickOrchestrator<'a, M, C, S>
where
    M: ModelClient,
    C: CoverageRunner,
    S: EventSink,
{
    root: &'a Path,
    config: &'a CommissionerConfig,
    store: &'a StateStore,
    state: &'a mut BrickState,
    client: &'a mut M,
    coverage: &'a C,
    events: &'a mut S,
    prompts: PromptEngine,
    files_changed: u32,
}

impl<'a, M, C, S> BrickOrchestrator<'a, M, C, S>
where
    M: ModelClient,
    C: CoverageRunner,
    S: EventSink,
{
    pub fn new(
        root: &'a Path,
        config: &'a CommissionerConfig,
        store: &'a StateStore,
        state: &'a mut BrickState,
        client: &'a mut M,
        coverage: &'a C,
        events: &'a mut S,
    ) -> Self {
        Self {
            root,
            config,
            store,
            state,
            client,
            coverage,
            events,
            prompts: PromptEngine::new(),
            files_changed: 0,
        }
    }

    /// Run the full step sequence for `spec`.
    ///
    /// On failure the halt handler has already written the halted report and
    /// marked the state; the original error is re-raised.
    pub fn run_brick(&mut self, spec: &ModuleSpec) -> Result<BrickOutcome> {
        match self.drive(spec) {
            Ok(()) => Ok(BrickOutcome {
                run_id: self.state.run_id.clone(),
                report_path: self
                    .state
                    .report_path
                    .clone()
                    .map(PathBuf::from)
                    .unwrap_or_default(),
            }),
            Err(err) => {
                self.halt(&err);
                Err(err)
            }
        }
    }

    fn drive(&mut self, spec: &ModuleSpec) -> Result<()> {
        self.step_1_enumerate(spec)?;
        self.step_2_select()?;
        self.step_3_implement()?;
        self.step_4_test_plan()?;
        self.step_5_implement_tests()?;
        self.step_6_confirm_coverage()?;
        self.step_7_build_ui()?;
        self.step_8_pause_and_report()
    }

    /// Step 1: enumerate required functions.
    ///
    /// A spec with pre-listed functions is used verbatim with no model call,
    /// so repeated runs are idempotent and free.
    fn step_1_enumerate(&mut self, spec: &ModuleSpec) -> Result<()> {
        self.begin_step(1)?;

        if !spec.required_public_functions.is_empty() {
            self.state.enumerated_functions = spec.required_public_functions.clone();
            self.store.save_state(self.state)?;
            self.events.emit(&BrickEvent::FunctionsEnumerated {
                count: self.state.enumerated_functions.len(),
            });
            return self.advance(2);
        }

        let prompt = self.prompts.enumerate(spec)?;
        let value = self.call_model(1, StepSchema::Enumeration, prompt)?;
        match decode::<EnumerationReply>(&value)? {
            Decoded::DryRun => self.advance(2),
            Decoded::Reply(reply) => {
                if !reply.is_complete {
                    return self.blocked(1, reply.questions);
                }
                self.state.enumerated_functions = reply.functions;
                self.store.save_state(self.state)?;
                self.events.emit(&BrickEvent::FunctionsEnumerated {
                    count: self.state.enumerated_functions.len(),
                });
                self.advance(2)
            }
        }
    }

    /// Step 2: select exactly one function.
    ///
    /// The only step whose failure path is non-fatal by design: any model or
    /// schema failure falls back to the enumeration order.
    fn step_2_select(&mut self) -> Result<()> {
        self.begin_step(2)?;

        if self.state.enumerated_functions.is_empty() {
            bail!("no functions enumerated");
        }
        let enumeration_order: Vec<String> = self
            .state
            .enumerated_functions
            .iter()
            .map(|f| f.name.clone())
            .collect();

        let order = match self.try_select_order() {
            Ok(order) if !order.is_empty() => order,
            Ok(_) => enumeration_order.clone(),
            Err(err) => {
                warn!(reason = %format!("{err:#}"), "selection call failed, using enumeration order");
                enumeration_order.clone()
            }
        };

        let selected = if enumeration_order.contains(&order[0]) {
            order[0].clone()
        } else {
            enumeration_order[0].clone()
        };

        info!(function = %selected, "selected brick function");
        self.state.selected_function = Some(selected.clone());
        self.store.save_state(self.state)?;
        self.events.emit(&BrickEvent::FunctionSelected { name: selected });
        self.advance(3)
    }

    fn try_select_order(&mut self) -> Result<Vec<String>> {
        let prompt = self.prompts.select(&self.state.enumerated_functions)?;
        let value = self.call_model(2, StepSchema::Enumeration, prompt)?;
        match decode::<EnumerationReply>(&value)? {
            Decoded::DryRun => Ok(Vec::new()),
            Decoded::Reply(reply) => Ok(reply.implementation_order),
        }
    }

    /// Step 3: implement the selected function.
    fn step_3_implement(&mut self) -> Result<()> {
        self.begin_step(3)?;

        let contract = self.selected_contract()?.clone();
        let prompt = self.prompts.implement(&contract)?;
        let value = self.call_model(3, StepSchema::ImplementationPlan, prompt)?;
        let reply = match decode::<PlanReply>(&value)? {
            Decoded::DryRun => return self.advance(4),
            Decoded::Reply(reply) => reply,
        };
        if !reply.is_complete {
            return self.blocked(3, reply.questions);
        }

        if let (Some(path), Some(content)) = (&reply.file_path, &reply.file_content) {
            self.write_file(path, content)?;
        }
        for extra in &reply.files_to_create {
            self.write_file(&extra.path, &extra.content)?;
        }
        self.advance(4)
    }

    /// Step 4: design a test plan targeting 100.00% statement coverage.
    fn step_4_test_plan(&mut self) -> Result<()> {
        self.begin_step(4)?;

        let contract = self.selected_contract()?.clone();
        let prompt = self.prompts.test_plan(&contract)?;
        let value = self.call_model(4, StepSchema::TestPlan, prompt)?;
        let reply = match decode::<TestPlanReply>(&value)? {
            Decoded::DryRun => return self.advance(5),
            Decoded::Reply(reply) => reply,
        };
        if !reply.is_complete {
            return self.blocked(4, reply.questions);
        }

        self.events.emit(&BrickEvent::TestPlanRecorded {
            cases: reply.test_cases.len(),
        });
        self.store.save_state(self.state)?;
        self.advance(5)
    }

    /// Step 5: implement the planned tests and record the test command.
    fn step_5_implement_tests(&mut self) -> Result<()> {
        self.begin_step(5)?;

        let contract = self.selected_contract()?.clone();
        let prompt = self.prompts.implement_tests(&contract)?;
        let value = self.call_model(5, StepSchema::ImplementationPlan, prompt)?;
        let reply = match decode::<PlanReply>(&value)? {
            Decoded::DryRun => return self.advance(6),
            Decoded::Reply(reply) => reply,
        };

        let test_path = reply
            .file_path
            .clone()
            .unwrap_or_else(|| format!("tests/test_{}.py", self.state.module_name));
        let test_content = reply.file_content.clone().unwrap_or_default();
        self.write_file(&test_path, &test_content)?;

        if self.state.test_command.is_none() {
            self.state.test_command = Some(format!("pytest {test_path} -v"));
            self.store.save_state(self.state)?;
        }
        self.advance(6)
    }

    /// Step 6: confirm 100.00% coverage, with a single bounded retry.
    ///
    /// A shortfall takes the protocol's one backward edge (6 -> 5), re-runs
    /// test implementation once, and measures again; a second shortfall is a
    /// coverage halt. The retry is a local loop, not step recursion.
    fn step_6_confirm_coverage(&mut self) -> Result<()> {
        self.begin_step(6)?;

        if self.config.dry_run {
            return self.advance(7);
        }

        let mut percent = self.measure_coverage(1)?;
        if percent < 100.0 {
            self.advance(5)?;
            self.step_5_implement_tests()?;
            self.begin_step(6)?;
            percent = self.measure_coverage(2)?;
        }
        if percent < 100.0 {
            return Err(CoverageShortfallError { percent }.into());
        }

        self.state.coverage_command = Some(COVERAGE_COMMAND.to_string());
        self.store.save_state(self.state)?;
        self.advance(7)
    }

    /// Step 7: build the verification UI and its runner script.
    fn step_7_build_ui(&mut self) -> Result<()> {
        self.begin_step(7)?;

        let contract = self.selected_contract()?.clone();
        let primary_file = self.state.files_touched.first().cloned();
        let prompt = self.prompts.build_ui(&contract, primary_file.as_deref())?;
        let value = self.call_model(7, StepSchema::UiGeneration, prompt)?;
        let reply = match decode::<UiReply>(&value)? {
            Decoded::DryRun => return self.advance(8),
            Decoded::Reply(reply) => reply,
        };
        if !reply.is_complete {
            return self.blocked(7, reply.questions);
        }

        let html = if reply.html_content.trim().is_empty() {
            fallback_ui_page(&contract.name)?
        } else {
            reply.html_content
        };
        let ui_path = ui_page_path(self.store.runs_dir(), &self.state.run_id);
        self.write_run_artifact(&ui_path, &html)?;
        self.state.ui_path = Some(ui_path.display().to_string());
        self.store.save_state(self.state)?;

        let runner = render_runner_script(primary_file.as_deref().unwrap_or(""), &contract.name)?;
        let runner_path = runner_script_path(self.store.runs_dir(), &self.state.run_id);
        self.write_run_artifact(&runner_path, &runner)?;
        self.state.ui_runner_path = Some(runner_path.display().to_string());
        self.store.save_state(self.state)?;

        self.advance(8)
    }

    /// Step 8: terminal. Finalize the state and write the completed report.
    ///
    /// Commissioning the next function is an explicit new invocation, never
    /// implicit continuation.
    fn step_8_pause_and_report(&mut self) -> Result<()> {
        self.begin_step(8)?;

        self.state.status = RunStatus::Completed;
        self.store.update_wall_time(self.state);

        let content = completed_report(self.state);
        let path = write_report(self.store.runs_dir(), &self.state.run_id, &content, false)?;
        self.state.report_path = Some(path.display().to_string());
        self.store.save_state(self.state)?;

        self.events.emit(&BrickEvent::RunCompleted {
            run_id: self.state.run_id.clone(),
        });
        Ok(())
    }

    /// Checks preceding every step (and every retry): the run must still be
    /// live, wall-time and file-change ceilings must hold, and the stop
    /// sentinel must be absent. Counters are persisted before the checks so
    /// the state record reflects true progress.
    fn begin_step(&mut self, step: u8) -> Result<()> {
        if self.state.status != RunStatus::Running {
            bail!(
                "step {step} entered with status {:?} (run already terminal)",
                self.state.status
            );
        }
        if self.state.current_step != step {
            bail!(
                "step {step} entered while state is at step {}",
                self.state.current_step
            );
        }

        self.store.update_wall_time(self.state);
        self.store.save_state(self.state)?;
        check_wall_time(
            self.state.wall_time_elapsed,
            self.config.limits.max_brick_wall_time_secs,
        )?;
        check_file_changes(self.files_changed, self.config.limits.max_file_changes)?;
        if self.config.stop_file_present(self.root) {
            return Err(StopRequestedError {
                stop_file: self.config.stop_file.clone(),
            }
            .into());
        }

        self.events.emit(&BrickEvent::StepStarted {
            step,
            name: step_name(step),
        });
        Ok(())
    }

    fn advance(&mut self, next: u8) -> Result<()> {
        validate_transition(self.state.current_step, next)?;
        self.state.current_step = next;
        self.store.update_wall_time(self.state);
        self.store.save_state(self.state)?;
        Ok(())
    }

    /// One model round trip. Call accounting is synced and persisted whether
    /// the call succeeded, failed, or was abandoned at the deadline.
    fn call_model(&mut self, step: u8, schema: StepSchema, prompt: StepPrompt) -> Result<serde_json::Value> {
        let request = ModelRequest {
            system_prompt: prompt.system,
            user_prompt: prompt.user,
            schema,
        };
        let result = self.client.call(&request);

        if self.client.calls_made() > self.state.llm_calls_made {
            self.state.llm_calls_made = self.client.calls_made();
        }
        self.store.update_wall_time(self.state);
        self.store.save_state(self.state)?;

        let value = result.with_context(|| format!("step {step} model call"))?;
        if !self.config.dry_run {
            validate_output(&value, schema)?;
        }
        self.events.emit(&BrickEvent::ModelCallCompleted {
            calls_made: self.state.llm_calls_made,
        });
        Ok(value)
    }

    /// Record the model's blocking questions and halt.
    fn blocked(&mut self, step: u8, questions: Vec<String>) -> Result<()> {
        self.state.blocking_questions = questions.clone();
        self.store.save_state(self.state)?;
        Err(IncompleteError { step, questions }.into())
    }

    fn selected_contract(&self) -> Result<&FunctionContract> {
        let name = self
            .state
            .selected_function
            .as_deref()
            .ok_or_else(|| anyhow!("no function selected"))?;
        self.state
            .enumerated_functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| anyhow!("selected function '{name}' not in enumeration"))
    }

    /// Budget-checked write of a model-chosen file under the working root.
    /// The path is recorded (and persisted) before the bytes hit disk.
    fn write_file(&mut self, rel_path: &str, content: &str) -> Result<()> {
        reserve_file_change(self.files_changed, self.config.limits.max_file_changes)?;
        self.state.files_touched.push(rel_path.to_string());
        self.store.save_state(self.state)?;
        write_workspace_file(self.root, rel_path, content)?;
        self.files_changed += 1;
        self.events.emit(&BrickEvent::FileWritten {
            path: rel_path.to_string(),
        });
        Ok(())
    }

    /// Budget-checked write of a run-scoped artifact (UI page, runner script).
    fn write_run_artifact(&mut self, path: &Path, content: &str) -> Result<()> {
        reserve_file_change(self.files_changed, self.config.limits.max_file_changes)?;
        write_text(path, content)?;
        self.files_changed += 1;
        self.events.emit(&BrickEvent::FileWritten {
            path: path.display().to_string(),
        });
        Ok(())
    }

    /// Measure coverage for the recorded test command. Runner failures read
    /// as 0.0% so they share the shortfall path.
    fn measure_coverage(&mut self, attempt: u32) -> Result<f64> {
        let test_command = self
            .state
            .test_command
            .clone()
            .ok_or_else(|| anyhow!("no test command recorded"))?;
        let request = CoverageRequest {
            workdir: self.root.to_path_buf(),
            test_command,
            log_path: self
                .root
                .join(&self.config.logs_dir)
                .join(format!("coverage_{attempt}.log")),
            timeout: Duration::from_secs(self.config.limits.coverage_timeout_secs),
            output_limit_bytes: self.config.model.output_limit_bytes,
        };
        let percent = match self.coverage.run(&request) {
            Ok(report) => report.percent_covered,
            Err(err) => {
                warn!(reason = %format!("{err:#}"), "coverage run failed");
                0.0
            }
        };
        self.events.emit(&BrickEvent::CoverageMeasured { percent, attempt });
        Ok(percent)
    }

    /// The only writer of halted reports and the only place status becomes
    /// halted. Best-effort: a report-write failure is logged, never masks the
    /// original error.
    fn halt(&mut self, err: &anyhow::Error) {
        let kind = classify(err);
        let reason = format!("{err:#}");
        self.state.status = RunStatus::Halted;
        self.store.update_wall_time(self.state);

        let content = halted_report(self.state, &self.config.limits, kind, &reason);
        match write_report(self.store.runs_dir(), &self.state.run_id, &content, true) {
            Ok(path) => self.state.report_path = Some(path.display().to_string()),
            Err(write_err) => {
                tracing::error!(reason = %format!("{write_err:#}"), "failed to write halted report");
            }
        }
        if let Err(save_err) = self.store.save_state(self.state) {
            tracing::error!(reason = %format!("{save_err:#}"), "failed to persist halted state");
        }
        self.events.emit(&BrickEvent::RunHalted { kind, reason });
    }
}
