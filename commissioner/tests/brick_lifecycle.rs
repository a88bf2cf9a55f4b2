//! Lifecycle tests driving the orchestrator with scripted doubles.

use std::fs;

use commissioner::brick::{BrickOrchestrator, BrickOutcome};
use commissioner::core::errors::{BudgetExceededError, CoverageShortfallError};
use commissioner::core::types::RunStatus;
use commissioner::io::coverage::CoverageRunner;
use commissioner::io::report::report_path;
use commissioner::io::spec::ModuleSpec;
use commissioner::io::state::BrickState;
use commissioner::test_support::{
    RecordingSink, ScriptedCoverageRunner, ScriptedModelClient, ScriptedReply, TestWorkspace,
    calc_spec, plan_reply, selection_reply, test_plan_reply, ui_reply,
};

fn commission<C: CoverageRunner>(
    ws: &TestWorkspace,
    spec: &ModuleSpec,
    client: &mut ScriptedModelClient,
    coverage: &C,
) -> (BrickState, anyhow::Result<BrickOutcome>) {
    let store = ws.store();
    let mut state = store
        .create_state(&spec.module_name, None)
        .expect("create state");
    let mut sink = RecordingSink::default();
    let result = BrickOrchestrator::new(
        ws.root(),
        &ws.config,
        &store,
        &mut state,
        client,
        coverage,
        &mut sink,
    )
    .run_brick(spec);
    (state, result)
}

/// Replies for a full run whose spec pre-enumerates the function:
/// select, implement, test plan, implement tests, build UI.
fn happy_path_replies() -> Vec<ScriptedReply> {
    vec![
        ScriptedReply::Value(selection_reply(&["add"])),
        ScriptedReply::Value(plan_reply("calc.py", "def add(a, b):\n    return a + b\n")),
        ScriptedReply::Value(test_plan_reply()),
        ScriptedReply::Value(plan_reply(
            "tests/test_calc.py",
            "def test_add():\n    assert add(1, 2) == 3\n",
        )),
        ScriptedReply::Value(ui_reply()),
    ]
}

/// End-to-end with generous limits: every artifact lands, state completes at
/// step 8, and exactly one non-halted report exists.
#[test]
fn scripted_run_completes_with_all_artifacts() {
    let ws = TestWorkspace::new().expect("workspace");
    let mut client = ScriptedModelClient::new(happy_path_replies());
    let coverage = ScriptedCoverageRunner::always(100.0);

    let (state, result) = commission(&ws, &calc_spec(), &mut client, &coverage);
    let outcome = result.expect("completed run");

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.current_step, 8);
    assert_eq!(state.selected_function.as_deref(), Some("add"));
    assert_eq!(state.llm_calls_made, 5);
    assert_eq!(
        state.files_touched,
        vec!["calc.py".to_string(), "tests/test_calc.py".to_string()]
    );
    assert!(ws.root().join("calc.py").is_file());
    assert!(ws.root().join("tests/test_calc.py").is_file());
    assert_eq!(
        state.test_command.as_deref(),
        Some("pytest tests/test_calc.py -v")
    );
    assert!(state.coverage_command.is_some());
    assert_eq!(coverage.invocations(), 1);

    let runs_dir = ws.store().runs_dir().to_path_buf();
    let ui_path = runs_dir.join(format!("{}_ui.html", state.run_id));
    let runner_path = runs_dir.join(format!("{}_runner.py", state.run_id));
    assert!(ui_path.is_file());
    assert!(runner_path.is_file());
    let runner = fs::read_to_string(&runner_path).expect("read runner");
    assert!(runner.contains("calc.py"));
    assert!(runner.contains("func_name = \"add\""));

    assert_eq!(outcome.report_path, report_path(&runs_dir, &state.run_id, false));
    assert!(outcome.report_path.is_file());
    assert!(!report_path(&runs_dir, &state.run_id, true).exists());
    let report = fs::read_to_string(&outcome.report_path).expect("read report");
    assert!(report.contains("Brick Function: add"));
    assert!(report.contains("pytest tests/test_calc.py -v"));
}

/// Dry run reaches step 8 with zero files written and a completed report
/// referencing the pre-enumerated function.
#[test]
fn dry_run_completes_without_writing_files() {
    let mut ws = TestWorkspace::new().expect("workspace");
    ws.config.dry_run = true;
    let mut client = ScriptedModelClient::dry_run();
    let coverage = ScriptedCoverageRunner::always(0.0);

    let (state, result) = commission(&ws, &calc_spec(), &mut client, &coverage);
    let outcome = result.expect("completed run");

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.current_step, 8);
    assert_eq!(state.llm_calls_made, 0);
    assert!(state.files_touched.is_empty());
    assert!(!ws.root().join("calc.py").exists());
    assert!(!ws.root().join("tests").exists());
    assert_eq!(coverage.invocations(), 0);

    let report = fs::read_to_string(&outcome.report_path).expect("read report");
    assert!(report.contains("add"));
}

/// A spec with pre-listed functions never invokes the model in step 1, and
/// two runs enumerate identically.
#[test]
fn pre_enumerated_spec_skips_the_enumeration_call() {
    let mut ws = TestWorkspace::new().expect("workspace");
    ws.config.dry_run = true;

    let mut first_client = ScriptedModelClient::dry_run();
    let coverage = ScriptedCoverageRunner::always(0.0);
    let (first, _) = commission(&ws, &calc_spec(), &mut first_client, &coverage);

    let mut second_client = ScriptedModelClient::dry_run();
    let (second, _) = commission(&ws, &calc_spec(), &mut second_client, &coverage);

    assert_eq!(first.enumerated_functions, second.enumerated_functions);
    assert_eq!(first.llm_calls_made, 0);
    assert_eq!(second.llm_calls_made, 0);
}

/// An incomplete enumeration reply halts with the model's questions in the
/// report, along with the step name at halt time.
#[test]
fn incomplete_enumeration_halts_with_questions() {
    let ws = TestWorkspace::new().expect("workspace");
    let spec = ModuleSpec {
        module_name: "calc".to_string(),
        module_description: "arithmetic helpers".to_string(),
        required_public_functions: Vec::new(),
    };
    let mut client = ScriptedModelClient::new(vec![ScriptedReply::Value(serde_json::json!({
        "functions": [],
        "implementation_order": [],
        "questions": ["What rounding mode should division use?"],
        "is_complete": false
    }))]);
    let coverage = ScriptedCoverageRunner::always(100.0);

    let (state, result) = commission(&ws, &spec, &mut client, &coverage);
    result.expect_err("halt");

    assert_eq!(state.status, RunStatus::Halted);
    assert_eq!(
        state.blocking_questions,
        vec!["What rounding mode should division use?".to_string()]
    );
    let report = fs::read_to_string(report_path(ws.store().runs_dir(), &state.run_id, true))
        .expect("read halted report");
    assert!(report.contains("HALTED - QUESTIONS"));
    assert!(report.contains("What rounding mode should division use?"));
    assert!(report.contains("Enumerate Required Functions"));
}

/// With `max_file_changes = 0` the halt lands before any file write.
#[test]
fn zero_file_budget_halts_before_first_write() {
    let mut ws = TestWorkspace::new().expect("workspace");
    ws.config.limits.max_file_changes = 0;
    let mut client = ScriptedModelClient::new(happy_path_replies());
    let coverage = ScriptedCoverageRunner::always(100.0);

    let (state, result) = commission(&ws, &calc_spec(), &mut client, &coverage);
    let err = result.expect_err("halt");

    let budget = err
        .downcast_ref::<BudgetExceededError>()
        .expect("budget error");
    assert_eq!(budget.ceiling, "max_file_changes");
    assert_eq!(state.status, RunStatus::Halted);
    assert_eq!(state.current_step, 3);
    assert!(state.files_touched.is_empty());
    assert!(!ws.root().join("calc.py").exists());

    let report = fs::read_to_string(report_path(ws.store().runs_dir(), &state.run_id, true))
        .expect("read halted report");
    assert!(report.contains("max_file_changes"));
}

/// A test command stuck below 100% coverage visits step 5 exactly twice
/// (initial + one retry) and then halts with a coverage reason.
#[test]
fn coverage_shortfall_retries_once_then_halts() {
    let ws = TestWorkspace::new().expect("workspace");
    let mut replies = happy_path_replies();
    replies.pop(); // UI is never reached.
    replies.push(ScriptedReply::Value(plan_reply(
        "tests/test_calc.py",
        "def test_add_retry():\n    assert add(0, 0) == 0\n",
    )));
    let mut client = ScriptedModelClient::new(replies);
    let coverage = ScriptedCoverageRunner::always(50.0);

    let (state, result) = commission(&ws, &calc_spec(), &mut client, &coverage);
    let err = result.expect_err("halt");

    let shortfall = err
        .downcast_ref::<CoverageShortfallError>()
        .expect("coverage error");
    assert_eq!(shortfall.percent, 50.0);
    assert_eq!(coverage.invocations(), 2);
    // Both test-implementation replies were consumed: one per step-5 visit.
    assert_eq!(client.remaining(), 0);
    assert_eq!(state.status, RunStatus::Halted);

    let report = fs::read_to_string(report_path(ws.store().runs_dir(), &state.run_id, true))
        .expect("read halted report");
    assert!(report.contains("HALTED - COVERAGE"));
    assert!(report.contains("below 100.00%"));
    // Files written so far are listed in the halt report.
    assert!(report.contains("calc.py"));
}

/// Dropping the stop file mid-run halts at the next step boundary even with
/// every budget satisfied.
#[test]
fn stop_file_halts_at_next_step_boundary() {
    let ws = TestWorkspace::new().expect("workspace");
    let stop_path = ws.root().join(&ws.config.stop_file);
    let mut client = ScriptedModelClient::new(happy_path_replies()).with_side_effect({
        let stop_path = stop_path.clone();
        move || {
            fs::write(&stop_path, "").expect("drop stop file");
        }
    });
    let coverage = ScriptedCoverageRunner::always(100.0);

    // The first counted call is step 2's selection; the stop file appears
    // there and is noticed at the step 3 boundary.
    let (state, result) = commission(&ws, &calc_spec(), &mut client, &coverage);
    result.expect_err("halt");

    assert_eq!(state.status, RunStatus::Halted);
    assert_eq!(state.current_step, 3);
    assert!(state.files_touched.is_empty());
    let report = fs::read_to_string(report_path(ws.store().runs_dir(), &state.run_id, true))
        .expect("read halted report");
    assert!(report.contains("HALTED - STOP"));
}

/// A per-call timeout in step 3 is fatal and both attempts stay counted.
#[test]
fn call_timeout_after_selection_is_fatal() {
    let ws = TestWorkspace::new().expect("workspace");
    let mut client = ScriptedModelClient::new(vec![
        ScriptedReply::Value(selection_reply(&["add"])),
        ScriptedReply::Timeout(300),
    ]);
    let coverage = ScriptedCoverageRunner::always(100.0);

    let (state, result) = commission(&ws, &calc_spec(), &mut client, &coverage);
    result.expect_err("halt");

    assert_eq!(state.status, RunStatus::Halted);
    assert_eq!(state.current_step, 3);
    assert_eq!(state.llm_calls_made, 2);
    let report = fs::read_to_string(report_path(ws.store().runs_dir(), &state.run_id, true))
        .expect("read halted report");
    assert!(report.contains("HALTED - TIMEOUT"));
    assert!(report.contains("per_call_timeout"));
}

/// Step 2 is the sole step whose failure is non-fatal: a timeout there falls
/// back to the enumeration order and the run completes.
#[test]
fn selection_failure_falls_back_to_enumeration_order() {
    let ws = TestWorkspace::new().expect("workspace");
    let mut replies = happy_path_replies();
    replies[0] = ScriptedReply::Timeout(300);
    let mut client = ScriptedModelClient::new(replies);
    let coverage = ScriptedCoverageRunner::always(100.0);

    let (state, result) = commission(&ws, &calc_spec(), &mut client, &coverage);
    result.expect("completed run");

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.selected_function.as_deref(), Some("add"));
    // The abandoned selection attempt is still counted.
    assert_eq!(state.llm_calls_made, 5);
}

/// Counters never decrease across the run, and the persisted state matches
/// the in-memory result.
#[test]
fn persisted_state_tracks_progress() {
    let ws = TestWorkspace::new().expect("workspace");
    let mut client = ScriptedModelClient::new(happy_path_replies());
    let coverage = ScriptedCoverageRunner::always(100.0);

    let (state, result) = commission(&ws, &calc_spec(), &mut client, &coverage);
    result.expect("completed run");

    let persisted = ws.store().load_state(&state.run_id).expect("load");
    assert_eq!(persisted, state);
    assert!(persisted.wall_time_elapsed >= 0.0);
    assert_eq!(persisted.llm_calls_made, 5);
}
