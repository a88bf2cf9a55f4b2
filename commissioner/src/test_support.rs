//! Test-only doubles and helpers for exercising the orchestrator without a
//! model adapter or coverage tool.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::core::errors::CallTimeoutError;
use crate::core::events::{BrickEvent, EventSink};
use crate::core::types::FunctionContract;
use crate::io::config::CommissionerConfig;
use crate::io::coverage::{CoverageReport, CoverageRequest, CoverageRunner};
use crate::io::model::{ModelClient, ModelRequest, dry_run_reply};
use crate::io::spec::ModuleSpec;
use crate::io::state::StateStore;

/// One scripted model outcome.
pub enum ScriptedReply {
    Value(Value),
    Timeout(u64),
    Fail(String),
}

/// Model client that returns predetermined replies in order.
pub struct ScriptedModelClient {
    replies: VecDeque<ScriptedReply>,
    dry_run: bool,
    calls_made: u32,
    on_call: Option<Box<dyn FnMut()>>,
}

impl ScriptedModelClient {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: replies.into(),
            dry_run: false,
            calls_made: 0,
            on_call: None,
        }
    }

    /// Client that fabricates dry-run replies, like the production client
    /// with `dry_run` enabled.
    pub fn dry_run() -> Self {
        Self {
            replies: VecDeque::new(),
            dry_run: true,
            calls_made: 0,
            on_call: None,
        }
    }

    /// Run `hook` before each counted call (e.g. to drop a stop file mid-run).
    pub fn with_side_effect(mut self, hook: impl FnMut() + 'static) -> Self {
        self.on_call = Some(Box::new(hook));
        self
    }

    pub fn remaining(&self) -> usize {
        self.replies.len()
    }
}

impl ModelClient for ScriptedModelClient {
    fn call(&mut self, _request: &ModelRequest) -> Result<Value> {
        if self.dry_run {
            return Ok(dry_run_reply());
        }
        if let Some(hook) = self.on_call.as_mut() {
            hook();
        }
        self.calls_made += 1;
        match self.replies.pop_front() {
            Some(ScriptedReply::Value(value)) => Ok(value),
            Some(ScriptedReply::Timeout(secs)) => {
                Err(CallTimeoutError { timeout_secs: secs }.into())
            }
            Some(ScriptedReply::Fail(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted model client exhausted")),
        }
    }

    fn calls_made(&self) -> u32 {
        self.calls_made
    }
}

/// Coverage runner that replays a fixed sequence of percentages; the last
/// one repeats once the sequence is exhausted.
pub struct ScriptedCoverageRunner {
    percents: RefCell<VecDeque<f64>>,
    last: Cell<f64>,
    invocations: Cell<u32>,
}

impl ScriptedCoverageRunner {
    pub fn sequence(percents: Vec<f64>) -> Self {
        let last = percents.last().copied().unwrap_or(0.0);
        Self {
            percents: RefCell::new(percents.into()),
            last: Cell::new(last),
            invocations: Cell::new(0),
        }
    }

    pub fn always(percent: f64) -> Self {
        Self::sequence(vec![percent])
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.get()
    }
}

impl CoverageRunner for ScriptedCoverageRunner {
    fn run(&self, _request: &CoverageRequest) -> Result<CoverageReport> {
        self.invocations.set(self.invocations.get() + 1);
        let percent = self
            .percents
            .borrow_mut()
            .pop_front()
            .unwrap_or(self.last.get());
        Ok(CoverageReport {
            percent_covered: percent,
            success: percent >= 100.0,
        })
    }
}

/// Sink that records every event for assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<BrickEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &BrickEvent) {
        self.events.push(event.clone());
    }
}

/// Temp workspace with a generous config, the scripted-test analog of a
/// project root.
pub struct TestWorkspace {
    temp: tempfile::TempDir,
    pub config: CommissionerConfig,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let mut config = CommissionerConfig::default();
        config.limits.max_brick_wall_time_secs = 3600;
        config.limits.max_calls_per_brick = 100;
        config.limits.max_file_changes = 100;
        Ok(Self { temp, config })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(self.root().join(&self.config.runs_dir))
    }
}

/// `calc` module spec with a single pre-enumerated `add` function.
pub fn calc_spec() -> ModuleSpec {
    ModuleSpec {
        module_name: "calc".to_string(),
        module_description: "arithmetic helpers".to_string(),
        required_public_functions: vec![FunctionContract::named("add")],
    }
}

/// Enumeration reply placing `names` in the given order.
pub fn selection_reply(names: &[&str]) -> Value {
    json!({
        "functions": names.iter().map(|n| json!({"name": n})).collect::<Vec<_>>(),
        "implementation_order": names,
        "questions": [],
        "is_complete": true
    })
}

/// Complete implementation plan writing `path`.
pub fn plan_reply(path: &str, content: &str) -> Value {
    json!({
        "function_name": "add",
        "file_path": path,
        "file_content": content,
        "files_to_create": [],
        "questions": [],
        "is_complete": true
    })
}

/// Complete single-case test plan.
pub fn test_plan_reply() -> Value {
    json!({
        "function_name": "add",
        "test_cases": [
            {"name": "adds_two_ints", "description": "1 + 2 == 3", "category": "normal"}
        ],
        "coverage_analysis": "single return statement fully covered",
        "questions": [],
        "is_complete": true
    })
}

/// Complete UI reply with a small page.
pub fn ui_reply() -> Value {
    json!({
        "function_name": "add",
        "html_content": "<html><body>add</body></html>",
        "sample_inputs": [],
        "run_instructions": "python runner.py",
        "questions": [],
        "is_complete": true
    })
}
