//! Structured progress events emitted by the orchestrator.
//!
//! The sink is passed into the orchestrator and is independent of state
//! persistence: dropping every event loses no run state. Production wires a
//! tracing-backed sink; tests record events for assertions.

use crate::core::types::HaltKind;

/// One observable moment in a brick run.
#[derive(Debug, Clone, PartialEq)]
pub enum BrickEvent {
    StepStarted { step: u8, name: &'static str },
    FunctionsEnumerated { count: usize },
    FunctionSelected { name: String },
    ModelCallCompleted { calls_made: u32 },
    FileWritten { path: String },
    TestPlanRecorded { cases: usize },
    CoverageMeasured { percent: f64, attempt: u32 },
    RunCompleted { run_id: String },
    RunHalted { kind: HaltKind, reason: String },
}

/// Receiver for orchestrator progress events.
pub trait EventSink {
    fn emit(&mut self, event: &BrickEvent);
}

/// Sink that forwards events to the tracing subscriber.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, event: &BrickEvent) {
        match event {
            BrickEvent::StepStarted { step, name } => {
                tracing::info!(step, name, "step started");
            }
            BrickEvent::FunctionsEnumerated { count } => {
                tracing::info!(count, "functions enumerated");
            }
            BrickEvent::FunctionSelected { name } => {
                tracing::info!(function = %name, "function selected");
            }
            BrickEvent::ModelCallCompleted { calls_made } => {
                tracing::debug!(calls_made, "model call completed");
            }
            BrickEvent::FileWritten { path } => {
                tracing::info!(path = %path, "file written");
            }
            BrickEvent::TestPlanRecorded { cases } => {
                tracing::info!(cases, "test plan recorded");
            }
            BrickEvent::CoverageMeasured { percent, attempt } => {
                tracing::info!(percent, attempt, "coverage measured");
            }
            BrickEvent::RunCompleted { run_id } => {
                tracing::info!(run_id = %run_id, "run completed");
            }
            BrickEvent::RunHalted { kind, reason } => {
                tracing::warn!(kind = kind.as_str(), reason = %reason, "run halted");
            }
        }
    }
}

/// Sink that discards every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &BrickEvent) {}
}
