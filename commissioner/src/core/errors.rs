//! Typed halt conditions for brick commissioning.
//!
//! Every fatal condition unwinds through `anyhow` to the single halt handler,
//! which recovers the concrete type via `downcast_ref` to classify the report.
//! Each error carries enough detail for the halt report to name the exact
//! ceiling, step, or questions involved.

use std::error::Error;
use std::fmt;

use crate::core::types::HaltKind;

/// An illegal step transition was requested. This is a commissioner bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub current: u8,
    pub next: u8,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal step transition {} -> {} (internal fault)",
            self.current, self.next
        )
    }
}

impl Error for TransitionError {}

/// A configured ceiling was reached. `ceiling` is the config key under
/// `[limits]` so the halt report can say exactly what to raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetExceededError {
    pub ceiling: &'static str,
    pub configured: u64,
}

impl fmt::Display for BudgetExceededError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ceiling of {} exceeded (adjust limits.{} in config)",
            self.ceiling, self.configured, self.ceiling
        )
    }
}

impl Error for BudgetExceededError {}

/// A single model round trip ran past `per_call_timeout_secs` and was killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeoutError {
    pub timeout_secs: u64,
}

impl fmt::Display for CallTimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model call exceeded per_call_timeout_secs ({}s) and was aborted",
            self.timeout_secs
        )
    }
}

impl Error for CallTimeoutError {}

/// The model declared its work incomplete and left blocking questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteError {
    pub step: u8,
    pub questions: Vec<String>,
}

impl fmt::Display for IncompleteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model reported incomplete work at step {} ({} blocking question(s))",
            self.step,
            self.questions.len()
        )
    }
}

impl Error for IncompleteError {}

/// A model response failed JSON Schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolationError {
    pub schema: &'static str,
    pub messages: Vec<String>,
}

impl fmt::Display for SchemaViolationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} schema validation failed: {}",
            self.schema,
            self.messages.join("; ")
        )
    }
}

impl Error for SchemaViolationError {}

/// Statement coverage stayed below 100.00% after the single retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageShortfallError {
    pub percent: f64,
}

impl fmt::Display for CoverageShortfallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "statement coverage {:.2}% below 100.00% after retry",
            self.percent
        )
    }
}

impl Error for CoverageShortfallError {}

/// The configured stop file appeared; halt before the next step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopRequestedError {
    pub stop_file: String,
}

impl fmt::Display for StopRequestedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stop file '{}' present, halting", self.stop_file)
    }
}

impl Error for StopRequestedError {}

/// Classify an error chain into the halt taxonomy.
pub fn classify(err: &anyhow::Error) -> HaltKind {
    if err.downcast_ref::<StopRequestedError>().is_some() {
        HaltKind::Stop
    } else if err.downcast_ref::<BudgetExceededError>().is_some() {
        HaltKind::Budget
    } else if err.downcast_ref::<CallTimeoutError>().is_some() {
        HaltKind::Timeout
    } else if err.downcast_ref::<IncompleteError>().is_some() {
        HaltKind::Questions
    } else if err.downcast_ref::<SchemaViolationError>().is_some() {
        HaltKind::Schema
    } else if err.downcast_ref::<CoverageShortfallError>().is_some() {
        HaltKind::Coverage
    } else if err.downcast_ref::<TransitionError>().is_some() {
        HaltKind::Protocol
    } else {
        HaltKind::Error
    }
}
