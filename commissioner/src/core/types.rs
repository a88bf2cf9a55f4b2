//! Shared deterministic types for commissioner core logic.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use serde::{Deserialize, Serialize};

/// One function contract, either pre-enumerated in the module spec or
/// returned by the model during enumeration. Only the name is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionContract {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FunctionContract {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            signature: None,
            description: None,
        }
    }
}

/// Run lifecycle status. Terminal once non-running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Halted,
}

/// Halt classification used in halted reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltKind {
    Budget,
    Timeout,
    Questions,
    Schema,
    Coverage,
    Stop,
    Protocol,
    Error,
}

impl HaltKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HaltKind::Budget => "budget",
            HaltKind::Timeout => "timeout",
            HaltKind::Questions => "questions",
            HaltKind::Schema => "schema",
            HaltKind::Coverage => "coverage",
            HaltKind::Stop => "stop",
            HaltKind::Protocol => "protocol",
            HaltKind::Error => "error",
        }
    }
}

/// Step 1 reply: the full function enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnumerationReply {
    #[serde(default)]
    pub functions: Vec<FunctionContract>,
    #[serde(default)]
    pub implementation_order: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub is_complete: bool,
}

/// Steps 3 and 5 reply: an implementation plan with file contents.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlanReply {
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_content: Option<String>,
    #[serde(default)]
    pub files_to_create: Vec<ExtraFile>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub is_complete: bool,
}

/// Auxiliary file in an implementation plan.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtraFile {
    pub path: String,
    pub content: String,
}

/// Step 4 reply: test cases targeting 100.00% statement coverage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestPlanReply {
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub coverage_analysis: String,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub category: Option<TestCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCategory {
    Normal,
    Edge,
    Failure,
}

/// Step 7 reply: the verification UI document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UiReply {
    #[serde(default)]
    pub html_content: String,
    #[serde(default)]
    pub run_instructions: Option<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub is_complete: bool,
}

/// Spec-generation reply for `commissioner build`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpecGenerationReply {
    pub module_name: String,
    #[serde(default)]
    pub module_description: String,
    #[serde(default)]
    pub required_public_functions: Vec<FunctionContract>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub is_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A bare `{"name": "add"}` contract parses with defaults.
    #[test]
    fn function_contract_parses_name_only() {
        let contract: FunctionContract = serde_json::from_str(r#"{"name":"add"}"#).expect("parse");
        assert_eq!(contract, FunctionContract::named("add"));
    }

    /// Missing `is_complete` decodes as false, routing to the questions halt.
    #[test]
    fn missing_is_complete_defaults_to_false() {
        let reply: EnumerationReply =
            serde_json::from_str(r#"{"functions":[],"implementation_order":[],"questions":[]}"#)
                .expect("parse");
        assert!(!reply.is_complete);
    }

    #[test]
    fn run_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Halted).expect("serialize"),
            "\"halted\""
        );
    }
}
