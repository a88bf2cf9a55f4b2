//! Step response schemas: JSON Schema validation plus typed decoding.
//!
//! Each model-calling step has one schema; a reply is validated against it and
//! then decoded into its typed form immediately, so the orchestrator never
//! inspects untyped data.

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::errors::SchemaViolationError;

const ENUMERATION: &str = include_str!("../../schemas/enumeration.schema.json");
const IMPLEMENTATION_PLAN: &str = include_str!("../../schemas/implementation_plan.schema.json");
const TEST_PLAN: &str = include_str!("../../schemas/test_plan.schema.json");
const UI_GENERATION: &str = include_str!("../../schemas/ui_generation.schema.json");
const SPEC_GENERATION: &str = include_str!("../../schemas/spec_generation.schema.json");

/// The schema a model reply must satisfy at a given step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSchema {
    Enumeration,
    ImplementationPlan,
    TestPlan,
    UiGeneration,
    SpecGeneration,
}

impl StepSchema {
    pub fn name(self) -> &'static str {
        match self {
            StepSchema::Enumeration => "enumeration",
            StepSchema::ImplementationPlan => "implementation_plan",
            StepSchema::TestPlan => "test_plan",
            StepSchema::UiGeneration => "ui_generation",
            StepSchema::SpecGeneration => "spec_generation",
        }
    }

    pub fn raw(self) -> &'static str {
        match self {
            StepSchema::Enumeration => ENUMERATION,
            StepSchema::ImplementationPlan => IMPLEMENTATION_PLAN,
            StepSchema::TestPlan => TEST_PLAN,
            StepSchema::UiGeneration => UI_GENERATION,
            StepSchema::SpecGeneration => SPEC_GENERATION,
        }
    }

    pub fn as_value(self) -> Value {
        serde_json::from_str(self.raw()).expect("embedded schema should be valid JSON")
    }
}

/// Validate a reply against a step schema (Draft 2020-12).
///
/// No-op on success; the error names every invalid or missing field.
pub fn validate_output(reply: &Value, schema: StepSchema) -> Result<()> {
    let schema_value = schema.as_value();
    let compiled = validator_for(&schema_value)
        .map_err(|err| anyhow!("invalid {} schema: {err}", schema.name()))?;
    let messages: Vec<String> = compiled
        .iter_errors(reply)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        return Ok(());
    }
    Err(SchemaViolationError {
        schema: schema.name(),
        messages,
    }
    .into())
}

/// A reply decoded into its typed form, or the dry-run marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// The client fabricated the reply; skip validation and side effects.
    DryRun,
    Reply(T),
}

/// Decode a reply into the step's typed variant.
pub fn decode<T: DeserializeOwned>(reply: &Value) -> Result<Decoded<T>> {
    if reply.get("dry_run").and_then(Value::as_bool) == Some(true) {
        return Ok(Decoded::DryRun);
    }
    let typed = serde_json::from_value(reply.clone()).context("decode model reply")?;
    Ok(Decoded::Reply(typed))
}
