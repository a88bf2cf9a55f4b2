//! Prompt construction for the model-calling steps.
//!
//! System prompts are fixed; user prompts are minijinja templates embedded at
//! compile time and rendered with the step's context.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::types::FunctionContract;
use crate::io::spec::ModuleSpec;

const ENUMERATE_SYSTEM: &str = include_str!("prompts/enumerate.system.md");
const IMPLEMENT_SYSTEM: &str = include_str!("prompts/implement.system.md");
const TEST_PLAN_SYSTEM: &str = include_str!("prompts/test_plan.system.md");
const IMPLEMENT_TESTS_SYSTEM: &str = include_str!("prompts/implement_tests.system.md");
const BUILD_UI_SYSTEM: &str = include_str!("prompts/build_ui.system.md");
const SPEC_GENERATION_SYSTEM: &str = include_str!("prompts/spec_generation.system.md");

const ENUMERATE_USER: &str = include_str!("prompts/enumerate.user.md");
const SELECT_USER: &str = include_str!("prompts/select.user.md");
const IMPLEMENT_USER: &str = include_str!("prompts/implement.user.md");
const TEST_PLAN_USER: &str = include_str!("prompts/test_plan.user.md");
const IMPLEMENT_TESTS_USER: &str = include_str!("prompts/implement_tests.user.md");
const BUILD_UI_USER: &str = include_str!("prompts/build_ui.user.md");
const SPEC_GENERATION_USER: &str = include_str!("prompts/spec_generation.user.md");

/// One system/user prompt pair for a model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPrompt {
    pub system: String,
    pub user: String,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (name, template) in [
            ("enumerate", ENUMERATE_USER),
            ("select", SELECT_USER),
            ("implement", IMPLEMENT_USER),
            ("test_plan", TEST_PLAN_USER),
            ("implement_tests", IMPLEMENT_TESTS_USER),
            ("build_ui", BUILD_UI_USER),
            ("spec_generation", SPEC_GENERATION_USER),
        ] {
            env.add_template(name, template)
                .expect("embedded template should be valid");
        }
        Self { env }
    }

    /// Step 1: enumerate every function the module needs.
    pub fn enumerate(&self, spec: &ModuleSpec) -> Result<StepPrompt> {
        let user = self.render(
            "enumerate",
            context! {
                module_name => spec.module_name,
                module_description => spec.module_description,
            },
        )?;
        Ok(StepPrompt {
            system: ENUMERATE_SYSTEM.to_string(),
            user,
        })
    }

    /// Step 2: ask for an implementation order over the enumerated functions.
    pub fn select(&self, functions: &[FunctionContract]) -> Result<StepPrompt> {
        let user = self.render(
            "select",
            context! { functions_json => pretty_json(functions)? },
        )?;
        Ok(StepPrompt {
            system: ENUMERATE_SYSTEM.to_string(),
            user,
        })
    }

    /// Step 3: implement the selected function.
    pub fn implement(&self, contract: &FunctionContract) -> Result<StepPrompt> {
        let user = self.render(
            "implement",
            context! { function_json => pretty_json(contract)? },
        )?;
        Ok(StepPrompt {
            system: IMPLEMENT_SYSTEM.to_string(),
            user,
        })
    }

    /// Step 4: design a test plan for 100.00% statement coverage.
    pub fn test_plan(&self, contract: &FunctionContract) -> Result<StepPrompt> {
        let user = self.render(
            "test_plan",
            context! { function_json => pretty_json(contract)? },
        )?;
        Ok(StepPrompt {
            system: TEST_PLAN_SYSTEM.to_string(),
            user,
        })
    }

    /// Step 5: implement the planned tests.
    pub fn implement_tests(&self, contract: &FunctionContract) -> Result<StepPrompt> {
        let user = self.render(
            "implement_tests",
            context! { function_json => pretty_json(contract)? },
        )?;
        Ok(StepPrompt {
            system: IMPLEMENT_TESTS_SYSTEM.to_string(),
            user,
        })
    }

    /// Step 7: build the verification UI.
    pub fn build_ui(
        &self,
        contract: &FunctionContract,
        function_file: Option<&str>,
    ) -> Result<StepPrompt> {
        let user = self.render(
            "build_ui",
            context! {
                function_json => pretty_json(contract)?,
                function_file => function_file.unwrap_or("N/A"),
            },
        )?;
        Ok(StepPrompt {
            system: BUILD_UI_SYSTEM.to_string(),
            user,
        })
    }

    /// `commissioner build`: generate a module spec from a description.
    pub fn spec_generation(&self, description: &str) -> Result<StepPrompt> {
        let user = self.render(
            "spec_generation",
            context! { description => description.trim() },
        )?;
        Ok(StepPrompt {
            system: SPEC_GENERATION_SYSTEM.to_string(),
            user,
        })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name).context("get template")?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render {name} template"))?;
        Ok(rendered)
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn pretty_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("serialize prompt context")
}
