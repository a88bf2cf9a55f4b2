//! Module specification loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::FunctionContract;

/// One module specification (JSON). When `required_public_functions` is
/// populated, step 1 uses it verbatim and skips the enumeration call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleSpec {
    pub module_name: String,
    #[serde(default)]
    pub module_description: String,
    #[serde(default)]
    pub required_public_functions: Vec<FunctionContract>,
}

/// Load and validate a module spec from disk.
pub fn load_spec(path: &Path) -> Result<ModuleSpec> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read spec {}", path.display()))?;
    let spec: ModuleSpec =
        serde_json::from_str(&contents).with_context(|| format!("parse spec {}", path.display()))?;
    validate_spec(&spec)?;
    Ok(spec)
}

/// Write a module spec as pretty JSON with trailing newline.
pub fn write_spec(path: &Path, spec: &ModuleSpec) -> Result<()> {
    validate_spec(spec)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create spec dir {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(spec).context("serialize spec")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write spec {}", path.display()))
}

fn validate_spec(spec: &ModuleSpec) -> Result<()> {
    if spec.module_name.trim().is_empty() {
        return Err(anyhow!("module_name must be non-empty"));
    }
    for contract in &spec.required_public_functions {
        if contract.name.trim().is_empty() {
            return Err(anyhow!("required_public_functions entries need a name"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_parses_minimal_spec() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("calc_spec.json");
        fs::write(
            &path,
            r#"{"module_name":"calc","required_public_functions":[{"name":"add"}]}"#,
        )
        .expect("write");

        let spec = load_spec(&path).expect("load");
        assert_eq!(spec.module_name, "calc");
        assert_eq!(spec.required_public_functions.len(), 1);
        assert_eq!(spec.required_public_functions[0].name, "add");
        assert_eq!(spec.module_description, "");
    }

    #[test]
    fn load_rejects_empty_module_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("spec.json");
        fs::write(&path, r#"{"module_name":"  "}"#).expect("write");
        assert!(load_spec(&path).is_err());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out/spec.json");
        let spec = ModuleSpec {
            module_name: "calc".to_string(),
            module_description: "arithmetic helpers".to_string(),
            required_public_functions: vec![FunctionContract::named("add")],
        };
        write_spec(&path, &spec).expect("write");
        assert_eq!(load_spec(&path).expect("load"), spec);
    }
}
