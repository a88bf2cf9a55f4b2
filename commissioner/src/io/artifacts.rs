//! Artifact emission: model-chosen files, the verification UI, and the
//! runner script bridging the UI to the implemented function.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const RUNNER_TEMPLATE: &str = include_str!("templates/runner.py.jinja");
const FALLBACK_UI_TEMPLATE: &str = include_str!("templates/fallback_ui.html.jinja");

/// Write a model-chosen file relative to the working root, creating parent
/// directories as needed. Returns the absolute path.
pub fn write_workspace_file(root: &Path, rel_path: &str, content: &str) -> Result<PathBuf> {
    let path = root.join(rel_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Write a run-scoped artifact at an absolute path.
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("write {}", path.display()))
}

/// `{run_id}_ui.html` under the runs directory.
pub fn ui_page_path(runs_dir: &Path, run_id: &str) -> PathBuf {
    runs_dir.join(format!("{run_id}_ui.html"))
}

/// `{run_id}_runner.py` under the runs directory.
pub fn runner_script_path(runs_dir: &Path, run_id: &str) -> PathBuf {
    runs_dir.join(format!("{run_id}_runner.py"))
}

/// Render the local runner script bound to the implemented function.
pub fn render_runner_script(module_file: &str, function_name: &str) -> Result<String> {
    render(
        "runner",
        RUNNER_TEMPLATE,
        context! {
            module_file => module_file,
            function_name => function_name,
        },
    )
}

/// Minimal self-contained page used when the model's UI reply carries no
/// usable HTML; keeps the `{run_id}_ui.html` artifact contract intact.
pub fn fallback_ui_page(function_name: &str) -> Result<String> {
    render(
        "fallback_ui",
        FALLBACK_UI_TEMPLATE,
        context! { function_name => function_name },
    )
}

fn render(name: &str, template: &str, ctx: minijinja::Value) -> Result<String> {
    let mut env = Environment::new();
    env.add_template(name, template)
        .expect("embedded template should be valid");
    let rendered = env
        .get_template(name)
        .context("get template")?
        .render(ctx)
        .with_context(|| format!("render {name} template"))?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_write_creates_parents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_workspace_file(temp.path(), "pkg/calc.py", "def add(): pass\n")
            .expect("write");
        assert!(path.is_file());
        assert_eq!(
            fs::read_to_string(path).expect("read"),
            "def add(): pass\n"
        );
    }

    #[test]
    fn runner_script_binds_module_and_function() {
        let script = render_runner_script("pkg/calc.py", "add").expect("render");
        assert!(script.contains("module_path = \"pkg/calc.py\""));
        assert!(script.contains("func_name = \"add\""));
        assert!(script.contains("port=8000"));
    }

    #[test]
    fn fallback_page_names_the_function() {
        let page = fallback_ui_page("add").expect("render");
        assert!(page.contains("<title>Brick Verification UI - add</title>"));
        assert!(page.contains("/run"));
    }

    #[test]
    fn artifact_paths_are_run_scoped() {
        let runs = Path::new("runs");
        assert_eq!(
            ui_page_path(runs, "calc_1"),
            Path::new("runs/calc_1_ui.html")
        );
        assert_eq!(
            runner_script_path(runs, "calc_1"),
            Path::new("runs/calc_1_runner.py")
        );
    }
}
