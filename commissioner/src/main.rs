//! Commissioner CLI.
//!
//! Commissions one brick per invocation from a module spec (or a free-form
//! description via `build`), and inspects persisted runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use commissioner::brick::BrickOrchestrator;
use commissioner::core::events::TracingSink;
use commissioner::core::types::SpecGenerationReply;
use commissioner::exit_codes;
use commissioner::io::config::{CommissionerConfig, load_config};
use commissioner::io::coverage::CoverageCmdRunner;
use commissioner::io::model::{CmdModelClient, ModelClient, ModelRequest};
use commissioner::io::prompt::PromptEngine;
use commissioner::io::schema::{Decoded, StepSchema, decode, validate_output};
use commissioner::io::spec::{ModuleSpec, load_spec, write_spec};
use commissioner::io::state::StateStore;
use commissioner::logging;

#[derive(Parser)]
#[command(
    name = "commissioner",
    version,
    about = "Budget-governed single-brick commissioning loop"
)]
struct Cli {
    /// Path to the commissioner config TOML.
    #[arg(long, short, global = true, default_value = "commissioner.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Commission a brick from a module specification file.
    Run {
        spec_path: PathBuf,
        /// Simulate every step without model calls or file writes.
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate a module specification from a description, then commission it.
    Build {
        /// Free-form description, or a path to a file containing one.
        description: Vec<String>,
        /// Save the generated spec to this file.
        #[arg(long, short = 's')]
        output_spec: Option<PathBuf>,
        /// Show the generated spec without writing it or commissioning.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the persisted state for a run.
    Status { run_id: String },
    /// Print the stored report for a run.
    Report { run_id: String },
    /// List run ids with persisted state.
    List,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = Path::new(".");
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Run { spec_path, dry_run } => {
            let mut config = config;
            if dry_run {
                config.dry_run = true;
            }
            let spec = load_spec(&spec_path)?;
            commission(root, &config, &spec, Some(&spec_path))
        }
        Command::Build {
            description,
            output_spec,
            dry_run,
        } => cmd_build(root, &config, &description, output_spec.as_deref(), dry_run),
        Command::Status { run_id } => cmd_status(root, &config, &run_id),
        Command::Report { run_id } => cmd_report(root, &config, &run_id),
        Command::List => cmd_list(root, &config),
    }
}

/// Commission one brick and print the resulting report.
fn commission(
    root: &Path,
    config: &CommissionerConfig,
    spec: &ModuleSpec,
    spec_path: Option<&Path>,
) -> Result<i32> {
    let store = StateStore::new(root.join(&config.runs_dir));
    let mut state = store.create_state(&spec.module_name, spec_path)?;
    let mut client = CmdModelClient::from_config(config, root);
    let coverage = CoverageCmdRunner;
    let mut events = TracingSink;

    let result = BrickOrchestrator::new(
        root,
        config,
        &store,
        &mut state,
        &mut client,
        &coverage,
        &mut events,
    )
    .run_brick(spec);

    match result {
        Ok(outcome) => {
            if let Ok(report) = fs::read_to_string(&outcome.report_path) {
                println!("{report}");
            }
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("brick halted: {err:#}");
            if let Some(report_path) = state.report_path.as_deref() {
                if let Ok(report) = fs::read_to_string(report_path) {
                    eprintln!("{report}");
                }
            }
            Ok(exit_codes::HALTED)
        }
    }
}

/// Generate a module spec from a free-form description, then commission it.
fn cmd_build(
    root: &Path,
    config: &CommissionerConfig,
    description: &[String],
    output_spec: Option<&Path>,
    preview: bool,
) -> Result<i32> {
    if description.is_empty() {
        return Err(anyhow!("description is required"));
    }
    let mut description_text = description.join(" ");
    // A description that names an existing file is read from it.
    if Path::new(&description_text).exists() {
        description_text = fs::read_to_string(&description_text)
            .with_context(|| format!("read description file {description_text}"))?;
    }

    let engine = PromptEngine::new();
    let prompt = engine.spec_generation(&description_text)?;
    let mut client = CmdModelClient::from_config(config, root);
    let value = client.call(&ModelRequest {
        system_prompt: prompt.system,
        user_prompt: prompt.user,
        schema: StepSchema::SpecGeneration,
    })?;
    if !config.dry_run {
        validate_output(&value, StepSchema::SpecGeneration)?;
    }
    let reply = match decode::<SpecGenerationReply>(&value)? {
        Decoded::DryRun => {
            println!("dry run: no specification generated");
            return Ok(exit_codes::OK);
        }
        Decoded::Reply(reply) => reply,
    };

    if !reply.is_complete && !reply.questions.is_empty() {
        println!("The model has questions before proceeding:");
        for question in &reply.questions {
            println!("  - {question}");
        }
        println!("Clarify the description and try again.");
        return Ok(exit_codes::INVALID);
    }

    let spec = ModuleSpec {
        module_name: reply.module_name,
        module_description: reply.module_description,
        required_public_functions: reply.required_public_functions,
    };
    let spec_path = output_spec
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}_spec.json", spec.module_name)));

    if preview {
        println!("[preview] would save spec to: {}", spec_path.display());
        println!("{}", serde_json::to_string_pretty(&spec)?);
        return Ok(exit_codes::OK);
    }

    write_spec(&spec_path, &spec)?;
    println!("Specification saved to: {}", spec_path.display());
    commission(root, config, &spec, Some(&spec_path))
}

fn cmd_status(root: &Path, config: &CommissionerConfig, run_id: &str) -> Result<i32> {
    let store = StateStore::new(root.join(&config.runs_dir));
    let state = store.load_state(run_id)?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(exit_codes::OK)
}

fn cmd_report(root: &Path, config: &CommissionerConfig, run_id: &str) -> Result<i32> {
    let store = StateStore::new(root.join(&config.runs_dir));
    let state = store.load_state(run_id)?;
    match state.report_path.as_deref() {
        Some(path) if Path::new(path).exists() => {
            println!("{}", fs::read_to_string(path)?);
            Ok(exit_codes::OK)
        }
        _ => {
            println!("No report found for run {run_id}");
            Ok(exit_codes::INVALID)
        }
    }
}

fn cmd_list(root: &Path, config: &CommissionerConfig) -> Result<i32> {
    let store = StateStore::new(root.join(&config.runs_dir));
    for run_id in store.list_runs()? {
        println!("{run_id}");
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run() {
        let cli = Cli::parse_from(["commissioner", "run", "calc_spec.json"]);
        match cli.command {
            Command::Run { spec_path, dry_run } => {
                assert_eq!(spec_path, PathBuf::from("calc_spec.json"));
                assert!(!dry_run);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_run_dry_run_flag() {
        let cli = Cli::parse_from(["commissioner", "run", "spec.json", "--dry-run"]);
        assert!(matches!(cli.command, Command::Run { dry_run: true, .. }));
    }

    #[test]
    fn parse_build_with_output_spec() {
        let cli = Cli::parse_from([
            "commissioner",
            "build",
            "-s",
            "my_spec.json",
            "adds",
            "two",
            "numbers",
        ]);
        match cli.command {
            Command::Build {
                description,
                output_spec,
                dry_run,
            } => {
                assert_eq!(description, vec!["adds", "two", "numbers"]);
                assert_eq!(output_spec, Some(PathBuf::from("my_spec.json")));
                assert!(!dry_run);
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn parse_global_config_flag() {
        let cli = Cli::parse_from(["commissioner", "list", "--config", "other.toml"]);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
    }
}
