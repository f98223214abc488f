//! `jobtree` CLI entry-point.
//!
//! Available sub-commands:
//! - `run`       execute targets and exit 0 only if all of them succeeded.
//! - `validate`  resolve the dependency graph and print its order.
//! - `list`      print every namespace and its targets.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use engine::{Engine, EngineConfig, Policy};

#[derive(Parser)]
#[command(
    name = "jobtree",
    about = "Recursive parallel target executor",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Where the declarations come from and which layer to use.
#[derive(Args)]
struct Source {
    /// Path to the target declarations JSON file.
    #[arg(short, long, env = "JOBTREE_FILE", default_value = "jobtree.json")]
    file: PathBuf,
    /// Namespace (topology layer) to resolve targets in.
    #[arg(long, default_value = "")]
    namespace: String,
}

#[derive(Subcommand)]
enum Command {
    /// Execute the given targets.
    Run {
        #[command(flatten)]
        source: Source,
        /// Maximum number of concurrently running targets.
        #[arg(short, long, env = "JOBTREE_JOBS", default_value_t = 1)]
        jobs: usize,
        /// Keep running independent targets after a failure.
        #[arg(short, long)]
        keep_going: bool,
        /// Print what would run without running it.
        #[arg(short = 'n', long)]
        dry_run: bool,
        /// Write one log file per executed target into this directory.
        #[arg(long, env = "JOBTREE_LOG_DIR")]
        log_dir: Option<PathBuf>,
        /// Deepest allowed nesting of recursive targets.
        #[arg(long, default_value_t = 16)]
        max_depth: u32,
        /// Nesting level, set by a parent engine.
        #[arg(long, env = "JOBTREE_LEVEL", default_value_t = 0, hide = true)]
        level: u32,
        /// Targets to build.
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Resolve the graph for the given targets without running anything.
    Validate {
        #[command(flatten)]
        source: Source,
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// List declared namespaces and targets.
    List {
        #[command(flatten)]
        source: Source,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match execute(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn execute(command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Run {
            source,
            jobs,
            keep_going,
            dry_run,
            log_dir,
            max_depth,
            level,
            targets,
        } => {
            let catalog = engine::loader::load_file(&source.file)
                .with_context(|| format!("cannot load {}", source.file.display()))?;

            let config = EngineConfig {
                jobs,
                policy: Policy::from_keep_going(keep_going),
                dry_run,
                log_dir,
                depth: level,
                max_depth,
                self_command: self_command(&source.file),
            };
            debug!("self command: {:?}", config.self_command);

            let engine = Engine::new(catalog, config)?;
            let request = engine.request(&source.namespace, targets)?;
            info!("Running {:?} with -j {jobs}", request.targets);

            let report = engine.run(request).await?;
            print!("{}", engine::report::render(&report));

            Ok(if report.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Validate { source, targets } => {
            let catalog = engine::loader::load_file(&source.file)
                .with_context(|| format!("cannot load {}", source.file.display()))?;
            let engine = Engine::new(catalog, EngineConfig::default())?;

            match engine.graph(&source.namespace, &targets) {
                Ok(graph) => {
                    println!("✅ Graph is valid. Execution order: {:?}", graph.topological_order());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    Ok(ExitCode::from(2))
                }
            }
        }
        Command::List { source } => {
            let catalog = engine::loader::load_file(&source.file)
                .with_context(|| format!("cannot load {}", source.file.display()))?;

            for (name, registry) in catalog.namespaces() {
                if !source.namespace.is_empty() && name != source.namespace {
                    continue;
                }
                println!("{}:", if name.is_empty() { "<root>" } else { name });
                for target in registry.targets() {
                    let phony = if target.phony { " (phony)" } else { "" };
                    println!("  {}{phony}: {}", target.name, target.prerequisites.join(" "));
                    println!("      {}", target.action.describe());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// argv that re-runs this binary against the same declarations file.
fn self_command(file: &std::path::Path) -> Option<Vec<String>> {
    let exe = std::env::current_exe().ok()?;
    let file = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
    Some(vec![
        exe.to_string_lossy().into_owned(),
        "run".to_owned(),
        "--file".to_owned(),
        file.to_string_lossy().into_owned(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_the_arguments_a_parent_engine_passes() {
        let cli = Cli::try_parse_from([
            "jobtree", "run", "--file", "t.json", "--jobs", "4", "--keep-going", "--dry-run",
            "--namespace", "mid", "--", "all", "extra",
        ])
        .expect("valid arguments");

        match cli.command {
            Command::Run { source, jobs, keep_going, dry_run, targets, .. } => {
                assert_eq!(source.file, PathBuf::from("t.json"));
                assert_eq!(source.namespace, "mid");
                assert_eq!(jobs, 4);
                assert!(keep_going);
                assert!(dry_run);
                assert_eq!(targets, vec!["all", "extra"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_a_target() {
        assert!(Cli::try_parse_from(["jobtree", "run"]).is_err());
    }
}
