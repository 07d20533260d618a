//! # fake CLI Entry Point
//!
//! Parses the command line, sets up logging and a [`Session`], then hands
//! off to the build engine or one of the command handlers.
//!
//! ## Command Structure
//!
//! - **Rules**: `fake [KEY=value ...] [TARGET ...]` builds, cleans or checks
//!   targets of the `Fakefile`
//! - **Modules**: `fake module <op>` works on `pom.xml` projects
//! - **Diagnostics**: `dependency-map`, `doctor`, `completion`

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use colored::*;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use fakebuild::build::{self, BuildMode, BuildOptions, FeedbackAnalyzer};
use fakebuild::commands::{self, module::ModuleOp};
use fakebuild::config::FakeConfig;
use fakebuild::error::BuildError;
use fakebuild::session::Session;

#[derive(Parser)]
#[command(name = "fake")]
#[command(about = "Rule-graph builds with transitive dependency resolution", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Rule file to read instead of the Fakefile
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// Run up to N actions at once
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Delete the build outputs of the selected targets
    #[arg(long)]
    clean: bool,

    /// Report stale rules (or, with --clean, what would be deleted) without touching anything
    #[arg(long, alias = "dry-run")]
    check: bool,

    /// Print the build report as JSON
    #[arg(long)]
    json: bool,

    /// Show commands, decisions and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Never contact remote repositories
    #[arg(long, global = true)]
    offline: bool,

    /// Variable overrides (KEY=value) followed by targets
    #[arg(num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, package or inspect a pom.xml module
    Module {
        #[arg(value_enum)]
        op: ModuleCommand,
        /// Module descriptor (default: ./pom.xml)
        #[arg(long)]
        pom: Option<PathBuf>,
        /// Select a module of the project by artifact id
        #[arg(long)]
        artifact: Option<String>,
        /// With `clean`, only list what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
    /// Print which rules need which below the targets
    DependencyMap {
        /// Variable overrides and targets (default rule when empty)
        #[arg(num_args = 0..)]
        args: Vec<String>,
    },
    /// Check compilers, the local repository and the rule file
    Doctor,
    /// Generate shell completions
    Completion {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModuleCommand {
    Build,
    Jar,
    Jars,
    Clean,
    GetDependencies,
    Classpath,
    List,
    Tree,
}

impl ModuleCommand {
    fn op(self, dry_run: bool) -> ModuleOp {
        match self {
            ModuleCommand::Build => ModuleOp::Build,
            ModuleCommand::Jar => ModuleOp::Jar,
            ModuleCommand::Jars => ModuleOp::Jars,
            ModuleCommand::Clean => ModuleOp::Clean { dry_run },
            ModuleCommand::GetDependencies => ModuleOp::GetDependencies,
            ModuleCommand::Classpath => ModuleOp::Classpath,
            ModuleCommand::List => ModuleOp::List,
            ModuleCommand::Tree => ModuleOp::Tree,
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("FAKE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

fn open_session(cli: &Cli, cwd: &Path) -> Result<Session> {
    let mut config = FakeConfig::load(cwd).context("Failed to load fake.toml")?;
    if cli.offline {
        config.resolver.offline = true;
    }
    Ok(Session::builder(config).verbose(cli.verbose).build())
}

fn run(cli: &Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;

    match &cli.command {
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }

        Some(Commands::Doctor) => {
            let session = open_session(cli, &cwd)?;
            commands::doctor::run_doctor(&session, &cwd);
            Ok(())
        }

        Some(Commands::Module { op, pom, artifact, dry_run }) => {
            let session = open_session(cli, &cwd)?;
            commands::module::handle_module_command(
                &session,
                &cwd,
                &op.op(*dry_run),
                pom.as_deref(),
                artifact.as_deref(),
            )?;
            Ok(())
        }

        Some(Commands::DependencyMap { args }) => {
            let session = open_session(cli, &cwd)?;
            let map = build::dependency_map(&session, &cwd, cli.file.as_deref(), args)?;
            print!("{}", map);
            Ok(())
        }

        None => {
            let session = open_session(cli, &cwd)?;
            let mode = match (cli.clean, cli.check) {
                (true, dry_run) => BuildMode::Clean { dry_run },
                (false, true) => BuildMode::Check,
                (false, false) => BuildMode::Build,
            };
            let options = BuildOptions {
                rule_file: cli.file.clone(),
                args: cli.args.clone(),
                jobs: cli.jobs,
                mode,
            };
            let report = build::run(&session, &cwd, &options)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "x".red(), e);
        let hint = e
            .downcast_ref::<BuildError>()
            .map(|err| err.root().to_string())
            .and_then(|root| FeedbackAnalyzer::analyze(&root));
        if let Some(hint) = hint {
            eprintln!("\n{} {}", "💡 Hint:".yellow().bold(), hint);
        }
        std::process::exit(1);
    }
}
