mod actions;
mod clean;
mod feedback;
mod parallel;
mod scheduler;
pub mod utils;

pub use actions::strip_prefix;
pub use feedback::FeedbackAnalyzer;
pub use parallel::make_parallel;
pub use scheduler::{BuildReport, Builder, RuleState};

use crate::error::{BuildError, Result};
use crate::rules::{DependencyMap, RuleGraph, parse_rule_file, split_arguments};
use crate::session::Session;
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    #[default]
    Build,
    /// Delete what the selected rules build.
    Clean { dry_run: bool },
    /// Report stale rules without touching the filesystem.
    Check,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Rule file; relative paths are taken from the working directory.
    pub rule_file: Option<PathBuf>,
    /// Leading `KEY=value` pairs followed by target names.
    pub args: Vec<String>,
    pub jobs: Option<usize>,
    pub mode: BuildMode,
}

/// Parses the rule file of `cwd` with command line variable overrides.
pub fn load_rules(session: &Session, cwd: &Path, rule_file: Option<&Path>, overrides: &[(String, String)]) -> Result<RuleGraph> {
    let build = &session.config().build;
    let path = match rule_file {
        Some(file) => cwd.join(file),
        None => cwd.join(&build.rule_file),
    };
    parse_rule_file(&path, cwd, overrides, build)
}

/// Who needs whom below `targets` (the default rule when empty).
pub fn dependency_map(session: &Session, cwd: &Path, rule_file: Option<&Path>, args: &[String]) -> Result<DependencyMap> {
    let (overrides, targets) = split_arguments(args);
    let graph = load_rules(session, cwd, rule_file, &overrides)?;
    if targets.is_empty() {
        let default = graph
            .default_target()
            .ok_or_else(|| BuildError::Config("could not find default rule".into()))?;
        return graph.dependency_map(&[default]);
    }
    let names: Vec<&str> = targets.iter().map(String::as_str).collect();
    graph.dependency_map(&names)
}

/// Parses the rules and builds, cleans or checks the selected targets.
pub fn run(session: &Session, cwd: &Path, options: &BuildOptions) -> Result<BuildReport> {
    let start_time = Instant::now();
    let (overrides, targets) = split_arguments(&options.args);
    let mut graph = load_rules(session, cwd, options.rule_file.as_deref(), &overrides)?;
    let selected = graph.select(&targets)?;

    let mut builder = Builder::new(session, &graph);
    match options.mode {
        BuildMode::Clean { dry_run } => {
            let context = builder.context();
            let map = graph.dependency_map(&[selected.as_str()])?;
            let mut count = 0;
            for name in map.order() {
                if let Some(rule) = graph.get_rule(name) {
                    count += clean::clean_rule(&context, rule, dry_run)?.len();
                }
            }
            if !dry_run {
                println!("{} Removed {} paths", "✓".green(), count);
            }
            return Ok(builder.into_report());
        }
        BuildMode::Check => {
            let stale = builder.stale_rules(&selected)?;
            let mut report = builder.into_report();
            report.stale = stale;
            return Ok(report);
        }
        BuildMode::Build => {}
    }

    let jobs = options.jobs.or(session.config().build.parallel).unwrap_or(1);
    if jobs > 1 {
        make_parallel(&mut builder, &selected, jobs)?;
    } else {
        builder.make(&selected)?;
    }

    let report = builder.into_report();
    if report.is_noop() {
        println!("{} Up to date", "⚡".green());
    } else {
        println!(
            "{} Build finished in {:.2?} ({} actions)",
            "✓".green(),
            start_time.elapsed(),
            report.actions
        );
    }
    Ok(report)
}
