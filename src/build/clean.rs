//! Removal of build outputs.
//!
//! Each rule kind knows what it produced: its target, the per-rule build
//! directory of compile rules, object files of native programs, and for
//! modules the compiled classes and archives of the whole closure. With
//! `dry_run` the paths are only printed.

use super::actions::{ActionContext, is_native_source, load_sub_graph};
use super::utils::remove_path;
use crate::error::Result;
use crate::rules::kind::DESCRIPTOR_FILE;
use crate::rules::{Rule, RuleKind};
use colored::Colorize;
use std::path::{Path, PathBuf};

fn remove(path: &Path, dry_run: bool, removed: &mut Vec<PathBuf>) -> Result<()> {
    if remove_path(path, dry_run)? {
        if dry_run {
            println!("rm -rf {}", path.display());
        }
        removed.push(path.to_path_buf());
    }
    Ok(())
}

/// Removes what `rule` builds. Returns the removed (or, dry, the doomed)
/// paths.
pub(crate) fn clean_rule(context: &ActionContext<'_>, rule: &Rule, dry_run: bool) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    match &rule.kind {
        RuleKind::All | RuleKind::Special(_) => return Ok(removed),
        RuleKind::CompileArchive | RuleKind::CompileOutput => {
            remove(&context.build_dir(rule), dry_run, &mut removed)?;
        }
        RuleKind::CompileProgram => {
            for source in &rule.prerequisites {
                if is_native_source(source) {
                    let object = context.path(source).with_extension("o");
                    remove(&object, dry_run, &mut removed)?;
                }
            }
        }
        RuleKind::Module { descriptor } => {
            let mut resolver = context.session.resolver();
            let id = resolver.parse(&context.path(descriptor))?;
            for path in resolver.clean_module(id, dry_run)? {
                if dry_run {
                    println!("rm -rf {}", path.display());
                }
                removed.push(path);
            }
        }
        RuleKind::SubBuild { directory } => {
            let dir = context.path(directory);
            let rule_file = dir.join(&context.session.config().build.rule_file);
            if rule_file.is_file() {
                let graph = load_sub_graph(context, rule, directory, &rule_file, &dir)?;
                let sub_context = ActionContext::new(context.session, &graph);
                for sub_rule in graph.rules() {
                    removed.extend(clean_rule(&sub_context, sub_rule, dry_run)?);
                }
            } else if dir.join(DESCRIPTOR_FILE).is_file() {
                let mut resolver = context.session.resolver();
                let id = resolver.parse(&dir)?;
                removed.extend(resolver.clean_module(id, dry_run)?);
            }
        }
        RuleKind::ExecuteProgram { .. } | RuleKind::CopyArchive { .. } => {}
    }
    let target = context.path(&rule.target);
    if !target.is_dir() {
        remove(&target, dry_run, &mut removed)?;
    }
    Ok(removed)
}

/// Cleans every rule of the graph.
pub(crate) fn clean_all(context: &ActionContext<'_>, dry_run: bool) -> Result<usize> {
    let mut count = 0;
    for rule in context.graph.rules() {
        count += clean_rule(context, rule, dry_run)?.len();
    }
    if dry_run {
        return Ok(count);
    }
    if count > 0 {
        println!("{} Clean complete ({} paths removed)", "✓".green(), count);
    } else {
        println!("{} Nothing to clean", "!".yellow());
    }
    Ok(count)
}
