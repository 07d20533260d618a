//! Sequential rule scheduling.
//!
//! Every rule moves through `Checking → {UpToDate, Stale}` and a stale rule
//! through `Building → {Built, Failed}`. States are kept for the lifetime of
//! a [`Builder`], so making a target twice does nothing the second time.
//! The build order comes from [`RuleGraph::dependency_map`], which also
//! reports cycles with the chain of targets that closes them.

use super::actions::{self, ActionContext};
use super::clean;
use super::utils::{mtime, touch_after};
use crate::error::{BuildError, Result};
use crate::rules::{Rule, RuleGraph, RuleKind, SpecialAction};
use crate::session::Session;
use colored::Colorize;
use serde::Serialize;
use std::collections::HashMap;
use std::time::SystemTime;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Checking,
    UpToDate,
    Stale,
    Building,
    Built,
    Failed,
}

/// What one build did.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BuildReport {
    /// Actions that touched the filesystem.
    pub actions: usize,
    /// Targets whose action ran, in completion order.
    pub built: Vec<String>,
    pub up_to_date: usize,
    /// Rules found stale by a check-only run.
    pub stale: Vec<String>,
}

impl BuildReport {
    pub fn is_noop(&self) -> bool {
        self.actions == 0
    }
}

pub struct Builder<'a> {
    pub(crate) session: &'a Session,
    pub(crate) graph: &'a RuleGraph,
    pub(crate) states: HashMap<String, RuleState>,
    pub(crate) report: BuildReport,
}

impl<'a> Builder<'a> {
    pub fn new(session: &'a Session, graph: &'a RuleGraph) -> Self {
        Self {
            session,
            graph,
            states: HashMap::new(),
            report: BuildReport::default(),
        }
    }

    pub fn state(&self, target: &str) -> Option<RuleState> {
        self.states.get(target).copied()
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    pub fn into_report(self) -> BuildReport {
        self.report
    }

    pub(crate) fn context(&self) -> ActionContext<'a> {
        ActionContext::new(self.session, self.graph)
    }

    /// Makes `target` after everything it depends on.
    pub fn make(&mut self, target: &str) -> Result<()> {
        let map = self.graph.dependency_map(&[target])?;
        for name in map.order() {
            self.make_one(name)?;
        }
        Ok(())
    }

    fn make_one(&mut self, target: &str) -> Result<()> {
        if self.states.contains_key(target) {
            return Ok(());
        }
        let graph = self.graph;
        let rule = graph
            .get_rule(target)
            .ok_or_else(|| BuildError::UnknownTarget(target.to_string()))?;
        self.states.insert(target.to_string(), RuleState::Checking);
        self.check_prerequisites(rule)?;

        if let RuleKind::Special(action) = &rule.kind {
            self.run_special(action)
                .map_err(|e| e.in_rule(&rule.target))?;
            self.states.insert(target.to_string(), RuleState::Built);
            return Ok(());
        }

        self.clean_if_requested(rule)?;
        if self.check(rule)? {
            return Ok(());
        }
        self.states.insert(target.to_string(), RuleState::Building);
        announce(rule);
        match execute(&self.context(), rule) {
            Ok(()) => {
                self.finish(rule);
                Ok(())
            }
            Err(e) => {
                self.states.insert(target.to_string(), RuleState::Failed);
                Err(e.in_rule(&rule.target))
            }
        }
    }

    /// Runs the up-to-date check and records the outcome.
    pub(crate) fn check(&mut self, rule: &Rule) -> Result<bool> {
        let up_to_date = actions::is_up_to_date(&self.context(), rule)
            .map_err(|e| e.in_rule(&rule.target))?;
        let state = if up_to_date {
            self.report.up_to_date += 1;
            RuleState::UpToDate
        } else {
            RuleState::Stale
        };
        debug!("{} is {:?}", rule.target, state);
        self.states.insert(rule.target.clone(), state);
        Ok(up_to_date)
    }

    pub(crate) fn finish(&mut self, rule: &Rule) {
        if rule.kind.performs_work() {
            self.report.actions += 1;
            self.report.built.push(rule.target.clone());
        }
        self.states.insert(rule.target.clone(), RuleState::Built);
    }

    /// Grouping rules insist that every prerequisite is a rule or a file.
    pub(crate) fn check_prerequisites(&self, rule: &Rule) -> Result<()> {
        if !matches!(rule.kind, RuleKind::All) {
            return Ok(());
        }
        for prereq in &rule.prerequisites {
            if self.graph.get_rule(prereq).is_none() && !self.graph.cwd().join(prereq).exists() {
                return Err(BuildError::UnknownTarget(prereq.clone()).in_rule(&rule.target));
            }
        }
        Ok(())
    }

    /// `REBUILD(target)=true` cleans the rule before it is checked.
    pub(crate) fn clean_if_requested(&mut self, rule: &Rule) -> Result<()> {
        if self.graph.var_bool("REBUILD", &rule.target) {
            debug!("cleaning {} before rebuilding it", rule.target);
            clean::clean_rule(&self.context(), rule, false)?;
        }
        Ok(())
    }

    pub(crate) fn run_special(&mut self, action: &SpecialAction) -> Result<()> {
        let graph = self.graph;
        let default = graph.default_target().unwrap_or_default().to_string();
        match action {
            SpecialAction::ShowRules => {
                for rule in graph.rules() {
                    if !matches!(rule.kind, RuleKind::Special(_)) {
                        println!("{} {}", rule, format!("({})", rule.kind).dimmed());
                    }
                }
            }
            SpecialAction::ShowVars => {
                for (key, value) in graph.variables().iter() {
                    println!("{} = {}", key.bold(), value);
                }
            }
            SpecialAction::Clean { dry_run } => {
                clean::clean_all(&self.context(), *dry_run)?;
            }
            SpecialAction::Check => {
                self.stale_rules(&default)?;
            }
            SpecialAction::DependencyMap => {
                print!("{}", graph.dependency_map(&[default.as_str()])?);
            }
            SpecialAction::CleanRule { target, dry_run } => {
                let rule = self.rule(target)?;
                clean::clean_rule(&self.context(), rule, *dry_run)?;
            }
            SpecialAction::RuleDependencyMap { target } => {
                print!("{}", graph.dependency_map(&[target.as_str()])?);
            }
            SpecialAction::Rebuild { target } => {
                let map = graph.dependency_map(&[target.as_str()])?;
                let context = self.context();
                for name in map.order() {
                    clean::clean_rule(&context, self.rule(name)?, false)?;
                    self.states.remove(name);
                }
                self.make(target)?;
            }
        }
        Ok(())
    }

    fn rule(&self, target: &str) -> Result<&'a Rule> {
        self.graph
            .get_rule(target)
            .ok_or_else(|| BuildError::UnknownTarget(target.to_string()))
    }

    /// Reports the rules below `target` that would be rebuilt, without
    /// touching the filesystem or the network.
    pub fn stale_rules(&mut self, target: &str) -> Result<Vec<String>> {
        let map = self.graph.dependency_map(&[target])?;
        let mut stale = Vec::new();
        for name in map.order() {
            let rule = self.rule(name)?;
            let current = match &rule.kind {
                RuleKind::All | RuleKind::Special(_) => continue,
                RuleKind::ExecuteProgram { program } if program.is_empty() => continue,
                kind => {
                    if let RuleKind::SubBuild { directory } = kind {
                        println!("{} Sub-build '{}' would make '{}'", "→".cyan(), directory, name);
                    }
                    actions::is_up_to_date_locally(&self.context(), rule)?
                }
            };
            if current {
                continue;
            }
            match &rule.kind {
                RuleKind::ExecuteProgram { program } => println!(
                    "{} Program '{}' would maybe make '{}'",
                    "!".yellow(),
                    program,
                    name
                ),
                _ => println!("{} {} is not up to date", "!".yellow(), name),
            }
            stale.push(name.clone());
        }
        if stale.is_empty() {
            println!("{} Everything is up to date", "⚡".green());
        }
        Ok(stale)
    }
}

pub(crate) fn announce(rule: &Rule) {
    if rule.kind.performs_work() {
        println!("{} Building {}", "⚙".blue(), rule.target);
    }
}

/// Runs the action, removes a partial target on failure, insists on the
/// target when the rule must produce one and moves it past its inputs.
pub(crate) fn execute(context: &ActionContext<'_>, rule: &Rule) -> Result<()> {
    let target = context.path(&rule.target);
    if let Err(e) = actions::run(context, rule) {
        if rule.kind.produces_target() && target.is_file() {
            debug!("removing partial {}", target.display());
            let _ = std::fs::remove_file(&target);
        }
        return Err(e);
    }

    if actions::expects_target(rule)
        && !target.exists()
        && !context.graph.var_bool("ALLOWEMPTY", &rule.target)
    {
        return Err(BuildError::TargetNotBuilt(rule.target.clone()));
    }
    touch_after(&target, input_times(context, rule))
}

fn input_times(context: &ActionContext<'_>, rule: &Rule) -> Vec<SystemTime> {
    let mut times: Vec<SystemTime> = rule
        .prerequisites
        .iter()
        .filter_map(|prereq| mtime(&context.path(prereq)))
        .collect();
    if context.session.config().build.rebuild_if_definitions_changed
        && let Some(stamp) = context.graph.definition().and_then(mtime)
    {
        times.push(stamp);
    }
    times
}
