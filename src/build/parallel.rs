//! Parallel rule scheduling on a bounded worker pool.
//!
//! The coordinating thread owns the builder: it runs up-to-date checks,
//! special rules and all state transitions. Workers only run the actions of
//! stale rules whose dependencies are complete, and report back over a
//! channel. At most `jobs` actions run at once. After the first failure
//! nothing new is dispatched, workers that have not started yet skip their
//! action, actions already running finish and the first error is returned.

use super::actions::ActionContext;
use super::scheduler::{Builder, RuleState, execute};
use crate::error::{BuildError, Result};
use crate::rules::{DependencyMap, Rule, RuleKind};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use tracing::debug;

fn progress_bar(len: usize) -> ProgressBar {
    if !console::Term::stderr().is_term() {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    let bar = ProgressBar::new(len as u64);
    bar.set_style(style);
    bar
}

fn say(bar: &ProgressBar, line: String) {
    if bar.is_hidden() {
        println!("{}", line);
    } else {
        bar.println(line);
    }
}

/// Dependency counts of every rule in `map`, restricted to the map.
fn pending_counts<'m>(builder: &Builder<'_>, map: &'m DependencyMap) -> HashMap<&'m str, usize> {
    map.order()
        .iter()
        .map(|target| {
            let dependencies: HashSet<&str> = builder
                .graph
                .dependencies(target)
                .into_iter()
                .filter(|dep| map.contains(dep))
                .collect();
            (target.as_str(), dependencies.len())
        })
        .collect()
}

/// Marks `target` complete and queues the dependents it unblocked.
fn release<'m>(
    target: &str,
    map: &'m DependencyMap,
    pending: &mut HashMap<&'m str, usize>,
    ready: &mut VecDeque<&'m str>,
) {
    let dependents: HashSet<&'m str> = map.dependents(target).iter().map(String::as_str).collect();
    for dependent in dependents {
        if let Some(count) = pending.get_mut(dependent) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                ready.push_back(dependent);
            }
        }
    }
}

/// Coordinator-side work before dispatch. Returns whether the rule is
/// already complete.
fn prepare(builder: &mut Builder<'_>, rule: &Rule) -> Result<bool> {
    if builder.states.contains_key(&rule.target) {
        return Ok(true);
    }
    builder
        .states
        .insert(rule.target.clone(), RuleState::Checking);
    builder.check_prerequisites(rule)?;

    if let RuleKind::Special(action) = &rule.kind {
        builder
            .run_special(action)
            .map_err(|e| e.in_rule(&rule.target))?;
        builder.states.insert(rule.target.clone(), RuleState::Built);
        return Ok(true);
    }
    builder.clean_if_requested(rule)?;
    if builder.check(rule)? {
        return Ok(true);
    }
    if !rule.kind.performs_work() {
        execute(&builder.context(), rule).map_err(|e| e.in_rule(&rule.target))?;
        builder.finish(rule);
        return Ok(true);
    }
    Ok(false)
}

/// Makes `target` with at most `jobs` actions running at once.
pub fn make_parallel(builder: &mut Builder<'_>, target: &str, jobs: usize) -> Result<()> {
    let graph = builder.graph;
    let map = graph.dependency_map(&[target])?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| BuildError::Config(format!("could not start {} workers: {}", jobs, e)))?;

    let mut pending = pending_counts(builder, &map);
    let mut ready: VecDeque<&str> = map
        .order()
        .iter()
        .map(String::as_str)
        .filter(|t| pending.get(t) == Some(&0))
        .collect();
    let bar = progress_bar(map.len());
    let context: ActionContext<'_> = builder.context();
    // `None` marks an action skipped after cancellation.
    let (sender, receiver) = mpsc::channel::<(String, Option<Result<()>>)>();
    let cancelled = AtomicBool::new(false);
    let jobs = jobs.max(1);
    let mut first_error: Option<BuildError> = None;
    let mut in_flight = 0usize;

    pool.in_place_scope(|scope| {
        loop {
            while first_error.is_none()
                && in_flight < jobs
                && let Some(name) = ready.pop_front()
            {
                let Some(rule) = graph.get_rule(name) else {
                    first_error = Some(BuildError::UnknownTarget(name.to_string()));
                    break;
                };
                match prepare(builder, rule) {
                    Ok(true) => {
                        bar.inc(1);
                        release(name, &map, &mut pending, &mut ready);
                    }
                    Ok(false) => {
                        builder
                            .states
                            .insert(rule.target.clone(), RuleState::Building);
                        say(&bar, format!("{} Building {}", "⚙".blue(), rule.target));
                        bar.set_message(rule.target.clone());
                        in_flight += 1;
                        let sender = sender.clone();
                        let context = &context;
                        let cancelled = &cancelled;
                        scope.spawn(move |_| {
                            let result = (!cancelled.load(Ordering::SeqCst))
                                .then(|| execute(context, rule));
                            let _ = sender.send((rule.target.clone(), result));
                        });
                    }
                    Err(e) => {
                        cancelled.store(true, Ordering::SeqCst);
                        first_error = Some(e);
                    }
                }
            }

            if in_flight == 0 {
                break;
            }
            let Ok((name, result)) = receiver.recv() else {
                break;
            };
            in_flight -= 1;
            bar.inc(1);
            let Some(rule) = graph.get_rule(&name) else {
                continue;
            };
            match result {
                None => {
                    debug!("skipped {} after an earlier failure", name);
                    builder.states.remove(&name);
                }
                Some(Ok(())) => {
                    builder.finish(rule);
                    if first_error.is_none() {
                        release(&rule.target, &map, &mut pending, &mut ready);
                    }
                }
                Some(Err(e)) => {
                    cancelled.store(true, Ordering::SeqCst);
                    builder.states.insert(name.clone(), RuleState::Failed);
                    say(&bar, format!("{} {} failed", "x".red(), name));
                    if first_error.is_none() {
                        first_error = Some(e.in_rule(&name));
                    } else {
                        debug!("discarding later failure of {}: {}", name, e);
                    }
                }
            }
        }
    });
    bar.finish_and_clear();

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
