//! The rule graph: targets, their prerequisites and the dependency map.

use super::glob::{GlobPattern, expand_glob, has_wildcard};
use super::kind::{RuleKind, RuleShape, SpecialAction, classify};
use super::variables::Variables;
use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Target name of the synthetic rule created for explicit targets.
pub const SELECTION: &str = "";

const SPECIAL_SUFFIXES: &[&str] = &["-clean", "-clean-dry-run", "-dependency-map", "-rebuild"];

static VERSIONED_ARCHIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)(-\d+(\.\d+|\d{7})+[a-z]?\d?(-[A-Za-z0-9.]+|\.GA)*)(\.jar(-[a-z]*)?)$")
        .expect("static regex")
});

/// Maps `foo-1.2.3.jar` to `foo.jar`.
pub fn unversioned_name(name: &str) -> Option<String> {
    let captures = VERSIONED_ARCHIVE.captures(name)?;
    Some(format!("{}{}", &captures[1], &captures[5]))
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub target: String,
    pub prerequisites: Vec<String>,
    /// The prerequisite text as written, before expansion.
    pub expression: String,
    pub kind: RuleKind,
}

impl Rule {
    pub fn last_prerequisite(&self) -> Option<&str> {
        self.prerequisites.last().map(String::as_str)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-", self.target)?;
        for prereq in &self.prerequisites {
            write!(f, " {}", prereq)?;
        }
        Ok(())
    }
}

/// Rules in build order, each with the rules that need it.
#[derive(Debug, Default)]
pub struct DependencyMap {
    order: Vec<String>,
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyMap {
    /// Targets such that every rule comes after all of its dependencies.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn dependents(&self, target: &str) -> &[String] {
        self.dependents.get(target).map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.dependents.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl fmt::Display for DependencyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for target in &self.order {
            let needed_by = self.dependents(target);
            if needed_by.is_empty() {
                writeln!(f, "{}", target)?;
            } else {
                writeln!(f, "{} needed by {}", target, needed_by.join(" "))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct RuleGraph {
    rules: BTreeMap<String, Rule>,
    prerequisites: BTreeSet<String>,
    default_target: Option<String>,
    variables: Variables,
    cwd: PathBuf,
    definition: Option<PathBuf>,
    source_extension: String,
    output_extension: String,
}

impl RuleGraph {
    pub fn new(cwd: &Path, variables: Variables, build: &BuildConfig) -> Self {
        Self {
            rules: BTreeMap::new(),
            prerequisites: BTreeSet::new(),
            default_target: None,
            variables,
            cwd: cwd.to_path_buf(),
            definition: None,
            source_extension: build.source_extension.clone(),
            output_extension: build.output_extension.clone(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    pub fn set_definition(&mut self, path: &Path) {
        self.definition = Some(path.to_path_buf());
    }

    /// The rule file this graph was parsed from, if any.
    pub fn definition(&self) -> Option<&Path> {
        self.definition.as_deref()
    }

    pub fn default_target(&self) -> Option<&str> {
        self.default_target.as_deref()
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn get_rule(&self, target: &str) -> Option<&Rule> {
        let key = match target.strip_suffix('/') {
            Some(stripped) if stripped.ends_with(".jar") => stripped,
            _ => target,
        };
        self.rules.get(key)
    }

    /// Expands variables in `value` in the context of `target`.
    pub fn expand(&self, value: &str, target: Option<&str>) -> String {
        self.variables.expand(value, target, None)
    }

    pub fn var(&self, key: &str, target: &str) -> Option<&str> {
        self.variables.get(key, Some(target), None)
    }

    pub fn var_bool(&self, key: &str, target: &str) -> bool {
        self.variables.get_bool(key, Some(target), None)
    }

    /// Defines a rule from the text left and right of `<-`.
    ///
    /// A target of the form `name[program args]` runs a program. A target
    /// containing `*` defines one rule per already-known prerequisite it
    /// matches.
    pub fn define_rule(&mut self, target_spec: &str, expression: &str) -> Result<()> {
        let target_spec = target_spec.trim();
        let (raw_target, program) = match target_spec.find('[') {
            Some(bracket) if target_spec.ends_with(']') => (
                &target_spec[..bracket],
                Some(&target_spec[bracket + 1..target_spec.len() - 1]),
            ),
            _ => (target_spec, None),
        };
        let target = self.variables.expand(raw_target.trim(), None, None);

        if target.contains('*') {
            return self.define_wildcard_rules(&target, program, expression);
        }

        let expanded = self.variables.expand(expression, Some(&target), None);
        let mut prerequisites = Vec::new();
        for token in expanded.split_whitespace() {
            let matched = expand_glob(token, &self.cwd, &mut prerequisites)?
                + self.add_matching_targets(token, &mut prerequisites)?;
            if matched == 0 {
                return Err(BuildError::GlobNoMatch(token.to_string()));
            }
        }

        let last_is_directory = prerequisites
            .last()
            .is_some_and(|last| self.is_directory_prerequisite(last));
        let kind = classify(&RuleShape {
            target: &target,
            program: program.map(str::trim),
            prerequisites: &prerequisites,
            last_is_directory,
            source_extension: &self.source_extension,
            output_extension: &self.output_extension,
        })?;

        self.insert_rule(Rule {
            target,
            prerequisites,
            expression: expression.trim().to_string(),
            kind,
        });
        Ok(())
    }

    fn define_wildcard_rules(
        &mut self,
        target: &str,
        program: Option<&str>,
        expression: &str,
    ) -> Result<()> {
        let filter = GlobPattern::new(target)?;
        let candidates: Vec<String> = self
            .prerequisites
            .iter()
            .filter(|p| !self.rules.contains_key(*p) && filter.matches(p))
            .cloned()
            .collect();
        if candidates.is_empty() {
            warn!("wildcard target '{}' matched no prerequisite", target);
        }
        for concrete in candidates {
            let spec = match program {
                Some(program) => format!("{}[{}]", concrete, filter.substitute(&concrete, program)?),
                None => concrete.clone(),
            };
            let derived = filter.substitute(&concrete, expression)?;
            self.define_rule(&spec, &derived)?;
        }
        Ok(())
    }

    fn add_matching_targets(&self, token: &str, list: &mut Vec<String>) -> Result<usize> {
        if !has_wildcard(token) {
            return Ok(0);
        }
        let filter = GlobPattern::new(token)?;
        let mut count = 0;
        for rule in self.rules.values() {
            if matches!(rule.kind, RuleKind::All | RuleKind::Special(_))
                || !filter.matches(&rule.target)
                || list.contains(&rule.target)
            {
                continue;
            }
            list.push(rule.target.clone());
            count += 1;
        }
        Ok(count)
    }

    fn is_directory_prerequisite(&self, prereq: &str) -> bool {
        let path = self.cwd.join(prereq);
        path.is_dir()
            || (!path.exists()
                && prereq.ends_with('/')
                && !self.rules.contains_key(prereq.trim_end_matches('/')))
    }

    fn insert_rule(&mut self, rule: Rule) {
        let target = rule.target.clone();
        if !matches!(rule.kind, RuleKind::Special(_)) {
            if self.default_target.is_none() && target != SELECTION {
                self.default_target = Some(target.clone());
            }
            self.variables
                .define_if_absent(&format!("TARGET({})", target), &target);
            self.variables.define_if_absent(
                &format!("PRE({})", target),
                &rule.prerequisites.join(" "),
            );
            self.prerequisites.extend(rule.prerequisites.iter().cloned());
        }
        if self.rules.insert(target.clone(), rule).is_some() {
            debug!("rule '{}' redefined", target);
        }
    }

    fn add_special(&mut self, target: &str, action: SpecialAction) {
        if self.rules.contains_key(target) {
            return;
        }
        self.insert_rule(Rule {
            target: target.to_string(),
            prerequisites: Vec::new(),
            expression: String::new(),
            kind: RuleKind::Special(action),
        });
    }

    /// Adds the built-in special rules and validates variable names.
    pub fn finish(&mut self) -> Result<()> {
        let user_targets: Vec<String> = self
            .rules
            .values()
            .filter(|rule| {
                !matches!(rule.kind, RuleKind::Special(_))
                    && rule.target != SELECTION
                    && !SPECIAL_SUFFIXES.iter().any(|s| rule.target.ends_with(s))
            })
            .map(|rule| rule.target.clone())
            .collect();

        for target in user_targets {
            self.add_special(
                &format!("{}-clean", target),
                SpecialAction::CleanRule {
                    target: target.clone(),
                    dry_run: false,
                },
            );
            self.add_special(
                &format!("{}-clean-dry-run", target),
                SpecialAction::CleanRule {
                    target: target.clone(),
                    dry_run: true,
                },
            );
            self.add_special(
                &format!("{}-dependency-map", target),
                SpecialAction::RuleDependencyMap {
                    target: target.clone(),
                },
            );
            self.add_special(
                &format!("{}-rebuild", target),
                SpecialAction::Rebuild { target },
            );
        }

        self.add_special("show-rules", SpecialAction::ShowRules);
        self.add_special("show-vars", SpecialAction::ShowVars);
        self.add_special("clean", SpecialAction::Clean { dry_run: false });
        self.add_special("clean-dry-run", SpecialAction::Clean { dry_run: true });
        self.add_special("check", SpecialAction::Check);
        self.add_special("dry-run", SpecialAction::Check);
        self.add_special("dependency-map", SpecialAction::DependencyMap);

        if self.default_target.is_none() {
            return Err(BuildError::Config("could not find default rule".into()));
        }

        let rules = &self.rules;
        let prerequisites = &self.prerequisites;
        self.variables
            .check_names(|name| rules.contains_key(name) || prerequisites.contains(name))
    }

    /// Resolves the targets to build. Explicit targets are wrapped in a
    /// synthetic grouping rule; versioned archive names fall back to the
    /// unversioned rule.
    pub fn select(&mut self, targets: &[String]) -> Result<String> {
        if targets.is_empty() {
            return self
                .default_target
                .clone()
                .ok_or_else(|| BuildError::Config("could not find default rule".into()));
        }

        let mut selected = Vec::with_capacity(targets.len());
        for target in targets {
            let name = if self.get_rule(target).is_some() {
                target.clone()
            } else {
                unversioned_name(target)
                    .filter(|name| self.rules.contains_key(name))
                    .ok_or_else(|| BuildError::UnknownTarget(target.clone()))?
            };
            selected.push(name);
        }

        self.rules.insert(
            SELECTION.to_string(),
            Rule {
                target: SELECTION.to_string(),
                prerequisites: selected,
                expression: String::new(),
                kind: RuleKind::All,
            },
        );
        Ok(SELECTION.to_string())
    }

    /// Prerequisites of `target` that are themselves rules.
    pub fn dependencies(&self, target: &str) -> Vec<&str> {
        let Some(rule) = self.get_rule(target) else {
            return Vec::new();
        };
        rule.prerequisites
            .iter()
            .filter_map(|prereq| self.get_rule(prereq))
            .filter(|dep| dep.target != rule.target)
            .map(|dep| dep.target.as_str())
            .collect()
    }

    /// Walks the graph below `targets`, recording for each rule the rules
    /// that need it. A rule reached again while it is still on the current
    /// path closes a cycle, reported with the full chain.
    pub fn dependency_map(&self, targets: &[&str]) -> Result<DependencyMap> {
        let mut map = DependencyMap::default();
        for target in targets {
            if self.get_rule(target).is_none() {
                return Err(BuildError::UnknownTarget(target.to_string()));
            }
            let mut depths = HashMap::new();
            let mut path = Vec::new();
            self.visit(target, None, &mut map, &mut depths, &mut path)?;
        }
        Ok(map)
    }

    fn visit(
        &self,
        target: &str,
        needed_by: Option<&str>,
        map: &mut DependencyMap,
        depths: &mut HashMap<String, usize>,
        path: &mut Vec<String>,
    ) -> Result<()> {
        if let Some(dependents) = map.dependents.get_mut(target) {
            if let Some(parent) = needed_by {
                dependents.push(parent.to_string());
            }
            return Ok(());
        }

        if let Some(&depth) = depths.get(target) {
            let mut cycle = path[depth..].to_vec();
            cycle.push(target.to_string());
            return Err(BuildError::DependencyCycle(cycle));
        }

        depths.insert(target.to_string(), path.len());
        path.push(target.to_string());
        for dependency in self.dependencies(target) {
            self.visit(dependency, Some(target), map, depths, path)?;
        }
        path.pop();
        depths.remove(target);

        map.order.push(target.to_string());
        map.dependents.insert(
            target.to_string(),
            needed_by.map(str::to_string).into_iter().collect(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(dir: &Path) -> RuleGraph {
        RuleGraph::new(dir, Variables::new("linux64", None), &BuildConfig::default())
    }

    #[test]
    fn test_cycle_chain_starts_and_ends_at_same_rule() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path());
        g.define_rule("x", "a").unwrap();
        g.define_rule("a", "x").unwrap();
        g.finish().unwrap();

        let err = g.dependency_map(&["x"]).unwrap_err();
        let chain = err.cycle().unwrap();
        assert_eq!(chain.first(), chain.last());
        assert_eq!(chain, ["x", "a", "x"]);
    }

    #[test]
    fn test_dependency_map_orders_dependencies_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path());
        g.define_rule("all", "app lib").unwrap();
        g.define_rule("app", "lib").unwrap();
        g.define_rule("lib", "").unwrap();
        g.finish().unwrap();

        let map = g.dependency_map(&["all"]).unwrap();
        assert_eq!(map.order(), ["lib", "app", "all"]);
        assert_eq!(map.dependents("lib"), ["app", "all"]);
        assert!(map.to_string().contains("lib needed by app all"));
    }

    #[test]
    fn test_glob_prerequisite_without_match_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path());
        let err = g.define_rule("all.jar", "src/*.java").unwrap_err();
        assert!(matches!(err, BuildError::GlobNoMatch(t) if t == "src/*.java"));
    }

    #[test]
    fn test_glob_prerequisites_match_rule_targets() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path());
        g.define_rule("all", "jars/*.jar").unwrap_err();
        g.define_rule("jars/a.jar", "precompiled/a.jar").unwrap();
        g.define_rule("jars/b.jar", "precompiled/b.jar").unwrap();
        g.define_rule("all", "jars/*.jar").unwrap();
        let rule = g.get_rule("all").unwrap();
        assert_eq!(rule.prerequisites, ["jars/a.jar", "jars/b.jar"]);
    }

    #[test]
    fn test_wildcard_targets_expand_per_prerequisite() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Foo", "Bar"] {
            let src = dir.path().join("src-plugins").join(name);
            std::fs::create_dir_all(&src).unwrap();
            std::fs::write(src.join(format!("{}.java", name)), "class X {}").unwrap();
        }
        let mut g = graph(dir.path());
        g.define_rule("all", "plugins/Foo.jar plugins/Bar.jar").unwrap();
        g.define_rule("plugins/*.jar", "src-plugins/*/**/*.java").unwrap();

        let foo = g.get_rule("plugins/Foo.jar").unwrap();
        assert_eq!(foo.kind, RuleKind::CompileArchive);
        assert_eq!(foo.prerequisites, ["src-plugins/Foo/Foo.java"]);
        assert!(g.get_rule("plugins/Bar.jar").is_some());
    }

    #[test]
    fn test_target_variables_and_specials() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path());
        g.define_rule("all", "app").unwrap();
        g.define_rule("app[sh build.sh $TARGET]", "").unwrap();
        g.finish().unwrap();

        assert_eq!(g.var("TARGET", "app"), Some("app"));
        assert_eq!(g.var("PRE", "all"), Some("app"));
        assert!(matches!(
            g.get_rule("app-rebuild").unwrap().kind,
            RuleKind::Special(SpecialAction::Rebuild { .. })
        ));
        assert!(g.get_rule("clean").is_some());
        assert_eq!(g.default_target(), Some("all"));
    }

    #[test]
    fn test_invalid_variable_subkey() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path());
        g.variables_mut()
            .set("CFLAGS(nothing)", "-g", dir.path())
            .unwrap();
        g.define_rule("all", "").unwrap();
        assert!(g.finish().is_err());
    }

    #[test]
    fn test_select_falls_back_to_unversioned_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path());
        g.define_rule("all", "jars/foo.jar").unwrap();
        g.define_rule("jars/foo.jar", "precompiled/foo.jar").unwrap();
        g.finish().unwrap();

        let root = g.select(&["jars/foo-1.2.3.jar".to_string()]).unwrap();
        assert_eq!(g.get_rule(&root).unwrap().prerequisites, ["jars/foo.jar"]);
        assert!(matches!(
            g.select(&["nope".to_string()]),
            Err(BuildError::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_unversioned_name() {
        assert_eq!(unversioned_name("jars/ij-1.44e.jar").as_deref(), Some("jars/ij.jar"));
        assert_eq!(unversioned_name("jars/plain.jar"), None);
        assert_eq!(
            unversioned_name("jars/javassist-3.12.1.GA.jar").as_deref(),
            Some("jars/javassist.jar")
        );
        assert_eq!(
            unversioned_name("imglib2-2.0.0-SNAPSHOT.jar").as_deref(),
            Some("imglib2.jar")
        );
    }
}
