//! Line-oriented rule file parser.
//!
//! ```text
//! # comment
//! JAVAVERSION=1.5
//! all <- plugins/Foo.jar
//! plugins/*.jar <- src-plugins/*/**/*.java
//! gen.txt[sh generate.sh $TARGET] <- template.txt
//! ```

use super::graph::RuleGraph;
use super::variables::Variables;
use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use std::path::Path;
use tracing::debug;

/// Parses the rule file at `path`. Relative paths inside it are resolved
/// against `cwd`. `overrides` are `KEY=value` pairs set before parsing.
pub fn parse_rule_file(
    path: &Path,
    cwd: &Path,
    overrides: &[(String, String)],
    build: &BuildConfig,
) -> Result<RuleGraph> {
    let content = std::fs::read_to_string(path).map_err(|e| BuildError::io_at(path, e))?;
    let mut graph = parse_rules(&content, &path.display().to_string(), cwd, overrides, build)?;
    graph.set_definition(path);
    Ok(graph)
}

/// Parses rule file text; `name` is used in error messages.
pub fn parse_rules(
    content: &str,
    name: &str,
    cwd: &Path,
    overrides: &[(String, String)],
    build: &BuildConfig,
) -> Result<RuleGraph> {
    let mut variables = Variables::default();
    for (key, value) in overrides {
        variables.set_override(key, value, cwd)?;
    }
    let mut graph = RuleGraph::new(cwd, variables, build);

    let mut lines = content.lines().enumerate().peekable();
    while let Some((index, raw)) = lines.next() {
        let line_number = index + 1;
        let mut line = raw.trim().to_string();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        while let Some(stripped) = line.strip_suffix('\\') {
            let mut joined = stripped.to_string();
            if let Some((_, next)) = lines.next() {
                joined.push_str(next.trim());
            }
            line = joined;
        }

        let parse_error = |message: String| BuildError::Parse {
            file: name.to_string(),
            line: line_number,
            message: format!("{}\n\t{}", message, raw.trim()),
        };

        if let Some((target, prerequisites)) = line.split_once("<-") {
            graph
                .define_rule(target, prerequisites)
                .map_err(|e| parse_error(e.to_string()))?;
        } else if let Some((key, value)) = line.split_once('=') {
            graph
                .variables_mut()
                .set(key.trim(), value.trim(), cwd)
                .map_err(|e| parse_error(e.to_string()))?;
        } else {
            return Err(parse_error("invalid line".to_string()));
        }
    }

    graph.finish().map_err(|e| BuildError::Parse {
        file: name.to_string(),
        line: 0,
        message: e.to_string(),
    })?;
    debug!("parsed {} with default target {:?}", name, graph.default_target());
    Ok(graph)
}

/// Splits leading `KEY=value` arguments from target names.
pub fn split_arguments(args: &[String]) -> (Vec<(String, String)>, Vec<String>) {
    let mut overrides = Vec::new();
    let mut targets = Vec::new();
    for arg in args {
        match arg.split_once('=') {
            Some((key, value)) if targets.is_empty() && !key.is_empty() => {
                overrides.push((key.to_string(), value.to_string()));
            }
            _ => targets.push(arg.clone()),
        }
    }
    (overrides, targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleKind;

    fn parse(content: &str, cwd: &Path) -> Result<RuleGraph> {
        parse_rules(content, "Fakefile", cwd, &[], &BuildConfig::default())
    }

    #[test]
    fn test_comments_continuations_and_variables() {
        let dir = tempfile::tempdir().unwrap();
        let graph = parse(
            "# a comment\n\
             javaVersion = 1.5\n\
             all <- one \\\n  two\n\
             one <-\n\
             two <-\n",
            dir.path(),
        )
        .unwrap();
        assert_eq!(graph.variables().get_exact("JAVAVERSION"), Some("1.5"));
        assert_eq!(graph.get_rule("all").unwrap().prerequisites, ["one", "two"]);
        assert_eq!(graph.default_target(), Some("all"));
    }

    #[test]
    fn test_program_rule_keeps_unexpanded_program() {
        let dir = tempfile::tempdir().unwrap();
        let graph = parse("all <- gen.txt\ngen.txt[sh gen.sh $TARGET] <-\n", dir.path()).unwrap();
        assert_eq!(
            graph.get_rule("gen.txt").unwrap().kind,
            RuleKind::ExecuteProgram {
                program: "sh gen.sh $TARGET".into()
            }
        );
    }

    #[test]
    fn test_error_carries_file_and_line() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse("all <- x\n\nthis is not a rule\n", dir.path()).unwrap_err();
        match err {
            BuildError::Parse { file, line, message } => {
                assert_eq!(file, "Fakefile");
                assert_eq!(line, 3);
                assert!(message.starts_with("invalid line"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_glob_without_match_aborts_parse() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse("all <- lib.jar\nlib.jar <- src/*.java\n", dir.path()).unwrap_err();
        assert!(err.to_string().contains("glob did not match any file"));
        assert!(err.to_string().starts_with("Fakefile:2:"));
    }

    #[test]
    fn test_overrides_are_set_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let graph = parse_rules(
            "MODE=file\nall <- x\nx <-\n",
            "Fakefile",
            dir.path(),
            &[("MODE".into(), "cli".into())],
            &BuildConfig::default(),
        )
        .unwrap();
        assert_eq!(graph.variables().get_exact("MODE"), Some("cli"));
    }

    #[test]
    fn test_split_arguments() {
        let args: Vec<String> = ["DEBUG=true", "VERBOSE=1", "all", "x=y"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (overrides, targets) = split_arguments(&args);
        assert_eq!(overrides.len(), 2);
        assert_eq!(targets, ["all", "x=y"]);
    }

    #[test]
    fn test_missing_default_rule() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse("A=1\n", dir.path()).is_err());
    }
}
