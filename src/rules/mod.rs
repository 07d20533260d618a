//! Rule files: variables, globs, rule classification and the rule graph.

pub mod glob;
pub mod graph;
pub mod kind;
pub mod parser;
pub mod variables;

pub use glob::{GlobPattern, expand_glob};
pub use graph::{DependencyMap, Rule, RuleGraph, SELECTION};
pub use kind::{RuleKind, SpecialAction};
pub use parser::{parse_rule_file, parse_rules, split_arguments};
pub use variables::Variables;
