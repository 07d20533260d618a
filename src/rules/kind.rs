//! Rule kinds and the classification that picks one.

use crate::error::{BuildError, Result};
use std::fmt;

/// Built-in actions that operate on the rule graph itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialAction {
    ShowRules,
    ShowVars,
    Clean { dry_run: bool },
    Check,
    DependencyMap,
    CleanRule { target: String, dry_run: bool },
    RuleDependencyMap { target: String },
    Rebuild { target: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    /// Groups prerequisites. Never up to date, has no action of its own.
    All,
    Special(SpecialAction),
    /// `target[program args]`; an empty program only orders prerequisites.
    ExecuteProgram { program: String },
    /// Builds the default target of the rule file in `directory`.
    SubBuild { directory: String },
    /// Builds the module described by `descriptor` from source.
    Module { descriptor: String },
    CopyArchive { source: String },
    /// Compiles sources into a build directory and packages them.
    CompileArchive,
    /// Compiles sources in place; the target is one of the outputs.
    CompileOutput,
    /// Compiles and links C/C++ sources.
    CompileProgram,
}

impl RuleKind {
    /// Whether running this rule's action does real work on the filesystem.
    pub fn performs_work(&self) -> bool {
        match self {
            RuleKind::All | RuleKind::Special(_) => false,
            RuleKind::ExecuteProgram { program } => !program.is_empty(),
            _ => true,
        }
    }

    /// Whether the target must exist once the action finished.
    pub fn produces_target(&self) -> bool {
        self.performs_work()
    }

    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::All => "All",
            RuleKind::Special(_) => "Special",
            RuleKind::ExecuteProgram { .. } => "ExecuteProgram",
            RuleKind::SubBuild { .. } => "SubBuild",
            RuleKind::Module { .. } => "Module",
            RuleKind::CopyArchive { .. } => "CopyArchive",
            RuleKind::CompileArchive => "CompileArchive",
            RuleKind::CompileOutput => "CompileOutput",
            RuleKind::CompileProgram => "CompileProgram",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const ARCHIVE_EXTENSION: &str = ".jar";
pub const DESCRIPTOR_FILE: &str = "pom.xml";
const NATIVE_EXTENSIONS: &[&str] = &[".c", ".cxx", ".cpp", ".cc"];

/// Everything classification looks at. Filesystem facts are gathered by
/// the caller so that classification itself stays pure.
#[derive(Debug)]
pub struct RuleShape<'a> {
    pub target: &'a str,
    pub program: Option<&'a str>,
    pub prerequisites: &'a [String],
    pub last_is_directory: bool,
    pub source_extension: &'a str,
    pub output_extension: &'a str,
}

fn has_extension(path: &str, extension: &str) -> bool {
    !extension.is_empty()
        && path
            .strip_suffix(extension)
            .is_some_and(|stem| stem.ends_with('.'))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn classify(shape: &RuleShape<'_>) -> Result<RuleKind> {
    if let Some(program) = shape.program {
        return Ok(RuleKind::ExecuteProgram {
            program: program.to_string(),
        });
    }

    let prereqs = shape.prerequisites;
    let last = prereqs.last().map(String::as_str);

    if let Some(last) = last
        && (last == DESCRIPTOR_FILE || last.ends_with("/pom.xml"))
    {
        return Ok(RuleKind::Module {
            descriptor: last.to_string(),
        });
    }

    if let Some(last) = last
        && shape.last_is_directory
    {
        return Ok(RuleKind::SubBuild {
            directory: last.to_string(),
        });
    }

    let target_is_archive = shape.target.ends_with(ARCHIVE_EXTENSION);
    let has_sources = prereqs
        .iter()
        .any(|p| has_extension(p, shape.source_extension));

    if target_is_archive
        && !has_sources
        && let Some(last) = last
        && last.ends_with(ARCHIVE_EXTENSION)
    {
        return Ok(RuleKind::CopyArchive {
            source: last.to_string(),
        });
    }

    if prereqs
        .iter()
        .any(|p| NATIVE_EXTENSIONS.iter().any(|ext| p.ends_with(ext)))
    {
        return Ok(RuleKind::CompileProgram);
    }

    if has_extension(shape.target, shape.output_extension) && has_sources {
        return Ok(RuleKind::CompileOutput);
    }

    if target_is_archive || has_sources {
        return Ok(RuleKind::CompileArchive);
    }

    if !file_name(shape.target).contains('.') {
        return Ok(RuleKind::All);
    }

    Err(BuildError::UnrecognizedRule(shape.target.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(target: &str, prereqs: &[&str]) -> Result<RuleKind> {
        let prereqs: Vec<String> = prereqs.iter().map(|s| s.to_string()).collect();
        classify(&RuleShape {
            target,
            program: None,
            prerequisites: &prereqs,
            last_is_directory: false,
            source_extension: "java",
            output_extension: "class",
        })
    }

    #[test]
    fn test_program_rule() {
        let shape = RuleShape {
            target: "gen.txt",
            program: Some("sh make.sh"),
            prerequisites: &[],
            last_is_directory: false,
            source_extension: "java",
            output_extension: "class",
        };
        assert_eq!(
            classify(&shape).unwrap(),
            RuleKind::ExecuteProgram {
                program: "sh make.sh".into()
            }
        );
    }

    #[test]
    fn test_archive_rules() {
        assert_eq!(
            kind("jars/a.jar", &["precompiled/a.jar"]).unwrap(),
            RuleKind::CopyArchive {
                source: "precompiled/a.jar".into()
            }
        );
        assert_eq!(
            kind("plugins/Foo.jar", &["src/Foo.java", "src/plugins.config"]).unwrap(),
            RuleKind::CompileArchive
        );
        assert_eq!(
            kind("jars/lib.jar", &["modules/lib/pom.xml"]).unwrap(),
            RuleKind::Module {
                descriptor: "modules/lib/pom.xml".into()
            }
        );
    }

    #[test]
    fn test_source_extension_drives_compilation() {
        let prereqs = vec!["a.src".to_string(), "b.src".to_string()];
        let shape = RuleShape {
            target: "out",
            program: None,
            prerequisites: &prereqs,
            last_is_directory: false,
            source_extension: "src",
            output_extension: "obj",
        };
        assert_eq!(classify(&shape).unwrap(), RuleKind::CompileArchive);
    }

    #[test]
    fn test_native_and_class_rules() {
        assert_eq!(
            kind("bin/tool", &["tool.c", "util.c"]).unwrap(),
            RuleKind::CompileProgram
        );
        assert_eq!(kind("A.class", &["A.java"]).unwrap(), RuleKind::CompileOutput);
    }

    #[test]
    fn test_subbuild_requires_directory() {
        let prereqs = vec!["modules/sub/".to_string()];
        let shape = RuleShape {
            target: "sub.jar",
            program: None,
            prerequisites: &prereqs,
            last_is_directory: true,
            source_extension: "java",
            output_extension: "class",
        };
        assert!(matches!(classify(&shape).unwrap(), RuleKind::SubBuild { .. }));
    }

    #[test]
    fn test_grouping_and_unrecognized() {
        assert_eq!(kind("all", &["a.jar", "b.jar"]).unwrap(), RuleKind::All);
        assert_eq!(kind("x", &["a"]).unwrap(), RuleKind::All);
        assert!(matches!(
            kind("notes.txt", &["draft.txt"]),
            Err(BuildError::UnrecognizedRule(_))
        ));
    }

    #[test]
    fn test_only_real_actions_count_as_work() {
        assert!(!RuleKind::All.performs_work());
        assert!(
            !RuleKind::ExecuteProgram {
                program: String::new()
            }
            .performs_work()
        );
        assert!(RuleKind::CompileArchive.performs_work());
    }
}
