//! Error types shared by the rule engine, the scheduler and the resolver.

use thiserror::Error;

/// Errors raised while parsing, scheduling, resolving or building.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("glob did not match any file: '{0}'")]
    GlobNoMatch(String),

    #[error("unknown target: '{0}'")]
    UnknownTarget(String),

    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("compilation of '{target}' failed:\n{diagnostics}")]
    CompileFailure { target: String, diagnostics: String },

    #[error("program failed: '{program}' ({status})")]
    ProgramFailed { program: String, status: String },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("could not resolve {0}")]
    ArtifactNotFound(String),

    #[error("parent {parent} of {child} not found")]
    ParentNotFound { parent: String, child: String },

    #[error("offline mode: refusing to fetch {0}")]
    OfflineViolation(String),

    #[error("target '{0}' was not built")]
    TargetNotBuilt(String),

    #[error("unrecognized rule: '{0}'")]
    UnrecognizedRule(String),

    #[error("artifact id '{artifact}' is ambiguous: {candidates}")]
    AmbiguousArtifact { artifact: String, candidates: String },

    #[error("invalid descriptor {path}: {message}")]
    Descriptor { path: String, message: String },

    #[error("invalid metadata {path}: {message}")]
    Metadata { path: String, message: String },

    #[error("could not fetch {url}: {message}")]
    Transport { url: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{target}: {source}")]
    Rule {
        target: String,
        source: Box<BuildError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    /// Attaches the rule (or coordinate) context to an error once.
    pub fn in_rule(self, target: &str) -> Self {
        match self {
            BuildError::Rule { .. } | BuildError::DependencyCycle(_) => self,
            other => BuildError::Rule {
                target: target.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Innermost error, skipping rule context layers.
    pub fn root(&self) -> &BuildError {
        match self {
            BuildError::Rule { source, .. } => source.root(),
            other => other,
        }
    }

    /// The reported chain when this is a cycle error.
    pub fn cycle(&self) -> Option<&[String]> {
        match self.root() {
            BuildError::DependencyCycle(chain) => Some(chain),
            _ => None,
        }
    }

    /// A copy of this error for replaying a memoized failure. IO and
    /// archive errors keep their message only.
    pub fn duplicate(&self) -> BuildError {
        use BuildError::*;
        match self {
            Parse { file, line, message } => Parse {
                file: file.clone(),
                line: *line,
                message: message.clone(),
            },
            GlobNoMatch(glob) => GlobNoMatch(glob.clone()),
            UnknownTarget(target) => UnknownTarget(target.clone()),
            DependencyCycle(chain) => DependencyCycle(chain.clone()),
            CompileFailure { target, diagnostics } => CompileFailure {
                target: target.clone(),
                diagnostics: diagnostics.clone(),
            },
            ProgramFailed { program, status } => ProgramFailed {
                program: program.clone(),
                status: status.clone(),
            },
            ChecksumMismatch { path, expected, actual } => ChecksumMismatch {
                path: path.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            ArtifactNotFound(coordinate) => ArtifactNotFound(coordinate.clone()),
            ParentNotFound { parent, child } => ParentNotFound {
                parent: parent.clone(),
                child: child.clone(),
            },
            OfflineViolation(url) => OfflineViolation(url.clone()),
            TargetNotBuilt(target) => TargetNotBuilt(target.clone()),
            UnrecognizedRule(rule) => UnrecognizedRule(rule.clone()),
            AmbiguousArtifact { artifact, candidates } => AmbiguousArtifact {
                artifact: artifact.clone(),
                candidates: candidates.clone(),
            },
            Descriptor { path, message } => Descriptor {
                path: path.clone(),
                message: message.clone(),
            },
            Metadata { path, message } => Metadata {
                path: path.clone(),
                message: message.clone(),
            },
            Transport { url, message } => Transport {
                url: url.clone(),
                message: message.clone(),
            },
            Config(message) => Config(message.clone()),
            Rule { target, source } => Rule {
                target: target.clone(),
                source: Box::new(source.duplicate()),
            },
            Io(err) => Io(std::io::Error::new(err.kind(), err.to_string())),
            Zip(err) => Io(std::io::Error::other(err.to_string())),
        }
    }

    pub(crate) fn io_at(path: &std::path::Path, err: std::io::Error) -> Self {
        BuildError::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_joins_chain() {
        let err = BuildError::DependencyCycle(vec!["x".into(), "a".into(), "x".into()]);
        assert_eq!(err.to_string(), "dependency cycle detected: x -> a -> x");
    }

    #[test]
    fn test_in_rule_wraps_once() {
        let err = BuildError::TargetNotBuilt("out".into())
            .in_rule("out")
            .in_rule("all");
        assert_eq!(err.to_string(), "out: target 'out' was not built");
        assert!(matches!(err.root(), BuildError::TargetNotBuilt(_)));
    }

    #[test]
    fn test_duplicate_keeps_variant_and_message() {
        let err = BuildError::ChecksumMismatch {
            path: "a.jar".into(),
            expected: "00".into(),
            actual: "ff".into(),
        }
        .in_rule("app");
        let copy = err.duplicate();
        assert_eq!(copy.to_string(), err.to_string());
        assert!(matches!(copy.root(), BuildError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_cycle_is_never_wrapped() {
        let err = BuildError::DependencyCycle(vec!["a".into(), "a".into()]).in_rule("a");
        assert_eq!(err.cycle().map(|c| c.len()), Some(2));
    }
}
