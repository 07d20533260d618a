//! Glob matching, filesystem expansion and reverse substitution.
//!
//! `*` matches a run of non-separator characters, `?` a single one and
//! `**/` zero or more whole path segments. Dot-prefixed entries (which
//! covers `.git`, `.svn`, `.DS_Store`, `.settings` and friends) and editor
//! leftovers are never matched during expansion.

use crate::error::{BuildError, Result};
use regex::Regex;
use std::path::Path;
use walkdir::WalkDir;

const IGNORED_SUFFIXES: &[&str] = &[".form", ".swp", ".swo", "~"];

/// Returns true if `s` contains a glob wildcard.
pub fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?'])
}

/// Entries that expansion never yields nor descends into.
pub fn is_ignored(name: &str) -> bool {
    name.starts_with('.') || IGNORED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

#[derive(Debug, Clone)]
pub struct GlobPattern {
    glob: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(glob: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^{}$", to_regex(glob)))
            .map_err(|e| BuildError::Config(format!("invalid glob '{}': {}", glob, e)))?;
        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Byte offsets of the first and last wildcard character.
    fn wildcard_span(&self) -> Option<(usize, usize)> {
        let first = self.glob.find(['*', '?'])?;
        let last = self.glob.rfind(['*', '?'])?;
        Some((first, last))
    }

    /// The part of `matched` covered by the wildcard span of this pattern.
    pub fn captured<'a>(&self, matched: &'a str) -> Option<&'a str> {
        let (first, last) = self.wildcard_span()?;
        let suffix_len = self.glob.len() - last - 1;
        let end = matched.len().checked_sub(suffix_len)?;
        matched.get(first..end)
    }

    /// Given a name this pattern matched, rewrites `sibling` by replacing
    /// every occurrence of this pattern's wildcard run with the captured text.
    ///
    /// `plugins/*.jar` matched `plugins/Foo.jar` turns `src-plugins/*/**/*.java`
    /// into `src-plugins/Foo/**/*.java`; `**` runs in the sibling are left
    /// alone unless this pattern itself contains `**`.
    pub fn substitute(&self, matched: &str, sibling: &str) -> Result<String> {
        let (first, last) = self
            .wildcard_span()
            .ok_or_else(|| BuildError::Config(format!("expected a glob: '{}'", self.glob)))?;
        let wildcard = &self.glob[first..=last];
        let captured = self.captured(matched).ok_or_else(|| {
            BuildError::Config(format!("'{}' does not match '{}'", matched, self.glob))
        })?;
        let keep_star_star = !wildcard.contains("**");

        let mut result = String::with_capacity(sibling.len() + captured.len());
        let mut rest = sibling;
        while let Some(index) = rest.find(wildcard) {
            let tail = &rest[index..];
            if keep_star_star && tail.starts_with("**") {
                let skip = if tail.starts_with("**/*") { 4 } else { 2 };
                result.push_str(&rest[..index + skip]);
                rest = &rest[index + skip..];
                continue;
            }
            result.push_str(&rest[..index]);
            result.push_str(captured);
            rest = &rest[index + wildcard.len()..];
        }
        result.push_str(rest);
        Ok(result)
    }
}

fn to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() * 2);
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '?' => regex.push_str("[^/]"),
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    regex.push_str("(?:.*/)?");
                } else {
                    regex.push_str(".*");
                }
            }
            '*' => regex.push_str("[^/]*"),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex
}

/// Expands `glob` relative to `cwd`, appending matches to `out` in sorted
/// order. A token without wildcards is appended as-is and counts as one
/// match. Returns the number of entries appended.
pub fn expand_glob(glob: &str, cwd: &Path, out: &mut Vec<String>) -> Result<usize> {
    let Some(star) = glob.find(['*', '?']) else {
        out.push(glob.to_string());
        return Ok(1);
    };

    let star_star = glob[star..].starts_with("**/");
    let prev_slash = glob[..star].rfind('/');
    let next_slash = glob[star..].find('/').map(|i| i + star);

    let parent_path = prev_slash.map_or("", |i| &glob[..=i]);
    let parent_dir = cwd.join(parent_path);
    if !parent_dir.is_dir() {
        return Ok(0);
    }

    let segment_start = prev_slash.map_or(0, |i| i + 1);
    let mut segment = &glob[segment_start..next_slash.unwrap_or(glob.len())];
    let mut remainder = next_slash.map(|i| glob[i + 1..].to_string());

    let mut count = 0;
    if star_star {
        let rest = remainder.take().unwrap_or_default();
        count += expand_glob(&format!("{}{}", parent_path, rest), cwd, out)?;
        remainder = Some(format!("**/{}", rest));
        segment = "*";
    }

    let filter = GlobPattern::new(segment)?;
    let entries = WalkDir::new(&parent_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in entries {
        let entry = entry.map_err(|e| BuildError::Io(e.into()))?;
        let name = entry.file_name().to_string_lossy();
        if is_ignored(&name) || !filter.matches(&name) {
            continue;
        }
        let path = format!("{}{}", parent_path, name);
        let is_dir = cwd.join(&path).is_dir();
        match &remainder {
            None if !is_dir => {
                out.push(path);
                count += 1;
            }
            Some(rest) if is_dir => {
                count += expand_glob(&format!("{}/{}", path, rest), cwd, out)?;
            }
            _ => {}
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, path: &str) {
        let file = root.join(path);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, "x").unwrap();
    }

    fn sandbox() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for path in [
            "a/one.txt",
            "a/two.txt",
            "a/.hidden.txt",
            "a/notes.md",
            "a/b/three.txt",
            "a/b/c/four.txt",
            "a/.git/five.txt",
            "a/backup.txt~",
        ] {
            touch(dir.path(), path);
        }
        dir
    }

    fn expand(root: &Path, glob: &str) -> Vec<String> {
        let mut out = Vec::new();
        expand_glob(glob, root, &mut out).unwrap();
        out
    }

    #[test]
    fn test_single_star_matches_direct_children_only() {
        let dir = sandbox();
        assert_eq!(expand(dir.path(), "a/*.txt"), vec!["a/one.txt", "a/two.txt"]);
    }

    #[test]
    fn test_star_star_matches_every_depth() {
        let dir = sandbox();
        assert_eq!(
            expand(dir.path(), "a/**/*.txt"),
            vec!["a/one.txt", "a/two.txt", "a/b/three.txt", "a/b/c/four.txt"]
        );
    }

    #[test]
    fn test_hidden_and_vcs_entries_are_skipped() {
        let dir = sandbox();
        let all = expand(dir.path(), "**/*");
        assert!(all.iter().all(|p| !p.contains(".hidden") && !p.contains(".git")));
        assert!(!all.iter().any(|p| p.ends_with('~')));
    }

    #[test]
    fn test_question_mark_matches_one_character() {
        let dir = sandbox();
        assert_eq!(expand(dir.path(), "a/?ne.txt"), vec!["a/one.txt"]);
    }

    #[test]
    fn test_literal_counts_as_one_match() {
        let dir = sandbox();
        let mut out = Vec::new();
        assert_eq!(expand_glob("missing.txt", dir.path(), &mut out).unwrap(), 1);
        assert_eq!(out, vec!["missing.txt"]);
    }

    #[test]
    fn test_missing_parent_matches_nothing() {
        let dir = sandbox();
        let mut out = Vec::new();
        assert_eq!(expand_glob("nope/*.txt", dir.path(), &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_pattern_matching() {
        let glob = GlobPattern::new("plugins/*.jar").unwrap();
        assert!(glob.matches("plugins/Foo.jar"));
        assert!(!glob.matches("plugins/sub/Foo.jar"));
        assert!(!glob.matches("pluginsXFoo.jar"));

        let deep = GlobPattern::new("src/**/*.java").unwrap();
        assert!(deep.matches("src/A.java"));
        assert!(deep.matches("src/x/y/A.java"));
        assert!(!deep.matches("other/A.java"));
    }

    #[test]
    fn test_substitute_derives_sibling_name() {
        let glob = GlobPattern::new("plugins/*.jar").unwrap();
        assert_eq!(
            glob.substitute("plugins/Foo_Bar.jar", "src-plugins/*/**/*.java")
                .unwrap(),
            "src-plugins/Foo_Bar/**/*.java"
        );
        assert_eq!(
            glob.substitute("plugins/Foo.jar", "[ant -f *.xml]").unwrap(),
            "[ant -f Foo.xml]"
        );
    }

    #[test]
    fn test_substitute_requires_wildcard() {
        let glob = GlobPattern::new("plain.jar").unwrap();
        assert!(glob.substitute("plain.jar", "x").is_err());
    }
}
