//! The variable table of a rule file.
//!
//! Keys are stored as the uppercased name, optionally followed by a
//! parenthesized subkey that keeps its case: `CLASSPATH(plugins/Foo.jar)`.

use super::glob::{expand_glob, has_wildcard};
use crate::error::{BuildError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

pub const KNOWN_PLATFORMS: &[&str] = &[
    "linux32", "linux64", "win32", "win64", "macosx", "osx10.1", "osx10.2", "osx10.3", "osx10.4",
    "osx10.5", "osx10.6", "freebsd",
];

/// Platform identifier of the running host.
pub fn current_platform() -> String {
    let bits = if cfg!(target_pointer_width = "64") { "64" } else { "32" };
    if cfg!(target_os = "windows") {
        format!("win{}", bits)
    } else if cfg!(target_os = "macos") {
        "macosx".to_string()
    } else if cfg!(target_os = "freebsd") {
        "freebsd".to_string()
    } else {
        format!("linux{}", bits)
    }
}

/// Subkeys consulted after the explicit ones: versioned macOS identifiers
/// from newest to oldest, then the platform itself.
pub fn platform_fallback_chain(platform: &str, osx_minor: Option<u32>) -> Vec<String> {
    let mut chain = Vec::new();
    if platform == "macosx"
        && let Some(minor) = osx_minor
    {
        chain.extend((1..=minor).rev().map(|i| format!("osx10.{}", i)));
    }
    chain.push(platform.to_string());
    chain
}

fn split_key(key: &str) -> (String, Option<&str>) {
    match key.find('(') {
        Some(paren) if key.ends_with(')') => (
            key[..paren].trim().to_uppercase(),
            Some(&key[paren + 1..key.len() - 1]),
        ),
        _ => (key.trim().to_uppercase(), None),
    }
}

fn full_key(name: &str, subkey: Option<&str>) -> String {
    match subkey {
        Some(sub) => format!("{}({})", name, sub),
        None => name.to_string(),
    }
}

fn is_var_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// End of a variable reference starting at `start` (just past the `$`).
fn variable_name_end(value: &str, start: usize) -> usize {
    let bytes = value.as_bytes();
    let mut offset = start;
    while offset < bytes.len() {
        let c = bytes[offset] as char;
        if c == '(' {
            return match value[offset..].find(')') {
                Some(close) => offset + close + 1,
                None => offset,
            };
        }
        if !is_var_char(c) {
            return offset;
        }
        offset += 1;
    }
    offset
}

pub fn parse_bool(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "yes" | "on")
    )
}

#[derive(Debug, Clone)]
pub struct Variables {
    values: BTreeMap<String, String>,
    locked: BTreeSet<String>,
    platform: String,
    osx_minor: Option<u32>,
}

impl Default for Variables {
    fn default() -> Self {
        Self::new(&current_platform(), None)
    }
}

impl Variables {
    pub fn new(platform: &str, osx_minor: Option<u32>) -> Self {
        let mut values = BTreeMap::new();
        for known in KNOWN_PLATFORMS {
            values.insert(format!("PLATFORM({})", known), known.to_string());
        }
        values.insert("PLATFORM".to_string(), platform.to_string());
        Self {
            values,
            locked: BTreeSet::new(),
            platform: platform.to_string(),
            osx_minor,
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Sets a variable from the command line. File assignments to the same
    /// key are ignored afterwards.
    pub fn set_override(&mut self, key: &str, value: &str, cwd: &Path) -> Result<()> {
        let (name, subkey) = split_key(key);
        let normalized = full_key(&name, subkey);
        self.locked.remove(&normalized);
        self.set(key, value, cwd)?;
        self.locked.insert(normalized);
        Ok(())
    }

    /// Sets `key = value`, expanding variables and globs in the value.
    pub fn set(&mut self, key: &str, value: &str, cwd: &Path) -> Result<()> {
        let (name, subkey) = split_key(key);
        if subkey == Some("*") {
            return self.set_wildcard(&name, value, cwd);
        }
        let normalized = full_key(&name, subkey);
        if self.locked.contains(&normalized) {
            debug!("{} is set on the command line, ignoring file value", normalized);
            return Ok(());
        }

        if name == "ENVOVERRIDES"
            && let Some(var) = subkey
        {
            self.values.insert(normalized, value.to_string());
            if parse_bool(Some(value))
                && let Ok(env_value) = std::env::var(var)
            {
                let target = full_key(&var.to_uppercase(), None);
                self.values.insert(target.clone(), env_value);
                self.locked.insert(target);
            }
            return Ok(());
        }

        let mut expanded = self.expand(value, subkey, None);
        if has_wildcard(&expanded) {
            expanded = self.expand_value_globs(&name, &expanded, cwd)?;
        }
        self.values.insert(normalized, expanded);
        Ok(())
    }

    /// `NAME(*) = $A $B` sets `NAME(sub)` for every subkey already defined
    /// for `A` or `B`.
    fn set_wildcard(&mut self, name: &str, value: &str, cwd: &Path) -> Result<()> {
        let mut referenced = BTreeSet::new();
        let mut offset = 0;
        while let Some(dollar) = value[offset..].find('$').map(|i| i + offset) {
            offset = variable_name_end(value, dollar + 1);
            referenced.insert(value[dollar + 1..offset].to_uppercase());
        }

        let subkeys: BTreeSet<String> = self
            .values
            .keys()
            .filter_map(|key| {
                let (var, sub) = split_key(key);
                let sub = sub?;
                referenced.contains(&var).then(|| sub.to_string())
            })
            .collect();

        for sub in subkeys {
            self.set(&format!("{}({})", name, sub), value, cwd)?;
        }
        Ok(())
    }

    fn expand_value_globs(&self, name: &str, value: &str, cwd: &Path) -> Result<String> {
        let separator = if name == "CLASSPATH" { ':' } else { ' ' };
        let flattened = value.replace('\t', " ");
        let mut files = Vec::new();
        for token in flattened.split(separator).filter(|t| !t.trim().is_empty()) {
            let token = token.trim();
            if expand_glob(token, cwd, &mut files)? == 0 {
                warn!("no match for {}", token);
            }
        }
        Ok(files.join(&separator.to_string()))
    }

    /// Stores a value verbatim unless the key is already set.
    pub fn define_if_absent(&mut self, key: &str, value: &str) {
        let (name, subkey) = split_key(key);
        self.values
            .entry(full_key(&name, subkey))
            .or_insert_with(|| value.to_string());
    }

    /// Looks up `key` with the fallback chain `key(subkey)`, `key(subkey2)`,
    /// the platform chain, then the bare key.
    pub fn get(&self, key: &str, subkey: Option<&str>, subkey2: Option<&str>) -> Option<&str> {
        let name = key.to_uppercase();
        let candidates = subkey
            .into_iter()
            .chain(subkey2)
            .map(str::to_string)
            .chain(platform_fallback_chain(&self.platform, self.osx_minor));
        for sub in candidates {
            if let Some(value) = self.values.get(&full_key(&name, Some(&sub))) {
                return Some(value);
            }
        }
        self.values.get(&name).map(String::as_str)
    }

    /// Exact lookup of `NAME` or `NAME(subkey)`.
    pub fn get_exact(&self, key: &str) -> Option<&str> {
        let (name, subkey) = split_key(key);
        self.values.get(&full_key(&name, subkey)).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str, subkey: Option<&str>, subkey2: Option<&str>) -> bool {
        parse_bool(self.get(key, subkey, subkey2))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get_exact(key).is_some()
    }

    /// Replaces `$NAME` and `$NAME(sub)` references. Missing variables
    /// expand to the empty string.
    pub fn expand(&self, value: &str, subkey: Option<&str>, subkey2: Option<&str>) -> String {
        let mut result = String::with_capacity(value.len());
        let mut offset = 0;
        while let Some(dollar) = value[offset..].find('$').map(|i| i + offset) {
            result.push_str(&value[offset..dollar]);
            let end = variable_name_end(value, dollar + 1);
            let name = &value[dollar + 1..end];
            if name.is_empty() {
                result.push('$');
            } else if name.contains('(') {
                result.push_str(self.get_exact(name).unwrap_or(""));
            } else {
                result.push_str(self.get(name, subkey, subkey2).unwrap_or(""));
            }
            offset = end;
        }
        result.push_str(&value[offset..]);
        result
    }

    /// Every subkeyed variable must name a prerequisite, a rule target or a
    /// known platform.
    pub fn check_names(&self, is_known: impl Fn(&str) -> bool) -> Result<()> {
        for key in self.values.keys() {
            let (name, Some(sub)) = split_key(key) else {
                continue;
            };
            if name == "ENVOVERRIDES" || KNOWN_PLATFORMS.contains(&sub) || is_known(sub) {
                continue;
            }
            return Err(BuildError::Config(format!(
                "invalid target for variable {}",
                key
            )));
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Variables {
        Variables::new("linux64", None)
    }

    fn cwd() -> &'static Path {
        Path::new(".")
    }

    #[test]
    fn test_keys_are_uppercased_but_subkeys_keep_case() {
        let mut v = vars();
        v.set("javaVersion(Foo.jar)", "1.6", cwd()).unwrap();
        assert_eq!(v.get_exact("JAVAVERSION(Foo.jar)"), Some("1.6"));
        assert_eq!(v.get_exact("JAVAVERSION(foo.jar)"), None);
    }

    #[test]
    fn test_fallback_order() {
        let mut v = vars();
        v.set("CFLAGS", "-O2", cwd()).unwrap();
        v.set("CFLAGS(linux64)", "-m64", cwd()).unwrap();
        v.set("CFLAGS(prog)", "-g", cwd()).unwrap();
        assert_eq!(v.get("CFLAGS", Some("prog"), None), Some("-g"));
        assert_eq!(v.get("CFLAGS", Some("other"), Some("prog")), Some("-g"));
        assert_eq!(v.get("CFLAGS", Some("other"), None), Some("-m64"));
        let plain = Variables::new("win32", None);
        assert_eq!(plain.get("CFLAGS", None, None), None);
    }

    #[test]
    fn test_osx_version_chain() {
        assert_eq!(
            platform_fallback_chain("macosx", Some(3)),
            vec!["osx10.3", "osx10.2", "osx10.1", "macosx"]
        );
        let mut v = Variables::new("macosx", Some(6));
        v.set("LIBS(osx10.4)", "-framework Old", cwd()).unwrap();
        v.set("LIBS(macosx)", "-framework New", cwd()).unwrap();
        assert_eq!(v.get("LIBS", None, None), Some("-framework Old"));
    }

    #[test]
    fn test_expand_references() {
        let mut v = vars();
        v.set("A", "alpha", cwd()).unwrap();
        v.set("B(x)", "beta", cwd()).unwrap();
        assert_eq!(v.expand("$A-$B(x)-$MISSING.", None, None), "alpha-beta-.");
        assert_eq!(v.expand("$B", Some("x"), None), "beta");
        assert_eq!(v.expand("cost: 5$", None, None), "cost: 5$");
    }

    #[test]
    fn test_wildcard_propagation() {
        let mut v = vars();
        v.set("CLASSES(a.jar)", "A", cwd()).unwrap();
        v.set("CLASSES(b.jar)", "B", cwd()).unwrap();
        v.set("SUMMARY(*)", "has $CLASSES", cwd()).unwrap();
        assert_eq!(v.get_exact("SUMMARY(a.jar)"), Some("has A"));
        assert_eq!(v.get_exact("SUMMARY(b.jar)"), Some("has B"));
        assert_eq!(v.get_exact("SUMMARY"), None);
    }

    #[test]
    fn test_override_wins_over_file() {
        let mut v = vars();
        v.set_override("DEBUG", "true", cwd()).unwrap();
        v.set("debug", "false", cwd()).unwrap();
        assert!(v.get_bool("DEBUG", None, None));
    }

    #[test]
    fn test_glob_values_are_expanded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("jars")).unwrap();
        std::fs::write(dir.path().join("jars/a.jar"), "").unwrap();
        std::fs::write(dir.path().join("jars/b.jar"), "").unwrap();
        let mut v = vars();
        v.set("CLASSPATH", "jars/*.jar:extra", dir.path()).unwrap();
        assert_eq!(v.get_exact("CLASSPATH"), Some("jars/a.jar:jars/b.jar:extra"));
    }

    #[test]
    fn test_check_names() {
        let mut v = vars();
        v.set("CFLAGS(prog)", "-g", cwd()).unwrap();
        v.set("CFLAGS(win32)", "-mwindows", cwd()).unwrap();
        assert!(v.check_names(|name| name == "prog").is_ok());
        let err = v.check_names(|_| false).unwrap_err();
        assert!(err.to_string().contains("CFLAGS(prog)"));
    }
}
