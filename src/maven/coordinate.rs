//! Dependency coordinates and their repository file names.

use serde::Serialize;
use std::fmt;

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Identity of an artifact for caching. The version is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CoordinateKey {
    pub group_id: Option<String>,
    pub artifact_id: String,
    pub classifier: Option<String>,
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}>{}",
            self.group_id.as_deref().unwrap_or("?"),
            self.artifact_id
        )?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Coordinate {
    pub group_id: Option<String>,
    pub artifact_id: String,
    pub version: Option<String>,
    pub classifier: Option<String>,
    pub scope: Option<String>,
    pub optional: bool,
    pub system_path: Option<String>,
}

impl Coordinate {
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> Self {
        Self {
            group_id: normalize(Some(group_id.to_string())),
            artifact_id: artifact_id.trim().to_string(),
            version: normalize(Some(version.to_string())),
            ..Default::default()
        }
    }

    /// Empty strings count as unset.
    pub fn normalized(self) -> Self {
        Self {
            group_id: normalize(self.group_id),
            artifact_id: self.artifact_id.trim().to_string(),
            version: normalize(self.version),
            classifier: normalize(self.classifier),
            scope: normalize(self.scope),
            optional: self.optional,
            system_path: normalize(self.system_path),
        }
    }

    pub fn key(&self) -> CoordinateKey {
        CoordinateKey {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            classifier: self.classifier.clone(),
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.version
            .as_deref()
            .is_some_and(|v| v.ends_with("-SNAPSHOT"))
    }

    pub fn is_range(&self) -> bool {
        self.version
            .as_deref()
            .is_some_and(|v| v.starts_with('[') || v.starts_with('('))
    }

    /// `artifact-version[-classifier].extension`
    pub fn file_name(&self, with_classifier: bool, extension: &str) -> String {
        let mut name = format!(
            "{}-{}",
            self.artifact_id,
            self.version.as_deref().unwrap_or("")
        );
        if with_classifier && let Some(classifier) = &self.classifier {
            name.push('-');
            name.push_str(classifier);
        }
        name.push('.');
        name.push_str(extension);
        name
    }

    pub fn jar_name(&self) -> String {
        self.file_name(true, "jar")
    }

    pub fn pom_name(&self) -> String {
        self.file_name(false, "pom")
    }

    /// `group/path/artifact/`, relative to a repository root.
    pub fn artifact_path(&self) -> Option<String> {
        let group = self.group_id.as_deref()?;
        Some(format!("{}/{}/", group.replace('.', "/"), self.artifact_id))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.group_id.as_deref().unwrap_or("?"),
            self.artifact_id,
            self.version.as_deref().unwrap_or("?")
        )?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        Ok(())
    }
}
