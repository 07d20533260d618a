//! Repository metadata: `maven-metadata.xml` for snapshots and ranges, and
//! `maven-metadata-local.xml` for unversioned lookups.

use crate::error::{BuildError, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Local copy of the remote metadata used to resolve snapshot builds.
pub const SNAPSHOT_METADATA: &str = "maven-metadata-snapshot.xml";
/// Local copy of the remote metadata listing released versions.
pub const VERSION_METADATA: &str = "maven-metadata-version.xml";
pub const LOCAL_METADATA: &str = "maven-metadata-local.xml";
pub const REMOTE_METADATA: &str = "maven-metadata.xml";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub version: Option<String>,
    pub latest: Option<String>,
    pub release: Option<String>,
    pub versions: Vec<String>,
    pub timestamp: Option<String>,
    pub build_number: Option<String>,
}

impl Metadata {
    pub fn parse(xml: &str, origin: &str) -> Result<Self> {
        let mut metadata = Metadata::default();
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut path = String::new();
        let mut text = String::new();
        let error = |message: String| BuildError::Metadata {
            path: origin.to_string(),
            message,
        };

        loop {
            match reader.read_event() {
                Ok(Event::Start(element)) => {
                    path.push('>');
                    path.push_str(&String::from_utf8_lossy(element.local_name().as_ref()));
                    text.clear();
                }
                Ok(Event::Text(content)) => {
                    text.push_str(&content.unescape().map_err(|e| error(e.to_string()))?);
                }
                Ok(Event::End(_)) => {
                    metadata.route(&path, text.trim());
                    text.clear();
                    if let Some(index) = path.rfind('>') {
                        path.truncate(index);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(error(e.to_string())),
                _ => {}
            }
        }
        Ok(metadata)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path).map_err(|e| BuildError::io_at(path, e))?;
        Self::parse(&xml, &path.display().to_string())
    }

    fn route(&mut self, path: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        let value = Some(text.to_string());
        match path {
            ">metadata>version" => self.version = value,
            ">metadata>versioning>latest" => self.latest = value,
            ">metadata>versioning>release" => self.release = value,
            ">metadata>versioning>versions>version" => self.versions.push(text.to_string()),
            ">metadata>versioning>snapshot>timestamp" => self.timestamp = value,
            ">metadata>versioning>snapshot>buildNumber" => self.build_number = value,
            _ => {}
        }
    }

    /// `<base>-<timestamp>-<buildNumber>` for a `-SNAPSHOT` version.
    pub fn snapshot_version(&self, requested: &str) -> Option<String> {
        let base = requested.strip_suffix("-SNAPSHOT").unwrap_or(requested);
        let timestamp = self.timestamp.as_deref()?;
        let build = self.build_number.as_deref()?;
        Some(format!("{}-{}-{}", base, timestamp, build))
    }

    /// Every version the metadata mentions.
    pub fn known_versions(&self) -> Vec<&str> {
        let mut all: Vec<&str> = self.versions.iter().map(String::as_str).collect();
        for extra in [&self.release, &self.latest, &self.version].into_iter().flatten() {
            if !all.contains(&extra.as_str()) {
                all.push(extra);
            }
        }
        all
    }
}

/// Whether `path` was written less than `interval` ago.
pub fn is_fresh(path: &Path, interval: Duration) -> bool {
    let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age < interval)
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>org.example</groupId>
  <artifactId>lib</artifactId>
  <version>1.0-SNAPSHOT</version>
  <versioning>
    <snapshot>
      <timestamp>20120131.101010</timestamp>
      <buildNumber>7</buildNumber>
    </snapshot>
    <lastUpdated>20120131101010</lastUpdated>
  </versioning>
</metadata>"#;

    const RELEASES: &str = r#"<metadata>
  <groupId>org.example</groupId><artifactId>lib</artifactId>
  <versioning>
    <latest>2.0</latest><release>2.0</release>
    <versions><version>1.0</version><version>1.5</version><version>2.0</version></versions>
  </versioning>
</metadata>"#;

    #[test]
    fn test_snapshot_version() {
        let metadata = Metadata::parse(SNAPSHOT, "snapshot").unwrap();
        assert_eq!(
            metadata.snapshot_version("1.0-SNAPSHOT").as_deref(),
            Some("1.0-20120131.101010-7")
        );
    }

    #[test]
    fn test_snapshot_without_build_info() {
        let metadata = Metadata::parse(RELEASES, "versions").unwrap();
        assert_eq!(metadata.snapshot_version("2.1-SNAPSHOT"), None);
    }

    #[test]
    fn test_versions() {
        let metadata = Metadata::parse(RELEASES, "versions").unwrap();
        assert_eq!(metadata.versions, ["1.0", "1.5", "2.0"]);
        assert_eq!(metadata.release.as_deref(), Some("2.0"));
        assert_eq!(metadata.known_versions(), ["1.0", "1.5", "2.0"]);
    }

    #[test]
    fn test_freshness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_METADATA);
        assert!(!is_fresh(&path, Duration::from_secs(60)));
        std::fs::write(&path, SNAPSHOT).unwrap();
        assert!(is_fresh(&path, Duration::from_secs(60)));
        assert!(!is_fresh(&path, Duration::ZERO));
    }
}
