//! Java archive writing.
//!
//! Archives are assembled in a temporary sibling file and renamed into
//! place, so an interrupted build never leaves a truncated archive behind.

use crate::error::{BuildError, Result};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::FileOptions;

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// One file to store in an archive under `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub source: PathBuf,
}

pub fn manifest(main_class: Option<&str>) -> String {
    let mut text = String::from("Manifest-Version: 1.0\r\nCreated-By: fake\r\n");
    if let Some(main_class) = main_class {
        text.push_str(&format!("Main-Class: {}\r\n", main_class));
    }
    text.push_str("\r\n");
    text
}

/// Every file below `dir`, named relative to it with `/` separators.
pub fn directory_entries(dir: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    if !dir.is_dir() {
        return Ok(entries);
    }
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| BuildError::Io(io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if name == MANIFEST_PATH {
            continue;
        }
        entries.push(ArchiveEntry {
            name,
            source: entry.path().to_path_buf(),
        });
    }
    Ok(entries)
}

/// Writes a manifest followed by `entries` into `archive`.
pub fn write_archive(archive: &Path, entries: &[ArchiveEntry], main_class: Option<&str>) -> Result<()> {
    if let Some(parent) = archive.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| BuildError::io_at(parent, e))?;
    }
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = archive.with_file_name(format!(".{}.part", file_name));

    let result = write_entries(&temp, entries, main_class)
        .and_then(|()| std::fs::rename(&temp, archive).map_err(|e| BuildError::io_at(archive, e)));
    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    result
}

fn write_entries(path: &Path, entries: &[ArchiveEntry], main_class: Option<&str>) -> Result<()> {
    let file = File::create(path).map_err(|e| BuildError::io_at(path, e))?;
    let mut zip = zip::ZipWriter::new(file);
    let options =
        FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file(MANIFEST_PATH, options)?;
    zip.write_all(manifest(main_class).as_bytes())?;

    let mut written = std::collections::HashSet::new();
    for entry in entries {
        if !written.insert(entry.name.as_str()) {
            continue;
        }
        zip.start_file(entry.name.as_str(), options)?;
        let mut source =
            File::open(&entry.source).map_err(|e| BuildError::io_at(&entry.source, e))?;
        io::copy(&mut source, &mut zip)?;
    }
    zip.finish()?;
    Ok(())
}

/// Entry names of an archive, in stored order.
pub fn archive_entries(archive: &Path) -> Result<Vec<String>> {
    let file = File::open(archive).map_err(|e| BuildError::io_at(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut names = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        names.push(zip.by_index(i)?.name().to_string());
    }
    Ok(names)
}

/// Contents of one archive entry, if present.
pub fn read_entry(archive: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let file = File::open(archive).map_err(|e| BuildError::io_at(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_manifest_main_class() {
        assert_eq!(manifest(None), "Manifest-Version: 1.0\r\nCreated-By: fake\r\n\r\n");
        assert!(manifest(Some("a.Main")).contains("Main-Class: a.Main\r\n"));
    }

    #[test]
    fn test_write_and_read_archive() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes");
        fs::create_dir_all(classes.join("org/x")).unwrap();
        fs::write(classes.join("org/x/A.class"), "A").unwrap();
        fs::write(classes.join("plugins.config"), "menu").unwrap();

        let archive = dir.path().join("out/x.jar");
        let entries = directory_entries(&classes).unwrap();
        write_archive(&archive, &entries, Some("org.x.A")).unwrap();

        assert_eq!(
            archive_entries(&archive).unwrap(),
            [MANIFEST_PATH, "org/x/A.class", "plugins.config"]
        );
        let manifest = read_entry(&archive, MANIFEST_PATH).unwrap().unwrap();
        assert!(String::from_utf8(manifest).unwrap().contains("Main-Class: org.x.A"));
        assert_eq!(read_entry(&archive, "missing").unwrap(), None);
        assert!(!dir.path().join("out/.x.jar.part").exists());
    }

    #[test]
    fn test_failed_write_leaves_no_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("x.jar");
        let entries = vec![ArchiveEntry {
            name: "gone".into(),
            source: dir.path().join("does-not-exist"),
        }];
        assert!(write_archive(&archive, &entries, None).is_err());
        assert!(!archive.exists());
        assert!(!dir.path().join(".x.jar.part").exists());
    }
}
