//! Artifact retrieval with SHA-1 verification.
//!
//! Every remote file is accompanied by a `.sha1` side-car. The side-car is
//! fetched first, then the file; the file is only written to the local
//! repository once its digest matches.

use crate::error::{BuildError, Result};
use sha1::{Digest, Sha1};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

pub trait Transport: Send + Sync {
    /// Retrieves the whole resource at `url`.
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP(S) via `ureq`; `file://` URLs are read from disk.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self {
            agent: ureq::agent(),
        }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let transport_error = |message: String| BuildError::Transport {
            url: url.to_string(),
            message,
        };
        if let Some(path) = url.strip_prefix("file://") {
            return fs::read(path).map_err(|e| transport_error(e.to_string()));
        }

        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| transport_error(e.to_string()))?;
        let mut bytes = Vec::new();
        response
            .into_body()
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| transport_error(e.to_string()))?;
        Ok(bytes)
    }
}

/// Counts requests and refuses them in offline mode.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    offline: bool,
    requests: AtomicUsize,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, offline: bool) -> Self {
        Self {
            transport,
            offline,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Number of network requests issued so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if self.offline {
            return Err(BuildError::OfflineViolation(url.to_string()));
        }
        self.requests.fetch_add(1, Ordering::Relaxed);
        debug!("fetching {}", url);
        self.transport.get(url)
    }

    /// Fetches `url` and checks it against `url.sha1`.
    pub fn fetch_verified(&self, url: &str) -> Result<Vec<u8>> {
        let sidecar = self.fetch(&format!("{}.sha1", url))?;
        let expected = sidecar_digest(&String::from_utf8_lossy(&sidecar));
        let bytes = self.fetch(url)?;
        verify_sha1(url, &bytes, &expected)?;
        Ok(bytes)
    }
}

/// The digest in a side-car file, which may be followed by a file name.
pub fn sidecar_digest(content: &str) -> String {
    content
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Compares the SHA-1 of `bytes` with a hex digest, byte for byte.
pub fn verify_sha1(name: &str, bytes: &[u8], expected_hex: &str) -> Result<()> {
    let actual = Sha1::digest(bytes);
    let matches = hex::decode(expected_hex)
        .map(|expected| expected.as_slice() == actual.as_slice())
        .unwrap_or(false);
    if matches {
        Ok(())
    } else {
        Err(BuildError::ChecksumMismatch {
            path: name.to_string(),
            expected: expected_hex.to_string(),
            actual: hex::encode(actual),
        })
    }
}

/// Writes through a temporary sibling so readers never see a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io_at(parent, e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.part", file_name));
    fs::write(&temp, bytes).map_err(|e| BuildError::io_at(&temp, e))?;
    fs::rename(&temp, path).map_err(|e| BuildError::io_at(path, e))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// In-memory repository recording every requested URL.
    #[derive(Default)]
    pub(crate) struct MemoryTransport {
        pub files: HashMap<String, Vec<u8>>,
        pub requested: Mutex<Vec<String>>,
    }

    impl MemoryTransport {
        pub(crate) fn publish(&mut self, url: &str, bytes: &[u8]) {
            self.files.insert(url.to_string(), bytes.to_vec());
            self.files
                .insert(format!("{}.sha1", url), sha1_hex(bytes).into_bytes());
        }
    }

    impl Transport for MemoryTransport {
        fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.requested.lock().push(url.to_string());
            self.files
                .get(url)
                .cloned()
                .ok_or_else(|| BuildError::Transport {
                    url: url.to_string(),
                    message: "404 Not Found".to_string(),
                })
        }
    }

    #[test]
    fn test_sha1_hex() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_sidecar_with_file_name() {
        assert_eq!(
            sidecar_digest("A9993E364706816ABA3E25717850C26C9CD0D89D  lib-1.0.jar\n"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_verified_fetch() {
        let mut transport = MemoryTransport::default();
        transport.publish("mem://r/a.jar", b"archive");
        let fetcher = Fetcher::new(Arc::new(transport), false);
        assert_eq!(fetcher.fetch_verified("mem://r/a.jar").unwrap(), b"archive");
        assert_eq!(fetcher.requests(), 2);
    }

    #[test]
    fn test_flipped_byte_is_rejected() {
        let mut transport = MemoryTransport::default();
        transport.publish("mem://r/a.jar", b"archive");
        transport
            .files
            .insert("mem://r/a.jar".to_string(), b"archivf".to_vec());
        let fetcher = Fetcher::new(Arc::new(transport), false);
        let err = fetcher.fetch_verified("mem://r/a.jar").unwrap_err();
        assert!(matches!(err, BuildError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_offline_refuses_before_any_request() {
        let transport = Arc::new(MemoryTransport::default());
        let fetcher = Fetcher::new(transport.clone(), true);
        let err = fetcher.fetch("mem://r/a.pom").unwrap_err();
        assert!(matches!(err, BuildError::OfflineViolation(_)));
        assert!(transport.requested.lock().is_empty());
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/a.jar");
        write_atomic(&path, b"x").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"x");
        assert!(!dir.path().join("nested/.a.jar.part").exists());
    }

    #[test]
    fn test_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.pom"), "pom").unwrap();
        let url = format!("file://{}/x.pom", dir.path().display());
        assert_eq!(HttpTransport::default().get(&url).unwrap(), b"pom");
        assert!(HttpTransport::default().get(&format!("{}.missing", url)).is_err());
    }
}
