use std::path::{Path, PathBuf};

/// One compiler invocation: these sources, on this search path, into this directory.
#[derive(Debug, Clone, Default)]
pub struct CompileRequest {
    pub sources: Vec<PathBuf>,
    pub class_path: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// Root the sources are laid out under; outputs mirror the layout below it.
    pub source_root: PathBuf,
    pub source_level: Option<String>,
    pub target_level: Option<String>,
    pub debug: bool,
    pub extra_args: Vec<String>,
}

impl CompileRequest {
    pub fn new(output_dir: &Path, source_root: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            source_root: source_root.to_path_buf(),
            ..Default::default()
        }
    }

    pub fn class_path_string(&self) -> String {
        std::env::join_paths(&self.class_path)
            .map(|joined| joined.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Captured result of an external process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Combined diagnostics, stderr first.
    pub fn diagnostics(&self) -> String {
        let mut text = self.stderr.trim_end().to_string();
        if !self.stdout.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(self.stdout.trim_end());
        }
        text
    }
}

/// C and C++ compiler drivers used for native program rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeToolchain {
    pub cc: String,
    pub cxx: String,
}

impl Default for NativeToolchain {
    fn default() -> Self {
        Self {
            cc: "gcc".to_string(),
            cxx: "g++".to_string(),
        }
    }
}

impl NativeToolchain {
    /// Honors `CC` and `CXX` from the environment.
    pub fn from_env() -> Self {
        let fallback = Self::default();
        Self {
            cc: std::env::var("CC").unwrap_or(fallback.cc),
            cxx: std::env::var("CXX").unwrap_or(fallback.cxx),
        }
    }

    pub fn driver_for(&self, source: &str) -> &str {
        if source.ends_with(".c") {
            &self.cc
        } else {
            &self.cxx
        }
    }

    pub fn is_cxx(source: &str) -> bool {
        !source.ends_with(".c")
    }
}
