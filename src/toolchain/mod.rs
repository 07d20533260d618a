//! Compiler and process collaborators.
//!
//! The build engine never spawns tools directly. It goes through a
//! [`Compiler`] ("compile these sources into outputs, on this search path")
//! and a [`ProcessRunner`] ("run this program with these arguments"), so
//! sessions can be driven by stand-ins in tests.

pub mod types;

pub use types::{CompileRequest, NativeToolchain, ProcessOutput};

use crate::error::{BuildError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::debug;

pub trait Compiler: Send + Sync {
    /// Extension of source files, without the dot.
    fn source_extension(&self) -> &str;

    /// Extension of compiled outputs, without the dot.
    fn output_extension(&self) -> &str;

    /// Compiles the request. On failure returns the compiler's diagnostics.
    fn compile(&self, request: &CompileRequest) -> std::result::Result<(), String>;

    /// Output path, relative to the output directory, for a source path
    /// relative to its source root.
    fn output_for(&self, relative_source: &Path) -> PathBuf {
        relative_source.with_extension(self.output_extension())
    }
}

pub trait ProcessRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> Result<ProcessOutput>;
}

/// Runs processes with `std::process::Command`, capturing their output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> Result<ProcessOutput> {
        debug!("running {} {} in {}", program, args.join(" "), cwd.display());
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|e| BuildError::ProgramFailed {
                program: program.to_string(),
                status: e.to_string(),
            })?;
        Ok(ProcessOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// A `javac`-style command line compiler.
pub struct ExternalCompiler {
    command: String,
    source_extension: String,
    output_extension: String,
    runner: Arc<dyn ProcessRunner>,
}

impl ExternalCompiler {
    pub fn new(
        command: &str,
        source_extension: &str,
        output_extension: &str,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            command: command.to_string(),
            source_extension: source_extension.to_string(),
            output_extension: output_extension.to_string(),
            runner,
        }
    }

    pub fn arguments(&self, request: &CompileRequest) -> Vec<String> {
        let mut args = vec!["-d".to_string(), request.output_dir.display().to_string()];
        if !request.class_path.is_empty() {
            args.push("-classpath".to_string());
            args.push(request.class_path_string());
        }
        if let Some(level) = &request.source_level {
            args.push("-source".to_string());
            args.push(level.clone());
        }
        if let Some(level) = &request.target_level {
            args.push("-target".to_string());
            args.push(level.clone());
        }
        if request.debug {
            args.push("-g".to_string());
        }
        args.extend(request.extra_args.iter().cloned());
        args.extend(request.sources.iter().map(|s| s.display().to_string()));
        args
    }
}

impl Compiler for ExternalCompiler {
    fn source_extension(&self) -> &str {
        &self.source_extension
    }

    fn output_extension(&self) -> &str {
        &self.output_extension
    }

    fn compile(&self, request: &CompileRequest) -> std::result::Result<(), String> {
        std::fs::create_dir_all(&request.output_dir).map_err(|e| e.to_string())?;
        let output = self
            .runner
            .run(&self.command, &self.arguments(request), &request.source_root)
            .map_err(|e| e.to_string())?;
        if output.success {
            Ok(())
        } else {
            Err(output.diagnostics())
        }
    }
}

/// Splits a command line on whitespace, honoring single and double quotes
/// and backslash escapes.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (c, quote) {
            ('\\', q) if q != Some('\'') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    in_token = true;
                }
            }
            (c, Some(q)) if c == q => quote = None,
            (c, Some(_)) => current.push(c),
            ('"' | '\'', None) => {
                quote = Some(c);
                in_token = true;
            }
            (c, None) if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (c, None) => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        args.push(current);
    }
    args
}
