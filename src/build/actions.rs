//! Per-kind rule actions and up-to-date checks.

use super::scheduler::Builder;
use super::utils::{files_below, is_newer, mtime};
use crate::error::{BuildError, Result};
use crate::package::{ArchiveEntry, directory_entries, write_archive};
use crate::rules::kind::{ARCHIVE_EXTENSION, DESCRIPTOR_FILE};
use crate::rules::{Rule, RuleGraph, RuleKind, parse_rule_file};
use crate::session::Session;
use crate::toolchain::{CompileRequest, NativeToolchain, split_command_line};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::debug;

const NATIVE_EXTENSIONS: &[&str] = &["c", "cxx", "cpp", "cc"];

pub(crate) fn is_native_source(path: &str) -> bool {
    Path::new(path)
        .extension()
        .is_some_and(|ext| NATIVE_EXTENSIONS.iter().any(|n| ext == *n))
}

/// What an action can see: the session and the graph the rule lives in.
#[derive(Clone, Copy)]
pub(crate) struct ActionContext<'a> {
    pub session: &'a Session,
    pub graph: &'a RuleGraph,
}

impl<'a> ActionContext<'a> {
    pub fn new(session: &'a Session, graph: &'a RuleGraph) -> Self {
        Self { session, graph }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.graph.cwd().join(relative)
    }

    fn verbose(&self, target: &str) -> bool {
        self.session.is_verbose() || self.graph.var_bool("VERBOSE", target)
    }

    /// `<BUILDDIR>/<target stem>`, one directory per rule.
    pub fn build_dir(&self, rule: &Rule) -> PathBuf {
        let base = self
            .graph
            .var("BUILDDIR", &rule.target)
            .unwrap_or(&self.session.config().build.build_dir);
        let stem = Path::new(&rule.target)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| rule.target.clone());
        self.path(base).join(stem)
    }

    fn is_source(&self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .is_some_and(|ext| ext == self.session.compiler().source_extension())
    }

    /// Archives on the compile search path: `CLASSPATH` entries and
    /// `foo.jar/` prerequisites.
    pub fn class_path(&self, rule: &Rule) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = self
            .graph
            .var("CLASSPATH", &rule.target)
            .unwrap_or("")
            .split(':')
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| self.path(entry.trim()))
            .collect();
        for prereq in &rule.prerequisites {
            if let Some(archive) = prereq.strip_suffix('/')
                && archive.ends_with(ARCHIVE_EXTENSION)
            {
                entries.push(self.path(archive));
            }
        }
        entries
    }

    /// Runs an external program in the rule's directory.
    fn execute(&self, target: &str, program: &str, args: &[String]) -> Result<()> {
        if self.verbose(target) {
            println!("   {} {} {}", "$".dimmed(), program, args.join(" "));
        }
        let output = self.session.runner().run(program, args, self.graph.cwd())?;
        if self.verbose(target) && !output.stdout.is_empty() {
            print!("{}", output.stdout);
        }
        if output.success {
            return Ok(());
        }
        Err(BuildError::ProgramFailed {
            program: program.to_string(),
            status: format!("{}\n{}", output.status, output.diagnostics()),
        })
    }

    fn compile_request(&self, rule: &Rule, output_dir: &Path, source_root: &Path) -> CompileRequest {
        let target = rule.target.as_str();
        let mut request = CompileRequest::new(output_dir, source_root);
        request.class_path = self.class_path(rule);
        request.sources = rule
            .prerequisites
            .iter()
            .filter(|p| self.is_source(p))
            .map(|p| self.path(p))
            .collect();
        let level = self.graph.var("JAVAVERSION", target).map(str::to_string);
        request.source_level = level.clone();
        request.target_level = level;
        request.debug = self.graph.var_bool("DEBUG", target);
        request.extra_args = self
            .graph
            .var("JAVACOPTIONS", target)
            .map(split_command_line)
            .unwrap_or_default();
        request
    }

    fn compile(&self, rule: &Rule, request: &CompileRequest) -> Result<()> {
        if request.sources.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(&request.output_dir)
            .map_err(|e| BuildError::io_at(&request.output_dir, e))?;
        self.session
            .compiler()
            .compile(request)
            .map_err(|diagnostics| BuildError::CompileFailure {
                target: rule.target.clone(),
                diagnostics,
            })
    }
}

/// Prefix stripped from resource names inside an archive: whatever comes
/// before the first `/**/` of the prerequisite expression.
pub fn strip_prefix(expression: &str) -> String {
    let s = expression.trim();
    if s.starts_with("**/") {
        return String::new();
    }
    let Some(stars) = s.find("/**/") else {
        return String::new();
    };
    if let Some(space) = s.find(' ')
        && space < stars
    {
        return if s[..space].ends_with('/') {
            s[..space].to_string()
        } else {
            String::new()
        };
    }
    s[..=stars].to_string()
}

/// Whether the target is newer than its prerequisites and, when the policy
/// is on, the rule file.
fn target_is_current(ctx: &ActionContext<'_>, rule: &Rule) -> bool {
    let Some(target) = mtime(&ctx.path(&rule.target)) else {
        return false;
    };
    if ctx.session.config().build.rebuild_if_definitions_changed
        && let Some(definition) = ctx.graph.definition()
        && mtime(definition).is_some_and(|d| d > target)
    {
        debug!("{} is older than {}", rule.target, definition.display());
        return false;
    }
    for prereq in &rule.prerequisites {
        if mtime(&ctx.path(prereq)).is_some_and(|p| p > target) {
            debug!("{} is older than {}", rule.target, prereq);
            return false;
        }
    }
    true
}

pub(crate) fn is_up_to_date(ctx: &ActionContext<'_>, rule: &Rule) -> Result<bool> {
    up_to_date(ctx, rule, true)
}

/// Same as [`is_up_to_date`], but module dependencies are only looked up
/// on disk, so nothing is fetched or written.
pub(crate) fn is_up_to_date_locally(ctx: &ActionContext<'_>, rule: &Rule) -> Result<bool> {
    up_to_date(ctx, rule, false)
}

fn up_to_date(ctx: &ActionContext<'_>, rule: &Rule, network: bool) -> Result<bool> {
    let target = ctx.path(&rule.target);
    match &rule.kind {
        RuleKind::All | RuleKind::Special(_) => Ok(false),
        RuleKind::SubBuild { directory } => Ok(target_is_current(ctx, rule)
            && files_below(&ctx.path(directory))
                .iter()
                .all(|file| !is_newer(file, &target))),
        RuleKind::Module { descriptor } => {
            if !target_is_current(ctx, rule) {
                return Ok(false);
            }
            let mut resolver = ctx.session.resolver();
            let path = ctx.path(descriptor);
            let id = if network {
                resolver.parse(&path)?
            } else {
                resolver.without_downloads(|r| r.parse(&path))?
            };
            let archive = resolver.descriptor(id).archive_path();
            let current = if network {
                resolver.up_to_date(id, ctx.session.compiler(), true)?
            } else {
                resolver.up_to_date_locally(id, ctx.session.compiler(), true)?
            };
            Ok(current && !is_newer(&archive, &target))
        }
        RuleKind::CompileArchive => Ok(target_is_current(ctx, rule)
            && ctx
                .class_path(rule)
                .iter()
                .all(|entry| !is_newer(entry, &target))),
        _ => Ok(target_is_current(ctx, rule)),
    }
}

/// Whether a finished action must have left its target behind.
pub(crate) fn expects_target(rule: &Rule) -> bool {
    match &rule.kind {
        RuleKind::SubBuild { .. } => rule.target.contains('.'),
        kind => kind.produces_target(),
    }
}

/// Runs the action of a non-special rule.
pub(crate) fn run(ctx: &ActionContext<'_>, rule: &Rule) -> Result<()> {
    match &rule.kind {
        RuleKind::All | RuleKind::Special(_) => Ok(()),
        RuleKind::ExecuteProgram { program } => execute_program(ctx, rule, program),
        RuleKind::SubBuild { directory } => sub_build(ctx, rule, directory),
        RuleKind::Module { descriptor } => module(ctx, rule, descriptor),
        RuleKind::CopyArchive { source } => copy_file(&ctx.path(source), &ctx.path(&rule.target)),
        RuleKind::CompileArchive => compile_archive(ctx, rule),
        RuleKind::CompileOutput => compile_output(ctx, rule),
        RuleKind::CompileProgram => compile_program(ctx, rule),
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BuildError::io_at(parent, e))?;
    }
    std::fs::copy(from, to).map_err(|e| BuildError::io_at(from, e))?;
    Ok(())
}

fn execute_program(ctx: &ActionContext<'_>, rule: &Rule, program: &str) -> Result<()> {
    let expanded = ctx.graph.expand(program, Some(&rule.target));
    let args = split_command_line(&expanded);
    let Some((program, args)) = args.split_first() else {
        return Ok(());
    };
    ctx.execute(&rule.target, program, args)
}

fn compile_archive(ctx: &ActionContext<'_>, rule: &Rule) -> Result<()> {
    let expression = ctx.graph.expand(&rule.expression, Some(&rule.target));
    let prefix = strip_prefix(&expression);
    let build_dir = ctx.build_dir(rule);
    let request = ctx.compile_request(rule, &build_dir, &ctx.path(&prefix));
    ctx.compile(rule, &request)?;

    let mut entries = directory_entries(&build_dir)?;
    for prereq in &rule.prerequisites {
        let path = ctx.path(prereq);
        if ctx.is_source(prereq) || !path.is_file() || prereq.ends_with(ARCHIVE_EXTENSION) {
            continue;
        }
        let name = prereq.strip_prefix(&prefix).unwrap_or(prereq);
        entries.push(ArchiveEntry {
            name: name.to_string(),
            source: path,
        });
    }
    let main_class = ctx.graph.var("MAINCLASS", &rule.target);
    write_archive(&ctx.path(&rule.target), &entries, main_class)?;
    println!("   {} Packaged {}", "✓".green(), rule.target);
    Ok(())
}

fn compile_output(ctx: &ActionContext<'_>, rule: &Rule) -> Result<()> {
    let prefix = rule
        .last_prerequisite()
        .and_then(|last| last.rfind('/').map(|slash| &last[..=slash]))
        .unwrap_or("");
    let source_root = ctx.path(prefix);
    let build_dir = ctx.build_dir(rule);
    let request = ctx.compile_request(rule, &build_dir, &source_root);
    ctx.compile(rule, &request)?;

    let target_dir = ctx
        .path(&rule.target)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.graph.cwd().to_path_buf());
    let compiler = ctx.session.compiler();
    for source in &request.sources {
        let Ok(relative) = source.strip_prefix(&source_root) else {
            continue;
        };
        let output = compiler.output_for(relative);
        if let Some(name) = output.file_name() {
            copy_file(&build_dir.join(&output), &target_dir.join(name))?;
        }
    }
    Ok(())
}

fn compile_program(ctx: &ActionContext<'_>, rule: &Rule) -> Result<()> {
    let native = ctx.session.native();
    let target = rule.target.as_str();
    let variables = ctx.graph.variables();
    let flags = |key: &str, path: &str| {
        split_command_line(variables.get(key, Some(path), Some(target)).unwrap_or(""))
    };

    let mut objects = Vec::new();
    let mut link_cxx = false;
    for source in &rule.prerequisites {
        if !is_native_source(source) {
            debug!("{} is not compiled for {}", source, target);
            continue;
        }
        let is_cxx = NativeToolchain::is_cxx(source);
        link_cxx |= is_cxx;
        let object = Path::new(source).with_extension("o").display().to_string();

        let mut args = Vec::new();
        if ctx.graph.var_bool("DEBUG", target) {
            args.push("-g".to_string());
        }
        args.push("-c".to_string());
        args.extend(flags(if is_cxx { "CXXFLAGS" } else { "CFLAGS" }, source));
        args.extend([source.clone(), "-o".to_string(), object.clone()]);
        ctx.execute(target, native.driver_for(source), &args)?;
        objects.push(object);
    }

    let linker = if link_cxx { &native.cxx } else { &native.cc };
    let mut args = vec!["-o".to_string(), target.to_string()];
    args.extend(flags("LDFLAGS", target));
    args.extend(objects);
    args.extend(flags("LIBS", target));
    ctx.execute(target, linker, &args)
}

fn sub_build(ctx: &ActionContext<'_>, rule: &Rule, directory: &str) -> Result<()> {
    let dir = ctx.path(directory);
    let rule_file = dir.join(&ctx.session.config().build.rule_file);
    let output_name = Path::new(&rule.target)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let built = if rule_file.is_file() {
        let graph = load_sub_graph(ctx, rule, directory, &rule_file, &dir)?;
        let Some(default) = graph.default_target().map(str::to_string) else {
            return Ok(());
        };
        println!("   {} Entering {}", "→".cyan(), dir.display());
        let mut builder = Builder::new(ctx.session, &graph);
        builder.make(&default)?;
        dir.join(&output_name)
    } else if dir.join(DESCRIPTOR_FILE).is_file() {
        let mut resolver = ctx.session.resolver();
        let id = resolver.parse(&dir)?;
        resolver.build(id, ctx.session.compiler(), true)?;
        resolver.descriptor(id).archive_path()
    } else {
        return Err(BuildError::Config(format!(
            "{} has neither {} nor {}",
            dir.display(),
            ctx.session.config().build.rule_file,
            DESCRIPTOR_FILE
        )));
    };

    if !expects_target(rule) {
        return Ok(());
    }
    if !built.exists() {
        return Err(BuildError::TargetNotBuilt(built.display().to_string()));
    }
    copy_file(&built, &ctx.path(&rule.target))
}

/// Parses a sub-directory's rule file, handing down `VERBOSE` and the
/// class path set for that directory.
pub(crate) fn load_sub_graph(
    ctx: &ActionContext<'_>,
    rule: &Rule,
    directory: &str,
    rule_file: &Path,
    dir: &Path,
) -> Result<RuleGraph> {
    let mut overrides = Vec::new();
    if ctx.graph.var_bool("VERBOSE", directory) {
        overrides.push(("VERBOSE".to_string(), "true".to_string()));
    }
    if let Some(class_path) = ctx.graph.variables().get("CLASSPATH", Some(directory), None) {
        let absolute: Vec<String> = class_path
            .split(':')
            .filter(|entry| !entry.is_empty())
            .map(|entry| ctx.path(entry).display().to_string())
            .collect();
        overrides.push(("CLASSPATH".to_string(), absolute.join(":")));
    }
    debug!("sub-build of {} in {}", rule.target, dir.display());
    parse_rule_file(rule_file, dir, &overrides, &ctx.session.config().build)
}

fn module(ctx: &ActionContext<'_>, rule: &Rule, descriptor: &str) -> Result<()> {
    let mut resolver = ctx.session.resolver();
    let id = resolver.parse(&ctx.path(descriptor))?;
    resolver.build(id, ctx.session.compiler(), true)?;
    let archive = resolver.descriptor(id).archive_path();
    let target = ctx.path(&rule.target);
    copy_file(&archive, &target)?;

    if ctx.graph.var_bool("COPYDEPENDENCIES", &rule.target)
        && let Some(dir) = target.parent()
    {
        let copied = resolver.copy_dependencies(id, dir, true)?;
        debug!("copied {} dependencies next to {}", copied.len(), rule.target);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix("src-plugins/Foo/**/*.java"), "src-plugins/Foo/");
        assert_eq!(strip_prefix("**/*.java"), "");
        assert_eq!(strip_prefix("a/*.java"), "");
        assert_eq!(strip_prefix("base/ base/**/*.java"), "base/");
        assert_eq!(strip_prefix("x.txt base/**/*.java"), "");
    }
}
