//! Module command handler
//!
//! Handles `fake module <op>`: building, packaging and inspecting modules
//! described by `pom.xml` files.

use crate::error::{BuildError, Result};
use crate::maven::{DescriptorId, Resolver};
use crate::rules::kind::DESCRIPTOR_FILE;
use crate::session::Session;
use crate::tree;
use crate::ui::Table;
use colored::*;
use std::path::{Path, PathBuf};

/// Module subcommand operations
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleOp {
    /// Compile the module and its from-source dependencies
    Build,
    /// Compile and package the archive
    Jar,
    /// Package, then copy runtime dependencies into `target/`
    Jars,
    /// Remove compiled outputs and archives of the closure
    Clean { dry_run: bool },
    /// Resolve (and download) every dependency of the project
    GetDependencies,
    /// Print the runtime class path
    Classpath,
    /// List the modules built from source
    List,
    /// Print the dependency tree
    Tree,
}

/// Picks the module to work on: `artifact` anywhere in the project tree,
/// or the module `pom` (default: `./pom.xml`) describes.
pub fn select_module(
    resolver: &mut Resolver,
    cwd: &Path,
    pom: Option<&Path>,
    artifact: Option<&str>,
) -> Result<DescriptorId> {
    let path = pom
        .map(|p| cwd.join(p))
        .unwrap_or_else(|| cwd.join(DESCRIPTOR_FILE));
    let id = resolver.parse(&path)?;
    let Some(artifact) = artifact else {
        return Ok(id);
    };
    let root = resolver.tree_root(id);
    resolver
        .descriptors()
        .find(|(candidate, descriptor)| {
            descriptor.coordinate.artifact_id == artifact && resolver.tree_root(*candidate) == root
        })
        .map(|(candidate, _)| candidate)
        .ok_or_else(|| BuildError::UnknownTarget(artifact.to_string()))
}

/// Modules of the tree containing `id` that are built from source, sorted
/// by coordinate.
pub fn source_modules(resolver: &Resolver, id: DescriptorId) -> Vec<DescriptorId> {
    let root = resolver.tree_root(id);
    let mut modules = Vec::new();
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        if modules.contains(&current) {
            continue;
        }
        let descriptor = resolver.descriptor(current);
        if !descriptor.from_source && current != root {
            continue;
        }
        modules.push(current);
        stack.extend(descriptor.children.iter().copied());
    }
    modules.sort_by_key(|m| resolver.descriptor(*m).coordinate.to_string());
    modules
}

/// The runtime class path: the module's own output, then its dependencies.
pub fn class_path(resolver: &mut Resolver, id: DescriptorId) -> Result<Vec<PathBuf>> {
    let mut entries = vec![resolver.descriptor(id).target.clone()];
    entries.extend(resolver.class_path(id, false)?);
    Ok(entries)
}

/// Handle the `fake module` command
pub fn handle_module_command(
    session: &Session,
    cwd: &Path,
    op: &ModuleOp,
    pom: Option<&Path>,
    artifact: Option<&str>,
) -> Result<()> {
    let mut resolver = session.resolver();
    let id = select_module(&mut resolver, cwd, pom, artifact)?;
    let compiler = session.compiler();
    let name = resolver.descriptor(id).coordinate.to_string();

    match op {
        ModuleOp::Build => {
            resolver.build(id, compiler, false)?;
            println!("{} Built {}", "✓".green(), name);
        }
        ModuleOp::Jar | ModuleOp::Jars => {
            if !resolver.descriptor(id).from_source {
                return Err(BuildError::Config(format!("cannot build {} from source", name)));
            }
            resolver.build(id, compiler, true)?;
            let archive = resolver.descriptor(id).archive_path();
            println!("{} {}", "✓".green(), archive.display());
            if *op == ModuleOp::Jars {
                let target_dir = resolver.descriptor(id).directory.join("target");
                let copied = resolver.copy_dependencies(id, &target_dir, true)?;
                println!(
                    "{} Copied {} dependencies to {}",
                    "✓".green(),
                    copied.len(),
                    target_dir.display()
                );
            }
        }
        ModuleOp::Clean { dry_run } => {
            for path in resolver.clean_module(id, *dry_run)? {
                if *dry_run {
                    println!("rm -rf {}", path.display());
                }
            }
        }
        ModuleOp::GetDependencies => {
            let mut count = 0;
            for module in source_modules(&resolver, id) {
                count += resolver.resolve_transitive(module, false, &[])?.len();
            }
            println!(
                "{} Resolved {} dependencies ({} downloads)",
                "✓".green(),
                count,
                resolver.fetcher().requests()
            );
        }
        ModuleOp::Classpath => {
            let entries = class_path(&mut resolver, id)?;
            let joined = std::env::join_paths(&entries)
                .map_err(|e| BuildError::Config(e.to_string()))?;
            println!("{}", joined.to_string_lossy());
        }
        ModuleOp::List => {
            let mut table = Table::new(&["Module", "Packaging", "Directory"]);
            for module in source_modules(&resolver, id) {
                let descriptor = resolver.descriptor(module);
                let packaging = if descriptor.is_aggregator() { "aggregator" } else { "library" };
                table.add_row(vec![
                    descriptor.coordinate.to_string().bold().green().to_string(),
                    packaging.to_string(),
                    descriptor.directory.display().to_string(),
                ]);
            }
            table.print();
        }
        ModuleOp::Tree => tree::print_tree(&mut resolver, id)?,
    }
    Ok(())
}
