//! Incremental builds of modules compiled from source.
//!
//! A module compiles `<sourceDirectory>` into `target/classes`, copies its
//! resources there, embeds its descriptor under `META-INF/maven/` and
//! optionally packages `target/<artifact>-<version>.jar`.

use super::descriptor::{Descriptor, DescriptorId};
use super::resolver::Resolver;
use crate::build::utils::{copy_if_newer, files_below, is_newer, mtime, remove_path};
use crate::error::{BuildError, Result};
use crate::package::{directory_entries, write_archive};
use crate::toolchain::{CompileRequest, Compiler};
use colored::Colorize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

const COMPILE_EXCLUDED_SCOPES: &[&str] = &["test", "runtime"];
const RUNTIME_EXCLUDED_SCOPES: &[&str] = &["test", "provided"];

#[derive(Debug, Default)]
struct SourceScan {
    sources: Vec<PathBuf>,
    stale: Vec<PathBuf>,
    /// Resource files paired with their copy below the classes directory.
    resources: Vec<(PathBuf, PathBuf)>,
    resources_stale: bool,
    newest: Option<SystemTime>,
}

fn scan(descriptor: &Descriptor, compiler: &dyn Compiler) -> SourceScan {
    let mut result = SourceScan::default();
    let classes = descriptor.classes_directory();
    let source_dir = descriptor.source_directory();
    let bump = |stamp: Option<SystemTime>, result: &mut SourceScan| {
        if stamp > result.newest {
            result.newest = stamp;
        }
    };

    for file in files_below(&source_dir) {
        let relative = file.strip_prefix(&source_dir).unwrap_or(&file).to_path_buf();
        let is_source = file
            .extension()
            .is_some_and(|ext| ext == compiler.source_extension());
        if is_source {
            let output = classes.join(compiler.output_for(&relative));
            if is_newer(&file, &output) {
                result.stale.push(file.clone());
            }
            bump(mtime(&output), &mut result);
            result.sources.push(file);
        } else {
            let copy = classes.join(&relative);
            result.resources_stale |= is_newer(&file, &copy);
            bump(mtime(&file), &mut result);
            result.resources.push((file, copy));
        }
    }

    let resource_dir = descriptor.resource_directory();
    for file in files_below(&resource_dir) {
        let relative = file.strip_prefix(&resource_dir).unwrap_or(&file).to_path_buf();
        let copy = classes.join(relative);
        result.resources_stale |= is_newer(&file, &copy);
        bump(mtime(&file), &mut result);
        result.resources.push((file, copy));
    }

    if let Some(pom) = &descriptor.path {
        let embedded = embedded_descriptor_path(descriptor);
        result.resources_stale |= is_newer(pom, &embedded);
        bump(mtime(pom), &mut result);
        result.resources.push((pom.clone(), embedded));
    }
    result
}

/// `target/classes/META-INF/maven/<group>/<artifact>/pom.xml`
pub fn embedded_descriptor_path(descriptor: &Descriptor) -> PathBuf {
    let coordinate = &descriptor.coordinate;
    descriptor
        .classes_directory()
        .join("META-INF")
        .join("maven")
        .join(coordinate.group_id.as_deref().unwrap_or("default"))
        .join(&coordinate.artifact_id)
        .join("pom.xml")
}

impl Resolver {
    /// Whether the module and every from-source module it depends on are
    /// up to date. With `including_archive`, the archive must also be at
    /// least as new as the newest compiled output and resource.
    pub fn up_to_date(&mut self, id: DescriptorId, compiler: &dyn Compiler, including_archive: bool) -> Result<bool> {
        let mut visiting = HashSet::new();
        self.up_to_date_inner(id, compiler, including_archive, &mut visiting)
    }

    fn up_to_date_inner(
        &mut self,
        id: DescriptorId,
        compiler: &dyn Compiler,
        including_archive: bool,
        visiting: &mut HashSet<DescriptorId>,
    ) -> Result<bool> {
        if !self.descriptors[id.0].from_source || !visiting.insert(id) {
            return Ok(true);
        }
        for dep in self.resolve_transitive(id, true, &["test"])? {
            if self.descriptors[dep.0].from_source
                && !self.up_to_date_inner(dep, compiler, including_archive, visiting)?
            {
                debug!("{} is stale", self.descriptors[dep.0].coordinate);
                return Ok(false);
            }
        }

        let descriptor = &self.descriptors[id.0];
        if descriptor.is_aggregator() {
            return Ok(true);
        }
        let scan = scan(descriptor, compiler);
        if !scan.stale.is_empty() || scan.resources_stale {
            return Ok(false);
        }
        if including_archive {
            let archive = mtime(&descriptor.archive_path());
            return Ok(archive.is_some() && archive >= scan.newest);
        }
        Ok(true)
    }

    /// Builds the module after every from-source module it depends on.
    /// Only stale sources are compiled unless a dependency was recompiled.
    pub fn build(&mut self, id: DescriptorId, compiler: &dyn Compiler, make_archive: bool) -> Result<()> {
        let mut visiting = HashSet::new();
        self.build_inner(id, compiler, make_archive, &mut visiting)
    }

    fn build_inner(
        &mut self,
        id: DescriptorId,
        compiler: &dyn Compiler,
        make_archive: bool,
        visiting: &mut HashSet<DescriptorId>,
    ) -> Result<()> {
        if !self.descriptors[id.0].from_source || self.built.contains(&id) || !visiting.insert(id) {
            return Ok(());
        }
        let dependencies = self.resolve_transitive(id, true, &["test"])?;
        for dep in &dependencies {
            if self.descriptors[dep.0].from_source {
                self.build_inner(*dep, compiler, make_archive, visiting)?;
            }
        }

        let descriptor = self.descriptors[id.0].clone();
        let name = descriptor.coordinate.to_string();
        if descriptor.is_aggregator() {
            self.built.insert(id);
            return Ok(());
        }

        let full_rebuild = dependencies.iter().any(|dep| self.rebuilt.contains(dep));
        let scan = scan(&descriptor, compiler);
        let sources = if full_rebuild { scan.sources.clone() } else { scan.stale.clone() };
        let classes = descriptor.classes_directory();
        std::fs::create_dir_all(&classes).map_err(|e| BuildError::io_at(&classes, e))?;

        if !sources.is_empty() {
            let mut request = CompileRequest::new(&classes, &descriptor.source_directory());
            request.class_path = vec![classes.clone()];
            request.class_path.extend(self.class_path(id, true)?);
            request.sources = sources;
            request.source_level = descriptor.build.source_level.clone();
            request.target_level = descriptor.build.target_level.clone();
            println!(
                "   {} Compiling {} ({} files)",
                "⚙".blue(),
                name,
                request.sources.len()
            );
            compiler
                .compile(&request)
                .map_err(|diagnostics| BuildError::CompileFailure {
                    target: name.clone(),
                    diagnostics,
                })?;
            self.rebuilt.insert(id);
        }

        for (from, to) in &scan.resources {
            copy_if_newer(from, to)?;
        }

        let archive = descriptor.archive_path();
        if make_archive
            && (self.rebuilt.contains(&id) || is_stale_archive(&archive, &classes))
        {
            let entries = directory_entries(&classes)?;
            write_archive(&archive, &entries, descriptor.build.main_class.as_deref())?;
            println!("   {} Packaged {}", "✓".green(), archive.display());
        }
        self.built.insert(id);
        Ok(())
    }

    /// Archives and class directories the module needs, compile scope or
    /// runtime scope.
    pub fn class_path(&mut self, id: DescriptorId, for_compile: bool) -> Result<Vec<PathBuf>> {
        let excluded = if for_compile {
            COMPILE_EXCLUDED_SCOPES
        } else {
            RUNTIME_EXCLUDED_SCOPES
        };
        Ok(self
            .resolve_transitive(id, true, excluded)?
            .into_iter()
            .map(|dep| &self.descriptors[dep.0])
            .filter(|d| !d.is_aggregator())
            .map(|d| d.target.clone())
            .collect())
    }

    /// Copies the runtime dependencies' archives into `dir` as
    /// `<artifact>.jar`. Returns the files written.
    pub fn copy_dependencies(&mut self, id: DescriptorId, dir: &Path, only_newer: bool) -> Result<Vec<PathBuf>> {
        let mut copied = Vec::new();
        for dep in self.resolve_transitive(id, true, RUNTIME_EXCLUDED_SCOPES)? {
            let descriptor = &self.descriptors[dep.0];
            if descriptor.is_aggregator() {
                continue;
            }
            let source = if descriptor.from_source {
                descriptor.archive_path()
            } else {
                descriptor.target.clone()
            };
            if !source.is_file() {
                return Err(BuildError::TargetNotBuilt(source.display().to_string()));
            }
            let destination = dir.join(format!("{}.jar", descriptor.coordinate.artifact_id));
            let changed = if only_newer {
                copy_if_newer(&source, &destination)?
            } else {
                std::fs::create_dir_all(dir).map_err(|e| BuildError::io_at(dir, e))?;
                std::fs::copy(&source, &destination).map_err(|e| BuildError::io_at(&source, e))?;
                true
            };
            if changed {
                copied.push(destination);
            }
        }
        Ok(copied)
    }

    /// Removes compiled outputs and archives of the module and every
    /// from-source module it depends on. Returns what was (or would be)
    /// removed.
    pub fn clean_module(&mut self, id: DescriptorId, dry_run: bool) -> Result<Vec<PathBuf>> {
        let mut modules = vec![id];
        modules.extend(self.resolve_transitive(id, true, &["test"])?);
        let mut removed = Vec::new();
        for module in modules {
            let descriptor = &self.descriptors[module.0];
            if !descriptor.from_source {
                continue;
            }
            for path in [descriptor.classes_directory(), descriptor.archive_path()] {
                if remove_path(&path, dry_run)? {
                    removed.push(path);
                }
            }
            if !dry_run {
                self.built.remove(&module);
                self.rebuilt.remove(&module);
            }
        }
        Ok(removed)
    }
}

fn is_stale_archive(archive: &Path, classes: &Path) -> bool {
    match (mtime(archive), crate::build::utils::newest_below(classes)) {
        (None, _) => true,
        (Some(archive), Some(newest)) => newest > archive,
        (Some(_), None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::maven::fetch::HttpTransport;
    use crate::toolchain::tests::CopyCompiler;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup(dir: &Path) -> (Resolver, DescriptorId) {
        let root = dir.join("project");
        fs::create_dir_all(root.join("lib/src/main/java/org/x")).unwrap();
        fs::create_dir_all(root.join("lib/src/main/resources")).unwrap();
        fs::write(
            root.join("pom.xml"),
            "<project><groupId>org.x</groupId><artifactId>parent</artifactId><version>1.0</version>\
             <packaging>pom</packaging><modules><module>lib</module></modules></project>",
        )
        .unwrap();
        fs::write(
            root.join("lib/pom.xml"),
            "<project><parent><groupId>org.x</groupId><artifactId>parent</artifactId>\
             <version>1.0</version></parent><artifactId>lib</artifactId>\
             <build><plugins><plugin><artifactId>maven-jar-plugin</artifactId><configuration>\
             <archive><manifest><mainClass>org.x.A</mainClass></manifest></archive>\
             </configuration></plugin></plugins></build></project>",
        )
        .unwrap();
        fs::write(root.join("lib/src/main/java/org/x/A.java"), "class A {}").unwrap();
        fs::write(root.join("lib/src/main/resources/plugins.config"), "menu").unwrap();

        let config = ResolverConfig {
            local_repository: Some(dir.join("m2")),
            repositories: Vec::new(),
            offline: true,
            ..Default::default()
        };
        let mut resolver = Resolver::new(config, Arc::new(HttpTransport::default()));
        let lib = resolver.parse(&root.join("lib")).unwrap();
        (resolver, lib)
    }

    #[test]
    fn test_build_packages_classes_resources_and_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let (mut resolver, lib) = setup(dir.path());
        let compiler = CopyCompiler::default();
        assert!(!resolver.up_to_date(lib, &compiler, true).unwrap());

        resolver.build(lib, &compiler, true).unwrap();
        let archive = resolver.descriptor(lib).archive_path();
        let entries = crate::package::archive_entries(&archive).unwrap();
        assert!(entries.contains(&"org/x/A.class".to_string()));
        assert!(entries.contains(&"plugins.config".to_string()));
        assert!(entries.contains(&"META-INF/maven/org.x/lib/pom.xml".to_string()));
        assert!(resolver.up_to_date(lib, &compiler, true).unwrap());
    }

    #[test]
    fn test_touched_source_is_recompiled_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (mut resolver, lib) = setup(dir.path());
        let source_dir = resolver.descriptor(lib).source_directory();
        fs::write(source_dir.join("org/x/B.java"), "class B {}").unwrap();
        let compiler = CopyCompiler::default();
        resolver.build(lib, &compiler, true).unwrap();
        assert_eq!(compiler.compiled().len(), 2);

        let touched = source_dir.join("org/x/B.java");
        let file = fs::File::options().write(true).open(&touched).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();
        assert!(!resolver.up_to_date(lib, &compiler, true).unwrap());

        resolver.built.clear();
        resolver.build(lib, &compiler, true).unwrap();
        assert_eq!(compiler.compiled().len(), 3);
        assert!(compiler.compiled()[2].ends_with("B.java"));
    }

    #[test]
    fn test_compile_failure_carries_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let (mut resolver, lib) = setup(dir.path());
        let compiler = CopyCompiler::failing("A.java:1: error: ';' expected");
        let err = resolver.build(lib, &compiler, true).unwrap_err();
        match err {
            BuildError::CompileFailure { target, diagnostics } => {
                assert_eq!(target, "org.x:lib:1.0");
                assert!(diagnostics.contains("expected"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!resolver.descriptor(lib).archive_path().exists());
    }

    #[test]
    fn test_clean_module() {
        let dir = tempfile::tempdir().unwrap();
        let (mut resolver, lib) = setup(dir.path());
        let compiler = CopyCompiler::default();
        resolver.build(lib, &compiler, true).unwrap();

        let would = resolver.clean_module(lib, true).unwrap();
        assert_eq!(would.len(), 2);
        assert!(resolver.descriptor(lib).archive_path().exists());

        resolver.clean_module(lib, false).unwrap();
        assert!(!resolver.descriptor(lib).archive_path().exists());
        assert!(!resolver.descriptor(lib).classes_directory().exists());
    }
}
