//! Transitive dependency resolution.
//!
//! A dependency is resolved by trying, in order: the requesting descriptor
//! and its project tree, a bare artifact id lookup, the configured project
//! roots, a system path, the local repository and finally each remote
//! repository. Every outcome, failures included, is memoized per session.

use super::coordinate::{Coordinate, CoordinateKey};
use super::descriptor::{Descriptor, DescriptorId, ProfileActivation, parse_descriptor_str};
use super::fetch::{Fetcher, Transport, sha1_hex, write_atomic};
use super::metadata::{
    LOCAL_METADATA, Metadata, REMOTE_METADATA, SNAPSHOT_METADATA, VERSION_METADATA, is_fresh,
};
use super::store::satisfies;
use super::version::{VersionRange, compare_versions, latest};
use crate::config::ResolverConfig;
use crate::error::{BuildError, Result};
use crate::rules::kind::DESCRIPTOR_FILE;
use crate::toolchain::Compiler;
use colored::Colorize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Memoized outcome for one coordinate key.
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub id: Option<DescriptorId>,
    /// Version of the resolved descriptor, or the requested one on a miss.
    pub version: Option<String>,
    /// Why the last attempt failed, replayed on later lookups.
    pub failure: Option<Arc<BuildError>>,
}

pub struct Resolver {
    pub(crate) config: ResolverConfig,
    pub(crate) activation: ProfileActivation,
    fetcher: Fetcher,
    pub(crate) descriptors: Vec<Descriptor>,
    pub(crate) by_path: HashMap<(PathBuf, Option<String>), DescriptorId>,
    pub(crate) descended: HashSet<DescriptorId>,
    pub(crate) memo: HashMap<CoordinateKey, Resolved>,
    attempts: HashMap<CoordinateKey, usize>,
    roots_scanned: bool,
    pub(crate) built: HashSet<DescriptorId>,
    pub(crate) rebuilt: HashSet<DescriptorId>,
    verbose: bool,
}

impl Resolver {
    pub fn new(config: ResolverConfig, transport: Arc<dyn Transport>) -> Self {
        let activation = ProfileActivation {
            active_ids: config.active_profiles.clone(),
            system_properties: config.system_properties.clone(),
        };
        let fetcher = Fetcher::new(transport, config.offline);
        Self {
            config,
            activation,
            fetcher,
            descriptors: Vec::new(),
            by_path: HashMap::new(),
            descended: HashSet::new(),
            memo: HashMap::new(),
            attempts: HashMap::new(),
            roots_scanned: false,
            built: HashSet::new(),
            rebuilt: HashSet::new(),
            verbose: false,
        }
    }

    /// Reports optional dependencies that could not be resolved.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// How many times resolution of `coordinate` went past the memo.
    pub fn attempts(&self, coordinate: &Coordinate) -> usize {
        self.attempts.get(&coordinate.key()).copied().unwrap_or(0)
    }

    pub(crate) fn network_enabled(&self) -> bool {
        self.config.download
    }

    /// Runs `f` against what is already on disk: nothing is downloaded and
    /// no metadata is refreshed. Misses recorded meanwhile are forgotten so
    /// a later resolution may still fetch them.
    pub fn without_downloads<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let known: HashSet<CoordinateKey> = self.memo.keys().cloned().collect();
        let attempts = self.attempts.clone();
        let download = std::mem::replace(&mut self.config.download, false);
        let outcome = f(self);
        self.config.download = download;
        self.memo
            .retain(|key, resolved| resolved.id.is_some() || known.contains(key));
        self.attempts = attempts;
        outcome
    }

    /// [`Resolver::up_to_date`] without touching the network. A dependency
    /// missing locally makes the module stale.
    pub fn up_to_date_locally(
        &mut self,
        id: DescriptorId,
        compiler: &dyn Compiler,
        including_archive: bool,
    ) -> Result<bool> {
        let outcome = self.without_downloads(|r| r.up_to_date(id, compiler, including_archive));
        match outcome {
            Err(e) if matches!(e.root(), BuildError::ArtifactNotFound(_)) => {
                debug!("not up to date: {}", e);
                Ok(false)
            }
            other => other,
        }
    }

    /// Declared dependencies of `id` resolved to descriptors, in
    /// declaration order, without recursing.
    pub fn direct_dependencies(
        &mut self,
        id: DescriptorId,
        exclude_optionals: bool,
        exclude_scopes: &[&str],
    ) -> Result<Vec<DescriptorId>> {
        let declared = self.descriptors[id.0].dependencies.clone();
        let mut resolved = Vec::new();
        for dependency in declared {
            if exclude_optionals && dependency.optional {
                continue;
            }
            let coordinate = self.expand_coordinate(id, &dependency);
            let scope = coordinate.scope.as_deref().unwrap_or("compile");
            if exclude_scopes.contains(&scope) {
                continue;
            }

            let found = match self.resolve_dependency(id, &coordinate) {
                Ok(found) => found,
                Err(e) if coordinate.optional => {
                    debug!("optional {}: {}", coordinate, e);
                    None
                }
                Err(e) => return Err(e.in_rule(&self.descriptors[id.0].coordinate.to_string())),
            };
            match found {
                Some(dep) if dep != id => {
                    if !resolved.contains(&dep) {
                        resolved.push(dep);
                    }
                }
                Some(_) => {}
                None if coordinate.optional => {
                    if self.verbose {
                        info!("skipping optional dependency {}", coordinate);
                    }
                }
                None => {
                    return Err(BuildError::ArtifactNotFound(coordinate.to_string())
                        .in_rule(&self.descriptors[id.0].coordinate.to_string()));
                }
            }
        }
        Ok(resolved)
    }

    /// Every descriptor reachable from `id` through declared dependencies,
    /// depth first, each once.
    pub fn resolve_transitive(
        &mut self,
        id: DescriptorId,
        exclude_optionals: bool,
        exclude_scopes: &[&str],
    ) -> Result<Vec<DescriptorId>> {
        let mut result = Vec::new();
        let mut seen = HashSet::from([id]);
        self.collect(id, exclude_optionals, exclude_scopes, &mut result, &mut seen)?;
        Ok(result)
    }

    fn collect(
        &mut self,
        id: DescriptorId,
        exclude_optionals: bool,
        exclude_scopes: &[&str],
        result: &mut Vec<DescriptorId>,
        seen: &mut HashSet<DescriptorId>,
    ) -> Result<()> {
        for dep in self.direct_dependencies(id, exclude_optionals, exclude_scopes)? {
            if !seen.insert(dep) {
                continue;
            }
            result.push(dep);
            self.collect(dep, exclude_optionals, exclude_scopes, result, seen)?;
        }
        Ok(())
    }

    /// Resolves one (already expanded) coordinate on behalf of `requester`.
    pub fn resolve_dependency(
        &mut self,
        requester: DescriptorId,
        coordinate: &Coordinate,
    ) -> Result<Option<DescriptorId>> {
        if satisfies(&self.descriptors[requester.0], coordinate) {
            return Ok(Some(requester));
        }
        let root = self.tree_root(requester);
        if let Some(found) = self.find_in_tree(root, coordinate) {
            return Ok(Some(found));
        }

        if coordinate.group_id.is_none() {
            if let Some(found) = self.find_by_artifact(coordinate)? {
                return Ok(Some(found));
            }
            self.scan_project_roots();
            return self.find_by_artifact(coordinate);
        }

        let key = coordinate.key();
        if let Some(cached) = self.memo.get(&key) {
            if let Some(failure) = &cached.failure {
                return Err(failure.duplicate());
            }
            match (&cached.id, &coordinate.version, &cached.version) {
                (None, _, _) => return Ok(None),
                (Some(found), Some(requested), Some(have))
                    if !coordinate.is_range()
                        && compare_versions(requested, have) == Ordering::Greater =>
                {
                    warn!(
                        "{} requested, replacing previously resolved version {}",
                        coordinate, have
                    );
                    debug!("superseding descriptor {:?}", found);
                }
                (Some(found), _, _) => return Ok(Some(*found)),
            }
        }

        *self.attempts.entry(key.clone()).or_default() += 1;
        let outcome = self.locate(requester, coordinate);
        let (id, failure) = match &outcome {
            Ok(found) => (*found, None),
            Err(e) => (None, Some(Arc::new(e.duplicate()))),
        };
        let version = match id {
            Some(found) => self.descriptors[found.0].coordinate.version.clone(),
            None => coordinate.version.clone(),
        };
        self.memo.insert(key, Resolved { id, version, failure });
        outcome
    }

    fn locate(&mut self, requester: DescriptorId, coordinate: &Coordinate) -> Result<Option<DescriptorId>> {
        self.scan_project_roots();
        if let Some(found) = self
            .descriptors()
            .filter(|(_, d)| d.from_source && satisfies(d, coordinate))
            .map(|(id, _)| id)
            .next()
        {
            return Ok(Some(found));
        }

        if let Some(system_path) = &coordinate.system_path {
            let archive = PathBuf::from(system_path);
            if archive.exists() {
                let id = DescriptorId(self.descriptors.len());
                self.descriptors
                    .push(Descriptor::for_archive(coordinate.clone(), &archive));
                return Ok(Some(id));
            }
            debug!("system path {} does not exist", archive.display());
        }

        let network = self.network_enabled();
        self.locate_in_repositories(requester, coordinate, network)
    }

    /// Unique match by artifact id among resolved descriptors.
    fn find_by_artifact(&self, coordinate: &Coordinate) -> Result<Option<DescriptorId>> {
        let mut candidates: Vec<(&CoordinateKey, DescriptorId)> = self
            .memo
            .iter()
            .filter(|(key, _)| {
                key.artifact_id == coordinate.artifact_id && key.classifier == coordinate.classifier
            })
            .filter_map(|(key, resolved)| resolved.id.map(|id| (key, id)))
            .collect();
        candidates.sort();
        match candidates.as_slice() {
            [] => Ok(None),
            [(_, id)] => Ok(Some(*id)),
            many => Err(BuildError::AmbiguousArtifact {
                artifact: coordinate.artifact_id.clone(),
                candidates: many
                    .iter()
                    .map(|(key, _)| key.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// Parses every project below the configured roots, once per session.
    fn scan_project_roots(&mut self) {
        if self.roots_scanned {
            return;
        }
        self.roots_scanned = true;
        let roots = self.config.project_roots.clone();
        for root in roots {
            let mut candidates = vec![root.join(DESCRIPTOR_FILE)];
            if let Ok(entries) = std::fs::read_dir(&root) {
                let mut dirs: Vec<PathBuf> = entries
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|path| path.is_dir())
                    .collect();
                dirs.sort();
                candidates.extend(dirs.into_iter().map(|dir| dir.join(DESCRIPTOR_FILE)));
            }
            for file in candidates.into_iter().filter(|f| f.is_file()) {
                if let Err(e) = self.parse(&file) {
                    warn!("skipping {}: {}", file.display(), e);
                }
            }
        }
    }

    /// Local repository first, then (if `network`) every repository in order.
    pub(crate) fn locate_in_repositories(
        &mut self,
        requester: DescriptorId,
        coordinate: &Coordinate,
        network: bool,
    ) -> Result<Option<DescriptorId>> {
        let Some(artifact_path) = coordinate.artifact_path() else {
            return Ok(None);
        };
        let artifact_dir = self.config.local_repository().join(&artifact_path);
        let Some(version) = self.concrete_version(requester, coordinate, &artifact_dir, network)?
        else {
            debug!("no version found for {}", coordinate);
            return Ok(None);
        };

        let version_dir = artifact_dir.join(&version);
        let mut wanted = coordinate.clone();
        wanted.version = Some(version.clone());
        let mut file_names = vec![wanted.clone()];
        if wanted.is_snapshot()
            && let Some(timestamped) =
                self.snapshot_version(requester, &wanted, &artifact_path, &version_dir, network)
        {
            let mut concrete = wanted.clone();
            concrete.version = Some(timestamped);
            file_names.insert(0, concrete);
        }

        for candidate in &file_names {
            let pom = version_dir.join(candidate.pom_name());
            if pom.is_file() {
                let id = self.parse_repository_descriptor(&pom, candidate)?;
                let descriptor = &self.descriptors[id.0];
                if descriptor.is_aggregator() || descriptor.target.is_file() {
                    return Ok(Some(id));
                }
                debug!("{} is cached without {}", candidate, descriptor.target.display());
                break;
            }
        }

        if !network {
            return Ok(None);
        }
        let concrete = file_names[0].clone();
        for repository in self.repositories(requester) {
            let base = format!("{}{}{}/", repository, artifact_path, version);
            match self.download(&base, &concrete, &version_dir) {
                Ok(()) => {
                    let pom = version_dir.join(concrete.pom_name());
                    return self.parse_repository_descriptor(&pom, &concrete).map(Some);
                }
                Err(e @ (BuildError::ChecksumMismatch { .. } | BuildError::OfflineViolation(_))) => {
                    return Err(e);
                }
                Err(e) => debug!("{} not in {}: {}", concrete, repository, e),
            }
        }
        Ok(None)
    }

    fn parse_repository_descriptor(&mut self, pom: &Path, coordinate: &Coordinate) -> Result<DescriptorId> {
        let id = self.parse_with(pom, None, coordinate.classifier.as_deref())?;
        let descriptor = &mut self.descriptors[id.0];
        descriptor.from_source = false;
        descriptor.target = pom
            .parent()
            .unwrap_or(Path::new("."))
            .join(coordinate.jar_name());
        Ok(id)
    }

    /// Fetches and verifies the descriptor, then the archive unless the
    /// descriptor is an aggregator. Nothing is written unless every file
    /// verified.
    fn download(&self, base: &str, coordinate: &Coordinate, version_dir: &Path) -> Result<()> {
        let pom_name = coordinate.pom_name();
        let pom_url = format!("{}{}", base, pom_name);
        let pom = self.fetcher.fetch_verified(&pom_url)?;
        let descriptor = parse_descriptor_str(
            &String::from_utf8_lossy(&pom),
            &pom_url,
            version_dir,
            &self.activation,
        )?;
        let archive = if descriptor.is_aggregator() {
            None
        } else {
            let jar_name = coordinate.jar_name();
            let bytes = self.fetcher.fetch_verified(&format!("{}{}", base, jar_name))?;
            Some((jar_name, bytes))
        };

        write_atomic(&version_dir.join(&pom_name), &pom)?;
        write_atomic(
            &version_dir.join(format!("{}.sha1", pom_name)),
            sha1_hex(&pom).as_bytes(),
        )?;
        if let Some((jar_name, bytes)) = archive {
            write_atomic(&version_dir.join(&jar_name), &bytes)?;
            write_atomic(
                &version_dir.join(format!("{}.sha1", jar_name)),
                sha1_hex(&bytes).as_bytes(),
            )?;
        }
        println!("   {} {}", "↓".blue(), coordinate);
        Ok(())
    }

    /// The version directory to use: as declared, selected from a range,
    /// or looked up for unversioned dependencies.
    fn concrete_version(
        &self,
        requester: DescriptorId,
        coordinate: &Coordinate,
        artifact_dir: &Path,
        network: bool,
    ) -> Result<Option<String>> {
        let Some(declared) = coordinate.version.as_deref() else {
            return Ok(self.unversioned(coordinate, artifact_dir));
        };
        if !coordinate.is_range() {
            return Ok(Some(declared.to_string()));
        }

        let Some(range) = VersionRange::parse(declared) else {
            return Err(BuildError::Metadata {
                path: coordinate.to_string(),
                message: format!("invalid version range '{}'", declared),
            });
        };
        let metadata_path = artifact_dir.join(VERSION_METADATA);
        if let Some(artifact_path) = coordinate.artifact_path() {
            let remote = format!("{}{}", artifact_path, REMOTE_METADATA);
            self.refresh_metadata(requester, &remote, &metadata_path, network);
        }
        let mut candidates = local_versions(artifact_dir);
        if metadata_path.is_file() {
            let metadata = Metadata::read(&metadata_path)?;
            candidates.extend(metadata.known_versions().into_iter().map(str::to_string));
        }
        Ok(range.select(candidates.iter().map(String::as_str)).map(str::to_string))
    }

    fn unversioned(&self, coordinate: &Coordinate, artifact_dir: &Path) -> Option<String> {
        let local = artifact_dir.join(LOCAL_METADATA);
        if local.is_file() {
            match Metadata::read(&local) {
                Ok(metadata) => {
                    if let Some(version) = metadata
                        .version
                        .or(metadata.release)
                        .or(metadata.latest)
                    {
                        return Some(version);
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }
        let versions = local_versions(artifact_dir);
        if let Some(version) = latest(versions.iter().map(String::as_str)) {
            return Some(version.to_string());
        }
        let fallback = self.config.fallback_versions.get(&coordinate.artifact_id).cloned();
        if fallback.is_none() {
            warn!("cannot determine version for {}", coordinate);
        }
        fallback
    }

    /// Timestamped file version for a `-SNAPSHOT` coordinate, from metadata
    /// refreshed at most once per update interval.
    fn snapshot_version(
        &self,
        requester: DescriptorId,
        coordinate: &Coordinate,
        artifact_path: &str,
        version_dir: &Path,
        network: bool,
    ) -> Option<String> {
        let version = coordinate.version.as_deref()?;
        let metadata_path = version_dir.join(SNAPSHOT_METADATA);
        let remote = format!("{}{}/{}", artifact_path, version, REMOTE_METADATA);
        self.refresh_metadata(requester, &remote, &metadata_path, network);
        if !metadata_path.is_file() {
            return None;
        }
        match Metadata::read(&metadata_path) {
            Ok(metadata) => metadata.snapshot_version(version),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    /// Re-fetches `relative` into `local` when the local copy is older than
    /// the update interval. Offline sessions keep whatever is cached.
    fn refresh_metadata(
        &self,
        requester: DescriptorId,
        relative: &str,
        local: &Path,
        network: bool,
    ) {
        if !network
            || self.fetcher.is_offline()
            || is_fresh(local, self.config.update_interval())
        {
            return;
        }
        for repository in self.repositories(requester) {
            let url = format!("{}{}", repository, relative);
            match self.fetcher.fetch_verified(&url) {
                Ok(bytes) => {
                    if let Err(e) = write_atomic(local, &bytes) {
                        warn!("could not cache {}: {}", url, e);
                    }
                    return;
                }
                Err(e) => debug!("no metadata at {}: {}", url, e),
            }
        }
        // Touch the stale copy so the interval also throttles failed lookups.
        if local.is_file()
            && let Ok(file) = std::fs::File::options().write(true).open(local)
        {
            let _ = file.set_modified(std::time::SystemTime::now());
        }
    }
}

/// Version directories present below an artifact directory.
fn local_versions(artifact_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(artifact_dir) else {
        return Vec::new();
    };
    let mut versions: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
        .collect();
    versions.sort();
    versions
}
