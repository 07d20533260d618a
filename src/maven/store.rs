//! The descriptor arena: parsing project trees, linking parents and
//! children, and property expansion along the parent chain.

use super::coordinate::Coordinate;
use super::descriptor::{Descriptor, DescriptorId, parse_descriptor_file};
use super::resolver::{Resolved, Resolver};
use crate::error::{BuildError, Result};
use crate::rules::kind::DESCRIPTOR_FILE;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MAX_EXPANSION_DEPTH: usize = 16;

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Whether `descriptor` is what `coordinate` asks for. Unset group or
/// version on the request match anything.
pub(crate) fn satisfies(descriptor: &Descriptor, coordinate: &Coordinate) -> bool {
    let have = &descriptor.coordinate;
    have.artifact_id == coordinate.artifact_id
        && have.classifier == coordinate.classifier
        && (coordinate.group_id.is_none() || have.group_id == coordinate.group_id)
        && (coordinate.version.is_none()
            || have.version.is_none()
            || have.version == coordinate.version)
}

impl Resolver {
    pub fn descriptor(&self, id: DescriptorId) -> &Descriptor {
        &self.descriptors[id.0]
    }

    pub fn descriptors(&self) -> impl Iterator<Item = (DescriptorId, &Descriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .map(|(index, d)| (DescriptorId(index), d))
    }

    /// Parses the project containing `path` (a descriptor file or its
    /// directory). Ancestor directories holding descriptors are walked up
    /// first so the whole tree is known; the requested module is returned.
    pub fn parse(&mut self, path: &Path) -> Result<DescriptorId> {
        let file = if path.is_dir() {
            path.join(DESCRIPTOR_FILE)
        } else {
            path.to_path_buf()
        };
        let file = canonical(&file);
        let Some(mut root_dir) = file.parent().map(Path::to_path_buf) else {
            return Err(BuildError::Descriptor {
                path: file.display().to_string(),
                message: "no parent directory".to_string(),
            });
        };

        let mut descent = Vec::new();
        while let Some(parent) = root_dir.parent()
            && parent.join(DESCRIPTOR_FILE).exists()
            && let Some(name) = root_dir.file_name()
        {
            descent.push(name.to_os_string());
            root_dir = parent.to_path_buf();
        }

        let mut id = self.parse_tree(&root_dir.join(DESCRIPTOR_FILE), None)?;
        for name in descent.iter().rev() {
            let directory = self.descriptors[id.0].directory.join(name);
            let existing = self.descriptors[id.0]
                .children
                .iter()
                .copied()
                .find(|child| self.descriptors[child.0].directory == directory);
            id = match existing {
                Some(child) => child,
                None => {
                    debug!("adding undeclared module {}", directory.display());
                    let child = self.parse_tree(&directory.join(DESCRIPTOR_FILE), Some(id))?;
                    self.adopt(id, child);
                    child
                }
            };
        }
        Ok(id)
    }

    /// Parses a descriptor and, eagerly, all of its modules.
    pub fn parse_tree(&mut self, path: &Path, parent: Option<DescriptorId>) -> Result<DescriptorId> {
        let id = self.parse_with(path, parent, None)?;
        if self.descended.insert(id) {
            let modules = self.descriptors[id.0].modules.clone();
            for module in modules {
                let directory = self.descriptors[id.0].directory.join(&module);
                let module_file = directory.join(DESCRIPTOR_FILE);
                if !module_file.exists() {
                    warn!("module {} has no {}", directory.display(), DESCRIPTOR_FILE);
                    continue;
                }
                let child = self.parse_tree(&module_file, Some(id))?;
                self.adopt(id, child);
            }
        }
        Ok(id)
    }

    fn adopt(&mut self, parent: DescriptorId, child: DescriptorId) {
        if parent == child || self.is_ancestor(child, parent) {
            warn!(
                "not adding {} below its own descendant {}",
                self.descriptors[child.0].coordinate, self.descriptors[parent.0].coordinate
            );
            return;
        }
        if !self.descriptors[parent.0].children.contains(&child) {
            self.descriptors[parent.0].children.push(child);
        }
    }

    /// Parses one descriptor file without descending into its modules.
    pub(crate) fn parse_with(
        &mut self,
        path: &Path,
        parent: Option<DescriptorId>,
        classifier: Option<&str>,
    ) -> Result<DescriptorId> {
        let path = canonical(path);
        let memo_key = (path.clone(), classifier.map(str::to_string));
        if let Some(&id) = self.by_path.get(&memo_key) {
            return Ok(id);
        }

        let mut descriptor = parse_descriptor_file(&path, &self.activation)?;
        descriptor.coordinate.classifier = classifier.map(str::to_string);
        let id = DescriptorId(self.descriptors.len());
        self.descriptors.push(descriptor);
        self.by_path.insert(memo_key, id);

        let parent = match parent {
            Some(parent) => Some(parent),
            None => self.resolve_parent(id),
        };
        if let Some(parent) = parent {
            self.link_parent(id, parent);
        }

        let descriptor = &mut self.descriptors[id.0];
        descriptor.from_source = descriptor.source_directory().is_dir();
        descriptor.target = if descriptor.from_source {
            descriptor.classes_directory()
        } else {
            descriptor.directory.join(descriptor.coordinate.jar_name())
        };
        self.register(id);
        Ok(id)
    }

    /// Records `id` as the cached resolution of its coordinate key unless
    /// the key is already resolved.
    pub(crate) fn register(&mut self, id: DescriptorId) {
        let coordinate = &self.descriptors[id.0].coordinate;
        let key = coordinate.key();
        let resolved = self.memo.entry(key).or_insert(Resolved {
            id: None,
            version: None,
            failure: None,
        });
        if resolved.id.is_none() {
            resolved.id = Some(id);
            resolved.version = coordinate.version.clone();
            resolved.failure = None;
        }
    }

    fn link_parent(&mut self, id: DescriptorId, parent: DescriptorId) {
        if parent == id || self.is_ancestor(id, parent) {
            warn!(
                "ignoring parent {} of {}: it descends from the child",
                self.descriptors[parent.0].coordinate, self.descriptors[id.0].coordinate
            );
            return;
        }
        let (group, version, source_directory) = {
            let p = &self.descriptors[parent.0];
            (
                p.coordinate.group_id.clone(),
                p.coordinate.version.clone(),
                p.build.source_directory.clone(),
            )
        };
        let descriptor = &mut self.descriptors[id.0];
        descriptor.parent = Some(parent);
        if descriptor.coordinate.group_id.is_none() {
            descriptor.coordinate.group_id = group;
        }
        if descriptor.coordinate.version.is_none() {
            descriptor.coordinate.version = version;
        }
        if descriptor.build.source_directory.is_none() {
            descriptor.build.source_directory = source_directory;
        }
    }

    /// Whether `ancestor` is on the parent chain of `id`.
    pub(crate) fn is_ancestor(&self, ancestor: DescriptorId, id: DescriptorId) -> bool {
        let mut current = self.descriptors[id.0].parent;
        let mut steps = 0;
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.descriptors.len() {
                return true;
            }
            current = self.descriptors[c.0].parent;
        }
        false
    }

    /// Finds the declared parent: resolved cache, then the directory named
    /// by `relativePath`, then the repositories.
    fn resolve_parent(&mut self, id: DescriptorId) -> Option<DescriptorId> {
        let declared = self.descriptors[id.0].parent_coordinate.clone()?;
        let child = self.descriptors[id.0].coordinate.to_string();

        if let Some(Resolved { id: Some(found), .. }) = self.memo.get(&declared.key()) {
            return Some(*found);
        }

        match self.parent_from_directory(id, &declared) {
            Ok(Some(found)) => return Some(found),
            Ok(None) => {}
            Err(e) => debug!("parent of {} not in its directory: {}", child, e),
        }

        let network = self.network_enabled();
        match self.locate_in_repositories(id, &declared, network) {
            Ok(Some(found)) => Some(found),
            Ok(None) | Err(_) => {
                warn!(
                    "{}",
                    BuildError::ParentNotFound {
                        parent: declared.to_string(),
                        child,
                    }
                );
                None
            }
        }
    }

    fn parent_from_directory(
        &mut self,
        id: DescriptorId,
        declared: &Coordinate,
    ) -> Result<Option<DescriptorId>> {
        let descriptor = &self.descriptors[id.0];
        let relative = descriptor
            .parent_relative_path
            .clone()
            .unwrap_or_else(|| format!("../{}", DESCRIPTOR_FILE));
        let mut candidate = descriptor.directory.join(relative);
        if candidate.is_dir() {
            candidate = candidate.join(DESCRIPTOR_FILE);
        }
        if !candidate.is_file() || descriptor.path.as_deref().map(canonical) == Some(canonical(&candidate)) {
            return Ok(None);
        }
        let found = self.parse_with(&candidate, None, None)?;
        let parsed = &self.descriptors[found.0];
        let same_group = declared.group_id.is_none() || parsed.coordinate.group_id == declared.group_id;
        Ok((parsed.coordinate.artifact_id == declared.artifact_id && same_group).then_some(found))
    }

    /// The outermost descriptor of the project tree containing `id`.
    pub fn tree_root(&self, id: DescriptorId) -> DescriptorId {
        let mut current = id;
        let mut steps = 0;
        while let Some(parent) = self.descriptors[current.0].parent
            && self.descriptors[parent.0].children.contains(&current)
            && steps <= self.descriptors.len()
        {
            current = parent;
            steps += 1;
        }
        current
    }

    /// Depth-first search of the project tree below `root`.
    pub fn find_in_tree(&self, root: DescriptorId, coordinate: &Coordinate) -> Option<DescriptorId> {
        let mut stack = vec![root];
        let mut visited = std::collections::HashSet::new();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let descriptor = &self.descriptors[id.0];
            if satisfies(descriptor, coordinate) {
                return Some(id);
            }
            stack.extend(descriptor.children.iter().rev().copied());
        }
        None
    }

    /// Looks `key` up in the descriptor's own properties, then along its
    /// parent chain, then in the configured root properties.
    pub fn get_property(&self, id: DescriptorId, key: &str) -> Option<String> {
        let mut current = Some(id);
        let mut steps = 0;
        while let Some(c) = current
            && steps <= self.descriptors.len()
        {
            let descriptor = &self.descriptors[c.0];
            if let Some(value) = descriptor.properties.get(key) {
                return Some(value.clone());
            }
            if key == "project.basedir" || key == "basedir" {
                return Some(descriptor.directory.display().to_string());
            }
            current = descriptor.parent;
            steps += 1;
        }
        self.config
            .properties
            .get(key)
            .or_else(|| self.config.system_properties.get(key))
            .cloned()
    }

    /// Replaces `${name}` placeholders. A value that is exactly one
    /// unresolved placeholder is absent; otherwise unresolved placeholders
    /// expand to nothing.
    pub fn expand(&self, id: DescriptorId, value: &str) -> Option<String> {
        self.expand_depth(id, value, 0)
    }

    fn expand_depth(&self, id: DescriptorId, value: &str, depth: usize) -> Option<String> {
        if depth > MAX_EXPANSION_DEPTH || !value.contains("${") {
            return Some(value.to_string());
        }
        let mut result = String::new();
        let mut rest = value;
        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                result.push_str(&rest[start..]);
                return Some(result);
            };
            let name = &after[..end];
            match self.get_property(id, name) {
                Some(found) => result.push_str(&self.expand_depth(id, &found, depth + 1)?),
                None if value.len() == name.len() + 3 => return None,
                None => debug!("property {} is not set", name),
            }
            rest = &after[end + 1..];
        }
        result.push_str(rest);
        Some(result)
    }

    /// A dependency with its placeholders expanded in the context of `id`.
    pub fn expand_coordinate(&self, id: DescriptorId, declared: &Coordinate) -> Coordinate {
        let expand = |value: &Option<String>| {
            value.as_deref().and_then(|v| self.expand(id, v))
        };
        Coordinate {
            group_id: expand(&declared.group_id),
            artifact_id: self
                .expand(id, &declared.artifact_id)
                .unwrap_or_default(),
            version: expand(&declared.version),
            classifier: expand(&declared.classifier),
            scope: expand(&declared.scope),
            optional: declared.optional,
            system_path: expand(&declared.system_path),
        }
        .normalized()
    }

    /// Repositories to try for `id`: configured ones first, then those
    /// declared along its parent chain and across its project tree.
    pub fn repositories(&self, id: DescriptorId) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        let mut push = |url: &str| {
            let url = if url.ends_with('/') {
                url.to_string()
            } else {
                format!("{}/", url)
            };
            if !urls.contains(&url) {
                urls.push(url);
            }
        };
        for url in &self.config.repositories {
            push(url);
        }
        let mut current = Some(id);
        let mut steps = 0;
        while let Some(c) = current
            && steps <= self.descriptors.len()
        {
            for url in &self.descriptors[c.0].repositories {
                push(url);
            }
            current = self.descriptors[c.0].parent;
            steps += 1;
        }
        let mut stack = vec![self.tree_root(id)];
        while let Some(c) = stack.pop() {
            for url in &self.descriptors[c.0].repositories {
                push(url);
            }
            stack.extend(self.descriptors[c.0].children.iter().copied());
        }
        urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::maven::fetch::HttpTransport;
    use std::fs;
    use std::sync::Arc;

    fn resolver(dir: &Path) -> Resolver {
        let config = ResolverConfig {
            local_repository: Some(dir.join("m2")),
            repositories: Vec::new(),
            offline: true,
            ..Default::default()
        };
        Resolver::new(config, Arc::new(HttpTransport::default()))
    }

    fn write_pom(dir: &Path, body: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("pom.xml"), format!("<project>{}</project>", body)).unwrap();
    }

    fn project(root: &Path) {
        write_pom(
            root,
            "<groupId>org.example</groupId><artifactId>parent</artifactId><version>2.0</version>\
             <packaging>pom</packaging><modules><module>lib</module></modules>\
             <properties><greeting>hello</greeting><util.version>1.5</util.version></properties>",
        );
        write_pom(
            &root.join("lib"),
            "<parent><groupId>org.example</groupId><artifactId>parent</artifactId>\
             <version>2.0</version></parent><artifactId>lib</artifactId>\
             <dependencies><dependency><groupId>org.example</groupId>\
             <artifactId>util</artifactId><version>${util.version}</version></dependency>\
             </dependencies>",
        );
        fs::create_dir_all(root.join("lib/src/main/java")).unwrap();
        write_pom(
            &root.join("tools"),
            "<groupId>org.example</groupId><artifactId>tools</artifactId><version>1</version>",
        );
    }

    #[test]
    fn test_parse_walks_up_to_the_root() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        let mut r = resolver(dir.path());

        let lib = r.parse(&dir.path().join("lib/pom.xml")).unwrap();
        let descriptor = r.descriptor(lib);
        assert_eq!(descriptor.coordinate.to_string(), "org.example:lib:2.0");
        assert!(descriptor.from_source);
        assert!(descriptor.target.ends_with("target/classes"));

        let root = descriptor.parent.unwrap();
        assert_eq!(r.descriptor(root).coordinate.artifact_id, "parent");
        assert!(r.descriptor(root).is_aggregator());
        assert_eq!(r.tree_root(lib), root);
    }

    #[test]
    fn test_undeclared_module_is_added() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        let mut r = resolver(dir.path());
        let tools = r.parse(&dir.path().join("tools")).unwrap();
        let root = r.tree_root(tools);
        assert_ne!(root, tools);
        assert_eq!(r.descriptor(root).children.len(), 2);
    }

    #[test]
    fn test_property_expansion_walks_parent_chain() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path());
        let mut r = resolver(dir.path());
        let lib = r.parse(&dir.path().join("lib")).unwrap();

        assert_eq!(r.expand(lib, "${greeting}, world").as_deref(), Some("hello, world"));
        assert_eq!(r.expand(lib, "${missing}"), None);
        assert_eq!(r.expand(lib, "a${missing}b").as_deref(), Some("ab"));
        assert_eq!(r.expand(lib, "${unclosed").as_deref(), Some("${unclosed"));
        assert_eq!(r.expand(lib, "${project.version}").as_deref(), Some("2.0"));

        let declared = r.descriptor(lib).dependencies[0].clone();
        let expanded = r.expand_coordinate(lib, &declared);
        assert_eq!(expanded.version.as_deref(), Some("1.5"));
    }

    #[test]
    fn test_recursive_property_values() {
        let dir = tempfile::tempdir().unwrap();
        write_pom(
            dir.path(),
            "<groupId>g</groupId><artifactId>a</artifactId><version>1</version>\
             <properties><x>${y}</x><y>deep</y><loop>${loop}</loop></properties>",
        );
        let mut r = resolver(dir.path());
        let id = r.parse(dir.path()).unwrap();
        assert_eq!(r.expand(id, "${x}").as_deref(), Some("deep"));
        assert!(r.expand(id, "${loop}").is_some());
    }

    #[test]
    fn test_parent_pointing_at_descendant_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        write_pom(
            dir.path(),
            "<parent><groupId>g</groupId><artifactId>child</artifactId><version>1</version>\
             <relativePath>child/pom.xml</relativePath></parent>\
             <groupId>g</groupId><artifactId>top</artifactId><version>1</version>\
             <modules><module>child</module></modules>",
        );
        write_pom(
            &dir.path().join("child"),
            "<parent><groupId>g</groupId><artifactId>top</artifactId><version>1</version></parent>\
             <artifactId>child</artifactId>",
        );
        let mut r = resolver(dir.path());
        let top = r.parse(dir.path()).unwrap();
        let mut current = Some(top);
        let mut seen = std::collections::HashSet::new();
        while let Some(c) = current {
            assert!(seen.insert(c), "parent chain loops");
            current = r.descriptor(c).parent;
        }
    }

    #[test]
    fn test_configured_repositories_come_first() {
        let dir = tempfile::tempdir().unwrap();
        write_pom(
            dir.path(),
            "<groupId>g</groupId><artifactId>a</artifactId><version>1</version>\
             <repositories><repository><url>https://extra.example.org/maven</url></repository></repositories>",
        );
        let mut config = ResolverConfig {
            local_repository: Some(dir.path().join("m2")),
            ..Default::default()
        };
        config.repositories = vec!["https://first.example.org/".into()];
        let mut r = Resolver::new(config, Arc::new(HttpTransport::default()));
        let id = r.parse(dir.path()).unwrap();
        assert_eq!(
            r.repositories(id),
            ["https://first.example.org/", "https://extra.example.org/maven/"]
        );
    }
}
