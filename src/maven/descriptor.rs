//! Module descriptor (`pom.xml`) parsing.
//!
//! The document is streamed with `quick-xml`. Each element's text is routed
//! by its path from the document root, e.g.
//! `>project>dependencies>dependency>artifactId`.

use super::coordinate::Coordinate;
use crate::error::{BuildError, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const DEFAULT_SOURCE_DIRECTORY: &str = "src/main/java";
const COMPILER_PLUGIN: &str = "maven-compiler-plugin";

/// Index of a descriptor in the resolver's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Packaging {
    #[default]
    Library,
    /// Groups submodules; has no compiled output of its own.
    Aggregator,
}

impl Packaging {
    fn from_declared(value: &str) -> Self {
        match value {
            "pom" | "aggregator" => Packaging::Aggregator,
            _ => Packaging::Library,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildMetadata {
    pub source_directory: Option<String>,
    pub source_level: Option<String>,
    pub target_level: Option<String>,
    pub main_class: Option<String>,
}

/// What decides whether the environment activates a profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileActivation {
    /// Profile ids matching the current platform and toolchain.
    pub active_ids: Vec<String>,
    pub system_properties: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct Profile {
    id: Option<String>,
    active_by_default: bool,
    file_exists: Option<String>,
    property_name: Option<String>,
    property_value: Option<String>,
    dependencies: Vec<Coordinate>,
    properties: BTreeMap<String, String>,
}

impl Profile {
    fn is_satisfied(&self, directory: &Path, activation: &ProfileActivation) -> bool {
        if let Some(id) = &self.id
            && activation.active_ids.iter().any(|active| active == id)
        {
            return true;
        }
        if let Some(file) = &self.file_exists
            && directory.join(file).exists()
        {
            return true;
        }
        if self.active_by_default {
            return true;
        }
        let Some(name) = &self.property_name else {
            return false;
        };
        match (name.strip_prefix('!'), &self.property_value) {
            (Some(negated), _) => !activation.system_properties.contains_key(negated),
            (None, Some(expected)) => match expected.strip_prefix('!') {
                Some(unexpected) => {
                    activation.system_properties.get(name).map(String::as_str)
                        != Some(unexpected)
                }
                None => activation.system_properties.get(name) == Some(expected),
            },
            (None, None) => activation.system_properties.contains_key(name),
        }
    }
}

/// A parsed descriptor. Relationships to other descriptors are arena ids
/// filled in by the resolver.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// The descriptor file, absent for system-path stand-ins.
    pub path: Option<PathBuf>,
    pub directory: PathBuf,
    pub coordinate: Coordinate,
    pub packaging: Packaging,
    /// `<parent>` as declared.
    pub parent_coordinate: Option<Coordinate>,
    pub parent_relative_path: Option<String>,
    pub modules: Vec<String>,
    pub properties: BTreeMap<String, String>,
    pub dependencies: Vec<Coordinate>,
    pub repositories: BTreeSet<String>,
    pub build: BuildMetadata,
    pub parent: Option<DescriptorId>,
    pub children: Vec<DescriptorId>,
    pub from_source: bool,
    /// Compiled output directory for from-source modules, else the archive.
    pub target: PathBuf,
}

impl Descriptor {
    /// A descriptor standing in for a plain archive on disk.
    pub fn for_archive(coordinate: Coordinate, archive: &Path) -> Self {
        Self {
            path: None,
            directory: archive
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            coordinate,
            packaging: Packaging::Library,
            parent_coordinate: None,
            parent_relative_path: None,
            modules: Vec::new(),
            properties: BTreeMap::new(),
            dependencies: Vec::new(),
            repositories: BTreeSet::new(),
            build: BuildMetadata::default(),
            parent: None,
            children: Vec::new(),
            from_source: false,
            target: archive.to_path_buf(),
        }
    }

    pub fn is_aggregator(&self) -> bool {
        self.packaging == Packaging::Aggregator
    }

    pub fn source_directory(&self) -> PathBuf {
        self.directory.join(
            self.build
                .source_directory
                .as_deref()
                .unwrap_or(DEFAULT_SOURCE_DIRECTORY),
        )
    }

    /// `src/main/resources`, next to the source directory.
    pub fn resource_directory(&self) -> PathBuf {
        let sources = self.source_directory();
        sources
            .parent()
            .map(|p| p.join("resources"))
            .unwrap_or_else(|| self.directory.join("src/main/resources"))
    }

    pub fn classes_directory(&self) -> PathBuf {
        self.directory.join("target").join("classes")
    }

    /// `target/<artifact>-<version>.jar` for modules built from source.
    pub fn archive_path(&self) -> PathBuf {
        self.directory.join("target").join(self.coordinate.jar_name())
    }
}

/// Parses descriptor text. `directory` anchors file-existence profile
/// conditions and the resulting descriptor's paths.
pub fn parse_descriptor_str(
    xml: &str,
    origin: &str,
    directory: &Path,
    activation: &ProfileActivation,
) -> Result<Descriptor> {
    let mut handler = Handler::default();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path = String::new();
    let mut text = String::new();
    let error = |message: String| BuildError::Descriptor {
        path: origin.to_string(),
        message,
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                path.push('>');
                path.push_str(&String::from_utf8_lossy(element.local_name().as_ref()));
                text.clear();
                handler.start(&path);
            }
            Ok(Event::Empty(element)) => {
                path.push('>');
                path.push_str(&String::from_utf8_lossy(element.local_name().as_ref()));
                handler.start(&path);
                handler.end(&path, "", directory, activation);
                pop(&mut path);
            }
            Ok(Event::Text(content)) => {
                let unescaped = content.unescape().map_err(|e| error(e.to_string()))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(content)) => {
                text.push_str(&String::from_utf8_lossy(&content.into_inner()));
            }
            Ok(Event::End(_)) => {
                handler.end(&path, text.trim(), directory, activation);
                text.clear();
                pop(&mut path);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(error(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    let coordinate = handler.coordinate.clone().normalized();
    if coordinate.artifact_id.is_empty() {
        return Err(error("missing artifactId".to_string()));
    }
    Ok(handler.finish(coordinate, directory))
}

/// Reads and parses a descriptor file.
pub fn parse_descriptor_file(path: &Path, activation: &ProfileActivation) -> Result<Descriptor> {
    let xml = std::fs::read_to_string(path).map_err(|e| BuildError::io_at(path, e))?;
    let directory = path.parent().unwrap_or(Path::new("."));
    let mut descriptor =
        parse_descriptor_str(&xml, &path.display().to_string(), directory, activation)?;
    descriptor.path = Some(path.to_path_buf());
    Ok(descriptor)
}

fn pop(path: &mut String) {
    if let Some(index) = path.rfind('>') {
        path.truncate(index);
    }
}

#[derive(Default)]
struct Handler {
    coordinate: Coordinate,
    packaging: Option<String>,
    parent: Option<Coordinate>,
    parent_relative_path: Option<String>,
    modules: Vec<String>,
    properties: BTreeMap<String, String>,
    dependencies: Vec<Coordinate>,
    repositories: BTreeSet<String>,
    build: BuildMetadata,
    dependency: Coordinate,
    profile: Profile,
    profile_applied: bool,
    plugin_artifact: Option<String>,
    plugin_source: Option<String>,
    plugin_target: Option<String>,
}

const DEPENDENCY: &str = ">project>dependencies>dependency";
const PROFILE: &str = ">project>profiles>profile";
const PROFILE_DEPENDENCY: &str = ">project>profiles>profile>dependencies>dependency";
const PLUGIN: &str = ">project>build>plugins>plugin";

fn set_dependency_field(dependency: &mut Coordinate, field: &str, value: &str) {
    let value = value.to_string();
    match field {
        "groupId" => dependency.group_id = Some(value),
        "artifactId" => dependency.artifact_id = value,
        "version" => dependency.version = Some(value),
        "scope" => dependency.scope = Some(value),
        "classifier" => dependency.classifier = Some(value),
        "systemPath" => dependency.system_path = Some(value),
        "optional" => dependency.optional = value.eq_ignore_ascii_case("true"),
        _ => {}
    }
}

impl Handler {
    fn start(&mut self, path: &str) {
        match path {
            DEPENDENCY | PROFILE_DEPENDENCY => self.dependency = Coordinate::default(),
            PROFILE => self.profile = Profile::default(),
            PLUGIN => {
                self.plugin_artifact = None;
                self.plugin_source = None;
                self.plugin_target = None;
            }
            _ => {}
        }
    }

    fn end(&mut self, path: &str, text: &str, directory: &Path, activation: &ProfileActivation) {
        match path {
            DEPENDENCY => {
                let dependency = std::mem::take(&mut self.dependency).normalized();
                self.dependencies.push(dependency);
                return;
            }
            PROFILE_DEPENDENCY => {
                let dependency = std::mem::take(&mut self.dependency).normalized();
                self.profile.dependencies.push(dependency);
                return;
            }
            PROFILE => {
                let profile = std::mem::take(&mut self.profile);
                if !self.profile_applied && profile.is_satisfied(directory, activation) {
                    self.profile_applied = true;
                    self.dependencies.extend(profile.dependencies);
                    self.properties.extend(profile.properties);
                }
                return;
            }
            PLUGIN => {
                let is_compiler = self.plugin_artifact.as_deref() == Some(COMPILER_PLUGIN);
                if is_compiler {
                    self.build.source_level = self.plugin_source.take();
                    self.build.target_level = self.plugin_target.take();
                }
                return;
            }
            _ => {}
        }
        if text.is_empty() {
            return;
        }

        if let Some(field) = path
            .strip_prefix(DEPENDENCY)
            .or_else(|| path.strip_prefix(PROFILE_DEPENDENCY))
            .and_then(|rest| rest.strip_prefix('>'))
        {
            set_dependency_field(&mut self.dependency, field, text);
            return;
        }
        if let Some(key) = path.strip_prefix(">project>properties>") {
            self.properties.insert(key.to_string(), text.to_string());
            return;
        }
        if let Some(key) = path.strip_prefix(">project>profiles>profile>properties>") {
            self.profile.properties.insert(key.to_string(), text.to_string());
            return;
        }
        if let Some(field) = path.strip_prefix(">project>build>plugins>plugin>") {
            let value = Some(text.to_string());
            match field {
                "artifactId" => self.plugin_artifact = value,
                "configuration>source" => self.plugin_source = value,
                "configuration>target" => self.plugin_target = value,
                "configuration>archive>manifest>mainClass" => self.build.main_class = value,
                _ => {}
            }
            return;
        }

        let value = text.to_string();
        match path {
            ">project>groupId" => self.coordinate.group_id = Some(value),
            ">project>artifactId" => self.coordinate.artifact_id = value,
            ">project>version" => self.coordinate.version = Some(value),
            ">project>packaging" => self.packaging = Some(value),
            ">project>parent>groupId" => {
                self.parent.get_or_insert_with(Coordinate::default).group_id = Some(value)
            }
            ">project>parent>artifactId" => {
                self.parent.get_or_insert_with(Coordinate::default).artifact_id = value
            }
            ">project>parent>version" => {
                self.parent.get_or_insert_with(Coordinate::default).version = Some(value)
            }
            ">project>parent>relativePath" => self.parent_relative_path = Some(value),
            ">project>modules>module" => self.modules.push(value),
            ">project>repositories>repository>url" => {
                self.repositories.insert(value);
            }
            ">project>build>sourceDirectory" => self.build.source_directory = Some(value),
            ">project>profiles>profile>id" => self.profile.id = Some(value),
            ">project>profiles>profile>activation>activeByDefault" => {
                self.profile.active_by_default = value.eq_ignore_ascii_case("true")
            }
            ">project>profiles>profile>activation>file>exists" => {
                self.profile.file_exists = Some(value)
            }
            ">project>profiles>profile>activation>property>name" => {
                self.profile.property_name = Some(value)
            }
            ">project>profiles>profile>activation>property>value" => {
                self.profile.property_value = Some(value)
            }
            _ => {}
        }
    }

    fn finish(self, mut coordinate: Coordinate, directory: &Path) -> Descriptor {
        let parent_coordinate = self.parent.map(Coordinate::normalized);
        if let Some(parent) = &parent_coordinate {
            if coordinate.group_id.is_none() {
                coordinate.group_id = parent.group_id.clone();
            }
            if coordinate.version.is_none() {
                coordinate.version = parent.version.clone();
            }
        }

        let mut properties = self.properties;
        if let Some(group) = &coordinate.group_id {
            properties
                .entry("project.groupId".to_string())
                .or_insert_with(|| group.clone());
        }
        if let Some(version) = &coordinate.version {
            properties
                .entry("project.version".to_string())
                .or_insert_with(|| version.clone());
        }
        properties
            .entry("project.artifactId".to_string())
            .or_insert_with(|| coordinate.artifact_id.clone());

        let packaging = self
            .packaging
            .as_deref()
            .map(Packaging::from_declared)
            .unwrap_or_default();

        Descriptor {
            path: None,
            directory: directory.to_path_buf(),
            target: directory.join("target").join("classes"),
            coordinate,
            packaging,
            parent_coordinate,
            parent_relative_path: self.parent_relative_path,
            modules: self.modules,
            properties,
            dependencies: self.dependencies,
            repositories: self.repositories,
            build: self.build,
            parent: None,
            children: Vec::new(),
            from_source: false,
        }
    }
}
