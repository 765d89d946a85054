//! Manifest registry - parses manifests and owns the dependency graph

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nvr_plugin_api::{API_VERSION, PluginManifest};
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;

/// Manifest file names looked up in a plugin directory, in order
pub const MANIFEST_FILES: [&str; 3] = ["manifest.yaml", "manifest.yml", "manifest.json"];

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("{0}")]
    Invalid(String),

    #[error("Plugin '{0}' is already registered")]
    DuplicateId(String),

    #[error("Failed to parse manifest {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("No manifest found in {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Json,
}

impl ManifestFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Parse and validate a manifest document
pub fn parse_manifest(content: &str, format: ManifestFormat) -> Result<PluginManifest, String> {
    let manifest: PluginManifest = match format {
        ManifestFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string())?,
        ManifestFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string())?,
    };
    validate_manifest(&manifest).map_err(|e| e.to_string())?;
    Ok(manifest)
}

pub fn load_manifest(path: &Path) -> Result<PluginManifest, ManifestError> {
    let content = std::fs::read_to_string(path)?;
    parse_manifest(&content, ManifestFormat::from_path(path)).map_err(|message| {
        ManifestError::Parse {
            path: path.to_path_buf(),
            message,
        }
    })
}

/// Locate the manifest file inside a plugin directory
pub fn find_manifest(dir: &Path) -> Result<PathBuf, ManifestError> {
    MANIFEST_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| ManifestError::NotFound(dir.to_path_buf()))
}

fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Structural checks that need no other manifest
pub fn validate_manifest(manifest: &PluginManifest) -> Result<(), ManifestError> {
    if manifest.id.trim().is_empty() {
        return Err(ManifestError::Invalid("manifest id is empty".into()));
    }
    if !valid_id(&manifest.id) {
        return Err(ManifestError::Invalid(format!(
            "manifest id '{}' may only contain letters, digits, '-', '_' and '.'",
            manifest.id
        )));
    }
    if manifest.api_version != API_VERSION {
        return Err(ManifestError::Invalid(format!(
            "plugin '{}' targets API version {}, host supports {}",
            manifest.id, manifest.api_version, API_VERSION
        )));
    }
    let mut seen = HashSet::new();
    for dep in &manifest.dependencies {
        if dep == &manifest.id {
            return Err(ManifestError::Invalid(format!(
                "plugin '{}' depends on itself",
                manifest.id
            )));
        }
        if !valid_id(dep) {
            return Err(ManifestError::Invalid(format!(
                "plugin '{}' has invalid dependency id '{}'",
                manifest.id, dep
            )));
        }
        if !seen.insert(dep.as_str()) {
            return Err(ManifestError::Invalid(format!(
                "plugin '{}' lists dependency '{}' twice",
                manifest.id, dep
            )));
        }
    }
    Ok(())
}

/// Registered manifests and the dependency graph between them.
///
/// Edges run from a dependency to its dependents. Missing dependencies and
/// cycles are allowed in the registry; the affected plugins are simply
/// excluded from the startup order.
#[derive(Debug, Default)]
pub struct ManifestRegistry {
    manifests: BTreeMap<String, Arc<PluginManifest>>,
}

impl ManifestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, manifest: PluginManifest) -> Result<Arc<PluginManifest>, ManifestError> {
        validate_manifest(&manifest)?;
        if self.manifests.contains_key(&manifest.id) {
            return Err(ManifestError::DuplicateId(manifest.id));
        }
        let manifest = Arc::new(manifest);
        self.manifests.insert(manifest.id.clone(), manifest.clone());
        Ok(manifest)
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<PluginManifest>> {
        self.manifests.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<PluginManifest>> {
        self.manifests.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.manifests.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.manifests.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// Declared dependencies of `id` that are not registered
    pub fn missing_dependencies(&self, id: &str) -> Vec<String> {
        self.manifests
            .get(id)
            .map(|m| {
                m.dependencies
                    .iter()
                    .filter(|dep| !self.manifests.contains_key(*dep))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn graph(&self) -> DiGraphMap<&str, ()> {
        let mut graph = DiGraphMap::new();
        for (id, manifest) in &self.manifests {
            graph.add_node(id.as_str());
            for dep in &manifest.dependencies {
                if let Some((dep_id, _)) = self.manifests.get_key_value(dep) {
                    graph.add_edge(dep_id.as_str(), id.as_str(), ());
                }
            }
        }
        graph
    }

    /// Every dependency cycle, each as a sorted list of member ids
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let graph = self.graph();
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut members: Vec<String> = scc.into_iter().map(str::to_string).collect();
                members.sort();
                members
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// The cycle `id` belongs to, if any
    pub fn cycle_containing(&self, id: &str) -> Option<Vec<String>> {
        self.cycles()
            .into_iter()
            .find(|members| members.iter().any(|m| m == id))
    }

    /// Registered plugins that list `id` as a direct dependency
    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.manifests
            .values()
            .filter(|m| m.dependencies.iter().any(|d| d == id))
            .map(|m| m.id.clone())
            .collect()
    }

    /// Plugins that can never start: cycle members, plugins with missing
    /// dependencies, and everything downstream of either.
    pub fn blocked(&self) -> BTreeSet<String> {
        let graph = self.graph();
        let mut blocked: BTreeSet<String> = self.cycles().into_iter().flatten().collect();
        for id in self.manifests.keys() {
            if !self.missing_dependencies(id).is_empty() {
                blocked.insert(id.clone());
            }
        }

        let mut frontier: Vec<String> = blocked.iter().cloned().collect();
        while let Some(id) = frontier.pop() {
            for dependent in graph.neighbors_directed(id.as_str(), petgraph::Direction::Outgoing) {
                if blocked.insert(dependent.to_string()) {
                    frontier.push(dependent.to_string());
                }
            }
        }
        blocked
    }

    /// Startable plugins grouped into levels.
    ///
    /// Every plugin's dependencies sit in earlier levels, so plugins within
    /// one level may start concurrently. Ids are sorted within a level.
    pub fn startup_levels(&self) -> Vec<Vec<String>> {
        let blocked = self.blocked();
        let mut remaining: BTreeMap<&str, usize> = self
            .manifests
            .iter()
            .filter(|(id, _)| !blocked.contains(*id))
            .map(|(id, m)| (id.as_str(), m.dependencies.len()))
            .collect();

        let mut levels = Vec::new();
        loop {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, pending)| **pending == 0)
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                break;
            }
            for id in &ready {
                remaining.remove(id);
            }
            for (id, pending) in remaining.iter_mut() {
                if let Some(manifest) = self.manifests.get(*id) {
                    let satisfied = manifest
                        .dependencies
                        .iter()
                        .filter(|d| ready.contains(&d.as_str()))
                        .count();
                    *pending -= satisfied;
                }
            }
            levels.push(ready.into_iter().map(str::to_string).collect());
        }
        levels
    }

    /// Flattened [`Self::startup_levels`]
    pub fn startup_order(&self) -> Vec<String> {
        self.startup_levels().into_iter().flatten().collect()
    }
}
