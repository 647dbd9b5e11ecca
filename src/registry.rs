//! The action registry: an explicit registration table mapping namespaced
//! type names to action factories and graph document sources. Registries
//! are plain values passed into the APIs that need them; there is no
//! process-wide state.

use crate::action::{ActionType, TAG_ACTION, TAG_GRAPH};
use crate::document::{GRAPH_EXT, GraphDocument};
use crate::error::{Error, RegistryError, Result};
use crate::graph::{ActionGraph, ActionId};
use crate::param::Parameter;
use crate::switch;
use ahash::AHashMap;
use itertools::Itertools;
use std::fs;
use std::path::{Path, PathBuf};

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Optional per-search-path manifest declaring the namespace.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Where a registered graph document lives.
#[derive(Debug, Clone)]
pub struct GraphSource {
    pub namespace: String,
    pub path: PathBuf,
}

/// A table of action types and graph sources, keyed by
/// `"namespace:Name"`. Bare names resolve through the default namespace
/// first, then fall back to a unique match across all namespaces.
pub struct Registry {
    actions: AHashMap<String, ActionType>,
    graphs: AHashMap<String, GraphSource>,
    search_paths: Vec<PathBuf>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry with the built-in types (`NullAction`, `SwitchAction`).
    pub fn new() -> Self {
        let mut registry = Self {
            actions: AHashMap::new(),
            graphs: AHashMap::new(),
            search_paths: Vec::new(),
        };
        registry.register_action(
            DEFAULT_NAMESPACE,
            ActionType::new("NullAction")
                .with_tag("util")
                .with_run(|_| Ok(())),
        );
        registry.register_action(DEFAULT_NAMESPACE, switch::switch_action_type());
        registry
    }

    /// Registers an action type under a namespace. The type name is
    /// re-qualified as `"namespace:Name"`.
    pub fn register_action(&mut self, namespace: &str, mut ty: ActionType) {
        let bare = ty
            .type_name
            .rsplit(':')
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| ty.type_name.clone());
        let key = format!("{}:{}", namespace, bare);
        ty.type_name = key.clone();
        self.actions.insert(key, ty);
    }

    fn resolve_key<'a, T>(
        table: &'a AHashMap<String, T>,
        name: &str,
        not_found: impl Fn() -> RegistryError,
    ) -> std::result::Result<&'a str, RegistryError> {
        if name.contains(':') {
            return match table.get_key_value(name) {
                Some((key, _)) => Ok(key.as_str()),
                None => Err(not_found()),
            };
        }
        let default_key = format!("{}:{}", DEFAULT_NAMESPACE, name);
        if let Some((key, _)) = table.get_key_value(&default_key) {
            return Ok(key.as_str());
        }
        let matches: Vec<&String> = table
            .keys()
            .filter(|key| key.rsplit(':').next() == Some(name))
            .collect();
        match matches.len() {
            0 => Err(not_found()),
            1 => Ok(matches[0].as_str()),
            _ => Err(RegistryError::Ambiguous {
                name: name.to_string(),
                namespaces: matches
                    .iter()
                    .filter_map(|key| key.split(':').next())
                    .sorted()
                    .join(", "),
            }),
        }
    }

    pub fn has_action(&self, name: &str) -> bool {
        Self::resolve_key(&self.actions, name, || RegistryError::ActionNotFound {
            name: name.to_string(),
        })
        .is_ok()
    }

    /// Looks up a registered action type.
    pub fn get_action(&self, name: &str) -> Result<&ActionType> {
        let key = Self::resolve_key(&self.actions, name, || RegistryError::ActionNotFound {
            name: name.to_string(),
        })?;
        self.actions
            .get(key)
            .ok_or_else(|| {
                RegistryError::ActionNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Instantiates an action of a registered type into a graph.
    pub fn create_action(
        &self,
        graph: &mut ActionGraph,
        parent: ActionId,
        type_name: &str,
        name: Option<&str>,
    ) -> Result<ActionId> {
        let ty = self.get_action(type_name)?;
        let bare = ty
            .type_name
            .rsplit(':')
            .next()
            .unwrap_or(ty.type_name.as_str());
        let instance_name = name.unwrap_or(bare);
        let params: Vec<Parameter> = ty.params.iter().map(|spec| spec.instantiate()).collect();
        graph.insert_action(
            parent,
            instance_name,
            ty.type_name.clone(),
            ty.tags.clone(),
            params,
            ty.exec_fns.clone(),
        )
    }

    /// Creates a fresh root graph.
    pub fn create_graph(&self, name: &str) -> ActionGraph {
        ActionGraph::new(name)
    }

    pub fn has_graph(&self, name: &str) -> bool {
        Self::resolve_key(&self.graphs, name, || RegistryError::GraphNotFound {
            name: name.to_string(),
        })
        .is_ok()
    }

    /// The namespace and document path of a registered graph source.
    pub fn get_graph(&self, name: &str) -> Result<(&str, &Path)> {
        let key = Self::resolve_key(&self.graphs, name, || RegistryError::GraphNotFound {
            name: name.to_string(),
        })?;
        let source = self.graphs.get(key).ok_or_else(|| {
            Error::from(RegistryError::GraphNotFound {
                name: name.to_string(),
            })
        })?;
        Ok((source.namespace.as_str(), source.path.as_path()))
    }

    /// Loads a registered graph document and instantiates it as a child of
    /// `parent`.
    pub fn instantiate_graph(
        &self,
        graph: &mut ActionGraph,
        parent: ActionId,
        source_name: &str,
        name: Option<&str>,
    ) -> Result<ActionId> {
        let (_, path) = self.get_graph(source_name)?;
        let doc = GraphDocument::read(path)?;
        let id = doc.instantiate_into(graph, parent, self, name)?;
        graph.set_graph_source(id, Some(source_name.to_string()));
        Ok(id)
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    /// Rescans the configured search paths for `.agraph` documents. The
    /// namespace of each path comes from its `manifest.json`, falling back
    /// to the default namespace.
    pub fn refresh(&mut self) {
        self.graphs.clear();
        let roots = self.search_paths.clone();
        for root in roots {
            if !root.is_dir() {
                tracing::warn!(path = %root.display(), "search path not found");
                continue;
            }
            let namespace = manifest_namespace(&root)
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
            let mut files = Vec::new();
            collect_graph_files(&root, &mut files);
            for file in files {
                let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                self.graphs.insert(
                    format!("{}:{}", namespace, stem),
                    GraphSource {
                        namespace: namespace.clone(),
                        path: file.clone(),
                    },
                );
            }
        }
    }

    /// Registered action types filtered by tag and/or a `*`/`?` wildcard
    /// pattern on the bare type name, sorted by full name.
    pub fn iter_actions(
        &self,
        tag: Option<&str>,
        name_match: Option<&str>,
    ) -> Vec<&ActionType> {
        self.actions
            .values()
            .filter(|ty| tag.is_none_or(|t| ty.has_tag(t)))
            .filter(|ty| {
                name_match.is_none_or(|pattern| {
                    let bare = ty
                        .type_name
                        .rsplit(':')
                        .next()
                        .unwrap_or(ty.type_name.as_str());
                    match_name(bare, pattern)
                })
            })
            .sorted_by(|a, b| a.type_name.cmp(&b.type_name))
            .collect()
    }

    /// All registered action type names, sorted.
    pub fn list_actions(&self) -> Vec<String> {
        self.actions.keys().cloned().sorted().collect()
    }

    /// All registered graph source names, sorted.
    pub fn list_graphs(&self) -> Vec<String> {
        self.graphs.keys().cloned().sorted().collect()
    }

    /// Every tag in use, plus the built-in action/graph markers.
    pub fn get_tags(&self) -> Vec<String> {
        self.actions
            .values()
            .flat_map(|ty| ty.tags.iter().cloned())
            .chain([TAG_ACTION.to_string(), TAG_GRAPH.to_string()])
            .sorted()
            .dedup()
            .collect()
    }
}

fn manifest_namespace(root: &Path) -> Option<String> {
    let text = fs::read_to_string(root.join(MANIFEST_FILE)).ok()?;
    let manifest: serde_json::Value = serde_json::from_str(&text).ok()?;
    manifest
        .get("namespace")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn collect_graph_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_graph_files(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some(GRAPH_EXT) {
            out.push(path);
        }
    }
}

/// Case-insensitive wildcard match supporting `*` and `?`.
pub(crate) fn match_name(name: &str, pattern: &str) -> bool {
    fn glob(name: &[u8], pattern: &[u8]) -> bool {
        match (pattern.first(), name.first()) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(b'*'), _) => {
                glob(name, &pattern[1..]) || (!name.is_empty() && glob(&name[1..], pattern))
            }
            (Some(b'?'), Some(_)) => glob(&name[1..], &pattern[1..]),
            (Some(p), Some(n)) if p == n => glob(&name[1..], &pattern[1..]),
            _ => false,
        }
    }
    glob(
        name.to_ascii_lowercase().as_bytes(),
        pattern.to_ascii_lowercase().as_bytes(),
    )
}
