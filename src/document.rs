//! Persisted graph documents.
//!
//! A document is the structural record of a graph: metadata, dynamic
//! parameter entries, the promotion table and the ordered child entries
//! with their values, scripts and connection descriptors. Documents
//! serialize to pretty JSON (`.agraph` files) and to a compact binary
//! snapshot. Static output values and action references are runtime state
//! and are not persisted.

use crate::error::{DocumentError, Error, GraphError, ParameterError, Result};
use crate::expr::OWNER_GRAPH_ALIAS;
use crate::graph::{ActionGraph, ActionId, ParamRef, Promotion};
use crate::param::{ParamKind, Value};
use crate::registry::Registry;
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File extension of serialized graph documents.
pub const GRAPH_EXT: &str = "agraph";

/// One parameter record of a persisted object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamEntry {
    pub name: String,
    pub kind: ParamKind,
    pub dynamic: bool,
    pub output: bool,
    pub editable: bool,
    pub default: Option<Value>,
    pub value: Option<Value>,
    pub script: Option<String>,
    /// `"alias.param"` path of the driving connection, if any.
    pub connected_from: Option<String>,
}

/// One promoted-parameter record: the mirror name on the graph and the
/// `"child.param"` path it stands in for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionEntry {
    pub name: String,
    pub target: String,
    pub output: bool,
}

/// A persisted action instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    pub name: String,
    pub type_name: String,
    pub parameters: Vec<ParamEntry>,
}

/// A persisted child: an action or a nested graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ObjectEntry {
    Action(ActionEntry),
    Graph(GraphDocument),
}

/// The persisted record of one graph level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub name: String,
    pub source: Option<String>,
    pub tags: Vec<String>,
    pub parameters: Vec<ParamEntry>,
    pub promotions: Vec<PromotionEntry>,
    pub objects: Vec<ObjectEntry>,
}

impl GraphDocument {
    /// Serializes a graph node (and its subtree) into a document.
    pub fn from_graph(graph: &ActionGraph, id: ActionId) -> Result<Self> {
        if !graph.is_graph(id) {
            return Err(GraphError::NotAGraph {
                name: graph.name(id).to_string(),
            }
            .into());
        }
        let mut objects = Vec::new();
        for &child in graph.children(id) {
            if graph.is_graph(child) {
                objects.push(ObjectEntry::Graph(Self::from_graph(graph, child)?));
            } else {
                objects.push(ObjectEntry::Action(ActionEntry {
                    name: graph.name(child).to_string(),
                    type_name: graph.type_name(child).to_string(),
                    parameters: param_entries(graph, child),
                }));
            }
        }
        let promotions = graph
            .promotions(id)
            .iter()
            .map(|p| PromotionEntry {
                name: p.name.clone(),
                target: format!(
                    "{}.{}",
                    graph.name(p.target.action),
                    graph
                        .param_at(p.target)
                        .map(|param| param.name.as_str())
                        .unwrap_or("?")
                ),
                output: p.output,
            })
            .collect();
        Ok(Self {
            name: graph.name(id).to_string(),
            source: graph.graph_source(id).map(str::to_string),
            tags: graph.tags(id).to_vec(),
            parameters: param_entries(graph, id),
            promotions,
            objects,
        })
    }

    /// Builds a fresh root graph from this document.
    pub fn instantiate(&self, registry: &Registry) -> Result<ActionGraph> {
        let mut graph = ActionGraph::new(&self.name);
        let root = graph.root();
        self.build_structure(&mut graph, root, registry)?;
        self.apply_values(&mut graph, root)?;
        Ok(graph)
    }

    /// Instantiates this document as a child graph of `parent`.
    pub fn instantiate_into(
        &self,
        graph: &mut ActionGraph,
        parent: ActionId,
        registry: &Registry,
        name: Option<&str>,
    ) -> Result<ActionId> {
        let id = graph.add_graph(parent, name.unwrap_or(&self.name))?;
        self.build_structure(graph, id, registry)?;
        self.apply_values(graph, id)?;
        Ok(id)
    }

    /// Creates every object and dynamic parameter, leaving values and
    /// wiring for the second pass so scripts can resolve their aliases.
    fn build_structure(
        &self,
        graph: &mut ActionGraph,
        id: ActionId,
        registry: &Registry,
    ) -> Result<()> {
        graph.set_tags(id, self.tags.clone())?;
        graph.set_graph_source(id, self.source.clone());
        create_dynamic_params(graph, id, &self.parameters)?;
        for obj in &self.objects {
            match obj {
                ObjectEntry::Action(entry) => {
                    let child =
                        registry.create_action(graph, id, &entry.type_name, Some(&entry.name))?;
                    create_dynamic_params(graph, child, &entry.parameters)?;
                }
                ObjectEntry::Graph(doc) => {
                    let child = graph.add_graph(id, &doc.name)?;
                    doc.build_structure(graph, child, registry)?;
                }
            }
        }
        Ok(())
    }

    fn apply_values(&self, graph: &mut ActionGraph, id: ActionId) -> Result<()> {
        apply_param_entries(graph, id, &self.parameters)?;
        for obj in &self.objects {
            match obj {
                ObjectEntry::Action(entry) => {
                    if let Some(child) = graph.child_by_name(id, &entry.name) {
                        apply_param_entries(graph, child, &entry.parameters)?;
                    }
                }
                ObjectEntry::Graph(doc) => {
                    if let Some(child) = graph.child_by_name(id, &doc.name) {
                        doc.apply_values(graph, child)?;
                    }
                }
            }
        }
        for entry in &self.promotions {
            if let Some((child_name, param_name)) = entry.target.split_once('.')
                && let Some(child) = graph.child_by_name(id, child_name)
                && let Some(target) = graph.param(child, param_name)
            {
                graph.restore_promotion(
                    id,
                    Promotion {
                        name: entry.name.clone(),
                        target,
                        output: entry.output,
                    },
                );
            }
        }
        Ok(())
    }

    /// Writes the document as pretty JSON. The `.agraph` extension is
    /// required.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        check_extension(path)?;
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(|e| io_error(path, e))?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|e| {
            Error::from(DocumentError::Format {
                message: e.to_string(),
            })
        })?;
        fs::write(path, text).map_err(|e| io_error(path, e))?;
        Ok(())
    }

    /// Reads a document from a JSON `.agraph` file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        check_extension(path)?;
        let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        serde_json::from_str(&text).map_err(|e| {
            DocumentError::Format {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Saves a compact binary snapshot of this document.
    pub fn save_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = encode_to_vec(self, standard()).map_err(|e| {
            Error::from(DocumentError::Binary {
                message: e.to_string(),
            })
        })?;
        fs::write(path, bytes).map_err(|e| io_error(path, e))?;
        Ok(())
    }

    /// Loads a document from a binary snapshot.
    pub fn load_binary(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
        decode_from_slice(&bytes, standard())
            .map(|(doc, _)| doc)
            .map_err(|e| {
                DocumentError::Binary {
                    message: e.to_string(),
                }
                .into()
            })
    }
}

fn check_extension(path: &Path) -> Result<()> {
    if path.extension().and_then(|e| e.to_str()) != Some(GRAPH_EXT) {
        return Err(DocumentError::Extension {
            path: path.display().to_string(),
        }
        .into());
    }
    Ok(())
}

fn io_error(path: &Path, e: std::io::Error) -> Error {
    DocumentError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
    .into()
}

fn param_entries(graph: &ActionGraph, id: ActionId) -> Vec<ParamEntry> {
    let mut entries = Vec::new();
    for pref in graph.param_refs(id) {
        let Some(param) = graph.param_at(pref) else {
            continue;
        };
        // Static outputs are recomputed by execution.
        if param.is_output && !param.dynamic {
            continue;
        }
        entries.push(ParamEntry {
            name: param.name.clone(),
            kind: param.kind.clone(),
            dynamic: param.dynamic,
            output: param.is_output,
            editable: param.editable,
            default: param.default.clone().map(sanitize_value),
            value: param.value.clone().map(sanitize_value),
            script: param.script.as_ref().map(|s| s.code().to_string()),
            connected_from: param
                .connected_from
                .map(|src| connection_path(graph, id, src)),
        });
    }
    entries
}

/// Action references are runtime wiring; they persist as nulls.
fn sanitize_value(value: Value) -> Value {
    match value {
        Value::ActionRef(_) => Value::Null,
        Value::List(items) => Value::List(items.into_iter().map(sanitize_value).collect()),
        Value::Dict(pairs) => Value::Dict(
            pairs
                .into_iter()
                .map(|(k, v)| (k, sanitize_value(v)))
                .collect(),
        ),
        other => other,
    }
}

fn connection_path(graph: &ActionGraph, owner: ActionId, src: ParamRef) -> String {
    let param_name = graph
        .param_at(src)
        .map(|p| p.name.as_str())
        .unwrap_or("?");
    let alias = if graph.parent(owner) == Some(src.action) {
        OWNER_GRAPH_ALIAS
    } else {
        graph.name(src.action)
    };
    format!("{}.{}", alias, param_name)
}

/// Resolves a persisted `"alias.param"` path back to a parameter. The
/// alias is searched as the owning graph marker first, then among the
/// owner's children (graph-interior connections), then among its siblings.
fn resolve_connection_source(
    graph: &ActionGraph,
    owner: ActionId,
    path: &str,
) -> Option<ParamRef> {
    let (alias, param_name) = path.split_once('.')?;
    let src_owner = if alias == OWNER_GRAPH_ALIAS {
        graph.parent(owner)?
    } else if let Some(child) = graph.child_by_name(owner, alias) {
        child
    } else {
        graph.child_by_name(graph.parent(owner)?, alias)?
    };
    graph.param(src_owner, param_name)
}

fn create_dynamic_params(
    graph: &mut ActionGraph,
    id: ActionId,
    entries: &[ParamEntry],
) -> Result<()> {
    for entry in entries {
        if !entry.dynamic {
            continue;
        }
        let pref = graph.add_dynamic_param(id, &entry.name, entry.kind.clone(), entry.output)?;
        graph.set_default(pref, entry.default.clone())?;
    }
    Ok(())
}

fn apply_param_entries(
    graph: &mut ActionGraph,
    owner: ActionId,
    entries: &[ParamEntry],
) -> Result<()> {
    for entry in entries {
        let Some(pref) = graph.param(owner, &entry.name) else {
            // The action type changed since this document was written.
            tracing::warn!(
                object = %graph.name(owner),
                param = %entry.name,
                "persisted parameter no longer exists"
            );
            continue;
        };
        if let Some(value) = &entry.value {
            match graph.set_value(pref, value.clone()) {
                Err(Error::Parameter(ParameterError::NotEditable { .. })) => {}
                other => other?,
            }
        }
        if let Some(path) = &entry.connected_from {
            if let Some(src) = resolve_connection_source(graph, owner, path) {
                graph.connect(src, pref)?;
            }
        } else if let Some(code) = &entry.script {
            graph.set_script(pref, code)?;
        }
        if !entry.editable {
            graph.set_editable(pref, false)?;
        }
    }
    Ok(())
}
