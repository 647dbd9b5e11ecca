//! The action graph: an arena of actions and nested graphs plus the
//! structural operations that wire them together.
//!
//! All objects live in a single arena owned by the root [`ActionGraph`].
//! Handles ([`ActionId`], [`ParamRef`]) are plain indices, so back
//! references (owner, parent graph) never form ownership cycles. Removed
//! slots are tombstoned; ids are never reused.

pub mod schedule;

use crate::action::{ExecFn, ExecStatus, builtin_params};
use crate::error::{ConnectionError, GraphError, ParameterError, Result};
use crate::expr::{SELF_PARAM_NAME, Script};
use crate::param::{ParamKind, Parameter, Value};
use crate::switch;
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

/// Handle to an action or graph in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(u32);

impl ActionId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Handle to one parameter of an arena object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamRef {
    pub action: ActionId,
    pub index: usize,
}

/// A promoted parameter record on a graph: the graph-level mirror name and
/// the child parameter it stands in for.
#[derive(Debug, Clone)]
pub struct Promotion {
    pub name: String,
    pub target: ParamRef,
    pub output: bool,
}

pub(crate) enum NodeBody {
    Action {
        exec_fns: AHashMap<String, ExecFn>,
    },
    Graph {
        children: Vec<ActionId>,
        promotions: Vec<Promotion>,
        source: Option<String>,
    },
}

pub(crate) struct Node {
    pub(crate) uuid: u64,
    pub(crate) name: String,
    pub(crate) type_name: String,
    pub(crate) tags: Vec<String>,
    pub(crate) params: Vec<Parameter>,
    pub(crate) status: AHashMap<String, ExecStatus>,
    pub(crate) parent: Option<ActionId>,
    pub(crate) force_disable: bool,
    pub(crate) body: NodeBody,
}

impl Node {
    fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }
}

const MAX_RESOLVE_DEPTH: usize = 64;

/// The arena container. Created with a root graph node; every action and
/// nested graph added afterwards lives in the same arena.
pub struct ActionGraph {
    nodes: Vec<Option<Node>>,
    root: ActionId,
    next_uuid: u64,
}

impl ActionGraph {
    /// Creates a new graph with an empty root node.
    pub fn new(name: &str) -> Self {
        let root_node = Node {
            uuid: 1,
            name: sanitize_name(name),
            type_name: String::new(),
            tags: Vec::new(),
            params: builtin_params(),
            status: AHashMap::new(),
            parent: None,
            force_disable: false,
            body: NodeBody::Graph {
                children: Vec::new(),
                promotions: Vec::new(),
                source: None,
            },
        };
        Self {
            nodes: vec![Some(root_node)],
            root: ActionId(0),
            next_uuid: 2,
        }
    }

    pub fn root(&self) -> ActionId {
        self.root
    }

    pub fn contains(&self, id: ActionId) -> bool {
        self.node(id).is_some()
    }

    pub(crate) fn node(&self, id: ActionId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(|slot| slot.as_ref())
    }

    pub(crate) fn node_mut(&mut self, id: ActionId) -> Option<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .and_then(|slot| slot.as_mut())
    }

    fn try_node(&self, id: ActionId) -> Result<&Node> {
        self.node(id).ok_or_else(|| GraphError::StaleId.into())
    }

    fn try_node_mut(&mut self, id: ActionId) -> Result<&mut Node> {
        self.node_mut(id).ok_or_else(|| GraphError::StaleId.into())
    }

    /// All live node ids, in arena order.
    pub(crate) fn live_ids(&self) -> Vec<ActionId> {
        (0..self.nodes.len() as u32)
            .map(ActionId)
            .filter(|id| self.contains(*id))
            .collect()
    }

    // --- basic queries

    /// The short name of an object ("" for a removed id).
    pub fn name(&self, id: ActionId) -> &str {
        self.node(id).map(|n| n.name.as_str()).unwrap_or("")
    }

    /// The colon-joined path from the root to this object.
    pub fn long_name(&self, id: ActionId) -> String {
        let mut parts = vec![self.name(id).to_string()];
        let mut cursor = self.parent(id);
        while let Some(p) = cursor {
            parts.push(self.name(p).to_string());
            cursor = self.parent(p);
        }
        parts.reverse();
        parts.join(":")
    }

    pub fn type_name(&self, id: ActionId) -> &str {
        self.node(id).map(|n| n.type_name.as_str()).unwrap_or("")
    }

    pub fn uuid(&self, id: ActionId) -> u64 {
        self.node(id).map(|n| n.uuid).unwrap_or(0)
    }

    pub fn tags(&self, id: ActionId) -> &[String] {
        self.node(id).map(|n| n.tags.as_slice()).unwrap_or(&[])
    }

    pub fn set_tags(&mut self, id: ActionId, tags: Vec<String>) -> Result<()> {
        self.try_node_mut(id)?.tags = tags;
        Ok(())
    }

    pub fn is_graph(&self, id: ActionId) -> bool {
        matches!(
            self.node(id).map(|n| &n.body),
            Some(NodeBody::Graph { .. })
        )
    }

    pub fn parent(&self, id: ActionId) -> Option<ActionId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// The direct children of a graph node, in creation order.
    pub fn children(&self, id: ActionId) -> &[ActionId] {
        match self.node(id).map(|n| &n.body) {
            Some(NodeBody::Graph { children, .. }) => children,
            _ => &[],
        }
    }

    pub fn child_by_name(&self, id: ActionId, name: &str) -> Option<ActionId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&child| self.name(child) == name)
    }

    pub fn child_count(&self, id: ActionId) -> usize {
        self.children(id).len()
    }

    /// Pre-order listing of a node's descendants (the node excluded).
    pub fn descendants(&self, id: ActionId) -> Vec<ActionId> {
        let mut out = Vec::new();
        let mut stack: Vec<ActionId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            for &child in self.children(next).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    pub fn promotions(&self, id: ActionId) -> &[Promotion] {
        match self.node(id).map(|n| &n.body) {
            Some(NodeBody::Graph { promotions, .. }) => promotions,
            _ => &[],
        }
    }

    pub(crate) fn graph_source(&self, id: ActionId) -> Option<&str> {
        match self.node(id).map(|n| &n.body) {
            Some(NodeBody::Graph { source, .. }) => source.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn set_graph_source(&mut self, id: ActionId, value: Option<String>) {
        if let Some(node) = self.node_mut(id)
            && let NodeBody::Graph { source, .. } = &mut node.body
        {
            *source = value;
        }
    }

    // --- structure

    /// Adds an empty nested graph under `parent`.
    pub fn add_graph(&mut self, parent: ActionId, name: &str) -> Result<ActionId> {
        let parent_node = self.try_node(parent)?;
        if !matches!(parent_node.body, NodeBody::Graph { .. }) {
            return Err(GraphError::NotAGraph {
                name: parent_node.name.clone(),
            }
            .into());
        }
        let name = self.unique_child_name(parent, name, None);
        let node = Node {
            uuid: self.take_uuid(),
            name,
            type_name: String::new(),
            tags: Vec::new(),
            params: builtin_params(),
            status: AHashMap::new(),
            parent: Some(parent),
            force_disable: false,
            body: NodeBody::Graph {
                children: Vec::new(),
                promotions: Vec::new(),
                source: None,
            },
        };
        self.push_node(parent, node)
    }

    /// Inserts an action node. The registry is the public path here.
    pub(crate) fn insert_action(
        &mut self,
        parent: ActionId,
        name: &str,
        type_name: String,
        tags: Vec<String>,
        mut params: Vec<Parameter>,
        exec_fns: AHashMap<String, ExecFn>,
    ) -> Result<ActionId> {
        let parent_node = self.try_node(parent)?;
        if !matches!(parent_node.body, NodeBody::Graph { .. }) {
            return Err(GraphError::NotAGraph {
                name: parent_node.name.clone(),
            }
            .into());
        }
        let mut all_params = builtin_params();
        all_params.append(&mut params);
        let name = self.unique_child_name(parent, name, None);
        let node = Node {
            uuid: self.take_uuid(),
            name,
            type_name,
            tags,
            params: all_params,
            status: AHashMap::new(),
            parent: Some(parent),
            force_disable: false,
            body: NodeBody::Action { exec_fns },
        };
        self.push_node(parent, node)
    }

    fn push_node(&mut self, parent: ActionId, node: Node) -> Result<ActionId> {
        let id = ActionId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        if let Some(parent_node) = self.node_mut(parent)
            && let NodeBody::Graph { children, .. } = &mut parent_node.body
        {
            children.push(id);
        }
        Ok(id)
    }

    fn take_uuid(&mut self) -> u64 {
        let uuid = self.next_uuid;
        self.next_uuid += 1;
        uuid
    }

    /// Renames an object. The final (possibly incremented) name is returned
    /// and every referencing script is rewritten.
    pub fn rename(&mut self, id: ActionId, new_name: &str) -> Result<String> {
        let old = self.try_node(id)?.name.clone();
        let new_name = match self.parent(id) {
            Some(parent) => self.unique_child_name(parent, new_name, Some(&old)),
            None => sanitize_name(new_name),
        };
        if new_name == old {
            return Ok(new_name);
        }
        self.try_node_mut(id)?.name = new_name.clone();

        let old_prefix = format!("{{{}.", old);
        let new_prefix = format!("{{{}.", new_name);
        let old_bare = format!("{{{}}}", old);
        let new_bare = format!("{{{}}}", new_name);
        for other in self.live_ids() {
            let Some(node) = self.node_mut(other) else {
                continue;
            };
            for param in &mut node.params {
                if let Some(script) = &mut param.script
                    && script.refs().iter().any(|r| r.action == id)
                {
                    script.replace_code(&old_prefix, &new_prefix);
                    script.replace_code(&old_bare, &new_bare);
                }
            }
        }
        Ok(new_name)
    }

    /// Removes an object and its descendants. Connections, scripts and
    /// promoted mirrors referencing the removed subtree are cleared.
    pub fn remove(&mut self, id: ActionId) -> Result<()> {
        if id == self.root {
            return Err(GraphError::RemoveRoot.into());
        }
        self.try_node(id)?;
        let mut removed: AHashSet<ActionId> = AHashSet::new();
        removed.insert(id);
        for descendant in self.descendants(id) {
            removed.insert(descendant);
        }

        // Promoted mirrors on the parent graph lose their targets.
        if let Some(parent) = self.parent(id) {
            let doomed: Vec<String> = self
                .promotions(parent)
                .iter()
                .filter(|p| removed.contains(&p.target.action))
                .map(|p| p.name.clone())
                .collect();
            for mirror in doomed {
                if let Some(pref) = self.param(parent, &mirror) {
                    self.remove_dynamic_param(pref)?;
                }
            }
            if let Some(node) = self.node_mut(parent)
                && let NodeBody::Graph {
                    children,
                    promotions,
                    ..
                } = &mut node.body
            {
                children.retain(|child| *child != id);
                promotions.retain(|p| !removed.contains(&p.target.action));
            }
        }

        // Clear dangling connections and scripts everywhere else.
        for other in self.live_ids() {
            if removed.contains(&other) {
                continue;
            }
            let Some(node) = self.node_mut(other) else {
                continue;
            };
            for param in &mut node.params {
                if let Some(src) = param.connected_from
                    && removed.contains(&src.action)
                {
                    param.connected_from = None;
                }
                if let Some(script) = &param.script
                    && script.refs().iter().any(|r| removed.contains(&r.action))
                {
                    param.script = None;
                    param.script_cache = None;
                }
            }
        }

        for dead in removed {
            self.nodes[dead.index()] = None;
        }
        Ok(())
    }

    /// Searches actions by type and/or name under a graph.
    pub fn find_actions(
        &self,
        from: ActionId,
        type_name: Option<&str>,
        name: Option<&str>,
        recursive: bool,
    ) -> Vec<ActionId> {
        let scope = if self.is_graph(from) {
            from
        } else {
            self.parent(from).unwrap_or(from)
        };
        let mut out = Vec::new();
        for &child in self.children(scope) {
            if self.is_graph(child) {
                if recursive {
                    out.extend(self.find_actions(child, type_name, name, recursive));
                }
                continue;
            }
            let full = self.type_name(child);
            let bare = full.rsplit(':').next().unwrap_or(full);
            let type_ok = type_name.is_none_or(|t| t == full || t == bare);
            let name_ok = name.is_none_or(|n| n == self.name(child));
            if type_ok && name_ok {
                out.push(child);
            }
        }
        out
    }

    // --- parameters

    /// Looks up a parameter by name.
    pub fn param(&self, id: ActionId, name: &str) -> Option<ParamRef> {
        self.node(id)
            .and_then(|n| n.param_index(name))
            .map(|index| ParamRef { action: id, index })
    }

    pub fn has_param(&self, id: ActionId, name: &str) -> bool {
        self.param(id, name).is_some()
    }

    /// Read access to a parameter record.
    pub fn param_at(&self, pref: ParamRef) -> Option<&Parameter> {
        self.node(pref.action).and_then(|n| n.params.get(pref.index))
    }

    fn param_mut(&mut self, pref: ParamRef) -> Option<&mut Parameter> {
        self.node_mut(pref.action)
            .and_then(|n| n.params.get_mut(pref.index))
    }

    /// All parameters of an object, in creation order.
    pub fn param_refs(&self, id: ActionId) -> Vec<ParamRef> {
        match self.node(id) {
            Some(node) => (0..node.params.len())
                .map(|index| ParamRef { action: id, index })
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn param_count(&self, id: ActionId) -> usize {
        self.node(id).map(|n| n.params.len()).unwrap_or(0)
    }

    /// "owner.param" display name used in error messages.
    pub(crate) fn full_param_name(&self, pref: ParamRef) -> String {
        let owner = self.name(pref.action);
        let param = self
            .param_at(pref)
            .map(|p| p.name.as_str())
            .unwrap_or("?");
        format!("{}.{}", owner, param)
    }

    /// Creates a runtime parameter on an action or graph.
    pub fn add_dynamic_param(
        &mut self,
        id: ActionId,
        name: &str,
        kind: ParamKind,
        output: bool,
    ) -> Result<ParamRef> {
        if kind.is_iter() && !self.is_graph(id) {
            return Err(ParameterError::IterOnAction.into());
        }
        if matches!(kind, ParamKind::Object) && !output {
            return Err(ParameterError::ObjectOutputOnly.into());
        }
        let node = self.try_node(id)?;
        let name = unique_param_name(node, &sanitize_name(name), None);
        let node = self.try_node_mut(id)?;
        let param = Parameter::new(name, kind, output).dynamic();
        node.params.push(param);
        Ok(ParamRef {
            action: id,
            index: node.params.len() - 1,
        })
    }

    /// Removes a dynamic parameter. Anything driven by it is disconnected;
    /// later parameter handles on the same object shift down by one.
    pub fn remove_dynamic_param(&mut self, pref: ParamRef) -> Result<()> {
        let param = self
            .param_at(pref)
            .ok_or(GraphError::StaleId)?;
        if !param.dynamic {
            return Err(ParameterError::NotDynamic {
                param: param.name.clone(),
            }
            .into());
        }
        let owner = pref.action;
        let removed_index = pref.index;

        for other in self.live_ids() {
            let Some(node) = self.node_mut(other) else {
                continue;
            };
            for p in &mut node.params {
                if let Some(src) = &mut p.connected_from
                    && src.action == owner
                {
                    if src.index == removed_index {
                        p.connected_from = None;
                    } else if src.index > removed_index {
                        src.index -= 1;
                    }
                }
                let drop_script = p
                    .script
                    .as_ref()
                    .is_some_and(|s| {
                        s.refs()
                            .iter()
                            .any(|r| r.action == owner && r.index == removed_index)
                    });
                if drop_script {
                    p.script = None;
                    p.script_cache = None;
                } else if let Some(script) = &mut p.script {
                    script.shift_refs(owner, removed_index);
                }
            }
            if let NodeBody::Graph { promotions, .. } = &mut node.body {
                promotions.retain(|p| {
                    !(p.target.action == owner && p.target.index == removed_index)
                });
                for p in promotions.iter_mut() {
                    if p.target.action == owner && p.target.index > removed_index {
                        p.target.index -= 1;
                    }
                }
            }
        }

        let node = self.try_node_mut(owner)?;
        node.params.remove(removed_index);
        Ok(())
    }

    /// Renames a dynamic parameter and rewrites referencing scripts.
    pub fn rename_param(&mut self, pref: ParamRef, new_name: &str) -> Result<String> {
        let param = self.param_at(pref).ok_or(GraphError::StaleId)?;
        if !param.dynamic {
            return Err(ParameterError::NotDynamic {
                param: param.name.clone(),
            }
            .into());
        }
        let old = param.name.clone();
        let node = self.try_node(pref.action)?;
        let new_name = unique_param_name(node, &sanitize_name(new_name), Some(&old));
        if new_name == old {
            return Ok(new_name);
        }
        if let Some(param) = self.param_mut(pref) {
            param.name = new_name.clone();
        }

        let old_suffix = format!(".{}}}", old);
        let new_suffix = format!(".{}}}", new_name);
        for other in self.live_ids() {
            let Some(node) = self.node_mut(other) else {
                continue;
            };
            for p in &mut node.params {
                if let Some(script) = &mut p.script
                    && script.refs().contains(&pref)
                {
                    script.replace_code(&old_suffix, &new_suffix);
                }
            }
        }
        Ok(new_name)
    }

    /// Sets a parameter value after conversion and range validation.
    /// A `Null` value clears the user value back to the default.
    pub fn set_value(&mut self, pref: ParamRef, value: Value) -> Result<()> {
        let param = self.param_at(pref).ok_or(GraphError::StaleId)?;
        if !param.editable {
            return Err(ParameterError::NotEditable {
                param: self.full_param_name(pref),
            }
            .into());
        }
        let adapted = if value.is_null() {
            None
        } else {
            Some(param.kind.adapt(&param.name, value)?)
        };
        if let Some(param) = self.param_mut(pref) {
            param.value = adapted;
            param.script_cache = None;
        }
        Ok(())
    }

    /// Sets the user default of a parameter.
    pub fn set_default(&mut self, pref: ParamRef, value: Option<Value>) -> Result<()> {
        let param = self.param_at(pref).ok_or(GraphError::StaleId)?;
        let adapted = match value {
            None => None,
            Some(v) => Some(param.kind.adapt(&param.name, v)?),
        };
        if let Some(param) = self.param_mut(pref) {
            param.default = adapted;
        }
        Ok(())
    }

    pub fn set_editable(&mut self, pref: ParamRef, editable: bool) -> Result<()> {
        let param = self.param_mut(pref).ok_or(GraphError::StaleId)?;
        param.editable = editable;
        Ok(())
    }

    /// Output write path used by execution callables: converts but never
    /// checks the editable flag.
    pub(crate) fn write_output(&mut self, pref: ParamRef, value: Value) -> Result<()> {
        let param = self.param_at(pref).ok_or(GraphError::StaleId)?;
        let adapted = if value.is_null() {
            None
        } else {
            Some(param.kind.adapt(&param.name, value)?)
        };
        if let Some(param) = self.param_mut(pref) {
            param.value = adapted;
            param.script_cache = None;
        }
        Ok(())
    }

    /// Sets the convenience `enabled` flag.
    pub fn set_enabled(&mut self, id: ActionId, enabled: bool) -> Result<()> {
        let pref = self
            .param(id, crate::action::ENABLED_PARAM_NAME)
            .ok_or(GraphError::StaleId)?;
        self.set_value(pref, Value::Bool(enabled))
    }

    pub fn is_force_disabled(&self, id: ActionId) -> bool {
        self.node(id).map(|n| n.force_disable).unwrap_or(false)
    }

    pub(crate) fn set_force_disable(&mut self, id: ActionId, state: bool) {
        if let Some(node) = self.node_mut(id) {
            node.force_disable = state;
        }
    }

    // --- resolution

    /// Resolves a parameter: connection first, then script, then the
    /// stored value (iteration parameters yield the current element).
    pub fn resolve(&self, pref: ParamRef) -> Result<Value> {
        self.resolve_depth(pref, 0)
    }

    pub(crate) fn resolve_depth(&self, pref: ParamRef, depth: usize) -> Result<Value> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(ConnectionError::DependencyLoop {
                param: self.full_param_name(pref),
            }
            .into());
        }
        let param = self.param_at(pref).ok_or(GraphError::StaleId)?;

        // The builtin message output stands for the owner itself.
        if param.is_output
            && param.name == SELF_PARAM_NAME
            && matches!(param.kind, ParamKind::Object)
        {
            return Ok(Value::ActionRef(pref.action));
        }

        if let Some(src) = param.connected_from {
            let value = self.resolve_depth(src, depth + 1)?;
            return param.kind.convert(&param.name, value).map_err(Into::into);
        }
        if let Some(script) = &param.script {
            return match script.evaluate(self, depth) {
                Ok(value) => param.kind.convert(&param.name, value).map_err(Into::into),
                Err(_) if param.script_cache.is_some() => {
                    Ok(param.script_cache.clone().unwrap_or(Value::Null))
                }
                Err(e) => Err(e),
            };
        }
        if param.kind.is_iter() {
            if let Value::List(items) = param.stored_value() {
                if items.is_empty() {
                    return Ok(Value::Null);
                }
                let cursor = param.iter_id.min(items.len() - 1);
                return Ok(items[cursor].clone());
            }
        }
        Ok(param.stored_value())
    }

    /// Resolves and refreshes the script cache. Used on the execution path
    /// so that disabled upstreams keep serving their last good value.
    pub(crate) fn resolve_cached(&mut self, pref: ParamRef) -> Result<Value> {
        let value = self.resolve(pref)?;
        if let Some(param) = self.param_mut(pref)
            && param.script.is_some()
        {
            param.script_cache = Some(value.clone());
        }
        Ok(value)
    }

    // --- wiring

    /// Connects `src` into `dst`. Fails fast on incompatible kinds, illegal
    /// endpoints, cross-graph edges, conflicting drivers and cycles.
    pub fn connect(&mut self, src: ParamRef, dst: ParamRef) -> Result<()> {
        let src_param = self.param_at(src).ok_or(GraphError::StaleId)?;
        let dst_param = self.param_at(dst).ok_or(GraphError::StaleId)?;
        let src_name = self.full_param_name(src);
        let dst_name = self.full_param_name(dst);

        if !dst_param.editable {
            return Err(ParameterError::NotEditable { param: dst_name }.into());
        }
        if !dst_param.kind.accepts(&src_param.kind) {
            return Err(ConnectionError::Incompatible {
                src: src_name,
                target: dst_name,
            }
            .into());
        }

        let src_owner = src.action;
        let dst_owner = dst.action;
        // Boundary exceptions: a graph feeding its own child, and a child
        // feeding its owning graph's output.
        let exception_in = self.parent(dst_owner) == Some(src_owner) && !src_param.is_output;
        let exception_out = self.parent(src_owner) == Some(dst_owner) && dst_param.is_output;

        if dst_param.is_output && !exception_out {
            return Err(ConnectionError::NotAnInput { target: dst_name }.into());
        }
        if !exception_in
            && !exception_out
            && self.parent(src_owner) != self.parent(dst_owner)
        {
            return Err(ConnectionError::CrossGraph {
                src: src_name,
                target: dst_name,
            }
            .into());
        }
        if dst_param.has_input() {
            return Err(ConnectionError::AlreadyConnected { target: dst_name }.into());
        }
        if !exception_in
            && !exception_out
            && src_owner != dst_owner
            && self.upstream_closure(src_owner).contains(&dst_owner)
        {
            return Err(ConnectionError::Cycle {
                src: src_name,
                target: dst_name,
            }
            .into());
        }

        if let Some(param) = self.param_mut(dst) {
            param.connected_from = Some(src);
            param.script_cache = None;
        }
        Ok(())
    }

    /// Removes the direct connection driving `dst`, if any.
    pub fn disconnect(&mut self, dst: ParamRef) -> Result<()> {
        let param = self.param_mut(dst).ok_or(GraphError::StaleId)?;
        param.connected_from = None;
        Ok(())
    }

    /// Compiles and installs a script override on `dst`.
    pub fn set_script(&mut self, dst: ParamRef, code: &str) -> Result<()> {
        let param = self.param_at(dst).ok_or(GraphError::StaleId)?;
        if !param.editable {
            return Err(ParameterError::NotEditable {
                param: self.full_param_name(dst),
            }
            .into());
        }
        if param.connected_from.is_some() {
            return Err(ConnectionError::ConflictingDriver {
                target: self.full_param_name(dst),
            }
            .into());
        }
        let script = Script::compile(code, self, dst)?;
        for r in script.refs() {
            let ref_owner = r.action;
            if ref_owner == dst.action || self.parent(ref_owner) != self.parent(dst.action) {
                continue;
            }
            if self.upstream_closure(ref_owner).contains(&dst.action) {
                return Err(ConnectionError::Cycle {
                    src: self.full_param_name(*r),
                    target: self.full_param_name(dst),
                }
                .into());
            }
        }
        if let Some(param) = self.param_mut(dst) {
            param.script = Some(script);
            param.script_cache = None;
        }
        Ok(())
    }

    /// Removes the script override on `dst`, optionally baking its last
    /// result into the stored value.
    pub fn clear_script(&mut self, dst: ParamRef, bake: bool) -> Result<()> {
        self.param_at(dst).ok_or(GraphError::StaleId)?;
        let baked = if bake { self.resolve(dst).ok() } else { None };
        if let Some(param) = self.param_mut(dst) {
            param.script = None;
            param.script_cache = None;
        }
        if let Some(value) = baked {
            let param = self.param_at(dst).ok_or(GraphError::StaleId)?;
            if let Ok(adapted) = param.kind.adapt(&param.name, value)
                && let Some(param) = self.param_mut(dst)
            {
                param.value = Some(adapted);
            }
        }
        Ok(())
    }

    /// Promotes a child parameter onto the owning graph: a mirroring
    /// dynamic parameter is created there and wired to the original.
    pub fn promote(&mut self, child: ParamRef, name: Option<&str>) -> Result<ParamRef> {
        let owner = child.action;
        let parent = self.parent(owner).ok_or_else(|| GraphError::NoParent {
            name: self.name(owner).to_string(),
        })?;
        let param = self.param_at(child).ok_or(GraphError::StaleId)?;
        let output = param.is_output;
        if !output && param.has_input() {
            return Err(ConnectionError::AlreadyConnected {
                target: self.full_param_name(child),
            }
            .into());
        }
        let mirror_name = name.unwrap_or(&param.name).to_string();
        if self.has_param(parent, &mirror_name) {
            return Err(ParameterError::Duplicate {
                param: mirror_name,
                owner: self.name(parent).to_string(),
            }
            .into());
        }
        let kind = param.kind.clone();
        let default = param.default.clone();
        let value = param.value.clone();

        let mirror = self.add_dynamic_param(parent, &mirror_name, kind, output)?;
        self.set_default(mirror, default)?;
        if output {
            self.connect(child, mirror)?;
        } else {
            if let (Some(v), Some(p)) = (value, self.param_mut(mirror)) {
                p.value = Some(v);
            }
            self.connect(mirror, child)?;
        }
        let final_name = self
            .param_at(mirror)
            .map(|p| p.name.clone())
            .unwrap_or(mirror_name);
        if let Some(node) = self.node_mut(parent)
            && let NodeBody::Graph { promotions, .. } = &mut node.body
        {
            promotions.push(Promotion {
                name: final_name,
                target: child,
                output,
            });
        }
        Ok(mirror)
    }

    /// Re-registers a promotion record rebuilt from a persisted document.
    pub(crate) fn restore_promotion(&mut self, id: ActionId, promotion: Promotion) {
        if let Some(node) = self.node_mut(id)
            && let NodeBody::Graph { promotions, .. } = &mut node.body
        {
            promotions.push(promotion);
        }
    }

    // --- dependency edges

    /// Sibling objects feeding `id` through connections, scripts or switch
    /// input references.
    pub(crate) fn upstream_objects(&self, id: ActionId) -> Vec<ActionId> {
        let Some(parent) = self.parent(id) else {
            return Vec::new();
        };
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        let mut seen: AHashSet<ActionId> = AHashSet::new();
        let mut out = Vec::new();
        let mut consider = |owner: ActionId, out: &mut Vec<ActionId>| {
            if owner != id && self.parent(owner) == Some(parent) && seen.insert(owner) {
                out.push(owner);
            }
        };
        for param in &node.params {
            if let Some(src) = param.connected_from {
                consider(src.action, &mut out);
            }
            if let Some(script) = &param.script {
                for r in script.refs() {
                    consider(r.action, &mut out);
                }
            }
        }
        if switch::is_switch_type(&node.type_name)
            && let Some(index) = node.param_index(switch::INPUTS_PARAM)
            && let Value::List(items) = node.params[index].stored_value()
        {
            for item in items {
                if let Value::ActionRef(r) = item {
                    consider(r, &mut out);
                }
            }
        }
        out
    }

    /// Sibling objects consuming any of `id`'s parameters.
    pub(crate) fn downstream_objects(&self, id: ActionId) -> Vec<ActionId> {
        let Some(parent) = self.parent(id) else {
            return Vec::new();
        };
        self.children(parent)
            .iter()
            .copied()
            .filter(|&sibling| sibling != id && self.upstream_objects(sibling).contains(&id))
            .collect()
    }

    /// All transitive upstream siblings of `id`.
    pub(crate) fn upstream_closure(&self, id: ActionId) -> AHashSet<ActionId> {
        let mut closure: AHashSet<ActionId> = AHashSet::new();
        let mut stack = self.upstream_objects(id);
        while let Some(next) = stack.pop() {
            if closure.insert(next) {
                stack.extend(self.upstream_objects(next));
            }
        }
        closure
    }

    // --- naming helpers

    fn unique_child_name(&self, parent: ActionId, name: &str, exclude: Option<&str>) -> String {
        let base = sanitize_name(name);
        let taken: Vec<&str> = self
            .children(parent)
            .iter()
            .map(|&c| self.name(c))
            .filter(|n| Some(*n) != exclude)
            .collect();
        next_available(&base, &taken)
    }
}

fn unique_param_name(node: &Node, base: &str, exclude: Option<&str>) -> String {
    let taken: Vec<&str> = node
        .params
        .iter()
        .map(|p| p.name.as_str())
        .filter(|n| Some(*n) != exclude)
        .collect();
    next_available(base, &taken)
}

fn next_available(base: &str, taken: &[&str]) -> String {
    if !taken.contains(&base) {
        return base.to_string();
    }
    let mut i = 1;
    loop {
        let candidate = format!("{}{}", base, i);
        if !taken.contains(&candidate.as_str()) {
            return candidate;
        }
        i += 1;
    }
}

/// Keeps names to alphanumerics and underscores; a leading digit gets an
/// underscore prefix.
pub(crate) fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        return "object".to_string();
    }
    if cleaned.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return format!("_{}", cleaned);
    }
    cleaned
}
