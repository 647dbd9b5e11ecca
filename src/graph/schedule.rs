//! Dependency-ordered execution.
//!
//! The scheduler walks a graph's children depth-first, visiting each
//! object's upstream producers before the object itself, so the resulting
//! order is a valid topological order of the connection edges. Execution is
//! single threaded and non-preemptive: each callable runs to completion
//! before the next one starts, and the first failure propagates out.

use super::{ActionGraph, ActionId, NodeBody, ParamRef};
use crate::action::{ActionScope, ENABLED_PARAM_NAME, ExecStatus, RUN_EXEC};
use crate::error::{Error, Result};
use crate::param::Value;
use crate::switch;
use ahash::AHashSet;

impl ActionGraph {
    /// The execution status of an object under one exec mode.
    ///
    /// Graphs aggregate over their non-disabled children: any running child
    /// makes the graph `Running`, any failed child makes it `Fail`, and the
    /// graph is `Success` only when every child succeeded.
    pub fn get_status(&self, id: ActionId, exec_name: &str) -> ExecStatus {
        let Some(node) = self.node(id) else {
            return ExecStatus::None;
        };
        match &node.body {
            NodeBody::Action { .. } => node
                .status
                .get(exec_name)
                .copied()
                .unwrap_or(ExecStatus::None),
            NodeBody::Graph { .. } => {
                let mut success = 0usize;
                let mut total = 0usize;
                for child in self.sorted_children(id, true) {
                    match self.get_status(child, exec_name) {
                        ExecStatus::Running => return ExecStatus::Running,
                        ExecStatus::Fail => return ExecStatus::Fail,
                        ExecStatus::Success => success += 1,
                        ExecStatus::None => {}
                    }
                    total += 1;
                }
                if total > 0 && success == total {
                    ExecStatus::Success
                } else {
                    ExecStatus::None
                }
            }
        }
    }

    pub(crate) fn set_status(&mut self, id: ActionId, exec_name: &str, status: ExecStatus) {
        if let Some(node) = self.node_mut(id) {
            node.status.insert(exec_name.to_string(), status);
        }
    }

    fn clear_status_entry(&mut self, id: ActionId, exec_name: &str) {
        if let Some(node) = self.node_mut(id) {
            node.status.remove(exec_name);
        }
    }

    /// Clears the status entry for `exec_name` on an object and all of its
    /// descendants. Output parameter values are reset for the default mode
    /// so a re-run starts from a clean slate.
    pub fn reset_status(&mut self, id: ActionId, exec_name: &str) {
        if exec_name == RUN_EXEC {
            self.reset_output_parameters(id);
        }
        self.clear_status_entry(id, exec_name);
        let children: Vec<ActionId> = self.children(id).to_vec();
        for child in children {
            self.reset_status(child, exec_name);
        }
    }

    fn reset_output_parameters(&mut self, id: ActionId) {
        if let Some(node) = self.node_mut(id) {
            for param in &mut node.params {
                if param.is_output {
                    param.reset_value();
                }
            }
        }
    }

    /// The resolved builtin `enabled` flag; unresolvable flags count as
    /// enabled.
    pub(crate) fn enabled_value(&self, id: ActionId) -> bool {
        self.param(id, ENABLED_PARAM_NAME)
            .map(|pref| {
                self.resolve(pref)
                    .map(|v| v.is_truthy())
                    .unwrap_or(true)
            })
            .unwrap_or(true)
    }

    /// Children of a graph sorted by connection dependencies, creation
    /// order breaking ties. Disabled objects are left out when
    /// `skip_disabled` is set; their downstream objects still appear since
    /// complex wiring is not assumed to be one-to-one.
    pub fn sorted_children(&self, id: ActionId, skip_disabled: bool) -> Vec<ActionId> {
        let mut sorted = Vec::new();
        let mut marked: AHashSet<ActionId> = AHashSet::new();
        let mut skipped: AHashSet<ActionId> = AHashSet::new();
        let mut visiting: AHashSet<ActionId> = AHashSet::new();
        for &child in self.children(id) {
            self.mark_object(
                child,
                &mut sorted,
                &mut marked,
                &mut skipped,
                &mut visiting,
                skip_disabled,
            );
        }
        sorted
    }

    fn mark_object(
        &self,
        obj: ActionId,
        sorted: &mut Vec<ActionId>,
        marked: &mut AHashSet<ActionId>,
        skipped: &mut AHashSet<ActionId>,
        visiting: &mut AHashSet<ActionId>,
        skip_disabled: bool,
    ) {
        if marked.contains(&obj) || skipped.contains(&obj) || !visiting.insert(obj) {
            return;
        }
        let live = !(skip_disabled
            && (self.is_force_disabled(obj) || !self.enabled_value(obj)));

        for upstream in self.upstream_objects(obj) {
            if !marked.contains(&upstream) {
                self.mark_object(upstream, sorted, marked, skipped, visiting, skip_disabled);
            }
        }

        if live {
            sorted.push(obj);
            marked.insert(obj);
        } else {
            skipped.insert(obj);
        }
        visiting.remove(&obj);
    }

    /// Executes the root graph under the given exec mode.
    pub fn execute(&mut self, exec_name: &str) -> Result<()> {
        self.execute_node(self.root(), exec_name)
    }

    /// Executes one object (action or graph) under the given exec mode.
    pub fn execute_node(&mut self, id: ActionId, exec_name: &str) -> Result<()> {
        if self.is_graph(id) {
            self.execute_graph(id, exec_name)
        } else {
            self.execute_action(id, exec_name)
        }
    }

    fn execute_graph(&mut self, id: ActionId, exec_name: &str) -> Result<()> {
        let graph_name = self.long_name(id);
        tracing::debug!(graph = %graph_name, exec = exec_name, "graph execution started");

        for descendant in self.descendants(id) {
            self.set_force_disable(descendant, false);
        }

        // Every switch disables its unselected input networks up front.
        let switches = self.find_actions(id, Some(switch::SWITCH_TYPE_NAME), None, false);
        for switch_id in switches {
            switch::disable_unselected_inputs(self, switch_id).map_err(Error::Execution)?;
        }

        self.reset_status(id, exec_name);

        let iter_prefs: Vec<ParamRef> = self
            .param_refs(id)
            .into_iter()
            .filter(|pref| {
                self.param_at(*pref)
                    .map(|p| p.kind.is_iter())
                    .unwrap_or(false)
            })
            .collect();
        // The shortest iteration list bounds the pass count.
        let iter_count = if iter_prefs.is_empty() {
            1
        } else {
            iter_prefs
                .iter()
                .filter_map(|pref| self.param_at(*pref))
                .map(|p| match p.stored_value() {
                    Value::List(items) => items.len(),
                    _ => 0,
                })
                .min()
                .unwrap_or(1)
        };

        let order = self.sorted_children(id, true);
        for pass in 0..iter_count {
            for pref in &iter_prefs {
                if let Some(node) = self.node_mut(pref.action)
                    && let Some(param) = node.params.get_mut(pref.index)
                {
                    param.iter_id = pass;
                }
            }
            if pass > 0 {
                self.reset_status(id, exec_name);
            }
            for &obj in &order {
                self.execute_node(obj, exec_name)?;
            }
            tracing::debug!(graph = %graph_name, iteration = pass, "graph pass complete");
        }
        Ok(())
    }

    fn execute_action(&mut self, id: ActionId, exec_name: &str) -> Result<()> {
        if self.is_force_disabled(id) || !self.enabled_value(id) {
            tracing::debug!(action = %self.long_name(id), "action skipped");
            return Ok(());
        }
        let exec_fn = match self.node(id).map(|n| &n.body) {
            Some(NodeBody::Action { exec_fns }) => exec_fns.get(exec_name).cloned(),
            _ => None,
        };
        // An undeclared exec mode leaves the status untouched.
        let Some(exec_fn) = exec_fn else {
            return Ok(());
        };

        self.clear_status_entry(id, exec_name);
        self.set_status(id, exec_name, ExecStatus::Running);
        tracing::debug!(action = %self.long_name(id), exec = exec_name, "action started");

        let mut scope = ActionScope {
            graph: self,
            id,
            exec_name: exec_name.to_string(),
        };
        let result = exec_fn(&mut scope);

        match result {
            Ok(()) => {
                self.set_status(id, exec_name, ExecStatus::Success);
                tracing::debug!(action = %self.long_name(id), exec = exec_name, "action finished");
                Ok(())
            }
            Err(e) => {
                self.set_status(id, exec_name, ExecStatus::Fail);
                tracing::debug!(action = %self.long_name(id), exec = exec_name, error = %e, "action failed");
                Err(Error::Execution(e))
            }
        }
    }
}
