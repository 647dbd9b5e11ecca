//! The built-in switch action.
//!
//! A switch holds an ordered input list and a selector index. Entries can
//! be literal values or references to upstream actions; before a graph
//! executes, every switch disables the unselected referenced actions, then
//! walks their producers and disables any producer whose consumers have all
//! been disabled. Producers shared with the selected branch stay live, and
//! the walk never leaves the graph owning the switch.

use crate::action::{ActionType, ParamSpec};
use crate::error::ExecutionError;
use crate::graph::{ActionGraph, ActionId};
use crate::param::{ParamKind, Value};
use ahash::AHashSet;

/// Registered type name of the switch action.
pub const SWITCH_TYPE_NAME: &str = "SwitchAction";

pub(crate) const SELECTOR_PARAM: &str = "selector";
pub(crate) const INPUTS_PARAM: &str = "inputs";
pub(crate) const OUTPUT_PARAM: &str = "output";

/// Matches both bare and namespaced switch type names.
pub(crate) fn is_switch_type(type_name: &str) -> bool {
    type_name.rsplit(':').next() == Some(SWITCH_TYPE_NAME)
}

/// Builds the switch action type for registration.
pub(crate) fn switch_action_type() -> ActionType {
    ActionType::new(SWITCH_TYPE_NAME)
        .with_tag("util")
        .with_param(
            ParamSpec::input(
                SELECTOR_PARAM,
                ParamKind::Int {
                    min: Some(0),
                    max: None,
                },
            )
            .with_default(0i64),
        )
        .with_param(ParamSpec::input(INPUTS_PARAM, ParamKind::list()))
        .with_param(ParamSpec::output(OUTPUT_PARAM, ParamKind::Object))
        .with_run(|scope| {
            let selector = scope.input(SELECTOR_PARAM)?.as_int().unwrap_or(0);
            let inputs = match scope.input(INPUTS_PARAM)? {
                Value::List(items) => items,
                other => vec![other],
            };
            let index = validate_selector(scope.action_name(), selector, inputs.len())?;
            // Direct passthrough of the selected entry, no coercion.
            scope.set_output(OUTPUT_PARAM, inputs[index].clone())
        })
}

fn validate_selector(
    action: String,
    selector: i64,
    input_count: usize,
) -> Result<usize, ExecutionError> {
    if selector < 0 || selector as usize >= input_count {
        return Err(ExecutionError::SelectorOutOfRange {
            action,
            selector,
            input_count,
        });
    }
    Ok(selector as usize)
}

/// The pre-execution pass: force-disables the unselected input networks of
/// one switch. Performs no disabling at all when the selector is invalid.
pub(crate) fn disable_unselected_inputs(
    graph: &mut ActionGraph,
    switch_id: ActionId,
) -> Result<(), ExecutionError> {
    let action = graph.name(switch_id).to_string();
    let selector = read_param(graph, switch_id, SELECTOR_PARAM)?
        .as_int()
        .unwrap_or(0);
    let inputs = match read_param(graph, switch_id, INPUTS_PARAM)? {
        Value::List(items) => items,
        _ => Vec::new(),
    };
    if inputs.is_empty() {
        return Ok(());
    }
    let index = validate_selector(action, selector, inputs.len())?;

    let switch_parent = graph.parent(switch_id);
    let mut skipped: AHashSet<ActionId> = AHashSet::new();
    for (i, entry) in inputs.iter().enumerate() {
        if i == index {
            continue;
        }
        if let Value::ActionRef(reference) = entry
            && graph.contains(*reference)
            && graph.parent(*reference) == switch_parent
        {
            skip_object(graph, *reference, &mut skipped);
        }
    }
    Ok(())
}

/// Disables `obj`, then recursively disables its producers once all of
/// their consumers have been skipped.
fn skip_object(graph: &mut ActionGraph, obj: ActionId, skipped: &mut AHashSet<ActionId>) {
    graph.set_force_disable(obj, true);
    skipped.insert(obj);

    let boundary = graph.parent(obj);
    for upstream in graph.upstream_objects(obj) {
        if graph.parent(upstream) != boundary || skipped.contains(&upstream) {
            continue;
        }
        let consumers = graph.downstream_objects(upstream);
        if consumers.iter().all(|c| skipped.contains(c)) {
            skip_object(graph, upstream, skipped);
        }
    }
}

fn read_param(
    graph: &ActionGraph,
    id: ActionId,
    name: &str,
) -> Result<Value, ExecutionError> {
    let pref = graph
        .param(id, name)
        .ok_or_else(|| ExecutionError::ParamNotFound {
            action: graph.name(id).to_string(),
            param: name.to_string(),
        })?;
    graph
        .resolve(pref)
        .map_err(|e| ExecutionError::InputResolve {
            action: graph.name(id).to_string(),
            param: name.to_string(),
            message: e.to_string(),
        })
}
