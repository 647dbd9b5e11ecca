//! Switch selection and skip propagation.
mod common;
use protostar::prelude::*;

/// `a -> b -> switch([b, 7])` plus the handles needed by the assertions.
fn switch_chain(
    registry: &Registry,
    graph: &mut ActionGraph,
) -> (ActionId, ActionId, ActionId, ParamRef, ParamRef) {
    let (a, b, _, _) = common::linked_pair(registry, graph).unwrap();
    let root = graph.root();
    let switch = registry
        .create_action(graph, root, SWITCH_TYPE_NAME, Some("switch"))
        .unwrap();
    let inputs = graph.param(switch, "inputs").unwrap();
    graph
        .set_value(
            inputs,
            Value::List(vec![Value::ActionRef(b), Value::Int(7)]),
        )
        .unwrap();
    let selector = graph.param(switch, "selector").unwrap();
    (a, b, switch, selector, inputs)
}

#[test]
fn selected_branch_stays_live() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let (a, b, switch, selector, _) = switch_chain(&registry, &mut graph);

    graph.set_value(selector, Value::Int(0)).unwrap();
    graph.execute(RUN_EXEC).unwrap();

    assert!(!graph.is_force_disabled(a));
    assert!(!graph.is_force_disabled(b));
    assert_eq!(graph.get_status(b, RUN_EXEC), ExecStatus::Success);
    // Passthrough of the selected entry: the reference itself.
    let output = graph.param(switch, "output").unwrap();
    assert_eq!(graph.resolve(output).unwrap(), Value::ActionRef(b));
}

#[test]
fn unselected_branch_is_disabled_recursively() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let (a, b, switch, selector, _) = switch_chain(&registry, &mut graph);

    graph.set_value(selector, Value::Int(1)).unwrap();
    graph.execute(RUN_EXEC).unwrap();

    // b is unselected; a's only consumer is b, so it cascades.
    assert!(graph.is_force_disabled(b));
    assert!(graph.is_force_disabled(a));
    assert_eq!(graph.get_status(a, RUN_EXEC), ExecStatus::None);
    assert_eq!(graph.get_status(b, RUN_EXEC), ExecStatus::None);

    let output = graph.param(switch, "output").unwrap();
    assert_eq!(graph.resolve(output).unwrap(), Value::Int(7));

    // Re-selecting the branch re-enables everything on the next run.
    graph.set_value(selector, Value::Int(0)).unwrap();
    graph.execute(RUN_EXEC).unwrap();
    assert!(!graph.is_force_disabled(a));
    assert!(!graph.is_force_disabled(b));
    assert_eq!(graph.get_status(b, RUN_EXEC), ExecStatus::Success);
}

#[test]
fn shared_producers_survive() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let producer = registry
        .create_action(&mut graph, root, "NullAction", Some("producer"))
        .unwrap();
    let selected = registry
        .create_action(&mut graph, root, "NullAction", Some("selected"))
        .unwrap();
    let unselected = registry
        .create_action(&mut graph, root, "NullAction", Some("unselected"))
        .unwrap();

    let out = graph
        .add_dynamic_param(producer, "value", ParamKind::int(), true)
        .unwrap();
    let sel_in = graph
        .add_dynamic_param(selected, "value", ParamKind::int(), false)
        .unwrap();
    let unsel_in = graph
        .add_dynamic_param(unselected, "value", ParamKind::int(), false)
        .unwrap();
    graph.connect(out, sel_in).unwrap();
    graph.connect(out, unsel_in).unwrap();

    let switch = registry
        .create_action(&mut graph, root, SWITCH_TYPE_NAME, Some("switch"))
        .unwrap();
    graph
        .set_value(
            graph.param(switch, "inputs").unwrap(),
            Value::List(vec![
                Value::ActionRef(selected),
                Value::ActionRef(unselected),
            ]),
        )
        .unwrap();
    graph
        .set_value(graph.param(switch, "selector").unwrap(), Value::Int(0))
        .unwrap();

    graph.execute(RUN_EXEC).unwrap();

    assert!(graph.is_force_disabled(unselected));
    assert!(!graph.is_force_disabled(selected));
    // The producer still feeds the selected branch.
    assert!(!graph.is_force_disabled(producer));
    assert_eq!(graph.get_status(producer, RUN_EXEC), ExecStatus::Success);
}

#[test]
fn out_of_range_selector_fails_without_side_effects() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let (a, b, _, selector, _) = switch_chain(&registry, &mut graph);

    graph.set_value(selector, Value::Int(5)).unwrap();
    let err = graph.execute(RUN_EXEC).unwrap_err();
    assert!(matches!(
        err,
        Error::Execution(ExecutionError::SelectorOutOfRange {
            selector: 5,
            input_count: 2,
            ..
        })
    ));
    // The failed validation performed no disabling.
    assert!(!graph.is_force_disabled(a));
    assert!(!graph.is_force_disabled(b));

    // Negative selectors never even reach execution.
    let err = graph.set_value(selector, Value::Int(-1)).unwrap_err();
    assert!(matches!(
        err,
        Error::Parameter(ParameterError::OutOfRange { .. })
    ));
}

#[test]
fn literal_only_switch_passes_through() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let switch = registry
        .create_action(&mut graph, root, SWITCH_TYPE_NAME, Some("switch"))
        .unwrap();
    graph
        .set_value(
            graph.param(switch, "inputs").unwrap(),
            Value::List(vec![Value::Str("low".into()), Value::Str("high".into())]),
        )
        .unwrap();
    graph
        .set_value(graph.param(switch, "selector").unwrap(), Value::Int(1))
        .unwrap();

    graph.execute(RUN_EXEC).unwrap();
    assert_eq!(
        graph
            .resolve(graph.param(switch, "output").unwrap())
            .unwrap(),
        Value::Str("high".into())
    );
}

#[test]
fn empty_inputs_fail_at_run_only() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let switch = registry
        .create_action(&mut graph, root, SWITCH_TYPE_NAME, Some("switch"))
        .unwrap();

    // The pre-pass tolerates an empty list; the run callable does not.
    let err = graph.execute(RUN_EXEC).unwrap_err();
    assert!(matches!(
        err,
        Error::Execution(ExecutionError::SelectorOutOfRange {
            input_count: 0,
            ..
        })
    ));
    assert_eq!(graph.get_status(switch, RUN_EXEC), ExecStatus::Fail);
}
