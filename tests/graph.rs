//! Graph structure, wiring, scripts, scheduling and status tracking.
mod common;
use protostar::prelude::*;

#[test]
fn direct_connection_resolves_upstream() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let (_, _, a_out, b_in) = common::linked_pair(&registry, &mut graph).unwrap();

    graph.set_value(a_out, Value::Int(3)).unwrap();
    assert_eq!(graph.resolve(b_in).unwrap(), Value::Int(3));

    // A second driver on the same target is rejected.
    let err = graph.connect(a_out, b_in).unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::AlreadyConnected { .. })
    ));
    graph.disconnect(b_in).unwrap();
    assert_eq!(graph.resolve(b_in).unwrap(), Value::Int(0));
}

#[test]
fn connection_converts_to_target_kind() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let a = registry
        .create_action(&mut graph, root, "NullAction", Some("a"))
        .unwrap();
    let b = registry
        .create_action(&mut graph, root, "NullAction", Some("b"))
        .unwrap();
    let a_out = graph
        .add_dynamic_param(a, "num", ParamKind::int(), true)
        .unwrap();
    let b_text = graph
        .add_dynamic_param(b, "text", ParamKind::Str, false)
        .unwrap();

    graph.connect(a_out, b_text).unwrap();
    graph.set_value(a_out, Value::Int(3)).unwrap();
    assert_eq!(graph.resolve(b_text).unwrap(), Value::Str("3".into()));

    // Strings cannot feed an int parameter.
    let b_num = graph
        .add_dynamic_param(b, "num", ParamKind::int(), false)
        .unwrap();
    let a_text = graph
        .add_dynamic_param(a, "text", ParamKind::Str, true)
        .unwrap();
    let err = graph.connect(a_text, b_num).unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::Incompatible { .. })
    ));
}

#[test]
fn connection_cycles_are_rejected() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let (a, b, _, _) = common::linked_pair(&registry, &mut graph).unwrap();

    let b_out = graph
        .add_dynamic_param(b, "feedback", ParamKind::int(), true)
        .unwrap();
    let a_in = graph
        .add_dynamic_param(a, "feedback", ParamKind::int(), false)
        .unwrap();
    let err = graph.connect(b_out, a_in).unwrap_err();
    assert!(matches!(err, Error::Connection(ConnectionError::Cycle { .. })));

    // The same rule applies to scripts.
    let err = graph.set_script(a_in, "{b.feedback} + 1").unwrap_err();
    assert!(matches!(err, Error::Connection(ConnectionError::Cycle { .. })));
}

#[test]
fn scripts_evaluate_against_siblings() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let a = registry
        .create_action(&mut graph, root, "NullAction", Some("actionA"))
        .unwrap();
    let b = registry
        .create_action(&mut graph, root, "NullAction", Some("actionB"))
        .unwrap();
    let c = registry
        .create_action(&mut graph, root, "NullAction", Some("actionC"))
        .unwrap();

    let pa = graph
        .add_dynamic_param(a, "paramA", ParamKind::int(), true)
        .unwrap();
    graph.set_value(pa, Value::Int(3)).unwrap();
    let pb = graph
        .add_dynamic_param(b, "paramB", ParamKind::int(), true)
        .unwrap();
    graph.set_value(pb, Value::Int(1)).unwrap();
    let pc = graph
        .add_dynamic_param(c, "paramC", ParamKind::Str, false)
        .unwrap();

    graph
        .set_script(pc, "{actionA.paramA} + {actionB.paramB}")
        .unwrap();
    assert_eq!(graph.resolve(pc).unwrap(), Value::Str("4".into()));

    graph.set_value(pa, Value::Int(4)).unwrap();
    graph.set_value(pb, Value::Int(2)).unwrap();
    assert_eq!(graph.resolve(pc).unwrap(), Value::Str("6".into()));

    // Unknown references fail at assignment time.
    let err = graph.set_script(pc, "{ghost.paramA}").unwrap_err();
    assert!(matches!(err, Error::Script(ScriptError::UnknownAlias { .. })));
    let err = graph.set_script(pc, "{actionA.ghost}").unwrap_err();
    assert!(matches!(err, Error::Script(ScriptError::UnknownParam { .. })));

    // Unparseable scripts on string parameters degrade to raw text.
    graph.set_script(pc, "a + b").unwrap();
    assert_eq!(graph.resolve(pc).unwrap(), Value::Str("a + b".into()));

    // Template substitution around a placeholder.
    graph.set_script(pc, "id_{actionA.paramA}_suffix").unwrap();
    assert_eq!(graph.resolve(pc).unwrap(), Value::Str("id_4_suffix".into()));
}

#[test]
fn renames_rewrite_dependent_scripts() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let a = registry
        .create_action(&mut graph, root, "NullAction", Some("actionA"))
        .unwrap();
    let c = registry
        .create_action(&mut graph, root, "NullAction", Some("actionC"))
        .unwrap();

    let pa = graph
        .add_dynamic_param(a, "paramA", ParamKind::int(), true)
        .unwrap();
    graph.set_value(pa, Value::Int(5)).unwrap();
    let pc = graph
        .add_dynamic_param(c, "paramC", ParamKind::int(), false)
        .unwrap();
    graph.set_script(pc, "{actionA.paramA} * 2").unwrap();
    assert_eq!(graph.resolve(pc).unwrap(), Value::Int(10));

    // Rename the action: the script keeps working and its code follows.
    graph.rename(a, "generator").unwrap();
    assert_eq!(graph.resolve(pc).unwrap(), Value::Int(10));
    let code = graph
        .param_at(pc)
        .unwrap()
        .script
        .as_ref()
        .unwrap()
        .code()
        .to_string();
    assert_eq!(code, "{generator.paramA} * 2");

    // Same for parameter renames.
    graph.rename_param(pa, "seed").unwrap();
    assert_eq!(graph.resolve(pc).unwrap(), Value::Int(10));
    let code = graph
        .param_at(pc)
        .unwrap()
        .script
        .as_ref()
        .unwrap()
        .code()
        .to_string();
    assert_eq!(code, "{generator.seed} * 2");
}

#[test]
fn execution_runs_in_dependency_order() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();

    // sink depends on mid, mid on src; created in reverse order.
    let sink = registry
        .create_action(&mut graph, root, "AddAction", Some("sink"))
        .unwrap();
    let mid = registry
        .create_action(&mut graph, root, "AddAction", Some("mid"))
        .unwrap();
    let src = registry
        .create_action(&mut graph, root, "AddAction", Some("src"))
        .unwrap();

    graph
        .set_value(graph.param(src, "a").unwrap(), Value::Float(1.0))
        .unwrap();
    graph
        .set_value(graph.param(src, "b").unwrap(), Value::Float(2.0))
        .unwrap();
    graph
        .connect(graph.param(src, "sum").unwrap(), graph.param(mid, "a").unwrap())
        .unwrap();
    graph
        .set_value(graph.param(mid, "b").unwrap(), Value::Float(10.0))
        .unwrap();
    graph
        .connect(graph.param(mid, "sum").unwrap(), graph.param(sink, "a").unwrap())
        .unwrap();
    graph
        .set_value(graph.param(sink, "b").unwrap(), Value::Float(100.0))
        .unwrap();

    graph.execute(RUN_EXEC).unwrap();
    assert_eq!(
        graph.resolve(graph.param(sink, "sum").unwrap()).unwrap(),
        Value::Float(113.0)
    );
    for id in [src, mid, sink] {
        assert_eq!(graph.get_status(id, RUN_EXEC), ExecStatus::Success);
    }
    assert_eq!(graph.get_status(root, RUN_EXEC), ExecStatus::Success);
}

#[test]
fn reset_clears_stale_status() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let adder = registry
        .create_action(&mut graph, root, "AddAction", Some("adder"))
        .unwrap();
    graph
        .set_value(graph.param(adder, "a").unwrap(), Value::Float(2.0))
        .unwrap();
    graph
        .set_value(graph.param(adder, "b").unwrap(), Value::Float(4.3))
        .unwrap();

    graph.execute(RUN_EXEC).unwrap();
    assert_eq!(graph.get_status(adder, RUN_EXEC), ExecStatus::Success);
    assert_eq!(
        graph.resolve(graph.param(adder, "sum").unwrap()).unwrap(),
        Value::Float(6.3)
    );

    graph.reset_status(root, RUN_EXEC);
    assert_eq!(graph.get_status(adder, RUN_EXEC), ExecStatus::None);
    assert_eq!(graph.get_status(root, RUN_EXEC), ExecStatus::None);
    // Output values are cleared alongside the default-mode status.
    assert_eq!(
        graph.resolve(graph.param(adder, "sum").unwrap()).unwrap(),
        Value::Float(0.0)
    );

    graph.execute(RUN_EXEC).unwrap();
    assert_eq!(graph.get_status(adder, RUN_EXEC), ExecStatus::Success);
}

#[test]
fn custom_exec_modes_are_independent() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let adder = registry
        .create_action(&mut graph, root, "AddAction", Some("adder"))
        .unwrap();
    let stamp = registry
        .create_action(&mut graph, root, "StampAction", Some("stamp"))
        .unwrap();
    graph
        .set_value(graph.param(adder, "a").unwrap(), Value::Float(2.0))
        .unwrap();
    graph
        .set_value(graph.param(adder, "b").unwrap(), Value::Float(4.3))
        .unwrap();

    assert_eq!(
        registry.get_action("StampAction").unwrap().custom_exec_names(),
        vec!["bake".to_string()]
    );

    // An undeclared mode is silently skipped, declared modes run.
    graph.execute("bake").unwrap();
    assert_eq!(graph.get_status(adder, "bake"), ExecStatus::None);
    assert_eq!(graph.get_status(stamp, "bake"), ExecStatus::Success);
    assert_eq!(
        graph.resolve(graph.param(stamp, "stamp").unwrap()).unwrap(),
        Value::Str("baked".into())
    );
    // The mixed outcome keeps the graph status undetermined.
    assert_eq!(graph.get_status(root, "bake"), ExecStatus::None);

    // Default-mode status is unaffected by the custom run.
    graph.execute(RUN_EXEC).unwrap();
    assert_eq!(graph.get_status(adder, RUN_EXEC), ExecStatus::Success);
    assert_eq!(graph.get_status(adder, "bake"), ExecStatus::None);
    assert_eq!(graph.get_status(stamp, "bake"), ExecStatus::Success);
}

#[test]
fn failures_propagate_and_mark_status() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let failing = registry
        .create_action(&mut graph, root, "FailAction", Some("failing"))
        .unwrap();
    let adder = registry
        .create_action(&mut graph, root, "AddAction", Some("adder"))
        .unwrap();
    // The adder depends on the failing action, so it never runs.
    graph
        .set_script(graph.param(adder, "a").unwrap(), "{failing.enabled} + 1")
        .unwrap();

    let err = graph.execute(RUN_EXEC).unwrap_err();
    assert!(matches!(
        err,
        Error::Execution(ExecutionError::ActionFailed { .. })
    ));
    assert_eq!(graph.get_status(failing, RUN_EXEC), ExecStatus::Fail);
    assert_eq!(graph.get_status(adder, RUN_EXEC), ExecStatus::None);
    assert_eq!(graph.get_status(root, RUN_EXEC), ExecStatus::Fail);
}

#[test]
fn disabled_actions_are_skipped() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let adder = registry
        .create_action(&mut graph, root, "AddAction", Some("adder"))
        .unwrap();
    graph
        .set_value(graph.param(adder, "a").unwrap(), Value::Float(1.0))
        .unwrap();
    graph
        .set_value(graph.param(adder, "b").unwrap(), Value::Float(2.0))
        .unwrap();

    graph.set_enabled(adder, false).unwrap();
    graph.execute(RUN_EXEC).unwrap();
    assert_eq!(graph.get_status(adder, RUN_EXEC), ExecStatus::None);

    graph.set_enabled(adder, true).unwrap();
    graph.execute(RUN_EXEC).unwrap();
    assert_eq!(graph.get_status(adder, RUN_EXEC), ExecStatus::Success);
}

#[test]
fn nested_graphs_and_promotion() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let sub = graph.add_graph(root, "sub").unwrap();
    let adder = registry
        .create_action(&mut graph, sub, "AddAction", Some("adder"))
        .unwrap();

    // Inward mirror: writes on the graph parameter reach the child.
    let a_in = graph.param(adder, "a").unwrap();
    let mirror = graph.promote(a_in, Some("adder_a")).unwrap();
    assert!(graph.has_param(sub, "adder_a"));
    graph.set_value(mirror, Value::Float(5.0)).unwrap();
    graph
        .set_value(graph.param(adder, "b").unwrap(), Value::Float(1.5))
        .unwrap();

    // Outward mirror: the graph republishes the child output.
    let sum_out = graph.param(adder, "sum").unwrap();
    let total = graph.promote(sum_out, Some("total")).unwrap();

    graph.execute(RUN_EXEC).unwrap();
    assert_eq!(graph.resolve(sum_out).unwrap(), Value::Float(6.5));
    assert_eq!(graph.resolve(total).unwrap(), Value::Float(6.5));
    assert_eq!(graph.get_status(sub, RUN_EXEC), ExecStatus::Success);

    let promotions = graph.promotions(sub);
    assert_eq!(promotions.len(), 2);
    assert_eq!(promotions[0].name, "adder_a");
    assert!(promotions[1].output);

    // A second promotion under an existing name is rejected.
    let err = graph
        .promote(graph.param(adder, "b").unwrap(), Some("total"))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Parameter(ParameterError::Duplicate { .. })
    ));
}

#[test]
fn graph_output_scripts_see_children() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let sub = graph.add_graph(root, "sub").unwrap();
    let adder = registry
        .create_action(&mut graph, sub, "AddAction", Some("adder"))
        .unwrap();
    graph
        .set_value(graph.param(adder, "a").unwrap(), Value::Float(3.0))
        .unwrap();
    graph
        .set_value(graph.param(adder, "b").unwrap(), Value::Float(4.0))
        .unwrap();

    let summary = graph
        .add_dynamic_param(sub, "summary", ParamKind::float(), true)
        .unwrap();
    graph.set_script(summary, "{adder.sum}").unwrap();

    graph.execute(RUN_EXEC).unwrap();
    assert_eq!(graph.resolve(summary).unwrap(), Value::Float(7.0));
}

#[test]
fn iteration_parameters_drive_passes() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let mut registry = common::test_registry();
    let counter = Arc::new(AtomicUsize::new(0));
    let probe = counter.clone();
    registry.register_action(
        "test",
        ActionType::new("CountAction").with_run(move |_| {
            probe.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let counter_action = registry
        .create_action(&mut graph, root, "CountAction", Some("counter"))
        .unwrap();
    let adder = registry
        .create_action(&mut graph, root, "AddAction", Some("adder"))
        .unwrap();

    let items = graph
        .add_dynamic_param(root, "items", ParamKind::iter(), false)
        .unwrap();
    graph
        .set_value(
            items,
            Value::List(vec![
                Value::Float(1.0),
                Value::Float(2.0),
                Value::Float(3.0),
            ]),
        )
        .unwrap();
    graph
        .set_script(graph.param(adder, "a").unwrap(), "{__graph__.items}")
        .unwrap();
    graph
        .set_value(graph.param(adder, "b").unwrap(), Value::Float(10.0))
        .unwrap();

    graph.execute(RUN_EXEC).unwrap();
    // One pass per element; the last element is left on the outputs.
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(
        graph.resolve(graph.param(adder, "sum").unwrap()).unwrap(),
        Value::Float(13.0)
    );
    let _ = counter_action;

    // The shortest iteration list bounds the pass count.
    let pair = graph
        .add_dynamic_param(root, "pair", ParamKind::iter(), false)
        .unwrap();
    graph
        .set_value(
            pair,
            Value::List(vec![Value::Int(0), Value::Int(1)]),
        )
        .unwrap();
    counter.store(0, Ordering::SeqCst);
    graph.execute(RUN_EXEC).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(
        graph.resolve(graph.param(adder, "sum").unwrap()).unwrap(),
        Value::Float(12.0)
    );
}

#[test]
fn removal_cleans_connections_and_mirrors() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let (a, b, _, b_in) = common::linked_pair(&registry, &mut graph).unwrap();
    let root = graph.root();

    // A downstream consumer of b.
    let c = registry
        .create_action(&mut graph, root, "NullAction", Some("c"))
        .unwrap();
    let c_in = graph
        .add_dynamic_param(c, "value", ParamKind::int(), false)
        .unwrap();
    graph.set_script(c_in, "{b.value}").unwrap();

    graph.remove(b).unwrap();
    assert!(!graph.contains(b));
    assert!(graph.contains(a));
    // The dangling script is dropped and the input falls back to defaults.
    assert!(graph.param_at(c_in).unwrap().script.is_none());
    assert_eq!(graph.resolve(c_in).unwrap(), Value::Int(0));
    let _ = b_in;

    // Removing a promoted child also removes its mirror on the graph.
    let sub = graph.add_graph(root, "sub").unwrap();
    let child = registry
        .create_action(&mut graph, sub, "AddAction", Some("adder"))
        .unwrap();
    graph
        .promote(graph.param(child, "a").unwrap(), Some("adder_a"))
        .unwrap();
    assert!(graph.has_param(sub, "adder_a"));
    graph.remove(child).unwrap();
    assert!(!graph.has_param(sub, "adder_a"));
    assert!(graph.promotions(sub).is_empty());
}

#[test]
fn duplicate_child_names_increment() {
    let registry = common::test_registry();
    let mut graph = ActionGraph::new("g");
    let root = graph.root();
    let first = registry
        .create_action(&mut graph, root, "NullAction", Some("node"))
        .unwrap();
    let second = registry
        .create_action(&mut graph, root, "NullAction", Some("node"))
        .unwrap();
    assert_eq!(graph.name(first), "node");
    assert_eq!(graph.name(second), "node1");
    assert_eq!(graph.long_name(second), "g:node1");
}
