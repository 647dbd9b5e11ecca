//! Common test utilities: a registry with a few concrete action types and
//! small graph builders.
use protostar::prelude::*;

/// A registry with the built-ins plus the test action types below.
#[allow(dead_code)]
pub fn test_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register_action(DEFAULT_NAMESPACE, add_action_type());
    registry.register_action(DEFAULT_NAMESPACE, stamp_action_type());
    registry.register_action(DEFAULT_NAMESPACE, fail_action_type());
    registry
}

/// `sum = a + b` over two float inputs.
#[allow(dead_code)]
pub fn add_action_type() -> ActionType {
    ActionType::new("AddAction")
        .with_tag("math")
        .with_param(ParamSpec::input("a", ParamKind::float()))
        .with_param(ParamSpec::input("b", ParamKind::float()))
        .with_param(ParamSpec::output("sum", ParamKind::float()))
        .with_run(|scope| {
            let a = scope.input("a")?.as_f64().unwrap_or(0.0);
            let b = scope.input("b")?.as_f64().unwrap_or(0.0);
            scope.set_output("sum", Value::Float(a + b))
        })
}

/// Writes a marker string from both the default and a custom exec mode.
#[allow(dead_code)]
pub fn stamp_action_type() -> ActionType {
    ActionType::new("StampAction")
        .with_param(ParamSpec::output("stamp", ParamKind::Str))
        .with_run(|scope| scope.set_output("stamp", Value::Str("ran".to_string())))
        .with_exec("bake", |scope| {
            scope.set_output("stamp", Value::Str("baked".to_string()))
        })
}

/// Always fails.
#[allow(dead_code)]
pub fn fail_action_type() -> ActionType {
    ActionType::new("FailAction").with_run(|scope| Err(scope.fail("boom")))
}

/// `a -> b` over a dynamic int parameter pair; returns (a, b, a_out, b_in).
#[allow(dead_code)]
pub fn linked_pair(
    registry: &Registry,
    graph: &mut ActionGraph,
) -> Result<(ActionId, ActionId, ParamRef, ParamRef)> {
    let root = graph.root();
    let a = registry.create_action(graph, root, "NullAction", Some("a"))?;
    let b = registry.create_action(graph, root, "NullAction", Some("b"))?;
    let a_out = graph.add_dynamic_param(a, "value", ParamKind::int(), true)?;
    let b_in = graph.add_dynamic_param(b, "value", ParamKind::int(), false)?;
    graph.connect(a_out, b_in)?;
    Ok((a, b, a_out, b_in))
}
