//! # Protostar - Action Graph Execution Engine
//!
//! **Protostar** is a typed dataflow execution engine. Nodes (actions)
//! expose typed parameters, parameters are wired together directly or
//! bound by `{alias.param}` expression scripts, graphs nest and promote
//! child parameters, and execution walks the dependency order while
//! tracking per-node status under independently named execution modes.
//!
//! ## Core Workflow
//!
//! 1.  **Register types**: build a [`registry::Registry`] and register
//!     [`action::ActionType`] values - a parameter schema plus one or more
//!     execution callables (`run` is the default mode).
//! 2.  **Build a graph**: create an [`graph::ActionGraph`], instantiate
//!     actions and nested graphs through the registry, then wire
//!     parameters with [`graph::ActionGraph::connect`] or expression
//!     scripts via [`graph::ActionGraph::set_script`].
//! 3.  **Execute**: [`graph::ActionGraph::execute`] computes a dependency
//!     order, skips disabled branches (including the networks a
//!     [`switch::SWITCH_TYPE_NAME`] action deselected) and invokes each
//!     action's callable, recording per-mode status.
//! 4.  **Persist**: [`document::GraphDocument`] round-trips graphs through
//!     JSON `.agraph` files or compact binary snapshots.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use protostar::prelude::*;
//!
//! fn main() -> protostar::error::Result<()> {
//!     let registry = Registry::new();
//!     let mut graph = ActionGraph::new("rig_build");
//!     let root = graph.root();
//!
//!     let source = registry.create_action(&mut graph, root, "NullAction", Some("source"))?;
//!     let sink = registry.create_action(&mut graph, root, "NullAction", Some("sink"))?;
//!
//!     // Wire a direct connection and an expression script.
//!     let count_out = graph.add_dynamic_param(source, "count", ParamKind::int(), true)?;
//!     let count_in = graph.add_dynamic_param(sink, "count", ParamKind::int(), false)?;
//!     graph.connect(count_out, count_in)?;
//!
//!     let doubled = graph.add_dynamic_param(sink, "doubled", ParamKind::int(), false)?;
//!     graph.set_script(doubled, "{source.count} * 2")?;
//!
//!     graph.set_value(count_out, Value::Int(21))?;
//!     graph.execute("run")?;
//!     assert_eq!(graph.resolve(doubled)?, Value::Int(42));
//!     assert_eq!(graph.get_status(source, "run"), ExecStatus::Success);
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod document;
pub mod error;
pub mod expr;
pub mod graph;
pub mod param;
pub mod prelude;
pub mod registry;
pub mod switch;
