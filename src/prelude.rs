//! Prelude module for convenient imports
//!
//! Re-exports the most commonly used types from the protostar crate.

// Graph container and handles
pub use crate::graph::{ActionGraph, ActionId, ParamRef, Promotion};

// Action types, callables and status
pub use crate::action::{
    ActionScope, ActionType, ENABLED_PARAM_NAME, ExecFn, ExecStatus, ParamSpec, RUN_EXEC,
};

// Parameter system
pub use crate::param::{ParamKind, Parameter, ScalarKind, Value};

// Expression scripts
pub use crate::expr::{OWNER_GRAPH_ALIAS, SELF_PARAM_NAME, Script};

// Registry and persistence
pub use crate::document::{GRAPH_EXT, GraphDocument};
pub use crate::registry::{DEFAULT_NAMESPACE, Registry};
pub use crate::switch::SWITCH_TYPE_NAME;

// Error types
pub use crate::error::{
    ConnectionError, Error, ExecutionError, GraphError, ParameterError, Result, ScriptError,
};
