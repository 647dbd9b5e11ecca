//! Action types and execution callables.
//!
//! An action type is a flat description: a parameter schema plus a table of
//! execution callables keyed by exec-mode name. Domain behavior is supplied
//! by registering callables, not by subclassing.

use crate::error::ExecutionError;
use crate::expr::SELF_PARAM_NAME;
use crate::graph::{ActionGraph, ActionId};
use crate::param::{ParamKind, Parameter, Value};
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

/// Name of the default execution mode.
pub const RUN_EXEC: &str = "run";

/// Name of the built-in enabled flag present on every action and graph.
pub const ENABLED_PARAM_NAME: &str = "enabled";

/// Tag carried by every registered action type.
pub const TAG_ACTION: &str = "action";

/// Tag carried by every graph.
pub const TAG_GRAPH: &str = "action graph";

/// Per-mode execution status of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecStatus {
    #[default]
    None,
    Running,
    Success,
    Fail,
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecStatus::None => "none",
            ExecStatus::Running => "running",
            ExecStatus::Success => "success",
            ExecStatus::Fail => "fail",
        };
        write!(f, "{}", label)
    }
}

/// An execution callable bound to one exec mode of an action type.
pub type ExecFn = Arc<dyn Fn(&mut ActionScope<'_>) -> Result<(), ExecutionError> + Send + Sync>;

/// Declares one parameter of an action type.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Value>,
    pub output: bool,
    pub editable: bool,
}

impl ParamSpec {
    pub fn input(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            output: false,
            editable: true,
        }
    }

    pub fn output(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            output: true,
            editable: true,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub(crate) fn instantiate(&self) -> Parameter {
        let mut param = Parameter::new(self.name.clone(), self.kind.clone(), self.output);
        param.default = self.default.clone();
        param.editable = self.editable;
        param
    }
}

/// A registered action type: metadata, parameter schema and the exec-mode
/// callable table.
#[derive(Clone)]
pub struct ActionType {
    pub type_name: String,
    pub tags: Vec<String>,
    pub params: Vec<ParamSpec>,
    pub exec_fns: AHashMap<String, ExecFn>,
}

impl ActionType {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            tags: vec![TAG_ACTION.to_string()],
            params: Vec::new(),
            exec_fns: AHashMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn with_param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Registers the default `run` callable.
    pub fn with_run<F>(self, f: F) -> Self
    where
        F: Fn(&mut ActionScope<'_>) -> Result<(), ExecutionError> + Send + Sync + 'static,
    {
        self.with_exec(RUN_EXEC, f)
    }

    /// Registers a callable under a custom exec-mode name.
    pub fn with_exec<F>(mut self, exec_name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut ActionScope<'_>) -> Result<(), ExecutionError> + Send + Sync + 'static,
    {
        self.exec_fns.insert(exec_name.into(), Arc::new(f));
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// The custom exec-mode names of this type, sorted, `run` excluded.
    pub fn custom_exec_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .exec_fns
            .keys()
            .filter(|name| *name != RUN_EXEC)
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionType")
            .field("type_name", &self.type_name)
            .field("tags", &self.tags)
            .field("params", &self.params)
            .field("exec_fns", &self.exec_fns.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The parameters every action and graph carries.
pub(crate) fn builtin_params() -> Vec<Parameter> {
    vec![
        Parameter::new(ENABLED_PARAM_NAME, ParamKind::Bool, false)
            .with_default(Value::Bool(true)),
        Parameter::new(SELF_PARAM_NAME, ParamKind::Object, true),
    ]
}

/// The view of the graph handed to an execution callable. Inputs resolve
/// through connections and scripts; outputs are written back onto the
/// action's output parameters.
pub struct ActionScope<'g> {
    pub(crate) graph: &'g mut ActionGraph,
    pub(crate) id: ActionId,
    pub(crate) exec_name: String,
}

impl ActionScope<'_> {
    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn action_name(&self) -> String {
        self.graph.name(self.id).to_string()
    }

    pub fn exec_name(&self) -> &str {
        &self.exec_name
    }

    /// Read access to the whole graph for callables that inspect structure.
    pub fn graph(&self) -> &ActionGraph {
        self.graph
    }

    /// Resolves a parameter on this action.
    pub fn input(&mut self, name: &str) -> Result<Value, ExecutionError> {
        let pref = self
            .graph
            .param(self.id, name)
            .ok_or_else(|| ExecutionError::ParamNotFound {
                action: self.action_name(),
                param: name.to_string(),
            })?;
        self.graph
            .resolve_cached(pref)
            .map_err(|e| ExecutionError::InputResolve {
                action: self.action_name(),
                param: name.to_string(),
                message: e.to_string(),
            })
    }

    /// Writes a value onto one of this action's output parameters.
    pub fn set_output(&mut self, name: &str, value: Value) -> Result<(), ExecutionError> {
        let pref = self
            .graph
            .param(self.id, name)
            .ok_or_else(|| ExecutionError::ParamNotFound {
                action: self.action_name(),
                param: name.to_string(),
            })?;
        let is_output = self
            .graph
            .param_at(pref)
            .map(|p| p.is_output)
            .unwrap_or(false);
        if !is_output {
            return Err(ExecutionError::NotAnOutput {
                action: self.action_name(),
                param: name.to_string(),
            });
        }
        self.graph
            .write_output(pref, value)
            .map_err(|e| self.fail(e.to_string()))
    }

    /// Builds an execution failure carrying this action's context.
    pub fn fail(&self, message: impl Into<String>) -> ExecutionError {
        ExecutionError::ActionFailed {
            action: self.action_name(),
            exec_name: self.exec_name.clone(),
            message: message.into(),
        }
    }
}
