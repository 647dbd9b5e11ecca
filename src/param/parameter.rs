use super::{ParamKind, Value};
use crate::expr::Script;
use crate::graph::ParamRef;

/// A typed, constrained value holder on an action or graph.
///
/// A parameter is driven by at most one of a direct connection or a script;
/// absent both, it reports its stored value, falling back to its default.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    /// User-set value. `None` means "use the default".
    pub value: Option<Value>,
    /// User default. `None` means "use the kind's internal default".
    pub default: Option<Value>,
    pub is_output: bool,
    pub editable: bool,
    /// Created at runtime rather than declared by the action type.
    pub dynamic: bool,
    /// Upstream parameter feeding this one directly.
    pub connected_from: Option<ParamRef>,
    /// Expression override driving this parameter.
    pub script: Option<Script>,
    /// Last successful script evaluation, kept as a stale fallback.
    pub(crate) script_cache: Option<Value>,
    /// Current cursor for `Iter` kinds.
    pub(crate) iter_id: usize,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParamKind, is_output: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            value: None,
            default: None,
            is_output,
            editable: true,
            dynamic: false,
            connected_from: None,
            script: None,
            script_cache: None,
            iter_id: 0,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    /// The effective default: the user default or the kind's internal one.
    pub fn default_value(&self) -> Value {
        self.default
            .clone()
            .unwrap_or_else(|| self.kind.internal_default())
    }

    /// The stored value without following connections or scripts.
    pub fn stored_value(&self) -> Value {
        self.value.clone().unwrap_or_else(|| self.default_value())
    }

    /// Whether a connection or a script drives this parameter.
    pub fn has_input(&self) -> bool {
        self.connected_from.is_some() || self.script.is_some()
    }

    /// Clears the user value, reverting to the default.
    pub fn reset_value(&mut self) {
        self.value = None;
        self.script_cache = None;
    }
}
