use super::Value;
use crate::error::ParameterError;
use serde::{Deserialize, Serialize};

/// Element kinds enforceable on list items and dict keys/values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Int,
    Float,
    Bool,
    Str,
}

impl ScalarKind {
    fn coerce(&self, param: &str, value: Value) -> Result<Value, ParameterError> {
        match self {
            ScalarKind::Int => coerce_int(param, value, "int"),
            ScalarKind::Float => coerce_float(param, value, "float"),
            ScalarKind::Bool => Ok(Value::Bool(value.is_truthy())),
            ScalarKind::Str => Ok(Value::Str(value.to_string())),
        }
    }
}

/// The closed set of parameter kinds. Each variant carries its own
/// constraint fields; conversion and validation dispatch on the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Int {
        min: Option<i64>,
        max: Option<i64>,
    },
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    Bool,
    Str,
    Enum {
        items: Vec<String>,
    },
    List {
        item_type: Option<ScalarKind>,
    },
    /// A list whose resolved value is the element at the owning graph's
    /// current iteration cursor. Graphs only.
    Iter {
        item_type: Option<ScalarKind>,
    },
    Dict {
        key_type: Option<ScalarKind>,
        item_type: Option<ScalarKind>,
    },
    /// Opaque pass-through value. Output parameters only.
    Object,
    FilePath {
        ext: Vec<String>,
    },
}

impl ParamKind {
    /// Unconstrained integer kind.
    pub fn int() -> Self {
        ParamKind::Int {
            min: None,
            max: None,
        }
    }

    /// Unconstrained float kind.
    pub fn float() -> Self {
        ParamKind::Float {
            min: None,
            max: None,
        }
    }

    /// Untyped list kind.
    pub fn list() -> Self {
        ParamKind::List { item_type: None }
    }

    /// Untyped iteration kind.
    pub fn iter() -> Self {
        ParamKind::Iter { item_type: None }
    }

    /// Untyped dict kind.
    pub fn dict() -> Self {
        ParamKind::Dict {
            key_type: None,
            item_type: None,
        }
    }

    /// File path kind without an extension allowlist.
    pub fn file_path() -> Self {
        ParamKind::FilePath { ext: Vec::new() }
    }

    /// The display name of this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamKind::Int { .. } => "int",
            ParamKind::Float { .. } => "float",
            ParamKind::Bool => "bool",
            ParamKind::Str => "str",
            ParamKind::Enum { .. } => "enum",
            ParamKind::List { .. } => "list",
            ParamKind::Iter { .. } => "iter",
            ParamKind::Dict { .. } => "dict",
            ParamKind::Object => "object",
            ParamKind::FilePath { .. } => "file",
        }
    }

    pub fn is_iter(&self) -> bool {
        matches!(self, ParamKind::Iter { .. })
    }

    /// True for kinds whose values are plain strings.
    pub fn is_string_like(&self) -> bool {
        matches!(self, ParamKind::Str | ParamKind::FilePath { .. })
    }

    /// The value used when neither a user default nor a value is set.
    pub fn internal_default(&self) -> Value {
        match self {
            ParamKind::Int { .. } | ParamKind::Enum { .. } => Value::Int(0),
            ParamKind::Float { .. } => Value::Float(0.0),
            ParamKind::Bool => Value::Bool(false),
            ParamKind::Str | ParamKind::FilePath { .. } => Value::Str(String::new()),
            ParamKind::List { .. } | ParamKind::Iter { .. } => Value::List(Vec::new()),
            ParamKind::Dict { .. } => Value::Dict(Vec::new()),
            ParamKind::Object => Value::Null,
        }
    }

    /// Converts a value into this kind's representation, then checks its
    /// constraints. Violations are errors; values are never clamped.
    pub fn adapt(&self, param: &str, value: Value) -> Result<Value, ParameterError> {
        let converted = self.convert(param, value)?;
        self.validate(param, &converted)?;
        Ok(converted)
    }

    /// Converts a value into this kind's representation without range checks.
    pub fn convert(&self, param: &str, value: Value) -> Result<Value, ParameterError> {
        match self {
            ParamKind::Int { .. } => coerce_int(param, value, "int"),
            ParamKind::Float { .. } => coerce_float(param, value, "float"),
            ParamKind::Bool => Ok(Value::Bool(value.is_truthy())),
            ParamKind::Str => Ok(Value::Str(value.to_string())),
            ParamKind::Enum { items } => match value {
                Value::Int(i) => Ok(Value::Int(i)),
                other => {
                    let label = other.to_string();
                    match items.iter().position(|item| *item == label) {
                        Some(index) => Ok(Value::Int(index as i64)),
                        None => Err(ParameterError::EnumValue {
                            param: param.to_string(),
                            value: label,
                        }),
                    }
                }
            },
            ParamKind::List { item_type } | ParamKind::Iter { item_type } => {
                let items = match value {
                    Value::List(items) => items,
                    Value::Null => Vec::new(),
                    single => vec![single],
                };
                match item_type {
                    None => Ok(Value::List(items)),
                    Some(kind) => {
                        let mut coerced = Vec::with_capacity(items.len());
                        for item in items {
                            coerced.push(kind.coerce(param, item)?);
                        }
                        Ok(Value::List(coerced))
                    }
                }
            }
            ParamKind::Dict {
                key_type,
                item_type,
            } => {
                let pairs = match value {
                    Value::Dict(pairs) => pairs,
                    Value::Null => Vec::new(),
                    other => {
                        return Err(ParameterError::Conversion {
                            param: param.to_string(),
                            value: other.to_string(),
                            kind: "dict",
                        });
                    }
                };
                let mut coerced = Vec::with_capacity(pairs.len());
                for (key, item) in pairs {
                    let key = match key_type {
                        Some(kind) => kind.coerce(param, Value::Str(key))?.to_string(),
                        None => key,
                    };
                    let item = match item_type {
                        Some(kind) => kind.coerce(param, item)?,
                        None => item,
                    };
                    coerced.push((key, item));
                }
                Ok(Value::Dict(coerced))
            }
            ParamKind::Object => Ok(value),
            ParamKind::FilePath { ext } => {
                let path = value.to_string().replace('\\', "/");
                if path.is_empty() {
                    return Ok(Value::Str(path));
                }
                let Some(dot) = path.rfind('.') else {
                    return Err(ParameterError::NotAFilePath {
                        param: param.to_string(),
                        value: path,
                    });
                };
                if !ext.is_empty() {
                    let found = &path[dot + 1..];
                    if !ext.iter().any(|e| e.as_str() == found) {
                        return Err(ParameterError::FileExtension {
                            param: param.to_string(),
                            ext: found.to_string(),
                        });
                    }
                }
                Ok(Value::Str(path))
            }
        }
    }

    /// Checks a converted value against this kind's range constraints.
    pub fn validate(&self, param: &str, value: &Value) -> Result<(), ParameterError> {
        match self {
            ParamKind::Int { min, max } => {
                let v = value.as_int().unwrap_or(0);
                let below = min.is_some_and(|lo| v < lo);
                let above = max.is_some_and(|hi| v > hi);
                if below || above {
                    return Err(out_of_range(param, value, *min, *max));
                }
            }
            ParamKind::Float { min, max } => {
                let v = value.as_f64().unwrap_or(0.0);
                let below = min.is_some_and(|lo| v < lo);
                let above = max.is_some_and(|hi| v > hi);
                if below || above {
                    return Err(out_of_range(param, value, *min, *max));
                }
            }
            ParamKind::Enum { items } => {
                let v = value.as_int().unwrap_or(0);
                if v < 0 || v as usize >= items.len() {
                    return Err(ParameterError::EnumValue {
                        param: param.to_string(),
                        value: value.to_string(),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Checks whether a value produced by `other` could be fed into this kind.
    pub fn accepts(&self, other: &ParamKind) -> bool {
        self.convert("", other.internal_default()).is_ok()
    }
}

fn out_of_range<T: std::fmt::Display>(
    param: &str,
    value: &Value,
    min: Option<T>,
    max: Option<T>,
) -> ParameterError {
    let bound = |b: Option<T>| b.map_or("..".to_string(), |v| v.to_string());
    ParameterError::OutOfRange {
        param: param.to_string(),
        value: value.to_string(),
        min: bound(min),
        max: bound(max),
    }
}

fn coerce_int(param: &str, value: Value, kind: &'static str) -> Result<Value, ParameterError> {
    match &value {
        Value::Int(_) => Ok(value),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::Bool(b) => Ok(Value::Int(if *b { 1 } else { 0 })),
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            ParameterError::Conversion {
                param: param.to_string(),
                value: s.clone(),
                kind,
            }
        }),
        other => Err(ParameterError::Conversion {
            param: param.to_string(),
            value: other.to_string(),
            kind,
        }),
    }
}

fn coerce_float(param: &str, value: Value, kind: &'static str) -> Result<Value, ParameterError> {
    match &value {
        Value::Float(_) => Ok(value),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            ParameterError::Conversion {
                param: param.to_string(),
                value: s.clone(),
                kind,
            }
        }),
        other => Err(ParameterError::Conversion {
            param: param.to_string(),
            value: other.to_string(),
            kind,
        }),
    }
}
