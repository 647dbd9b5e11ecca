//! Parameter script expressions.
//!
//! A script is a string with zero or more `{alias.param}` placeholders,
//! where `alias` names a sibling action or graph visible in the owning
//! graph scope (`{__graph__.param}` addresses the owning graph itself, and
//! a bare `{alias}` references the action's `message` output). The script
//! compiles to a small expression tree; evaluation substitutes the
//! referenced parameter values and folds the tree.

mod parser;

use crate::error::{Error, GraphError, ScriptError};
use crate::graph::{ActionGraph, ActionId, ParamRef};
use crate::param::Value;
use parser::Segment;

/// Placeholder alias addressing the graph that owns the driven parameter.
pub const OWNER_GRAPH_ALIAS: &str = "__graph__";

/// Parameter name referenced by a bare `{alias}` placeholder.
pub const SELF_PARAM_NAME: &str = "message";

/// The expression tree a script compiles to.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    // Leaves
    Literal(Value),
    Placeholder(usize),

    // Arithmetic
    Sum(Box<Expr>, Box<Expr>),
    Subtract(Box<Expr>, Box<Expr>),
    Multiply(Box<Expr>, Box<Expr>),
    Divide(Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),

    // Logical
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),

    // Comparison
    Equal(Box<Expr>, Box<Expr>),
    NotEqual(Box<Expr>, Box<Expr>),
    GreaterThan(Box<Expr>, Box<Expr>),
    GreaterThanOrEqual(Box<Expr>, Box<Expr>),
    SmallerThan(Box<Expr>, Box<Expr>),
    SmallerThanOrEqual(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum ScriptBody {
    /// Exactly one placeholder and nothing else: the referenced value is
    /// passed through untouched.
    Direct,
    /// A parsed expression over literals and placeholders.
    Expr(Expr),
    /// Raw text with placeholder substitution; string parameters only.
    Template,
}

/// A compiled parameter script.
///
/// References are resolved to arena addresses at compile time, so renaming
/// an action or parameter does not invalidate an existing script.
#[derive(Debug, Clone)]
pub struct Script {
    code: String,
    refs: Vec<ParamRef>,
    segments: Vec<Segment>,
    body: ScriptBody,
    string_fallback: bool,
}

impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Script {
    /// The source text of this script.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The parameters referenced by this script's placeholders.
    pub fn refs(&self) -> &[ParamRef] {
        &self.refs
    }

    /// Compiles `code` against the alias scope visible from `target`.
    pub(crate) fn compile(
        code: &str,
        graph: &ActionGraph,
        target: ParamRef,
    ) -> Result<Self, Error> {
        let scope = script_scope(graph, target)?;
        let (segments, placeholders) =
            parser::extract_segments(code).map_err(|message| ScriptError::Parse {
                script: code.to_string(),
                message,
            })?;

        let mut refs = Vec::with_capacity(placeholders.len());
        for content in &placeholders {
            refs.push(resolve_placeholder(graph, scope, code, content)?);
        }

        let string_fallback = graph
            .param_at(target)
            .map(|p| p.kind.is_string_like())
            .unwrap_or(false);

        // A lone placeholder passes the referenced value through raw.
        if segments.len() == 1 && matches!(segments[0], Segment::Ref(_)) {
            return Ok(Self {
                code: code.to_string(),
                refs,
                segments,
                body: ScriptBody::Direct,
                string_fallback,
            });
        }

        let body = match parser::parse(code, &placeholders) {
            Ok(expr) => ScriptBody::Expr(expr),
            Err(message) => {
                if string_fallback {
                    ScriptBody::Template
                } else {
                    return Err(ScriptError::Parse {
                        script: code.to_string(),
                        message,
                    }
                    .into());
                }
            }
        };

        Ok(Self {
            code: code.to_string(),
            refs,
            segments,
            body,
            string_fallback,
        })
    }

    /// Evaluates the script against the current graph state.
    pub(crate) fn evaluate(&self, graph: &ActionGraph, depth: usize) -> Result<Value, Error> {
        match &self.body {
            ScriptBody::Direct => graph.resolve_depth(self.refs[0], depth + 1),
            ScriptBody::Template => self.render_template(graph, depth),
            ScriptBody::Expr(expr) => match self.eval(expr, graph, depth) {
                Ok(value) => Ok(value),
                // String parameters degrade to raw substitution.
                Err(Error::Script(_)) if self.string_fallback => {
                    self.render_template(graph, depth)
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Rewrites reference text after an action or parameter rename. The
    /// compiled references stay valid; only the display code changes.
    pub(crate) fn replace_code(&mut self, old: &str, new: &str) {
        self.code = self.code.replace(old, new);
    }

    /// Shifts reference indices after a parameter was removed from `owner`.
    pub(crate) fn shift_refs(&mut self, owner: ActionId, removed: usize) {
        for r in &mut self.refs {
            if r.action == owner && r.index > removed {
                r.index -= 1;
            }
        }
    }

    fn render_template(&self, graph: &ActionGraph, depth: usize) -> Result<Value, Error> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Ref(index) => {
                    let value = graph.resolve_depth(self.refs[*index], depth + 1)?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(Value::Str(out))
    }

    fn eval(&self, expr: &Expr, graph: &ActionGraph, depth: usize) -> Result<Value, Error> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Placeholder(index) => graph.resolve_depth(self.refs[*index], depth + 1),

            Expr::Sum(l, r) => {
                let left = self.eval(l, graph, depth)?;
                let right = self.eval(r, graph, depth)?;
                match (&left, &right) {
                    (Value::Str(_), _) | (_, Value::Str(_)) => {
                        Ok(Value::Str(format!("{}{}", left, right)))
                    }
                    (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                    _ => self.numeric_op(&left, &right, "+", |a, b| a + b),
                }
            }
            Expr::Subtract(l, r) => {
                let left = self.eval(l, graph, depth)?;
                let right = self.eval(r, graph, depth)?;
                match (&left, &right) {
                    (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
                    _ => self.numeric_op(&left, &right, "-", |a, b| a - b),
                }
            }
            Expr::Multiply(l, r) => {
                let left = self.eval(l, graph, depth)?;
                let right = self.eval(r, graph, depth)?;
                match (&left, &right) {
                    (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
                    _ => self.numeric_op(&left, &right, "*", |a, b| a * b),
                }
            }
            Expr::Divide(l, r) => {
                let left = self.eval(l, graph, depth)?;
                let right = self.eval(r, graph, depth)?;
                self.numeric_op(&left, &right, "/", |a, b| a / b)
            }
            Expr::Negate(v) => {
                let value = self.eval(v, graph, depth)?;
                match value {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(self.type_mismatch("-", &other)),
                }
            }

            Expr::Not(v) => {
                let value = self.eval(v, graph, depth)?;
                Ok(Value::Bool(!value.is_truthy()))
            }
            Expr::And(l, r) => {
                let left = self.eval(l, graph, depth)?;
                if !left.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let right = self.eval(r, graph, depth)?;
                Ok(Value::Bool(right.is_truthy()))
            }
            Expr::Or(l, r) => {
                let left = self.eval(l, graph, depth)?;
                if left.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let right = self.eval(r, graph, depth)?;
                Ok(Value::Bool(right.is_truthy()))
            }

            Expr::Equal(l, r) => {
                let left = self.eval(l, graph, depth)?;
                let right = self.eval(r, graph, depth)?;
                Ok(Value::Bool(left.loose_eq(&right)))
            }
            Expr::NotEqual(l, r) => {
                let left = self.eval(l, graph, depth)?;
                let right = self.eval(r, graph, depth)?;
                Ok(Value::Bool(!left.loose_eq(&right)))
            }
            Expr::GreaterThan(l, r) => self.comparison(l, r, graph, depth, ">", |a, b| a > b),
            Expr::GreaterThanOrEqual(l, r) => {
                self.comparison(l, r, graph, depth, ">=", |a, b| a >= b)
            }
            Expr::SmallerThan(l, r) => self.comparison(l, r, graph, depth, "<", |a, b| a < b),
            Expr::SmallerThanOrEqual(l, r) => {
                self.comparison(l, r, graph, depth, "<=", |a, b| a <= b)
            }
        }
    }

    fn comparison<F>(
        &self,
        l: &Expr,
        r: &Expr,
        graph: &ActionGraph,
        depth: usize,
        op: &str,
        f: F,
    ) -> Result<Value, Error>
    where
        F: Fn(f64, f64) -> bool,
    {
        let left = self.eval(l, graph, depth)?;
        let right = self.eval(r, graph, depth)?;
        if let (Value::Str(a), Value::Str(b)) = (&left, &right) {
            let ordering = a.cmp(b);
            let as_nums = match ordering {
                std::cmp::Ordering::Less => (0.0, 1.0),
                std::cmp::Ordering::Equal => (0.0, 0.0),
                std::cmp::Ordering::Greater => (1.0, 0.0),
            };
            return Ok(Value::Bool(f(as_nums.0, as_nums.1)));
        }
        match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Bool(f(a, b))),
            _ => Err(self.type_mismatch(op, &left)),
        }
    }

    fn numeric_op<F>(&self, left: &Value, right: &Value, op: &str, f: F) -> Result<Value, Error>
    where
        F: Fn(f64, f64) -> f64,
    {
        match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(f(a, b))),
            _ => Err(self.type_mismatch(op, left)),
        }
    }

    fn type_mismatch(&self, op: &str, found: &Value) -> Error {
        ScriptError::Eval {
            script: self.code.clone(),
            message: format!("operator '{}' cannot be applied to '{}'", op, found),
        }
        .into()
    }
}

/// The graph whose children are visible as aliases from `target`.
fn script_scope(graph: &ActionGraph, target: ParamRef) -> Result<ActionId, Error> {
    let param = graph.param_at(target).ok_or(GraphError::StaleId)?;
    if graph.is_graph(target.action) && param.is_output {
        return Ok(target.action);
    }
    graph.parent(target.action).ok_or_else(|| {
        GraphError::NoParent {
            name: graph.name(target.action).to_string(),
        }
        .into()
    })
}

fn resolve_placeholder(
    graph: &ActionGraph,
    scope: ActionId,
    code: &str,
    content: &str,
) -> Result<ParamRef, Error> {
    let (alias, param_name) = match content.split_once('.') {
        Some((alias, param)) => (alias, param),
        None => (content, SELF_PARAM_NAME),
    };

    let owner = if alias == OWNER_GRAPH_ALIAS {
        scope
    } else {
        graph
            .child_by_name(scope, alias)
            .ok_or_else(|| ScriptError::UnknownAlias {
                script: code.to_string(),
                alias: alias.to_string(),
            })?
    };

    graph
        .param(owner, param_name)
        .ok_or_else(|| {
            ScriptError::UnknownParam {
                script: code.to_string(),
                alias: alias.to_string(),
                param: param_name.to_string(),
            }
            .into()
        })
}
