//! A tree-walking evaluator for the statechart expression language
//!
//! [`ExpressionEvaluator`] implements the core's [`Evaluator`] trait over
//! JSON values. Variables live in per-state lexical scopes
//! ([`ScopeStore`]); parsed fragments are cached by source text.
//!
//! The built-in functions mirror the interpreter-provided predicates:
//!
//! | Function | Meaning |
//! |----------|---------|
//! | `after(x)` | owning state active for at least `x` seconds |
//! | `idle(x)` | no transition processed for at least `x` seconds |
//! | `active('s')` | state `s` is in the (live) configuration |
//! | `sent('e')` | an event named `e` was sent during this step |
//! | `received('e')` | the consumed event of this step is named `e` |
//! | `send('e', k=v, delay=d)` | emit an internal event (actions only) |
//! | `old(x)` | value of `x` frozen at the paired pre-point (contracts) |
//!
//! The in-flight event is exposed as `event`, with `event.name` and one
//! attribute per parameter (e.g. `event.floor`). Guards and contract
//! conditions must be single expressions; action, entry and exit code is a
//! sequence of statements.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;
use statecharts_core::evaluator::{EvalError, EvalScope, Evaluator};
use statecharts_core::{Event, State, Statechart};

use crate::ast::{BinOp, Block, Expr, Stmt, UnaryOp};
use crate::parser::parse;
use crate::scope::ScopeStore;

/// Python-like truthiness over JSON values.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn number(value: f64) -> Result<Value, EvalError> {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| EvalError::new(format!("arithmetic produced a non-finite number ({})", value)))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn event_value(event: &Event) -> Value {
    let mut map = event.params.clone();
    map.insert("name".to_string(), Value::String(event.name.clone()));
    Value::Object(map)
}

/// Per-call evaluation context: predicates, event, `old` key, collected
/// `send(...)` emissions.
struct Session<'a> {
    scope: &'a EvalScope<'a>,
    event: Option<&'a Event>,
    owner: &'a str,
    frozen_key: Option<&'a str>,
    allow_send: bool,
    sends: Vec<Event>,
}

/// Concrete [`Evaluator`] over the expression language.
pub struct ExpressionEvaluator {
    chart: Arc<Statechart>,
    store: ScopeStore,
    cache: HashMap<String, Rc<Block>>,
    frozen: HashMap<String, serde_json::Map<String, Value>>,
}

impl ExpressionEvaluator {
    pub fn new(chart: Arc<Statechart>) -> Self {
        Self {
            store: ScopeStore::new(Arc::clone(&chart)),
            chart,
            cache: HashMap::new(),
            frozen: HashMap::new(),
        }
    }

    /// Read a variable as seen from a state, mainly for tests.
    pub fn variable(&self, state: &str, name: &str) -> Option<&Value> {
        self.store.get(state, name)
    }

    fn block(&mut self, code: &str) -> Result<Rc<Block>, EvalError> {
        if let Some(block) = self.cache.get(code) {
            return Ok(Rc::clone(block));
        }
        let block = Rc::new(parse(code)?);
        tracing::trace!(fragment = code, "parsed code fragment");
        self.cache.insert(code.to_string(), Rc::clone(&block));
        Ok(block)
    }

    fn owner_of(&self, scope: &EvalScope<'_>) -> String {
        scope.state.unwrap_or(self.chart.root()).to_string()
    }

    fn exec_block(&mut self, session: &mut Session<'_>, block: &Block) -> Result<(), EvalError> {
        for statement in &block.statements {
            match statement {
                Stmt::Assign { name, value } => {
                    let value = self.eval_expr(session, value)?;
                    self.store.set(session.owner, name, value);
                }
                Stmt::Expr(expr) => {
                    self.eval_expr(session, expr)?;
                }
            }
        }
        Ok(())
    }

    fn eval_condition(
        &mut self,
        scope: &EvalScope<'_>,
        code: &str,
        event: Option<&Event>,
        frozen_key: Option<&str>,
    ) -> Result<bool, EvalError> {
        let block = self.block(code)?;
        let expr = block
            .as_expression()
            .ok_or_else(|| EvalError::new(format!("'{}' must be a single expression", code)))?;
        let owner = self.owner_of(scope);
        let mut session = Session {
            scope,
            event,
            owner: &owner,
            frozen_key,
            allow_send: false,
            sends: Vec::new(),
        };
        let value = self.eval_expr(&mut session, expr)?;
        Ok(truthy(&value))
    }

    fn exec_code(
        &mut self,
        scope: &EvalScope<'_>,
        code: &str,
        event: Option<&Event>,
    ) -> Result<Vec<Event>, EvalError> {
        let block = self.block(code)?;
        let owner = self.owner_of(scope);
        let mut session = Session {
            scope,
            event,
            owner: &owner,
            frozen_key: None,
            allow_send: true,
            sends: Vec::new(),
        };
        self.exec_block(&mut session, &block)?;
        Ok(session.sends)
    }

    fn check_conditions(
        &mut self,
        scope: &EvalScope<'_>,
        key: &str,
        conditions: &[String],
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        let mut failed = Vec::new();
        for condition in conditions {
            if !self.eval_condition(scope, condition, event, Some(key))? {
                failed.push(condition.clone());
            }
        }
        Ok(failed)
    }

    fn eval_expr(&mut self, session: &mut Session<'_>, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Number((*i).into())),
            Expr::Float(f) => number(*f),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(session, item)?);
                }
                Ok(Value::Array(values))
            }
            Expr::Ident(name) => self.eval_ident(session, name),
            Expr::Attr(object, attr) => {
                let object = self.eval_expr(session, object)?;
                match object {
                    Value::Object(map) => map
                        .get(attr)
                        .cloned()
                        .ok_or_else(|| EvalError::new(format!("no attribute '{}'", attr))),
                    other => Err(EvalError::new(format!(
                        "cannot read attribute '{}' of {}",
                        attr, other
                    ))),
                }
            }
            Expr::Unary(op, operand) => {
                let value = self.eval_expr(session, operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                    UnaryOp::Neg => match &value {
                        Value::Number(n) if n.is_i64() => {
                            Ok(Value::Number((-n.as_i64().expect("checked i64")).into()))
                        }
                        Value::Number(n) => number(-n.as_f64().unwrap_or(f64::NAN)),
                        other => Err(EvalError::new(format!("cannot negate {}", other))),
                    },
                }
            }
            Expr::Binary(op, left, right) => self.eval_binary(session, *op, left, right),
            Expr::Call { name, args, kwargs } => self.eval_call(session, name, args, kwargs),
        }
    }

    fn eval_ident(&mut self, session: &mut Session<'_>, name: &str) -> Result<Value, EvalError> {
        if name == "event" {
            return Ok(session.event.map(event_value).unwrap_or(Value::Null));
        }
        self.store
            .get(session.owner, name)
            .cloned()
            .ok_or_else(|| EvalError::new(format!("unknown variable '{}'", name)))
    }

    fn eval_binary(
        &mut self,
        session: &mut Session<'_>,
        op: BinOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Value, EvalError> {
        // Boolean connectives short-circuit.
        if matches!(op, BinOp::And | BinOp::Or) {
            let lhs = truthy(&self.eval_expr(session, left)?);
            return match (op, lhs) {
                (BinOp::And, false) => Ok(Value::Bool(false)),
                (BinOp::Or, true) => Ok(Value::Bool(true)),
                _ => Ok(Value::Bool(truthy(&self.eval_expr(session, right)?))),
            };
        }

        let lhs = self.eval_expr(session, left)?;
        let rhs = self.eval_expr(session, right)?;
        match op {
            BinOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
            BinOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = match (&lhs, &rhs) {
                    (Value::Number(_), Value::Number(_)) => lhs
                        .as_f64()
                        .zip(rhs.as_f64())
                        .and_then(|(a, b)| a.partial_cmp(&b)),
                    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                    _ => None,
                }
                .ok_or_else(|| EvalError::new(format!("cannot compare {} and {}", lhs, rhs)))?;
                Ok(Value::Bool(match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    BinOp::Ge => ordering.is_ge(),
                    _ => unreachable!(),
                }))
            }
            BinOp::In => match (&lhs, &rhs) {
                (_, Value::Array(items)) => {
                    Ok(Value::Bool(items.iter().any(|item| values_equal(item, &lhs))))
                }
                (Value::String(needle), Value::String(haystack)) => {
                    Ok(Value::Bool(haystack.contains(needle.as_str())))
                }
                (Value::String(key), Value::Object(map)) => Ok(Value::Bool(map.contains_key(key))),
                _ => Err(EvalError::new(format!("cannot test {} in {}", lhs, rhs))),
            },
            BinOp::Add => match (&lhs, &rhs) {
                (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
                _ => self.arithmetic(op, &lhs, &rhs),
            },
            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => self.arithmetic(op, &lhs, &rhs),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn arithmetic(&self, op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
        let (a, b) = lhs
            .as_f64()
            .zip(rhs.as_f64())
            .filter(|_| lhs.is_number() && rhs.is_number())
            .ok_or_else(|| EvalError::new(format!("cannot apply arithmetic to {} and {}", lhs, rhs)))?;
        // Integer arithmetic stays integral, except division.
        if let (Some(x), Some(y)) = (lhs.as_i64(), rhs.as_i64()) {
            match op {
                BinOp::Add => return Ok(Value::Number((x + y).into())),
                BinOp::Sub => return Ok(Value::Number((x - y).into())),
                BinOp::Mul => return Ok(Value::Number((x * y).into())),
                BinOp::Mod if y != 0 => return Ok(Value::Number((x % y).into())),
                BinOp::Mod => return Err(EvalError::new("modulo by zero")),
                _ => {}
            }
        }
        match op {
            BinOp::Add => number(a + b),
            BinOp::Sub => number(a - b),
            BinOp::Mul => number(a * b),
            BinOp::Div if b != 0.0 => number(a / b),
            BinOp::Div => Err(EvalError::new("division by zero")),
            BinOp::Mod if b != 0.0 => number(a % b),
            BinOp::Mod => Err(EvalError::new("modulo by zero")),
            _ => unreachable!("only arithmetic operators reach here"),
        }
    }

    fn eval_call(
        &mut self,
        session: &mut Session<'_>,
        name: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Value, EvalError> {
        match name {
            "after" | "idle" => {
                let seconds = self.single_number_arg(session, name, args, kwargs)?;
                let holds = if name == "after" {
                    session.scope.after(seconds)
                } else {
                    session.scope.idle(seconds)
                };
                Ok(Value::Bool(holds))
            }
            "active" | "sent" | "received" => {
                let target = self.single_string_arg(session, name, args, kwargs)?;
                let holds = match name {
                    "active" => session.scope.active(&target),
                    "sent" => session.scope.sent(&target),
                    _ => session.scope.received(&target),
                };
                Ok(Value::Bool(holds))
            }
            "old" => {
                let variable = match args {
                    [Expr::Ident(name)] => name.clone(),
                    [Expr::Str(name)] => name.clone(),
                    _ => {
                        return Err(EvalError::new(
                            "old(...) takes a single variable name",
                        ))
                    }
                };
                // The frozen snapshot was taken at the paired pre-point;
                // names never frozen fall back to their current value.
                let frozen = session
                    .frozen_key
                    .and_then(|key| self.frozen.get(key))
                    .and_then(|snapshot| snapshot.get(&variable))
                    .cloned();
                match frozen {
                    Some(value) => Ok(value),
                    None => self
                        .store
                        .get(session.owner, &variable)
                        .cloned()
                        .ok_or_else(|| EvalError::new(format!("unknown variable '{}'", variable))),
                }
            }
            "send" => {
                if !session.allow_send {
                    return Err(EvalError::new("send(...) is only available in actions"));
                }
                if args.len() != 1 {
                    return Err(EvalError::new("send(...) takes exactly one event name"));
                }
                let event_name = match self.eval_expr(session, &args[0])? {
                    Value::String(name) => name,
                    other => {
                        return Err(EvalError::new(format!(
                            "send(...) expects an event name, got {}",
                            other
                        )))
                    }
                };
                let mut event = Event::internal(event_name);
                for (key, value) in kwargs {
                    let value = self.eval_expr(session, value)?;
                    if key == "delay" {
                        let delay = value.as_f64().ok_or_else(|| {
                            EvalError::new("send(...) delay must be a number")
                        })?;
                        event = event.with_delay(delay);
                    } else {
                        event = event.with_param(key.clone(), value);
                    }
                }
                session.sends.push(event);
                Ok(Value::Null)
            }
            other => Err(EvalError::new(format!("unknown function '{}'", other))),
        }
    }

    fn single_number_arg(
        &mut self,
        session: &mut Session<'_>,
        name: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<f64, EvalError> {
        if args.len() != 1 || !kwargs.is_empty() {
            return Err(EvalError::new(format!("{}(...) takes a single argument", name)));
        }
        self.eval_expr(session, &args[0])?
            .as_f64()
            .ok_or_else(|| EvalError::new(format!("{}(...) expects a number", name)))
    }

    fn single_string_arg(
        &mut self,
        session: &mut Session<'_>,
        name: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<String, EvalError> {
        if args.len() != 1 || !kwargs.is_empty() {
            return Err(EvalError::new(format!("{}(...) takes a single argument", name)));
        }
        match self.eval_expr(session, &args[0])? {
            Value::String(value) => Ok(value),
            other => Err(EvalError::new(format!("{}(...) expects a name, got {}", name, other))),
        }
    }
}

impl Evaluator for ExpressionEvaluator {
    fn execute_initialization(&mut self, code: &str) -> Result<(), EvalError> {
        let block = self.block(code)?;
        let root = self.chart.root().to_string();
        let no_entries = HashMap::new();
        let scope = EvalScope {
            time: 0.0,
            state: None,
            configuration: &[],
            entry_times: &no_entries,
            last_transition_at: 0.0,
            sent_events: &[],
            consumed: None,
        };
        let mut session = Session {
            scope: &scope,
            event: None,
            owner: &root,
            frozen_key: None,
            allow_send: false,
            sends: Vec::new(),
        };
        self.exec_block(&mut session, &block)
    }

    fn evaluate_guard(
        &mut self,
        scope: &EvalScope<'_>,
        code: &str,
        event: Option<&Event>,
    ) -> Result<bool, EvalError> {
        self.eval_condition(scope, code, event, None)
    }

    fn execute_action(
        &mut self,
        scope: &EvalScope<'_>,
        code: &str,
        event: Option<&Event>,
    ) -> Result<Vec<Event>, EvalError> {
        self.exec_code(scope, code, event)
    }

    fn execute_on_entry(&mut self, scope: &EvalScope<'_>, state: &State) -> Result<Vec<Event>, EvalError> {
        match &state.on_entry {
            Some(code) => self.exec_code(scope, code, None),
            None => Ok(Vec::new()),
        }
    }

    fn execute_on_exit(&mut self, scope: &EvalScope<'_>, state: &State) -> Result<Vec<Event>, EvalError> {
        match &state.on_exit {
            Some(code) => self.exec_code(scope, code, None),
            None => Ok(Vec::new()),
        }
    }

    fn evaluate_preconditions(
        &mut self,
        scope: &EvalScope<'_>,
        key: &str,
        conditions: &[String],
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        let owner = self.owner_of(scope);
        let snapshot = self.store.visible_from(&owner).unwrap_or_default();
        self.frozen.insert(key.to_string(), snapshot);
        self.check_conditions(scope, key, conditions, event)
    }

    fn evaluate_postconditions(
        &mut self,
        scope: &EvalScope<'_>,
        key: &str,
        conditions: &[String],
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        self.check_conditions(scope, key, conditions, event)
    }

    fn evaluate_invariants(
        &mut self,
        scope: &EvalScope<'_>,
        key: &str,
        conditions: &[String],
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        self.check_conditions(scope, key, conditions, event)
    }

    fn context(&self) -> serde_json::Map<String, Value> {
        self.store.flattened()
    }

    fn context_for(&self, state: &str) -> Option<serde_json::Map<String, Value>> {
        self.store.visible_from(state)
    }
}
