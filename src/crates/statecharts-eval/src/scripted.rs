//! Deterministic evaluators for tests: scripted and no-op
//!
//! [`ScriptedEvaluator`] resolves guards, actions and contract conditions
//! from tables keyed by the code text, and records every fragment it
//! executes so tests can assert ordering. [`NoopEvaluator`] satisfies every
//! guard, runs no code and keeps no context; it is enough to drive charts
//! whose behavior is purely structural.

use std::collections::HashMap;

use serde_json::Value;
use statecharts_core::evaluator::{EvalError, EvalScope, Evaluator};
use statecharts_core::{Event, State};

/// Table-driven evaluator with deterministic, scriptable behavior.
#[derive(Debug, Default)]
pub struct ScriptedEvaluator {
    guards: HashMap<String, bool>,
    actions: HashMap<String, Vec<Event>>,
    conditions: HashMap<String, bool>,
    context: serde_json::Map<String, Value>,
    /// Every code fragment executed, in order.
    log: Vec<String>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the result of a guard expression.
    pub fn guard(mut self, code: impl Into<String>, holds: bool) -> Self {
        self.guards.insert(code.into(), holds);
        self
    }

    /// Fix the events emitted by an action (or entry/exit) fragment.
    pub fn action(mut self, code: impl Into<String>, sends: Vec<Event>) -> Self {
        self.actions.insert(code.into(), sends);
        self
    }

    /// Fix the result of a contract condition.
    pub fn condition(mut self, code: impl Into<String>, holds: bool) -> Self {
        self.conditions.insert(code.into(), holds);
        self
    }

    /// Seed the exposed context snapshot.
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(name.into(), value.into());
        self
    }

    /// The code fragments executed so far, in execution order.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    fn run(&mut self, code: &str) -> Vec<Event> {
        self.log.push(code.to_string());
        self.actions.get(code).cloned().unwrap_or_default()
    }

    fn check(&mut self, conditions: &[String]) -> Vec<String> {
        conditions
            .iter()
            .filter(|code| !self.conditions.get(code.as_str()).copied().unwrap_or(true))
            .cloned()
            .collect()
    }
}

impl Evaluator for ScriptedEvaluator {
    fn execute_initialization(&mut self, code: &str) -> Result<(), EvalError> {
        self.log.push(code.to_string());
        Ok(())
    }

    fn evaluate_guard(
        &mut self,
        _scope: &EvalScope<'_>,
        code: &str,
        _event: Option<&Event>,
    ) -> Result<bool, EvalError> {
        match self.guards.get(code) {
            Some(holds) => Ok(*holds),
            None => match code {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(EvalError::new(format!("unscripted guard '{}'", other))),
            },
        }
    }

    fn execute_action(
        &mut self,
        _scope: &EvalScope<'_>,
        code: &str,
        _event: Option<&Event>,
    ) -> Result<Vec<Event>, EvalError> {
        Ok(self.run(code))
    }

    fn execute_on_entry(&mut self, _scope: &EvalScope<'_>, state: &State) -> Result<Vec<Event>, EvalError> {
        Ok(state.on_entry.clone().map(|code| self.run(&code)).unwrap_or_default())
    }

    fn execute_on_exit(&mut self, _scope: &EvalScope<'_>, state: &State) -> Result<Vec<Event>, EvalError> {
        Ok(state.on_exit.clone().map(|code| self.run(&code)).unwrap_or_default())
    }

    fn evaluate_preconditions(
        &mut self,
        _scope: &EvalScope<'_>,
        _key: &str,
        conditions: &[String],
        _event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        Ok(self.check(conditions))
    }

    fn evaluate_postconditions(
        &mut self,
        _scope: &EvalScope<'_>,
        _key: &str,
        conditions: &[String],
        _event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        Ok(self.check(conditions))
    }

    fn evaluate_invariants(
        &mut self,
        _scope: &EvalScope<'_>,
        _key: &str,
        conditions: &[String],
        _event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        Ok(self.check(conditions))
    }

    fn context(&self) -> serde_json::Map<String, Value> {
        self.context.clone()
    }

    fn context_for(&self, _state: &str) -> Option<serde_json::Map<String, Value>> {
        Some(self.context.clone())
    }
}

/// Evaluator that satisfies every guard and executes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvaluator;

impl NoopEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for NoopEvaluator {
    fn execute_initialization(&mut self, _code: &str) -> Result<(), EvalError> {
        Ok(())
    }

    fn evaluate_guard(
        &mut self,
        _scope: &EvalScope<'_>,
        _code: &str,
        _event: Option<&Event>,
    ) -> Result<bool, EvalError> {
        Ok(true)
    }

    fn execute_action(
        &mut self,
        _scope: &EvalScope<'_>,
        _code: &str,
        _event: Option<&Event>,
    ) -> Result<Vec<Event>, EvalError> {
        Ok(Vec::new())
    }

    fn execute_on_entry(&mut self, _scope: &EvalScope<'_>, _state: &State) -> Result<Vec<Event>, EvalError> {
        Ok(Vec::new())
    }

    fn execute_on_exit(&mut self, _scope: &EvalScope<'_>, _state: &State) -> Result<Vec<Event>, EvalError> {
        Ok(Vec::new())
    }

    fn evaluate_preconditions(
        &mut self,
        _scope: &EvalScope<'_>,
        _key: &str,
        _conditions: &[String],
        _event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        Ok(Vec::new())
    }

    fn evaluate_postconditions(
        &mut self,
        _scope: &EvalScope<'_>,
        _key: &str,
        _conditions: &[String],
        _event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        Ok(Vec::new())
    }

    fn evaluate_invariants(
        &mut self,
        _scope: &EvalScope<'_>,
        _key: &str,
        _conditions: &[String],
        _event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        Ok(Vec::new())
    }

    fn context(&self) -> serde_json::Map<String, Value> {
        serde_json::Map::new()
    }

    fn context_for(&self, _state: &str) -> Option<serde_json::Map<String, Value>> {
        None
    }
}
