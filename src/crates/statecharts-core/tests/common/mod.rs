//! Shared fixtures for the interpreter integration tests: a deterministic
//! table-driven evaluator and a meta-event recorder.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use statecharts_core::evaluator::{EvalError, EvalScope, Evaluator};
use statecharts_core::{Event, MetaEvent, State};

/// Evaluator resolving guards, actions and contract conditions from tables
/// keyed by the code text. Unscripted guards other than `true`/`false` are
/// an error; unscripted actions are no-ops. Every executed fragment is
/// logged in order.
///
/// Contract conditions spelled `active:<state>` or `inactive:<state>` are
/// evaluated against the live configuration through the scope's `active`
/// predicate instead of the table, so tests can observe exits and entries
/// as they happen.
#[derive(Debug, Default)]
pub struct TestEvaluator {
    guards: HashMap<String, bool>,
    actions: HashMap<String, Vec<Event>>,
    conditions: HashMap<String, bool>,
    pub log: Rc<RefCell<Vec<String>>>,
}

impl TestEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(mut self, code: &str, holds: bool) -> Self {
        self.guards.insert(code.to_string(), holds);
        self
    }

    pub fn action(mut self, code: &str, sends: Vec<Event>) -> Self {
        self.actions.insert(code.to_string(), sends);
        self
    }

    pub fn condition(mut self, code: &str, holds: bool) -> Self {
        self.conditions.insert(code.to_string(), holds);
        self
    }

    /// Shared handle on the execution log.
    pub fn log_handle(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.log)
    }

    fn run(&mut self, code: &str) -> Vec<Event> {
        self.log.borrow_mut().push(code.to_string());
        self.actions.get(code).cloned().unwrap_or_default()
    }

    fn check(&self, scope: &EvalScope<'_>, conditions: &[String]) -> Vec<String> {
        conditions
            .iter()
            .filter(|code| !self.condition_holds(scope, code))
            .cloned()
            .collect()
    }

    fn condition_holds(&self, scope: &EvalScope<'_>, code: &str) -> bool {
        if let Some(state) = code.strip_prefix("active:") {
            return scope.active(state);
        }
        if let Some(state) = code.strip_prefix("inactive:") {
            return !scope.active(state);
        }
        self.conditions.get(code).copied().unwrap_or(true)
    }
}

impl Evaluator for TestEvaluator {
    fn execute_initialization(&mut self, code: &str) -> Result<(), EvalError> {
        self.log.borrow_mut().push(code.to_string());
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
        scope: &EvalScope<'_>,
        _key: &str,
        conditions: &[String],
        _event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        Ok(self.check(scope, conditions))
    }

    fn evaluate_postconditions(
        &mut self,
        scope: &EvalScope<'_>,
        _key: &str,
        conditions: &[String],
        _event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        Ok(self.check(scope, conditions))
    }

    fn evaluate_invariants(
        &mut self,
        scope: &EvalScope<'_>,
        _key: &str,
        conditions: &[String],
        _event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        Ok(self.check(scope, conditions))
    }

    fn context(&self) -> serde_json::Map<String, Value> {
        serde_json::Map::new()
    }

    fn context_for(&self, _state: &str) -> Option<serde_json::Map<String, Value>> {
        None
    }
}

/// A listener recording the kind of every meta-event it sees.
pub fn recording_listener() -> (Rc<RefCell<Vec<String>>>, impl FnMut(&MetaEvent)) {
    let record: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let handle = Rc::clone(&record);
    let listener = move |meta: &MetaEvent| {
        let entry = match meta {
            MetaEvent::StateEntered { state } => format!("state entered:{}", state),
            MetaEvent::StateExited { state } => format!("state exited:{}", state),
            MetaEvent::EventConsumed { event } => format!("event consumed:{}", event.name),
            MetaEvent::EventSent { event } => format!("event sent:{}", event.name),
            MetaEvent::TransitionProcessed { source, .. } => {
                format!("transition processed:{}", source)
            }
            MetaEvent::ContractViolated { kind, owner, .. } => {
                format!("contract violated:{}:{}", kind, owner)
            }
            other => other.kind().to_string(),
        };
        handle.borrow_mut().push(entry);
    };
    (record, listener)
}
