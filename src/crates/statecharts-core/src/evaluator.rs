//! The evaluator capability the interpreter depends on
//!
//! The interpreter is agnostic to the expression language used in guards,
//! actions, entry/exit code and contracts: it only requires an
//! implementation of the [`Evaluator`] trait. Concrete evaluators (an
//! expression-string evaluator, a no-op evaluator, a scripted evaluator for
//! tests) live outside this crate.
//!
//! For every call the interpreter hands the evaluator an [`EvalScope`]: a
//! read-only view of the running step carrying the sampled time, the live
//! configuration, per-state entry times and the step's event traffic. The
//! scope implements the time and event predicates (`after`, `idle`,
//! `active`, `sent`, `received`) so that every evaluator shares their
//! semantics; an evaluator only has to surface them in its language.
//!
//! Contract evaluation is keyed: `evaluate_preconditions` receives a stable
//! `key` for the contract owner and is expected to freeze an "old" snapshot
//! of the visible context under that key, which the paired postcondition and
//! invariant checks may consult.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::event::Event;
use crate::model::State;

/// Error surfaced by an evaluator in a guard, action or contract.
///
/// The interpreter wraps this into
/// [`StatechartError::Evaluator`](crate::error::StatechartError::Evaluator).
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Read-only view of the running step, handed to every evaluator call.
///
/// Holds everything the built-in predicates need. `state` is the scope
/// owner: the transition source for guards and actions, the carrying state
/// for entry/exit code and state contracts.
#[derive(Debug, Clone, Copy)]
pub struct EvalScope<'a> {
    /// The step's sampled clock value.
    pub time: f64,
    /// The state in whose scope the code runs.
    pub state: Option<&'a str>,
    /// The live configuration, updated incrementally as states exit/enter.
    pub configuration: &'a [String],
    /// Clock value at the last entry of each active state.
    pub entry_times: &'a HashMap<String, f64>,
    /// Clock value of the last transition processed.
    pub last_transition_at: f64,
    /// Events sent so far during the current step.
    pub sent_events: &'a [Event],
    /// The event consumed by the current step, if any.
    pub consumed: Option<&'a Event>,
}

impl<'a> EvalScope<'a> {
    /// True once the owning state has been active for at least `seconds`,
    /// measured against the step's sampled time.
    pub fn after(&self, seconds: f64) -> bool {
        match self.state.and_then(|s| self.entry_times.get(s)) {
            Some(entered_at) => self.time - entered_at >= seconds,
            None => false,
        }
    }

    /// True once no transition has been processed for at least `seconds`.
    pub fn idle(&self, seconds: f64) -> bool {
        self.time - self.last_transition_at >= seconds
    }

    /// Whether the named state is in the (live) configuration.
    pub fn active(&self, name: &str) -> bool {
        self.configuration.iter().any(|s| s == name)
    }

    /// Whether an event with the given name was sent during this step.
    pub fn sent(&self, name: &str) -> bool {
        self.sent_events.iter().any(|e| e.name == name)
    }

    /// Whether the event consumed by this step has the given name.
    pub fn received(&self, name: &str) -> bool {
        self.consumed.map(|e| e.name == name).unwrap_or(false)
    }
}

/// External capability invoked for every code fragment of a chart.
///
/// Action-like methods return the internal events emitted through the
/// language's `send(...)` function; the interpreter buffers those and
/// releases them at the end of the macro step. Contract methods return the
/// list of assertions that evaluated false (an empty list means the contract
/// holds).
pub trait Evaluator {
    /// Execute the chart's preamble. Called once, at interpreter creation.
    fn execute_initialization(&mut self, code: &str) -> Result<(), EvalError>;

    /// Evaluate a guard expression to a boolean.
    fn evaluate_guard(
        &mut self,
        scope: &EvalScope<'_>,
        code: &str,
        event: Option<&Event>,
    ) -> Result<bool, EvalError>;

    /// Execute a transition action; returns the events it sent.
    fn execute_action(
        &mut self,
        scope: &EvalScope<'_>,
        code: &str,
        event: Option<&Event>,
    ) -> Result<Vec<Event>, EvalError>;

    /// Execute a state's entry code; returns the events it sent.
    fn execute_on_entry(&mut self, scope: &EvalScope<'_>, state: &State) -> Result<Vec<Event>, EvalError>;

    /// Execute a state's exit code; returns the events it sent.
    fn execute_on_exit(&mut self, scope: &EvalScope<'_>, state: &State) -> Result<Vec<Event>, EvalError>;

    /// Evaluate preconditions; returns the assertions that failed.
    ///
    /// Implementations freeze the visible context under `key` so the paired
    /// postcondition/invariant checks can expose it as the "old" context.
    fn evaluate_preconditions(
        &mut self,
        scope: &EvalScope<'_>,
        key: &str,
        conditions: &[String],
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError>;

    /// Evaluate postconditions; returns the assertions that failed.
    fn evaluate_postconditions(
        &mut self,
        scope: &EvalScope<'_>,
        key: &str,
        conditions: &[String],
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError>;

    /// Evaluate invariants; returns the assertions that failed.
    fn evaluate_invariants(
        &mut self,
        scope: &EvalScope<'_>,
        key: &str,
        conditions: &[String],
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError>;

    /// Read-only snapshot of the whole evaluation context, flattened.
    fn context(&self) -> serde_json::Map<String, Value>;

    /// Read-only snapshot of the context visible from one state, or `None`
    /// if the evaluator tracks no per-state scope for it.
    fn context_for(&self, state: &str) -> Option<serde_json::Map<String, Value>>;
}
