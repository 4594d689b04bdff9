//! # statecharts-core - A discrete, observable statechart interpreter
//!
//! Execution engine for hierarchical state machines in the UML/SCXML
//! statechart family: composite, orthogonal (parallel), history and final
//! states, transitions with guards, actions and priorities, design-by-
//! contract conditions, and delayed events.
//!
//! ## Overview
//!
//! The crate splits the problem in five parts:
//!
//! - **Model** ([`model`], [`builder`]) - an immutable, validated state
//!   tree plus transitions. Built once, shared freely (`Arc`).
//! - **Clock** ([`clock`]) - an abstract time source. Simulated (manual),
//!   wall (UTC) and synchronized-to-interpreter variants.
//! - **Events** ([`event`]) - external, internal and meta events, and the
//!   dual FIFO queue with delayed-release semantics.
//! - **Evaluator** ([`evaluator`]) - the capability the engine invokes for
//!   guards, actions and contracts. The engine is agnostic to the
//!   expression language; concrete evaluators live outside this crate.
//! - **Interpreter** ([`interpreter`]) - the executor: transition
//!   selection under hierarchy and orthogonality, micro/macro steps,
//!   stabilization, contract enforcement, meta-event notification.
//!
//! ## Execution model
//!
//! Everything is synchronous and single-threaded. A call to
//! [`Interpreter::execute_once`] advances the chart by at most one macro
//! step and returns a full record of what happened; the caller advances
//! the clock and queues events between calls. Two interpreters can be
//! [bound](Interpreter::bind_interpreter) so that the internal events of
//! one are queued as external events on the other, including cyclically.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use statecharts_core::{Interpreter, import_from_yaml};
//! # use statecharts_core::evaluator::{EvalError, EvalScope, Evaluator};
//! # use statecharts_core::event::Event;
//! # use statecharts_core::model::State;
//! # struct Noop;
//! # impl Evaluator for Noop {
//! #     fn execute_initialization(&mut self, _: &str) -> Result<(), EvalError> { Ok(()) }
//! #     fn evaluate_guard(&mut self, _: &EvalScope<'_>, _: &str, _: Option<&Event>) -> Result<bool, EvalError> { Ok(true) }
//! #     fn execute_action(&mut self, _: &EvalScope<'_>, _: &str, _: Option<&Event>) -> Result<Vec<Event>, EvalError> { Ok(vec![]) }
//! #     fn execute_on_entry(&mut self, _: &EvalScope<'_>, _: &State) -> Result<Vec<Event>, EvalError> { Ok(vec![]) }
//! #     fn execute_on_exit(&mut self, _: &EvalScope<'_>, _: &State) -> Result<Vec<Event>, EvalError> { Ok(vec![]) }
//! #     fn evaluate_preconditions(&mut self, _: &EvalScope<'_>, _: &str, _: &[String], _: Option<&Event>) -> Result<Vec<String>, EvalError> { Ok(vec![]) }
//! #     fn evaluate_postconditions(&mut self, _: &EvalScope<'_>, _: &str, _: &[String], _: Option<&Event>) -> Result<Vec<String>, EvalError> { Ok(vec![]) }
//! #     fn evaluate_invariants(&mut self, _: &EvalScope<'_>, _: &str, _: &[String], _: Option<&Event>) -> Result<Vec<String>, EvalError> { Ok(vec![]) }
//! #     fn context(&self) -> serde_json::Map<String, serde_json::Value> { serde_json::Map::new() }
//! #     fn context_for(&self, _: &str) -> Option<serde_json::Map<String, serde_json::Value>> { None }
//! # }
//!
//! let chart = Arc::new(import_from_yaml(r#"
//! statechart:
//!   name: lamp
//!   root state:
//!     name: root
//!     initial: off
//!     states:
//!       - name: off
//!         transitions: [{target: on, event: toggle}]
//!       - name: on
//!         transitions: [{target: off, event: toggle}]
//! "#).unwrap());
//!
//! let mut interpreter = Interpreter::new(chart, Noop).unwrap();
//! interpreter.execute_once().unwrap();                 // enters {root, off}
//! interpreter.queue("toggle");
//! interpreter.execute_once().unwrap();                 // moves to {root, on}
//! assert!(interpreter.configuration().contains(&"on".to_string()));
//! ```
//!
//! ## Module organization
//!
//! - [`model`] - states, transitions, contracts, tree queries
//! - [`builder`] - fluent construction and validation
//! - [`clock`] - simulated / UTC / synchronized clocks
//! - [`event`] - events, meta-events, queues
//! - [`evaluator`] - the evaluator trait and predicate scope
//! - [`step`] - macro/micro step records (the trace)
//! - [`interpreter`] - the execution engine
//! - [`listener`] - meta-event listeners, binding, property statecharts
//! - [`helpers`] - meta-event logging and trace coverage utilities
//! - [`yaml`] - textual import/export
//! - [`error`] - the error taxonomy

pub mod builder;
pub mod clock;
pub mod error;
pub mod event;
pub mod evaluator;
pub mod helpers;
pub mod interpreter;
pub mod listener;
pub mod model;
pub mod step;
pub mod yaml;

pub use builder::StatechartBuilder;
pub use clock::{Clock, SimulatedClock, SynchronizedClock, TimeHandle, UtcClock};
pub use error::{ContractKind, Result, StatechartError};
pub use event::{Event, EventQueue, MetaEvent};
pub use evaluator::{EvalError, EvalScope, Evaluator};
pub use helpers::{state_coverage, transition_coverage, MetaEventLog};
pub use interpreter::{Interpreter, InterpreterOptions};
pub use listener::{EventForwarder, ListenerId, PropertyStatechart, StepListener};
pub use model::{Contract, State, StateKind, StateName, Statechart, Transition};
pub use step::{MacroStep, MicroStep};
pub use yaml::{export_to_yaml, import_from_yaml, PRIORITY_HIGH, PRIORITY_LOW};
