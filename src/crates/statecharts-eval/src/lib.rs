//! # statecharts-eval - Evaluators for the rstatecharts interpreter
//!
//! The interpreter core (`statecharts-core`) is agnostic to the expression
//! language used in guards, actions and contracts: it only requires the
//! [`Evaluator`](statecharts_core::Evaluator) capability. This crate ships
//! the concrete evaluators:
//!
//! - [`ExpressionEvaluator`] - a small, dynamically typed expression
//!   language over JSON values with per-state lexical scoping, the
//!   interpreter-provided predicates (`after`, `idle`, `active`, `sent`,
//!   `received`), `send(...)` inside actions, and `old(...)` in contracts.
//! - [`ScriptedEvaluator`] - table-driven, deterministic, for tests that
//!   pin guard results and action emissions per code fragment.
//! - [`NoopEvaluator`] - satisfies every guard and executes nothing, for
//!   purely structural charts.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use statecharts_core::{import_from_yaml, Interpreter};
//! use statecharts_eval::ExpressionEvaluator;
//!
//! let chart = Arc::new(import_from_yaml(r#"
//! statechart:
//!   name: counter
//!   preamble: count = 0
//!   root state:
//!     name: root
//!     initial: counting
//!     states:
//!       - name: counting
//!         transitions:
//!           - event: tick
//!             action: count = count + 1
//! "#).unwrap());
//!
//! let evaluator = ExpressionEvaluator::new(Arc::clone(&chart));
//! let mut interpreter = Interpreter::new(chart, evaluator).unwrap();
//! interpreter.queue("tick").queue("tick");
//! interpreter.execute(None).unwrap();
//! assert_eq!(interpreter.context().get("count"), Some(&serde_json::json!(2)));
//! ```

pub mod ast;
pub mod evaluator;
pub mod parser;
pub mod scope;
pub mod scripted;

pub use evaluator::ExpressionEvaluator;
pub use parser::parse;
pub use scope::ScopeStore;
pub use scripted::{NoopEvaluator, ScriptedEvaluator};
