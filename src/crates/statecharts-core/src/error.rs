//! Error types and error handling for statechart operations
//!
//! This module defines all error types that can occur during statechart
//! construction, validation, and interpretation. All errors implement
//! `std::error::Error` via the `thiserror` crate.
//!
//! # Error Hierarchy
//!
//! ```text
//! StatechartError
//! ├── Structure           - Statechart validation errors (build time)
//! ├── Clock               - Clock misuse (e.g. rewinding a simulated clock)
//! ├── NonDeterminism      - Conflicting transitions in one region
//! ├── Precondition        - A contract precondition evaluated false
//! ├── Postcondition       - A contract postcondition evaluated false
//! ├── Invariant           - A contract invariant evaluated false
//! ├── PropertyStatechart  - An attached property statechart reached final
//! ├── Evaluator           - The evaluator failed in a guard/action/contract
//! └── Yaml                - Import/export errors
//! ```
//!
//! # Error Handling Patterns
//!
//! ```rust
//! use statecharts_core::error::StatechartError;
//!
//! fn handle(err: StatechartError) {
//!     match err {
//!         StatechartError::Structure(msg) => {
//!             eprintln!("Statechart invalid: {}", msg);
//!         }
//!         StatechartError::Precondition { owner, assertion, .. } => {
//!             eprintln!("Precondition '{}' failed on {}", assertion, owner);
//!         }
//!         StatechartError::NonDeterminism { sources, .. } => {
//!             eprintln!("Conflicting transitions from {:?}", sources);
//!         }
//!         _ => eprintln!("Error: {}", err),
//!     }
//! }
//! ```
//!
//! Contract errors carry the offending owner (a state or a transition), the
//! assertion text, a description of the step being applied, and the active
//! configuration at the time of the failure, so a violation can be diagnosed
//! without re-running the chart.

use thiserror::Error;

use crate::evaluator::EvalError;

/// Convenience result type using [`StatechartError`]
pub type Result<T> = std::result::Result<T, StatechartError>;

/// The three kinds of design-by-contract conditions.
///
/// Used to tag contract-violation meta-events so listeners can distinguish
/// failed preconditions from failed postconditions and invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    /// Checked before a state is entered or a transition is applied
    Precondition,
    /// Checked after a state is exited or a transition is applied
    Postcondition,
    /// Checked around transitions and at the end of every macro step
    Invariant,
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractKind::Precondition => write!(f, "precondition"),
            ContractKind::Postcondition => write!(f, "postcondition"),
            ContractKind::Invariant => write!(f, "invariant"),
        }
    }
}

/// Comprehensive error type for all statechart operations
///
/// `StatechartError` represents all errors that can occur while building a
/// statechart or driving an interpreter. Errors raised from
/// `Interpreter::execute_once` are fatal to that invocation only: a later
/// invocation behaves as if the failed macro step never occurred, beyond the
/// precise effects that completed before the failure.
///
/// # Error Categories
///
/// - **Construction**: `Structure`, `Yaml`
/// - **Execution**: `NonDeterminism`, `Evaluator`, `Clock`
/// - **Contracts**: `Precondition`, `Postcondition`, `Invariant`,
///   `PropertyStatechart`
#[derive(Error, Debug)]
pub enum StatechartError {
    /// Statechart structure validation failed
    ///
    /// Occurs at build time when the state tree or the transitions are
    /// invalid: a dangling target, a compound state without an initial child,
    /// an orthogonal state with fewer than two children, and so on.
    #[error("invalid statechart structure: {0}")]
    Structure(String),

    /// A clock was driven incorrectly
    ///
    /// The only current cause is writing a strictly smaller time to a
    /// simulated clock, which would break time monotonicity.
    #[error("clock error: {0}")]
    Clock(String),

    /// Two or more transitions conflict within a single region
    ///
    /// After guard, priority and inner-first filtering, at least two
    /// candidate transitions remained whose sources are at the same depth and
    /// not in distinct orthogonal regions. The interpreter refuses to pick
    /// one silently.
    #[error("non-deterministic choice between transitions from [{}]{}",
        sources.join(", "),
        event.as_ref().map(|e| format!(" for event '{}'", e)).unwrap_or_default())]
    NonDeterminism {
        /// Source states of the conflicting transitions
        sources: Vec<String>,
        /// The event being processed, if any (eventless otherwise)
        event: Option<String>,
    },

    /// A precondition evaluated false
    #[error("precondition '{assertion}' failed on {owner} during {step} (configuration: [{}])",
        configuration.join(", "))]
    Precondition {
        /// The state or transition carrying the contract
        owner: String,
        /// The assertion text that evaluated false
        assertion: String,
        /// Description of the step being applied
        step: String,
        /// Active configuration at the time of the failure
        configuration: Vec<String>,
    },

    /// A postcondition evaluated false
    #[error("postcondition '{assertion}' failed on {owner} during {step} (configuration: [{}])",
        configuration.join(", "))]
    Postcondition {
        /// The state or transition carrying the contract
        owner: String,
        /// The assertion text that evaluated false
        assertion: String,
        /// Description of the step being applied
        step: String,
        /// Active configuration at the time of the failure
        configuration: Vec<String>,
    },

    /// An invariant evaluated false
    #[error("invariant '{assertion}' failed on {owner} during {step} (configuration: [{}])",
        configuration.join(", "))]
    Invariant {
        /// The state or transition carrying the contract
        owner: String,
        /// The assertion text that evaluated false
        assertion: String,
        /// Description of the step being applied
        step: String,
        /// Active configuration at the time of the failure
        configuration: Vec<String>,
    },

    /// An attached property statechart reached a final state
    ///
    /// Property statecharts observe the meta-event stream; reaching one of
    /// their final states signals that the observed execution violated the
    /// property they encode. This is raised from `execute_once` on the parent
    /// interpreter (fail-fast).
    #[error("property statechart '{name}' reached a final state")]
    PropertyStatechart {
        /// Name of the property statechart that failed
        name: String,
    },

    /// The evaluator surfaced an error in a guard, action or contract
    ///
    /// Wraps the message reported by the [`Evaluator`](crate::Evaluator)
    /// implementation, e.g. a parse error or an unknown variable in a code
    /// fragment.
    #[error("evaluator error: {0}")]
    Evaluator(#[from] EvalError),

    /// YAML import or export failed
    ///
    /// Wraps errors from `serde_yaml` raised while reading or writing the
    /// textual statechart format.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StatechartError {
    /// Create a contract error of the given kind.
    ///
    /// Helper used by the interpreter so the three contract variants share
    /// one construction path.
    pub fn contract(
        kind: ContractKind,
        owner: impl Into<String>,
        assertion: impl Into<String>,
        step: impl Into<String>,
        configuration: Vec<String>,
    ) -> Self {
        let owner = owner.into();
        let assertion = assertion.into();
        let step = step.into();
        match kind {
            ContractKind::Precondition => Self::Precondition { owner, assertion, step, configuration },
            ContractKind::Postcondition => Self::Postcondition { owner, assertion, step, configuration },
            ContractKind::Invariant => Self::Invariant { owner, assertion, step, configuration },
        }
    }
}
