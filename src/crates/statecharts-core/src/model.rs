//! Immutable statechart data model: states, transitions, contracts, queries
//!
//! A [`Statechart`] is a validated, in-memory description of a hierarchical
//! state machine: a tree of [`State`]s rooted at a single compound root,
//! plus a list of [`Transition`]s between them. Construction goes through
//! [`StatechartBuilder`](crate::builder::StatechartBuilder), which validates
//! the structure once; after that the model never changes and may be shared
//! (`Arc`) between interpreters.
//!
//! # State variants
//!
//! | Variant | Extra attributes | Constraints |
//! |---------|------------------|-------------|
//! | Atomic | - | leaf |
//! | Compound | `initial`, ordered children | `initial` is an immediate child |
//! | Orthogonal | ordered children | >= 2 children, all compound or atomic |
//! | Final | - | leaf, no outgoing transitions |
//! | Shallow history | optional `memory` | leaf pseudo-state |
//! | Deep history | optional `memory` | leaf pseudo-state |
//!
//! Every non-history, non-final state may carry `on_entry`/`on_exit` code
//! and a [`Contract`]. Siblings keep a stable insertion order used for
//! deterministic traversal only, never for semantic priority.
//!
//! # Examples
//!
//! ```rust
//! use statecharts_core::builder::StatechartBuilder;
//! use statecharts_core::model::{State, Transition};
//!
//! let chart = StatechartBuilder::new("lamp")
//!     .root(State::compound("root", "off"))
//!     .state(State::atomic("off"), "root")
//!     .state(State::atomic("on"), "root")
//!     .transition(Transition::new("off").with_target("on").with_event("toggle"))
//!     .transition(Transition::new("on").with_target("off").with_event("toggle"))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(chart.root(), "root");
//! assert_eq!(chart.ancestors_for("off"), vec!["root"]);
//! assert_eq!(chart.events_for(["off", "on"]), vec!["toggle"]);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of a state, unique within its statechart.
pub type StateName = String;

/// A design-by-contract specification attached to a state or a transition.
///
/// Preconditions are checked before an entry or a transition application,
/// postconditions after an exit or application, and invariants both around
/// transitions and at the end of every macro step for active states.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preconditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postconditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invariants: Vec<String>,
}

impl Contract {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a precondition (checked "before").
    pub fn before(mut self, condition: impl Into<String>) -> Self {
        self.preconditions.push(condition.into());
        self
    }

    /// Add a postcondition (checked "after").
    pub fn after(mut self, condition: impl Into<String>) -> Self {
        self.postconditions.push(condition.into());
        self
    }

    /// Add an invariant (checked "always").
    pub fn always(mut self, condition: impl Into<String>) -> Self {
        self.invariants.push(condition.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.preconditions.is_empty() && self.postconditions.is_empty() && self.invariants.is_empty()
    }
}

/// The structural variant of a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateKind {
    /// Leaf state with no substates.
    Atomic,
    /// Composite state; exactly one child is active at a time.
    Compound {
        /// Immediate child entered by default.
        initial: StateName,
    },
    /// Parallel state; all children are active together.
    Orthogonal,
    /// Terminal leaf; no outgoing transitions.
    Final,
    /// Pseudo-state remembering the sibling that was last active.
    ShallowHistory {
        /// Default sibling to enter when no memory was recorded yet.
        memory: Option<StateName>,
    },
    /// Pseudo-state remembering the full nested configuration.
    DeepHistory {
        /// Default sibling to enter when no memory was recorded yet.
        memory: Option<StateName>,
    },
}

/// A single state of the chart.
///
/// Built through the named constructors ([`atomic`](State::atomic),
/// [`compound`](State::compound), ...) and decorated with the `with_*`
/// methods. History and final states carry no entry/exit code and no
/// contract; the constructors simply do not offer them and validation does
/// not need to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub name: StateName,
    pub kind: StateKind,
    pub on_entry: Option<String>,
    pub on_exit: Option<String>,
    #[serde(default, skip_serializing_if = "Contract::is_empty")]
    pub contract: Contract,
}

impl State {
    fn with_kind(name: impl Into<String>, kind: StateKind) -> Self {
        Self { name: name.into(), kind, on_entry: None, on_exit: None, contract: Contract::default() }
    }

    /// A leaf state.
    pub fn atomic(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::Atomic)
    }

    /// A composite state whose `initial` immediate child is entered by
    /// default.
    pub fn compound(name: impl Into<String>, initial: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::Compound { initial: initial.into() })
    }

    /// A parallel state; entering it enters all of its children.
    pub fn orthogonal(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::Orthogonal)
    }

    /// A final state.
    pub fn final_state(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::Final)
    }

    /// A shallow history pseudo-state with an optional default memory.
    pub fn shallow_history(name: impl Into<String>, memory: Option<String>) -> Self {
        Self::with_kind(name, StateKind::ShallowHistory { memory })
    }

    /// A deep history pseudo-state with an optional default memory.
    pub fn deep_history(name: impl Into<String>, memory: Option<String>) -> Self {
        Self::with_kind(name, StateKind::DeepHistory { memory })
    }

    /// Attach entry code.
    pub fn with_on_entry(mut self, code: impl Into<String>) -> Self {
        self.on_entry = Some(code.into());
        self
    }

    /// Attach exit code.
    pub fn with_on_exit(mut self, code: impl Into<String>) -> Self {
        self.on_exit = Some(code.into());
        self
    }

    /// Attach a contract.
    pub fn with_contract(mut self, contract: Contract) -> Self {
        self.contract = contract;
        self
    }

    pub fn is_history(&self) -> bool {
        matches!(self.kind, StateKind::ShallowHistory { .. } | StateKind::DeepHistory { .. })
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, StateKind::Final)
    }

    pub fn is_compound(&self) -> bool {
        matches!(self.kind, StateKind::Compound { .. })
    }

    pub fn is_orthogonal(&self) -> bool {
        matches!(self.kind, StateKind::Orthogonal)
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, StateKind::Atomic)
    }

    /// History default memory, if this is a history pseudo-state.
    pub fn history_memory(&self) -> Option<&StateName> {
        match &self.kind {
            StateKind::ShallowHistory { memory } | StateKind::DeepHistory { memory } => memory.as_ref(),
            _ => None,
        }
    }
}

/// A transition between states.
///
/// A transition without a target is **internal**: it exits and enters
/// nothing but still runs its action and contract checks. A transition
/// without an event is **eventless** and fires on guard truth alone. Higher
/// `priority` wins among transitions from the same source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub source: StateName,
    pub target: Option<StateName>,
    pub event: Option<String>,
    pub guard: Option<String>,
    pub action: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Contract::is_empty")]
    pub contract: Contract,
}

impl Transition {
    /// A transition from `source`, internal until a target is attached.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: None,
            event: None,
            guard: None,
            action: None,
            priority: 0,
            contract: Contract::default(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_contract(mut self, contract: Contract) -> Self {
        self.contract = contract;
        self
    }

    /// Whether this transition has no target.
    pub fn is_internal(&self) -> bool {
        self.target.is_none()
    }

    /// Whether this transition fires on guard truth alone.
    pub fn is_eventless(&self) -> bool {
        self.event.is_none()
    }

    /// Human-readable description, used in contract error payloads.
    pub fn describe(&self) -> String {
        let mut text = format!("transition from {}", self.source);
        if let Some(target) = &self.target {
            text.push_str(&format!(" to {}", target));
        }
        if let Some(event) = &self.event {
            text.push_str(&format!(" on {}", event));
        }
        text
    }
}

/// An immutable, validated statechart.
///
/// Holds the state tree (with parent/children/depth indexes computed once)
/// and the transitions. All queries are read-only; interpreters share the
/// chart behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Statechart {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) preamble: Option<String>,
    pub(crate) root: StateName,
    pub(crate) states: HashMap<StateName, State>,
    pub(crate) children: HashMap<StateName, Vec<StateName>>,
    pub(crate) parent: HashMap<StateName, StateName>,
    pub(crate) depth: HashMap<StateName, usize>,
    pub(crate) transitions: Vec<Transition>,
}

impl Statechart {
    /// The statechart's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Optional initialization code executed when an interpreter is created.
    pub fn preamble(&self) -> Option<&str> {
        self.preamble.as_deref()
    }

    /// Name of the root state.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// All states, unordered.
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.values()
    }

    /// All transitions, in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Look up a state by name.
    pub fn state_for(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    /// Parent of a state; `None` for the root.
    pub fn parent_for(&self, name: &str) -> Option<&str> {
        self.parent.get(name).map(String::as_str)
    }

    /// Immediate children of a state, in insertion order.
    pub fn children_for(&self, name: &str) -> &[StateName] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Outgoing transitions of a state, in declaration order.
    pub fn transitions_from<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Transition> {
        self.transitions.iter().filter(move |t| t.source == name)
    }

    /// Ancestors of a state, root first, root-inclusive; empty for the root.
    pub fn ancestors_for(&self, name: &str) -> Vec<StateName> {
        let mut chain = Vec::new();
        let mut current = name;
        while let Some(parent) = self.parent_for(current) {
            chain.push(parent.to_string());
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// All descendants of a state, breadth first.
    pub fn descendants_for(&self, name: &str) -> Vec<StateName> {
        let mut result = Vec::new();
        let mut frontier: Vec<&str> = vec![name];
        while let Some(current) = frontier.pop() {
            for child in self.children_for(current) {
                result.push(child.clone());
                frontier.push(child);
            }
        }
        result
    }

    /// Whether `ancestor` is a strict ancestor of `name`.
    pub fn is_ancestor(&self, ancestor: &str, name: &str) -> bool {
        let mut current = name;
        while let Some(parent) = self.parent_for(current) {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Depth of a state; the root has depth 1.
    pub fn depth_for(&self, name: &str) -> usize {
        self.depth.get(name).copied().unwrap_or(0)
    }

    /// Event names referenced by transitions from the given states, sorted
    /// and deduplicated.
    pub fn events_for<I, S>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sources: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        let mut events: Vec<String> = self
            .transitions
            .iter()
            .filter(|t| sources.iter().any(|s| *s == t.source))
            .filter_map(|t| t.event.clone())
            .collect();
        events.sort();
        events.dedup();
        events
    }

    /// Deepest state that is a strict ancestor of both `a` and `b`.
    ///
    /// `None` when one of them is the root (nothing lies above the root):
    /// the caller then treats the whole chart as the transition scope.
    pub fn least_common_ancestor(&self, a: &str, b: &str) -> Option<StateName> {
        let ancestors_a = self.ancestors_for(a);
        let ancestors_b = self.ancestors_for(b);
        ancestors_a
            .iter()
            .zip(ancestors_b.iter())
            .take_while(|(x, y)| x == y)
            .last()
            .map(|(x, _)| x.clone())
    }

    /// Whether `a` and `b` lie under different children of an orthogonal
    /// state, i.e. in distinct parallel regions.
    pub fn in_distinct_regions(&self, a: &str, b: &str) -> bool {
        match self.least_common_ancestor(a, b) {
            Some(lca) => self
                .state_for(&lca)
                .map(|state| state.is_orthogonal())
                .unwrap_or(false),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StatechartBuilder;

    fn nested_chart() -> Statechart {
        // root
        //   a (compound, initial a1)
        //     a1, a2
        //   p (orthogonal)
        //     r1 (compound, initial r1a): r1a, r1b
        //     r2 (compound, initial r2a): r2a
        StatechartBuilder::new("nested")
            .root(State::compound("root", "a"))
            .state(State::compound("a", "a1"), "root")
            .state(State::atomic("a1"), "a")
            .state(State::atomic("a2"), "a")
            .state(State::orthogonal("p"), "root")
            .state(State::compound("r1", "r1a"), "p")
            .state(State::atomic("r1a"), "r1")
            .state(State::atomic("r1b"), "r1")
            .state(State::compound("r2", "r2a"), "p")
            .state(State::atomic("r2a"), "r2")
            .transition(Transition::new("a1").with_target("a2").with_event("go"))
            .transition(Transition::new("a2").with_target("p").with_event("split"))
            .transition(Transition::new("r1a").with_target("r1b").with_event("step"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_ancestors_root_first() {
        let chart = nested_chart();
        assert_eq!(chart.ancestors_for("r1a"), vec!["root", "p", "r1"]);
        assert!(chart.ancestors_for("root").is_empty());
    }

    #[test]
    fn test_descendants() {
        let chart = nested_chart();
        let mut descendants = chart.descendants_for("p");
        descendants.sort();
        assert_eq!(descendants, vec!["r1", "r1a", "r1b", "r2", "r2a"]);
        assert!(chart.descendants_for("a1").is_empty());
    }

    #[test]
    fn test_depth() {
        let chart = nested_chart();
        assert_eq!(chart.depth_for("root"), 1);
        assert_eq!(chart.depth_for("a"), 2);
        assert_eq!(chart.depth_for("r1a"), 4);
    }

    #[test]
    fn test_least_common_ancestor() {
        let chart = nested_chart();
        assert_eq!(chart.least_common_ancestor("a1", "a2"), Some("a".to_string()));
        assert_eq!(chart.least_common_ancestor("a1", "r1a"), Some("root".to_string()));
        assert_eq!(chart.least_common_ancestor("r1a", "r2a"), Some("p".to_string()));
        // Source inside target: the LCA sits above both.
        assert_eq!(chart.least_common_ancestor("r1a", "r1"), Some("p".to_string()));
        assert_eq!(chart.least_common_ancestor("root", "a1"), None);
    }

    #[test]
    fn test_distinct_regions() {
        let chart = nested_chart();
        assert!(chart.in_distinct_regions("r1a", "r2a"));
        assert!(chart.in_distinct_regions("r1b", "r2"));
        assert!(!chart.in_distinct_regions("a1", "a2"));
        assert!(!chart.in_distinct_regions("a1", "r1a"));
    }

    #[test]
    fn test_events_for() {
        let chart = nested_chart();
        assert_eq!(chart.events_for(["a1", "a2"]), vec!["go", "split"]);
        assert_eq!(chart.events_for(["r2a"]), Vec::<String>::new());
    }

    #[test]
    fn test_transitions_from() {
        let chart = nested_chart();
        let from_a1: Vec<_> = chart.transitions_from("a1").collect();
        assert_eq!(from_a1.len(), 1);
        assert_eq!(from_a1[0].target.as_deref(), Some("a2"));
    }

    #[test]
    fn test_transition_describe() {
        let t = Transition::new("a").with_target("b").with_event("go");
        assert_eq!(t.describe(), "transition from a to b on go");
        let t = Transition::new("a").with_guard("x > 0");
        assert_eq!(t.describe(), "transition from a");
    }
}
