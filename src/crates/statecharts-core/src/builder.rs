//! Fluent construction API producing validated statecharts
//!
//! [`StatechartBuilder`] accumulates states and transitions and performs the
//! whole structural validation once, in [`build`](StatechartBuilder::build).
//! Nothing is checked while adding, so declaration order is free: a
//! transition may reference a state added later.
//!
//! # Validation rules
//!
//! - Exactly one root state, and it is compound (an orthogonal state is not
//!   allowed at the top level: wrap it in a compound state).
//! - State names are unique; every non-root state has a known parent.
//! - Every transition source and target resolves to an existing state.
//! - Every compound state's `initial` is one of its immediate children.
//! - Every orthogonal state has at least two children, all compound or
//!   atomic.
//! - Final and history states have no children and no outgoing transitions.
//! - A history pseudo-state's default `memory` is an immediate sibling.
//! - An internal transition (no target) declares an event or a guard, which
//!   precludes trivial infinite loops.
//!
//! Any violation fails the build with [`StatechartError::Structure`].
//!
//! # Examples
//!
//! ```rust
//! use statecharts_core::builder::StatechartBuilder;
//! use statecharts_core::model::{State, Transition};
//!
//! let chart = StatechartBuilder::new("microwave")
//!     .description("A door and a magnetron")
//!     .preamble("power = 0")
//!     .root(State::compound("root", "closed"))
//!     .state(State::atomic("closed"), "root")
//!     .state(State::atomic("open"), "root")
//!     .transition(Transition::new("closed").with_target("open").with_event("door_opened"))
//!     .transition(Transition::new("open").with_target("closed").with_event("door_closed"))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(chart.children_for("root"), ["closed", "open"]);
//! ```

use std::collections::HashMap;

use crate::error::{Result, StatechartError};
use crate::model::{State, StateKind, Statechart, Transition};

/// Accumulates states and transitions, then validates and builds.
#[derive(Debug, Default)]
pub struct StatechartBuilder {
    name: String,
    description: Option<String>,
    preamble: Option<String>,
    root: Option<State>,
    states: Vec<(State, String)>,
    transitions: Vec<Transition>,
}

impl StatechartBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Initialization code executed by the evaluator when an interpreter is
    /// created over the chart.
    pub fn preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    /// Declare the root state.
    pub fn root(mut self, state: State) -> Self {
        self.root = Some(state);
        self
    }

    /// Declare a state under the given parent. Sibling order follows the
    /// declaration order.
    pub fn state(mut self, state: State, parent: impl Into<String>) -> Self {
        self.states.push((state, parent.into()));
        self
    }

    /// Declare a transition.
    pub fn transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Assemble the tree, validate it, and produce the immutable chart.
    pub fn build(self) -> Result<Statechart> {
        let root = self
            .root
            .ok_or_else(|| StatechartError::Structure("statechart has no root state".to_string()))?;
        let root_name = root.name.clone();

        let mut states: HashMap<String, State> = HashMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        let mut parent: HashMap<String, String> = HashMap::new();

        states.insert(root_name.clone(), root);
        children.insert(root_name.clone(), Vec::new());

        for (state, parent_name) in self.states {
            if states.contains_key(&state.name) {
                return Err(StatechartError::Structure(format!(
                    "duplicate state name '{}'",
                    state.name
                )));
            }
            if state.name == parent_name {
                return Err(StatechartError::Structure(format!(
                    "state '{}' cannot be its own parent",
                    state.name
                )));
            }
            children.entry(state.name.clone()).or_default();
            children.entry(parent_name.clone()).or_default().push(state.name.clone());
            parent.insert(state.name.clone(), parent_name);
            states.insert(state.name.clone(), state);
        }

        // Every referenced parent must itself be a declared state.
        for (child, parent_name) in &parent {
            if !states.contains_key(parent_name) {
                return Err(StatechartError::Structure(format!(
                    "state '{}' declares unknown parent '{}'",
                    child, parent_name
                )));
            }
        }

        let mut depth = HashMap::new();
        let mut frontier = vec![(root_name.clone(), 1usize)];
        while let Some((name, level)) = frontier.pop() {
            depth.insert(name.clone(), level);
            for child in children.get(&name).into_iter().flatten() {
                frontier.push((child.clone(), level + 1));
            }
        }
        // Depth covers exactly the states reachable from the root; anything
        // else was attached to a parent outside the tree.
        for name in states.keys() {
            if !depth.contains_key(name) {
                return Err(StatechartError::Structure(format!(
                    "state '{}' is not reachable from the root",
                    name
                )));
            }
        }

        let chart = Statechart {
            name: self.name,
            description: self.description,
            preamble: self.preamble,
            root: root_name,
            states,
            children,
            parent,
            depth,
            transitions: self.transitions,
        };
        validate(&chart)?;
        Ok(chart)
    }
}

/// Structural validation, run once at build time.
fn validate(chart: &Statechart) -> Result<()> {
    let root = chart
        .state_for(chart.root())
        .expect("root state is present by construction");
    if !root.is_compound() {
        return Err(StatechartError::Structure(format!(
            "root state '{}' must be a compound state",
            root.name
        )));
    }

    for state in chart.states.values() {
        let state_children = chart.children_for(&state.name);
        match &state.kind {
            StateKind::Compound { initial } => {
                if !state_children.contains(initial) {
                    return Err(StatechartError::Structure(format!(
                        "compound state '{}' declares initial '{}' which is not one of its children",
                        state.name, initial
                    )));
                }
            }
            StateKind::Orthogonal => {
                if state_children.len() < 2 {
                    return Err(StatechartError::Structure(format!(
                        "orthogonal state '{}' must have at least two children",
                        state.name
                    )));
                }
                for child in state_children {
                    let child_state = chart.state_for(child).expect("children are declared states");
                    if !(child_state.is_compound() || child_state.is_atomic()) {
                        return Err(StatechartError::Structure(format!(
                            "orthogonal state '{}' has child '{}' which is neither compound nor atomic",
                            state.name, child
                        )));
                    }
                }
            }
            StateKind::Atomic => {
                if !state_children.is_empty() {
                    return Err(StatechartError::Structure(format!(
                        "atomic state '{}' cannot have substates",
                        state.name
                    )));
                }
            }
            StateKind::Final => {
                if !state_children.is_empty() {
                    return Err(StatechartError::Structure(format!(
                        "final state '{}' cannot have substates",
                        state.name
                    )));
                }
                if chart.transitions_from(&state.name).next().is_some() {
                    return Err(StatechartError::Structure(format!(
                        "final state '{}' cannot have outgoing transitions",
                        state.name
                    )));
                }
            }
            StateKind::ShallowHistory { memory } | StateKind::DeepHistory { memory } => {
                if !state_children.is_empty() {
                    return Err(StatechartError::Structure(format!(
                        "history state '{}' cannot have substates",
                        state.name
                    )));
                }
                if chart.transitions_from(&state.name).next().is_some() {
                    return Err(StatechartError::Structure(format!(
                        "history state '{}' cannot have outgoing transitions",
                        state.name
                    )));
                }
                if let Some(memory) = memory {
                    let siblings = chart
                        .parent_for(&state.name)
                        .map(|p| chart.children_for(p))
                        .unwrap_or(&[]);
                    if !siblings.contains(memory) {
                        return Err(StatechartError::Structure(format!(
                            "history state '{}' declares memory '{}' which is not an immediate sibling",
                            state.name, memory
                        )));
                    }
                }
            }
        }
    }

    for transition in &chart.transitions {
        if chart.state_for(&transition.source).is_none() {
            return Err(StatechartError::Structure(format!(
                "transition source '{}' does not exist",
                transition.source
            )));
        }
        if let Some(target) = &transition.target {
            if chart.state_for(target).is_none() {
                return Err(StatechartError::Structure(format!(
                    "transition target '{}' does not exist",
                    target
                )));
            }
        }
        if transition.is_internal() && transition.event.is_none() && transition.guard.is_none() {
            return Err(StatechartError::Structure(format!(
                "internal transition from '{}' must declare an event or a guard",
                transition.source
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{State, Transition};

    fn assert_structure_error(result: Result<Statechart>, fragment: &str) {
        match result {
            Err(StatechartError::Structure(message)) => {
                assert!(
                    message.contains(fragment),
                    "expected '{}' in '{}'",
                    fragment,
                    message
                );
            }
            other => panic!("expected structure error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_root() {
        assert_structure_error(StatechartBuilder::new("empty").build(), "no root");
    }

    #[test]
    fn test_root_must_be_compound() {
        let result = StatechartBuilder::new("bad")
            .root(State::orthogonal("root"))
            .state(State::atomic("a"), "root")
            .state(State::atomic("b"), "root")
            .build();
        assert_structure_error(result, "must be a compound state");
    }

    #[test]
    fn test_duplicate_names() {
        let result = StatechartBuilder::new("dup")
            .root(State::compound("root", "a"))
            .state(State::atomic("a"), "root")
            .state(State::atomic("a"), "root")
            .build();
        assert_structure_error(result, "duplicate state name");
    }

    #[test]
    fn test_unknown_parent() {
        let result = StatechartBuilder::new("orphan")
            .root(State::compound("root", "a"))
            .state(State::atomic("a"), "root")
            .state(State::atomic("b"), "nowhere")
            .build();
        assert_structure_error(result, "unknown parent");
    }

    #[test]
    fn test_compound_initial_must_be_child() {
        let result = StatechartBuilder::new("bad-initial")
            .root(State::compound("root", "b"))
            .state(State::atomic("a"), "root")
            .build();
        assert_structure_error(result, "initial 'b'");
    }

    #[test]
    fn test_orthogonal_needs_two_children() {
        let result = StatechartBuilder::new("lonely")
            .root(State::compound("root", "p"))
            .state(State::orthogonal("p"), "root")
            .state(State::atomic("only"), "p")
            .build();
        assert_structure_error(result, "at least two children");
    }

    #[test]
    fn test_orthogonal_rejects_history_child() {
        let result = StatechartBuilder::new("bad-region")
            .root(State::compound("root", "p"))
            .state(State::orthogonal("p"), "root")
            .state(State::atomic("a"), "p")
            .state(State::shallow_history("h", None), "p")
            .build();
        assert_structure_error(result, "neither compound nor atomic");
    }

    #[test]
    fn test_final_state_has_no_transitions() {
        let result = StatechartBuilder::new("bad-final")
            .root(State::compound("root", "done"))
            .state(State::final_state("done"), "root")
            .transition(Transition::new("done").with_target("done").with_event("again"))
            .build();
        assert_structure_error(result, "final state 'done'");
    }

    #[test]
    fn test_history_memory_must_be_sibling() {
        let result = StatechartBuilder::new("bad-memory")
            .root(State::compound("root", "a"))
            .state(State::compound("a", "a1"), "root")
            .state(State::atomic("a1"), "a")
            .state(State::shallow_history("h", Some("root".to_string())), "a")
            .build();
        assert_structure_error(result, "not an immediate sibling");
    }

    #[test]
    fn test_dangling_target() {
        let result = StatechartBuilder::new("dangling")
            .root(State::compound("root", "a"))
            .state(State::atomic("a"), "root")
            .transition(Transition::new("a").with_target("ghost").with_event("go"))
            .build();
        assert_structure_error(result, "target 'ghost'");
    }

    #[test]
    fn test_internal_transition_needs_event_or_guard() {
        let result = StatechartBuilder::new("loopy")
            .root(State::compound("root", "a"))
            .state(State::atomic("a"), "root")
            .transition(Transition::new("a").with_action("x = 1"))
            .build();
        assert_structure_error(result, "must declare an event or a guard");
    }

    #[test]
    fn test_internal_transition_with_guard_is_accepted() {
        let chart = StatechartBuilder::new("ok")
            .root(State::compound("root", "a"))
            .state(State::atomic("a"), "root")
            .transition(Transition::new("a").with_guard("x < 3").with_action("x = x + 1"))
            .build()
            .unwrap();
        assert_eq!(chart.transitions().len(), 1);
    }

    #[test]
    fn test_valid_chart_builds() {
        let chart = StatechartBuilder::new("ok")
            .root(State::compound("root", "a"))
            .state(State::compound("a", "a1"), "root")
            .state(State::atomic("a1"), "a")
            .state(State::atomic("a2"), "a")
            .state(State::deep_history("h", Some("a1".to_string())), "a")
            .transition(Transition::new("a1").with_target("a2").with_event("go"))
            .build()
            .unwrap();
        assert_eq!(chart.depth_for("h"), 3);
        assert_eq!(chart.parent_for("a1"), Some("a"));
    }
}
