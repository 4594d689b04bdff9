//! Per-state lexical variable scopes
//!
//! Each state owns a scope; a child's scope chains to its parent's, up to
//! the root. Reads walk the chain outward; writes target the nearest
//! enclosing scope that already declared the name, else the owning state's
//! own scope. The chart preamble populates the root scope.
//!
//! Two read-only views are exposed: [`visible_from`](ScopeStore::visible_from)
//! (the merged chain as seen from one state, inner names shadowing outer
//! ones) and [`flattened`](ScopeStore::flattened) (the whole store, with
//! names introduced in nested scopes prefixed by their owning state).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use statecharts_core::Statechart;

/// Variable storage for every state of one chart.
#[derive(Debug)]
pub struct ScopeStore {
    chart: Arc<Statechart>,
    scopes: HashMap<String, HashMap<String, Value>>,
}

impl ScopeStore {
    pub fn new(chart: Arc<Statechart>) -> Self {
        Self { chart, scopes: HashMap::new() }
    }

    /// The scope chain from `state` up to and including the root.
    fn chain(&self, state: &str) -> Vec<String> {
        let mut chain = vec![state.to_string()];
        chain.extend(self.chart.ancestors_for(state).into_iter().rev());
        chain
    }

    /// Read a variable as seen from `state`.
    pub fn get(&self, state: &str, name: &str) -> Option<&Value> {
        for owner in self.chain(state) {
            if let Some(value) = self.scopes.get(&owner).and_then(|scope| scope.get(name)) {
                return Some(value);
            }
        }
        None
    }

    /// Write a variable as seen from `state`: the nearest enclosing scope
    /// that declared the name receives the write, else the state's own
    /// scope declares it.
    pub fn set(&mut self, state: &str, name: &str, value: Value) {
        for owner in self.chain(state) {
            if self.scopes.get(&owner).map(|scope| scope.contains_key(name)).unwrap_or(false) {
                self.scopes.get_mut(&owner).expect("scope just probed").insert(name.to_string(), value);
                return;
            }
        }
        self.scopes.entry(state.to_string()).or_default().insert(name.to_string(), value);
    }

    /// The merged context visible from one state, inner scopes shadowing
    /// outer ones. `None` if the state is not part of the chart.
    pub fn visible_from(&self, state: &str) -> Option<serde_json::Map<String, Value>> {
        self.chart.state_for(state)?;
        let mut merged = serde_json::Map::new();
        // Outer first, so inner writes win.
        for owner in self.chain(state).into_iter().rev() {
            if let Some(scope) = self.scopes.get(&owner) {
                for (name, value) in scope {
                    merged.insert(name.clone(), value.clone());
                }
            }
        }
        Some(merged)
    }

    /// The whole store, flattened. Root-scope names appear plainly; names
    /// introduced in nested scopes are prefixed with their owning state
    /// (`"state.name"`).
    pub fn flattened(&self) -> serde_json::Map<String, Value> {
        let mut flattened = serde_json::Map::new();
        let root = self.chart.root();
        for (owner, scope) in &self.scopes {
            for (name, value) in scope {
                let key = if owner == root {
                    name.clone()
                } else {
                    format!("{}.{}", owner, name)
                };
                flattened.insert(key, value.clone());
            }
        }
        flattened
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statecharts_core::{State, StatechartBuilder, Transition};

    fn chart() -> Arc<Statechart> {
        Arc::new(
            StatechartBuilder::new("scoped")
                .root(State::compound("root", "outer"))
                .state(State::compound("outer", "inner"), "root")
                .state(State::atomic("inner"), "outer")
                .transition(Transition::new("inner").with_event("noop"))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_read_walks_the_chain() {
        let mut store = ScopeStore::new(chart());
        store.set("root", "x", json!(1));
        assert_eq!(store.get("inner", "x"), Some(&json!(1)));
        assert_eq!(store.get("root", "x"), Some(&json!(1)));
        assert_eq!(store.get("inner", "y"), None);
    }

    #[test]
    fn test_write_targets_declaring_scope() {
        let mut store = ScopeStore::new(chart());
        store.set("root", "x", json!(1));
        // A write from a nested state updates the declaring (root) scope.
        store.set("inner", "x", json!(2));
        assert_eq!(store.get("root", "x"), Some(&json!(2)));
    }

    #[test]
    fn test_undeclared_write_lands_in_own_scope() {
        let mut store = ScopeStore::new(chart());
        store.set("inner", "local", json!(5));
        assert_eq!(store.get("inner", "local"), Some(&json!(5)));
        assert_eq!(store.get("root", "local"), None);
        assert_eq!(store.get("outer", "local"), None);
    }

    #[test]
    fn test_visible_from_shadows_outer() {
        let mut store = ScopeStore::new(chart());
        store.set("root", "x", json!("outer"));
        store.set("outer", "y", json!(1));
        // Declare a shadowing x directly in the inner scope.
        store.set("inner", "local", json!(true));
        let visible = store.visible_from("inner").unwrap();
        assert_eq!(visible.get("x"), Some(&json!("outer")));
        assert_eq!(visible.get("y"), Some(&json!(1)));
        assert_eq!(visible.get("local"), Some(&json!(true)));
        assert!(store.visible_from("ghost").is_none());
    }

    #[test]
    fn test_flattened_prefixes_nested_names() {
        let mut store = ScopeStore::new(chart());
        store.set("root", "x", json!(1));
        store.set("inner", "local", json!(2));
        let flattened = store.flattened();
        assert_eq!(flattened.get("x"), Some(&json!(1)));
        assert_eq!(flattened.get("inner.local"), Some(&json!(2)));
    }
}
