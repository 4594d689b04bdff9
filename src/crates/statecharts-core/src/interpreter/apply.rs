//! Micro step application and configuration stabilization
//!
//! A transition is applied as: exits (deepest first, with exit code and
//! contract checks after each), then the transition action, then entries
//! (outer first, with preconditions before entry code). The configuration
//! is updated incrementally, so guards and contracts observing `active(...)`
//! see exits and entries as they happen. History memories are staged from
//! the pre-exit configuration and committed only once the transition fully
//! applies: an action that fails leaves the configuration at the post-exit
//! point with memories untouched.
//!
//! Stabilization then repeatedly extends the configuration (initial child
//! of a compound, all regions of an orthogonal state, history restoration)
//! until only atomic or final leaves remain; each extension is a micro step
//! of its own.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{ContractKind, Result};
use crate::event::{Event, MetaEvent};
use crate::evaluator::Evaluator;
use crate::model::{State, StateKind, Statechart};
use crate::step::MicroStep;

use super::{scope_of, Interpreter};

impl<E: Evaluator, C: Clock> Interpreter<E, C> {
    /// First micro step of a fresh interpreter: enter the root state.
    /// Stabilization then unfolds the initial configuration.
    pub(crate) fn apply_initial_step(&mut self) -> Result<MicroStep> {
        let chart = Arc::clone(&self.statechart);
        let sent_start = self.runtime.sent_this_step.len();
        let root = chart.root().to_string();
        self.enter_state(&chart, &root, "initial step", None)?;
        self.runtime.last_transition_at = self.runtime.time;
        Ok(MicroStep {
            transition: None,
            event: None,
            entered_states: vec![root],
            exited_states: Vec::new(),
            sent_events: self.runtime.sent_this_step[sent_start..].to_vec(),
        })
    }

    /// Apply one selected transition as a micro step.
    ///
    /// Internal transitions (no target) exit and enter nothing: only the
    /// action runs and the contracts apply, and neither entry timestamps
    /// nor the last-transition timestamp are reset.
    pub(crate) fn apply_transition(&mut self, index: usize, event: Option<&Event>) -> Result<MicroStep> {
        let chart = Arc::clone(&self.statechart);
        let transition = chart.transitions()[index].clone();
        let description = transition.describe();
        let key = format!("transition#{}", index);
        let sent_start = self.runtime.sent_this_step.len();

        if !transition.contract.is_empty() {
            self.check_conditions(
                ContractKind::Precondition,
                Some(&transition.source),
                &key,
                &description,
                &transition.contract.preconditions,
                &description,
                event,
            )?;
            self.check_conditions(
                ContractKind::Invariant,
                Some(&transition.source),
                &key,
                &description,
                &transition.contract.invariants,
                &description,
                event,
            )?;
        }

        let mut exited_states: Vec<String> = Vec::new();
        let mut entered_states: Vec<String> = Vec::new();
        let mut staged_memory: Vec<(String, Vec<String>)> = Vec::new();
        let lca = transition
            .target
            .as_ref()
            .and_then(|target| chart.least_common_ancestor(&transition.source, target));

        if transition.target.is_some() {
            // Exit set: the active part of the LCA's child subtree holding
            // the source, deepest first.
            let branch = match &lca {
                None => chart.root().to_string(),
                Some(lca_name) => {
                    let mut current = transition.source.clone();
                    while chart.parent_for(&current) != Some(lca_name.as_str()) {
                        current = chart
                            .parent_for(&current)
                            .expect("the LCA is an ancestor of the source")
                            .to_string();
                    }
                    current
                }
            };
            let mut branch_states = chart.descendants_for(&branch);
            branch_states.push(branch);
            let mut exit_set: Vec<String> = self
                .runtime
                .configuration
                .iter()
                .filter(|active| branch_states.iter().any(|s| s == *active))
                .cloned()
                .collect();
            exit_set.sort_by(|a, b| {
                chart.depth_for(b).cmp(&chart.depth_for(a)).then_with(|| a.cmp(b))
            });

            staged_memory = self.stage_history_memory(&chart, &exit_set);

            for name in exit_set {
                self.exit_state(&chart, &name, &description, event)?;
                exited_states.push(name);
            }
        }

        if let Some(action) = &transition.action {
            let sent = {
                let scope = scope_of(&self.runtime, Some(&transition.source));
                self.evaluator.execute_action(&scope, action, event)?
            };
            self.buffer_sent(sent);
        }

        self.notify(&MetaEvent::TransitionProcessed {
            source: transition.source.clone(),
            target: transition.target.clone(),
            event: event.cloned(),
        })?;

        if let Some(target) = &transition.target {
            // Entry set: the path from below the LCA down to the target,
            // outer first.
            let mut path = chart.ancestors_for(target);
            if let Some(lca_name) = &lca {
                path.retain(|s| chart.is_ancestor(lca_name, s));
            }
            path.push(target.clone());
            for name in path {
                if self.runtime.configuration.iter().any(|s| *s == name) {
                    continue;
                }
                self.enter_state(&chart, &name, &description, event)?;
                entered_states.push(name);
            }

            // The transition fully applied: its history memories hold.
            for (history, memory) in staged_memory {
                self.runtime.history.insert(history, memory);
            }
            self.runtime.last_transition_at = self.runtime.time;
        }

        if !transition.contract.is_empty() {
            self.check_conditions(
                ContractKind::Postcondition,
                Some(&transition.source),
                &key,
                &description,
                &transition.contract.postconditions,
                &description,
                event,
            )?;
            self.check_conditions(
                ContractKind::Invariant,
                Some(&transition.source),
                &key,
                &description,
                &transition.contract.invariants,
                &description,
                event,
            )?;
        }

        Ok(MicroStep {
            transition: Some(transition),
            event: event.cloned(),
            entered_states,
            exited_states,
            sent_events: self.runtime.sent_this_step[sent_start..].to_vec(),
        })
    }

    /// Compute, from the pre-exit configuration, the memory of every
    /// history pseudo-state whose parent is about to be exited.
    fn stage_history_memory(
        &self,
        chart: &Statechart,
        exit_set: &[String],
    ) -> Vec<(String, Vec<String>)> {
        let mut staged = Vec::new();
        for state in chart.states() {
            if !state.is_history() {
                continue;
            }
            let parent = match chart.parent_for(&state.name) {
                Some(parent) => parent,
                None => continue,
            };
            if !exit_set.iter().any(|s| s == parent) {
                continue;
            }
            let memory = match &state.kind {
                StateKind::ShallowHistory { .. } => chart
                    .children_for(parent)
                    .iter()
                    .filter(|child| self.runtime.configuration.iter().any(|s| s == *child))
                    .take(1)
                    .cloned()
                    .collect::<Vec<_>>(),
                StateKind::DeepHistory { .. } => {
                    let mut leaves: Vec<String> = chart
                        .descendants_for(parent)
                        .into_iter()
                        .filter(|name| self.runtime.configuration.iter().any(|s| s == name))
                        .filter(|name| {
                            chart
                                .state_for(name)
                                .map(|s| s.is_atomic() || s.is_final())
                                .unwrap_or(false)
                        })
                        .collect();
                    leaves.sort_by(|a, b| {
                        chart.depth_for(a).cmp(&chart.depth_for(b)).then_with(|| a.cmp(b))
                    });
                    leaves
                }
                _ => unreachable!("only history kinds reach this match"),
            };
            if !memory.is_empty() {
                staged.push((state.name.clone(), memory));
            }
        }
        staged
    }

    /// Perform at most one stabilization micro step.
    ///
    /// Scans the active states shallowest first and handles the first one
    /// that is not stable: a history pseudo-state to restore, a compound
    /// state without an active child, or an orthogonal state with missing
    /// regions. Returns `None` once the configuration holds only atomic or
    /// final leaves.
    pub(crate) fn stabilize_once(&mut self) -> Result<Option<MicroStep>> {
        let chart = Arc::clone(&self.statechart);
        let mut active = self.runtime.configuration.clone();
        active.sort_by(|a, b| chart.depth_for(a).cmp(&chart.depth_for(b)).then_with(|| a.cmp(b)));

        for name in active {
            let state = match chart.state_for(&name) {
                Some(state) => state,
                None => continue,
            };
            match &state.kind {
                StateKind::ShallowHistory { .. } | StateKind::DeepHistory { .. } => {
                    return self.restore_history(&chart, state).map(Some);
                }
                StateKind::Compound { initial } => {
                    let has_active_child = chart
                        .children_for(&name)
                        .iter()
                        .any(|child| self.runtime.configuration.iter().any(|s| s == child));
                    if !has_active_child {
                        let sent_start = self.runtime.sent_this_step.len();
                        self.enter_state(&chart, initial, "stabilization", None)?;
                        let mut step =
                            MicroStep::stabilization(vec![initial.clone()], Vec::new());
                        step.sent_events = self.runtime.sent_this_step[sent_start..].to_vec();
                        return Ok(Some(step));
                    }
                }
                StateKind::Orthogonal => {
                    let missing: Vec<String> = chart
                        .children_for(&name)
                        .iter()
                        .filter(|child| !self.runtime.configuration.iter().any(|s| s == *child))
                        .cloned()
                        .collect();
                    if !missing.is_empty() {
                        let sent_start = self.runtime.sent_this_step.len();
                        for child in &missing {
                            self.enter_state(&chart, child, "stabilization", None)?;
                        }
                        let mut step = MicroStep::stabilization(missing, Vec::new());
                        step.sent_events = self.runtime.sent_this_step[sent_start..].to_vec();
                        return Ok(Some(step));
                    }
                }
                StateKind::Atomic | StateKind::Final => {}
            }
        }
        Ok(None)
    }

    /// Replace an active history pseudo-state by its remembered (or
    /// default) configuration fragment, as one micro step.
    fn restore_history(&mut self, chart: &Statechart, history: &State) -> Result<MicroStep> {
        let name = history.name.clone();
        let parent = chart
            .parent_for(&name)
            .expect("history states are never the root")
            .to_string();

        self.runtime.configuration.retain(|s| *s != name);
        self.runtime.entry_times.remove(&name);
        self.notify(&MetaEvent::StateExited { state: name.clone() })?;

        let recorded = self.runtime.history.get(&name).cloned();
        let targets: Vec<String> = match (&history.kind, recorded) {
            (StateKind::ShallowHistory { .. }, Some(memory)) => memory,
            (StateKind::DeepHistory { .. }, Some(leaves)) => {
                // Re-enter the leaves together with their ancestors below
                // the remembering parent, outer first.
                let mut states: Vec<String> = Vec::new();
                for leaf in &leaves {
                    for ancestor in chart.ancestors_for(leaf) {
                        if chart.is_ancestor(&parent, &ancestor) && !states.contains(&ancestor) {
                            states.push(ancestor);
                        }
                    }
                    if !states.contains(leaf) {
                        states.push(leaf.clone());
                    }
                }
                states.sort_by(|a, b| {
                    chart.depth_for(a).cmp(&chart.depth_for(b)).then_with(|| a.cmp(b))
                });
                states
            }
            (kind, None) => {
                let default = match kind {
                    StateKind::ShallowHistory { memory } | StateKind::DeepHistory { memory } => {
                        memory.clone()
                    }
                    _ => None,
                };
                let fallback = default.or_else(|| match &chart.state_for(&parent)?.kind {
                    StateKind::Compound { initial } => Some(initial.clone()),
                    _ => None,
                });
                fallback.into_iter().collect()
            }
            _ => Vec::new(),
        };

        let sent_start = self.runtime.sent_this_step.len();
        let mut entered = Vec::new();
        for target in targets {
            if self.runtime.configuration.iter().any(|s| *s == target) {
                continue;
            }
            self.enter_state(chart, &target, "history restoration", None)?;
            entered.push(target);
        }
        let mut step = MicroStep::stabilization(entered, vec![name]);
        step.sent_events = self.runtime.sent_this_step[sent_start..].to_vec();
        Ok(step)
    }

    /// Exit one state: it leaves the configuration immediately, then its
    /// exit code runs and its postconditions and invariants are checked,
    /// then the `state exited` meta-event fires.
    ///
    /// The configuration update comes first so that the state's own exit
    /// code and contract checks already observe it as inactive, mirroring
    /// the entry side where the state only becomes active after `on_entry`.
    fn exit_state(
        &mut self,
        chart: &Statechart,
        name: &str,
        step_description: &str,
        event: Option<&Event>,
    ) -> Result<()> {
        let state = chart.state_for(name).expect("the configuration holds declared states");
        self.runtime.configuration.retain(|s| s != name);
        self.runtime.entry_times.remove(name);
        if state.on_exit.is_some() {
            let sent = {
                let scope = scope_of(&self.runtime, Some(name));
                self.evaluator.execute_on_exit(&scope, state)?
            };
            self.buffer_sent(sent);
        }
        if !state.contract.is_empty() {
            let owner = format!("state '{}'", name);
            self.check_conditions(
                ContractKind::Postcondition,
                Some(name),
                name,
                &owner,
                &state.contract.postconditions,
                step_description,
                event,
            )?;
            self.check_conditions(
                ContractKind::Invariant,
                Some(name),
                name,
                &owner,
                &state.contract.invariants,
                step_description,
                event,
            )?;
        }
        self.notify(&MetaEvent::StateExited { state: name.to_string() })?;
        Ok(())
    }

    /// Enter one state: preconditions, entry code, then the configuration
    /// update, the entry timestamp and the `state entered` meta-event.
    fn enter_state(
        &mut self,
        chart: &Statechart,
        name: &str,
        step_description: &str,
        event: Option<&Event>,
    ) -> Result<()> {
        let state = chart.state_for(name).expect("entered states are declared states");
        if !state.contract.is_empty() {
            let owner = format!("state '{}'", name);
            self.check_conditions(
                ContractKind::Precondition,
                Some(name),
                name,
                &owner,
                &state.contract.preconditions,
                step_description,
                event,
            )?;
        }
        if state.on_entry.is_some() {
            let sent = {
                let scope = scope_of(&self.runtime, Some(name));
                self.evaluator.execute_on_entry(&scope, state)?
            };
            self.buffer_sent(sent);
        }
        self.runtime.configuration.push(name.to_string());
        self.runtime.entry_times.insert(name.to_string(), self.runtime.time);
        self.notify(&MetaEvent::StateEntered { state: name.to_string() })?;
        Ok(())
    }

    /// Mark the interpreter final when a final child of the root is active.
    ///
    /// Validation guarantees a compound root, so root-level finalization
    /// reduces to this single rule.
    pub(crate) fn update_final(&mut self) {
        let chart = &self.statechart;
        let done = chart.children_for(chart.root()).iter().any(|child| {
            self.runtime.configuration.iter().any(|s| s == child)
                && chart.state_for(child).map(State::is_final).unwrap_or(false)
        });
        if done {
            self.runtime.reached_final = true;
            tracing::debug!("configuration reached a final state");
        }
    }
}
