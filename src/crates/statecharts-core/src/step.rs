//! Macro and micro step records
//!
//! One call to `execute_once` produces at most one [`MacroStep`]: the
//! atomic unit of observable progress. A macro step is composed of
//! [`MicroStep`]s, each the application of a single transition or a single
//! stabilization action (entering a composite's initial child, an
//! orthogonal state's regions, or a history restoration).
//!
//! Macro steps are collected in the interpreter's `trace`, so an execution
//! can be replayed and inspected after the fact.

use crate::event::Event;
use crate::model::Transition;

/// The atomic application of one transition or one stabilization action.
#[derive(Debug, Clone, PartialEq)]
pub struct MicroStep {
    /// The transition applied, or `None` for a pure stabilization step.
    pub transition: Option<Transition>,
    /// The event that triggered the transition, if any.
    pub event: Option<Event>,
    /// States entered, in the order they were entered (outer first).
    pub entered_states: Vec<String>,
    /// States exited, in the order they were exited (deepest first).
    pub exited_states: Vec<String>,
    /// Events emitted by code executed during this micro step.
    pub sent_events: Vec<Event>,
}

impl MicroStep {
    /// A stabilization micro step entering the given states.
    pub(crate) fn stabilization(entered: Vec<String>, exited: Vec<String>) -> Self {
        Self {
            transition: None,
            event: None,
            entered_states: entered,
            exited_states: exited,
            sent_events: Vec::new(),
        }
    }
}

/// The work performed by one `execute_once` call.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroStep {
    /// The clock value sampled at the beginning of the step.
    pub time: f64,
    /// The event consumed by the step, if any.
    pub event: Option<Event>,
    /// The micro steps applied, in order.
    pub steps: Vec<MicroStep>,
    /// Internal events released into the queue at the end of the step.
    pub sent_events: Vec<Event>,
}

impl MacroStep {
    /// All states entered during this macro step, in order.
    pub fn entered_states(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|step| step.entered_states.iter().map(String::as_str))
            .collect()
    }

    /// All states exited during this macro step, in order.
    pub fn exited_states(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|step| step.exited_states.iter().map(String::as_str))
            .collect()
    }

    /// The transitions applied during this macro step, in order.
    pub fn transitions(&self) -> Vec<&Transition> {
        self.steps.iter().filter_map(|step| step.transition.as_ref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Transition;

    #[test]
    fn test_macro_step_aggregates_micro_steps() {
        let step = MacroStep {
            time: 3.0,
            event: Some(Event::new("go")),
            steps: vec![
                MicroStep {
                    transition: Some(Transition::new("a").with_target("b").with_event("go")),
                    event: Some(Event::new("go")),
                    entered_states: vec!["b".to_string()],
                    exited_states: vec!["a".to_string()],
                    sent_events: vec![],
                },
                MicroStep::stabilization(vec!["b1".to_string()], vec![]),
            ],
            sent_events: vec![],
        };
        assert_eq!(step.entered_states(), vec!["b", "b1"]);
        assert_eq!(step.exited_states(), vec!["a"]);
        assert_eq!(step.transitions().len(), 1);
    }
}
