//! Convenience helpers over listeners and traces
//!
//! Small utilities that sit on top of the interpreter's observable surface:
//!
//! - [`MetaEventLog`] - a listener accumulating every meta-event into a
//!   shared buffer, for debugging and assertions.
//! - [`state_coverage`] / [`transition_coverage`] - how often each state
//!   was entered and each transition processed across a trace, useful to
//!   judge how much of a chart a test scenario actually exercises.
//!
//! # Examples
//!
//! ```rust,ignore
//! let log = MetaEventLog::new();
//! interpreter.attach(Box::new(log.clone()));
//! interpreter.execute(None)?;
//!
//! let entered = state_coverage(interpreter.trace());
//! println!("states never visited: {:?}",
//!     chart.states().filter(|s| !entered.contains_key(&s.name)).count());
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Result;
use crate::event::MetaEvent;
use crate::listener::StepListener;
use crate::step::MacroStep;

/// Listener accumulating every meta-event into a shared buffer.
///
/// Clones share the same buffer, so one handle can be attached while
/// another is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct MetaEventLog {
    events: Rc<RefCell<Vec<MetaEvent>>>,
}

impl MetaEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the recorded meta-events, in emission order.
    pub fn events(&self) -> Vec<MetaEvent> {
        self.events.borrow().clone()
    }

    /// Number of recorded meta-events.
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl StepListener for MetaEventLog {
    fn on_meta(&mut self, meta: &MetaEvent) -> Result<()> {
        self.events.borrow_mut().push(meta.clone());
        Ok(())
    }
}

/// How many times each state was entered across a trace.
pub fn state_coverage(trace: &[MacroStep]) -> HashMap<String, usize> {
    let mut coverage = HashMap::new();
    for step in trace {
        for state in step.entered_states() {
            *coverage.entry(state.to_string()).or_insert(0) += 1;
        }
    }
    coverage
}

/// How many times each transition was processed across a trace, keyed by
/// the transition's description.
pub fn transition_coverage(trace: &[MacroStep]) -> HashMap<String, usize> {
    let mut coverage = HashMap::new();
    for step in trace {
        for transition in step.transitions() {
            *coverage.entry(transition.describe()).or_insert(0) += 1;
        }
    }
    coverage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::model::Transition;
    use crate::step::MicroStep;

    fn sample_trace() -> Vec<MacroStep> {
        let go = Transition::new("a").with_target("b").with_event("go");
        let back = Transition::new("b").with_target("a").with_event("back");
        vec![
            MacroStep {
                time: 0.0,
                event: None,
                steps: vec![MicroStep {
                    transition: None,
                    event: None,
                    entered_states: vec!["root".to_string(), "a".to_string()],
                    exited_states: vec![],
                    sent_events: vec![],
                }],
                sent_events: vec![],
            },
            MacroStep {
                time: 1.0,
                event: Some(Event::new("go")),
                steps: vec![MicroStep {
                    transition: Some(go.clone()),
                    event: Some(Event::new("go")),
                    entered_states: vec!["b".to_string()],
                    exited_states: vec!["a".to_string()],
                    sent_events: vec![],
                }],
                sent_events: vec![],
            },
            MacroStep {
                time: 2.0,
                event: Some(Event::new("back")),
                steps: vec![MicroStep {
                    transition: Some(back),
                    event: Some(Event::new("back")),
                    entered_states: vec!["a".to_string()],
                    exited_states: vec!["b".to_string()],
                    sent_events: vec![],
                }],
                sent_events: vec![],
            },
        ]
    }

    #[test]
    fn test_state_coverage_counts_entries() {
        let coverage = state_coverage(&sample_trace());
        assert_eq!(coverage.get("a"), Some(&2));
        assert_eq!(coverage.get("b"), Some(&1));
        assert_eq!(coverage.get("root"), Some(&1));
        assert_eq!(coverage.get("ghost"), None);
    }

    #[test]
    fn test_transition_coverage_counts_descriptions() {
        let coverage = transition_coverage(&sample_trace());
        assert_eq!(coverage.get("transition from a to b on go"), Some(&1));
        assert_eq!(coverage.get("transition from b to a on back"), Some(&1));
    }

    #[test]
    fn test_meta_event_log_shares_buffer() {
        let log = MetaEventLog::new();
        let mut attached = log.clone();
        attached.on_meta(&MetaEvent::StepStarted { time: 0.0 }).unwrap();
        attached.on_meta(&MetaEvent::StepEnded).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.events()[0], MetaEvent::StepStarted { time: 0.0 });
        log.clear();
        assert!(log.is_empty());
    }
}
