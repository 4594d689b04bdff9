//! Transition selection: eventless-first, guards, priority, inner-first
//!
//! Selection computes, for one macro step, the event to consume (if any)
//! and the ordered batch of transitions to apply. Candidates are indices
//! into the chart's transition list so the selection can be handed back to
//! the application phase without borrowing the chart.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{Result, StatechartError};
use crate::event::Event;
use crate::evaluator::Evaluator;
use crate::model::{Statechart, Transition};

use super::{scope_of, Interpreter};

impl<E: Evaluator, C: Clock> Interpreter<E, C> {
    /// Compute the event and transition batch for the current step.
    ///
    /// Eventless transitions with a satisfied guard are tried first and
    /// consume no event. Otherwise one eligible event is taken from the
    /// queues; the batch may then be empty (the event is consumed anyway).
    /// `None` means no progress is possible on this tick.
    pub(crate) fn select_step(&mut self) -> Result<Option<(Option<Event>, Vec<usize>)>> {
        let chart = Arc::clone(&self.statechart);

        let mut eventless: Vec<usize> = Vec::new();
        for (index, transition) in chart.transitions().iter().enumerate() {
            if transition.is_eventless()
                && self.runtime.configuration.iter().any(|s| *s == transition.source)
                && self.guard_holds(transition, None)?
            {
                eventless.push(index);
            }
        }
        if !eventless.is_empty() {
            let selected = self.filter_candidates(&chart, eventless, None)?;
            tracing::debug!(count = selected.len(), "selected eventless transitions");
            return Ok(Some((None, selected)));
        }

        let event = match self.runtime.queue.pop_eligible(self.runtime.time) {
            Some(event) => event,
            None => return Ok(None),
        };

        let mut candidates: Vec<usize> = Vec::new();
        for (index, transition) in chart.transitions().iter().enumerate() {
            if transition.event.as_deref() == Some(event.name.as_str())
                && self.runtime.configuration.iter().any(|s| *s == transition.source)
                && self.guard_holds(transition, Some(&event))?
            {
                candidates.push(index);
            }
        }
        let selected = self.filter_candidates(&chart, candidates, Some(&event.name))?;
        tracing::debug!(
            event = event.name.as_str(),
            count = selected.len(),
            "selected transitions for event"
        );
        Ok(Some((Some(event), selected)))
    }

    fn guard_holds(&mut self, transition: &Transition, event: Option<&Event>) -> Result<bool> {
        match &transition.guard {
            None => Ok(true),
            Some(code) => {
                let scope = scope_of(&self.runtime, Some(&transition.source));
                Ok(self.evaluator.evaluate_guard(&scope, code, event)?)
            }
        }
    }

    /// Priority and inner-first filtering, non-determinism detection, and
    /// parallel ordering of the surviving batch.
    fn filter_candidates(
        &self,
        chart: &Statechart,
        candidates: Vec<usize>,
        event: Option<&str>,
    ) -> Result<Vec<usize>> {
        // Within each source state, only the highest priority survives.
        let mut selected: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&index| {
                let transition = &chart.transitions()[index];
                let best = candidates
                    .iter()
                    .map(|&other| &chart.transitions()[other])
                    .filter(|other| other.source == transition.source)
                    .map(|other| other.priority)
                    .max()
                    .unwrap_or(transition.priority);
                transition.priority == best
            })
            .collect();

        // Inner-first: a transition loses to any surviving transition whose
        // source is a strict descendant of its own source.
        let snapshot = selected.clone();
        selected.retain(|&index| {
            let source = &chart.transitions()[index].source;
            !snapshot.iter().any(|&other| {
                let other_source = &chart.transitions()[other].source;
                chart.is_ancestor(source, other_source)
            })
        });

        // Candidates at the same depth must come from distinct orthogonal
        // regions; anything else is a refusal, not a silent pick.
        for (position, &index) in selected.iter().enumerate() {
            let source = &chart.transitions()[index].source;
            for &other in &selected[position + 1..] {
                let other_source = &chart.transitions()[other].source;
                if chart.depth_for(source) != chart.depth_for(other_source) {
                    continue;
                }
                let same_source = source == other_source;
                if same_source || !chart.in_distinct_regions(source, other_source) {
                    return Err(StatechartError::NonDeterminism {
                        sources: vec![source.clone(), other_source.clone()],
                        event: event.map(str::to_string),
                    });
                }
            }
        }

        // Parallel order: decreasing source depth, then source name.
        selected.sort_by(|&a, &b| {
            let source_a = &chart.transitions()[a].source;
            let source_b = &chart.transitions()[b].source;
            chart
                .depth_for(source_b)
                .cmp(&chart.depth_for(source_a))
                .then_with(|| source_a.cmp(source_b))
        });
        Ok(selected)
    }
}
