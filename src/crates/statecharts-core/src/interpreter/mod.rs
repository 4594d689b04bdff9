//! The statechart interpreter: macro steps, micro steps, stabilization
//!
//! An [`Interpreter`] executes a validated, immutable [`Statechart`] against
//! a stream of events. Execution is discrete and fully observable: each call
//! to [`execute_once`](Interpreter::execute_once) advances the chart by at
//! most one macro step, made of atomic micro steps (transition applications
//! and stabilization actions), and reports everything it does through
//! meta-events.
//!
//! # Macro step anatomy
//!
//! ```text
//! execute_once()
//!   1. sample the clock once; the value is the step's `time`
//!   2. notify `step started`
//!   3. select transitions:
//!        - eventless transitions with a satisfied guard come first,
//!          consuming no event
//!        - otherwise one event is taken from the queues (internal before
//!          external, FIFO, delayed entries only once released)
//!        - guard filter, per-source priority filter, inner-first
//!          resolution, non-determinism check, parallel ordering
//!   4. apply each selected transition as a micro step
//!        exits (deepest first) -> action -> entries (outer first),
//!        with contract checks and meta-events at each effect
//!   5. stabilize: enter initial children / orthogonal regions / history
//!        memories until only atomic or final leaves remain
//!   6. release buffered `send(...)` emissions into the internal queue
//!   7. check invariants on every active state
//!   8. notify `step ended`; record and return the macro step
//! ```
//!
//! Returns `None` when nothing could be done *and* no event was consumable;
//! an event that matches no transition is still consumed and produces an
//! (empty) macro step.
//!
//! # Execution model
//!
//! Single-threaded and cooperative: `execute_once` runs to completion and
//! never yields. Orthogonal regions fire their transitions serially within
//! one macro step, ordered by decreasing source depth then source name. The
//! caller advances the clock and enqueues events between calls.
//!
//! Errors raised from `execute_once` are fatal to that invocation only;
//! effects already applied remain (configuration, queues, timestamps), and
//! history memories are only committed by fully applied transitions.
//!
//! # Examples
//!
//! ```rust,ignore
//! let chart = Arc::new(import_from_yaml(source)?);
//! let mut interpreter = Interpreter::new(chart, evaluator)?;
//! interpreter.queue("door_opened");
//! let steps = interpreter.execute(None)?;
//! assert!(interpreter.configuration().contains(&"open".to_string()));
//! ```

mod apply;
mod select;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;

use crate::clock::{Clock, SimulatedClock, TimeHandle};
use crate::error::{ContractKind, Result, StatechartError};
use crate::event::{Event, EventQueue, MetaEvent};
use crate::evaluator::{EvalScope, Evaluator};
use crate::listener::{EventForwarder, ListenerId, StepListener};
use crate::model::Statechart;
use crate::step::{MacroStep, MicroStep};

/// Construction-time options for an [`Interpreter`].
#[derive(Debug, Clone)]
pub struct InterpreterOptions {
    /// When `false`, contract violations are reported as meta-events only
    /// and never raise an error. Defaults to `true`.
    pub check_contracts: bool,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self { check_contracts: true }
    }
}

/// Mutable per-interpreter execution state.
///
/// The statechart itself is immutable and shared; everything the run
/// accumulates lives here, owned exclusively by one interpreter.
pub(crate) struct RuntimeState {
    /// Active states, in entry order.
    pub(crate) configuration: Vec<String>,
    /// Clock value at the last entry of each active state.
    pub(crate) entry_times: HashMap<String, f64>,
    /// Clock value of the last transition processed.
    pub(crate) last_transition_at: f64,
    /// Remembered configuration fragment per history pseudo-state.
    pub(crate) history: HashMap<String, Vec<String>>,
    /// Pending internal and external events.
    pub(crate) queue: EventQueue,
    /// The clock value sampled at the start of the last executed step.
    pub(crate) time: f64,
    /// Whether the initial configuration has been entered.
    pub(crate) started: bool,
    /// Whether the chart reached a final configuration.
    pub(crate) reached_final: bool,
    /// Emissions buffered during the current step, awaiting release.
    pub(crate) sent_buffer: Vec<Event>,
    /// Every emission of the current step, for the `sent(...)` predicate.
    pub(crate) sent_this_step: Vec<Event>,
    /// The event consumed by the current step, for `received(...)`.
    pub(crate) consumed: Option<Event>,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            configuration: Vec::new(),
            entry_times: HashMap::new(),
            last_transition_at: 0.0,
            history: HashMap::new(),
            queue: EventQueue::new(),
            time: 0.0,
            started: false,
            reached_final: false,
            sent_buffer: Vec::new(),
            sent_this_step: Vec::new(),
            consumed: None,
        }
    }
}

/// Build the read-only view handed to the evaluator for one call.
///
/// Free function (rather than a method) so the evaluator can be borrowed
/// mutably while the scope borrows the runtime state.
pub(crate) fn scope_of<'a>(runtime: &'a RuntimeState, state: Option<&'a str>) -> EvalScope<'a> {
    EvalScope {
        time: runtime.time,
        state,
        configuration: &runtime.configuration,
        entry_times: &runtime.entry_times,
        last_transition_at: runtime.last_transition_at,
        sent_events: &runtime.sent_this_step,
        consumed: runtime.consumed.as_ref(),
    }
}

/// A statechart execution engine.
///
/// Generic over the [`Evaluator`] interpreting code fragments and the
/// [`Clock`] driving time predicates and delayed events (a manually driven
/// [`SimulatedClock`] by default).
pub struct Interpreter<E: Evaluator, C: Clock = SimulatedClock> {
    statechart: Arc<Statechart>,
    evaluator: E,
    clock: C,
    options: InterpreterOptions,
    runtime: RuntimeState,
    listeners: Vec<(ListenerId, Box<dyn StepListener>)>,
    next_listener: u64,
    trace: Vec<MacroStep>,
    time_handle: TimeHandle,
}

impl<E: Evaluator> Interpreter<E, SimulatedClock> {
    /// Create an interpreter over `statechart` with a fresh simulated clock
    /// and default options. Runs the chart's preamble through the evaluator.
    pub fn new(statechart: Arc<Statechart>, evaluator: E) -> Result<Self> {
        Self::with_clock(statechart, evaluator, SimulatedClock::new())
    }
}

impl<E: Evaluator, C: Clock> Interpreter<E, C> {
    /// Create an interpreter with an explicit clock and default options.
    pub fn with_clock(statechart: Arc<Statechart>, evaluator: E, clock: C) -> Result<Self> {
        Self::with_options(statechart, evaluator, clock, InterpreterOptions::default())
    }

    /// Create an interpreter with an explicit clock and options.
    ///
    /// The chart's preamble, if any, is executed immediately; a failure
    /// surfaces as [`StatechartError::Evaluator`].
    pub fn with_options(
        statechart: Arc<Statechart>,
        mut evaluator: E,
        clock: C,
        options: InterpreterOptions,
    ) -> Result<Self> {
        if let Some(preamble) = statechart.preamble() {
            evaluator.execute_initialization(preamble)?;
        }
        Ok(Self {
            statechart,
            evaluator,
            clock,
            options,
            runtime: RuntimeState::new(),
            listeners: Vec::new(),
            next_listener: 0,
            trace: Vec::new(),
            time_handle: TimeHandle::new(),
        })
    }

    /// The statechart being executed.
    pub fn statechart(&self) -> &Arc<Statechart> {
        &self.statechart
    }

    /// The clock driving this interpreter.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Mutable access to the clock, e.g. to advance a [`SimulatedClock`].
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Shared handle on this interpreter's last-step time, for
    /// [`SynchronizedClock`](crate::clock::SynchronizedClock).
    pub fn time_handle(&self) -> TimeHandle {
        self.time_handle.clone()
    }

    /// The evaluator interpreting this chart's code fragments.
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// The clock value sampled at the start of the last executed step.
    pub fn time(&self) -> f64 {
        self.runtime.time
    }

    /// Whether the chart reached a final configuration. Once final, every
    /// further `execute_once` returns `None`.
    pub fn is_final(&self) -> bool {
        self.runtime.reached_final
    }

    /// The active state names, sorted by depth then name.
    pub fn configuration(&self) -> Vec<String> {
        let mut configuration = self.runtime.configuration.clone();
        configuration.sort_by(|a, b| {
            self.statechart
                .depth_for(a)
                .cmp(&self.statechart.depth_for(b))
                .then_with(|| a.cmp(b))
        });
        configuration
    }

    /// Read-only snapshot of the evaluation context.
    pub fn context(&self) -> serde_json::Map<String, Value> {
        self.evaluator.context()
    }

    /// The macro steps executed so far.
    pub fn trace(&self) -> &[MacroStep] {
        &self.trace
    }

    /// Pending external events, in queue order.
    pub fn pending_external_events(&self) -> Vec<&Event> {
        self.runtime.queue.external_events().collect()
    }

    /// Pending internal events, in queue order.
    pub fn pending_internal_events(&self) -> Vec<&Event> {
        self.runtime.queue.internal_events().collect()
    }

    /// Enqueue an event.
    ///
    /// External unless the event was created with [`Event::internal`]. The
    /// release time is the current clock reading plus the event's delay.
    pub fn queue(&mut self, event: impl Into<Event>) -> &mut Self {
        let event = event.into();
        let now = self.clock.time().max(self.runtime.time);
        let release_at = now + event.delay;
        self.runtime.queue.push(event, release_at);
        self
    }

    /// Register a meta-event listener; returns an id for [`detach`](Self::detach).
    pub fn attach(&mut self, listener: Box<dyn StepListener>) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Remove a previously attached listener. Returns whether it was found.
    pub fn detach(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Install a listener forwarding every internal event emission to the
    /// given callable, as an external event.
    pub fn bind<F>(&mut self, forward: F) -> ListenerId
    where
        F: FnMut(Event) + 'static,
    {
        self.attach(Box::new(EventForwarder::new(forward)))
    }

    /// Bind another interpreter: every internal event this interpreter
    /// emits is queued as an external event on `other`.
    ///
    /// Binding is one-way; bind both directions for mutual communication.
    /// Cycles are safe: delivery only enqueues, it never executes `other`.
    pub fn bind_interpreter<E2, C2>(&mut self, other: Rc<RefCell<Interpreter<E2, C2>>>) -> ListenerId
    where
        E2: Evaluator + 'static,
        C2: Clock + 'static,
    {
        self.bind(move |event| {
            other.borrow_mut().queue(event);
        })
    }

    /// Advance the chart by exactly one macro step.
    ///
    /// Returns `None` when no transition could fire and no event was
    /// consumable, or forever once the chart is final.
    pub fn execute_once(&mut self) -> Result<Option<MacroStep>> {
        if self.runtime.reached_final {
            return Ok(None);
        }
        let now = self.clock.time().max(self.runtime.time);
        self.runtime.time = now;
        self.time_handle.set(now);
        self.runtime.consumed = None;
        self.runtime.sent_this_step.clear();
        self.notify(&MetaEvent::StepStarted { time: now })?;

        let mut steps: Vec<MicroStep> = Vec::new();
        let mut consumed: Option<Event> = None;

        if !self.runtime.started {
            self.runtime.started = true;
            steps.push(self.apply_initial_step()?);
            while let Some(step) = self.stabilize_once()? {
                steps.push(step);
            }
        } else {
            match self.select_step()? {
                None => {
                    self.release_sent_events()?;
                    self.check_step_invariants(None)?;
                    self.notify(&MetaEvent::StepEnded)?;
                    return Ok(None);
                }
                Some((event, selected)) => {
                    if let Some(event) = &event {
                        self.notify(&MetaEvent::EventConsumed { event: event.clone() })?;
                        self.runtime.consumed = Some(event.clone());
                    }
                    consumed = event;
                    for index in selected {
                        steps.push(self.apply_transition(index, consumed.as_ref())?);
                    }
                    while let Some(step) = self.stabilize_once()? {
                        steps.push(step);
                    }
                }
            }
        }

        let sent = self.release_sent_events()?;
        self.update_final();
        self.check_step_invariants(consumed.as_ref())?;
        self.notify(&MetaEvent::StepEnded)?;

        tracing::debug!(
            time = now,
            event = consumed.as_ref().map(|e| e.name.as_str()),
            micro_steps = steps.len(),
            "macro step executed"
        );

        let macro_step = MacroStep { time: now, event: consumed, steps, sent_events: sent };
        self.trace.push(macro_step.clone());
        Ok(Some(macro_step))
    }

    /// Repeatedly [`execute_once`](Self::execute_once) until no progress is
    /// made, or `max_steps` macro steps have been executed.
    pub fn execute(&mut self, max_steps: Option<usize>) -> Result<Vec<MacroStep>> {
        let mut steps = Vec::new();
        while max_steps.map(|max| steps.len() < max).unwrap_or(true) {
            match self.execute_once()? {
                Some(step) => steps.push(step),
                None => break,
            }
        }
        Ok(steps)
    }

    /// Dispatch a meta-event to every attached listener, in attach order.
    pub(crate) fn notify(&mut self, meta: &MetaEvent) -> Result<()> {
        for (_, listener) in &mut self.listeners {
            listener.on_meta(meta)?;
        }
        Ok(())
    }

    /// Buffer emissions produced by a code fragment.
    pub(crate) fn buffer_sent(&mut self, events: Vec<Event>) {
        for event in events {
            self.runtime.sent_this_step.push(event.clone());
            self.runtime.sent_buffer.push(event);
        }
    }

    /// Release buffered emissions into the internal queue and notify
    /// `event sent` for each, in emission order.
    fn release_sent_events(&mut self) -> Result<Vec<Event>> {
        let released = std::mem::take(&mut self.runtime.sent_buffer);
        for event in &released {
            let release_at = self.runtime.time + event.delay;
            self.runtime.queue.push(event.clone(), release_at);
            self.notify(&MetaEvent::EventSent { event: event.clone() })?;
        }
        Ok(released)
    }

    /// Evaluate one family of contract conditions for `owner`.
    ///
    /// Every failed assertion is reported as a meta-event; the first one
    /// raises unless contract checking is disabled.
    pub(crate) fn check_conditions(
        &mut self,
        kind: ContractKind,
        scope_state: Option<&str>,
        key: &str,
        owner: &str,
        conditions: &[String],
        step_description: &str,
        event: Option<&Event>,
    ) -> Result<()> {
        let failed = {
            let scope = scope_of(&self.runtime, scope_state);
            match kind {
                ContractKind::Precondition => {
                    self.evaluator.evaluate_preconditions(&scope, key, conditions, event)?
                }
                ContractKind::Postcondition => {
                    self.evaluator.evaluate_postconditions(&scope, key, conditions, event)?
                }
                ContractKind::Invariant => {
                    self.evaluator.evaluate_invariants(&scope, key, conditions, event)?
                }
            }
        };
        if failed.is_empty() {
            return Ok(());
        }
        let configuration = self.configuration();
        for assertion in &failed {
            let meta = MetaEvent::ContractViolated {
                kind,
                owner: owner.to_string(),
                assertion: assertion.clone(),
                configuration: configuration.clone(),
            };
            self.notify(&meta)?;
        }
        if self.options.check_contracts {
            return Err(StatechartError::contract(
                kind,
                owner,
                failed[0].clone(),
                step_description,
                configuration,
            ));
        }
        Ok(())
    }

    /// Check the invariants of every active state, deepest last.
    fn check_step_invariants(&mut self, event: Option<&Event>) -> Result<()> {
        let chart = Arc::clone(&self.statechart);
        for name in self.configuration() {
            let state = match chart.state_for(&name) {
                Some(state) => state,
                None => continue,
            };
            if state.contract.invariants.is_empty() {
                continue;
            }
            let invariants = state.contract.invariants.clone();
            let owner = format!("state '{}'", name);
            self.check_conditions(
                ContractKind::Invariant,
                Some(&name),
                &name,
                &owner,
                &invariants,
                "macro step",
                event,
            )?;
        }
        Ok(())
    }
}
