//! Meta-event listeners, bound-interpreter forwarding, property statecharts
//!
//! A listener consumes the interpreter's meta-event stream. Invocation is
//! synchronous, inside the macro step, at the exact point each effect
//! occurs; an error returned by a listener propagates to the caller of
//! `execute_once`.
//!
//! Three kinds of listeners are provided here:
//!
//! - Any `FnMut(&MetaEvent)` closure, for observation and logging.
//! - [`EventForwarder`], installed by `Interpreter::bind`, which turns every
//!   `event sent` meta-event into an external event on another interpreter.
//!   Cyclic bindings are supported: forwarded events are queued, never
//!   executed recursively, so two charts can drive each other in lockstep.
//! - [`PropertyStatechart`], an ordinary statechart fed the parent's
//!   meta-events; reaching one of its final states fails the parent's step
//!   with [`StatechartError::PropertyStatechart`] (fail-fast property
//!   checking).

use crate::clock::Clock;
use crate::error::{Result, StatechartError};
use crate::event::{Event, MetaEvent};
use crate::evaluator::Evaluator;
use crate::interpreter::Interpreter;

/// Identifier returned by `attach`, used to `detach` a listener later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// A consumer of the interpreter's meta-event stream.
pub trait StepListener {
    /// Called once per meta-event, synchronously.
    fn on_meta(&mut self, meta: &MetaEvent) -> Result<()>;
}

impl<F> StepListener for F
where
    F: FnMut(&MetaEvent),
{
    fn on_meta(&mut self, meta: &MetaEvent) -> Result<()> {
        self(meta);
        Ok(())
    }
}

/// Listener forwarding every internal event emission somewhere else.
///
/// Reacts only to `event sent` meta-events and hands the sent event, with
/// external provenance, to the wrapped callable. `Interpreter::bind` wraps
/// the target interpreter's `queue` in such a callable.
pub struct EventForwarder<F: FnMut(Event)> {
    forward: F,
}

impl<F: FnMut(Event)> EventForwarder<F> {
    pub fn new(forward: F) -> Self {
        Self { forward }
    }
}

impl<F: FnMut(Event)> StepListener for EventForwarder<F> {
    fn on_meta(&mut self, meta: &MetaEvent) -> Result<()> {
        if let MetaEvent::EventSent { event } = meta {
            (self.forward)(event.as_external());
        }
        Ok(())
    }
}

/// An ordinary statechart attached as a listener to another interpreter.
///
/// Every meta-event of the observed interpreter is queued on the property
/// interpreter as an external event named by the meta-event kind (e.g.
/// `"state entered"`) with the payload as parameters, and the property
/// interpreter is executed immediately. If it reaches a final state the
/// property is considered violated and the observed interpreter's current
/// step fails.
///
/// # Examples
///
/// ```rust,ignore
/// let property = Interpreter::new(Arc::new(property_chart), NoopEvaluator::new())?;
/// interpreter.attach(Box::new(PropertyStatechart::new(property)));
/// ```
pub struct PropertyStatechart<E: Evaluator, C: Clock> {
    interpreter: Interpreter<E, C>,
}

impl<E: Evaluator, C: Clock> PropertyStatechart<E, C> {
    pub fn new(interpreter: Interpreter<E, C>) -> Self {
        Self { interpreter }
    }

    /// The wrapped interpreter, for inspection.
    pub fn interpreter(&self) -> &Interpreter<E, C> {
        &self.interpreter
    }
}

impl<E: Evaluator, C: Clock> StepListener for PropertyStatechart<E, C> {
    fn on_meta(&mut self, meta: &MetaEvent) -> Result<()> {
        self.interpreter.queue(meta.as_event());
        self.interpreter.execute(None)?;
        if self.interpreter.is_final() {
            return Err(StatechartError::PropertyStatechart {
                name: self.interpreter.statechart().name().to_string(),
            });
        }
        Ok(())
    }
}
