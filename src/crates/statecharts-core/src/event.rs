//! Events, meta-events and the interpreter's event queues
//!
//! Three notions share the module:
//!
//! - [`Event`] - an external or internal occurrence with a name, JSON
//!   parameters and an optional delay. External events are queued from
//!   outside the chart; internal events are emitted by `send(...)` inside
//!   actions and have strictly higher consumption priority.
//! - [`MetaEvent`] - generated by the interpreter about its own execution
//!   (step boundaries, state entries/exits, processed transitions, consumed
//!   and sent events, contract violations) and delivered synchronously to
//!   attached listeners at the exact point the effect occurs.
//! - [`EventQueue`] - the ordered holding area: two FIFO containers
//!   (internal and external) whose entries carry a release time. An event
//!   becomes eligible for consumption only once the clock has reached its
//!   release time; ineligible events stay in place and are reconsidered on
//!   later ticks.
//!
//! # Examples
//!
//! ```rust
//! use statecharts_core::event::{Event, EventQueue};
//!
//! let mut queue = EventQueue::new();
//! queue.push(Event::new("clicked"), 0.0);
//! queue.push(Event::new("timeout").with_delay(5.0), 5.0);
//!
//! // At time 0, only "clicked" is eligible.
//! assert_eq!(queue.pop_eligible(0.0).unwrap().name, "clicked");
//! assert!(queue.pop_eligible(0.0).is_none());
//! assert_eq!(queue.pop_eligible(5.0).unwrap().name, "timeout");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

use crate::error::ContractKind;

/// An occurrence the statechart can react to.
///
/// Events are named; parameters are an arbitrary JSON object made available
/// to guards and actions as `event.<name>`. The `delay` is the number of
/// seconds after enqueueing before the event becomes eligible; the
/// `internal` flag records provenance (emitted by the chart itself rather
/// than queued from outside) and drives consumption priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name, matched against transition triggers.
    pub name: String,

    /// Named parameters, exposed to code fragments as `event.<key>`.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: serde_json::Map<String, Value>,

    /// Seconds to wait after enqueueing before the event is eligible.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub delay: f64,

    /// Whether the event was emitted from inside the chart.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub internal: bool,
}

fn is_zero(delay: &f64) -> bool {
    *delay == 0.0
}

impl Event {
    /// Create an external event with no parameters and no delay.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), params: serde_json::Map::new(), delay: 0.0, internal: false }
    }

    /// Create an internal event, as emitted by `send(...)` inside actions.
    pub fn internal(name: impl Into<String>) -> Self {
        Self { internal: true, ..Self::new(name) }
    }

    /// Attach a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Set the delay, in seconds.
    pub fn with_delay(mut self, delay: f64) -> Self {
        self.delay = delay;
        self
    }

    /// Look up a parameter by name.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// A copy of this event with external provenance, as used when a bound
    /// interpreter forwards an internal emission to a sibling.
    pub fn as_external(&self) -> Self {
        Self { internal: false, ..self.clone() }
    }
}

impl From<&str> for Event {
    fn from(name: &str) -> Self {
        Event::new(name)
    }
}

impl From<String> for Event {
    fn from(name: String) -> Self {
        Event::new(name)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}({})", self.name, Value::Object(self.params.clone()))
        }
    }
}

/// An event generated by the interpreter about its own execution.
///
/// Meta-events are delivered synchronously to attached listeners, inside the
/// macro step, at the exact point the effect occurs. They never enter the
/// interpreter's own queues.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaEvent {
    /// A macro step began; carries the step's sampled time.
    StepStarted { time: f64 },
    /// A macro step ended.
    StepEnded,
    /// An event was taken from a queue for processing.
    EventConsumed { event: Event },
    /// A buffered internal emission was released into the queue.
    EventSent { event: Event },
    /// A state was added to the configuration.
    StateEntered { state: String },
    /// A state was removed from the configuration.
    StateExited { state: String },
    /// A transition was applied.
    TransitionProcessed {
        source: String,
        target: Option<String>,
        event: Option<Event>,
    },
    /// A contract condition evaluated false.
    ///
    /// Reported for every violation; when contract checking is disabled at
    /// interpreter construction this meta-event is the only signal.
    ContractViolated {
        kind: ContractKind,
        owner: String,
        assertion: String,
        configuration: Vec<String>,
    },
}

impl MetaEvent {
    /// The meta-event kind name, as exposed to property statecharts.
    pub fn kind(&self) -> &'static str {
        match self {
            MetaEvent::StepStarted { .. } => "step started",
            MetaEvent::StepEnded => "step ended",
            MetaEvent::EventConsumed { .. } => "event consumed",
            MetaEvent::EventSent { .. } => "event sent",
            MetaEvent::StateEntered { .. } => "state entered",
            MetaEvent::StateExited { .. } => "state exited",
            MetaEvent::TransitionProcessed { .. } => "transition processed",
            MetaEvent::ContractViolated { .. } => "contract violated",
        }
    }

    /// Render this meta-event as an ordinary event, named by kind and with
    /// the payload as parameters. Property statecharts consume these.
    pub fn as_event(&self) -> Event {
        let mut event = Event::new(self.kind());
        match self {
            MetaEvent::StepStarted { time } => {
                event = event.with_param("time", *time);
            }
            MetaEvent::StepEnded => {}
            MetaEvent::EventConsumed { event: consumed } => {
                event = event.with_param("event", Value::String(consumed.name.clone()));
                for (key, value) in &consumed.params {
                    event = event.with_param(key.clone(), value.clone());
                }
            }
            MetaEvent::EventSent { event: sent } => {
                event = event.with_param("event", Value::String(sent.name.clone()));
                for (key, value) in &sent.params {
                    event = event.with_param(key.clone(), value.clone());
                }
            }
            MetaEvent::StateEntered { state } => {
                event = event.with_param("state", state.clone());
            }
            MetaEvent::StateExited { state } => {
                event = event.with_param("state", state.clone());
            }
            MetaEvent::TransitionProcessed { source, target, event: trigger } => {
                event = event.with_param("source", source.clone());
                if let Some(target) = target {
                    event = event.with_param("target", target.clone());
                }
                if let Some(trigger) = trigger {
                    event = event.with_param("event", Value::String(trigger.name.clone()));
                }
            }
            MetaEvent::ContractViolated { kind, owner, assertion, configuration } => {
                event = event
                    .with_param("kind", kind.to_string())
                    .with_param("owner", owner.clone())
                    .with_param("assertion", assertion.clone())
                    .with_param("configuration", Value::Array(
                        configuration.iter().cloned().map(Value::String).collect(),
                    ));
            }
        }
        event
    }
}

#[derive(Debug, Clone)]
struct QueuedEvent {
    seq: u64,
    release_at: f64,
    event: Event,
}

/// Ordered holding area for pending events.
///
/// Two FIFO containers, internal and external. Selection on a tick at time
/// `now` takes the oldest internal event whose release time has been
/// reached, else the oldest eligible external event. Events whose release
/// time lies in the future stay queued. There is no cancellation: a queued
/// event leaves the queue only by being consumed.
#[derive(Debug, Default)]
pub struct EventQueue {
    seq: u64,
    internal: VecDeque<QueuedEvent>,
    external: VecDeque<QueuedEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an event with an absolute release time.
    ///
    /// The event's `internal` flag selects the container. Enqueue order is
    /// preserved per container and decides ties among eligible events.
    pub fn push(&mut self, event: Event, release_at: f64) {
        let entry = QueuedEvent { seq: self.seq, release_at, event };
        self.seq += 1;
        if entry.event.internal {
            self.internal.push_back(entry);
        } else {
            self.external.push_back(entry);
        }
    }

    /// Remove and return the next eligible event at time `now`:
    /// oldest eligible internal first, then oldest eligible external.
    pub fn pop_eligible(&mut self, now: f64) -> Option<Event> {
        Self::pop_from(&mut self.internal, now).or_else(|| Self::pop_from(&mut self.external, now))
    }

    fn pop_from(queue: &mut VecDeque<QueuedEvent>, now: f64) -> Option<Event> {
        // Oldest by enqueue order, not by release time: a long delay does
        // not let later short-delay events overtake permanently, they are
        // simply eligible earlier.
        let position = queue
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.release_at <= now)
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(index, _)| index)?;
        queue.remove(position).map(|entry| entry.event)
    }

    /// Number of pending events across both containers.
    pub fn len(&self) -> usize {
        self.internal.len() + self.external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.internal.is_empty() && self.external.is_empty()
    }

    /// Pending internal events, in queue order.
    pub fn internal_events(&self) -> impl Iterator<Item = &Event> {
        self.internal.iter().map(|entry| &entry.event)
    }

    /// Pending external events, in queue order.
    pub fn external_events(&self) -> impl Iterator<Item = &Event> {
        self.external.iter().map(|entry| &entry.event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_construction() {
        let event = Event::new("floorSelected").with_param("floor", 4);
        assert_eq!(event.name, "floorSelected");
        assert_eq!(event.param("floor"), Some(&json!(4)));
        assert!(!event.internal);
        assert_eq!(event.delay, 0.0);
    }

    #[test]
    fn test_internal_event_as_external() {
        let event = Event::internal("ping").with_param("n", 1);
        assert!(event.internal);
        let forwarded = event.as_external();
        assert!(!forwarded.internal);
        assert_eq!(forwarded.name, "ping");
        assert_eq!(forwarded.param("n"), Some(&json!(1)));
    }

    #[test]
    fn test_queue_fifo_order() {
        let mut queue = EventQueue::new();
        queue.push(Event::new("a"), 0.0);
        queue.push(Event::new("b"), 0.0);
        assert_eq!(queue.pop_eligible(0.0).unwrap().name, "a");
        assert_eq!(queue.pop_eligible(0.0).unwrap().name, "b");
        assert!(queue.pop_eligible(0.0).is_none());
    }

    #[test]
    fn test_internal_events_drain_first() {
        let mut queue = EventQueue::new();
        queue.push(Event::new("outside"), 0.0);
        queue.push(Event::internal("inside"), 0.0);
        assert_eq!(queue.pop_eligible(0.0).unwrap().name, "inside");
        assert_eq!(queue.pop_eligible(0.0).unwrap().name, "outside");
    }

    #[test]
    fn test_delayed_event_ineligible_until_release() {
        let mut queue = EventQueue::new();
        queue.push(Event::new("later").with_delay(5.0), 5.0);
        assert!(queue.pop_eligible(0.0).is_none());
        assert!(queue.pop_eligible(4.999).is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_eligible(5.0).unwrap().name, "later");
    }

    #[test]
    fn test_delayed_event_does_not_block_younger_eligible() {
        let mut queue = EventQueue::new();
        queue.push(Event::new("slow").with_delay(10.0), 10.0);
        queue.push(Event::new("fast"), 0.0);
        assert_eq!(queue.pop_eligible(0.0).unwrap().name, "fast");
        assert!(queue.pop_eligible(0.0).is_none());
        // Once released, the older event is consumed first again.
        queue.push(Event::new("fresh"), 10.0);
        assert_eq!(queue.pop_eligible(10.0).unwrap().name, "slow");
        assert_eq!(queue.pop_eligible(10.0).unwrap().name, "fresh");
    }

    #[test]
    fn test_meta_event_kinds_and_payloads() {
        let meta = MetaEvent::StateEntered { state: "s1".to_string() };
        assert_eq!(meta.kind(), "state entered");
        let event = meta.as_event();
        assert_eq!(event.name, "state entered");
        assert_eq!(event.param("state"), Some(&json!("s1")));

        let meta = MetaEvent::TransitionProcessed {
            source: "a".to_string(),
            target: Some("b".to_string()),
            event: Some(Event::new("go")),
        };
        let event = meta.as_event();
        assert_eq!(event.param("source"), Some(&json!("a")));
        assert_eq!(event.param("target"), Some(&json!("b")));
        assert_eq!(event.param("event"), Some(&json!("go")));
    }
}
