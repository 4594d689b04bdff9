//! Benchmark for the macro-step loop: an eventless ping-pong chart and an
//! event-driven chart with an orthogonal region.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::Value;
use statecharts_core::evaluator::{EvalError, EvalScope, Evaluator};
use statecharts_core::{Event, Interpreter, State, Statechart, StatechartBuilder, Transition};

struct BenchEvaluator;

impl Evaluator for BenchEvaluator {
    fn execute_initialization(&mut self, _code: &str) -> Result<(), EvalError> {
        Ok(())
    }
    fn evaluate_guard(
        &mut self,
        _scope: &EvalScope<'_>,
        _code: &str,
        _event: Option<&Event>,
    ) -> Result<bool, EvalError> {
        Ok(true)
    }
    fn execute_action(
        &mut self,
        _scope: &EvalScope<'_>,
        _code: &str,
        _event: Option<&Event>,
    ) -> Result<Vec<Event>, EvalError> {
        Ok(Vec::new())
    }
    fn execute_on_entry(&mut self, _scope: &EvalScope<'_>, _state: &State) -> Result<Vec<Event>, EvalError> {
        Ok(Vec::new())
    }
    fn execute_on_exit(&mut self, _scope: &EvalScope<'_>, _state: &State) -> Result<Vec<Event>, EvalError> {
        Ok(Vec::new())
    }
    fn evaluate_preconditions(
        &mut self,
        _scope: &EvalScope<'_>,
        _key: &str,
        _conditions: &[String],
        _event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        Ok(Vec::new())
    }
    fn evaluate_postconditions(
        &mut self,
        _scope: &EvalScope<'_>,
        _key: &str,
        _conditions: &[String],
        _event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        Ok(Vec::new())
    }
    fn evaluate_invariants(
        &mut self,
        _scope: &EvalScope<'_>,
        _key: &str,
        _conditions: &[String],
        _event: Option<&Event>,
    ) -> Result<Vec<String>, EvalError> {
        Ok(Vec::new())
    }
    fn context(&self) -> serde_json::Map<String, Value> {
        serde_json::Map::new()
    }
    fn context_for(&self, _state: &str) -> Option<serde_json::Map<String, Value>> {
        None
    }
}

fn ping_pong() -> Arc<Statechart> {
    Arc::new(
        StatechartBuilder::new("ping-pong")
            .root(State::compound("root", "a"))
            .state(State::atomic("a"), "root")
            .state(State::atomic("b"), "root")
            .transition(Transition::new("a").with_target("b").with_guard("go"))
            .transition(Transition::new("b").with_target("a").with_guard("go"))
            .build()
            .unwrap(),
    )
}

fn parallel() -> Arc<Statechart> {
    Arc::new(
        StatechartBuilder::new("parallel")
            .root(State::compound("root", "p"))
            .state(State::orthogonal("p"), "root")
            .state(State::compound("r1", "r1a"), "p")
            .state(State::atomic("r1a"), "r1")
            .state(State::atomic("r1b"), "r1")
            .state(State::compound("r2", "r2a"), "p")
            .state(State::atomic("r2a"), "r2")
            .state(State::atomic("r2b"), "r2")
            .transition(Transition::new("r1a").with_target("r1b").with_event("flip"))
            .transition(Transition::new("r1b").with_target("r1a").with_event("flip"))
            .transition(Transition::new("r2a").with_target("r2b").with_event("flip"))
            .transition(Transition::new("r2b").with_target("r2a").with_event("flip"))
            .build()
            .unwrap(),
    )
}

fn bench_macro_steps(c: &mut Criterion) {
    c.bench_function("eventless_ping_pong_100_steps", |b| {
        b.iter(|| {
            let mut interpreter = Interpreter::new(ping_pong(), BenchEvaluator).unwrap();
            interpreter.execute(Some(100)).unwrap()
        })
    });

    c.bench_function("parallel_event_steps_100", |b| {
        b.iter(|| {
            let mut interpreter = Interpreter::new(parallel(), BenchEvaluator).unwrap();
            interpreter.execute_once().unwrap();
            for _ in 0..100 {
                interpreter.queue("flip");
                interpreter.execute_once().unwrap();
            }
            interpreter.configuration()
        })
    });
}

criterion_group!(benches, bench_macro_steps);
criterion_main!(benches);
