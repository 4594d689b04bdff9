//! YAML-based statechart definitions
//!
//! A human-friendly, indentation-based markup for statecharts. The top
//! level is a `statechart` key carrying `name`, an optional `description`,
//! an optional `preamble` (initialization code) and a recursive
//! `root state`. Each state declares `name`; optional `type` (`final`,
//! `shallow history`, `deep history`); optional `on entry` / `on exit`
//! code; an optional `contract` list (`before:` preconditions, `after:`
//! postconditions, `always:` invariants); an optional `transitions` list;
//! children under `states:` (compound) or `parallel states:` (orthogonal);
//! and optional `initial` and `memory` references. Transition `priority`
//! accepts an integer or the reserved words `low` and `high`.
//!
//! Importing validates through the builder; exporting a valid chart and
//! re-importing yields a structurally equal chart.
//!
//! # Examples
//!
//! ```rust
//! use statecharts_core::yaml::import_from_yaml;
//!
//! let chart = import_from_yaml(r#"
//! statechart:
//!   name: lamp
//!   root state:
//!     name: root
//!     initial: off
//!     states:
//!       - name: off
//!         transitions:
//!           - target: on
//!             event: toggle
//!       - name: on
//!         transitions:
//!           - target: off
//!             event: toggle
//! "#).unwrap();
//! assert_eq!(chart.name(), "lamp");
//! ```

use serde::{Deserialize, Serialize};

use crate::builder::StatechartBuilder;
use crate::error::{Result, StatechartError};
use crate::model::{Contract, State, StateKind, Statechart, Transition};

/// Priority value of the reserved `low` token.
pub const PRIORITY_LOW: i32 = -1;
/// Priority value of the reserved `high` token.
pub const PRIORITY_HIGH: i32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct YamlDocument {
    statechart: YamlStatechart,
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlStatechart {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preamble: Option<String>,
    #[serde(rename = "root state")]
    root_state: YamlState,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct YamlState {
    name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(rename = "on entry", default, skip_serializing_if = "Option::is_none")]
    on_entry: Option<String>,
    #[serde(rename = "on exit", default, skip_serializing_if = "Option::is_none")]
    on_exit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    initial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memory: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    contract: Vec<YamlContractItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    transitions: Vec<YamlTransition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    states: Option<Vec<YamlState>>,
    #[serde(rename = "parallel states", default, skip_serializing_if = "Option::is_none")]
    parallel_states: Option<Vec<YamlState>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum YamlContractItem {
    Before { before: String },
    After { after: String },
    Always { always: String },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct YamlTransition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    guard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<YamlPriority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    contract: Vec<YamlContractItem>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum YamlPriority {
    Word(String),
    Number(i32),
}

fn contract_from_items(items: &[YamlContractItem]) -> Contract {
    let mut contract = Contract::new();
    for item in items {
        contract = match item {
            YamlContractItem::Before { before } => contract.before(before.clone()),
            YamlContractItem::After { after } => contract.after(after.clone()),
            YamlContractItem::Always { always } => contract.always(always.clone()),
        };
    }
    contract
}

fn contract_to_items(contract: &Contract) -> Vec<YamlContractItem> {
    let mut items = Vec::new();
    for condition in &contract.preconditions {
        items.push(YamlContractItem::Before { before: condition.clone() });
    }
    for condition in &contract.postconditions {
        items.push(YamlContractItem::After { after: condition.clone() });
    }
    for condition in &contract.invariants {
        items.push(YamlContractItem::Always { always: condition.clone() });
    }
    items
}

fn priority_value(priority: &YamlPriority) -> Result<i32> {
    match priority {
        YamlPriority::Number(value) => Ok(*value),
        YamlPriority::Word(word) => match word.as_str() {
            "low" => Ok(PRIORITY_LOW),
            "high" => Ok(PRIORITY_HIGH),
            other => Err(StatechartError::Structure(format!(
                "unknown priority token '{}', expected 'low', 'high' or an integer",
                other
            ))),
        },
    }
}

/// Import a statechart from its YAML representation.
///
/// The resulting chart goes through the same validation as one assembled
/// with the builder; structural problems surface as
/// [`StatechartError::Structure`], syntax problems as
/// [`StatechartError::Yaml`].
pub fn import_from_yaml(source: &str) -> Result<Statechart> {
    let document: YamlDocument = serde_yaml::from_str(source)?;
    let chart = document.statechart;

    let mut builder = StatechartBuilder::new(chart.name);
    if let Some(description) = chart.description {
        builder = builder.description(description);
    }
    if let Some(preamble) = chart.preamble {
        builder = builder.preamble(preamble);
    }

    let root = state_from_yaml(&chart.root_state)?;
    builder = builder.root(root);
    builder = import_transitions(builder, &chart.root_state)?;
    builder = import_children(builder, &chart.root_state)?;
    builder.build()
}

fn state_from_yaml(state: &YamlState) -> Result<State> {
    let mut built = match state.kind.as_deref() {
        Some("final") => State::final_state(&state.name),
        Some("shallow history") => State::shallow_history(&state.name, state.memory.clone()),
        Some("deep history") => State::deep_history(&state.name, state.memory.clone()),
        Some(other) => {
            return Err(StatechartError::Structure(format!(
                "state '{}' has unknown type '{}'",
                state.name, other
            )))
        }
        None => {
            if state.parallel_states.is_some() {
                State::orthogonal(&state.name)
            } else if let Some(initial) = &state.initial {
                State::compound(&state.name, initial)
            } else if state.states.is_some() {
                return Err(StatechartError::Structure(format!(
                    "compound state '{}' must declare an initial child",
                    state.name
                )));
            } else {
                State::atomic(&state.name)
            }
        }
    };
    if let Some(code) = &state.on_entry {
        built = built.with_on_entry(code.clone());
    }
    if let Some(code) = &state.on_exit {
        built = built.with_on_exit(code.clone());
    }
    if !state.contract.is_empty() {
        built = built.with_contract(contract_from_items(&state.contract));
    }
    Ok(built)
}

fn import_children(mut builder: StatechartBuilder, parent: &YamlState) -> Result<StatechartBuilder> {
    let children = parent.states.iter().flatten().chain(parent.parallel_states.iter().flatten());
    for child in children {
        let state = state_from_yaml(child)?;
        builder = builder.state(state, &parent.name);
        builder = import_transitions(builder, child)?;
        builder = import_children(builder, child)?;
    }
    Ok(builder)
}

fn import_transitions(mut builder: StatechartBuilder, state: &YamlState) -> Result<StatechartBuilder> {
    for transition in &state.transitions {
        let mut built = Transition::new(&state.name);
        if let Some(target) = &transition.target {
            built = built.with_target(target);
        }
        if let Some(event) = &transition.event {
            built = built.with_event(event);
        }
        if let Some(guard) = &transition.guard {
            built = built.with_guard(guard);
        }
        if let Some(action) = &transition.action {
            built = built.with_action(action);
        }
        if let Some(priority) = &transition.priority {
            built = built.with_priority(priority_value(priority)?);
        }
        if !transition.contract.is_empty() {
            built = built.with_contract(contract_from_items(&transition.contract));
        }
        builder = builder.transition(built);
    }
    Ok(builder)
}

/// Export a statechart to its YAML representation.
///
/// The exported form re-imports to a structurally equal chart.
pub fn export_to_yaml(chart: &Statechart) -> Result<String> {
    let document = YamlDocument {
        statechart: YamlStatechart {
            name: chart.name().to_string(),
            description: chart.description().map(str::to_string),
            preamble: chart.preamble().map(str::to_string),
            root_state: state_to_yaml(chart, chart.root()),
        },
    };
    Ok(serde_yaml::to_string(&document)?)
}

fn state_to_yaml(chart: &Statechart, name: &str) -> YamlState {
    let state = chart.state_for(name).expect("exported states are declared states");
    let mut yaml = YamlState { name: name.to_string(), ..YamlState::default() };

    match &state.kind {
        StateKind::Atomic => {}
        StateKind::Final => yaml.kind = Some("final".to_string()),
        StateKind::ShallowHistory { memory } => {
            yaml.kind = Some("shallow history".to_string());
            yaml.memory = memory.clone();
        }
        StateKind::DeepHistory { memory } => {
            yaml.kind = Some("deep history".to_string());
            yaml.memory = memory.clone();
        }
        StateKind::Compound { initial } => yaml.initial = Some(initial.clone()),
        StateKind::Orthogonal => {}
    }

    yaml.on_entry = state.on_entry.clone();
    yaml.on_exit = state.on_exit.clone();
    yaml.contract = contract_to_items(&state.contract);
    yaml.transitions = chart
        .transitions_from(name)
        .map(|transition| YamlTransition {
            target: transition.target.clone(),
            event: transition.event.clone(),
            guard: transition.guard.clone(),
            action: transition.action.clone(),
            priority: (transition.priority != 0).then_some(YamlPriority::Number(transition.priority)),
            contract: contract_to_items(&transition.contract),
        })
        .collect();

    let children: Vec<YamlState> = chart
        .children_for(name)
        .iter()
        .map(|child| state_to_yaml(chart, child))
        .collect();
    if !children.is_empty() {
        if state.is_orthogonal() {
            yaml.parallel_states = Some(children);
        } else {
            yaml.states = Some(children);
        }
    }
    yaml
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAMP: &str = r#"
statechart:
  name: lamp
  description: A two-state lamp
  preamble: switches = 0
  root state:
    name: root
    initial: off
    states:
      - name: off
        transitions:
          - target: on
            event: toggle
            action: switches = switches + 1
      - name: on
        transitions:
          - target: off
            event: toggle
            priority: high
"#;

    #[test]
    fn test_import_basic_chart() {
        let chart = import_from_yaml(LAMP).unwrap();
        assert_eq!(chart.name(), "lamp");
        assert_eq!(chart.description(), Some("A two-state lamp"));
        assert_eq!(chart.preamble(), Some("switches = 0"));
        assert_eq!(chart.children_for("root"), ["off", "on"]);
        assert_eq!(chart.transitions().len(), 2);
        assert_eq!(chart.transitions()[1].priority, PRIORITY_HIGH);
    }

    #[test]
    fn test_import_priority_tokens() {
        let chart = import_from_yaml(
            r#"
statechart:
  name: priorities
  root state:
    name: root
    initial: a
    states:
      - name: a
        transitions:
          - target: b
            event: go
            priority: low
          - target: b
            event: go
            priority: 3
      - name: b
"#,
        )
        .unwrap();
        assert_eq!(chart.transitions()[0].priority, PRIORITY_LOW);
        assert_eq!(chart.transitions()[1].priority, 3);
    }

    #[test]
    fn test_import_rejects_unknown_priority_token() {
        let result = import_from_yaml(
            r#"
statechart:
  name: bad
  root state:
    name: root
    initial: a
    states:
      - name: a
        transitions:
          - target: a
            event: go
            priority: urgent
"#,
        );
        assert!(matches!(result, Err(StatechartError::Structure(_))));
    }

    #[test]
    fn test_import_rejects_unknown_state_type() {
        let result = import_from_yaml(
            r#"
statechart:
  name: bad
  root state:
    name: root
    initial: a
    states:
      - name: a
        type: mysterious
"#,
        );
        assert!(matches!(result, Err(StatechartError::Structure(_))));
    }

    #[test]
    fn test_import_history_and_parallel() {
        let chart = import_from_yaml(
            r#"
statechart:
  name: workers
  root state:
    name: root
    initial: active
    states:
      - name: active
        initial: work
        states:
          - name: work
            parallel states:
              - name: r1
                initial: r1a
                states:
                  - name: r1a
              - name: r2
                initial: r2a
                states:
                  - name: r2a
          - name: memory
            type: deep history
            memory: work
"#,
        )
        .unwrap();
        let memory = chart.state_for("memory").unwrap();
        assert!(memory.is_history());
        assert!(chart.state_for("work").unwrap().is_orthogonal());
        assert_eq!(chart.children_for("work"), ["r1", "r2"]);
    }

    #[test]
    fn test_import_contracts() {
        let chart = import_from_yaml(
            r#"
statechart:
  name: contracts
  root state:
    name: root
    initial: a
    states:
      - name: a
        contract:
          - before: x >= 0
          - after: x >= 1
          - always: x < 100
"#,
        )
        .unwrap();
        let contract = &chart.state_for("a").unwrap().contract;
        assert_eq!(contract.preconditions, vec!["x >= 0"]);
        assert_eq!(contract.postconditions, vec!["x >= 1"]);
        assert_eq!(contract.invariants, vec!["x < 100"]);
    }

    #[test]
    fn test_round_trip_is_structurally_equal() {
        let chart = import_from_yaml(LAMP).unwrap();
        let exported = export_to_yaml(&chart).unwrap();
        let reimported = import_from_yaml(&exported).unwrap();
        assert_eq!(chart, reimported);
    }

    #[test]
    fn test_invalid_yaml_surfaces_as_yaml_error() {
        let result = import_from_yaml("statechart: [not, a, chart]");
        assert!(matches!(result, Err(StatechartError::Yaml(_))));
    }

    #[test]
    fn test_invalid_structure_is_rejected_on_import() {
        let result = import_from_yaml(
            r#"
statechart:
  name: dangling
  root state:
    name: root
    initial: a
    states:
      - name: a
        transitions:
          - target: ghost
            event: go
"#,
        );
        assert!(matches!(result, Err(StatechartError::Structure(_))));
    }
}
