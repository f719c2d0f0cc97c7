//! Code Generation
//! Emits Arduino-style firmware for a state machine graph into a code template.
//!
//! Generation runs in two steps. A plan is built first, walking states in
//! graph order and their outgoing transitions in transition order, assigning
//! symbol ids as entities are first met. The plan is then written out. Logging
//! mode only adds instrumentation lines: both modes produce the same editable
//! ranges in the same order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::fsm::{ActionId, ConditionId, Entity, Graph, State, StateId, Transition, TransitionId};
use crate::symbols::{SymbolError, SymbolTable};
use crate::template::{TemplateBuffer, TemplateError, TemplateResult};

mod messaging;
mod policy;

pub use messaging::messaging_header;
pub use policy::StateMachinePolicy;

#[cfg(test)]
mod tests;

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
    #[error("Symbol error: {0}")]
    Symbol(#[from] SymbolError),
    #[error("Transition {transition} points at missing {state}")]
    DanglingTransition {
        transition: TransitionId,
        state: StateId,
    },
}

pub type CodegenResult<T> = Result<T, CodegenError>;

/// Template keys of the state machine generator.
///
/// Conditions and actions key both their editable range and an extra range
/// covering their whole line; states and transitions only key extra ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Declarations,
    Setup,
    State(StateId),
    Transition(TransitionId),
    Condition(ConditionId),
    Action(ActionId),
}

impl Key {
    pub fn entity(&self) -> Option<Entity> {
        match *self {
            Key::Declarations | Key::Setup => None,
            Key::State(id) => Some(Entity::State(id)),
            Key::Transition(id) => Some(Entity::Transition(id)),
            Key::Condition(id) => Some(Entity::Condition(id)),
            Key::Action(id) => Some(Entity::Action(id)),
        }
    }
}

impl From<Entity> for Key {
    fn from(entity: Entity) -> Self {
        match entity {
            Entity::State(id) => Key::State(id),
            Entity::Transition(id) => Key::Transition(id),
            Entity::Condition(id) => Key::Condition(id),
            Entity::Action(id) => Key::Action(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    /// Emit trace protocol calls
    pub logging: bool,
    pub indent: String,
    /// Header providing the device-side messaging functions
    pub header_name: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            logging: false,
            indent: "\t".to_string(),
            header_name: "Messaging.h".to_string(),
        }
    }
}

impl GeneratorOptions {
    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }
}

pub const DECLARATIONS_PLACEHOLDER: &str = "// Declarations";
pub const SETUP_PLACEHOLDER: &str = "// Setup";
pub const CONDITION_PLACEHOLDER: &str = "false";

/// Generate firmware for `graph`, assigning symbol ids through `symbols`
pub fn generate_code(
    graph: &Graph,
    symbols: &mut SymbolTable,
    options: &GeneratorOptions,
) -> CodegenResult<TemplateBuffer<Key>> {
    let plan = MachinePlan::build(graph, symbols)?;
    let mut out = TemplateBuffer::with_indent(options.indent.clone());
    write_machine(&mut out, &plan, options)?;
    log::debug!(
        "generated {} bytes with {} editable ranges for {:?} (logging: {})",
        out.code().len(),
        out.editable_ranges().len(),
        graph.name,
        options.logging
    );
    Ok(out)
}

// ============================================================================
// PLAN
// ============================================================================

struct MachinePlan<'g> {
    name: &'g str,
    initial: Option<String>,
    states: Vec<StatePlan<'g>>,
}

struct StatePlan<'g> {
    state: &'g State,
    symbol: u16,
    constant: String,
    transitions: Vec<TransitionPlan<'g>>,
}

struct TransitionPlan<'g> {
    transition: &'g Transition,
    symbol: u16,
    condition_symbol: u16,
    target_constant: String,
}

impl<'g> MachinePlan<'g> {
    fn build(graph: &'g Graph, symbols: &mut SymbolTable) -> CodegenResult<Self> {
        let mut used = HashSet::new();
        let mut constants = Vec::with_capacity(graph.states().len());
        for state in graph.states() {
            let symbol = symbols.id_for(state.id())?;
            let mut constant = format!("kState{}", to_camel_case(&state.name));
            if !used.insert(constant.clone()) {
                constant = format!("{}_{}", constant, symbol);
                used.insert(constant.clone());
            }
            constants.push((state.id(), symbol, constant));
        }
        let constant_for = |transition: &Transition, state: StateId| {
            constants
                .iter()
                .find(|(id, _, _)| *id == state)
                .map(|(_, _, c)| c.clone())
                .ok_or(CodegenError::DanglingTransition {
                    transition: transition.id(),
                    state,
                })
        };

        let mut states = Vec::with_capacity(constants.len());
        for (state, (_, symbol, constant)) in graph.states().iter().zip(&constants) {
            let mut transitions = Vec::new();
            for transition in graph.outgoing(state.id()) {
                let symbol = symbols.id_for(transition.id())?;
                let condition_symbol = symbols.id_for(transition.condition().id())?;
                for action in transition.actions() {
                    symbols.id_for(action.id())?;
                }
                transitions.push(TransitionPlan {
                    transition,
                    symbol,
                    condition_symbol,
                    target_constant: constant_for(transition, transition.target())?,
                });
            }
            states.push(StatePlan {
                state,
                symbol: *symbol,
                constant: constant.clone(),
                transitions,
            });
        }

        let initial = match graph.initial_state() {
            Some(initial) => states
                .iter()
                .find(|s| s.state.id() == initial.id())
                .map(|s| s.constant.clone()),
            None => {
                if let Some(first) = states.first() {
                    log::warn!(
                        "{:?} has no initial state, starting in {:?}",
                        graph.name,
                        first.state.name
                    );
                }
                states.first().map(|s| s.constant.clone())
            }
        };

        Ok(Self {
            name: &graph.name,
            initial,
            states,
        })
    }
}

// ============================================================================
// EMISSION
// ============================================================================

fn write_machine(
    out: &mut TemplateBuffer<Key>,
    plan: &MachinePlan<'_>,
    options: &GeneratorOptions,
) -> TemplateResult<()> {
    let logging = options.logging;

    out.write_line(&format!("// State machine \"{}\", generated by statewire", plan.name));
    if logging {
        out.write_line(&format!("#include \"{}\"", options.header_name));
    }

    if !plan.states.is_empty() {
        out.blank_line();
        out.write_line("enum State {");
        out.indented(|out| {
            for state in &plan.states {
                out.write_line(&format!("{},", state.constant));
            }
        });
        out.write_line("};");
    }
    if let Some(initial) = &plan.initial {
        out.blank_line();
        out.write_line(&format!("State currentState = {};", initial));
    }

    out.blank_line();
    out.write_editable_line(Key::Declarations, DECLARATIONS_PLACEHOLDER)?;

    out.blank_line();
    out.write_line("void setup() {");
    if logging {
        out.indented(|out| out.write_line("setupMessaging();"));
    }
    out.indented_editable(Key::Setup, |out| {
        out.write(SETUP_PLACEHOLDER);
        Ok(())
    })?;
    out.write_line("}");

    out.blank_line();
    out.write_line("void loop() {");
    out.indented(|out| -> TemplateResult<()> {
        if logging {
            out.write_line("sendMessageIterationStart();");
        }
        if !plan.states.is_empty() {
            out.write_line("switch (currentState) {");
            out.indented(|out| -> TemplateResult<()> {
                for state in &plan.states {
                    write_state(out, state, logging)?;
                }
                Ok(())
            })?;
            out.write_line("}");
        }
        if logging {
            out.write_line("sendMessageIterationEnd();");
        }
        Ok(())
    })?;
    out.write_line("}");
    out.write("\n");
    Ok(())
}

fn write_state(
    out: &mut TemplateBuffer<Key>,
    plan: &StatePlan<'_>,
    logging: bool,
) -> TemplateResult<()> {
    out.write_line("");
    out.extra(Key::State(plan.state.id()), |out| {
        out.write(&format!("case {}: {{", plan.constant));
        out.indented(|out| -> TemplateResult<()> {
            if logging {
                out.write_line(&format!("sendMessageCurrentState({});", plan.symbol));
            }
            for transition in &plan.transitions {
                write_transition(out, transition, logging)?;
            }
            out.write_line("break;");
            Ok(())
        })?;
        out.write_line("}");
        Ok(())
    })
}

fn write_transition(
    out: &mut TemplateBuffer<Key>,
    plan: &TransitionPlan<'_>,
    logging: bool,
) -> TemplateResult<()> {
    let transition = plan.transition;
    let condition = transition.condition();

    out.write_line("");
    out.extra(Key::Transition(transition.id()), |out| {
        out.write(&comment(&condition.name));
        out.write_line("");
        out.extra(Key::Condition(condition.id()), |out| {
            if logging {
                out.write(&format!(
                    "if (sendMessageWillCheckCondition({}, {}) && (",
                    plan.symbol, plan.condition_symbol
                ));
            } else {
                out.write("if (");
            }
            out.write_editable(Key::Condition(condition.id()), CONDITION_PLACEHOLDER)?;
            out.write(if logging { ")) {" } else { ") {" });
            Ok(())
        })?;

        out.indented(|out| -> TemplateResult<()> {
            if logging {
                out.write_line(&format!("sendMessageWillPerformTransition({});", plan.symbol));
            }
            for (index, action) in transition.actions().iter().enumerate() {
                out.write_line("");
                out.extra(Key::Action(action.id()), |out| {
                    if logging {
                        out.write(&format!(
                            "sendMessageWillPerformAction({}, {});",
                            plan.symbol, index
                        ));
                    }
                    out.write_editable_line(Key::Action(action.id()), &comment(&action.name))
                })?;
            }
            out.write_line(&format!("currentState = {};", plan.target_constant));
            out.write_line("break;");
            Ok(())
        })?;
        out.write_line("}");
        Ok(())
    })
}

/// A one-line comment quoting an entity name
fn comment(name: &str) -> String {
    format!("// {}", name.replace(['\r', '\n'], " "))
}

/// `kState` suffix for a state name: words capitalised, everything else dropped
fn to_camel_case(name: &str) -> String {
    let mut result = String::new();
    for word in name.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            result.push(first.to_ascii_uppercase());
            result.extend(chars);
        }
    }
    if result.is_empty() || result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert_str(0, "State");
    }
    result
}
