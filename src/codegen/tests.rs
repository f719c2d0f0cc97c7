//! Unit tests for the state machine generator

use crate::codegen::{
    generate_code, messaging_header, GeneratorOptions, Key, StateMachinePolicy,
    CONDITION_PLACEHOLDER,
};
use crate::fsm::{Graph, StateId, TransitionId};
use crate::reconcile::RangePolicy;
use crate::symbols::SymbolTable;

/// A --go / act--> B
fn two_states() -> (Graph, [StateId; 2], TransitionId) {
    let mut graph = Graph::new("T");
    let a = graph.add_state("A");
    let b = graph.add_state("B");
    graph.set_initial(a).unwrap();
    let go = graph.add_transition(a, b, "go").unwrap();
    graph.add_action(go, "act").unwrap();
    (graph, [a, b], go)
}

fn plain() -> GeneratorOptions {
    GeneratorOptions::default()
}

fn logging() -> GeneratorOptions {
    GeneratorOptions::default().with_logging(true)
}

const TWO_STATES: &str = "\
// State machine \"T\", generated by statewire

enum State {
\tkStateA,
\tkStateB,
};

State currentState = kStateA;

// Declarations

void setup() {
\t// Setup
}

void loop() {
\tswitch (currentState) {
\t\tcase kStateA: {
\t\t\t// go
\t\t\tif (false) {
\t\t\t\t// act
\t\t\t\tcurrentState = kStateB;
\t\t\t\tbreak;
\t\t\t}
\t\t\tbreak;
\t\t}
\t\tcase kStateB: {
\t\t\tbreak;
\t\t}
\t}
}
";

const TWO_STATES_LOGGING: &str = "\
// State machine \"T\", generated by statewire
#include \"Messaging.h\"

enum State {
\tkStateA,
\tkStateB,
};

State currentState = kStateA;

// Declarations

void setup() {
\tsetupMessaging();
\t// Setup
}

void loop() {
\tsendMessageIterationStart();
\tswitch (currentState) {
\t\tcase kStateA: {
\t\t\tsendMessageCurrentState(0);
\t\t\t// go
\t\t\tif (sendMessageWillCheckCondition(2, 3) && (false)) {
\t\t\t\tsendMessageWillPerformTransition(2);
\t\t\t\tsendMessageWillPerformAction(2, 0);
\t\t\t\t// act
\t\t\t\tcurrentState = kStateB;
\t\t\t\tbreak;
\t\t\t}
\t\t\tbreak;
\t\t}
\t\tcase kStateB: {
\t\t\tsendMessageCurrentState(1);
\t\t\tbreak;
\t\t}
\t}
\tsendMessageIterationEnd();
}
";

#[test]
fn test_generate_plain() {
    let (graph, _, _) = two_states();
    let code = generate_code(&graph, &mut SymbolTable::new(), &plain()).unwrap();
    assert_eq!(code.code(), TWO_STATES);
    assert!(!code.code().contains("sendMessage"));
}

#[test]
fn test_generate_logging() {
    let (graph, _, _) = two_states();
    let code = generate_code(&graph, &mut SymbolTable::new(), &logging()).unwrap();
    assert_eq!(code.code(), TWO_STATES_LOGGING);
}

#[test]
fn test_symbol_order() {
    let (graph, [a, b], go) = two_states();
    let transition = graph.transition(go).unwrap();
    let mut symbols = SymbolTable::new();
    generate_code(&graph, &mut symbols, &plain()).unwrap();

    assert_eq!(symbols.id(a), Some(0));
    assert_eq!(symbols.id(b), Some(1));
    assert_eq!(symbols.id(go), Some(2));
    assert_eq!(symbols.id(transition.condition().id()), Some(3));
    assert_eq!(symbols.id(transition.actions()[0].id()), Some(4));
}

#[test]
fn test_ids_stable_across_passes() {
    let (graph, _, _) = two_states();
    let mut symbols = SymbolTable::new();
    let first = generate_code(&graph, &mut symbols, &logging()).unwrap();
    let assigned: Vec<_> = symbols.iter().collect();

    let second = generate_code(&graph, &mut symbols, &logging()).unwrap();
    assert_eq!(first.code(), second.code());
    assert_eq!(symbols.iter().collect::<Vec<_>>(), assigned);
}

#[test]
fn test_new_entities_get_fresh_ids() {
    let (mut graph, [a, b], _) = two_states();
    let mut symbols = SymbolTable::new();
    generate_code(&graph, &mut symbols, &logging()).unwrap();

    let back = graph.add_transition(b, a, "back").unwrap();
    generate_code(&graph, &mut symbols, &logging()).unwrap();
    assert_eq!(symbols.id(a), Some(0));
    assert_eq!(symbols.id(back), Some(5));
}

#[test]
fn test_logging_keeps_range_structure() {
    let (graph, _, _) = two_states();
    let mut symbols = SymbolTable::new();
    let plain_code = generate_code(&graph, &mut symbols, &plain()).unwrap();
    let logging_code = generate_code(&graph, &mut symbols, &logging()).unwrap();

    let plain_keys: Vec<Key> = plain_code.keys_in_order().copied().collect();
    let logging_keys: Vec<Key> = logging_code.keys_in_order().copied().collect();
    assert_eq!(plain_keys, logging_keys);
    assert_eq!(plain_keys.len(), 4);
    assert_eq!(plain_keys[0], Key::Declarations);
    assert_eq!(plain_keys[1], Key::Setup);
}

#[test]
fn test_single_state_reports_once() {
    let mut graph = Graph::new("Solo");
    let only = graph.add_state("Only");
    graph.set_initial(only).unwrap();

    let code = generate_code(&graph, &mut SymbolTable::new(), &logging()).unwrap();
    assert_eq!(code.code().matches("sendMessageCurrentState(").count(), 1);
    let keys: Vec<Key> = code.keys_in_order().copied().collect();
    assert_eq!(keys, [Key::Declarations, Key::Setup]);
}

#[test]
fn test_empty_graph() {
    let graph = Graph::new("Empty");
    let code = generate_code(&graph, &mut SymbolTable::new(), &plain()).unwrap();
    assert!(!code.code().contains("enum State"));
    assert!(!code.code().contains("currentState"));
    assert!(code.code().ends_with("}\n"));
    assert_eq!(code.editable_ranges().len(), 2);
}

#[test]
fn test_placeholders_and_extra_ranges() {
    let (graph, [a, _], go) = two_states();
    let transition = graph.transition(go).unwrap();
    let condition = transition.condition().id();
    let action = transition.actions()[0].id();
    let code = generate_code(&graph, &mut SymbolTable::new(), &plain()).unwrap();

    assert_eq!(code.code_for_key(&Key::Condition(condition)), Some(CONDITION_PLACEHOLDER));
    assert_eq!(code.code_for_key(&Key::Action(action)), Some("// act"));

    let offset = code
        .range_for_key(&Key::Condition(condition))
        .unwrap()
        .start;
    assert_eq!(
        code.extra_keys_at(offset),
        [
            &Key::Condition(condition),
            &Key::Transition(go),
            &Key::State(a)
        ]
    );
    let case_line = code.extra_range(&Key::State(a)).unwrap();
    assert!(code.code()[case_line]
        .trim_start()
        .starts_with("case kStateA: {"));
}

#[test]
fn test_initial_defaults_to_first_state() {
    let mut graph = Graph::new("T");
    graph.add_state("First");
    graph.add_state("Second");
    let code = generate_code(&graph, &mut SymbolTable::new(), &plain()).unwrap();
    assert!(code.code().contains("State currentState = kStateFirst;"));
}

#[test]
fn test_state_constants_are_sanitised() {
    let mut graph = Graph::new("T");
    graph.add_state("button pressed");
    graph.add_state("3rd");
    graph.add_state("Button-Pressed");
    let code = generate_code(&graph, &mut SymbolTable::new(), &plain()).unwrap();
    assert!(code.code().contains("\tkStateButtonPressed,\n"));
    assert!(code.code().contains("\tkStateState3rd,\n"));
    assert!(code.code().contains("\tkStateButtonPressed_2,\n"));
}

#[test]
fn test_multiline_names_stay_in_comments() {
    let mut graph = Graph::new("T");
    let a = graph.add_state("A");
    let go = graph.add_transition(a, a, "line one\nline two").unwrap();
    graph.add_action(go, "x\ny").unwrap();
    let code = generate_code(&graph, &mut SymbolTable::new(), &plain()).unwrap();
    assert!(code.code().contains("// line one line two\n"));
    assert!(code.code().contains("// x y\n"));
}

#[test]
fn test_custom_indent_and_header() {
    let (graph, _, _) = two_states();
    let options = GeneratorOptions {
        logging: true,
        indent: "  ".to_string(),
        header_name: "Trace.h".to_string(),
    };
    let code = generate_code(&graph, &mut SymbolTable::new(), &options).unwrap();
    assert!(code.code().contains("#include \"Trace.h\"\n"));
    assert!(code
        .code()
        .contains("\n  switch (currentState) {\n    case kStateA: {"));
    assert!(!code.code().contains('\t'));
}

// ============================================================================
// POLICY
// ============================================================================

#[test]
fn test_policy_follows_copy_origin() {
    let (mut graph, [a, b], go) = two_states();
    let original = graph.transition(go).unwrap().clone();
    let copy = graph.duplicate_transition(go, b, a).unwrap();
    let copied = graph.transition(copy).unwrap().clone();

    let policy = StateMachinePolicy::new(&graph);
    let old_condition = Key::Condition(original.condition().id());
    let new_condition = Key::Condition(copied.condition().id());
    assert!(policy.can_substitute(&old_condition, &new_condition));
    assert!(!policy.can_substitute(&new_condition, &old_condition));

    let old_action = Key::Action(original.actions()[0].id());
    let new_action = Key::Action(copied.actions()[0].id());
    assert!(policy.can_substitute(&old_action, &new_action));
    assert!(!policy.can_substitute(&old_action, &new_condition));
}

#[test]
fn test_policy_merge_joins_conditions() {
    let (graph, _, go) = two_states();
    let condition = Key::Condition(graph.transition(go).unwrap().condition().id());
    let policy = StateMachinePolicy::new(&graph);
    assert_eq!(policy.merge_code(&condition, "a", "b", "\t"), "(a) && (b)");
    assert_eq!(
        policy.merge_code(&Key::Setup, "a();", "b();", "\t"),
        "a();\n\tb();"
    );
}

// ============================================================================
// MESSAGING HEADER
// ============================================================================

#[test]
fn test_messaging_header() {
    let header = messaging_header();
    assert!(header.contains("static const byte kMessageStartSequence[] = { 17, 31, 23 };"));
    assert!(header.contains("kMessageWillCheckCondition = 4"));
    assert!(header.contains(
        "boolean sendMessageWillCheckCondition(uint16_t transitionID, uint16_t conditionID) {"
    ));
    assert!(header.contains("\twriteMessageHeader(kMessageWillPerformAction, 4);\n"));
    assert!(header.contains("void sendMessageIterationStart() {"));
    assert_eq!(header.matches("void sendMessage").count(), 5);
}
