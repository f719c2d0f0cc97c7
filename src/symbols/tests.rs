//! Unit tests for the symbol table

use crate::fsm::{Entity, Graph};
use crate::symbols::SymbolTable;

#[test]
fn test_first_seen_allocation() {
    let mut graph = Graph::new("T");
    let a = graph.add_state("A");
    let b = graph.add_state("B");
    let t = graph.add_transition(a, b, "go").unwrap();

    let mut table = SymbolTable::new();
    assert_eq!(table.id_for(b).unwrap(), 0);
    assert_eq!(table.id_for(a).unwrap(), 1);
    assert_eq!(table.id_for(t).unwrap(), 2);
    assert_eq!(table.id_for(b).unwrap(), 0);
    assert_eq!(table.len(), 3);
}

#[test]
fn test_reverse_lookup_checks_kind() {
    let mut graph = Graph::new("T");
    let a = graph.add_state("A");
    let t = graph.add_transition(a, a, "loop").unwrap();
    let c = graph.transition(t).unwrap().condition().id();

    let mut table = SymbolTable::new();
    let state_id = table.id_for(a).unwrap();
    let condition_id = table.id_for(c).unwrap();

    assert_eq!(table.state_for(state_id), Some(a));
    assert_eq!(table.transition_for(state_id), None);
    assert_eq!(table.condition_for(condition_id), Some(c));
    assert_eq!(table.entity_for(condition_id), Some(Entity::Condition(c)));
    assert_eq!(table.entity_for(99), None);
}

#[test]
fn test_ids_outlive_deleted_entities() {
    let mut graph = Graph::new("T");
    let a = graph.add_state("A");
    let mut table = SymbolTable::new();
    let id = table.id_for(a).unwrap();

    graph.remove_state(a).unwrap();
    let b = graph.add_state("B");
    assert_eq!(table.id_for(b).unwrap(), id + 1);
    assert_eq!(table.state_for(id), Some(a));
}

#[test]
fn test_peek_does_not_allocate() {
    let mut graph = Graph::new("T");
    let a = graph.add_state("A");
    let table = SymbolTable::new();
    assert_eq!(table.id(a), None);
    assert!(table.is_empty());
}

#[test]
fn test_serde_keeps_ids_and_counter() {
    let mut graph = Graph::new("T");
    let a = graph.add_state("A");
    let b = graph.add_state("B");
    let c = graph.add_state("C");

    let mut table = SymbolTable::new();
    table.id_for(a).unwrap();
    table.id_for(b).unwrap();

    let json = serde_json::to_string(&table).unwrap();
    let mut restored: SymbolTable = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.id(a), Some(0));
    assert_eq!(restored.id(b), Some(1));
    assert_eq!(restored.id_for(c).unwrap(), 2);

    let entries: Vec<_> = restored.iter().map(|(id, _)| id).collect();
    assert_eq!(entries, [0, 1, 2]);
}

#[test]
fn test_shared_table_serializes_access() {
    let mut graph = Graph::new("T");
    let a = graph.add_state("A");
    let shared = SymbolTable::new().shared();

    let writer = shared.clone();
    std::thread::spawn(move || {
        writer.write().id_for(a).unwrap();
    })
    .join()
    .unwrap();

    assert_eq!(shared.read().state_for(0), Some(a));
}
