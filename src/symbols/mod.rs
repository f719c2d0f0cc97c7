//! Symbol Table
//! Stable 16-bit identifiers for graph entities, shared by generated code and the trace protocol.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::fsm::{ActionId, ConditionId, Entity, StateId, TransitionId};

#[cfg(test)]
mod tests;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("Symbol space exhausted: more than {} entities", u16::MAX as u32 + 1)]
    Exhausted,
}

pub type SymbolResult<T> = Result<T, SymbolError>;

/// A symbol table shared between the generator (writer) and the trace decoder (reader).
pub type SharedSymbolTable = Arc<RwLock<SymbolTable>>;

/// Bidirectional entity <-> id mapping.
///
/// Ids are handed out in first-seen order from a counter that never goes back,
/// so an id embedded in firmware keeps meaning the same entity for the whole
/// session even after the entity is deleted from the graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "SymbolTableRepr", into = "SymbolTableRepr")]
pub struct SymbolTable {
    next_id: u32,
    by_entity: HashMap<Entity, u16>,
    by_id: HashMap<u16, Entity>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedSymbolTable {
        Arc::new(RwLock::new(self))
    }

    /// Id of `entity`, allocating the next free one on first encounter
    pub fn id_for(&mut self, entity: impl Into<Entity>) -> SymbolResult<u16> {
        let entity = entity.into();
        if let Some(&id) = self.by_entity.get(&entity) {
            return Ok(id);
        }
        let id = u16::try_from(self.next_id)
            .map_err(|_| SymbolError::Exhausted)?;
        self.next_id += 1;
        self.by_entity.insert(entity, id);
        self.by_id.insert(id, entity);
        log::trace!("assigned symbol {} to {}", id, entity);
        Ok(id)
    }

    /// Id of `entity` if it was ever assigned one
    pub fn id(&self, entity: impl Into<Entity>) -> Option<u16> {
        self.by_entity.get(&entity.into()).copied()
    }

    pub fn entity_for(&self, id: u16) -> Option<Entity> {
        self.by_id.get(&id).copied()
    }

    pub fn state_for(&self, id: u16) -> Option<StateId> {
        match self.entity_for(id)? {
            Entity::State(state) => Some(state),
            _ => None,
        }
    }

    pub fn transition_for(&self, id: u16) -> Option<TransitionId> {
        match self.entity_for(id)? {
            Entity::Transition(transition) => Some(transition),
            _ => None,
        }
    }

    pub fn condition_for(&self, id: u16) -> Option<ConditionId> {
        match self.entity_for(id)? {
            Entity::Condition(condition) => Some(condition),
            _ => None,
        }
    }

    pub fn action_for(&self, id: u16) -> Option<ActionId> {
        match self.entity_for(id)? {
            Entity::Action(action) => Some(action),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All assignments ordered by id
    pub fn iter(&self) -> impl Iterator<Item = (u16, Entity)> {
        let mut entries: Vec<(u16, Entity)> = self.by_id.iter().map(|(&id, &e)| (id, e)).collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter()
    }
}

impl From<StateId> for Entity {
    fn from(id: StateId) -> Self {
        Entity::State(id)
    }
}

impl From<TransitionId> for Entity {
    fn from(id: TransitionId) -> Self {
        Entity::Transition(id)
    }
}

impl From<ConditionId> for Entity {
    fn from(id: ConditionId) -> Self {
        Entity::Condition(id)
    }
}

impl From<ActionId> for Entity {
    fn from(id: ActionId) -> Self {
        Entity::Action(id)
    }
}

// JSON maps need string keys, so persist as an ordered entry list.
#[derive(Serialize, Deserialize)]
struct SymbolTableRepr {
    next_id: u32,
    entries: Vec<(u16, Entity)>,
}

impl From<SymbolTable> for SymbolTableRepr {
    fn from(table: SymbolTable) -> Self {
        Self {
            next_id: table.next_id,
            entries: table.iter().collect(),
        }
    }
}

impl From<SymbolTableRepr> for SymbolTable {
    fn from(repr: SymbolTableRepr) -> Self {
        let mut table = SymbolTable {
            next_id: repr.next_id,
            ..SymbolTable::default()
        };
        for (id, entity) in repr.entries {
            table.by_entity.insert(entity, id);
            table.by_id.insert(id, entity);
            table.next_id = table.next_id.max(u32::from(id) + 1);
        }
        table
    }
}
