//! FSM Data Structures
//! The editable state machine graph: states, transitions, conditions and actions.
//!
//! The graph owns every entity in insertion-ordered containers. Transitions refer
//! to their endpoints by handle, so there are no back-pointers and no cycles.
//! Handles come from one monotonic counter per graph and are never reused, which
//! makes them usable as identities by the symbol table and the code template.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;


macro_rules! entity_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            pub fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

entity_handle!(
    /// Handle of a state within its graph
    StateId,
    "state"
);
entity_handle!(
    /// Handle of a transition within its graph
    TransitionId,
    "transition"
);
entity_handle!(
    /// Handle of the condition guarding one transition
    ConditionId,
    "condition"
);
entity_handle!(
    /// Handle of one action of a transition
    ActionId,
    "action"
);

/// Any addressable graph entity. Equality is identity, never name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Entity {
    State(StateId),
    Transition(TransitionId),
    Condition(ConditionId),
    Action(ActionId),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::State(id) => fmt::Display::fmt(id, f),
            Entity::Transition(id) => fmt::Display::fmt(id, f),
            Entity::Condition(id) => fmt::Display::fmt(id, f),
            Entity::Action(id) => fmt::Display::fmt(id, f),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Unknown state: {0}")]
    UnknownState(StateId),
    #[error("Unknown transition: {0}")]
    UnknownTransition(TransitionId),
    #[error("Unknown action: {0}")]
    UnknownAction(ActionId),
    #[error("Action index {index} out of bounds for {transition}")]
    ActionIndex { transition: TransitionId, index: usize },
    #[error("Cannot collapse {state}: needs exactly one incoming and one outgoing transition")]
    NotCollapsible { state: StateId },
    #[error("Cannot merge actions of different transitions")]
    ForeignAction,
}

pub type GraphResult<T> = Result<T, GraphError>;

/// A complete state machine graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    /// Name of the machine
    pub name: String,
    states: Vec<State>,
    transitions: Vec<Transition>,
    next_handle: u32,
}

/// A state in the machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    id: StateId,
    /// Display name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    is_initial: bool,
}

impl State {
    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn is_initial(&self) -> bool {
        self.is_initial
    }
}

/// A transition between two states
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    id: TransitionId,
    source: StateId,
    target: StateId,
    condition: Condition,
    actions: Vec<Action>,
}

impl Transition {
    pub fn id(&self) -> TransitionId {
        self.id
    }

    pub fn source(&self) -> StateId {
        self.source
    }

    pub fn target(&self) -> StateId {
        self.target
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Actions in execution order
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Format transition label for display
    pub fn label(&self) -> String {
        if self.actions.is_empty() {
            return self.condition.name.clone();
        }
        let actions: Vec<&str> = self.actions.iter().map(|a| a.name.as_str()).collect();
        format!("{} / {}", self.condition.name, actions.join(", "))
    }
}

/// The guard of a transition. Its code lives in the template, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    id: ConditionId,
    pub name: String,
    origin: Option<ConditionId>,
    absorbed: Vec<ConditionId>,
}

impl Condition {
    pub fn id(&self) -> ConditionId {
        self.id
    }

    /// The condition this one was copied from, if it was pasted
    pub fn origin(&self) -> Option<ConditionId> {
        self.origin
    }

    /// Conditions folded into this one by [`Graph::collapse_state`]
    pub fn absorbed(&self) -> &[ConditionId] {
        &self.absorbed
    }
}

/// One step of a transition's behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    id: ActionId,
    pub name: String,
    origin: Option<ActionId>,
    absorbed: Vec<ActionId>,
}

impl Action {
    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn origin(&self) -> Option<ActionId> {
        self.origin
    }

    pub fn absorbed(&self) -> &[ActionId] {
        &self.absorbed
    }
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            transitions: Vec::new(),
            next_handle: 0,
        }
    }

    fn allocate(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// States in insertion order
    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Transitions in insertion order
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.iter().find(|s| s.id == id)
    }

    pub fn state_by_name(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.id == id)
    }

    pub fn initial_state(&self) -> Option<&State> {
        self.states.iter().find(|s| s.is_initial)
    }

    /// Outgoing transitions of `state`, in transition order
    pub fn outgoing(&self, state: StateId) -> impl Iterator<Item = &Transition> + '_ {
        self.transitions.iter().filter(move |t| t.source == state)
    }

    /// Incoming transitions of `state`, in transition order
    pub fn incoming(&self, state: StateId) -> impl Iterator<Item = &Transition> + '_ {
        self.transitions.iter().filter(move |t| t.target == state)
    }

    /// The transition guarded by `id` together with the condition itself
    pub fn condition(&self, id: ConditionId) -> Option<(&Transition, &Condition)> {
        self.transitions
            .iter()
            .find(|t| t.condition.id == id)
            .map(|t| (t, &t.condition))
    }

    /// The transition owning `id`, the action's index within it and the action
    pub fn action(&self, id: ActionId) -> Option<(&Transition, usize, &Action)> {
        self.transitions.iter().find_map(|t| {
            t.actions
                .iter()
                .position(|a| a.id == id)
                .map(|index| (t, index, &t.actions[index]))
        })
    }

    pub fn contains(&self, entity: Entity) -> bool {
        match entity {
            Entity::State(id) => self.state(id).is_some(),
            Entity::Transition(id) => self.transition(id).is_some(),
            Entity::Condition(id) => self.condition(id).is_some(),
            Entity::Action(id) => self.action(id).is_some(),
        }
    }

    /// Human readable name of an entity, for logs and trace output
    pub fn describe(&self, entity: Entity) -> Option<String> {
        match entity {
            Entity::State(id) => self.state(id).map(|s| s.name.clone()),
            Entity::Transition(id) => self.transition(id).map(|t| self.transition_name(t)),
            Entity::Condition(id) => self.condition(id).map(|(_, c)| c.name.clone()),
            Entity::Action(id) => self.action(id).map(|(_, _, a)| a.name.clone()),
        }
    }

    fn transition_name(&self, transition: &Transition) -> String {
        let name = |id| self.state(id).map(|s| s.name.as_str()).unwrap_or("?");
        format!("{} -> {}", name(transition.source), name(transition.target))
    }

    /// Validate the graph, collecting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let initial_count = self.states.iter().filter(|s| s.is_initial).count();
        if initial_count == 0 {
            errors.push("No initial state defined".to_string());
        } else if initial_count > 1 {
            errors.push(format!("{} initial states defined", initial_count));
        }

        for transition in &self.transitions {
            if self.state(transition.source).is_none() {
                errors.push(format!(
                    "Transition {} source {} not found",
                    transition.id, transition.source
                ));
            }
            if self.state(transition.target).is_none() {
                errors.push(format!(
                    "Transition {} target {} not found",
                    transition.id, transition.target
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    // ========================================================================
    // STATE EDITING
    // ========================================================================

    pub fn add_state(&mut self, name: impl Into<String>) -> StateId {
        let id = StateId(self.allocate());
        self.states.push(State {
            id,
            name: name.into(),
            description: None,
            is_initial: false,
        });
        id
    }

    /// Mark `id` as the single initial state
    pub fn set_initial(&mut self, id: StateId) -> GraphResult<()> {
        if self.state(id).is_none() {
            return Err(GraphError::UnknownState(id));
        }
        for state in &mut self.states {
            state.is_initial = state.id == id;
        }
        Ok(())
    }

    pub fn rename_state(&mut self, id: StateId, name: impl Into<String>) -> GraphResult<()> {
        self.state_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn set_description(&mut self, id: StateId, description: Option<String>) -> GraphResult<()> {
        self.state_mut(id)?.description = description;
        Ok(())
    }

    /// Remove a state and every transition touching it. Returns the removed transitions.
    pub fn remove_state(&mut self, id: StateId) -> GraphResult<Vec<Transition>> {
        let index = self
            .states
            .iter()
            .position(|s| s.id == id)
            .ok_or(GraphError::UnknownState(id))?;
        self.states.remove(index);

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.transitions)
            .into_iter()
            .partition(|t| t.source == id || t.target == id);
        self.transitions = kept;
        Ok(removed)
    }

    /// Remove an intermediate state with exactly one way in and one way out.
    ///
    /// The incoming transition is retargeted to the outgoing transition's target
    /// and appends its actions (keeping their identities). The outgoing
    /// transition's condition is recorded as absorbed by the incoming one, so the
    /// reconciler can merge the two condition bodies.
    pub fn collapse_state(&mut self, id: StateId) -> GraphResult<TransitionId> {
        if self.state(id).is_none() {
            return Err(GraphError::UnknownState(id));
        }
        let incoming: Vec<TransitionId> = self.incoming(id).map(|t| t.id).collect();
        let outgoing: Vec<TransitionId> = self.outgoing(id).map(|t| t.id).collect();
        let (into, from) = match (incoming.as_slice(), outgoing.as_slice()) {
            ([into], [from]) if into != from => (*into, *from),
            _ => return Err(GraphError::NotCollapsible { state: id }),
        };

        let from_index = self.transition_index(from)?;
        let removed = self.transitions.remove(from_index);

        let kept = self.transition_mut(into)?;
        kept.target = removed.target;
        kept.condition.absorbed.push(removed.condition.id);
        kept.condition.absorbed.extend(removed.condition.absorbed);
        kept.actions.extend(removed.actions);

        self.states.retain(|s| s.id != id);
        Ok(into)
    }

    // ========================================================================
    // TRANSITION EDITING
    // ========================================================================

    pub fn add_transition(
        &mut self,
        source: StateId,
        target: StateId,
        condition_name: impl Into<String>,
    ) -> GraphResult<TransitionId> {
        for state in [source, target] {
            if self.state(state).is_none() {
                return Err(GraphError::UnknownState(state));
            }
        }
        let id = TransitionId(self.allocate());
        let condition = Condition {
            id: ConditionId(self.allocate()),
            name: condition_name.into(),
            origin: None,
            absorbed: Vec::new(),
        };
        self.transitions.push(Transition {
            id,
            source,
            target,
            condition,
            actions: Vec::new(),
        });
        Ok(id)
    }

    pub fn remove_transition(&mut self, id: TransitionId) -> GraphResult<Transition> {
        let index = self.transition_index(id)?;
        Ok(self.transitions.remove(index))
    }

    pub fn reroute_transition(
        &mut self,
        id: TransitionId,
        source: StateId,
        target: StateId,
    ) -> GraphResult<()> {
        for state in [source, target] {
            if self.state(state).is_none() {
                return Err(GraphError::UnknownState(state));
            }
        }
        let transition = self.transition_mut(id)?;
        transition.source = source;
        transition.target = target;
        Ok(())
    }

    pub fn rename_condition(
        &mut self,
        transition: TransitionId,
        name: impl Into<String>,
    ) -> GraphResult<()> {
        self.transition_mut(transition)?.condition.name = name.into();
        Ok(())
    }

    /// Copy a transition between new endpoints, as a paste does.
    ///
    /// The copy gets fresh identities throughout; its condition and actions
    /// remember the originals they were copied from.
    pub fn duplicate_transition(
        &mut self,
        id: TransitionId,
        source: StateId,
        target: StateId,
    ) -> GraphResult<TransitionId> {
        let original = self
            .transition(id)
            .cloned()
            .ok_or(GraphError::UnknownTransition(id))?;
        let copy = self.add_transition(source, target, original.condition.name.clone())?;

        let mut actions = Vec::with_capacity(original.actions.len());
        for action in &original.actions {
            actions.push(Action {
                id: ActionId(self.allocate()),
                name: action.name.clone(),
                origin: Some(action.id),
                absorbed: Vec::new(),
            });
        }

        let transition = self.transition_mut(copy)?;
        transition.condition.origin = Some(original.condition.id);
        transition.actions = actions;
        Ok(copy)
    }

    // ========================================================================
    // ACTION EDITING
    // ========================================================================

    pub fn add_action(
        &mut self,
        transition: TransitionId,
        name: impl Into<String>,
    ) -> GraphResult<ActionId> {
        let index = self
            .transition(transition)
            .map(|t| t.actions.len())
            .unwrap_or(0);
        self.insert_action(transition, index, name)
    }

    pub fn insert_action(
        &mut self,
        transition: TransitionId,
        index: usize,
        name: impl Into<String>,
    ) -> GraphResult<ActionId> {
        // Validate before allocating so failed inserts do not burn handles
        let len = self.transition_mut(transition)?.actions.len();
        if index > len {
            return Err(GraphError::ActionIndex { transition, index });
        }
        let id = ActionId(self.allocate());
        self.transition_mut(transition)?.actions.insert(
            index,
            Action {
                id,
                name: name.into(),
                origin: None,
                absorbed: Vec::new(),
            },
        );
        Ok(id)
    }

    pub fn rename_action(&mut self, id: ActionId, name: impl Into<String>) -> GraphResult<()> {
        self.action_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn remove_action(&mut self, id: ActionId) -> GraphResult<Action> {
        for transition in &mut self.transitions {
            if let Some(index) = transition.actions.iter().position(|a| a.id == id) {
                return Ok(transition.actions.remove(index));
            }
        }
        Err(GraphError::UnknownAction(id))
    }

    /// Fold `absorb` into `keep`. Both must belong to the same transition.
    pub fn merge_actions(&mut self, keep: ActionId, absorb: ActionId) -> GraphResult<()> {
        let (keep_transition, _, _) = self.action(keep).ok_or(GraphError::UnknownAction(keep))?;
        let (absorb_transition, _, _) = self
            .action(absorb)
            .ok_or(GraphError::UnknownAction(absorb))?;
        if keep_transition.id != absorb_transition.id || keep == absorb {
            return Err(GraphError::ForeignAction);
        }

        let removed = self.remove_action(absorb)?;
        let kept = self.action_mut(keep)?;
        kept.absorbed.push(removed.id);
        kept.absorbed.extend(removed.absorbed);
        Ok(())
    }

    // ========================================================================
    // INTERNAL LOOKUPS
    // ========================================================================

    fn state_mut(&mut self, id: StateId) -> GraphResult<&mut State> {
        self.states
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(GraphError::UnknownState(id))
    }

    fn transition_index(&self, id: TransitionId) -> GraphResult<usize> {
        self.transitions
            .iter()
            .position(|t| t.id == id)
            .ok_or(GraphError::UnknownTransition(id))
    }

    fn transition_mut(&mut self, id: TransitionId) -> GraphResult<&mut Transition> {
        self.transitions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(GraphError::UnknownTransition(id))
    }

    fn action_mut(&mut self, id: ActionId) -> GraphResult<&mut Action> {
        self.transitions
            .iter_mut()
            .flat_map(|t| t.actions.iter_mut())
            .find(|a| a.id == id)
            .ok_or(GraphError::UnknownAction(id))
    }
}
