//! Reconcile policy for state machine templates.

use super::Key;
use crate::fsm::Graph;
use crate::reconcile::RangePolicy;

/// Matches old ranges to new ones through the graph's edit history.
///
/// A pasted condition or action may take over the text of the one it was
/// copied from. A condition absorbed by [`Graph::collapse_state`] (or an
/// action absorbed by [`Graph::merge_actions`]) is folded into its survivor.
pub struct StateMachinePolicy<'g> {
    graph: &'g Graph,
}

impl<'g> StateMachinePolicy<'g> {
    /// `graph` is the graph the new template was generated from
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }
}

impl RangePolicy<Key> for StateMachinePolicy<'_> {
    fn can_substitute(&self, old_key: &Key, new_key: &Key) -> bool {
        match (old_key, new_key) {
            (Key::Condition(old), Key::Condition(new)) => self
                .graph
                .condition(*new)
                .is_some_and(|(_, c)| c.origin() == Some(*old)),
            (Key::Action(old), Key::Action(new)) => self
                .graph
                .action(*new)
                .is_some_and(|(_, _, a)| a.origin() == Some(*old)),
            _ => false,
        }
    }

    fn can_merge(&self, key: &Key, other_key: &Key) -> bool {
        match (key, other_key) {
            (Key::Condition(id), Key::Condition(other)) => self
                .graph
                .condition(*id)
                .is_some_and(|(_, c)| c.absorbed().contains(other)),
            (Key::Action(id), Key::Action(other)) => self
                .graph
                .action(*id)
                .is_some_and(|(_, _, a)| a.absorbed().contains(other)),
            _ => false,
        }
    }

    fn merge_code(&self, key: &Key, code: &str, other_code: &str, line_prefix: &str) -> String {
        match key {
            Key::Condition(_) => format!("({}) && ({})", code, other_code),
            _ => format!("{}\n{}{}", code, line_prefix, other_code),
        }
    }
}
