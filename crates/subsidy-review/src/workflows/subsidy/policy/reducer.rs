use std::collections::BTreeMap;

use super::super::domain::{Decision, DecisionOutcome, Role};

/// The latest decision each role holds on a case.
///
/// Built from the full decision history in insertion order. A later timestamp
/// supersedes an earlier one; equal timestamps resolve to the later insertion.
#[derive(Debug, Clone, Default)]
pub struct ActiveDecisions<'a> {
    by_role: BTreeMap<Role, &'a Decision>,
}

impl<'a> ActiveDecisions<'a> {
    pub fn from_history(history: &'a [Decision]) -> Self {
        let mut by_role: BTreeMap<Role, &'a Decision> = BTreeMap::new();
        for decision in history {
            match by_role.get(&decision.reviewer_role) {
                Some(current) if current.decided_at > decision.decided_at => {}
                _ => {
                    by_role.insert(decision.reviewer_role, decision);
                }
            }
        }
        Self { by_role }
    }

    pub fn get(&self, role: Role) -> Option<&'a Decision> {
        self.by_role.get(&role).copied()
    }

    pub fn outcome(&self, role: Role) -> Option<DecisionOutcome> {
        self.get(role).map(|decision| decision.outcome)
    }

    /// Active decisions of the required reviewer roles, in role order.
    pub fn required(&self) -> impl Iterator<Item = &'a Decision> + '_ {
        Role::REQUIRED_REVIEWERS
            .into_iter()
            .filter_map(move |role| self.get(role))
    }

    /// First required reviewer whose active decision is a decline.
    pub fn decline(&self) -> Option<&'a Decision> {
        self.required()
            .find(|decision| decision.outcome == DecisionOutcome::Declined)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Decision> + '_ {
        self.by_role.values().copied()
    }

    pub fn len(&self) -> usize {
        self.by_role.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_role.is_empty()
    }
}
