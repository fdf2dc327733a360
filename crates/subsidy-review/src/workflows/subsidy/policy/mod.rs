mod reducer;

pub use reducer::ActiveDecisions;

use serde::{Deserialize, Serialize};

use super::domain::{CaseStatus, Decision, DecisionOutcome, PatientCase, Role};

/// Stateless reducer deriving a case's status from its decision history.
///
/// Status is never patched incrementally: every call replays the full history,
/// so the same history always yields the same status.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalPolicyEngine;

impl ApprovalPolicyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Derive the lifecycle status for `case` from `decisions`.
    ///
    /// Cases already in a treatment phase keep their status; those phases are
    /// driven by progress updates, not by reviewers.
    pub fn derive_status(&self, case: &PatientCase, decisions: &[Decision]) -> CaseStatus {
        if case.status.is_treatment_phase() {
            return case.status;
        }
        status_from_active(&ActiveDecisions::from_history(decisions))
    }

    /// Full derived view: status, active decision per role and roles still owing one.
    pub fn evaluate(&self, case: &PatientCase, decisions: &[Decision]) -> ReviewSnapshot {
        let active = ActiveDecisions::from_history(decisions);
        let status = if case.status.is_treatment_phase() {
            case.status
        } else {
            status_from_active(&active)
        };

        ReviewSnapshot {
            status,
            active_decisions: active.iter().cloned().collect(),
            outstanding_roles: outstanding_roles(&active),
        }
    }
}

fn status_from_active(active: &ActiveDecisions<'_>) -> CaseStatus {
    let outcomes: Vec<Option<DecisionOutcome>> = Role::REQUIRED_REVIEWERS
        .into_iter()
        .map(|role| active.outcome(role))
        .collect();

    if outcomes.iter().all(Option::is_none) {
        return CaseStatus::Pending;
    }

    if outcomes.contains(&Some(DecisionOutcome::Declined)) {
        return CaseStatus::Declined;
    }

    if outcomes.contains(&Some(DecisionOutcome::ModificationRequested)) {
        return CaseStatus::OnHold;
    }

    if outcomes
        .iter()
        .all(|outcome| *outcome == Some(DecisionOutcome::Approved))
    {
        return CaseStatus::Approved;
    }

    CaseStatus::Pending
}

/// Required roles with no active decision, or whose active decision asks for changes.
pub fn outstanding_roles(active: &ActiveDecisions<'_>) -> Vec<Role> {
    Role::REQUIRED_REVIEWERS
        .into_iter()
        .filter(|role| {
            matches!(
                active.outcome(*role),
                None | Some(DecisionOutcome::ModificationRequested)
            )
        })
        .collect()
}

/// Read-only derived view of a case used for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSnapshot {
    pub status: CaseStatus,
    pub active_decisions: Vec<Decision>,
    pub outstanding_roles: Vec<Role>,
}

impl ReviewSnapshot {
    pub fn owes_decision(&self, role: Role) -> bool {
        self.outstanding_roles.contains(&role)
    }
}
