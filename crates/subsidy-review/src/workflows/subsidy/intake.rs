use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ReviewConfig;

use super::domain::{
    Caller, CaseId, CaseStatus, Decision, DecisionId, DecisionOutcome, InvalidRoleError,
    PatientCase, ValidationError,
};
use super::ledger::{LedgerEntry, LedgerUpdate};
use super::policy::{ActiveDecisions, ApprovalPolicyEngine};
use super::repository::{CaseCommit, RepositoryError, ReviewStore};

static DECISION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_decision_id() -> DecisionId {
    let id = DECISION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DecisionId(format!("dec-{id:06}"))
}

/// A reviewer's decision on one case. The reviewer identity travels separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSubmission {
    pub case_id: CaseId,
    pub outcome: DecisionOutcome,
    #[serde(default)]
    pub justification: Option<String>,
}

/// Result of an accepted decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionReceipt {
    pub case: PatientCase,
    pub decision: Decision,
    pub previous_status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerUpdate>,
}

impl DecisionReceipt {
    pub fn transitioned(&self) -> bool {
        self.previous_status != self.case.status
    }
}

/// Validates reviewer decisions and commits them together with the derived case status.
pub struct DecisionIntakeService<S> {
    store: Arc<S>,
    engine: ApprovalPolicyEngine,
    config: ReviewConfig,
}

impl<S> DecisionIntakeService<S>
where
    S: ReviewStore + 'static,
{
    pub fn new(store: Arc<S>, config: ReviewConfig) -> Self {
        Self {
            store,
            engine: ApprovalPolicyEngine::new(),
            config,
        }
    }

    /// Accept one reviewer's decision and commit it with the resulting status.
    ///
    /// Nothing is written when validation fails. A lost revision race re-reads
    /// the case and its decisions and derives again.
    pub fn submit_decision(
        &self,
        caller: &Caller,
        submission: DecisionSubmission,
    ) -> Result<DecisionReceipt, IntakeError> {
        caller.require_reviewer()?;

        let justification = submission
            .justification
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        if submission.outcome == DecisionOutcome::Declined && justification.is_none() {
            info!(
                case_id = %submission.case_id,
                role = %caller.role,
                "decline rejected without justification"
            );
            return Err(ValidationError::MissingJustification.into());
        }

        let now = Utc::now();
        let decision = Decision {
            id: next_decision_id(),
            case_id: submission.case_id.clone(),
            reviewer_id: caller.id.clone(),
            reviewer_role: caller.role,
            outcome: submission.outcome,
            justification,
            decided_at: now,
        };

        let attempts = self.config.max_commit_attempts.max(1);
        for attempt in 1..=attempts {
            let case = self
                .store
                .fetch_case(&submission.case_id)?
                .ok_or_else(|| IntakeError::CaseNotFound(submission.case_id.clone()))?;

            if case.status.is_terminal() {
                info!(
                    case_id = %case.id,
                    status = %case.status,
                    "decision against closed case rejected"
                );
                return Err(IntakeError::CaseClosed {
                    case_id: case.id,
                    status: case.status,
                });
            }

            let mut history = self.store.decisions(&case.id)?;
            history.push(decision.clone());
            let commit = self.plan_commit(case, &history, &decision, now);
            let previous_status = commit.previous_status;
            let movement = commit.ledger.as_ref().map(|entry| entry.movement);

            match self.store.commit(commit.into_commit()) {
                Ok(receipt) => {
                    info!(
                        case_id = %receipt.case.id,
                        role = %decision.reviewer_role,
                        outcome = decision.outcome.label(),
                        from = %previous_status,
                        to = %receipt.case.status,
                        "decision accepted"
                    );
                    return Ok(DecisionReceipt {
                        case: receipt.case,
                        decision,
                        previous_status,
                        ledger: receipt
                            .period
                            .zip(movement)
                            .map(|(period, movement)| LedgerUpdate::after(movement, period)),
                    });
                }
                Err(RepositoryError::StaleRevision { .. }) => {
                    debug!(
                        case_id = %submission.case_id,
                        attempt,
                        "case changed concurrently; re-deriving"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(IntakeError::Contended {
            case_id: submission.case_id,
            attempts,
        })
    }

    fn plan_commit(
        &self,
        case: PatientCase,
        history: &[Decision],
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> PlannedCommit {
        let previous_status = case.status;
        let status = self.engine.derive_status(&case, history);

        let mut updated = case;
        updated.status = status;
        updated.updated_at = now;
        if status == CaseStatus::Declined {
            updated.decline_reason = ActiveDecisions::from_history(history)
                .decline()
                .and_then(|declined| declined.justification.clone());
        }

        let ledger = match (previous_status, status) {
            (previous, CaseStatus::Approved) if previous != CaseStatus::Approved => {
                Some(LedgerEntry::approval_of(&updated, now))
            }
            (CaseStatus::Approved, next) if !next.is_funded() => {
                Some(LedgerEntry::withdrawal_of(&updated, now))
            }
            _ => None,
        };

        PlannedCommit {
            previous_status,
            case: updated,
            decision: decision.clone(),
            ledger,
        }
    }
}

struct PlannedCommit {
    previous_status: CaseStatus,
    case: PatientCase,
    decision: Decision,
    ledger: Option<LedgerEntry>,
}

impl PlannedCommit {
    fn into_commit(self) -> CaseCommit {
        CaseCommit {
            case: self.case,
            decision: Some(self.decision),
            ledger: self.ledger,
        }
    }
}

/// Error raised by the decision intake service.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("case {case_id} is {status} and accepts no further decisions")]
    CaseClosed { case_id: CaseId, status: CaseStatus },
    #[error(transparent)]
    InvalidRole(#[from] InvalidRoleError),
    #[error("case {0} not found")]
    CaseNotFound(CaseId),
    #[error("no budget period provisioned for {fiscal_year}")]
    NoBudgetPeriod { fiscal_year: i32 },
    #[error("case {case_id} kept changing; gave up after {attempts} attempts")]
    Contended { case_id: CaseId, attempts: u32 },
    #[error("persistence failure: {0}")]
    Persistence(RepositoryError),
}

impl From<RepositoryError> for IntakeError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::MissingBudgetPeriod { fiscal_year } => {
                Self::NoBudgetPeriod { fiscal_year }
            }
            other => Self::Persistence(other),
        }
    }
}
