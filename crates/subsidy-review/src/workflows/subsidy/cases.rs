use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{
    Caller, CaseId, CaseStatus, Decision, InvalidRoleError, NewCase, PatientCase, Role,
    ValidationError,
};
use super::policy::{ApprovalPolicyEngine, ReviewSnapshot};
use super::repository::{CaseCommit, RepositoryError, ReviewStore};

static CASE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_case_id() -> CaseId {
    let id = CASE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    CaseId(format!("case-{id:06}"))
}

/// Case plus its derived review state and full decision history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseView {
    pub case: PatientCase,
    pub review: ReviewSnapshot,
    pub history: Vec<Decision>,
}

/// Case awaiting a decision from a given reviewer role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub case: PatientCase,
    pub outstanding_roles: Vec<Role>,
}

/// Case counts by lifecycle bucket plus the period's budget figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub fiscal_year: i32,
    pub total_cases: usize,
    pub pending: usize,
    pub on_hold: usize,
    /// Approved, in treatment or completed.
    pub approved: usize,
    pub declined: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocated_budget: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spent_budget: Option<u64>,
}

/// Case registration, treatment progress and read models.
pub struct CaseRegistry<S> {
    store: Arc<S>,
    engine: ApprovalPolicyEngine,
}

impl<S> CaseRegistry<S>
where
    S: ReviewStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            engine: ApprovalPolicyEngine::new(),
        }
    }

    /// Register a new application in `pending`.
    pub fn register(&self, submission: NewCase) -> Result<PatientCase, CaseError> {
        submission.validate()?;
        let case = PatientCase::from_submission(next_case_id(), submission, Utc::now());
        let stored = self.store.insert_case(case)?;
        info!(case_id = %stored.id, clinic = %stored.clinic_name, "case registered");
        Ok(stored)
    }

    pub fn get(&self, case_id: &CaseId) -> Result<PatientCase, CaseError> {
        self.store
            .fetch_case(case_id)?
            .ok_or_else(|| CaseError::NotFound(case_id.clone()))
    }

    pub fn view(&self, case_id: &CaseId) -> Result<CaseView, CaseError> {
        let case = self.get(case_id)?;
        let history = self.store.decisions(case_id)?;
        let review = self.engine.evaluate(&case, &history);
        Ok(CaseView {
            case,
            review,
            history,
        })
    }

    /// Move an approved case through treatment. Administrative roles only.
    pub fn advance_treatment(
        &self,
        caller: &Caller,
        case_id: &CaseId,
        target: CaseStatus,
    ) -> Result<PatientCase, CaseError> {
        caller.require_administrator()?;
        let case = self.get(case_id)?;

        let allowed = matches!(
            (case.status, target),
            (CaseStatus::Approved, CaseStatus::TreatmentStarted)
                | (CaseStatus::TreatmentStarted, CaseStatus::Completed)
        );
        if !allowed {
            return Err(CaseError::InvalidTransition {
                case_id: case.id,
                from: case.status,
                to: target,
            });
        }

        let from = case.status;
        let mut updated = case;
        updated.status = target;
        updated.updated_at = Utc::now();
        let receipt = self.store.commit(CaseCommit {
            case: updated,
            decision: None,
            ledger: None,
        })?;

        info!(
            case_id = %receipt.case.id,
            from = %from,
            to = %receipt.case.status,
            caller = %caller.id.0,
            "treatment progress recorded"
        );
        Ok(receipt.case)
    }

    /// Open cases on which `role` still owes a decision, oldest first.
    pub fn review_queue(&self, role: Role) -> Result<Vec<QueueEntry>, CaseError> {
        if !role.is_reviewer() {
            return Err(InvalidRoleError::NotAReviewer { role }.into());
        }

        let mut queue = Vec::new();
        for case in self.store.list_cases()? {
            if !matches!(case.status, CaseStatus::Pending | CaseStatus::OnHold) {
                continue;
            }
            let history = self.store.decisions(&case.id)?;
            let review = self.engine.evaluate(&case, &history);
            if review.owes_decision(role) {
                queue.push(QueueEntry {
                    case,
                    outstanding_roles: review.outstanding_roles,
                });
            }
        }
        Ok(queue)
    }

    pub fn dashboard(&self, fiscal_year: i32) -> Result<DashboardSummary, CaseError> {
        let cases = self.store.list_cases()?;
        let count = |predicate: fn(CaseStatus) -> bool| {
            cases.iter().filter(|case| predicate(case.status)).count()
        };
        let period = self.store.fetch_period(fiscal_year)?;

        Ok(DashboardSummary {
            fiscal_year,
            total_cases: cases.len(),
            pending: count(|status| status == CaseStatus::Pending),
            on_hold: count(|status| status == CaseStatus::OnHold),
            approved: count(CaseStatus::is_funded),
            declined: count(|status| status == CaseStatus::Declined),
            allocated_budget: period.as_ref().map(|period| period.allocated_budget),
            spent_budget: period.as_ref().map(|period| period.spent_budget),
        })
    }
}

/// Error raised by the case registry.
#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    InvalidRole(#[from] InvalidRoleError),
    #[error("case {0} not found")]
    NotFound(CaseId),
    #[error("case {case_id} cannot move from {from} to {to}")]
    InvalidTransition {
        case_id: CaseId,
        from: CaseStatus,
        to: CaseStatus,
    },
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}
