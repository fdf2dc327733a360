use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::ReviewConfig;
use crate::workflows::subsidy::domain::{
    BudgetPeriod, Caller, CaseId, CaseStatus, Decision, DecisionId, DecisionOutcome, NewCase,
    PatientCase, ReviewerId, Role,
};
use crate::workflows::subsidy::intake::DecisionSubmission;
use crate::workflows::subsidy::ledger::LedgerEntry;
use crate::workflows::subsidy::memory::InMemoryReviewStore;
use crate::workflows::subsidy::repository::{
    CaseCommit, CommitReceipt, RepositoryError, ReviewStore,
};
use crate::workflows::subsidy::{subsidy_router, SubsidyWorkflow};

pub(super) const FISCAL_YEAR: i32 = 2025;

pub(super) fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 2, hour, minute, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn director() -> Caller {
    Caller::new("sd-anna", Role::ScientificDirector)
}

pub(super) fn values_reviewer() -> Caller {
    Caller::new("vr-luca", Role::ValuesReviewer)
}

pub(super) fn project_manager() -> Caller {
    Caller::new("pm-sara", Role::ProjectManager)
}

pub(super) fn new_case() -> NewCase {
    NewCase {
        patient_name: "Giulia Rossi".to_string(),
        clinic_name: "Clinica Nord".to_string(),
        pdc_number: "PDC-0042".to_string(),
        patient_story: "Needs a full arch restoration.".to_string(),
        full_cost: 1200,
        discounted_cost: Some(800),
        fiscal_year: Some(FISCAL_YEAR),
    }
}

pub(super) fn case_fixture(id: &str) -> PatientCase {
    PatientCase::from_submission(CaseId(id.to_string()), new_case(), at(8, 0))
}

pub(super) fn decision(role: Role, outcome: DecisionOutcome, decided_at: DateTime<Utc>) -> Decision {
    Decision {
        id: DecisionId(format!("dec-{}-{}", role.label(), decided_at.timestamp())),
        case_id: CaseId("case-fixture".to_string()),
        reviewer_id: ReviewerId(format!("{}-user", role.label())),
        reviewer_role: role,
        outcome,
        justification: (outcome == DecisionOutcome::Declined)
            .then(|| "insufficient evidence".to_string()),
        decided_at,
    }
}

pub(super) fn submission(
    case_id: &CaseId,
    outcome: DecisionOutcome,
    justification: Option<&str>,
) -> DecisionSubmission {
    DecisionSubmission {
        case_id: case_id.clone(),
        outcome,
        justification: justification.map(str::to_string),
    }
}

pub(super) fn provisioned_store(allocated: u64, spent: u64) -> Arc<InMemoryReviewStore> {
    let store = Arc::new(InMemoryReviewStore::new());
    let mut period = BudgetPeriod::new(FISCAL_YEAR, allocated, at(7, 0));
    period.spent_budget = spent;
    store.insert_period(period).expect("period provisioned");
    store
}

pub(super) fn build_workflow() -> (
    SubsidyWorkflow<InMemoryReviewStore>,
    Arc<InMemoryReviewStore>,
) {
    let store = provisioned_store(10_000, 0);
    let workflow = SubsidyWorkflow::new(store.clone(), ReviewConfig::default());
    (workflow, store)
}

pub(super) fn registered_case<S>(workflow: &SubsidyWorkflow<S>) -> PatientCase
where
    S: ReviewStore + 'static,
{
    workflow
        .cases
        .register(new_case())
        .expect("case registers")
}

pub(super) fn approve_by_both<S>(workflow: &SubsidyWorkflow<S>, case_id: &CaseId)
where
    S: ReviewStore + 'static,
{
    for caller in [director(), values_reviewer()] {
        workflow
            .intake
            .submit_decision(&caller, submission(case_id, DecisionOutcome::Approved, None))
            .expect("approval accepted");
    }
}

pub(super) fn stored_status(store: &InMemoryReviewStore, case_id: &CaseId) -> CaseStatus {
    store
        .fetch_case(case_id)
        .expect("fetch succeeds")
        .expect("case present")
        .status
}

pub(super) fn spent(store: &InMemoryReviewStore) -> u64 {
    store
        .fetch_period(FISCAL_YEAR)
        .expect("fetch succeeds")
        .expect("period present")
        .spent_budget
}

/// Delegates reads to an in-memory store but fails every write.
pub(super) struct FailingCommitStore {
    pub(super) inner: InMemoryReviewStore,
}

impl ReviewStore for FailingCommitStore {
    fn insert_case(&self, case: PatientCase) -> Result<PatientCase, RepositoryError> {
        self.inner.insert_case(case)
    }

    fn fetch_case(&self, id: &CaseId) -> Result<Option<PatientCase>, RepositoryError> {
        self.inner.fetch_case(id)
    }

    fn list_cases(&self) -> Result<Vec<PatientCase>, RepositoryError> {
        self.inner.list_cases()
    }

    fn decisions(&self, id: &CaseId) -> Result<Vec<Decision>, RepositoryError> {
        self.inner.decisions(id)
    }

    fn commit(&self, _commit: CaseCommit) -> Result<CommitReceipt, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_period(&self, fiscal_year: i32) -> Result<Option<BudgetPeriod>, RepositoryError> {
        self.inner.fetch_period(fiscal_year)
    }

    fn insert_period(&self, period: BudgetPeriod) -> Result<BudgetPeriod, RepositoryError> {
        self.inner.insert_period(period)
    }

    fn update_allocation(
        &self,
        _fiscal_year: i32,
        _allocated_budget: u64,
        _at: DateTime<Utc>,
    ) -> Result<BudgetPeriod, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn apply_ledger(&self, _entry: LedgerEntry) -> Result<BudgetPeriod, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Lets a competing decision land between the intake's read and its commit.
pub(super) struct RacingStore {
    pub(super) inner: InMemoryReviewStore,
    pub(super) competitors: Mutex<Vec<Decision>>,
}

impl RacingStore {
    pub(super) fn new(inner: InMemoryReviewStore, competitors: Vec<Decision>) -> Self {
        Self {
            inner,
            competitors: Mutex::new(competitors),
        }
    }
}

impl ReviewStore for RacingStore {
    fn insert_case(&self, case: PatientCase) -> Result<PatientCase, RepositoryError> {
        self.inner.insert_case(case)
    }

    fn fetch_case(&self, id: &CaseId) -> Result<Option<PatientCase>, RepositoryError> {
        self.inner.fetch_case(id)
    }

    fn list_cases(&self) -> Result<Vec<PatientCase>, RepositoryError> {
        self.inner.list_cases()
    }

    fn decisions(&self, id: &CaseId) -> Result<Vec<Decision>, RepositoryError> {
        self.inner.decisions(id)
    }

    fn commit(&self, commit: CaseCommit) -> Result<CommitReceipt, RepositoryError> {
        let competitor = self.competitors.lock().expect("competitor mutex").pop();
        if let Some(competitor) = competitor {
            let current = self
                .inner
                .fetch_case(&commit.case.id)?
                .ok_or(RepositoryError::NotFound)?;
            self.inner.commit(CaseCommit {
                case: current,
                decision: Some(competitor),
                ledger: None,
            })?;
        }
        self.inner.commit(commit)
    }

    fn fetch_period(&self, fiscal_year: i32) -> Result<Option<BudgetPeriod>, RepositoryError> {
        self.inner.fetch_period(fiscal_year)
    }

    fn insert_period(&self, period: BudgetPeriod) -> Result<BudgetPeriod, RepositoryError> {
        self.inner.insert_period(period)
    }

    fn update_allocation(
        &self,
        fiscal_year: i32,
        allocated_budget: u64,
        at: DateTime<Utc>,
    ) -> Result<BudgetPeriod, RepositoryError> {
        self.inner.update_allocation(fiscal_year, allocated_budget, at)
    }

    fn apply_ledger(&self, entry: LedgerEntry) -> Result<BudgetPeriod, RepositoryError> {
        self.inner.apply_ledger(entry)
    }
}

pub(super) fn router_with_workflow(workflow: SubsidyWorkflow<InMemoryReviewStore>) -> axum::Router {
    subsidy_router(Arc::new(workflow))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
