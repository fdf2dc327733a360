use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{BudgetPeriod, CaseId, Decision, PatientCase};
use super::ledger::LedgerEntry;

/// Storage abstraction over cases, decisions and budget periods.
///
/// Implementations must apply a [`CaseCommit`] atomically: the case revision
/// check, the decision append, the case update and the ledger movement either
/// all land or none do.
pub trait ReviewStore: Send + Sync {
    fn insert_case(&self, case: PatientCase) -> Result<PatientCase, RepositoryError>;
    fn fetch_case(&self, id: &CaseId) -> Result<Option<PatientCase>, RepositoryError>;
    fn list_cases(&self) -> Result<Vec<PatientCase>, RepositoryError>;
    /// Every decision recorded against the case, in insertion order.
    fn decisions(&self, id: &CaseId) -> Result<Vec<Decision>, RepositoryError>;
    fn commit(&self, commit: CaseCommit) -> Result<CommitReceipt, RepositoryError>;

    fn fetch_period(&self, fiscal_year: i32) -> Result<Option<BudgetPeriod>, RepositoryError>;
    fn insert_period(&self, period: BudgetPeriod) -> Result<BudgetPeriod, RepositoryError>;
    fn update_allocation(
        &self,
        fiscal_year: i32,
        allocated_budget: u64,
        at: DateTime<Utc>,
    ) -> Result<BudgetPeriod, RepositoryError>;
    /// Additive, serialized update of a period's spent amount.
    fn apply_ledger(&self, entry: LedgerEntry) -> Result<BudgetPeriod, RepositoryError>;
}

/// One atomic unit of work against a single case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseCommit {
    /// Desired case state; its `revision` must match the stored revision.
    pub case: PatientCase,
    pub decision: Option<Decision>,
    pub ledger: Option<LedgerEntry>,
}

/// Committed state handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub case: PatientCase,
    pub period: Option<BudgetPeriod>,
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("case {case_id} changed concurrently (expected revision {expected}, found {found})")]
    StaleRevision {
        case_id: CaseId,
        expected: u64,
        found: u64,
    },
    #[error("no budget period provisioned for {fiscal_year}")]
    MissingBudgetPeriod { fiscal_year: i32 },
    #[error("reversal of {amount} exceeds reversible spend {spent} for {fiscal_year}")]
    LedgerUnderflow {
        fiscal_year: i32,
        amount: u64,
        spent: u64,
    },
    #[error("spend of {amount} overflows spent budget {spent} for {fiscal_year}")]
    LedgerOverflow {
        fiscal_year: i32,
        amount: u64,
        spent: u64,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
