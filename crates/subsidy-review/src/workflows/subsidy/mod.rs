//! Multi-reviewer approval workflow for subsidized treatment cases.
//!
//! Reviewer decisions are appended to an immutable history; a case's status is
//! re-derived from that history on every submission and committed atomically
//! with the decision and any resulting budget movement.

pub mod cases;
pub mod domain;
pub mod intake;
pub mod ledger;
pub mod memory;
pub mod policy;
pub mod repository;
pub mod router;
mod workflow;

#[cfg(test)]
mod tests;

pub use cases::{CaseError, CaseRegistry, CaseView, DashboardSummary, QueueEntry};
pub use domain::{
    BudgetPeriod, Caller, CaseId, CaseStatus, Decision, DecisionId, DecisionOutcome,
    InvalidRoleError, NewCase, PatientCase, ReviewerId, Role, ValidationError,
};
pub use intake::{DecisionIntakeService, DecisionReceipt, DecisionSubmission, IntakeError};
pub use ledger::{
    BudgetLedger, BudgetSummary, LedgerEntry, LedgerError, LedgerMovement, LedgerUpdate,
    OverBudgetWarning,
};
pub use memory::InMemoryReviewStore;
pub use policy::{ActiveDecisions, ApprovalPolicyEngine, ReviewSnapshot};
pub use repository::{CaseCommit, CommitReceipt, RepositoryError, ReviewStore};
pub use router::subsidy_router;
pub use workflow::SubsidyWorkflow;
