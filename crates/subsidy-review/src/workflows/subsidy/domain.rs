use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for patient cases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseId(pub String);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for recorded reviewer decisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub String);

/// Opaque identity of an authenticated user, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewerId(pub String);

/// Application roles. Only the two reviewer roles vote on cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ScientificDirector,
    ValuesReviewer,
    ProjectManager,
}

impl Role {
    /// Roles whose decision gates approval, in display order.
    pub const REQUIRED_REVIEWERS: [Role; 2] = [Role::ScientificDirector, Role::ValuesReviewer];

    pub const fn label(self) -> &'static str {
        match self {
            Role::ScientificDirector => "scientific_director",
            Role::ValuesReviewer => "values_reviewer",
            Role::ProjectManager => "project_manager",
        }
    }

    pub const fn is_reviewer(self) -> bool {
        matches!(self, Role::ScientificDirector | Role::ValuesReviewer)
    }

    pub const fn is_administrator(self) -> bool {
        matches!(self, Role::ProjectManager)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Role {
    type Err = InvalidRoleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scientific_director" => Ok(Role::ScientificDirector),
            "values_reviewer" => Ok(Role::ValuesReviewer),
            "project_manager" => Ok(Role::ProjectManager),
            _ => Err(InvalidRoleError::Unknown {
                role: raw.to_string(),
            }),
        }
    }
}

/// Authenticated caller resolved by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id: ReviewerId,
    pub role: Role,
}

impl Caller {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: ReviewerId(id.into()),
            role,
        }
    }

    /// Confirm the caller holds a case-deciding role.
    pub fn require_reviewer(&self) -> Result<(), InvalidRoleError> {
        if self.role.is_reviewer() {
            Ok(())
        } else {
            Err(InvalidRoleError::NotAReviewer { role: self.role })
        }
    }

    /// Confirm the caller holds administrative authority.
    pub fn require_administrator(&self) -> Result<(), InvalidRoleError> {
        if self.role.is_administrator() {
            Ok(())
        } else {
            Err(InvalidRoleError::NotAnAdministrator { role: self.role })
        }
    }
}

/// Raised when a role string is unknown or a role acts outside its authority.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRoleError {
    #[error("unknown role '{role}'")]
    Unknown { role: String },
    #[error("role {role} does not decide on cases")]
    NotAReviewer { role: Role },
    #[error("role {role} lacks administrative authority")]
    NotAnAdministrator { role: Role },
}

/// Outcome a reviewer records against a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Approved,
    Declined,
    ModificationRequested,
}

impl DecisionOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            DecisionOutcome::Approved => "approved",
            DecisionOutcome::Declined => "declined",
            DecisionOutcome::ModificationRequested => "modification_requested",
        }
    }
}

impl FromStr for DecisionOutcome {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" => Ok(DecisionOutcome::Approved),
            "declined" => Ok(DecisionOutcome::Declined),
            "modification_requested" => Ok(DecisionOutcome::ModificationRequested),
            _ => Err(ValidationError::UnknownOutcome {
                outcome: raw.to_string(),
            }),
        }
    }
}

/// Lifecycle status of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    OnHold,
    Approved,
    TreatmentStarted,
    Completed,
    Declined,
}

impl CaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CaseStatus::Pending => "pending",
            CaseStatus::OnHold => "on_hold",
            CaseStatus::Approved => "approved",
            CaseStatus::TreatmentStarted => "treatment_started",
            CaseStatus::Completed => "completed",
            CaseStatus::Declined => "declined",
        }
    }

    /// No decision-driven transition leaves these states.
    pub const fn is_terminal(self) -> bool {
        matches!(self, CaseStatus::Declined | CaseStatus::Completed)
    }

    /// States advanced by treatment progress rather than by reviewers.
    pub const fn is_treatment_phase(self) -> bool {
        matches!(self, CaseStatus::TreatmentStarted | CaseStatus::Completed)
    }

    /// Approved or any later phase; these cases count against the budget.
    pub const fn is_funded(self) -> bool {
        matches!(
            self,
            CaseStatus::Approved | CaseStatus::TreatmentStarted | CaseStatus::Completed
        )
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Intake payload for a new subsidy application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCase {
    pub patient_name: String,
    pub clinic_name: String,
    /// Practice number assigned by the treating clinic.
    pub pdc_number: String,
    #[serde(default)]
    pub patient_story: String,
    pub full_cost: u64,
    #[serde(default)]
    pub discounted_cost: Option<u64>,
    #[serde(default)]
    pub fiscal_year: Option<i32>,
}

impl NewCase {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("patient_name", &self.patient_name),
            ("clinic_name", &self.clinic_name),
            ("pdc_number", &self.pdc_number),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField { field });
            }
        }

        if let Some(discounted) = self.discounted_cost {
            if discounted > self.full_cost {
                return Err(ValidationError::DiscountExceedsFullCost {
                    discounted,
                    full: self.full_cost,
                });
            }
        }

        Ok(())
    }
}

/// A patient's treatment-subsidy application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientCase {
    pub id: CaseId,
    pub patient_name: String,
    pub clinic_name: String,
    pub pdc_number: String,
    pub patient_story: String,
    pub status: CaseStatus,
    pub full_cost: u64,
    pub discounted_cost: Option<u64>,
    pub fiscal_year: Option<i32>,
    pub decline_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every committed write; guards compare-and-swap updates.
    pub revision: u64,
}

impl PatientCase {
    pub fn from_submission(id: CaseId, submission: NewCase, now: DateTime<Utc>) -> Self {
        Self {
            id,
            patient_name: submission.patient_name,
            clinic_name: submission.clinic_name,
            pdc_number: submission.pdc_number,
            patient_story: submission.patient_story,
            status: CaseStatus::Pending,
            full_cost: submission.full_cost,
            discounted_cost: submission.discounted_cost,
            fiscal_year: submission.fiscal_year,
            decline_reason: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Amount charged to the budget once the case is approved.
    pub fn funded_amount(&self) -> u64 {
        self.discounted_cost.unwrap_or(self.full_cost)
    }

    /// Explicit fiscal year, else the year the case was created.
    pub fn budget_year(&self) -> i32 {
        self.fiscal_year.unwrap_or_else(|| self.created_at.year())
    }
}

/// Immutable reviewer decision. Superseded entries stay for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub case_id: CaseId,
    pub reviewer_id: ReviewerId,
    pub reviewer_role: Role,
    pub outcome: DecisionOutcome,
    pub justification: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Input errors rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("a declined decision requires a justification")]
    MissingJustification,
    #[error("unknown decision outcome '{outcome}'")]
    UnknownOutcome { outcome: String },
    #[error("{field} must not be empty")]
    MissingField { field: &'static str },
    #[error("discounted cost {discounted} exceeds full cost {full}")]
    DiscountExceedsFullCost { discounted: u64, full: u64 },
    #[error("reversal of {amount} exceeds reversible spend {spent} for {fiscal_year}")]
    ReversalExceedsSpent {
        fiscal_year: i32,
        amount: u64,
        spent: u64,
    },
    #[error("spend of {amount} overflows spent budget {spent} for {fiscal_year}")]
    SpendOverflow {
        fiscal_year: i32,
        amount: u64,
        spent: u64,
    },
}

/// Yearly allocation and spend record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetPeriod {
    pub fiscal_year: i32,
    pub allocated_budget: u64,
    pub spent_budget: u64,
    /// Part of `spent_budget` booked by approved cases. Only their own
    /// withdrawals may release it.
    #[serde(default)]
    pub case_spent_budget: u64,
    pub updated_at: DateTime<Utc>,
}

impl BudgetPeriod {
    pub fn new(fiscal_year: i32, allocated_budget: u64, now: DateTime<Utc>) -> Self {
        Self {
            fiscal_year,
            allocated_budget,
            spent_budget: 0,
            case_spent_budget: 0,
            updated_at: now,
        }
    }

    pub fn is_over_budget(&self) -> bool {
        self.spent_budget > self.allocated_budget
    }

    /// Remaining headroom; negative once spend passes the allocation.
    pub fn remaining(&self) -> i64 {
        let remaining = i128::from(self.allocated_budget) - i128::from(self.spent_budget);
        remaining.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// Spend not booked by any case, which manual reversals may release.
    pub fn unassigned_spent(&self) -> u64 {
        self.spent_budget.saturating_sub(self.case_spent_budget)
    }
}
