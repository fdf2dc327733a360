use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{BudgetPeriod, Caller, CaseId, InvalidRoleError, PatientCase, ValidationError};
use super::repository::{RepositoryError, ReviewStore};

/// Direction of a ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerMovement {
    Spend,
    Reversal,
}

/// Additive change to a period's spent amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub fiscal_year: i32,
    pub movement: LedgerMovement,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<CaseId>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn spend(fiscal_year: i32, amount: u64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            fiscal_year,
            movement: LedgerMovement::Spend,
            amount,
            case_id: None,
            recorded_at,
        }
    }

    pub fn reversal(fiscal_year: i32, amount: u64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            movement: LedgerMovement::Reversal,
            ..Self::spend(fiscal_year, amount, recorded_at)
        }
    }

    /// Spend charged when `case` becomes approved.
    pub fn approval_of(case: &PatientCase, recorded_at: DateTime<Utc>) -> Self {
        Self {
            case_id: Some(case.id.clone()),
            ..Self::spend(case.budget_year(), case.funded_amount(), recorded_at)
        }
    }

    /// Reversal of the spend charged when `case` was approved.
    pub fn withdrawal_of(case: &PatientCase, recorded_at: DateTime<Utc>) -> Self {
        Self {
            case_id: Some(case.id.clone()),
            ..Self::reversal(case.budget_year(), case.funded_amount(), recorded_at)
        }
    }

    /// Apply this movement to `period`. Spend is never capped by the allocation.
    ///
    /// Case movements also adjust the case-booked share. A reversal without a
    /// case may only release spend no case has booked.
    pub fn apply_to(&self, period: &BudgetPeriod) -> Result<BudgetPeriod, RepositoryError> {
        let overflow = || RepositoryError::LedgerOverflow {
            fiscal_year: self.fiscal_year,
            amount: self.amount,
            spent: period.spent_budget,
        };
        let underflow = |reversible: u64| RepositoryError::LedgerUnderflow {
            fiscal_year: self.fiscal_year,
            amount: self.amount,
            spent: reversible,
        };

        let (spent_budget, case_spent_budget) = match (self.movement, &self.case_id) {
            (LedgerMovement::Spend, None) => (
                period.spent_budget.checked_add(self.amount).ok_or_else(overflow)?,
                period.case_spent_budget,
            ),
            (LedgerMovement::Spend, Some(_)) => (
                period.spent_budget.checked_add(self.amount).ok_or_else(overflow)?,
                period
                    .case_spent_budget
                    .checked_add(self.amount)
                    .ok_or_else(overflow)?,
            ),
            (LedgerMovement::Reversal, None) => {
                let reversible = period.unassigned_spent();
                if self.amount > reversible {
                    return Err(underflow(reversible));
                }
                (
                    period.spent_budget - self.amount,
                    period.case_spent_budget,
                )
            }
            (LedgerMovement::Reversal, Some(_)) => {
                let booked = period.case_spent_budget.min(period.spent_budget);
                if self.amount > booked {
                    return Err(underflow(booked));
                }
                (
                    period.spent_budget - self.amount,
                    period.case_spent_budget - self.amount,
                )
            }
        };

        Ok(BudgetPeriod {
            spent_budget,
            case_spent_budget,
            updated_at: self.recorded_at,
            ..period.clone()
        })
    }
}

/// Raised alongside a successful spend that pushed a period past its allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverBudgetWarning {
    pub fiscal_year: i32,
    pub allocated_budget: u64,
    pub spent_budget: u64,
    pub overrun: u64,
}

impl OverBudgetWarning {
    pub fn check(period: &BudgetPeriod) -> Option<Self> {
        period.is_over_budget().then(|| Self {
            fiscal_year: period.fiscal_year,
            allocated_budget: period.allocated_budget,
            spent_budget: period.spent_budget,
            overrun: period.spent_budget - period.allocated_budget,
        })
    }
}

/// Updated period plus the soft over-budget signal for the caller to surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerUpdate {
    pub period: BudgetPeriod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<OverBudgetWarning>,
}

impl LedgerUpdate {
    /// Update after `movement`. Only spend raises the over-budget signal.
    pub fn after(movement: LedgerMovement, period: BudgetPeriod) -> Self {
        match movement {
            LedgerMovement::Spend => Self::from_period(period),
            LedgerMovement::Reversal => Self {
                period,
                warning: None,
            },
        }
    }

    /// Update carrying the over-budget signal for the period as it stands.
    pub fn from_period(period: BudgetPeriod) -> Self {
        let warning = OverBudgetWarning::check(&period);
        if let Some(signal) = &warning {
            warn!(
                fiscal_year = signal.fiscal_year,
                allocated = signal.allocated_budget,
                spent = signal.spent_budget,
                overrun = signal.overrun,
                "budget period over allocation"
            );
        }
        Self { period, warning }
    }
}

/// Display figures for a budget period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSummary {
    pub fiscal_year: i32,
    pub allocated_budget: u64,
    pub spent_budget: u64,
    pub remaining: i64,
    /// `None` while nothing is allocated.
    pub percentage_used: Option<f64>,
    pub over_budget: bool,
}

impl From<&BudgetPeriod> for BudgetSummary {
    fn from(period: &BudgetPeriod) -> Self {
        let percentage_used = (period.allocated_budget > 0)
            .then(|| period.spent_budget as f64 / period.allocated_budget as f64 * 100.0);

        Self {
            fiscal_year: period.fiscal_year,
            allocated_budget: period.allocated_budget,
            spent_budget: period.spent_budget,
            remaining: period.remaining(),
            percentage_used,
            over_budget: period.is_over_budget(),
        }
    }
}

/// Yearly allocation and spend bookkeeping over the shared store.
pub struct BudgetLedger<S> {
    store: Arc<S>,
}

impl<S> BudgetLedger<S>
where
    S: ReviewStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Add `amount` to the period's spent budget. Administrative roles only.
    pub fn record_spend(
        &self,
        caller: &Caller,
        fiscal_year: i32,
        amount: u64,
    ) -> Result<LedgerUpdate, LedgerError> {
        caller.require_administrator()?;
        self.apply(LedgerEntry::spend(fiscal_year, amount, Utc::now()))
    }

    /// Subtract `amount` from the period's spent budget. Administrative roles only.
    ///
    /// Spend booked by approved cases is released only by their own decisions.
    pub fn reverse_spend(
        &self,
        caller: &Caller,
        fiscal_year: i32,
        amount: u64,
    ) -> Result<LedgerUpdate, LedgerError> {
        caller.require_administrator()?;
        self.apply(LedgerEntry::reversal(fiscal_year, amount, Utc::now()))
    }

    fn apply(&self, entry: LedgerEntry) -> Result<LedgerUpdate, LedgerError> {
        let movement = entry.movement;
        let amount = entry.amount;
        let period = self.store.apply_ledger(entry)?;
        info!(
            fiscal_year = period.fiscal_year,
            ?movement,
            amount,
            spent = period.spent_budget,
            allocated = period.allocated_budget,
            "ledger movement applied"
        );
        Ok(LedgerUpdate::after(movement, period))
    }

    /// Provision a fiscal period. Administrative roles only.
    pub fn open_period(
        &self,
        caller: &Caller,
        fiscal_year: i32,
        allocated_budget: u64,
    ) -> Result<BudgetPeriod, LedgerError> {
        caller.require_administrator()?;
        let period = self
            .store
            .insert_period(BudgetPeriod::new(fiscal_year, allocated_budget, Utc::now()))?;
        info!(fiscal_year, allocated = allocated_budget, "budget period opened");
        Ok(period)
    }

    /// Replace a period's allocation. Administrative roles only.
    pub fn set_allocation(
        &self,
        caller: &Caller,
        fiscal_year: i32,
        allocated_budget: u64,
    ) -> Result<LedgerUpdate, LedgerError> {
        caller.require_administrator()?;
        let period = self
            .store
            .update_allocation(fiscal_year, allocated_budget, Utc::now())?;
        info!(
            fiscal_year,
            allocated = allocated_budget,
            caller = %caller.id.0,
            "budget allocation updated"
        );
        Ok(LedgerUpdate::from_period(period))
    }

    pub fn period(&self, fiscal_year: i32) -> Result<BudgetPeriod, LedgerError> {
        self.store
            .fetch_period(fiscal_year)?
            .ok_or(LedgerError::NoBudgetPeriod { fiscal_year })
    }

    pub fn summary(&self, fiscal_year: i32) -> Result<BudgetSummary, LedgerError> {
        self.period(fiscal_year)
            .map(|period| BudgetSummary::from(&period))
    }
}

/// Error raised by the budget ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("no budget period provisioned for {fiscal_year}")]
    NoBudgetPeriod { fiscal_year: i32 },
    #[error(transparent)]
    InvalidRole(#[from] InvalidRoleError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("persistence failure: {0}")]
    Persistence(RepositoryError),
}

impl From<RepositoryError> for LedgerError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::MissingBudgetPeriod { fiscal_year } => {
                Self::NoBudgetPeriod { fiscal_year }
            }
            RepositoryError::LedgerUnderflow {
                fiscal_year,
                amount,
                spent,
            } => Self::Validation(ValidationError::ReversalExceedsSpent {
                fiscal_year,
                amount,
                spent,
            }),
            RepositoryError::LedgerOverflow {
                fiscal_year,
                amount,
                spent,
            } => Self::Validation(ValidationError::SpendOverflow {
                fiscal_year,
                amount,
                spent,
            }),
            other => Self::Persistence(other),
        }
    }
}
