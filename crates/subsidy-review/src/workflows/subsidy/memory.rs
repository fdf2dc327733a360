use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{BudgetPeriod, CaseId, Decision, PatientCase};
use super::ledger::LedgerEntry;
use super::repository::{CaseCommit, CommitReceipt, RepositoryError, ReviewStore};

#[derive(Debug, Default)]
struct StoreState {
    cases: HashMap<CaseId, PatientCase>,
    decisions: HashMap<CaseId, Vec<Decision>>,
    periods: BTreeMap<i32, BudgetPeriod>,
}

/// Process-local store. A single lock serializes every commit, which gives
/// per-case compare-and-swap and per-year additive ledger updates.
#[derive(Debug, Default)]
pub struct InMemoryReviewStore {
    state: Mutex<StoreState>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl ReviewStore for InMemoryReviewStore {
    fn insert_case(&self, case: PatientCase) -> Result<PatientCase, RepositoryError> {
        let mut state = self.lock()?;
        if state.cases.contains_key(&case.id) {
            return Err(RepositoryError::Conflict);
        }
        state.decisions.insert(case.id.clone(), Vec::new());
        state.cases.insert(case.id.clone(), case.clone());
        Ok(case)
    }

    fn fetch_case(&self, id: &CaseId) -> Result<Option<PatientCase>, RepositoryError> {
        Ok(self.lock()?.cases.get(id).cloned())
    }

    fn list_cases(&self) -> Result<Vec<PatientCase>, RepositoryError> {
        let state = self.lock()?;
        let mut cases: Vec<PatientCase> = state.cases.values().cloned().collect();
        cases.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(cases)
    }

    fn decisions(&self, id: &CaseId) -> Result<Vec<Decision>, RepositoryError> {
        let state = self.lock()?;
        if !state.cases.contains_key(id) {
            return Err(RepositoryError::NotFound);
        }
        Ok(state.decisions.get(id).cloned().unwrap_or_default())
    }

    fn commit(&self, commit: CaseCommit) -> Result<CommitReceipt, RepositoryError> {
        let mut state = self.lock()?;
        let CaseCommit {
            mut case,
            decision,
            ledger,
        } = commit;

        // Validate everything before the first mutation.
        let stored = state.cases.get(&case.id).ok_or(RepositoryError::NotFound)?;
        if stored.revision != case.revision {
            return Err(RepositoryError::StaleRevision {
                case_id: case.id.clone(),
                expected: case.revision,
                found: stored.revision,
            });
        }

        let period = match &ledger {
            Some(entry) => {
                let current = state.periods.get(&entry.fiscal_year).ok_or(
                    RepositoryError::MissingBudgetPeriod {
                        fiscal_year: entry.fiscal_year,
                    },
                )?;
                Some(entry.apply_to(current)?)
            }
            None => None,
        };

        case.revision += 1;
        if let Some(decision) = decision {
            state
                .decisions
                .entry(case.id.clone())
                .or_default()
                .push(decision);
        }
        if let Some(period) = &period {
            state.periods.insert(period.fiscal_year, period.clone());
        }
        state.cases.insert(case.id.clone(), case.clone());

        Ok(CommitReceipt { case, period })
    }

    fn fetch_period(&self, fiscal_year: i32) -> Result<Option<BudgetPeriod>, RepositoryError> {
        Ok(self.lock()?.periods.get(&fiscal_year).cloned())
    }

    fn insert_period(&self, period: BudgetPeriod) -> Result<BudgetPeriod, RepositoryError> {
        let mut state = self.lock()?;
        if state.periods.contains_key(&period.fiscal_year) {
            return Err(RepositoryError::Conflict);
        }
        state.periods.insert(period.fiscal_year, period.clone());
        Ok(period)
    }

    fn update_allocation(
        &self,
        fiscal_year: i32,
        allocated_budget: u64,
        at: DateTime<Utc>,
    ) -> Result<BudgetPeriod, RepositoryError> {
        let mut state = self.lock()?;
        let period = state
            .periods
            .get_mut(&fiscal_year)
            .ok_or(RepositoryError::MissingBudgetPeriod { fiscal_year })?;
        period.allocated_budget = allocated_budget;
        period.updated_at = at;
        Ok(period.clone())
    }

    fn apply_ledger(&self, entry: LedgerEntry) -> Result<BudgetPeriod, RepositoryError> {
        let mut state = self.lock()?;
        let current = state.periods.get(&entry.fiscal_year).ok_or(
            RepositoryError::MissingBudgetPeriod {
                fiscal_year: entry.fiscal_year,
            },
        )?;
        let updated = entry.apply_to(current)?;
        state.periods.insert(updated.fiscal_year, updated.clone());
        Ok(updated)
    }
}
