use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use subsidy_review::config::BudgetSeedConfig;
use subsidy_review::error::AppError;
use subsidy_review::workflows::subsidy::{
    BudgetPeriod, InMemoryReviewStore, LedgerError, RepositoryError, ReviewStore,
};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Store with the configured fiscal period already opened.
pub(crate) fn seeded_store(seed: &BudgetSeedConfig) -> Result<Arc<InMemoryReviewStore>, AppError> {
    let store = Arc::new(InMemoryReviewStore::new());
    seed_budget_period(store.as_ref(), seed)?;
    Ok(store)
}

pub(crate) fn seed_budget_period<S>(store: &S, seed: &BudgetSeedConfig) -> Result<(), AppError>
where
    S: ReviewStore,
{
    let period = BudgetPeriod::new(seed.fiscal_year, seed.allocated, chrono::Utc::now());
    match store.insert_period(period) {
        Ok(period) => {
            info!(
                fiscal_year = period.fiscal_year,
                allocated = period.allocated_budget,
                "budget period seeded"
            );
            Ok(())
        }
        Err(RepositoryError::Conflict) => {
            warn!(fiscal_year = seed.fiscal_year, "budget period already open");
            Ok(())
        }
        Err(err) => Err(AppError::Ledger(LedgerError::from(err))),
    }
}
