use std::sync::Arc;

use crate::config::ReviewConfig;

use super::cases::CaseRegistry;
use super::intake::DecisionIntakeService;
use super::ledger::BudgetLedger;
use super::repository::ReviewStore;

/// Bundles the components that share one store.
pub struct SubsidyWorkflow<S> {
    pub cases: CaseRegistry<S>,
    pub intake: DecisionIntakeService<S>,
    pub ledger: BudgetLedger<S>,
}

impl<S> SubsidyWorkflow<S>
where
    S: ReviewStore + 'static,
{
    pub fn new(store: Arc<S>, config: ReviewConfig) -> Self {
        Self {
            cases: CaseRegistry::new(store.clone()),
            intake: DecisionIntakeService::new(store.clone(), config),
            ledger: BudgetLedger::new(store),
        }
    }
}
