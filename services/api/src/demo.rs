use chrono::{Datelike, Utc};
use clap::Args;
use std::sync::Arc;
use subsidy_review::config::{BudgetSeedConfig, ReviewConfig};
use subsidy_review::error::AppError;
use subsidy_review::workflows::subsidy::{
    Caller, CaseId, DecisionOutcome, DecisionSubmission, InMemoryReviewStore, NewCase, Role,
    SubsidyWorkflow,
};

use crate::infra::seeded_store;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Fiscal year of the demo budget period. Defaults to the current year.
    #[arg(long)]
    pub(crate) fiscal_year: Option<i32>,
    /// Allocation for the demo budget period.
    #[arg(long, default_value_t = 10_000)]
    pub(crate) allocated: u64,
    /// Discounted treatment cost charged on approval.
    #[arg(long, default_value_t = 800)]
    pub(crate) discounted_cost: u64,
    /// Stop after both approvals instead of revising to a decline.
    #[arg(long)]
    pub(crate) skip_decline: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        fiscal_year,
        allocated,
        discounted_cost,
        skip_decline,
    } = args;

    let fiscal_year = fiscal_year.unwrap_or_else(|| Utc::now().year());
    let store = seeded_store(&BudgetSeedConfig {
        fiscal_year,
        allocated,
    })?;
    let workflow = SubsidyWorkflow::new(store, ReviewConfig::default());

    println!("Subsidy review demo (fiscal year {fiscal_year}, allocation {allocated})");

    let case = workflow.cases.register(NewCase {
        patient_name: "Demo Patient".to_string(),
        clinic_name: "Demo Clinic".to_string(),
        pdc_number: "PDC-0001".to_string(),
        patient_story: "Full arch restoration after long-term neglect.".to_string(),
        full_cost: discounted_cost.saturating_mul(2),
        discounted_cost: Some(discounted_cost),
        fiscal_year: Some(fiscal_year),
    })?;
    println!("- Registered case {} -> {}", case.id, case.status);

    let director = Caller::new("demo-director", Role::ScientificDirector);
    let values = Caller::new("demo-values", Role::ValuesReviewer);

    submit(&workflow, &director, &case.id, DecisionOutcome::Approved, None)?;
    submit(&workflow, &values, &case.id, DecisionOutcome::Approved, None)?;
    print_budget(&workflow, fiscal_year)?;

    if skip_decline {
        return Ok(());
    }

    submit(
        &workflow,
        &values,
        &case.id,
        DecisionOutcome::Declined,
        Some("insufficient evidence"),
    )?;
    print_budget(&workflow, fiscal_year)?;

    let late = workflow.intake.submit_decision(
        &director,
        DecisionSubmission {
            case_id: case.id.clone(),
            outcome: DecisionOutcome::Approved,
            justification: None,
        },
    );
    match late {
        Ok(receipt) => println!("- Late approval unexpectedly accepted: {}", receipt.case.status),
        Err(err) => println!("- Late approval rejected: {err}"),
    }

    let view = workflow.cases.view(&case.id)?;
    println!("\nDecision history for {}", view.case.id);
    for decision in &view.history {
        println!(
            "  - {} {} by {}{}",
            decision.decided_at.format("%H:%M:%S%.3f"),
            decision.outcome.label(),
            decision.reviewer_role,
            decision
                .justification
                .as_deref()
                .map(|text| format!(" ({text})"))
                .unwrap_or_default()
        );
    }

    let dashboard = workflow.cases.dashboard(fiscal_year)?;
    println!(
        "\nDashboard: {} cases | {} pending | {} on hold | {} approved | {} declined",
        dashboard.total_cases,
        dashboard.pending,
        dashboard.on_hold,
        dashboard.approved,
        dashboard.declined
    );

    Ok(())
}

fn submit(
    workflow: &SubsidyWorkflow<InMemoryReviewStore>,
    caller: &Caller,
    case_id: &CaseId,
    outcome: DecisionOutcome,
    justification: Option<&str>,
) -> Result<(), AppError> {
    let receipt = workflow.intake.submit_decision(
        caller,
        DecisionSubmission {
            case_id: case_id.clone(),
            outcome,
            justification: justification.map(str::to_string),
        },
    )?;

    println!(
        "- {} {} -> case {} ({} -> {})",
        caller.role,
        outcome.label(),
        receipt.case.id,
        receipt.previous_status,
        receipt.case.status
    );
    if let Some(update) = &receipt.ledger {
        println!(
            "  Ledger: spent {} of {}",
            update.period.spent_budget, update.period.allocated_budget
        );
        if let Some(warning) = &update.warning {
            println!("  Warning: over allocation by {}", warning.overrun);
        }
    }
    Ok(())
}

fn print_budget(
    workflow: &SubsidyWorkflow<InMemoryReviewStore>,
    fiscal_year: i32,
) -> Result<(), AppError> {
    let summary = workflow.ledger.summary(fiscal_year)?;
    let usage = summary
        .percentage_used
        .map(|pct| format!("{pct:.1}% used"))
        .unwrap_or_else(|| "no allocation".to_string());
    println!(
        "  Budget {}: {} spent | {} remaining | {}",
        summary.fiscal_year, summary.spent_budget, summary.remaining, usage
    );
    Ok(())
}
