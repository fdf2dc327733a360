use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde_json::json;

use super::cases::CaseError;
use super::domain::{Caller, CaseId, CaseStatus, DecisionOutcome, NewCase, Role};
use super::intake::{DecisionSubmission, IntakeError};
use super::ledger::LedgerError;
use super::repository::{RepositoryError, ReviewStore};
use super::workflow::SubsidyWorkflow;

pub const CALLER_ID_HEADER: &str = "x-caller-id";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";

/// Router builder exposing the review workflow over HTTP.
pub fn subsidy_router<S>(workflow: Arc<SubsidyWorkflow<S>>) -> Router
where
    S: ReviewStore + 'static,
{
    Router::new()
        .route("/api/v1/cases", post(register_handler::<S>))
        .route("/api/v1/cases/:case_id", get(case_handler::<S>))
        .route(
            "/api/v1/cases/:case_id/decisions",
            post(decision_handler::<S>),
        )
        .route(
            "/api/v1/cases/:case_id/progress",
            post(progress_handler::<S>),
        )
        .route("/api/v1/reviews/queue", get(queue_handler::<S>))
        .route("/api/v1/dashboard", get(dashboard_handler::<S>))
        .route("/api/v1/budget", post(open_period_handler::<S>))
        .route("/api/v1/budget/:fiscal_year", get(budget_handler::<S>))
        .route(
            "/api/v1/budget/:fiscal_year/allocation",
            put(allocation_handler::<S>),
        )
        .route(
            "/api/v1/budget/:fiscal_year/spend",
            post(spend_handler::<S>),
        )
        .route(
            "/api/v1/budget/:fiscal_year/reversals",
            post(reversal_handler::<S>),
        )
        .with_state(workflow)
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionRequest {
    pub(crate) outcome: String,
    #[serde(default)]
    pub(crate) justification: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProgressRequest {
    pub(crate) status: CaseStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenPeriodRequest {
    pub(crate) fiscal_year: i32,
    pub(crate) allocated_budget: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AllocationRequest {
    pub(crate) allocated_budget: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AmountRequest {
    pub(crate) amount: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DashboardQuery {
    #[serde(default)]
    pub(crate) fiscal_year: Option<i32>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({ "error": message.into() });
    (status, Json(payload)).into_response()
}

/// Resolve the caller identity forwarded by the authenticating front end.
pub(crate) fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, Response> {
    let id = headers
        .get(CALLER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "missing caller identity"))?;

    let role = headers
        .get(CALLER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "missing caller role"))?
        .parse::<Role>()
        .map_err(|err| error_response(StatusCode::FORBIDDEN, err.to_string()))?;

    Ok(Caller::new(id, role))
}

fn repository_status(error: &RepositoryError) -> StatusCode {
    match error {
        RepositoryError::Conflict | RepositoryError::StaleRevision { .. } => StatusCode::CONFLICT,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::MissingBudgetPeriod { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RepositoryError::LedgerUnderflow { .. } | RepositoryError::LedgerOverflow { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        RepositoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn intake_status(error: &IntakeError) -> StatusCode {
    match error {
        IntakeError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        IntakeError::CaseClosed { .. } => StatusCode::CONFLICT,
        IntakeError::InvalidRole(_) => StatusCode::FORBIDDEN,
        IntakeError::CaseNotFound(_) => StatusCode::NOT_FOUND,
        IntakeError::NoBudgetPeriod { .. } | IntakeError::Contended { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        IntakeError::Persistence(inner) => repository_status(inner),
    }
}

fn case_status(error: &CaseError) -> StatusCode {
    match error {
        CaseError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CaseError::InvalidRole(_) => StatusCode::FORBIDDEN,
        CaseError::NotFound(_) => StatusCode::NOT_FOUND,
        CaseError::InvalidTransition { .. } => StatusCode::CONFLICT,
        CaseError::Persistence(inner) => repository_status(inner),
    }
}

fn ledger_status(error: &LedgerError) -> StatusCode {
    match error {
        LedgerError::NoBudgetPeriod { .. } => StatusCode::NOT_FOUND,
        LedgerError::InvalidRole(_) => StatusCode::FORBIDDEN,
        LedgerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::Persistence(inner) => repository_status(inner),
    }
}

pub(crate) async fn register_handler<S>(
    State(workflow): State<Arc<SubsidyWorkflow<S>>>,
    Json(submission): Json<NewCase>,
) -> Response
where
    S: ReviewStore + 'static,
{
    match workflow.cases.register(submission) {
        Ok(case) => (StatusCode::CREATED, Json(case)).into_response(),
        Err(error) => error_response(case_status(&error), error.to_string()),
    }
}

pub(crate) async fn case_handler<S>(
    State(workflow): State<Arc<SubsidyWorkflow<S>>>,
    Path(case_id): Path<String>,
) -> Response
where
    S: ReviewStore + 'static,
{
    match workflow.cases.view(&CaseId(case_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(case_status(&error), error.to_string()),
    }
}

pub(crate) async fn decision_handler<S>(
    State(workflow): State<Arc<SubsidyWorkflow<S>>>,
    Path(case_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<DecisionRequest>,
) -> Response
where
    S: ReviewStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    let outcome = match request.outcome.parse::<DecisionOutcome>() {
        Ok(outcome) => outcome,
        Err(error) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, error.to_string()),
    };

    let submission = DecisionSubmission {
        case_id: CaseId(case_id),
        outcome,
        justification: request.justification,
    };

    match workflow.intake.submit_decision(&caller, submission) {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(error) => error_response(intake_status(&error), error.to_string()),
    }
}

pub(crate) async fn progress_handler<S>(
    State(workflow): State<Arc<SubsidyWorkflow<S>>>,
    Path(case_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ProgressRequest>,
) -> Response
where
    S: ReviewStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match workflow
        .cases
        .advance_treatment(&caller, &CaseId(case_id), request.status)
    {
        Ok(case) => (StatusCode::OK, Json(case)).into_response(),
        Err(error) => error_response(case_status(&error), error.to_string()),
    }
}

pub(crate) async fn queue_handler<S>(
    State(workflow): State<Arc<SubsidyWorkflow<S>>>,
    headers: HeaderMap,
) -> Response
where
    S: ReviewStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match workflow.cases.review_queue(caller.role) {
        Ok(queue) => (StatusCode::OK, Json(queue)).into_response(),
        Err(error) => error_response(case_status(&error), error.to_string()),
    }
}

pub(crate) async fn dashboard_handler<S>(
    State(workflow): State<Arc<SubsidyWorkflow<S>>>,
    Query(query): Query<DashboardQuery>,
) -> Response
where
    S: ReviewStore + 'static,
{
    let fiscal_year = query.fiscal_year.unwrap_or_else(|| Utc::now().year());
    match workflow.cases.dashboard(fiscal_year) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(case_status(&error), error.to_string()),
    }
}

pub(crate) async fn open_period_handler<S>(
    State(workflow): State<Arc<SubsidyWorkflow<S>>>,
    headers: HeaderMap,
    Json(request): Json<OpenPeriodRequest>,
) -> Response
where
    S: ReviewStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match workflow
        .ledger
        .open_period(&caller, request.fiscal_year, request.allocated_budget)
    {
        Ok(period) => (StatusCode::CREATED, Json(period)).into_response(),
        Err(error) => error_response(ledger_status(&error), error.to_string()),
    }
}

pub(crate) async fn budget_handler<S>(
    State(workflow): State<Arc<SubsidyWorkflow<S>>>,
    Path(fiscal_year): Path<i32>,
) -> Response
where
    S: ReviewStore + 'static,
{
    match workflow.ledger.summary(fiscal_year) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(ledger_status(&error), error.to_string()),
    }
}

pub(crate) async fn allocation_handler<S>(
    State(workflow): State<Arc<SubsidyWorkflow<S>>>,
    Path(fiscal_year): Path<i32>,
    headers: HeaderMap,
    Json(request): Json<AllocationRequest>,
) -> Response
where
    S: ReviewStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match workflow
        .ledger
        .set_allocation(&caller, fiscal_year, request.allocated_budget)
    {
        Ok(update) => (StatusCode::OK, Json(update)).into_response(),
        Err(error) => error_response(ledger_status(&error), error.to_string()),
    }
}

pub(crate) async fn spend_handler<S>(
    State(workflow): State<Arc<SubsidyWorkflow<S>>>,
    Path(fiscal_year): Path<i32>,
    headers: HeaderMap,
    Json(request): Json<AmountRequest>,
) -> Response
where
    S: ReviewStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match workflow
        .ledger
        .record_spend(&caller, fiscal_year, request.amount)
    {
        Ok(update) => (StatusCode::OK, Json(update)).into_response(),
        Err(error) => error_response(ledger_status(&error), error.to_string()),
    }
}

pub(crate) async fn reversal_handler<S>(
    State(workflow): State<Arc<SubsidyWorkflow<S>>>,
    Path(fiscal_year): Path<i32>,
    headers: HeaderMap,
    Json(request): Json<AmountRequest>,
) -> Response
where
    S: ReviewStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match workflow
        .ledger
        .reverse_spend(&caller, fiscal_year, request.amount)
    {
        Ok(update) => (StatusCode::OK, Json(update)).into_response(),
        Err(error) => error_response(ledger_status(&error), error.to_string()),
    }
}
