use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::subsidy::domain::CaseId;
use crate::workflows::subsidy::repository::ReviewStore;
use crate::workflows::subsidy::router::{CALLER_ID_HEADER, CALLER_ROLE_HEADER};

fn json_request(
    method: &str,
    uri: &str,
    caller: Option<(&str, &str)>,
    body: Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some((id, role)) = caller {
        builder = builder
            .header(CALLER_ID_HEADER, id)
            .header(CALLER_ROLE_HEADER, role);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_request(uri: &str, caller: Option<(&str, &str)>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some((id, role)) = caller {
        builder = builder
            .header(CALLER_ID_HEADER, id)
            .header(CALLER_ROLE_HEADER, role);
    }
    builder.body(Body::empty()).expect("request")
}

async fn register(router: &Router) -> String {
    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/cases",
            None,
            serde_json::to_value(new_case()).expect("payload"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    payload["id"].as_str().expect("case id").to_string()
}

async fn decide(
    router: &Router,
    case_id: &str,
    caller: (&str, &str),
    body: Value,
) -> axum::response::Response {
    router
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/cases/{case_id}/decisions"),
            Some(caller),
            body,
        ))
        .await
        .expect("route executes")
}

#[tokio::test]
async fn registration_returns_pending_case() {
    let (workflow, _) = build_workflow();
    let router = router_with_workflow(workflow);

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/cases",
            None,
            serde_json::to_value(new_case()).expect("payload"),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "pending");
    assert_eq!(payload["discounted_cost"], 800);
}

#[tokio::test]
async fn invalid_registration_is_unprocessable() {
    let (workflow, _) = build_workflow();
    let router = router_with_workflow(workflow);
    let mut submission = serde_json::to_value(new_case()).expect("payload");
    submission["clinic_name"] = json!("");

    let response = router
        .oneshot(json_request("POST", "/api/v1/cases", None, submission))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn decisions_drive_case_to_approval() {
    let (workflow, store) = build_workflow();
    let router = router_with_workflow(workflow);
    let case_id = register(&router).await;

    let first = decide(
        &router,
        &case_id,
        ("sd-anna", "scientific_director"),
        json!({ "outcome": "approved" }),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(read_json_body(first).await["case"]["status"], "pending");

    let second = decide(
        &router,
        &case_id,
        ("vr-luca", "values_reviewer"),
        json!({ "outcome": "approved" }),
    )
    .await;
    assert_eq!(second.status(), StatusCode::OK);
    let payload = read_json_body(second).await;
    assert_eq!(payload["case"]["status"], "approved");
    assert_eq!(payload["previous_status"], "pending");
    assert_eq!(payload["ledger"]["period"]["spent_budget"], 800);
    assert_eq!(spent(&store), 800);

    let view = router
        .oneshot(get_request(&format!("/api/v1/cases/{case_id}"), None))
        .await
        .expect("route executes");
    assert_eq!(view.status(), StatusCode::OK);
    let view = read_json_body(view).await;
    assert_eq!(view["history"].as_array().map(Vec::len), Some(2));
    assert_eq!(view["review"]["outstanding_roles"], json!([]));
}

#[tokio::test]
async fn missing_caller_headers_are_unauthorized() {
    let (workflow, _) = build_workflow();
    let router = router_with_workflow(workflow);
    let case_id = register(&router).await;

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/cases/{case_id}/decisions"),
            None,
            json!({ "outcome": "approved" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_role_is_forbidden() {
    let (workflow, store) = build_workflow();
    let router = router_with_workflow(workflow);
    let case_id = register(&router).await;

    let response = decide(
        &router,
        &case_id,
        ("x-1", "chief_executive"),
        json!({ "outcome": "approved" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = decide(
        &router,
        &case_id,
        ("pm-sara", "project_manager"),
        json!({ "outcome": "approved" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let history = store.decisions(&CaseId(case_id)).expect("history");
    assert!(history.is_empty());
}

#[tokio::test]
async fn unknown_outcome_is_unprocessable() {
    let (workflow, _) = build_workflow();
    let router = router_with_workflow(workflow);
    let case_id = register(&router).await;

    let response = decide(
        &router,
        &case_id,
        ("sd-anna", "scientific_director"),
        json!({ "outcome": "maybe" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .is_some_and(|message| message.contains("maybe")));
}

#[tokio::test]
async fn decline_requires_justification_and_closes_case() {
    let (workflow, _) = build_workflow();
    let router = router_with_workflow(workflow);
    let case_id = register(&router).await;
    let reviewer = ("vr-luca", "values_reviewer");

    let rejected = decide(&router, &case_id, reviewer, json!({ "outcome": "declined" })).await;
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let declined = decide(
        &router,
        &case_id,
        reviewer,
        json!({ "outcome": "declined", "justification": "insufficient evidence" }),
    )
    .await;
    assert_eq!(declined.status(), StatusCode::OK);
    let payload = read_json_body(declined).await;
    assert_eq!(payload["case"]["status"], "declined");
    assert_eq!(payload["case"]["decline_reason"], "insufficient evidence");

    let closed = decide(
        &router,
        &case_id,
        ("sd-anna", "scientific_director"),
        json!({ "outcome": "approved" }),
    )
    .await;
    assert_eq!(closed.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_case_is_not_found() {
    let (workflow, _) = build_workflow();
    let router = router_with_workflow(workflow);

    let response = router
        .oneshot(get_request("/api/v1/cases/case-missing", None))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn review_queue_uses_caller_role() {
    let (workflow, _) = build_workflow();
    let router = router_with_workflow(workflow);
    let case_id = register(&router).await;

    let response = router
        .clone()
        .oneshot(get_request(
            "/api/v1/reviews/queue",
            Some(("sd-anna", "scientific_director")),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload[0]["case"]["id"], json!(case_id));

    let response = router
        .oneshot(get_request(
            "/api/v1/reviews/queue",
            Some(("pm-sara", "project_manager")),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn budget_admin_routes_require_project_manager() {
    let (workflow, _) = build_workflow();
    let router = router_with_workflow(workflow);

    let opened = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/budget",
            Some(("pm-sara", "project_manager")),
            json!({ "fiscal_year": 2026, "allocated_budget": 20000 }),
        ))
        .await
        .expect("route executes");
    assert_eq!(opened.status(), StatusCode::CREATED);

    let denied = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/budget/2026/spend",
            Some(("sd-anna", "scientific_director")),
            json!({ "amount": 500 }),
        ))
        .await
        .expect("route executes");
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let spend = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/budget/2026/spend",
            Some(("pm-sara", "project_manager")),
            json!({ "amount": 500 }),
        ))
        .await
        .expect("route executes");
    assert_eq!(spend.status(), StatusCode::OK);

    let underflow = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/budget/2026/reversals",
            Some(("pm-sara", "project_manager")),
            json!({ "amount": 900 }),
        ))
        .await
        .expect("route executes");
    assert_eq!(underflow.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let allocation = router
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/v1/budget/2026/allocation",
            Some(("pm-sara", "project_manager")),
            json!({ "allocated_budget": 400 }),
        ))
        .await
        .expect("route executes");
    assert_eq!(allocation.status(), StatusCode::OK);
    let payload = read_json_body(allocation).await;
    assert_eq!(payload["warning"]["overrun"], 100);

    let summary = router
        .oneshot(get_request("/api/v1/budget/2026", None))
        .await
        .expect("route executes");
    assert_eq!(summary.status(), StatusCode::OK);
    let payload = read_json_body(summary).await;
    assert_eq!(payload["spent_budget"], 500);
    assert_eq!(payload["remaining"], -100);
    assert_eq!(payload["over_budget"], true);
}

#[tokio::test]
async fn budget_summary_for_unknown_year_is_not_found() {
    let (workflow, _) = build_workflow();
    let router = router_with_workflow(workflow);

    let response = router
        .oneshot(get_request("/api/v1/budget/1999", None))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dashboard_reports_requested_year() {
    let (workflow, _) = build_workflow();
    let router = router_with_workflow(workflow);
    register(&router).await;

    let response = router
        .oneshot(get_request(
            &format!("/api/v1/dashboard?fiscal_year={FISCAL_YEAR}"),
            None,
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["total_cases"], 1);
    assert_eq!(payload["pending"], 1);
    assert_eq!(payload["allocated_budget"], 10000);
}
