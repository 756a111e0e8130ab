use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::json;

use super::domain::{Caller, CallerRole, SubmissionId};
use super::service::{RatingWorkflow, RatingWorkflowError};
use super::store::PeriodStore;
use crate::workflows::leaderboard::LeaderboardQuery;
use crate::workflows::scoring::{EmployeeId, ReportingPeriod};

pub const CALLER_ROLE_HEADER: &str = "x-caller-role";
pub const CALLER_ID_HEADER: &str = "x-caller-id";

/// Router builder exposing period publishing, leaderboards and the rating workflow.
pub fn rating_router<S>(workflow: Arc<RatingWorkflow<S>>) -> Router
where
    S: PeriodStore + 'static,
{
    Router::new()
        .route("/api/v1/periods", post(publish_handler::<S>))
        .route("/api/v1/periods/current", get(current_period_handler::<S>))
        .route("/api/v1/leaderboard", get(leaderboard_handler::<S>))
        .route(
            "/api/v1/ratings/submissions",
            post(submit_handler::<S>).get(pending_handler::<S>),
        )
        .route(
            "/api/v1/ratings/submissions/:submission_id/approve",
            post(approve_handler::<S>),
        )
        .route(
            "/api/v1/ratings/submissions/:submission_id/reject",
            post(reject_handler::<S>),
        )
        .route("/api/v1/ratings/approved", get(approved_handler::<S>))
        .with_state(workflow)
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub year: i32,
    pub month: u32,
    pub activity_csv: String,
    pub report_csv: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(deserialize_with = "distinct_grades")]
    pub grades: BTreeMap<EmployeeId, u8>,
}

/// Rejects grade maps whose keys collapse to the same employee once normalized.
fn distinct_grades<'de, D>(deserializer: D) -> Result<BTreeMap<EmployeeId, u8>, D::Error>
where
    D: Deserializer<'de>,
{
    struct GradesVisitor;

    impl<'de> Visitor<'de> for GradesVisitor {
        type Value = BTreeMap<EmployeeId, u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of employee ids to grades")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut grades = BTreeMap::new();
            while let Some((raw, grade)) = map.next_entry::<String, u8>()? {
                let id = EmployeeId::new(&raw);
                if grades.insert(id.clone(), grade).is_some() {
                    return Err(de::Error::custom(format!(
                        "employee {id} is graded more than once"
                    )));
                }
            }
            Ok(grades)
        }
    }

    deserializer.deserialize_map(GradesVisitor)
}

#[derive(Debug, Deserialize)]
pub struct PendingParams {
    pub tier: Option<String>,
}

pub(crate) async fn publish_handler<S>(
    State(workflow): State<Arc<RatingWorkflow<S>>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<PublishRequest>,
) -> Response
where
    S: PeriodStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let Some(period) = ReportingPeriod::new(request.year, request.month) else {
        let payload = json!({
            "error": format!("{}-{} is not a valid reporting period", request.year, request.month),
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    };

    match workflow.publish_exports(
        &caller,
        period,
        request.activity_csv.as_bytes(),
        request.report_csv.as_bytes(),
    ) {
        Ok(receipt) => (StatusCode::CREATED, axum::Json(receipt)).into_response(),
        Err(error) => workflow_error_response(error),
    }
}

pub(crate) async fn current_period_handler<S>(
    State(workflow): State<Arc<RatingWorkflow<S>>>,
) -> Response
where
    S: PeriodStore + 'static,
{
    match workflow.published() {
        Some(published) => (StatusCode::OK, axum::Json(published)).into_response(),
        None => workflow_error_response(RatingWorkflowError::NoPublishedPeriod),
    }
}

pub(crate) async fn leaderboard_handler<S>(
    State(workflow): State<Arc<RatingWorkflow<S>>>,
    Query(query): Query<LeaderboardQuery>,
) -> Response
where
    S: PeriodStore + 'static,
{
    match workflow.leaderboard(&query) {
        Some(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        None => workflow_error_response(RatingWorkflowError::NoPublishedPeriod),
    }
}

pub(crate) async fn submit_handler<S>(
    State(workflow): State<Arc<RatingWorkflow<S>>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<SubmitRequest>,
) -> Response
where
    S: PeriodStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    match workflow.submit(&caller, request.grades) {
        Ok(submission) => (StatusCode::CREATED, axum::Json(submission)).into_response(),
        Err(error) => workflow_error_response(error),
    }
}

pub(crate) async fn pending_handler<S>(
    State(workflow): State<Arc<RatingWorkflow<S>>>,
    Query(params): Query<PendingParams>,
) -> Response
where
    S: PeriodStore + 'static,
{
    let pending = workflow.pending(params.tier.as_deref());
    (StatusCode::OK, axum::Json(pending)).into_response()
}

pub(crate) async fn approve_handler<S>(
    State(workflow): State<Arc<RatingWorkflow<S>>>,
    headers: HeaderMap,
    Path(submission_id): Path<String>,
) -> Response
where
    S: PeriodStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    match workflow.approve(&caller, &SubmissionId(submission_id)) {
        Ok(resolution) => (StatusCode::OK, axum::Json(resolution)).into_response(),
        Err(error) => workflow_error_response(error),
    }
}

pub(crate) async fn reject_handler<S>(
    State(workflow): State<Arc<RatingWorkflow<S>>>,
    headers: HeaderMap,
    Path(submission_id): Path<String>,
) -> Response
where
    S: PeriodStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    match workflow.reject(&caller, &SubmissionId(submission_id)) {
        Ok(resolution) => (StatusCode::OK, axum::Json(resolution)).into_response(),
        Err(error) => workflow_error_response(error),
    }
}

pub(crate) async fn approved_handler<S>(
    State(workflow): State<Arc<RatingWorkflow<S>>>,
) -> Response
where
    S: PeriodStore + 'static,
{
    (StatusCode::OK, axum::Json(workflow.approved_ratings())).into_response()
}

/// Reads the asserted caller identity. Both headers are required for mutating routes.
pub(crate) fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, Response> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let role = header(CALLER_ROLE_HEADER).and_then(CallerRole::parse);
    let user_id = header(CALLER_ID_HEADER);
    match (role, user_id) {
        (Some(role), Some(user_id)) => Ok(Caller::new(role, user_id)),
        _ => {
            let payload = json!({
                "error": format!(
                    "requests must carry valid {CALLER_ROLE_HEADER} and {CALLER_ID_HEADER} headers"
                ),
            });
            Err((StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response())
        }
    }
}

pub(crate) fn workflow_error_status(error: &RatingWorkflowError) -> StatusCode {
    match error {
        RatingWorkflowError::Unauthorized { .. } | RatingWorkflowError::RoutingViolation { .. } => {
            StatusCode::FORBIDDEN
        }
        RatingWorkflowError::NoPublishedPeriod => StatusCode::NOT_FOUND,
        RatingWorkflowError::DuplicateSubmission { .. } => StatusCode::CONFLICT,
        RatingWorkflowError::EmptySubmission
        | RatingWorkflowError::ScopeViolation { .. }
        | RatingWorkflowError::GradeOutOfRange { .. }
        | RatingWorkflowError::Ingestion(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RatingWorkflowError::Scoring(_) | RatingWorkflowError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn workflow_error_response(error: RatingWorkflowError) -> Response {
    let status = workflow_error_status(&error);
    let mut payload = json!({
        "error": error.to_string(),
    });
    if let RatingWorkflowError::ScopeViolation { outside, .. } = &error {
        payload["outside_scope"] = json!(outside);
    }
    (status, axum::Json(payload)).into_response()
}
