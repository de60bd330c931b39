//! JSON API over the request workflow.
//!
//! Endpoints (all require the gateway identity headers):
//! - `POST   /api/requests`                          submit a request
//! - `GET    /api/requests`                          role-scoped listing
//! - `GET    /api/requests/{id}`                     one request
//! - `DELETE /api/requests/{id}`                     admin delete
//! - `PUT    /api/requests/{id}/approve-level`       approve the caller's level
//! - `PUT    /api/requests/{id}/reject-level`        reject the caller's level
//! - `PUT    /api/requests/{id}/assign-technician`   assign maintenance work
//! - `PUT    /api/requests/{id}/maintenance`         advance maintenance work
//! - `GET    /api/requests/{id}/audit`               admin audit trail
//! - `GET    /api/analytics?month=YYYY-MM`           admin dashboard figures
//! - `GET    /api/events`                            change feed of visible requests (SSE)

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, put},
    Json, Router,
};
use eapproval_core::analytics::AnalyticsSummary;
use eapproval_core::approvals::Decision;
use eapproval_core::audit::AuditEvent;
use eapproval_core::domain::request::{NewRequest, RequestId};
use serde::Deserialize;

use crate::error::ApiError;
use crate::events::{stream_changes, ChangeFeed};
use crate::service::{DecisionInput, RequestService, RequestView, TechnicianAssignment};
use crate::session::{require_api_token, ApiToken, CallerSession};

#[derive(Clone)]
pub struct ApiState {
    service: Arc<RequestService>,
}

impl ApiState {
    pub fn new(service: Arc<RequestService>) -> Self {
        Self { service }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub month: Option<String>,
}

pub fn router(state: ApiState, token: ApiToken) -> Router {
    let feed: ChangeFeed = state.service.feed().clone();
    let events = Router::new().route("/api/events", get(stream_changes)).with_state(feed);

    Router::new()
        .route("/api/requests", get(list_requests).post(submit_request))
        .route("/api/requests/{id}", get(get_request).delete(delete_request))
        .route("/api/requests/{id}/approve-level", put(approve_level))
        .route("/api/requests/{id}/reject-level", put(reject_level))
        .route("/api/requests/{id}/assign-technician", put(assign_technician))
        .route("/api/requests/{id}/maintenance", put(advance_maintenance))
        .route("/api/requests/{id}/audit", get(audit_trail))
        .route("/api/analytics", get(analytics))
        .with_state(state)
        .merge(events)
        .layer(middleware::from_fn_with_state(token, require_api_token))
}

async fn submit_request(
    State(state): State<ApiState>,
    caller: CallerSession,
    Json(body): Json<NewRequest>,
) -> Result<(StatusCode, Json<RequestView>), ApiError> {
    let view = state
        .service
        .submit(&caller.session, &caller.correlation_id, body)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn list_requests(
    State(state): State<ApiState>,
    caller: CallerSession,
) -> Result<Json<Vec<RequestView>>, ApiError> {
    state
        .service
        .list(&caller.session)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}

async fn get_request(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    caller: CallerSession,
) -> Result<Json<RequestView>, ApiError> {
    state
        .service
        .get(&caller.session, &RequestId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}

async fn delete_request(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    caller: CallerSession,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .delete(&caller.session, &caller.correlation_id, &RequestId(id))
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}

async fn approve_level(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    caller: CallerSession,
    Json(body): Json<DecisionInput>,
) -> Result<Json<RequestView>, ApiError> {
    decide(state, caller, id, Decision::Approved, body).await
}

async fn reject_level(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    caller: CallerSession,
    Json(body): Json<DecisionInput>,
) -> Result<Json<RequestView>, ApiError> {
    decide(state, caller, id, Decision::Rejected, body).await
}

async fn decide(
    state: ApiState,
    caller: CallerSession,
    id: String,
    decision: Decision,
    body: DecisionInput,
) -> Result<Json<RequestView>, ApiError> {
    state
        .service
        .decide(&caller.session, &caller.correlation_id, &RequestId(id), decision, body)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}

async fn assign_technician(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    caller: CallerSession,
    Json(body): Json<TechnicianAssignment>,
) -> Result<Json<RequestView>, ApiError> {
    state
        .service
        .assign_technician(&caller.session, &caller.correlation_id, &RequestId(id), body)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}

async fn advance_maintenance(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    caller: CallerSession,
) -> Result<Json<RequestView>, ApiError> {
    state
        .service
        .advance_maintenance(&caller.session, &caller.correlation_id, &RequestId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}

async fn audit_trail(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    caller: CallerSession,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
    state
        .service
        .audit_trail(&caller.session, &RequestId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}

async fn analytics(
    Query(query): Query<AnalyticsQuery>,
    State(state): State<ApiState>,
    caller: CallerSession,
) -> Result<Json<AnalyticsSummary>, ApiError> {
    state
        .service
        .analytics(&caller.session, query.month.as_deref())
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}
