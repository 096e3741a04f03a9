use crate::{
    auth::AuthenticatedUser,
    error::{ApiResult, ErrorBody},
    response::{ok, optional_json, Envelope},
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Extension, Json, Router,
};
use labvm_orchestrator::{
    ApprovalOverride, RequestFilters, RequestStatus, SubmitRequest, Vm, VmRequest,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/requests", get(list_requests).post(submit_request))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}/approve", post(approve_request))
        .route("/api/v1/requests/{id}/reject", post(reject_request))
}

/// Request payload; the requesting user comes from the identity header.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewRequestBody {
    pub purpose: String,
    pub course: Option<String>,
    pub duration: Option<String>,
    pub description: Option<String>,
    pub memory_mb: i64,
    pub vcpus: i64,
    pub storage_gb: i64,
    pub os_type: Option<String>,
    pub vm_type_id: Option<String>,
}

impl NewRequestBody {
    fn into_submission(self, user_id: String) -> SubmitRequest {
        SubmitRequest {
            user_id,
            purpose: self.purpose,
            course: self.course,
            duration: self.duration,
            description: self.description,
            memory_mb: self.memory_mb,
            vcpus: self.vcpus,
            storage_gb: self.storage_gb,
            os_type: self.os_type,
            vm_type_id: self.vm_type_id,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RequestsQuery {
    pub user_id: Option<String>,
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct RejectBody {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApprovalResult {
    pub request: VmRequest,
    pub vm: Vm,
}

#[utoipa::path(
    post,
    path = "/api/v1/requests",
    request_body = NewRequestBody,
    responses(
        (status = 200, description = "Request created as pending", body = Envelope<VmRequest>),
        (status = 400, description = "Invalid request", body = ErrorBody)
    ),
    tag = "requests"
)]
pub async fn submit_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<NewRequestBody>, JsonRejection>,
) -> ApiResult<Json<Envelope<VmRequest>>> {
    let Json(body) = payload?;

    let request = state
        .orchestrator
        .workflow
        .submit(body.into_submission(user.username))
        .await?;

    Ok(ok("Request submitted", request))
}

#[utoipa::path(
    get,
    path = "/api/v1/requests",
    params(RequestsQuery),
    responses((status = 200, description = "Requests, newest first", body = Envelope<Vec<VmRequest>>)),
    tag = "requests"
)]
pub async fn list_requests(
    State(state): State<AppState>,
    query: Result<Query<RequestsQuery>, QueryRejection>,
) -> ApiResult<Json<Envelope<Vec<VmRequest>>>> {
    let Query(query) = query?;
    let filters = RequestFilters {
        user_id: query.user_id,
        status: query.status,
    };

    let requests = state.orchestrator.workflow.list(filters).await?;

    Ok(ok(format!("{} request(s)", requests.len()), requests))
}

#[utoipa::path(
    get,
    path = "/api/v1/requests/{id}",
    params(("id" = String, Path, description = "Request id")),
    responses(
        (status = 200, description = "The request", body = Envelope<VmRequest>),
        (status = 404, description = "Unknown request", body = ErrorBody)
    ),
    tag = "requests"
)]
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<VmRequest>>> {
    let request = state.orchestrator.workflow.get(&id).await?;

    Ok(ok(format!("Request {}", request.id), request))
}

#[utoipa::path(
    post,
    path = "/api/v1/requests/{id}/approve",
    params(("id" = String, Path, description = "Request id")),
    request_body(content = ApprovalOverride, description = "Optional per-field overrides"),
    responses(
        (status = 200, description = "VM provisioned and request approved", body = Envelope<ApprovalResult>),
        (status = 404, description = "Unknown request", body = ErrorBody),
        (status = 409, description = "Request already decided", body = ErrorBody)
    ),
    tag = "requests"
)]
pub async fn approve_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Envelope<ApprovalResult>>> {
    let overrides: Option<ApprovalOverride> = optional_json(&body)?;

    let (request, vm) = state.orchestrator.workflow.approve(&id, overrides).await?;

    Ok(ok(
        format!("Request approved, VM {} created", vm.name),
        ApprovalResult { request, vm },
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/requests/{id}/reject",
    params(("id" = String, Path, description = "Request id")),
    request_body(content = RejectBody, description = "Optional rejection reason"),
    responses(
        (status = 200, description = "Request rejected", body = Envelope<VmRequest>),
        (status = 404, description = "Unknown request", body = ErrorBody),
        (status = 409, description = "Request already decided", body = ErrorBody)
    ),
    tag = "requests"
)]
pub async fn reject_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Envelope<VmRequest>>> {
    let reason = optional_json::<RejectBody>(&body)?.and_then(|b| b.reason);

    let request = state.orchestrator.workflow.reject(&id, reason).await?;

    Ok(ok("Request rejected", request))
}
