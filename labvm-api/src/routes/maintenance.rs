use crate::{
    error::{ApiResult, ErrorBody},
    response::{ok, Envelope},
    state::AppState,
};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::{get, post},
    Json, Router,
};
use labvm_orchestrator::{DiskCleanup, DomainSummary, Vm};
use serde::Deserialize;
use std::time::Duration;
use utoipa::IntoParams;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/maintenance/cleanup-disks", post(cleanup_disks))
        .route("/api/v1/maintenance/refresh", post(refresh_states))
        .route("/api/v1/maintenance/orphans", get(orphaned_domains))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CleanupQuery {
    /// Override the configured grace period, in seconds.
    pub grace_secs: Option<u64>,
}

#[utoipa::path(
    post,
    path = "/api/v1/maintenance/cleanup-disks",
    params(CleanupQuery),
    responses(
        (status = 200, description = "Sweep report", body = Envelope<DiskCleanup>),
        (status = 502, description = "Listing failed", body = ErrorBody)
    ),
    tag = "maintenance"
)]
pub async fn cleanup_disks(
    State(state): State<AppState>,
    query: Result<Query<CleanupQuery>, QueryRejection>,
) -> ApiResult<Json<Envelope<DiskCleanup>>> {
    let Query(query) = query?;
    let grace = query
        .grace_secs
        .map(Duration::from_secs)
        .unwrap_or(state.disk_grace);

    let report = state
        .orchestrator
        .reconciler
        .cleanup_unused_disks(grace)
        .await?;

    Ok(ok(
        format!(
            "Removed {} disk(s), {} failed, {} skipped",
            report.removed.len(),
            report.failed.len(),
            report.skipped.len()
        ),
        report,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/maintenance/refresh",
    responses(
        (status = 200, description = "Rows whose stored state was updated", body = Envelope<Vec<Vm>>),
        (status = 502, description = "Listing failed", body = ErrorBody)
    ),
    tag = "maintenance"
)]
pub async fn refresh_states(State(state): State<AppState>) -> ApiResult<Json<Envelope<Vec<Vm>>>> {
    let updated = state.orchestrator.reconciler.refresh_states().await?;

    Ok(ok(format!("Refreshed {} VM(s)", updated.len()), updated))
}

#[utoipa::path(
    get,
    path = "/api/v1/maintenance/orphans",
    responses(
        (status = 200, description = "Live domains with no ledger row", body = Envelope<Vec<DomainSummary>>),
        (status = 502, description = "Listing failed", body = ErrorBody)
    ),
    tag = "maintenance"
)]
pub async fn orphaned_domains(
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<Vec<DomainSummary>>>> {
    let orphans = state.orchestrator.reconciler.orphaned_domains().await?;

    Ok(ok(format!("{} orphaned domain(s)", orphans.len()), orphans))
}
