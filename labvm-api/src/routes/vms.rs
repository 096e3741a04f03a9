use crate::{
    auth::AuthenticatedUser,
    error::{ApiResult, ErrorBody},
    response::{ok, Envelope},
    state::AppState,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Extension, Json, Router,
};
use labvm_orchestrator::{CreateVmSpec, DeleteOutcome, LifecycleAction, Vm, VmView};
use serde::Deserialize;
use utoipa::IntoParams;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/vms", get(list_vms).post(create_vm))
        .route("/api/v1/vms/{name}", get(get_vm).delete(delete_vm))
        .route("/api/v1/vms/{name}/{action}", post(vm_action))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListVmsQuery {
    /// Only return VMs whose live status is running.
    #[serde(default)]
    pub running: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DeleteVmQuery {
    /// Also remove the backing disk image.
    #[serde(default)]
    pub remove_storage: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/vms",
    request_body = CreateVmSpec,
    responses(
        (status = 200, description = "VM provisioned", body = Envelope<Vm>),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 502, description = "Hypervisor command failed", body = ErrorBody)
    ),
    tag = "vms"
)]
pub async fn create_vm(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<CreateVmSpec>, JsonRejection>,
) -> ApiResult<Json<Envelope<Vm>>> {
    let Json(mut spec) = payload?;
    // Administrators may provision on behalf of a user.
    spec.owner.get_or_insert(user.username);

    let vm = state.orchestrator.provisioner.provision(spec).await?;

    Ok(ok(format!("VM {} created", vm.name), vm))
}

#[utoipa::path(
    get,
    path = "/api/v1/vms",
    params(ListVmsQuery),
    responses((status = 200, description = "Ledger rows merged with live state", body = Envelope<Vec<VmView>>)),
    tag = "vms"
)]
pub async fn list_vms(
    State(state): State<AppState>,
    query: Result<Query<ListVmsQuery>, QueryRejection>,
) -> ApiResult<Json<Envelope<Vec<VmView>>>> {
    let Query(query) = query?;

    let vms = state.orchestrator.reconciler.list(query.running).await?;

    Ok(ok(format!("{} VM(s)", vms.len()), vms))
}

#[utoipa::path(
    get,
    path = "/api/v1/vms/{name}",
    params(("name" = String, Path, description = "Internal or display name")),
    responses(
        (status = 200, description = "VM with live state", body = Envelope<VmView>),
        (status = 404, description = "Unknown VM", body = ErrorBody)
    ),
    tag = "vms"
)]
pub async fn get_vm(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Envelope<VmView>>> {
    let view = state.orchestrator.reconciler.get(&name).await?;

    Ok(ok(format!("VM {}", view.vm.name), view))
}

#[utoipa::path(
    post,
    path = "/api/v1/vms/{name}/{action}",
    params(
        ("name" = String, Path, description = "Internal or display name"),
        ("action" = String, Path, description = "start, stop, shutdown, restart, suspend or resume")
    ),
    responses(
        (status = 200, description = "Action applied", body = Envelope<Vm>),
        (status = 400, description = "Unknown action", body = ErrorBody),
        (status = 404, description = "Unknown VM", body = ErrorBody),
        (status = 502, description = "Hypervisor command failed", body = ErrorBody)
    ),
    tag = "vms"
)]
pub async fn vm_action(
    State(state): State<AppState>,
    Path((name, action)): Path<(String, String)>,
) -> ApiResult<Json<Envelope<Vm>>> {
    let action: LifecycleAction = action.parse()?;

    let vm = state.orchestrator.lifecycle.apply(&name, action).await?;

    Ok(ok(format!("{} succeeded for VM {}", action_label(action), vm.name), vm))
}

#[utoipa::path(
    delete,
    path = "/api/v1/vms/{name}",
    params(
        ("name" = String, Path, description = "Internal or display name"),
        DeleteVmQuery
    ),
    responses(
        (status = 200, description = "VM deleted", body = Envelope<DeleteOutcome>),
        (status = 404, description = "Unknown VM", body = ErrorBody),
        (status = 502, description = "Undefine failed, nothing was removed", body = ErrorBody)
    ),
    tag = "vms"
)]
pub async fn delete_vm(
    State(state): State<AppState>,
    Path(name): Path<String>,
    query: Result<Query<DeleteVmQuery>, QueryRejection>,
) -> ApiResult<Json<Envelope<DeleteOutcome>>> {
    let Query(query) = query?;

    let outcome = state
        .orchestrator
        .lifecycle
        .delete(&name, query.remove_storage)
        .await?;

    let message = if query.remove_storage && !outcome.storage_removed {
        format!(
            "VM {} deleted, disk {} left for cleanup",
            outcome.vm.name, outcome.vm.disk_path
        )
    } else {
        format!("VM {} deleted", outcome.vm.name)
    };

    Ok(ok(message, outcome))
}

fn action_label(action: LifecycleAction) -> &'static str {
    match action {
        LifecycleAction::Start => "Start",
        LifecycleAction::Stop => "Stop",
        LifecycleAction::Shutdown => "Shutdown",
        LifecycleAction::Restart => "Restart",
        LifecycleAction::Suspend => "Suspend",
        LifecycleAction::Resume => "Resume",
    }
}
