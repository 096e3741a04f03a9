use crate::{
    error::{ApiResult, ErrorBody},
    response::{ok, Envelope},
    state::AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::get,
    Json, Router,
};
use labvm_orchestrator::{VmType, VmTypeInput};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/vm-types", get(list_vm_types).post(create_vm_type))
        .route(
            "/api/v1/vm-types/{id}",
            get(get_vm_type).put(update_vm_type).delete(delete_vm_type),
        )
}

#[utoipa::path(
    get,
    path = "/api/v1/vm-types",
    responses((status = 200, description = "All VM types ordered by name", body = Envelope<Vec<VmType>>)),
    tag = "vm-types"
)]
pub async fn list_vm_types(State(state): State<AppState>) -> ApiResult<Json<Envelope<Vec<VmType>>>> {
    let types = state.orchestrator.catalog.list().await?;

    Ok(ok(format!("{} VM type(s)", types.len()), types))
}

#[utoipa::path(
    post,
    path = "/api/v1/vm-types",
    request_body = VmTypeInput,
    responses(
        (status = 200, description = "VM type created", body = Envelope<VmType>),
        (status = 400, description = "Missing field or duplicate name", body = ErrorBody)
    ),
    tag = "vm-types"
)]
pub async fn create_vm_type(
    State(state): State<AppState>,
    payload: Result<Json<VmTypeInput>, JsonRejection>,
) -> ApiResult<Json<Envelope<VmType>>> {
    let Json(input) = payload?;

    let vm_type = state.orchestrator.catalog.create(input).await?;

    Ok(ok(format!("VM type {} created", vm_type.name), vm_type))
}

#[utoipa::path(
    get,
    path = "/api/v1/vm-types/{id}",
    params(("id" = String, Path, description = "VM type id")),
    responses(
        (status = 200, description = "The VM type", body = Envelope<VmType>),
        (status = 404, description = "Unknown VM type", body = ErrorBody)
    ),
    tag = "vm-types"
)]
pub async fn get_vm_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<VmType>>> {
    let vm_type = state.orchestrator.catalog.get(&id).await?;

    Ok(ok(format!("VM type {}", vm_type.name), vm_type))
}

#[utoipa::path(
    put,
    path = "/api/v1/vm-types/{id}",
    params(("id" = String, Path, description = "VM type id")),
    request_body = VmTypeInput,
    responses(
        (status = 200, description = "VM type updated", body = Envelope<VmType>),
        (status = 400, description = "Missing field or duplicate name", body = ErrorBody),
        (status = 404, description = "Unknown VM type", body = ErrorBody)
    ),
    tag = "vm-types"
)]
pub async fn update_vm_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<VmTypeInput>, JsonRejection>,
) -> ApiResult<Json<Envelope<VmType>>> {
    let Json(input) = payload?;

    let vm_type = state.orchestrator.catalog.update(&id, input).await?;

    Ok(ok(format!("VM type {} updated", vm_type.name), vm_type))
}

#[utoipa::path(
    delete,
    path = "/api/v1/vm-types/{id}",
    params(("id" = String, Path, description = "VM type id")),
    responses(
        (status = 200, description = "VM type deleted"),
        (status = 404, description = "Unknown VM type", body = ErrorBody),
        (status = 409, description = "Still referenced by a VM or request", body = ErrorBody)
    ),
    tag = "vm-types"
)]
pub async fn delete_vm_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Option<VmType>>>> {
    state.orchestrator.catalog.delete(&id).await?;

    Ok(ok("VM type deleted", None))
}
