use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use labvm_orchestrator::{OrchestratorError, Severity};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;

pub type ApiResult<T> = Result<T, ApiError>;

/// Body of every failed response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub kind: String,
    pub severity: Severity,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Orchestrator(OrchestratorError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Orchestrator(err) => match err {
                OrchestratorError::InvalidSpec(_) => StatusCode::BAD_REQUEST,
                OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
                OrchestratorError::InUse(_) | OrchestratorError::AlreadyProcessed(_) => {
                    StatusCode::CONFLICT
                }
                OrchestratorError::Execution(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (kind, severity, message) = match self {
            ApiError::BadRequest(msg) => ("bad_request", Severity::Rejected, msg),
            ApiError::Unauthorized(msg) => ("unauthorized", Severity::Rejected, msg),
            ApiError::Orchestrator(err) => (err.kind(), err.severity(), err.to_string()),
        };

        if status.is_server_error() {
            error!(kind, ?severity, "{}", message);
        } else {
            warn!(kind, "{}", message);
        }

        let body = ErrorBody {
            success: false,
            message,
            kind: kind.to_string(),
            severity,
        };

        (status, Json(body)).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        ApiError::Orchestrator(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labvm_core::ExecutionError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                OrchestratorError::InvalidSpec("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (OrchestratorError::NotFound("vm".into()), StatusCode::NOT_FOUND),
            (OrchestratorError::InUse("type".into()), StatusCode::CONFLICT),
            (
                OrchestratorError::AlreadyProcessed("req".into()),
                StatusCode::CONFLICT,
            ),
            (
                OrchestratorError::Execution(ExecutionError::failed("virsh start x", Some(1), "boom")),
                StatusCode::BAD_GATEWAY,
            ),
            (
                OrchestratorError::Internal("oops".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_provision_incomplete_is_server_error() {
        let err = OrchestratorError::ProvisionIncomplete {
            internal_name: "lab-1".into(),
            disk_path: "/srv/images/lab-1.qcow2".into(),
            source: ExecutionError::failed("virt-install", Some(1), "no media"),
        };

        assert_eq!(
            ApiError::from(err).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
