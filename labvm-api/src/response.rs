use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Success envelope: `{success: true, message, data}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

pub fn ok<T>(message: impl Into<String>, data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: message.into(),
        data,
    })
}

/// Parse an optional JSON body. An empty body yields `None`.
pub fn optional_json<T: serde::de::DeserializeOwned>(
    body: &[u8],
) -> Result<Option<T>, crate::error::ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| crate::error::ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}
