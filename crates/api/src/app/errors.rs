use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use collo_core::DestinationId;
use collo_infra::WipStoreError;

pub fn store_error_to_response(err: WipStoreError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        WipStoreError::Conflict { .. } => json_error(StatusCode::CONFLICT, "conflict", message),
        WipStoreError::Closed(_) => json_error(StatusCode::LOCKED, "destination_closed", message),
        WipStoreError::Precondition(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "precondition_failed", message)
        }
        WipStoreError::Unavailable(_) => json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message),
        WipStoreError::InvalidWrite(_) => json_error(StatusCode::BAD_REQUEST, "invalid_write", message),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_destination(s: &str) -> Result<DestinationId, axum::response::Response> {
    s.parse::<DestinationId>().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_destination",
            "destination must be a UUID",
        )
    })
}
