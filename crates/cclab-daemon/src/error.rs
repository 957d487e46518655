use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use cclab_core::LabError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unprocessable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE_ENTITY", msg)
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        };

        let body = json!({
            "error": {
                "code": code,
                "message": message
            }
        });

        (status, Json(body)).into_response()
    }
}

impl From<LabError> for ApiError {
    fn from(err: LabError) -> Self {
        match err {
            LabError::VmNotFound(_) | LabError::PageNotFound(_) | LabError::NoSealedData(_) => {
                ApiError::NotFound(err.to_string())
            }
            LabError::EnclaveNotLoaded(_)
            | LabError::InvalidSegments(_)
            | LabError::UnknownEcall(_)
            | LabError::IdentityRequired
            | LabError::PageOverflow { .. } => ApiError::BadRequest(err.to_string()),
            // Integrity and decoding failures indicate tampering or a bug;
            // they surface as server errors, never as silent fallbacks.
            LabError::MalformedToken
            | LabError::IntegrityFailure
            | LabError::Serialization(_) => ApiError::Internal(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
