use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use deployment::DeploymentError;
use services::services::{conversion::ConversionError, validation::ValidationError};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Conversion(ConversionError::Validation(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = match &self {
            ApiError::Conversion(err) => match err {
                ConversionError::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
                ConversionError::State(_) => (StatusCode::NOT_FOUND, "StateError"),
                ConversionError::Conversion { .. } => (StatusCode::BAD_GATEWAY, "ConversionError"),
                ConversionError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IoError"),
            },
            ApiError::Deployment(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DeploymentError"),
            ApiError::Multipart(err) => (err.status(), "MultipartError"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IoError"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        };

        let error_message = match &self {
            ApiError::Conversion(err) => match err {
                ConversionError::Validation(e) => e.to_string(),
                ConversionError::State(e) => e.to_string(),
                // the failure detail stays in the server log
                ConversionError::Conversion { .. } => "Conversion failed".to_string(),
                ConversionError::Io(_) => "Failed to access temporary files".to_string(),
            },
            ApiError::Multipart(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "The uploaded file is too large.".to_string()
            }
            ApiError::Multipart(_) => {
                "Failed to read the upload. Please ensure the file is valid and try again."
                    .to_string()
            }
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::InternalError(msg) => msg.clone(),
            _ => format!("{}: {}", error_type, self),
        };

        if status_code.is_server_error() {
            tracing::error!("{}: {}", error_type, self);
        } else {
            tracing::debug!("{}: {}", error_type, error_message);
        }

        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}
