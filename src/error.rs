use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream query failed: {0}")]
    Upstream(#[from] anyhow::Error),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Config(ref msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Configuration error: {msg}"))
            }
            AppError::Upstream(ref e) => {
                tracing::error!("Upstream query failed: {:?}", e);
                (StatusCode::BAD_GATEWAY, format!("Upstream query failed: {e:#}"))
            }
            AppError::Validation(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: AppError) -> StatusCode {
        error.into_response().status()
    }

    #[test]
    fn errors_map_to_their_http_status() {
        assert_eq!(
            status_of(AppError::Validation("bad period".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::NotFound("loadpoint 9".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(AppError::Upstream(anyhow::anyhow!("influx down"))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(AppError::Config("missing token".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
