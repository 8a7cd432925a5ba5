// Mapping of domain errors to HTTP responses
use crate::domain::error::TelemetryError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub struct ApiError(pub TelemetryError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<TelemetryError> for ApiError {
    fn from(err: TelemetryError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            TelemetryError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "STORE_TIMEOUT"),
            TelemetryError::ConnectionUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
            }
            TelemetryError::AuthenticationFailed(_) => (StatusCode::BAD_GATEWAY, "STORE_AUTH_FAILED"),
            TelemetryError::ResourceNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            TelemetryError::QuerySyntaxInvalid(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "QUERY_SYNTAX_INVALID")
            }
            TelemetryError::InvalidRange(_) => (StatusCode::BAD_REQUEST, "INVALID_RANGE"),
            TelemetryError::Unknown(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        };

        tracing::error!(error_code = code, error = %self.0, "request failed");

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_error_kind() {
        let cases = [
            (TelemetryError::Timeout { attempts: 4 }, StatusCode::GATEWAY_TIMEOUT),
            (
                TelemetryError::ConnectionUnavailable {
                    attempts: 4,
                    message: "refused".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (TelemetryError::AuthenticationFailed("401".into()), StatusCode::BAD_GATEWAY),
            (TelemetryError::ResourceNotFound("x".into()), StatusCode::NOT_FOUND),
            (TelemetryError::InvalidRange("x".into()), StatusCode::BAD_REQUEST),
            (TelemetryError::Unknown("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
