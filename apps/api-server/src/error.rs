//! HTTP error type shared by all handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domain::CoreError;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Unavailable(&'static str),
    #[error("{0}")]
    Internal(String),
    /// An extractor refused the request before the handler ran.
    #[error("{message}")]
    Rejected {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            ApiError::Rejected { status, code, .. } => (*status, *code),
            ApiError::Core(e) => match e {
                CoreError::InvalidInput(_)
                | CoreError::InvalidSlug(_)
                | CoreError::InvalidUserEmail => (StatusCode::BAD_REQUEST, "validation"),
                CoreError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
                CoreError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
                CoreError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                CoreError::AlreadyExists | CoreError::Conflict(_) => {
                    (StatusCode::CONFLICT, "conflict")
                }
                CoreError::InsufficientStock { .. } => (StatusCode::CONFLICT, "out_of_stock"),
                CoreError::EmptyCart => (StatusCode::CONFLICT, "empty_cart"),
                CoreError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "invalid_transition")
                }
                CoreError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let body = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(err = %self, "request failed");
            http_common::json_err(code)
        } else {
            http_common::json_error_with_message(code, &self.to_string())
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::OrderStatus;

    #[test]
    fn core_errors_map_to_statuses() {
        let cases = [
            (CoreError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::InvalidUserEmail, StatusCode::BAD_REQUEST),
            (CoreError::Unauthorized, StatusCode::UNAUTHORIZED),
            (CoreError::Forbidden, StatusCode::FORBIDDEN),
            (CoreError::NotFound, StatusCode::NOT_FOUND),
            (CoreError::AlreadyExists, StatusCode::CONFLICT),
            (CoreError::EmptyCart, StatusCode::CONFLICT),
            (
                CoreError::InvalidTransition {
                    from: OrderStatus::Delivered,
                    to: OrderStatus::Pending,
                },
                StatusCode::CONFLICT,
            ),
            (
                CoreError::Repository("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn stock_errors_use_their_own_code() {
        let err = ApiError::from(CoreError::InsufficientStock {
            product_id: "p1".into(),
            available: 1,
            requested: 3,
        });
        assert_eq!(err.parts(), (StatusCode::CONFLICT, "out_of_stock"));
    }
}
