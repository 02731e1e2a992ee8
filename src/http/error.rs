use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::error;

use crate::error::{ErrorKind, ServiceError};

/// Error body: `{error, message, code, details?}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(reason: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Authentication failed")
            .with_details(json!({ "reason": reason }))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err.kind() {
            ErrorKind::InvalidCoordinate => {
                let message = err.to_string();
                let ServiceError::InvalidCoordinate(coordinate) = &err else {
                    return Self::bad_request(message);
                };
                let details = json!([{
                    "field": coordinate.field(),
                    "message": message,
                    "value": coordinate.value(),
                }]);
                Self::bad_request(message).with_details(details)
            }
            ErrorKind::InvalidRequest => Self::bad_request(err.to_string()),
            ErrorKind::Unauthorized => Self::new(StatusCode::UNAUTHORIZED, "Authentication failed"),
            ErrorKind::NotFound => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            ErrorKind::Conflict => Self::new(StatusCode::CONFLICT, err.to_string()),
            ErrorKind::Internal => {
                error!(error = %err, "Request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.status.canonical_reason().unwrap_or("Error"),
            "message": self.message,
            "code": self.status.as_u16(),
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::CoordinateError;
    use uuid::Uuid;

    #[test]
    fn test_kind_to_status() {
        let id = Uuid::nil();
        let cases = [
            (ServiceError::UserBusy(id), StatusCode::CONFLICT),
            (ServiceError::NoActiveTrip(id), StatusCode::NOT_FOUND),
            (ServiceError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (
                ServiceError::from(CoordinateError::InvalidLongitude(200.0)),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::Store(crate::error::StoreError::NotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err = ApiError::from(ServiceError::Store(crate::error::StoreError::Unavailable(
            "connection refused at 10.0.0.5".into(),
        )));
        assert_eq!(err.message, "Internal server error");
    }
}
