//! Mapping from domain errors to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use fleetshim_router::RouteError;
use fleetshim_scale::ScaleError;

/// An error ready to leave the API.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request or out-of-range input. Nothing was attempted.
    BadRequest(String),
    /// No datastore role could serve the request.
    Unavailable(String),
    /// An upstream failed after the request was accepted.
    Internal {
        error: String,
        details: Option<String>,
    },
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest(error) | ApiError::Unavailable(error) => ErrorBody {
                error,
                details: None,
            },
            ApiError::Internal { error, details } => ErrorBody { error, details },
        };
        (status, Json(body)).into_response()
    }
}

impl From<RouteError> for ApiError {
    fn from(e: RouteError) -> Self {
        match e {
            RouteError::Exhausted { .. } => ApiError::Unavailable(e.to_string()),
            RouteError::Write(source) => ApiError::Internal {
                error: source.to_string(),
                details: None,
            },
        }
    }
}

impl From<ScaleError> for ApiError {
    fn from(e: ScaleError) -> Self {
        match &e {
            ScaleError::OutOfRange { .. } => ApiError::BadRequest(e.to_string()),
            ScaleError::Orchestrator(_) => ApiError::Internal {
                error: "Scaling failed".to_string(),
                details: Some(e.details()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetshim_orchestrator::OrchestratorError;
    use fleetshim_store::StoreError;

    #[test]
    fn statuses() {
        let exhausted = RouteError::Exhausted {
            attempts: 2,
            last_error: "timed out".to_string(),
        };
        assert_eq!(
            ApiError::from(exhausted).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(RouteError::Write(StoreError::Timeout)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let out_of_range = ScaleError::OutOfRange {
            requested: 0,
            min: 1,
            max: 10,
        };
        assert_eq!(ApiError::from(out_of_range).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn orchestrator_failure_keeps_diagnostic() {
        let e = ScaleError::Orchestrator(OrchestratorError::CommandFailed {
            command: "docker compose up".to_string(),
            status: 1,
            stderr: "port already allocated\n".to_string(),
        });
        match ApiError::from(e) {
            ApiError::Internal { details, .. } => {
                assert_eq!(details.as_deref(), Some("port already allocated"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
