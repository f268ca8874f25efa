//! HTTP error mapping.
//!
//! Every handler returns `Result<_, ApiError>`. Library errors map to status
//! codes here and nowhere else, with a JSON body of the form
//! `{"error": "<Kind>", "message": "..."}`. Extractor rejections use the
//! same body.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use murmur::MurmurError;
use serde_json::json;
use tracing::error;

/// Error returned by handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    /// Malformed request body or parameters.
    pub fn bad_request<T: ToString>(msg: T) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "Validation",
            message: msg.to_string(),
        }
    }

    /// Missing or wrong gateway credentials.
    pub fn gateway_forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            kind: "Forbidden",
            message: "gateway credentials required".to_string(),
        }
    }

    /// Session store failure.
    pub fn internal<T: ToString>(msg: T) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "Internal",
            message: msg.to_string(),
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<MurmurError> for ApiError {
    fn from(err: MurmurError) -> Self {
        let status = match &err {
            MurmurError::Validation(_) | MurmurError::SelfReference(_) => StatusCode::BAD_REQUEST,
            MurmurError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            MurmurError::Forbidden(_) | MurmurError::ActorBanned(_) => StatusCode::FORBIDDEN,
            MurmurError::NotFound(_) => StatusCode::NOT_FOUND,
            MurmurError::InvalidTransition(_) | MurmurError::PrivilegedTarget(_) => {
                StatusCode::CONFLICT
            }
            MurmurError::TransientDelivery(_)
            | MurmurError::Storage(_)
            | MurmurError::Serialization(_)
            | MurmurError::Config(_)
            | MurmurError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// Path parameters; a malformed id is a JSON `Validation` error.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct IdPath<T>(pub T);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = if self.status.is_server_error() {
            error!(kind = self.kind, "Internal error: {}", self.message);
            "Internal error".to_string()
        } else {
            self.message
        };
        (
            self.status,
            Json(json!({ "error": self.kind, "message": message })),
        )
            .into_response()
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (MurmurError::validation("x"), StatusCode::BAD_REQUEST),
            (MurmurError::self_reference("x"), StatusCode::BAD_REQUEST),
            (MurmurError::unauthenticated("x"), StatusCode::UNAUTHORIZED),
            (MurmurError::actor_banned("x"), StatusCode::FORBIDDEN),
            (MurmurError::forbidden("x"), StatusCode::FORBIDDEN),
            (MurmurError::not_found("x"), StatusCode::NOT_FOUND),
            (MurmurError::invalid_transition("x"), StatusCode::CONFLICT),
            (MurmurError::privileged_target("x"), StatusCode::CONFLICT),
            (MurmurError::storage("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
