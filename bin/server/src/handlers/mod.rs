//! HTTP handlers.
//!
//! Handlers are thin: extract the session actor and path/body, call the
//! coordinator, serialise the result. All authorization lives in the
//! coordinator.

pub mod admin;
pub mod internal;
pub mod notifications;
pub mod reports;
pub mod social;
pub mod sse;

use crate::error::{ApiError, ApiResult};
use axum::{body::Bytes, Json};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Parses an optional JSON body; an empty body yields `T::default()`.
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid body: {}", e)))
}

/// Liveness check.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur::DismissRequest;

    #[test]
    fn test_optional_json() {
        let empty: DismissRequest = optional_json(&Bytes::new()).unwrap();
        assert_eq!(empty.reason, None);

        let body = Bytes::from_static(br#"{"reason":"dup"}"#);
        let parsed: DismissRequest = optional_json(&body).unwrap();
        assert_eq!(parsed.reason.as_deref(), Some("dup"));

        let bad = Bytes::from_static(b"{nope");
        assert!(optional_json::<DismissRequest>(&bad).is_err());
    }
}
