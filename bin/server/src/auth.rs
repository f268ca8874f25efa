//! Session identity and gateway checks.
//!
//! The acting actor is read from the cookie session. Sessions are bound by
//! the authentication collaborator through `POST /internal/sessions`; every
//! `/internal` route requires the shared gateway secret header.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use murmur::ActorId;
use subtle::ConstantTimeEq;
use tower_sessions::Session;
use tracing::{error, warn};

/// Session key holding the authenticated actor id.
pub const SESSION_ACTOR_KEY: &str = "actor_id";

/// Header carrying the gateway secret.
pub const GATEWAY_SECRET_HEADER: &str = "x-gateway-secret";

/// The actor bound to the request's session, if any.
///
/// Extraction never fails on a missing session; the coordinator decides
/// whether the command needs an authenticated actor.
#[derive(Debug, Clone, Copy)]
pub struct CurrentActor(pub Option<ActorId>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| ApiError::internal(msg))?;
        let actor = session
            .get::<ActorId>(SESSION_ACTOR_KEY)
            .await
            .map_err(|e| {
                error!("Failed to read session: {:?}", e);
                ApiError::internal("session store unavailable")
            })?;
        Ok(CurrentActor(actor))
    }
}

/// Binds an actor to the session, rotating the session id.
pub async fn bind_session(session: &Session, actor: ActorId) -> Result<(), ApiError> {
    session.cycle_id().await.map_err(|e| {
        error!("Failed to rotate session id: {:?}", e);
        ApiError::internal("session store unavailable")
    })?;
    session
        .insert(SESSION_ACTOR_KEY, actor)
        .await
        .map_err(|e| {
            error!("Failed to write session: {:?}", e);
            ApiError::internal("session store unavailable")
        })
}

/// Ends the session.
pub async fn end_session(session: &Session) -> Result<(), ApiError> {
    session.flush().await.map_err(|e| {
        error!("Failed to flush session: {:?}", e);
        ApiError::internal("session store unavailable")
    })
}

/// Rejects requests without the configured gateway secret.
///
/// With no secret configured the internal routes are closed entirely.
pub fn require_gateway(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.gateway_secret.as_deref() else {
        warn!("Gateway request rejected: no gateway secret configured");
        return Err(ApiError::gateway_forbidden());
    };
    let provided = headers
        .get(GATEWAY_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        warn!("Gateway request rejected: bad secret");
        return Err(ApiError::gateway_forbidden());
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    // Slices of different length compare unequal without inspecting bytes.
    a.ct_eq(b).into()
}
