//! Authentication and shopper-context extractors.
//!
//! Identity is owned by an external provider; whatever completes sign-in
//! stores a [`CurrentUser`] in the session with [`set_current_user`]. The
//! extractors here only read it back.
//!
//! [`ShopperStorage`] resolves the session's storage partition (creating one
//! on first use) and opens a fresh [`StorageArea`] on it for the request.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use tower_sessions::Session;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{CurrentUser, session_keys};
use crate::state::AppState;
use crate::storage::StorageArea;

/// Extractor that requires an authenticated user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that requires an authenticated user on the admin list.
pub struct RequireAdmin(pub CurrentUser);

/// Error returned when an auth extractor rejects the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No user in the session.
    Unauthorized,
    /// User is signed in but lacks the required role.
    Forbidden,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Sign in required"),
            Self::Forbidden => (StatusCode::FORBIDDEN, "Not allowed"),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

async fn current_user(parts: &Parts) -> Option<CurrentUser> {
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user(parts)
            .await
            .map(Self)
            .ok_or(AuthRejection::Unauthorized)
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = current_user(parts)
            .await
            .ok_or(AuthRejection::Unauthorized)?;

        if !state.config().is_admin(&user.email) {
            tracing::warn!(user_id = %user.id, "Admin access denied");
            return Err(AuthRejection::Forbidden);
        }
        Ok(Self(user))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is signed in.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(current_user(parts).await))
    }
}

/// The requesting shopper's storage, opened as a new browsing context.
pub struct ShopperStorage(pub StorageArea);

impl FromRequestParts<AppState> for ShopperStorage {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let partition = storage_partition(session)
            .await
            .map_err(|e| AppError::Internal(format!("session: {e}")))?;

        Ok(Self(state.storage().area(&partition)))
    }
}

/// Get the session's storage partition, assigning a new one on first use.
///
/// # Errors
///
/// Returns an error if the session cannot be read or modified.
pub async fn storage_partition(session: &Session) -> Result<String, tower_sessions::session::Error> {
    if let Some(id) = session.get::<Uuid>(session_keys::STORAGE_PARTITION).await? {
        return Ok(id.to_string());
    }

    let id = Uuid::new_v4();
    session.insert(session_keys::STORAGE_PARTITION, id).await?;
    tracing::debug!(partition = %id, "Assigned storage partition");
    Ok(id.to_string())
}

/// Helper to set the current user in the session.
///
/// The session id is cycled to prevent fixation; the storage partition is
/// kept, so an anonymous cart survives sign-in.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    Ok(())
}
