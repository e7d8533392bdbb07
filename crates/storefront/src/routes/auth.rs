//! Sign-in and sign-out.
//!
//! The browser signs in with the identity provider and posts the access
//! token here; once the provider vouches for it the user is stored in the
//! session.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use loomline_core::{Email, UserId};

use crate::error::{AppError, Result, add_breadcrumb, set_sentry_user};
use crate::middleware::{clear_current_user, set_current_user};
use crate::state::AppState;

/// Sign-in request body.
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub access_token: String,
}

/// The user now attached to the session.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: UserId,
    pub email: Email,
    pub is_admin: bool,
}

/// Exchange a provider access token for a signed-in session.
#[instrument(skip(state, session, request))]
pub async fn sign_in(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<SignInRequest>,
) -> Result<Json<SessionResponse>> {
    let user = state.identity().verify(request.access_token.trim()).await?;

    set_current_user(&session, &user)
        .await
        .map_err(|e| AppError::Internal(format!("session: {e}")))?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    add_breadcrumb("auth", "Signed in", None);

    Ok(Json(SessionResponse {
        is_admin: state.config().is_admin(&user.email),
        id: user.id,
        email: user.email,
    }))
}

/// Sign out. The cart and wishlist stay with the session.
#[instrument(skip(session))]
pub async fn sign_out(session: Session) -> Result<StatusCode> {
    clear_current_user(&session)
        .await
        .map_err(|e| AppError::Internal(format!("session: {e}")))?;
    add_breadcrumb("auth", "Signed out", None);
    Ok(StatusCode::NO_CONTENT)
}
