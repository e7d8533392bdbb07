//! Identity provider boundary.
//!
//! Sign-in happens in the browser against a Supabase-compatible auth API.
//! The browser then hands the resulting access token to the storefront,
//! which asks the provider who it belongs to before trusting it.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use loomline_core::{Email, UserId};

use crate::config::IdentityConfig;
use crate::models::CurrentUser;

/// Longest access token forwarded to the provider.
pub const MAX_TOKEN_LENGTH: usize = 4096;

/// Errors that can occur when verifying an access token.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Token is empty, oversized or not printable ASCII.
    #[error("malformed access token")]
    MalformedToken,

    /// Provider rejected the token.
    #[error("access token rejected")]
    Rejected,

    /// Provider returned an unexpected error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl IdentityError {
    /// Whether the caller's token, rather than the provider, is at fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::MalformedToken | Self::Rejected)
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

/// Identity provider client.
#[derive(Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl std::fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl IdentityClient {
    /// Create a new identity client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Resolve an access token to the user it was issued for.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::MalformedToken`] without calling the provider
    /// if the token is unusable, [`IdentityError::Rejected`] if the provider
    /// does not accept it, and other variants if the request fails.
    #[instrument(skip(self, access_token))]
    pub async fn verify(&self, access_token: &str) -> Result<CurrentUser, IdentityError> {
        validate_token(access_token)?;

        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(IdentityError::Rejected);
        }
        if !status.is_success() {
            return Err(IdentityError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let user = parse_user(&body)?;
        tracing::info!(user_id = %user.id, "Access token verified");
        Ok(user)
    }
}

fn validate_token(token: &str) -> Result<(), IdentityError> {
    let usable = !token.is_empty()
        && token.len() <= MAX_TOKEN_LENGTH
        && token.bytes().all(|b| b.is_ascii_graphic());
    if usable {
        Ok(())
    } else {
        Err(IdentityError::MalformedToken)
    }
}

/// Users without an email (phone-only sign-ups) cannot shop here.
fn parse_user(body: &str) -> Result<CurrentUser, IdentityError> {
    let user: UserResponse =
        serde_json::from_str(body).map_err(|e| IdentityError::Parse(e.to_string()))?;
    let email = user
        .email
        .ok_or_else(|| IdentityError::Parse("user has no email".to_string()))?;
    let email = Email::parse(&email).map_err(|e| IdentityError::Parse(e.to_string()))?;

    Ok(CurrentUser {
        id: UserId::new(user.id),
        email,
    })
}
