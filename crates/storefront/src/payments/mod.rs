//! Payment intent client.
//!
//! Talks to a Stripe-compatible REST API: form-encoded requests, bearer
//! authentication, JSON responses. Amounts are integer minor units.
//!
//! Only two calls are needed by checkout:
//! - `POST /v1/payment_intents` - authorize the cart total
//! - `GET  /v1/payment_intents/{id}` - read back status after confirmation

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use loomline_core::{CurrencyCode, PaymentStatus};

use crate::config::PaymentConfig;

/// Smallest amount the provider will authorize (USD 0.50).
pub const MIN_CHARGE_MINOR_UNITS: i64 = 50;

const ORDER_NUMBER_PREFIX: &str = "LL";

/// Errors that can occur when talking to the payment provider.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Amount is below the provider minimum.
    #[error("amount {0} is below the minimum charge of {MIN_CHARGE_MINOR_UNITS}")]
    AmountTooSmall(i64),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// A created payment intent, handed to the browser to confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    pub payment_intent_id: String,
    pub client_secret: String,
    pub order_number: String,
}

/// Current state of a payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntentStatus {
    pub payment_intent_id: String,
    pub status: PaymentStatus,
    pub order_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: PaymentStatus,
    #[serde(default)]
    metadata: IntentMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct IntentMetadata {
    #[serde(default)]
    order_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Payment provider client.
#[derive(Clone)]
pub struct PaymentClient {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
}

impl std::fmt::Debug for PaymentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentClient")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl PaymentClient {
    /// Create a new payment client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    /// Create a payment intent for `amount_minor` in `currency`.
    ///
    /// The order number is stored in the intent metadata so it can be read
    /// back after the shopper confirms.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::AmountTooSmall` without calling the provider if
    /// the amount is under [`MIN_CHARGE_MINOR_UNITS`]. Returns other variants
    /// if the request fails or the response is malformed.
    #[instrument(skip(self, customer))]
    pub async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
        customer: Option<&str>,
        order_number: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        if amount_minor < MIN_CHARGE_MINOR_UNITS {
            return Err(PaymentError::AmountTooSmall(amount_minor));
        }

        let form = intent_form(amount_minor, currency, customer, order_number);
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&form)
            .send()
            .await?;

        let intent: IntentResponse = parse_response(response).await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| PaymentError::Parse("missing client_secret".to_string()))?;

        tracing::info!(payment_intent_id = %intent.id, %order_number, "Payment intent created");

        Ok(PaymentIntent {
            payment_intent_id: intent.id,
            client_secret,
            order_number: order_number.to_string(),
        })
    }

    /// Retrieve a payment intent's status.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is malformed.
    #[instrument(skip(self))]
    pub async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntentStatus, PaymentError> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{id}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        let intent: IntentResponse = parse_response(response).await?;

        Ok(PaymentIntentStatus {
            payment_intent_id: intent.id,
            status: intent.status,
            order_number: intent.metadata.order_number,
        })
    }
}

fn intent_form(
    amount_minor: i64,
    currency: CurrencyCode,
    customer: Option<&str>,
    order_number: &str,
) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("amount", amount_minor.to_string()),
        ("currency", currency.as_lowercase().to_string()),
        ("metadata[order_number]", order_number.to_string()),
        ("automatic_payment_methods[enabled]", "true".to_string()),
    ];
    if let Some(customer) = customer {
        form.push(("metadata[customer]", customer.to_string()));
    }
    form
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PaymentError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map_or(body, |envelope| envelope.error.message);
        return Err(PaymentError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| PaymentError::Parse(e.to_string()))
}

/// Generate a human-readable order number: `LL-YYYYMMDD-XXXXXXXX`.
#[must_use]
pub fn generate_order_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("{ORDER_NUMBER_PREFIX}-{date}-{suffix}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn client() -> PaymentClient {
        PaymentClient::new(&PaymentConfig {
            api_base: "http://127.0.0.1:9/".to_string(),
            secret_key: SecretString::from("sk_test_value"),
        })
        .unwrap()
    }

    #[test]
    fn test_debug_redacts_secret_key() {
        let debug = format!("{:?}", client());
        assert!(debug.contains("127.0.0.1:9"));
        assert!(!debug.contains("sk_test_value"));
    }

    #[test]
    fn test_order_number_format() {
        let number = generate_order_number();
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "LL");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert!(
            parts[2]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn test_order_numbers_differ() {
        assert_ne!(generate_order_number(), generate_order_number());
    }

    #[test]
    fn test_intent_form() {
        let form = intent_form(4599, CurrencyCode::EUR, Some("a@b.co"), "LL-20260101-ABCD1234");
        assert!(form.contains(&("amount", "4599".to_string())));
        assert!(form.contains(&("currency", "eur".to_string())));
        assert!(form.contains(&("metadata[customer]", "a@b.co".to_string())));

        let anonymous = intent_form(4599, CurrencyCode::USD, None, "LL-20260101-ABCD1234");
        assert!(!anonymous.iter().any(|(k, _)| *k == "metadata[customer]"));
    }

    #[test]
    fn test_intent_response_parsing() {
        let intent: IntentResponse = serde_json::from_str(
            r#"{"id":"pi_1","client_secret":"pi_1_secret","status":"succeeded",
                "metadata":{"order_number":"LL-20260101-ABCD1234"}}"#,
        )
        .unwrap();
        assert_eq!(intent.status, PaymentStatus::Succeeded);
        assert_eq!(
            intent.metadata.order_number.as_deref(),
            Some("LL-20260101-ABCD1234")
        );

        let bare: IntentResponse =
            serde_json::from_str(r#"{"id":"pi_2","status":"requires_payment_method"}"#).unwrap();
        assert!(bare.client_secret.is_none());
        assert!(bare.metadata.order_number.is_none());
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        assert_eq!(client().api_base, "http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_amount_below_minimum_rejected_before_request() {
        let err = client()
            .create_intent(49, CurrencyCode::USD, None, "LL-20260101-ABCD1234")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::AmountTooSmall(49)));
    }
}
