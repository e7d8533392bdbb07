//! Checkout route handlers.
//!
//! The browser confirms the payment with the provider directly using the
//! returned client secret; the server only creates the intent for the cart
//! total and reads its status back afterwards.
//!
//! A session may only read back the intent it created. Anything else is
//! reported as not found without asking the provider.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use loomline_core::Price;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{OptionalAuth, ShopperStorage};
use crate::models::session_keys;
use crate::payments::{MIN_CHARGE_MINOR_UNITS, PaymentIntentStatus, generate_order_number};
use crate::state::AppState;

use super::cart::open_cart;

/// Created intent plus the amount it was created for.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub payment_intent_id: String,
    pub client_secret: String,
    pub order_number: String,
    pub amount: Price,
}

/// Intent status, with whether the cart was cleared on success.
#[derive(Debug, Serialize)]
pub struct CheckoutStatusResponse {
    #[serde(flatten)]
    pub intent: PaymentIntentStatus,
    pub paid: bool,
}

/// How a requested intent relates to the session asking about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntentOwnership {
    /// Created by this session and not yet seen paid.
    Pending,
    /// Created by this session; its success already emptied the cart.
    Completed,
    /// Not created by this session.
    Foreign,
}

fn intent_ownership(pending: Option<&str>, completed: Option<&str>, id: &str) -> IntentOwnership {
    if pending == Some(id) {
        IntentOwnership::Pending
    } else if completed == Some(id) {
        IntentOwnership::Completed
    } else {
        IntentOwnership::Foreign
    }
}

fn session_error(err: tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("session: {err}"))
}

fn is_valid_intent_id(id: &str) -> bool {
    id.strip_prefix("pi_").is_some_and(|rest| {
        !rest.is_empty()
            && rest.len() <= 255
            && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Create a payment intent for the current cart total.
#[instrument(skip(state, storage, session, user))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    storage: ShopperStorage,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<CheckoutResponse>> {
    let cart = open_cart(&state, storage, &session).await;
    if cart.items().is_empty() {
        return Err(AppError::BadRequest("cart is empty".to_string()));
    }

    let total = cart.total();
    let amount_minor = total
        .to_minor_units()
        .ok_or_else(|| AppError::BadRequest("cart total out of range".to_string()))?;
    if amount_minor < MIN_CHARGE_MINOR_UNITS {
        return Err(AppError::BadRequest(format!(
            "order total must be at least {}",
            Price::from_minor_units(MIN_CHARGE_MINOR_UNITS, total.currency_code)
        )));
    }

    let order_number = generate_order_number();
    let customer = user.as_ref().map(|u| u.email.as_str());
    let intent = state
        .payments()
        .create_intent(amount_minor, total.currency_code, customer, &order_number)
        .await?;

    session
        .insert(session_keys::CHECKOUT_INTENT, &intent.payment_intent_id)
        .await
        .map_err(session_error)?;

    add_breadcrumb(
        "checkout",
        "Payment intent created",
        Some(&[("order_number", &order_number)]),
    );

    Ok(Json(CheckoutResponse {
        payment_intent_id: intent.payment_intent_id,
        client_secret: intent.client_secret,
        order_number: intent.order_number,
        amount: total,
    }))
}

/// Read the status of the intent this session created.
///
/// The first time it is seen paid, the cart is emptied and the intent is
/// marked completed so later reads do not touch the cart again.
#[instrument(skip(state, storage, session))]
pub async fn payment_intent_status(
    State(state): State<AppState>,
    storage: ShopperStorage,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<CheckoutStatusResponse>> {
    if !is_valid_intent_id(&id) {
        return Err(AppError::BadRequest(format!("invalid payment intent id: {id}")));
    }

    let pending = session
        .get::<String>(session_keys::CHECKOUT_INTENT)
        .await
        .map_err(session_error)?;
    let completed = session
        .get::<String>(session_keys::COMPLETED_INTENT)
        .await
        .map_err(session_error)?;

    let ownership = intent_ownership(pending.as_deref(), completed.as_deref(), &id);
    if ownership == IntentOwnership::Foreign {
        tracing::warn!(payment_intent_id = %id, "Status requested for another session's intent");
        return Err(AppError::NotFound(format!("payment intent {id}")));
    }

    let intent = state.payments().retrieve_intent(&id).await?;
    let paid = intent.status.is_paid();
    if paid && ownership == IntentOwnership::Pending {
        let mut cart = open_cart(&state, storage, &session).await;
        if !cart.items().is_empty() {
            cart.clear_cart();
            tracing::info!(order_number = ?intent.order_number, "Payment succeeded, cart cleared");
        }
        session
            .remove::<String>(session_keys::CHECKOUT_INTENT)
            .await
            .map_err(session_error)?;
        session
            .insert(session_keys::COMPLETED_INTENT, &id)
            .await
            .map_err(session_error)?;
    }

    Ok(Json(CheckoutStatusResponse { intent, paid }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::models::product::tests::sample_product;
    use crate::routes::test_support::TestApp;

    #[test]
    fn test_is_valid_intent_id() {
        assert!(is_valid_intent_id("pi_3MtwBwLkdIwHu7ix28a3tqPa"));
        assert!(!is_valid_intent_id("pi_"));
        assert!(!is_valid_intent_id("ch_3MtwBw"));
        assert!(!is_valid_intent_id("pi_../../v1/charges"));
    }

    #[test]
    fn test_intent_ownership() {
        let id = "pi_3MtwBwLkdIwHu7ix28a3tqPa";
        assert_eq!(intent_ownership(Some(id), None, id), IntentOwnership::Pending);
        assert_eq!(
            intent_ownership(Some("pi_newer"), Some(id), id),
            IntentOwnership::Completed
        );
        assert_eq!(intent_ownership(None, None, id), IntentOwnership::Foreign);
        assert_eq!(
            intent_ownership(Some("pi_mine"), Some("pi_old"), id),
            IntentOwnership::Foreign
        );
    }

    #[tokio::test]
    async fn test_other_sessions_intent_is_not_found_and_keeps_cart() {
        let app = TestApp::new();
        let shirt = sample_product("linen-shirt", "45.00");
        app.stock(&shirt).await;
        app.send(
            Method::POST,
            "/cart/items",
            Some(json!({"product_id": shirt.id, "size": "M", "color": "Black", "quantity": 2})),
        )
        .await;

        let (status, _) = app
            .send(
                Method::GET,
                "/checkout/payment-intent/pi_3MtwBwLkdIwHu7ix28a3tqPa",
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = app.send(Method::GET, "/cart/count", None).await;
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let app = TestApp::new();
        let (status, body) = app
            .send(Method::POST, "/checkout/payment-intent", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bad request: cart is empty");
    }

    #[tokio::test]
    async fn test_total_below_minimum_rejected() {
        let app = TestApp::new();
        let sticker = sample_product("sticker", "0.25");
        app.stock(&sticker).await;
        app.send(
            Method::POST,
            "/cart/items",
            Some(json!({"product_id": sticker.id, "size": "M", "color": "Black"})),
        )
        .await;

        let (status, body) = app
            .send(Method::POST, "/checkout/payment-intent", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("$0.50"));
    }

    #[tokio::test]
    async fn test_malformed_intent_id_rejected() {
        let app = TestApp::new();
        let (status, _) = app
            .send(Method::GET, "/checkout/payment-intent/not-an-intent", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_bad_gateway() {
        let app = TestApp::new();
        let shirt = sample_product("linen-shirt", "45.00");
        app.stock(&shirt).await;
        app.send(
            Method::POST,
            "/cart/items",
            Some(json!({"product_id": shirt.id, "size": "M", "color": "Black"})),
        )
        .await;

        let (status, body) = app
            .send(Method::POST, "/checkout/payment-intent", None)
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "External service error");

        // A failed create leaves nothing this session could read back
        let (status, _) = app
            .send(
                Method::GET,
                "/checkout/payment-intent/pi_3MtwBwLkdIwHu7ix28a3tqPa",
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
