use axum::extract::State;
use axum::Json;
use lessonsmith_core::checkout::CheckoutStart;

use crate::error::AppError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct CheckoutBody {
    pub product_id: String,
    pub session_id: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub gift_code: Option<String>,
}

/// POST /api/checkout — start checkout for a completed session. The payment
/// path returns a provider redirect; the gift-code path returns the order
/// it created.
pub async fn begin_checkout(
    State(app): State<AppState>,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let bridge = app.bridge.clone();
    let catalog = app.catalog.clone();
    let result = tokio::task::spawn_blocking(move || {
        let start = bridge.begin_checkout(
            &catalog,
            &body.product_id,
            &body.session_id,
            body.customer_email.as_deref(),
            body.gift_code.as_deref(),
        )?;
        let json = match start {
            CheckoutStart::Redirect { checkout_url } => {
                serde_json::json!({ "checkout_url": checkout_url })
            }
            CheckoutStart::Order { order_id } => serde_json::json!({ "order_id": order_id }),
        };
        Ok::<_, lessonsmith_core::CoreError>(json)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

#[derive(serde::Deserialize)]
pub struct ConfirmBody {
    pub product_id: String,
    pub session_id: String,
    pub customer_email: String,
    pub payment_reference: String,
    #[serde(default)]
    pub as_gift: bool,
}

/// POST /api/checkout/confirm — payment-provider confirmation callback;
/// the trigger for order creation on the payment path.
pub async fn confirm_payment(
    State(app): State<AppState>,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let bridge = app.bridge.clone();
    let catalog = app.catalog.clone();
    let result = tokio::task::spawn_blocking(move || {
        let (order, gift) = bridge.confirm_payment(
            &catalog,
            &body.product_id,
            &body.session_id,
            &body.customer_email,
            &body.payment_reference,
            body.as_gift,
        )?;
        let mut json = serde_json::json!({
            "order_id": order.id,
            "status": order.status,
        });
        if let Some(gift) = gift {
            json["gift_code"] = serde_json::json!(gift.code);
            json["gift_expires_at"] = serde_json::json!(gift.expires_at);
        }
        Ok::<_, lessonsmith_core::CoreError>(json)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}
