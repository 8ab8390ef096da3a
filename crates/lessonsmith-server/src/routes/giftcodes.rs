use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct IssueBody {
    pub product_id: String,
    pub issued_for_order_id: String,
}

/// POST /api/gift-codes — issue a fresh code for a paid gift purchase.
pub async fn issue_gift_code(
    State(app): State<AppState>,
    Json(body): Json<IssueBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let bridge = app.bridge.clone();
    let catalog = app.catalog.clone();
    let result = tokio::task::spawn_blocking(move || {
        let product = catalog.get(&body.product_id)?;
        let gift = bridge
            .registry()
            .issue(&product.id, &body.issued_for_order_id)?;
        Ok::<_, lessonsmith_core::CoreError>(serde_json::json!({
            "code": gift.code,
            "product_id": gift.product_id,
            "expires_at": gift.expires_at,
        }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}
