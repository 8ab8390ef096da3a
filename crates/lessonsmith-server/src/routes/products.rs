use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/products — the purchasable line-up.
pub async fn list_products(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let products: Vec<_> = app.catalog.products().collect();
    Ok(Json(serde_json::json!({ "products": products })))
}
