use axum::extract::{Path, State};
use axum::Json;
use lessonsmith_core::pipeline::StageOutcome;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/orders/:id/status — polled by the customer-facing page.
pub async fn get_status(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let pipeline = app.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || {
        let order = pipeline.get_status(&id)?;
        let mut json = serde_json::json!({
            "order_id": order.id,
            "product_id": order.product_id,
            "status": order.status,
            "progress_percent": order.progress_percent,
            "current_step_label": order.current_step_label,
            "created_at": order.created_at,
            "completed_at": order.completed_at,
        });
        if order.status.is_fulfilled() {
            json["deliverables"] = serde_json::json!(order.deliverables);
        }
        if let Some(remake) = &order.remake_order_id {
            json["remake_order_id"] = serde_json::json!(remake);
        }
        Ok::<_, lessonsmith_core::CoreError>(json)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

#[derive(serde::Deserialize)]
pub struct StageReportBody {
    pub stage: String,
    /// "succeeded" or "failed".
    pub outcome: String,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/orders/:id/stages — generation-worker report boundary.
pub async fn report_stage(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StageReportBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let stage = lessonsmith_core::types::Stage::from_str(&body.stage)?;
    let outcome = match body.outcome.as_str() {
        "succeeded" => StageOutcome::Succeeded {
            artifacts: body.artifacts,
        },
        "failed" => StageOutcome::Failed {
            reason: body.reason.unwrap_or_else(|| "unspecified".to_string()),
        },
        other => {
            return Err(AppError::bad_request(format!(
                "outcome must be 'succeeded' or 'failed', got '{other}'"
            )))
        }
    };

    let pipeline = app.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || {
        let order = pipeline.report_stage_outcome(&id, stage, outcome)?;
        Ok::<_, lessonsmith_core::CoreError>(serde_json::json!({
            "order_id": order.id,
            "status": order.status,
            "progress_percent": order.progress_percent,
            "current_step_label": order.current_step_label,
        }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

#[derive(serde::Deserialize)]
pub struct RemakeBody {
    pub reason: String,
    #[serde(default)]
    pub adjustments: BTreeMap<String, String>,
}

/// POST /api/orders/:id/remake — spawn the one free remake.
pub async fn request_remake(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RemakeBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let pipeline = app.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || {
        let remake = pipeline.request_remake(&id, &body.reason, &body.adjustments)?;
        Ok::<_, lessonsmith_core::CoreError>(serde_json::json!({
            "remake_order_id": remake.id,
            "status": remake.status,
        }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

/// POST /api/orders/:id/delivered — called after email dispatch.
pub async fn mark_delivered(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let pipeline = app.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || {
        let order = pipeline.mark_delivered(&id)?;
        Ok::<_, lessonsmith_core::CoreError>(serde_json::json!({
            "order_id": order.id,
            "status": order.status,
        }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}
