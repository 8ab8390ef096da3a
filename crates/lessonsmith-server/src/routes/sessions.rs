use axum::extract::{Path, State};
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct CreateSessionBody {
    pub product_id: String,
}

/// POST /api/sessions — start a guided-intake conversation.
pub async fn create_session(
    State(app): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let engine = app.engine.clone();
    let catalog = app.catalog.clone();
    let result = tokio::task::spawn_blocking(move || {
        let (session, turn) = engine.start_session(&body.product_id, &catalog)?;
        Ok::<_, lessonsmith_core::CoreError>(serde_json::json!({
            "session_id": session.id,
            "prompt": turn.prompt,
            "phase": turn.phase,
            "progress_percent": turn.progress_percent,
        }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

#[derive(serde::Deserialize)]
pub struct MessageBody {
    pub text: String,
}

/// POST /api/sessions/:id/messages — submit one answer.
pub async fn submit_message(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let engine = app.engine.clone();
    let result = tokio::task::spawn_blocking(move || {
        let turn = engine.submit_answer(&id, &body.text)?;
        Ok::<_, lessonsmith_core::CoreError>(serde_json::json!({
            "prompt": turn.prompt,
            "phase": turn.phase,
            "progress_percent": turn.progress_percent,
            "is_complete": turn.is_complete,
        }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}
