use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lessonsmith_core::CoreError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 Bad Request errors
// ---------------------------------------------------------------------------

/// Private sentinel error type used to carry an explicit HTTP 400 through
/// the `anyhow::Error` chain without touching the `CoreError` enum.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(b) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": b.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }

        let status = if let Some(e) = self.0.downcast_ref::<CoreError>() {
            match e {
                CoreError::SessionNotFound(_)
                | CoreError::OrderNotFound(_)
                | CoreError::ProductNotFound(_) => StatusCode::NOT_FOUND,
                CoreError::SessionAlreadyComplete(_)
                | CoreError::SessionBusy(_)
                | CoreError::GiftCodeAlreadyRedeemed
                | CoreError::RemakeAlreadyUsed { .. }
                | CoreError::RemakeUnavailable { .. } => StatusCode::CONFLICT,
                CoreError::SessionExpired(_) | CoreError::GiftCodeExpired => StatusCode::GONE,
                CoreError::InvalidCheckout(_)
                | CoreError::GiftCodeInvalid
                | CoreError::InvalidPhase(_)
                | CoreError::InvalidStage(_)
                | CoreError::InvalidProductKind(_) => StatusCode::BAD_REQUEST,
                CoreError::SessionIncomplete(_)
                | CoreError::ProtocolViolation { .. }
                | CoreError::InvalidOrderTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                CoreError::Store(_)
                | CoreError::Io(_)
                | CoreError::Yaml(_)
                | CoreError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_maps_to_404() {
        let err = AppError(CoreError::SessionNotFound("s-1".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn order_not_found_maps_to_404() {
        let err = AppError(CoreError::OrderNotFound("o-1".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn already_complete_maps_to_409() {
        let err = AppError(CoreError::SessionAlreadyComplete("s-1".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn session_busy_maps_to_409() {
        let err = AppError(CoreError::SessionBusy("s-1".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn already_redeemed_maps_to_409() {
        let err = AppError(CoreError::GiftCodeAlreadyRedeemed.into());
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn remake_already_used_maps_to_409() {
        let err = AppError(
            CoreError::RemakeAlreadyUsed {
                order: "o-1".into(),
                remake: "o-2".into(),
            }
            .into(),
        );
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn expired_session_maps_to_410() {
        let err = AppError(CoreError::SessionExpired("s-1".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::GONE);
    }

    #[test]
    fn invalid_gift_code_maps_to_400() {
        let err = AppError(CoreError::GiftCodeInvalid.into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn protocol_violation_maps_to_422() {
        let err = AppError(
            CoreError::ProtocolViolation {
                order: "o-1".into(),
                stage: "uploading".into(),
                reason: "expected a report for stage generating_script".into(),
            }
            .into(),
        );
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn incomplete_session_maps_to_422() {
        let err = AppError(CoreError::SessionIncomplete("s-1".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn store_error_maps_to_500() {
        let err = AppError(CoreError::Store("disk full".into()).into());
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn non_core_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("unexpected"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn bad_request_constructor_maps_to_400() {
        let err = AppError::bad_request("outcome must be succeeded or failed");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn response_body_is_json_with_error_field() {
        let err = AppError(CoreError::OrderNotFound("o-1".into()).into());
        let response = err.into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
