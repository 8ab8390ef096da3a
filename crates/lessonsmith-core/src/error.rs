use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("session already complete: {0}")]
    SessionAlreadyComplete(String),

    #[error("session busy, try again: {0}")]
    SessionBusy(String),

    #[error("session not complete yet: {0}")]
    SessionIncomplete(String),

    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("invalid checkout: {0}")]
    InvalidCheckout(String),

    #[error("gift code invalid")]
    GiftCodeInvalid,

    #[error("gift code expired")]
    GiftCodeExpired,

    #[error("gift code already redeemed")]
    GiftCodeAlreadyRedeemed,

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("protocol violation for order {order}, stage {stage}: {reason}")]
    ProtocolViolation {
        order: String,
        stage: String,
        reason: String,
    },

    #[error("remake already used for order {order} (remake: {remake})")]
    RemakeAlreadyUsed { order: String, remake: String },

    #[error("order {order} is not remakeable in status {status}")]
    RemakeUnavailable { order: String, status: String },

    #[error("order {order} cannot transition from {status}: {reason}")]
    InvalidOrderTransition {
        order: String,
        status: String,
        reason: String,
    },

    #[error("invalid phase: {0}")]
    InvalidPhase(String),

    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("invalid product kind: {0}")]
    InvalidProductKind(String),

    #[error("storage error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
