use crate::intake::IntakeRecord;
use crate::types::{OrderStatus, ProductKind, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Authorization / Deliverable
// ---------------------------------------------------------------------------

/// Exactly one of these authorized the order's creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Authorization {
    /// Payment-provider confirmation reference.
    Payment { reference: String },
    /// Redeemed single-use gift code (normalized form).
    GiftCode { code: String },
    /// Free remake of a fulfilled order.
    Remake { of: String },
}

/// A finished artifact produced by a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverable {
    /// Stage that produced the artifact.
    pub stage: Stage,
    /// Artifact URI (object-store key or signed URL).
    pub uri: String,
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub product_id: String,
    pub product_kind: ProductKind,
    /// Customer email, or a gift-recipient marker for redeemed codes with
    /// no email on file yet.
    pub customer_email: String,
    pub status: OrderStatus,
    pub progress_percent: u8,
    pub current_step_label: String,
    pub authorization: Authorization,
    pub intake: IntakeRecord,
    /// Session that ran intake; none for remakes.
    pub source_session_id: Option<String>,
    /// Set on remake orders, pointing at the original.
    pub parent_order_id: Option<String>,
    /// Back-pointer stamped on the parent when its one remake is created.
    #[serde(default)]
    pub remake_order_id: Option<String>,
    /// Customer-supplied reason, set on remake orders.
    #[serde(default)]
    pub remake_reason: Option<String>,
    /// Stage currently dispatched to the workers; none once terminal.
    pub current_stage: Option<Stage>,
    /// Stages whose success has been applied (duplicate reports no-op).
    #[serde(default)]
    pub completed_stages: Vec<Stage>,
    /// Cumulative failure count per stage; never reset, so a qa ↔ script
    /// ping-pong cannot retry forever.
    #[serde(default)]
    pub stage_failures: BTreeMap<String, u32>,
    /// Artifact refs reported by stages so far; promoted to `deliverables`
    /// when the final stage completes.
    #[serde(default)]
    pub staged_artifacts: Vec<Deliverable>,
    /// Non-empty iff status is completed or delivered.
    #[serde(default)]
    pub deliverables: Vec<Deliverable>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every accepted stage report; drives the stall watchdog.
    pub last_report_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(
        product_id: impl Into<String>,
        product_kind: ProductKind,
        customer_email: impl Into<String>,
        authorization: Authorization,
        intake: IntakeRecord,
    ) -> Self {
        let now = Utc::now();
        let first = product_kind.first_stage();
        Self {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.into(),
            product_kind,
            customer_email: customer_email.into(),
            status: OrderStatus::Queued,
            progress_percent: 0,
            current_step_label: first.label().to_string(),
            authorization,
            intake,
            source_session_id: None,
            parent_order_id: None,
            remake_order_id: None,
            remake_reason: None,
            current_stage: Some(first),
            completed_stages: Vec::new(),
            stage_failures: BTreeMap::new(),
            staged_artifacts: Vec::new(),
            deliverables: Vec::new(),
            created_at: now,
            last_report_at: now,
            completed_at: None,
        }
    }

    pub fn stage_completed(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    pub fn failure_count(&self, stage: Stage) -> u32 {
        self.stage_failures
            .get(stage.as_str())
            .copied()
            .unwrap_or(0)
    }
}
