//! Fulfillment pipeline orchestrator.
//!
//! Owns the order entity. An order is created by the checkout bridge and
//! then mutated exclusively through `report_stage_outcome` as external
//! generation workers report in. Reports arrive at-least-once and possibly
//! out of order: a duplicate report for an applied stage is a no-op, an
//! out-of-order report is a `ProtocolViolation` that is logged and dropped
//! without touching order state.

use crate::catalog::Catalog;
use crate::config::ServiceConfig;
use crate::error::{CoreError, Result};
use crate::giftcode::normalize_code;
use crate::intake::IntakeRecord;
use crate::order::{Authorization, Deliverable, Order};
use crate::store::Store;
use crate::types::{OrderStatus, Stage};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Placeholder identity for orders created by gift-code redemption before
/// the recipient has supplied an email.
pub const GIFT_RECIPIENT: &str = "gift-recipient";

// ---------------------------------------------------------------------------
// Requests / outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub product_id: String,
    pub customer_email: Option<String>,
    pub source_session_id: Option<String>,
    pub intake: IntakeRecord,
    /// Payment-provider confirmation, when payment authorized the order.
    pub payment_reference: Option<String>,
    /// Gift code, when redemption authorizes the order. Exactly one of the
    /// two must be present.
    pub gift_code: Option<String>,
}

#[derive(Debug, Clone)]
pub enum StageOutcome {
    Succeeded { artifacts: Vec<String> },
    Failed { reason: String },
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    store: Arc<Store>,
    config: ServiceConfig,
}

impl Pipeline {
    pub fn new(store: Arc<Store>, config: ServiceConfig) -> Self {
        Self { store, config }
    }

    /// Create an order authorized by exactly one of payment confirmation or
    /// gift-code redemption. The gift path redeems and persists the order
    /// in one transaction; if redemption fails, no order exists.
    pub fn create_order(&self, catalog: &Catalog, request: OrderRequest) -> Result<Order> {
        let product = catalog.get(&request.product_id)?;

        let authorization = match (&request.payment_reference, &request.gift_code) {
            (Some(reference), None) => Authorization::Payment {
                reference: reference.clone(),
            },
            (None, Some(code)) => Authorization::GiftCode {
                code: normalize_code(code)?,
            },
            (Some(_), Some(_)) => {
                return Err(CoreError::InvalidCheckout(
                    "supply either a payment confirmation or a gift code, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(CoreError::InvalidCheckout(
                    "an order needs a payment confirmation or a gift code".to_string(),
                ))
            }
        };

        let email = request
            .customer_email
            .unwrap_or_else(|| GIFT_RECIPIENT.to_string());
        let mut order = Order::new(
            &product.id,
            product.kind,
            email,
            authorization,
            request.intake,
        );
        order.source_session_id = request.source_session_id;

        match &order.authorization {
            Authorization::GiftCode { code } => {
                self.store.redeem_and_create_order(code, &order, Utc::now())?;
            }
            _ => self.store.insert_order(&order)?,
        }

        tracing::info!(
            order = %order.id,
            product = %order.product_id,
            stage = %order.product_kind.first_stage(),
            "order created, first stage dispatched"
        );
        Ok(order)
    }

    /// Apply a worker's stage report. The only path by which order status
    /// and progress change.
    pub fn report_stage_outcome(
        &self,
        order_id: &str,
        stage: Stage,
        outcome: StageOutcome,
    ) -> Result<Order> {
        let budget = self.config.stage_retry_budget;
        let result = self.store.update_order(order_id, |order| {
            apply_report(order, stage, &outcome, budget)?;
            Ok(order.clone())
        });
        if let Err(CoreError::ProtocolViolation { order, stage, reason }) = &result {
            tracing::warn!(order = %order, stage = %stage, reason = %reason, "stage report dropped");
        }
        result
    }

    /// Pure read for status polling.
    pub fn get_status(&self, order_id: &str) -> Result<Order> {
        self.store.load_order(order_id)
    }

    /// Spawn the one free remake of a fulfilled order. The remake re-enters
    /// the pipeline at the first generation stage; intake is not re-run.
    pub fn request_remake(
        &self,
        order_id: &str,
        reason: &str,
        adjustments: &BTreeMap<String, String>,
    ) -> Result<Order> {
        let parent = self.store.load_order(order_id)?;

        let mut remake = Order::new(
            &parent.product_id,
            parent.product_kind,
            &parent.customer_email,
            Authorization::Remake {
                of: parent.id.clone(),
            },
            parent.intake.merged(adjustments),
        );
        remake.parent_order_id = Some(parent.id.clone());
        remake.remake_reason = Some(reason.to_string());

        // Eligibility is re-checked inside the transaction; racing requests
        // cannot both attach a remake.
        self.store.create_remake(&parent.id, &remake)?;
        tracing::info!(order = %order_id, remake = %remake.id, "remake order created");
        Ok(remake)
    }

    /// Move a completed order to delivered (after email dispatch, a
    /// collaborator concern).
    pub fn mark_delivered(&self, order_id: &str) -> Result<Order> {
        self.store.update_order(order_id, |order| {
            if order.status != OrderStatus::Completed {
                return Err(CoreError::InvalidOrderTransition {
                    order: order.id.clone(),
                    status: order.status.to_string(),
                    reason: "only completed orders can be marked delivered".to_string(),
                });
            }
            order.status = OrderStatus::Delivered;
            Ok(order.clone())
        })
    }

    /// Watchdog sweep: force orders with no worker report past the
    /// wall-clock budget to failed rather than polling them forever.
    /// Returns the number of orders failed.
    pub fn fail_stalled(&self) -> Result<u32> {
        let cutoff = Utc::now() - self.config.stalled_order_age();
        let mut count = 0u32;
        for order in self.store.list_orders()? {
            if !order.status.is_terminal() && order.last_report_at < cutoff {
                let failed = self.store.update_order(&order.id, |o| {
                    // Re-check under the write lock; a report may have landed.
                    if !o.status.is_terminal() && o.last_report_at < cutoff {
                        o.status = OrderStatus::Failed;
                        o.current_stage = None;
                        o.current_step_label =
                            "Generation timed out — our team has been notified".to_string();
                        tracing::warn!(order = %o.id, "order stalled past budget, failing");
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                })?;
                if failed {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Report application (pure, runs inside the store's write transaction)
// ---------------------------------------------------------------------------

fn apply_report(
    order: &mut Order,
    stage: Stage,
    outcome: &StageOutcome,
    budget: u32,
) -> Result<()> {
    // Duplicate of an already-applied stage: at-least-once delivery, no-op.
    if order.stage_completed(stage) {
        tracing::debug!(order = %order.id, stage = %stage, "duplicate stage report ignored");
        return Ok(());
    }

    if order.status.is_terminal() {
        return Err(CoreError::ProtocolViolation {
            order: order.id.clone(),
            stage: stage.to_string(),
            reason: format!("order is terminal ({})", order.status),
        });
    }

    if order.current_stage != Some(stage) {
        let expected = order
            .current_stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string());
        return Err(CoreError::ProtocolViolation {
            order: order.id.clone(),
            stage: stage.to_string(),
            reason: format!("expected a report for stage {expected}"),
        });
    }

    order.last_report_at = Utc::now();

    match outcome {
        StageOutcome::Succeeded { artifacts } => {
            for uri in artifacts {
                order.staged_artifacts.push(Deliverable {
                    stage,
                    uri: uri.clone(),
                });
            }
            order.completed_stages.push(stage);
            order.progress_percent = order.progress_percent.max(stage.progress_after());

            match order.product_kind.next_stage(stage) {
                Some(next) => {
                    order.status = OrderStatus::Generating;
                    order.current_stage = Some(next);
                    order.current_step_label = next.label().to_string();
                }
                None => {
                    order.status = OrderStatus::Completed;
                    order.progress_percent = 100;
                    order.current_stage = None;
                    order.current_step_label = "Your lesson is ready".to_string();
                    order.completed_at = Some(Utc::now());
                    order.deliverables = std::mem::take(&mut order.staged_artifacts);
                    tracing::info!(order = %order.id, "order completed");
                }
            }
        }
        StageOutcome::Failed { reason } => {
            let failures = order.failure_count(stage) + 1;
            order
                .stage_failures
                .insert(stage.as_str().to_string(), failures);

            if failures > budget {
                order.status = OrderStatus::Failed;
                order.current_stage = None;
                order.current_step_label =
                    "Generation failed — our team has been notified".to_string();
                tracing::warn!(
                    order = %order.id,
                    stage = %stage,
                    failures,
                    reason = %reason,
                    "retry budget exhausted, order failed"
                );
            } else {
                // QA rejections restart the script; everything else retries
                // in place. Progress never moves backward.
                let retry_from = if stage == Stage::VerifyingQa {
                    // The script must be re-reported, so un-apply it along
                    // with the artifacts the rejected run produced.
                    order.completed_stages.retain(|&s| s != Stage::GeneratingScript);
                    order
                        .staged_artifacts
                        .retain(|d| d.stage != Stage::GeneratingScript);
                    Stage::GeneratingScript
                } else {
                    stage
                };
                order.status = OrderStatus::Generating;
                order.current_stage = Some(retry_from);
                order.current_step_label = retry_from.label().to_string();
                tracing::info!(
                    order = %order.id,
                    stage = %stage,
                    retry_from = %retry_from,
                    failures,
                    reason = %reason,
                    "stage failed, retrying within budget"
                );
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
