//! Checkout bridge.
//!
//! Thin seam between a completed intake session and the pipeline: payment
//! goes out to an external provider and comes back as a confirmation
//! callback; gift codes skip the provider entirely and create the order on
//! the spot. The core never talks to the payment provider beyond the
//! `PaymentProvider` trait.

use crate::catalog::{Catalog, Product};
use crate::config::ServiceConfig;
use crate::error::{CoreError, Result};
use crate::giftcode::{GiftCode, GiftCodeRegistry};
use crate::order::Order;
use crate::pipeline::{OrderRequest, Pipeline};
use crate::store::Store;
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// PaymentProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProviderCheckout {
    /// Hosted payment page the customer is redirected to.
    pub url: String,
    /// Provider-side reference, echoed back in the confirmation callback.
    pub reference: String,
}

/// External payment collaborator. Implementations create a hosted checkout;
/// confirmation arrives later as a callback handled by `confirm_payment`.
pub trait PaymentProvider: Send + Sync {
    fn create_checkout(
        &self,
        product: &Product,
        customer_email: &str,
        session_id: &str,
    ) -> Result<ProviderCheckout>;
}

/// Provider that hands off to a hosted payment page built from a base URL.
pub struct StaticCheckout {
    base_url: String,
}

impl StaticCheckout {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            base_url: config.checkout_url_base.clone(),
        }
    }
}

impl PaymentProvider for StaticCheckout {
    fn create_checkout(
        &self,
        product: &Product,
        _customer_email: &str,
        session_id: &str,
    ) -> Result<ProviderCheckout> {
        let reference = format!("chk_{}", Uuid::new_v4().simple());
        Ok(ProviderCheckout {
            url: format!(
                "{}/{}?session={}&ref={}",
                self.base_url, product.id, session_id, reference
            ),
            reference,
        })
    }
}

// ---------------------------------------------------------------------------
// CheckoutBridge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum CheckoutStart {
    /// Payment path: customer is redirected to the provider.
    Redirect { checkout_url: String },
    /// Gift-code path: the code was redeemed and the order already exists.
    Order { order_id: String },
}

pub struct CheckoutBridge {
    store: Arc<Store>,
    pipeline: Arc<Pipeline>,
    registry: GiftCodeRegistry,
    provider: Arc<dyn PaymentProvider>,
}

impl CheckoutBridge {
    pub fn new(
        store: Arc<Store>,
        pipeline: Arc<Pipeline>,
        provider: Arc<dyn PaymentProvider>,
        config: ServiceConfig,
    ) -> Self {
        let registry = GiftCodeRegistry::new(Arc::clone(&store), config);
        Self {
            store,
            pipeline,
            registry,
            provider,
        }
    }

    /// Start checkout for a completed session. Exactly one of
    /// `customer_email` (payment path) or `gift_code` (redemption path)
    /// must be supplied.
    pub fn begin_checkout(
        &self,
        catalog: &Catalog,
        product_id: &str,
        session_id: &str,
        customer_email: Option<&str>,
        gift_code: Option<&str>,
    ) -> Result<CheckoutStart> {
        let product = catalog.get(product_id)?;
        let intake = self.store.load_session(session_id)?.intake()?;

        match (customer_email, gift_code) {
            (None, Some(code)) => {
                let order = self.pipeline.create_order(
                    catalog,
                    OrderRequest {
                        product_id: product.id.clone(),
                        customer_email: None,
                        source_session_id: Some(session_id.to_string()),
                        intake,
                        payment_reference: None,
                        gift_code: Some(code.to_string()),
                    },
                )?;
                Ok(CheckoutStart::Order { order_id: order.id })
            }
            (Some(email), None) => {
                let checkout = self.provider.create_checkout(product, email, session_id)?;
                tracing::info!(
                    session = session_id,
                    product = product_id,
                    reference = %checkout.reference,
                    "checkout handed off to payment provider"
                );
                Ok(CheckoutStart::Redirect {
                    checkout_url: checkout.url,
                })
            }
            (Some(_), Some(_)) => Err(CoreError::InvalidCheckout(
                "supply either an email or a gift code, not both".to_string(),
            )),
            (None, None) => Err(CoreError::InvalidCheckout(
                "checkout needs an email or a gift code".to_string(),
            )),
        }
    }

    /// Payment-provider confirmation callback: the trigger for order
    /// creation on the payment path. When the purchase is a gift of a
    /// giftable product, a code is issued instead of running the pipeline
    /// for the buyer.
    pub fn confirm_payment(
        &self,
        catalog: &Catalog,
        product_id: &str,
        session_id: &str,
        customer_email: &str,
        payment_reference: &str,
        as_gift: bool,
    ) -> Result<(Order, Option<GiftCode>)> {
        let product = catalog.get(product_id)?;
        let intake = self.store.load_session(session_id)?.intake()?;

        let order = self.pipeline.create_order(
            catalog,
            OrderRequest {
                product_id: product.id.clone(),
                customer_email: Some(customer_email.to_string()),
                source_session_id: Some(session_id.to_string()),
                intake,
                payment_reference: Some(payment_reference.to_string()),
                gift_code: None,
            },
        )?;

        let gift = if as_gift && product.giftable {
            Some(self.registry.issue(&product.id, &order.id)?)
        } else {
            None
        };
        Ok((order, gift))
    }

    pub fn registry(&self) -> &GiftCodeRegistry {
        &self.registry
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use tempfile::TempDir;

    struct RecordingProvider;

    impl PaymentProvider for RecordingProvider {
        fn create_checkout(
            &self,
            product: &Product,
            _customer_email: &str,
            session_id: &str,
        ) -> Result<ProviderCheckout> {
            Ok(ProviderCheckout {
                url: format!("https://pay.test/{}/{}", product.id, session_id),
                reference: "ref_test".to_string(),
            })
        }
    }

    fn setup() -> (TempDir, Arc<Store>, CheckoutBridge, Catalog) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("test.redb")).unwrap());
        let config = ServiceConfig::default();
        let pipeline = Arc::new(Pipeline::new(Arc::clone(&store), config.clone()));
        let bridge = CheckoutBridge::new(
            Arc::clone(&store),
            pipeline,
            Arc::new(RecordingProvider),
            config,
        );
        (dir, store, bridge, Catalog::builtin())
    }

    /// Build a completed session in memory, then persist it.
    fn completed_session(store: &Store, product_id: &str) -> Session {
        let mut session = Session::new(product_id);
        let cfg = ServiceConfig::default();
        for answer in [
            "Ada",
            "7",
            "Freezes up on subtraction with borrowing",
            "yes",
            "Dinosaurs",
            "Stories",
            "Confidence, keep it playful",
            "yes",
        ] {
            session.apply_answer(answer, &cfg);
        }
        store.insert_session(&session).unwrap();
        session
    }

    #[test]
    fn payment_path_redirects_without_creating_an_order() {
        let (_dir, store, bridge, catalog) = setup();
        let session = completed_session(&store, "custom-lesson-audio");

        let start = bridge
            .begin_checkout(
                &catalog,
                "custom-lesson-audio",
                &session.id,
                Some("parent@example.com"),
                None,
            )
            .unwrap();
        match start {
            CheckoutStart::Redirect { checkout_url } => {
                assert!(checkout_url.contains("custom-lesson-audio"));
            }
            other => panic!("expected redirect, got {other:?}"),
        }
        assert!(store.list_orders().unwrap().is_empty());
    }

    #[test]
    fn incomplete_session_cannot_check_out() {
        let (_dir, store, bridge, catalog) = setup();
        let session = Session::new("custom-lesson-audio");
        store.insert_session(&session).unwrap();

        assert!(matches!(
            bridge.begin_checkout(
                &catalog,
                "custom-lesson-audio",
                &session.id,
                Some("parent@example.com"),
                None,
            ),
            Err(CoreError::SessionIncomplete(_))
        ));
    }

    #[test]
    fn gift_code_path_creates_the_order_directly() {
        let (_dir, store, bridge, catalog) = setup();
        let session = completed_session(&store, "custom-lesson-audio");
        let gift = bridge
            .registry()
            .issue("custom-lesson-audio", "purchase-1")
            .unwrap();

        let start = bridge
            .begin_checkout(
                &catalog,
                "custom-lesson-audio",
                &session.id,
                None,
                Some(&gift.code),
            )
            .unwrap();
        let order_id = match start {
            CheckoutStart::Order { order_id } => order_id,
            other => panic!("expected order, got {other:?}"),
        };
        let order = store.load_order(&order_id).unwrap();
        assert_eq!(order.source_session_id.as_deref(), Some(session.id.as_str()));
    }

    #[test]
    fn confirm_payment_creates_order_and_optionally_issues_gift() {
        let (_dir, store, bridge, catalog) = setup();
        let session = completed_session(&store, "custom-lesson-audio");

        let (order, gift) = bridge
            .confirm_payment(
                &catalog,
                "custom-lesson-audio",
                &session.id,
                "parent@example.com",
                "pay_123",
                true,
            )
            .unwrap();
        let gift = gift.expect("giftable product bought as gift issues a code");
        assert_eq!(gift.product_id, "custom-lesson-audio");
        assert_eq!(gift.issued_for_order_id, order.id);

        // Non-gift purchase issues nothing.
        let session2 = completed_session(&store, "custom-lesson-audio");
        let (_, gift2) = bridge
            .confirm_payment(
                &catalog,
                "custom-lesson-audio",
                &session2.id,
                "parent@example.com",
                "pay_456",
                false,
            )
            .unwrap();
        assert!(gift2.is_none());
    }

    #[test]
    fn email_and_gift_code_together_are_rejected() {
        let (_dir, store, bridge, catalog) = setup();
        let session = completed_session(&store, "custom-lesson-audio");
        assert!(matches!(
            bridge.begin_checkout(
                &catalog,
                "custom-lesson-audio",
                &session.id,
                Some("parent@example.com"),
                Some("GIFT-AB12-CD34"),
            ),
            Err(CoreError::InvalidCheckout(_))
        ));
    }
}
