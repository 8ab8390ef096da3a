//! Gift code registry.
//!
//! Codes are single-use tokens tied to one product. Issuance happens when a
//! qualifying gift purchase completes; redemption happens atomically with
//! the creation of the redeeming order (`Store::redeem_and_create_order`),
//! so no two orders can ever hold the same code. Expiry is checked at
//! redemption time, never swept.

use crate::config::ServiceConfig;
use crate::error::{CoreError, Result};
use crate::store::Store;
use crate::types::GiftCodeStatus;
use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Code alphabet without lookalikes (no I, O, 0, 1) — these get typed from
/// a greeting card.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

fn code_shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    SHAPE.get_or_init(|| Regex::new(r"^GIFT-[A-Z0-9]{4}-[A-Z0-9]{4}$").expect("valid regex"))
}

// ---------------------------------------------------------------------------
// GiftCode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftCode {
    /// Normalized (upper-case) token, `GIFT-XXXX-XXXX`.
    pub code: String,
    pub product_id: String,
    /// The purchase that paid for this code.
    pub issued_for_order_id: String,
    pub status: GiftCodeStatus,
    pub redeemed_by_order_id: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Normalize a user-typed code and fast-fail on shape before any lookup.
/// Codes are case-insensitive; stray whitespace is forgiven.
pub fn normalize_code(raw: &str) -> Result<String> {
    let candidate = raw.trim().to_uppercase();
    if !code_shape().is_match(&candidate) {
        return Err(CoreError::GiftCodeInvalid);
    }
    Ok(candidate)
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let mut group = || -> String {
        (0..4)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    };
    let first = group();
    let second = group();
    format!("GIFT-{first}-{second}")
}

// ---------------------------------------------------------------------------
// GiftCodeRegistry
// ---------------------------------------------------------------------------

pub struct GiftCodeRegistry {
    store: Arc<Store>,
    config: ServiceConfig,
}

impl GiftCodeRegistry {
    pub fn new(store: Arc<Store>, config: ServiceConfig) -> Self {
        Self { store, config }
    }

    /// Issue a fresh unredeemed code for `product_id`, paid for by
    /// `issued_for_order_id`.
    pub fn issue(&self, product_id: &str, issued_for_order_id: &str) -> Result<GiftCode> {
        let now = Utc::now();
        let gift = GiftCode {
            code: generate_code(),
            product_id: product_id.to_string(),
            issued_for_order_id: issued_for_order_id.to_string(),
            status: GiftCodeStatus::Unredeemed,
            redeemed_by_order_id: None,
            issued_at: now,
            redeemed_at: None,
            expires_at: now + self.config.gift_code_ttl(),
        };
        self.store.insert_gift_code(&gift)?;
        tracing::info!(code = %gift.code, product = product_id, "gift code issued");
        Ok(gift)
    }

    /// Look up a code by its user-typed form. Shape rejection happens
    /// before the store is touched.
    pub fn lookup(&self, raw: &str) -> Result<GiftCode> {
        let code = normalize_code(raw)?;
        self.store.load_gift_code(&code)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::IntakeRecord;
    use crate::order::{Authorization, Order};
    use crate::types::ProductKind;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn registry() -> (TempDir, Arc<Store>, GiftCodeRegistry) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("test.redb")).unwrap());
        let registry = GiftCodeRegistry::new(Arc::clone(&store), ServiceConfig::default());
        (dir, store, registry)
    }

    fn order_for(product_id: &str) -> Order {
        Order::new(
            product_id,
            ProductKind::AudioOnly,
            "gift-recipient",
            Authorization::GiftCode {
                code: "placeholder".to_string(),
            },
            IntakeRecord::new(None, BTreeMap::new()),
        )
    }

    #[test]
    fn issued_codes_match_the_published_shape() {
        let (_dir, _store, registry) = registry();
        for _ in 0..20 {
            let gift = registry.issue("custom-lesson-audio", "order-1").unwrap();
            assert!(normalize_code(&gift.code).is_ok(), "bad code {}", gift.code);
            assert_eq!(gift.status, GiftCodeStatus::Unredeemed);
            assert!(gift.expires_at > gift.issued_at);
        }
    }

    #[test]
    fn normalize_is_case_insensitive() {
        assert_eq!(normalize_code(" gift-ab12-cd34 ").unwrap(), "GIFT-AB12-CD34");
    }

    #[test]
    fn malformed_codes_fail_before_lookup() {
        for raw in ["", "GIFT-ABCD", "CARD-AB12-CD34", "GIFT-AB1-CD34", "GIFT-AB12-CD345"] {
            assert!(
                matches!(normalize_code(raw), Err(CoreError::GiftCodeInvalid)),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn redeem_binds_exactly_one_order() {
        let (_dir, store, registry) = registry();
        let gift = registry.issue("custom-lesson-audio", "order-1").unwrap();

        let first = order_for("custom-lesson-audio");
        store
            .redeem_and_create_order(&gift.code, &first, Utc::now())
            .unwrap();

        let second = order_for("custom-lesson-audio");
        assert!(matches!(
            store.redeem_and_create_order(&gift.code, &second, Utc::now()),
            Err(CoreError::GiftCodeAlreadyRedeemed)
        ));

        let stored = registry.lookup(&gift.code).unwrap();
        assert_eq!(stored.status, GiftCodeStatus::Redeemed);
        assert_eq!(stored.redeemed_by_order_id, Some(first.id));
        assert!(store.load_order(&second.id).is_err());
    }

    #[test]
    fn redeem_rejects_wrong_product() {
        let (_dir, store, registry) = registry();
        let gift = registry.issue("custom-lesson-audio", "order-1").unwrap();
        let order = order_for("custom-lesson-video");
        assert!(matches!(
            store.redeem_and_create_order(&gift.code, &order, Utc::now()),
            Err(CoreError::GiftCodeInvalid)
        ));
    }

    #[test]
    fn redeem_rejects_expired_code() {
        let (_dir, store, registry) = registry();
        let mut gift = registry.issue("custom-lesson-audio", "order-1").unwrap();
        gift.expires_at = Utc::now() - chrono::Duration::days(1);
        store.insert_gift_code(&gift).unwrap();

        let order = order_for("custom-lesson-audio");
        assert!(matches!(
            store.redeem_and_create_order(&gift.code, &order, Utc::now()),
            Err(CoreError::GiftCodeExpired)
        ));
    }

    /// Fifty threads race to redeem the same code; exactly one may win.
    #[test]
    fn concurrent_redemptions_admit_exactly_one_winner() {
        let (_dir, store, registry) = registry();
        let gift = registry.issue("custom-lesson-audio", "order-1").unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            let code = gift.code.clone();
            handles.push(std::thread::spawn(move || {
                let order = order_for("custom-lesson-audio");
                store
                    .redeem_and_create_order(&code, &order, Utc::now())
                    .is_ok()
            }));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1, "exactly one concurrent redemption may succeed");

        let stored = registry.lookup(&gift.code).unwrap();
        assert_eq!(stored.status, GiftCodeStatus::Redeemed);
        assert!(stored.redeemed_by_order_id.is_some());
    }
}
