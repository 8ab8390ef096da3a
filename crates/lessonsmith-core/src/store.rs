//! Persistent storage for sessions, orders, and gift codes using redb.
//!
//! Every entity is stored as JSON under a string key in its own table.
//! redb has a single writer, so each write transaction below is an atomic
//! critical section; the two invariants that depend on this are gift-code
//! redemption (`redeem_and_create_order`, redeem + order insert
//! all-or-nothing) and remake creation (`create_remake`, parent stamp +
//! child insert all-or-nothing). Session saves additionally carry a
//! version compare-and-set so concurrent answers for one session cannot
//! interleave.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{CoreError, Result};
use crate::giftcode::GiftCode;
use crate::order::Order;
use crate::session::Session;
use crate::types::GiftCodeStatus;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");
const ORDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");
const GIFT_CODES: TableDefinition<&str, &[u8]> = TableDefinition::new("gift_codes");

fn store_err(e: impl std::fmt::Display) -> CoreError {
    CoreError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct Store {
    db: Database,
}

impl Store {
    /// Open or create the redb database at `path`, ensuring all tables
    /// exist before any reads.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(SESSIONS).map_err(store_err)?;
        wt.open_table(ORDERS).map_err(store_err)?;
        wt.open_table(GIFT_CODES).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    // -- sessions -----------------------------------------------------------

    pub fn insert_session(&self, session: &Session) -> Result<()> {
        let value = serde_json::to_vec(session)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(SESSIONS).map_err(store_err)?;
            table
                .insert(session.id.as_str(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    pub fn load_session(&self, id: &str) -> Result<Session> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(SESSIONS).map_err(store_err)?;
        let guard = table
            .get(id)
            .map_err(store_err)?
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))?;
        Ok(serde_json::from_slice(guard.value())?)
    }

    /// Save a mutated session, but only if the stored version still equals
    /// `expected_version`. The stored copy gets `expected_version + 1`, so
    /// of two concurrent saves from the same load exactly one wins; the
    /// loser gets a retryable `SessionBusy`.
    pub fn save_session(&self, session: &Session, expected_version: u64) -> Result<()> {
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(SESSIONS).map_err(store_err)?;
            let stored: Session = {
                let guard = table
                    .get(session.id.as_str())
                    .map_err(store_err)?
                    .ok_or_else(|| CoreError::SessionNotFound(session.id.clone()))?;
                serde_json::from_slice(guard.value())?
            };
            if stored.version != expected_version {
                return Err(CoreError::SessionBusy(session.id.clone()));
            }
            let mut updated = session.clone();
            updated.version = expected_version + 1;
            let value = serde_json::to_vec(&updated)?;
            table
                .insert(session.id.as_str(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    // -- orders -------------------------------------------------------------

    pub fn insert_order(&self, order: &Order) -> Result<()> {
        let value = serde_json::to_vec(order)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(ORDERS).map_err(store_err)?;
            table
                .insert(order.id.as_str(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    pub fn load_order(&self, id: &str) -> Result<Order> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ORDERS).map_err(store_err)?;
        let guard = table
            .get(id)
            .map_err(store_err)?
            .ok_or_else(|| CoreError::OrderNotFound(id.to_string()))?;
        Ok(serde_json::from_slice(guard.value())?)
    }

    /// Read-modify-write an order inside one write transaction. If the
    /// closure errors, the transaction is abandoned and the order is left
    /// untouched.
    pub fn update_order<R>(&self, id: &str, f: impl FnOnce(&mut Order) -> Result<R>) -> Result<R> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let result;
        {
            let mut table = wt.open_table(ORDERS).map_err(store_err)?;
            let mut order: Order = {
                let guard = table
                    .get(id)
                    .map_err(store_err)?
                    .ok_or_else(|| CoreError::OrderNotFound(id.to_string()))?;
                serde_json::from_slice(guard.value())?
            };
            result = f(&mut order)?;
            let value = serde_json::to_vec(&order)?;
            table.insert(id, value.as_slice()).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(result)
    }

    /// All orders, newest first. Used by the stall watchdog.
    pub fn list_orders(&self) -> Result<Vec<Order>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ORDERS).map_err(store_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            result.push(serde_json::from_slice::<Order>(v.value())?);
        }
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    // -- gift codes ---------------------------------------------------------

    pub fn insert_gift_code(&self, gift: &GiftCode) -> Result<()> {
        let value = serde_json::to_vec(gift)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(GIFT_CODES).map_err(store_err)?;
            table
                .insert(gift.code.as_str(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    pub fn load_gift_code(&self, code: &str) -> Result<GiftCode> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(GIFT_CODES).map_err(store_err)?;
        let guard = table
            .get(code)
            .map_err(store_err)?
            .ok_or(CoreError::GiftCodeInvalid)?;
        Ok(serde_json::from_slice(guard.value())?)
    }

    /// Atomic check-and-set redemption: verify the code is unredeemed,
    /// unexpired, and issued for the order's product, then mark it redeemed,
    /// bind the redeeming order id, and insert the order — all in one write
    /// transaction. Two concurrent redemptions of the same code serialize on
    /// redb's single writer; the loser observes `Redeemed` and fails.
    pub fn redeem_and_create_order(
        &self,
        code: &str,
        order: &Order,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut codes = wt.open_table(GIFT_CODES).map_err(store_err)?;
            let mut gift: GiftCode = {
                let guard = codes
                    .get(code)
                    .map_err(store_err)?
                    .ok_or(CoreError::GiftCodeInvalid)?;
                serde_json::from_slice(guard.value())?
            };
            match gift.status {
                GiftCodeStatus::Redeemed => return Err(CoreError::GiftCodeAlreadyRedeemed),
                GiftCodeStatus::Expired => return Err(CoreError::GiftCodeExpired),
                GiftCodeStatus::Unredeemed => {}
            }
            if gift.expires_at < now {
                return Err(CoreError::GiftCodeExpired);
            }
            if gift.product_id != order.product_id {
                return Err(CoreError::GiftCodeInvalid);
            }
            gift.status = GiftCodeStatus::Redeemed;
            gift.redeemed_by_order_id = Some(order.id.clone());
            gift.redeemed_at = Some(now);
            let gift_value = serde_json::to_vec(&gift)?;
            codes
                .insert(code, gift_value.as_slice())
                .map_err(store_err)?;

            let mut orders = wt.open_table(ORDERS).map_err(store_err)?;
            let order_value = serde_json::to_vec(order)?;
            orders
                .insert(order.id.as_str(), order_value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    /// Atomically stamp `remake_order_id` on the parent and insert the
    /// remake order. Re-checks eligibility inside the transaction so two
    /// racing remake requests cannot both succeed.
    pub fn create_remake(&self, parent_id: &str, remake: &Order) -> Result<()> {
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(ORDERS).map_err(store_err)?;
            let mut parent: Order = {
                let guard = table
                    .get(parent_id)
                    .map_err(store_err)?
                    .ok_or_else(|| CoreError::OrderNotFound(parent_id.to_string()))?;
                serde_json::from_slice(guard.value())?
            };
            if !parent.status.is_fulfilled() {
                return Err(CoreError::RemakeUnavailable {
                    order: parent_id.to_string(),
                    status: parent.status.to_string(),
                });
            }
            if let Some(existing) = parent.remake_order_id {
                return Err(CoreError::RemakeAlreadyUsed {
                    order: parent_id.to_string(),
                    remake: existing,
                });
            }
            parent.remake_order_id = Some(remake.id.clone());
            let parent_value = serde_json::to_vec(&parent)?;
            table
                .insert(parent_id, parent_value.as_slice())
                .map_err(store_err)?;
            let remake_value = serde_json::to_vec(remake)?;
            table
                .insert(remake.id.as_str(), remake_value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
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
    use crate::types::{OrderStatus, ProductKind};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("test.redb")).unwrap();
        (dir, store)
    }

    fn sample_order(product_id: &str) -> Order {
        Order::new(
            product_id,
            ProductKind::AudioOnly,
            "parent@example.com",
            Authorization::Payment {
                reference: "pay_1".to_string(),
            },
            IntakeRecord::new(None, BTreeMap::new()),
        )
    }

    #[test]
    fn session_roundtrip() {
        let (_dir, store) = open_tmp();
        let session = Session::new("custom-lesson-audio");
        store.insert_session(&session).unwrap();
        let loaded = store.load_session(&session.id).unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.version, 0);
    }

    #[test]
    fn save_session_bumps_version() {
        let (_dir, store) = open_tmp();
        let session = Session::new("custom-lesson-audio");
        store.insert_session(&session).unwrap();
        store.save_session(&session, 0).unwrap();
        assert_eq!(store.load_session(&session.id).unwrap().version, 1);
    }

    #[test]
    fn save_session_rejects_stale_version() {
        let (_dir, store) = open_tmp();
        let session = Session::new("custom-lesson-audio");
        store.insert_session(&session).unwrap();
        store.save_session(&session, 0).unwrap();
        assert!(matches!(
            store.save_session(&session, 0),
            Err(CoreError::SessionBusy(_))
        ));
    }

    #[test]
    fn update_order_aborts_on_closure_error() {
        let (_dir, store) = open_tmp();
        let order = sample_order("custom-lesson-audio");
        store.insert_order(&order).unwrap();

        let result: Result<()> = store.update_order(&order.id, |o| {
            o.status = OrderStatus::Failed;
            Err(CoreError::Store("boom".to_string()))
        });
        assert!(result.is_err());
        // Mutation was rolled back with the transaction.
        let reloaded = store.load_order(&order.id).unwrap();
        assert_eq!(reloaded.status, OrderStatus::Queued);
    }

    #[test]
    fn redeem_unknown_code_is_invalid() {
        let (_dir, store) = open_tmp();
        let order = sample_order("custom-lesson-audio");
        let err = store
            .redeem_and_create_order("GIFT-AAAA-AAAA", &order, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::GiftCodeInvalid));
        // No order was created.
        assert!(store.load_order(&order.id).is_err());
    }

    #[test]
    fn create_remake_requires_fulfilled_parent() {
        let (_dir, store) = open_tmp();
        let parent = sample_order("custom-lesson-audio");
        store.insert_order(&parent).unwrap();

        let remake = sample_order("custom-lesson-audio");
        assert!(matches!(
            store.create_remake(&parent.id, &remake),
            Err(CoreError::RemakeUnavailable { .. })
        ));
    }

    #[test]
    fn create_remake_is_single_use() {
        let (_dir, store) = open_tmp();
        let mut parent = sample_order("custom-lesson-audio");
        parent.status = OrderStatus::Completed;
        store.insert_order(&parent).unwrap();

        let first = sample_order("custom-lesson-audio");
        store.create_remake(&parent.id, &first).unwrap();
        assert_eq!(
            store.load_order(&parent.id).unwrap().remake_order_id,
            Some(first.id.clone())
        );

        let second = sample_order("custom-lesson-audio");
        match store.create_remake(&parent.id, &second) {
            Err(CoreError::RemakeAlreadyUsed { remake, .. }) => assert_eq!(remake, first.id),
            other => panic!("expected RemakeAlreadyUsed, got {other:?}"),
        }
        // The losing remake was never persisted.
        assert!(store.load_order(&second.id).is_err());
    }
}
