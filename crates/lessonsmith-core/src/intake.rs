use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// IntakeRecord
// ---------------------------------------------------------------------------

/// Immutable snapshot of a completed session's collected fields. This is
/// what the checkout bridge hands to the pipeline; the session itself stays
/// behind for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeRecord {
    /// Session the snapshot was taken from, if intake ran (remakes reuse
    /// the parent's intake and carry no session of their own).
    pub session_id: Option<String>,
    pub fields: BTreeMap<String, String>,
    pub captured_at: DateTime<Utc>,
}

impl IntakeRecord {
    pub fn new(session_id: Option<String>, fields: BTreeMap<String, String>) -> Self {
        Self {
            session_id,
            fields,
            captured_at: Utc::now(),
        }
    }

    /// Derive a remake intake: the parent's fields with `adjustments`
    /// overriding specific entries (e.g. tone). The remake carries no
    /// session of its own.
    pub fn merged(&self, adjustments: &BTreeMap<String, String>) -> Self {
        let mut fields = self.fields.clone();
        for (k, v) in adjustments {
            fields.insert(k.clone(), v.clone());
        }
        Self {
            session_id: None,
            fields,
            captured_at: Utc::now(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}
