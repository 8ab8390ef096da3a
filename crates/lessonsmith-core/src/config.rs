use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Tunables for the intake engine, the pipeline orchestrator, and the gift
/// code registry. Loaded once at startup and passed by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Minutes of inactivity after which a session rejects further answers.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_minutes: u32,

    /// Consecutive validation failures tolerated per phase before the
    /// best-effort answer is accepted and the phase advances anyway.
    #[serde(default = "default_phase_retry_limit")]
    pub phase_retry_limit: u32,

    /// Automatic retries per pipeline stage before an order is failed.
    #[serde(default = "default_stage_retry_budget")]
    pub stage_retry_budget: u32,

    /// Minutes an order may sit in a non-terminal stage with no worker
    /// report before the watchdog forces it to failed.
    #[serde(default = "default_stalled_order_minutes")]
    pub stalled_order_minutes: u32,

    /// Days until an issued gift code expires.
    #[serde(default = "default_gift_code_ttl")]
    pub gift_code_ttl_days: u32,

    /// Base URL for the hosted payment page handed to customers.
    #[serde(default = "default_checkout_url_base")]
    pub checkout_url_base: String,
}

fn default_session_timeout() -> u32 {
    45
}

fn default_phase_retry_limit() -> u32 {
    3
}

fn default_stage_retry_budget() -> u32 {
    2
}

fn default_stalled_order_minutes() -> u32 {
    120
}

fn default_gift_code_ttl() -> u32 {
    365
}

fn default_checkout_url_base() -> String {
    "https://pay.lessonsmith.app/checkout".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            session_timeout_minutes: default_session_timeout(),
            phase_retry_limit: default_phase_retry_limit(),
            stage_retry_budget: default_stage_retry_budget(),
            stalled_order_minutes: default_stalled_order_minutes(),
            gift_code_ttl_days: default_gift_code_ttl(),
            checkout_url_base: default_checkout_url_base(),
        }
    }
}

impl ServiceConfig {
    /// Load config from a YAML file, falling back to defaults when the file
    /// does not exist. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let config: ServiceConfig = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.session_timeout_minutes))
    }

    pub fn stalled_order_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.stalled_order_minutes))
    }

    pub fn gift_code_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.gift_code_ttl_days))
    }
}
