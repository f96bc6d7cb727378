//! Processor configuration.
//!
//! The processor consumes three opaque labels from its environment: the
//! default order-printer name backfilled for NEW/UPDATED routing, the
//! kitchen-printer name backfilled for KOT routing, and the counter label
//! under which the terminal stages seat selections.

use std::env;

/// Labels consumed by the order processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Default printer label for NEW/UPDATED line routing.
    pub order_printer: String,
    /// Default printer label for KOT line routing.
    pub kitchen_printer: String,
    /// Counter/session label scoping staged seat selections.
    pub counter: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            order_printer: "CASHIER".to_string(),
            kitchen_printer: "KITCHEN".to_string(),
            counter: "COUNTER1".to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Read configuration from the environment, falling back to the
    /// defaults for any unset or empty variable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            order_printer: env_or("POS_ORDER_PRINTER", defaults.order_printer),
            kitchen_printer: env_or("POS_KITCHEN_PRINTER", defaults.kitchen_printer),
            counter: env_or("POS_COUNTER", defaults.counter),
        }
    }
}

fn env_or(key: &str, fallback: String) -> String {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
