//! Error taxonomy for order submission.
//!
//! Every failure surfaced by the processor is an [`OrderError`], classified
//! into a client or server [`Fault`] so callers can tell retryable
//! infrastructure failures from data errors. SQLite constraint violations
//! are mapped to their business meaning (missing data, duplicate order
//! number, invalid reference) instead of leaking raw store errors.

use rusqlite::ffi;
use thiserror::Error;

/// Stable fault category attached to every [`OrderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The submission itself is at fault; resubmitting unchanged will fail again.
    Client,
    /// The store or session failed; the same submission may succeed on retry.
    Server,
}

impl Fault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fault::Client => "client",
            Fault::Server => "server",
        }
    }
}

#[derive(Debug, Error)]
pub enum OrderError {
    /// The payload could not be parsed into a known submission shape
    /// (unknown status tag, malformed field, out-of-range order type).
    #[error("invalid order payload: {0}")]
    InvalidPayload(String),

    /// UPDATED referenced an order number with no stored header.
    #[error("order {0} not found")]
    OrderNotFound(i64),

    /// A NOT NULL constraint fired: the submission omitted required data.
    #[error("missing required data: {0}")]
    MissingData(String),

    /// A UNIQUE or PRIMARY KEY constraint fired, typically a duplicate
    /// order number or a repeated line sequence number.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// A FOREIGN KEY constraint fired: the submission referenced a row
    /// that does not exist.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Any other store failure, kept with the statement context it came from.
    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// The session could not be acquired from the connection provider.
    #[error("session unavailable: {0}")]
    Session(String),
}

impl OrderError {
    /// Classify this error for the caller.
    pub fn fault(&self) -> Fault {
        match self {
            OrderError::InvalidPayload(_)
            | OrderError::OrderNotFound(_)
            | OrderError::MissingData(_)
            | OrderError::Duplicate(_)
            | OrderError::InvalidReference(_) => Fault::Client,
            OrderError::Store { .. } | OrderError::Session(_) => Fault::Server,
        }
    }

    /// Map a store error, keeping `context` the way statement-level
    /// `map_err(|e| format!("context: {e}"))` did before the typed taxonomy.
    ///
    /// Constraint violations become their business-level variants; anything
    /// else stays a server-fault [`OrderError::Store`].
    pub fn store(context: &'static str) -> impl FnOnce(rusqlite::Error) -> OrderError {
        move |source| {
            let mapped = match &source {
                rusqlite::Error::SqliteFailure(err, msg) => {
                    let detail = msg.clone().unwrap_or_else(|| err.to_string());
                    match err.extended_code {
                        ffi::SQLITE_CONSTRAINT_NOTNULL => {
                            Some(OrderError::MissingData(format!("{context}: {detail}")))
                        }
                        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                            Some(OrderError::Duplicate(format!("{context}: {detail}")))
                        }
                        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                            Some(OrderError::InvalidReference(format!("{context}: {detail}")))
                        }
                        _ => None,
                    }
                }
                _ => None,
            };
            mapped.unwrap_or(OrderError::Store { context, source })
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
