//! pos-order-core - Order Transaction Processor
//!
//! This crate is the order-management core of a restaurant point-of-sale
//! backend. It accepts one submitted order payload (new sale, amendment, or
//! kitchen ticket), reconciles it against customer, table/seat, and menu
//! state, and records it as one atomic set of SQLite writes. The HTTP
//! boundary, authentication, and reporting queries live elsewhere; they hand
//! this crate a parsed payload and get back a receipt or a typed error.
//!
//! ```no_run
//! use pos_order_core::{db, parse_submission, submit_order, ProcessorConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = db::init(std::path::Path::new("./data"))?;
//! let cfg = ProcessorConfig::from_env();
//!
//! let payload = serde_json::json!({
//!     "status": "NEW", "orderNo": 0,
//!     "date": "2024-03-01", "time": "19:45", "option": 2,
//!     "tableId": 5, "selectedSeats": [12, 13], "total": 19.0,
//!     "items": [{ "itemCode": 101, "slNo": 1, "qty": 2.0,
//!                 "rate": 9.5, "amount": 19.0, "itemName": "Chicken Mandi" }],
//! });
//! let submission = parse_submission(&payload)?;
//!
//! let conn = store.session()?;
//! let receipt = submit_order(&conn, &cfg, &submission)?;
//! println!("saved order {}", receipt.order_no);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod config;
pub mod db;
pub mod error;
pub mod submission;

mod customers;
mod numbering;
mod orders;
mod printing;
mod seating;

pub use config::ProcessorConfig;
pub use db::Store;
pub use error::{Fault, OrderError};
pub use orders::submit_order;
pub use submission::{
    parse_submission, OrderDraft, OrderReceipt, OrderSubmission, OrderType, ReceiptDetails,
    SubmittedItem,
};

/// Initialize structured logging (console, plus a daily-rolling file when a
/// log directory is given). Call once at process start.
///
/// Honors `RUST_LOG`; defaults to info with debug for this crate.
pub fn init_tracing(log_dir: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pos_order_core=debug"));

    let file_layer = log_dir.map(|dir| {
        std::fs::create_dir_all(dir).ok();
        let file_appender = tracing_appender::rolling::daily(dir, "orders");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Dropping the guard flushes pending writes; the process keeps it
        // until exit.
        std::mem::forget(guard);
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
    });
    let console_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "Order processor v{} logging initialized",
        env!("CARGO_PKG_VERSION")
    );
}
