//! Order number allocation.
//!
//! Numbers come from the single-row `order_sequence` table, read and bumped
//! inside the caller's transaction; `BEGIN IMMEDIATE` holds the write lock,
//! so two submissions cannot compute the same candidate. A rolled-back
//! submission also rolls back the bump, keeping the sequence gap-free.
//!
//! The store is never trusted to expose a generated key directly: after a
//! header or snapshot insert, the authoritative id is read back.

use rusqlite::{params, Connection};

use crate::error::OrderError;

/// Take the next order number from the sequence.
pub(crate) fn allocate_order_no(conn: &Connection) -> Result<i64, OrderError> {
    let next: i64 = conn
        .query_row(
            "SELECT next_no FROM order_sequence WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .map_err(OrderError::store("read order sequence"))?;

    conn.execute(
        "UPDATE order_sequence SET next_no = ?1 WHERE id = 1",
        params![next + 1],
    )
    .map_err(OrderError::store("bump order sequence"))?;

    Ok(next)
}

/// Read back the authoritative id of the header just written, keyed on
/// (date, time, customer), most recent first.
pub(crate) fn rederive_order_no(
    conn: &Connection,
    date: &str,
    time: &str,
    customer_id: i64,
) -> Result<i64, OrderError> {
    conn.query_row(
        "SELECT order_no FROM orders
         WHERE order_date = ?1 AND order_time = ?2 AND customer_id = ?3
         ORDER BY order_no DESC LIMIT 1",
        params![date, time, customer_id],
        |row| row.get(0),
    )
    .map_err(OrderError::store("re-derive order number"))
}

/// Read back the id of the kitchen-ticket snapshot just written.
pub(crate) fn latest_kot_no(conn: &Connection, order_no: i64) -> Result<i64, OrderError> {
    conn.query_row(
        "SELECT kot_no FROM kot_orders WHERE order_no = ?1 ORDER BY kot_no DESC LIMIT 1",
        params![order_no],
        |row| row.get(0),
    )
    .map_err(OrderError::store("re-derive kot number"))
}

// ===========================================================================
// Tests
// ===========================================================================
