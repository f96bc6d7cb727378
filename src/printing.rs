//! Printer routing for order lines.
//!
//! Every submission recomputes the full routing pass for its order: old
//! assignments are dropped and each line is routed to the printer configured
//! on its menu item. Lines whose item has no printer configured (or no menu
//! row at all) fall back to the submission's default, which is the order
//! printer for billing paths and the kitchen printer for KOT.

use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::OrderError;
use crate::submission::SubmittedItem;

/// Replace the order's printer assignments from the submitted lines.
/// Returns the number of assignment rows written.
pub(crate) fn reassign_printers(
    conn: &Connection,
    order_no: i64,
    items: &[SubmittedItem],
    default_printer: &str,
) -> Result<usize, OrderError> {
    conn.execute(
        "DELETE FROM printer_assignments WHERE order_no = ?1",
        params![order_no],
    )
    .map_err(OrderError::store("clear printer assignments"))?;

    for item in items {
        let printer = routed_printer(conn, item.item_code)?;
        conn.execute(
            "INSERT INTO printer_assignments (order_no, sl_no, item_code, printer)
             VALUES (?1, ?2, ?3, ?4)",
            params![order_no, item.sl_no, item.item_code, printer],
        )
        .map_err(OrderError::store("insert printer assignment"))?;
    }

    let backfilled = conn
        .execute(
            "UPDATE printer_assignments SET printer = ?1 WHERE order_no = ?2 AND printer = ''",
            params![default_printer, order_no],
        )
        .map_err(OrderError::store("backfill default printer"))?;
    if backfilled > 0 {
        debug!(order_no, backfilled, printer = %default_printer, "Routed lines to default printer");
    }

    Ok(items.len())
}

/// The printer configured on the item's menu row, or empty when the item is
/// unknown or unconfigured.
fn routed_printer(conn: &Connection, item_code: i64) -> Result<String, OrderError> {
    match conn.query_row(
        "SELECT printer FROM menu_items WHERE code = ?1",
        params![item_code],
        |row| row.get::<_, String>(0),
    ) {
        Ok(printer) => Ok(printer),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(String::new()),
        Err(e) => Err(OrderError::store("look up item printer")(e)),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
