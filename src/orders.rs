//! Order submission workflows.
//!
//! [`submit_order`] is the single entry point: it wraps one submission in a
//! `BEGIN IMMEDIATE` transaction, resolves the customer first (every workflow
//! stores the resolved id on a header), branches on the submission status,
//! and commits. Any failure rolls the whole submission back; a rollback
//! failure is logged and never masks the original error.
//!
//! Line items and printer assignments are always replaced wholesale rather
//! than diffed. That guarantees no orphaned rows and keeps each branch a
//! straight sequence of writes.

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

use crate::config::ProcessorConfig;
use crate::customers;
use crate::error::OrderError;
use crate::numbering;
use crate::printing;
use crate::seating::{self, SeatSource};
use crate::submission::{
    OrderDraft, OrderReceipt, OrderSubmission, OrderType, ReceiptDetails, SubmittedItem,
};

/// Process one submission atomically and return its receipt.
///
/// All reads and writes happen inside a single `BEGIN IMMEDIATE`
/// transaction on the given connection, so the order-number sequence and
/// seat claims cannot interleave with another submission.
pub fn submit_order(
    conn: &Connection,
    cfg: &ProcessorConfig,
    submission: &OrderSubmission,
) -> Result<OrderReceipt, OrderError> {
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(OrderError::store("begin transaction"))?;

    let result = (|| -> Result<OrderReceipt, OrderError> {
        let customer_id = customers::resolve_customer(conn, submission.draft())?;
        match submission {
            OrderSubmission::New(draft) => insert_new_order(conn, cfg, draft, customer_id),
            OrderSubmission::Updated(draft) => apply_order_update(conn, cfg, draft, customer_id),
            OrderSubmission::Kot(draft) => record_kitchen_ticket(conn, cfg, draft, customer_id),
        }
    })();

    match result {
        Ok(receipt) => {
            conn.execute_batch("COMMIT")
                .map_err(OrderError::store("commit"))?;
            info!(
                order_no = receipt.order_no,
                customer_id = receipt.cust_id,
                status = %receipt.status,
                items = receipt.details.items_count,
                "Order submission committed"
            );
            Ok(receipt)
        }
        Err(e) => {
            if let Err(rb) = conn.execute_batch("ROLLBACK") {
                warn!(error = %rb, "Rollback failed after submission error");
            }
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// NEW
// ---------------------------------------------------------------------------

fn insert_new_order(
    conn: &Connection,
    cfg: &ProcessorConfig,
    draft: &OrderDraft,
    customer_id: i64,
) -> Result<OrderReceipt, OrderError> {
    let candidate = numbering::allocate_order_no(conn)?;
    let header_seat = draft.first_selected_seat();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO orders (
            order_no, order_date, order_time, order_type, customer_id,
            flat_no, address, contact, delivery_agent_id, table_id,
            table_label, seat_id, remarks, total, sold, status, kind,
            prefix, prefixed_no, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                  0, 'open', 'order', ?15, ?16, ?17, ?17)",
        params![
            candidate,
            draft.date,
            draft.time,
            draft.option.as_i64(),
            customer_id,
            draft.flat_no,
            draft.address,
            draft.contact,
            draft.delivery_boy_id,
            draft.table_id,
            draft.table_no,
            header_seat,
            draft.remarks,
            draft.total,
            draft.prefix,
            prefixed_no(&draft.prefix, candidate),
            now,
        ],
    )
    .map_err(OrderError::store("insert order header"))?;

    // The insert does not expose a generated key; the authoritative id is
    // read back on the header's own keys.
    let order_no = numbering::rederive_order_no(conn, &draft.date, &draft.time, customer_id)?;

    replace_order_lines(conn, order_no, &draft.items)?;
    printing::reassign_printers(conn, order_no, &draft.items, &cfg.order_printer)?;

    let source = seating::resolve_seat_source(draft, cfg);
    let claimed =
        seating::apply_seat_source(conn, order_no, draft.table_id, &source, &cfg.counter)?;
    if claimed > 0 {
        debug!(order_no, claimed, "Seats claimed");
    }
    if draft.option == OrderType::DineIn && draft.table_id > 0 {
        seating::refresh_table_status(conn, draft.table_id)?;
    }

    if let Some(held_id) = draft.holded_order {
        purge_held_order(conn, held_id)?;
    }

    Ok(build_receipt(
        order_no,
        customer_id,
        "NEW",
        format!("Order {order_no} saved"),
        draft,
    ))
}

// ---------------------------------------------------------------------------
// UPDATED
// ---------------------------------------------------------------------------

fn apply_order_update(
    conn: &Connection,
    cfg: &ProcessorConfig,
    draft: &OrderDraft,
    customer_id: i64,
) -> Result<OrderReceipt, OrderError> {
    let order_no = draft.order_no;
    let (sold, stored_seat) = match conn.query_row(
        "SELECT sold, seat_id FROM orders WHERE order_no = ?1",
        params![order_no],
        |row| Ok((row.get::<_, i64>(0)? != 0, row.get::<_, Option<i64>>(1)?)),
    ) {
        Ok(row) => row,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(OrderError::OrderNotFound(order_no));
        }
        Err(e) => return Err(OrderError::store("look up order")(e)),
    };

    // A finalized order keeps its seat frozen no matter what the client sent.
    let header_seat = if sold {
        stored_seat
    } else {
        draft.first_selected_seat()
    };
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "UPDATE orders SET
            order_date = ?1, order_time = ?2, order_type = ?3, customer_id = ?4,
            flat_no = ?5, address = ?6, contact = ?7, delivery_agent_id = ?8,
            table_id = ?9, table_label = ?10, seat_id = ?11, remarks = ?12,
            total = ?13, status = 'open', kind = 'order', prefix = ?14,
            prefixed_no = ?15, updated_at = ?16
         WHERE order_no = ?17",
        params![
            draft.date,
            draft.time,
            draft.option.as_i64(),
            customer_id,
            draft.flat_no,
            draft.address,
            draft.contact,
            draft.delivery_boy_id,
            draft.table_id,
            draft.table_no,
            header_seat,
            draft.remarks,
            draft.total,
            draft.prefix,
            prefixed_no(&draft.prefix, order_no),
            now,
            order_no,
        ],
    )
    .map_err(OrderError::store("rewrite order header"))?;

    replace_order_lines(conn, order_no, &draft.items)?;
    printing::reassign_printers(conn, order_no, &draft.items, &cfg.order_printer)?;

    if !sold && draft.option == OrderType::DineIn {
        seating::release_order_seats(conn, order_no, draft.table_id)?;
        let source = SeatSource::Explicit(seating::valid_seat_ids(&draft.selected_seats));
        let claimed =
            seating::apply_seat_source(conn, order_no, draft.table_id, &source, &cfg.counter)?;
        debug!(order_no, claimed, "Seats reconciled");
        if draft.table_id > 0 {
            seating::refresh_table_status(conn, draft.table_id)?;
        }
    }

    Ok(build_receipt(
        order_no,
        customer_id,
        "UPDATED",
        format!("Order {order_no} updated"),
        draft,
    ))
}

// ---------------------------------------------------------------------------
// KOT
// ---------------------------------------------------------------------------

fn record_kitchen_ticket(
    conn: &Connection,
    cfg: &ProcessorConfig,
    draft: &OrderDraft,
    customer_id: i64,
) -> Result<OrderReceipt, OrderError> {
    let order_no = draft.order_no;
    let header_seat = draft.first_selected_seat();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO kot_orders (
            order_no, kot_date, kot_time, order_type, customer_id, contact,
            table_id, table_label, seat_id, remarks, total, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            order_no,
            draft.date,
            draft.time,
            draft.option.as_i64(),
            customer_id,
            draft.contact,
            draft.table_id,
            draft.table_no,
            header_seat,
            draft.remarks,
            draft.total,
            now,
        ],
    )
    .map_err(OrderError::store("insert kot header"))?;

    let kot_no = numbering::latest_kot_no(conn, order_no)?;

    for item in &draft.items {
        conn.execute(
            "INSERT INTO kot_items (
                kot_no, sl_no, item_code, item_name, localized_name,
                qty, rate, amount, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                kot_no,
                item.sl_no,
                item.item_code,
                item.item_name,
                item.arabic.as_deref().unwrap_or(""),
                item.qty,
                item.rate,
                item.amount,
                item.notes.as_deref().unwrap_or(""),
            ],
        )
        .map_err(OrderError::store("insert kot line"))?;
    }

    // Track the latest kitchen state on the live header without touching its
    // financial fields or line items. The header may not exist yet when the
    // kitchen is fired before billing; the update is then a no-op.
    conn.execute(
        "UPDATE orders SET
            table_id = ?1, table_label = ?2, seat_id = ?3, customer_id = ?4,
            contact = ?5, kind = 'kot', updated_at = ?6
         WHERE order_no = ?7",
        params![
            draft.table_id,
            draft.table_no,
            header_seat,
            customer_id,
            draft.contact,
            now,
            order_no,
        ],
    )
    .map_err(OrderError::store("update order kitchen state"))?;

    let occupied = seating::mark_seats_occupied(conn, &draft.selected_seats)?;
    if occupied > 0 {
        debug!(order_no, occupied, "Seats marked occupied for kitchen");
    }
    printing::reassign_printers(conn, order_no, &draft.items, &cfg.kitchen_printer)?;

    Ok(build_receipt(
        order_no,
        customer_id,
        "KOT",
        format!("KOT {kot_no} for order {order_no} sent"),
        draft,
    ))
}

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

/// Drop and reinsert every line of the order.
fn replace_order_lines(
    conn: &Connection,
    order_no: i64,
    items: &[SubmittedItem],
) -> Result<(), OrderError> {
    conn.execute(
        "DELETE FROM order_items WHERE order_no = ?1",
        params![order_no],
    )
    .map_err(OrderError::store("clear order lines"))?;

    for item in items {
        conn.execute(
            "INSERT INTO order_items (
                order_no, sl_no, item_code, item_name, qty, rate, amount,
                cost, vat, vat_amount, tax_ledger, localized_name, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                order_no,
                item.sl_no,
                item.item_code,
                item.item_name,
                item.qty,
                item.rate,
                item.amount,
                item.cost,
                item.vat,
                item.vat_amt,
                item.tax_ledger,
                item.arabic.as_deref().unwrap_or(""),
                item.notes.as_deref().unwrap_or(""),
            ],
        )
        .map_err(OrderError::store("insert order line"))?;
    }

    Ok(())
}

/// Remove a draft from the hold area once it has become a real order.
fn purge_held_order(conn: &Connection, held_id: i64) -> Result<(), OrderError> {
    conn.execute(
        "DELETE FROM held_order_items WHERE held_id = ?1",
        params![held_id],
    )
    .map_err(OrderError::store("purge held order items"))?;

    let removed = conn
        .execute("DELETE FROM held_orders WHERE id = ?1", params![held_id])
        .map_err(OrderError::store("purge held order"))?;
    if removed > 0 {
        debug!(held_id, "Held order purged");
    }

    Ok(())
}

fn prefixed_no(prefix: &str, order_no: i64) -> String {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        order_no.to_string()
    } else {
        format!("{prefix}{order_no}")
    }
}

fn build_receipt(
    order_no: i64,
    customer_id: i64,
    status: &str,
    message: String,
    draft: &OrderDraft,
) -> OrderReceipt {
    let customer_info = match draft.cust_name.trim() {
        "" => None,
        name => Some(name.to_string()),
    };
    let table_info = match draft.table_no.trim() {
        "" => None,
        label => Some(label.to_string()),
    };
    let seats = seating::valid_seat_ids(&draft.selected_seats);

    OrderReceipt {
        order_no,
        cust_id: customer_id,
        status: status.to_string(),
        message,
        details: ReceiptDetails {
            order_type: draft.option.label().to_string(),
            customer_info,
            table_info,
            selected_seats: if seats.is_empty() { None } else { Some(seats) },
            items_count: draft.items.len(),
            total: draft.total,
        },
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::Fault;
    use crate::submission::parse_submission;
    use rusqlite::Connection;
    use serde_json::{json, Value};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )
        .expect("pragma setup");
        db::run_migrations_for_test(&conn);
        conn
    }

    fn seed_dining_room(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO dining_tables (id, floor, code, name, capacity) VALUES
                (5, 'G', 'T5', 'Table 5', 4),
                (7, 'G', 'T7', 'Table 7', 2);
             INSERT INTO seats (id, table_id, label) VALUES
                (12, 5, 'S1'), (13, 5, 'S2'), (14, 5, 'S3'), (15, 5, 'S4'),
                (21, 7, 'A'), (22, 7, 'B');
             INSERT INTO menu_items (code, name, localized_name, printer) VALUES
                (101, 'Chicken Mandi', 'مندي دجاج', 'GRILL'),
                (102, 'Lime Juice', '', ''),
                (103, 'Hummus', '', 'COLD');",
        )
        .expect("seed dining room");
    }

    fn submit(conn: &Connection, payload: Value) -> Result<OrderReceipt, OrderError> {
        let submission = parse_submission(&payload).expect("parse submission");
        submit_order(conn, &ProcessorConfig::default(), &submission)
    }

    fn line(code: i64, sl_no: i64) -> Value {
        json!({
            "itemCode": code, "slNo": sl_no,
            "qty": 2.0, "rate": 9.5, "amount": 19.0,
            "itemName": "Chicken Mandi", "arabic": "مندي دجاج",
        })
    }

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |r| r.get(0)).unwrap()
    }

    // ------------------------------------------------------------------
    // NEW
    // ------------------------------------------------------------------

    #[test]
    fn test_new_dinein_end_to_end() {
        let conn = test_conn();
        seed_dining_room(&conn);

        let receipt = submit(
            &conn,
            json!({
                "status": "NEW", "orderNo": 0,
                "date": "2024-03-01", "time": "19:45", "option": 2,
                "tableId": 5, "tableNo": "T5", "total": 19.0,
                "selectedSeats": [12, 13],
                "items": [line(101, 1)],
            }),
        )
        .unwrap();

        assert_eq!(receipt.order_no, 1);
        assert_eq!(receipt.status, "NEW");
        assert_eq!(receipt.message, "Order 1 saved");
        assert_eq!(receipt.details.order_type, "Dine-In");
        assert_eq!(receipt.details.table_info.as_deref(), Some("T5"));
        assert_eq!(receipt.details.selected_seats, Some(vec![12, 13]));
        assert_eq!(receipt.details.items_count, 1);

        let (order_type, table_id, seat_id, sold): (i64, i64, Option<i64>, i64) = conn
            .query_row(
                "SELECT order_type, table_id, seat_id, sold FROM orders WHERE order_no = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(order_type, 2);
        assert_eq!(table_id, 5);
        assert_eq!(seat_id, Some(12), "header carries the first selected seat");
        assert_eq!(sold, 0);

        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM order_items WHERE order_no = 1"),
            1
        );
        let printer: String = conn
            .query_row(
                "SELECT printer FROM printer_assignments WHERE order_no = 1 AND sl_no = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(printer, "GRILL");

        assert_eq!(
            count(
                &conn,
                "SELECT COUNT(*) FROM seats WHERE id IN (12, 13) AND status = 1"
            ),
            2
        );
        let labels: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT seat_label FROM order_seats WHERE order_no = 1 ORDER BY seat_id")
                .unwrap();
            let rows = stmt.query_map([], |r| r.get(0)).unwrap();
            rows.filter_map(|r| r.ok()).collect()
        };
        assert_eq!(labels, vec!["S1".to_string(), "S2".to_string()]);

        // Two of four seats taken
        let status: String = conn
            .query_row("SELECT status FROM dining_tables WHERE id = 5", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(status, "partial");
    }

    #[test]
    fn test_order_numbers_strictly_increase() {
        let conn = test_conn();
        seed_dining_room(&conn);

        let payload = json!({
            "status": "NEW", "orderNo": 0,
            "date": "2024-03-01", "time": "12:00", "option": 3,
            "total": 19.0, "items": [line(101, 1)],
        });
        let first = submit(&conn, payload.clone()).unwrap();
        let second = submit(&conn, payload).unwrap();

        assert_eq!(first.order_no, 1);
        assert_eq!(second.order_no, 2);
    }

    #[test]
    fn test_lines_route_to_configured_printers() {
        let conn = test_conn();
        seed_dining_room(&conn);

        submit(
            &conn,
            json!({
                "status": "NEW", "orderNo": 0,
                "date": "2024-03-01", "time": "12:00", "option": 3,
                "total": 40.0,
                "items": [line(101, 1), line(102, 2), line(103, 3)],
            }),
        )
        .unwrap();

        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM order_items WHERE order_no = 1"),
            3
        );
        let printers: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT printer FROM printer_assignments WHERE order_no = 1 ORDER BY sl_no")
                .unwrap();
            let rows = stmt.query_map([], |r| r.get(0)).unwrap();
            rows.filter_map(|r| r.ok()).collect()
        };
        // 102 has no configured printer and falls back to the order default
        assert_eq!(printers, vec!["GRILL", "CASHIER", "COLD"]);
    }

    #[test]
    fn test_resubmission_reuses_customer() {
        let conn = test_conn();
        seed_dining_room(&conn);

        let first = submit(
            &conn,
            json!({
                "status": "NEW", "orderNo": 0,
                "date": "2024-03-01", "time": "12:00", "option": 1,
                "custName": "Alice", "contact": "+1 (234) 567-8901",
                "address": "12 Corniche Rd", "total": 19.0,
                "items": [line(101, 1)],
            }),
        )
        .unwrap();
        let second = submit(
            &conn,
            json!({
                "status": "NEW", "orderNo": 0,
                "date": "2024-03-01", "time": "12:30", "option": 1,
                "custName": "Alice", "contact": "2345678901",
                "total": 19.0, "items": [line(101, 1)],
            }),
        )
        .unwrap();

        assert!(first.cust_id > 0);
        assert_eq!(first.cust_id, second.cust_id);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM customers"), 1);
    }

    #[test]
    fn test_failed_submission_leaves_no_trace() {
        let conn = test_conn();
        seed_dining_room(&conn);

        // Duplicate line number trips the (order_no, sl_no) primary key
        let err = submit(
            &conn,
            json!({
                "status": "NEW", "orderNo": 0,
                "date": "2024-03-01", "time": "19:45", "option": 2,
                "tableId": 5, "selectedSeats": [12, 13], "total": 38.0,
                "items": [line(101, 1), line(101, 1)],
            }),
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::Duplicate(_)), "got {err:?}");

        assert_eq!(count(&conn, "SELECT COUNT(*) FROM orders"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM order_items"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM printer_assignments"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM order_seats"), 0);
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM seats WHERE status = 1"),
            0
        );
        // The sequence bump rolled back with everything else
        let next: i64 = conn
            .query_row("SELECT next_no FROM order_sequence WHERE id = 1", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(next, 1);
    }

    #[test]
    fn test_held_draft_is_purged_on_commit() {
        let conn = test_conn();
        seed_dining_room(&conn);
        conn.execute_batch(
            "INSERT INTO held_orders (id, label, total) VALUES (9, 'HOLD-9', 19.0);
             INSERT INTO held_order_items (held_id, sl_no, item_code, qty, rate, amount)
                VALUES (9, 1, 101, 2, 9.5, 19.0);",
        )
        .unwrap();

        submit(
            &conn,
            json!({
                "status": "NEW", "orderNo": 0,
                "date": "2024-03-01", "time": "12:00", "option": 3,
                "total": 19.0, "holdedOrder": 9,
                "items": [line(101, 1)],
            }),
        )
        .unwrap();

        assert_eq!(count(&conn, "SELECT COUNT(*) FROM held_orders"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM held_order_items"), 0);
    }

    #[test]
    fn test_staged_seats_claimed_when_none_selected() {
        let conn = test_conn();
        seed_dining_room(&conn);
        conn.execute_batch(
            "INSERT INTO staged_seats (counter, seat_id, table_id) VALUES
                ('COUNTER1', 21, 7), ('COUNTER1', 22, 7);",
        )
        .unwrap();

        submit(
            &conn,
            json!({
                "status": "NEW", "orderNo": 0,
                "date": "2024-03-01", "time": "20:00", "option": 2,
                "tableId": 7, "tableNo": "T7", "total": 19.0,
                "selectedSeats": [],
                "items": [line(101, 1)],
            }),
        )
        .unwrap();

        assert_eq!(
            count(
                &conn,
                "SELECT COUNT(*) FROM seats WHERE id IN (21, 22) AND status = 1"
            ),
            2
        );
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM order_seats WHERE order_no = 1"),
            2
        );
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM staged_seats"), 0);

        // Both of the table's two seats are taken
        let status: String = conn
            .query_row("SELECT status FROM dining_tables WHERE id = 7", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(status, "full");
    }

    #[test]
    fn test_takeaway_touches_no_seats() {
        let conn = test_conn();
        seed_dining_room(&conn);
        conn.execute(
            "INSERT INTO staged_seats (counter, seat_id, table_id) VALUES ('COUNTER1', 12, 5)",
            [],
        )
        .unwrap();

        let receipt = submit(
            &conn,
            json!({
                "status": "NEW", "orderNo": 0,
                "date": "2024-03-01", "time": "12:00", "option": 3,
                "total": 19.0, "items": [line(101, 1)],
            }),
        )
        .unwrap();

        assert_eq!(receipt.details.selected_seats, None);
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM seats WHERE status = 1"),
            0
        );
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM order_seats"), 0);
        // The staged fallback is dine-in only
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM staged_seats"), 1);
    }

    #[test]
    fn test_prefix_concatenates_with_number() {
        let conn = test_conn();
        seed_dining_room(&conn);

        submit(
            &conn,
            json!({
                "status": "NEW", "orderNo": 0,
                "date": "2024-03-01", "time": "12:00", "option": 3,
                "prefix": "INV", "total": 19.0,
                "items": [line(101, 1)],
            }),
        )
        .unwrap();

        let prefixed: String = conn
            .query_row(
                "SELECT prefixed_no FROM orders WHERE order_no = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(prefixed, "INV1");
    }

    // ------------------------------------------------------------------
    // UPDATED
    // ------------------------------------------------------------------

    #[test]
    fn test_update_of_missing_order_is_client_fault() {
        let conn = test_conn();
        seed_dining_room(&conn);

        let err = submit(
            &conn,
            json!({
                "status": "UPDATED", "orderNo": 99,
                "date": "2024-03-01", "time": "12:00", "option": 3,
                "total": 19.0, "items": [line(101, 1)],
            }),
        )
        .unwrap_err();

        assert!(matches!(err, OrderError::OrderNotFound(99)), "got {err:?}");
        assert_eq!(err.fault(), Fault::Client);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM orders"), 0);
    }

    #[test]
    fn test_update_rewrites_lines_and_seats() {
        let conn = test_conn();
        seed_dining_room(&conn);

        submit(
            &conn,
            json!({
                "status": "NEW", "orderNo": 0,
                "date": "2024-03-01", "time": "19:45", "option": 2,
                "tableId": 5, "tableNo": "T5", "total": 38.0,
                "selectedSeats": [12, 13],
                "items": [line(101, 1), line(102, 2)],
            }),
        )
        .unwrap();

        let receipt = submit(
            &conn,
            json!({
                "status": "UPDATED", "orderNo": 1,
                "date": "2024-03-01", "time": "20:10", "option": 2,
                "tableId": 5, "tableNo": "T5", "total": 9.5,
                "selectedSeats": [14],
                "items": [line(103, 1)],
            }),
        )
        .unwrap();
        assert_eq!(receipt.message, "Order 1 updated");

        let (item_code, total): (i64, f64) = conn
            .query_row(
                "SELECT i.item_code, o.total FROM order_items i
                 JOIN orders o ON o.order_no = i.order_no
                 WHERE i.order_no = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(item_code, 103);
        assert_eq!(total, 9.5);
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM order_items WHERE order_no = 1"),
            1
        );

        // Old seats freed, the new one claimed, the header follows
        assert_eq!(
            count(
                &conn,
                "SELECT COUNT(*) FROM seats WHERE id IN (12, 13) AND status = 0"
            ),
            2
        );
        let seat_id: Option<i64> = conn
            .query_row("SELECT seat_id FROM orders WHERE order_no = 1", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(seat_id, Some(14));
        let assigned: i64 = conn
            .query_row(
                "SELECT seat_id FROM order_seats WHERE order_no = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(assigned, 14);
    }

    #[test]
    fn test_sold_order_keeps_seats_frozen() {
        let conn = test_conn();
        seed_dining_room(&conn);

        submit(
            &conn,
            json!({
                "status": "NEW", "orderNo": 0,
                "date": "2024-03-01", "time": "19:45", "option": 2,
                "tableId": 5, "tableNo": "T5", "total": 19.0,
                "selectedSeats": [12, 13],
                "items": [line(101, 1)],
            }),
        )
        .unwrap();
        conn.execute("UPDATE orders SET sold = 1 WHERE order_no = 1", [])
            .unwrap();

        submit(
            &conn,
            json!({
                "status": "UPDATED", "orderNo": 1,
                "date": "2024-03-01", "time": "21:00", "option": 2,
                "tableId": 5, "tableNo": "T5", "total": 42.0,
                "selectedSeats": [14, 15],
                "items": [line(101, 1)],
            }),
        )
        .unwrap();

        // Header rewrite went through but the seat stayed pinned
        let (seat_id, total): (Option<i64>, f64) = conn
            .query_row(
                "SELECT seat_id, total FROM orders WHERE order_no = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(seat_id, Some(12));
        assert_eq!(total, 42.0);

        assert_eq!(
            count(
                &conn,
                "SELECT COUNT(*) FROM seats WHERE id IN (14, 15) AND status = 1"
            ),
            0,
            "requested seats were not claimed"
        );
        let assigned: Vec<i64> = {
            let mut stmt = conn
                .prepare("SELECT seat_id FROM order_seats WHERE order_no = 1 ORDER BY seat_id")
                .unwrap();
            let rows = stmt.query_map([], |r| r.get(0)).unwrap();
            rows.filter_map(|r| r.ok()).collect()
        };
        assert_eq!(assigned, vec![12, 13], "assignments untouched");
    }

    // ------------------------------------------------------------------
    // KOT
    // ------------------------------------------------------------------

    #[test]
    fn test_kot_snapshots_without_replacing_lines() {
        let conn = test_conn();
        seed_dining_room(&conn);

        submit(
            &conn,
            json!({
                "status": "NEW", "orderNo": 0,
                "date": "2024-03-01", "time": "19:45", "option": 3,
                "total": 19.0, "items": [line(101, 1)],
            }),
        )
        .unwrap();

        let receipt = submit(
            &conn,
            json!({
                "status": "KOT", "orderNo": 1,
                "date": "2024-03-01", "time": "19:50", "option": 2,
                "tableId": 5, "tableNo": "T5", "total": 19.0,
                "selectedSeats": [12],
                "items": [line(102, 1)],
            }),
        )
        .unwrap();
        assert_eq!(receipt.status, "KOT");
        assert_eq!(receipt.message, "KOT 1 for order 1 sent");

        // Billing lines untouched, parallel snapshot written
        let billed: i64 = conn
            .query_row(
                "SELECT item_code FROM order_items WHERE order_no = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(billed, 101);
        let (kot_no, kot_item): (i64, i64) = conn
            .query_row(
                "SELECT k.kot_no, i.item_code FROM kot_orders k
                 JOIN kot_items i ON i.kot_no = k.kot_no
                 WHERE k.order_no = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(kot_no, 1);
        assert_eq!(kot_item, 102);

        // Live header tracks the kitchen state
        let (table_id, seat_id, kind): (i64, Option<i64>, String) = conn
            .query_row(
                "SELECT table_id, seat_id, kind FROM orders WHERE order_no = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(table_id, 5);
        assert_eq!(seat_id, Some(12));
        assert_eq!(kind, "kot");

        // Seat occupied without assignment bookkeeping
        let seat_status: i64 = conn
            .query_row("SELECT status FROM seats WHERE id = 12", [], |r| r.get(0))
            .unwrap();
        assert_eq!(seat_status, 1);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM order_seats"), 0);

        // Routing pass used the kitchen default for the unconfigured item
        let printer: String = conn
            .query_row(
                "SELECT printer FROM printer_assignments WHERE order_no = 1 AND sl_no = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(printer, "KITCHEN");
    }

    #[test]
    fn test_kot_before_billing_header_exists() {
        let conn = test_conn();
        seed_dining_room(&conn);

        let receipt = submit(
            &conn,
            json!({
                "status": "KOT", "orderNo": 7,
                "date": "2024-03-01", "time": "19:50", "option": 2,
                "tableId": 5, "tableNo": "T5", "total": 19.0,
                "selectedSeats": [12],
                "items": [line(101, 1)],
            }),
        )
        .unwrap();
        assert_eq!(receipt.order_no, 7);

        // Snapshot and routing exist even though no billing header does
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM kot_orders WHERE order_no = 7"),
            1
        );
        assert_eq!(
            count(
                &conn,
                "SELECT COUNT(*) FROM printer_assignments WHERE order_no = 7"
            ),
            1
        );
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM orders"), 0);
    }
}
