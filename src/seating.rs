//! Seat and table occupancy.
//!
//! Dine-in orders claim seats either from an explicit selection or from the
//! terminal's counter-staged fallback, resolved once per submission into a
//! [`SeatSource`]. Claims copy the seat master row's label and table into
//! `order_seats`; client-supplied labels are never stored. Callers enforce
//! the finalized-order freeze before touching any of this.

use rusqlite::{params, Connection};
use tracing::warn;

use crate::config::ProcessorConfig;
use crate::error::OrderError;
use crate::submission::{OrderDraft, OrderType};

/// Where an order's seats come from, decided once at the start of seat
/// handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatSource {
    /// Client-supplied seat ids, filtered to usable ones.
    Explicit(Vec<i64>),
    /// Whatever the terminal staged under this counter label.
    StagedForCounter(String),
}

/// Usable seat ids from a raw selection: positive, first occurrence only.
pub(crate) fn valid_seat_ids(selected: &[i64]) -> Vec<i64> {
    let mut out: Vec<i64> = Vec::new();
    for seat in selected {
        if *seat > 0 && !out.contains(seat) {
            out.push(*seat);
        }
    }
    out
}

/// Pick the seat source for a submission. The staged fallback only applies
/// to dine-in orders that supplied no usable explicit seats.
pub(crate) fn resolve_seat_source(draft: &OrderDraft, cfg: &ProcessorConfig) -> SeatSource {
    let explicit = valid_seat_ids(&draft.selected_seats);
    if explicit.is_empty() && draft.option == OrderType::DineIn {
        SeatSource::StagedForCounter(cfg.counter.clone())
    } else {
        SeatSource::Explicit(explicit)
    }
}

/// Claim the source's seats for an order and record the assignments.
/// Returns how many seats were actually claimed.
pub(crate) fn apply_seat_source(
    conn: &Connection,
    order_no: i64,
    table_id: i64,
    source: &SeatSource,
    counter: &str,
) -> Result<usize, OrderError> {
    match source {
        SeatSource::Explicit(ids) => {
            let mut claimed = 0;
            for seat_id in ids {
                claimed += claim_seat(conn, order_no, table_id, *seat_id, counter)?;
            }
            Ok(claimed)
        }
        SeatSource::StagedForCounter(label) => {
            let staged = staged_seats(conn, label)?;
            let mut claimed = 0;
            for (seat_id, staged_table) in staged {
                claimed += claim_seat(conn, order_no, staged_table, seat_id, label)?;
            }
            conn.execute(
                "DELETE FROM staged_seats WHERE counter = ?1",
                params![label],
            )
            .map_err(OrderError::store("purge staged seats"))?;
            Ok(claimed)
        }
    }
}

/// Mark one seat occupied and record its assignment, taking label and table
/// from the seat master row. A seat that is not on the target table is
/// skipped.
fn claim_seat(
    conn: &Connection,
    order_no: i64,
    table_id: i64,
    seat_id: i64,
    counter: &str,
) -> Result<usize, OrderError> {
    let (seat_label, seat_table) = match conn.query_row(
        "SELECT label, table_id FROM seats WHERE id = ?1 AND table_id = ?2",
        params![seat_id, table_id],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
    ) {
        Ok(master) => master,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            warn!(seat_id, table_id, "Seat not on target table, skipping");
            return Ok(0);
        }
        Err(e) => return Err(OrderError::store("look up seat")(e)),
    };

    conn.execute(
        "UPDATE seats SET status = 1, updated_at = datetime('now') WHERE id = ?1",
        params![seat_id],
    )
    .map_err(OrderError::store("mark seat occupied"))?;

    conn.execute(
        "INSERT INTO order_seats (order_no, seat_id, seat_label, table_id, counter)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![order_no, seat_id, seat_label, seat_table, counter],
    )
    .map_err(OrderError::store("insert seat assignment"))?;

    Ok(1)
}

fn staged_seats(conn: &Connection, counter: &str) -> Result<Vec<(i64, i64)>, OrderError> {
    let mut stmt = conn
        .prepare("SELECT seat_id, table_id FROM staged_seats WHERE counter = ?1 ORDER BY seat_id")
        .map_err(OrderError::store("prepare staged seats"))?;
    let rows = stmt
        .query_map(params![counter], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(OrderError::store("query staged seats"))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(OrderError::store("read staged seats"))
}

/// Free every seat on the order's table and drop the order's assignments,
/// ahead of re-applying the current selection.
pub(crate) fn release_order_seats(
    conn: &Connection,
    order_no: i64,
    table_id: i64,
) -> Result<(), OrderError> {
    conn.execute(
        "UPDATE seats SET status = 0, updated_at = datetime('now') WHERE table_id = ?1",
        params![table_id],
    )
    .map_err(OrderError::store("release table seats"))?;

    conn.execute(
        "DELETE FROM order_seats WHERE order_no = ?1",
        params![order_no],
    )
    .map_err(OrderError::store("delete seat assignments"))?;

    Ok(())
}

/// KOT marks submitted seats occupied without assignment bookkeeping.
pub(crate) fn mark_seats_occupied(conn: &Connection, selected: &[i64]) -> Result<usize, OrderError> {
    let mut updated = 0;
    for seat_id in valid_seat_ids(selected) {
        updated += conn
            .execute(
                "UPDATE seats SET status = 1, updated_at = datetime('now') WHERE id = ?1",
                params![seat_id],
            )
            .map_err(OrderError::store("mark seat occupied"))?;
    }
    Ok(updated)
}

/// Recompute a table's occupancy from its seats: any free seat leaves it
/// partially occupied, none leaves it fully occupied.
pub(crate) fn refresh_table_status(conn: &Connection, table_id: i64) -> Result<(), OrderError> {
    let free: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM seats WHERE table_id = ?1 AND status = 0",
            params![table_id],
            |row| row.get(0),
        )
        .map_err(OrderError::store("count free seats"))?;

    let status = if free > 0 { "partial" } else { "full" };
    conn.execute(
        "UPDATE dining_tables SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![status, table_id],
    )
    .map_err(OrderError::store("update table status"))?;

    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
