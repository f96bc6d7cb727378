//! Customer identity resolution.
//!
//! Runs once per submission, before the header write. A submission with both
//! a name and a contact is matched against active customers on exact name
//! plus normalized contact (either legacy contact column); matches are
//! reused, gaps in their stored contact/address are backfilled, and misses
//! become a fresh row. Repeated submissions of the same pair never create a
//! duplicate. Submissions without name or contact keep the caller-supplied
//! customer id.

use rusqlite::{params, Connection};
use tracing::info;

use crate::error::OrderError;
use crate::submission::OrderDraft;

/// Normalize a raw contact string to exactly 10 digits: strip everything
/// that is not a digit, keep the last 10, left-pad shorter values with
/// zeros. Idempotent.
pub(crate) fn normalize_contact(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 10 {
        digits[digits.len() - 10..].to_string()
    } else {
        format!("{digits:0>10}")
    }
}

/// Resolve the customer id the order header will store.
pub(crate) fn resolve_customer(conn: &Connection, draft: &OrderDraft) -> Result<i64, OrderError> {
    let name = draft.cust_name.trim();
    let contact_raw = draft.contact.trim();
    if name.is_empty() || contact_raw.is_empty() {
        return Ok(draft.cust_id);
    }

    let contact = normalize_contact(contact_raw);
    let address = draft.address.trim();

    let existing = match conn.query_row(
        "SELECT id, contact, address FROM customers
         WHERE active = 1 AND name = ?1 AND (contact = ?2 OR contact_alt = ?2)
         ORDER BY id DESC LIMIT 1",
        params![name, contact],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    ) {
        Ok(found) => Some(found),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(OrderError::store("look up customer")(e)),
    };

    if let Some((id, stored_contact, stored_address)) = existing {
        // Backfill blanks only; populated fields already carry this data
        if stored_contact.trim().is_empty() {
            conn.execute(
                "UPDATE customers SET contact = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![contact, id],
            )
            .map_err(OrderError::store("backfill customer contact"))?;
        }
        if stored_address.trim().is_empty() && !address.is_empty() {
            conn.execute(
                "UPDATE customers SET address = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![address, id],
            )
            .map_err(OrderError::store("backfill customer address"))?;
        }
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO customers (name, address, contact, contact_alt, active)
         VALUES (?1, ?2, ?3, '', 1)",
        params![name, address, contact],
    )
    .map_err(OrderError::store("insert customer"))?;

    // The insert's generated key is not trusted; disambiguate by re-query.
    let id: i64 = conn
        .query_row(
            "SELECT id FROM customers WHERE name = ?1 AND contact = ?2 ORDER BY id DESC LIMIT 1",
            params![name, contact],
            |row| row.get(0),
        )
        .map_err(OrderError::store("resolve new customer id"))?;

    info!(customer_id = id, "Customer created");
    Ok(id)
}

// ===========================================================================
// Tests
// ===========================================================================
